use tally_ledger::LedgerError;
use tally_proto::CodecError;
use thiserror::Error;

/// Result alias for RPC operations.
pub type RpcResult<T> = Result<T, RpcError>;

/// Error type surfaced by the pipeline, dispatcher, and client.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("connecting these stages would form a cycle")]
    Cycle,
    #[error("stage expected {expected} input")]
    BadStageInput { expected: &'static str },
    #[error("call failed with code {code}: {message}")]
    Response { code: i32, message: String },
    #[error("response channel closed before delivery")]
    ChannelClosed,
}
