use thiserror::Error;

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Error type surfaced when a packet or entity message cannot be decoded.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("message truncated")]
    Truncated,
    #[error("unexpected message tag {0:#04x}")]
    BadTag(u8),
    #[error("message checksum mismatch")]
    BadChecksum,
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,
    #[error("identifier field must be 16 bytes, got {0}")]
    BadIdentifier(usize),
    #[error("unknown packet type {0}")]
    BadPacketKind(i32),
    #[error("schema decode error: {0}")]
    Schema(#[from] prost::DecodeError),
}
