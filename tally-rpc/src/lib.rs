//! RPC runtime for the tally ledger: the staged processing pipeline, the
//! server-side function dispatcher, and the client-side correlator.

mod client;
mod error;
mod pipeline;
mod server;

pub use client::{Correlator, CorrelatorStage, RpcClient};
pub use error::{RpcError, RpcResult};
pub use pipeline::{PipeValue, Pipeline, Processor, StageId};
pub use server::{DispatchStage, Dispatcher, EncodeStage, UnwrapStage};
