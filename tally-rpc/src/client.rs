//! Client-side correlation: route response packets back to the callers
//! awaiting them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tally_core::new_id;
use tally_proto::{encode_frame, BodyCodec, Packet};
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

use crate::{PipeValue, Processor, RpcError, RpcResult};

/// Maps outstanding request identifiers to waiting callers. Responses with
/// no registered waiter are dropped; a cancelled wait discards any late
/// response.
#[derive(Default)]
pub struct Correlator {
    pending: Mutex<HashMap<Uuid, oneshot::Sender<Packet>>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a waiter for `uuid` and return the receiving end.
    pub fn register(&self, uuid: Uuid) -> oneshot::Receiver<Packet> {
        let (tx, rx) = oneshot::channel();
        if let Ok(mut pending) = self.pending.lock() {
            pending.insert(uuid, tx);
        }
        rx
    }

    /// Deliver a response to its waiter. Returns false when nobody was
    /// waiting (unsolicited or already-cancelled responses).
    pub fn complete(&self, packet: Packet) -> bool {
        let waiter = match self.pending.lock() {
            Ok(mut pending) => pending.remove(&packet.uuid),
            Err(_) => None,
        };
        match waiter {
            Some(tx) => tx.send(packet).is_ok(),
            None => {
                debug!(uuid = %packet.uuid, "dropping uncorrelated response");
                false
            }
        }
    }

    /// Remove a waiter; a response arriving afterwards is discarded.
    pub fn cancel(&self, uuid: &Uuid) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(uuid);
        }
    }
}

/// Packets → done: the pipeline's delivery sink on the client side.
pub struct CorrelatorStage {
    correlator: Arc<Correlator>,
}

impl CorrelatorStage {
    pub fn new(correlator: Arc<Correlator>) -> Self {
        Self { correlator }
    }
}

impl Processor for CorrelatorStage {
    fn process(&mut self, input: PipeValue) -> RpcResult<PipeValue> {
        let PipeValue::Packets(packets) = input else {
            return Err(RpcError::BadStageInput { expected: "packets" });
        };
        for packet in packets {
            self.correlator.complete(packet);
        }
        Ok(PipeValue::Done)
    }
}

/// Builds framed request bytes and resolves responses, surfacing negative
/// codes as errors.
pub struct RpcClient {
    codec: Arc<dyn BodyCodec>,
    correlator: Arc<Correlator>,
}

impl RpcClient {
    pub fn new(codec: Arc<dyn BodyCodec>, correlator: Arc<Correlator>) -> Self {
        Self { codec, correlator }
    }

    /// Encode `{function, arg}` into a framed request and register a
    /// waiter for the response.
    pub fn build_request(
        &self,
        function: &str,
        arg: Option<Vec<u8>>,
    ) -> RpcResult<(Uuid, oneshot::Receiver<Packet>, Vec<u8>)> {
        let uuid = new_id();
        let mut packet = Packet::request(uuid).with_body("function", function.as_bytes().to_vec());
        if let Some(arg) = arg {
            packet = packet.with_body("arg", arg);
        }
        let payload = self.codec.encode_packet(&packet)?;
        let receiver = self.correlator.register(uuid);
        Ok((uuid, receiver, encode_frame(&payload)))
    }

    /// Await the response for a request built with [`build_request`].
    ///
    /// [`build_request`]: RpcClient::build_request
    pub async fn wait(
        &self,
        uuid: Uuid,
        receiver: oneshot::Receiver<Packet>,
    ) -> RpcResult<Packet> {
        match receiver.await {
            Ok(packet) => {
                let code = packet.response_code().unwrap_or(0);
                if code < 0 {
                    return Err(RpcError::Response {
                        code,
                        message: packet.message().unwrap_or_default().to_string(),
                    });
                }
                Ok(packet)
            }
            Err(_) => {
                self.correlator.cancel(&uuid);
                Err(RpcError::ChannelClosed)
            }
        }
    }
}
