//! Server-side dispatch: the function table, the layered precondition
//! checks, and the pipeline stages that carry bytes to and from it.

use std::sync::{Arc, Mutex};

use tally_ledger::{LedgerError, LedgerRuntime};
use tally_proto::{code, encode_frame, BodyCodec, CodecError, FrameBuffer, Packet};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{PipeValue, Processor, RpcError, RpcResult};

const KNOWN_FUNCTIONS: [&str; 10] = [
    "OpenOrCreateDB",
    "GetCurrDB",
    "CloseCurrDB",
    "GetMainAccounts",
    "AddAccount",
    "AddItem",
    "ApplyTransaction",
    "UpdateMarketPrice",
    "PrintBalances",
    "PrintMarketBalances",
];

/// Everything except `OpenOrCreateDB` operates on the current selection.
fn needs_current(function: &str) -> bool {
    function != "OpenOrCreateDB"
}

fn needs_arg(function: &str) -> bool {
    matches!(
        function,
        "AddAccount" | "AddItem" | "ApplyTransaction" | "UpdateMarketPrice"
    )
}

/// The server function surface. Holds the ledger runtime and the body
/// codec; turns request packets into response packets and never fails —
/// every failure becomes a coded response carrying the request UUID.
pub struct Dispatcher {
    runtime: Arc<Mutex<LedgerRuntime>>,
    codec: Arc<dyn BodyCodec>,
}

impl Dispatcher {
    pub fn new(runtime: Arc<Mutex<LedgerRuntime>>, codec: Arc<dyn BodyCodec>) -> Self {
        Self { runtime, codec }
    }

    /// Validate preconditions in order, decode the argument, execute, and
    /// assemble the response. Short-circuits on the first failing layer.
    pub fn handle(&self, request: &Packet) -> Packet {
        let Some(function) = request.function() else {
            return Packet::response(request.uuid, code::MISSING_FUNCTION, "request has no function");
        };
        if !KNOWN_FUNCTIONS.contains(&function) {
            debug!(function, "rejecting unknown function");
            return Packet::response(
                request.uuid,
                code::UNKNOWN_FUNCTION,
                &format!("unknown function {function}"),
            );
        }

        let mut runtime = match self.runtime.lock() {
            Ok(runtime) => runtime,
            Err(_) => {
                return Packet::response(request.uuid, code::EXEC_FAILED, "runtime lock poisoned")
            }
        };
        if needs_current(function) && runtime.current().is_none() {
            return Packet::response(request.uuid, code::NO_CURRENT_DB, "no current database");
        }
        let arg = request
            .body
            .get("arg")
            .filter(|bytes| !bytes.is_empty())
            .map(Vec::as_slice);
        if needs_arg(function) && arg.is_none() {
            return Packet::response(request.uuid, code::MISSING_ARG, "required argument missing");
        }

        match self.execute(&mut runtime, function, arg, request.uuid) {
            Ok(response) => response,
            Err(ExecError::Decode(err)) => {
                debug!(%err, function, "argument decode failed");
                Packet::response(request.uuid, code::DECODE_FAILED, &err.to_string())
            }
            Err(ExecError::Ledger(err)) => {
                debug!(%err, function, "ledger execution failed");
                Packet::response(request.uuid, code::EXEC_FAILED, &err.to_string())
            }
        }
    }

    /// The per-function switch.
    fn execute(
        &self,
        runtime: &mut LedgerRuntime,
        function: &str,
        arg: Option<&[u8]>,
        request_uuid: Uuid,
    ) -> Result<Packet, ExecError> {
        let ok = || Packet::response(request_uuid, code::OK, "ok");
        let arg = arg.unwrap_or_default();
        let current = |runtime: &LedgerRuntime| {
            runtime.current().ok_or(LedgerError::NoCurrentDatabase)
        };

        match function {
            "OpenOrCreateDB" => {
                let id = match arg {
                    [] => None,
                    bytes => Some(decode_uuid(bytes)?),
                };
                let id = runtime.open_or_create(id).map_err(ExecError::Ledger)?;
                Ok(ok().with_body("uuid", id.as_bytes().to_vec()))
            }
            "GetCurrDB" => {
                let id = runtime
                    .current_uuid()
                    .ok_or(ExecError::Ledger(LedgerError::NoCurrentDatabase))?;
                Ok(ok().with_body("uuid", id.as_bytes().to_vec()))
            }
            "CloseCurrDB" => {
                runtime.close_current()?;
                Ok(ok())
            }
            "GetMainAccounts" => {
                let db = current(runtime)?;
                let mut response = ok();
                for account in db.main_accounts()? {
                    response = response.with_body(&account.name, account.uuid.as_bytes().to_vec());
                }
                Ok(response)
            }
            "AddAccount" => {
                let spec = self.codec.decode_account(arg)?;
                let uuid = current(runtime)?.add_account(&spec)?;
                Ok(ok().with_body("uuid", uuid.as_bytes().to_vec()))
            }
            "AddItem" => {
                let spec = self.codec.decode_item(arg)?;
                let uuid = current(runtime)?.add_item(&spec)?;
                Ok(ok().with_body("uuid", uuid.as_bytes().to_vec()))
            }
            "ApplyTransaction" => {
                let input = self.codec.decode_transaction(arg)?;
                let uuid = current(runtime)?.apply_transaction(&input)?;
                Ok(ok().with_body("uuid", uuid.as_bytes().to_vec()))
            }
            "UpdateMarketPrice" => {
                let spec = self.codec.decode_market_price(arg)?;
                current(runtime)?.update_market_price(&spec)?;
                Ok(ok())
            }
            "PrintBalances" => {
                let report = current(runtime)?.balances_report()?;
                Ok(ok().with_body("balances", report.into_bytes()))
            }
            "PrintMarketBalances" => {
                let report = current(runtime)?.market_report()?;
                Ok(ok().with_body("balances", report.into_bytes()))
            }
            // Unreachable: membership was checked against KNOWN_FUNCTIONS.
            other => Err(ExecError::Ledger(LedgerError::Storage(format!(
                "unhandled function {other}"
            )))),
        }
    }
}

/// Failure modes of [`Dispatcher::execute`], keyed to their response codes.
enum ExecError {
    Decode(CodecError),
    Ledger(LedgerError),
}

impl From<CodecError> for ExecError {
    fn from(err: CodecError) -> Self {
        Self::Decode(err)
    }
}

impl From<LedgerError> for ExecError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err)
    }
}

fn decode_uuid(bytes: &[u8]) -> Result<Uuid, ExecError> {
    Uuid::from_slice(bytes).map_err(|_| ExecError::Decode(CodecError::BadIdentifier(bytes.len())))
}

/// Bytes → packets: reframes the byte stream and decodes each payload.
/// Payloads that fail packet-level decoding carry no usable correlation
/// UUID, so they are dropped with a warning.
pub struct UnwrapStage {
    buffer: FrameBuffer,
    codec: Arc<dyn BodyCodec>,
}

impl UnwrapStage {
    pub fn new(codec: Arc<dyn BodyCodec>) -> Self {
        Self {
            buffer: FrameBuffer::new(),
            codec,
        }
    }
}

impl Processor for UnwrapStage {
    fn process(&mut self, input: PipeValue) -> RpcResult<PipeValue> {
        let PipeValue::Bytes(bytes) = input else {
            return Err(RpcError::BadStageInput { expected: "bytes" });
        };
        let mut packets = Vec::new();
        for frame in self.buffer.feed(&bytes) {
            match self.codec.decode_packet(&frame.payload) {
                Ok(packet) => packets.push(packet),
                Err(err) => warn!(%err, "dropping undecodable packet payload"),
            }
        }
        Ok(PipeValue::Packets(packets))
    }
}

/// Packets → packets: runs every request through the dispatcher.
pub struct DispatchStage {
    dispatcher: Arc<Dispatcher>,
}

impl DispatchStage {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

impl Processor for DispatchStage {
    fn process(&mut self, input: PipeValue) -> RpcResult<PipeValue> {
        let PipeValue::Packets(packets) = input else {
            return Err(RpcError::BadStageInput { expected: "packets" });
        };
        let responses = packets
            .iter()
            .map(|packet| self.dispatcher.handle(packet))
            .collect();
        Ok(PipeValue::Packets(responses))
    }
}

/// Packets → bytes: encodes and frames each packet into one byte stream.
pub struct EncodeStage {
    codec: Arc<dyn BodyCodec>,
}

impl EncodeStage {
    pub fn new(codec: Arc<dyn BodyCodec>) -> Self {
        Self { codec }
    }
}

impl Processor for EncodeStage {
    fn process(&mut self, input: PipeValue) -> RpcResult<PipeValue> {
        let PipeValue::Packets(packets) = input else {
            return Err(RpcError::BadStageInput { expected: "packets" });
        };
        let mut bytes = Vec::new();
        for packet in &packets {
            let payload = self.codec.encode_packet(packet)?;
            bytes.extend_from_slice(&encode_frame(&payload));
        }
        Ok(PipeValue::Bytes(bytes))
    }
}
