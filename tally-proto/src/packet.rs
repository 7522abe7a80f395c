//! The logical packet value carried inside every wire frame.

use std::collections::BTreeMap;

use uuid::Uuid;

/// Response codes carried in the `code` body key.
pub mod code {
    pub const OK: i32 = 0;
    pub const DECODE_FAILED: i32 = -101;
    pub const EXEC_FAILED: i32 = -102;
    pub const MISSING_FUNCTION: i32 = -201;
    pub const UNKNOWN_FUNCTION: i32 = -202;
    pub const NO_CURRENT_DB: i32 = -203;
    pub const MISSING_ARG: i32 = -204;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Request = 0,
    Response = 1,
}

impl PacketKind {
    pub fn as_i16(self) -> i16 {
        self as i16
    }

    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Request),
            1 => Some(Self::Response),
            _ => None,
        }
    }
}

/// A request or response envelope. `meta` is optional transport metadata;
/// `body` carries the function name and arguments (requests) or the result
/// keys (responses). Ordered maps keep encodings deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub uuid: Uuid,
    pub kind: PacketKind,
    pub meta: BTreeMap<String, Vec<u8>>,
    pub body: BTreeMap<String, Vec<u8>>,
}

impl Packet {
    pub fn request(uuid: Uuid) -> Self {
        Self {
            uuid,
            kind: PacketKind::Request,
            meta: BTreeMap::new(),
            body: BTreeMap::new(),
        }
    }

    /// A response echoing the request's identifier, so the caller's
    /// correlator can match it.
    pub fn response(request_uuid: Uuid, code: i32, message: &str) -> Self {
        let mut pkt = Self {
            uuid: request_uuid,
            kind: PacketKind::Response,
            meta: BTreeMap::new(),
            body: BTreeMap::new(),
        };
        pkt.body.insert("code".into(), code.to_le_bytes().to_vec());
        pkt.body
            .insert("message".into(), message.as_bytes().to_vec());
        pkt
    }

    pub fn with_body(mut self, key: &str, value: Vec<u8>) -> Self {
        self.body.insert(key.into(), value);
        self
    }

    /// The `function` body key of a request, when present and valid utf-8.
    pub fn function(&self) -> Option<&str> {
        self.body
            .get("function")
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    /// The `code` body key of a response.
    pub fn response_code(&self) -> Option<i32> {
        let bytes = self.body.get("code")?;
        Some(i32::from_le_bytes(bytes.as_slice().try_into().ok()?))
    }

    /// The `message` body key of a response.
    pub fn message(&self) -> Option<&str> {
        self.body
            .get("message")
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::new_id;

    #[test]
    fn response_echoes_request_uuid_and_code() {
        let request_uuid = new_id();
        let pkt = Packet::response(request_uuid, code::EXEC_FAILED, "unknown account");
        assert_eq!(pkt.uuid, request_uuid);
        assert_eq!(pkt.kind, PacketKind::Response);
        assert_eq!(pkt.response_code(), Some(code::EXEC_FAILED));
        assert_eq!(pkt.message(), Some("unknown account"));
    }

    #[test]
    fn function_reads_the_body_key() {
        let pkt = Packet::request(new_id()).with_body("function", b"AddItem".to_vec());
        assert_eq!(pkt.function(), Some("AddItem"));
        assert_eq!(Packet::request(new_id()).function(), None);
    }
}
