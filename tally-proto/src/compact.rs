//! The self-describing binary body codec.
//!
//! Layout: one tag byte, the message fields, then a CRC32 (little-endian)
//! over everything before it. Integers are little-endian; strings and byte
//! strings are varint-length-prefixed; maps are count-prefixed key/value
//! sequences.

use std::collections::BTreeMap;

use tally_core::{AccountSpec, Decimal, ItemSpec, LineInput, MarketPriceSpec, TransactionInput};
use uuid::Uuid;

use crate::{BodyCodec, CodecError, CodecResult, Packet, PacketKind};

const TAG_PACKET: u8 = 0x01;
const TAG_ACCOUNT: u8 = 0x02;
const TAG_ITEM: u8 = 0x03;
const TAG_TRANSACTION: u8 = 0x04;
const TAG_MARKET_PRICE: u8 = 0x05;

/// The compact self-describing codec. Stateless.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompactCodec;

impl CompactCodec {
    pub fn new() -> Self {
        Self
    }
}

impl BodyCodec for CompactCodec {
    fn encode_packet(&self, packet: &Packet) -> CodecResult<Vec<u8>> {
        let mut w = Writer::tagged(TAG_PACKET);
        w.put_uuid(packet.uuid);
        w.put_i16(packet.kind.as_i16());
        w.put_map(&packet.meta);
        w.put_map(&packet.body);
        Ok(w.finish())
    }

    fn decode_packet(&self, bytes: &[u8]) -> CodecResult<Packet> {
        let mut r = Reader::checked(bytes, TAG_PACKET)?;
        let uuid = r.take_uuid()?;
        let kind_raw = r.take_i16()?;
        let kind = PacketKind::from_i32(kind_raw as i32)
            .ok_or(CodecError::BadPacketKind(kind_raw as i32))?;
        let meta = r.take_map()?;
        let body = r.take_map()?;
        r.expect_end()?;
        Ok(Packet {
            uuid,
            kind,
            meta,
            body,
        })
    }

    fn encode_account(&self, spec: &AccountSpec) -> CodecResult<Vec<u8>> {
        let mut w = Writer::tagged(TAG_ACCOUNT);
        w.put_str(&spec.name);
        w.put_opt_uuid(spec.parent);
        Ok(w.finish())
    }

    fn decode_account(&self, bytes: &[u8]) -> CodecResult<AccountSpec> {
        let mut r = Reader::checked(bytes, TAG_ACCOUNT)?;
        let spec = AccountSpec {
            name: r.take_str()?,
            parent: r.take_opt_uuid()?,
        };
        r.expect_end()?;
        Ok(spec)
    }

    fn encode_item(&self, spec: &ItemSpec) -> CodecResult<Vec<u8>> {
        let mut w = Writer::tagged(TAG_ITEM);
        w.put_str(&spec.name);
        w.put_str(&spec.description);
        w.put_str(&spec.unit);
        Ok(w.finish())
    }

    fn decode_item(&self, bytes: &[u8]) -> CodecResult<ItemSpec> {
        let mut r = Reader::checked(bytes, TAG_ITEM)?;
        let spec = ItemSpec {
            name: r.take_str()?,
            description: r.take_str()?,
            unit: r.take_str()?,
        };
        r.expect_end()?;
        Ok(spec)
    }

    fn encode_transaction(&self, input: &TransactionInput) -> CodecResult<Vec<u8>> {
        let mut w = Writer::tagged(TAG_TRANSACTION);
        w.put_str(&input.description);
        w.put_i64(input.datetime_ms);
        w.put_varint(input.lines.len() as u64);
        for line in &input.lines {
            w.put_uuid(line.account);
            w.put_opt_uuid(line.item);
            w.put_i64(line.quantity.raw());
            w.put_str(&line.unit);
            w.put_i64(line.price.raw());
            w.put_str(&line.currency);
            w.put_opt_str(line.note.as_deref());
        }
        Ok(w.finish())
    }

    fn decode_transaction(&self, bytes: &[u8]) -> CodecResult<TransactionInput> {
        let mut r = Reader::checked(bytes, TAG_TRANSACTION)?;
        let description = r.take_str()?;
        let datetime_ms = r.take_i64()?;
        let count = r.take_varint()? as usize;
        let mut lines = Vec::with_capacity(count);
        for _ in 0..count {
            lines.push(LineInput {
                account: r.take_uuid()?,
                item: r.take_opt_uuid()?,
                quantity: Decimal::new(r.take_i64()?),
                unit: r.take_str()?,
                price: Decimal::new(r.take_i64()?),
                currency: r.take_str()?,
                note: r.take_opt_str()?,
            });
        }
        r.expect_end()?;
        Ok(TransactionInput {
            description,
            datetime_ms,
            lines,
        })
    }

    fn encode_market_price(&self, spec: &MarketPriceSpec) -> CodecResult<Vec<u8>> {
        let mut w = Writer::tagged(TAG_MARKET_PRICE);
        w.put_uuid(spec.item);
        w.put_i64(spec.price.raw());
        w.put_str(&spec.unit);
        w.put_str(&spec.currency);
        Ok(w.finish())
    }

    fn decode_market_price(&self, bytes: &[u8]) -> CodecResult<MarketPriceSpec> {
        let mut r = Reader::checked(bytes, TAG_MARKET_PRICE)?;
        let spec = MarketPriceSpec {
            item: r.take_uuid()?,
            price: Decimal::new(r.take_i64()?),
            unit: r.take_str()?,
            currency: r.take_str()?,
        };
        r.expect_end()?;
        Ok(spec)
    }
}

struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn tagged(tag: u8) -> Self {
        Self { buf: vec![tag] }
    }

    fn put_varint(&mut self, mut value: u64) {
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            self.buf.push(byte);
            if value == 0 {
                break;
            }
        }
    }

    fn put_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn put_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    fn put_bytes(&mut self, value: &[u8]) {
        self.put_varint(value.len() as u64);
        self.buf.extend_from_slice(value);
    }

    fn put_str(&mut self, value: &str) {
        self.put_bytes(value.as_bytes());
    }

    fn put_opt_str(&mut self, value: Option<&str>) {
        match value {
            Some(value) => {
                self.buf.push(1);
                self.put_str(value);
            }
            None => self.buf.push(0),
        }
    }

    fn put_uuid(&mut self, value: Uuid) {
        self.buf.extend_from_slice(value.as_bytes());
    }

    fn put_opt_uuid(&mut self, value: Option<Uuid>) {
        match value {
            Some(value) => {
                self.buf.push(1);
                self.put_uuid(value);
            }
            None => self.buf.push(0),
        }
    }

    fn put_map(&mut self, map: &BTreeMap<String, Vec<u8>>) {
        self.put_varint(map.len() as u64);
        for (key, value) in map {
            self.put_str(key);
            self.put_bytes(value);
        }
    }

    /// Append the message-level CRC32 and return the finished message.
    fn finish(mut self) -> Vec<u8> {
        let crc = crc32fast::hash(&self.buf);
        self.buf.extend_from_slice(&crc.to_le_bytes());
        self.buf
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Verify the message CRC and the expected tag, returning a reader over
    /// the field region.
    fn checked(bytes: &'a [u8], expected_tag: u8) -> CodecResult<Self> {
        if bytes.len() < 5 {
            return Err(CodecError::Truncated);
        }
        let (body, crc_bytes) = bytes.split_at(bytes.len() - 4);
        let declared = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        if crc32fast::hash(body) != declared {
            return Err(CodecError::BadChecksum);
        }
        if body[0] != expected_tag {
            return Err(CodecError::BadTag(body[0]));
        }
        Ok(Self { buf: body, pos: 1 })
    }

    fn take(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        if self.pos + len > self.buf.len() {
            return Err(CodecError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_varint(&mut self) -> CodecResult<u64> {
        let mut value = 0u64;
        let mut shift = 0u32;
        loop {
            let byte = self.take(1)?[0];
            value |= u64::from(byte & 0x7F) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
            if shift >= 64 {
                return Err(CodecError::Truncated);
            }
        }
    }

    fn take_i16(&mut self) -> CodecResult<i16> {
        let bytes = self.take(2)?;
        Ok(i16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn take_i64(&mut self) -> CodecResult<i64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(i64::from_le_bytes(raw))
    }

    fn take_bytes(&mut self) -> CodecResult<Vec<u8>> {
        let len = self.take_varint()? as usize;
        Ok(self.take(len)?.to_vec())
    }

    fn take_str(&mut self) -> CodecResult<String> {
        let bytes = self.take_bytes()?;
        String::from_utf8(bytes).map_err(|_| CodecError::InvalidUtf8)
    }

    fn take_opt_str(&mut self) -> CodecResult<Option<String>> {
        match self.take(1)?[0] {
            0 => Ok(None),
            _ => Ok(Some(self.take_str()?)),
        }
    }

    fn take_uuid(&mut self) -> CodecResult<Uuid> {
        let bytes = self.take(16)?;
        Uuid::from_slice(bytes).map_err(|_| CodecError::BadIdentifier(bytes.len()))
    }

    fn take_opt_uuid(&mut self) -> CodecResult<Option<Uuid>> {
        match self.take(1)?[0] {
            0 => Ok(None),
            _ => Ok(Some(self.take_uuid()?)),
        }
    }

    fn take_map(&mut self) -> CodecResult<BTreeMap<String, Vec<u8>>> {
        let count = self.take_varint()? as usize;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = self.take_str()?;
            let value = self.take_bytes()?;
            map.insert(key, value);
        }
        Ok(map)
    }

    fn expect_end(&self) -> CodecResult<()> {
        if self.pos == self.buf.len() {
            Ok(())
        } else {
            Err(CodecError::Truncated)
        }
    }
}
