//! The schema-compiled body codec: field-numbered tag-length-value messages
//! in the wire layout of the original proto schema, hand-derived with
//! `prost`.

use std::collections::BTreeMap;

use prost::Message;
use tally_core::{AccountSpec, Decimal, ItemSpec, LineInput, MarketPriceSpec, TransactionInput};
use uuid::Uuid;

use crate::{BodyCodec, CodecError, CodecResult, Packet, PacketKind};

#[derive(Clone, PartialEq, Message)]
pub struct PbPacket {
    #[prost(bytes = "vec", tag = "1")]
    pub uuid: Vec<u8>,
    #[prost(int32, tag = "2")]
    pub kind: i32,
    #[prost(btree_map = "string, bytes", tag = "3")]
    pub meta: BTreeMap<String, Vec<u8>>,
    #[prost(btree_map = "string, bytes", tag = "4")]
    pub body: BTreeMap<String, Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PbAccount {
    #[prost(bytes = "vec", tag = "1")]
    pub uuid: Vec<u8>,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub parent_uuid: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PbItem {
    #[prost(bytes = "vec", tag = "1")]
    pub uuid: Vec<u8>,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub description: String,
    #[prost(string, tag = "4")]
    pub unit: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct PbTransactionLine {
    #[prost(bytes = "vec", tag = "1")]
    pub uuid: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub account_uuid: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub item_uuid: Option<Vec<u8>>,
    #[prost(int64, tag = "4")]
    pub quantity: i64,
    #[prost(string, tag = "5")]
    pub unit: String,
    #[prost(int64, tag = "6")]
    pub price: i64,
    #[prost(string, tag = "7")]
    pub currency: String,
    #[prost(string, optional, tag = "8")]
    pub note: Option<String>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PbTransaction {
    #[prost(bytes = "vec", tag = "1")]
    pub uuid: Vec<u8>,
    #[prost(string, tag = "2")]
    pub description: String,
    #[prost(int64, tag = "3")]
    pub datetime_ms: i64,
    #[prost(message, repeated, tag = "4")]
    pub transaction_lines: Vec<PbTransactionLine>,
}

#[derive(Clone, PartialEq, Message)]
pub struct PbMarketPrice {
    #[prost(bytes = "vec", tag = "1")]
    pub item_uuid: Vec<u8>,
    #[prost(int64, tag = "2")]
    pub price: i64,
    #[prost(string, tag = "3")]
    pub unit: String,
    #[prost(string, tag = "4")]
    pub currency: String,
}

fn uuid_from_bytes(bytes: &[u8]) -> CodecResult<Uuid> {
    Uuid::from_slice(bytes).map_err(|_| CodecError::BadIdentifier(bytes.len()))
}

fn opt_uuid_from_bytes(bytes: Option<&Vec<u8>>) -> CodecResult<Option<Uuid>> {
    match bytes {
        Some(bytes) if !bytes.is_empty() => Ok(Some(uuid_from_bytes(bytes)?)),
        _ => Ok(None),
    }
}

fn line_to_proto(line: &LineInput) -> PbTransactionLine {
    PbTransactionLine {
        uuid: Vec::new(),
        account_uuid: line.account.as_bytes().to_vec(),
        item_uuid: line.item.map(|item| item.as_bytes().to_vec()),
        quantity: line.quantity.raw(),
        unit: line.unit.clone(),
        price: line.price.raw(),
        currency: line.currency.clone(),
        note: line.note.clone(),
    }
}

fn line_from_proto(line: &PbTransactionLine) -> CodecResult<LineInput> {
    Ok(LineInput {
        account: uuid_from_bytes(&line.account_uuid)?,
        item: opt_uuid_from_bytes(line.item_uuid.as_ref())?,
        quantity: Decimal::new(line.quantity),
        unit: line.unit.clone(),
        price: Decimal::new(line.price),
        currency: line.currency.clone(),
        note: line.note.clone(),
    })
}

/// The schema-compiled codec. Stateless.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProtoCodec;

impl ProtoCodec {
    pub fn new() -> Self {
        Self
    }
}

impl BodyCodec for ProtoCodec {
    fn encode_packet(&self, packet: &Packet) -> CodecResult<Vec<u8>> {
        let pb = PbPacket {
            uuid: packet.uuid.as_bytes().to_vec(),
            kind: packet.kind.as_i16() as i32,
            meta: packet.meta.clone(),
            body: packet.body.clone(),
        };
        Ok(pb.encode_to_vec())
    }

    fn decode_packet(&self, bytes: &[u8]) -> CodecResult<Packet> {
        let pb = PbPacket::decode(bytes)?;
        Ok(Packet {
            uuid: uuid_from_bytes(&pb.uuid)?,
            kind: PacketKind::from_i32(pb.kind).ok_or(CodecError::BadPacketKind(pb.kind))?,
            meta: pb.meta,
            body: pb.body,
        })
    }

    fn encode_account(&self, spec: &AccountSpec) -> CodecResult<Vec<u8>> {
        let pb = PbAccount {
            uuid: Vec::new(),
            name: spec.name.clone(),
            parent_uuid: spec.parent.map(|parent| parent.as_bytes().to_vec()),
        };
        Ok(pb.encode_to_vec())
    }

    fn decode_account(&self, bytes: &[u8]) -> CodecResult<AccountSpec> {
        let pb = PbAccount::decode(bytes)?;
        Ok(AccountSpec {
            name: pb.name,
            parent: opt_uuid_from_bytes(pb.parent_uuid.as_ref())?,
        })
    }

    fn encode_item(&self, spec: &ItemSpec) -> CodecResult<Vec<u8>> {
        let pb = PbItem {
            uuid: Vec::new(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            unit: spec.unit.clone(),
        };
        Ok(pb.encode_to_vec())
    }

    fn decode_item(&self, bytes: &[u8]) -> CodecResult<ItemSpec> {
        let pb = PbItem::decode(bytes)?;
        Ok(ItemSpec {
            name: pb.name,
            description: pb.description,
            unit: pb.unit,
        })
    }

    fn encode_transaction(&self, input: &TransactionInput) -> CodecResult<Vec<u8>> {
        let pb = PbTransaction {
            uuid: Vec::new(),
            description: input.description.clone(),
            datetime_ms: input.datetime_ms,
            transaction_lines: input.lines.iter().map(line_to_proto).collect(),
        };
        Ok(pb.encode_to_vec())
    }

    fn decode_transaction(&self, bytes: &[u8]) -> CodecResult<TransactionInput> {
        let pb = PbTransaction::decode(bytes)?;
        let lines = pb
            .transaction_lines
            .iter()
            .map(line_from_proto)
            .collect::<CodecResult<Vec<_>>>()?;
        Ok(TransactionInput {
            description: pb.description,
            datetime_ms: pb.datetime_ms,
            lines,
        })
    }

    fn encode_market_price(&self, spec: &MarketPriceSpec) -> CodecResult<Vec<u8>> {
        let pb = PbMarketPrice {
            item_uuid: spec.item.as_bytes().to_vec(),
            price: spec.price.raw(),
            unit: spec.unit.clone(),
            currency: spec.currency.clone(),
        };
        Ok(pb.encode_to_vec())
    }

    fn decode_market_price(&self, bytes: &[u8]) -> CodecResult<MarketPriceSpec> {
        let pb = PbMarketPrice::decode(bytes)?;
        Ok(MarketPriceSpec {
            item: uuid_from_bytes(&pb.item_uuid)?,
            price: Decimal::new(pb.price),
            unit: pb.unit,
            currency: pb.currency,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::new_id;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn packet_round_trip() {
        let codec = ProtoCodec::new();
        let mut pkt = Packet::request(new_id()).with_body("function", b"ApplyTransaction".to_vec());
        pkt.body.insert("arg".into(), vec![9, 8, 7]);

        let bytes = codec.encode_packet(&pkt).unwrap();
        assert_eq!(codec.decode_packet(&bytes).unwrap(), pkt);
    }

    #[test]
    fn bad_uuid_length_is_rejected() {
        let codec = ProtoCodec::new();
        let pb = PbPacket {
            uuid: vec![1, 2, 3],
            kind: 0,
            meta: BTreeMap::new(),
            body: BTreeMap::new(),
        };
        let err = codec.decode_packet(&pb.encode_to_vec()).unwrap_err();
        assert!(matches!(err, CodecError::BadIdentifier(3)));
    }

    #[test]
    fn unknown_packet_kind_is_rejected() {
        let codec = ProtoCodec::new();
        let pb = PbPacket {
            uuid: new_id().as_bytes().to_vec(),
            kind: 7,
            meta: BTreeMap::new(),
            body: BTreeMap::new(),
        };
        let err = codec.decode_packet(&pb.encode_to_vec()).unwrap_err();
        assert!(matches!(err, CodecError::BadPacketKind(7)));
    }

    #[test]
    fn entity_round_trips() {
        let codec = ProtoCodec::new();

        let account = AccountSpec {
            name: "cash".into(),
            parent: Some(new_id()),
        };
        let bytes = codec.encode_account(&account).unwrap();
        assert_eq!(codec.decode_account(&bytes).unwrap(), account);

        let item = ItemSpec {
            name: "steel".into(),
            description: "raw material".into(),
            unit: "kg".into(),
        };
        let bytes = codec.encode_item(&item).unwrap();
        assert_eq!(codec.decode_item(&bytes).unwrap(), item);

        let spec = MarketPriceSpec {
            item: new_id(),
            price: dec("6"),
            unit: "kg".into(),
            currency: "USD".into(),
        };
        let bytes = codec.encode_market_price(&spec).unwrap();
        assert_eq!(codec.decode_market_price(&bytes).unwrap(), spec);
    }

    #[test]
    fn transaction_round_trip_matches_compact_semantics() {
        let codec = ProtoCodec::new();
        let input = TransactionInput::new("complete widgets", 1_757_030_400_000).with_lines(vec![
            LineInput::inventory(new_id(), new_id(), dec("-20"), "kg", dec("5"), "USD"),
            LineInput::financial(new_id(), dec("100"), Decimal::ZERO, "USD").with_note("cash leg"),
        ]);
        let bytes = codec.encode_transaction(&input).unwrap();
        assert_eq!(codec.decode_transaction(&bytes).unwrap(), input);
    }
}
