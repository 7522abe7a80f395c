//! The pluggable body-codec seam.

use tally_core::{AccountSpec, ItemSpec, MarketPriceSpec, TransactionInput};

use crate::{CodecResult, Packet};

/// Marshals the packet envelope and the entity argument messages.
///
/// The dispatcher and client hold a codec as a trait object; everything
/// else operates on the logical values. Implementations must round-trip
/// structurally: `decode(encode(x)) == x`.
pub trait BodyCodec: Send + Sync {
    fn encode_packet(&self, packet: &Packet) -> CodecResult<Vec<u8>>;
    fn decode_packet(&self, bytes: &[u8]) -> CodecResult<Packet>;

    fn encode_account(&self, spec: &AccountSpec) -> CodecResult<Vec<u8>>;
    fn decode_account(&self, bytes: &[u8]) -> CodecResult<AccountSpec>;

    fn encode_item(&self, spec: &ItemSpec) -> CodecResult<Vec<u8>>;
    fn decode_item(&self, bytes: &[u8]) -> CodecResult<ItemSpec>;

    fn encode_transaction(&self, input: &TransactionInput) -> CodecResult<Vec<u8>>;
    fn decode_transaction(&self, bytes: &[u8]) -> CodecResult<TransactionInput>;

    fn encode_market_price(&self, spec: &MarketPriceSpec) -> CodecResult<Vec<u8>>;
    fn decode_market_price(&self, bytes: &[u8]) -> CodecResult<MarketPriceSpec>;
}
