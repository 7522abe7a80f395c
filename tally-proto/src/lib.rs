//! Wire protocol for the tally RPC surface: the logical packet value, the
//! checksum-protected frame codec, and the pluggable body codecs.

mod codec;
mod compact;
mod error;
mod frame;
mod packet;
mod pb;

pub use codec::BodyCodec;
pub use compact::CompactCodec;
pub use error::{CodecError, CodecResult};
pub use frame::{encode_frame, FrameBuffer, FrameWrapper, FRAME_OVERHEAD, MAGIC};
pub use packet::{code, Packet, PacketKind};
pub use pb::ProtoCodec;
