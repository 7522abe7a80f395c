//! Wire frame codec: `magic | length | payload | crc32`, little-endian,
//! and the stateful reframer that reassembles frames from arbitrary byte
//! chunks.

/// Frame preamble.
pub const MAGIC: [u8; 2] = [0xA0, 0xA1];

/// Bytes of framing around the payload: magic (2) + length (4) + crc (4).
pub const FRAME_OVERHEAD: usize = 10;

/// One reassembled frame: the declared total length, the payload slice,
/// and the verified checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameWrapper {
    pub length: u32,
    pub payload: Vec<u8>,
    pub checksum: u32,
}

/// Wrap a payload: `magic || len_le32 || payload || crc32_le32`, where the
/// length counts the whole frame and the CRC covers everything before it.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let total = FRAME_OVERHEAD + payload.len();
    let mut frame = Vec::with_capacity(total);
    frame.extend_from_slice(&MAGIC);
    frame.extend_from_slice(&(total as u32).to_le_bytes());
    frame.extend_from_slice(payload);
    let crc = crc32fast::hash(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Stateful reframer. Feed it bytes in any chunking; it emits complete,
/// checksum-verified frames in stream order and resynchronises on junk by
/// scanning for the magic byte-by-byte. Corrupt frames are dropped, never
/// surfaced.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, incoming: &[u8]) -> Vec<FrameWrapper> {
        self.buf.extend_from_slice(incoming);
        let mut frames = Vec::new();

        loop {
            if self.buf.len() < FRAME_OVERHEAD {
                break;
            }
            if self.buf[..2] != MAGIC {
                // Desynchronised: discard one byte and rescan.
                self.buf.drain(..1);
                continue;
            }
            let length = u32::from_le_bytes([self.buf[2], self.buf[3], self.buf[4], self.buf[5]])
                as usize;
            if length < FRAME_OVERHEAD {
                // Malformed length; discard the magic and rescan.
                self.buf.drain(..2);
                continue;
            }
            if self.buf.len() < length {
                break;
            }
            let declared = u32::from_le_bytes([
                self.buf[length - 4],
                self.buf[length - 3],
                self.buf[length - 2],
                self.buf[length - 1],
            ]);
            let computed = crc32fast::hash(&self.buf[..length - 4]);
            if computed != declared {
                self.buf.drain(..length);
                continue;
            }
            frames.push(FrameWrapper {
                length: length as u32,
                payload: self.buf[6..length - 4].to_vec(),
                checksum: declared,
            });
            self.buf.drain(..length);
        }

        frames
    }
}
