use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::Error;

/// Frame delimiter, opens and closes every host frame
pub const FLAG: u8 = 0x7E;
/// Escape byte, the next byte is masked
pub const ESC: u8 = 0x7D;
/// Mask applied to escaped bytes
pub const ESC_MASK: u8 = 0x20;

/// Byte-stuffing codec for the host link
///
/// Decoding keeps its state between calls since the host stream arrives in
/// arbitrary chunks. A delimiter inside a frame completes it and starts the
/// next one, so back-to-back frames may share a single delimiter.
#[derive(Debug)]
pub struct HostFramer {
    /// Largest packet accepted
    mtu: usize,
    /// Inside a frame
    in_frame: bool,
    /// Previous byte was an escape
    escape: bool,
    /// Packet being collected
    buf: BytesMut,
    /// Frames discarded for exceeding the MTU
    overflows: u64,
}

impl HostFramer {
    /// Creates a framer accepting packets up to `mtu` bytes
    pub fn new(mtu: usize) -> Self {
        HostFramer {
            mtu,
            in_frame: false,
            escape: false,
            buf: BytesMut::with_capacity(mtu),
            overflows: 0,
        }
    }

    /// Maximum packet size
    pub fn mtu(&self) -> usize {
        self.mtu
    }

    /// Number of frames dropped for exceeding the MTU
    pub fn overflows(&self) -> u64 {
        self.overflows
    }

    /// Whether a frame is currently being collected
    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    /// Decodes a chunk of the host stream into the packets it completes
    ///
    /// The iterator is lazy and must be drained: bytes of `bytes` past the
    /// last item taken are never scanned.
    #[must_use = "bytes are only scanned as the iterator is consumed"]
    pub fn decode<'a>(&'a mut self, bytes: &'a [u8]) -> impl Iterator<Item = Bytes> + 'a {
        bytes.iter().filter_map(move |&byte| self.push_byte(byte))
    }

    /// Encodes a packet with delimiters and escaping
    pub fn encode(packet: &[u8]) -> Bytes {
        let mut dst = BytesMut::with_capacity(packet.len() * 2 + 2);
        Self::encode_into(packet, &mut dst);
        dst.freeze()
    }

    fn encode_into(packet: &[u8], dst: &mut BytesMut) {
        dst.reserve(packet.len() * 2 + 2);
        dst.put_u8(FLAG);
        for &byte in packet {
            if byte == FLAG || byte == ESC {
                dst.put_u8(ESC);
                dst.put_u8(byte ^ ESC_MASK);
            } else {
                dst.put_u8(byte);
            }
        }
        dst.put_u8(FLAG);
    }

    fn push_byte(&mut self, byte: u8) -> Option<Bytes> {
        if byte == FLAG {
            let completed = self.in_frame && !self.buf.is_empty();
            self.in_frame = true;
            self.escape = false;
            if completed {
                return Some(self.buf.split().freeze());
            }
            self.buf.clear();
            return None;
        }

        if !self.in_frame {
            return None;
        }

        if byte == ESC {
            self.escape = true;
            return None;
        }

        let byte = if self.escape {
            self.escape = false;
            match byte ^ ESC_MASK {
                FLAG => FLAG,
                ESC => ESC,
                _ => byte,
            }
        } else {
            byte
        };

        if self.buf.len() >= self.mtu {
            self.overflows += 1;
            tracing::warn!(mtu = self.mtu, "host frame exceeds MTU, discarding");
            self.buf.clear();
            self.in_frame = false;
            return None;
        }

        self.buf.put_u8(byte);
        None
    }
}

impl Decoder for HostFramer {
    type Item = Bytes;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        for i in 0..src.len() {
            if let Some(packet) = self.push_byte(src[i]) {
                src.advance(i + 1);
                return Ok(Some(packet));
            }
        }

        // Every byte is now held in the decode state
        src.clear();
        Ok(None)
    }
}

impl Encoder<Bytes> for HostFramer {
    type Error = Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        Self::encode_into(&item, dst);
        Ok(())
    }
}
