use bytes::Bytes;

/// Header size in bytes
pub const HEADER_BYTES: usize = 1;
/// CRC size in bytes
pub const CRC_BYTES: usize = 2;
/// Largest value of the 6-bit length/id field
pub const FIELD_MAX: u8 = 0x3F;

const TAG_SHIFT: u32 = 6;

/// Frame role within a packet, the top two header bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Whole packet in one frame
    Single = 0,
    /// First fragment
    Begin = 1,
    /// Middle fragment
    Frag = 2,
    /// Last fragment
    End = 3,
}

/// Decoded air frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameHeader {
    /// Complete packet of `len` bytes
    Single { len: u8 },
    /// First fragment, `id` fragments follow
    Begin { id: u8 },
    /// Middle fragment with countdown `id`
    Frag { id: u8 },
    /// Last fragment carrying `len` bytes
    End { len: u8 },
}

impl FrameHeader {
    /// Parses a header byte, every tag value is defined
    pub fn from_byte(byte: u8) -> Self {
        let field = byte & FIELD_MAX;
        match byte >> TAG_SHIFT {
            0 => FrameHeader::Single { len: field },
            1 => FrameHeader::Begin { id: field },
            2 => FrameHeader::Frag { id: field },
            _ => FrameHeader::End { len: field },
        }
    }

    /// Packs the header into a byte
    pub fn to_byte(self) -> u8 {
        let (kind, field) = match self {
            FrameHeader::Single { len } => (FrameKind::Single, len),
            FrameHeader::Begin { id } => (FrameKind::Begin, id),
            FrameHeader::Frag { id } => (FrameKind::Frag, id),
            FrameHeader::End { len } => (FrameKind::End, len),
        };
        debug_assert!(field <= FIELD_MAX);
        ((kind as u8) << TAG_SHIFT) | (field & FIELD_MAX)
    }

    /// Frame role
    pub fn kind(self) -> FrameKind {
        match self {
            FrameHeader::Single { .. } => FrameKind::Single,
            FrameHeader::Begin { .. } => FrameKind::Begin,
            FrameHeader::Frag { .. } => FrameKind::Frag,
            FrameHeader::End { .. } => FrameKind::End,
        }
    }
}

/// One fixed-size frame as handed to the modem
///
/// Layout is `header | payload (zero padded) | crc16 (big endian)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AirFrame(Bytes);

impl AirFrame {
    pub(crate) fn from_bytes(bytes: Bytes) -> Self {
        debug_assert!(bytes.len() > HEADER_BYTES + CRC_BYTES);
        AirFrame(bytes)
    }

    /// Parsed header
    pub fn header(&self) -> FrameHeader {
        FrameHeader::from_byte(self.0[0])
    }

    /// Full payload region including padding
    pub fn payload(&self) -> &[u8] {
        &self.0[HEADER_BYTES..self.0.len() - CRC_BYTES]
    }

    /// Payload bytes that carry data
    pub fn data(&self) -> &[u8] {
        let len = match self.header() {
            FrameHeader::Single { len } | FrameHeader::End { len } => usize::from(len),
            FrameHeader::Begin { .. } | FrameHeader::Frag { .. } => self.payload().len(),
        };
        &self.payload()[..len.min(self.payload().len())]
    }

    /// Region covered by the CRC
    pub fn checked_region(&self) -> &[u8] {
        &self.0[..self.0.len() - CRC_BYTES]
    }

    /// Trailing CRC
    pub fn crc(&self) -> u16 {
        let n = self.0.len();
        u16::from_be_bytes([self.0[n - 2], self.0[n - 1]])
    }

    /// Raw frame bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Frame size in bytes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}
