//! Over-the-air fragmentation
//!
//! Host packets are cut into the modem's fixed-size frames. A packet that fits
//! one frame goes out as SINGLE. Longer packets go out as BEGIN, zero or more
//! FRAG and a final END. BEGIN carries `fragments - 1` and every following
//! frame counts down by one, END standing for id 0, so the receiver notices a
//! missing frame in the middle of the run.

use bytes::{BufMut, Bytes, BytesMut};

use crate::core::{Error, Result};
use crate::util::hex_dump;
use super::frame::{AirFrame, FrameHeader, FrameKind, CRC_BYTES, FIELD_MAX, HEADER_BYTES};

/// Largest number of fragments the 6-bit countdown can express
pub const MAX_FRAGMENTS: usize = FIELD_MAX as usize + 1;

/// Counters for the receive side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AirStats {
    /// Packets handed up
    pub completed: u64,
    /// Reassemblies abandoned on a sequencing violation
    pub losses: u64,
    /// Frames with an impossible header field
    pub invalid: u64,
}

/// Progress of a multi-frame packet
#[derive(Debug)]
pub struct ReassemblyState {
    /// Role of the last accepted frame
    last_tag: FrameKind,
    /// Countdown id of the last accepted frame
    last_id: u8,
    /// Payload collected so far
    accumulated: BytesMut,
}

impl ReassemblyState {
    fn new(capacity: usize) -> Self {
        ReassemblyState {
            last_tag: FrameKind::Single,
            last_id: 0,
            accumulated: BytesMut::with_capacity(capacity),
        }
    }

    /// Whether a packet is partly collected
    pub fn in_progress(&self) -> bool {
        matches!(self.last_tag, FrameKind::Begin | FrameKind::Frag)
    }

    /// Countdown id of the last accepted fragment
    pub fn last_id(&self) -> u8 {
        self.last_id
    }

    /// Bytes collected so far
    pub fn accumulated_len(&self) -> usize {
        self.accumulated.len()
    }

    fn reset(&mut self) {
        self.last_tag = FrameKind::Single;
        self.last_id = 0;
        self.accumulated.clear();
    }
}

/// Fragmenter and reassembler for one modem frame geometry
#[derive(Debug)]
pub struct AirFramer {
    /// Total frame size in bytes
    frame_bytes: usize,
    /// Payload bytes per frame
    payload_bytes: usize,
    /// Receive-side state
    reassembly: ReassemblyState,
    /// Receive-side counters
    stats: AirStats,
}

impl AirFramer {
    /// Creates a framer for frames of `frame_bytes` bytes
    ///
    /// The 6-bit length field caps the usable payload at 63 bytes; larger
    /// frames are zero padded past that point.
    pub fn new(frame_bytes: usize) -> Result<Self> {
        if frame_bytes < HEADER_BYTES + 1 + CRC_BYTES {
            return Err(Error::modem(format!(
                "frame of {} bytes cannot carry header, payload and CRC",
                frame_bytes
            )));
        }

        let payload_bytes = (frame_bytes - HEADER_BYTES - CRC_BYTES).min(usize::from(FIELD_MAX));
        if payload_bytes < frame_bytes - HEADER_BYTES - CRC_BYTES {
            tracing::debug!(frame_bytes, payload_bytes, "payload capped by header length field");
        }

        Ok(AirFramer {
            frame_bytes,
            payload_bytes,
            reassembly: ReassemblyState::new(payload_bytes * MAX_FRAGMENTS),
            stats: AirStats::default(),
        })
    }

    /// Total frame size in bytes
    pub fn frame_bytes(&self) -> usize {
        self.frame_bytes
    }

    /// Payload bytes per frame
    pub fn payload_bytes(&self) -> usize {
        self.payload_bytes
    }

    /// Largest packet that fits the fragment countdown
    pub fn max_packet_len(&self) -> usize {
        self.payload_bytes * MAX_FRAGMENTS
    }

    /// Number of frames a packet of `len` bytes needs
    pub fn fragment_count(&self, len: usize) -> usize {
        (len + self.payload_bytes - 1) / self.payload_bytes
    }

    /// Receive-side counters
    pub fn stats(&self) -> AirStats {
        self.stats
    }

    /// Reassembly progress
    pub fn reassembly(&self) -> &ReassemblyState {
        &self.reassembly
    }

    /// Checks that a packet can be sent
    pub fn check_len(&self, len: usize) -> Result<()> {
        if len == 0 {
            return Err(Error::protocol("empty packet"));
        }
        if len > self.max_packet_len() {
            return Err(Error::PacketTooLarge {
                len,
                max: self.max_packet_len(),
            });
        }
        Ok(())
    }

    /// Splits a packet into frames, sealing each with `crc`
    pub fn encode<'a, C>(&self, packet: &'a [u8], crc: C) -> Result<Fragments<'a, C>>
    where
        C: Fn(&[u8]) -> u16,
    {
        self.check_len(packet.len())?;

        Ok(Fragments {
            packet,
            frame_bytes: self.frame_bytes,
            payload_bytes: self.payload_bytes,
            total: self.fragment_count(packet.len()),
            index: 0,
            crc,
        })
    }

    /// Feeds one demodulated frame, returning a packet when one completes
    ///
    /// The CRC is not checked here: frames only arrive once the demodulator
    /// has accepted them.
    pub fn decode(&mut self, frame: &[u8]) -> Option<Bytes> {
        if frame.len() < HEADER_BYTES + self.payload_bytes {
            self.stats.invalid += 1;
            tracing::warn!(len = frame.len(), "short air frame dropped");
            return None;
        }

        let payload = &frame[HEADER_BYTES..HEADER_BYTES + self.payload_bytes];
        let header = FrameHeader::from_byte(frame[0]);
        tracing::trace!(?header, "air frame");

        match header {
            FrameHeader::Single { len } => {
                let len = usize::from(len);
                if len == 0 || len > self.payload_bytes {
                    self.stats.invalid += 1;
                    tracing::warn!(len, "invalid SINGLE length");
                    return None;
                }
                self.complete(Bytes::copy_from_slice(&payload[..len]))
            }

            FrameHeader::Begin { id } => {
                if self.reassembly.in_progress() {
                    self.lost("BEGIN interrupted a packet", id);
                }
                if id == 0 {
                    self.stats.invalid += 1;
                    tracing::warn!("BEGIN without following fragments");
                    return None;
                }
                self.reassembly.last_tag = FrameKind::Begin;
                self.reassembly.last_id = id;
                self.reassembly.accumulated.clear();
                self.reassembly.accumulated.put_slice(payload);
                None
            }

            FrameHeader::Frag { id } => {
                if !self.expects(id) {
                    self.lost("FRAG out of sequence", id);
                    return None;
                }
                if !self.append(payload) {
                    return None;
                }
                self.reassembly.last_tag = FrameKind::Frag;
                self.reassembly.last_id = id;
                None
            }

            FrameHeader::End { len } => {
                if !self.expects(0) {
                    self.lost("END out of sequence", 0);
                    return None;
                }
                let len = usize::from(len);
                if len == 0 || len > self.payload_bytes {
                    self.stats.invalid += 1;
                    tracing::warn!(len, "invalid END length");
                    self.reassembly.reset();
                    return None;
                }
                if !self.append(&payload[..len]) {
                    return None;
                }
                let packet = self.reassembly.accumulated.split().freeze();
                self.reassembly.reset();
                self.complete(packet)
            }
        }
    }

    /// Drops any partly collected packet
    pub fn reset(&mut self) {
        self.reassembly.reset();
    }

    fn expects(&self, id: u8) -> bool {
        self.reassembly.in_progress() && self.reassembly.last_id.checked_sub(1) == Some(id)
    }

    fn append(&mut self, chunk: &[u8]) -> bool {
        if self.reassembly.accumulated.len() + chunk.len() > self.max_packet_len() {
            self.lost("reassembly exceeds packet limit", self.reassembly.last_id);
            return false;
        }
        self.reassembly.accumulated.put_slice(chunk);
        true
    }

    fn lost(&mut self, reason: &'static str, id: u8) {
        self.stats.losses += 1;
        tracing::warn!(
            reason,
            id,
            last_tag = ?self.reassembly.last_tag,
            last_id = self.reassembly.last_id,
            discarded = self.reassembly.accumulated.len(),
            "fragment sequence lost"
        );
        self.reassembly.reset();
    }

    fn complete(&mut self, packet: Bytes) -> Option<Bytes> {
        self.stats.completed += 1;
        tracing::debug!(len = packet.len(), data = %hex_dump(&packet), "air packet received");
        Some(packet)
    }
}

/// Lazy sequence of frames for one packet
pub struct Fragments<'a, C> {
    packet: &'a [u8],
    frame_bytes: usize,
    payload_bytes: usize,
    total: usize,
    index: usize,
    crc: C,
}

impl<'a, C> Fragments<'a, C> {
    fn header(&self, chunk_len: usize) -> FrameHeader {
        let last = self.total - 1;
        if self.total == 1 {
            FrameHeader::Single { len: chunk_len as u8 }
        } else if self.index == 0 {
            FrameHeader::Begin { id: last as u8 }
        } else if self.index < last {
            FrameHeader::Frag { id: (last - self.index) as u8 }
        } else {
            FrameHeader::End { len: chunk_len as u8 }
        }
    }
}

impl<'a, C> Iterator for Fragments<'a, C>
where
    C: Fn(&[u8]) -> u16,
{
    type Item = AirFrame;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.total {
            return None;
        }

        let start = self.index * self.payload_bytes;
        let end = (start + self.payload_bytes).min(self.packet.len());
        let chunk = &self.packet[start..end];

        let mut frame = BytesMut::zeroed(self.frame_bytes);
        frame[0] = self.header(chunk.len()).to_byte();
        frame[HEADER_BYTES..HEADER_BYTES + chunk.len()].copy_from_slice(chunk);

        let crc_at = self.frame_bytes - CRC_BYTES;
        let crc = (self.crc)(&frame[..crc_at]);
        frame[crc_at..].copy_from_slice(&crc.to_be_bytes());

        self.index += 1;
        Some(AirFrame::from_bytes(frame.freeze()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.total - self.index;
        (left, Some(left))
    }
}

impl<'a, C> ExactSizeIterator for Fragments<'a, C> where C: Fn(&[u8]) -> u16 {}

#[cfg(test)]
mod tests {
    use super::*;

    /// 10 payload bytes per frame
    const FRAME: usize = 13;

    fn xor_crc(bytes: &[u8]) -> u16 {
        bytes.iter().fold(0u16, |acc, &b| acc.rotate_left(3) ^ u16::from(b))
    }

    fn packet(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 + 1) as u8).collect()
    }

    fn frames(framer: &AirFramer, data: &[u8]) -> Vec<AirFrame> {
        framer.encode(data, xor_crc).unwrap().collect()
    }

    #[test]
    fn test_geometry() {
        let framer = AirFramer::new(FRAME).unwrap();
        assert_eq!(framer.payload_bytes(), 10);
        assert_eq!(framer.max_packet_len(), 640);

        let wide = AirFramer::new(510).unwrap();
        assert_eq!(wide.payload_bytes(), 63);

        assert!(AirFramer::new(3).is_err());
    }

    #[test]
    fn test_single_frame() {
        let mut framer = AirFramer::new(FRAME).unwrap();
        let data = packet(7);
        let out = frames(&framer, &data);

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].header(), FrameHeader::Single { len: 7 });
        assert_eq!(out[0].len(), FRAME);
        assert_eq!(&out[0].payload()[7..], &[0, 0, 0]);
        assert_eq!(out[0].crc(), xor_crc(out[0].checked_region()));

        assert_eq!(framer.decode(out[0].as_bytes()), Some(Bytes::from(data)));
        assert!(!framer.reassembly().in_progress());
    }

    #[test]
    fn test_countdown_scenario() {
        // 35 bytes at 10 per frame: BEGIN 3, FRAG 2, FRAG 1, END with 5 bytes
        let framer = AirFramer::new(FRAME).unwrap();
        let out = frames(&framer, &packet(35));
        let headers: Vec<FrameHeader> = out.iter().map(AirFrame::header).collect();
        assert_eq!(
            headers,
            vec![
                FrameHeader::Begin { id: 3 },
                FrameHeader::Frag { id: 2 },
                FrameHeader::Frag { id: 1 },
                FrameHeader::End { len: 5 },
            ]
        );
        assert_eq!(out[3].data(), &packet(35)[30..]);
    }

    #[test]
    fn test_multi_frame_reassembly() {
        let mut framer = AirFramer::new(FRAME).unwrap();
        let data = packet(35);
        let out = frames(&framer, &data);

        let last = out.len() - 1;
        for frame in &out[..last] {
            assert_eq!(framer.decode(frame.as_bytes()), None);
        }
        assert_eq!(framer.decode(out[last].as_bytes()), Some(Bytes::from(data)));
        assert_eq!(framer.stats().completed, 1);
        assert_eq!(framer.stats().losses, 0);
    }

    #[test]
    fn test_exact_multiple_of_payload() {
        let mut framer = AirFramer::new(FRAME).unwrap();
        let data = packet(20);
        let out = frames(&framer, &data);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].header(), FrameHeader::Begin { id: 1 });
        assert_eq!(out[1].header(), FrameHeader::End { len: 10 });

        assert_eq!(framer.decode(out[0].as_bytes()), None);
        assert_eq!(framer.decode(out[1].as_bytes()), Some(Bytes::from(data)));
    }

    #[test]
    fn test_dropped_fragment_resets() {
        let mut framer = AirFramer::new(FRAME).unwrap();
        let out = frames(&framer, &packet(45));
        assert_eq!(out.len(), 5);

        // Lose FRAG id 2
        for (i, frame) in out.iter().enumerate() {
            if i == 2 {
                continue;
            }
            assert_eq!(framer.decode(frame.as_bytes()), None);
        }
        assert_eq!(framer.stats().completed, 0);
        assert!(framer.stats().losses >= 1);
        assert!(!framer.reassembly().in_progress());
    }

    #[test]
    fn test_end_before_countdown_reaches_zero() {
        let mut framer = AirFramer::new(FRAME).unwrap();
        let out = frames(&framer, &packet(35));

        framer.decode(out[0].as_bytes());
        framer.decode(out[1].as_bytes());
        assert_eq!(framer.decode(out[3].as_bytes()), None);
        assert_eq!(framer.stats().losses, 1);
        assert_eq!(framer.reassembly().accumulated_len(), 0);
    }

    #[test]
    fn test_fragments_without_begin() {
        let mut framer = AirFramer::new(FRAME).unwrap();
        let out = frames(&framer, &packet(35));

        assert_eq!(framer.decode(out[1].as_bytes()), None);
        assert_eq!(framer.decode(out[2].as_bytes()), None);
        assert_eq!(framer.decode(out[3].as_bytes()), None);
        assert_eq!(framer.stats().losses, 3);
        assert_eq!(framer.stats().completed, 0);
    }

    #[test]
    fn test_recovers_on_next_begin() {
        let mut framer = AirFramer::new(FRAME).unwrap();
        let first = frames(&framer, &packet(35));
        let second_data = packet(25);
        let second = frames(&framer, &second_data);

        framer.decode(first[0].as_bytes());
        framer.decode(first[1].as_bytes());

        let mut completed = None;
        for frame in &second {
            completed = framer.decode(frame.as_bytes());
        }
        assert_eq!(completed, Some(Bytes::from(second_data)));
        assert_eq!(framer.stats().losses, 1);
    }

    #[test]
    fn test_single_between_fragments_leaves_reassembly() {
        let mut framer = AirFramer::new(FRAME).unwrap();
        let long = packet(25);
        let long_frames = frames(&framer, &long);
        let short = frames(&framer, &[0xAB, 0xCD]);

        framer.decode(long_frames[0].as_bytes());
        assert_eq!(
            framer.decode(short[0].as_bytes()),
            Some(Bytes::from_static(&[0xAB, 0xCD]))
        );
        framer.decode(long_frames[1].as_bytes());
        assert_eq!(framer.decode(long_frames[2].as_bytes()), Some(Bytes::from(long)));
    }

    #[test]
    fn test_size_limits() {
        let framer = AirFramer::new(FRAME).unwrap();
        assert!(framer.encode(&[], xor_crc).is_err());
        assert!(matches!(
            framer.encode(&packet(641), xor_crc),
            Err(Error::PacketTooLarge { len: 641, max: 640 })
        ));

        let out = frames(&framer, &packet(640));
        assert_eq!(out.len(), 64);
        assert_eq!(out[0].header(), FrameHeader::Begin { id: 63 });
    }

    #[test]
    fn test_largest_packet_reassembles() {
        let mut framer = AirFramer::new(FRAME).unwrap();
        let data = packet(640);
        let completed: Vec<Bytes> = frames(&framer, &data)
            .iter()
            .filter_map(|f| framer.decode(f.as_bytes()))
            .collect();
        assert_eq!(completed, vec![Bytes::from(data)]);
    }

    #[test]
    fn test_invalid_lengths_rejected() {
        let mut framer = AirFramer::new(FRAME).unwrap();
        let mut frame = vec![0u8; FRAME];

        frame[0] = FrameHeader::Single { len: 0 }.to_byte();
        assert_eq!(framer.decode(&frame), None);

        frame[0] = FrameHeader::Single { len: 11 }.to_byte();
        assert_eq!(framer.decode(&frame), None);

        assert_eq!(framer.decode(&frame[..5]), None);
        assert_eq!(framer.stats().invalid, 3);
    }
}
