//! Protocol implementation module
//!
//! Host link byte stuffing, the air frame layout and the fragmentation
//! protocol that maps host packets onto modem frames.

pub mod air;
pub mod codec;
pub mod frame;

pub use self::air::{AirFramer, AirStats, Fragments, ReassemblyState, MAX_FRAGMENTS};
pub use self::codec::HostFramer;
pub use self::frame::{AirFrame, FrameHeader, FrameKind};
