//! FreeDV TNC: a packet terminal node controller over a FreeDV data modem
//!
//! A host connects over TCP and exchanges byte-stuffed packets. Each packet
//! is fragmented into fixed-size modem frames, keyed onto the air behind a
//! carrier sense, and reassembled on the far side.
pub mod core;

pub mod channel;
pub mod device;
pub mod engine;
pub mod network;
pub mod protocol;
pub mod util;

// Re-export commonly used items
pub use core::{Config, Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
