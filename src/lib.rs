//! piwaverf: a LightwaveRF hub for the Raspberry Pi
//!
//! This library listens for the LightwaveRF link protocol on UDP, answers each
//! command straight away, and hands the matching 433MHz packet to a single
//! transmitter worker.
pub mod core;

pub mod network;
pub mod protocol;
pub mod radio;
mod util;

// Re-export commonly used items
pub use crate::core::{
    Command, Error, HubConfig, LogicalAddress, RadioAddress, Result, TransmitterId,
};
pub use crate::network::{Hub, HubState, ShutdownHandle};
pub use crate::radio::{DryRunTransmitter, RadioPacket, Transmitter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
