//! Core types for the LightwaveRF bridge
//!
//! This module contains the addressing, command and configuration types used
//! throughout the library.

pub mod error;
pub mod types;
pub mod serde;

use std::time::Duration;

pub use self::error::{Error, Result};
pub use self::types::{
    Command,
    HubConfig,
    LogicalAddress,
    RadioAddress,
    TransmitterId,
};

/// Default port the link protocol is received on
pub const DEFAULT_PORT: u16 = 9760;

/// Default port replies are sent to
pub const DEFAULT_REPLY_PORT: u16 = 9671;

/// Placeholder MAC identity
pub const DEFAULT_MAC: &str = "00:00:00:00:00:00";

/// Default GPIO pin driving the 433MHz transmitter
pub const DEFAULT_GPIO_PIN: u8 = 18;

/// Default number of repeats per radio packet
pub const DEFAULT_REPEAT: u32 = 12;

/// Default radio queue capacity
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

/// Time the transmitter hardware needs after closing
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Maximum datagram size in bytes
pub const MAX_DATAGRAM_SIZE: usize = 1024;
