use std::fmt;
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Error, Result};

/// Number of hex digits in a transmitter id
pub const TRANSMITTER_ID_LEN: usize = 5;

/// Highest 1-based room number on the link protocol
pub const MAX_ROOM: u8 = 8;

/// Highest 1-based device number on the link protocol
pub const MAX_DEVICE: u8 = 15;

/// Highest dim level accepted on the link protocol
pub const MAX_DIM_LEVEL: u8 = 31;

/// Identity burned into every outgoing radio packet, five hex digits
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransmitterId {
    text: String,
    digits: [u8; TRANSMITTER_ID_LEN],
}

impl TransmitterId {
    /// Validates and creates a transmitter id
    pub fn new(text: &str) -> Result<Self> {
        if text.chars().count() != TRANSMITTER_ID_LEN {
            return Err(Error::validation(format!(
                "Transmitter ID must be five hex characters, found: {}",
                text
            )));
        }

        let mut digits = [0u8; TRANSMITTER_ID_LEN];
        for (slot, c) in digits.iter_mut().zip(text.chars()) {
            *slot = c.to_digit(16).ok_or_else(|| {
                Error::validation(format!("Transmitter ID contains non-hex character {:?}", c))
            })? as u8;
        }

        Ok(TransmitterId {
            text: text.to_string(),
            digits,
        })
    }

    /// Hex digit values in transmission order
    pub fn digits(&self) -> &[u8; TRANSMITTER_ID_LEN] {
        &self.digits
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

impl FromStr for TransmitterId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        TransmitterId::new(s)
    }
}

impl TryFrom<String> for TransmitterId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        TransmitterId::new(&value)
    }
}

impl From<TransmitterId> for String {
    fn from(id: TransmitterId) -> Self {
        id.text
    }
}

impl fmt::Display for TransmitterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Light command as carried on the link protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Off = 0,
    On = 1,
    /// Carries a level argument; 0 behaves as off
    Dim = 2,
}

impl Command {
    /// Numeric command code
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Name used in status notifications
    pub fn name(self) -> &'static str {
        match self {
            Command::Off => "off",
            Command::On => "on",
            Command::Dim => "dim",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 1-based room/device pair used on the UDP side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogicalAddress {
    room: u8,
    device: u8,
}

impl LogicalAddress {
    /// Validates a room in 1..=8 and device in 1..=15
    pub fn new(room: u8, device: u8) -> Result<Self> {
        if !(1..=MAX_ROOM).contains(&room) {
            return Err(Error::validation(format!(
                "Room {} outside 1..={}",
                room, MAX_ROOM
            )));
        }
        if !(1..=MAX_DEVICE).contains(&device) {
            return Err(Error::validation(format!(
                "Device {} outside 1..={}",
                device, MAX_DEVICE
            )));
        }
        Ok(LogicalAddress { room, device })
    }

    pub fn room(&self) -> u8 {
        self.room
    }

    pub fn device(&self) -> u8 {
        self.device
    }

    /// Converts to the 0-based numbering used inside radio packets
    pub fn to_radio(self) -> RadioAddress {
        RadioAddress {
            room: self.room - 1,
            device: self.device - 1,
        }
    }
}

/// 0-based room/device pair used inside radio packets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RadioAddress {
    room: u8,
    device: u8,
}

impl RadioAddress {
    /// Validates a room in 0..=7 and device in 0..=14
    pub fn new(room: u8, device: u8) -> Result<Self> {
        LogicalAddress::new(room.saturating_add(1), device.saturating_add(1))
            .map(LogicalAddress::to_radio)
    }

    pub fn room(&self) -> u8 {
        self.room
    }

    pub fn device(&self) -> u8 {
        self.device
    }
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    super::DEFAULT_PORT
}

fn default_reply_port() -> u16 {
    super::DEFAULT_REPLY_PORT
}

fn default_mac() -> String {
    super::DEFAULT_MAC.to_string()
}

fn default_gpio_pin() -> u8 {
    super::DEFAULT_GPIO_PIN
}

fn default_repeat() -> u32 {
    super::DEFAULT_REPEAT
}

fn default_queue_depth() -> usize {
    super::DEFAULT_QUEUE_DEPTH
}

fn default_settle_delay() -> Duration {
    super::DEFAULT_SETTLE_DELAY
}

/// Configuration for the hub
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Local address to bind to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,
    /// Port commands are received on
    #[serde(default = "default_port")]
    pub port: u16,
    /// Port replies are sent to on the sender's address
    #[serde(default = "default_reply_port")]
    pub reply_port: u16,
    /// MAC identity reported in status notifications
    #[serde(default = "default_mac")]
    pub mac: String,
    /// Transmitter id placed in every radio packet
    pub transmitter_id: TransmitterId,
    /// GPIO pin handed to the transmitter
    #[serde(default = "default_gpio_pin")]
    pub gpio_pin: u8,
    /// Number of times each radio packet is repeated
    #[serde(default = "default_repeat")]
    pub repeat: u32,
    /// First value of the notification sequence
    #[serde(default)]
    pub initial_sequence: u64,
    /// Capacity of the radio send queue
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Delay the transmitter waits after closing
    #[serde(default = "default_settle_delay")]
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub settle_delay: Duration,
}

impl HubConfig {
    /// Creates a configuration with defaults for everything but the transmitter id
    pub fn new(transmitter_id: TransmitterId) -> Self {
        HubConfig {
            bind_addr: default_bind_addr(),
            port: default_port(),
            reply_port: default_reply_port(),
            mac: default_mac(),
            transmitter_id,
            gpio_pin: default_gpio_pin(),
            repeat: default_repeat(),
            initial_sequence: 0,
            queue_depth: default_queue_depth(),
            settle_delay: default_settle_delay(),
        }
    }

    /// Checks the settings that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.repeat == 0 {
            return Err(Error::config("Repeat count must be at least 1"));
        }
        if self.queue_depth == 0 {
            return Err(Error::config("Queue depth must be at least 1"));
        }
        if self.reply_port == 0 {
            return Err(Error::config("Reply port must not be 0"));
        }
        Ok(())
    }
}
