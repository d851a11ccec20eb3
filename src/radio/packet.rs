use std::fmt;

use crate::core::{Command, Error, LogicalAddress, RadioAddress, Result, TransmitterId};
use crate::core::types::MAX_DIM_LEVEL;

/// Length of an encoded radio packet in nibbles
pub const PACKET_LEN: usize = 10;

/// Argument offset the radio uses to carry brightness on the On code
pub const DIM_OFFSET: u8 = 127;

/// A fixed-length radio packet, one nibble per byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RadioPacket([u8; PACKET_LEN]);

impl RadioPacket {
    pub fn as_bytes(&self) -> &[u8; PACKET_LEN] {
        &self.0
    }

    /// Resolves a logical command and encodes it
    pub fn build(
        transmitter: &TransmitterId,
        address: LogicalAddress,
        command: Command,
        argument: u8,
    ) -> Result<Self> {
        let radio = RadioCommand::from_logical(command, argument)?;
        Ok(encode(transmitter, address.to_radio(), radio.command, radio.argument))
    }
}

impl AsRef<[u8]> for RadioPacket {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for RadioPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for nibble in self.0 {
            write!(f, "{:x}", nibble)?;
        }
        Ok(())
    }
}

/// Command code and argument as they appear on the radio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioCommand {
    pub command: Command,
    pub argument: u8,
}

impl RadioCommand {
    /// Maps a link protocol command onto the radio's on/off codes.
    ///
    /// The radio has no dim code: a dim level rides on the On code with
    /// `127 + level` as its argument, and level 0 is a plain Off.
    pub fn from_logical(command: Command, argument: u8) -> Result<Self> {
        let (command, argument) = match command {
            Command::Off => (Command::Off, 0),
            Command::On => (Command::On, 0),
            Command::Dim if argument == 0 => (Command::Off, 0),
            Command::Dim if argument <= MAX_DIM_LEVEL => (Command::On, DIM_OFFSET + argument),
            Command::Dim => {
                return Err(Error::validation(format!(
                    "Dim level {} outside 0..={}",
                    argument, MAX_DIM_LEVEL
                )))
            }
        };
        Ok(RadioCommand { command, argument })
    }
}

/// Encodes a packet: argument nibbles, device, command, transmitter digits, room
pub fn encode(
    transmitter: &TransmitterId,
    address: RadioAddress,
    command: Command,
    argument: u8,
) -> RadioPacket {
    let id = transmitter.digits();
    RadioPacket([
        (argument & 0xF0) >> 4,
        argument & 0x0F,
        address.device(),
        command.code(),
        id[0],
        id[1],
        id[2],
        id[3],
        id[4],
        address.room(),
    ])
}
