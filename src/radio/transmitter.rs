use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::{Error, Result};
use super::packet::RadioPacket;

/// Sink that puts radio packets on the air
#[async_trait]
pub trait Transmitter: Send {
    /// Transmits a packet `repeat` times
    async fn transmit(&mut self, packet: &RadioPacket, repeat: u32) -> Result<()>;

    /// Releases the hardware and waits for it to settle
    async fn shutdown(&mut self) -> Result<()>;
}

/// Transmitter that logs packets instead of driving a GPIO pin
#[derive(Debug)]
pub struct DryRunTransmitter {
    gpio_pin: u8,
    settle_delay: Duration,
    open: bool,
    sent: u64,
}

impl DryRunTransmitter {
    pub fn new(gpio_pin: u8, settle_delay: Duration) -> Self {
        DryRunTransmitter {
            gpio_pin,
            settle_delay,
            open: true,
            sent: 0,
        }
    }

    /// Number of packets transmitted so far
    pub fn sent(&self) -> u64 {
        self.sent
    }

    pub fn is_open(&self) -> bool {
        self.open
    }
}

#[async_trait]
impl Transmitter for DryRunTransmitter {
    async fn transmit(&mut self, packet: &RadioPacket, repeat: u32) -> Result<()> {
        if !self.open {
            return Err(Error::hardware(format!(
                "Transmitter on GPIO {} is closed",
                self.gpio_pin
            )));
        }
        info!(gpio = self.gpio_pin, repeat, packet = %packet, "dry-run transmit");
        self.sent += 1;
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        debug!(gpio = self.gpio_pin, delay = ?self.settle_delay, "transmitter closed, settling");
        tokio::time::sleep(self.settle_delay).await;
        Ok(())
    }
}
