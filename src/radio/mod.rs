//! 433MHz radio side of the bridge
//!
//! Packet encoding, the transmitter seam, and the single worker that feeds it.

pub mod packet;
pub mod transmitter;
pub mod worker;

pub use self::packet::{encode, RadioCommand, RadioPacket, PACKET_LEN};
pub use self::transmitter::{DryRunTransmitter, Transmitter};
pub use self::worker::{RadioJob, RadioWorker};
