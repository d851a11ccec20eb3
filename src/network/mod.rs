//! UDP side of the bridge
//!
//! This module owns the link protocol socket and the hub that dispatches
//! each datagram to the radio.

mod hub;
mod socket;

pub use self::hub::{Hub, HubState, ShutdownHandle};
pub use self::socket::bind_udp;
