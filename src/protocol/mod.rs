//! LightwaveRF link protocol
//!
//! This module parses inbound command datagrams and renders the replies
//! and status notifications sent back to link clients.

pub mod codec;
pub mod parser;
pub mod response;

pub use self::codec::{LinkCodec, Reply};
pub use self::parser::{parse, MessageBody, ParsedCommand, ParsedMessage};
pub use self::response::{
    format_simple, format_status, ErrorCode, Response, ResponseSequence, Status,
    StatusNotification,
};
