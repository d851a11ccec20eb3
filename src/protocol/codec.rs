use bytes::{BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::Error;
use super::parser::{parse, ParsedMessage};
use super::response::{format_simple, Response, StatusNotification};

/// Outbound frame
#[derive(Debug, Clone)]
pub enum Reply {
    /// `<id>,OK` / `<id>,ERR,...`
    Simple(Response),
    /// `*!{...}` status notification
    Status(StatusNotification),
}

/// Datagram codec for the link protocol. One datagram is one message.
#[derive(Clone, Default)]
pub struct LinkCodec;

impl LinkCodec {
    /// Creates a new link codec
    pub fn new() -> Self {
        LinkCodec
    }
}

impl Decoder for LinkCodec {
    type Item = ParsedMessage;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }

        // Take the whole datagram
        let datagram = src.split();
        Ok(Some(parse(&datagram)))
    }
}

impl Encoder<Reply> for LinkCodec {
    type Error = Error;

    fn encode(&mut self, item: Reply, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let text = match item {
            Reply::Simple(response) => format_simple(&response),
            Reply::Status(notification) => notification.render()?,
        };
        dst.reserve(text.len());
        dst.put_slice(text.as_bytes());
        Ok(())
    }
}
