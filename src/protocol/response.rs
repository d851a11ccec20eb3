use serde::Serialize;

use crate::core::{Command, Error, Result};
use super::parser::ParsedCommand;

/// Packet tag reported in status notifications
pub const PACKET_TAG: &str = "433T";

/// Prefix that marks a status notification frame
pub const STATUS_PREFIX: &str = "*!";

/// Outcome reported in the simple reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Err,
}

/// Numeric error codes carried by ERR replies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ErrorCode {
    Malformed = 1,
    Unrecognised = 2,
    /// Room, device or dim level outside the accepted range
    InvalidAddress = 3,
}

impl ErrorCode {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn message(self) -> &'static str {
        match self {
            ErrorCode::Malformed => "Malformed message",
            ErrorCode::Unrecognised => "Unrecognised command",
            ErrorCode::InvalidAddress => "Invalid room, device or level",
        }
    }
}

/// Result of handling one datagram
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub transaction_id: u64,
    pub status: Status,
    /// 1-based room, set for addressed commands
    pub room: Option<u8>,
    /// 1-based device, set for addressed commands
    pub device: Option<u8>,
    pub command: Option<Command>,
    pub argument: u8,
    pub error_code: Option<u8>,
    pub error_message: Option<String>,
}

impl Response {
    fn ok(transaction_id: u64) -> Self {
        Response {
            transaction_id,
            status: Status::Ok,
            room: None,
            device: None,
            command: None,
            argument: 0,
            error_code: None,
            error_message: None,
        }
    }

    /// Acknowledges a pairing request
    pub fn paired(transaction_id: u64) -> Self {
        Response::ok(transaction_id)
    }

    /// Acknowledges an addressed command
    pub fn dispatched(transaction_id: u64, command: &ParsedCommand) -> Self {
        Response {
            room: Some(command.room),
            device: Some(command.device),
            command: Some(command.command),
            argument: command.argument,
            ..Response::ok(transaction_id)
        }
    }

    /// Rejects a datagram with one of the standard codes
    pub fn error(transaction_id: u64, code: ErrorCode) -> Self {
        Response::failed(transaction_id, code.code(), code.message())
    }

    /// Rejects a datagram with an arbitrary code and message
    pub fn failed(transaction_id: u64, code: u8, message: impl Into<String>) -> Self {
        Response {
            status: Status::Err,
            error_code: Some(code),
            error_message: Some(message.into()),
            ..Response::ok(transaction_id)
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// True for a successful command aimed at a room and device
    pub fn is_addressed(&self) -> bool {
        self.is_ok() && self.room.is_some() && self.device.is_some()
    }
}

/// Renders the simple reply: `<id>,OK` or `<id>,ERR,<code>,"<message>"`
pub fn format_simple(response: &Response) -> String {
    match response.status {
        Status::Ok => format!("{},OK", response.transaction_id),
        Status::Err => format!(
            "{},ERR,{},\"{}\"",
            response.transaction_id,
            response.error_code.unwrap_or(0),
            response.error_message.as_deref().unwrap_or_default()
        ),
    }
}

/// JSON body of a `*!` status notification. Field order is the wire order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusNotification {
    pub trans: u64,
    pub mac: String,
    pub time: i64,
    pub pkt: &'static str,
    #[serde(rename = "fn")]
    pub function: &'static str,
    pub room: u8,
    pub dev: u8,
    pub param: u8,
}

impl StatusNotification {
    /// Renders the full `*!{...}` frame
    pub fn render(&self) -> Result<String> {
        let body = serde_json::to_string(self)
            .map_err(|e| Error::protocol(format!("Failed to render notification: {}", e)))?;
        Ok(format!("{}{}", STATUS_PREFIX, body))
    }
}

/// Builds the status notification for a successful addressed command.
///
/// Returns `None` for errors and pairing acknowledgements, which get the
/// simple reply only.
pub fn format_status(
    response: &Response,
    sequence: u64,
    mac: &str,
    time: i64,
) -> Option<StatusNotification> {
    if !response.is_addressed() {
        return None;
    }
    Some(StatusNotification {
        trans: sequence,
        mac: crate::util::mac_suffix(mac),
        time,
        pkt: PACKET_TAG,
        function: response.command.map_or("unknown", Command::name),
        room: response.room.unwrap_or_default(),
        dev: response.device.unwrap_or_default(),
        param: match response.command {
            Some(Command::Dim) => response.argument,
            _ => 0,
        },
    })
}

/// Sequence number stamped into status notifications.
///
/// Owned by the receive loop alone; it only moves forward after a
/// notification has been built for a dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseSequence(u64);

impl ResponseSequence {
    pub fn new(initial: u64) -> Self {
        ResponseSequence(initial)
    }

    pub fn current(&self) -> u64 {
        self.0
    }

    pub fn advance(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on_command() -> ParsedCommand {
        ParsedCommand {
            room: 2,
            device: 3,
            command: Command::On,
            argument: 0,
        }
    }

    #[test]
    fn test_simple_ok() {
        assert_eq!(format_simple(&Response::paired(42)), "42,OK");
        assert_eq!(format_simple(&Response::dispatched(0, &on_command())), "0,OK");
    }

    #[test]
    fn test_simple_err() {
        let response = Response {
            transaction_id: 5,
            status: Status::Err,
            room: None,
            device: None,
            command: None,
            argument: 0,
            error_code: Some(2),
            error_message: Some("Unrecognised command".to_string()),
        };
        assert_eq!(format_simple(&response), "5,ERR,2,\"Unrecognised command\"");
        assert_eq!(
            format_simple(&Response::error(5, ErrorCode::Unrecognised)),
            "5,ERR,2,\"Unrecognised command\""
        );
        assert_eq!(
            format_simple(&Response::error(9, ErrorCode::Malformed)),
            "9,ERR,1,\"Malformed message\""
        );
    }

    #[test]
    fn test_status_frame() {
        let response = Response::dispatched(7, &on_command());
        let note = format_status(&response, 11, "03:0F:DA:11:22:33", 1_700_000_000).unwrap();
        assert_eq!(
            note.render().unwrap(),
            r#"*!{"trans":11,"mac":"112233","time":1700000000,"pkt":"433T","fn":"on","room":2,"dev":3,"param":0}"#
        );
    }

    #[test]
    fn test_status_dim_param() {
        let command = ParsedCommand {
            command: Command::Dim,
            argument: 15,
            ..on_command()
        };
        let note = format_status(&Response::dispatched(1, &command), 0, "aabbcc", 0).unwrap();
        assert_eq!(note.function, "dim");
        assert_eq!(note.param, 15);
    }

    #[test]
    fn test_status_unknown_function() {
        let mut response = Response::dispatched(1, &on_command());
        response.command = None;
        let note = format_status(&response, 0, "aabbcc", 0).unwrap();
        assert_eq!(note.function, "unknown");
    }

    #[test]
    fn test_no_status_for_errors_or_pairing() {
        assert!(format_status(&Response::paired(1), 0, "aabbcc", 0).is_none());
        assert!(format_status(&Response::error(1, ErrorCode::Malformed), 0, "aabbcc", 0).is_none());
    }

    #[test]
    fn test_sequence_advances_by_one() {
        let mut sequence = ResponseSequence::new(100);
        for expected in 100..105 {
            assert_eq!(sequence.current(), expected);
            sequence.advance();
        }
    }
}
