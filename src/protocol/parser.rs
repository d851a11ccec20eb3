//! Parser for inbound LightwaveRF link datagrams
//!
//! Accepted grammar:
//!
//! ```text
//! [":" <mac> ","] <digits> ",!" ( "F" | "R" <digit> "D" <digit> "F" <function> ["|" <trailer>] )
//! <function> := "0" | "1" | "dP" <digits>
//! ```
//!
//! Room and device are single digits. Range checks happen later, when the
//! logical address is built.

use crate::core::Command;

/// An addressed light command as read off the wire (1-based, unchecked)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedCommand {
    pub room: u8,
    pub device: u8,
    pub command: Command,
    pub argument: u8,
}

/// What a datagram asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageBody {
    /// Pairing request; acknowledged but never transmitted
    Pairing,
    Addressed(ParsedCommand),
    /// Framing is broken (no `,!` marker, bad transaction id)
    Malformed,
    /// Framing is fine but the command is not one we know
    Unrecognised,
}

/// A decoded datagram tagged with its transaction id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedMessage {
    pub transaction_id: u64,
    pub body: MessageBody,
}

impl ParsedMessage {
    fn new(transaction_id: u64, body: MessageBody) -> Self {
        ParsedMessage { transaction_id, body }
    }
}

struct Scanner<'a> {
    input: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(input: &'a [u8]) -> Self {
        Scanner { input, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn eat(&mut self, expected: u8) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a [u8] {
        let start = self.pos;
        while self.peek().map_or(false, &pred) {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    fn digit(&mut self) -> Option<u8> {
        match self.peek() {
            Some(b @ b'0'..=b'9') => {
                self.pos += 1;
                Some(b - b'0')
            }
            _ => None,
        }
    }

    fn at_end_or_trailer(&self) -> bool {
        matches!(self.peek(), None | Some(b'|'))
    }
}

/// Parses one raw datagram
pub fn parse(raw: &[u8]) -> ParsedMessage {
    let end = raw
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    let mut scanner = Scanner::new(&raw[..end]);

    if scanner.eat(b':') {
        scanner.take_while(|b| b != b',');
        if !scanner.eat(b',') {
            return ParsedMessage::new(0, MessageBody::Malformed);
        }
    }

    let Some(transaction_id) = number(scanner.take_while(|b| b.is_ascii_digit())) else {
        return ParsedMessage::new(0, MessageBody::Malformed);
    };

    if !(scanner.eat(b',') && scanner.eat(b'!')) {
        return ParsedMessage::new(transaction_id, MessageBody::Malformed);
    }

    ParsedMessage::new(transaction_id, body(&mut scanner))
}

/// Digit run as a number; an empty run is zero, overflow is None
fn number<T: std::str::FromStr + Default>(digits: &[u8]) -> Option<T> {
    if digits.is_empty() {
        return Some(T::default());
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
}

fn body(scanner: &mut Scanner<'_>) -> MessageBody {
    match scanner.bump() {
        Some(b'F') if scanner.at_end_or_trailer() => MessageBody::Pairing,
        Some(b'R') => addressed(scanner)
            .map(MessageBody::Addressed)
            .unwrap_or(MessageBody::Unrecognised),
        _ => MessageBody::Unrecognised,
    }
}

fn addressed(scanner: &mut Scanner<'_>) -> Option<ParsedCommand> {
    let room = scanner.digit()?;
    if !scanner.eat(b'D') {
        return None;
    }
    let device = scanner.digit()?;
    if !scanner.eat(b'F') {
        return None;
    }
    let (command, argument) = function(scanner.take_while(|b| b != b'|'))?;
    Some(ParsedCommand {
        room,
        device,
        command,
        argument,
    })
}

fn function(token: &[u8]) -> Option<(Command, u8)> {
    match token {
        b"0" => Some((Command::Off, 0)),
        b"1" => Some((Command::On, 0)),
        [b'd', b'P', digits @ ..]
            if !digits.is_empty() && digits.iter().all(u8::is_ascii_digit) =>
        {
            number(digits).map(|level| (Command::Dim, level))
        }
        _ => None,
    }
}
