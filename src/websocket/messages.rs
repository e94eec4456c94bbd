//! WebSocket Message Types
//!
//! Defines the plain-text frame protocol between subscribers and the
//! server. Acknowledgements and broadcasts share the same wire shape:
//! a bare text frame with no envelope or type tag. Binary frames are
//! acknowledged with a binary frame carrying the original bytes.

use axum::extract::ws::Message;

/// Prefix of the subscribe command
pub const SUBSCRIBE_PREFIX: &str = "subscribe:";

/// Prefix of every acknowledgement frame
pub const ACK_PREFIX: &str = "Acknowledged: ";

/// Interpretation of one inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCommand<'a> {
    /// `subscribe:<topic>`, topic taken verbatim (may be empty)
    Subscribe(&'a str),
    /// Anything else; acknowledged but not interpreted
    Message(&'a str),
}

impl<'a> ClientCommand<'a> {
    pub fn parse(frame: &'a str) -> Self {
        match frame.strip_prefix(SUBSCRIBE_PREFIX) {
            Some(topic) => ClientCommand::Subscribe(topic),
            None => ClientCommand::Message(frame),
        }
    }
}

/// Frames queued for a connection's writer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    /// Echo of an inbound text frame
    Acknowledged(String),
    /// Echo of an inbound binary frame, bytes kept as received
    AcknowledgedBinary(Vec<u8>),
    /// Raw payload published to a subscribed topic
    Broadcast(String),
}

impl ServerFrame {
    /// Render the frame as it goes on the wire
    pub fn into_message(self) -> Message {
        match self {
            ServerFrame::Acknowledged(original) => {
                Message::Text(format!("{}{}", ACK_PREFIX, original))
            }
            ServerFrame::AcknowledgedBinary(original) => {
                let mut bytes = Vec::with_capacity(ACK_PREFIX.len() + original.len());
                bytes.extend_from_slice(ACK_PREFIX.as_bytes());
                bytes.extend_from_slice(&original);
                Message::Binary(bytes)
            }
            ServerFrame::Broadcast(payload) => Message::Text(payload),
        }
    }
}
