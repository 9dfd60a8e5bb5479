//! Accepted write payload shapes

use bytes::Bytes;
use std::fmt::Display;

/// Data accepted by [`Connection::write`](super::Connection::write)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Bytes(Bytes),
    Byte(u8),
    /// Sent UTF-8 encoded
    Char(char),
    /// Each item is sent as its text form, in order
    Items(Vec<String>),
}

impl Payload {
    /// Build a payload from any sequence of displayable items
    pub fn items<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Display,
    {
        Payload::Items(items.into_iter().map(|item| item.to_string()).collect())
    }

    /// Chunks written back to back under a single writer lock
    pub fn into_chunks(self) -> Vec<Bytes> {
        match self {
            Payload::Text(text) => vec![Bytes::from(text)],
            Payload::Bytes(bytes) => vec![bytes],
            Payload::Byte(byte) => vec![Bytes::copy_from_slice(&[byte])],
            Payload::Char(c) => {
                let mut buf = [0u8; 4];
                vec![Bytes::copy_from_slice(c.encode_utf8(&mut buf).as_bytes())]
            }
            Payload::Items(items) => items.into_iter().map(Bytes::from).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Payload::Text(text) => text.len(),
            Payload::Bytes(bytes) => bytes.len(),
            Payload::Byte(_) => 1,
            Payload::Char(c) => c.len_utf8(),
            Payload::Items(items) => items.iter().map(String::len).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<&[u8]> for Payload {
    fn from(bytes: &[u8]) -> Self {
        Payload::Bytes(Bytes::copy_from_slice(bytes))
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload::Bytes(Bytes::from(bytes))
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Payload::Bytes(bytes)
    }
}

impl From<u8> for Payload {
    fn from(byte: u8) -> Self {
        Payload::Byte(byte)
    }
}

/// Only the low eight bits are sent, as on a byte-oriented output stream
impl From<i32> for Payload {
    fn from(value: i32) -> Self {
        Payload::Byte(value as u8)
    }
}

impl From<char> for Payload {
    fn from(c: char) -> Self {
        Payload::Char(c)
    }
}
