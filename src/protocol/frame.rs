//! Frame definitions
//!
//! One RESP2 value as it travels on the wire, in either direction.

/// A RESP2 value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `+OK\r\n`
    Simple(String),

    /// `-ERR message\r\n`
    Error(String),

    /// `:42\r\n`
    Integer(i64),

    /// `$3\r\nfoo\r\n` (may be empty: `$0\r\n\r\n`)
    Bulk(Vec<u8>),

    /// `$-1\r\n`, the "no such key" reply
    Null,

    /// `*2\r\n...`
    Array(Vec<Frame>),

    /// `*-1\r\n`, returned by EXEC when a transaction was aborted
    NullArray,
}

impl Frame {
    /// The `+OK` reply
    pub fn ok() -> Self {
        Frame::Simple("OK".to_string())
    }

    /// An `-ERR ...` reply
    pub fn error(message: impl Into<String>) -> Self {
        Frame::Error(format!("ERR {}", message.into()))
    }

    /// A bulk string built from raw bytes
    pub fn bulk(bytes: impl Into<Vec<u8>>) -> Self {
        Frame::Bulk(bytes.into())
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Error(_))
    }

    /// Short type name for error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Simple(_) => "simple string",
            Frame::Error(_) => "error",
            Frame::Integer(_) => "integer",
            Frame::Bulk(_) => "bulk string",
            Frame::Null => "null",
            Frame::Array(_) => "array",
            Frame::NullArray => "null array",
        }
    }
}
