//! Protocol codec
//!
//! Encoding and decoding functions for RESP2 frames.
//!
//! ## Wire Format
//!
//! Every frame starts with a one-byte type marker and ends its header line
//! with `\r\n`:
//! ```text
//! +OK\r\n                      simple string
//! -ERR message\r\n             error
//! :1\r\n                       integer
//! $5\r\nhello\r\n              bulk string ($-1 = null)
//! *2\r\n$3\r\nGET\r\n$1\r\nk\r\n  array (*-1 = null array)
//! ```

use std::io::{BufRead, Cursor, ErrorKind, Read, Write};

use bytes::{BufMut, BytesMut};

use crate::error::{KvError, Result};
use super::{Command, Frame};

/// Maximum bulk string size (512 MB, same as Redis)
pub const MAX_BULK_SIZE: usize = 512 * 1024 * 1024;

/// Maximum number of elements in one array
pub const MAX_ARRAY_LEN: usize = 1024 * 1024;

/// Maximum array nesting accepted while decoding
pub const MAX_DEPTH: usize = 32;

/// Initial buffer size for bulk payloads
const READ_CHUNK: usize = 64 * 1024;

const CRLF: &[u8] = b"\r\n";

// =============================================================================
// Encoding
// =============================================================================

/// Append the wire form of `frame` to `buf`
pub fn encode_frame(frame: &Frame, buf: &mut BytesMut) {
    match frame {
        Frame::Simple(s) => {
            buf.put_u8(b'+');
            buf.put_slice(s.as_bytes());
            buf.put_slice(CRLF);
        }
        Frame::Error(s) => {
            buf.put_u8(b'-');
            buf.put_slice(s.as_bytes());
            buf.put_slice(CRLF);
        }
        Frame::Integer(n) => {
            buf.put_u8(b':');
            buf.put_slice(n.to_string().as_bytes());
            buf.put_slice(CRLF);
        }
        Frame::Bulk(bytes) => {
            buf.reserve(bytes.len() + 16);
            buf.put_u8(b'$');
            buf.put_slice(bytes.len().to_string().as_bytes());
            buf.put_slice(CRLF);
            buf.put_slice(bytes);
            buf.put_slice(CRLF);
        }
        Frame::Null => buf.put_slice(b"$-1\r\n"),
        Frame::Array(items) => {
            buf.put_u8(b'*');
            buf.put_slice(items.len().to_string().as_bytes());
            buf.put_slice(CRLF);
            for item in items {
                encode_frame(item, buf);
            }
        }
        Frame::NullArray => buf.put_slice(b"*-1\r\n"),
    }
}

/// Encode a command as a request frame
pub fn encode_command(command: &Command) -> BytesMut {
    let mut buf = BytesMut::new();
    encode_frame(&command.to_frame(), &mut buf);
    buf
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode one frame from the front of `bytes`
///
/// Returns the frame and the number of bytes consumed, or `None` when
/// `bytes` holds only part of a frame.
pub fn decode_frame(bytes: &[u8]) -> Result<Option<(Frame, usize)>> {
    let mut cursor = Cursor::new(bytes);
    match read_frame(&mut cursor) {
        Ok(frame) => Ok(Some((frame, cursor.position() as usize))),
        Err(KvError::Transport(ref e)) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(e),
    }
}

/// Read a complete frame from a stream
///
/// Blocks until a complete frame is received or an error occurs. A stream
/// that ends mid-frame yields an `UnexpectedEof` transport error.
pub fn read_frame<R: BufRead>(reader: &mut R) -> Result<Frame> {
    read_frame_at_depth(reader, 0)
}

fn read_frame_at_depth<R: BufRead>(reader: &mut R, depth: usize) -> Result<Frame> {
    if depth > MAX_DEPTH {
        return Err(KvError::Protocol(format!(
            "Frame nesting deeper than {}",
            MAX_DEPTH
        )));
    }

    let line = read_line(reader)?;
    let (marker, rest) = match line.split_first() {
        Some((marker, rest)) => (*marker, rest),
        None => return Err(KvError::Protocol("Empty frame header".to_string())),
    };

    match marker {
        b'+' => Ok(Frame::Simple(utf8(rest)?)),
        b'-' => Ok(Frame::Error(utf8(rest)?)),
        b':' => Ok(Frame::Integer(parse_int(rest)?)),
        b'$' => {
            let len = parse_int(rest)?;
            if len == -1 {
                return Ok(Frame::Null);
            }
            let len = checked_len(len, MAX_BULK_SIZE, "Bulk string")?;

            // Grow with the bytes that arrive, not the declared length
            let expected = len + CRLF.len();
            let mut data = Vec::with_capacity(expected.min(READ_CHUNK));
            reader.by_ref().take(expected as u64).read_to_end(&mut data)?;
            if data.len() < expected {
                return Err(KvError::Transport(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "stream ended inside a bulk string",
                )));
            }
            if !data.ends_with(CRLF) {
                return Err(KvError::Protocol(
                    "Bulk string not terminated by CRLF".to_string(),
                ));
            }
            data.truncate(len);
            Ok(Frame::Bulk(data))
        }
        b'*' => {
            let len = parse_int(rest)?;
            if len == -1 {
                return Ok(Frame::NullArray);
            }
            let len = checked_len(len, MAX_ARRAY_LEN, "Array")?;

            let mut items = Vec::with_capacity(len.min(64));
            for _ in 0..len {
                items.push(read_frame_at_depth(reader, depth + 1)?);
            }
            Ok(Frame::Array(items))
        }
        other => Err(KvError::Protocol(format!(
            "Unknown frame type: 0x{:02x}",
            other
        ))),
    }
}

/// Read a command frame from a stream and parse it
pub fn read_command<R: BufRead>(reader: &mut R) -> Result<Command> {
    let frame = read_frame(reader)?;
    Command::from_frame(frame)
}

/// Read one header line, without its trailing CRLF
fn read_line<R: BufRead>(reader: &mut R) -> Result<Vec<u8>> {
    let mut line = Vec::new();
    let read = reader.read_until(b'\n', &mut line)?;
    if read == 0 || !line.ends_with(b"\n") {
        return Err(KvError::Transport(std::io::Error::new(
            ErrorKind::UnexpectedEof,
            "stream ended inside a frame header",
        )));
    }
    if !line.ends_with(CRLF) {
        return Err(KvError::Protocol(
            "Frame header not terminated by CRLF".to_string(),
        ));
    }
    line.truncate(line.len() - CRLF.len());
    Ok(line)
}

fn utf8(bytes: &[u8]) -> Result<String> {
    String::from_utf8(bytes.to_vec())
        .map_err(|_| KvError::Protocol("Invalid UTF-8 in status line".to_string()))
}

fn parse_int(bytes: &[u8]) -> Result<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            KvError::Protocol(format!(
                "Invalid integer: {:?}",
                String::from_utf8_lossy(bytes)
            ))
        })
}

fn checked_len(len: i64, max: usize, what: &str) -> Result<usize> {
    if len < 0 {
        return Err(KvError::Protocol(format!("{} length {} is negative", what, len)));
    }
    let len = len as usize;
    if len > max {
        return Err(KvError::Protocol(format!(
            "{} too large: {} (max {})",
            what, len, max
        )));
    }
    Ok(len)
}

// =============================================================================
// Stream-based write helpers
// =============================================================================

/// Write a frame to a stream and flush
pub fn write_frame<W: Write>(writer: &mut W, frame: &Frame) -> Result<()> {
    let mut buf = BytesMut::new();
    encode_frame(frame, &mut buf);
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}

/// Write a command to a stream and flush
pub fn write_command<W: Write>(writer: &mut W, command: &Command) -> Result<()> {
    let bytes = encode_command(command);
    writer.write_all(&bytes)?;
    writer.flush()?;
    Ok(())
}

/// Write several commands with a single flush (pipelining)
pub fn write_pipeline<W: Write>(writer: &mut W, commands: &[Command]) -> Result<()> {
    let mut buf = BytesMut::new();
    for command in commands {
        encode_frame(&command.to_frame(), &mut buf);
    }
    writer.write_all(&buf)?;
    writer.flush()?;
    Ok(())
}
