//! Protocol Module
//!
//! RESP2, the Redis serialization protocol, as spoken between the remote
//! backend adapter and a Redis-compatible server.
//!
//! ### Request Format
//! Every request is an array of bulk strings, command name first:
//! ```text
//! *3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n
//! ```
//!
//! ### Commands
//! - GET key / SET key value / DEL key / EXISTS key
//! - PING / SELECT db / AUTH password
//! - MULTI / EXEC / DISCARD (transactions)
//!
//! ### Replies
//! - `+OK`, `+QUEUED`, `+PONG`: simple strings
//! - `-ERR ...`, `-EXECABORT ...`: errors
//! - `:n`: integers (DEL, EXISTS)
//! - `$-1`: null bulk, the "no such key" reply to GET
//! - `*-1`: null array, an aborted EXEC

mod command;
mod frame;
mod codec;

pub use command::{Command, CommandType};
pub use frame::Frame;
pub use codec::{
    decode_frame, encode_command, encode_frame, read_command, read_frame, write_command,
    write_frame, write_pipeline, MAX_ARRAY_LEN, MAX_BULK_SIZE, MAX_DEPTH,
};
