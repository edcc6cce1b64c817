//! Command definitions
//!
//! The subset of Redis commands the backend adapter sends and the local
//! server understands.

use crate::error::{KvError, Result};

use super::Frame;

/// Command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandType {
    Get,
    Set,
    Del,
    Exists,
    Ping,
    Select,
    Auth,
    Multi,
    Exec,
    Discard,
}

impl CommandType {
    /// Wire name of the command
    pub fn name(&self) -> &'static str {
        match self {
            CommandType::Get => "GET",
            CommandType::Set => "SET",
            CommandType::Del => "DEL",
            CommandType::Exists => "EXISTS",
            CommandType::Ping => "PING",
            CommandType::Select => "SELECT",
            CommandType::Auth => "AUTH",
            CommandType::Multi => "MULTI",
            CommandType::Exec => "EXEC",
            CommandType::Discard => "DISCARD",
        }
    }

    fn from_name(name: &[u8]) -> Option<Self> {
        let upper = name.to_ascii_uppercase();
        let command_type = match upper.as_slice() {
            b"GET" => CommandType::Get,
            b"SET" => CommandType::Set,
            b"DEL" => CommandType::Del,
            b"EXISTS" => CommandType::Exists,
            b"PING" => CommandType::Ping,
            b"SELECT" => CommandType::Select,
            b"AUTH" => CommandType::Auth,
            b"MULTI" => CommandType::Multi,
            b"EXEC" => CommandType::Exec,
            b"DISCARD" => CommandType::Discard,
            _ => return None,
        };
        Some(command_type)
    }
}

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Get a value by key
    Get { key: Vec<u8> },

    /// Set a key-value pair
    Set { key: Vec<u8>, value: Vec<u8> },

    /// Delete a key
    Del { key: Vec<u8> },

    /// Check key presence
    Exists { key: Vec<u8> },

    /// Ping (health check)
    Ping,

    /// Switch logical database
    Select { db: u32 },

    /// Authenticate the connection
    Auth { password: Vec<u8> },

    /// Start queueing a transaction
    Multi,

    /// Execute the queued transaction
    Exec,

    /// Drop the queued transaction
    Discard,
}

impl Command {
    /// Get the command type
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::Get { .. } => CommandType::Get,
            Command::Set { .. } => CommandType::Set,
            Command::Del { .. } => CommandType::Del,
            Command::Exists { .. } => CommandType::Exists,
            Command::Ping => CommandType::Ping,
            Command::Select { .. } => CommandType::Select,
            Command::Auth { .. } => CommandType::Auth,
            Command::Multi => CommandType::Multi,
            Command::Exec => CommandType::Exec,
            Command::Discard => CommandType::Discard,
        }
    }

    /// Request frame: an array of bulk strings, command name first
    pub fn to_frame(&self) -> Frame {
        let mut parts = vec![Frame::bulk(self.command_type().name())];
        match self {
            Command::Get { key } | Command::Del { key } | Command::Exists { key } => {
                parts.push(Frame::bulk(key.clone()));
            }
            Command::Set { key, value } => {
                parts.push(Frame::bulk(key.clone()));
                parts.push(Frame::bulk(value.clone()));
            }
            Command::Select { db } => parts.push(Frame::bulk(db.to_string())),
            Command::Auth { password } => parts.push(Frame::bulk(password.clone())),
            Command::Ping | Command::Multi | Command::Exec | Command::Discard => {}
        }
        Frame::Array(parts)
    }

    /// Parse a request frame received by the server
    pub fn from_frame(frame: Frame) -> Result<Self> {
        let parts = match frame {
            Frame::Array(parts) if !parts.is_empty() => parts,
            other => {
                return Err(KvError::Protocol(format!(
                    "expected non-empty command array, got {}",
                    other.kind()
                )))
            }
        };

        let mut args = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                Frame::Bulk(bytes) => args.push(bytes),
                other => {
                    return Err(KvError::Protocol(format!(
                        "command arguments must be bulk strings, got {}",
                        other.kind()
                    )))
                }
            }
        }

        let mut args = args.into_iter();
        let name = args.next().unwrap_or_default();
        let command_type = CommandType::from_name(&name).ok_or_else(|| {
            KvError::Protocol(format!(
                "unknown command '{}'",
                String::from_utf8_lossy(&name)
            ))
        })?;
        let args: Vec<Vec<u8>> = args.collect();

        let expected = match command_type {
            CommandType::Set => 2,
            CommandType::Get
            | CommandType::Del
            | CommandType::Exists
            | CommandType::Select
            | CommandType::Auth => 1,
            CommandType::Ping | CommandType::Multi | CommandType::Exec | CommandType::Discard => 0,
        };
        if args.len() != expected {
            return Err(KvError::Protocol(format!(
                "wrong number of arguments for '{}' command",
                command_type.name().to_ascii_lowercase()
            )));
        }

        let mut args = args.into_iter();
        let mut arg = || args.next().unwrap_or_default();
        let command = match command_type {
            CommandType::Get => Command::Get { key: arg() },
            CommandType::Set => {
                let key = arg();
                let value = arg();
                Command::Set { key, value }
            }
            CommandType::Del => Command::Del { key: arg() },
            CommandType::Exists => Command::Exists { key: arg() },
            CommandType::Ping => Command::Ping,
            CommandType::Select => {
                let raw = arg();
                let db = std::str::from_utf8(&raw)
                    .ok()
                    .and_then(|s| s.parse::<u32>().ok())
                    .ok_or_else(|| {
                        KvError::Protocol("value is not an integer or out of range".to_string())
                    })?;
                Command::Select { db }
            }
            CommandType::Auth => Command::Auth { password: arg() },
            CommandType::Multi => Command::Multi,
            CommandType::Exec => Command::Exec,
            CommandType::Discard => Command::Discard,
        };
        Ok(command)
    }
}
