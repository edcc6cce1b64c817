//! Remote backend
//!
//! Blocking RESP client for a Redis-compatible server. Keys and values map
//! 1:1 onto bulk strings; a batch commit is one pipelined
//! `MULTI` / `SET`|`DEL`... / `EXEC` round trip.

use std::io::{BufReader, BufWriter};
use std::net::{TcpStream, ToSocketAddrs};

use parking_lot::Mutex;

use crate::config::RemoteConfig;
use crate::diff::{Diff, DiffEntry};
use crate::error::{KvError, Result};
use crate::protocol::{read_frame, write_command, write_pipeline, Command, Frame};

use super::Backend;

/// Backend adapter over a network-hosted key-value service
///
/// ## Concurrency:
/// - One TCP connection, guarded by a mutex; calls through one backend
///   are sequential
/// - A transport or protocol failure drops the connection; the next call
///   opens a fresh one. The failed call itself is never re-sent
pub struct RemoteBackend {
    config: RemoteConfig,
    conn: Mutex<Option<RemoteConnection>>,
}

impl RemoteBackend {
    /// Connect using `config`
    ///
    /// Sends AUTH when a password is configured and SELECT when `db` is not
    /// the default database.
    pub fn connect(config: RemoteConfig) -> Result<Self> {
        config.validate()?;
        let conn = RemoteConnection::open(&config)?;
        Ok(Self {
            config,
            conn: Mutex::new(Some(conn)),
        })
    }

    /// Get the configuration
    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Round-trip a PING
    pub fn ping(&self) -> Result<()> {
        self.with_connection(|conn| match conn.request(&Command::Ping)? {
            Frame::Simple(s) if s == "PONG" => Ok(()),
            Frame::Bulk(b) if b == b"PONG" => Ok(()),
            other => Err(unexpected("PING", other)),
        })
    }

    /// Whether a connection is currently held
    pub fn is_connected(&self) -> bool {
        self.conn.lock().is_some()
    }

    fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut RemoteConnection) -> Result<T>,
    ) -> Result<T> {
        let mut slot = self.conn.lock();
        let mut conn = match slot.take() {
            Some(conn) => conn,
            None => {
                tracing::debug!("Reconnecting to {}", self.config.address());
                RemoteConnection::open(&self.config)?
            }
        };

        let result = f(&mut conn);
        match &result {
            Err(e @ (KvError::Transport(_) | KvError::Protocol(_))) => {
                tracing::warn!("Dropping connection to {}: {}", conn.peer_addr, e);
            }
            _ => *slot = Some(conn),
        }
        result
    }
}

impl Backend for RemoteBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let command = Command::Get { key: key.to_vec() };
        self.with_connection(|conn| match conn.request(&command)? {
            Frame::Bulk(value) => Ok(Some(value)),
            Frame::Null => Ok(None),
            other => Err(unexpected("GET", other)),
        })
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let command = Command::Set {
            key: key.to_vec(),
            value: value.to_vec(),
        };
        self.with_connection(|conn| expect_ok("SET", conn.request(&command)?))
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        let command = Command::Del { key: key.to_vec() };
        self.with_connection(|conn| match conn.request(&command)? {
            Frame::Integer(_) => Ok(()),
            other => Err(unexpected("DEL", other)),
        })
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        let command = Command::Exists { key: key.to_vec() };
        self.with_connection(|conn| match conn.request(&command)? {
            Frame::Integer(n) => Ok(n > 0),
            other => Err(unexpected("EXISTS", other)),
        })
    }

    fn apply(&self, diff: &Diff) -> Result<()> {
        if diff.is_empty() {
            return Ok(());
        }

        let mut commands = Vec::with_capacity(diff.len() + 2);
        commands.push(Command::Multi);
        for (key, entry) in diff.iter() {
            commands.push(match entry {
                DiffEntry::Set(value) => Command::Set {
                    key: key.to_vec(),
                    value: value.clone(),
                },
                DiffEntry::Delete => Command::Del { key: key.to_vec() },
            });
        }
        commands.push(Command::Exec);

        self.with_connection(|conn| conn.transaction(&commands))
    }
}

/// One open TCP connection with buffered halves
struct RemoteConnection {
    reader: BufReader<TcpStream>,
    writer: BufWriter<TcpStream>,
    peer_addr: String,
}

impl RemoteConnection {
    fn open(config: &RemoteConfig) -> Result<Self> {
        let stream = Self::connect_stream(config)?;

        stream.set_nodelay(true)?;
        stream.set_read_timeout(config.read_timeout())?;
        stream.set_write_timeout(config.write_timeout())?;

        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| config.address());

        let read_stream = stream.try_clone()?;
        let mut conn = Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
            peer_addr,
        };

        if let Some(password) = &config.password {
            let auth = Command::Auth {
                password: password.as_bytes().to_vec(),
            };
            expect_ok("AUTH", conn.request(&auth)?)?;
        }
        if config.db != 0 {
            expect_ok("SELECT", conn.request(&Command::Select { db: config.db })?)?;
        }

        tracing::debug!("Connected to {} (db {})", conn.peer_addr, config.db);
        Ok(conn)
    }

    fn connect_stream(config: &RemoteConfig) -> Result<TcpStream> {
        let address = config.address();
        let mut last_err = None;
        for addr in address.to_socket_addrs()? {
            match TcpStream::connect_timeout(&addr, config.connect_timeout()) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(match last_err {
            Some(e) => KvError::Transport(e),
            None => KvError::Config(format!("{} did not resolve to any address", address)),
        })
    }

    fn request(&mut self, command: &Command) -> Result<Frame> {
        tracing::trace!("-> {} {:?}", self.peer_addr, command.command_type());
        write_command(&mut self.writer, command)?;
        read_frame(&mut self.reader)
    }

    /// Send `MULTI`, the queued commands and `EXEC` in one write, then
    /// collect one reply per command
    fn transaction(&mut self, commands: &[Command]) -> Result<()> {
        write_pipeline(&mut self.writer, commands)?;

        let mut replies = Vec::with_capacity(commands.len());
        for _ in commands {
            replies.push(read_frame(&mut self.reader)?);
        }

        let exec_reply = replies.pop();
        let mut replies = replies.into_iter();

        match replies.next() {
            Some(Frame::Simple(s)) if s == "OK" => {}
            Some(other) => {
                return Err(KvError::CommitFailed(format!(
                    "MULTI rejected: {}",
                    describe(&other)
                )))
            }
            None => return Err(KvError::Protocol("missing MULTI reply".to_string())),
        }

        let queue_errors: Vec<String> = replies
            .filter(|reply| !matches!(reply, Frame::Simple(s) if s == "QUEUED"))
            .map(|reply| describe(&reply))
            .collect();

        match exec_reply {
            Some(Frame::Array(results)) => {
                if let Some(failed) = results.iter().find(|r| r.is_error()) {
                    return Err(KvError::CommitFailed(format!(
                        "command failed inside EXEC: {}",
                        describe(failed)
                    )));
                }
                if !queue_errors.is_empty() {
                    return Err(KvError::CommitFailed(format!(
                        "queued commands rejected: {}",
                        queue_errors.join("; ")
                    )));
                }
                tracing::debug!(
                    "Committed {} commands to {}",
                    results.len(),
                    self.peer_addr
                );
                Ok(())
            }
            Some(Frame::NullArray) => Err(KvError::CommitFailed(
                "transaction aborted by server".to_string(),
            )),
            Some(Frame::Error(message)) => {
                let mut detail = message;
                if !queue_errors.is_empty() {
                    detail = format!("{} ({})", detail, queue_errors.join("; "));
                }
                Err(KvError::CommitFailed(detail))
            }
            Some(other) => Err(unexpected("EXEC", other)),
            None => Err(KvError::Protocol("missing EXEC reply".to_string())),
        }
    }
}

fn expect_ok(op: &str, reply: Frame) -> Result<()> {
    match reply {
        Frame::Simple(s) if s == "OK" => Ok(()),
        other => Err(unexpected(op, other)),
    }
}

/// Map a reply the caller did not expect onto an error
fn unexpected(op: &str, reply: Frame) -> KvError {
    match reply {
        Frame::Error(message) => KvError::Backend(format!("{}: {}", op, message)),
        other => KvError::Protocol(format!("unexpected {} reply to {}", other.kind(), op)),
    }
}

fn describe(reply: &Frame) -> String {
    match reply {
        Frame::Error(message) | Frame::Simple(message) => message.clone(),
        other => other.kind().to_string(),
    }
}
