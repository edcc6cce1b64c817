//! Connection Handler
//!
//! Serves one client connection of the local RESP server.

use std::io::{BufReader, BufWriter, ErrorKind};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::backend::Backend;
use crate::batch::WriteBatch;
use crate::error::{KvError, Result};
use crate::protocol::{read_frame, write_frame, Command, Frame};

/// Commands queued between MULTI and EXEC
#[derive(Default)]
struct Transaction {
    queued: Vec<Command>,

    /// Set when a command failed to queue; EXEC then aborts
    failed: bool,
}

/// State shared by every connection of one server
pub(crate) struct Shared<B> {
    pub(crate) databases: Vec<B>,
    pub(crate) password: Option<String>,

    /// Held shared by single commands and exclusively by EXEC, so a
    /// transaction never interleaves with another client's commands
    pub(crate) exec_lock: RwLock<()>,
}

/// Handles a single client connection
pub struct Connection<B> {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer (buffered for efficiency)
    writer: BufWriter<TcpStream>,

    shared: Arc<Shared<B>>,

    /// Index into `shared.databases` chosen with SELECT
    db: usize,

    authenticated: bool,

    transaction: Option<Transaction>,

    /// Peer address for logging
    peer_addr: String,
}

impl<B: Backend> Connection<B> {
    /// Create a new connection handler
    pub(crate) fn new(stream: TcpStream, shared: Arc<Shared<B>>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        let authenticated = shared.password.is_none();

        Ok(Self {
            reader: BufReader::new(read_stream),
            writer: BufWriter::new(stream),
            shared,
            db: 0,
            authenticated,
            transaction: None,
            peer_addr,
        })
    }

    /// Configure connection timeouts (0 = none)
    pub fn set_timeouts(&mut self, read_ms: u64, write_ms: u64) -> Result<()> {
        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Reads frames in a loop and sends one reply per frame. Returns when
    /// the client disconnects or sends bytes that are not valid RESP.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        loop {
            let frame = match read_frame(&mut self.reader) {
                Ok(frame) => frame,
                Err(KvError::Transport(ref e)) if is_disconnect(e.kind()) => {
                    tracing::debug!("Client {} disconnected", self.peer_addr);
                    return Ok(());
                }
                Err(KvError::Transport(ref e))
                    if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    tracing::debug!("Read timeout for client {}", self.peer_addr);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    let _ = write_frame(&mut self.writer, &Frame::error(e.to_string()));
                    return Err(e);
                }
            };

            let reply = match Command::from_frame(frame) {
                Ok(command) => {
                    tracing::trace!("Received command from {}: {:?}", self.peer_addr, command);
                    self.dispatch(command)
                }
                Err(e) => {
                    if let Some(tx) = self.transaction.as_mut() {
                        tx.failed = true;
                    }
                    Frame::error(protocol_message(&e))
                }
            };

            if let Err(e) = write_frame(&mut self.writer, &reply) {
                if let KvError::Transport(ref io_err) = e {
                    if is_disconnect(io_err.kind()) || io_err.kind() == ErrorKind::BrokenPipe {
                        tracing::debug!(
                            "Client {} disconnected before reply could be sent",
                            self.peer_addr
                        );
                        return Ok(());
                    }
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }
        }
    }

    fn dispatch(&mut self, command: Command) -> Frame {
        if !self.authenticated && !matches!(command, Command::Auth { .. }) {
            return Frame::Error("NOAUTH Authentication required.".to_string());
        }

        match command {
            Command::Auth { password } => self.auth(&password),
            Command::Multi => {
                if self.transaction.is_some() {
                    return Frame::error("MULTI calls can not be nested");
                }
                self.transaction = Some(Transaction::default());
                Frame::ok()
            }
            Command::Discard => match self.transaction.take() {
                Some(_) => Frame::ok(),
                None => Frame::error("DISCARD without MULTI"),
            },
            Command::Exec => match self.transaction.take() {
                Some(tx) if tx.failed => Frame::Error(
                    "EXECABORT Transaction discarded because of previous errors.".to_string(),
                ),
                Some(tx) => self.exec(tx.queued),
                None => Frame::error("EXEC without MULTI"),
            },
            command => {
                if let Some(tx) = self.transaction.as_mut() {
                    if matches!(command, Command::Select { .. }) {
                        tx.failed = true;
                        return Frame::error("SELECT is not allowed inside MULTI");
                    }
                    tx.queued.push(command);
                    return Frame::Simple("QUEUED".to_string());
                }
                self.execute(command)
            }
        }
    }

    fn auth(&mut self, password: &[u8]) -> Frame {
        match &self.shared.password {
            None => Frame::error("AUTH called without any password configured"),
            Some(expected) if expected.as_bytes() == password => {
                self.authenticated = true;
                Frame::ok()
            }
            Some(_) => Frame::Error("WRONGPASS invalid password".to_string()),
        }
    }

    /// Execute a single command outside any transaction
    fn execute(&mut self, command: Command) -> Frame {
        if let Command::Select { db } = command {
            let db = db as usize;
            if db >= self.shared.databases.len() {
                return Frame::error("DB index is out of range");
            }
            self.db = db;
            return Frame::ok();
        }

        let _shared = self.shared.exec_lock.read();
        let backend = &self.shared.databases[self.db];
        let reply = match command {
            Command::Get { key } => backend.get(&key).map(|v| v.map_or(Frame::Null, Frame::Bulk)),
            Command::Set { key, value } => backend.set(&key, &value).map(|_| Frame::ok()),
            Command::Del { key } => backend.exists(&key).and_then(|existed| {
                backend.delete(&key)?;
                Ok(Frame::Integer(existed as i64))
            }),
            Command::Exists { key } => backend.exists(&key).map(|e| Frame::Integer(e as i64)),
            Command::Ping => Ok(Frame::Simple("PONG".to_string())),
            other => Ok(Frame::error(format!(
                "'{}' is not valid here",
                other.command_type().name()
            ))),
        };
        reply.unwrap_or_else(|e| Frame::error(e.to_string()))
    }

    /// Run a queued transaction as one write batch under the exclusive lock
    fn exec(&mut self, queued: Vec<Command>) -> Frame {
        let _exclusive = self.shared.exec_lock.write();
        let backend = &self.shared.databases[self.db];
        let mut batch = WriteBatch::new(backend);

        let mut replies = Vec::with_capacity(queued.len());
        for command in queued {
            let reply = match command {
                Command::Get { key } => match batch.get(&key) {
                    Ok(value) => Ok(Frame::Bulk(value)),
                    Err(KvError::NotFound) => Ok(Frame::Null),
                    Err(e) => Err(e),
                },
                Command::Set { key, value } => batch.set(&key, &value).map(|_| Frame::ok()),
                Command::Del { key } => batch.exists(&key).and_then(|existed| {
                    batch.delete(&key)?;
                    Ok(Frame::Integer(existed as i64))
                }),
                Command::Exists { key } => batch.exists(&key).map(|e| Frame::Integer(e as i64)),
                Command::Ping => Ok(Frame::Simple("PONG".to_string())),
                other => Ok(Frame::error(format!(
                    "'{}' is not valid inside MULTI",
                    other.command_type().name()
                ))),
            };
            match reply {
                Ok(frame) => replies.push(frame),
                Err(e) => {
                    tracing::warn!("Transaction from {} failed: {}", self.peer_addr, e);
                    return Frame::Error(format!("EXECABORT {}", e));
                }
            }
        }

        match batch.commit() {
            Ok(()) => Frame::Array(replies),
            Err(e) => {
                tracing::warn!("Transaction commit from {} failed: {}", self.peer_addr, e);
                Frame::Error(format!("EXECABORT {}", e))
            }
        }
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted
    )
}

/// Protocol errors go back to the client without the local prefix
fn protocol_message(e: &KvError) -> String {
    match e {
        KvError::Protocol(message) => message.clone(),
        other => other.to_string(),
    }
}
