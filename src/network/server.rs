//! TCP Server
//!
//! Accepts connections and hands each one to its own thread.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::RwLock;

use crate::backend::{Backend, MemoryBackend};
use crate::config::ServerConfig;
use crate::error::{KvError, Result};
use crate::protocol::{write_frame, Frame};

use super::connection::{Connection, Shared};

/// Number of logical databases served by [`Server::in_memory`]
pub const DEFAULT_DATABASES: usize = 16;

/// How long the accept loop sleeps when no client is waiting
const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// RESP server over one backend per logical database
pub struct Server<B> {
    config: ServerConfig,
    listener: TcpListener,
    shared: Arc<Shared<B>>,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
}

impl Server<MemoryBackend> {
    /// Bind a server with [`DEFAULT_DATABASES`] empty in-memory databases
    pub fn in_memory(config: ServerConfig) -> Result<Self> {
        let databases = (0..DEFAULT_DATABASES).map(|_| MemoryBackend::new()).collect();
        Self::bind(config, databases, None)
    }
}

impl<B: Backend + 'static> Server<B> {
    /// Bind the listen address
    ///
    /// `databases[i]` backs `SELECT i`. When `password` is set, clients
    /// must AUTH before any other command.
    pub fn bind(config: ServerConfig, databases: Vec<B>, password: Option<String>) -> Result<Self> {
        if databases.is_empty() {
            return Err(KvError::Config("server needs at least one database".to_string()));
        }
        if config.max_connections == 0 {
            return Err(KvError::Config("max_connections must be non-zero".to_string()));
        }

        let listener = TcpListener::bind(&config.listen_addr)?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            config,
            listener,
            shared: Arc::new(Shared {
                databases,
                password,
                exec_lock: RwLock::new(()),
            }),
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Address actually bound (useful with port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Flag that stops the accept loop once set
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Signal the server to shutdown gracefully
    ///
    /// Stops accepting; connections already being served run to completion.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Number of clients currently connected
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    /// Start the server (blocking until shutdown)
    pub fn run(&self) -> Result<()> {
        tracing::info!("Listening on {}", self.local_addr()?);

        while !self.shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, _)) => self.accept(stream),
                Err(ref e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
                Err(ref e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }

        tracing::info!("Accept loop stopped");
        Ok(())
    }

    /// Run on a background thread
    pub fn spawn(self) -> Result<ServerHandle> {
        let addr = self.local_addr()?;
        let shutdown = self.shutdown_flag();
        let thread = thread::Builder::new()
            .name("atomickv-server".to_string())
            .spawn(move || self.run())?;
        Ok(ServerHandle {
            addr,
            shutdown,
            thread: Some(thread),
        })
    }

    fn accept(&self, stream: TcpStream) {
        if self.active.load(Ordering::Relaxed) >= self.config.max_connections {
            tracing::warn!("Rejecting client: {} connections open", self.config.max_connections);
            let mut stream = stream;
            let _ = write_frame(&mut stream, &Frame::error("max number of clients reached"));
            return;
        }

        // Accepted sockets may inherit non-blocking mode from the listener
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!("Could not configure client socket: {}", e);
            return;
        }

        let mut conn = match Connection::new(stream, Arc::clone(&self.shared)) {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Could not set up connection: {}", e);
                return;
            }
        };
        if let Err(e) = conn.set_timeouts(self.config.read_timeout_ms, self.config.write_timeout_ms) {
            tracing::warn!("Could not set timeouts for {}: {}", conn.peer_addr(), e);
            return;
        }

        let active = Arc::clone(&self.active);
        active.fetch_add(1, Ordering::Relaxed);
        let spawned = thread::Builder::new()
            .name("atomickv-conn".to_string())
            .spawn(move || {
                if let Err(e) = conn.handle() {
                    tracing::debug!("Connection {} ended with error: {}", conn.peer_addr(), e);
                }
                active.fetch_sub(1, Ordering::Relaxed);
            });
        if let Err(e) = spawned {
            tracing::warn!("Could not spawn connection thread: {}", e);
            self.active.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

/// Handle to a server running on a background thread
///
/// Dropping the handle stops the server.
pub struct ServerHandle {
    addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl ServerHandle {
    /// Address the server listens on
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting and wait for the accept loop to exit
    pub fn stop(mut self) -> Result<()> {
        self.stop_inner()
    }

    fn stop_inner(&mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::Relaxed);
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| KvError::Backend("server thread panicked".to_string()))?,
            None => Ok(()),
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let _ = self.stop_inner();
    }
}
