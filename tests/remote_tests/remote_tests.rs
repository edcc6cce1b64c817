//! Tests for RemoteBackend
//!
//! These tests verify:
//! - Immediate operations over RESP
//! - Batch commit through MULTI/EXEC against the local server
//! - Aborted and rejected transactions surface as CommitFailed
//! - AUTH / SELECT handshake and database separation
//! - Connection is dropped and reopened after protocol failures

use std::io::{BufReader, BufWriter};
use std::net::{SocketAddr, TcpListener};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use atomickv::network::{Server, ServerHandle};
use atomickv::protocol::{read_frame, write_frame, Command, Frame};
use atomickv::{
    AtomicStore, Backend, KvError, MemoryBackend, RemoteBackend, RemoteConfig, Result,
    ServerConfig,
};

// =============================================================================
// Helper Functions
// =============================================================================

fn local_server_config() -> ServerConfig {
    ServerConfig::builder().listen_addr("127.0.0.1:0").build()
}

fn start_server() -> ServerHandle {
    Server::in_memory(local_server_config())
        .unwrap()
        .spawn()
        .unwrap()
}

fn config_for(addr: SocketAddr) -> RemoteConfig {
    RemoteConfig::builder()
        .host(addr.ip().to_string())
        .port(addr.port())
        .read_timeout_ms(2000)
        .build()
}

fn connect(addr: SocketAddr) -> AtomicStore<RemoteBackend> {
    AtomicStore::new(RemoteBackend::connect(config_for(addr)).unwrap())
}

/// Accept one connection, read `expect` request frames, then write `replies`
///
/// Returns the requests it saw.
fn scripted_peer(expect: usize, replies: Vec<Frame>) -> (SocketAddr, JoinHandle<Vec<Command>>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        let mut writer = BufWriter::new(stream);

        let mut seen = Vec::new();
        for _ in 0..expect {
            let frame = read_frame(&mut reader).unwrap();
            seen.push(Command::from_frame(frame).unwrap());
        }
        for reply in &replies {
            write_frame(&mut writer, reply).unwrap();
        }
        seen
    });
    (addr, handle)
}

/// Poll `condition` until it holds, failing after two seconds
fn wait_for(condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        thread::sleep(Duration::from_millis(5));
    }
}

// =============================================================================
// Immediate Operations Tests
// =============================================================================

#[test]
fn test_ping() {
    let server = start_server();
    let backend = RemoteBackend::connect(config_for(server.addr())).unwrap();
    backend.ping().unwrap();
}

#[test]
fn test_set_get_delete_exists() {
    let server = start_server();
    let store = connect(server.addr());

    store.set(b"1", b"2").unwrap();
    store.set(b"1", b"3").unwrap();
    assert_eq!(store.get(b"1").unwrap(), b"3".to_vec());
    assert!(store.exists(b"1").unwrap());

    store.delete(b"1").unwrap();
    assert!(!store.exists(b"1").unwrap());
    assert!(matches!(store.get(b"1"), Err(KvError::NotFound)));

    // Absent key delete is fine
    store.delete(b"1").unwrap();
}

#[test]
fn test_empty_value_is_not_missing() {
    let server = start_server();
    let store = connect(server.addr());

    store.set(b"empty", b"").unwrap();
    assert_eq!(store.get(b"empty").unwrap(), Vec::<u8>::new());
    assert_eq!(store.backend().get(b"never").unwrap(), None);
}

#[test]
fn test_binary_keys_are_byte_exact() {
    let server = start_server();
    let store = connect(server.addr());

    let key = [0u8, 13, 10, 255];
    store.set(&key, &[1, 2, 3]).unwrap();
    assert_eq!(store.get(&key).unwrap(), vec![1, 2, 3]);
    assert!(matches!(store.get(&key[..3]), Err(KvError::NotFound)));
}

// =============================================================================
// Batch Tests
// =============================================================================

#[test]
fn test_atomic_commit_and_abort() {
    let server = start_server();
    let store = connect(server.addr());

    store.set(b"1", b"2").unwrap();
    store.set(b"2", b"3").unwrap();

    store
        .atomic_batch(|batch| -> Result<()> {
            batch.set(b"1", b"A")?;
            batch.set(b"2", b"B")?;
            batch.set(b"3", b"C")?;
            Ok(())
        })
        .unwrap();

    assert_eq!(store.get(b"1").unwrap(), b"A".to_vec());
    assert_eq!(store.get(b"2").unwrap(), b"B".to_vec());
    assert_eq!(store.get(b"3").unwrap(), b"C".to_vec());

    store.delete(b"2").unwrap();

    let result = store.atomic_batch(|batch| -> Result<()> {
        batch.set(b"1", b"X")?;
        batch.set(b"2", b"Y")?;
        batch.set(b"3", b"Z")?;
        Err(KvError::Backend("all batch operations should fail".to_string()))
    });
    assert!(result.is_err());

    assert_eq!(store.get(b"1").unwrap(), b"A".to_vec());
    // Deleted before the batch, so still gone
    assert!(matches!(store.get(b"2"), Err(KvError::NotFound)));
    assert_eq!(store.get(b"3").unwrap(), b"C".to_vec());
}

#[test]
fn test_commit_with_delete_of_existing_key() {
    let server = start_server();
    let store = connect(server.addr());
    store.set(b"2", b"X").unwrap();

    let mut batch = store.begin_batch();
    batch.set(b"1", b"A").unwrap();
    batch.delete(b"2").unwrap();
    assert!(!batch.exists(b"2").unwrap());
    batch.commit().unwrap();

    assert_eq!(store.get(b"1").unwrap(), b"A".to_vec());
    assert!(matches!(store.get(b"2"), Err(KvError::NotFound)));
    assert!(matches!(batch.get(b"1"), Err(KvError::Usage(_))));
}

#[test]
fn test_batch_reads_through_to_server() {
    let server = start_server();
    let store = connect(server.addr());
    store.set(b"k", b"remote").unwrap();

    let mut batch = store.begin_batch();
    assert_eq!(batch.get(b"k").unwrap(), b"remote".to_vec());

    batch.delete(b"k").unwrap();
    batch.set(b"k", b"local").unwrap();
    assert_eq!(batch.get(b"k").unwrap(), b"local".to_vec());
    assert_eq!(store.get(b"k").unwrap(), b"remote".to_vec());

    batch.abort().unwrap();
}

#[test]
fn test_two_clients_last_commit_wins() {
    let server = start_server();
    let a = connect(server.addr());
    let b = connect(server.addr());

    let mut first = a.begin_batch();
    let mut second = b.begin_batch();
    first.set(b"k", b"from-a").unwrap();
    second.set(b"k", b"from-b").unwrap();

    first.commit().unwrap();
    second.commit().unwrap();

    assert_eq!(a.get(b"k").unwrap(), b"from-b".to_vec());
}

#[test]
fn test_commit_pipeline_shape() {
    let replies = vec![
        Frame::ok(),
        Frame::Simple("QUEUED".to_string()),
        Frame::Simple("QUEUED".to_string()),
        Frame::Array(vec![Frame::ok(), Frame::Integer(1)]),
    ];
    let (addr, peer) = scripted_peer(4, replies);
    let backend = RemoteBackend::connect(config_for(addr)).unwrap();

    let store = AtomicStore::new(backend);
    let mut batch = store.begin_batch();
    batch.set(b"b", b"1").unwrap();
    batch.delete(b"a").unwrap();
    batch.set(b"b", b"2").unwrap();
    batch.commit().unwrap();

    let seen = peer.join().unwrap();
    assert_eq!(
        seen,
        vec![
            Command::Multi,
            Command::Set { key: b"b".to_vec(), value: b"2".to_vec() },
            Command::Del { key: b"a".to_vec() },
            Command::Exec,
        ]
    );
}

// =============================================================================
// Commit Failure Tests
// =============================================================================

#[test]
fn test_execabort_is_commit_failure() {
    let replies = vec![
        Frame::ok(),
        Frame::Simple("QUEUED".to_string()),
        Frame::Error("ERR out of memory".to_string()),
        Frame::Error("EXECABORT Transaction discarded because of previous errors.".to_string()),
    ];
    let (addr, peer) = scripted_peer(4, replies);
    let store = AtomicStore::new(RemoteBackend::connect(config_for(addr)).unwrap());

    let result = store.atomic_batch(|batch| -> Result<()> {
        batch.set(b"a", b"1")?;
        batch.set(b"b", b"2")?;
        Ok(())
    });

    match result {
        Err(e @ KvError::CommitFailed(_)) => assert!(e.is_retryable()),
        other => panic!("Expected CommitFailed, got {:?}", other),
    }
    // The reply stream stayed in sync, so the connection is kept
    assert!(store.backend().is_connected());
    peer.join().unwrap();
}

#[test]
fn test_null_exec_is_commit_failure() {
    let replies = vec![
        Frame::ok(),
        Frame::Simple("QUEUED".to_string()),
        Frame::NullArray,
    ];
    let (addr, peer) = scripted_peer(3, replies);
    let store = AtomicStore::new(RemoteBackend::connect(config_for(addr)).unwrap());

    let mut batch = store.begin_batch();
    batch.delete(b"a").unwrap();
    assert!(matches!(batch.commit(), Err(KvError::CommitFailed(_))));
    assert!(!batch.is_open());
    assert!(matches!(batch.commit(), Err(KvError::Usage(_))));
    peer.join().unwrap();
}

#[test]
fn test_queued_command_rejected_but_exec_runs() {
    let replies = vec![
        Frame::ok(),
        Frame::Simple("QUEUED".to_string()),
        Frame::Error("ERR wrong number of arguments".to_string()),
        Frame::Array(vec![Frame::ok()]),
    ];
    let (addr, peer) = scripted_peer(4, replies);
    let store = AtomicStore::new(RemoteBackend::connect(config_for(addr)).unwrap());

    let mut batch = store.begin_batch();
    batch.set(b"a", b"1").unwrap();
    batch.set(b"b", b"2").unwrap();

    match batch.commit() {
        Err(KvError::CommitFailed(message)) => {
            assert!(message.contains("wrong number of arguments"))
        }
        other => panic!("Expected CommitFailed, got {:?}", other),
    }
    assert!(!batch.is_open());
    // Every reply was consumed, so the connection is still usable
    assert!(store.backend().is_connected());
    peer.join().unwrap();
}

#[test]
fn test_command_failing_inside_exec() {
    let replies = vec![
        Frame::ok(),
        Frame::Simple("QUEUED".to_string()),
        Frame::Simple("QUEUED".to_string()),
        Frame::Array(vec![Frame::ok(), Frame::Error("WRONGTYPE x".to_string())]),
    ];
    let (addr, peer) = scripted_peer(4, replies);
    let store = AtomicStore::new(RemoteBackend::connect(config_for(addr)).unwrap());

    let mut batch = store.begin_batch();
    batch.set(b"a", b"1").unwrap();
    batch.delete(b"b").unwrap();

    match batch.commit() {
        Err(KvError::CommitFailed(message)) => assert!(message.contains("WRONGTYPE x")),
        other => panic!("Expected CommitFailed, got {:?}", other),
    }
    assert!(!batch.is_open());
    assert!(matches!(batch.set(b"a", b"2"), Err(KvError::Usage(_))));
    assert!(store.backend().is_connected());

    let seen = peer.join().unwrap();
    assert_eq!(seen.first(), Some(&Command::Multi));
    assert_eq!(seen.last(), Some(&Command::Exec));
}

#[test]
fn test_server_rejects_bad_queued_command() {
    let server = start_server();
    let addr = server.addr();

    let stream = std::net::TcpStream::connect(addr).unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = BufWriter::new(stream);

    let requests = vec![
        Command::Multi.to_frame(),
        Command::Set { key: b"k".to_vec(), value: b"v".to_vec() }.to_frame(),
        Frame::Array(vec![Frame::bulk("SET"), Frame::bulk("missing-value")]),
        Command::Exec.to_frame(),
    ];
    let mut replies = Vec::new();
    for request in &requests {
        write_frame(&mut writer, request).unwrap();
        replies.push(read_frame(&mut reader).unwrap());
    }

    assert_eq!(replies[0], Frame::ok());
    assert_eq!(replies[1], Frame::Simple("QUEUED".to_string()));
    assert!(replies[2].is_error());
    match &replies[3] {
        Frame::Error(message) => assert!(message.starts_with("EXECABORT")),
        other => panic!("Expected EXECABORT, got {:?}", other),
    }

    // Nothing from the aborted transaction was applied
    let store = connect(addr);
    assert!(matches!(store.get(b"k"), Err(KvError::NotFound)));
}

// =============================================================================
// Connection Handling Tests
// =============================================================================

#[test]
fn test_backend_error_reply_keeps_connection() {
    let (addr, peer) = scripted_peer(1, vec![Frame::error("WRONGTYPE nope")]);
    let backend = RemoteBackend::connect(config_for(addr)).unwrap();

    assert!(matches!(backend.get(b"k"), Err(KvError::Backend(_))));
    assert!(backend.is_connected());
    peer.join().unwrap();
}

#[test]
fn test_protocol_error_drops_connection() {
    let (addr, peer) = scripted_peer(1, vec![Frame::Integer(7)]);
    let backend = RemoteBackend::connect(config_for(addr)).unwrap();

    assert!(matches!(backend.get(b"k"), Err(KvError::Protocol(_))));
    assert!(!backend.is_connected());
    peer.join().unwrap();
}

#[test]
fn test_connect_refused_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    match RemoteBackend::connect(config_for(addr)) {
        Err(e @ KvError::Transport(_)) => assert!(e.is_retryable()),
        Err(other) => panic!("Expected transport error, got {:?}", other),
        Ok(_) => panic!("Expected connection to fail"),
    }
}

#[test]
fn test_backend_keeps_its_config() {
    let server = start_server();
    let backend = RemoteBackend::connect(config_for(server.addr())).unwrap();

    assert_eq!(backend.config().port, server.addr().port());
    assert_eq!(backend.config().db, 0);
    assert_eq!(backend.config().address(), server.addr().to_string());
}

#[test]
fn test_server_counts_clients_and_shuts_down() {
    let server = Server::in_memory(local_server_config()).unwrap();
    let addr = server.local_addr().unwrap();

    thread::scope(|scope| {
        let running = scope.spawn(|| server.run());

        let backend = RemoteBackend::connect(config_for(addr)).unwrap();
        backend.ping().unwrap();
        wait_for(|| server.active_connections() == 1);

        drop(backend);
        wait_for(|| server.active_connections() == 0);

        server.shutdown();
        running.join().unwrap().unwrap();
    });
}

#[test]
fn test_invalid_config_rejected_before_connecting() {
    let config = RemoteConfig::builder().host("").build();
    assert!(matches!(RemoteBackend::connect(config), Err(KvError::Config(_))));
}

#[test]
fn test_auth_and_select() {
    let databases = vec![MemoryBackend::new(), MemoryBackend::new()];
    let server = Server::bind(local_server_config(), databases, Some("secret".to_string()))
        .unwrap()
        .spawn()
        .unwrap();
    let addr = server.addr();

    let base = RemoteConfig::builder()
        .host(addr.ip().to_string())
        .port(addr.port())
        .password("secret");

    let db0 = AtomicStore::new(RemoteBackend::connect(base.build()).unwrap());
    let db1 = AtomicStore::new(
        RemoteBackend::connect(RemoteConfig {
            db: 1,
            password: Some("secret".to_string()),
            ..config_for(addr)
        })
        .unwrap(),
    );

    db1.set(b"k", b"one").unwrap();
    assert!(matches!(db0.get(b"k"), Err(KvError::NotFound)));
    assert_eq!(db1.get(b"k").unwrap(), b"one".to_vec());

    let wrong = RemoteConfig {
        password: Some("guess".to_string()),
        ..config_for(addr)
    };
    assert!(matches!(RemoteBackend::connect(wrong), Err(KvError::Backend(_))));
}

#[test]
fn test_select_out_of_range() {
    let server = start_server();
    let config = RemoteConfig {
        db: 99,
        ..config_for(server.addr())
    };
    assert!(matches!(RemoteBackend::connect(config), Err(KvError::Backend(_))));
}
