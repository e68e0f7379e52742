//! Server/client messaging through the public API.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{init_tracing, read_next, wait_for_peers, wait_until};
use ipclink::transport::memory::MemoryTransport;
use ipclink::{ConnectionConfig, IpcError, Mode, MAX_MESSAGE_LENGTH};

fn open_server(
    transport: &MemoryTransport,
    channel: &str,
    config: ConnectionConfig,
) -> ipclink::ConnectionHandle {
    init_tracing();
    ipclink::open_with_transport(transport.clone(), Mode::Server, "srv", channel, config)
        .expect("open server")
}

fn open_client(
    transport: &MemoryTransport,
    channel: &str,
    config: ConnectionConfig,
) -> ipclink::ConnectionHandle {
    ipclink::open_with_transport(transport.clone(), Mode::Client, "srv", channel, config)
        .expect("open client")
}

#[test]
fn test_clients_reach_the_server() {
    let transport = MemoryTransport::new();
    let server = open_server(&transport, "30", ConnectionConfig::local());
    let first = open_client(&transport, "30", ConnectionConfig::local());
    let second = open_client(&transport, "30", ConnectionConfig::local());
    wait_for_peers(server, 2);

    ipclink::write_message(first, b"from first").expect("write");
    ipclink::write_message(second, b"from second").expect("write");

    let mut received = vec![
        read_next(server).into_vec(),
        read_next(server).into_vec(),
    ];
    received.sort();
    assert_eq!(received, vec![b"from first".to_vec(), b"from second".to_vec()]);

    for handle in [first, second, server] {
        ipclink::close(handle);
    }
}

#[test]
fn test_server_broadcasts_to_all_clients() {
    let transport = MemoryTransport::new();
    let server = open_server(&transport, "31", ConnectionConfig::local());
    let first = open_client(&transport, "31", ConnectionConfig::local());
    let second = open_client(&transport, "31", ConnectionConfig::local());
    wait_for_peers(server, 2);

    ipclink::write_message(server, b"announcement").expect("broadcast");

    assert_eq!(read_next(first).as_bytes(), b"announcement");
    assert_eq!(read_next(second).as_bytes(), b"announcement");

    for handle in [first, second, server] {
        ipclink::close(handle);
    }
}

#[test]
fn test_max_length_payload_is_byte_identical() {
    let transport = MemoryTransport::new();
    let server = open_server(&transport, "32", ConnectionConfig::local());
    let client = open_client(&transport, "32", ConnectionConfig::local());
    wait_for_peers(server, 1);

    let payload: Vec<u8> = (0..MAX_MESSAGE_LENGTH).map(|i| (i % 251) as u8).collect();
    ipclink::write_message(client, &payload).expect("write");
    assert_eq!(read_next(server).as_bytes(), payload.as_slice());

    ipclink::close(client);
    ipclink::close(server);
}

#[test]
fn test_every_accepted_write_is_delivered() {
    const THREADS: usize = 4;
    const WRITES_PER_THREAD: usize = 50;

    let transport = MemoryTransport::new();
    let roomy = ConnectionConfig::local().with_queue_capacity(1024);
    let server = open_server(&transport, "33", roomy.clone());
    let client = open_client(&transport, "33", roomy);
    wait_for_peers(server, 1);

    let accepted = Arc::new(AtomicUsize::new(0));
    let workers: Vec<_> = (0..THREADS)
        .map(|thread| {
            let accepted = Arc::clone(&accepted);
            std::thread::spawn(move || {
                for i in 0..WRITES_PER_THREAD {
                    let payload = format!("t{thread} m{i}");
                    if ipclink::write_message(client, payload.as_bytes()).is_ok() {
                        accepted.fetch_add(1, Ordering::Relaxed);
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().expect("writer thread");
    }

    let expected = accepted.load(Ordering::Relaxed) as u64;
    assert!(expected > 0, "no write was accepted");
    wait_until("every accepted message to reach the server", || {
        ipclink::connection_stats(server)
            .expect("open handle")
            .messages_received
            == expected
    });

    let mut drained = 0u64;
    while ipclink::read_message(server).expect("readable").is_some() {
        drained += 1;
    }
    assert_eq!(drained, expected);

    ipclink::close(client);
    ipclink::close(server);
}

#[test]
fn test_concurrent_writers_against_tight_capacity() {
    const THREADS: usize = 4;
    const WRITES_PER_THREAD: usize = 100;
    const CAPACITY: usize = 2;

    let transport = MemoryTransport::new();
    let server = open_server(
        &transport,
        "35",
        ConnectionConfig::local().with_queue_capacity(4096),
    );
    let client = open_client(
        &transport,
        "35",
        ConnectionConfig::local().with_queue_capacity(CAPACITY),
    );
    wait_for_peers(server, 1);

    // With a queue this small the only legal outcomes are acceptance and
    // a synchronous QueueFull; anything else is a bug.
    let accepted = Arc::new(AtomicUsize::new(0));
    let writers: Vec<_> = (0..THREADS)
        .map(|thread| {
            let accepted = Arc::clone(&accepted);
            std::thread::spawn(move || {
                for i in 0..WRITES_PER_THREAD {
                    let payload = format!("t{thread} m{i}");
                    match ipclink::write_message(client, payload.as_bytes()) {
                        Ok(()) => {
                            accepted.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(IpcError::QueueFull { capacity }) => {
                            assert_eq!(capacity, CAPACITY);
                        }
                        Err(other) => panic!("unexpected write failure: {other}"),
                    }
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().expect("writer thread");
    }

    // Accepted writes are delivered exactly once; rejected ones vanish.
    let expected = accepted.load(Ordering::Relaxed) as u64;
    assert!(expected > 0, "no write was accepted");
    wait_until("every accepted message to reach the server", || {
        ipclink::connection_stats(server)
            .expect("open handle")
            .messages_received
            == expected
    });

    let mut drained = 0u64;
    while ipclink::read_message(server).expect("readable").is_some() {
        drained += 1;
    }
    assert_eq!(drained, expected);

    ipclink::close(client);
    ipclink::close(server);
}

#[test]
fn test_empty_reads_from_many_threads() {
    let transport = MemoryTransport::new();
    let server = open_server(&transport, "34", ConnectionConfig::local());
    let client = open_client(&transport, "34", ConnectionConfig::local());

    let readers: Vec<_> = (0..8)
        .map(|_| {
            std::thread::spawn(move || {
                for _ in 0..100 {
                    let outcome = ipclink::read_message(client).expect("readable");
                    assert!(outcome.is_none(), "nothing was ever sent to this client");
                }
            })
        })
        .collect();
    for reader in readers {
        reader.join().expect("reader thread");
    }

    ipclink::close(client);
    ipclink::close(server);
}

#[test]
fn test_roundtrip_over_real_tcp() {
    // Grab an ephemeral port, then hand it to the messaging layer.
    let probe = std::net::TcpListener::bind("127.0.0.1:0").expect("probe bind");
    let port = probe.local_addr().expect("probe addr").port().to_string();
    drop(probe);

    let server = ipclink::open(Mode::Server, "127.0.0.1", &port).expect("open server");
    let client = ipclink::open(Mode::Client, "127.0.0.1", &port).expect("open client");
    wait_for_peers(server, 1);

    ipclink::write_message(client, b"over tcp").expect("write");
    assert_eq!(read_next(server).as_bytes(), b"over tcp");

    ipclink::write_message(server, b"and back").expect("reply");
    assert_eq!(read_next(client).as_bytes(), b"and back");

    ipclink::close(client);
    ipclink::close(server);
}
