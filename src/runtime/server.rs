//! mio event loop.
//!
//! Readiness-based model: poll tells us when sockets are ready, then the
//! owning connection performs non-blocking read/write syscalls.
//! Uses epoll on Linux, kqueue on macOS.
//!
//! Each worker thread runs its own poll loop with its own `SO_REUSEPORT`
//! listener, so every connection lives on exactly one thread and its
//! callbacks never run concurrently.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use tracing::{debug, error, info, warn};

use super::connection::{Connection, ConnectionRegistry, Limits, Step};
use crate::config::Config;
use crate::handlers::MessageHandler;

const LISTENER_TOKEN: Token = Token(usize::MAX);

/// Settings a worker needs, copied out of the process config.
#[derive(Debug, Clone, Copy)]
pub(super) struct WorkerConfig {
    pub max_connections: usize,
    pub batch_size: usize,
    pub limits: Limits,
}

/// Run the server until a worker fails to start.
pub fn run(config: &Config, handler: Arc<dyn MessageHandler>) -> io::Result<()> {
    let addr: SocketAddr = config
        .listen
        .parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

    let worker_config = WorkerConfig {
        max_connections: config.max_connections,
        batch_size: config.batch_size,
        limits: config.limits,
    };

    info!(
        workers = config.workers,
        addr = %addr,
        handler = ?config.handler,
        "Starting mio runtime"
    );

    let mut handles = Vec::with_capacity(config.workers);

    for worker_id in 0..config.workers {
        let handler = Arc::clone(&handler);
        // SO_REUSEPORT lets the kernel spread accepts across workers
        let listener = create_listener_with_reuseport(addr)?;

        let handle = thread::Builder::new()
            .name(format!("worker-{worker_id}"))
            .spawn(move || {
                if let Err(e) = worker_loop(worker_id, listener, worker_config, handler) {
                    error!(worker = worker_id, error = %e, "Worker failed");
                }
            })?;

        handles.push(handle);
    }

    // Wait for all workers
    for handle in handles {
        let _ = handle.join();
    }

    Ok(())
}

/// Serve connections accepted on `listener`, which must be non-blocking.
pub(super) fn worker_loop(
    worker_id: usize,
    listener: std::net::TcpListener,
    config: WorkerConfig,
    handler: Arc<dyn MessageHandler>,
) -> io::Result<()> {
    let mut poll = Poll::new()?;
    let mut events = Events::with_capacity(config.batch_size);

    let mut listener = TcpListener::from_std(listener);
    poll.registry()
        .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

    let mut connections: ConnectionRegistry<TcpStream> =
        ConnectionRegistry::new(config.max_connections);

    info!(
        worker = worker_id,
        max_connections = config.max_connections,
        chunk_size = config.limits.chunk_size,
        "Worker started"
    );

    loop {
        if let Err(e) = poll.poll(&mut events, None) {
            if e.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(e);
        }

        for event in events.iter() {
            match event.token() {
                LISTENER_TOKEN => {
                    accept_connections(
                        &listener,
                        &poll,
                        &mut connections,
                        &handler,
                        config.limits,
                        worker_id,
                    );
                }
                Token(conn_id) => {
                    let Some(conn) = connections.get_mut(conn_id) else {
                        continue;
                    };
                    let readable = event.is_readable() || event.is_read_closed();
                    let writable = event.is_writable() || event.is_write_closed();
                    if conn.service(readable, writable, poll.registry()) == Step::Closed {
                        connections.remove(conn_id);
                        debug!(
                            worker = worker_id,
                            conn_id,
                            live = connections.len(),
                            "Released connection"
                        );
                    }
                }
            }
        }
    }
}

fn accept_connections(
    listener: &TcpListener,
    poll: &Poll,
    connections: &mut ConnectionRegistry<TcpStream>,
    handler: &Arc<dyn MessageHandler>,
    limits: Limits,
    worker_id: usize,
) {
    loop {
        match listener.accept() {
            Ok((stream, peer_addr)) => {
                let inserted = connections.insert_with(|id| {
                    Connection::new(id, stream, Some(peer_addr), Arc::clone(handler), limits)
                });
                let Some(conn_id) = inserted else {
                    warn!(peer = %peer_addr, "Connection limit reached");
                    continue;
                };

                let registered = match connections.get_mut(conn_id) {
                    Some(conn) => conn.register(poll.registry()),
                    None => continue,
                };
                if let Err(e) = registered {
                    warn!(conn_id, error = %e, "Failed to register connection");
                    connections.remove(conn_id);
                    continue;
                }

                debug!(
                    worker = worker_id,
                    conn_id,
                    peer = %peer_addr,
                    "Accepted connection"
                );
            }
            Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => break,
            Err(e) => {
                error!("Accept error: {}", e);
                break;
            }
        }
    }
}

/// Create a TCP listener with SO_REUSEPORT for kernel load balancing.
fn create_listener_with_reuseport(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_port(true)?;
    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    Ok(socket.into())
}
