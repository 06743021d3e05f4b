//! Local listener that forwards raw TCP to the core and meters it

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::counters::TrafficCounters;
use super::metrics::{ConnectionMetrics, RELAY_BYTES_DOWNLOADED, RELAY_BYTES_UPLOADED};
use crate::common::{shutdown_signalled, Address, Result};
use crate::transport::TcpTransport;

/// Buffer size for each relay direction
const RELAY_BUFFER_SIZE: usize = 32 * 1024;

/// Back-off after a failed accept so a persistent error does not spin
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// A running relay from a local listener to one target.
///
/// [`RelaySession::stop`] returns only once the listener is closed and every
/// connection handler has finished, so the counters no longer change.
pub struct RelaySession {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    accept_task: Option<JoinHandle<()>>,
}

impl RelaySession {
    /// Bind `listen` and start relaying every accepted connection to `target`.
    pub async fn start(
        listen: &str,
        target: Address,
        counters: Arc<TrafficCounters>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(listen).await?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!("Relay listening on {} -> {}", local_addr, target);
        let accept_task = tokio::spawn(accept_loop(
            listener,
            target,
            counters,
            shutdown_rx,
        ));

        Ok(Self {
            local_addr,
            shutdown_tx,
            accept_task: Some(accept_task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, cancel open connections, and wait for all of it to
    /// wind down. Safe to call more than once.
    pub async fn stop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.accept_task.take() {
            if let Err(e) = task.await {
                warn!("Relay accept loop ended abnormally: {}", e);
            }
            info!("Relay on {} stopped", self.local_addr);
        }
    }
}

impl Drop for RelaySession {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn accept_loop(
    listener: TcpListener,
    target: Address,
    counters: Arc<TrafficCounters>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let handler_shutdown = shutdown_rx.clone();
    let mut handlers = JoinSet::new();

    loop {
        tokio::select! {
            _ = shutdown_signalled(&mut shutdown_rx) => break,

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let _ = stream.set_nodelay(true);
                    handlers.spawn(handle_connection(
                        stream,
                        peer,
                        target.clone(),
                        counters.clone(),
                        handler_shutdown.clone(),
                    ));
                }
                Err(e) => {
                    warn!("Relay accept failed: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },

            Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                if let Err(e) = joined {
                    warn!("Relay handler failed: {}", e);
                }
            }
        }
    }

    // Close the listener before draining so no new peer can connect
    drop(listener);
    while let Some(joined) = handlers.join_next().await {
        if let Err(e) = joined {
            warn!("Relay handler failed: {}", e);
        }
    }
}

async fn handle_connection(
    inbound: TcpStream,
    peer: SocketAddr,
    target: Address,
    counters: Arc<TrafficCounters>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let metrics = ConnectionMetrics::accepted();
    let transport = TcpTransport::new();

    let outbound = tokio::select! {
        dialed = transport.connect_tcp(&target) => match dialed {
            Ok(stream) => stream,
            Err(e) => {
                metrics.dial_failed();
                debug!("Relay from {}: dial {} failed: {}", peer, target, e);
                return;
            }
        },
        _ = shutdown_signalled(&mut shutdown_rx) => return,
    };

    tokio::select! {
        (up, down) = relay(inbound, outbound, &counters) => {
            debug!("Relay from {} closed: up={} down={}", peer, up, down);
        }
        _ = shutdown_signalled(&mut shutdown_rx) => {
            debug!("Relay from {} cancelled", peer);
        }
    }
}

/// Copy both directions until each source hits EOF. Returns (up, down).
async fn relay(
    mut inbound: TcpStream,
    mut outbound: TcpStream,
    counters: &TrafficCounters,
) -> (u64, u64) {
    let (mut in_read, mut in_write) = inbound.split();
    let (mut out_read, mut out_write) = outbound.split();

    // Upload: client → target
    let upload = copy_counted(&mut in_read, &mut out_write, |n| {
        counters.add_up(n);
        RELAY_BYTES_UPLOADED.inc_by(n);
    });

    // Download: target → client
    let download = copy_counted(&mut out_read, &mut in_write, |n| {
        counters.add_down(n);
        RELAY_BYTES_DOWNLOADED.inc_by(n);
    });

    tokio::join!(upload, download)
}

/// Copy until EOF or error, reporting each written chunk, then half-close
/// the writer.
async fn copy_counted<R, W>(reader: &mut R, writer: &mut W, mut on_chunk: impl FnMut(u64)) -> u64
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; RELAY_BUFFER_SIZE];
    let mut total: u64 = 0;

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(_) => break,
        };

        if writer.write_all(&buf[..n]).await.is_err() {
            break;
        }

        total += n as u64;
        on_chunk(n as u64);
    }

    let _ = writer.shutdown().await;
    total
}
