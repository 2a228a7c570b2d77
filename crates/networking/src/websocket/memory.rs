//! In-process transport for embedding and tests
//!
//! Every successful [`MemoryConnector::connect`] hands the server side of the
//! new transport to [`MemoryPeers`], where it can push frames to the client,
//! read what the client sent, fail or close the connection.

use super::transport::{Connector, Transport};
use async_trait::async_trait;
use futures::channel::mpsc as fmpsc;
use futures::{FutureExt, SinkExt, StreamExt};
use potato_core::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Connector whose transports are in-memory channel pairs
#[derive(Debug)]
pub struct MemoryConnector {
    peers_tx: mpsc::UnboundedSender<MemoryPeer>,
    refuse: AtomicBool,
    attempts: AtomicUsize,
}

impl MemoryConnector {
    pub fn new() -> (Arc<Self>, MemoryPeers) {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            peers_tx,
            refuse: AtomicBool::new(false),
            attempts: AtomicUsize::new(0),
        });
        (connector, MemoryPeers { peers_rx })
    }

    /// Make subsequent handshakes fail (simulates an unreachable server)
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Handshakes attempted so far, refused ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &str) -> Result<Transport> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.refuse.load(Ordering::SeqCst) {
            return Err(Error::Transport("connection refused".to_string()));
        }

        let (to_client, client_rx) = fmpsc::unbounded::<Result<String>>();
        let (client_tx, from_client) = fmpsc::unbounded::<String>();

        let peer = MemoryPeer {
            url: url.to_string(),
            to_client,
            from_client,
        };
        self.peers_tx
            .send(peer)
            .map_err(|_| Error::Transport("no listener for memory transport".to_string()))?;

        Ok(Transport {
            sink: Box::pin(client_tx.sink_map_err(|e| Error::Transport(e.to_string()))),
            stream: Box::pin(client_rx),
        })
    }
}

/// Server-side view of accepted memory transports
#[derive(Debug)]
pub struct MemoryPeers {
    peers_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryPeers {
    /// Wait for the next client connection
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.peers_rx.recv().await
    }

    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.peers_rx.try_recv().ok()
    }
}

/// Server side of one memory transport. Dropping it closes the connection.
#[derive(Debug)]
pub struct MemoryPeer {
    /// URL the client dialed
    pub url: String,
    to_client: fmpsc::UnboundedSender<Result<String>>,
    from_client: fmpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    /// Deliver a text frame to the client
    pub fn push(&self, text: impl Into<String>) -> bool {
        self.to_client.unbounded_send(Ok(text.into())).is_ok()
    }

    /// Surface a transport error on the client's inbound stream
    pub fn fail(&self, error: Error) -> bool {
        self.to_client.unbounded_send(Err(error)).is_ok()
    }

    /// Next frame sent by the client; `None` once the client closed
    pub async fn next_frame(&mut self) -> Option<String> {
        self.from_client.next().await
    }

    /// Frame already sent by the client, without waiting
    pub fn try_next_frame(&mut self) -> Option<String> {
        self.from_client.next().now_or_never().flatten()
    }

    /// Close from the server side
    pub fn close(self) {
        self.to_client.close_channel();
    }
}
