//! Gateway connection lifecycle and reconnection
//!
//! State machine:
//!
//! ```text
//! Disconnected --connect--> Connecting --open--> Connected
//!      ^                      |    ^                 |
//!      |                close/error |           close/error
//!  disconnect                 v    |                 v
//!  (from any)             Reconnecting <-------------+
//!                              |
//!                        after delay: Connecting (last token)
//! ```
//!
//! Each transport attempt runs in its own task and is tagged with an attempt
//! number. Callbacks from an attempt that has since been replaced or torn
//! down are ignored, so a late close can never schedule a reconnect.

use super::dispatcher::EventDispatcher;
use super::transport::{Connector, Transport, TungsteniteConnector};
use super::ConnectionState;
use futures::{SinkExt, StreamExt};
use potato_core::{GatewayConfig, GatewayEvent, OutboundFrame};
use rand::Rng;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The transport attempt currently owned by the connection
struct ActiveAttempt {
    id: u64,
    cancel: CancellationToken,
}

struct PendingReconnect {
    id: u64,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct Inner {
    /// Credential from the most recent `connect`; `None` after `disconnect`
    token: Option<String>,
    next_id: u64,
    attempt: Option<ActiveAttempt>,
    /// Present only while Connected
    outbound: Option<mpsc::UnboundedSender<String>>,
    reconnect: Option<PendingReconnect>,
}

impl Inner {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn is_current(&self, attempt_id: u64) -> bool {
        self.attempt.as_ref().map(|a| a.id) == Some(attempt_id)
    }
}

struct Shared {
    config: GatewayConfig,
    connector: Arc<dyn Connector>,
    dispatcher: EventDispatcher,
    state_tx: watch::Sender<ConnectionState>,
    inner: Mutex<Inner>,
}

/// Long-lived gateway connection with automatic reconnection.
///
/// Cheap to clone; all clones drive the same socket. Methods that start
/// work (`connect`, reconnection) spawn onto the current Tokio runtime.
#[derive(Clone)]
pub struct GatewayConnection {
    shared: Arc<Shared>,
}

impl GatewayConnection {
    pub fn new(
        config: GatewayConfig,
        connector: Arc<dyn Connector>,
        dispatcher: EventDispatcher,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                dispatcher,
                state_tx,
                inner: Mutex::new(Inner::default()),
            }),
        }
    }

    /// Connection backed by a real WebSocket
    pub fn with_websocket(config: GatewayConfig, dispatcher: EventDispatcher) -> Self {
        Self::new(config, Arc::new(TungsteniteConnector), dispatcher)
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// Observe state transitions
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.shared.dispatcher
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.shared.config
    }

    /// Store the token and start a fresh connection attempt.
    ///
    /// Any existing transport or pending reconnect is torn down first.
    pub fn connect(&self, token: impl Into<String>) {
        let mut inner = self.lock();
        inner.token = Some(token.into());
        self.teardown(&mut inner);
        self.start_attempt(&mut inner);
    }

    /// Close the transport, cancel any pending reconnect and forget the token.
    /// Safe to call in any state, any number of times.
    pub fn disconnect(&self) {
        let mut inner = self.lock();
        inner.token = None;
        self.teardown(&mut inner);
        self.set_state(ConnectionState::Disconnected);
    }

    /// Fire-and-forget send. Dropped silently unless Connected.
    pub fn send(&self, frame: &OutboundFrame) {
        let inner = self.lock();
        let Some(outbound) = inner.outbound.as_ref() else {
            debug!(
                "Dropping {} frame: gateway is {}",
                frame.operation,
                self.state()
            );
            return;
        };

        match frame.encode() {
            Ok(text) => {
                if outbound.send(text).is_err() {
                    debug!("Dropping {} frame: transport closing", frame.operation);
                }
            }
            Err(e) => warn!("Failed to encode {} frame: {}", frame.operation, e),
        }
    }

    /// Whether a reconnection timer is currently pending
    pub fn reconnect_pending(&self) -> bool {
        self.lock().reconnect.is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, next: ConnectionState) {
        let changed = self.shared.state_tx.send_if_modified(|state| {
            if *state == next {
                false
            } else {
                *state = next;
                true
            }
        });
        if changed {
            info!("Gateway {}", next);
        }
    }

    fn teardown(&self, inner: &mut Inner) {
        if let Some(pending) = inner.reconnect.take() {
            pending.handle.abort();
        }
        if let Some(attempt) = inner.attempt.take() {
            attempt.cancel.cancel();
        }
        inner.outbound = None;
    }

    fn start_attempt(&self, inner: &mut Inner) {
        let Some(token) = inner.token.clone() else {
            return;
        };
        let id = inner.next_id();
        let cancel = CancellationToken::new();
        inner.attempt = Some(ActiveAttempt {
            id,
            cancel: cancel.clone(),
        });
        self.set_state(ConnectionState::Connecting);

        let this = self.clone();
        tokio::spawn(async move { this.run_attempt(id, token, cancel).await });
    }

    async fn run_attempt(self, id: u64, token: String, cancel: CancellationToken) {
        let url = match self.shared.config.gateway_url(&token) {
            Ok(url) => url,
            Err(e) => {
                warn!("Cannot build gateway URL: {}", e);
                self.handle_close(id);
                return;
            }
        };

        debug!(
            "Opening gateway transport to {}://{}{} (attempt {})",
            url.scheme(),
            url.host_str().unwrap_or_default(),
            url.path(),
            id
        );

        let opened = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            opened = self.shared.connector.connect(url.as_str()) => opened,
        };

        let Transport { mut sink, mut stream } = match opened {
            Ok(transport) => transport,
            Err(e) => {
                warn!("Gateway connection failed: {}", e);
                self.handle_close(id);
                return;
            }
        };

        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
        if !self.handle_open(id, outbound_tx) {
            let _ = sink.close().await;
            return;
        }

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // Frames sent before the teardown still go out
                    while let Ok(text) = outbound_rx.try_recv() {
                        if sink.send(text).await.is_err() {
                            break;
                        }
                    }
                    let _ = sink.close().await;
                    return;
                }
                outbound = outbound_rx.recv() => match outbound {
                    Some(text) => {
                        if let Err(e) = sink.send(text).await {
                            warn!("Gateway send failed: {}", e);
                            break;
                        }
                    }
                    None => break,
                },
                inbound = stream.next() => match inbound {
                    Some(Ok(text)) => self.handle_frame(&text),
                    Some(Err(e)) => {
                        warn!("Gateway transport error: {}", e);
                        break;
                    }
                    None => break,
                },
            }
        }

        // Errors and clean closes take the same path
        let _ = sink.close().await;
        self.handle_close(id);
    }

    fn handle_open(&self, id: u64, outbound: mpsc::UnboundedSender<String>) -> bool {
        let mut inner = self.lock();
        if !inner.is_current(id) {
            return false;
        }
        inner.outbound = Some(outbound);
        self.set_state(ConnectionState::Connected);
        true
    }

    fn handle_frame(&self, text: &str) {
        match GatewayEvent::decode(text) {
            Ok(event) => {
                debug!("Gateway event {}", event.event_type);
                self.shared.dispatcher.dispatch(&event);
            }
            Err(e) => debug!("Dropping gateway frame: {}", e),
        }
    }

    fn handle_close(&self, id: u64) {
        let mut inner = self.lock();
        if !inner.is_current(id) {
            return;
        }
        inner.attempt = None;
        inner.outbound = None;
        if inner.token.is_none() {
            self.set_state(ConnectionState::Disconnected);
            return;
        }
        self.set_state(ConnectionState::Reconnecting);
        self.schedule_reconnect(&mut inner);
    }

    /// At most one timer is pending; a second request is a no-op
    fn schedule_reconnect(&self, inner: &mut Inner) {
        if inner.reconnect.is_some() {
            debug!("Reconnect already scheduled");
            return;
        }

        let delay = self.reconnect_delay();
        let id = inner.next_id();
        let this = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.fire_reconnect(id);
        });
        inner.reconnect = Some(PendingReconnect { id, handle });
        info!("Reconnecting in {}ms", delay.as_millis());
    }

    fn fire_reconnect(&self, timer_id: u64) {
        let mut inner = self.lock();
        if inner.reconnect.as_ref().map(|p| p.id) != Some(timer_id) {
            return;
        }
        inner.reconnect = None;
        if inner.token.is_none() || inner.attempt.is_some() {
            return;
        }
        self.start_attempt(&mut inner);
    }

    fn reconnect_delay(&self) -> Duration {
        let base = self.shared.config.reconnect_delay();
        let jitter = self.shared.config.reconnect_jitter();
        if jitter.is_zero() {
            return base;
        }
        base + rand::thread_rng().gen_range(Duration::ZERO..=jitter)
    }
}
