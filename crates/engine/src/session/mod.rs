//! Chat session: the application-owned root that wires the gateway
//! connection, channel subscription and message reconciler together.
//!
//! The host constructs one session at startup, calls [`ChatSession::init`]
//! once it has a token and [`ChatSession::dispose`] on teardown.

use crate::reconciler::{LoadState, MessageReconciler};
use potato_core::{ChannelId, GatewayConfig, Message};
use potato_networking::websocket::TungsteniteConnector;
use potato_networking::{
    ConnectionState, Connector, EventDispatcher, GatewayConnection, ListenerHandle,
    MessageSource, SubscriptionManager,
};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Resources that live between `init` and `dispose`
struct Lifecycle {
    listener: ListenerHandle,
    cancel: CancellationToken,
}

/// Live view of the active channel's messages
pub struct ChatSession {
    connection: GatewayConnection,
    subscriptions: SubscriptionManager,
    reconciler: Arc<RwLock<MessageReconciler>>,
    source: Arc<dyn MessageSource>,
    /// Bumped whenever the message view changes
    revision: Arc<watch::Sender<u64>>,
    lifecycle: Mutex<Option<Lifecycle>>,
}

impl ChatSession {
    pub fn new(
        config: GatewayConfig,
        connector: Arc<dyn Connector>,
        source: Arc<dyn MessageSource>,
    ) -> Self {
        let connection = GatewayConnection::new(config, connector, EventDispatcher::new());
        let subscriptions = SubscriptionManager::new(connection.clone());
        let (revision, _) = watch::channel(0);

        Self {
            connection,
            subscriptions,
            reconciler: Arc::new(RwLock::new(MessageReconciler::new())),
            source,
            revision: Arc::new(revision),
            lifecycle: Mutex::new(None),
        }
    }

    /// Session over a real WebSocket
    pub fn with_websocket(config: GatewayConfig, source: Arc<dyn MessageSource>) -> Self {
        Self::new(config, Arc::new(TungsteniteConnector), source)
    }

    /// Start listening and connect with `token`.
    ///
    /// Calling it again reconnects with the new token; the listener and
    /// resubscriber are only installed once.
    pub fn init(&self, token: &str) {
        {
            let mut lifecycle = self.lock_lifecycle();
            if lifecycle.is_none() {
                let listener = self.register_reconciler();
                let cancel = CancellationToken::new();
                if self.connection.config().resubscribe_on_reconnect {
                    self.subscriptions.spawn_resubscriber(cancel.clone());
                }
                *lifecycle = Some(Lifecycle { listener, cancel });
                info!("Chat session initialized");
            }
        }
        self.connection.connect(token);
    }

    /// Unsubscribe, clear the view and close the gateway
    pub fn dispose(&self) {
        if let Some(lifecycle) = self.lock_lifecycle().take() {
            lifecycle.listener.unregister();
            lifecycle.cancel.cancel();
        }
        self.subscriptions.set_active_channel(None);
        if self.write_view().activate(None) {
            self.bump();
        }
        self.connection.disconnect();
        info!("Chat session disposed");
    }

    /// Switch the viewed channel.
    ///
    /// Clears the view, subscribes on the gateway and starts the history
    /// fetch that seeds the new channel. Re-selecting the active channel
    /// does nothing.
    pub fn set_active_channel(&self, channel: Option<ChannelId>) {
        // The view must accept the channel before its events can arrive
        let (activated, generation) = {
            let mut view = self.write_view();
            (view.activate(channel.clone()), view.generation())
        };
        self.subscriptions.set_active_channel(channel.clone());
        if !activated {
            return;
        }
        self.bump();

        if let Some(channel) = channel {
            self.spawn_history_fetch(channel, generation);
        }
    }

    pub fn active_channel(&self) -> Option<ChannelId> {
        self.subscriptions.active_channel()
    }

    /// Snapshot of the message view, oldest first
    pub fn messages(&self) -> Vec<Message> {
        self.read_view().messages().to_vec()
    }

    /// Borrow the message view without cloning
    pub fn with_messages<R>(&self, f: impl FnOnce(&[Message]) -> R) -> R {
        f(self.read_view().messages())
    }

    pub fn load_state(&self) -> LoadState {
        self.read_view().load_state()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Receives a new revision number each time the view changes
    pub fn watch_changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn connection(&self) -> &GatewayConnection {
        &self.connection
    }

    /// Register additional listeners here
    pub fn dispatcher(&self) -> &EventDispatcher {
        self.connection.dispatcher()
    }

    fn register_reconciler(&self) -> ListenerHandle {
        let reconciler = self.reconciler.clone();
        let revision = self.revision.clone();

        self.connection.dispatcher().register(move |event| {
            let changed = reconciler
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .apply(event)?;
            if changed {
                revision.send_modify(|rev| *rev += 1);
            }
            Ok(())
        })
    }

    fn spawn_history_fetch(&self, channel: ChannelId, generation: u64) {
        let source = self.source.clone();
        let reconciler = self.reconciler.clone();
        let revision = self.revision.clone();

        tokio::spawn(async move {
            let result = source.fetch_messages(&channel).await;

            let changed = {
                let mut view = reconciler
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                match result {
                    Ok(history) => view.seed(generation, history),
                    Err(e) => {
                        error!("Failed to load messages for channel {}: {}", channel, e);
                        view.mark_loaded(generation)
                    }
                }
            };

            if changed {
                revision.send_modify(|rev| *rev += 1);
            }
        });
    }

    fn bump(&self) {
        self.revision.send_modify(|rev| *rev += 1);
    }

    fn read_view(&self) -> RwLockReadGuard<'_, MessageReconciler> {
        self.reconciler
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_view(&self) -> RwLockWriteGuard<'_, MessageReconciler> {
        self.reconciler
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_lifecycle(&self) -> std::sync::MutexGuard<'_, Option<Lifecycle>> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
