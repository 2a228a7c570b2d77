//! Active channel subscription tracking

use super::connection::GatewayConnection;
use super::ConnectionState;
use potato_core::{ChannelId, OutboundFrame};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Keeps exactly one channel (or none) subscribed on the gateway
#[derive(Clone)]
pub struct SubscriptionManager {
    connection: GatewayConnection,
    active: Arc<Mutex<Option<ChannelId>>>,
}

impl SubscriptionManager {
    pub fn new(connection: GatewayConnection) -> Self {
        Self {
            connection,
            active: Arc::new(Mutex::new(None)),
        }
    }

    pub fn active_channel(&self) -> Option<ChannelId> {
        self.lock().clone()
    }

    /// Switch the active channel.
    ///
    /// Sends UNSUBSCRIBE for the previous channel and SUBSCRIBE for the new
    /// one. Setting the channel that is already active sends nothing. Frames
    /// are dropped while the gateway is not connected; see
    /// [`SubscriptionManager::spawn_resubscriber`].
    pub fn set_active_channel(&self, channel: Option<ChannelId>) {
        let mut active = self.lock();
        if *active == channel {
            return;
        }

        if let Some(previous) = active.take() {
            debug!("Unsubscribing from channel {}", previous);
            self.connection.send(&OutboundFrame::unsubscribe(&previous));
        }

        *active = channel;

        if let Some(next) = active.as_ref() {
            debug!("Subscribing to channel {}", next);
            self.connection.send(&OutboundFrame::subscribe(next));
        }
    }

    /// Send SUBSCRIBE again for the active channel, if any
    pub fn resubscribe(&self) {
        let active = self.lock();
        if let Some(channel) = active.as_ref() {
            info!("Re-subscribing to channel {}", channel);
            self.connection.send(&OutboundFrame::subscribe(channel));
        }
    }

    /// Re-send the active subscription every time the gateway reaches
    /// Connected, until `cancel` fires.
    pub fn spawn_resubscriber(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = self.clone();
        let mut states = self.connection.watch_state();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = states.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let state = *states.borrow_and_update();
                        if state == ConnectionState::Connected {
                            manager.resubscribe();
                        }
                    }
                }
            }
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<ChannelId>> {
        self.active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
