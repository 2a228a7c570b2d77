//! WebSocket gateway for real-time updates
//!
//! [`GatewayConnection`] owns the socket and its reconnection policy,
//! [`EventDispatcher`] fans decoded events out to listeners and
//! [`SubscriptionManager`] keeps the single active channel subscribed.

mod connection;
mod dispatcher;
pub mod memory;
mod subscriptions;
mod transport;

pub use connection::GatewayConnection;
pub use dispatcher::{EventDispatcher, Listener, ListenerHandle};
pub use subscriptions::SubscriptionManager;
pub use transport::{Connector, FrameSink, FrameStream, Transport, TungsteniteConnector};

use serde::Serialize;

/// WebSocket connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "Disconnected"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Reconnecting => write!(f, "Reconnecting"),
        }
    }
}
