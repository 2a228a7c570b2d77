//! Potato Networking - Gateway WebSocket client, subscriptions, and REST client

pub mod api;
pub mod http;
pub mod websocket;

pub use http::{ChatClient, MessageSource};
pub use websocket::{
    ConnectionState, Connector, EventDispatcher, GatewayConnection, ListenerHandle,
    SubscriptionManager, TungsteniteConnector,
};
