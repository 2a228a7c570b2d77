//! Potato Core - Shared data models, types, configuration, and errors

pub mod config;
pub mod errors;
pub mod models;
pub mod types;

pub use config::GatewayConfig;
pub use errors::{Error, Result};
pub use models::*;
pub use types::*;
