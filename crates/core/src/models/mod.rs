//! Data models for Potato entities and gateway frames

mod gateway;
mod message;

pub use gateway::*;
pub use message::*;
