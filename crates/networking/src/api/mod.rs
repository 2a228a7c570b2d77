//! High-level API wrappers for Potato endpoints
//!
//! This module adds input validation and paging on top of the raw HTTP
//! client.

mod messages;

pub use messages::*;
