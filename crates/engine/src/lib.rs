//! Potato Engine - Message reconciliation and the chat session root

pub mod reconciler;
pub mod session;

pub use reconciler::{LoadState, MessageReconciler};
pub use session::ChatSession;
