//! Conversational memory for withyou.
//!
//! - **Session logs**: one ordered, append-only log per
//!   `(user, conversation, channel)`, kept for the process lifetime
//! - **Recall**: keyword overlap over a user's earlier main-channel records
//!
//! The safety channel is written by the safety gate only and is never
//! recalled into specialist context.

pub mod retrieval;
pub mod store;
pub mod types;

pub use retrieval::MemoryRetriever;
pub use store::SessionStore;
pub use types::{MemoryConfig, SessionChannel, SessionKey, TurnRecord};
