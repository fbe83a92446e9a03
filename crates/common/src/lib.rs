//! Common types shared across the withyou crates.
//!
//! This crate provides the error type, the turn input model and the input
//! hygiene helpers that every stage of the pipeline relies on.

pub mod error;
pub mod message;
pub mod security;

pub use error::{Result, WithYouError};
pub use message::{MessageRole, Phq9Answers, TurnInput, TurnMetadata, now_millis};
