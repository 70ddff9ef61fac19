//! # Subliminal Common Library
//!
//! Shared code for the subliminal session services including:
//! - Event types (SublEvent enum) and the EventBus
//! - Session model (affirmations, voice settings, mix settings, resume snapshot)
//! - Resume snapshot storage
//! - Configuration file resolution

pub mod config;
pub mod error;
pub mod events;
pub mod session;
pub mod store;

pub use error::{Error, Result};
