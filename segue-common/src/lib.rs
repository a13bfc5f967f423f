//! # Segue Common Library
//!
//! Shared code for the Segue player and anything that talks to it:
//! - Wire contract with the segment producer (inbound/outbound messages)
//! - Host-facing event types (PlayerEvent enum)
//! - Configuration file resolution
//! - Timestamp helpers

pub mod config;
pub mod error;
pub mod events;
pub mod time;

pub use error::{Error, Result};
pub use events::{OutboundMessage, PlayerEvent, PlayerState};
