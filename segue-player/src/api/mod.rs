//! HTTP surface of the player
//!
//! The producer (or a bridge in front of it) posts inbound messages to
//! `/ingress` and listens on `/signals`; hosts use `/events`, `/playback/*`
//! and `/health`.

pub mod handlers;
pub mod server;

pub use server::{build_router, run, AppContext};
