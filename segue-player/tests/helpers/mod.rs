//! Test helpers for segue-player integration tests
//!
//! - audio_generator: in-memory WAV segments of a given length
//! - test_engine: engine wired to an in-memory fetcher, with event waiters

#![allow(dead_code)]

pub mod audio_generator;
pub mod test_engine;

pub use audio_generator::silent_wav;
pub use test_engine::{fast_config, media_settings, next_event, TestEngine};
