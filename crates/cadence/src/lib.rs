//! `cadence`: a terminal music player over an indexed SQLite catalog.
//!
//! The catalog indexes audio files incrementally, the sequencer decides what plays next
//! under a queue policy, and the controller drives the playback backend.

pub mod catalog;
pub mod cli;
pub mod config;
pub mod controller;
pub mod logging;
pub mod playback;
pub mod sequencer;
pub mod session;
pub mod ui;

#[cfg(test)]
mod test_support;

pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("GIT_SHA"),
    ", ",
    env!("BUILD_DATE"),
    ")"
);
