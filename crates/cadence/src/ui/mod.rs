//! Ratatui UI loop.
//!
//! Keys:
//! - Space: play/pause
//! - s: stop
//! - n / p: next / previous
//! - +/-: volume
//! - Left/Right: seek
//! - i / o: fade in / fade out
//! - m: cycle queue policy
//! - l: toggle logs
//! - q: quit

mod app;
mod render;

pub use app::run_tui;
