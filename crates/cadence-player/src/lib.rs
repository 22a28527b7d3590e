//! Local playback backend for cadence.
//!
//! A [`engine::Player`] owns a worker thread that turns load/play/pause/seek commands into
//! playback sessions. Each session runs the pipeline:
//! 1. **Decode**: a background thread uses Symphonia to decode the file into interleaved `f32`.
//! 2. **Resample**: when the device rate differs, Rubato converts to the device rate.
//! 3. **Output**: the CPAL callback drains the queue without blocking and applies gain.
//!
//! Stages communicate through bounded [`queue::SampleQueue`]s.

pub mod config;
pub mod decode;
pub mod device;
pub mod engine;
pub mod gain;
pub mod output;
pub mod queue;
pub mod resample;
pub mod status;

pub use cadence_types::{ClockTime, LoadId, PlayerEvent, PlayerState};
pub use config::PlayerConfig;
pub use engine::Player;
