//! Playback capability consumed by the controller and the UI tick.
//!
//! [`Playback`] is what the core needs from a media backend; [`cadence_player::Player`]
//! is the concrete implementation.

use std::path::Path;
use std::time::Duration;

use cadence_player::Player;
use cadence_types::{ClockTime, LoadId, PlayerEvent, PlayerState};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("playback backend is offline: {0}")]
    Offline(String),
}

pub trait Playback: Send + Sync {
    /// Load `path`, returning the id its end-of-stream event will carry.
    fn load(&self, path: &Path) -> Result<LoadId, PlaybackError>;
    fn play(&self) -> Result<(), PlaybackError>;
    fn pause(&self) -> Result<(), PlaybackError>;
    fn stop(&self) -> Result<(), PlaybackError>;
    fn seek(&self, position: ClockTime) -> Result<(), PlaybackError>;
    /// Set the volume, returning the value actually applied.
    fn set_volume(&self, volume: f32) -> f32;
    fn volume(&self) -> f32;
    /// Ramp the fade stage to `level` (`0.0` silent, `1.0` full) over `duration`.
    fn fade(&self, level: f32, duration: ClockTime);
    fn position(&self) -> Option<ClockTime>;
    fn duration(&self) -> Option<ClockTime>;
    fn state(&self) -> PlayerState;
    fn poll_event(&self, timeout: Duration) -> Option<PlayerEvent>;
}

fn offline(e: anyhow::Error) -> PlaybackError {
    PlaybackError::Offline(format!("{e:#}"))
}

impl Playback for Player {
    fn load(&self, path: &Path) -> Result<LoadId, PlaybackError> {
        Player::load(self, path).map_err(offline)
    }

    fn play(&self) -> Result<(), PlaybackError> {
        Player::play(self).map_err(offline)
    }

    fn pause(&self) -> Result<(), PlaybackError> {
        Player::pause(self).map_err(offline)
    }

    fn stop(&self) -> Result<(), PlaybackError> {
        Player::stop(self).map_err(offline)
    }

    fn seek(&self, position: ClockTime) -> Result<(), PlaybackError> {
        Player::seek(self, position).map_err(offline)
    }

    fn set_volume(&self, volume: f32) -> f32 {
        Player::set_volume(self, volume)
    }

    fn volume(&self) -> f32 {
        Player::volume(self)
    }

    fn fade(&self, level: f32, duration: ClockTime) {
        Player::fade(self, level, duration)
    }

    fn position(&self) -> Option<ClockTime> {
        Player::position(self)
    }

    fn duration(&self) -> Option<ClockTime> {
        Player::duration(self)
    }

    fn state(&self) -> PlayerState {
        Player::state(self)
    }

    fn poll_event(&self, timeout: Duration) -> Option<PlayerEvent> {
        Player::poll_event(self, timeout)
    }
}
