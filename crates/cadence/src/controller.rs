//! Decision logic between the queue and the playback backend.

use std::sync::Arc;
use std::time::Duration;

use cadence_types::{ClockTime, LoadId, PlayerState};
use thiserror::Error;

use crate::catalog::{CatalogError, TrackRecord};
use crate::playback::{Playback, PlaybackError};
use crate::sequencer::{Policy, QueueError, Sequencer, TrackSource};

pub const VOLUME_STEP: f32 = 0.1;
pub const QUIT_FADE: ClockTime = ClockTime::SECOND;

/// What asked for the next track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// The backend reported end-of-stream.
    EndOfTrack,
    /// The user pressed "next".
    User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Playing(TrackRecord),
    /// Nothing left to play after an explicit request; the session continues.
    EndOfQueue,
    /// The queue ran dry on its own; the session should end.
    Quit,
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    pub seek_step: ClockTime,
    pub fade: ClockTime,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            seek_step: ClockTime::SECOND,
            fade: ClockTime::from_millis(500),
        }
    }
}

pub struct Controller<S> {
    sequencer: Sequencer<S>,
    playback: Arc<dyn Playback>,
    cfg: ControllerConfig,
    /// The backend load of the current track.
    loaded: Option<LoadId>,
}

impl<S: TrackSource> Controller<S> {
    pub fn new(sequencer: Sequencer<S>, playback: Arc<dyn Playback>, cfg: ControllerConfig) -> Self {
        Self {
            sequencer,
            playback,
            cfg,
            loaded: None,
        }
    }

    pub fn sequencer(&self) -> &Sequencer<S> {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut Sequencer<S> {
        &mut self.sequencer
    }

    pub fn set_policy(&mut self, policy: Policy) {
        self.sequencer.set_policy(policy);
    }

    /// Move to the next track and start it.
    pub async fn advance(&mut self, trigger: Trigger) -> Result<Advance, ControllerError> {
        match self.sequencer.next().await {
            Ok(track) => {
                self.start(&track)?;
                Ok(Advance::Playing(track))
            }
            Err(QueueError::EndOfQueue) => {
                tracing::info!(?trigger, "end of queue");
                Ok(match trigger {
                    Trigger::EndOfTrack => Advance::Quit,
                    Trigger::User => Advance::EndOfQueue,
                })
            }
            Err(QueueError::Catalog(e)) => Err(e.into()),
        }
    }

    /// The backend finished the track from `load`. Ends from earlier loads are ignored.
    pub async fn track_ended(&mut self, load: LoadId) -> Result<Option<Advance>, ControllerError> {
        if self.loaded != Some(load) {
            tracing::debug!(%load, current = ?self.loaded, "ignoring stale end of stream");
            return Ok(None);
        }
        self.advance(Trigger::EndOfTrack).await.map(Some)
    }

    /// Step back in history and (re)start the resulting current track.
    pub fn previous(&mut self) -> Result<Option<TrackRecord>, ControllerError> {
        let Some(track) = self.sequencer.previous().cloned() else {
            return Ok(None);
        };
        self.start(&track)?;
        Ok(Some(track))
    }

    fn start(&mut self, track: &TrackRecord) -> Result<(), PlaybackError> {
        tracing::info!(path = %track.file_path, "now playing");
        self.playback.stop()?;
        self.loaded = Some(self.playback.load(track.path())?);
        self.playback.play()
    }

    /// Pause when playing, resume when paused, otherwise start the current or next track.
    pub async fn toggle_pause(&mut self) -> Result<Option<Advance>, ControllerError> {
        match self.playback.state() {
            PlayerState::Playing => self.playback.pause()?,
            PlayerState::Paused => self.playback.play()?,
            PlayerState::Idle => match self.sequencer.current().cloned() {
                Some(track) => self.start(&track)?,
                None => return self.advance(Trigger::User).await.map(Some),
            },
        }
        Ok(None)
    }

    pub fn stop(&self) -> Result<(), ControllerError> {
        Ok(self.playback.stop()?)
    }

    pub fn change_volume(&self, delta: f32) -> f32 {
        self.playback.set_volume(self.playback.volume() + delta)
    }

    pub fn set_volume(&self, volume: f32) -> f32 {
        self.playback.set_volume(volume)
    }

    /// Seek to `position`, clamped to the known duration. No-op when nothing is loaded.
    pub fn seek_to(&self, position: ClockTime) -> Result<Option<ClockTime>, ControllerError> {
        if self.playback.position().is_none() {
            return Ok(None);
        }
        let target = position.clamp_to(self.playback.duration());
        self.playback.seek(target)?;
        Ok(Some(target))
    }

    /// Seek one configured step forward or backward from the current position.
    pub fn seek_step(&self, forward: bool) -> Result<Option<ClockTime>, ControllerError> {
        let Some(position) = self.playback.position() else {
            return Ok(None);
        };
        let target = if forward {
            position.saturating_add(self.cfg.seek_step)
        } else {
            position.saturating_sub(self.cfg.seek_step)
        };
        self.seek_to(target)
    }

    pub fn fade_in(&self) {
        self.playback.fade(1.0, self.cfg.fade);
    }

    pub fn fade_out(&self) {
        self.playback.fade(0.0, self.cfg.fade);
    }

    /// Fade out over [`QUIT_FADE`] if something is playing, then stop.
    pub async fn shutdown(&self) -> Result<(), ControllerError> {
        if self.playback.state() == PlayerState::Playing {
            self.playback.fade(0.0, QUIT_FADE);
            tokio::time::sleep(Duration::from(QUIT_FADE)).await;
        }
        Ok(self.playback.stop()?)
    }
}
