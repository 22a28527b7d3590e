//! In-memory stand-ins for the playback backend and the catalog.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use cadence_types::{ClockTime, LoadId, PlayerEvent, PlayerState};

use crate::catalog::{CatalogError, TrackRecord};
use crate::playback::{Playback, PlaybackError};
use crate::sequencer::TrackSource;

/// Records every transport call as a short string and tracks state like a real backend.
#[derive(Default)]
pub struct FakePlayback {
    pub calls: Mutex<Vec<String>>,
    pub state: Mutex<PlayerState>,
    pub volume: Mutex<f32>,
    pub position: Mutex<Option<ClockTime>>,
    pub duration: Mutex<Option<ClockTime>>,
    pub loads: Mutex<u64>,
}

impl FakePlayback {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn take_calls(&self) -> Vec<String> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }
}

impl Playback for FakePlayback {
    fn load(&self, path: &Path) -> Result<LoadId, PlaybackError> {
        self.record(format!("load {}", path.display()));
        let mut loads = self.loads.lock().unwrap();
        *loads += 1;
        Ok(LoadId(*loads))
    }

    fn play(&self) -> Result<(), PlaybackError> {
        *self.state.lock().unwrap() = PlayerState::Playing;
        self.record("play".to_string());
        Ok(())
    }

    fn pause(&self) -> Result<(), PlaybackError> {
        *self.state.lock().unwrap() = PlayerState::Paused;
        self.record("pause".to_string());
        Ok(())
    }

    fn stop(&self) -> Result<(), PlaybackError> {
        *self.state.lock().unwrap() = PlayerState::Idle;
        self.record("stop".to_string());
        Ok(())
    }

    fn seek(&self, position: ClockTime) -> Result<(), PlaybackError> {
        self.record(format!("seek {}", position.millis()));
        Ok(())
    }

    fn set_volume(&self, volume: f32) -> f32 {
        let v = volume.clamp(0.0, 1.0);
        *self.volume.lock().unwrap() = v;
        v
    }

    fn volume(&self) -> f32 {
        *self.volume.lock().unwrap()
    }

    fn fade(&self, level: f32, duration: ClockTime) {
        self.record(format!("fade {level} {}", duration.millis()));
    }

    fn position(&self) -> Option<ClockTime> {
        *self.position.lock().unwrap()
    }

    fn duration(&self) -> Option<ClockTime> {
        *self.duration.lock().unwrap()
    }

    fn state(&self) -> PlayerState {
        *self.state.lock().unwrap()
    }

    fn poll_event(&self, _timeout: Duration) -> Option<PlayerEvent> {
        None
    }
}

/// A catalog with nothing in it.
pub struct EmptySource;

#[async_trait]
impl TrackSource for EmptySource {
    async fn get_random_track(&self) -> Result<TrackRecord, CatalogError> {
        Err(CatalogError::NotFound("empty".to_string()))
    }

    async fn get_random_album(&self) -> Result<String, CatalogError> {
        Err(CatalogError::NotFound("empty".to_string()))
    }

    async fn get_random_artist(&self) -> Result<String, CatalogError> {
        Err(CatalogError::NotFound("empty".to_string()))
    }

    async fn get_album_tracks(&self, _name: &str) -> Result<Vec<TrackRecord>, CatalogError> {
        Ok(Vec::new())
    }

    async fn get_artist_tracks(&self, _name: &str) -> Result<Vec<TrackRecord>, CatalogError> {
        Ok(Vec::new())
    }
}
