use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use cadence_types::{ClockTime, PlayerState};

/// Playback status shared between the player worker, session threads and the handle.
#[derive(Debug, Default)]
pub struct PlayerStatus {
    pub state: PlayerState,
    /// Total duration of the loaded track when the container reports it.
    pub duration: Option<ClockTime>,
    /// Effective output sample rate of the running session.
    pub output_rate: Option<u32>,
    /// Output frames produced, pre-seeded with the seek offset.
    pub played_frames: Option<Arc<AtomicU64>>,
    /// Pause flag shared with the output callback.
    pub paused_flag: Option<Arc<AtomicBool>>,
    pub codec: Option<String>,
    /// Set when a seek restarts the pipeline before the new session reports in.
    pub pending_position: Option<ClockTime>,
}

pub type SharedStatus = Arc<Mutex<PlayerStatus>>;

impl PlayerStatus {
    pub fn shared() -> SharedStatus {
        Arc::new(Mutex::new(Self::default()))
    }

    /// Current position, or `None` when nothing is loaded.
    pub fn position(&self) -> Option<ClockTime> {
        if let Some(pending) = self.pending_position {
            return Some(pending);
        }
        match (self.played_frames.as_ref(), self.output_rate) {
            (Some(frames), Some(rate)) => {
                ClockTime::from_frames(frames.load(Ordering::Relaxed), rate)
                    .map(|t| t.clamp_to(self.duration))
            }
            _ => None,
        }
    }

    /// Forget everything about the running session.
    pub fn clear_playback(&mut self) {
        self.state = PlayerState::Idle;
        self.duration = None;
        self.output_rate = None;
        self.played_frames = None;
        self.paused_flag = None;
        self.codec = None;
        self.pending_position = None;
    }
}

pub(crate) fn lock(status: &SharedStatus) -> MutexGuard<'_, PlayerStatus> {
    status.lock().unwrap_or_else(|p| p.into_inner())
}
