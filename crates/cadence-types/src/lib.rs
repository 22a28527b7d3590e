//! Types shared between the playback backend and the player core.
//!
//! Positions and durations are integer nanosecond counts ([`ClockTime`]). An unknown
//! value is expressed as `Option::None`, never as zero.

use std::fmt;
use std::time::Duration;

/// Non-negative media time in nanoseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u64);

impl ClockTime {
    pub const ZERO: ClockTime = ClockTime(0);
    pub const SECOND: ClockTime = ClockTime(1_000_000_000);

    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub const fn from_millis(ms: u64) -> Self {
        Self(ms.saturating_mul(1_000_000))
    }

    pub const fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    /// Convert fractional seconds, saturating negative and non-finite input to zero.
    pub fn from_secs_f64(secs: f64) -> Self {
        if !secs.is_finite() || secs <= 0.0 {
            return Self::ZERO;
        }
        Self((secs * 1e9).min(u64::MAX as f64) as u64)
    }

    /// Time covered by `frames` at `rate_hz`; `None` for a zero rate.
    pub fn from_frames(frames: u64, rate_hz: u32) -> Option<Self> {
        if rate_hz == 0 {
            return None;
        }
        let nanos = (frames as u128 * 1_000_000_000u128) / rate_hz as u128;
        Some(Self(nanos.min(u64::MAX as u128) as u64))
    }

    pub const fn nanos(self) -> u64 {
        self.0
    }

    pub const fn millis(self) -> u64 {
        self.0 / 1_000_000
    }

    pub fn secs_f64(self) -> f64 {
        self.0 as f64 / 1e9
    }

    /// Number of frames at `rate_hz` that this time spans (rounded down).
    pub fn frames_at(self, rate_hz: u32) -> u64 {
        ((self.0 as u128 * rate_hz as u128) / 1_000_000_000u128) as u64
    }

    pub const fn saturating_add(self, other: ClockTime) -> ClockTime {
        ClockTime(self.0.saturating_add(other.0))
    }

    pub const fn saturating_sub(self, other: ClockTime) -> ClockTime {
        ClockTime(self.0.saturating_sub(other.0))
    }

    /// Clamp into `[0, max]` when an upper bound is known.
    pub fn clamp_to(self, max: Option<ClockTime>) -> ClockTime {
        match max {
            Some(max) => self.min(max),
            None => self,
        }
    }
}

impl From<Duration> for ClockTime {
    fn from(value: Duration) -> Self {
        Self(value.as_nanos().min(u64::MAX as u128) as u64)
    }
}

impl From<ClockTime> for Duration {
    fn from(value: ClockTime) -> Self {
        Duration::from_nanos(value.0)
    }
}

/// Formats as `m:ss` (or `h:mm:ss` past the hour).
impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0 / 1_000_000_000;
        let (h, m, s) = (total / 3600, (total / 60) % 60, total % 60);
        if h > 0 {
            write!(f, "{h}:{m:02}:{s:02}")
        } else {
            write!(f, "{m}:{s:02}")
        }
    }
}

/// Coarse transport state of the playback backend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlayerState {
    #[default]
    Idle,
    Playing,
    Paused,
}

/// Identifies one `load` on the playback backend; each load gets a larger id.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadId(pub u64);

impl fmt::Display for LoadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Asynchronous notifications emitted by the playback backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayerEvent {
    /// The track from `load` played through to its end (or failed to play).
    EndOfStream { load: LoadId },
    /// A metadata tag discovered while opening the stream.
    Tag { key: String, value: String },
    /// Playback of the loaded track failed; an `EndOfStream` follows.
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_frames_handles_zero_rate() {
        assert_eq!(ClockTime::from_frames(100, 0), None);
        assert_eq!(
            ClockTime::from_frames(96_000, 48_000),
            Some(ClockTime::from_secs(2))
        );
    }

    #[test]
    fn frames_at_inverts_from_frames() {
        let t = ClockTime::from_millis(1_500);
        assert_eq!(t.frames_at(44_100), 66_150);
    }

    #[test]
    fn from_secs_f64_rejects_negative_and_nan() {
        assert_eq!(ClockTime::from_secs_f64(-1.0), ClockTime::ZERO);
        assert_eq!(ClockTime::from_secs_f64(f64::NAN), ClockTime::ZERO);
        assert_eq!(ClockTime::from_secs_f64(0.25), ClockTime::from_millis(250));
    }

    #[test]
    fn clamp_to_respects_unknown_bound() {
        let t = ClockTime::from_secs(90);
        assert_eq!(t.clamp_to(None), t);
        assert_eq!(
            t.clamp_to(Some(ClockTime::from_secs(60))),
            ClockTime::from_secs(60)
        );
    }

    #[test]
    fn display_formats_minutes_and_hours() {
        assert_eq!(ClockTime::from_secs(65).to_string(), "1:05");
        assert_eq!(ClockTime::from_secs(3_725).to_string(), "1:02:05");
    }
}
