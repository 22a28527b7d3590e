//! Volume and fade gain stages.
//!
//! Both stages are shared between the player worker and the real-time output callback, so
//! every value is an `f32` stored as bits in an atomic. The effective gain for a frame is
//! `volume * fade_level`.

use std::sync::atomic::{AtomicU32, Ordering};

pub struct GainControl {
    volume: AtomicU32,
    fade_level: AtomicU32,
    fade_target: AtomicU32,
    /// Change of `fade_level` per output frame while ramping.
    fade_step: AtomicU32,
}

/// Gain snapshot for one output buffer.
#[derive(Clone, Copy, Debug)]
pub struct Ramp {
    volume: f32,
    level: f32,
    target: f32,
    step: f32,
}

impl GainControl {
    pub fn new(volume: f32) -> Self {
        Self {
            volume: AtomicU32::new(clamp_unit(volume).to_bits()),
            fade_level: AtomicU32::new(1.0f32.to_bits()),
            fade_target: AtomicU32::new(1.0f32.to_bits()),
            fade_step: AtomicU32::new(0.0f32.to_bits()),
        }
    }

    pub fn volume(&self) -> f32 {
        load(&self.volume)
    }

    /// Set the volume, clamped to `[0, 1]`. Returns the stored value.
    pub fn set_volume(&self, volume: f32) -> f32 {
        let v = clamp_unit(volume);
        store(&self.volume, v);
        v
    }

    pub fn fade_level(&self) -> f32 {
        load(&self.fade_level)
    }

    /// Ramp the fade level linearly to `target` over `frames` output frames.
    ///
    /// Zero frames jumps immediately.
    pub fn fade_to(&self, target: f32, frames: u64) {
        let target = clamp_unit(target);
        if frames == 0 {
            store(&self.fade_step, 0.0);
            store(&self.fade_target, target);
            store(&self.fade_level, target);
            return;
        }
        let distance = (target - self.fade_level()).abs();
        store(&self.fade_step, distance / frames as f32);
        store(&self.fade_target, target);
    }

    /// Take the gain for the next `frames` frames and advance the fade ramp past them.
    pub fn advance(&self, frames: usize) -> Ramp {
        let ramp = Ramp {
            volume: self.volume(),
            level: self.fade_level(),
            target: load(&self.fade_target),
            step: load(&self.fade_step),
        };
        if ramp.level != ramp.target {
            store(&self.fade_level, ramp.level_at(frames));
        }
        ramp
    }
}

impl Ramp {
    fn level_at(&self, frame: usize) -> f32 {
        if self.step <= 0.0 {
            return self.target;
        }
        let moved = self.step * frame as f32;
        if self.level < self.target {
            (self.level + moved).min(self.target)
        } else {
            (self.level - moved).max(self.target)
        }
    }

    pub fn gain_at(&self, frame: usize) -> f32 {
        self.volume * self.level_at(frame)
    }
}

fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

fn load(a: &AtomicU32) -> f32 {
    f32::from_bits(a.load(Ordering::Relaxed))
}

fn store(a: &AtomicU32, v: f32) {
    a.store(v.to_bits(), Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_volume_clamps() {
        let g = GainControl::new(3.0);
        assert_eq!(g.volume(), 1.0);
        assert_eq!(g.set_volume(-0.5), 0.0);
        assert_eq!(g.set_volume(f32::NAN), 0.0);
        assert_eq!(g.set_volume(0.4), 0.4);
    }

    #[test]
    fn fade_ramps_linearly_and_stops_at_target() {
        let g = GainControl::new(1.0);
        g.fade_to(0.0, 100);
        let ramp = g.advance(50);
        assert_eq!(ramp.gain_at(0), 1.0);
        assert!((ramp.gain_at(25) - 0.75).abs() < 1e-6);
        assert!((g.fade_level() - 0.5).abs() < 1e-6);
        g.advance(500);
        assert_eq!(g.fade_level(), 0.0);
    }

    #[test]
    fn fade_in_after_fade_out_multiplies_volume() {
        let g = GainControl::new(0.5);
        g.fade_to(0.0, 0);
        assert_eq!(g.advance(10).gain_at(5), 0.0);
        g.fade_to(1.0, 10);
        let ramp = g.advance(10);
        assert!((ramp.gain_at(10) - 0.5).abs() < 1e-6);
        assert_eq!(g.fade_level(), 1.0);
    }
}
