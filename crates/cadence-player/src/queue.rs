//! Bounded hand-off queue for interleaved `f32` samples.
//!
//! Every pipeline stage talks to the next through a [`SampleQueue`]:
//! decode thread → (resampler thread →) output callback.
//! Producers block when the queue is full; the output callback only ever uses the
//! non-blocking pop so it stays real-time friendly.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Multi-producer/multi-consumer queue of interleaved samples with a fixed channel count.
///
/// The `closed` flag lives under the same mutex as the samples so that "closed and
/// drained" can be observed atomically.
pub struct SampleQueue {
    channels: usize,
    capacity_samples: usize,
    inner: Mutex<Inner>,
    changed: Condvar,
}

struct Inner {
    samples: VecDeque<f32>,
    closed: bool,
}

/// How a consumer wants to pull frames.
#[derive(Clone, Copy, Debug)]
pub enum Pop {
    /// Wait until exactly `frames` are buffered; `None` if closed short of that.
    Exact { frames: usize },
    /// Wait for at least one frame, then take up to `max_frames`.
    UpTo { max_frames: usize },
    /// Take up to `max_frames` without waiting; `None` when nothing is buffered.
    Available { max_frames: usize },
}

/// Queue capacity in samples for `buffer_seconds` of audio at `rate_hz`.
///
/// Non-finite or non-positive durations fall back to two seconds.
pub fn capacity_for(rate_hz: u32, channels: usize, buffer_seconds: f32) -> usize {
    let secs = if buffer_seconds.is_finite() && buffer_seconds > 0.0 {
        buffer_seconds
    } else {
        2.0
    };
    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels).max(channels)
}

impl SampleQueue {
    pub fn new(channels: usize, capacity_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            capacity_samples: capacity_samples.max(channels),
            inner: Mutex::new(Inner {
                samples: VecDeque::new(),
                closed: false,
            }),
            changed: Condvar::new(),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity_samples / self.channels
    }

    pub fn buffered_frames(&self) -> usize {
        self.lock().samples.len() / self.channels
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Mark the producer side finished. Idempotent.
    pub fn close(&self) {
        self.lock().closed = true;
        self.changed.notify_all();
    }

    /// Push samples, blocking while full. Samples pushed after `close` are dropped.
    pub fn push(&self, samples: &[f32]) {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.lock();
            while g.samples.len() >= self.capacity_samples && !g.closed {
                g = self.wait(g);
            }
            if g.closed {
                return;
            }
            let room = self.capacity_samples - g.samples.len();
            let take = room.min(samples.len() - offset);
            g.samples.extend(&samples[offset..offset + take]);
            offset += take;
            drop(g);
            self.changed.notify_all();
        }
    }

    pub fn pop(&self, how: Pop) -> Option<Vec<f32>> {
        let mut g = self.lock();
        let take_frames = match how {
            Pop::Exact { frames } => {
                let want = frames * self.channels;
                while g.samples.len() < want && !g.closed {
                    g = self.wait(g);
                }
                if g.samples.len() < want {
                    return None;
                }
                frames
            }
            Pop::UpTo { max_frames } => {
                while g.samples.len() < self.channels && !g.closed {
                    g = self.wait(g);
                }
                (g.samples.len() / self.channels).min(max_frames)
            }
            Pop::Available { max_frames } => (g.samples.len() / self.channels).min(max_frames),
        };
        if take_frames == 0 {
            return None;
        }
        let out: Vec<f32> = g.samples.drain(..take_frames * self.channels).collect();
        drop(g);
        self.changed.notify_all();
        Some(out)
    }

    /// Block until the queue is closed and drained, or `cancel` is raised.
    ///
    /// Returns `true` when the queue drained normally.
    pub fn wait_drained_or_cancel(&self, cancel: &AtomicBool) -> bool {
        let mut g = self.lock();
        loop {
            if cancel.load(Ordering::Relaxed) {
                return false;
            }
            if g.closed && g.samples.is_empty() {
                return true;
            }
            g = match self.changed.wait_timeout(g, Duration::from_millis(50)) {
                Ok((g, _)) => g,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn wait<'a>(&self, g: MutexGuard<'a, Inner>) -> MutexGuard<'a, Inner> {
        self.changed.wait(g).unwrap_or_else(|p| p.into_inner())
    }
}
