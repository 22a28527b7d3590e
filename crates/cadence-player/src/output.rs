//! Output stage (CPAL stream).
//!
//! The real-time callback refills a small local buffer from the queue without blocking,
//! maps channels, applies the volume/fade gain and converts `f32` to the device format.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::gain::GainControl;
use crate::queue::{Pop, SampleQueue};

#[derive(Clone)]
pub struct OutputConfig {
    /// Maximum frames pulled from the queue per refill.
    pub refill_max_frames: usize,
    /// While set the callback writes silence and leaves the queue alone.
    pub paused: Arc<AtomicBool>,
    /// Incremented by the number of source frames written.
    pub played_frames: Arc<AtomicU64>,
    pub gain: Arc<GainControl>,
}

/// Build a CPAL output stream that plays interleaved `f32` from `queue`.
///
/// `queue` must already be at the stream's sample rate.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    queue: &Arc<SampleQueue>,
    cfg: OutputConfig,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, queue, cfg),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, queue, cfg),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, queue, cfg),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, queue, cfg),
        other => Err(anyhow!("unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: &Arc<SampleQueue>,
    cfg: OutputConfig,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let channels_out = config.channels as usize;
    let state = Mutex::new(Refill {
        pos: 0,
        src_channels: queue.channels(),
        src: Vec::new(),
    });
    let refill_max_frames = cfg.refill_max_frames.max(1);
    let queue = queue.clone();
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            if cfg.paused.load(Ordering::Relaxed) {
                data.fill(silence);
                return;
            }
            let mut st = state.lock().unwrap_or_else(|p| p.into_inner());
            let frames = data.len() / channels_out;
            let ramp = cfg.gain.advance(frames);
            let mut filled = 0usize;

            for frame in 0..frames {
                if st.pos >= st.src.len() {
                    st.pos = 0;
                    st.src.clear();
                    match queue.pop(Pop::Available {
                        max_frames: refill_max_frames,
                    }) {
                        Some(v) => st.src = v,
                        None => {
                            data[frame * channels_out..].fill(silence);
                            break;
                        }
                    }
                }
                let gain = ramp.gain_at(frame);
                for ch in 0..channels_out {
                    let sample = mapped_sample(&mut st, channels_out, ch) * gain;
                    data[frame * channels_out + ch] = <T as cpal::Sample>::from_sample(sample);
                }
                filled += 1;
            }
            if filled > 0 {
                cfg.played_frames.fetch_add(filled as u64, Ordering::Relaxed);
            }
        },
        |err| tracing::warn!("stream error: {err}"),
        None,
    )?;
    Ok(stream)
}

struct Refill {
    pos: usize,
    src_channels: usize,
    src: Vec<f32>,
}

/// Sample for output channel `dst_ch` of the current frame.
///
/// Mono is duplicated to stereo, stereo is averaged to mono, other layouts clamp to the
/// last available source channel. `pos` advances after the last output channel.
fn mapped_sample(st: &mut Refill, dst_channels: usize, dst_ch: usize) -> f32 {
    if st.pos >= st.src.len() {
        return 0.0;
    }
    let start = st.pos;
    let get = |ch: usize, st: &Refill| -> f32 {
        if ch < st.src_channels {
            st.src.get(start + ch).copied().unwrap_or(0.0)
        } else {
            0.0
        }
    };
    let out = match (st.src_channels, dst_channels) {
        (2, 1) => 0.5 * (get(0, st) + get(1, st)),
        (1, _) => get(0, st),
        _ => get(dst_ch.min(st.src_channels.saturating_sub(1)), st),
    };
    if dst_ch + 1 == dst_channels {
        st.pos += st.src_channels;
    }
    out
}
