//! Streaming resample stage.
//!
//! Converts decoded audio from the source rate to the device rate with Rubato's sinc
//! resampler on a background thread, writing into a fresh [`SampleQueue`].

use std::sync::Arc;
use std::thread;

use anyhow::Result;
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

use crate::queue::{Pop, SampleQueue, capacity_for};

#[derive(Clone, Copy, Debug)]
pub struct ResampleConfig {
    /// Input frames per resampler call.
    pub chunk_frames: usize,
    /// Target buffering of the output queue in seconds.
    pub buffer_seconds: f32,
}

/// Spawn the resampler thread reading `srcq` at `src_rate` and return its output queue.
///
/// The output queue closes once `srcq` is closed and drained, or on resampler error.
pub fn start_resampler(
    srcq: Arc<SampleQueue>,
    src_rate: u32,
    dst_rate: u32,
    cfg: ResampleConfig,
) -> Result<Arc<SampleQueue>> {
    let channels = srcq.channels();
    let dstq = Arc::new(SampleQueue::new(
        channels,
        capacity_for(dst_rate, channels, cfg.buffer_seconds),
    ));

    let ratio = dst_rate as f64 / src_rate as f64;
    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };
    let chunk = cfg.chunk_frames.max(1);

    let out = dstq.clone();
    thread::spawn(move || {
        let mut resampler: Box<dyn Resampler<f32>> =
            match Async::<f32>::new_sinc(ratio, 1.1, &params, chunk, channels, FixedAsync::Input) {
                Ok(r) => Box::new(r),
                Err(e) => {
                    tracing::error!("resampler init error: {e:#}");
                    out.close();
                    return;
                }
            };
        let mut scratch = vec![0.0f32; channels * chunk * 3];

        // Full chunks first, then whatever partial tail remains after the source closes.
        while let Some(input) = srcq.pop(Pop::Exact { frames: chunk }) {
            if process(&mut *resampler, &input, channels, None, &mut scratch, &out).is_err() {
                out.close();
                return;
            }
        }
        while let Some(tail) = srcq.pop(Pop::UpTo { max_frames: chunk }) {
            let frames = tail.len() / channels;
            if process(&mut *resampler, &tail, channels, Some(frames), &mut scratch, &out).is_err()
            {
                break;
            }
        }
        out.close();
    });

    Ok(dstq)
}

fn process(
    resampler: &mut dyn Resampler<f32>,
    input: &[f32],
    channels: usize,
    partial_len: Option<usize>,
    scratch: &mut [f32],
    out: &SampleQueue,
) -> Result<(), ()> {
    let frames = input.len() / channels;
    if frames == 0 {
        return Ok(());
    }
    let input_adapter = InterleavedSlice::new(input, channels, frames).map_err(|e| {
        tracing::error!("resampler input adapter error: {e:#}");
    })?;
    let capacity = scratch.len() / channels;
    let mut output_adapter = InterleavedSlice::new_mut(scratch, channels, capacity).map_err(|e| {
        tracing::error!("resampler output adapter error: {e:#}");
    })?;
    let indexing = Indexing {
        input_offset: 0,
        output_offset: 0,
        active_channels_mask: None,
        partial_len,
    };
    let (_read, written) = resampler
        .process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing))
        .map_err(|e| {
            tracing::error!("resampler process error: {e:#}");
        })?;
    if written > 0 {
        out.push(&scratch[..written * channels]);
    }
    Ok(())
}
