//! Streaming decode stage.
//!
//! Uses Symphonia to probe the container, optionally seek, collect the stream's tags and
//! then decode packets into interleaved `f32` on a background thread. The output queue is
//! closed on EOF, on decode failure and on cancellation.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result, anyhow};
use cadence_types::ClockTime;
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision};
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::queue::{SampleQueue, capacity_for};

/// A running decode stage and what was learned while opening it.
pub struct DecodedSource {
    pub spec: SignalSpec,
    pub queue: Arc<SampleQueue>,
    /// Total duration, when the container reports a frame count.
    pub duration: Option<ClockTime>,
    /// Position the stream actually starts from after seeking.
    pub start: ClockTime,
    pub codec: Option<String>,
    /// `(key, value)` tags, lower-case keys, standard keys normalised (`title`, `artist`, ...).
    pub tags: Vec<(String, String)>,
}

/// Open `path`, seek to `start` and spawn the decoder thread.
///
/// The thread stops early when `cancel` is raised.
pub fn start_decode(
    path: &Path,
    start: Option<ClockTime>,
    buffer_seconds: f32,
    cancel: Arc<AtomicBool>,
) -> Result<DecodedSource> {
    let file = File::open(path).with_context(|| format!("open {:?}", path))?;
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("probe {:?}", path))?;

    let mut tags = Vec::new();
    if let Some(rev) = probed.metadata.get().as_ref().and_then(|m| m.current()) {
        collect_tags(rev, &mut tags);
    }
    let mut format = probed.format;
    if let Some(rev) = format.metadata().current() {
        collect_tags(rev, &mut tags);
    }

    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("no default audio track"))?;
    let codec_params: CodecParameters = track.codec_params.clone();
    let channels = codec_params
        .channels
        .ok_or_else(|| anyhow!("unknown channel layout"))?;
    let rate = codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("unknown sample rate"))?;
    let spec = SignalSpec::new(rate, channels);
    let duration = codec_params
        .n_frames
        .and_then(|frames| ClockTime::from_frames(frames, rate));

    let mut start_at = ClockTime::ZERO;
    if let Some(target) = start.filter(|t| *t > ClockTime::ZERO) {
        let target = target.clamp_to(duration);
        let secs = target.nanos() / 1_000_000_000;
        let frac = (target.nanos() % 1_000_000_000) as f64 / 1e9;
        match format.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time: Time::new(secs, frac),
                track_id: None,
            },
        ) {
            Ok(_) => start_at = target,
            Err(e) => tracing::warn!(path = %path.display(), "seek failed, starting from 0: {e}"),
        }
    }

    let queue = Arc::new(SampleQueue::new(
        channels.count(),
        capacity_for(rate, channels.count(), buffer_seconds),
    ));
    let codec = codec_label(&codec_params);

    let thread_queue = queue.clone();
    thread::spawn(move || {
        if let Err(e) = decode_loop(format, codec_params, &thread_queue, &cancel) {
            tracing::error!("decoder thread error: {e:#}");
        }
        thread_queue.close();
    });

    Ok(DecodedSource {
        spec,
        queue,
        duration,
        start: start_at,
        codec,
        tags,
    })
}

fn decode_loop(
    mut format: Box<dyn FormatReader>,
    codec_params: CodecParameters,
    queue: &SampleQueue,
    cancel: &AtomicBool,
) -> Result<()> {
    let mut decoder =
        symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;
    let track_id = format.default_track().map(|t| t.id);

    while !cancel.load(Ordering::Relaxed) {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(_) => break,
        };
        if track_id.is_some_and(|id| id != packet.track_id()) {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(_) => continue,
        };
        let mut buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        buf.copy_interleaved_ref(decoded);
        queue.push(buf.samples());
    }
    Ok(())
}

fn collect_tags(rev: &MetadataRevision, out: &mut Vec<(String, String)>) {
    use symphonia::core::meta::StandardTagKey;
    for tag in rev.tags() {
        let key = match tag.std_key {
            Some(StandardTagKey::TrackTitle) => "title".to_string(),
            Some(StandardTagKey::Artist) => "artist".to_string(),
            Some(StandardTagKey::Album) => "album".to_string(),
            Some(StandardTagKey::Genre) => "genre".to_string(),
            Some(StandardTagKey::TrackNumber) => "track-number".to_string(),
            Some(StandardTagKey::Date) => "date".to_string(),
            _ => tag.key.to_ascii_lowercase(),
        };
        let value = tag.value.to_string();
        if value.trim().is_empty() || out.iter().any(|(k, _)| *k == key) {
            continue;
        }
        out.push((key, value.trim().to_string()));
    }
}

/// Best-effort codec label.
pub fn codec_label(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_AAC => "AAC",
        CODEC_TYPE_ALAC => "ALAC",
        CODEC_TYPE_VORBIS => "VORBIS",
        CODEC_TYPE_OPUS => "OPUS",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}
