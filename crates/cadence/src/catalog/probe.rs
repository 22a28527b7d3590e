//! Metadata probing for single media files.

use std::fs::File;
use std::path::Path;
use std::time::UNIX_EPOCH;

use cadence_types::ClockTime;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::Hint;
use thiserror::Error;

use super::TrackRecord;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("unreadable media: {0}")]
    Media(#[from] symphonia::core::errors::Error),
}

/// Extracts a [`TrackRecord`] from one file.
pub trait Prober: Send + Sync {
    /// Cheap pre-filter; files rejected here are skipped without counting as failures.
    fn accepts(&self, path: &Path) -> bool;

    fn probe(&self, path: &Path) -> Result<TrackRecord, ProbeError>;
}

/// Probes with Symphonia, accepting the usual audio extensions.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaProber;

pub fn is_supported_extension(ext: &str) -> bool {
    matches!(
        ext.to_ascii_lowercase().as_str(),
        "flac" | "wav" | "aiff" | "aif" | "mp3" | "m4a" | "aac" | "alac" | "ogg" | "oga"
    )
}

/// File mtime in nanoseconds since the Unix epoch (negative before it).
pub fn mtime_nanos(meta: &std::fs::Metadata) -> std::io::Result<i64> {
    let modified = meta.modified()?;
    Ok(match modified.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_nanos().min(i64::MAX as u128) as i64,
        Err(before) => -(before.duration().as_nanos().min(i64::MAX as u128) as i64),
    })
}

impl Prober for SymphoniaProber {
    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(is_supported_extension)
    }

    fn probe(&self, path: &Path) -> Result<TrackRecord, ProbeError> {
        let file = File::open(path)?;
        let fs_meta = file.metadata()?;
        let mut record = TrackRecord::new(path.to_string_lossy());
        record.modified_time = Some(mtime_nanos(&fs_meta)?);

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        let mut hint = Hint::new();
        if !ext.is_empty() {
            hint.with_extension(ext);
            record.container_format = Some(ext.to_ascii_uppercase());
        }

        let mss = MediaSourceStream::new(Box::new(file), Default::default());
        let mut probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;

        if let Some(track) = probed.format.default_track() {
            let params = &track.codec_params;
            record.audio_codec = cadence_player::decode::codec_label(params);
            if let (Some(frames), Some(rate)) = (params.n_frames, params.sample_rate) {
                record.duration = ClockTime::from_frames(frames, rate);
            }
        }
        if let Some(duration) = record.duration.filter(|d| *d > ClockTime::ZERO) {
            let bits = fs_meta.len() as f64 * 8.0;
            record.bitrate = Some((bits / duration.secs_f64()).round().min(u32::MAX as f64) as u32);
        }

        if let Some(rev) = probed.metadata.get().as_ref().and_then(|m| m.current()) {
            apply_tags(rev, &mut record);
        }
        if let Some(rev) = probed.format.metadata().current() {
            apply_tags(rev, &mut record);
        }
        Ok(record)
    }
}

fn apply_tags(rev: &MetadataRevision, record: &mut TrackRecord) {
    for tag in rev.tags() {
        let Some(key) = tag.std_key else {
            continue;
        };
        let value = tag.value.to_string();
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        let slot = match key {
            StandardTagKey::TrackTitle => &mut record.title,
            StandardTagKey::Artist => &mut record.artist,
            StandardTagKey::Album => &mut record.album,
            StandardTagKey::Genre => &mut record.genre,
            StandardTagKey::Date => &mut record.date,
            StandardTagKey::Encoder => &mut record.encoder,
            StandardTagKey::TrackNumber => {
                if record.track_number.is_none() {
                    record.track_number = parse_track_number(value);
                }
                continue;
            }
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }
}

/// Leading number of a track tag such as `"3"` or `"03/12"`.
fn parse_track_number(raw: &str) -> Option<u32> {
    raw.split('/').next()?.trim().parse().ok()
}
