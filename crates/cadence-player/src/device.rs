//! Output device discovery and stream-config selection (thin wrappers over CPAL).

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// First output device whose name contains `needle` (case-insensitive), or the host default.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    if let Some(needle) = needle {
        let found = host
            .output_devices()
            .context("enumerate output devices")?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| matches_device_name(&desc.name(), needle))
                    .unwrap_or(false)
            });
        return found.ok_or_else(|| anyhow!("no output device matched: {needle}"));
    }
    host.default_output_device()
        .ok_or_else(|| anyhow!("no default output device"))
}

/// Names of every output device on the host, in enumeration order.
pub fn list_devices(host: &cpal::Host) -> Result<Vec<String>> {
    let mut names = Vec::new();
    for d in host.output_devices().context("enumerate output devices")? {
        names.push(d.description()?.to_string());
    }
    Ok(names)
}

/// [`list_devices`] on the default host.
pub fn output_device_names() -> Result<Vec<String>> {
    list_devices(&cpal::default_host())
}

/// Choose an output config close to `target_rate`.
///
/// Prefers the highest supported rate not above the target, then the better sample format.
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: Option<u32>,
) -> Result<cpal::SupportedStreamConfig> {
    let mut best: Option<(bool, u32, u8, cpal::SupportedStreamConfig)> = None;
    for range in device.supported_output_configs()? {
        let rate = rate_in_range(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let below = target_rate.map(|t| rate <= t).unwrap_or(true);
        let rank = format_rank(range.sample_format());
        let replace = match &best {
            None => true,
            Some((b_below, b_rate, b_rank, _)) => {
                is_better(below, rate, rank, *b_below, *b_rate, *b_rank)
            }
        };
        if replace {
            best = Some((below, rate, rank, range.with_sample_rate(rate)));
        }
    }
    best.map(|(_, _, _, cfg)| cfg)
        .ok_or_else(|| anyhow!("no supported output configs"))
}

/// Largest fixed buffer the device allows, capped to keep latency bounded.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    const MAX_FRAMES: u32 = 16_384;
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            Some(cpal::BufferSize::Fixed((*max).min(MAX_FRAMES).max(*min)))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

fn rate_in_range(min: u32, max: u32, target: Option<u32>) -> u32 {
    match target {
        Some(t) => t.clamp(min, max.max(min)),
        None => max,
    }
}

fn format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}

fn is_better(below: bool, rate: u32, rank: u8, b_below: bool, b_rate: u32, b_rank: u8) -> bool {
    if below != b_below {
        below
    } else if rate != b_rate {
        rate > b_rate
    } else {
        rank < b_rank
    }
}

fn matches_device_name(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    !needle.is_empty() && name.to_lowercase().contains(&needle.to_lowercase())
}
