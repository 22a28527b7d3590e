/// Tuning for the decode/resample/output stages and device selection.
#[derive(Clone, Debug)]
pub struct PlayerConfig {
    /// Resampler input chunk size in frames.
    pub chunk_frames: usize,
    /// Max frames pulled per output callback refill.
    pub refill_max_frames: usize,
    /// Target buffer duration per stage, used to size queues.
    pub buffer_seconds: f32,
    /// Output device substring match; `None` picks the host default.
    pub device: Option<String>,
    /// Initial volume in `[0, 1]`.
    pub initial_volume: f32,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            refill_max_frames: 4096,
            buffer_seconds: 2.0,
            device: None,
            initial_volume: 1.0,
        }
    }
}

impl PlayerConfig {
    /// Seeking restarts the pipeline, so a shallower buffer keeps the jump responsive.
    pub(crate) fn for_seek(&self) -> Self {
        let mut cfg = self.clone();
        cfg.buffer_seconds = cfg.buffer_seconds.min(1.0);
        cfg.refill_max_frames = cfg.refill_max_frames.min(2048);
        cfg.chunk_frames = cfg.chunk_frames.min(1024);
        cfg
    }
}
