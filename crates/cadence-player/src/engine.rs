//! Player handle and worker thread.
//!
//! The handle sends commands over a crossbeam channel to one worker thread. The worker
//! owns the loaded path and at most one playback session; each session is its own thread
//! running decode → (resample →) output for one file. Sessions carry an id so a stale
//! session can never report an end-of-stream for a newer one. End-of-stream events also
//! carry the [`LoadId`] handed out by [`Player::load`], so a consumer can drop an event
//! that was already queued when it loaded something else.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use cadence_types::{ClockTime, LoadId, PlayerEvent, PlayerState};
use cpal::traits::StreamTrait;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::config::PlayerConfig;
use crate::gain::GainControl;
use crate::resample::{self, ResampleConfig};
use crate::status::{self, PlayerStatus, SharedStatus};
use crate::{decode, device, output};

/// Output rate assumed for fade timing before any stream is open.
const FALLBACK_RATE: u32 = 48_000;

enum Command {
    Load(PathBuf, LoadId),
    Play,
    Pause,
    Stop,
    Seek(ClockTime),
    Quit,
}

/// Handle to the playback worker.
pub struct Player {
    cmd_tx: Sender<Command>,
    event_rx: Receiver<PlayerEvent>,
    status: SharedStatus,
    gain: Arc<GainControl>,
    last_load: AtomicU64,
    worker: Option<JoinHandle<()>>,
}

impl Player {
    pub fn new(cfg: PlayerConfig) -> Result<Self> {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let status = PlayerStatus::shared();
        let gain = Arc::new(GainControl::new(cfg.initial_volume));

        let worker = {
            let status = status.clone();
            let gain = gain.clone();
            thread::Builder::new()
                .name("cadence-player".to_string())
                .spawn(move || {
                    Worker::new(cfg, status, gain, event_tx).run(cmd_rx);
                })
                .context("spawn player worker")?
        };

        Ok(Self {
            cmd_tx,
            event_rx,
            status,
            gain,
            last_load: AtomicU64::new(0),
            worker: Some(worker),
        })
    }

    /// Stop whatever is playing and make `path` the loaded track.
    ///
    /// The returned id is carried by the end-of-stream event of this load.
    pub fn load(&self, path: impl Into<PathBuf>) -> Result<LoadId> {
        let load = LoadId(self.last_load.fetch_add(1, Ordering::Relaxed) + 1);
        self.send(Command::Load(path.into(), load))?;
        Ok(load)
    }

    pub fn play(&self) -> Result<()> {
        self.send(Command::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.send(Command::Pause)
    }

    pub fn stop(&self) -> Result<()> {
        self.send(Command::Stop)
    }

    /// Restart the loaded track at `position` (clamped to the duration when known).
    pub fn seek(&self, position: ClockTime) -> Result<()> {
        self.send(Command::Seek(position))
    }

    pub fn set_volume(&self, volume: f32) -> f32 {
        self.gain.set_volume(volume)
    }

    pub fn volume(&self) -> f32 {
        self.gain.volume()
    }

    /// Ramp the fade stage to `level` over `duration`.
    pub fn fade(&self, level: f32, duration: ClockTime) {
        let rate = status::lock(&self.status)
            .output_rate
            .unwrap_or(FALLBACK_RATE);
        self.gain.fade_to(level, duration.frames_at(rate));
    }

    pub fn position(&self) -> Option<ClockTime> {
        status::lock(&self.status).position()
    }

    pub fn duration(&self) -> Option<ClockTime> {
        status::lock(&self.status).duration
    }

    pub fn state(&self) -> PlayerState {
        status::lock(&self.status).state
    }

    pub fn codec(&self) -> Option<String> {
        status::lock(&self.status).codec.clone()
    }

    /// Wait up to `timeout` for the next event.
    pub fn poll_event(&self, timeout: Duration) -> Option<PlayerEvent> {
        match self.event_rx.recv_timeout(timeout) {
            Ok(ev) => Some(ev),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    fn send(&self, cmd: Command) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| anyhow!("player worker stopped"))
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(Command::Quit);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

struct SessionHandle {
    cancel: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

struct Worker {
    cfg: PlayerConfig,
    status: SharedStatus,
    gain: Arc<GainControl>,
    events: Sender<PlayerEvent>,
    session_id: Arc<AtomicU64>,
    session: Option<SessionHandle>,
    current: Option<(PathBuf, LoadId)>,
    /// Start offset for the next session when seeking without one running.
    start_at: Option<ClockTime>,
    paused: bool,
}

impl Worker {
    fn new(
        cfg: PlayerConfig,
        status: SharedStatus,
        gain: Arc<GainControl>,
        events: Sender<PlayerEvent>,
    ) -> Self {
        Self {
            cfg,
            status,
            gain,
            events,
            session_id: Arc::new(AtomicU64::new(0)),
            session: None,
            current: None,
            start_at: None,
            paused: false,
        }
    }

    fn run(mut self, cmd_rx: Receiver<Command>) {
        while let Ok(cmd) = cmd_rx.recv() {
            match cmd {
                Command::Quit => break,
                Command::Load(path, load) => {
                    self.cancel_session();
                    status::lock(&self.status).clear_playback();
                    tracing::debug!(path = %path.display(), %load, "loaded");
                    self.current = Some((path, load));
                    self.start_at = None;
                    self.paused = false;
                }
                Command::Play => self.play(),
                Command::Pause => {
                    self.paused = true;
                    if self.live_session() {
                        if let Some(sess) = self.session.as_ref() {
                            sess.paused.store(true, Ordering::Relaxed);
                        }
                        status::lock(&self.status).state = PlayerState::Paused;
                    }
                }
                Command::Stop => {
                    self.cancel_session();
                    status::lock(&self.status).clear_playback();
                    self.start_at = None;
                    self.paused = false;
                }
                Command::Seek(position) => {
                    if self.live_session() {
                        status::lock(&self.status).pending_position = Some(position);
                        self.start_session(Some(position));
                    } else if self.current.is_some() {
                        self.start_at = Some(position);
                    }
                }
            }
        }
        self.cancel_session();
    }

    fn play(&mut self) {
        self.paused = false;
        if self.live_session() {
            if let Some(sess) = self.session.as_ref() {
                sess.paused.store(false, Ordering::Relaxed);
            }
            status::lock(&self.status).state = PlayerState::Playing;
            return;
        }
        let start = self.start_at.take();
        self.start_session(start);
    }

    fn live_session(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|sess| !sess.join.is_finished())
    }

    /// Cancel the running session and join its thread. The id bump silences it first.
    fn cancel_session(&mut self) {
        if let Some(sess) = self.session.take() {
            self.session_id.fetch_add(1, Ordering::Relaxed);
            sess.cancel.store(true, Ordering::Relaxed);
            let _ = sess.join.join();
        }
    }

    fn start_session(&mut self, start: Option<ClockTime>) {
        let Some((path, load)) = self.current.clone() else {
            return;
        };
        self.cancel_session();

        let cancel = Arc::new(AtomicBool::new(false));
        let paused = Arc::new(AtomicBool::new(self.paused));
        let my_id = self.session_id.fetch_add(1, Ordering::Relaxed).saturating_add(1);
        let ctx = SessionContext {
            cfg: if start.is_some() {
                self.cfg.for_seek()
            } else {
                self.cfg.clone()
            },
            status: self.status.clone(),
            gain: self.gain.clone(),
            events: self.events.clone(),
            session_id: self.session_id.clone(),
            my_id,
            load,
            cancel: cancel.clone(),
            paused: paused.clone(),
        };

        let join = thread::spawn(move || ctx.run(path, start));
        self.session = Some(SessionHandle {
            cancel,
            paused,
            join,
        });
    }
}

struct SessionContext {
    cfg: PlayerConfig,
    status: SharedStatus,
    gain: Arc<GainControl>,
    events: Sender<PlayerEvent>,
    session_id: Arc<AtomicU64>,
    my_id: u64,
    load: LoadId,
    cancel: Arc<AtomicBool>,
    paused: Arc<AtomicBool>,
}

impl SessionContext {
    fn is_current(&self) -> bool {
        self.session_id.load(Ordering::Relaxed) == self.my_id
    }

    fn run(self, path: PathBuf, start: Option<ClockTime>) {
        let outcome = self.play_one_file(&path, start);
        if !self.is_current() {
            return;
        }
        match outcome {
            Ok(true) => {
                tracing::debug!(path = %path.display(), "end of stream");
                status::lock(&self.status).state = PlayerState::Idle;
                let _ = self.events.send(PlayerEvent::EndOfStream { load: self.load });
            }
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), "playback error: {e:#}");
                status::lock(&self.status).clear_playback();
                let _ = self.events.send(PlayerEvent::Error(format!("{e:#}")));
                let _ = self.events.send(PlayerEvent::EndOfStream { load: self.load });
            }
        }
    }

    /// Play `path` until it drains (`Ok(true)`) or the session is cancelled (`Ok(false)`).
    fn play_one_file(&self, path: &std::path::Path, start: Option<ClockTime>) -> Result<bool> {
        let source = decode::start_decode(path, start, self.cfg.buffer_seconds, self.cancel.clone())
            .context("decode local file")?;

        let host = cpal::default_host();
        let device = device::pick_device(&host, self.cfg.device.as_deref())?;
        let config = device::pick_output_config(&device, Some(source.spec.rate))?;
        let mut stream_config: cpal::StreamConfig = config.clone().into();
        if let Some(buf) = device::pick_buffer_size(&config) {
            stream_config.buffer_size = buf;
        }
        let out_rate = stream_config.sample_rate;
        let played_frames = Arc::new(AtomicU64::new(source.start.frames_at(out_rate)));

        if self.is_current() {
            for (key, value) in &source.tags {
                let _ = self.events.send(PlayerEvent::Tag {
                    key: key.clone(),
                    value: value.clone(),
                });
            }
            let mut st = status::lock(&self.status);
            st.state = if self.paused.load(Ordering::Relaxed) {
                PlayerState::Paused
            } else {
                PlayerState::Playing
            };
            st.duration = source.duration;
            st.output_rate = Some(out_rate);
            st.played_frames = Some(played_frames.clone());
            st.paused_flag = Some(self.paused.clone());
            st.codec = source.codec.clone();
            st.pending_position = None;
        }

        let srcq = source.queue.clone();
        let dstq = if source.spec.rate == out_rate {
            srcq.clone()
        } else {
            tracing::debug!(from_hz = source.spec.rate, to_hz = out_rate, "resampling");
            resample::start_resampler(
                srcq.clone(),
                source.spec.rate,
                out_rate,
                ResampleConfig {
                    chunk_frames: self.cfg.chunk_frames,
                    buffer_seconds: self.cfg.buffer_seconds,
                },
            )?
        };

        let stream = output::build_output_stream(
            &device,
            &stream_config,
            config.sample_format(),
            &dstq,
            output::OutputConfig {
                refill_max_frames: self.cfg.refill_max_frames,
                paused: self.paused.clone(),
                played_frames,
                gain: self.gain.clone(),
            },
        )?;
        stream.play()?;

        let finished = dstq.wait_drained_or_cancel(&self.cancel);
        if !finished {
            self.paused.store(true, Ordering::Relaxed);
            srcq.close();
            dstq.close();
        }
        // Let the device play out what it already holds.
        thread::sleep(Duration::from_millis(100));
        Ok(finished)
    }
}
