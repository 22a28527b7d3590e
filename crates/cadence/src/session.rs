//! The session task: sole owner of the controller.
//!
//! Navigation and transport requests arrive over a tokio channel and are handled one at a
//! time, so `next`/`previous` never interleave. Results go back to the UI thread over a
//! crossbeam channel that the tick drains without blocking.

use crossbeam_channel::Sender;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;

use cadence_types::LoadId;

use crate::catalog::{IndexReport, TrackRecord};
use crate::controller::{Advance, Controller, ControllerError, Trigger, VOLUME_STEP};
use crate::sequencer::{Policy, TrackSource};

/// How many upcoming tracks the UI gets to preview.
const UPCOMING_PREVIEW: usize = 20;

#[derive(Debug, Clone)]
pub enum SessionCommand {
    Next,
    Previous,
    /// The backend reported end-of-stream for the given load.
    TrackEnded(LoadId),
    TogglePause,
    Stop,
    VolumeUp,
    VolumeDown,
    SeekForward,
    SeekBackward,
    FadeIn,
    FadeOut,
    CyclePolicy,
    Enqueue(Vec<TrackRecord>),
    /// A background index run finished; starts playback if nothing is loaded yet.
    IndexFinished(IndexReport),
    Quit,
}

#[derive(Debug, Clone)]
pub enum SessionEvent {
    NowPlaying(TrackRecord),
    Upcoming(Vec<TrackRecord>),
    Policy(Policy),
    Volume(f32),
    /// One-line status for the message bar.
    Message(String),
    /// The session is over; the UI should exit.
    Ended,
}

pub type SessionHandle = UnboundedSender<SessionCommand>;

/// Spawn the session task on the current tokio runtime.
pub fn spawn_session<S>(
    runtime: &tokio::runtime::Handle,
    controller: Controller<S>,
    events: Sender<SessionEvent>,
) -> (SessionHandle, JoinHandle<()>)
where
    S: TrackSource + 'static,
{
    let (tx, rx) = unbounded_channel();
    let join = runtime.spawn(run_session(controller, rx, events));
    (tx, join)
}

pub async fn run_session<S: TrackSource>(
    mut controller: Controller<S>,
    mut commands: UnboundedReceiver<SessionCommand>,
    events: Sender<SessionEvent>,
) {
    let emit = |ev: SessionEvent| {
        let _ = events.send(ev);
    };
    emit(SessionEvent::Policy(controller.sequencer().policy()));

    while let Some(cmd) = commands.recv().await {
        tracing::debug!(?cmd, "session command");
        let outcome = match cmd {
            SessionCommand::Quit => {
                if let Err(e) = controller.shutdown().await {
                    tracing::warn!("shutdown: {e}");
                }
                break;
            }
            SessionCommand::Next => controller.advance(Trigger::User).await.map(Some),
            SessionCommand::TrackEnded(load) => controller.track_ended(load).await,
            SessionCommand::Previous => controller
                .previous()
                .map(|t| t.map(Advance::Playing)),
            SessionCommand::TogglePause => controller.toggle_pause().await,
            SessionCommand::Stop => controller.stop().map(|_| None),
            SessionCommand::VolumeUp => {
                emit(SessionEvent::Volume(controller.change_volume(VOLUME_STEP)));
                Ok(None)
            }
            SessionCommand::VolumeDown => {
                emit(SessionEvent::Volume(controller.change_volume(-VOLUME_STEP)));
                Ok(None)
            }
            SessionCommand::SeekForward => controller.seek_step(true).map(|_| None),
            SessionCommand::SeekBackward => controller.seek_step(false).map(|_| None),
            SessionCommand::FadeIn => {
                controller.fade_in();
                Ok(None)
            }
            SessionCommand::FadeOut => {
                controller.fade_out();
                Ok(None)
            }
            SessionCommand::CyclePolicy => {
                let policy = controller.sequencer().policy().cycle();
                controller.set_policy(policy);
                emit(SessionEvent::Policy(policy));
                Ok(None)
            }
            SessionCommand::Enqueue(tracks) => {
                let count = tracks.len();
                controller.sequencer_mut().extend(tracks);
                emit(SessionEvent::Message(format!("queued {count} tracks")));
                Ok(None)
            }
            SessionCommand::IndexFinished(report) => {
                emit(SessionEvent::Message(format!(
                    "indexed {} tracks ({} dirs scanned, {} unchanged, {} failed probes)",
                    report.tracks_indexed,
                    report.dirs_scanned,
                    report.dirs_skipped,
                    report.probe_failures
                )));
                if controller.sequencer().current().is_none() {
                    controller.advance(Trigger::User).await.map(Some)
                } else {
                    Ok(None)
                }
            }
        };

        if report(outcome, &emit) {
            break;
        }
        emit(SessionEvent::Upcoming(
            controller
                .sequencer()
                .upcoming()
                .take(UPCOMING_PREVIEW)
                .cloned()
                .collect(),
        ));
    }

    emit(SessionEvent::Ended);
}

/// Forward an outcome to the UI. Returns `true` when the session should end.
fn report(outcome: Result<Option<Advance>, ControllerError>, emit: &impl Fn(SessionEvent)) -> bool {
    match outcome {
        Ok(Some(Advance::Playing(track))) => {
            emit(SessionEvent::NowPlaying(track));
            false
        }
        Ok(Some(Advance::EndOfQueue)) => {
            emit(SessionEvent::Message("end of queue".to_string()));
            false
        }
        Ok(Some(Advance::Quit)) => {
            tracing::info!("queue exhausted, ending session");
            true
        }
        Ok(None) => false,
        Err(e) => {
            tracing::warn!("session: {e}");
            emit(SessionEvent::Message(e.to_string()));
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerConfig;
    use crate::sequencer::Sequencer;
    use crate::test_support::{EmptySource, FakePlayback};
    use std::sync::Arc;

    fn session(
        tracks: &[&str],
    ) -> (
        SessionHandle,
        crossbeam_channel::Receiver<SessionEvent>,
        Arc<FakePlayback>,
        JoinHandle<()>,
    ) {
        let playback = Arc::new(FakePlayback::default());
        let mut seq = Sequencer::new(EmptySource, Policy::QueueOnly);
        seq.extend(tracks.iter().map(|p| TrackRecord::new(*p)));
        let ctl = Controller::new(seq, playback.clone(), ControllerConfig::default());
        let (ev_tx, ev_rx) = crossbeam_channel::unbounded();
        let (tx, join) = spawn_session(&tokio::runtime::Handle::current(), ctl, ev_tx);
        (tx, ev_rx, playback, join)
    }

    fn now_playing(events: &crossbeam_channel::Receiver<SessionEvent>) -> Vec<String> {
        events
            .try_iter()
            .filter_map(|ev| match ev {
                SessionEvent::NowPlaying(t) => Some(t.file_path),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn commands_are_handled_in_order() {
        let (tx, events, playback, join) = session(&["a", "b"]);
        tx.send(SessionCommand::Next).unwrap();
        tx.send(SessionCommand::Next).unwrap();
        tx.send(SessionCommand::Previous).unwrap();
        tx.send(SessionCommand::Quit).unwrap();
        join.await.unwrap();

        assert_eq!(now_playing(&events), vec!["a", "b", "a"]);
        assert_eq!(playback.take_calls().last().map(String::as_str), Some("stop"));
    }

    #[tokio::test]
    async fn track_end_on_empty_queue_ends_session() {
        let (tx, events, _playback, join) = session(&["a"]);
        tx.send(SessionCommand::Next).unwrap();
        tx.send(SessionCommand::TrackEnded(LoadId(1))).unwrap();
        join.await.unwrap();

        let all: Vec<SessionEvent> = events.try_iter().collect();
        assert!(matches!(all.last(), Some(SessionEvent::Ended)));
    }

    #[tokio::test]
    async fn stale_track_end_after_skip_keeps_scheduled_order() {
        let (tx, events, _playback, join) = session(&["a", "b", "c"]);
        tx.send(SessionCommand::Next).unwrap();
        tx.send(SessionCommand::Next).unwrap();
        // Raised by `a` before the skip, delivered after it.
        tx.send(SessionCommand::TrackEnded(LoadId(1))).unwrap();
        tx.send(SessionCommand::TrackEnded(LoadId(2))).unwrap();
        tx.send(SessionCommand::Quit).unwrap();
        join.await.unwrap();

        assert_eq!(now_playing(&events), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn explicit_next_past_end_keeps_session_alive() {
        let (tx, events, _playback, join) = session(&[]);
        tx.send(SessionCommand::Next).unwrap();
        tx.send(SessionCommand::Enqueue(vec![TrackRecord::new("late")]))
            .unwrap();
        tx.send(SessionCommand::Next).unwrap();
        tx.send(SessionCommand::Quit).unwrap();
        join.await.unwrap();

        let all: Vec<SessionEvent> = events.try_iter().collect();
        assert!(all
            .iter()
            .any(|ev| matches!(ev, SessionEvent::Message(m) if m == "end of queue")));
        assert!(all
            .iter()
            .any(|ev| matches!(ev, SessionEvent::NowPlaying(t) if t.file_path == "late")));
    }

    #[tokio::test]
    async fn cycle_policy_reports_new_policy() {
        let (tx, events, _playback, join) = session(&[]);
        tx.send(SessionCommand::CyclePolicy).unwrap();
        tx.send(SessionCommand::Quit).unwrap();
        join.await.unwrap();

        let policies: Vec<Policy> = events
            .try_iter()
            .filter_map(|ev| match ev {
                SessionEvent::Policy(p) => Some(p),
                _ => None,
            })
            .collect();
        assert_eq!(policies, vec![Policy::QueueOnly, Policy::AlbumShuffle]);
    }

    #[tokio::test]
    async fn index_finished_starts_playback_when_idle() {
        let (tx, events, _playback, join) = session(&["a"]);
        tx.send(SessionCommand::IndexFinished(IndexReport::default()))
            .unwrap();
        tx.send(SessionCommand::IndexFinished(IndexReport::default()))
            .unwrap();
        tx.send(SessionCommand::Quit).unwrap();
        join.await.unwrap();
        assert_eq!(now_playing(&events), vec!["a"]);
    }
}
