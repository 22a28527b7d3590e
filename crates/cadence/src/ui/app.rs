use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use cadence_types::PlayerEvent;
use crossbeam_channel::Receiver;
use crossterm::{
    event::{self, Event as CEvent, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};

use crate::catalog::TrackRecord;
use crate::config::AppearanceConfig;
use crate::playback::Playback;
use crate::sequencer::Policy;
use crate::session::{SessionCommand, SessionEvent, SessionHandle};

use super::render;

const TICK: Duration = Duration::from_millis(50);
const EVENT_POLL: Duration = Duration::from_millis(10);
const LOG_CAP: usize = 500;

/// Run the terminal UI until the session ends.
pub fn run_tui(
    playback: Arc<dyn Playback>,
    session: SessionHandle,
    events: Receiver<SessionEvent>,
    log_rx: Receiver<String>,
    appearance: AppearanceConfig,
) -> Result<()> {
    let mut app = App::new(playback, session, events, log_rx, appearance);
    let mut terminal = init_terminal()?;
    let res = ui_loop(&mut terminal, &mut app);
    restore_terminal(&mut terminal)?;
    res
}

pub(crate) struct App {
    playback: Arc<dyn Playback>,
    session: SessionHandle,
    events: Receiver<SessionEvent>,
    log_rx: Receiver<String>,
    pub(crate) appearance: AppearanceConfig,
    pub(crate) now_playing: Option<TrackRecord>,
    /// Title reported by the stream itself; wins over the catalog record.
    pub(crate) tag_title: Option<String>,
    pub(crate) status: String,
    pub(crate) policy: Option<Policy>,
    pub(crate) volume: f32,
    pub(crate) upcoming: Vec<TrackRecord>,
    pub(crate) logs_open: bool,
    pub(crate) logs: VecDeque<String>,
    pub(crate) logs_scroll: usize,
    quitting: bool,
    ended: bool,
}

impl App {
    fn new(
        playback: Arc<dyn Playback>,
        session: SessionHandle,
        events: Receiver<SessionEvent>,
        log_rx: Receiver<String>,
        appearance: AppearanceConfig,
    ) -> Self {
        let volume = playback.volume();
        Self {
            playback,
            session,
            events,
            log_rx,
            appearance,
            now_playing: None,
            tag_title: None,
            status: String::new(),
            policy: None,
            volume,
            upcoming: Vec::new(),
            logs_open: false,
            logs: VecDeque::new(),
            logs_scroll: 0,
            quitting: false,
            ended: false,
        }
    }

    pub(crate) fn playback(&self) -> &dyn Playback {
        self.playback.as_ref()
    }

    pub(crate) fn quitting(&self) -> bool {
        self.quitting
    }

    /// Title line for the status bar.
    pub(crate) fn title(&self) -> Option<String> {
        self.tag_title
            .clone()
            .or_else(|| self.now_playing.as_ref().map(TrackRecord::display_title))
    }

    fn send(&mut self, cmd: SessionCommand) {
        if self.session.send(cmd).is_err() {
            tracing::warn!("session task is gone");
            self.ended = true;
        }
    }

    fn pump_player(&mut self) {
        let mut timeout = EVENT_POLL;
        while let Some(ev) = self.playback.poll_event(timeout) {
            self.on_player_event(ev);
            timeout = Duration::ZERO;
        }
    }

    fn on_player_event(&mut self, ev: PlayerEvent) {
        match ev {
            PlayerEvent::EndOfStream { load } => {
                if !self.quitting {
                    self.send(SessionCommand::TrackEnded(load));
                }
            }
            PlayerEvent::Tag { key, value } => {
                if key.eq_ignore_ascii_case("title") && !value.trim().is_empty() {
                    self.tag_title = Some(value);
                }
            }
            PlayerEvent::Error(e) => self.status = format!("Error: {e}"),
        }
    }

    fn drain_session(&mut self) {
        while let Ok(ev) = self.events.try_recv() {
            match ev {
                SessionEvent::NowPlaying(track) => {
                    self.status = format!("Playing {}", track.label());
                    self.tag_title = None;
                    self.now_playing = Some(track);
                }
                SessionEvent::Upcoming(tracks) => self.upcoming = tracks,
                SessionEvent::Policy(policy) => self.policy = Some(policy),
                SessionEvent::Volume(v) => self.volume = v,
                SessionEvent::Message(msg) => self.status = msg,
                SessionEvent::Ended => self.ended = true,
            }
        }
    }

    fn handle_key(&mut self, code: KeyCode, modifiers: KeyModifiers) {
        if self.quitting {
            return;
        }
        let ctrl_c = code == KeyCode::Char('c') && modifiers.contains(KeyModifiers::CONTROL);
        if ctrl_c || code == KeyCode::Char('q') {
            self.quitting = true;
            self.status = "Quitting...".into();
            self.send(SessionCommand::Quit);
            return;
        }
        if self.logs_open {
            match code {
                KeyCode::Esc | KeyCode::Char('l') => self.toggle_logs(),
                KeyCode::Up => self.scroll_logs_up(),
                KeyCode::Down => self.scroll_logs_down(),
                _ => {}
            }
            return;
        }
        if code == KeyCode::Char('l') {
            self.toggle_logs();
        } else if let Some(cmd) = command_for_key(code) {
            self.send(cmd);
        }
    }

    fn toggle_logs(&mut self) {
        self.logs_open = !self.logs_open;
        if !self.logs_open {
            self.logs_scroll = 0;
        }
    }

    fn scroll_logs_up(&mut self) {
        let max = self.logs.len().saturating_sub(1);
        self.logs_scroll = (self.logs_scroll + 1).min(max);
    }

    fn scroll_logs_down(&mut self) {
        self.logs_scroll = self.logs_scroll.saturating_sub(1);
    }

    fn push_log_line(&mut self, line: String) {
        if self.logs.len() >= LOG_CAP {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }

    fn drain_logs(&mut self) {
        while let Ok(line) = self.log_rx.try_recv() {
            self.push_log_line(line);
        }
    }
}

/// Transport keys that map one-to-one onto session commands.
fn command_for_key(code: KeyCode) -> Option<SessionCommand> {
    let cmd = match code {
        KeyCode::Char(' ') => SessionCommand::TogglePause,
        KeyCode::Char('s') => SessionCommand::Stop,
        KeyCode::Char('n') => SessionCommand::Next,
        KeyCode::Char('p') => SessionCommand::Previous,
        KeyCode::Char('+') | KeyCode::Char('=') => SessionCommand::VolumeUp,
        KeyCode::Char('-') => SessionCommand::VolumeDown,
        KeyCode::Right => SessionCommand::SeekForward,
        KeyCode::Left => SessionCommand::SeekBackward,
        KeyCode::Char('i') => SessionCommand::FadeIn,
        KeyCode::Char('o') => SessionCommand::FadeOut,
        KeyCode::Char('m') => SessionCommand::CyclePolicy,
        _ => return None,
    };
    Some(cmd)
}

fn ui_loop(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    let mut last_tick = Instant::now();

    while !app.ended {
        app.pump_player();
        app.drain_session();
        app.drain_logs();
        terminal.draw(|f| render::draw(f, app))?;

        let timeout = TICK.saturating_sub(last_tick.elapsed());
        if event::poll(timeout).context("poll terminal events")? {
            if let CEvent::Key(k) = event::read().context("read terminal event")? {
                if k.kind == KeyEventKind::Press {
                    app.handle_key(k.code, k.modifiers);
                }
            }
        }

        if last_tick.elapsed() >= TICK {
            last_tick = Instant::now();
        }
    }
    Ok(())
}

fn init_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend).context("create terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();
    Ok(())
}
