use cadence_types::{ClockTime, PlayerState};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph},
};

use super::app::App;

pub(crate) fn draw(f: &mut ratatui::Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(6),
            Constraint::Min(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .split(f.area());

    let playback = app.playback();
    let state = match playback.state() {
        PlayerState::Playing => "playing",
        PlayerState::Paused => "paused",
        PlayerState::Idle => "stopped",
    };
    let title = app.title().unwrap_or_else(|| "-".into());
    let track = app.now_playing.as_ref();
    let artist = track.and_then(|t| t.artist.as_deref()).unwrap_or("-");
    let album = track.and_then(|t| t.album.as_deref()).unwrap_or("-");
    let format = track
        .and_then(|t| t.audio_codec.as_deref().or(t.container_format.as_deref()))
        .unwrap_or("-");

    let position = playback.position();
    let duration = playback.duration();
    let bar_width = chunks[0].width.saturating_sub(4) as usize;
    let bar = progress_bar(
        progress_ratio(position, duration),
        bar_width,
        &app.appearance.progress_fill,
        &app.appearance.progress_empty,
    );

    let policy = app
        .policy
        .map(|p| p.to_string())
        .unwrap_or_else(|| "-".into());
    let header = format!(
        "cadence  |  {policy}  |  vol {:.0}%",
        (app.volume * 100.0).round()
    );

    let now_playing = Paragraph::new(vec![
        Line::styled(
            format!("{title}  [{state}]"),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Line::from(format!("{artist}  /  {album}  ({format})")),
        Line::from(format!("[{bar}]")),
        Line::from(time_check(position, duration)),
    ])
    .block(Block::default().borders(Borders::ALL).title(header));
    f.render_widget(now_playing, chunks[0]);

    let mut items: Vec<ListItem> = app
        .upcoming
        .iter()
        .map(|t| ListItem::new(t.label()))
        .collect();
    if items.is_empty() {
        items.push(ListItem::new("<nothing queued>"));
    }
    let upcoming =
        List::new(items).block(Block::default().borders(Borders::ALL).title("Up next"));
    f.render_widget(upcoming, chunks[1]);

    let status_style = if app.status.starts_with("Error") {
        Style::default().fg(Color::Red)
    } else {
        Style::default().fg(Color::Yellow)
    };
    f.render_widget(
        Paragraph::new(Line::styled(app.status.clone(), status_style)),
        chunks[2],
    );

    let keys = if app.quitting() {
        "fading out..."
    } else {
        "keys: Space pause | s stop | n/p next/prev | +/- vol | ←/→ seek | i/o fade | m policy | l logs | q quit"
    };
    f.render_widget(Paragraph::new(Line::from(keys)), chunks[3]);

    if app.logs_open {
        let area = centered_rect(90, 80, f.area());
        f.render_widget(Clear, area);
        let block = Block::default()
            .borders(Borders::ALL)
            .title("Logs (Esc to close, ↑/↓ scroll)");
        let inner = block.inner(area);
        let height = inner.height as usize;
        let total = app.logs.len();
        let end = total.saturating_sub(app.logs_scroll);
        let start = end.saturating_sub(height);
        let mut items = Vec::new();
        for line in app.logs.iter().skip(start).take(end.saturating_sub(start)) {
            items.push(ListItem::new(line.clone()));
        }
        if items.is_empty() {
            items.push(ListItem::new("<no logs>"));
        }
        f.render_widget(List::new(items).block(block), area);
    }
}

/// Fraction of the track played, `0.0` when either side is unknown.
fn progress_ratio(position: Option<ClockTime>, duration: Option<ClockTime>) -> f64 {
    match (position, duration) {
        (Some(pos), Some(total)) if total > ClockTime::ZERO => {
            (pos.nanos() as f64 / total.nanos() as f64).clamp(0.0, 1.0)
        }
        _ => 0.0,
    }
}

/// A `width`-cell bar drawn with the configured fill characters.
fn progress_bar(ratio: f64, width: usize, fill: &str, empty: &str) -> String {
    let fill = fill.chars().next().unwrap_or('=');
    let empty = empty.chars().next().unwrap_or(' ');
    let filled = ((ratio.clamp(0.0, 1.0) * width as f64).round() as usize).min(width);
    let mut bar = String::with_capacity(width);
    bar.extend(std::iter::repeat_n(fill, filled));
    bar.extend(std::iter::repeat_n(empty, width - filled));
    bar
}

fn time_check(position: Option<ClockTime>, duration: Option<ClockTime>) -> String {
    let fmt = |t: Option<ClockTime>| t.map(|t| t.to_string()).unwrap_or_else(|| "-".into());
    format!("{} / {}", fmt(position), fmt(duration))
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
