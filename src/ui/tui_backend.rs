use std::{io::Stdout, sync::Arc, time::Duration};

use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, MouseEventKind,
    },
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Gauge, Paragraph, Wrap},
    Frame, Terminal,
};
use tracing::debug;

use super::handler::{DisplayBackend, DisplayState, SyncDisplay};
use crate::{
    config::{LyricsyncConfig, ThemeConfiguration},
    engine::visibility::Visibility,
    event::UserInput,
};

type Term = Terminal<CrosstermBackend<Stdout>>;

#[derive(Debug, Clone, Copy)]
pub struct TerminalUiBackend;

#[async_trait::async_trait]
impl DisplayBackend for TerminalUiBackend {
    async fn run_backend(
        &mut self,
        display: SyncDisplay,
        config: Arc<LyricsyncConfig>,
        input_tx: flume::Sender<UserInput>,
    ) -> anyhow::Result<()> {
        let mut terminal = setup_terminal()?;

        let result = self.tui_loop(&display, &config, &input_tx, &mut terminal).await;
        // the session may already have stopped
        let _ = input_tx.send(UserInput::Quit);

        restore_terminal(&mut terminal)?;
        result
    }
}

impl TerminalUiBackend {
    async fn tui_loop(
        &self,
        display: &SyncDisplay,
        config: &LyricsyncConfig,
        input_tx: &flume::Sender<UserInput>,
        terminal: &mut Term,
    ) -> anyhow::Result<()> {
        loop {
            terminal.draw(|frame| handle_ui(display, config, frame))?;
            if display.lock().unwrap().closed {
                debug!("session closed, leaving TUI");
                return Ok(());
            }
            if !event::poll(Duration::from_millis(100))? {
                continue;
            }
            let input = match event::read()? {
                Event::Key(key) if key.kind == KeyEventKind::Press => Some(map_key(key.code)),
                Event::Mouse(mouse) => match mouse.kind {
                    MouseEventKind::Down(_) | MouseEventKind::Drag(_) => Some(UserInput::Interaction),
                    MouseEventKind::ScrollUp => Some(UserInput::LineUp),
                    MouseEventKind::ScrollDown => Some(UserInput::LineDown),
                    _ => None,
                },
                _ => None,
            };
            match input {
                Some(UserInput::Quit) => return Ok(()),
                Some(input) => {
                    if input_tx.send(input).is_err() {
                        return Ok(());
                    }
                }
                None => {}
            }
        }
    }
}

fn map_key(code: KeyCode) -> UserInput {
    match code {
        KeyCode::Up => UserInput::LineUp,
        KeyCode::Down => UserInput::LineDown,
        KeyCode::Char('+') | KeyCode::Char('=') => UserInput::OffsetIncrease,
        KeyCode::Char('-') => UserInput::OffsetDecrease,
        KeyCode::Char(' ') => UserInput::ToggleSync,
        KeyCode::Char('s') => UserInput::Show,
        KeyCode::Char('h') => UserInput::Hide,
        KeyCode::Char('r') => UserInput::ResetOverride,
        KeyCode::Char('q') | KeyCode::Esc => UserInput::Quit,
        _ => UserInput::Interaction,
    }
}

fn handle_ui(display: &SyncDisplay, config: &LyricsyncConfig, f: &mut Frame<CrosstermBackend<Stdout>>) {
    let size = f.size();
    let state = display.lock().unwrap();
    let theme = &config.theme;

    if state.visibility == Visibility::Hidden {
        let hidden = Paragraph::new("lyricsync hidden (s: show, q: quit)")
            .style(Style::default().fg(theme.inactive_text_color.0));
        f.render_widget(hidden, size);
        return;
    }

    let vertical_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(3), Constraint::Length(1)].as_ref())
        .split(size);

    let horizontal_layout = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(72), Constraint::Percentage(28)].as_ref())
        .split(vertical_layout[0]);

    render_lyrics(f, &state, config, horizontal_layout[0]);
    render_info(f, &state, theme, horizontal_layout[1]);

    // Track progress
    let ratio = if state.duration_ms == 0 {
        0.0
    } else {
        (state.progress_ms as f64 / state.duration_ms as f64).clamp(0.0, 1.0)
    };
    let label = format!(
        "{} / {}",
        fmt_duration(state.progress_ms),
        fmt_duration(state.duration_ms)
    );
    let track_progress = Gauge::default()
        .gauge_style(Style::default().fg(theme.progress_color.0))
        .ratio(ratio)
        .label(label);
    f.render_widget(track_progress, vertical_layout[1]);
}

fn render_lyrics(
    f: &mut Frame<CrosstermBackend<Stdout>>,
    state: &DisplayState,
    config: &LyricsyncConfig,
    area: Rect,
) {
    let theme = &config.theme;
    let mut title = state.song_label.clone();
    if state.offset_banner {
        title = format!("{title}  [offset {:+} ms]", state.offset_ms);
    }
    let lyrics_block = Block::default()
        .border_style(Style::default().fg(theme.border_color.0))
        .title(Span::styled(
            title,
            Style::default().fg(if state.offset_banner {
                theme.banner_color.0
            } else {
                theme.border_color.0
            }),
        ))
        .borders(Borders::ALL)
        .title_alignment(Alignment::Left);

    if state.lines.is_empty() {
        let placeholder = Paragraph::new("No lyrics :(")
            .style(Style::default().fg(theme.inactive_text_color.0))
            .alignment(Alignment::Center)
            .block(lyrics_block);
        f.render_widget(placeholder, area);
        return;
    }

    let text = state
        .lines
        .iter()
        .enumerate()
        .map(|(idx, each)| {
            let color = if idx == state.current_line {
                theme.active_text_color.0
            } else {
                theme.inactive_text_color.0
            };
            Line::from(Span::styled(each.as_str(), Style::default().fg(color)))
        })
        .collect::<Vec<_>>();

    let scroll = state
        .current_line
        .saturating_sub(config.display.scroll_offset as usize)
        .min(u16::MAX as usize) as u16;
    let lyrics_part = Paragraph::new(text)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0))
        .block(lyrics_block);
    f.render_widget(lyrics_part, area);
}

fn render_info(
    f: &mut Frame<CrosstermBackend<Stdout>>,
    state: &DisplayState,
    theme: &ThemeConfiguration,
    area: Rect,
) {
    let info_block = Block::new()
        .border_style(Style::default().fg(theme.border_color.0))
        .title("About this track")
        .borders(Borders::ALL)
        .title_alignment(Alignment::Right);

    let info_part = Paragraph::new(vec![
        Line::from(format!("Artists: {}", state.track_data.track_artists)),
        Line::from(format!("Album: {}", state.track_data.track_album)),
        Line::from(format!(
            "Source: {}",
            state.source_label.as_deref().unwrap_or("-")
        )),
        Line::from(format!(
            "Timing: {}",
            if state.is_synchronized { "synced" } else { "estimated" }
        )),
        Line::from(format!(
            "Sync: {}",
            if state.sync_enabled { "on" } else { "off" }
        )),
        Line::from(format!("Offset: {:+} ms", state.offset_ms)),
        Line::from(fmt_latency(state.mean_latency_ms)),
    ])
    .style(Style::default().fg(theme.inactive_text_color.0))
    .alignment(Alignment::Left)
    .wrap(Wrap { trim: false })
    .block(info_block);
    f.render_widget(info_part, area);
}

fn fmt_latency(mean_latency_ms: Option<u64>) -> String {
    match mean_latency_ms {
        Some(latency) => format!("Latency: {latency} ms"),
        None => "Latency: -".to_owned(),
    }
}

fn fmt_duration(duration_ms: u64) -> String {
    let mut seconds = duration_ms / 1000;
    let minutes = seconds / 60;
    seconds %= 60;
    format!("{minutes:0>2}:{seconds:0>2}")
}

fn setup_terminal() -> anyhow::Result<Term> {
    let mut stdout = std::io::stdout();
    enable_raw_mode()?;
    crossterm::execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    Ok(Terminal::new(CrosstermBackend::new(stdout))?)
}

fn restore_terminal(terminal: &mut Term) -> anyhow::Result<()> {
    disable_raw_mode()?;
    crossterm::execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor().map_err(anyhow::Error::from)
}
