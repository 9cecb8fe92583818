//! Terminal User Interface (TUI) rendering and management.
//!
//! This module handles initializing the terminal in raw mode, restoring it on exit,
//! and drawing the application state using `ratatui`.

use std::io::{self, Stdout};

use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen, SetTitle,
};
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, BorderType, Borders, Clear, Paragraph, Tabs, Wrap};
use ratatui::Frame;
use ratatui::Terminal;

use crate::app::{App, InputMode, StatusLevel, Tab, TitleField};
use crate::i18n::{t, Key};
use crate::output::RenderedLine;
use crate::process::ScriptStatus;

/// Type alias for the specific terminal backend used.
pub type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

/// Initializes the terminal for TUI mode.
///
/// Enables raw mode, enters the alternate screen, and creates a `ratatui` Terminal instance.
pub fn init_terminal() -> io::Result<TuiTerminal> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend)
}

/// Restores the terminal to its original state.
///
/// Disables raw mode, leaves the alternate screen, and shows the cursor.
pub fn restore_terminal(mut terminal: TuiTerminal) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Draws the current application state to the terminal.
pub fn draw(app: &mut App, terminal: &mut TuiTerminal) -> io::Result<()> {
    execute!(terminal.backend_mut(), SetTitle(app.title()))?;
    terminal.draw(|frame| {
        let area = frame.size();
        let vertical = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Length(3),
                Constraint::Min(1),
                Constraint::Length(4),
            ])
            .split(area);

        frame.render_widget(header(app), vertical[0]);
        frame.render_widget(tab_bar(app), vertical[1]);
        match app.selected {
            Tab::Settings => draw_settings(frame, app, vertical[2]),
            _ => draw_log_tab(frame, app, vertical[2]),
        }
        frame.render_widget(status_bar(app), vertical[3]);

        if app.show_help {
            let popup_area = centered_rect(70, 50, area);
            let lang = app.lang();
            let help_block = Paragraph::new(t(lang, Key::HelpText))
                .wrap(Wrap { trim: false })
                .block(
                    Block::default()
                        .title(t(lang, Key::HelpTitle))
                        .borders(Borders::ALL)
                        .border_type(BorderType::Rounded),
                )
                .style(Style::default().bg(Color::DarkGray).fg(Color::White));
            frame.render_widget(Clear, popup_area);
            frame.render_widget(help_block, popup_area);
        }
    })?;
    Ok(())
}

fn header(app: &App) -> Paragraph<'static> {
    let lang = app.lang();
    Paragraph::new(Line::from(vec![
        Span::styled(app.title(), Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(
            format!(
                "   {} {} | {} {} | {} {}",
                t(lang, Key::HeaderLang),
                lang.code(),
                t(lang, Key::HeaderFont),
                app.config.font_size,
                t(lang, Key::Version),
                crate::version_string()
            ),
            Style::default().fg(Color::DarkGray),
        ),
    ]))
}

fn tab_bar(app: &App) -> Tabs<'static> {
    let lang = app.lang();
    let titles: Vec<Line<'static>> = Tab::ALL
        .iter()
        .enumerate()
        .map(|(i, tab)| {
            let mut spans = vec![Span::raw(format!("{} {}", i + 1, tab.label(lang)))];
            if let Some(status) = tab.script().and_then(|kind| app.tab(kind)).map(|log| log.status) {
                if let Some(marker) = status_marker(status) {
                    spans.push(Span::styled(format!(" {}", marker.0), marker.1));
                }
            }
            Line::from(spans)
        })
        .collect();
    Tabs::new(titles)
        .select(app.selected.index())
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
}

fn draw_log_tab(frame: &mut Frame, app: &mut App, area: Rect) {
    let lang = app.lang();
    let mut log_area = area;
    if app.selected == Tab::Upgrade {
        let split = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(1), Constraint::Min(1)])
            .split(area);
        let firmware = app
            .firmware
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| t(lang, Key::None).to_string());
        let line = Line::from(vec![
            Span::styled(
                format!("{} ", t(lang, Key::FirmwareFile)),
                Style::default().fg(Color::DarkGray),
            ),
            Span::raw(shorten_middle(&firmware, split[0].width as usize)),
        ]);
        frame.render_widget(Paragraph::new(line), split[0]);
        log_area = split[1];
    }

    let Some(tab) = app.selected_tab() else {
        return;
    };
    let title = format!(
        "{} - {}",
        t(lang, tab.kind.label()),
        tab.status.describe(lang)
    );
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray));
    let inner = block.inner(log_area);
    let height = inner.height as usize;
    app.set_log_view_height(height);

    let Some(tab) = app.selected_tab() else {
        return;
    };
    let width = inner.width as usize;
    let lines: Vec<Line<'static>> = tab
        .buffer
        .iter()
        .skip(tab.scroll)
        .take(height)
        .map(|line| Line::from(truncate_spans(line_spans(line), width)))
        .collect();
    frame.render_widget(Paragraph::new(Text::from(lines)).block(block), log_area);
    if tab.buffer.is_empty() {
        let placeholder = Paragraph::new(t(lang, Key::Idle)).style(Style::default().fg(Color::DarkGray));
        frame.render_widget(placeholder, inner);
    }
}

fn draw_settings(frame: &mut Frame, app: &App, area: Rect) {
    let lang = app.lang();
    let field_line = |field: TitleField, label: Key, draft: &str| {
        let editing = app.input_mode == InputMode::Title(field);
        let value = if editing {
            format!("{}|", app.input)
        } else {
            draft.to_string()
        };
        let marker = if app.settings_focus == field { "> " } else { "  " };
        let style = if editing {
            Style::default().fg(Color::Green)
        } else if app.settings_focus == field {
            Style::default().add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        Line::from(vec![
            Span::raw(marker),
            Span::styled(format!("{:<12}", t(lang, label)), Style::default().fg(Color::DarkGray)),
            Span::styled(value, style),
        ])
    };
    let lines = vec![
        Line::from(Span::styled(
            t(lang, Key::SettingsTitle),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::default(),
        field_line(TitleField::En, Key::TitleEn, &app.title_en_draft),
        field_line(TitleField::Zh, Key::TitleZh, &app.title_zh_draft),
        Line::default(),
        Line::from(Span::styled(
            format!("[s] {}", t(lang, Key::SaveSettings)),
            Style::default().fg(Color::Cyan),
        )),
    ];
    let block = Block::default()
        .title(Tab::Settings.label(lang))
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::DarkGray));
    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn status_bar(app: &App) -> Paragraph<'static> {
    let lang = app.lang();
    let help_line = match app.input_mode {
        InputMode::Firmware => Line::from(Span::styled(
            format!("{} {}| (Enter / Esc)", t(lang, Key::SelectFirmware), app.input),
            Style::default().fg(Color::Green),
        )),
        InputMode::Title(_) => Line::from(Span::styled(
            "Enter / Esc",
            Style::default().fg(Color::Green),
        )),
        InputMode::Normal => match app.status_message() {
            Some((text, StatusLevel::Warning)) => Line::from(Span::styled(
                text.to_string(),
                Style::default().fg(Color::Yellow),
            )),
            Some((text, StatusLevel::Info)) => Line::from(Span::raw(text.to_string())),
            None => Line::from(Span::styled(
                t(lang, Key::Hints),
                Style::default().fg(Color::DarkGray),
            )),
        },
    };
    Paragraph::new(Text::from(vec![Line::from(app.status_line()), help_line])).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(Color::DarkGray)),
    )
}

fn status_marker(status: ScriptStatus) -> Option<(&'static str, Style)> {
    match status {
        ScriptStatus::Idle => None,
        ScriptStatus::Running => Some(("●", Style::default().fg(Color::Green))),
        ScriptStatus::Exited { code: 0 } => Some(("✓", Style::default().fg(Color::Gray))),
        ScriptStatus::Exited { .. } | ScriptStatus::Error => {
            Some(("✗", Style::default().fg(Color::Red)))
        }
    }
}

/// Converts a rendered log line into styled spans.
pub fn line_spans(line: &RenderedLine) -> Vec<Span<'static>> {
    let mut spans = Vec::with_capacity(line.segments.len() + 2);
    spans.push(Span::raw(line.timestamp.clone()));
    spans.push(Span::styled(
        line.level_label(),
        Style::default().fg(line.level.color()),
    ));
    for segment in &line.segments {
        match &segment.style {
            Some(style) => spans.push(Span::styled(
                segment.text.clone(),
                Style::default().fg(style.color),
            )),
            None => spans.push(Span::raw(segment.text.clone())),
        }
    }
    spans
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

/// Elides the middle of a long path, keeping the file name readable.
fn shorten_middle(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max || max < 8 {
        return text.to_string();
    }
    let keep = max - 1;
    let tail = keep / 2 + keep % 2;
    let head = keep - tail;
    let start: String = text.chars().take(head).collect();
    let end: String = text.chars().skip(count - tail).collect();
    format!("{}…{}", start, end)
}

fn truncate_spans(spans: Vec<Span<'static>>, max: usize) -> Vec<Span<'static>> {
    if max == 0 {
        return Vec::new();
    }
    let total_len: usize = spans.iter().map(|span| span.content.chars().count()).sum();
    if total_len <= max {
        return spans;
    }

    let mut remaining = max.saturating_sub(1);
    let mut out = Vec::new();
    for span in spans {
        if remaining == 0 {
            break;
        }
        let count = span.content.chars().count();
        if count <= remaining {
            remaining -= count;
            out.push(span);
        } else {
            let truncated = span.content.chars().take(remaining).collect::<String>();
            out.push(Span::styled(truncated, span.style));
            remaining = 0;
        }
    }
    out.push(Span::raw("~"));
    out
}
