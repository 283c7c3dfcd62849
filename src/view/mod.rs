//! Terminal rendering: measurement and drawing of the chat screen.
//!
//! Measurement is the contract with the virtualized layout: for a given
//! width, [`measure_item`] returns exactly the number of rows
//! [`render`] will draw for that item. Both sides share the same wrapping
//! code so they cannot drift apart.

use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::model::{Lifecycle, MediaKind, Message};
use crate::state::{ConnectionHealth, NoticeLevel, Session};
use crate::timeline::TimelineItem;
use crate::view_state::VirtualLayout;

/// Everything the renderer needs for one frame.
pub struct AppView<'a> {
    /// Banded timeline of the open conversation.
    pub items: &'a [TimelineItem],
    /// Layout with flushed measurements.
    pub layout: &'a VirtualLayout,
    /// Resolved absolute scroll offset.
    pub scroll_offset: usize,
    /// Session state for the chrome (status, notices, presence).
    pub session: &'a Session,
    /// Current input buffer.
    pub input: &'a str,
    /// Whether the pinned-messages side pane is open.
    pub show_pinned: bool,
}

/// Fixed chrome heights around the timeline.
const HEADER_ROWS: u16 = 1;
const INPUT_ROWS: u16 = 3;
const STATUS_ROWS: u16 = 1;

/// Width of the pinned-messages side pane when open.
const PINNED_PANE_COLS: u16 = 32;

/// Rows available for the timeline given a terminal size.
pub fn timeline_rows(terminal_height: u16) -> u16 {
    terminal_height.saturating_sub(HEADER_ROWS + INPUT_ROWS + STATUS_ROWS)
}

/// Columns the timeline occupies; measurement must use the same width
/// the renderer draws at or heights drift.
pub fn timeline_width(terminal_width: u16, show_pinned: bool) -> u16 {
    if show_pinned {
        terminal_width.saturating_sub(PINNED_PANE_COLS)
    } else {
        terminal_width
    }
}

// ===== Measurement =====

/// Number of wrapped display rows for `text` at `width` columns.
///
/// Greedy word wrap; words wider than the viewport are split at the
/// character level, counting East Asian double-width characters properly.
pub fn wrapped_rows(text: &str, width: u16) -> usize {
    let width = usize::from(width.max(1));
    let mut rows = 0usize;
    for line in text.split('\n') {
        if line.is_empty() {
            rows += 1;
            continue;
        }
        let mut used = 0usize;
        let mut line_rows = 1usize;
        for word in line.split_whitespace() {
            let word_width = UnicodeWidthStr::width(word);
            let needed = if used == 0 { word_width } else { word_width + 1 };
            if used + needed <= width {
                used += needed;
                continue;
            }
            if word_width <= width {
                line_rows += 1;
                used = word_width;
                continue;
            }
            // Word wider than the viewport: hard-split by display width.
            let mut remaining = word_width;
            if used > 0 {
                line_rows += 1;
            }
            while remaining > width {
                line_rows += 1;
                remaining -= width;
            }
            used = remaining;
        }
        rows += line_rows;
    }
    rows.max(1)
}

/// Rows one timeline item occupies at `width` columns.
///
/// Bands are always one row. A message is a header row, its wrapped
/// content, an optional media row, and a trailing blank spacer.
pub fn measure_item(item: &TimelineItem, width: u16) -> u16 {
    match item {
        TimelineItem::DayBand { .. } | TimelineItem::HourBand { .. } => 1,
        TimelineItem::Message(message) => {
            let mut rows = 1usize; // header: sender, time, delivery state
            if message.is_deleted() {
                rows += 1; // tombstone line
            } else {
                if let Some(content) = message.content() {
                    rows += wrapped_rows(content, width);
                }
                if message.media().is_some() {
                    rows += 1;
                }
            }
            rows += 1; // spacer
            u16::try_from(rows).unwrap_or(u16::MAX)
        }
    }
}

// ===== Drawing =====

/// Draw one frame.
pub fn render(frame: &mut Frame, app: &AppView<'_>) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(HEADER_ROWS),
            Constraint::Min(0),
            Constraint::Length(INPUT_ROWS),
            Constraint::Length(STATUS_ROWS),
        ])
        .split(frame.area());

    render_header(frame, chunks[0], app);
    if app.show_pinned {
        let panes = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(0), Constraint::Length(PINNED_PANE_COLS)])
            .split(chunks[1]);
        render_timeline(frame, panes[0], app);
        render_pinned(frame, panes[1], app);
    } else {
        render_timeline(frame, chunks[1], app);
    }
    render_input(frame, chunks[2], app);
    render_status(frame, chunks[3], app);
}

fn render_pinned(frame: &mut Frame, area: Rect, app: &AppView<'_>) {
    let pinned = app.session.pinned_messages();
    let mut lines: Vec<Line> = Vec::with_capacity(pinned.len());
    for message in &pinned {
        let preview = match message.content() {
            Some(content) => content.chars().take(24).collect::<String>(),
            None => "[media]".to_string(),
        };
        lines.push(Line::from(vec![
            Span::styled(
                format!("{}: ", message.sender().username),
                Style::default().fg(Color::Yellow),
            ),
            Span::raw(preview),
        ]));
    }
    if lines.is_empty() {
        lines.push(Line::from(Span::styled(
            "nothing pinned",
            Style::default().fg(Color::DarkGray),
        )));
    }
    let pane = Paragraph::new(lines)
        .block(Block::default().borders(Borders::LEFT).title(" pinned "));
    frame.render_widget(pane, area);
}

fn render_header(frame: &mut Frame, area: Rect, app: &AppView<'_>) {
    let title = format!(
        " {} — {} online",
        app.session.open(),
        app.session.presence().online_count()
    );
    let header = Paragraph::new(Line::from(title))
        .style(Style::default().add_modifier(Modifier::BOLD));
    frame.render_widget(header, area);
}

fn render_timeline(frame: &mut Frame, area: Rect, app: &AppView<'_>) {
    if app.items.is_empty() || area.height == 0 {
        return;
    }
    let range = app.layout.visible_range(app.scroll_offset, area.height);
    let Some(first) = range.clone().next() else {
        return;
    };
    let clip = app.scroll_offset.saturating_sub(app.layout.offset_of(first));

    let local = &app.session.local_user().id;
    let mut lines: Vec<Line> = Vec::new();
    for item in &app.items[range] {
        item_lines(item, area.width, item_is_own(item, local), &mut lines);
    }

    let clip = u16::try_from(clip).unwrap_or(u16::MAX);
    frame.render_widget(Paragraph::new(lines).scroll((clip, 0)), area);
}

fn item_is_own(item: &TimelineItem, local: &crate::model::UserId) -> bool {
    matches!(item, TimelineItem::Message(m) if &m.sender().id == local)
}

/// Append the display lines of one item; must stay in lockstep with
/// [`measure_item`].
fn item_lines(item: &TimelineItem, width: u16, own: bool, out: &mut Vec<Line<'static>>) {
    match item {
        TimelineItem::DayBand { label, .. } => {
            out.push(band_line(label, width, Color::Yellow));
        }
        TimelineItem::HourBand { label, .. } => {
            out.push(band_line(label, width, Color::DarkGray));
        }
        TimelineItem::Message(message) => {
            out.push(message_header(message, own));
            if message.is_deleted() {
                out.push(Line::from(Span::styled(
                    "  message deleted",
                    Style::default()
                        .fg(Color::DarkGray)
                        .add_modifier(Modifier::ITALIC),
                )));
            } else {
                if let Some(content) = message.content() {
                    for row in wrap_text(content, width) {
                        out.push(Line::from(format!("  {row}")));
                    }
                }
                if let Some(media) = message.media() {
                    let tag = match media.kind {
                        MediaKind::Image => "[image]",
                        MediaKind::Video => "[video]",
                        MediaKind::Audio => "[audio]",
                    };
                    let detail = match (media.kind, media.duration_secs) {
                        (MediaKind::Audio, Some(secs)) => format!("  {tag} {secs}s {}", media.url),
                        _ => format!("  {tag} {}", media.url),
                    };
                    out.push(Line::from(Span::styled(
                        detail,
                        Style::default().fg(Color::Cyan),
                    )));
                }
            }
            out.push(Line::default()); // spacer
        }
    }
}

fn band_line(label: &str, width: u16, color: Color) -> Line<'static> {
    let label_width = UnicodeWidthStr::width(label) + 2;
    let total = usize::from(width);
    let dashes = total.saturating_sub(label_width) / 2;
    let bar = "─".repeat(dashes);
    Line::from(Span::styled(
        format!("{bar} {label} {bar}"),
        Style::default().fg(color),
    ))
}

fn message_header(message: &Message, own: bool) -> Line<'static> {
    let name_style = if own {
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::Blue).add_modifier(Modifier::BOLD)
    };
    let mut spans = vec![
        Span::styled(message.sender().username.clone(), name_style),
        Span::styled(
            format!("  {}", message.created_at().format("%H:%M")),
            Style::default().fg(Color::DarkGray),
        ),
    ];
    if message.is_edited() && !message.is_deleted() {
        spans.push(Span::styled(
            " (edited)",
            Style::default().fg(Color::DarkGray),
        ));
    }
    if message.is_pinned() {
        spans.push(Span::styled(" *", Style::default().fg(Color::Yellow)));
    }
    match message.lifecycle() {
        Lifecycle::Optimistic => spans.push(Span::styled(
            " sending…",
            Style::default().fg(Color::DarkGray),
        )),
        Lifecycle::Failed => spans.push(Span::styled(
            " failed — press r to retry",
            Style::default().fg(Color::Red),
        )),
        Lifecycle::Confirmed => {
            if own && !message.read_by().is_empty() {
                spans.push(Span::styled(" ✓", Style::default().fg(Color::Green)));
            }
        }
    }
    Line::from(spans)
}

fn render_input(frame: &mut Frame, area: Rect, app: &AppView<'_>) {
    let input = Paragraph::new(app.input.to_string())
        .block(Block::default().borders(Borders::ALL).title(" message "));
    frame.render_widget(input, area);
}

fn render_status(frame: &mut Frame, area: Rect, app: &AppView<'_>) {
    let (health, health_style) = match app.session.connection() {
        ConnectionHealth::Connecting => ("connecting", Style::default().fg(Color::Yellow)),
        ConnectionHealth::Online => ("online", Style::default().fg(Color::Green)),
        ConnectionHealth::Offline => ("offline, retrying", Style::default().fg(Color::Yellow)),
        ConnectionHealth::AuthRequired => ("login required", Style::default().fg(Color::Red)),
        ConnectionHealth::Exhausted => ("disconnected", Style::default().fg(Color::Red)),
    };

    let mut spans = vec![Span::styled(format!(" {health}"), health_style)];
    let unread = app.session.unread_total();
    if unread > 0 {
        spans.push(Span::styled(
            format!("  {unread} unread"),
            Style::default().fg(Color::Magenta),
        ));
    }
    if let Some(notice) = app.session.notifications().visible().last() {
        let color = match notice.level {
            NoticeLevel::Info => Color::Gray,
            NoticeLevel::Warn => Color::Yellow,
            NoticeLevel::Error => Color::Red,
        };
        spans.push(Span::raw("  |  "));
        spans.push(Span::styled(notice.text.clone(), Style::default().fg(color)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Greedy word wrap matching [`wrapped_rows`] exactly.
fn wrap_text(text: &str, width: u16) -> Vec<String> {
    let width = usize::from(width.max(1));
    let mut rows = Vec::new();
    for line in text.split('\n') {
        if line.is_empty() {
            rows.push(String::new());
            continue;
        }
        let mut current = String::new();
        let mut used = 0usize;
        for word in line.split_whitespace() {
            let word_width = UnicodeWidthStr::width(word);
            let needed = if used == 0 { word_width } else { word_width + 1 };
            if used + needed <= width {
                if used > 0 {
                    current.push(' ');
                }
                current.push_str(word);
                used += needed;
                continue;
            }
            if word_width <= width {
                rows.push(std::mem::take(&mut current));
                current.push_str(word);
                used = word_width;
                continue;
            }
            if used > 0 {
                rows.push(std::mem::take(&mut current));
            }
            let mut chunk = String::new();
            let mut chunk_width = 0usize;
            for ch in word.chars() {
                let ch_width = UnicodeWidthChar::width(ch).unwrap_or(0);
                if chunk_width + ch_width > width {
                    rows.push(std::mem::take(&mut chunk));
                    chunk_width = 0;
                }
                chunk.push(ch);
                chunk_width += ch_width;
            }
            current = chunk;
            used = chunk_width;
        }
        rows.push(current);
    }
    if rows.is_empty() {
        rows.push(String::new());
    }
    rows
}

// ===== Tests =====
