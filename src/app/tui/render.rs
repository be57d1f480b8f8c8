use chrono::{DateTime, Utc};
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, BorderType, Borders, Cell, Clear, Gauge, Padding, Paragraph, Row, Table, TableState,
    Wrap,
};

use super::super::format::{format_age, format_expiry, format_local_time, segment_ratios, truncate};
use super::super::grouping::{StoryGroup, representative_story};
use super::{PendingDelete, ViewerScreen};

const ACCENT: Color = Color::Rgb(110, 170, 255);
const MUTED: Color = Color::Rgb(185, 195, 210);
const TEXT: Color = Color::Rgb(230, 235, 242);

pub(super) fn draw_rail(
    frame: &mut Frame,
    groups: &[StoryGroup],
    table_state: &mut TableState,
    status: &str,
    now: DateTime<Utc>,
) {
    let bg = Block::default().style(Style::default().bg(Color::Black));
    frame.render_widget(bg, frame.area());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let unviewed: usize = groups.iter().map(StoryGroup::unviewed_count).sum();
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "STORYREEL",
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ),
        Span::styled("   ", Style::default()),
        Span::styled(
            format!("{} authors", groups.len()),
            Style::default().fg(MUTED),
        ),
        Span::styled("   ", Style::default()),
        Span::styled(format!("{unviewed} new"), Style::default().fg(Color::Yellow)),
    ]))
    .alignment(Alignment::Center)
    .block(panel_block("Stories"));
    frame.render_widget(header, chunks[0]);

    let body_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(64), Constraint::Percentage(36)])
        .split(chunks[1]);

    let rows: Vec<Row> = groups
        .iter()
        .map(|group| {
            let marker = if group.unviewed_count() > 0 { "●" } else { "○" };
            let latest = group
                .newest()
                .map(|story| format_age(story.created_at, now))
                .unwrap_or_else(|| "-".to_string());
            let caption = representative_story(group)
                .and_then(|story| story.caption().or(story.media()))
                .map(|text| truncate(text, 40))
                .unwrap_or_default();
            Row::new(vec![
                Cell::from(marker),
                Cell::from(truncate(group.display_name(), 24)),
                Cell::from(group.len().to_string()),
                Cell::from(latest),
                Cell::from(caption),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(2),
            Constraint::Length(24),
            Constraint::Length(8),
            Constraint::Length(10),
            Constraint::Min(10),
        ],
    )
    .header(
        Row::new(vec!["", "Author", "Stories", "Latest", "Caption"])
            .style(Style::default().fg(ACCENT).add_modifier(Modifier::BOLD)),
    )
    .block(panel_block("Rail"))
    .row_highlight_style(
        Style::default()
            .bg(ACCENT)
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("▸ ");
    frame.render_stateful_widget(table, body_chunks[0], table_state);

    let selection_text = match table_state.selected().and_then(|idx| groups.get(idx)) {
        Some(group) => match representative_story(group) {
            Some(story) => format!(
                "Author\n{}\n\nUp next\n{}\n\nPosted\n{} ({})\n\nExpiry\n{}\n\nUnviewed\n{} of {}",
                truncate(group.display_name(), 32),
                truncate(story.caption().or(story.media()).unwrap_or("(no content)"), 64),
                format_local_time(story.created_at),
                format_age(story.created_at, now),
                format_expiry(story.expires_at, now),
                group.unviewed_count(),
                group.len(),
            ),
            None => String::new(),
        },
        None => {
            "No active stories.\n\nPress r to refresh, or post one with\n`storyreel post --text ...`."
                .to_string()
        }
    };
    let selection = Paragraph::new(selection_text)
        .style(Style::default().fg(TEXT))
        .wrap(Wrap { trim: true })
        .block(panel_block("Selected"));
    frame.render_widget(selection, body_chunks[1]);

    let controls = Paragraph::new(Line::from(Span::styled(
        "↑/↓ move  Enter play  r refresh  q quit",
        Style::default().fg(MUTED),
    )))
    .alignment(Alignment::Center)
    .block(panel_block("Controls"));
    frame.render_widget(controls, chunks[2]);

    render_status(frame, status, chunks[3]);
}

pub(super) fn draw_viewer(
    frame: &mut Frame,
    screen: &ViewerScreen<'_>,
    status: &str,
    pending_delete: Option<&PendingDelete>,
) {
    let bg = Block::default().style(Style::default().bg(Color::Black));
    frame.render_widget(bg, frame.area());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Min(6),
            Constraint::Length(3),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let now = Utc::now();
    let story = screen.story;
    let mut header_spans = vec![
        Span::styled(
            truncate(screen.group.display_name(), 32),
            Style::default().fg(ACCENT).add_modifier(Modifier::BOLD),
        ),
        Span::styled("   ", Style::default()),
        Span::styled(
            format_age(story.created_at, now),
            Style::default().fg(MUTED),
        ),
        Span::styled("   ", Style::default()),
        Span::styled(
            format!("author {}/{}", screen.group_number, screen.group_total),
            Style::default().fg(MUTED),
        ),
    ];
    if screen.paused {
        header_spans.push(Span::styled("   ", Style::default()));
        header_spans.push(Span::styled(" PAUSED ", pill_active()));
    }
    let header = Paragraph::new(Line::from(header_spans))
        .alignment(Alignment::Center)
        .block(panel_block("Story"));
    frame.render_widget(header, chunks[0]);

    render_segments(frame, screen, chunks[1]);

    let mut body: Vec<Line> = Vec::new();
    if let Some(caption) = story.caption() {
        body.push(Line::from(Span::styled(
            caption.to_string(),
            Style::default().fg(TEXT).add_modifier(Modifier::BOLD),
        )));
        body.push(Line::from(""));
    }
    if let Some(media) = story.media() {
        body.push(Line::from(vec![
            Span::styled("Media  ", Style::default().fg(MUTED)),
            Span::styled(media.to_string(), Style::default().fg(TEXT)),
        ]));
    }
    if let Some(track) = story.audio_track.as_ref() {
        let state = if screen.audio_playing { "♪" } else { "♪ (paused)" };
        body.push(Line::from(vec![
            Span::styled(format!("{state}  "), Style::default().fg(MUTED)),
            Span::styled(
                format!("{} · {}", track.title, track.artist_name),
                Style::default().fg(TEXT),
            ),
        ]));
    }
    if story.is_content_less() && story.audio_track.is_none() {
        body.push(Line::from(Span::styled(
            "(no content)",
            Style::default().fg(MUTED),
        )));
    }
    body.push(Line::from(""));
    let heart = if screen.liked { "♥ liked" } else { "♡" };
    body.push(Line::from(vec![
        Span::styled(heart, Style::default().fg(Color::Rgb(255, 120, 150))),
        Span::styled(
            format!("   {} like(s)   {}", story.likes.len(), format_expiry(story.expires_at, now)),
            Style::default().fg(MUTED),
        ),
    ]));
    let content = Paragraph::new(body)
        .wrap(Wrap { trim: false })
        .block(panel_block("Content").padding(Padding::new(2, 2, 1, 0)));
    frame.render_widget(content, chunks[2]);

    let mut controls = vec![
        Span::styled(" ← back ", pill_inactive()),
        Span::styled(" ", Style::default()),
        Span::styled(" → next ", pill_inactive()),
        Span::styled(" ", Style::default()),
        Span::styled(
            if screen.paused { " space play " } else { " space hold " },
            if screen.paused { pill_active() } else { pill_inactive() },
        ),
        Span::styled(" ", Style::default()),
        Span::styled(" k like ", pill_inactive()),
    ];
    if story.is_owned_by_viewer {
        controls.push(Span::styled(" ", Style::default()));
        controls.push(Span::styled(" d delete ", pill_inactive()));
    }
    controls.push(Span::styled("   q close", Style::default().fg(MUTED)));
    let command_bar = Paragraph::new(Line::from(controls))
        .alignment(Alignment::Center)
        .block(panel_block("Controls"));
    frame.render_widget(command_bar, chunks[3]);

    render_status(frame, status, chunks[4]);

    if let Some(confirm) = pending_delete {
        let popup_text = format!(
            "Delete this story?\n\n{}\n\nThis cannot be undone.\n\n[y / Enter] Delete   [n / Esc] Cancel",
            truncate(&confirm.caption, 56)
        );
        let popup_area = popup_rect_for_text(frame.area(), &popup_text);
        render_popup_shadow(frame, popup_area);
        frame.render_widget(Clear, popup_area);
        let popup = Paragraph::new(popup_text)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(modal_block("Confirm Delete"));
        frame.render_widget(popup, popup_area);
    }
}

/// One gauge per story in the current group.
fn render_segments(frame: &mut Frame, screen: &ViewerScreen<'_>, area: Rect) {
    let ratios = segment_ratios(screen.group.len(), screen.story_index, screen.progress);
    if ratios.is_empty() {
        return;
    }
    let count = ratios.len() as u32;
    let cells = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(ratios.iter().map(|_| Constraint::Ratio(1, count)))
        .spacing(1)
        .split(area);
    for (ratio, cell) in ratios.iter().zip(cells.iter()) {
        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(ACCENT).bg(Color::Rgb(40, 46, 56)))
            .label("")
            .ratio(*ratio);
        frame.render_widget(gauge, *cell);
    }
}

fn render_status(frame: &mut Frame, status: &str, area: Rect) {
    let status_widget = Paragraph::new(status.to_string())
        .style(status_style(status))
        .block(panel_block("Status"));
    frame.render_widget(status_widget, area);
}

fn panel_block(title: &'static str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Rgb(125, 135, 150)))
        .title(title)
}

fn modal_block(title: &'static str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(
            Style::default()
                .fg(Color::Rgb(160, 190, 235))
                .add_modifier(Modifier::BOLD),
        )
        .title(title)
        .padding(Padding::new(2, 2, 1, 1))
}

fn pill_active() -> Style {
    Style::default()
        .bg(ACCENT)
        .fg(Color::Black)
        .add_modifier(Modifier::BOLD)
}

fn pill_inactive() -> Style {
    Style::default().bg(Color::Rgb(72, 82, 96)).fg(TEXT)
}

fn status_style(status: &str) -> Style {
    if status.starts_with("ERROR:") {
        Style::default()
            .fg(Color::Rgb(255, 145, 120))
            .add_modifier(Modifier::BOLD)
    } else if status.starts_with("INFO:") {
        Style::default().fg(Color::Rgb(205, 165, 255))
    } else {
        Style::default().fg(TEXT)
    }
}

fn centered_fixed_rect(width: u16, height: u16, area: Rect) -> Rect {
    let clamped_width = width.min(area.width.max(1));
    let clamped_height = height.min(area.height.max(1));
    let x = area.x + area.width.saturating_sub(clamped_width) / 2;
    let y = area.y + area.height.saturating_sub(clamped_height) / 2;
    Rect::new(x, y, clamped_width, clamped_height)
}

fn render_popup_shadow(frame: &mut Frame, popup_area: Rect) {
    let area = frame.area();
    let shadow = Rect::new(
        (popup_area.x + 1).min(area.x + area.width.saturating_sub(1)),
        (popup_area.y + 1).min(area.y + area.height.saturating_sub(1)),
        popup_area.width.saturating_sub(1),
        popup_area.height.saturating_sub(1),
    );
    if shadow.width == 0 || shadow.height == 0 {
        return;
    }
    let shadow_block = Block::default().style(Style::default().bg(Color::Rgb(14, 16, 24)));
    frame.render_widget(shadow_block, shadow);
}

fn popup_rect_for_text(area: Rect, text: &str) -> Rect {
    let max_line_width = text
        .lines()
        .map(|line| line.chars().count() as u16)
        .max()
        .unwrap_or(0);
    let line_count = text.lines().count() as u16;

    let available_width = area.width.saturating_sub(2).max(1);
    let width = max_line_width
        .saturating_add(12)
        .clamp(44.min(available_width), 72.min(available_width));

    let available_height = area.height.saturating_sub(2).max(1);
    let height = line_count
        .saturating_add(6)
        .clamp(10.min(available_height), 16.min(available_height));

    centered_fixed_rect(width, height, area)
}
