use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{
    Block, BorderType, Borders, Cell, Clear, Gauge, Padding, Paragraph, Row, Table, TableState,
    Wrap,
};

use crate::app::catalog::{Episode, SortKey, format_published_display, truncate};
use crate::app::player::{PlayerController, SessionPhase, format_clock};

use super::{PendingNotice, PlayerView};

#[allow(clippy::too_many_arguments)]
pub(super) fn draw_tui(
    frame: &mut Frame,
    visible: &[Episode],
    table_state: &mut TableState,
    controller: &PlayerController,
    view: PlayerView,
    sort: SortKey,
    query: &str,
    searching: bool,
    status: &str,
    pending_notice: Option<&PendingNotice>,
) {
    let bg = Block::default().style(Style::default().bg(Color::Black));
    frame.render_widget(bg, frame.area());

    let minimized = view == PlayerView::Minimized;
    let mut constraints = vec![
        Constraint::Length(3),
        Constraint::Length(3),
        Constraint::Min(8),
    ];
    if minimized {
        constraints.push(Constraint::Length(3));
    }
    constraints.push(Constraint::Length(3));
    constraints.push(Constraint::Length(3));
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(frame.area());

    let unlocked = controller.unlocked_ids().len();
    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "PODTRACK",
            Style::default()
                .fg(Color::Rgb(110, 170, 255))
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled("   ", Style::default()),
        Span::styled(
            format!("{} episodes", visible.len()),
            Style::default().fg(Color::Rgb(185, 195, 210)),
        ),
        Span::styled("   ", Style::default()),
        Span::styled(
            format!("{unlocked} unlocked"),
            Style::default().fg(Color::Rgb(185, 195, 210)),
        ),
        Span::styled("   ", Style::default()),
        Span::styled(
            format!("sort: {}", sort.label()),
            Style::default().fg(Color::Yellow),
        ),
    ]))
    .alignment(Alignment::Center)
    .block(panel_block("Series"));
    frame.render_widget(header, chunks[0]);

    let search_text = if searching {
        format!("{query}█")
    } else if query.is_empty() {
        "press / to search".to_string()
    } else {
        query.to_string()
    };
    let search = Paragraph::new(search_text)
        .style(if searching {
            Style::default().fg(Color::Rgb(230, 235, 242))
        } else {
            Style::default().fg(Color::Rgb(140, 150, 165))
        })
        .block(panel_block("Search"));
    frame.render_widget(search, chunks[1]);

    let body_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(64), Constraint::Percentage(36)])
        .split(chunks[2]);

    let rows: Vec<Row> = visible
        .iter()
        .map(|episode| {
            let state = episode_state_label(controller, episode);
            Row::new(vec![
                Cell::from(episode.id.to_string()),
                Cell::from(truncate(&episode.title, 52)),
                Cell::from(episode.category.clone()),
                Cell::from(format_published_display(&episode.published_at)),
                Cell::from(state),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(4),
            Constraint::Percentage(52),
            Constraint::Length(14),
            Constraint::Length(14),
            Constraint::Length(8),
        ],
    )
    .header(
        Row::new(vec!["ID", "Title", "Category", "Published", "State"]).style(
            Style::default()
                .fg(Color::Rgb(110, 170, 255))
                .add_modifier(Modifier::BOLD),
        ),
    )
    .block(panel_block("Episodes"))
    .row_highlight_style(
        Style::default()
            .bg(Color::Rgb(110, 170, 255))
            .fg(Color::Black)
            .add_modifier(Modifier::BOLD),
    )
    .highlight_symbol("▸ ");
    frame.render_stateful_widget(table, body_chunks[0], table_state);

    let selection_text = match table_state.selected().and_then(|idx| visible.get(idx)) {
        Some(episode) => {
            let mut text = format!(
                "Title\n{}\n\nCategory\n{}\n\nPublished\n{}\n\nAbout\n{}",
                truncate(&episode.title, 40),
                episode.category,
                format_published_display(&episode.published_at),
                truncate(&episode.description, 120),
            );
            if let Some(position) = controller.saved_position(episode.id)
                && position > 0.0
            {
                text.push_str(&format!("\n\nResumes at\n{}", format_clock(position)));
            }
            if !controller.is_unlocked(episode.id) {
                text.push_str("\n\nLocked. Take the previous\nepisode's assessment first.");
            }
            text
        }
        None => "No episodes match the search.\n\nPress / to edit the query.".to_string(),
    };
    let selection = Paragraph::new(selection_text)
        .style(Style::default().fg(Color::Rgb(230, 230, 230)))
        .block(panel_block("Selected"))
        .alignment(Alignment::Left);
    frame.render_widget(selection, body_chunks[1]);

    let mut next_chunk = 3;
    if minimized {
        draw_mini_player(frame, controller, chunks[next_chunk]);
        next_chunk += 1;
    }

    let controls = Paragraph::new(controls_line(view))
        .alignment(Alignment::Center)
        .block(panel_block("Controls"));
    frame.render_widget(controls, chunks[next_chunk]);

    let status_widget = Paragraph::new(status.to_string())
        .style(status_style(status))
        .block(panel_block("Status"));
    frame.render_widget(status_widget, chunks[next_chunk + 1]);

    if view == PlayerView::Modal {
        draw_modal_player(frame, controller);
    }

    if let Some(notice) = pending_notice {
        let popup_area = popup_rect_for_text(frame.area(), &notice.message);
        render_popup_shadow(frame, popup_area);
        frame.render_widget(Clear, popup_area);
        let popup = Paragraph::new(notice.message.clone())
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true })
            .block(modal_block("Notice"));
        frame.render_widget(popup, popup_area);
    }
}

fn episode_state_label(controller: &PlayerController, episode: &Episode) -> &'static str {
    if !controller.is_unlocked(episode.id) {
        "LOCKED"
    } else if !episode.has_media() {
        "SOON"
    } else if controller.is_unlocked(episode.id + 1) {
        "DONE"
    } else {
        "OPEN"
    }
}

fn draw_mini_player(frame: &mut Frame, controller: &PlayerController, area: Rect) {
    let Some(session) = controller.session() else {
        return;
    };

    let label = format!(
        "{}  {} / {}{}",
        truncate(&session.episode.title, 40),
        format_clock(session.position_secs),
        format_clock(session.duration_secs),
        if session.is_playing() { "" } else { "  ⏸" },
    );
    let gauge = Gauge::default()
        .block(panel_block("Now Playing"))
        .gauge_style(
            Style::default()
                .fg(Color::Rgb(130, 190, 255))
                .bg(Color::Black)
                .add_modifier(Modifier::BOLD),
        )
        .label(label)
        .ratio(session.progress_ratio());
    frame.render_widget(gauge, area);
}

fn draw_modal_player(frame: &mut Frame, controller: &PlayerController) {
    let Some(session) = controller.session() else {
        return;
    };

    let phase_text = match session.phase {
        SessionPhase::Loading => "Loading...",
        SessionPhase::Ready => "Ready",
        SessionPhase::Playing => "Playing",
        SessionPhase::Paused => "Paused",
        SessionPhase::Ended => "Finished",
        SessionPhase::Failed => "Failed",
    };
    let mut text = format!(
        "{}\n\n{}\n\n{}   {} / {}   {}%{}",
        truncate(&session.episode.title, 56),
        truncate(&session.episode.description, 160),
        phase_text,
        format_clock(session.position_secs),
        format_clock(session.duration_secs),
        (session.progress_ratio() * 100.0).round() as u32,
        if session.muted { "   muted" } else { "" },
    );
    if let Some(error) = &session.last_error {
        text.push_str(&format!("\n\n{error}"));
    }
    text.push_str(
        "\n\nSpace play/pause  ←/→ seek  m mute  a assessment\nn minimize  x close",
    );

    let popup_area = popup_rect_for_text(frame.area(), &text);
    render_popup_shadow(frame, popup_area);
    frame.render_widget(Clear, popup_area);
    let popup = Paragraph::new(text)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true })
        .block(modal_block("Now Playing"));
    frame.render_widget(popup, popup_area);
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

fn controls_line(view: PlayerView) -> Line<'static> {
    let help = match view {
        PlayerView::Minimized => {
            "↑/↓ move  Enter play  a assessment  Space pause  e expand  x close  q quit"
        }
        PlayerView::Modal | PlayerView::Hidden => {
            "↑/↓ move  Enter play  a assessment  / search  o sort  q quit"
        }
    };
    Line::from(vec![Span::styled(
        help,
        Style::default().fg(Color::Rgb(185, 195, 210)),
    )])
}

fn status_style(status: &str) -> Style {
    if status.starts_with("ERROR:") {
        Style::default()
            .fg(Color::Rgb(255, 145, 120))
            .add_modifier(Modifier::BOLD)
    } else if status.starts_with("INFO:") {
        Style::default().fg(Color::Rgb(205, 165, 255))
    } else {
        Style::default().fg(Color::Rgb(230, 235, 242))
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
    let min_width = 48.min(available_width);
    let max_width = 72.min(available_width);
    let desired_width = max_line_width.saturating_add(12);
    let width = desired_width.clamp(min_width, max_width);

    let available_height = area.height.saturating_sub(2).max(1);
    let min_height = 10.min(available_height);
    let max_height = 18.min(available_height);
    let desired_height = line_count.saturating_add(6);
    let height = desired_height.clamp(min_height, max_height);

    centered_fixed_rect(width, height, area)
}
