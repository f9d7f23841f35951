mod render;
mod session;

use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::widgets::TableState;
use std::io;

use crate::app::catalog::{self, Episode, SortKey, filter_episodes, truncate};
use crate::app::player::PlayerController;
use crate::app::player::engine::MpvSpawner;
use crate::app::player::unlock::{LinkOpener, SystemOpener};
use crate::config::Config;

use self::render::draw_tui;
use self::session::TuiSession;

/// Presentation of the active session, independent of play/pause state.
/// Switching between `Modal` and `Minimized` never touches the session;
/// only leaving to `Hidden` closes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlayerView {
    Hidden,
    Modal,
    Minimized,
}

impl PlayerView {
    pub(crate) fn minimize(self) -> Self {
        match self {
            Self::Modal | Self::Minimized => Self::Minimized,
            Self::Hidden => Self::Hidden,
        }
    }

    pub(crate) fn expand(self) -> Self {
        match self {
            Self::Modal | Self::Minimized => Self::Modal,
            Self::Hidden => Self::Hidden,
        }
    }

    pub(crate) fn is_visible(self) -> bool {
        self != Self::Hidden
    }
}

#[derive(Debug, Clone)]
pub(super) struct PendingNotice {
    pub(super) message: String,
}

pub(crate) fn run_tui(config: &Config) -> Result<()> {
    let mut session = TuiSession::enter()?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))
        .context("failed to initialize terminal backend")?;
    terminal.clear()?;

    let load = catalog::load_catalog(config);
    let episodes = load.episodes;
    let mut controller = PlayerController::new(
        Box::new(MpvSpawner::new(config.player_bin.clone())),
        &episodes,
        config.load_timeout,
        config.progress_url.clone(),
    );
    let opener = SystemOpener;

    let mut table_state = TableState::default();
    table_state.select((!episodes.is_empty()).then_some(0));
    let mut query = String::new();
    let mut searching = false;
    let mut sort = SortKey::NewestFirst;
    let mut view = PlayerView::Hidden;
    let mut pending_notice = None::<PendingNotice>;
    let mut status = if load.warnings.is_empty() {
        status_info("Ready. Enter plays the selected episode.")
    } else {
        status_info(&load.warnings.join(" | "))
    };

    loop {
        controller.tick();
        if view.is_visible() && controller.session().is_none() {
            view = PlayerView::Hidden;
        }

        let visible = filter_episodes(&episodes, &query, sort);
        clamp_selection(&mut table_state, visible.len());

        terminal.draw(|frame| {
            draw_tui(
                frame,
                &visible,
                &mut table_state,
                &controller,
                view,
                sort,
                &query,
                searching,
                &status,
                pending_notice.as_ref(),
            )
        })?;

        if !event::poll(Duration::from_millis(200))? {
            continue;
        }

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if pending_notice.is_some() {
            pending_notice = None;
            continue;
        }

        if searching {
            match key.code {
                KeyCode::Enter | KeyCode::Esc => searching = false,
                KeyCode::Backspace => {
                    query.pop();
                }
                KeyCode::Char(c) => query.push(c),
                _ => {}
            }
            continue;
        }

        if view == PlayerView::Modal {
            match key.code {
                KeyCode::Char(' ') => controller.toggle_playback(),
                KeyCode::Char('m') => controller.toggle_mute(),
                KeyCode::Left => nudge_seek(&mut controller, -5.0),
                KeyCode::Right => nudge_seek(&mut controller, 5.0),
                KeyCode::Down | KeyCode::Char('n') => view = view.minimize(),
                KeyCode::Char('a') => {
                    if let Some(episode) = controller.session().map(|s| s.episode.clone()) {
                        status = run_assessment(&mut controller, &episode, &opener);
                    }
                }
                KeyCode::Esc | KeyCode::Char('x') => {
                    controller.close();
                    view = PlayerView::Hidden;
                    status = status_info("Player closed. Progress kept for this run.");
                }
                KeyCode::Char('q') => break,
                _ => {}
            }
            continue;
        }

        match key.code {
            KeyCode::Char('q') => break,
            KeyCode::Char('/') => searching = true,
            KeyCode::Char('o') => sort = sort.next(),
            KeyCode::Up => {
                if let Some(selected) = table_state.selected() {
                    table_state.select(Some(selected.saturating_sub(1)));
                }
            }
            KeyCode::Down => {
                if let Some(selected) = table_state.selected()
                    && !visible.is_empty()
                {
                    let next = (selected + 1).min(visible.len().saturating_sub(1));
                    table_state.select(Some(next));
                }
            }
            KeyCode::Char(' ') if view == PlayerView::Minimized => controller.toggle_playback(),
            KeyCode::Char('e') if view == PlayerView::Minimized => view = view.expand(),
            KeyCode::Char('x') if view == PlayerView::Minimized => {
                controller.close();
                view = PlayerView::Hidden;
                status = status_info("Player closed. Progress kept for this run.");
            }
            KeyCode::Enter => {
                let Some(episode) = selected_episode(&table_state, &visible) else {
                    continue;
                };
                match controller.request_play(&episode) {
                    Ok(()) => {
                        view = PlayerView::Modal;
                        status =
                            status_info(&format!("Loading {}", truncate(&episode.title, 48)));
                    }
                    Err(denied) => {
                        pending_notice = Some(PendingNotice {
                            message: format!("{denied}\n\nPress any key to continue."),
                        });
                        status = status_info("Episode not playable.");
                    }
                }
            }
            KeyCode::Char('a') => {
                let Some(episode) = selected_episode(&table_state, &visible) else {
                    continue;
                };
                status = run_assessment(&mut controller, &episode, &opener);
            }
            _ => {}
        }
    }

    controller.close();
    terminal.show_cursor()?;
    session.leave()?;
    Ok(())
}

fn selected_episode(table_state: &TableState, visible: &[Episode]) -> Option<Episode> {
    table_state
        .selected()
        .and_then(|idx| visible.get(idx))
        .cloned()
}

fn clamp_selection(table_state: &mut TableState, len: usize) {
    if len == 0 {
        table_state.select(None);
        return;
    }
    match table_state.selected() {
        Some(selected) => table_state.select(Some(selected.min(len - 1))),
        None => table_state.select(Some(0)),
    }
}

fn nudge_seek(controller: &mut PlayerController, delta_percent: f64) {
    let Some(current) = controller
        .session()
        .filter(|session| session.duration_secs > 0.0)
        .map(|session| session.progress_ratio() * 100.0)
    else {
        return;
    };
    controller.seek_percent(current + delta_percent);
}

fn run_assessment(
    controller: &mut PlayerController,
    episode: &Episode,
    opener: &dyn LinkOpener,
) -> String {
    let outcome = controller.complete_assessment(episode, opener);
    let mut message = match outcome.newly_unlocked {
        Some(id) => format!("Assessment opened. Episode {id} unlocked."),
        None => "Assessment opened. Nothing new to unlock.".to_string(),
    };
    for warning in &outcome.warnings {
        message.push_str(" | ");
        message.push_str(warning);
    }
    if outcome.warnings.is_empty() {
        status_info(&message)
    } else {
        status_error(&message)
    }
}

pub(super) fn status_info(msg: &str) -> String {
    format!("INFO: {msg}")
}

pub(super) fn status_error(msg: &str) -> String {
    format!("ERROR: {msg}")
}
