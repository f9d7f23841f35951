pub(crate) mod catalog;
pub(crate) mod player;
mod tui;

#[cfg(test)]
mod tests;

use std::thread;
use std::time::Duration;

use anyhow::Result;

use crate::cli::{Cli, Command};
use crate::config::Config;

use self::catalog::{Episode, format_published_display, load_catalog, truncate};
use self::player::engine::MpvSpawner;
use self::player::unlock::{SystemOpener, UnlockState};
use self::player::{PlayerController, SessionPhase, format_clock};

pub fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env();

    match cli.command {
        Some(Command::List) => run_list(&config),
        Some(Command::Play { id }) => run_play(&config, id),
        Some(Command::Assess { id }) => run_assess(&config, id),
        Some(Command::Tui) | None => tui::run_tui(&config),
    }
}

fn run_list(config: &Config) -> Result<()> {
    let load = load_catalog(config);
    emit_warnings(&load.warnings);

    let unlocks = UnlockState::seeded(&load.episodes);
    println!(
        "{:<4} {:<52} {:<14} {:<14} {:<8}",
        "ID", "TITLE", "CATEGORY", "PUBLISHED", "STATE"
    );
    for episode in &load.episodes {
        let state = if !unlocks.is_unlocked(episode.id) {
            "LOCKED"
        } else if !episode.has_media() {
            "SOON"
        } else {
            "OPEN"
        };
        println!(
            "{:<4} {:<52} {:<14} {:<14} {:<8}",
            episode.id,
            truncate(&episode.title, 52),
            truncate(&episode.category, 14),
            format_published_display(&episode.published_at),
            state
        );
    }
    Ok(())
}

fn run_play(config: &Config, id: u32) -> Result<()> {
    let load = load_catalog(config);
    emit_warnings(&load.warnings);
    let Some(episode) = find_episode(&load.episodes, id) else {
        return Ok(());
    };

    let mut controller = PlayerController::new(
        Box::new(MpvSpawner::new(config.player_bin.clone())),
        &load.episodes,
        config.load_timeout,
        config.progress_url.clone(),
    );

    if let Err(denied) = controller.request_play(&episode) {
        println!("{denied}");
        return Ok(());
    }
    println!("Playing: {}", episode.title);

    let mut announced_duration = false;
    loop {
        controller.tick();
        let Some(session) = controller.session() else {
            break;
        };
        if !announced_duration && session.duration_secs > 0.0 {
            println!("Duration: {}", format_clock(session.duration_secs));
            announced_duration = true;
        }
        match session.phase {
            SessionPhase::Ended => {
                println!("Finished: {}", episode.title);
                break;
            }
            SessionPhase::Failed => {
                let detail = session
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "playback failed".to_string());
                println!("Playback stopped: {detail}");
                break;
            }
            _ => {}
        }
        thread::sleep(Duration::from_millis(200));
    }

    controller.close();
    Ok(())
}

fn run_assess(config: &Config, id: u32) -> Result<()> {
    let load = load_catalog(config);
    emit_warnings(&load.warnings);
    let Some(episode) = find_episode(&load.episodes, id) else {
        return Ok(());
    };
    if !episode.has_assessment() {
        println!("Episode {id} has no assessment link.");
        return Ok(());
    }

    let mut controller = PlayerController::new(
        Box::new(MpvSpawner::new(config.player_bin.clone())),
        &load.episodes,
        config.load_timeout,
        config.progress_url.clone(),
    );
    let outcome = controller.complete_assessment(&episode, &SystemOpener);
    emit_warnings(&outcome.warnings);

    match outcome.newly_unlocked {
        Some(next) => println!("Assessment opened. Episode {next} unlocked."),
        None => println!("Assessment opened. Nothing new to unlock."),
    }
    let unlocked = controller
        .unlocked_ids()
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(", ");
    println!("Unlocked this run: {unlocked}");
    Ok(())
}

fn find_episode(episodes: &[Episode], id: u32) -> Option<Episode> {
    let found = episodes.iter().find(|episode| episode.id == id).cloned();
    if found.is_none() {
        println!("No episode with id {id}. Run `podtrack list` to see the catalog.");
    }
    found
}

fn emit_warnings(warnings: &[String]) {
    for warning in warnings {
        eprintln!("Warning: {warning}");
    }
}
