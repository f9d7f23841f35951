use std::collections::BTreeSet;
use std::process::{Command as ProcessCommand, Stdio};

use anyhow::{Context, Result};
use serde_json::{Value, json};

use crate::app::catalog::Episode;
use crate::http::{RetryPolicy, post_json};

/// Set of playable episode ids. Monotonic for the lifetime of the process:
/// ids are only ever added, never removed.
#[derive(Debug, Clone, Default)]
pub(crate) struct UnlockState {
    unlocked: BTreeSet<u32>,
}

impl UnlockState {
    /// Seeds the set with the lowest catalog id so the series has an entry
    /// point.
    pub(crate) fn seeded(episodes: &[Episode]) -> Self {
        let mut unlocked = BTreeSet::new();
        if let Some(first) = episodes.iter().map(|episode| episode.id).min() {
            unlocked.insert(first);
        }
        Self { unlocked }
    }

    pub(crate) fn is_unlocked(&self, episode_id: u32) -> bool {
        self.unlocked.contains(&episode_id)
    }

    /// Returns true when the id was newly added.
    pub(crate) fn unlock(&mut self, episode_id: u32) -> bool {
        self.unlocked.insert(episode_id)
    }

    pub(crate) fn merge<I: IntoIterator<Item = u32>>(&mut self, ids: I) {
        self.unlocked.extend(ids);
    }

    pub(crate) fn ids(&self) -> Vec<u32> {
        self.unlocked.iter().copied().collect()
    }
}

/// Opens the assessment URL in an external context. Fire-and-forget; the
/// caller only ever reports a warning on failure.
pub(crate) trait LinkOpener {
    fn open(&self, url: &str) -> Result<()>;
}

pub(crate) struct SystemOpener;

impl LinkOpener for SystemOpener {
    fn open(&self, url: &str) -> Result<()> {
        #[cfg(target_os = "macos")]
        let opener = "open";
        #[cfg(not(target_os = "macos"))]
        let opener = "xdg-open";

        ProcessCommand::new(opener)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to launch {opener} for {url}"))?;
        Ok(())
    }
}

/// Idempotent server-side mark-complete. The response body carries the
/// authoritative unlocked set, which the caller merges into local state.
pub(crate) fn sync_completion_remote(url: &str, episode_id: u32) -> Result<Vec<u32>, String> {
    let body = json!({ "episode_id": episode_id, "completed": true });
    let raw = post_json(url, &body, RetryPolicy::default())?;
    parse_unlocked_ids(&raw).ok_or_else(|| "progress response had no unlocked id list".to_string())
}

pub(crate) fn parse_unlocked_ids(raw: &str) -> Option<Vec<u32>> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let items = value.pointer("/unlocked")?.as_array()?;
    let ids: Vec<u32> = items
        .iter()
        .filter_map(Value::as_u64)
        .filter(|id| *id > 0 && *id <= u64::from(u32::MAX))
        .map(|id| id as u32)
        .collect();
    if ids.is_empty() { None } else { Some(ids) }
}
