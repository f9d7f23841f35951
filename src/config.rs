use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_LOAD_TIMEOUT_SECS: u64 = 15;

/// Runtime configuration resolved once at startup and passed down explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    /// Remote catalog endpoint; `None` means the built-in catalog only.
    pub catalog_url: Option<String>,
    /// Progress-sync endpoint for assessment completion; `None` keeps unlock
    /// state purely local.
    pub progress_url: Option<String>,
    /// External media player binary.
    pub player_bin: PathBuf,
    /// How long a session may stay in `Loading` before it is failed.
    pub load_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(
            env::var_os("PODTRACK_CATALOG_URL"),
            env::var_os("PODTRACK_PROGRESS_URL"),
            env::var_os("PODTRACK_PLAYER_BIN"),
            env::var_os("PODTRACK_LOAD_TIMEOUT_SECS"),
        )
    }

    pub fn from_vars(
        catalog_url: Option<OsString>,
        progress_url: Option<OsString>,
        player_bin: Option<OsString>,
        load_timeout_secs: Option<OsString>,
    ) -> Self {
        Self {
            catalog_url: non_empty_string(catalog_url),
            progress_url: non_empty_string(progress_url),
            player_bin: match player_bin {
                Some(value) if !value.is_empty() => PathBuf::from(value),
                _ => PathBuf::from("mpv"),
            },
            load_timeout: Duration::from_secs(
                non_empty_string(load_timeout_secs)
                    .and_then(|raw| raw.trim().parse::<u64>().ok())
                    .filter(|secs| *secs > 0)
                    .unwrap_or(DEFAULT_LOAD_TIMEOUT_SECS),
            ),
        }
    }
}

fn non_empty_string(value: Option<OsString>) -> Option<String> {
    let value = value?.into_string().ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
