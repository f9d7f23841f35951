pub(crate) mod engine;
pub(crate) mod unlock;

use std::collections::HashMap;
use std::fmt;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use crate::app::catalog::Episode;

use self::engine::{EngineEvent, EngineSpawner, HandleId, MediaEngine};
use self::unlock::{LinkOpener, UnlockState, sync_completion_remote};

/// Why a play request was refused. Both cases are user notices, not errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PlayDenied {
    EpisodeLocked,
    MediaUnavailable,
}

impl fmt::Display for PlayDenied {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EpisodeLocked => write!(
                f,
                "This episode is locked. Complete the previous episode's assessment to unlock it."
            ),
            Self::MediaUnavailable => {
                write!(f, "The audio for this episode is not available yet. Coming soon!")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionPhase {
    Loading,
    Ready,
    Playing,
    Paused,
    Ended,
    Failed,
}

/// Live binding between the controller and one engine instance.
pub(crate) struct PlaybackSession {
    pub(crate) episode: Episode,
    handle: HandleId,
    engine: Option<Box<dyn MediaEngine>>,
    pub(crate) phase: SessionPhase,
    pub(crate) position_secs: f64,
    pub(crate) duration_secs: f64,
    pub(crate) muted: bool,
    pub(crate) last_error: Option<String>,
    loading_since: Instant,
}

impl PlaybackSession {
    pub(crate) fn is_playing(&self) -> bool {
        self.phase == SessionPhase::Playing
    }

    pub(crate) fn progress_ratio(&self) -> f64 {
        if self.duration_secs <= 0.0 {
            return 0.0;
        }
        (self.position_secs / self.duration_secs).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Default)]
pub(crate) struct AssessmentOutcome {
    pub(crate) newly_unlocked: Option<u32>,
    pub(crate) warnings: Vec<String>,
}

/// Mediates all interaction with the media engine. Holds at most one live
/// handle; the outgoing one is always released before a replacement spawns.
pub(crate) struct PlayerController {
    session: Option<PlaybackSession>,
    unlocks: UnlockState,
    saved_progress: HashMap<u32, f64>,
    spawner: Box<dyn EngineSpawner>,
    events_tx: mpsc::Sender<EngineEvent>,
    events_rx: mpsc::Receiver<EngineEvent>,
    next_handle: HandleId,
    load_timeout: Duration,
    progress_url: Option<String>,
}

impl PlayerController {
    pub(crate) fn new(
        spawner: Box<dyn EngineSpawner>,
        catalog: &[Episode],
        load_timeout: Duration,
        progress_url: Option<String>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        Self {
            session: None,
            unlocks: UnlockState::seeded(catalog),
            saved_progress: HashMap::new(),
            spawner,
            events_tx,
            events_rx,
            next_handle: 1,
            load_timeout,
            progress_url,
        }
    }

    pub(crate) fn session(&self) -> Option<&PlaybackSession> {
        self.session.as_ref()
    }

    pub(crate) fn is_unlocked(&self, episode_id: u32) -> bool {
        self.unlocks.is_unlocked(episode_id)
    }

    pub(crate) fn unlocked_ids(&self) -> Vec<u32> {
        self.unlocks.ids()
    }

    pub(crate) fn saved_position(&self, episode_id: u32) -> Option<f64> {
        self.saved_progress.get(&episode_id).copied()
    }

    /// Starts a new session for `episode`, replacing any active one. Denials
    /// leave controller state untouched; engine start failures leave a
    /// `Failed` session with `last_error` set so the user can retry.
    pub(crate) fn request_play(&mut self, episode: &Episode) -> Result<(), PlayDenied> {
        if !self.unlocks.is_unlocked(episode.id) {
            return Err(PlayDenied::EpisodeLocked);
        }
        if !episode.has_media() {
            return Err(PlayDenied::MediaUnavailable);
        }

        // Release-before-replace keeps the single-handle invariant.
        self.close();

        let handle = self.next_handle;
        self.next_handle += 1;
        let resume_at = self.saved_progress.get(&episode.id).copied().unwrap_or(0.0);

        let mut session = PlaybackSession {
            episode: episode.clone(),
            handle,
            engine: None,
            phase: SessionPhase::Loading,
            position_secs: resume_at,
            duration_secs: 0.0,
            muted: false,
            last_error: None,
            loading_since: Instant::now(),
        };

        let start_result = self
            .spawner
            .spawn(handle, self.events_tx.clone())
            .and_then(|mut engine| {
                engine.begin(&episode.media_url, resume_at)?;
                Ok(engine)
            });
        match start_result {
            Ok(engine) => session.engine = Some(engine),
            Err(err) => {
                session.phase = SessionPhase::Failed;
                session.last_error = Some(format!("Failed to start playback: {err}"));
            }
        }

        self.session = Some(session);
        Ok(())
    }

    /// Drains pending engine events and applies the load timeout.
    pub(crate) fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    fn tick_at(&mut self, now: Instant) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.apply_event(event);
        }

        let timed_out = self.session.as_ref().is_some_and(|session| {
            session.phase == SessionPhase::Loading
                && now.duration_since(session.loading_since) >= self.load_timeout
        });
        if timed_out {
            let timeout_secs = self.load_timeout.as_secs();
            if let Some(session) = self.session.as_mut() {
                if let Some(mut engine) = session.engine.take() {
                    engine.release();
                }
                session.phase = SessionPhase::Failed;
                session.last_error =
                    Some(format!("Media did not load within {timeout_secs} seconds."));
            }
        }
    }

    fn apply_event(&mut self, event: EngineEvent) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        // Late callbacks from a replaced handle must not touch the new session.
        if event.handle() != session.handle {
            return;
        }

        match event {
            EngineEvent::MetadataLoaded { duration_secs, .. } => {
                session.duration_secs = duration_secs;
                if session.phase == SessionPhase::Loading {
                    session.phase = SessionPhase::Ready;
                }
            }
            EngineEvent::TimeUpdate { position_secs, .. } => {
                session.position_secs = position_secs;
                if matches!(session.phase, SessionPhase::Loading | SessionPhase::Ready) {
                    session.phase = SessionPhase::Playing;
                }
            }
            EngineEvent::Ended { .. } => {
                session.phase = SessionPhase::Ended;
                if session.duration_secs > 0.0 {
                    session.position_secs = session.duration_secs;
                }
            }
            EngineEvent::Failed { message, .. } => {
                session.phase = SessionPhase::Failed;
                session.last_error = Some(message);
                if let Some(mut engine) = session.engine.take() {
                    engine.release();
                }
            }
        }
    }

    /// Flips `Playing ⇄ Paused`; restarts from zero after `Ended`. No-op
    /// with no session or a failed one.
    pub(crate) fn toggle_playback(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(engine) = session.engine.as_mut() else {
            return;
        };

        match session.phase {
            SessionPhase::Playing => match engine.set_paused(true) {
                Ok(()) => session.phase = SessionPhase::Paused,
                Err(err) => session.last_error = Some(format!("Pause failed: {err}")),
            },
            SessionPhase::Paused | SessionPhase::Ready => match engine.set_paused(false) {
                Ok(()) => session.phase = SessionPhase::Playing,
                Err(err) => session.last_error = Some(format!("Playback failed: {err}")),
            },
            SessionPhase::Ended => {
                let restart = engine.seek(0.0).and_then(|()| engine.set_paused(false));
                match restart {
                    Ok(()) => {
                        session.position_secs = 0.0;
                        session.phase = SessionPhase::Playing;
                    }
                    Err(err) => session.last_error = Some(format!("Playback failed: {err}")),
                }
            }
            SessionPhase::Loading | SessionPhase::Failed => {}
        }
    }

    /// Seeks to `percentage` of the known duration; clamped to [0, 100].
    /// No-op until the engine has reported a duration.
    pub(crate) fn seek_percent(&mut self, percentage: f64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.duration_secs <= 0.0 {
            return;
        }
        let Some(engine) = session.engine.as_mut() else {
            return;
        };

        let clamped = percentage.clamp(0.0, 100.0);
        let target = clamped / 100.0 * session.duration_secs;
        match engine.seek(target) {
            Ok(()) => session.position_secs = target,
            Err(err) => session.last_error = Some(format!("Seek failed: {err}")),
        }
    }

    pub(crate) fn toggle_mute(&mut self) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let Some(engine) = session.engine.as_mut() else {
            return;
        };

        let target = !session.muted;
        match engine.set_muted(target) {
            Ok(()) => session.muted = target,
            Err(err) => session.last_error = Some(format!("Mute failed: {err}")),
        }
    }

    /// Snapshots the position for later resume, releases the handle, and
    /// clears the session.
    pub(crate) fn close(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        self.saved_progress
            .insert(session.episode.id, session.position_secs);
        if let Some(mut engine) = session.engine.take() {
            engine.release();
        }
    }

    /// Opens the assessment link and unlocks the successor episode. Calling
    /// it again for the same episode changes nothing. When a progress
    /// endpoint is configured, the server's unlocked set is merged in; a
    /// failed sync keeps the optimistic local unlock.
    pub(crate) fn complete_assessment(
        &mut self,
        episode: &Episode,
        opener: &dyn LinkOpener,
    ) -> AssessmentOutcome {
        let mut outcome = AssessmentOutcome::default();

        if episode.has_assessment()
            && let Err(err) = opener.open(&episode.assessment_url)
        {
            outcome
                .warnings
                .push(format!("could not open the assessment link: {err}"));
        }

        let next_id = episode.id + 1;
        if self.unlocks.unlock(next_id) {
            outcome.newly_unlocked = Some(next_id);
        }

        if let Some(url) = self.progress_url.clone() {
            match sync_completion_remote(&url, episode.id) {
                Ok(server_ids) => self.unlocks.merge(server_ids),
                Err(err) => outcome
                    .warnings
                    .push(format!("progress sync failed ({err}); unlock kept locally")),
            }
        }

        outcome
    }

    #[cfg(test)]
    pub(crate) fn force_tick_at(&mut self, now: Instant) {
        self.tick_at(now);
    }

    #[cfg(test)]
    pub(crate) fn events_sender(&self) -> mpsc::Sender<EngineEvent> {
        self.events_tx.clone()
    }

    #[cfg(test)]
    pub(crate) fn current_handle(&self) -> Option<HandleId> {
        self.session.as_ref().map(|session| session.handle)
    }
}

/// mm:ss display for player timelines; bad inputs render as 0:00.
pub(crate) fn format_clock(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "0:00".to_string();
    }
    let whole = seconds as u64;
    format!("{}:{:02}", whole / 60, whole % 60)
}
