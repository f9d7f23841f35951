use std::io::{BufRead, BufReader, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command as ProcessCommand, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, mpsc};
use std::time::Duration;
use std::{env, fs, thread};

use anyhow::{Context, Result, anyhow};
use serde_json::{Value, json};

/// Identity of one engine instance. Events are tagged with it so callbacks
/// from a released handle can be discarded.
pub(crate) type HandleId = u64;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum EngineEvent {
    MetadataLoaded {
        handle: HandleId,
        duration_secs: f64,
    },
    TimeUpdate {
        handle: HandleId,
        position_secs: f64,
    },
    Ended {
        handle: HandleId,
    },
    Failed {
        handle: HandleId,
        message: String,
    },
}

impl EngineEvent {
    pub(crate) fn handle(&self) -> HandleId {
        match self {
            Self::MetadataLoaded { handle, .. }
            | Self::TimeUpdate { handle, .. }
            | Self::Ended { handle }
            | Self::Failed { handle, .. } => *handle,
        }
    }
}

/// One underlying audio engine instance. Exclusively owned by the player
/// controller; `release` must leave no live playback behind.
pub(crate) trait MediaEngine {
    /// Starts loading `media_url` and begins playback at `start_at_secs`.
    /// Progress arrives asynchronously as [`EngineEvent`]s.
    fn begin(&mut self, media_url: &str, start_at_secs: f64) -> Result<()>;
    fn set_paused(&mut self, paused: bool) -> Result<()>;
    fn seek(&mut self, position_secs: f64) -> Result<()>;
    fn set_muted(&mut self, muted: bool) -> Result<()>;
    /// Stops playback and detaches the event stream. Idempotent.
    fn release(&mut self);
}

pub(crate) trait EngineSpawner {
    fn spawn(
        &self,
        handle: HandleId,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<Box<dyn MediaEngine>>;
}

/// Spawns an `mpv` subprocess per session and drives it over its JSON IPC
/// socket.
pub(crate) struct MpvSpawner {
    player_bin: PathBuf,
}

impl MpvSpawner {
    pub(crate) fn new(player_bin: PathBuf) -> Self {
        Self { player_bin }
    }
}

impl EngineSpawner for MpvSpawner {
    fn spawn(
        &self,
        handle: HandleId,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<Box<dyn MediaEngine>> {
        Ok(Box::new(MpvEngine::new(
            self.player_bin.clone(),
            handle,
            events,
        )))
    }
}

pub(crate) struct MpvEngine {
    player_bin: PathBuf,
    handle: HandleId,
    events: mpsc::Sender<EngineEvent>,
    socket_path: PathBuf,
    child: Option<Child>,
    stream: Option<UnixStream>,
    reader: Option<thread::JoinHandle<()>>,
    released: Arc<AtomicBool>,
}

impl MpvEngine {
    fn new(player_bin: PathBuf, handle: HandleId, events: mpsc::Sender<EngineEvent>) -> Self {
        let socket_path = env::temp_dir().join(format!(
            "podtrack-ipc-{}-{handle}.sock",
            std::process::id()
        ));
        Self {
            player_bin,
            handle,
            events,
            socket_path,
            child: None,
            stream: None,
            reader: None,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    fn send_command(&mut self, command: Vec<Value>) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("engine has no active IPC connection"))?;
        let mut line = json!({ "command": command }).to_string();
        line.push('\n');
        stream
            .write_all(line.as_bytes())
            .context("failed to write IPC command")?;
        Ok(())
    }

    fn connect_with_retries(socket_path: &Path) -> Result<UnixStream> {
        // mpv creates the socket shortly after startup; poll for it.
        for _ in 0..100 {
            match UnixStream::connect(socket_path) {
                Ok(stream) => return Ok(stream),
                Err(_) => thread::sleep(Duration::from_millis(50)),
            }
        }
        Err(anyhow!(
            "player IPC socket never appeared at {}",
            socket_path.display()
        ))
    }
}

impl MediaEngine for MpvEngine {
    fn begin(&mut self, media_url: &str, start_at_secs: f64) -> Result<()> {
        let child = ProcessCommand::new(&self.player_bin)
            .arg("--no-video")
            .arg("--no-terminal")
            .arg("--really-quiet")
            .arg("--keep-open=yes")
            .arg(format!("--start={start_at_secs:.3}"))
            .arg(format!(
                "--input-ipc-server={}",
                self.socket_path.display()
            ))
            .arg("--")
            .arg(media_url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("failed to launch {}", self.player_bin.display()))?;
        self.child = Some(child);

        let stream = Self::connect_with_retries(&self.socket_path)?;
        let reader_stream = stream
            .try_clone()
            .context("failed to clone IPC connection")?;
        self.stream = Some(stream);

        self.send_command(vec![json!("observe_property"), json!(1), json!("duration")])?;
        self.send_command(vec![json!("observe_property"), json!(2), json!("time-pos")])?;
        self.send_command(vec![
            json!("observe_property"),
            json!(3),
            json!("eof-reached"),
        ])?;

        let handle = self.handle;
        let events = self.events.clone();
        let released = Arc::clone(&self.released);
        self.reader = Some(thread::spawn(move || {
            read_engine_events(reader_stream, handle, &events, &released);
        }));
        Ok(())
    }

    fn set_paused(&mut self, paused: bool) -> Result<()> {
        self.send_command(vec![json!("set_property"), json!("pause"), json!(paused)])
    }

    fn seek(&mut self, position_secs: f64) -> Result<()> {
        self.send_command(vec![
            json!("seek"),
            json!(position_secs),
            json!("absolute"),
        ])
    }

    fn set_muted(&mut self, muted: bool) -> Result<()> {
        self.send_command(vec![json!("set_property"), json!("mute"), json!(muted)])
    }

    fn release(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }

        let _ = self.send_command(vec![json!("quit")]);
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }

        if let Some(mut child) = self.child.take() {
            let mut exited = false;
            for _ in 0..10 {
                match child.try_wait() {
                    Ok(Some(_)) => {
                        exited = true;
                        break;
                    }
                    Ok(None) => thread::sleep(Duration::from_millis(50)),
                    Err(_) => break,
                }
            }
            if !exited {
                let _ = child.kill();
                let _ = child.wait();
            }
        }

        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
        let _ = fs::remove_file(&self.socket_path);
    }
}

impl Drop for MpvEngine {
    fn drop(&mut self) {
        self.release();
    }
}

fn read_engine_events(
    stream: UnixStream,
    handle: HandleId,
    events: &mpsc::Sender<EngineEvent>,
    released: &AtomicBool,
) {
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let Ok(line) = line else {
            break;
        };
        if released.load(Ordering::SeqCst) {
            return;
        }
        let Ok(message) = serde_json::from_str::<Value>(&line) else {
            continue;
        };
        for event in translate_ipc_message(&message, handle) {
            if events.send(event).is_err() {
                return;
            }
        }
    }

    // Socket gone without a release: the player died or was closed externally.
    if !released.load(Ordering::SeqCst) {
        let _ = events.send(EngineEvent::Failed {
            handle,
            message: "player exited unexpectedly".to_string(),
        });
    }
}

/// Maps one mpv IPC message to engine events. Unknown messages map to none.
pub(crate) fn translate_ipc_message(message: &Value, handle: HandleId) -> Vec<EngineEvent> {
    let Some(event_name) = message.get("event").and_then(Value::as_str) else {
        return Vec::new();
    };

    match event_name {
        "property-change" => {
            let name = message.get("name").and_then(Value::as_str).unwrap_or("");
            let data = message.get("data");
            match name {
                "duration" => data
                    .and_then(Value::as_f64)
                    .filter(|duration| *duration > 0.0)
                    .map(|duration_secs| EngineEvent::MetadataLoaded {
                        handle,
                        duration_secs,
                    })
                    .into_iter()
                    .collect(),
                "time-pos" => data
                    .and_then(Value::as_f64)
                    .filter(|position| *position >= 0.0)
                    .map(|position_secs| EngineEvent::TimeUpdate {
                        handle,
                        position_secs,
                    })
                    .into_iter()
                    .collect(),
                "eof-reached" => {
                    if data.and_then(Value::as_bool) == Some(true) {
                        vec![EngineEvent::Ended { handle }]
                    } else {
                        Vec::new()
                    }
                }
                _ => Vec::new(),
            }
        }
        "end-file" => {
            let reason = message.get("reason").and_then(Value::as_str).unwrap_or("");
            if reason == "error" {
                let detail = message
                    .get("file_error")
                    .and_then(Value::as_str)
                    .unwrap_or("media failed to load");
                vec![EngineEvent::Failed {
                    handle,
                    message: detail.to_string(),
                }]
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}
