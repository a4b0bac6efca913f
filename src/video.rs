use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use serde_json::{json, Value};

#[cfg(unix)]
use rand::{distributions::Alphanumeric, Rng};
#[cfg(unix)]
use std::io::{BufRead, BufReader, Write};
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::playback::{HandleEvent, PlaybackHandle};

const IPC_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const IPC_CONNECT_RETRY: Duration = Duration::from_millis(50);
const EOF_OBSERVER_ID: u64 = 1;
const DURATION_OBSERVER_ID: u64 = 2;

#[derive(Debug, Clone)]
pub struct MpvOptions {
    pub mpv_path: String,
    pub extra_args: Vec<String>,
    pub muted: bool,
}

impl Default for MpvOptions {
    fn default() -> Self {
        Self {
            mpv_path: "mpv".into(),
            extra_args: Vec::new(),
            muted: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum MpvCommand {
    SetPause(bool),
    SeekStart,
    ObserveEof,
    ObserveDuration,
}

/// mpv process held paused on its first frame until the owning cell asks it
/// to play. Readiness and end-of-media arrive over the JSON IPC socket.
pub struct MpvHandle {
    child: Option<Child>,
    ipc_path: String,
    events: Receiver<HandleEvent>,
    reader: Option<thread::JoinHandle<()>>,
    released: Arc<AtomicBool>,
    ready: bool,
}

impl MpvHandle {
    pub fn spawn(url: &str, label: &str, opts: &MpvOptions) -> Result<Self> {
        if url.trim().is_empty() {
            return Err(anyhow!("video URL missing"));
        }
        let ipc_path = unique_ipc_path().context("mpv IPC is not supported on this platform")?;
        #[cfg(unix)]
        cleanup_ipc_path(&ipc_path);

        let args = build_args(url, label, &ipc_path, opts);
        tracing::debug!(?args, "spawning mpv");

        let mut command = Command::new(&opts.mpv_path);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        let child = command
            .spawn()
            .with_context(|| format!("launch {} to play {}", opts.mpv_path, url))?;

        Ok(Self::attach(Some(child), ipc_path))
    }

    /// Starts the IPC reader for a player listening on `ipc_path`.
    fn attach(child: Option<Child>, ipc_path: String) -> Self {
        let (event_tx, event_rx) = unbounded();
        let released = Arc::new(AtomicBool::new(false));
        let reader_path = ipc_path.clone();
        let reader_released = released.clone();
        let reader =
            thread::spawn(move || read_ipc_events(&reader_path, event_tx, reader_released));

        Self {
            child,
            ipc_path,
            events: event_rx,
            reader: Some(reader),
            released,
            ready: false,
        }
    }

    fn send(&self, command: MpvCommand) -> Result<()> {
        if self.released.load(Ordering::SeqCst) {
            return Err(anyhow!("mpv handle already released"));
        }
        send_ipc_command(&self.ipc_path, command)
    }
}

impl PlaybackHandle for MpvHandle {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn play(&mut self) -> Result<()> {
        self.send(MpvCommand::SetPause(false))
    }

    fn pause(&mut self) -> Result<()> {
        self.send(MpvCommand::SetPause(true))
    }

    fn restart(&mut self) -> Result<()> {
        self.send(MpvCommand::SeekStart)?;
        self.send(MpvCommand::SetPause(false))
    }

    fn try_event(&mut self) -> Option<HandleEvent> {
        match self.events.try_recv() {
            Ok(event) => {
                if event == HandleEvent::Ready {
                    self.ready = true;
                }
                Some(event)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    fn release(&mut self) {
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            match child.wait() {
                Ok(status) => tracing::debug!(code = ?status.code(), "mpv stopped"),
                Err(err) => tracing::debug!(%err, "wait for mpv after stop request"),
            }
        }
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
        #[cfg(unix)]
        cleanup_ipc_path(&self.ipc_path);
    }
}

impl Drop for MpvHandle {
    fn drop(&mut self) {
        self.release();
    }
}

fn build_args(url: &str, label: &str, ipc_path: &str, opts: &MpvOptions) -> Vec<String> {
    let mut args = vec![
        "--pause".to_string(),
        "--keep-open=yes".to_string(),
        "--idle=no".to_string(),
        "--really-quiet".to_string(),
        "--terminal=no".to_string(),
        "--input-terminal=no".to_string(),
        "--no-config".to_string(),
        "--ytdl=no".to_string(),
        format!("--input-ipc-server={ipc_path}"),
    ];
    if opts.muted {
        args.push("--mute=yes".to_string());
    }
    if !label.trim().is_empty() {
        args.push(format!("--force-media-title={}", label.trim()));
    }
    args.extend(opts.extra_args.iter().cloned());
    args.push("--".to_string());
    args.push(url.to_string());
    args
}

fn command_payload(command: MpvCommand) -> Value {
    match command {
        MpvCommand::SetPause(paused) => json!(["set_property", "pause", paused]),
        MpvCommand::SeekStart => json!(["seek", 0, "absolute"]),
        MpvCommand::ObserveEof => json!(["observe_property", EOF_OBSERVER_ID, "eof-reached"]),
        MpvCommand::ObserveDuration => {
            json!(["observe_property", DURATION_OBSERVER_ID, "duration"])
        }
    }
}

fn serialize_command(command: MpvCommand) -> Result<String> {
    let payload = json!({
        "command": command_payload(command),
    });
    serde_json::to_string(&payload).context("serialize mpv command")
}

/// Maps one line of mpv IPC output to a handle event.
///
/// mpv answers `observe_property` with the current value straight away, so a
/// known `duration` marks the media as loaded even when `file-loaded` went out
/// before the reader connected.
fn parse_ipc_event(line: &str) -> Option<HandleEvent> {
    let value: Value = serde_json::from_str(line).ok()?;
    match value.get("event")?.as_str()? {
        "file-loaded" => Some(HandleEvent::Ready),
        "property-change" => {
            let data = value.get("data").unwrap_or(&Value::Null);
            match value.get("name").and_then(Value::as_str)? {
                "eof-reached" if data.as_bool() == Some(true) => Some(HandleEvent::Ended),
                "duration" if data.is_number() => Some(HandleEvent::Ready),
                _ => None,
            }
        }
        "end-file" => {
            if value.get("reason").and_then(Value::as_str) != Some("error") {
                return None;
            }
            let message = value
                .get("file_error")
                .and_then(Value::as_str)
                .unwrap_or("media failed to load");
            Some(HandleEvent::Failed(message.to_string()))
        }
        _ => None,
    }
}

#[cfg(unix)]
fn read_ipc_events(path: &str, events: Sender<HandleEvent>, released: Arc<AtomicBool>) {
    let deadline = Instant::now() + IPC_CONNECT_TIMEOUT;
    let mut stream = loop {
        if released.load(Ordering::SeqCst) {
            return;
        }
        match UnixStream::connect(path) {
            Ok(stream) => break stream,
            Err(_) if Instant::now() < deadline => thread::sleep(IPC_CONNECT_RETRY),
            Err(err) => {
                tracing::warn!(%err, path, "mpv IPC socket never appeared");
                let _ = events.send(HandleEvent::Failed(
                    "media player did not start".to_string(),
                ));
                return;
            }
        }
    };

    for command in [MpvCommand::ObserveEof, MpvCommand::ObserveDuration] {
        let subscribe = serialize_command(command).and_then(|line| write_line(&mut stream, &line));
        if let Err(err) = subscribe {
            tracing::warn!(error = %format!("{err:#}"), ?command, "subscribe to mpv property");
        }
    }

    let reader = match stream.try_clone() {
        Ok(clone) => BufReader::new(clone),
        Err(err) => {
            tracing::warn!(%err, "clone mpv IPC stream");
            return;
        }
    };
    let mut loaded = false;
    for line in reader.lines().map_while(std::result::Result::ok) {
        if let Some(event) = parse_ipc_event(&line) {
            if event == HandleEvent::Ready {
                if loaded {
                    continue;
                }
                loaded = true;
            }
            if events.send(event).is_err() {
                return;
            }
        }
    }

    if !loaded && !released.load(Ordering::SeqCst) {
        let _ = events.send(HandleEvent::Failed(
            "media player exited before loading".to_string(),
        ));
    }
}

#[cfg(not(unix))]
fn read_ipc_events(_path: &str, events: Sender<HandleEvent>, _released: Arc<AtomicBool>) {
    let _ = events.send(HandleEvent::Failed(
        "media player controls are not supported on this platform".to_string(),
    ));
}

fn send_ipc_command(path: &str, command: MpvCommand) -> Result<()> {
    let serialized = serialize_command(command)?;
    send_ipc_command_inner(path, &serialized)
}

#[cfg(unix)]
fn send_ipc_command_inner(path: &str, serialized: &str) -> Result<()> {
    let mut stream =
        UnixStream::connect(path).with_context(|| format!("connect to mpv IPC socket {path}"))?;
    write_line(&mut stream, serialized)
}

#[cfg(unix)]
fn write_line(stream: &mut UnixStream, serialized: &str) -> Result<()> {
    stream
        .write_all(serialized.as_bytes())
        .context("write mpv IPC command")?;
    stream
        .write_all(b"\n")
        .context("write mpv IPC command terminator")?;
    Ok(())
}

#[cfg(not(unix))]
fn send_ipc_command_inner(_path: &str, _serialized: &str) -> Result<()> {
    Err(anyhow!(
        "Media player controls are not supported on this platform."
    ))
}

#[cfg(unix)]
fn unique_ipc_path() -> Option<String> {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    let mut path = std::env::temp_dir();
    path.push(format!("reelfeed-mpv-{}-{suffix}.sock", std::process::id()));
    Some(path.to_string_lossy().to_string())
}

#[cfg(not(unix))]
fn unique_ipc_path() -> Option<String> {
    None
}

#[cfg(unix)]
fn cleanup_ipc_path(path: &str) {
    if let Err(err) = std::fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!(%err, path, "failed to remove mpv ipc path");
        }
    }
}
