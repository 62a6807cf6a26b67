// ─── Launch Capability ───
// The thing that actually starts the game. Production uses a sidecar
// program speaking JSON lines on stdout; tests plug in their own.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::error::{LauncherError, LauncherResult};

use super::plan::LaunchConfiguration;

/// Unnormalized notification emitted by a running launch.
#[derive(Debug, Clone, PartialEq)]
pub enum RawLaunchEvent {
    Data(String),
    Progress {
        kind: String,
        task: u64,
        total: u64,
    },
    Close(i32),
    Debug(String),
}

pub type RawEventSender = mpsc::UnboundedSender<RawLaunchEvent>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchHandle {
    pub pid: Option<u32>,
}

#[async_trait]
pub trait LaunchCapability: Send + Sync {
    /// Starts the game with `config`. Returns once the process is started;
    /// everything after that arrives on `events`, ending with a close.
    async fn launch(
        &self,
        config: &LaunchConfiguration,
        events: RawEventSender,
    ) -> LauncherResult<LaunchHandle>;
}

#[derive(Debug, Deserialize)]
struct SidecarMessage {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Default, Deserialize)]
struct SidecarProgress {
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    task: u64,
    #[serde(default)]
    total: u64,
}

/// Maps one stdout line of the sidecar onto a raw event. Lines that are not
/// protocol messages are passed through as data.
pub(crate) fn parse_sidecar_line(line: &str) -> Option<RawLaunchEvent> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Ok(message) = serde_json::from_str::<SidecarMessage>(trimmed) else {
        return Some(RawLaunchEvent::Data(trimmed.to_string()));
    };

    let event = match message.kind.as_str() {
        "progress" => {
            let progress: SidecarProgress =
                serde_json::from_value(message.data).unwrap_or_default();
            RawLaunchEvent::Progress {
                kind: progress.kind,
                task: progress.task,
                total: progress.total,
            }
        }
        "close" => RawLaunchEvent::Close(
            message
                .data
                .as_i64()
                .and_then(|code| i32::try_from(code).ok())
                .unwrap_or(-1),
        ),
        "debug" => RawLaunchEvent::Debug(value_text(&message.data)),
        "error" | "fatal" => RawLaunchEvent::Data(format!("[ERROR] {}", value_text(&message.data))),
        _ => RawLaunchEvent::Data(value_text(&message.data)),
    };
    Some(event)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Runs `<program> <args...> launch <config-json>` and relays its output.
#[derive(Debug, Clone)]
pub struct SidecarLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl SidecarLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl LaunchCapability for SidecarLauncher {
    async fn launch(
        &self,
        config: &LaunchConfiguration,
        events: RawEventSender,
    ) -> LauncherResult<LaunchHandle> {
        let payload = serde_json::to_string(config)?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .arg("launch")
            .arg(&payload)
            .current_dir(&config.root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(false);
        configure_platform_spawn(&mut cmd);

        info!("Starting launch sidecar {:?}", self.program);
        debug!("Sidecar args: {:?}", self.args);

        let mut child = cmd.spawn().map_err(|e| {
            LauncherError::ProcessStart(format!("{}: {e}", self.program.display()))
        })?;
        let pid = child.id();

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        tokio::spawn(async move {
            let stderr_task = stderr.map(|stderr| {
                let events = events.clone();
                tokio::spawn(async move {
                    let mut lines = BufReader::new(stderr).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        if !line.trim().is_empty() {
                            let _ = events.send(RawLaunchEvent::Debug(line));
                        }
                    }
                })
            });

            let mut close_reported = false;
            if let Some(stdout) = stdout {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Some(event) = parse_sidecar_line(&line) {
                        close_reported |= matches!(event, RawLaunchEvent::Close(_));
                        let _ = events.send(event);
                    }
                }
            }
            if let Some(task) = stderr_task {
                let _ = task.await;
            }

            let code = match child.wait().await {
                Ok(status) => status.code().unwrap_or(-1),
                Err(err) => {
                    warn!("Failed to wait for launch sidecar: {err}");
                    -1
                }
            };
            info!("Launch sidecar exited with code {code}");
            if !close_reported {
                let _ = events.send(RawLaunchEvent::Close(code));
            }
        });

        Ok(LaunchHandle { pid })
    }
}

fn configure_platform_spawn(cmd: &mut Command) {
    #[cfg(target_os = "windows")]
    {
        const CREATE_NO_WINDOW: u32 = 0x08000000;
        cmd.creation_flags(CREATE_NO_WINDOW);
    }
    #[cfg(not(target_os = "windows"))]
    {
        let _ = cmd;
    }
}
