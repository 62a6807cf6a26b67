// ─── Process Supervisor ───
// Owns the single active launch session: starts it through the launch
// capability, forwards its raw events to the relay and tracks state.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::events::{EventRelay, ProgressCategory, ProgressEvent};

use super::capability::{LaunchCapability, RawLaunchEvent};
use super::plan::LaunchConfiguration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum SupervisorState {
    Idle,
    Starting,
    Running,
    Closed(i32),
    Failed(String),
}

/// Bookkeeping for the launch whose events are currently relayed.
#[derive(Debug)]
struct LaunchSession {
    id: Uuid,
    pid: Option<u32>,
    started_at: DateTime<Utc>,
    pump: JoinHandle<()>,
}

#[derive(Debug)]
struct SupervisorInner {
    state: SupervisorState,
    active: Option<LaunchSession>,
}

#[derive(Clone)]
pub struct ProcessSupervisor {
    capability: Arc<dyn LaunchCapability>,
    relay: EventRelay,
    inner: Arc<Mutex<SupervisorInner>>,
    state_tx: broadcast::Sender<SupervisorState>,
}

impl ProcessSupervisor {
    pub fn new(capability: Arc<dyn LaunchCapability>, relay: EventRelay) -> Self {
        let (state_tx, _) = broadcast::channel(32);
        Self {
            capability,
            relay,
            inner: Arc::new(Mutex::new(SupervisorInner {
                state: SupervisorState::Idle,
                active: None,
            })),
            state_tx,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.lock().state.clone()
    }

    /// Every state transition from now on.
    pub fn subscribe_state(&self) -> broadcast::Receiver<SupervisorState> {
        self.state_tx.subscribe()
    }

    pub fn active_session_id(&self) -> Option<Uuid> {
        self.lock().active.as_ref().map(|session| session.id)
    }

    pub fn active_pid(&self) -> Option<u32> {
        self.lock().active.as_ref().and_then(|session| session.pid)
    }

    /// Starts `config` as the new active session. A previous session stops
    /// being relayed before the new one starts. An invalid configuration is
    /// rejected without touching the current session.
    pub async fn launch(&self, config: LaunchConfiguration) -> LauncherResult<Uuid> {
        config.validate_for_spawn()?;
        self.retire_active();

        let session_id = Uuid::new_v4();
        self.set_state(SupervisorState::Starting);

        let (tx, rx) = mpsc::unbounded_channel();
        // Events are held back until the start result is known, so a session
        // is always reported running before it can close.
        let (started_tx, started_rx) = oneshot::channel();
        let pump = tokio::spawn(pump_events(self.clone(), session_id, started_rx, rx));
        {
            let mut inner = self.lock();
            inner.active = Some(LaunchSession {
                id: session_id,
                pid: None,
                started_at: Utc::now(),
                pump,
            });
        }

        match self.capability.launch(&config, tx).await {
            Ok(handle) => {
                let still_active = {
                    let mut inner = self.lock();
                    match inner.active.as_mut() {
                        Some(session) if session.id == session_id => {
                            session.pid = handle.pid;
                            true
                        }
                        _ => false,
                    }
                };
                if still_active {
                    self.set_state(SupervisorState::Running);
                }
                let _ = started_tx.send(());
                info!(
                    "Launch session {} started (pid {:?})",
                    session_id, handle.pid
                );
                Ok(session_id)
            }
            Err(err) => {
                error!("Failed to start launch session {}: {}", session_id, err);
                {
                    let mut inner = self.lock();
                    if inner
                        .active
                        .as_ref()
                        .is_some_and(|session| session.id == session_id)
                    {
                        if let Some(session) = inner.active.take() {
                            session.pump.abort();
                        }
                    }
                }
                let message = err.to_string();
                self.set_state(SupervisorState::Failed(message.clone()));
                self.relay.error(message.clone());
                Err(match err {
                    LauncherError::ProcessStart(_) => err,
                    other => LauncherError::ProcessStart(other.to_string()),
                })
            }
        }
    }

    /// Stops relaying the active session, if any. The child itself is not
    /// signalled.
    pub fn retire_active(&self) {
        let retired = self.lock().active.take();
        if let Some(session) = retired {
            debug!("Retiring launch session {}", session.id);
            session.pump.abort();
        }
    }

    fn is_active(&self, session_id: Uuid) -> bool {
        self.lock()
            .active
            .as_ref()
            .is_some_and(|session| session.id == session_id)
    }

    fn finish_session(&self, session_id: Uuid, code: i32) -> bool {
        let finished = {
            let mut inner = self.lock();
            if inner
                .active
                .as_ref()
                .is_some_and(|session| session.id == session_id)
            {
                inner.active.take()
            } else {
                None
            }
        };
        let Some(session) = finished else {
            return false;
        };
        info!(
            "Launch session {} (pid {:?}) ended after {}s",
            session.id,
            session.pid,
            (Utc::now() - session.started_at).num_seconds()
        );
        self.set_state(SupervisorState::Closed(code));
        true
    }

    fn set_state(&self, state: SupervisorState) {
        self.lock().state = state.clone();
        debug!("Supervisor state -> {:?}", state);
        let _ = self.state_tx.send(state);
    }

    fn lock(&self) -> MutexGuard<'_, SupervisorInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn pump_events(
    supervisor: ProcessSupervisor,
    session_id: Uuid,
    started: oneshot::Receiver<()>,
    mut rx: mpsc::UnboundedReceiver<RawLaunchEvent>,
) {
    if started.await.is_err() {
        return;
    }
    while let Some(event) = rx.recv().await {
        if !supervisor.is_active(session_id) {
            debug!("Dropping event from retired session {}", session_id);
            break;
        }
        match event {
            RawLaunchEvent::Data(line) => supervisor.relay.log(line),
            RawLaunchEvent::Debug(line) => {
                debug!("[launch:{}] {}", session_id, line);
                supervisor.relay.log(line);
            }
            RawLaunchEvent::Progress { kind, task, total } => {
                supervisor.relay.progress(ProgressEvent::new(
                    ProgressCategory::from_raw(&kind),
                    task,
                    total,
                ));
            }
            RawLaunchEvent::Close(code) => {
                if supervisor.finish_session(session_id, code) {
                    supervisor.relay.close(code);
                    if code != 0 {
                        warn!("Launch session {} exited with code {}", session_id, code);
                        supervisor
                            .relay
                            .error(format!("Game process exited with code {code}"));
                    } else {
                        info!("Launch session {} exited cleanly", session_id);
                    }
                }
                break;
            }
        }
    }
}
