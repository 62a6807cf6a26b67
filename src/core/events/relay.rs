use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressCategory {
    Assets,
    Natives,
    Libraries,
    Other,
}

impl ProgressCategory {
    /// Maps the child's free-form progress type onto a category.
    pub fn from_raw(kind: &str) -> Self {
        match kind.trim().to_ascii_lowercase().as_str() {
            "assets" | "assets-copy" => ProgressCategory::Assets,
            "natives" => ProgressCategory::Natives,
            "classes" | "libraries" => ProgressCategory::Libraries,
            _ => ProgressCategory::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub category: ProgressCategory,
    pub completed: u64,
    pub total: u64,
    pub percent: f64,
}

impl ProgressEvent {
    pub fn new(category: ProgressCategory, completed: u64, total: u64) -> Self {
        Self {
            category,
            completed,
            total,
            percent: progress_percent(completed, total),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.percent >= 100.0
    }
}

/// `completed / total * 100` clamped to `[0, 100]`; a zero total is 0%.
pub fn progress_percent(completed: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    (completed as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
}

/// Everything the front end receives, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LauncherEvent {
    Status {
        message: String,
    },
    Progress {
        category: ProgressCategory,
        completed: u64,
        total: u64,
        percent: f64,
    },
    Log {
        line: String,
    },
    Close {
        code: i32,
    },
    Error {
        message: String,
    },
}

impl From<ProgressEvent> for LauncherEvent {
    fn from(event: ProgressEvent) -> Self {
        LauncherEvent::Progress {
            category: event.category,
            completed: event.completed,
            total: event.total,
            percent: event.percent,
        }
    }
}

/// At most one progress tick per interval, except completed ticks which
/// always pass.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last_forwarded: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_forwarded: None,
        }
    }

    pub fn admit(&mut self, now: Instant, event: &ProgressEvent) -> bool {
        let within_interval = self
            .last_forwarded
            .is_some_and(|last| now.saturating_duration_since(last) < self.interval);
        if within_interval && !event.is_complete() {
            return false;
        }
        self.last_forwarded = Some(now);
        true
    }
}

/// Sending half of the front-end channel. Cheap to clone; clones share the
/// progress throttle.
#[derive(Debug, Clone)]
pub struct EventRelay {
    tx: mpsc::UnboundedSender<LauncherEvent>,
    throttle: Arc<Mutex<ProgressThrottle>>,
}

impl EventRelay {
    pub fn channel(progress_interval: Duration) -> (Self, mpsc::UnboundedReceiver<LauncherEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                throttle: Arc::new(Mutex::new(ProgressThrottle::new(progress_interval))),
            },
            rx,
        )
    }

    pub fn status(&self, message: impl Into<String>) {
        self.send(LauncherEvent::Status {
            message: message.into(),
        });
    }

    /// Returns whether the tick was forwarded.
    pub fn progress(&self, event: ProgressEvent) -> bool {
        self.progress_at(Instant::now(), event)
    }

    pub(crate) fn progress_at(&self, now: Instant, event: ProgressEvent) -> bool {
        let admitted = self
            .throttle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .admit(now, &event);
        if admitted {
            self.send(event.into());
        }
        admitted
    }

    pub fn log(&self, line: impl Into<String>) {
        self.send(LauncherEvent::Log { line: line.into() });
    }

    pub fn close(&self, code: i32) {
        self.send(LauncherEvent::Close { code });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.send(LauncherEvent::Error {
            message: message.into(),
        });
    }

    fn send(&self, event: LauncherEvent) {
        if self.tx.send(event).is_err() {
            debug!("Event receiver dropped; event discarded");
        }
    }
}
