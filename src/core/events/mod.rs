pub mod relay;

pub use relay::{
    progress_percent, EventRelay, LauncherEvent, ProgressCategory, ProgressEvent,
    ProgressThrottle, DEFAULT_PROGRESS_INTERVAL,
};
