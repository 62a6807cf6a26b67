use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::error::{LauncherError, LauncherResult};
use crate::core::java::provision::{DEFAULT_DOWNLOAD_BASE, DEFAULT_MAX_REDIRECTS};
use crate::core::java::{InstallLayout, ProvisionOptions};
use crate::core::launch::{LaunchDefaults, LaunchOverrides, MemoryBounds, WindowSize};

const DEFAULT_LAUNCH_PROGRAM: &str = "node";
/// Relative to the install root, which is the sidecar's working directory.
const DEFAULT_SIDECAR_SCRIPT: &str = "sidecar/launcher.js";

/// Persisted launcher configuration. Every field has a default so older or
/// partial files still load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LauncherSettings {
    pub memory_max: String,
    pub memory_min: String,
    pub window_width: u32,
    pub window_height: u32,
    pub progress_interval_ms: u64,
    pub runtime_download_base: String,
    pub max_redirects: u32,
    pub min_free_disk_mb: u64,
    pub launch_program: String,
    pub launch_args: Vec<String>,
}

impl Default for LauncherSettings {
    fn default() -> Self {
        let memory = MemoryBounds::default();
        let window = WindowSize::default();
        Self {
            memory_max: memory.max,
            memory_min: memory.min,
            window_width: window.width,
            window_height: window.height,
            progress_interval_ms: 500,
            runtime_download_base: DEFAULT_DOWNLOAD_BASE.to_string(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            min_free_disk_mb: 512,
            launch_program: DEFAULT_LAUNCH_PROGRAM.to_string(),
            launch_args: vec![DEFAULT_SIDECAR_SCRIPT.to_string()],
        }
    }
}

impl LauncherSettings {
    /// Settings stored under `layout`, or defaults when the file is missing
    /// or unreadable.
    pub fn load(layout: &InstallLayout) -> Self {
        load_settings_from_disk(&layout.settings_path()).unwrap_or_default()
    }

    pub fn save(&self, layout: &InstallLayout) -> LauncherResult<()> {
        let path = layout.settings_path();
        std::fs::create_dir_all(layout.root()).map_err(|source| LauncherError::Io {
            path: layout.root().to_path_buf(),
            source,
        })?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&path, json).map_err(|source| LauncherError::Io { path, source })
    }

    pub fn launch_defaults(&self) -> LaunchDefaults {
        LaunchDefaults {
            memory: MemoryBounds {
                max: self.memory_max.clone(),
                min: self.memory_min.clone(),
            },
            window: WindowSize {
                width: self.window_width,
                height: self.window_height,
            },
            overrides: LaunchOverrides::default(),
        }
    }

    pub fn provision_options(&self) -> ProvisionOptions {
        ProvisionOptions {
            download_base: self.runtime_download_base.clone(),
            max_redirects: self.max_redirects,
            min_free_disk_bytes: self.min_free_disk_mb.saturating_mul(1024 * 1024),
        }
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}

fn load_settings_from_disk(path: &Path) -> Option<LauncherSettings> {
    let raw = std::fs::read_to_string(path).ok()?;
    match serde_json::from_str(&raw) {
        Ok(settings) => {
            debug!("Loaded launcher settings from {:?}", path);
            Some(settings)
        }
        Err(err) => {
            warn!("Ignoring malformed settings at {:?}: {}", path, err);
            None
        }
    }
}
