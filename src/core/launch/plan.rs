// ─── Launch Planner ───
// Turns a launch request plus a located runtime into the immutable
// configuration the game process is started with. Pure: no I/O.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::auth::{Authorization, LaunchIdentity};
use crate::core::error::{LauncherError, LauncherResult};
use crate::core::java::RuntimeDescriptor;

/// Modification layer applied on top of the base distribution.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    #[default]
    Vanilla,
    Snapshot,
    Fabric,
    Forge,
    NeoForge,
    Quilt,
}

impl Variant {
    /// Value of the child's release-type field. Loader variants are passed
    /// through by name even where the child treats them as a release.
    pub fn release_type(self) -> &'static str {
        match self {
            Variant::Vanilla => "release",
            Variant::Snapshot => "snapshot",
            Variant::Fabric => "fabric",
            Variant::Forge => "forge",
            Variant::NeoForge => "neoforge",
            Variant::Quilt => "quilt",
        }
    }
}

impl std::fmt::Display for Variant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Variant::Vanilla => write!(f, "vanilla"),
            other => write!(f, "{}", other.release_type()),
        }
    }
}

impl std::str::FromStr for Variant {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "vanilla" | "release" => Ok(Variant::Vanilla),
            "snapshot" => Ok(Variant::Snapshot),
            "fabric" => Ok(Variant::Fabric),
            "forge" => Ok(Variant::Forge),
            "neoforge" => Ok(Variant::NeoForge),
            "quilt" => Ok(Variant::Quilt),
            other => Err(format!("unknown variant: {other}")),
        }
    }
}

/// JVM heap bounds in the child's notation (`4G`, `512M`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBounds {
    pub max: String,
    pub min: String,
}

impl Default for MemoryBounds {
    fn default() -> Self {
        Self {
            max: "4G".into(),
            min: "2G".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSize {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Process-level switches passed through to the launch capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchOverrides {
    pub detached: bool,
    pub max_sockets: u32,
}

impl Default for LaunchOverrides {
    fn default() -> Self {
        Self {
            detached: false,
            max_sockets: 64,
        }
    }
}

/// What the caller asks for on one launch attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LaunchRequest {
    pub distribution_version: String,
    #[serde(default)]
    pub variant: Variant,
    #[serde(default)]
    pub identity: LaunchIdentity,
    pub install_root: PathBuf,
    #[serde(default)]
    pub memory: Option<MemoryBounds>,
    #[serde(default)]
    pub window: Option<WindowSize>,
}

/// Settings-derived values used when the request leaves them open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchDefaults {
    pub memory: MemoryBounds,
    pub window: WindowSize,
    pub overrides: LaunchOverrides,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionSelection {
    pub number: String,
    #[serde(rename = "type")]
    pub release_type: String,
}

/// Fully resolved launch options, serialized as the sidecar expects them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchConfiguration {
    pub root: PathBuf,
    pub version: VersionSelection,
    pub authorization: Authorization,
    pub memory: MemoryBounds,
    pub window: WindowSize,
    pub java_path: PathBuf,
    pub overrides: LaunchOverrides,
}

impl LaunchConfiguration {
    /// Checks that need the filesystem; run right before spawning.
    pub fn validate_for_spawn(&self) -> LauncherResult<()> {
        if !self.java_path.is_file() {
            return Err(LauncherError::Configuration(format!(
                "runtime executable does not exist: {}",
                self.java_path.display()
            )));
        }
        Ok(())
    }
}

pub fn plan(
    request: &LaunchRequest,
    runtime: &RuntimeDescriptor,
    defaults: &LaunchDefaults,
) -> LauncherResult<LaunchConfiguration> {
    let version = request.distribution_version.trim();
    if version.is_empty() {
        return Err(LauncherError::Configuration(
            "distribution version is empty".into(),
        ));
    }
    if runtime.executable_path.as_os_str().is_empty() {
        return Err(LauncherError::Configuration(
            "no runtime executable path".into(),
        ));
    }
    if request.install_root.as_os_str().is_empty() {
        return Err(LauncherError::Configuration(
            "installation root is empty".into(),
        ));
    }

    Ok(LaunchConfiguration {
        root: request.install_root.clone(),
        version: VersionSelection {
            number: version.to_string(),
            release_type: request.variant.release_type().to_string(),
        },
        authorization: request.identity.resolve(),
        memory: request
            .memory
            .clone()
            .unwrap_or_else(|| defaults.memory.clone()),
        window: request.window.unwrap_or(defaults.window),
        java_path: runtime.executable_path.clone(),
        overrides: defaults.overrides.clone(),
    })
}
