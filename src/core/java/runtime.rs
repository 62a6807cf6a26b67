use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

pub(crate) const RUNTIME_METADATA_FILE: &str = "runtime.json";

/// Lowest runtime major any supported distribution may run on.
pub const GLOBAL_RUNTIME_FLOOR: u32 = 17;

/// Distribution version (major, minor) at or above which a runtime floor
/// applies, newest first. Every row currently resolves to the same floor;
/// the table keeps the per-version shape so a real split only edits data.
const RUNTIME_FLOORS: &[((u32, u32), u32)] = &[((1, 18), 17), ((1, 17), 17), ((0, 0), 17)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeOrigin {
    System,
    Provisioned,
}

/// A runtime that satisfied the caller's version floor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeDescriptor {
    pub executable_path: PathBuf,
    pub major_version: u32,
    pub origin: RuntimeOrigin,
}

/// Reasons a system runtime was not usable. Never fatal.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("runtime executable not on PATH")]
    NotOnPath,
    #[error("failed to run {command}: {source}")]
    Spawn {
        command: String,
        source: std::io::Error,
    },
    #[error("{command} exited with {status}")]
    ExitStatus { command: String, status: String },
    #[error("unrecognised version output: {0:?}")]
    MalformedOutput(String),
}

/// Written next to a provisioned runtime's `bin/` directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeMetadata {
    pub major: u32,
    pub os: String,
    pub arch: String,
    pub source_url: String,
    pub sha256_archive: String,
    pub installed_at: String,
    pub launcher_version: String,
}

/// Required runtime major for a distribution version.
///
/// Empty or unparseable versions resolve to the highest known floor so a
/// runtime is never under-provisioned.
pub fn required_runtime_major(distribution_version: &str) -> u32 {
    let highest = RUNTIME_FLOORS
        .iter()
        .map(|(_, floor)| *floor)
        .max()
        .unwrap_or(GLOBAL_RUNTIME_FLOOR);

    let Some(parsed) = parse_distribution_version(distribution_version) else {
        return highest;
    };

    RUNTIME_FLOORS
        .iter()
        .find(|(min_version, _)| parsed >= *min_version)
        .map(|(_, floor)| *floor)
        .unwrap_or(highest)
        .max(GLOBAL_RUNTIME_FLOOR)
}

fn parse_distribution_version(version: &str) -> Option<(u32, u32)> {
    let mut parts = version.trim().split('.');
    let major = parts.next()?.parse::<u32>().ok()?;
    let minor = match parts.next() {
        Some(minor) => minor
            .split(|c: char| !c.is_ascii_digit())
            .next()?
            .parse::<u32>()
            .ok()?,
        None => 0,
    };
    Some((major, minor))
}

pub fn java_exe() -> &'static str {
    if cfg!(windows) {
        "java.exe"
    } else {
        "java"
    }
}

/// Major version from `-version` output: first `version "<N>` match, with the
/// legacy `1.N` scheme mapped to `N`.
pub fn parse_major_from_version_output(output: &str) -> Option<u32> {
    static VERSION_RE: OnceLock<Regex> = OnceLock::new();
    let re = VERSION_RE.get_or_init(|| {
        Regex::new(r#"version "(\d+)(?:\.(\d+))?"#).expect("version regex is valid")
    });

    let captures = re.captures(output)?;
    let first: u32 = captures.get(1)?.as_str().parse().ok()?;
    if first == 1 {
        if let Some(second) = captures.get(2).and_then(|m| m.as_str().parse().ok()) {
            return Some(second);
        }
    }
    Some(first)
}

pub mod platform {
    /// Upstream OS token; unrecognised hosts fall back to the first family.
    pub fn os_token(os: &str) -> &'static str {
        match os {
            "windows" => "windows",
            "macos" => "mac",
            "linux" => "linux",
            _ => "windows",
        }
    }

    /// Upstream architecture token; anything but 64-bit x86 uses the 32-bit build.
    pub fn arch_token(arch: &str) -> &'static str {
        match arch {
            "x86_64" => "x64",
            _ => "x86",
        }
    }

    pub fn host_os() -> &'static str {
        os_token(std::env::consts::OS)
    }

    pub fn host_arch() -> &'static str {
        arch_token(std::env::consts::ARCH)
    }
}

/// Host runtime discovery, split out so tests can substitute it.
#[async_trait]
pub trait SystemRuntimeProbe: Send + Sync {
    /// Resolve the runtime executable through the host's command lookup.
    async fn resolve(&self) -> Result<PathBuf, DiscoveryError>;

    /// Run the executable's version query and return its major version.
    async fn query_major(&self, executable: &Path) -> Result<u32, DiscoveryError>;
}

/// Uses `where` on Windows and `which` elsewhere, then `java -version`.
#[derive(Debug, Default, Clone)]
pub struct HostRuntimeProbe;

#[async_trait]
impl SystemRuntimeProbe for HostRuntimeProbe {
    async fn resolve(&self) -> Result<PathBuf, DiscoveryError> {
        let lookup = if cfg!(windows) { "where" } else { "which" };
        let output = tokio::process::Command::new(lookup)
            .arg(java_exe())
            .output()
            .await
            .map_err(|source| DiscoveryError::Spawn {
                command: lookup.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(DiscoveryError::NotOnPath);
        }

        String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(PathBuf::from)
            .filter(|path| path.exists())
            .ok_or(DiscoveryError::NotOnPath)
    }

    async fn query_major(&self, executable: &Path) -> Result<u32, DiscoveryError> {
        let command = format!("{} -version", executable.display());
        let output = tokio::process::Command::new(executable)
            .arg("-version")
            .output()
            .await
            .map_err(|source| DiscoveryError::Spawn {
                command: command.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(DiscoveryError::ExitStatus {
                command,
                status: output.status.to_string(),
            });
        }

        let combined = format!(
            "{}\n{}",
            String::from_utf8_lossy(&output.stderr),
            String::from_utf8_lossy(&output.stdout)
        );
        parse_major_from_version_output(&combined).ok_or_else(|| {
            DiscoveryError::MalformedOutput(combined.lines().next().unwrap_or("").to_string())
        })
    }
}

/// Finds a usable runtime: system first, then the provisioning directory.
#[derive(Clone)]
pub struct RuntimeLocator {
    provisioning_dir: PathBuf,
    probe: Arc<dyn SystemRuntimeProbe>,
}

impl RuntimeLocator {
    pub fn new(provisioning_dir: impl Into<PathBuf>, probe: Arc<dyn SystemRuntimeProbe>) -> Self {
        Self {
            provisioning_dir: provisioning_dir.into(),
            probe,
        }
    }

    pub fn with_host_probe(provisioning_dir: impl Into<PathBuf>) -> Self {
        Self::new(provisioning_dir, Arc::new(HostRuntimeProbe))
    }

    pub fn provisioning_dir(&self) -> &Path {
        &self.provisioning_dir
    }

    #[instrument(skip(self))]
    pub async fn locate(&self, min_version: u32) -> Option<RuntimeDescriptor> {
        match self.system_runtime(min_version).await {
            Ok(Some(found)) => {
                info!(
                    "Using system Java {} at {:?}",
                    found.major_version, found.executable_path
                );
                return Some(found);
            }
            Ok(None) => {}
            Err(err) => debug!("No usable system Java: {}", err),
        }

        let dir = self.provisioning_dir.clone();
        let scanned =
            tokio::task::spawn_blocking(move || scan_provisioned(&dir, min_version)).await;
        match scanned {
            Ok(Some(found)) => {
                info!("Using provisioned Java at {:?}", found.executable_path);
                Some(found)
            }
            Ok(None) => None,
            Err(err) => {
                debug!("Provisioned runtime scan aborted: {}", err);
                None
            }
        }
    }

    async fn system_runtime(
        &self,
        min_version: u32,
    ) -> Result<Option<RuntimeDescriptor>, DiscoveryError> {
        let executable = self.probe.resolve().await?;
        let major = self.probe.query_major(&executable).await?;
        if major < min_version {
            info!(
                "System Java at {:?} is too old (v{}), need v{}+",
                executable, major, min_version
            );
            return Ok(None);
        }
        Ok(Some(RuntimeDescriptor {
            executable_path: executable,
            major_version: major,
            origin: RuntimeOrigin::System,
        }))
    }
}

/// Places a runtime's executable lives relative to its top directory: the
/// plain layout and the macOS bundle layout.
const EXECUTABLE_LAYOUTS: &[&[&str]] = &[&["bin"], &["Contents", "Home", "bin"]];

fn runtime_executable_in(root: &Path) -> Option<PathBuf> {
    EXECUTABLE_LAYOUTS.iter().find_map(|layout| {
        let candidate = layout
            .iter()
            .fold(root.to_path_buf(), |path, part| path.join(part))
            .join(java_exe());
        candidate.is_file().then_some(candidate)
    })
}

/// One-level scan of the provisioning directory for `<entry>/bin/<exe>` or
/// `<entry>/Contents/Home/bin/<exe>`.
///
/// Entries are visited in lexicographic order; hidden entries (staging
/// directories, partial downloads, locks) are ignored. The executable is not
/// run; only recorded metadata can disqualify an entry.
pub(crate) fn scan_provisioned(provisioning_dir: &Path, min_version: u32) -> Option<RuntimeDescriptor> {
    let entries = std::fs::read_dir(provisioning_dir).ok()?;
    let mut roots: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
        .map(|entry| entry.path())
        .collect();
    roots.sort();

    roots.into_iter().find_map(|root| {
        let executable = runtime_executable_in(&root)?;
        let major_version = match read_runtime_metadata(&root) {
            Some(metadata) if metadata.major < min_version => {
                debug!(
                    "Skipping provisioned runtime {:?}: recorded major {} < {}",
                    root, metadata.major, min_version
                );
                return None;
            }
            Some(metadata) => metadata.major,
            None => min_version,
        };
        let executable_path = std::fs::canonicalize(&executable).unwrap_or(executable);
        Some(RuntimeDescriptor {
            executable_path,
            major_version,
            origin: RuntimeOrigin::Provisioned,
        })
    })
}

pub(crate) fn read_runtime_metadata(runtime_root: &Path) -> Option<RuntimeMetadata> {
    let bytes = std::fs::read(runtime_root.join(RUNTIME_METADATA_FILE)).ok()?;
    serde_json::from_slice(&bytes).ok()
}
