use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "MangoLauncher";
const ROOT_ENV_VAR: &str = "MANGO_LAUNCHER_ROOT";
const RUNTIME_PROVIDER: &str = "java";
const SETTINGS_FILE: &str = "launcher_settings.json";

/// Filesystem layout below one installation root `R`.
///
/// - `R/runtime/java/<runtime>/bin/<exe>`: provisioned runtimes
/// - `R/versions/<version>/`: installed distributions
/// - `R/launcher_settings.json`: persisted settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root from `MANGO_LAUNCHER_ROOT`, else the platform data directory.
    pub fn from_environment() -> Self {
        if let Some(root) = std::env::var_os(ROOT_ENV_VAR).filter(|v| !v.is_empty()) {
            return Self::new(PathBuf::from(root));
        }
        let base = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));
        Self::new(base.join(APP_DIR_NAME))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The provisioning directory owned by the runtime manager.
    pub fn provisioning_dir(&self) -> PathBuf {
        self.root.join("runtime").join(RUNTIME_PROVIDER)
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.root.join("versions")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE)
    }

    /// A distribution counts as installed once its version directory exists.
    pub fn is_installed(&self, distribution_version: &str) -> bool {
        !distribution_version.trim().is_empty()
            && self.versions_dir().join(distribution_version).is_dir()
    }

    pub fn installed_versions(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(self.versions_dir()) else {
            return Vec::new();
        };
        let mut versions: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_dir())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        versions.sort();
        versions
    }

    /// Whether `root` names this installation. Paths that exist are compared
    /// canonically, so `R/./` and symlinks to `R` still match.
    pub fn is_root(&self, root: &Path) -> bool {
        match (std::fs::canonicalize(&self.root), std::fs::canonicalize(root)) {
            (Ok(ours), Ok(theirs)) => ours == theirs,
            _ => self.root == root,
        }
    }
}
