use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::StreamExt;
use reqwest::header::LOCATION;
use reqwest::{Client, Url};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::core::http::build_http_client;

use super::runtime::{
    java_exe, platform, required_runtime_major, scan_provisioned, RuntimeDescriptor,
    RuntimeMetadata, RuntimeOrigin, RUNTIME_METADATA_FILE,
};

pub const DEFAULT_DOWNLOAD_BASE: &str = "https://api.adoptium.net/v3/binary/latest";
pub const DEFAULT_MAX_REDIRECTS: u32 = 5;
pub const DEFAULT_MIN_FREE_DISK_BYTES: u64 = 512 * 1024 * 1024;

const LOCK_FILE: &str = ".provisioning.lock";
const LOCK_STALE_SECS: i64 = 60 * 10;
const EMPTY_LOCK_GRACE: Duration = Duration::from_secs(5);
const LOCK_WAIT_TIMEOUT: Duration = Duration::from_secs(60 * 15);
const MAX_SEARCH_DEPTH: usize = 6;

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("io error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid download url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("download failed for {url}: HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("redirect from {url} has no Location header")]
    MissingLocation { url: String },
    #[error("too many redirects (more than {0})")]
    TooManyRedirects(u32),
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("archive entry escapes the destination: {0}")]
    UnsafeEntry(String),
    #[error("unsupported archive format in {0:?}")]
    UnsupportedArchive(PathBuf),
    #[error("insufficient disk space: available={available} required={required}")]
    InsufficientSpace { available: u64, required: u64 },
    #[error("executable not found after extraction")]
    ExecutableNotFound,
    #[error("background task failed: {0}")]
    Task(String),
    #[error("timed out after {waited:?} waiting for provisioning lock {path:?}")]
    LockTimeout { path: PathBuf, waited: Duration },
}

fn io_at(path: &Path) -> impl FnOnce(std::io::Error) -> ProvisionError + '_ {
    move |source| ProvisionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Tunables for [`RuntimeProvisioner`], usually taken from launcher settings.
#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    pub download_base: String,
    pub max_redirects: u32,
    pub min_free_disk_bytes: u64,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            download_base: DEFAULT_DOWNLOAD_BASE.to_string(),
            max_redirects: DEFAULT_MAX_REDIRECTS,
            min_free_disk_bytes: DEFAULT_MIN_FREE_DISK_BYTES,
        }
    }
}

/// Package URL for a runtime major on the given upstream OS/arch tokens.
pub fn download_url(base: &str, major: u32, os: &str, arch: &str) -> String {
    format!(
        "{}/{}/ga/{}/{}/jre/hotspot/normal/eclipse",
        base.trim_end_matches('/'),
        major,
        os,
        arch
    )
}

/// Downloads and unpacks runtimes into the provisioning directory.
#[derive(Debug, Clone)]
pub struct RuntimeProvisioner {
    provisioning_dir: PathBuf,
    client: Client,
    options: ProvisionOptions,
}

impl RuntimeProvisioner {
    pub fn new(
        provisioning_dir: impl Into<PathBuf>,
        options: ProvisionOptions,
    ) -> Result<Self, ProvisionError> {
        Ok(Self {
            provisioning_dir: provisioning_dir.into(),
            client: build_http_client()?,
            options,
        })
    }

    pub fn provisioning_dir(&self) -> &Path {
        &self.provisioning_dir
    }

    #[instrument(skip(self))]
    pub async fn provision(
        &self,
        target_distribution_version: &str,
    ) -> Result<RuntimeDescriptor, ProvisionError> {
        let required_major = required_runtime_major(target_distribution_version);
        tokio::fs::create_dir_all(&self.provisioning_dir)
            .await
            .map_err(io_at(&self.provisioning_dir))?;

        let process_lock = process_lock_for(&self.provisioning_dir);
        let _process_guard = process_lock.lock().await;
        let _file_guard = acquire_lock_file(&self.provisioning_dir.join(LOCK_FILE), LOCK_WAIT_TIMEOUT).await?;

        // Another caller may have finished while we waited for the lock.
        if let Some(existing) = scan_provisioned(&self.provisioning_dir, required_major) {
            info!(
                "Reusing runtime provisioned while waiting: {:?}",
                existing.executable_path
            );
            return Ok(existing);
        }

        ensure_min_disk_space(&self.provisioning_dir, self.options.min_free_disk_bytes)?;

        let os = platform::host_os();
        let arch = platform::host_arch();
        let url = download_url(&self.options.download_base, required_major, os, arch);
        let staging_id = Uuid::new_v4().simple().to_string();
        let archive_path = self.provisioning_dir.join(format!(".download-{staging_id}.part"));
        let staging_dir = self.provisioning_dir.join(format!(".staging-{staging_id}"));

        let download_start = Instant::now();
        info!("Downloading Java {} from {}", required_major, url);
        let sha256_archive = self.download(&url, &archive_path).await?;
        info!(
            "Runtime download finished in {:?}",
            download_start.elapsed()
        );

        let extract_start = Instant::now();
        let extracted = {
            let archive = archive_path.clone();
            let staging = staging_dir.clone();
            let target = self.provisioning_dir.clone();
            run_blocking(move || {
                extract_archive(&archive, &staging)?;
                promote_staging(&staging, &target)
            })
            .await
        };
        if let Err(err) = tokio::fs::remove_file(&archive_path).await {
            warn!("Failed to remove runtime archive {:?}: {}", archive_path, err);
        }
        let promoted = match extracted {
            Ok(promoted) => promoted,
            Err(err) => {
                let _ = tokio::fs::remove_dir_all(&staging_dir).await;
                return Err(err);
            }
        };
        info!(
            "Runtime extraction finished in {:?}",
            extract_start.elapsed()
        );

        // Only what this download produced is searched.
        let (runtime_root, executable) = run_blocking(move || {
            promoted
                .into_iter()
                .find_map(|root| find_runtime_executable(&root).map(|exe| (root, exe)))
                .ok_or(ProvisionError::ExecutableNotFound)
        })
        .await?;

        ensure_executable(&executable)?;
        let metadata = RuntimeMetadata {
            major: required_major,
            os: os.to_string(),
            arch: arch.to_string(),
            source_url: url,
            sha256_archive,
            installed_at: Utc::now().to_rfc3339(),
            launcher_version: env!("CARGO_PKG_VERSION").to_string(),
        };
        // Next to the promoted top directory, where the locator scan reads it.
        write_runtime_metadata(&runtime_root, &metadata).await?;

        info!("Java {} provisioned at {:?}", required_major, executable);
        Ok(RuntimeDescriptor {
            executable_path: executable,
            major_version: required_major,
            origin: RuntimeOrigin::Provisioned,
        })
    }

    /// Downloads `url` to `dest` and returns the payload's SHA-256.
    ///
    /// `dest` never survives a failure.
    async fn download(&self, url: &str, dest: &Path) -> Result<String, ProvisionError> {
        let result = self.download_inner(url, dest).await;
        if result.is_err() && dest.exists() {
            if let Err(err) = tokio::fs::remove_file(dest).await {
                warn!("Failed to remove partial download {:?}: {}", dest, err);
            }
        }
        result
    }

    async fn download_inner(&self, url: &str, dest: &Path) -> Result<String, ProvisionError> {
        let mut current = Url::parse(url).map_err(|e| ProvisionError::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        for _hop in 0..=self.options.max_redirects {
            let response = self.client.get(current.clone()).send().await?;
            match response.status().as_u16() {
                200 => return stream_to_file(response, dest).await,
                301 | 302 => {
                    let location = response
                        .headers()
                        .get(LOCATION)
                        .and_then(|value| value.to_str().ok())
                        .ok_or_else(|| ProvisionError::MissingLocation {
                            url: current.to_string(),
                        })?;
                    let next = current.join(location).map_err(|e| ProvisionError::InvalidUrl {
                        url: location.to_string(),
                        reason: e.to_string(),
                    })?;
                    debug!("Redirect {} -> {}", current, next);
                    current = next;
                }
                status => {
                    return Err(ProvisionError::Status {
                        url: current.to_string(),
                        status,
                    })
                }
            }
        }

        Err(ProvisionError::TooManyRedirects(self.options.max_redirects))
    }
}

async fn stream_to_file(response: reqwest::Response, dest: &Path) -> Result<String, ProvisionError> {
    let mut file = tokio::fs::File::create(dest).await.map_err(io_at(dest))?;
    let mut hasher = Sha256::new();
    let mut stream = response.bytes_stream();
    let mut downloaded = 0_u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        hasher.update(&chunk);
        file.write_all(&chunk).await.map_err(io_at(dest))?;
        downloaded = downloaded.saturating_add(chunk.len() as u64);
    }
    file.flush().await.map_err(io_at(dest))?;
    drop(file);

    debug!("Downloaded {} bytes to {:?}", downloaded, dest);
    Ok(hex::encode(hasher.finalize()))
}

async fn run_blocking<T, F>(job: F) -> Result<T, ProvisionError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ProvisionError> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| ProvisionError::Task(e.to_string()))?
}

/// Unpacks a zip or gzip-compressed tar archive into `dest`, keeping its
/// internal directory structure.
pub(crate) fn extract_archive(archive: &Path, dest: &Path) -> Result<(), ProvisionError> {
    let mut magic = Vec::with_capacity(4);
    std::fs::File::open(archive)
        .map_err(io_at(archive))?
        .take(4)
        .read_to_end(&mut magic)
        .map_err(io_at(archive))?;

    std::fs::create_dir_all(dest).map_err(io_at(dest))?;
    let file = std::fs::File::open(archive).map_err(io_at(archive))?;
    match magic.as_slice() {
        [0x50, 0x4b, 0x03, 0x04] => extract_zip(file, dest),
        [0x1f, 0x8b, ..] => {
            let mut tarball = tar::Archive::new(flate2::read::GzDecoder::new(file));
            tarball.set_preserve_permissions(true);
            tarball.unpack(dest).map_err(io_at(dest))
        }
        _ => Err(ProvisionError::UnsupportedArchive(archive.to_path_buf())),
    }
}

fn extract_zip(file: std::fs::File, dest: &Path) -> Result<(), ProvisionError> {
    let mut archive = zip::ZipArchive::new(file)?;

    for index in 0..archive.len() {
        let mut zipped = archive.by_index(index)?;
        let relative = zipped
            .enclosed_name()
            .ok_or_else(|| ProvisionError::UnsafeEntry(zipped.name().to_string()))?;
        let out_path = dest.join(relative);

        if zipped.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(io_at(&out_path))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(io_at(parent))?;
        }
        let mut out = std::fs::File::create(&out_path).map_err(io_at(&out_path))?;
        std::io::copy(&mut zipped, &mut out).map_err(io_at(&out_path))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = zipped.unix_mode() {
                std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode & 0o777))
                    .map_err(io_at(&out_path))?;
            }
        }
    }

    Ok(())
}

/// Moves every top-level entry of `staging` into `target`, replacing stale
/// leftovers of the same name, then removes `staging`. Returns the promoted
/// paths in lexicographic order.
fn promote_staging(staging: &Path, target: &Path) -> Result<Vec<PathBuf>, ProvisionError> {
    let mut entries = std::fs::read_dir(staging)
        .map_err(io_at(staging))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_at(staging))?;
    entries.sort_by_key(|entry| entry.file_name());

    let mut promoted = Vec::with_capacity(entries.len());
    for entry in entries {
        let destination = target.join(entry.file_name());
        if destination.is_dir() {
            std::fs::remove_dir_all(&destination).map_err(io_at(&destination))?;
        } else if destination.exists() {
            std::fs::remove_file(&destination).map_err(io_at(&destination))?;
        }
        std::fs::rename(entry.path(), &destination).map_err(io_at(&destination))?;
        promoted.push(destination);
    }
    std::fs::remove_dir_all(staging).map_err(io_at(staging))?;
    Ok(promoted)
}

/// Depth-first search for `<dir>/bin/<exe>`, children visited in
/// lexicographic order. Symlinks are not followed, hidden entries are
/// skipped and unreadable subtrees are ignored.
pub(crate) fn find_runtime_executable(root: &Path) -> Option<PathBuf> {
    WalkDir::new(root)
        .follow_links(false)
        .max_depth(MAX_SEARCH_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.'))
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                debug!("Skipping unreadable path during runtime search: {}", err);
                None
            }
        })
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.path().join("bin").join(java_exe()))
        .find(|candidate| candidate.is_file())
}

fn ensure_executable(executable: &Path) -> Result<(), ProvisionError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(executable)
            .map_err(io_at(executable))?
            .permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(executable, perms).map_err(io_at(executable))?;
    }
    #[cfg(not(unix))]
    let _ = executable;
    Ok(())
}

async fn write_runtime_metadata(
    runtime_root: &Path,
    metadata: &RuntimeMetadata,
) -> Result<(), ProvisionError> {
    let metadata_path = runtime_root.join(RUNTIME_METADATA_FILE);
    let payload = serde_json::to_vec_pretty(metadata)
        .map_err(|e| ProvisionError::Task(format!("runtime metadata encoding: {e}")))?;
    tokio::fs::write(&metadata_path, payload)
        .await
        .map_err(io_at(&metadata_path))
}

fn ensure_min_disk_space(path: &Path, minimum_bytes: u64) -> Result<(), ProvisionError> {
    if minimum_bytes == 0 {
        return Ok(());
    }
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let canonical = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    let mut best_len = 0usize;
    let mut available = None;
    for disk in disks.list() {
        let mount = disk.mount_point();
        if canonical.starts_with(mount) {
            let len = mount.as_os_str().len();
            if len >= best_len {
                best_len = len;
                available = Some(disk.available_space());
            }
        }
    }
    if let Some(bytes) = available {
        if bytes < minimum_bytes {
            return Err(ProvisionError::InsufficientSpace {
                available: bytes,
                required: minimum_bytes,
            });
        }
    }
    Ok(())
}

// ── Serialization of provisioning per installation root ─

fn process_lock_for(provisioning_dir: &Path) -> Arc<tokio::sync::Mutex<()>> {
    static LOCKS: OnceLock<StdMutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>> =
        OnceLock::new();
    let key = std::fs::canonicalize(provisioning_dir).unwrap_or_else(|_| provisioning_dir.to_path_buf());
    let mut locks = LOCKS
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    locks.entry(key).or_default().clone()
}

async fn acquire_lock_file(
    lock_path: &Path,
    max_wait: Duration,
) -> Result<LockFileGuard, ProvisionError> {
    let started = Instant::now();
    let mut attempts = 0_u32;
    loop {
        attempts += 1;
        match tokio::fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(lock_path)
            .await
        {
            Ok(mut file) => {
                let payload = serde_json::json!({
                    "pid": std::process::id(),
                    "timestamp": Utc::now().timestamp(),
                });
                file.write_all(payload.to_string().as_bytes())
                    .await
                    .map_err(io_at(lock_path))?;
                return Ok(LockFileGuard {
                    path: lock_path.to_path_buf(),
                });
            }
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                clear_stale_lock(lock_path).await;
                if started.elapsed() >= max_wait {
                    return Err(ProvisionError::LockTimeout {
                        path: lock_path.to_path_buf(),
                        waited: started.elapsed(),
                    });
                }
                if attempts % 20 == 0 {
                    info!("Waiting for provisioning lock at {:?}", lock_path);
                }
                tokio::time::sleep(Duration::from_millis(250)).await;
            }
            Err(source) => {
                return Err(ProvisionError::Io {
                    path: lock_path.to_path_buf(),
                    source,
                })
            }
        }
    }
}

async fn clear_stale_lock(lock_path: &Path) {
    let Ok(content) = tokio::fs::read_to_string(lock_path).await else {
        return;
    };
    if content.trim().is_empty() {
        // Either just created or the owner died before writing its pid.
        let age = tokio::fs::metadata(lock_path)
            .await
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok());
        if age.is_some_and(|age| age > EMPTY_LOCK_GRACE) {
            warn!("Removing abandoned empty provisioning lock {:?}", lock_path);
            let _ = tokio::fs::remove_file(lock_path).await;
        }
        return;
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(&content) else {
        // Unparseable lock: the writer died mid-write.
        let _ = tokio::fs::remove_file(lock_path).await;
        return;
    };
    let pid = value.get("pid").and_then(|v| v.as_u64()).unwrap_or_default();
    let timestamp = value
        .get("timestamp")
        .and_then(|v| v.as_i64())
        .unwrap_or_default();
    let expired = Utc::now().timestamp().saturating_sub(timestamp) > LOCK_STALE_SECS;

    #[cfg(target_os = "linux")]
    let dead = !PathBuf::from(format!("/proc/{pid}")).exists();
    #[cfg(not(target_os = "linux"))]
    let dead = {
        let _ = pid;
        false
    };

    if expired || dead {
        warn!("Removing stale provisioning lock {:?}", lock_path);
        let _ = tokio::fs::remove_file(lock_path).await;
    }
}

struct LockFileGuard {
    path: PathBuf,
}

impl Drop for LockFileGuard {
    fn drop(&mut self) {
        if let Err(source) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove lock {:?}: {}", self.path, source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        for (name, body) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, SimpleFileOptions::default()).unwrap();
            } else {
                writer
                    .start_file(*name, SimpleFileOptions::default().unix_permissions(0o755))
                    .unwrap();
                writer.write_all(body).unwrap();
            }
        }
        writer.finish().unwrap();
    }

    #[test]
    fn url_is_templated_by_major_os_and_arch() {
        assert_eq!(
            download_url(DEFAULT_DOWNLOAD_BASE, 17, "linux", "x64"),
            "https://api.adoptium.net/v3/binary/latest/17/ga/linux/x64/jre/hotspot/normal/eclipse"
        );
        assert_eq!(
            download_url("http://127.0.0.1:9/base/", 21, "windows", "x86"),
            "http://127.0.0.1:9/base/21/ga/windows/x86/jre/hotspot/normal/eclipse"
        );
    }

    #[test]
    fn zip_extraction_preserves_structure() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("rt.zip");
        let exe = format!("jdk-17.0.9+9-jre/bin/{}", java_exe());
        write_zip(
            &archive,
            &[
                ("jdk-17.0.9+9-jre/", b""),
                (exe.as_str(), b"binary"),
                ("jdk-17.0.9+9-jre/lib/modules", b"mods"),
            ],
        );

        let dest = dir.path().join("out");
        extract_archive(&archive, &dest).unwrap();
        assert!(dest.join(&exe).is_file());
        assert!(dest.join("jdk-17.0.9+9-jre/lib/modules").is_file());
    }

    #[test]
    fn tar_gz_extraction_preserves_structure() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("rt.tar.gz");
        {
            let encoder = flate2::write::GzEncoder::new(
                std::fs::File::create(&archive).unwrap(),
                flate2::Compression::default(),
            );
            let mut builder = tar::Builder::new(encoder);
            let body = b"binary";
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(&mut header, "jdk-17-jre/Contents/Home/bin/java", &body[..])
                .unwrap();
            builder.into_inner().unwrap().finish().unwrap();
        }

        let dest = dir.path().join("out");
        extract_archive(&archive, &dest).unwrap();
        assert!(dest.join("jdk-17-jre/Contents/Home/bin/java").is_file());
    }

    #[test]
    fn unknown_archive_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("rt.bin");
        std::fs::write(&archive, b"<html>not an archive</html>").unwrap();
        let err = extract_archive(&archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, ProvisionError::UnsupportedArchive(_)));
    }

    #[test]
    fn search_is_depth_first_and_lexicographic() {
        let dir = tempfile::tempdir().unwrap();
        let make = |rel: &str| {
            let bin = dir.path().join(rel).join("bin");
            std::fs::create_dir_all(&bin).unwrap();
            std::fs::write(bin.join(java_exe()), b"x").unwrap();
        };
        make("b/nested/jre");
        make("a/deep/er/jre");
        make("c");
        make(".staging-x/jre");

        let found = find_runtime_executable(dir.path()).unwrap();
        assert_eq!(
            found,
            dir.path().join("a/deep/er/jre/bin").join(java_exe())
        );
    }

    #[test]
    fn search_without_match_is_none() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("jdk/lib")).unwrap();
        assert!(find_runtime_executable(dir.path()).is_none());
    }

    #[test]
    fn promote_replaces_stale_entries() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("java");
        std::fs::create_dir_all(target.join("jdk-17/bin")).unwrap();
        std::fs::write(target.join("jdk-17/stale"), b"old").unwrap();
        let staging = target.join(".staging-1");
        std::fs::create_dir_all(staging.join("jdk-17/bin")).unwrap();
        std::fs::write(staging.join("jdk-17/bin/fresh"), b"new").unwrap();

        let promoted = promote_staging(&staging, &target).unwrap();
        assert_eq!(promoted, vec![target.join("jdk-17")]);
        assert!(target.join("jdk-17/bin/fresh").is_file());
        assert!(!target.join("jdk-17/stale").exists());
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn lock_file_is_released_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join(LOCK_FILE);
        {
            let _guard = acquire_lock_file(&lock, Duration::from_secs(5)).await.unwrap();
            assert!(lock.exists());
        }
        assert!(!lock.exists());
    }

    #[tokio::test]
    async fn expired_lock_is_cleared() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join(LOCK_FILE);
        let payload = serde_json::json!({ "pid": std::process::id(), "timestamp": 0 });
        std::fs::write(&lock, payload.to_string()).unwrap();

        clear_stale_lock(&lock).await;
        assert!(!lock.exists());
    }

    #[tokio::test]
    async fn abandoned_empty_lock_is_taken_over() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join(LOCK_FILE);
        std::fs::File::create(&lock)
            .unwrap()
            .set_modified(std::time::SystemTime::now() - Duration::from_secs(60))
            .unwrap();

        let guard = tokio::time::timeout(
            Duration::from_secs(3),
            acquire_lock_file(&lock, Duration::from_secs(10)),
        )
        .await
        .expect("empty lock was never cleared")
        .unwrap();
        let content = std::fs::read_to_string(&lock).unwrap();
        assert!(content.contains(&std::process::id().to_string()));
        drop(guard);
    }

    #[tokio::test]
    async fn fresh_empty_lock_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join(LOCK_FILE);
        std::fs::File::create(&lock).unwrap();

        clear_stale_lock(&lock).await;
        assert!(lock.exists());
    }

    #[tokio::test]
    async fn held_lock_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join(LOCK_FILE);
        let payload = serde_json::json!({
            "pid": std::process::id(),
            "timestamp": Utc::now().timestamp(),
        });
        std::fs::write(&lock, payload.to_string()).unwrap();

        let err = acquire_lock_file(&lock, Duration::from_millis(500))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ProvisionError::LockTimeout { .. }));
        assert!(lock.exists());
    }
}
