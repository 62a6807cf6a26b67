#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures_util::stream::{self, StreamExt};
use mango_launcher::core::java::{java_exe, DiscoveryError, SystemRuntimeProbe};
use tokio::net::TcpListener;
use zip::write::SimpleFileOptions;

pub const RUNTIME_DIR_NAME: &str = "jdk-17.0.10+7-jre";

/// Zip laid out like an upstream runtime package.
pub fn runtime_zip() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    writer
        .add_directory(format!("{RUNTIME_DIR_NAME}/bin/"), options)
        .unwrap();
    writer
        .start_file(format!("{RUNTIME_DIR_NAME}/bin/{}", java_exe()), options)
        .unwrap();
    writer.write_all(b"#!/bin/sh\necho fake java\n").unwrap();
    writer
        .start_file(format!("{RUNTIME_DIR_NAME}/release"), options)
        .unwrap();
    writer.write_all(b"JAVA_VERSION=\"17.0.10\"\n").unwrap();
    writer.finish().unwrap().into_inner()
}

/// Tar.gz laid out like a macOS runtime bundle.
pub fn runtime_mac_tar_gz() -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let home = format!("{RUNTIME_DIR_NAME}/Contents/Home");
    for (name, body) in [
        (format!("{home}/bin/{}", java_exe()), &b"#!/bin/sh\necho fake java\n"[..]),
        (format!("{home}/release"), &b"JAVA_VERSION=\"17.0.10\"\n"[..]),
        (format!("{RUNTIME_DIR_NAME}/Contents/Info.plist"), &b"<plist/>"[..]),
    ] {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o755);
        header.set_cksum();
        builder.append_data(&mut header, name, body).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Local stand-in for the runtime download endpoint.
///
/// The first path segment picks the behaviour:
/// - `/chain/...`   three host-relative redirects, then the zip
/// - `/direct/...`  the zip
/// - `/missing/...` 404
/// - `/loop/...`    redirects to itself forever
/// - `/garbage/...` 200 with a body that is not an archive
/// - `/truncated/...` 200, then the connection drops after the first chunk
/// - `/brokenchain/...` one redirect to a path that 404s
/// - `/mactar/...` a tar.gz with the `Contents/Home/bin` layout
pub struct PackageServer {
    pub base: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl PackageServer {
    pub async fn start() -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let router = Router::new()
            .fallback(serve_package)
            .with_state(requests.clone());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });
        Self {
            base: format!("http://{addr}"),
            requests,
        }
    }

    pub fn url(&self, mode: &str) -> String {
        format!("{}/{mode}", self.base)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

async fn serve_package(State(requests): State<Arc<Mutex<Vec<String>>>>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    requests.lock().unwrap().push(path.clone());

    let mut segments = path.trim_start_matches('/').splitn(2, '/');
    let mode = segments.next().unwrap_or_default();
    let rest = segments.next().unwrap_or_default();

    match mode {
        "direct" | "payload" => runtime_zip().into_response(),
        "chain" => redirect(format!("/hop1/{rest}")),
        "hop1" => redirect(format!("/hop2/{rest}")),
        "hop2" => redirect(format!("/payload/{rest}")),
        "loop" => redirect(path.clone()),
        "garbage" => "definitely not an archive".into_response(),
        "truncated" => truncated_response(),
        "brokenchain" => redirect(format!("/gone/{rest}")),
        "mactar" => runtime_mac_tar_gz().into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Sends part of the zip and then fails the body stream.
fn truncated_response() -> Response {
    let mut payload = runtime_zip();
    payload.truncate(payload.len() / 2);
    let head = stream::iter([Ok::<_, std::io::Error>(Bytes::from(payload))]);
    let failure = stream::once(async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Err::<Bytes, _>(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection dropped mid-transfer",
        ))
    });
    Response::new(Body::from_stream(head.chain(failure)))
}

fn redirect(location: String) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

/// System probe with a fixed answer.
pub struct StaticProbe {
    pub system: Option<(PathBuf, u32)>,
}

impl StaticProbe {
    pub fn none() -> Arc<Self> {
        Arc::new(Self { system: None })
    }
}

#[async_trait]
impl SystemRuntimeProbe for StaticProbe {
    async fn resolve(&self) -> Result<PathBuf, DiscoveryError> {
        self.system
            .as_ref()
            .map(|(path, _)| path.clone())
            .ok_or(DiscoveryError::NotOnPath)
    }

    async fn query_major(&self, _executable: &Path) -> Result<u32, DiscoveryError> {
        self.system
            .as_ref()
            .map(|(_, major)| *major)
            .ok_or(DiscoveryError::NotOnPath)
    }
}

/// Names in `dir` that look like provisioning leftovers.
pub fn leftovers(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .filter(|name| name.starts_with(".download-") || name.starts_with(".staging-"))
                .collect()
        })
        .unwrap_or_default()
}
