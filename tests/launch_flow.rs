mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use common::{PackageServer, StaticProbe};
use mango_launcher::core::java::{InstallLayout, RuntimeOrigin};
use mango_launcher::core::launch::{
    LaunchCapability, LaunchConfiguration, LaunchHandle, LaunchRequest, RawEventSender,
    RawLaunchEvent, SupervisorState, Variant,
};
use mango_launcher::core::state::LauncherSettings;
use mango_launcher::{EventRelay, LauncherEvent, LauncherResult, Launcher};
use tokio::sync::mpsc;

/// Pretends to be the game: a little output, then the given exit code.
struct ScriptedGame {
    exit_code: i32,
    configs: Mutex<Vec<LaunchConfiguration>>,
}

impl ScriptedGame {
    fn exiting_with(exit_code: i32) -> Arc<Self> {
        Arc::new(Self {
            exit_code,
            configs: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl LaunchCapability for ScriptedGame {
    async fn launch(
        &self,
        config: &LaunchConfiguration,
        events: RawEventSender,
    ) -> LauncherResult<LaunchHandle> {
        self.configs.lock().unwrap().push(config.clone());
        let exit_code = self.exit_code;
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = events.send(RawLaunchEvent::Progress {
                kind: "assets".into(),
                task: 10,
                total: 10,
            });
            let _ = events.send(RawLaunchEvent::Data("Setting user: Player".into()));
            let _ = events.send(RawLaunchEvent::Debug("[MCLC]: Launching".into()));
            let _ = events.send(RawLaunchEvent::Close(exit_code));
        });
        Ok(LaunchHandle { pid: Some(31337) })
    }
}

fn settings(download_base: String) -> LauncherSettings {
    LauncherSettings {
        runtime_download_base: download_base,
        min_free_disk_mb: 0,
        ..LauncherSettings::default()
    }
}

async fn collect_until_close(rx: &mut mpsc::UnboundedReceiver<LauncherEvent>) -> Vec<LauncherEvent> {
    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        while let Some(event) = rx.recv().await {
            let done = matches!(event, LauncherEvent::Close { .. });
            received.push(event);
            if done {
                break;
            }
        }
    })
    .await
    .expect("no close event");
    received
}

#[tokio::test]
async fn fresh_install_provisions_and_runs_to_clean_exit() {
    let server = PackageServer::start().await;
    let root = tempfile::tempdir().unwrap();
    let layout = InstallLayout::new(root.path());
    let game = ScriptedGame::exiting_with(0);
    let (relay, mut events) = EventRelay::channel(Duration::from_millis(500));
    let launcher = Launcher::new(
        layout.clone(),
        settings(server.url("direct")),
        StaticProbe::none(),
        game.clone(),
        relay,
    )
    .unwrap();
    let mut states = launcher.supervisor().subscribe_state();
    assert_eq!(launcher.supervisor().state(), SupervisorState::Idle);

    let outcome = launcher
        .launch(LaunchRequest {
            distribution_version: "1.20.4".into(),
            variant: Variant::Vanilla,
            identity: Default::default(),
            install_root: root.path().to_path_buf(),
            memory: None,
            window: None,
        })
        .await;
    assert!(outcome.success, "{:?}", outcome.error);
    assert!(!launcher.is_launching());

    // Provisioning asked for the 17 floor.
    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].starts_with("/direct/17/ga/"));

    let config = game.configs.lock().unwrap()[0].clone();
    assert_eq!(config.version.number, "1.20.4");
    assert_eq!(config.version.release_type, "release");
    assert_eq!(config.memory.max, "4G");
    assert_eq!(config.memory.min, "2G");
    assert!(config.authorization.is_offline());
    assert!(uuid::Uuid::parse_str(&config.authorization.uuid).is_ok());
    assert!(config.java_path.is_file());
    assert!(config.java_path.starts_with(layout.provisioning_dir()));

    let received = collect_until_close(&mut events).await;
    assert_eq!(
        received.first(),
        Some(&LauncherEvent::Status {
            message: "Checking Java runtime...".into()
        })
    );
    assert!(received.contains(&LauncherEvent::Status {
        message: "Java ready, starting game...".into()
    }));
    assert!(received.iter().any(|event| matches!(
        event,
        LauncherEvent::Progress { percent, .. } if *percent == 100.0
    )));
    assert!(received.contains(&LauncherEvent::Log {
        line: "Setting user: Player".into()
    }));
    assert_eq!(received.last(), Some(&LauncherEvent::Close { code: 0 }));
    assert!(!received
        .iter()
        .any(|event| matches!(event, LauncherEvent::Error { .. })));

    let mut seen = Vec::new();
    while let Ok(state) = states.try_recv() {
        seen.push(state);
    }
    assert_eq!(
        seen,
        vec![
            SupervisorState::Starting,
            SupervisorState::Running,
            SupervisorState::Closed(0)
        ]
    );

    // Second launch reuses the runtime without touching the network.
    let runtime = launcher.ensure_runtime("1.20.4").await.unwrap();
    assert_eq!(runtime.origin, RuntimeOrigin::Provisioned);
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn crash_exit_is_reported_as_error() {
    let server = PackageServer::start().await;
    let root = tempfile::tempdir().unwrap();
    let game = ScriptedGame::exiting_with(1);
    let (relay, mut events) = EventRelay::channel(Duration::from_millis(500));
    let launcher = Launcher::new(
        InstallLayout::new(root.path()),
        settings(server.url("direct")),
        StaticProbe::none(),
        game,
        relay,
    )
    .unwrap();

    let outcome = launcher
        .launch(LaunchRequest {
            distribution_version: "1.21".into(),
            variant: Variant::Fabric,
            identity: Default::default(),
            install_root: root.path().to_path_buf(),
            memory: None,
            window: None,
        })
        .await;
    assert!(outcome.success);

    let received = collect_until_close(&mut events).await;
    assert_eq!(received.last(), Some(&LauncherEvent::Close { code: 1 }));
    let next = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap();
    assert!(matches!(next, Some(LauncherEvent::Error { .. })));
    assert_eq!(launcher.supervisor().state(), SupervisorState::Closed(1));
}

#[tokio::test]
async fn unreachable_download_fails_with_retry_hint() {
    let server = PackageServer::start().await;
    let root = tempfile::tempdir().unwrap();
    let game = ScriptedGame::exiting_with(0);
    let (relay, mut events) = EventRelay::channel(Duration::from_millis(500));
    let launcher = Launcher::new(
        InstallLayout::new(root.path()),
        settings(server.url("missing")),
        StaticProbe::none(),
        game.clone(),
        relay,
    )
    .unwrap();

    let outcome = launcher
        .launch(LaunchRequest {
            distribution_version: "1.20.4".into(),
            variant: Variant::Vanilla,
            identity: Default::default(),
            install_root: root.path().to_path_buf(),
            memory: None,
            window: None,
        })
        .await;

    assert!(!outcome.success);
    let message = outcome.error.unwrap();
    assert!(message.contains("HTTP 404"));
    assert!(message.contains("download Java automatically"));
    assert!(!launcher.is_launching());
    assert!(game.configs.lock().unwrap().is_empty());
    assert_eq!(launcher.supervisor().state(), SupervisorState::Idle);

    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event);
    }
    assert!(matches!(received.last(), Some(LauncherEvent::Error { .. })));
}
