use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use mango_launcher::core::auth::LaunchIdentity;
use mango_launcher::core::java::InstallLayout;
use mango_launcher::core::launch::{LaunchRequest, Variant};
use mango_launcher::{init_tracing, LauncherEvent, Launcher, LauncherResult};
use tokio::sync::mpsc;

/// Command-line front end: runs one action and prints events as JSON lines.
#[derive(Debug, Parser)]
#[command(
    name = "mango-launcher",
    version,
    about = "Find or download a Java runtime and launch the game.",
    long_about = None
)]
struct CliArgs {
    /// Installation root. Defaults to `MANGO_LAUNCHER_ROOT` or the platform
    /// data directory.
    #[arg(long, value_name = "PATH", global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Launch a distribution and stream its events until it exits.
    Launch {
        #[arg(long, value_name = "VERSION")]
        version: String,
        #[arg(long, default_value = "vanilla")]
        variant: Variant,
        /// Offline display name.
        #[arg(long, default_value = "")]
        username: String,
    },
    /// Make sure a runtime for this distribution version is available.
    Runtime {
        #[arg(long, value_name = "VERSION")]
        version: String,
    },
    /// List installed distribution versions.
    Versions,
}

#[tokio::main]
async fn main() {
    init_tracing();
    match run(CliArgs::parse()).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("mango-launcher error: {err}");
            std::process::exit(1);
        }
    }
}

async fn run(args: CliArgs) -> LauncherResult<i32> {
    let layout = match args.root {
        Some(root) => InstallLayout::new(root),
        None => InstallLayout::from_environment(),
    };
    let (launcher, events) = Launcher::from_layout(layout)?;

    match args.command {
        Command::Versions => {
            println!("{}", serde_json::to_string(&launcher.installed_versions())?);
            Ok(0)
        }
        Command::Runtime { version } => {
            let printer = tokio::spawn(print_events(events));
            let runtime = launcher.ensure_runtime(&version).await;
            drop(launcher);
            finish_printer(printer).await;
            println!("{}", serde_json::to_string(&runtime?)?);
            Ok(0)
        }
        Command::Launch {
            version,
            variant,
            username,
        } => {
            let request = LaunchRequest {
                distribution_version: version,
                variant,
                identity: LaunchIdentity::offline(username),
                install_root: launcher.layout().root().to_path_buf(),
                memory: None,
                window: None,
            };
            let printer = tokio::spawn(print_events(events));
            let outcome = launcher.launch(request).await;
            if !outcome.success {
                drop(launcher);
                finish_printer(printer).await;
                println!("{}", serde_json::to_string(&outcome)?);
                return Ok(1);
            }
            // Runs until the game reports its close.
            let code = printer.await.ok().flatten().unwrap_or(-1);
            Ok(code)
        }
    }
}

/// Prints events until a close arrives (returning its code) or the relay is
/// dropped.
async fn print_events(mut events: mpsc::UnboundedReceiver<LauncherEvent>) -> Option<i32> {
    while let Some(event) = events.recv().await {
        if let Ok(line) = serde_json::to_string(&event) {
            println!("{line}");
        }
        if let LauncherEvent::Close { code } = event {
            return Some(code);
        }
    }
    None
}

async fn finish_printer(printer: tokio::task::JoinHandle<Option<i32>>) {
    let _ = tokio::time::timeout(Duration::from_secs(2), printer).await;
}
