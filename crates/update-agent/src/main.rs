mod navigator;
mod prompt;

use std::{path::PathBuf, process::ExitCode, sync::Arc, time::Duration};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use services::services::{
    clock::{Clock, SystemClock},
    config::ReconcilerConfig,
    descriptor_source::{DescriptorSource, HttpDescriptorSource},
    prompt::{StaticPrompt, UpdatePrompt},
    storage::FsStorage,
    update_executor::UpdateExecutor,
    update_reconciler::{SessionState, UpdateReconciler},
    version_descriptor::force_update_reason,
    visibility::{PageVisibility, Visibility},
};
use tokio::sync::mpsc;
use tracing::{info, warn};
use url::Url;
use utils::{build_info::BuildInfo, logging::init_tracing};

use crate::{navigator::ProcessNavigator, prompt::TerminalPrompt};

/// Exit status telling the supervisor to relaunch at the printed location
const RELOAD_EXIT_CODE: u8 = 3;
const STALE_EXIT_CODE: u8 = 1;

#[derive(Parser)]
#[command(name = "update-agent", version, about = "Keep a client session on the deployed build")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch the published descriptor once and report whether this build is stale
    Check {
        #[arg(long, env = "UPDATE_DESCRIPTOR_URL")]
        descriptor_url: Url,
    },
    /// Reconcile continuously, clearing local state and reloading when stale
    Watch(WatchArgs),
}

#[derive(Args)]
struct WatchArgs {
    /// Current session location; carries the post-update marker after a reload
    #[arg(long, env = "APP_LOCATION")]
    location: Url,
    /// Defaults to /version.json next to the location
    #[arg(long, env = "UPDATE_DESCRIPTOR_URL")]
    descriptor_url: Option<Url>,
    #[arg(long, env = "UPDATE_STORAGE_DIR", default_value = ".update-agent")]
    storage_dir: PathBuf,
    /// Accept updates that ask for confirmation without prompting
    #[arg(long)]
    assume_yes: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    init_tracing("info");

    let cli = Cli::parse();
    match cli.command {
        Command::Check { descriptor_url } => check(descriptor_url).await,
        Command::Watch(args) => watch(args).await,
    }
}

async fn check(descriptor_url: Url) -> anyhow::Result<ExitCode> {
    let config = ReconcilerConfig::from_env(descriptor_url)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let source = HttpDescriptorSource::new(
        config.descriptor_url.clone(),
        config.url_params.clone(),
        clock,
    )?;

    let descriptor = source
        .fetch()
        .await
        .with_context(|| format!("failed to fetch {}", config.descriptor_url))?;
    let client = BuildInfo::current();

    println!("client: {client}");
    println!("server: {}", descriptor.build_info());

    match force_update_reason(&client, &descriptor, config.tolerance_ms()) {
        Some(reason) => {
            println!(
                "update required ({reason}, {})",
                if descriptor.force_update {
                    "silent"
                } else {
                    "needs confirmation"
                }
            );
            Ok(ExitCode::from(STALE_EXIT_CODE))
        }
        None => {
            println!("up to date");
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn watch(args: WatchArgs) -> anyhow::Result<ExitCode> {
    let descriptor_url = match args.descriptor_url {
        Some(url) => url,
        None => ReconcilerConfig::for_app(&args.location)?.descriptor_url,
    };
    let config = ReconcilerConfig::from_env(descriptor_url)?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = SessionState::new();
    let (reload_tx, mut reload_rx) = mpsc::unbounded_channel();
    let navigator = Arc::new(ProcessNavigator::new(args.location, reload_tx));
    let prompt: Arc<dyn UpdatePrompt> = if args.assume_yes {
        Arc::new(StaticPrompt(true))
    } else {
        Arc::new(TerminalPrompt)
    };

    let executor = Arc::new(UpdateExecutor::new(
        Arc::new(FsStorage::new(&args.storage_dir)),
        navigator.clone(),
        prompt,
        clock.clone(),
        config.url_params.clone(),
        state.clone(),
    ));
    let source = Arc::new(HttpDescriptorSource::new(
        config.descriptor_url.clone(),
        config.url_params.clone(),
        clock.clone(),
    )?);

    let client = BuildInfo::current();
    info!(
        build = %client,
        descriptor_url = %config.descriptor_url,
        storage_dir = %args.storage_dir.display(),
        "Watching for new deployments"
    );

    let reconciler = Arc::new(UpdateReconciler::new(
        client, source, executor, clock, config, state,
    ));
    let visibility = Arc::new(PageVisibility::default());
    let handle = reconciler.spawn(navigator.as_ref(), visibility.subscribe());
    let foreground = spawn_foreground_listener(visibility.clone());

    let exit = tokio::select! {
        Some(location) = reload_rx.recv() => {
            println!("{location}");
            ExitCode::from(RELOAD_EXIT_CODE)
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping");
            ExitCode::SUCCESS
        }
    };

    if let Some(task) = foreground {
        task.abort();
    }
    // A pending terminal prompt would otherwise hold shutdown open
    if tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
        .await
        .is_err()
    {
        warn!("Timed out waiting for in-flight update checks");
    }

    Ok(exit)
}

/// SIGUSR1 marks the session as brought back to the foreground
#[cfg(unix)]
fn spawn_foreground_listener(
    visibility: Arc<PageVisibility>,
) -> Option<tokio::task::JoinHandle<()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut signals = match signal(SignalKind::user_defined1()) {
        Ok(signals) => signals,
        Err(e) => {
            warn!(error = %e, "Cannot listen for foreground signal");
            return None;
        }
    };

    Some(tokio::spawn(async move {
        while signals.recv().await.is_some() {
            visibility.set(Visibility::Hidden);
            // Give the reconciler a chance to observe the hidden state
            tokio::time::sleep(Duration::from_millis(100)).await;
            visibility.set(Visibility::Visible);
        }
    }))
}

#[cfg(not(unix))]
fn spawn_foreground_listener(
    _visibility: Arc<PageVisibility>,
) -> Option<tokio::task::JoinHandle<()>> {
    None
}
