use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::{mpsc, watch};

use download_gate::config::GateConfig;
use download_gate::db::{self, Database};
use download_gate::errors::{GateError, Result};
use download_gate::logging;
use download_gate::models::AppListing;
use download_gate::services::{
    capture_download, AdService, ApiClient, FlowEvent, FlowState, PendingDownloadStore,
    RedirectFlow, SqliteSessionStorage, SystemBrowser, VerificationClient,
};
use download_gate::utils::paths::{resolve_data_dir, resolve_log_dir};

#[derive(Parser)]
#[command(name = "download-gate", version, about = "Ad-gated download unlock client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Record the download for an app listing (JSON file) as pending
    Capture { app: PathBuf },
    /// Show the advertisement and unlock the pending download
    Redirect,
    /// Capture and redirect in one step
    Download { app: PathBuf },
    /// Print the pending download, if any
    Status,
    /// Forget the pending download
    Clear,
}

#[derive(Clone)]
pub struct AppState {
    pub config: GateConfig,
    pub db: Database,
    pub store: PendingDownloadStore,
    pub api: ApiClient,
}

impl AppState {
    fn init(config: GateConfig) -> Result<Self> {
        let db = db::init(&resolve_data_dir(&config.root_dir))?;
        let storage = SqliteSessionStorage::open(db.clone(), config.session_idle)?;
        let store = PendingDownloadStore::new(Arc::new(storage));
        let api = ApiClient::new(config.api_url.clone(), config.http_timeout);
        Ok(Self {
            config,
            db,
            store,
            api,
        })
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = GateConfig::from_env();

    if let Err(err) = logging::init(&resolve_log_dir(&config.root_dir)) {
        eprintln!("warning: file logging disabled: {err}");
    }

    let state = match AppState::init(config) {
        Ok(state) => state,
        Err(err) => {
            tracing::error!("startup failed: {}", err);
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(db = %state.db.path().display(), api = %state.api.base_url(), "client ready");

    let outcome = match cli.command {
        Command::Capture { app } => capture(&state, &app).map(exit_code),
        Command::Redirect => redirect(&state).await,
        Command::Download { app } => match capture(&state, &app) {
            Ok(true) => redirect(&state).await,
            other => other.map(exit_code),
        },
        Command::Status => status(&state),
        Command::Clear => state.store.clear().map(|_| {
            println!("pending download cleared");
            ExitCode::SUCCESS
        }),
    };

    match outcome {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("command failed: {}", err);
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn capture(state: &AppState, path: &Path) -> Result<bool> {
    let raw = std::fs::read_to_string(path)?;
    let app: AppListing = serde_json::from_str(&raw)?;
    match capture_download(&state.store, &app, chrono::Utc::now().timestamp_millis()) {
        Ok(pending) => {
            println!("{} is ready to unlock", pending.app_name);
            Ok(true)
        }
        Err(err) => {
            eprintln!("cannot start download: {err}");
            Ok(false)
        }
    }
}

fn status(state: &AppState) -> Result<ExitCode> {
    match state.store.get() {
        Some(pending) => println!("{}", serde_json::to_string_pretty(&pending)?),
        None => println!("no pending download"),
    }
    Ok(ExitCode::SUCCESS)
}

async fn redirect(state: &AppState) -> Result<ExitCode> {
    let mut flow = RedirectFlow::new(
        AdService::new(state.api.clone()),
        VerificationClient::new(state.api.clone()),
        SystemBrowser,
        state.store.clone(),
        state.config.gate,
    );

    let (events_tx, mut events) = mpsc::channel(8);
    spawn_input_reader(events_tx);
    tokio::spawn(render_progress(flow.subscribe()));

    loop {
        match flow.run(&mut events).await {
            FlowState::Unlocked { expires_at } => {
                println!("download started (unlock valid until {})", expires_at.to_rfc3339());
                return Ok(ExitCode::SUCCESS);
            }
            FlowState::Idle => {
                println!("cancelled; run `download-gate redirect` to resume");
                return Ok(ExitCode::SUCCESS);
            }
            FlowState::Failed(failure) if failure.can_retry_in_place() => {
                println!("{failure}. Type r + Enter to retry, q + Enter to quit.");
                if !wait_for_retry(&mut events).await {
                    flow.abandon();
                    println!("pending download discarded");
                    return Ok(ExitCode::FAILURE);
                }
                flow.retry().await;
            }
            FlowState::Failed(failure) => {
                println!("{failure}");
                return Ok(ExitCode::FAILURE);
            }
            other => return Err(GateError::UnexpectedState(other.label())),
        }
    }
}

async fn wait_for_retry(events: &mut mpsc::Receiver<FlowEvent>) -> bool {
    while let Some(event) = events.recv().await {
        match event {
            FlowEvent::Retry => return true,
            FlowEvent::Cancel => return false,
            FlowEvent::Skip => {}
        }
    }
    false
}

async fn render_progress(mut updates: watch::Receiver<FlowState>) {
    while updates.changed().await.is_ok() {
        let state = updates.borrow_and_update().clone();
        match state {
            FlowState::AdLoading => println!("loading advertisement..."),
            FlowState::AdDisplayed {
                ad_name,
                remaining,
                can_skip,
                ..
            } => {
                let name = ad_name.unwrap_or_else(|| "Sponsored".to_string());
                let hint = if can_skip { " (s + Enter to skip)" } else { "" };
                println!("{name}: download unlocks in {remaining}s{hint}");
            }
            FlowState::Verifying => println!("verifying advertisement view..."),
            _ => {}
        }
    }
}

/// Reads commands on a plain thread so a blocked stdin never holds up
/// runtime shutdown.
fn spawn_input_reader(events: mpsc::Sender<FlowEvent>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let event = match line.trim() {
                "s" | "skip" => FlowEvent::Skip,
                "r" | "retry" => FlowEvent::Retry,
                "q" | "quit" => FlowEvent::Cancel,
                _ => continue,
            };
            if events.blocking_send(event).is_err() {
                break;
            }
        }
    });
}
