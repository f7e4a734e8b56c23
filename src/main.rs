use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use successdesk_lib::api::build_router;
use successdesk_lib::config::{load_config, Config};
use successdesk_lib::db::Db;
use successdesk_lib::health::recalculate_company_health;
use successdesk_lib::intelligence::SharedLlm;
use successdesk_lib::processor::{
    analyze_thread, resolve_thread_entities, run_analysis_worker, summarize_emails,
    AnalysisRequest, ProcessorError,
};
use successdesk_lib::state::AppState;
use successdesk_lib::sync::{run_auto_sync, start_sync, SyncStatus};
use successdesk_lib::types::SyncJobKind;

const SYNC_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Parser, Debug)]
#[command(name = "successdesk", version, about = "Customer-success dashboard backend")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the JSON API with the analysis worker and auto-sync loop.
    Serve {
        #[arg(long, help = "Listen address (overrides server.bind)")]
        bind: Option<String>,
    },
    /// Run one Gmail + Calendar sync for a user.
    Sync {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = false, help = "Also wait for queued thread analyses")]
        wait: bool,
    },
    /// Resolve participants of threads and analyse them.
    Resolve {
        #[arg(long)]
        user: String,
        #[arg(required = true)]
        thread_ids: Vec<String>,
    },
    /// Analyse one thread now.
    Analyze {
        #[arg(long)]
        user: String,
        thread_id: String,
    },
    /// Summarise emails that have no summary yet.
    SummarizeEmails {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Recompute one company's health score.
    RecalcHealth {
        #[arg(long)]
        user: String,
        company_id: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), String> {
    let config = load_config()?;
    let db = open_db(&config)?;
    let (state, rx) = AppState::new(db, config);

    match cli.command {
        Commands::Serve { bind } => serve(state, rx, bind).await,
        Commands::Sync { user, wait } => sync(state, rx, &user, wait).await,
        Commands::Resolve { user, thread_ids } => {
            let worker = spawn_worker(&state, rx);
            let report = resolve_thread_entities(&state.db, &state.queue, &user, &thread_ids);
            print_json(&report)?;
            drain(state, worker).await;
            Ok(())
        }
        Commands::Analyze { user, thread_id } => {
            let llm = require_llm(&state)?;
            let report = analyze_thread(&state.db, &*llm, &user, &thread_id)
                .await
                .map_err(|e| e.to_string())?;
            print_json(&report)
        }
        Commands::SummarizeEmails { limit } => {
            let llm = require_llm(&state)?;
            let report = summarize_emails(&state.db, &*llm, limit)
                .await
                .map_err(|e| e.to_string())?;
            print_json(&report)
        }
        Commands::RecalcHealth { user, company_id } => {
            let db = state.db.lock();
            if db
                .get_company(&user, &company_id)
                .map_err(|e| e.to_string())?
                .is_none()
            {
                return Err(format!("Company {} not found", company_id));
            }
            let health =
                recalculate_company_health(&db, &user, &company_id).map_err(|e| e.to_string())?;
            print_json(&serde_json::json!({
                "companyId": company_id,
                "healthScore": health,
            }))
        }
    }
}

/// Run one sync in-process and report it. With `wait` the worker finishes
/// the analyses the sync queued; otherwise they go back to `pending` and the
/// next sync resolves them again.
async fn sync(
    state: AppState,
    rx: mpsc::Receiver<AnalysisRequest>,
    user: &str,
    wait: bool,
) -> Result<(), String> {
    let worker = spawn_worker(&state, rx);
    let outcome = track_sync(&state, user).await;
    if wait {
        drain(state, worker).await;
    } else {
        hand_back(state, worker, user).await;
    }
    outcome
}

async fn track_sync(state: &AppState, user: &str) -> Result<(), String> {
    let job = start_sync(&state.sync_context(), user, SyncJobKind::Full).map_err(|e| e.to_string())?;

    let mut status = SyncStatus::default();
    status.begin().map_err(|e| e.to_string())?;
    status.job_created(&job).map_err(|e| e.to_string())?;
    let db = state.db.clone();
    let phase = status
        .poll_until_done(SYNC_POLL_INTERVAL, || {
            let db = db.clone();
            let (user, job_id) = (user.to_string(), job.job_id.clone());
            async move {
                let row = db.lock().get_sync_job(&user, &job_id);
                match row {
                    Ok(Some(row)) => {
                        log::info!("Sync job {}: {} {}%", row.job_id, row.status, row.progress);
                        Ok(row)
                    }
                    Ok(None) => Err(format!("Sync job {} disappeared", job_id)),
                    Err(e) => Err(e.to_string()),
                }
            }
        })
        .await
        .map_err(|e| e.to_string())?;
    print_json(&status)?;

    if phase.is_in_progress() || status.error.is_some() {
        return Err(status.error.unwrap_or_else(|| "sync failed".to_string()));
    }
    Ok(())
}

async fn serve(
    state: AppState,
    rx: mpsc::Receiver<AnalysisRequest>,
    bind: Option<String>,
) -> Result<(), String> {
    let addr = bind.unwrap_or_else(|| state.config.server.bind.clone());
    // Jobs left running by a previous process will never finish.
    let failed = state
        .db
        .lock()
        .fail_interrupted_sync_jobs()
        .map_err(|e| e.to_string())?;
    if failed > 0 {
        log::warn!("Marked {} interrupted sync job(s) as failed", failed);
    }
    // Queued analyses died with the previous process.
    let requeued = state
        .db
        .lock()
        .requeue_unfinished_threads(None)
        .map_err(|e| e.to_string())?;
    if requeued > 0 {
        log::warn!("Returned {} unfinished thread(s) to pending", requeued);
    }
    let _worker = spawn_worker(&state, rx);
    tokio::spawn(run_auto_sync(
        state.sync_context(),
        state.config.sync.clone(),
        state.sync_wake.clone(),
    ));

    let app = build_router(Arc::new(state));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", addr, e))?;
    log::info!("SuccessDesk listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("Shutting down");
        })
        .await
        .map_err(|e| format!("Server error: {}", e))
}

fn open_db(config: &Config) -> Result<Db, String> {
    let opened = match &config.db_path {
        Some(path) => Db::open_at(PathBuf::from(path)),
        None => Db::open(),
    };
    opened.map_err(|e| format!("Failed to open database: {}", e))
}

fn spawn_worker(state: &AppState, rx: mpsc::Receiver<AnalysisRequest>) -> JoinHandle<()> {
    tokio::spawn(run_analysis_worker(state.db.clone(), state.llm.clone(), rx))
}

/// Close the queue and let the worker finish what is already queued.
async fn drain(state: AppState, worker: JoinHandle<()>) {
    drop(state);
    if let Err(e) = worker.await {
        log::warn!("Analysis worker ended abnormally: {}", e);
    }
}

/// Stop the worker and return this user's unfinished threads to `pending`.
async fn hand_back(state: AppState, worker: JoinHandle<()>, user: &str) {
    worker.abort();
    if let Err(e) = worker.await {
        if !e.is_cancelled() {
            log::warn!("Analysis worker ended abnormally: {}", e);
        }
    }
    match state.db.lock().requeue_unfinished_threads(Some(user)) {
        Ok(0) => {}
        Ok(n) => log::info!("Left {} thread(s) pending for the next sync", n),
        Err(e) => log::error!("Could not return threads to pending: {}", e),
    }
}

fn require_llm(state: &AppState) -> Result<SharedLlm, String> {
    state
        .llm
        .clone()
        .ok_or_else(|| ProcessorError::LlmNotConfigured.to_string())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}
