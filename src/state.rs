use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Notify};

use crate::config::Config;
use crate::db::{self, Db, SharedDb};
use crate::google_api::GoogleClient;
use crate::intelligence::{build_provider, SharedLlm};
use crate::processor::{AnalysisQueue, AnalysisRequest};
use crate::recall::RecallClient;
use crate::sync::SyncContext;

/// Provider calls give up after this long.
const HTTP_TIMEOUT_SECS: u64 = 60;

/// Application state shared by every route and background task
pub struct AppState {
    pub db: SharedDb,
    pub config: Config,
    pub http: reqwest::Client,
    pub google: GoogleClient,
    /// `None` when no provider key is configured; analysis then fails fast.
    pub llm: Option<SharedLlm>,
    pub queue: AnalysisQueue,
    pub recall: Option<RecallClient>,
    /// Wakes the auto-sync poller early.
    pub sync_wake: Arc<Notify>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Wire up clients around an open database. The receiver belongs to the
    /// analysis worker.
    pub fn new(db: Db, config: Config) -> (Self, mpsc::Receiver<AnalysisRequest>) {
        let http = match reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                log::warn!("Failed to build HTTP client: {e}. Using defaults.");
                reqwest::Client::new()
            }
        };

        let llm = match build_provider(&config.intelligence, http.clone()) {
            Ok(provider) => {
                log::info!("LLM provider: {}", provider.name());
                Some(provider)
            }
            Err(e) => {
                log::warn!("LLM provider unavailable: {e}. Thread analysis disabled.");
                None
            }
        };

        let recall = RecallClient::from_config(&config.recall, http.clone());
        if recall.is_none() {
            log::info!("Recall API key not set, meeting recording disabled");
        }

        let (queue, rx) = AnalysisQueue::channel(config.intelligence.queue_capacity);

        let state = Self {
            db: db::shared(db),
            google: GoogleClient::new(http.clone()),
            http,
            llm,
            queue,
            recall,
            sync_wake: Arc::new(Notify::new()),
            config,
        };
        (state, rx)
    }

    pub fn sync_context(&self) -> SyncContext {
        SyncContext {
            db: self.db.clone(),
            google: self.google.clone(),
            google_config: self.config.google.clone(),
            queue: self.queue.clone(),
        }
    }
}
