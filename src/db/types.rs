use serde::{Deserialize, Serialize};

use crate::types::{
    BotStatus, CompanyStatus, CustomerStatus, FeatureRequestStatus, NextStepStatus,
    SyncJobKind, SyncJobStatus, Urgency,
};

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("{0} already exists")]
    Conflict(String),
}

/// A row from the `profiles` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbProfile {
    pub user_id: String,
    pub email: String,
    pub full_name: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A row from the `companies` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbCompany {
    pub company_id: String,
    pub user_id: String,
    pub company_name: String,
    pub domain_name: Option<String>,
    pub status: CompanyStatus,
    pub health_score: Option<i64>,
    pub mrr: Option<f64>,
    pub renewal_date: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    /// Computed: customers linked to this company.
    #[serde(default)]
    pub customer_count: i64,
    /// Computed: pending next steps for this company.
    #[serde(default)]
    pub open_next_steps: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCompany {
    pub company_name: String,
    #[serde(default)]
    pub domain_name: Option<String>,
    #[serde(default)]
    pub status: Option<CompanyStatus>,
    #[serde(default)]
    pub mrr: Option<f64>,
    #[serde(default)]
    pub renewal_date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyUpdate {
    pub company_name: Option<String>,
    pub status: Option<CompanyStatus>,
    pub health_score: Option<i64>,
    pub mrr: Option<f64>,
    pub renewal_date: Option<String>,
    pub notes: Option<String>,
}

/// A row from the `customers` table, joined with its company name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbCustomer {
    pub customer_id: String,
    pub user_id: String,
    pub company_id: Option<String>,
    pub company_name: Option<String>,
    pub email: String,
    pub full_name: Option<String>,
    pub title: Option<String>,
    pub domain_match: Option<String>,
    pub status: CustomerStatus,
    pub health_score: Option<i64>,
    pub sentiment: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCustomer {
    pub email: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub domain_match: Option<String>,
    #[serde(default)]
    pub status: Option<CustomerStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerUpdate {
    pub full_name: Option<String>,
    pub title: Option<String>,
    pub company_id: Option<String>,
    pub status: Option<CustomerStatus>,
    pub health_score: Option<i64>,
    pub sentiment: Option<String>,
}

/// A row from the `threads` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbThread {
    pub thread_id: String,
    pub user_id: String,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub last_message_date: Option<String>,
    pub summary: Option<String>,
    pub sentiment: Option<String>,
    pub sentiment_score: Option<i64>,
    pub resolution_status: Option<String>,
    pub problem_statement: Option<String>,
    pub timeline_summary: Option<String>,
    pub last_analyzed_at: Option<String>,
    /// Kept as raw text: rows written by older builds may carry stages this
    /// build does not know.
    pub processing_stage: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A message row from the `emails` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbEmail {
    pub message_id: String,
    pub thread_id: String,
    pub user_id: String,
    pub from_address: Option<String>,
    /// JSON array of raw address strings.
    pub to_addresses: String,
    pub cc_addresses: String,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub sent_date: Option<String>,
    pub customer_id: Option<String>,
    pub summary: Option<String>,
    pub created_at: String,
}

/// Fields written by the analyzer after an LLM pass over a thread.
#[derive(Debug, Clone, Default)]
pub struct ThreadAnalysisUpdate {
    pub summary: Option<String>,
    pub sentiment: Option<String>,
    pub sentiment_score: Option<i64>,
    pub resolution_status: Option<String>,
    pub problem_statement: Option<String>,
    pub timeline_summary: Option<String>,
    pub last_analyzed_at: String,
}

/// A row from the `meetings` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbMeeting {
    pub meeting_id: String,
    pub user_id: String,
    pub google_event_id: String,
    pub calendar_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub meeting_url: Option<String>,
    pub start_time: String,
    pub end_time: Option<String>,
    /// JSON array of attendee emails.
    pub attendees: String,
    pub organizer: Option<String>,
    pub company_id: Option<String>,
    pub customer_id: Option<String>,
    pub summary: Option<String>,
    pub sentiment: Option<String>,
    pub sentiment_score: Option<i64>,
    pub transcript: Option<String>,
    pub recall_bot_id: Option<String>,
    pub bot_status: BotStatus,
    pub last_analyzed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A calendar event transformed for upsert into `meetings`.
#[derive(Debug, Clone, Default)]
pub struct MeetingUpsert {
    pub google_event_id: String,
    pub calendar_id: String,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub meeting_url: Option<String>,
    pub start_time: String,
    pub end_time: Option<String>,
    pub attendees: Vec<String>,
    pub organizer: Option<String>,
    pub company_id: Option<String>,
    pub customer_id: Option<String>,
}

/// A row from the `next_steps` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbNextStep {
    pub step_id: String,
    pub user_id: String,
    pub company_id: Option<String>,
    pub company_name: Option<String>,
    pub thread_id: Option<String>,
    pub meeting_id: Option<String>,
    pub description: String,
    pub owner: Option<String>,
    pub due_date: Option<String>,
    pub status: NextStepStatus,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub assignee_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewNextStep {
    pub description: String,
    #[serde(default)]
    pub company_id: Option<String>,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub meeting_id: Option<String>,
    #[serde(default)]
    pub owner: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextStepUpdate {
    pub description: Option<String>,
    pub owner: Option<String>,
    pub due_date: Option<String>,
    pub status: Option<NextStepStatus>,
}

/// A row from the `feature_requests` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbFeatureRequest {
    pub request_id: String,
    pub user_id: String,
    pub company_id: Option<String>,
    pub company_name: Option<String>,
    pub thread_id: Option<String>,
    pub meeting_id: Option<String>,
    pub title: String,
    pub customer_description: Option<String>,
    pub use_case: Option<String>,
    pub urgency: Urgency,
    pub urgency_signals: Option<String>,
    pub customer_impact: Option<String>,
    pub status: FeatureRequestStatus,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewFeatureRequest {
    pub company_id: Option<String>,
    pub thread_id: Option<String>,
    pub meeting_id: Option<String>,
    pub title: String,
    pub customer_description: Option<String>,
    pub use_case: Option<String>,
    pub urgency: Urgency,
    pub urgency_signals: Option<String>,
    pub customer_impact: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureRequestUpdate {
    pub title: Option<String>,
    pub customer_description: Option<String>,
    pub urgency: Option<Urgency>,
    pub status: Option<FeatureRequestStatus>,
}

/// A row from the `sync_jobs` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbSyncJob {
    pub job_id: String,
    pub user_id: String,
    pub kind: SyncJobKind,
    pub status: SyncJobStatus,
    pub progress: i64,
    pub threads_synced: i64,
    pub meetings_synced: i64,
    pub error: Option<String>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

/// A row from the `domain_blocklist` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbBlockedDomain {
    pub entry_id: String,
    pub user_id: String,
    pub domain: String,
    pub created_at: String,
}
