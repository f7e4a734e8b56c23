//! Thread processing pipeline.
//!
//! Orchestrates: resolve participants → queue → LLM analysis → health.
//!
//! Entity resolution runs inline after a Gmail import; it moves each thread
//! to `queued` and hands it to the analysis worker, which drives the thread
//! through `analyzing` to `completed` or `failed`.

pub mod addresses;
pub mod analyzer;
pub mod meeting;
pub mod queue;
pub mod resolver;
pub mod summarize;

use crate::db::DbError;
use crate::intelligence::LlmError;

pub use analyzer::{analyze_thread, AnalysisMode, AnalysisReport};
pub use meeting::{analyze_meeting, MeetingAnalysisReport};
pub use queue::{run_analysis_worker, AnalysisQueue, AnalysisRequest};
pub use resolver::{resolve_thread_entities, ResolutionReport};
pub use summarize::{summarize_emails, SummaryReport};

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("No messages found for thread {0}")]
    NoMessages(String),

    #[error("Meeting not found: {0}")]
    MeetingNotFound(String),

    #[error("Meeting {0} has no transcript")]
    NoTranscript(String),

    #[error("No LLM provider configured")]
    LlmNotConfigured,

    #[error("Analysis queue is full")]
    QueueFull,

    #[error("Analysis queue is closed")]
    QueueClosed,
}
