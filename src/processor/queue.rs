//! Background analysis queue.
//!
//! A bounded channel feeds one worker task. Each request moves the thread to
//! `analyzing` and runs `analyze_thread`; the analyzer itself records
//! `completed` or `failed`.

use tokio::sync::mpsc;

use super::{analyze_thread, ProcessorError};
use crate::db::SharedDb;
use crate::intelligence::SharedLlm;
use crate::types::ProcessingStage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub user_id: String,
    pub thread_id: String,
}

/// Sending half of the analysis queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AnalysisQueue {
    tx: mpsc::Sender<AnalysisRequest>,
}

impl AnalysisQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AnalysisRequest>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Enqueue without waiting. A full queue is reported, not awaited, so
    /// callers holding the database lock never block on the worker.
    pub fn enqueue(&self, user_id: &str, thread_id: &str) -> Result<(), ProcessorError> {
        self.tx
            .try_send(AnalysisRequest {
                user_id: user_id.to_string(),
                thread_id: thread_id.to_string(),
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => ProcessorError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => ProcessorError::QueueClosed,
            })
    }
}

/// Drain the queue until every sender is dropped.
pub async fn run_analysis_worker(
    db: SharedDb,
    llm: Option<SharedLlm>,
    mut rx: mpsc::Receiver<AnalysisRequest>,
) {
    log::info!("AnalysisWorker: started");
    while let Some(request) = rx.recv().await {
        process_request(&db, llm.as_ref(), &request).await;
    }
    log::info!("AnalysisWorker: queue closed, stopping");
}

async fn process_request(db: &SharedDb, llm: Option<&SharedLlm>, request: &AnalysisRequest) {
    let marked = db
        .lock()
        .set_thread_stage(&request.thread_id, ProcessingStage::Analyzing);
    if let Err(e) = marked {
        log::warn!(
            "AnalysisWorker: could not mark {} analyzing: {}",
            request.thread_id,
            e
        );
    }

    let Some(llm) = llm else {
        log::warn!(
            "AnalysisWorker: no LLM provider configured, failing thread {}",
            request.thread_id
        );
        if let Err(e) = db
            .lock()
            .set_thread_stage(&request.thread_id, ProcessingStage::Failed)
        {
            log::error!(
                "AnalysisWorker: could not mark {} failed: {}",
                request.thread_id,
                e
            );
        }
        return;
    };

    match analyze_thread(db, llm.as_ref(), &request.user_id, &request.thread_id).await {
        Ok(report) => log::info!(
            "AnalysisWorker: thread {} analyzed ({:?}, skipped={})",
            request.thread_id,
            report.mode,
            report.skipped
        ),
        Err(e) => log::warn!(
            "AnalysisWorker: thread {} failed: {}",
            request.thread_id,
            e
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::db::test_utils::{test_db, TEST_USER};
    use crate::db::threads::ThreadUpsert;
    use crate::db::{shared, emails::EmailInsert};
    use crate::intelligence::mock::MockProvider;

    #[test]
    fn test_enqueue_reports_full_and_closed() {
        let (queue, rx) = AnalysisQueue::channel(1);
        queue.enqueue(TEST_USER, "t-1").unwrap();
        assert!(matches!(
            queue.enqueue(TEST_USER, "t-2"),
            Err(ProcessorError::QueueFull)
        ));
        drop(rx);
        assert!(matches!(
            queue.enqueue(TEST_USER, "t-3"),
            Err(ProcessorError::QueueClosed)
        ));
    }

    #[tokio::test]
    async fn test_worker_analyzes_then_stops_when_senders_drop() {
        let db = test_db();
        db.upsert_thread(
            TEST_USER,
            &ThreadUpsert {
                thread_id: "t-1".into(),
                subject: Some("Export issue".into()),
                ..Default::default()
            },
        )
        .unwrap();
        db.insert_email(
            TEST_USER,
            &EmailInsert {
                message_id: "m-1".into(),
                thread_id: "t-1".into(),
                from_address: Some("dana@acme.io".into()),
                body_text: Some("The CSV export times out.".into()),
                sent_date: Some("2026-02-01T10:00:00+00:00".into()),
                ..Default::default()
            },
        )
        .unwrap();
        let db = shared(db);
        let llm: SharedLlm = Arc::new(MockProvider::with_responses(&[
            r#"{"problem_statement": "CSV export timeout", "sentiment_score": -1}"#,
        ]));

        let (queue, rx) = AnalysisQueue::channel(4);
        queue.enqueue(TEST_USER, "t-1").unwrap();
        drop(queue);
        run_analysis_worker(db.clone(), Some(llm), rx).await;

        let thread = db.lock().get_thread(TEST_USER, "t-1").unwrap().unwrap();
        assert_eq!(thread.processing_stage.as_deref(), Some("completed"));
        assert_eq!(thread.summary.as_deref(), Some("CSV export timeout"));
    }

    #[tokio::test]
    async fn test_worker_without_provider_fails_thread() {
        let db = test_db();
        db.upsert_thread(
            TEST_USER,
            &ThreadUpsert {
                thread_id: "t-1".into(),
                ..Default::default()
            },
        )
        .unwrap();
        let db = shared(db);

        let (queue, rx) = AnalysisQueue::channel(4);
        queue.enqueue(TEST_USER, "t-1").unwrap();
        drop(queue);
        run_analysis_worker(db.clone(), None, rx).await;

        assert_eq!(
            db.lock().get_thread_stage("t-1").unwrap().as_deref(),
            Some("failed")
        );
    }
}
