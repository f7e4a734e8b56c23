//! Gmail threads -> `threads` / `emails` rows.

use super::{set_progress, SyncContext, SyncError, GMAIL_PROGRESS_END};
use crate::db::emails::EmailInsert;
use crate::db::threads::ThreadUpsert;
use crate::db::Db;
use crate::google_api::gmail::GmailThread;
use crate::types::ProcessingStage;

#[derive(Debug, Clone, Default)]
pub struct GmailImport {
    pub threads_synced: usize,
    pub messages_inserted: usize,
    /// Threads that are new or received new messages.
    pub touched_threads: Vec<String>,
    pub failed_threads: Vec<String>,
}

/// Import threads newer than the lookback window. One thread failing to
/// fetch is logged and skipped; token and listing failures fail the import.
pub async fn import_gmail(
    ctx: &SyncContext,
    user_id: &str,
    access_token: &str,
    job_id: &str,
) -> Result<GmailImport, SyncError> {
    let query = format!("newer_than:{}d", ctx.google_config.gmail_lookback_days.max(1));
    let ids = ctx
        .google
        .list_thread_ids(access_token, &query, ctx.google_config.max_threads_per_sync)
        .await?;
    log::info!("Gmail import for {}: {} thread(s) match '{}'", user_id, ids.len(), query);

    let mut import = GmailImport::default();
    let total = ids.len().max(1);
    for (index, thread_id) in ids.iter().enumerate() {
        match ctx.google.fetch_thread(access_token, thread_id).await {
            Ok(thread) => {
                let (inserted, touched) = store_thread(&ctx.db.lock(), user_id, &thread)?;
                import.threads_synced += 1;
                import.messages_inserted += inserted;
                if touched {
                    import.touched_threads.push(thread.id);
                }
            }
            Err(e) => {
                log::warn!("Could not fetch Gmail thread {}: {}", thread_id, e);
                import.failed_threads.push(thread_id.clone());
            }
        }
        let progress = ((index + 1) * GMAIL_PROGRESS_END as usize / total) as i64;
        set_progress(&ctx.db, job_id, progress);
    }

    Ok(import)
}

/// Upsert the thread and insert its unseen messages in one transaction.
///
/// A thread that is new or gained messages goes back to `pending` so the
/// resolver and analyzer see it again. Returns `(messages inserted, touched)`.
pub(crate) fn store_thread(
    db: &Db,
    user_id: &str,
    thread: &GmailThread,
) -> Result<(usize, bool), SyncError> {
    db.with_transaction(|db| -> Result<(usize, bool), SyncError> {
        let is_new = db.upsert_thread(
            user_id,
            &ThreadUpsert {
                thread_id: thread.id.clone(),
                subject: thread.subject(),
                snippet: Some(thread.snippet.clone()).filter(|s| !s.is_empty()),
                last_message_date: thread.last_message_date(),
            },
        )?;

        let mut inserted = 0;
        for message in &thread.messages {
            let email = EmailInsert {
                message_id: message.id.clone(),
                thread_id: thread.id.clone(),
                from_address: message.from.clone(),
                to_addresses: message.to.clone(),
                cc_addresses: message.cc.clone(),
                subject: message.subject.clone(),
                snippet: Some(message.snippet.clone()).filter(|s| !s.is_empty()),
                body_text: message.body_text.clone(),
                body_html: message.body_html.clone(),
                sent_date: message.date.clone(),
            };
            if db.insert_email(user_id, &email)? {
                inserted += 1;
            }
        }

        let touched = is_new || inserted > 0;
        if touched && !is_new {
            db.set_thread_stage(&thread.id, ProcessingStage::Pending)?;
        }
        log::debug!(
            "Thread {}: new={}, {} message(s) inserted",
            thread.id,
            is_new,
            inserted
        );
        Ok((inserted, touched))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{test_db, TEST_USER};
    use crate::google_api::gmail::GmailMessage;

    fn thread(message_ids: &[&str]) -> GmailThread {
        GmailThread {
            id: "t-1".into(),
            snippet: "latest".into(),
            messages: message_ids
                .iter()
                .map(|id| GmailMessage {
                    id: id.to_string(),
                    thread_id: "t-1".into(),
                    from: Some("Dana <dana@acme.io>".into()),
                    to: vec!["me@ourco.com".into()],
                    subject: Some("Renewal".into()),
                    body_text: Some("hello".into()),
                    date: Some("2026-02-01T10:00:00+00:00".into()),
                    ..Default::default()
                })
                .collect(),
        }
    }

    #[test]
    fn test_new_messages_reopen_completed_thread() {
        let db = test_db();
        assert_eq!(store_thread(&db, TEST_USER, &thread(&["m-1"])).unwrap(), (1, true));
        db.set_thread_stage("t-1", ProcessingStage::Completed).unwrap();

        // Same messages again: nothing changes.
        assert_eq!(store_thread(&db, TEST_USER, &thread(&["m-1"])).unwrap(), (0, false));
        assert_eq!(db.get_thread_stage("t-1").unwrap().as_deref(), Some("completed"));

        assert_eq!(
            store_thread(&db, TEST_USER, &thread(&["m-1", "m-2"])).unwrap(),
            (1, true)
        );
        assert_eq!(db.get_thread_stage("t-1").unwrap().as_deref(), Some("pending"));
        let thread = db.get_thread(TEST_USER, "t-1").unwrap().unwrap();
        assert_eq!(thread.subject.as_deref(), Some("Renewal"));
        assert_eq!(db.list_thread_emails("t-1").unwrap().len(), 2);
    }
}
