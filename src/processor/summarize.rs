//! Two-line summaries of individual emails.

use serde::Serialize;

use super::analyzer::message_text;
use super::ProcessorError;
use crate::db::SharedDb;
use crate::intelligence::prompts::build_email_summary_prompt;
use crate::intelligence::LlmProvider;

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryReport {
    pub processed: usize,
    pub summarized: usize,
    pub errors: Vec<String>,
}

/// Summarise up to `limit` of the newest emails without a summary. One
/// failing email is recorded and the batch continues.
pub async fn summarize_emails(
    db: &SharedDb,
    llm: &dyn LlmProvider,
    limit: usize,
) -> Result<SummaryReport, ProcessorError> {
    let emails = db.lock().list_unsummarized_emails(limit)?;
    let mut report = SummaryReport::default();
    log::info!("Summarizing {} email(s)", emails.len());

    for email in emails {
        report.processed += 1;
        let body = message_text(&email);
        let prompt = build_email_summary_prompt(
            email.subject.as_deref(),
            email.from_address.as_deref(),
            email.snippet.as_deref(),
            body.as_deref(),
        );
        let summary = match llm.complete_text(&prompt).await {
            Ok(text) => first_lines(&text, 2),
            Err(e) => {
                log::warn!("Summary failed for email {}: {}", email.message_id, e);
                report.errors.push(format!("{}: {}", email.message_id, e));
                continue;
            }
        };
        if summary.is_empty() {
            report
                .errors
                .push(format!("{}: empty summary", email.message_id));
            continue;
        }
        db.lock().set_email_summary(&email.message_id, &summary)?;
        report.summarized += 1;
    }
    Ok(report)
}

fn first_lines(text: &str, count: usize) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(count)
        .collect::<Vec<_>>()
        .join("\n")
}
