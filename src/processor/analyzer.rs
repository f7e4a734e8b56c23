//! LLM thread analysis.
//!
//! Full mode analyses every message of a thread that has never been analysed.
//! Incremental mode sends only messages newer than `last_analyzed_at` along
//! with the previous summary, and records only the action items that are new.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::addresses::{display_name_from_address, extract_local_part_from_email};
use super::ProcessorError;
use crate::db::{
    Db, DbCustomer, DbEmail, NewFeatureRequest, NewNextStep, SharedDb, ThreadAnalysisUpdate,
};
use crate::intelligence::prompts::{build_incremental_prompt, build_thread_prompt};
use crate::intelligence::{parse_analysis, LlmProvider, ThreadAnalysis};
use crate::types::{ProcessingStage, Urgency};

/// Above this estimated size the middle of the conversation is dropped.
pub const MAX_TRANSCRIPT_TOKENS: usize = 100_000;

/// Inserted where messages were dropped.
pub const TRUNCATION_MARKER: &str = "[...Middle of conversation truncated for length...]";

const UNKNOWN_COMPANY: &str = "Unknown Company";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    Full,
    Incremental,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisReport {
    pub thread_id: String,
    pub mode: AnalysisMode,
    /// True when an incremental pass found no new messages.
    pub skipped: bool,
    pub messages_analyzed: usize,
    pub truncated: bool,
    pub sentiment: Option<String>,
    pub sentiment_score: Option<i64>,
    pub resolution_status: Option<String>,
    #[serde(flatten)]
    pub items: ItemCounts,
    pub companies_rescored: usize,
    pub last_analyzed_at: Option<String>,
}

impl AnalysisReport {
    fn skipped(thread_id: &str, mode: AnalysisMode) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            mode,
            skipped: true,
            messages_analyzed: 0,
            truncated: false,
            sentiment: None,
            sentiment_score: None,
            resolution_status: None,
            items: ItemCounts::default(),
            companies_rescored: 0,
            last_analyzed_at: None,
        }
    }
}

/// Next steps and feature requests written by one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemCounts {
    pub next_steps_created: usize,
    pub next_steps_skipped: usize,
    pub feature_requests_created: usize,
    pub feature_requests_skipped: usize,
}

/// Where extracted items came from.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ItemSource<'a> {
    pub thread_id: Option<&'a str>,
    pub meeting_id: Option<&'a str>,
    pub company_id: Option<&'a str>,
}

/// What the analyzer hands to the model.
struct PreparedThread {
    mode: AnalysisMode,
    prompt: String,
    messages: usize,
    truncated: bool,
}

/// Analyse one thread and store the results. Any failure marks the thread
/// `failed` before the error is returned.
pub async fn analyze_thread(
    db: &SharedDb,
    llm: &dyn LlmProvider,
    user_id: &str,
    thread_id: &str,
) -> Result<AnalysisReport, ProcessorError> {
    match run_analysis(db, llm, user_id, thread_id).await {
        Ok(report) => Ok(report),
        Err(e) => {
            log::error!("Error analyzing thread {}: {}", thread_id, e);
            if let Err(stage_err) = db.lock().set_thread_stage(thread_id, ProcessingStage::Failed) {
                log::error!("Could not mark thread {} failed: {}", thread_id, stage_err);
            }
            Err(e)
        }
    }
}

async fn run_analysis(
    db: &SharedDb,
    llm: &dyn LlmProvider,
    user_id: &str,
    thread_id: &str,
) -> Result<AnalysisReport, ProcessorError> {
    let prepared = prepare_thread(&db.lock(), user_id, thread_id)?;
    let prepared = match prepared {
        Ok(prepared) => prepared,
        Err(mode) => {
            log::info!("No new messages in thread {} since last analysis", thread_id);
            db.lock().set_thread_stage(thread_id, ProcessingStage::Completed)?;
            return Ok(AnalysisReport::skipped(thread_id, mode));
        }
    };

    log::info!(
        "Analyzing thread {} ({:?}, {} message(s)) with {}",
        thread_id,
        prepared.mode,
        prepared.messages,
        llm.name()
    );
    let raw = llm.complete_json(&prepared.prompt).await?;
    let analysis = parse_analysis(llm.name(), &raw)?;

    let db = db.lock();
    let analyzed_at = Utc::now().to_rfc3339();
    let items = db.with_transaction(|db| -> Result<ItemCounts, ProcessorError> {
        db.apply_thread_analysis(
            thread_id,
            &ThreadAnalysisUpdate {
                summary: analysis.summary(),
                sentiment: analysis.customer_sentiment.clone(),
                sentiment_score: analysis.sentiment_score,
                resolution_status: analysis.resolution_status.clone(),
                problem_statement: analysis.problem_statement.clone(),
                timeline_summary: analysis.timeline_summary.clone(),
                last_analyzed_at: analyzed_at.clone(),
            },
        )?;

        let company_ids = db.get_thread_company_ids(thread_id)?;
        let assignees: Vec<String> = db
            .list_thread_participants(thread_id)?
            .into_iter()
            .map(|c| c.customer_id)
            .collect();
        let counts = store_action_items(
            db,
            user_id,
            ItemSource {
                thread_id: Some(thread_id),
                meeting_id: None,
                company_id: company_ids.first().map(String::as_str),
            },
            &assignees,
            &analysis,
        )?;

        db.set_thread_stage(thread_id, ProcessingStage::Completed)?;
        Ok(counts)
    })?;

    let companies_rescored = crate::health::refresh_after_thread_analysis(&db, user_id, thread_id);

    log::info!(
        "Analyzed thread {}: {} next step(s), {} feature request(s)",
        thread_id,
        items.next_steps_created,
        items.feature_requests_created
    );
    Ok(AnalysisReport {
        thread_id: thread_id.to_string(),
        mode: prepared.mode,
        skipped: false,
        messages_analyzed: prepared.messages,
        truncated: prepared.truncated,
        sentiment: analysis.customer_sentiment,
        sentiment_score: analysis.sentiment_score,
        resolution_status: analysis.resolution_status,
        items,
        companies_rescored,
        last_analyzed_at: Some(analyzed_at),
    })
}

/// Load the thread and build the prompt. The inner `Err` carries the mode
/// when an incremental pass has nothing new to read.
fn prepare_thread(
    db: &Db,
    user_id: &str,
    thread_id: &str,
) -> Result<Result<PreparedThread, AnalysisMode>, ProcessorError> {
    let thread = db
        .get_thread(user_id, thread_id)?
        .ok_or_else(|| ProcessorError::ThreadNotFound(thread_id.to_string()))?;
    let emails = db.list_thread_emails(thread_id)?;
    if emails.is_empty() {
        return Err(ProcessorError::NoMessages(thread_id.to_string()));
    }

    let (mode, emails) = match thread.last_analyzed_at.as_deref() {
        None => (AnalysisMode::Full, emails),
        Some(since) => (AnalysisMode::Incremental, messages_after(emails, since)),
    };
    if emails.is_empty() {
        return Ok(Err(mode));
    }

    let participants = db.list_thread_participants(thread_id)?;
    let lines = transcript_lines(&emails, &participants);
    let (lines, truncated) = truncate_smart(lines);
    let transcript = lines.join("\n\n");

    let prompt = match mode {
        AnalysisMode::Full => build_thread_prompt(&transcript),
        AnalysisMode::Incremental => {
            build_incremental_prompt(thread.summary.as_deref(), &transcript)
        }
    };
    Ok(Ok(PreparedThread {
        mode,
        prompt,
        messages: emails.len(),
        truncated,
    }))
}

/// Messages sent after `since`. Messages whose date is missing or
/// unreadable are kept.
fn messages_after(emails: Vec<DbEmail>, since: &str) -> Vec<DbEmail> {
    let Some(since) = parse_timestamp(since) else {
        log::warn!("Unreadable last_analyzed_at '{}', analysing every message", since);
        return emails;
    };
    emails
        .into_iter()
        .filter(|email| match email.sent_date.as_deref().and_then(parse_timestamp) {
            Some(sent) => sent > since,
            None => {
                log::warn!(
                    "Message {} has no usable date, including it",
                    email.message_id
                );
                true
            }
        })
        .collect()
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

/// Plain text of a message: the text part, else the HTML part rendered.
pub(crate) fn message_text(email: &DbEmail) -> Option<String> {
    if let Some(text) = email.body_text.as_deref().filter(|t| !t.trim().is_empty()) {
        return Some(text.trim().to_string());
    }
    let html = email.body_html.as_deref().filter(|h| !h.trim().is_empty())?;
    match html2text::from_read(html.as_bytes(), 100) {
        Ok(text) => Some(text.trim().to_string()).filter(|t| !t.is_empty()),
        Err(e) => {
            log::warn!("Could not render HTML body of {}: {}", email.message_id, e);
            None
        }
    }
}

/// `"Name (Company): body"` per message with a body.
fn transcript_lines(emails: &[DbEmail], participants: &[DbCustomer]) -> Vec<String> {
    let by_id: HashMap<&str, &DbCustomer> = participants
        .iter()
        .map(|c| (c.customer_id.as_str(), c))
        .collect();

    emails
        .iter()
        .filter_map(|email| {
            let body = message_text(email)?;
            let customer = email.customer_id.as_deref().and_then(|id| by_id.get(id));
            let (name, company) = match customer {
                Some(c) => (
                    c.full_name
                        .clone()
                        .filter(|n| !n.trim().is_empty())
                        .unwrap_or_else(|| extract_local_part_from_email(&c.email)),
                    c.company_name
                        .clone()
                        .unwrap_or_else(|| UNKNOWN_COMPANY.to_string()),
                ),
                None => (
                    email
                        .from_address
                        .as_deref()
                        .map(display_name_from_address)
                        .unwrap_or_else(|| "Unknown".to_string()),
                    UNKNOWN_COMPANY.to_string(),
                ),
            };
            Some(format!("{} ({}): {}", name, company, body))
        })
        .collect()
}

/// Rough token count: four characters per token.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Keep the first and last fifth of an oversized conversation, with a marker
/// where the middle was.
pub fn truncate_smart(lines: Vec<String>) -> (Vec<String>, bool) {
    let tokens: usize = lines.iter().map(|l| estimate_tokens(l)).sum();
    if tokens <= MAX_TRANSCRIPT_TOKENS {
        return (lines, false);
    }
    let keep = (lines.len() / 5).max(1);
    if keep * 2 >= lines.len() {
        return (lines, false);
    }
    log::info!(
        "Transcript exceeds {} tokens ({}), keeping first and last {} message(s)",
        MAX_TRANSCRIPT_TOKENS,
        tokens,
        keep
    );
    let tail_start = lines.len() - keep;
    let mut kept = Vec::with_capacity(keep * 2 + 1);
    kept.extend_from_slice(&lines[..keep]);
    kept.push(TRUNCATION_MARKER.to_string());
    kept.extend_from_slice(&lines[tail_start..]);
    (kept, true)
}

/// `YYYY-MM-DD` or nothing.
fn parse_due_date(value: Option<&str>) -> Option<String> {
    let raw = value.map(str::trim).filter(|v| !v.is_empty())?;
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date.format("%Y-%m-%d").to_string()),
        Err(_) => {
            log::warn!("Invalid due_date format '{}', dropping it", raw);
            None
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

/// Duplicate-detection key. Folds full Unicode case, unlike SQLite `LOWER()`.
fn dedupe_key(text: &str) -> String {
    text.trim().to_lowercase()
}

/// Insert next steps and feature requests that are not already recorded for
/// the same thread or meeting (case-insensitive). New next steps are assigned
/// to every customer in `assignees`.
pub(crate) fn store_action_items(
    db: &Db,
    user_id: &str,
    source: ItemSource<'_>,
    assignees: &[String],
    analysis: &ThreadAnalysis,
) -> Result<ItemCounts, ProcessorError> {
    let mut counts = ItemCounts::default();

    let mut seen_steps: HashSet<String> = db
        .existing_next_step_descriptions(source.thread_id, source.meeting_id)?
        .iter()
        .map(|d| dedupe_key(d))
        .collect();
    for step in &analysis.next_steps {
        let description = step.text.trim();
        if description.is_empty() {
            continue;
        }
        if !seen_steps.insert(dedupe_key(description)) {
            log::info!("Skipping duplicate next step: {}", description);
            counts.next_steps_skipped += 1;
            continue;
        }
        let created = db.create_next_step(
            user_id,
            &NewNextStep {
                description: description.to_string(),
                company_id: source.company_id.map(str::to_string),
                thread_id: source.thread_id.map(str::to_string),
                meeting_id: source.meeting_id.map(str::to_string),
                owner: non_blank(step.owner.as_deref()),
                due_date: parse_due_date(step.due_date.as_deref()),
            },
        )?;
        for customer_id in assignees {
            db.assign_next_step(&created.step_id, customer_id)?;
        }
        counts.next_steps_created += 1;
    }

    let mut seen_titles: HashSet<String> = db
        .existing_feature_request_titles(source.thread_id, source.meeting_id)?
        .iter()
        .map(|t| dedupe_key(t))
        .collect();
    for request in &analysis.feature_requests {
        let title = request.title.trim();
        if title.is_empty() {
            continue;
        }
        if !seen_titles.insert(dedupe_key(title)) {
            log::info!("Skipping duplicate feature request: {}", title);
            counts.feature_requests_skipped += 1;
            continue;
        }
        db.create_feature_request(
            user_id,
            &NewFeatureRequest {
                company_id: source.company_id.map(str::to_string),
                thread_id: source.thread_id.map(str::to_string),
                meeting_id: source.meeting_id.map(str::to_string),
                title: title.to_string(),
                customer_description: non_blank(request.customer_description.as_deref()),
                use_case: non_blank(request.use_case.as_deref()),
                urgency: Urgency::normalize(request.urgency.as_deref()),
                urgency_signals: non_blank(request.urgency_signals.as_deref()),
                customer_impact: non_blank(request.customer_impact.as_deref()),
            },
        )?;
        counts.feature_requests_created += 1;
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::emails::EmailInsert;
    use crate::db::test_utils::{test_db, TEST_USER};
    use crate::db::threads::ThreadUpsert;
    use crate::db::{shared, NewCompany, NewCustomer};
    use crate::intelligence::mock::MockProvider;
    use crate::intelligence::{AnalyzedFeatureRequest, AnalyzedNextStep};
    use crate::types::FeatureRequestStatus;

    const FIRST_ANSWER: &str = r#"{
        "problem_statement": "CSV export times out for large accounts",
        "timeline_summary": "Dana reported export timeouts; Casey escalated to engineering.",
        "resolution_status": "In Progress",
        "customer_sentiment": "Negative",
        "sentiment_score": -1,
        "next_steps": [
            {"text": "Escalate export timeout to engineering", "owner": "Casey", "due_date": "2026-02-10"},
            {"text": "Send Dana a workaround", "owner": null, "due_date": "next week"}
        ],
        "feature_requests": [
            {"title": "Async CSV Export", "urgency": "HIGH", "use_case": "Large reports"}
        ]
    }"#;

    fn seed(db: &Db) -> (String, String) {
        let company = db
            .create_company(
                TEST_USER,
                &NewCompany {
                    company_name: "Acme".into(),
                    domain_name: Some("acme.io".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let dana = db
            .create_customer(
                TEST_USER,
                &NewCustomer {
                    email: "dana@acme.io".into(),
                    full_name: Some("Dana Scully".into()),
                    company_id: Some(company.company_id.clone()),
                    ..Default::default()
                },
            )
            .unwrap();
        db.upsert_thread(
            TEST_USER,
            &ThreadUpsert {
                thread_id: "t-1".into(),
                subject: Some("Export timeouts".into()),
                ..Default::default()
            },
        )
        .unwrap();
        add_message(db, "m-1", Some("2026-02-01T10:00:00+00:00"), "The CSV export times out.");
        db.set_email_customer("m-1", &dana.customer_id).unwrap();
        add_message(db, "m-2", Some("2026-02-01T12:00:00+00:00"), "Escalating now.");
        db.add_thread_participant(TEST_USER, "t-1", &dana.customer_id).unwrap();
        db.add_thread_company_link(TEST_USER, "t-1", &company.company_id).unwrap();
        (company.company_id, dana.customer_id)
    }

    fn add_message(db: &Db, id: &str, sent: Option<&str>, body: &str) {
        let from = if id == "m-2" { "Casey <me@ourco.com>" } else { "Dana <dana@acme.io>" };
        db.insert_email(
            TEST_USER,
            &EmailInsert {
                message_id: id.to_string(),
                thread_id: "t-1".into(),
                from_address: Some(from.to_string()),
                body_text: Some(body.to_string()),
                sent_date: sent.map(str::to_string),
                ..Default::default()
            },
        )
        .unwrap();
    }

    #[tokio::test]
    async fn test_full_analysis_stores_everything() {
        let db = test_db();
        let (company_id, dana_id) = seed(&db);
        let db = shared(db);
        let llm = MockProvider::with_responses(&[FIRST_ANSWER]);

        let report = analyze_thread(&db, &llm, TEST_USER, "t-1").await.unwrap();
        assert_eq!(report.mode, AnalysisMode::Full);
        assert_eq!(report.messages_analyzed, 2);
        assert_eq!(report.items.next_steps_created, 2);
        assert_eq!(report.items.feature_requests_created, 1);
        assert_eq!(report.companies_rescored, 1);

        let prompt = llm.prompts.lock()[0].clone();
        assert!(prompt.contains("Dana Scully (Acme): The CSV export times out."));
        assert!(prompt.contains("Casey (Unknown Company): Escalating now."));

        let guard = db.lock();
        let thread = guard.get_thread(TEST_USER, "t-1").unwrap().unwrap();
        assert_eq!(
            thread.summary.as_deref(),
            Some("Dana reported export timeouts; Casey escalated to engineering.")
        );
        assert_eq!(thread.sentiment_score, Some(-1));
        assert_eq!(thread.processing_stage.as_deref(), Some("completed"));
        assert!(thread.last_analyzed_at.is_some());

        let steps = guard.list_company_next_steps(TEST_USER, &company_id).unwrap();
        assert_eq!(steps.len(), 2);
        let escalate = steps
            .iter()
            .find(|s| s.description.starts_with("Escalate"))
            .unwrap();
        assert_eq!(escalate.due_date.as_deref(), Some("2026-02-10"));
        assert_eq!(escalate.assignee_ids, vec![dana_id.clone()]);
        let workaround = steps.iter().find(|s| s.description.starts_with("Send")).unwrap();
        assert!(workaround.due_date.is_none());
        assert!(workaround.owner.is_none());

        let requests = guard.list_company_feature_requests(TEST_USER, &company_id).unwrap();
        assert_eq!(requests[0].urgency, Urgency::High);
        assert_eq!(requests[0].status, FeatureRequestStatus::New);

        let company = guard.get_company(TEST_USER, &company_id).unwrap().unwrap();
        assert_eq!(company.health_score, Some(25));
        let dana = guard.get_customer(TEST_USER, &dana_id).unwrap().unwrap();
        assert_eq!(dana.sentiment.as_deref(), Some("Negative"));
    }

    #[tokio::test]
    async fn test_incremental_without_new_messages_is_skipped() {
        let db = test_db();
        seed(&db);
        let db = shared(db);
        let llm = MockProvider::with_responses(&[FIRST_ANSWER]);
        analyze_thread(&db, &llm, TEST_USER, "t-1").await.unwrap();

        let report = analyze_thread(&db, &llm, TEST_USER, "t-1").await.unwrap();
        assert_eq!(report.mode, AnalysisMode::Incremental);
        assert!(report.skipped);
        assert_eq!(llm.prompt_count(), 1);
        assert_eq!(
            db.lock().get_thread_stage("t-1").unwrap().as_deref(),
            Some("completed")
        );
    }

    #[tokio::test]
    async fn test_incremental_sends_only_new_messages_and_dedupes() {
        let db = test_db();
        let (company_id, _) = seed(&db);
        let db = shared(db);
        let second = r#"{
            "timeline_summary": "Engineering shipped a fix; Dana confirmed.",
            "customer_sentiment": "Positive",
            "sentiment_score": 1,
            "next_steps": [
                {"text": "  escalate export timeout to ENGINEERING "},
                {"text": "Schedule a follow-up review"}
            ],
            "feature_requests": [{"title": "async csv export"}]
        }"#;
        let llm = MockProvider::with_responses(&[FIRST_ANSWER, second]);
        analyze_thread(&db, &llm, TEST_USER, "t-1").await.unwrap();

        // One message after the analysis, one without a date.
        add_message(&db.lock(), "m-3", Some("2999-01-01T00:00:00Z"), "Fix confirmed, thanks!");
        add_message(&db.lock(), "m-4", None, "Undated reply");

        let report = analyze_thread(&db, &llm, TEST_USER, "t-1").await.unwrap();
        assert_eq!(report.mode, AnalysisMode::Incremental);
        assert_eq!(report.messages_analyzed, 2);
        assert_eq!(report.items.next_steps_created, 1);
        assert_eq!(report.items.next_steps_skipped, 1);
        assert_eq!(report.items.feature_requests_skipped, 1);

        let prompt = llm.prompts.lock()[1].clone();
        assert!(prompt.contains("Summary so far:\nDana reported export timeouts"));
        assert!(prompt.contains("Fix confirmed, thanks!"));
        assert!(prompt.contains("Undated reply"));
        assert!(!prompt.contains("The CSV export times out."));

        let guard = db.lock();
        assert_eq!(guard.list_company_next_steps(TEST_USER, &company_id).unwrap().len(), 3);
        assert_eq!(guard.list_company_feature_requests(TEST_USER, &company_id).unwrap().len(), 1);
        assert_eq!(
            guard.get_thread(TEST_USER, "t-1").unwrap().unwrap().sentiment_score,
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_llm_failure_marks_thread_failed() {
        let db = test_db();
        seed(&db);
        let db = shared(db);
        let llm = MockProvider::failing("quota exceeded");

        let err = analyze_thread(&db, &llm, TEST_USER, "t-1").await.unwrap_err();
        assert!(matches!(err, ProcessorError::Llm(_)));
        assert_eq!(db.lock().get_thread_stage("t-1").unwrap().as_deref(), Some("failed"));
    }

    #[tokio::test]
    async fn test_thread_without_messages_fails() {
        let db = test_db();
        db.upsert_thread(
            TEST_USER,
            &ThreadUpsert {
                thread_id: "t-empty".into(),
                ..Default::default()
            },
        )
        .unwrap();
        let db = shared(db);
        let llm = MockProvider::with_responses(&[]);

        let err = analyze_thread(&db, &llm, TEST_USER, "t-empty").await.unwrap_err();
        assert!(matches!(err, ProcessorError::NoMessages(_)));
        assert_eq!(
            db.lock().get_thread_stage("t-empty").unwrap().as_deref(),
            Some("failed")
        );
    }

    #[test]
    fn test_store_action_items_folds_non_ascii_case() {
        let db = test_db();
        let (company_id, _) = seed(&db);
        let analysis = ThreadAnalysis {
            next_steps: vec![AnalyzedNextStep {
                text: "Équipe review".into(),
                ..Default::default()
            }],
            feature_requests: vec![AnalyzedFeatureRequest {
                title: "Échéancier export".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let source = ItemSource {
            thread_id: Some("t-1"),
            meeting_id: None,
            company_id: Some(company_id.as_str()),
        };

        let first = store_action_items(&db, TEST_USER, source, &[], &analysis).unwrap();
        assert_eq!(first.next_steps_created, 1);
        assert_eq!(first.feature_requests_created, 1);

        let shouted = ThreadAnalysis {
            next_steps: vec![AnalyzedNextStep {
                text: " ÉQUIPE REVIEW ".into(),
                ..Default::default()
            }],
            feature_requests: vec![AnalyzedFeatureRequest {
                title: "échéancier EXPORT".into(),
                ..Default::default()
            }],
            ..Default::default()
        };
        for again in [&analysis, &shouted] {
            let counts = store_action_items(&db, TEST_USER, source, &[], again).unwrap();
            assert_eq!(counts.next_steps_created, 0);
            assert_eq!(counts.next_steps_skipped, 1);
            assert_eq!(counts.feature_requests_created, 0);
            assert_eq!(counts.feature_requests_skipped, 1);
        }
        assert_eq!(db.list_company_next_steps(TEST_USER, &company_id).unwrap().len(), 1);
        assert_eq!(db.list_company_feature_requests(TEST_USER, &company_id).unwrap().len(), 1);
    }

    #[test]
    fn test_truncate_smart() {
        let small = vec!["short".to_string(); 10];
        assert_eq!(truncate_smart(small.clone()), (small, false));

        let big_line = "x".repeat(50_000);
        let lines: Vec<String> = (0..10).map(|i| format!("{i}{big_line}")).collect();
        let (kept, truncated) = truncate_smart(lines);
        assert!(truncated);
        assert_eq!(kept.len(), 5);
        assert!(kept[0].starts_with('0'));
        assert!(kept[1].starts_with('1'));
        assert_eq!(kept[2], TRUNCATION_MARKER);
        assert!(kept[3].starts_with('8'));
        assert!(kept[4].starts_with('9'));
    }

    #[test]
    fn test_html_body_is_rendered() {
        let email = DbEmail {
            message_id: "m".into(),
            thread_id: "t".into(),
            user_id: TEST_USER.into(),
            from_address: None,
            to_addresses: "[]".into(),
            cc_addresses: "[]".into(),
            subject: None,
            snippet: None,
            body_text: Some("   ".into()),
            body_html: Some("<p>Hello <b>there</b></p>".into()),
            sent_date: None,
            customer_id: None,
            summary: None,
            created_at: "2026-01-01T00:00:00+00:00".into(),
        };
        let text = message_text(&email).unwrap();
        assert!(text.contains("Hello"));
        assert!(!text.contains("<p>"));
    }

    #[test]
    fn test_parse_due_date() {
        assert_eq!(parse_due_date(Some("2026-03-01")).as_deref(), Some("2026-03-01"));
        assert_eq!(parse_due_date(Some("03/01/2026")), None);
        assert_eq!(parse_due_date(None), None);
    }
}
