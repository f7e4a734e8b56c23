//! LLM analysis of a recorded meeting transcript.

use chrono::Utc;

use super::analyzer::{store_action_items, ItemCounts, ItemSource};
use super::ProcessorError;
use crate::db::SharedDb;
use crate::intelligence::prompts::build_meeting_prompt;
use crate::intelligence::{parse_analysis, LlmProvider};

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingAnalysisReport {
    pub meeting_id: String,
    pub sentiment: Option<String>,
    pub sentiment_score: Option<i64>,
    #[serde(flatten)]
    pub items: ItemCounts,
    pub health_score: Option<i64>,
}

/// Analyse a meeting's stored transcript and record summary, sentiment and
/// action items sourced from the meeting.
pub async fn analyze_meeting(
    db: &SharedDb,
    llm: &dyn LlmProvider,
    user_id: &str,
    meeting_id: &str,
) -> Result<MeetingAnalysisReport, ProcessorError> {
    let meeting = db
        .lock()
        .get_meeting(user_id, meeting_id)?
        .ok_or_else(|| ProcessorError::MeetingNotFound(meeting_id.to_string()))?;
    let transcript = meeting
        .transcript
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ProcessorError::NoTranscript(meeting_id.to_string()))?;

    log::info!("Analyzing meeting {} ({}) with {}", meeting_id, meeting.title, llm.name());
    let raw = llm
        .complete_json(&build_meeting_prompt(&meeting.title, transcript))
        .await?;
    let analysis = parse_analysis(llm.name(), &raw)?;

    let db = db.lock();
    let analyzed_at = Utc::now().to_rfc3339();
    let summary = analysis.summary();
    let assignees: Vec<String> = meeting.customer_id.iter().cloned().collect();
    let items = db.with_transaction(|db| -> Result<ItemCounts, ProcessorError> {
        db.apply_meeting_analysis(
            meeting_id,
            summary.as_deref(),
            analysis.customer_sentiment.as_deref(),
            analysis.sentiment_score,
            &analyzed_at,
        )?;
        store_action_items(
            db,
            user_id,
            ItemSource {
                thread_id: None,
                meeting_id: Some(meeting_id),
                company_id: meeting.company_id.as_deref(),
            },
            &assignees,
            &analysis,
        )
    })?;

    let health_score = match meeting.company_id.as_deref() {
        Some(company_id) => match crate::health::recalculate_company_health(&db, user_id, company_id) {
            Ok(score) => score,
            Err(e) => {
                log::warn!("Failed to update health for company {}: {}", company_id, e);
                None
            }
        },
        None => None,
    };

    Ok(MeetingAnalysisReport {
        meeting_id: meeting_id.to_string(),
        sentiment: analysis.customer_sentiment,
        sentiment_score: analysis.sentiment_score,
        items,
        health_score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{test_db, TEST_USER};
    use crate::db::{shared, MeetingUpsert, NewCompany};
    use crate::intelligence::mock::MockProvider;

    fn seed_meeting(transcript: Option<&str>) -> (SharedDb, String, String) {
        let db = test_db();
        let company = db
            .create_company(
                TEST_USER,
                &NewCompany {
                    company_name: "Globex".into(),
                    domain_name: Some("globex.com".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        let meeting_id = db
            .upsert_meeting(
                TEST_USER,
                &MeetingUpsert {
                    google_event_id: "evt-1".into(),
                    calendar_id: "primary".into(),
                    title: "Quarterly review".into(),
                    start_time: "2026-03-01T15:00:00+00:00".into(),
                    company_id: Some(company.company_id.clone()),
                    ..Default::default()
                },
            )
            .unwrap();
        if let Some(t) = transcript {
            db.set_meeting_transcript(&meeting_id, t).unwrap();
        }
        (shared(db), company.company_id, meeting_id)
    }

    #[tokio::test]
    async fn test_meeting_analysis_sources_items_from_meeting() {
        let (db, company_id, meeting_id) =
            seed_meeting(Some("Hank: We love the new dashboards.\nCasey: Great to hear."));
        let llm = MockProvider::with_responses(&[r#"{
            "timeline_summary": "Positive QBR, dashboards well received.",
            "customer_sentiment": "Very Positive",
            "sentiment_score": 2,
            "next_steps": [{"text": "Share roadmap deck"}],
            "feature_requests": [{"title": "Dashboard sharing", "urgency": "medium"}]
        }"#]);

        let report = analyze_meeting(&db, &llm, TEST_USER, &meeting_id).await.unwrap();
        assert_eq!(report.items.next_steps_created, 1);
        assert_eq!(report.items.feature_requests_created, 1);
        assert_eq!(report.health_score, Some(100));
        assert!(llm.prompts.lock()[0].contains("Quarterly review"));

        let guard = db.lock();
        let meeting = guard.get_meeting(TEST_USER, &meeting_id).unwrap().unwrap();
        assert_eq!(meeting.summary.as_deref(), Some("Positive QBR, dashboards well received."));
        assert_eq!(meeting.sentiment_score, Some(2));
        let steps = guard.list_company_next_steps(TEST_USER, &company_id).unwrap();
        assert_eq!(steps[0].meeting_id.as_deref(), Some(meeting_id.as_str()));
        assert!(steps[0].thread_id.is_none());
    }

    #[tokio::test]
    async fn test_meeting_without_transcript_is_rejected() {
        let (db, _, meeting_id) = seed_meeting(None);
        let llm = MockProvider::with_responses(&[]);
        let err = analyze_meeting(&db, &llm, TEST_USER, &meeting_id).await.unwrap_err();
        assert!(matches!(err, ProcessorError::NoTranscript(_)));
        assert_eq!(llm.prompt_count(), 0);
    }
}
