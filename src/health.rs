//! Company health scores and customer sentiment.
//!
//! A company's health is the mean sentiment score (-2..=2) of the threads
//! linked to it and of its meetings, counting only items analysed in the
//! last 90 days, mapped onto 0..=100. No recent signal clears the score.

use chrono::{Duration, Utc};

use crate::db::{Db, DbError};

/// Only analyses newer than this feed the score.
pub const HEALTH_WINDOW_DAYS: i64 = 90;

/// Map a mean sentiment in [-2, 2] onto [0, 100].
pub fn sentiment_to_health(mean: f64) -> i64 {
    (((mean + 2.0) * 25.0).round() as i64).clamp(0, 100)
}

/// Recompute and store one company's health score.
pub fn recalculate_company_health(
    db: &Db,
    user_id: &str,
    company_id: &str,
) -> Result<Option<i64>, DbError> {
    let since = (Utc::now() - Duration::days(HEALTH_WINDOW_DAYS)).to_rfc3339();
    let scores = db.company_sentiment_scores(user_id, company_id, &since)?;
    let health = if scores.is_empty() {
        None
    } else {
        let mean = scores.iter().sum::<i64>() as f64 / scores.len() as f64;
        Some(sentiment_to_health(mean))
    };
    db.set_company_health(user_id, company_id, health)?;
    log::debug!(
        "Company {} health {:?} from {} signal(s)",
        company_id,
        health,
        scores.len()
    );
    Ok(health)
}

/// Copy the latest analysed thread sentiment onto the customer row.
pub fn refresh_customer_sentiment(db: &Db, customer_id: &str) -> Result<Option<String>, DbError> {
    let sentiment = db.latest_customer_thread_sentiment(customer_id)?;
    if sentiment.is_some() {
        db.set_customer_sentiment(customer_id, sentiment.as_deref())?;
    }
    Ok(sentiment)
}

/// Refresh health for every company linked to a thread and sentiment for
/// every participant. Failures are logged and skipped.
///
/// Returns the number of companies rescored.
pub fn refresh_after_thread_analysis(db: &Db, user_id: &str, thread_id: &str) -> usize {
    let company_ids = match db.get_thread_company_ids(thread_id) {
        Ok(ids) => ids,
        Err(e) => {
            log::warn!("Could not load companies for thread {}: {}", thread_id, e);
            return 0;
        }
    };
    if company_ids.is_empty() {
        log::info!("No companies linked to thread {}, skipping health update", thread_id);
    }

    let mut rescored = 0;
    for company_id in &company_ids {
        match recalculate_company_health(db, user_id, company_id) {
            Ok(_) => rescored += 1,
            Err(e) => log::warn!("Failed to update health for company {}: {}", company_id, e),
        }
    }

    match db.list_thread_participants(thread_id) {
        Ok(participants) => {
            for customer in participants {
                if let Err(e) = refresh_customer_sentiment(db, &customer.customer_id) {
                    log::warn!(
                        "Failed to refresh sentiment for customer {}: {}",
                        customer.customer_id,
                        e
                    );
                }
            }
        }
        Err(e) => log::warn!("Could not load participants for thread {}: {}", thread_id, e),
    }
    rescored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_utils::{test_db, TEST_USER};
    use crate::db::threads::ThreadUpsert;
    use crate::db::{MeetingUpsert, NewCompany, NewCustomer, ThreadAnalysisUpdate};

    fn analysed_thread(db: &Db, thread_id: &str, company_id: &str, score: i64, analyzed_at: &str) {
        db.upsert_thread(
            TEST_USER,
            &ThreadUpsert {
                thread_id: thread_id.to_string(),
                ..Default::default()
            },
        )
        .unwrap();
        db.add_thread_company_link(TEST_USER, thread_id, company_id).unwrap();
        db.apply_thread_analysis(
            thread_id,
            &ThreadAnalysisUpdate {
                sentiment: Some(if score >= 0 { "Positive" } else { "Negative" }.to_string()),
                sentiment_score: Some(score),
                last_analyzed_at: analyzed_at.to_string(),
                ..Default::default()
            },
        )
        .unwrap();
    }

    fn company(db: &Db) -> String {
        db.create_company(
            TEST_USER,
            &NewCompany {
                company_name: "Acme".into(),
                domain_name: Some("acme.io".into()),
                ..Default::default()
            },
        )
        .unwrap()
        .company_id
    }

    #[test]
    fn test_sentiment_to_health() {
        assert_eq!(sentiment_to_health(-2.0), 0);
        assert_eq!(sentiment_to_health(0.0), 50);
        assert_eq!(sentiment_to_health(2.0), 100);
        assert_eq!(sentiment_to_health(0.5), 63);
        assert_eq!(sentiment_to_health(5.0), 100);
    }

    #[test]
    fn test_health_averages_threads_and_meetings() {
        let db = test_db();
        let company_id = company(&db);
        let now = Utc::now().to_rfc3339();
        analysed_thread(&db, "t-1", &company_id, 2, &now);
        analysed_thread(&db, "t-2", &company_id, -1, &now);

        let meeting_id = db
            .upsert_meeting(
                TEST_USER,
                &MeetingUpsert {
                    google_event_id: "evt-1".into(),
                    calendar_id: "primary".into(),
                    title: "QBR".into(),
                    start_time: now.clone(),
                    company_id: Some(company_id.clone()),
                    ..Default::default()
                },
            )
            .unwrap();
        db.apply_meeting_analysis(&meeting_id, None, Some("Positive"), Some(1), &now)
            .unwrap();

        // mean of 2, -1, 1 = 0.667 -> 66.67 -> 67
        let health = recalculate_company_health(&db, TEST_USER, &company_id).unwrap();
        assert_eq!(health, Some(67));
        assert_eq!(
            db.get_company(TEST_USER, &company_id).unwrap().unwrap().health_score,
            Some(67)
        );
    }

    #[test]
    fn test_stale_signals_clear_the_score() {
        let db = test_db();
        let company_id = company(&db);
        let stale = (Utc::now() - Duration::days(HEALTH_WINDOW_DAYS + 5)).to_rfc3339();
        analysed_thread(&db, "t-old", &company_id, -2, &stale);
        db.set_company_health(TEST_USER, &company_id, Some(10)).unwrap();

        assert_eq!(recalculate_company_health(&db, TEST_USER, &company_id).unwrap(), None);
        assert_eq!(
            db.get_company(TEST_USER, &company_id).unwrap().unwrap().health_score,
            None
        );
    }

    #[test]
    fn test_refresh_after_thread_analysis_updates_customers() {
        let db = test_db();
        let company_id = company(&db);
        let customer = db
            .create_customer(
                TEST_USER,
                &NewCustomer {
                    email: "dana@acme.io".into(),
                    company_id: Some(company_id.clone()),
                    ..Default::default()
                },
            )
            .unwrap();
        analysed_thread(&db, "t-1", &company_id, -1, &Utc::now().to_rfc3339());
        db.add_thread_participant(TEST_USER, "t-1", &customer.customer_id).unwrap();

        assert_eq!(refresh_after_thread_analysis(&db, TEST_USER, "t-1"), 1);
        let customer = db.get_customer(TEST_USER, &customer.customer_id).unwrap().unwrap();
        assert_eq!(customer.sentiment.as_deref(), Some("Negative"));
        assert_eq!(
            db.get_company(TEST_USER, &company_id).unwrap().unwrap().health_score,
            Some(25)
        );
    }
}
