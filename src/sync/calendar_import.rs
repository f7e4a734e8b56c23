//! Calendar events with external attendees -> `meetings` rows.

use std::collections::HashSet;

use chrono::{Duration, Utc};

use super::{SyncContext, SyncError};
use crate::db::{Db, DbError, MeetingUpsert};
use crate::google_api::calendar::CalendarEvent;
use crate::processor::addresses::{
    company_name_from_domain, extract_domain_from_email, is_business_domain,
};

/// Who counts as internal for one user.
pub(crate) struct AttendeeFilter {
    pub user_email: Option<String>,
    pub user_domain: Option<String>,
    pub blocklist: HashSet<String>,
}

impl AttendeeFilter {
    pub(crate) fn load(db: &Db, user_id: &str) -> Result<Self, DbError> {
        let user_email = db.get_user_email(user_id)?;
        let user_domain = user_email
            .as_deref()
            .map(extract_domain_from_email)
            .filter(|d| !d.is_empty());
        Ok(Self {
            user_email,
            user_domain,
            blocklist: db.blocked_domain_set(user_id)?,
        })
    }

    /// Attendee addresses outside the user's domain and the blocklist.
    pub(crate) fn external_attendees<'a>(&self, event: &'a CalendarEvent) -> Vec<&'a str> {
        event
            .attendees
            .iter()
            .map(String::as_str)
            .filter(|email| self.user_email.as_deref() != Some(*email))
            .filter(|email| {
                let domain = extract_domain_from_email(email);
                !domain.is_empty()
                    && self.user_domain.as_deref() != Some(domain.as_str())
                    && !self.blocklist.contains(&domain)
            })
            .collect()
    }
}

/// Import every configured calendar. Returns the number of meetings stored.
pub async fn import_calendar(
    ctx: &SyncContext,
    user_id: &str,
    access_token: &str,
) -> Result<usize, SyncError> {
    let now = Utc::now();
    let time_min = now - Duration::days(ctx.google_config.calendar_past_days.max(0));
    let time_max = now + Duration::days(ctx.google_config.calendar_future_days.max(0));
    let filter = AttendeeFilter::load(&ctx.db.lock(), user_id)?;

    let mut stored = 0;
    for calendar_id in &ctx.google_config.calendar_ids {
        let events = ctx
            .google
            .fetch_events(access_token, calendar_id, time_min, time_max)
            .await?;
        let total = events.len();
        let mut kept = 0;
        for event in &events {
            let external = filter.external_attendees(event);
            if external.is_empty() {
                continue;
            }
            kept += 1;
            store_meeting(&ctx.db.lock(), user_id, &filter, event, &external)?;
        }
        log::info!(
            "Calendar {} for {}: {} of {} event(s) have external attendees",
            calendar_id,
            user_id,
            kept,
            total
        );
        stored += kept;
    }
    Ok(stored)
}

/// Upsert one meeting, linking it to the company of its first external
/// business domain and to the first attendee who is a known customer.
pub(crate) fn store_meeting(
    db: &Db,
    user_id: &str,
    filter: &AttendeeFilter,
    event: &CalendarEvent,
    external: &[&str],
) -> Result<String, DbError> {
    db.with_transaction(|db| -> Result<String, DbError> {
        let company_id = match external
            .iter()
            .map(|email| extract_domain_from_email(email))
            .find(|domain| is_business_domain(domain, &filter.blocklist))
        {
            Some(domain) => {
                let (company, created) = db.find_or_create_company_for_domain(
                    user_id,
                    &domain,
                    &company_name_from_domain(&domain),
                )?;
                if created {
                    log::info!("Created company {} for meeting domain {}", company.company_id, domain);
                }
                Some(company.company_id)
            }
            None => None,
        };

        let mut customer_id = None;
        for email in external {
            if let Some(customer) = db.find_customer_by_email(user_id, email)? {
                customer_id = Some(customer.customer_id);
                break;
            }
        }

        db.upsert_meeting(
            user_id,
            &MeetingUpsert {
                google_event_id: event.id.clone(),
                calendar_id: event.calendar_id.clone(),
                title: event.summary.clone(),
                description: event.description.clone(),
                location: event.location.clone(),
                meeting_url: event.meeting_url.clone(),
                start_time: event.start.clone(),
                end_time: event.end.clone(),
                attendees: event.attendees.clone(),
                organizer: event.organizer.clone(),
                company_id,
                customer_id,
            },
        )
    })
}
