//! Entity resolution: thread participants → customers and companies.
//!
//! For each thread the resolver collects every From/To/Cc address, drops the
//! user's own address, finds or creates a customer per address and a
//! company per business domain, then links both to the thread. Resolved
//! threads move to `queued` and are handed to the analysis queue.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;

use super::addresses::{
    company_name_from_domain, extract_domain_from_email, extract_email_from_address,
    extract_emails_from_json, extract_local_part_from_email, is_business_domain,
};
use super::{AnalysisQueue, ProcessorError};
use crate::db::{Db, DbCustomer, DbError, NewCustomer, SharedDb};
use crate::types::{CustomerStatus, ProcessingStage};

/// Outcome of one resolution pass.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionReport {
    pub processed_threads: usize,
    pub customers_created: usize,
    pub customers_found: usize,
    pub companies_created: usize,
    pub participants_linked: usize,
    pub company_links_created: usize,
    pub jobs_queued: usize,
    /// thread_id → why it was not processed.
    pub skipped_threads: BTreeMap<String, String>,
    pub errors: Vec<String>,
}

impl ResolutionReport {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Per-user context shared by every thread in a pass.
struct UserContext {
    user_id: String,
    user_email: Option<String>,
    user_domain: Option<String>,
    blocklist: HashSet<String>,
}

/// Whether a thread in `stage` should be resolved, or why not.
fn stage_gate(thread_id: &str, stage: Option<&str>) -> Result<(), String> {
    let Some(raw) = stage else {
        return Ok(());
    };
    match ProcessingStage::parse(raw) {
        Some(ProcessingStage::Analyzing) | Some(ProcessingStage::Queued) => {
            Err(format!("already in '{}' stage", raw))
        }
        Some(ProcessingStage::Completed) => Err("already completed".to_string()),
        Some(_) => Ok(()),
        None => {
            log::warn!(
                "Thread {} has unknown stage '{}', processing anyway",
                thread_id,
                raw
            );
            Ok(())
        }
    }
}

/// Resolve participants for `thread_ids` and queue the threads for analysis.
///
/// Per-thread failures are collected in the report and mark that thread
/// `failed`; the remaining threads still run.
pub fn resolve_thread_entities(
    db: &SharedDb,
    queue: &AnalysisQueue,
    user_id: &str,
    thread_ids: &[String],
) -> ResolutionReport {
    let mut report = ResolutionReport::default();
    if thread_ids.is_empty() {
        log::warn!("resolve_thread_entities called with no thread ids");
        return report;
    }

    let ctx = match load_user_context(&db.lock(), user_id) {
        Ok(ctx) => ctx,
        Err(e) => {
            report.errors.push(format!("Failed to load user context: {}", e));
            return report;
        }
    };

    for thread_id in thread_ids {
        let outcome = {
            let guard = db.lock();
            resolve_one(&guard, &ctx, thread_id, &mut report)
        };

        match outcome {
            Ok(false) => {}
            Ok(true) => {
                report.processed_threads += 1;
                match queue.enqueue(user_id, thread_id) {
                    Ok(()) => report.jobs_queued += 1,
                    Err(e) => {
                        // Back to pending so the next sync picks it up again.
                        mark_stage(db, thread_id, ProcessingStage::Pending);
                        report
                            .errors
                            .push(format!("Could not queue thread {}: {}", thread_id, e));
                    }
                }
            }
            Err(e) => {
                log::error!("Entity resolution failed for thread {}: {}", thread_id, e);
                mark_stage(db, thread_id, ProcessingStage::Failed);
                report
                    .errors
                    .push(format!("Thread {}: {}", thread_id, e));
            }
        }
    }

    log::info!(
        "Resolved {} thread(s) for {}: {} customers created, {} found, {} companies created, {} skipped",
        report.processed_threads,
        user_id,
        report.customers_created,
        report.customers_found,
        report.companies_created,
        report.skipped_threads.len()
    );
    report
}

fn mark_stage(db: &SharedDb, thread_id: &str, stage: ProcessingStage) {
    if let Err(e) = db.lock().set_thread_stage(thread_id, stage) {
        log::error!("Could not move thread {} to {}: {}", thread_id, stage.as_str(), e);
    }
}

fn load_user_context(db: &Db, user_id: &str) -> Result<UserContext, DbError> {
    let user_email = db.get_user_email(user_id)?;
    if user_email.is_none() {
        log::warn!(
            "No profile email for {}; the user's own address will not be filtered",
            user_id
        );
    }
    let user_domain = user_email
        .as_deref()
        .map(extract_domain_from_email)
        .filter(|d| !d.is_empty());
    Ok(UserContext {
        user_id: user_id.to_string(),
        user_email,
        user_domain,
        blocklist: db.blocked_domain_set(user_id)?,
    })
}

/// Resolve one thread. Returns `Ok(false)` when the thread was skipped.
fn resolve_one(
    db: &Db,
    ctx: &UserContext,
    thread_id: &str,
    report: &mut ResolutionReport,
) -> Result<bool, ProcessorError> {
    if db.get_thread(&ctx.user_id, thread_id)?.is_none() {
        report
            .skipped_threads
            .insert(thread_id.to_string(), "thread not found".to_string());
        return Ok(false);
    }

    let stage = db.get_thread_stage(thread_id)?;
    if let Err(reason) = stage_gate(thread_id, stage.as_deref()) {
        log::info!("Skipping thread {}: {}", thread_id, reason);
        report.skipped_threads.insert(thread_id.to_string(), reason);
        return Ok(false);
    }

    db.set_thread_stage(thread_id, ProcessingStage::ResolvingEntities)?;

    db.with_transaction(|db| -> Result<(), ProcessorError> {
        let emails = db.list_thread_emails(thread_id)?;

        let mut addresses = BTreeSet::new();
        for email in &emails {
            if let Some(from) = email.from_address.as_deref().and_then(extract_email_from_address) {
                addresses.insert(from);
            }
            addresses.extend(extract_emails_from_json(&email.to_addresses));
            addresses.extend(extract_emails_from_json(&email.cc_addresses));
        }
        if let Some(own) = &ctx.user_email {
            addresses.remove(own);
        }

        let mut customer_by_address: HashMap<String, String> = HashMap::new();
        for address in &addresses {
            let customer = find_or_create_customer(db, ctx, address, report)?;
            if db.add_thread_participant(&ctx.user_id, thread_id, &customer.customer_id)? {
                report.participants_linked += 1;
            }
            if let Some(company_id) = &customer.company_id {
                if db.add_thread_company_link(&ctx.user_id, thread_id, company_id)? {
                    report.company_links_created += 1;
                }
            }
            customer_by_address.insert(address.clone(), customer.customer_id);
        }

        for email in emails.iter().filter(|e| e.customer_id.is_none()) {
            let sender = email.from_address.as_deref().and_then(extract_email_from_address);
            if let Some(customer_id) = sender.and_then(|s| customer_by_address.get(&s)) {
                db.set_email_customer(&email.message_id, customer_id)?;
            }
        }

        db.set_thread_stage(thread_id, ProcessingStage::Queued)?;
        Ok(())
    })?;

    Ok(true)
}

/// Domain that may own a company for this user.
fn company_domain(ctx: &UserContext, address: &str) -> Option<String> {
    let domain = extract_domain_from_email(address);
    if ctx.user_domain.as_deref() == Some(domain.as_str()) {
        return None;
    }
    is_business_domain(&domain, &ctx.blocklist).then_some(domain)
}

fn company_for_domain(
    db: &Db,
    ctx: &UserContext,
    domain: &str,
    report: &mut ResolutionReport,
) -> Result<String, DbError> {
    let (company, created) = db.find_or_create_company_for_domain(
        &ctx.user_id,
        domain,
        &company_name_from_domain(domain),
    )?;
    if created {
        log::info!("Created company {} for domain {}", company.company_id, domain);
        report.companies_created += 1;
    }
    Ok(company.company_id)
}

fn find_or_create_customer(
    db: &Db,
    ctx: &UserContext,
    address: &str,
    report: &mut ResolutionReport,
) -> Result<DbCustomer, DbError> {
    let domain = company_domain(ctx, address);

    if let Some(existing) = db.find_customer_by_email(&ctx.user_id, address)? {
        report.customers_found += 1;
        let Some(domain) = domain.as_deref().filter(|_| existing.company_id.is_none()) else {
            return Ok(existing);
        };
        // Customers created before their domain was recognised get linked now.
        let company_id = company_for_domain(db, ctx, domain, report)?;
        db.link_customer_company(&existing.customer_id, &company_id, domain)?;
        return db
            .get_customer(&ctx.user_id, &existing.customer_id)?
            .ok_or(DbError::Sqlite(rusqlite::Error::QueryReturnedNoRows));
    }

    let company_id = match domain.as_deref() {
        Some(domain) => Some(company_for_domain(db, ctx, domain, report)?),
        None => None,
    };
    let customer = db.create_customer(
        &ctx.user_id,
        &NewCustomer {
            email: address.to_string(),
            full_name: Some(extract_local_part_from_email(address)),
            company_id,
            domain_match: domain.clone(),
            status: Some(CustomerStatus::Prospect),
            ..Default::default()
        },
    )?;
    log::debug!("Created customer {} for {}", customer.customer_id, address);
    report.customers_created += 1;
    Ok(customer)
}
