//! End-to-end run orchestration: fetch -> dedup -> validate -> rewrite ->
//! classify -> image -> admit -> store. A run only errors on configuration
//! or state-dir problems; every per-item failure degrades that item alone
//! and shows up in the `RunSummary`.

use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::classify;
use crate::config::PipelineConfig;
use crate::dedup::{self, Deduplicator, DedupeStore};
use crate::feeds::fetcher::FetchCoordinator;
use crate::feeds::{Candidate, FeedFetchService};
use crate::images::{select_image, ImageSearchService};
use crate::publish::store::ContentStore;
use crate::publish::{
    Admission, PublishScheduler, PublishStatus, PublishableItem, DEFAULT_AUTHOR,
};
use crate::rewrite::client::RewriteClient;
use crate::rewrite::{style, RewriteOrchestrator, RewriteResult};
use crate::validate::Validator;

/// External boundaries of one run, injectable for tests.
#[derive(Clone)]
pub struct PipelineDeps {
    pub fetch: Arc<dyn FeedFetchService>,
    pub rewrite: Arc<dyn RewriteClient>,
    pub images: Arc<dyn ImageSearchService>,
    pub store: Arc<dyn ContentStore>,
}

/// Printed as JSON at the end of each run.
#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct RunSummary {
    pub fetched: usize,
    pub deduped: usize,
    pub rejected: usize,
    pub already_stored: usize,
    pub rewritten: usize,
    pub published: usize,
    pub quota_deferred: usize,
    pub failed: usize,
}

static METRICS_INIT: OnceCell<()> = OnceCell::new();

pub fn describe_metrics() {
    METRICS_INIT.get_or_init(|| {
        describe_counter!("pipeline_fetch_ok_total", "successful source fetches");
        describe_counter!("pipeline_fetch_errors_total", "sources skipped after all urls failed");
        describe_counter!("pipeline_fetch_not_modified_total", "conditional fetches answered 304");
        describe_counter!("pipeline_fetch_fallback_used_total", "fetches served by a fallback url");
        describe_counter!("pipeline_feed_entries_total", "entries parsed off feeds");
        describe_histogram!("pipeline_feed_parse_ms", "feed parse duration");
        describe_counter!("pipeline_dedup_rejected_total", "candidates dropped as duplicates");
        describe_counter!("pipeline_validation_rejected_total", "candidates failing validation");
        describe_counter!("pipeline_rewrite_ok_total", "successful rewrites");
        describe_counter!("pipeline_rewrite_failed_total", "rewrites failed after retries");
        describe_counter!(
            "pipeline_rewrite_style_violations_total",
            "rewrites with unresolved style violations"
        );
        describe_counter!("pipeline_publish_admitted_total", "items admitted for publication");
        describe_counter!("pipeline_publish_rejected_quota_total", "admissions rejected on quota");
        describe_counter!(
            "pipeline_publish_rejected_spacing_total",
            "admissions rejected on minimum spacing"
        );
        describe_counter!("pipeline_store_failed_total", "content-store write failures");
    });
}

pub async fn run_once(cfg: &PipelineConfig, deps: &PipelineDeps) -> Result<RunSummary> {
    describe_metrics();
    let now = Utc::now();
    let mut summary = RunSummary::default();

    // 1) fetch everything that is due
    let coordinator = FetchCoordinator::new(
        deps.fetch.clone(),
        cfg.rate_limit.clone(),
        cfg.state_dir.clone(),
    );
    let candidates = coordinator.fetch_all(&cfg.feeds, now).await;
    summary.fetched = candidates.len();
    info!(fetched = summary.fetched, "fetch stage complete");

    // 2) dedup against history and within the batch. The history is only
    //    persisted at the end of the run, after store writes have settled,
    //    so a failed write can release its record first.
    let mut dedup = Deduplicator::new(cfg.dedup.clone(), DedupeStore::load(&cfg.state_dir));
    let (unique, deduped) = dedup.filter(candidates);
    summary.deduped = deduped;

    // 3) validation gate
    let validator = Validator::new(cfg.validation.clone());
    let mut accepted = Vec::new();
    for cand in unique {
        let res = validator.validate(&cand);
        if res.passed {
            accepted.push(cand);
        } else {
            summary.rejected += 1;
            info!(title = %cand.title, reasons = ?res.reasons, "candidate rejected");
        }
    }

    // 4) skip anything this store already holds; the write is idempotent but
    //    there is no point paying for a rewrite again
    let mut fresh = Vec::new();
    for cand in accepted {
        let fp = dedup::fingerprint(&cand.title, &cand.raw_content);
        if deps.store.exists(&fp).await.unwrap_or(false) {
            summary.already_stored += 1;
        } else {
            fresh.push((fp, cand));
        }
    }

    // 5) rewrite under bounded concurrency
    let orchestrator = Arc::new(RewriteOrchestrator::new(
        deps.rewrite.clone(),
        cfg.style.clone(),
        cfg.rewrite.clone(),
    ));
    let semaphore = Arc::new(Semaphore::new(cfg.rewrite.max_concurrent.max(1)));
    let mut handles = Vec::with_capacity(fresh.len());
    for (fp, cand) in fresh {
        let orchestrator = orchestrator.clone();
        let semaphore = semaphore.clone();
        handles.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
            let outcome = orchestrator.rewrite(&cand).await;
            (fp, cand, outcome)
        }));
    }

    let mut rewritten: Vec<(String, Candidate, RewriteResult)> = Vec::new();
    for handle in handles {
        let Ok((fp, cand, outcome)) = handle.await else {
            summary.failed += 1;
            continue;
        };
        match outcome {
            Ok(result) => rewritten.push((fp, cand, result)),
            Err(e) => {
                summary.failed += 1;
                warn!(title = %cand.title, error = %e, "rewrite failed");
            }
        }
    }

    // 6) classify, enrich, and build publishable items; unresolved style
    //    violations route to the failed state and are stored for audit
    let mut scheduler = PublishScheduler::load(cfg.publishing.clone(), &cfg.state_dir, now);
    let mut queue = Vec::new();
    for (fp, cand, rewrite) in rewritten {
        summary.rewritten += 1;
        let category = classify::classify(&cand, &cfg.categories);
        let image = select_image(
            deps.images.as_ref(),
            &cfg.images,
            &rewrite.title,
            &category.canonical_category,
        )
        .await;
        let item = PublishableItem {
            fingerprint: fp,
            slug: style::slug(&rewrite.title),
            author: cand
                .author
                .clone()
                .unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
            candidate: cand,
            rewrite,
            category,
            image,
            status: PublishStatus::Queued,
            scheduled_at: now,
            published_at: None,
        };
        if item.rewrite.style_violations.is_empty() {
            queue.push(item);
        } else {
            summary.failed += 1;
            let mut failed = item;
            failed.status = PublishStatus::Failed;
            if let Err(e) = deps.store.upsert(&failed).await {
                counter!("pipeline_store_failed_total").increment(1);
                dedup.forget(&failed.fingerprint);
                warn!(slug = %failed.slug, error = %e, "storing failed item");
            }
        }
    }

    // 7) admit under quota and spacing, priority categories first
    scheduler.drain_order(&mut queue);
    for mut item in queue {
        match scheduler.admit(&item.category.canonical_category, now) {
            Admission::Queued { scheduled_at } => {
                item.status = PublishStatus::Published;
                item.scheduled_at = scheduled_at;
                item.published_at = Some(scheduled_at);
                match deps.store.upsert(&item).await {
                    Ok(()) => summary.published += 1,
                    Err(e) => {
                        // At-least-once: admission counters stay as they are,
                        // but the dedupe record is released so the next run
                        // re-attempts the story against the idempotent store.
                        summary.failed += 1;
                        counter!("pipeline_store_failed_total").increment(1);
                        dedup.forget(&item.fingerprint);
                        warn!(slug = %item.slug, error = %e, "storing published item");
                    }
                }
            }
            Admission::Rejected(reason) => {
                // Deferred items are stored as queued; they hold their slot
                // until a later period admits them.
                summary.quota_deferred += 1;
                info!(
                    slug = %item.slug,
                    category = %item.category.canonical_category,
                    ?reason,
                    "admission deferred"
                );
                if let Err(e) = deps.store.upsert(&item).await {
                    counter!("pipeline_store_failed_total").increment(1);
                    dedup.forget(&item.fingerprint);
                    warn!(slug = %item.slug, error = %e, "storing queued item");
                }
            }
        }
    }
    dedup.persist().context("persisting dedupe history")?;
    scheduler.persist().context("persisting publish schedule")?;

    info!(?summary, "run complete");
    Ok(summary)
}
