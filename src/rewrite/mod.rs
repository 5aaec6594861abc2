//! Rewrite Orchestrator: one service call per candidate under the style
//! profile, retry with backoff on transient failure, and post-hoc style
//! enforcement. A candidate with unresolved style violations after retries
//! is routed to the failed state, never published.

pub mod client;
pub mod retry;
pub mod style;

use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{RewriteConfig, StyleProfile};
use crate::error::RewriteServiceError;
use crate::feeds::Candidate;
use client::{RewriteClient, RewriteRequest};
use retry::RetryPolicy;

/// Produced once per candidate; violations listed here are unresolved after
/// all retries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RewriteResult {
    pub title: String,
    pub body: String,
    pub excerpt_summary: String,
    pub keywords: Vec<String>,
    pub style_violations: Vec<String>,
}

pub struct RewriteOrchestrator {
    client: Arc<dyn RewriteClient>,
    profile: StyleProfile,
    cfg: RewriteConfig,
    policy: RetryPolicy,
}

impl RewriteOrchestrator {
    pub fn new(client: Arc<dyn RewriteClient>, profile: StyleProfile, cfg: RewriteConfig) -> Self {
        let policy = RetryPolicy::from_config(&cfg.retry);
        Self {
            client,
            profile,
            cfg,
            policy,
        }
    }

    /// Call the service and enforce the style profile. Retries on transient
    /// service errors and on style violations, up to the policy's budget;
    /// the last result's violations are returned unresolved.
    pub async fn rewrite(&self, cand: &Candidate) -> Result<RewriteResult, RewriteServiceError> {
        let req = RewriteRequest::new(
            &cand.title,
            &cand.raw_content,
            &cand.external_category,
            &self.profile,
            (self.cfg.target_length_min, self.cfg.target_length_max),
        );

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.client.rewrite(&req).await {
                Ok(resp) => {
                    let result = self.enforce(&resp.title, &resp.body, &resp.summary);
                    if result.style_violations.is_empty() {
                        counter!("pipeline_rewrite_ok_total").increment(1);
                        return Ok(result);
                    }
                    // Style violations retry like a transient failure; the
                    // service may produce a clean variant next attempt.
                    if self.policy.next_delay(attempt, true).is_none() {
                        counter!("pipeline_rewrite_style_violations_total").increment(1);
                        warn!(
                            title = %cand.title,
                            violations = ?result.style_violations,
                            "style violations unresolved after retries"
                        );
                        return Ok(result);
                    }
                    debug!(title = %cand.title, violations = ?result.style_violations, "retrying on style violations");
                }
                Err(e) => match self.policy.next_delay(attempt, e.retryable()) {
                    Some(delay) => {
                        debug!(title = %cand.title, error = %e, attempt, "rewrite retry");
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        counter!("pipeline_rewrite_failed_total").increment(1);
                        return Err(e);
                    }
                },
            }
        }
    }

    /// Deterministic fix-ups plus validation of the service's output.
    fn enforce(&self, title: &str, body: &str, summary: &str) -> RewriteResult {
        let title = style::title_case(&style::apply_spellings(title, &self.profile.spellings));
        let body = style::apply_spellings(body, &self.profile.spellings);
        let summary_fixed = style::apply_spellings(summary, &self.profile.spellings);
        let excerpt_summary = style::excerpt(
            if summary_fixed.trim().is_empty() {
                &body
            } else {
                &summary_fixed
            },
            self.profile.meta_description_max_length,
        );

        let mut violations = style::headline_violations(&self.profile, &title);
        for hit in style::prohibited_hits(
            &self.profile,
            &format!("{title} {excerpt_summary} {body}"),
        ) {
            violations.push(format!("prohibited keyword: {hit}"));
        }

        RewriteResult {
            keywords: style::extract_tags(&title, &body),
            title,
            body,
            excerpt_summary,
            style_violations: violations,
        }
    }
}
