//! Fetch Coordinator: pulls entries from all due sources with a global
//! concurrency bound, conditional requests, per-source poll intervals, and
//! fallback URLs. A single source failing never aborts the batch.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::{FeedSource, RateLimitConfig};
use crate::error::FetchError;
use crate::feeds::{rss, Candidate, ConditionalHeaders, FeedFetchService, FetchResponse};

/// Stored conditional-fetch state for one source URL.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceState {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    /// Unix seconds of the last successful fetch (including "not modified").
    pub last_success_at: Option<i64>,
}

/// Per-source state map, persisted between invocations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchState {
    pub sources: HashMap<String, SourceState>,
}

impl FetchState {
    pub fn load(dir: &Path) -> Self {
        let path = dir.join("fetch_state.json");
        match std::fs::read_to_string(&path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join("fetch_state.json");
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &path).context("persisting fetch state")?;
        Ok(())
    }

    fn due(&self, source: &FeedSource, now: DateTime<Utc>) -> bool {
        match self.sources.get(&source.url).and_then(|s| s.last_success_at) {
            Some(last) => {
                now.timestamp() - last >= (source.poll_interval_minutes as i64) * 60
            }
            None => true,
        }
    }
}

/// HTTP implementation of the feed-fetch boundary.
pub struct HttpFeedFetcher {
    http: reqwest::Client,
    timeout_secs: u64,
}

impl HttpFeedFetcher {
    pub fn new(timeout_secs: u64) -> Self {
        let http = reqwest::Client::builder()
            .user_agent("travel-content-pipeline/0.1 (+globaltravelreport.com)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .expect("reqwest client");
        Self { http, timeout_secs }
    }
}

#[async_trait]
impl FeedFetchService for HttpFeedFetcher {
    async fn fetch(
        &self,
        url: &str,
        cond: &ConditionalHeaders,
    ) -> Result<FetchResponse, FetchError> {
        let mut req = self.http.get(url);
        if let Some(etag) = &cond.if_none_match {
            req = req.header(reqwest::header::IF_NONE_MATCH, etag);
        }
        if let Some(lm) = &cond.if_modified_since {
            req = req.header(reqwest::header::IF_MODIFIED_SINCE, lm);
        }

        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(self.timeout_secs)
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

        if resp.status() == reqwest::StatusCode::NOT_MODIFIED {
            return Ok(FetchResponse::NotModified);
        }
        if !resp.status().is_success() {
            return Err(FetchError::Status(resp.status().as_u16()));
        }

        let header = |name: reqwest::header::HeaderName| {
            resp.headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string())
        };
        let etag = header(reqwest::header::ETAG);
        let last_modified = header(reqwest::header::LAST_MODIFIED);

        let body = resp
            .text()
            .await
            .map_err(|e| FetchError::Network(e.to_string()))?;
        let entries = rss::parse(&body)?;
        Ok(FetchResponse::Ok {
            entries,
            etag,
            last_modified,
        })
    }
}

/// Outcome of one source fetch inside the coordinator.
enum SourceOutcome {
    Entries(FetchResponse),
    Skipped,
}

pub struct FetchCoordinator {
    service: Arc<dyn FeedFetchService>,
    rate: RateLimitConfig,
    state_dir: PathBuf,
}

impl FetchCoordinator {
    pub fn new(service: Arc<dyn FeedFetchService>, rate: RateLimitConfig, state_dir: PathBuf) -> Self {
        Self {
            service,
            rate,
            state_dir,
        }
    }

    /// Fetch all due sources and return the batch of candidates. Updates and
    /// persists per-source etag/last-modified state on success.
    pub async fn fetch_all(&self, sources: &[FeedSource], now: DateTime<Utc>) -> Vec<Candidate> {
        let mut state = FetchState::load(&self.state_dir);
        let sem = Arc::new(Semaphore::new(self.rate.max_concurrent.max(1)));

        let mut handles = Vec::new();
        for source in sources {
            if !state.due(source, now) {
                debug!(url = %source.url, "source not due, skipping");
                continue;
            }
            let cond = state
                .sources
                .get(&source.url)
                .map(|s| ConditionalHeaders {
                    if_none_match: s.etag.clone(),
                    if_modified_since: s.last_modified.clone(),
                })
                .unwrap_or_default();

            let service = self.service.clone();
            let sem = sem.clone();
            let source = source.clone();
            let timeout = Duration::from_secs(self.rate.fetch_timeout_secs);
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.expect("semaphore closed");
                let outcome = fetch_with_fallbacks(service.as_ref(), &source, &cond, timeout).await;
                (source, outcome)
            }));
        }

        let mut out = Vec::new();
        for h in handles {
            let Ok((source, outcome)) = h.await else {
                continue;
            };
            match outcome {
                SourceOutcome::Entries(FetchResponse::Ok {
                    entries,
                    etag,
                    last_modified,
                }) => {
                    counter!("pipeline_fetch_ok_total").increment(1);
                    let entry = state.sources.entry(source.url.clone()).or_default();
                    if etag.is_some() {
                        entry.etag = etag;
                    }
                    if last_modified.is_some() {
                        entry.last_modified = last_modified;
                    }
                    entry.last_success_at = Some(now.timestamp());
                    info!(url = %source.url, entries = entries.len(), "fetched source");
                    for e in entries {
                        out.push(Candidate {
                            source_url: source.url.clone(),
                            source_priority: source.priority,
                            external_category: e
                                .category
                                .unwrap_or_else(|| source.category.clone()),
                            title: e.title,
                            link: e.link,
                            raw_content: e.content,
                            published_at: e.published_at.unwrap_or(now),
                            first_seen_at: now,
                            author: e.author,
                            image_url: e.image_url,
                        });
                    }
                }
                SourceOutcome::Entries(FetchResponse::NotModified) => {
                    counter!("pipeline_fetch_not_modified_total").increment(1);
                    debug!(url = %source.url, "source not modified");
                    state
                        .sources
                        .entry(source.url.clone())
                        .or_default()
                        .last_success_at = Some(now.timestamp());
                }
                SourceOutcome::Skipped => {
                    counter!("pipeline_fetch_errors_total").increment(1);
                }
            }
        }

        if let Err(e) = state.save(&self.state_dir) {
            warn!(error = ?e, "failed to persist fetch state");
        }
        out
    }
}

/// Try the primary URL, then each fallback in order. Conditional headers
/// only apply to the primary; stored validators belong to that URL.
async fn fetch_with_fallbacks(
    service: &dyn FeedFetchService,
    source: &FeedSource,
    cond: &ConditionalHeaders,
    timeout: Duration,
) -> SourceOutcome {
    let none = ConditionalHeaders::default();
    let mut attempts: Vec<(&str, &ConditionalHeaders)> = vec![(source.url.as_str(), cond)];
    for fb in &source.fallback_urls {
        attempts.push((fb.as_str(), &none));
    }

    for (url, cond) in attempts {
        match tokio::time::timeout(timeout, service.fetch(url, cond)).await {
            Ok(Ok(resp)) => {
                if url != source.url {
                    counter!("pipeline_fetch_fallback_used_total").increment(1);
                    info!(primary = %source.url, fallback = %url, "fallback url succeeded");
                }
                return SourceOutcome::Entries(resp);
            }
            Ok(Err(e)) => {
                warn!(url = %url, error = %e, "feed fetch failed");
            }
            Err(_) => {
                warn!(url = %url, timeout_secs = timeout.as_secs(), "feed fetch timed out");
            }
        }
    }
    warn!(url = %source.url, "all urls failed for source, skipping this cycle");
    SourceOutcome::Skipped
}
