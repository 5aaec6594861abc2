//! Deduplicator: normalized title/URL comparison plus shingled content
//! fingerprints against the persisted history of accepted items.
//!
//! The scan is a single sequential pass so duplicates *within* one fetch
//! batch are caught: each accepted candidate inserts its record before the
//! next candidate is compared. Configured match fields are OR-ed; a title
//! match alone rejects regardless of URL.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::counter;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strsim::normalized_levenshtein;
use tracing::debug;

use crate::config::{DedupConfig, MatchField};
use crate::feeds::Candidate;

/// Cap on stored shingle hashes per record; enough for Jaccard on article
/// bodies without unbounded state growth.
const MAX_SHINGLES: usize = 128;
/// Retention cap on the history file; oldest records age out first.
const MAX_RECORDS: usize = 5000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupeRecord {
    pub normalized_title: String,
    pub normalized_url: String,
    pub content_fingerprint: String,
    pub shingle_hashes: Vec<u64>,
    pub first_seen_at: DateTime<Utc>,
}

/// Case-folded, tag-stripped, whitespace-collapsed title text.
pub fn normalize_title(s: &str) -> String {
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());

    let decoded = html_escape::decode_html_entities(s).to_string();
    let stripped = re_tags.replace_all(&decoded, "");
    let collapsed = re_ws.replace_all(stripped.trim(), " ");
    collapsed.to_lowercase()
}

/// host/path with scheme, www, query, fragment, and trailing slash dropped.
pub fn normalize_url(s: &str) -> String {
    match url::Url::parse(s) {
        Ok(u) => {
            let host = u
                .host_str()
                .unwrap_or_default()
                .trim_start_matches("www.")
                .to_lowercase();
            let path = u.path().trim_end_matches('/');
            format!("{host}{path}")
        }
        Err(_) => s.trim().trim_end_matches('/').to_lowercase(),
    }
}

fn shingle_hashes(content: &str) -> Vec<u64> {
    let text = normalize_title(content);
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut set = BTreeSet::new();
    if tokens.len() < 3 {
        if !text.is_empty() {
            set.insert(hash_str(&text));
        }
    } else {
        for w in tokens.windows(3) {
            set.insert(hash_str(&w.join(" ")));
        }
    }
    set.into_iter().take(MAX_SHINGLES).collect()
}

fn hash_str(s: &str) -> u64 {
    let digest = Sha256::digest(s.as_bytes());
    u64::from_be_bytes(digest[..8].try_into().expect("8 bytes"))
}

/// Stable signature over the shingle set, used as the item identity for
/// idempotent content-store writes.
pub fn fingerprint(title: &str, content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_title(title).as_bytes());
    for h in shingle_hashes(content) {
        hasher.update(h.to_be_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn jaccard(a: &[u64], b: &[u64]) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let sa: BTreeSet<_> = a.iter().collect();
    let sb: BTreeSet<_> = b.iter().collect();
    let inter = sa.intersection(&sb).count();
    let union = sa.union(&sb).count();
    inter as f64 / union as f64
}

/// File-backed record set. `in_memory` keeps everything ephemeral for tests.
#[derive(Debug)]
pub struct DedupeStore {
    path: Option<PathBuf>,
    records: Vec<DedupeRecord>,
}

impl DedupeStore {
    pub fn load(dir: &Path) -> Self {
        let path = dir.join("dedupe_history.json");
        let records = std::fs::read_to_string(&path)
            .ok()
            .and_then(|s| serde_json::from_str(&s).ok())
            .unwrap_or_default();
        Self {
            path: Some(path),
            records,
        }
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn insert(&mut self, record: DedupeRecord) {
        self.records.push(record);
        if self.records.len() > MAX_RECORDS {
            let overflow = self.records.len() - MAX_RECORDS;
            self.records.drain(..overflow);
        }
    }

    /// Drop the record with this content fingerprint, making the item
    /// eligible again on a later pass.
    pub fn remove(&mut self, content_fingerprint: &str) {
        self.records
            .retain(|r| r.content_fingerprint != content_fingerprint);
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string(&self.records)?)?;
        std::fs::rename(&tmp, path).context("persisting dedupe history")?;
        Ok(())
    }

    pub fn records(&self) -> &[DedupeRecord] {
        &self.records
    }
}

pub struct Deduplicator {
    cfg: DedupConfig,
    store: DedupeStore,
}

impl Deduplicator {
    pub fn new(cfg: DedupConfig, store: DedupeStore) -> Self {
        Self { cfg, store }
    }

    /// Sequential batch filter. The batch is ordered by (priority, earliest
    /// published) first, so when two in-batch candidates collide the
    /// higher-priority source's item is the one that survives.
    pub fn filter(&mut self, mut batch: Vec<Candidate>) -> (Vec<Candidate>, usize) {
        batch.sort_by(|a, b| {
            a.source_priority
                .cmp(&b.source_priority)
                .then(a.published_at.cmp(&b.published_at))
        });

        let mut accepted = Vec::with_capacity(batch.len());
        let mut rejected = 0usize;
        for cand in batch {
            let record = DedupeRecord {
                normalized_title: normalize_title(&cand.title),
                normalized_url: normalize_url(&cand.link),
                content_fingerprint: fingerprint(&cand.title, &cand.raw_content),
                shingle_hashes: shingle_hashes(&cand.raw_content),
                first_seen_at: cand.first_seen_at,
            };
            if let Some(field) = self.matches_existing(&record) {
                debug!(title = %cand.title, field = ?field, "near-duplicate rejected");
                counter!("pipeline_dedup_rejected_total").increment(1);
                rejected += 1;
                continue;
            }
            self.store.insert(record);
            accepted.push(cand);
        }
        (accepted, rejected)
    }

    fn matches_existing(&self, rec: &DedupeRecord) -> Option<MatchField> {
        for existing in self.store.records() {
            for field in &self.cfg.match_by {
                let sim = match field {
                    MatchField::Title => {
                        normalized_levenshtein(&rec.normalized_title, &existing.normalized_title)
                    }
                    MatchField::Url => {
                        if rec.normalized_url == existing.normalized_url {
                            1.0
                        } else {
                            normalized_levenshtein(&rec.normalized_url, &existing.normalized_url)
                        }
                    }
                    MatchField::Content => {
                        if rec.content_fingerprint == existing.content_fingerprint {
                            1.0
                        } else {
                            jaccard(&rec.shingle_hashes, &existing.shingle_hashes)
                        }
                    }
                };
                if sim >= self.cfg.similarity_threshold {
                    return Some(*field);
                }
            }
        }
        None
    }

    /// Forget an accepted candidate whose downstream persistence failed, so
    /// the next run re-admits the story instead of rejecting it as a
    /// duplicate of itself.
    pub fn forget(&mut self, content_fingerprint: &str) {
        self.store.remove(content_fingerprint);
    }

    pub fn persist(&self) -> Result<()> {
        self.store.save()
    }

    pub fn store(&self) -> &DedupeStore {
        &self.store
    }
}
