//! Feed registry types and the fetch boundary.
//!
//! `FeedFetchService` is the external collaborator: given a URL and optional
//! conditional-fetch headers it returns raw entries or "not modified". The
//! HTTP implementation lives in `fetcher`; tests substitute mocks.

pub mod fetcher;
pub mod rss;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FetchError;

/// One syndicated entry as parsed off the wire, before any gating.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawEntry {
    pub title: String,
    pub link: String,
    pub content: String,
    pub published_at: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub image_url: Option<String>,
}

/// A unit of content moving through the pipeline. Read-only once fetched;
/// enrichment happens in later stages on derived values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candidate {
    pub source_url: String,
    pub source_priority: u32,
    pub title: String,
    pub link: String,
    pub raw_content: String,
    /// Original publication date from the feed, never overwritten with
    /// ingestion time.
    pub published_at: DateTime<Utc>,
    pub first_seen_at: DateTime<Utc>,
    pub author: Option<String>,
    pub image_url: Option<String>,
    pub external_category: String,
}

#[derive(Debug, Clone, Default)]
pub struct ConditionalHeaders {
    pub if_none_match: Option<String>,
    pub if_modified_since: Option<String>,
}

#[derive(Debug, Clone)]
pub enum FetchResponse {
    Ok {
        entries: Vec<RawEntry>,
        etag: Option<String>,
        last_modified: Option<String>,
    },
    NotModified,
}

#[async_trait]
pub trait FeedFetchService: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        cond: &ConditionalHeaders,
    ) -> Result<FetchResponse, FetchError>;
}
