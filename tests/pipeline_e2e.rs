// tests/pipeline_e2e.rs
// Whole-pipeline smoke test on mocks: fetch -> dedup -> validate -> rewrite
// -> classify -> admit -> store, then a second run to prove idempotency.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use travel_content_pipeline::config::{FeedSource, PipelineConfig};
use travel_content_pipeline::error::{FetchError, RewriteServiceError};
use travel_content_pipeline::feeds::{ConditionalHeaders, FeedFetchService, FetchResponse, RawEntry};
use travel_content_pipeline::images::MockImageSearch;
use travel_content_pipeline::pipeline::{run_once, PipelineDeps};
use travel_content_pipeline::publish::store::MockContentStore;
use travel_content_pipeline::publish::PublishStatus;
use travel_content_pipeline::rewrite::client::{RewriteClient, RewriteRequest, RewriteResponse};

struct ScriptedFeeds {
    by_url: HashMap<String, Vec<RawEntry>>,
}

#[async_trait]
impl FeedFetchService for ScriptedFeeds {
    async fn fetch(
        &self,
        url: &str,
        _cond: &ConditionalHeaders,
    ) -> Result<FetchResponse, FetchError> {
        match self.by_url.get(url) {
            Some(entries) => Ok(FetchResponse::Ok {
                entries: entries.clone(),
                etag: None,
                last_modified: None,
            }),
            None => Err(FetchError::Status(404)),
        }
    }
}

/// Returns the input unchanged; keeps assertions about titles simple.
struct EchoRewrite;

#[async_trait]
impl RewriteClient for EchoRewrite {
    async fn rewrite(&self, req: &RewriteRequest) -> Result<RewriteResponse, RewriteServiceError> {
        Ok(RewriteResponse {
            title: req.title.clone(),
            body: req.content.clone(),
            summary: format!("{} in brief.", req.title),
        })
    }

    fn name(&self) -> &'static str {
        "echo"
    }
}

fn travel_body() -> String {
    "Travellers looking for a quiet holiday have a new favourite spot. \
     The island's resort strip mixes budget stays with luxury hotels, and \
     local guides recommend booking the harbour tour early in the trip.\n\n\
     Flights arrive daily from three hub airports, and the cruise port \
     reopened last month after a long refit. Visitors should explore the \
     old town on foot before the day-trip crowds arrive each morning.\n\n\
     For families, the destination offers calm beaches and short transfers. \
     Booking ahead remains the best advice for the peak season experience."
        .to_string()
}

fn entry(title: &str, link: &str) -> RawEntry {
    RawEntry {
        title: title.to_string(),
        link: link.to_string(),
        content: travel_body(),
        published_at: Some(Utc::now()),
        author: Some("Jordan Lee".to_string()),
        category: Some("Travel".to_string()),
        image_url: None,
    }
}

fn test_config(state: &std::path::Path) -> PipelineConfig {
    let mut cfg = PipelineConfig::default();
    cfg.state_dir = state.join("state");
    cfg.content_dir = state.join("content");
    cfg.feeds = vec![
        FeedSource {
            url: "https://feeds.test/primary".to_string(),
            category: "Destinations".to_string(),
            priority: 1,
            poll_interval_minutes: 0,
            fallback_urls: vec![],
        },
        FeedSource {
            url: "https://feeds.test/secondary".to_string(),
            category: "Destinations".to_string(),
            priority: 2,
            poll_interval_minutes: 0,
            fallback_urls: vec![],
        },
    ];
    cfg.publishing.interval_minutes = 0;
    cfg.rewrite.retry.base_delay_ms = 1;
    cfg
}

fn deps(feeds: ScriptedFeeds, store: Arc<MockContentStore>) -> PipelineDeps {
    PipelineDeps {
        fetch: Arc::new(feeds),
        rewrite: Arc::new(EchoRewrite),
        images: Arc::new(MockImageSearch { fixed: None }),
        store,
    }
}

#[tokio::test]
async fn first_run_publishes_and_second_run_is_a_no_op() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = test_config(tmp.path());
    let store = Arc::new(MockContentStore::new());

    let feeds = || ScriptedFeeds {
        by_url: HashMap::from([
            (
                "https://feeds.test/primary".to_string(),
                vec![
                    entry(
                        "Island Destination Draws Record Visitors",
                        "https://news.test/island-record",
                    ),
                    entry(
                        "Mountain Rail Journey Reopens to Travellers",
                        "https://news.test/mountain-rail",
                    ),
                ],
            ),
            (
                "https://feeds.test/secondary".to_string(),
                vec![entry(
                    "Desert Stargazing Tours Book Out Months Ahead",
                    "https://other.test/desert-stargazing",
                )],
            ),
        ]),
    };

    let d = deps(feeds(), store.clone());
    let summary = run_once(&cfg, &d).await.unwrap();
    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.deduped, 0);
    assert_eq!(summary.rejected, 0);
    assert_eq!(summary.rewritten, 3);
    assert_eq!(summary.published, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(store.len(), 3);
    for item in store.all() {
        assert_eq!(item.status, PublishStatus::Published);
        assert_eq!(item.category.canonical_category, "Destinations");
        assert!(item.published_at.is_some());
        assert!(!item.slug.is_empty());
        // no image hit, so the category default applies
        assert_eq!(item.image.image_url, cfg.images.default_for("Destinations"));
    }

    // Same feeds again: dedup history drops everything.
    let d = deps(feeds(), store.clone());
    let second = run_once(&cfg, &d).await.unwrap();
    assert_eq!(second.fetched, 3);
    assert_eq!(second.deduped, 3);
    assert_eq!(second.published, 0);
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn near_duplicate_across_feeds_keeps_higher_priority_source() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = test_config(tmp.path());
    let store = Arc::new(MockContentStore::new());

    // Same story syndicated on both feeds with a trivial title variation.
    let feeds = ScriptedFeeds {
        by_url: HashMap::from([
            (
                "https://feeds.test/primary".to_string(),
                vec![entry(
                    "Island Destination Draws Record Visitors",
                    "https://news.test/island-record",
                )],
            ),
            (
                "https://feeds.test/secondary".to_string(),
                vec![entry(
                    "Island Destination Draws Record Visitors!",
                    "https://other.test/island-record-syndicated",
                )],
            ),
        ]),
    };

    let d = deps(feeds, store.clone());
    let summary = run_once(&cfg, &d).await.unwrap();
    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.deduped, 1);
    assert_eq!(summary.published, 1);
    let survivor = &store.all()[0];
    assert_eq!(survivor.candidate.source_url, "https://feeds.test/primary");
}

#[tokio::test]
async fn store_failure_releases_the_story_for_the_next_run() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = test_config(tmp.path());
    cfg.feeds.truncate(1);
    let store = Arc::new(MockContentStore::new());

    let feeds = || ScriptedFeeds {
        by_url: HashMap::from([(
            "https://feeds.test/primary".to_string(),
            vec![entry(
                "Island Destination Draws Record Visitors",
                "https://news.test/island-record",
            )],
        )]),
    };

    // First run: the store is down, the write fails.
    store.fail_upserts(true);
    let first = run_once(&cfg, &deps(feeds(), store.clone())).await.unwrap();
    assert_eq!(first.published, 0);
    assert_eq!(first.failed, 1);
    assert!(store.is_empty());

    // Next run: the store recovered; the story must not be treated as a
    // duplicate of its own failed write.
    store.fail_upserts(false);
    let second = run_once(&cfg, &deps(feeds(), store.clone())).await.unwrap();
    assert_eq!(second.deduped, 0);
    assert_eq!(second.published, 1);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn author_defaults_to_editorial_byline_when_feed_omits_it() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = test_config(tmp.path());
    cfg.feeds.truncate(1);
    let store = Arc::new(MockContentStore::new());

    let mut anonymous = entry(
        "Harbour City Guide for First-Time Visitors",
        "https://news.test/harbour-guide",
    );
    anonymous.author = None;

    let feeds = ScriptedFeeds {
        by_url: HashMap::from([(
            "https://feeds.test/primary".to_string(),
            vec![anonymous],
        )]),
    };

    let d = deps(feeds, store.clone());
    let summary = run_once(&cfg, &d).await.unwrap();
    assert_eq!(summary.published, 1);
    assert_eq!(
        store.all()[0].author,
        travel_content_pipeline::publish::DEFAULT_AUTHOR
    );
}
