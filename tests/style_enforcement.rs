// tests/style_enforcement.rs
// A rewrite that keeps producing prohibited language must never publish;
// the item lands in the store as failed, for audit.

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

struct OneCleanEntry;

#[async_trait]
impl FeedFetchService for OneCleanEntry {
    async fn fetch(
        &self,
        _url: &str,
        _cond: &ConditionalHeaders,
    ) -> Result<FetchResponse, FetchError> {
        Ok(FetchResponse::Ok {
            entries: vec![RawEntry {
                title: "Island Destination Draws Record Visitors".to_string(),
                link: "https://news.test/island-record".to_string(),
                content: "Travellers looking for a quiet holiday have a new favourite spot. \
                          The island's resort strip mixes budget stays with luxury hotels, and \
                          local guides recommend booking the harbour tour early in the trip.\n\n\
                          Flights arrive daily from three hub airports, and the cruise port \
                          reopened last month after a long refit. Visitors should explore the \
                          old town on foot before the day-trip crowds arrive each morning.\n\n\
                          For families, the destination offers calm beaches and short transfers. \
                          Booking ahead remains the best advice for the peak season experience."
                    .to_string(),
                published_at: Some(Utc::now()),
                author: Some("Jordan Lee".to_string()),
                category: Some("Travel".to_string()),
                image_url: None,
            }],
            etag: None,
            last_modified: None,
        })
    }
}

/// The service keeps reintroducing a banned term, every attempt.
struct ProhibitedRewrite;

#[async_trait]
impl RewriteClient for ProhibitedRewrite {
    async fn rewrite(&self, req: &RewriteRequest) -> Result<RewriteResponse, RewriteServiceError> {
        Ok(RewriteResponse {
            title: req.title.clone(),
            body: "The island resort now markets its gambling floor to tour groups."
                .to_string(),
            summary: "Resort news.".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "prohibited"
    }
}

#[tokio::test]
async fn unresolved_style_violation_routes_to_failed_and_never_publishes() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = PipelineConfig::default();
    cfg.state_dir = tmp.path().join("state");
    cfg.content_dir = tmp.path().join("content");
    cfg.feeds = vec![FeedSource {
        url: "https://feeds.test/one".to_string(),
        category: "Destinations".to_string(),
        priority: 1,
        poll_interval_minutes: 0,
        fallback_urls: vec![],
    }];
    cfg.publishing.interval_minutes = 0;
    cfg.rewrite.retry.base_delay_ms = 1;

    let store = Arc::new(MockContentStore::new());
    let deps = PipelineDeps {
        fetch: Arc::new(OneCleanEntry),
        rewrite: Arc::new(ProhibitedRewrite),
        images: Arc::new(MockImageSearch { fixed: None }),
        store: store.clone(),
    };

    let summary = run_once(&cfg, &deps).await.unwrap();
    assert_eq!(summary.fetched, 1);
    assert_eq!(summary.rejected, 0);
    assert_eq!(summary.rewritten, 1);
    assert_eq!(summary.published, 0);
    assert_eq!(summary.failed, 1);

    let items = store.all();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].status, PublishStatus::Failed);
    assert!(items[0]
        .rewrite
        .style_violations
        .iter()
        .any(|v| v.contains("gambling")));
    assert!(items[0].published_at.is_none());
}
