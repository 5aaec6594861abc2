//! Image-search boundary: given a query, return a candidate image with
//! attribution, or fall back to the per-category default. Image selection
//! never fails a candidate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::ImageConfig;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageResult {
    pub image_url: String,
    pub attribution_name: Option<String>,
    pub attribution_url: Option<String>,
}

#[async_trait]
pub trait ImageSearchService: Send + Sync {
    /// `None` means "no result"; errors are treated the same way upstream.
    async fn search(&self, query: &str) -> anyhow::Result<Option<ImageResult>>;
}

/// Unsplash-style search provider. Requires `IMAGE_SEARCH_ACCESS_KEY`;
/// without one, every search is a miss and defaults apply.
pub struct UnsplashClient {
    http: reqwest::Client,
    access_key: String,
}

impl UnsplashClient {
    pub fn new() -> Self {
        let access_key = std::env::var("IMAGE_SEARCH_ACCESS_KEY").unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent("travel-content-pipeline/0.1 (+globaltravelreport.com)")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(10))
            .build()
            .expect("reqwest client");
        Self { http, access_key }
    }
}

impl Default for UnsplashClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageSearchService for UnsplashClient {
    async fn search(&self, query: &str) -> anyhow::Result<Option<ImageResult>> {
        if self.access_key.is_empty() {
            return Ok(None);
        }

        #[derive(Deserialize)]
        struct SearchResp {
            results: Vec<Photo>,
        }
        #[derive(Deserialize)]
        struct Photo {
            urls: Urls,
            user: User,
        }
        #[derive(Deserialize)]
        struct Urls {
            regular: String,
        }
        #[derive(Deserialize)]
        struct User {
            name: Option<String>,
            links: Option<UserLinks>,
        }
        #[derive(Deserialize)]
        struct UserLinks {
            html: Option<String>,
        }

        let resp = self
            .http
            .get("https://api.unsplash.com/search/photos")
            .query(&[("query", query), ("per_page", "1"), ("orientation", "landscape")])
            .header("Authorization", format!("Client-ID {}", self.access_key))
            .send()
            .await?;
        if !resp.status().is_success() {
            debug!(status = %resp.status(), "image search non-success");
            return Ok(None);
        }
        let body: SearchResp = resp.json().await?;
        Ok(body.results.into_iter().next().map(|p| ImageResult {
            image_url: p.urls.regular,
            attribution_name: p.user.name,
            attribution_url: p.user.links.and_then(|l| l.html),
        }))
    }
}

/// Search with the headline + category, falling back to the configured
/// default image (no attribution) on miss or error.
pub async fn select_image(
    service: &dyn ImageSearchService,
    cfg: &ImageConfig,
    headline: &str,
    category: &str,
) -> ImageResult {
    let query = format!("{headline} {category}");
    match service.search(&query).await {
        Ok(Some(img)) => img,
        Ok(None) => default_image(cfg, category),
        Err(e) => {
            debug!(error = %e, "image search failed, using default");
            default_image(cfg, category)
        }
    }
}

fn default_image(cfg: &ImageConfig, category: &str) -> ImageResult {
    ImageResult {
        image_url: cfg.default_for(category).to_string(),
        attribution_name: None,
        attribution_url: None,
    }
}

/// Test double with a fixed result.
pub struct MockImageSearch {
    pub fixed: Option<ImageResult>,
}

#[async_trait]
impl ImageSearchService for MockImageSearch {
    async fn search(&self, _query: &str) -> anyhow::Result<Option<ImageResult>> {
        Ok(self.fixed.clone())
    }
}
