//! Content store: idempotent persistence of published items, keyed by
//! content fingerprint. The file-backed store writes one JSON document per
//! item via a temp-file rename so a crashed run never leaves a torn file.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::PersistenceError;
use crate::publish::PublishableItem;

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert or replace by fingerprint. Re-upserting the same item is a
    /// no-op from the reader's point of view.
    async fn upsert(&self, item: &PublishableItem) -> Result<(), PersistenceError>;

    async fn exists(&self, fingerprint: &str) -> Result<bool, PersistenceError>;
}

pub struct FileContentStore {
    dir: PathBuf,
}

impl FileContentStore {
    pub fn new(dir: &Path) -> Result<Self, PersistenceError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, fingerprint: &str) -> PathBuf {
        self.dir.join(format!("{fingerprint}.json"))
    }
}

#[async_trait]
impl ContentStore for FileContentStore {
    async fn upsert(&self, item: &PublishableItem) -> Result<(), PersistenceError> {
        let path = self.path_for(&item.fingerprint);
        let fresh = !path.exists();
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(item)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        if fresh {
            info!(slug = %item.slug, "stored published item");
        } else {
            debug!(slug = %item.slug, "re-upserted existing item");
        }
        Ok(())
    }

    async fn exists(&self, fingerprint: &str) -> Result<bool, PersistenceError> {
        Ok(self.path_for(fingerprint).exists())
    }
}

/// In-memory store for tests; can be told to fail upserts.
pub struct MockContentStore {
    items: parking_lot::Mutex<std::collections::HashMap<String, PublishableItem>>,
    fail_upserts: std::sync::atomic::AtomicBool,
}

impl MockContentStore {
    pub fn new() -> Self {
        Self {
            items: parking_lot::Mutex::new(std::collections::HashMap::new()),
            fail_upserts: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn fail_upserts(&self, fail: bool) {
        self.fail_upserts
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, fingerprint: &str) -> Option<PublishableItem> {
        self.items.lock().get(fingerprint).cloned()
    }

    pub fn all(&self) -> Vec<PublishableItem> {
        self.items.lock().values().cloned().collect()
    }
}

impl Default for MockContentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentStore for MockContentStore {
    async fn upsert(&self, item: &PublishableItem) -> Result<(), PersistenceError> {
        if self.fail_upserts.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(PersistenceError::Io(std::io::Error::other(
                "simulated store failure",
            )));
        }
        self.items
            .lock()
            .insert(item.fingerprint.clone(), item.clone());
        Ok(())
    }

    async fn exists(&self, fingerprint: &str) -> Result<bool, PersistenceError> {
        Ok(self.items.lock().contains_key(fingerprint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{CategoryAssignment, MatchedVia};
    use crate::feeds::Candidate;
    use crate::images::ImageResult;
    use crate::publish::{PublishStatus, DEFAULT_AUTHOR};
    use crate::rewrite::RewriteResult;
    use chrono::Utc;

    fn item(fingerprint: &str) -> PublishableItem {
        PublishableItem {
            fingerprint: fingerprint.to_string(),
            slug: "test-story".to_string(),
            candidate: Candidate {
                source_url: "https://src/rss".into(),
                source_priority: 1,
                title: "Test Story".into(),
                link: "https://example.com/x".into(),
                raw_content: "body".into(),
                published_at: Utc::now(),
                first_seen_at: Utc::now(),
                author: None,
                image_url: None,
                external_category: "Destinations".into(),
            },
            rewrite: RewriteResult {
                title: "Test Story".into(),
                body: "body".into(),
                excerpt_summary: "body".into(),
                keywords: vec![],
                style_violations: vec![],
            },
            category: CategoryAssignment {
                canonical_category: "Destinations".into(),
                matched_via: MatchedVia::Default,
            },
            image: ImageResult {
                image_url: "https://img/x".into(),
                attribution_name: None,
                attribution_url: None,
            },
            author: DEFAULT_AUTHOR.to_string(),
            status: PublishStatus::Published,
            scheduled_at: Utc::now(),
            published_at: Some(Utc::now()),
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileContentStore::new(tmp.path()).unwrap();
        let it = item("abc123");
        store.upsert(&it).await.unwrap();
        store.upsert(&it).await.unwrap();
        assert!(store.exists("abc123").await.unwrap());

        let files: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|x| x == "json"))
            .collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn stored_item_roundtrips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileContentStore::new(tmp.path()).unwrap();
        let it = item("roundtrip");
        store.upsert(&it).await.unwrap();

        let body = std::fs::read_to_string(tmp.path().join("roundtrip.json")).unwrap();
        let back: PublishableItem = serde_json::from_str(&body).unwrap();
        assert_eq!(back.slug, it.slug);
        assert_eq!(back.status, PublishStatus::Published);
        assert_eq!(back.author, DEFAULT_AUTHOR);
    }

    #[tokio::test]
    async fn missing_fingerprint_does_not_exist() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileContentStore::new(tmp.path()).unwrap();
        assert!(!store.exists("nope").await.unwrap());
    }
}
