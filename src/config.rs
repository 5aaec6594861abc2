//! Pipeline configuration: feed registry, category taxonomy, validation
//! thresholds, deduplication settings, rate limits, style profile, and
//! publishing quotas. Loaded once at process start.
//!
//! Resolution order for the config file:
//! 1) $PIPELINE_CONFIG_PATH
//! 2) config/pipeline.toml
//! 3) compiled-in defaults

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const ENV_PATH: &str = "PIPELINE_CONFIG_PATH";

/// One syndication source. Static; immutable at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSource {
    pub url: String,
    pub category: String,
    /// Lower number = higher priority. Breaks ties between near-duplicate
    /// candidates competing for the same slot.
    pub priority: u32,
    pub poll_interval_minutes: u64,
    #[serde(default)]
    pub fallback_urls: Vec<String>,
}

/// External label -> canonical category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryMapping {
    pub external: String,
    pub canonical: String,
}

/// Keyword list associated with one canonical category. Declared order is
/// the tie-break order for keyword classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryKeywords {
    pub category: String,
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    pub mappings: Vec<CategoryMapping>,
    pub keywords: Vec<CategoryKeywords>,
    pub default_category: String,
}

/// Validation rule for one category (or the fallback rule).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRule {
    pub min_content_length: usize,
    pub quality_threshold: f64,
    pub required_fields: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Per-category rules; keyed by the feed's category label.
    pub rules: Vec<(String, ValidationRule)>,
    pub default_rule: ValidationRule,
    pub exclude_keywords: Vec<String>,
    /// Regex patterns matched against title and content.
    pub exclude_patterns: Vec<String>,
}

impl ValidationConfig {
    pub fn rule_for(&self, category: &str) -> &ValidationRule {
        self.rules
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(category))
            .map(|(_, r)| r)
            .unwrap_or(&self.default_rule)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchField {
    Title,
    Url,
    Content,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupConfig {
    /// Similarity in [0.0, 1.0]; a candidate matching any configured field
    /// at or above this is rejected.
    pub similarity_threshold: f64,
    pub match_by: Vec<MatchField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Global bound on concurrent source fetches.
    pub max_concurrent: usize,
    /// Per-request timeout for one feed fetch.
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpellingRule {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadlineRules {
    pub max_length: usize,
    /// At least one of these must appear in the headline (case-insensitive).
    pub required_keywords: Vec<String>,
}

/// House style enforced on rewritten output. Spelling substitutions are a
/// deterministic fix-up pass; the prohibited list is scanned post-hoc.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StyleProfile {
    pub language: String,
    pub spellings: Vec<SpellingRule>,
    pub headline: HeadlineRules,
    pub meta_description_max_length: usize,
    pub tone: Vec<String>,
    pub prohibited_keywords: Vec<String>,
}

/// Coarse grouping of canonical categories carrying a reserved sub-quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryGroup {
    pub name: String,
    pub categories: Vec<String>,
    pub quota: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishingConfig {
    pub daily_limit: u32,
    pub groups: Vec<CategoryGroup>,
    /// Reserved-group items beyond their sub-quota take general slots while
    /// capacity remains. Assumed policy; see DESIGN.md.
    pub overflow_to_general: bool,
    /// Minimum spacing between publishes.
    pub interval_minutes: i64,
    /// Categories drained from the queue first; may bypass the spacing gate.
    pub priority_categories: Vec<String>,
}

impl PublishingConfig {
    pub fn group_for(&self, category: &str) -> Option<&CategoryGroup> {
        self.groups
            .iter()
            .find(|g| g.categories.iter().any(|c| c.eq_ignore_ascii_case(category)))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteConfig {
    /// Bounded worker pool for rewrite-service calls.
    pub max_concurrent: usize,
    pub target_length_min: usize,
    pub target_length_max: usize,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Per-category fallback images used when search yields nothing.
    pub default_images: Vec<(String, String)>,
    pub fallback_image: String,
}

impl ImageConfig {
    pub fn default_for(&self, category: &str) -> &str {
        self.default_images
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(category))
            .map(|(_, u)| u.as_str())
            .unwrap_or(&self.fallback_image)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory for pipeline state (dedup history, fetch state, schedule).
    pub state_dir: PathBuf,
    /// Directory the file-backed content store writes published items to.
    pub content_dir: PathBuf,
    /// Whole-invocation wall clock; the run is abandoned past this.
    pub run_timeout_secs: u64,
    pub feeds: Vec<FeedSource>,
    pub categories: CategoryConfig,
    pub validation: ValidationConfig,
    pub dedup: DedupConfig,
    pub rate_limit: RateLimitConfig,
    pub style: StyleProfile,
    pub publishing: PublishingConfig,
    pub rewrite: RewriteConfig,
    pub images: ImageConfig,
}

/// Manual-run overrides accepted by the entry point.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub daily_limit: Option<u32>,
    /// (group name, quota) pairs replacing the configured sub-quotas.
    pub group_quotas: Vec<(String, u32)>,
}

impl PipelineConfig {
    /// Load using the env var + file fallbacks, else compiled defaults.
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            return Err(anyhow!("PIPELINE_CONFIG_PATH points to non-existent path"));
        }
        let toml_p = PathBuf::from("config/pipeline.toml");
        if toml_p.exists() {
            return Self::load_from(&toml_p);
        }
        Ok(Self::default())
    }

    /// Load from an explicit path. Supports TOML or JSON.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg: Self = if ext == "json" {
            serde_json::from_str(&content).context("parsing pipeline config json")?
        } else {
            toml::from_str(&content).context("parsing pipeline config toml")?
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Configuration errors make the whole run meaningless; everything else
    /// degrades per item.
    pub fn validate(&self) -> Result<()> {
        if self.feeds.is_empty() {
            return Err(anyhow!("feed table is empty"));
        }
        for f in &self.feeds {
            if f.url.is_empty() {
                return Err(anyhow!("feed with empty url (category {})", f.category));
            }
        }
        if !(0.0..=1.0).contains(&self.dedup.similarity_threshold) {
            return Err(anyhow!(
                "dedup.similarity_threshold out of range: {}",
                self.dedup.similarity_threshold
            ));
        }
        if self.dedup.match_by.is_empty() {
            return Err(anyhow!("dedup.match_by is empty"));
        }
        let reserved: u32 = self.publishing.groups.iter().map(|g| g.quota).sum();
        if reserved > self.publishing.daily_limit {
            return Err(anyhow!(
                "group quotas ({}) exceed daily limit ({})",
                reserved,
                self.publishing.daily_limit
            ));
        }
        if self.rate_limit.max_concurrent == 0 || self.rewrite.max_concurrent == 0 {
            return Err(anyhow!("max_concurrent must be >= 1"));
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, ov: &RunOverrides) {
        if let Some(limit) = ov.daily_limit {
            self.publishing.daily_limit = limit;
        }
        for (name, quota) in &ov.group_quotas {
            if let Some(g) = self
                .publishing
                .groups
                .iter_mut()
                .find(|g| g.name.eq_ignore_ascii_case(name))
            {
                g.quota = *quota;
            }
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            state_dir: PathBuf::from("state"),
            content_dir: PathBuf::from("content/published"),
            run_timeout_secs: 600,
            feeds: default_feeds(),
            categories: default_categories(),
            validation: default_validation(),
            dedup: DedupConfig {
                similarity_threshold: 0.85,
                match_by: vec![MatchField::Title, MatchField::Url],
            },
            rate_limit: RateLimitConfig {
                max_concurrent: 3,
                fetch_timeout_secs: 20,
            },
            style: default_style(),
            publishing: PublishingConfig {
                daily_limit: 8,
                groups: vec![CategoryGroup {
                    name: "cruise".to_string(),
                    categories: vec!["Cruises".to_string()],
                    quota: 2,
                }],
                overflow_to_general: true,
                interval_minutes: 180,
                priority_categories: vec!["Cruises".to_string()],
            },
            rewrite: RewriteConfig {
                max_concurrent: 5,
                target_length_min: 500,
                target_length_max: 2000,
                retry: RetryConfig {
                    max_attempts: 3,
                    base_delay_ms: 1000,
                },
            },
            images: default_images(),
        }
    }
}

fn default_feeds() -> Vec<FeedSource> {
    let feed = |url: &str, category: &str, priority: u32, mins: u64, fallbacks: &[&str]| FeedSource {
        url: url.to_string(),
        category: category.to_string(),
        priority,
        poll_interval_minutes: mins,
        fallback_urls: fallbacks.iter().map(|s| s.to_string()).collect(),
    };
    vec![
        // Cruise industry
        feed(
            "https://www.cruiseindustrynews.com/cruise-news/rss.xml",
            "Cruises",
            1,
            30,
            &["https://www.cruisecritic.com/rss/news.xml"],
        ),
        feed(
            "https://www.cruisecritic.com/rss/news.xml",
            "Cruises",
            2,
            45,
            &["https://www.cruiseindustrynews.com/cruise-news/rss.xml"],
        ),
        // Major travel publications
        feed(
            "https://www.lonelyplanet.com/news/rss.xml",
            "Destinations",
            1,
            60,
            &["https://www.travelandleisure.com/rss.xml"],
        ),
        feed(
            "https://www.travelandleisure.com/rss.xml",
            "Destinations",
            2,
            60,
            &["https://www.lonelyplanet.com/news/rss.xml"],
        ),
        feed(
            "https://www.cntraveler.com/rss.xml",
            "Destinations",
            1,
            60,
            &["https://www.travelandleisure.com/rss.xml"],
        ),
        // Hotels
        feed(
            "https://www.hotelnewsnow.com/Articles-RSS",
            "Hotels",
            2,
            90,
            &["https://www.travelweekly.com/rss"],
        ),
        // Aviation
        feed(
            "https://www.aviationweek.com/rss",
            "Flights",
            3,
            120,
            &["https://www.flightglobal.com/rss"],
        ),
        feed(
            "https://www.travelweekly.com/rss",
            "Destinations",
            3,
            90,
            &["https://www.travelpulse.com/rss"],
        ),
    ]
}

fn default_categories() -> CategoryConfig {
    let map = |e: &str, c: &str| CategoryMapping {
        external: e.to_string(),
        canonical: c.to_string(),
    };
    let kw = |c: &str, words: &[&str]| CategoryKeywords {
        category: c.to_string(),
        keywords: words.iter().map(|s| s.to_string()).collect(),
    };
    CategoryConfig {
        mappings: vec![
            map("Cruise News", "Cruises"),
            map("Cruises", "Cruises"),
            map("Travel", "Destinations"),
            map("Hotels", "Hotels"),
            map("Airlines", "Flights"),
        ],
        keywords: vec![
            kw("Cruises", &["cruise", "ship", "voyage", "ocean liner", "cruising"]),
            kw(
                "Hotels",
                &["hotel", "resort", "accommodation", "lodging", "hospitality"],
            ),
            kw(
                "Flights",
                &["flight", "airline", "airport", "aviation", "airplane"],
            ),
            kw(
                "Destinations",
                &["destination", "city", "country", "travel guide", "explore"],
            ),
            kw("Food", &["restaurant", "cuisine", "dining", "food", "culinary"]),
        ],
        default_category: "Destinations".to_string(),
    }
}

fn default_validation() -> ValidationConfig {
    let required = || {
        vec![
            "title".to_string(),
            "link".to_string(),
            "content".to_string(),
        ]
    };
    ValidationConfig {
        rules: vec![
            (
                "Cruises".to_string(),
                ValidationRule {
                    min_content_length: 300,
                    quality_threshold: 0.7,
                    required_fields: required(),
                },
            ),
            (
                "Destinations".to_string(),
                ValidationRule {
                    min_content_length: 250,
                    quality_threshold: 0.6,
                    required_fields: required(),
                },
            ),
        ],
        default_rule: ValidationRule {
            min_content_length: 250,
            quality_threshold: 0.6,
            required_fields: required(),
        },
        exclude_keywords: vec![
            "casino".to_string(),
            "gambling".to_string(),
            "adult".to_string(),
        ],
        exclude_patterns: vec![r"(?i)\bcasino\b".to_string(), r"(?i)\badult\b".to_string()],
    }
}

fn default_style() -> StyleProfile {
    let sp = |from: &str, to: &str| SpellingRule {
        from: from.to_string(),
        to: to.to_string(),
    };
    StyleProfile {
        language: "en-AU".to_string(),
        spellings: vec![
            sp("favorite", "favourite"),
            sp("organize", "organise"),
            sp("organized", "organised"),
            sp("organization", "organisation"),
            sp("vacation", "holiday"),
            sp("color", "colour"),
            sp("center", "centre"),
            sp("theater", "theatre"),
            sp("traveler", "traveller"),
            sp("traveled", "travelled"),
            sp("traveling", "travelling"),
            sp("realize", "realise"),
            sp("realized", "realised"),
            sp("neighbor", "neighbour"),
            sp("harbor", "harbour"),
        ],
        headline: HeadlineRules {
            max_length: 70,
            required_keywords: vec![
                "travel".to_string(),
                "cruise".to_string(),
                "hotel".to_string(),
                "flight".to_string(),
                "holiday".to_string(),
                "destination".to_string(),
                "tour".to_string(),
                "resort".to_string(),
                "island".to_string(),
                "city".to_string(),
                "guide".to_string(),
            ],
        },
        meta_description_max_length: 155,
        tone: vec![
            "professional".to_string(),
            "factual".to_string(),
            "positive".to_string(),
            "family-friendly".to_string(),
            "inclusive".to_string(),
        ],
        prohibited_keywords: vec![
            "adult".to_string(),
            "explicit".to_string(),
            "graphic".to_string(),
            "violent".to_string(),
            "offensive".to_string(),
            "discriminatory".to_string(),
            "casino".to_string(),
            "gambling".to_string(),
        ],
    }
}

fn default_images() -> ImageConfig {
    let img = |c: &str, u: &str| (c.to_string(), u.to_string());
    ImageConfig {
        default_images: vec![
            img(
                "Cruises",
                "https://images.unsplash.com/photo-1544551763-46a013bb70d5?auto=format&q=80&w=2400",
            ),
            img(
                "Hotels",
                "https://images.unsplash.com/photo-1566073771259-6a8506099945?auto=format&q=80&w=2400",
            ),
            img(
                "Flights",
                "https://images.unsplash.com/photo-1436491865332-7a61a109cc05?auto=format&q=80&w=2400",
            ),
            img(
                "Destinations",
                "https://images.unsplash.com/photo-1488646953014-85cb44e25828?auto=format&q=80&w=2400",
            ),
        ],
        fallback_image:
            "https://images.unsplash.com/photo-1488646953014-85cb44e25828?auto=format&q=80&w=2400"
                .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn group_quota_above_daily_limit_is_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.publishing.groups[0].quota = 9;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rule_for_falls_back_to_default() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.validation.rule_for("Cruises").min_content_length, 300);
        assert_eq!(cfg.validation.rule_for("Unknown").min_content_length, 250);
    }

    #[test]
    fn overrides_replace_daily_limit_and_group_quota() {
        let mut cfg = PipelineConfig::default();
        cfg.apply_overrides(&RunOverrides {
            daily_limit: Some(12),
            group_quotas: vec![("cruise".to_string(), 4)],
        });
        assert_eq!(cfg.publishing.daily_limit, 12);
        assert_eq!(cfg.publishing.groups[0].quota, 4);
    }

    #[serial_test::serial]
    #[test]
    fn load_default_reads_env_path() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("pipeline.json");
        let cfg = PipelineConfig::default();
        std::fs::write(&p, serde_json::to_string(&cfg).unwrap()).unwrap();
        std::env::set_var(ENV_PATH, p.display().to_string());
        let loaded = PipelineConfig::load_default().unwrap();
        assert_eq!(loaded.publishing.daily_limit, 8);
        std::env::remove_var(ENV_PATH);
    }
}
