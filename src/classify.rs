//! Classifier: external label -> canonical taxonomy. Direct lookup first,
//! then keyword scoring, then the configured default. Pure and
//! side-effect-free.

use serde::{Deserialize, Serialize};

use crate::config::CategoryConfig;
use crate::feeds::Candidate;

/// How the canonical category was chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "matched_via", rename_all = "lowercase")]
pub enum MatchedVia {
    Direct,
    Keyword { hit_count: usize },
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryAssignment {
    pub canonical_category: String,
    pub matched_via: MatchedVia,
}

pub fn classify(cand: &Candidate, cfg: &CategoryConfig) -> CategoryAssignment {
    // 1) direct mapping, case-insensitive exact match
    if let Some(m) = cfg
        .mappings
        .iter()
        .find(|m| m.external.eq_ignore_ascii_case(&cand.external_category))
    {
        return CategoryAssignment {
            canonical_category: m.canonical.clone(),
            matched_via: MatchedVia::Direct,
        };
    }

    // 2) keyword scoring over title + content; ties break by declared order
    let haystack = format!("{} {}", cand.title, cand.raw_content).to_lowercase();
    let mut best: Option<(&str, usize)> = None;
    for entry in &cfg.keywords {
        let hits = entry
            .keywords
            .iter()
            .filter(|kw| haystack.contains(&kw.to_lowercase()))
            .count();
        if hits > 0 && best.map_or(true, |(_, b)| hits > b) {
            best = Some((&entry.category, hits));
        }
    }
    if let Some((category, hit_count)) = best {
        return CategoryAssignment {
            canonical_category: category.to_string(),
            matched_via: MatchedVia::Keyword { hit_count },
        };
    }

    // 3) configured default
    CategoryAssignment {
        canonical_category: cfg.default_category.clone(),
        matched_via: MatchedVia::Default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use chrono::Utc;

    fn cand(external: &str, title: &str, content: &str) -> Candidate {
        Candidate {
            source_url: "https://src/rss".into(),
            source_priority: 1,
            title: title.into(),
            link: "https://example.com/x".into(),
            raw_content: content.into(),
            published_at: Utc::now(),
            first_seen_at: Utc::now(),
            author: None,
            image_url: None,
            external_category: external.into(),
        }
    }

    #[test]
    fn every_mapping_resolves_direct() {
        let cfg = PipelineConfig::default().categories;
        for m in &cfg.mappings {
            let a = classify(&cand(&m.external, "t", "c"), &cfg);
            assert_eq!(a.matched_via, MatchedVia::Direct);
            assert_eq!(a.canonical_category, m.canonical);
        }
    }

    #[test]
    fn direct_match_is_case_insensitive() {
        let cfg = PipelineConfig::default().categories;
        let a = classify(&cand("cruise news", "t", "c"), &cfg);
        assert_eq!(a.canonical_category, "Cruises");
        assert_eq!(a.matched_via, MatchedVia::Direct);
    }

    #[test]
    fn keyword_fallback_picks_most_hits() {
        let cfg = PipelineConfig::default().categories;
        let a = classify(
            &cand(
                "Unmapped",
                "New flight routes",
                "The airline opens an airport hub with extra aviation capacity",
            ),
            &cfg,
        );
        assert_eq!(a.canonical_category, "Flights");
        assert_eq!(a.matched_via, MatchedVia::Keyword { hit_count: 4 });
    }

    #[test]
    fn keyword_tie_breaks_by_declared_order() {
        let cfg = PipelineConfig::default().categories;
        // one hit each for Cruises ("ship") and Hotels ("hotel"); Cruises is
        // declared first
        let a = classify(&cand("Unmapped", "ship hotel", ""), &cfg);
        assert_eq!(a.canonical_category, "Cruises");
    }

    #[test]
    fn no_match_yields_configured_default() {
        let cfg = PipelineConfig::default().categories;
        let a = classify(&cand("Unmapped", "quarterly earnings report", "markets"), &cfg);
        assert_eq!(a.canonical_category, "Destinations");
        assert_eq!(a.matched_via, MatchedVia::Default);
    }
}
