//! Validator / quality gate. Checks run in order and short-circuit on the
//! first failure; rejected candidates are logged and never retried.

use metrics::counter;
use once_cell::sync::OnceCell;
use tracing::debug;

use crate::config::ValidationConfig;
use crate::feeds::Candidate;

/// Transient result; never persisted, only logged on rejection.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub passed: bool,
    pub reasons: Vec<String>,
}

impl ValidationResult {
    fn pass() -> Self {
        Self {
            passed: true,
            reasons: Vec::new(),
        }
    }

    fn fail(reason: String) -> Self {
        Self {
            passed: false,
            reasons: vec![reason],
        }
    }
}

pub struct Validator {
    cfg: ValidationConfig,
    patterns: Vec<regex::Regex>,
}

impl Validator {
    pub fn new(cfg: ValidationConfig) -> Self {
        let patterns = cfg
            .exclude_patterns
            .iter()
            .filter_map(|p| regex::Regex::new(p).ok())
            .collect();
        Self { cfg, patterns }
    }

    pub fn validate(&self, cand: &Candidate) -> ValidationResult {
        let rule = self.cfg.rule_for(&cand.external_category);

        // (a) required fields present and non-empty
        for field in &rule.required_fields {
            let present = match field.as_str() {
                "title" => !cand.title.trim().is_empty(),
                "link" => !cand.link.trim().is_empty(),
                "content" => !cand.raw_content.trim().is_empty(),
                "author" => cand.author.as_deref().is_some_and(|a| !a.trim().is_empty()),
                other => {
                    debug!(field = other, "unknown required field, treated as present");
                    true
                }
            };
            if !present {
                counter!("pipeline_validation_rejected_total").increment(1);
                return ValidationResult::fail(format!("missing required field: {field}"));
            }
        }

        // (b) minimum content length for the candidate's category
        let len = cand.raw_content.chars().count();
        if len < rule.min_content_length {
            counter!("pipeline_validation_rejected_total").increment(1);
            return ValidationResult::fail(format!(
                "content too short: {len} < {}",
                rule.min_content_length
            ));
        }

        // (c) composite quality score
        let score = quality_score(cand);
        if score < rule.quality_threshold {
            counter!("pipeline_validation_rejected_total").increment(1);
            return ValidationResult::fail(format!(
                "quality score {score:.2} below threshold {:.2}",
                rule.quality_threshold
            ));
        }

        // (d) exclusion keywords and patterns over title + content
        let haystack = format!("{} {}", cand.title, cand.raw_content).to_lowercase();
        for kw in &self.cfg.exclude_keywords {
            if haystack.contains(&kw.to_lowercase()) {
                counter!("pipeline_validation_rejected_total").increment(1);
                return ValidationResult::fail(format!("excluded keyword: {kw}"));
            }
        }
        for re in &self.patterns {
            if re.is_match(&cand.title) || re.is_match(&cand.raw_content) {
                counter!("pipeline_validation_rejected_total").increment(1);
                return ValidationResult::fail(format!("excluded pattern: {}", re.as_str()));
            }
        }

        ValidationResult::pass()
    }
}

/// Weighted composite: relevance 0.3, readability 0.25, completeness 0.25,
/// uniqueness 0.2 (uniqueness is a fixed prior; dedup owns real uniqueness).
pub fn quality_score(cand: &Candidate) -> f64 {
    relevance_score(cand) * 0.3
        + readability_score(&cand.raw_content) * 0.25
        + completeness_score(cand) * 0.25
        + 0.8 * 0.2
}

fn travel_keywords() -> &'static [&'static str] {
    static KW: OnceCell<Vec<&'static str>> = OnceCell::new();
    KW.get_or_init(|| {
        vec![
            "travel",
            "trip",
            "journey",
            "vacation",
            "holiday",
            "destination",
            "hotel",
            "resort",
            "cruise",
            "flight",
            "airport",
            "tour",
            "guide",
            "adventure",
            "explore",
            "discover",
            "visit",
            "experience",
        ]
    })
}

fn relevance_score(cand: &Candidate) -> f64 {
    let content = format!("{} {}", cand.title, cand.raw_content).to_lowercase();
    let matches = travel_keywords()
        .iter()
        .filter(|kw| content.contains(*kw))
        .count();
    (matches as f64 / 5.0).min(1.0)
}

fn readability_score(content: &str) -> f64 {
    let sentences: Vec<&str> = content
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .collect();
    if sentences.is_empty() {
        return 0.0;
    }
    let avg_len =
        sentences.iter().map(|s| s.len()).sum::<usize>() as f64 / sentences.len() as f64;
    let paragraphs = content.split("\n\n").filter(|p| !p.trim().is_empty()).count();

    let length_score = (content.len() as f64 / 1000.0).min(1.0);
    let sentence_score = if (20.0..100.0).contains(&avg_len) { 1.0 } else { 0.5 };
    let paragraph_score = if paragraphs >= 3 { 1.0 } else { 0.5 };
    (length_score + sentence_score + paragraph_score) / 3.0
}

fn completeness_score(cand: &Candidate) -> f64 {
    let mut score = 0.0;
    if cand.title.chars().count() > 10 {
        score += 0.2;
    }
    if !cand.link.is_empty() {
        score += 0.2;
    }
    if cand.raw_content.chars().count() > 300 {
        score += 0.3;
    }
    if cand.image_url.is_some() {
        score += 0.1;
    }
    if cand.author.is_some() {
        score += 0.1;
    }
    if !cand.external_category.is_empty() {
        score += 0.1;
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use chrono::Utc;

    fn good_candidate() -> Candidate {
        let body = "Travellers looking for a quiet holiday have a new favourite. \
            The island's resort strip mixes budget stays with luxury hotels. \
            Local guides recommend booking the harbour tour early in the trip.\n\n\
            Flights arrive daily from three hub airports, and the cruise port \
            reopened last month after a long refit. Visitors should explore the \
            old town on foot before the day-trip crowds arrive each morning.\n\n\
            For families, the destination offers calm beaches and short transfers. \
            Booking ahead remains the best advice for the peak season experience."
            .to_string();
        Candidate {
            source_url: "https://src/rss".into(),
            source_priority: 1,
            title: "Island Destination Draws Record Visitor Numbers".into(),
            link: "https://example.com/island".into(),
            raw_content: body,
            published_at: Utc::now(),
            first_seen_at: Utc::now(),
            author: Some("Jordan Lee".into()),
            image_url: Some("https://example.com/i.jpg".into()),
            external_category: "Destinations".into(),
        }
    }

    fn validator() -> Validator {
        Validator::new(PipelineConfig::default().validation)
    }

    #[test]
    fn good_candidate_passes() {
        let res = validator().validate(&good_candidate());
        assert!(res.passed, "reasons: {:?}", res.reasons);
    }

    #[test]
    fn missing_content_fails_on_required_field() {
        let mut c = good_candidate();
        c.raw_content = String::new();
        let res = validator().validate(&c);
        assert!(!res.passed);
        assert!(res.reasons[0].contains("required field"));
    }

    #[test]
    fn short_content_fails_length_check() {
        let mut c = good_candidate();
        c.raw_content = "A short travel note about a hotel and a cruise.".into();
        let res = validator().validate(&c);
        assert!(!res.passed);
        assert!(res.reasons[0].contains("too short"));
    }

    #[test]
    fn excluded_keyword_rejects() {
        let mut c = good_candidate();
        c.raw_content.push_str(" The new casino opens next year.");
        let res = validator().validate(&c);
        assert!(!res.passed);
        assert!(res.reasons[0].contains("casino") || res.reasons[0].contains("pattern"));
    }

    #[test]
    fn quality_score_rewards_structure() {
        let good = quality_score(&good_candidate());
        let mut poor = good_candidate();
        poor.raw_content = "travel ".repeat(60); // long enough, no sentences
        poor.image_url = None;
        poor.author = None;
        assert!(good > quality_score(&poor));
    }
}
