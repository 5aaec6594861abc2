//! House-style enforcement over rewrite-service output.
//!
//! Locale spelling is a deterministic fix-up pass applied after the service
//! responds; headline/meta/prohibited checks are validated against the
//! response, not merely requested of the service.

use once_cell::sync::OnceCell;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Mutex;

use crate::config::{SpellingRule, StyleProfile};

/// Small words left lowercase in Title Case unless they lead the headline.
const MINOR_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "but", "by", "for", "in", "of", "on", "or", "the", "to", "with",
];

/// Apply locale spelling substitutions, whole-word and case-preserving.
pub fn apply_spellings(text: &str, rules: &[SpellingRule]) -> String {
    static CACHE: OnceCell<Mutex<HashMap<String, Regex>>> = OnceCell::new();
    let cache = CACHE.get_or_init(|| Mutex::new(HashMap::new()));

    let mut out = text.to_string();
    for rule in rules {
        let re = {
            let mut g = cache.lock().expect("spelling regex cache");
            g.entry(rule.from.clone())
                .or_insert_with(|| {
                    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&rule.from)))
                        .expect("spelling rule regex")
                })
                .clone()
        };
        out = re
            .replace_all(&out, |caps: &regex::Captures| {
                let matched = &caps[0];
                if matched.chars().next().is_some_and(|c| c.is_uppercase()) {
                    capitalize(&rule.to)
                } else {
                    rule.to.clone()
                }
            })
            .to_string();
    }
    out
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Title Case: lowercase words get capitalized, minor words stay lowercase
/// past the first position, and anything already carrying uppercase
/// (acronyms, proper casing from the service) is left alone.
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .enumerate()
        .map(|(i, w)| {
            let lower = w.to_lowercase();
            if i > 0 && MINOR_WORDS.contains(&lower.as_str()) {
                lower
            } else if w.chars().any(|c| c.is_uppercase()) {
                w.to_string()
            } else {
                capitalize(w)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// URL slug: lowercase, non-word stripped, hyphenated, capped at 50 chars.
pub fn slug(title: &str) -> String {
    static RE_NONWORD: OnceCell<Regex> = OnceCell::new();
    let re = RE_NONWORD.get_or_init(|| Regex::new(r"[^\w\s-]").unwrap());
    let lowered = title.to_lowercase();
    let cleaned = re.replace_all(&lowered, "");
    let hyphenated = cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");
    let mut s: String = hyphenated.chars().take(50).collect();
    while s.ends_with('-') {
        s.pop();
    }
    s
}

/// Word-boundary truncation with an ellipsis.
pub fn excerpt(content: &str, max_length: usize) -> String {
    static RE_TAGS: OnceCell<Regex> = OnceCell::new();
    let re = RE_TAGS.get_or_init(|| Regex::new(r"<[^>]*>").unwrap());
    let clean = re.replace_all(content, "").trim().to_string();
    if clean.chars().count() <= max_length {
        return clean;
    }
    let cut: String = clean.chars().take(max_length).collect();
    let trimmed = match cut.rfind(' ') {
        Some(pos) => &cut[..pos],
        None => &cut,
    };
    format!("{}...", trimmed.trim_end())
}

const TAG_VOCABULARY: &[&str] = &[
    "travel", "adventure", "culture", "food", "luxury", "budget", "family", "solo", "romantic",
    "business", "nature", "urban",
];

/// Up to 5 tags matched from the fixed travel vocabulary.
pub fn extract_tags(title: &str, content: &str) -> Vec<String> {
    let haystack = format!("{title} {content}").to_lowercase();
    TAG_VOCABULARY
        .iter()
        .filter(|t| haystack.contains(*t))
        .take(5)
        .map(|t| t.to_string())
        .collect()
}

/// Scan text against the prohibited list; returns the offending keywords.
pub fn prohibited_hits(profile: &StyleProfile, text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    profile
        .prohibited_keywords
        .iter()
        .filter(|kw| lower.contains(&kw.to_lowercase()))
        .cloned()
        .collect()
}

/// Check the headline against the profile: length cap and required travel
/// keyword presence (keyword check, not grammar).
pub fn headline_violations(profile: &StyleProfile, headline: &str) -> Vec<String> {
    let mut out = Vec::new();
    let len = headline.chars().count();
    if len > profile.headline.max_length {
        out.push(format!(
            "headline too long: {len} > {}",
            profile.headline.max_length
        ));
    }
    let lower = headline.to_lowercase();
    let has_keyword = profile
        .headline
        .required_keywords
        .iter()
        .any(|kw| lower.contains(&kw.to_lowercase()));
    if !has_keyword {
        out.push("headline missing travel keyword".to_string());
    }
    out
}
