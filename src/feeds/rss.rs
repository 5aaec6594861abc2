//! RSS 2.0 parsing via quick-xml serde deserialization.
//!
//! Feeds in the wild carry loose HTML entities that break strict XML
//! parsing, so a scrub pass runs first. Publication dates are RFC 2822.

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use serde::Deserialize;
use time::{format_description::well_known::Rfc2822, OffsetDateTime, UtcOffset};

use crate::error::FetchError;
use crate::feeds::RawEntry;

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
    /// `content:encoded`; quick-xml matches on the local name.
    #[serde(rename = "encoded")]
    content_encoded: Option<String>,
    /// `dc:creator` or plain `author`.
    #[serde(rename = "creator")]
    creator: Option<String>,
    author: Option<String>,
    #[serde(rename = "category", default)]
    category: Vec<String>,
    enclosure: Option<Enclosure>,
}

#[derive(Debug, Deserialize)]
struct Enclosure {
    #[serde(rename = "@url")]
    url: Option<String>,
    #[serde(rename = "@type")]
    mime: Option<String>,
}

fn parse_rfc2822(ts: &str) -> Option<DateTime<Utc>> {
    OffsetDateTime::parse(ts, &Rfc2822)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC).unix_timestamp())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
}

/// Parse an RSS 2.0 document into raw entries. Items without a title or
/// link are skipped; the validator handles everything else.
pub fn parse(xml: &str) -> Result<Vec<RawEntry>, FetchError> {
    let t0 = std::time::Instant::now();
    let clean = scrub_html_entities_for_xml(xml);
    let rss: Rss = from_str(&clean).map_err(|e| FetchError::Parse(e.to_string()))?;

    let mut out = Vec::with_capacity(rss.channel.item.len());
    for it in rss.channel.item {
        let title = it.title.unwrap_or_default().trim().to_string();
        let link = it.link.unwrap_or_default().trim().to_string();
        if title.is_empty() || link.is_empty() {
            continue;
        }
        let content = it
            .content_encoded
            .or(it.description)
            .unwrap_or_default()
            .trim()
            .to_string();
        let image_url = it.enclosure.and_then(|e| {
            let is_image = e
                .mime
                .as_deref()
                .map(|m| m.starts_with("image/"))
                .unwrap_or(true);
            if is_image {
                e.url
            } else {
                None
            }
        });

        out.push(RawEntry {
            title,
            link,
            content,
            published_at: it.pub_date.as_deref().and_then(parse_rfc2822),
            author: it.creator.or(it.author),
            category: it.category.into_iter().next(),
            image_url,
        });
    }

    let ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("pipeline_feed_parse_ms").record(ms);
    counter!("pipeline_feed_entries_total").increment(out.len() as u64);
    Ok(out)
}

fn scrub_html_entities_for_xml(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace("&ndash;", "-")
        .replace("&mdash;", "-")
        .replace("&ldquo;", "\"")
        .replace("&rdquo;", "\"")
        .replace("&lsquo;", "'")
        .replace("&rsquo;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Travel Wire</title>
    <item>
      <title>Ten Hidden Beaches Worth the Trip</title>
      <link>https://example.com/beaches</link>
      <pubDate>Mon, 03 Mar 2025 09:00:00 GMT</pubDate>
      <category>Travel</category>
      <description>Sand, surf &ndash; and not a crowd in sight.</description>
      <enclosure url="https://example.com/img.jpg" type="image/jpeg"/>
    </item>
    <item>
      <title></title>
      <link>https://example.com/untitled</link>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_items_and_skips_titleless() {
        let entries = parse(SAMPLE).unwrap();
        assert_eq!(entries.len(), 1);
        let e = &entries[0];
        assert_eq!(e.title, "Ten Hidden Beaches Worth the Trip");
        assert_eq!(e.category.as_deref(), Some("Travel"));
        assert_eq!(e.image_url.as_deref(), Some("https://example.com/img.jpg"));
        assert!(e.published_at.is_some());
        assert!(e.content.contains("crowd"));
    }

    #[test]
    fn bad_xml_is_a_parse_error() {
        assert!(parse("<rss><channel><item>").is_err());
    }

    #[test]
    fn rfc2822_dates_roundtrip_to_utc() {
        let dt = parse_rfc2822("Tue, 01 Jul 2025 12:30:00 +1000").unwrap();
        assert_eq!(dt.timestamp(), 1751337000);
    }
}
