// src/ingest/types.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::sources::{Reliability, SourceCategory};

/// Normalized syndication item. Ephemeral: rebuilt on every ingest cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Article {
    pub id: String,
    pub title: String,
    /// HTML-stripped, capped at 500 chars.
    pub description: String,
    pub url: String,
    pub image: Option<String>,
    pub published_at: DateTime<Utc>,
    pub source: String,
    pub source_category: SourceCategory,
    pub source_reliability: Reliability,
    /// Raw item payload kept for the resolver's anchor scan; not serialized out.
    #[serde(skip)]
    pub raw_body: String,
}

/// One parsed feed entry before normalization. Field names mirror what the
/// wire formats actually carry; everything is optional because feeds are.
#[derive(Debug, Clone, Default)]
pub struct FeedItem {
    pub title: Option<String>,
    pub link: Option<String>,
    pub guid: Option<String>,
    pub description: Option<String>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub content_encoded: Option<String>,
    pub pub_date: Option<String>,
    pub iso_date: Option<String>,
    pub enclosure_url: Option<String>,
    pub enclosure_type: Option<String>,
    pub media_content_urls: Vec<String>,
    pub media_thumbnail_urls: Vec<String>,
}

impl FeedItem {
    /// Snippet preferred for the description field: snippet | summary | content.
    pub fn best_snippet(&self) -> &str {
        self.description
            .as_deref()
            .or(self.summary.as_deref())
            .or(self.content.as_deref())
            .unwrap_or("")
    }

    /// Body text used by the relevance filter: snippet + full content.
    pub fn filter_body(&self) -> String {
        let mut body = String::new();
        body.push_str(self.best_snippet());
        if let Some(c) = &self.content {
            body.push(' ');
            body.push_str(c);
        }
        if let Some(c) = &self.content_encoded {
            body.push(' ');
            body.push_str(c);
        }
        body
    }

    /// All markup-bearing payload fields, scanned by the URL resolver.
    pub fn payload_fields(&self) -> impl Iterator<Item = &str> {
        [
            self.content.as_deref(),
            self.description.as_deref(),
            self.summary.as_deref(),
            self.content_encoded.as_deref(),
        ]
        .into_iter()
        .flatten()
    }
}
