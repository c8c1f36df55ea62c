// src/sources.rs
//! Curated syndication sources for the two coverage areas. Immutable config,
//! created once at startup; reliability feeds primary-article selection and
//! source-tier derivation downstream.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceCategory {
    International,
    Regional,
    Local,
    Humanitarian,
    General,
}

impl SourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceCategory::International => "international",
            SourceCategory::Regional => "regional",
            SourceCategory::Local => "local",
            SourceCategory::Humanitarian => "humanitarian",
            SourceCategory::General => "general",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reliability {
    High,
    Medium,
    Aggregator,
}

impl Reliability {
    /// Rank used for primary-article selection: high=3, medium=2, aggregator=1.
    pub fn rank(&self) -> u8 {
        match self {
            Reliability::High => 3,
            Reliability::Medium => 2,
            Reliability::Aggregator => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Reliability::High => "high",
            Reliability::Medium => "medium",
            Reliability::Aggregator => "aggregator",
        }
    }
}

/// Tier stamped on extracted events: the best tier among a cluster's sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTier {
    Tier1,
    Tier2,
    Tier3,
}

impl SourceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTier::Tier1 => "tier1",
            SourceTier::Tier2 => "tier2",
            SourceTier::Tier3 => "tier3",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "tier1" => Some(SourceTier::Tier1),
            "tier2" => Some(SourceTier::Tier2),
            "tier3" => Some(SourceTier::Tier3),
            _ => None,
        }
    }

    pub fn from_reliability(r: Reliability) -> Self {
        match r {
            Reliability::High => SourceTier::Tier1,
            Reliability::Medium => SourceTier::Tier2,
            Reliability::Aggregator => SourceTier::Tier3,
        }
    }
}

/// Highest tier present among reliabilities (Tier1 beats Tier2 beats Tier3).
pub fn best_tier(reliabilities: impl IntoIterator<Item = Reliability>) -> SourceTier {
    reliabilities
        .into_iter()
        .map(SourceTier::from_reliability)
        .min()
        .unwrap_or(SourceTier::Tier3)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub name: String,
    pub url: String,
    pub category: SourceCategory,
    pub reliability: Reliability,
}

impl Source {
    fn new(name: &str, url: &str, category: SourceCategory, reliability: Reliability) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            category,
            reliability,
        }
    }
}

/// The production feed list. Aggregator entries return opaque redirect URLs
/// that the resolver unwraps later in the cycle.
pub fn default_sources() -> Vec<Source> {
    use Reliability::*;
    use SourceCategory::*;
    vec![
        Source::new(
            "Sudan Tribune",
            "https://sudantribune.com/feed/",
            Regional,
            Medium,
        ),
        Source::new(
            "Radio Tamazuj",
            "https://www.radiotamazuj.org/en/rss",
            Local,
            Medium,
        ),
        Source::new(
            "Eye Radio",
            "https://www.eyeradio.org/feed/",
            Local,
            Medium,
        ),
        Source::new(
            "Radio Dabanga",
            "https://www.dabangasudan.org/en/all-news/rss",
            Local,
            Medium,
        ),
        Source::new(
            "UN News Africa",
            "https://news.un.org/feed/subscribe/en/news/region/africa/feed/rss.xml",
            International,
            High,
        ),
        Source::new(
            "ReliefWeb South Sudan",
            "https://reliefweb.int/updates/rss.xml?advanced-search=%28C8657%29",
            Humanitarian,
            High,
        ),
        Source::new(
            "ReliefWeb Sudan",
            "https://reliefweb.int/updates/rss.xml?advanced-search=%28C216%29",
            Humanitarian,
            High,
        ),
        Source::new(
            "Al Jazeera Africa",
            "https://www.aljazeera.com/xml/rss/all.xml",
            International,
            High,
        ),
        Source::new(
            "BBC Africa",
            "https://feeds.bbci.co.uk/news/world/africa/rss.xml",
            International,
            High,
        ),
        Source::new(
            "AllAfrica South Sudan",
            "https://allafrica.com/tools/headlines/rdf/southsudan/headlines.rdf",
            Regional,
            Medium,
        ),
        Source::new(
            "AllAfrica Sudan",
            "https://allafrica.com/tools/headlines/rdf/sudan/headlines.rdf",
            Regional,
            Medium,
        ),
        Source::new(
            "The East African",
            "https://www.theeastafrican.co.ke/service/rss/688334-688334-view-asFeed-kthc3vz/index.xml",
            Regional,
            Medium,
        ),
        Source::new(
            "Google News South Sudan",
            "https://news.google.com/rss/search?q=%22south%20sudan%22&hl=en-US&gl=US&ceid=US:en",
            General,
            Aggregator,
        ),
        Source::new(
            "Google News Sudan",
            "https://news.google.com/rss/search?q=sudan%20OR%20khartoum%20OR%20darfur&hl=en-US&gl=US&ceid=US:en",
            General,
            Aggregator,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reliability_rank_order() {
        assert!(Reliability::High.rank() > Reliability::Medium.rank());
        assert!(Reliability::Medium.rank() > Reliability::Aggregator.rank());
    }

    #[test]
    fn best_tier_takes_highest_present() {
        let tier = best_tier([Reliability::Aggregator, Reliability::High]);
        assert_eq!(tier, SourceTier::Tier1);
        let tier = best_tier([Reliability::Aggregator, Reliability::Medium]);
        assert_eq!(tier, SourceTier::Tier2);
        assert_eq!(best_tier([]), SourceTier::Tier3);
    }

    #[test]
    fn default_sources_have_distinct_names() {
        let sources = default_sources();
        let mut names: Vec<_> = sources.iter().map(|s| s.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), sources.len());
    }
}
