// src/cluster.rs
//! Story clustering. Pure, testable logic: token bags over title+description,
//! term-frequency cosine, one greedy pass at a fixed threshold. The title-set
//! hash is the dedup key across runs, so it must be invariant under article
//! ordering.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::ingest::types::Article;
use crate::sources::{Reliability, SourceCategory};

/// Cosine threshold for two articles to share a cluster.
pub const SIMILARITY_THRESHOLD: f64 = 0.35;

/// Common English particles plus domain-noise tokens that would otherwise
/// glue every story in the corpus together.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "have", "has", "had", "was", "were",
    "are", "been", "will", "would", "could", "should", "but", "not", "its", "his", "her", "their",
    "they", "them", "who", "what", "when", "where", "which", "while", "after", "before", "over",
    "under", "into", "onto", "about", "than", "then", "there", "here", "out", "off", "all", "any",
    "more", "most", "some", "such", "can", "may", "also", "among", "amid", "between", "during",
    "says", "said", "new", "south", "sudan", "sudanese",
];

#[derive(Debug, Clone)]
pub struct Cluster {
    /// Sorted by (reliability rank desc, published_at desc); head is primary.
    pub articles: Vec<Article>,
    pub sources: BTreeSet<String>,
    pub latest_date: DateTime<Utc>,
    pub image: Option<String>,
    pub cluster_hash: String,
}

impl Cluster {
    pub fn primary(&self) -> &Article {
        &self.articles[0]
    }

    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    pub fn category(&self) -> SourceCategory {
        self.primary().source_category
    }

    pub fn reliabilities(&self) -> impl Iterator<Item = Reliability> + '_ {
        self.articles.iter().map(|a| a.source_reliability)
    }
}

/// Token bag of `title + " " + description`: lowercase, strip non-alphanumerics,
/// drop short tokens and stopwords.
pub fn tokenize(title: &str, description: &str) -> Vec<String> {
    let mut text = String::with_capacity(title.len() + description.len() + 1);
    text.push_str(title);
    text.push(' ');
    text.push_str(description);

    let lowered: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    lowered
        .split_whitespace()
        .filter(|t| t.len() > 2)
        .filter(|t| !STOPWORDS.contains(t))
        .map(|t| t.to_string())
        .collect()
}

fn term_freq(tokens: &[String]) -> HashMap<&str, f64> {
    let mut tf: HashMap<&str, f64> = HashMap::new();
    for t in tokens {
        *tf.entry(t.as_str()).or_insert(0.0) += 1.0;
    }
    tf
}

/// Cosine over term-frequency vectors; 0.0 when either side is empty.
pub fn cosine_similarity(a: &[String], b: &[String]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let ta = term_freq(a);
    let tb = term_freq(b);

    let dot: f64 = ta
        .iter()
        .filter_map(|(tok, va)| tb.get(tok).map(|vb| va * vb))
        .sum();
    if dot == 0.0 {
        return 0.0;
    }
    let na: f64 = ta.values().map(|v| v * v).sum::<f64>().sqrt();
    let nb: f64 = tb.values().map(|v| v * v).sum::<f64>().sqrt();
    dot / (na * nb)
}

/// Deterministic dedup key: MD5 of the pipe-joined, sorted, lowercased,
/// trimmed titles. Stable under article reordering by construction.
pub fn cluster_hash(titles: &[&str]) -> String {
    let mut normalized: Vec<String> = titles
        .iter()
        .map(|t| t.trim().to_lowercase())
        .collect();
    normalized.sort();
    let joined = normalized.join("|");
    format!("{:x}", md5::compute(joined.as_bytes()))
}

/// Greedy single-pass grouping, then per-cluster ordering and hash.
/// Output clusters are sorted by latest article date, newest first.
pub fn cluster_articles(articles: Vec<Article>) -> Vec<Cluster> {
    let bags: Vec<Vec<String>> = articles
        .iter()
        .map(|a| tokenize(&a.title, &a.description))
        .collect();

    let n = articles.len();
    let mut assigned = vec![false; n];
    let mut groups: Vec<Vec<usize>> = Vec::new();

    for i in 0..n {
        if assigned[i] {
            continue;
        }
        assigned[i] = true;
        let mut group = vec![i];
        for j in (i + 1)..n {
            if assigned[j] {
                continue;
            }
            if cosine_similarity(&bags[i], &bags[j]) >= SIMILARITY_THRESHOLD {
                assigned[j] = true;
                group.push(j);
            }
        }
        groups.push(group);
    }

    let mut articles: Vec<Option<Article>> = articles.into_iter().map(Some).collect();
    let mut clusters: Vec<Cluster> = groups
        .into_iter()
        .map(|group| {
            let mut members: Vec<Article> = group
                .into_iter()
                .filter_map(|i| articles[i].take())
                .collect();
            build_cluster(&mut members)
        })
        .collect();

    clusters.sort_by(|a, b| b.latest_date.cmp(&a.latest_date));
    clusters
}

fn build_cluster(members: &mut Vec<Article>) -> Cluster {
    // Primary selection: reliability tier first, recency second.
    members.sort_by(|a, b| {
        b.source_reliability
            .rank()
            .cmp(&a.source_reliability.rank())
            .then(b.published_at.cmp(&a.published_at))
    });

    let titles: Vec<&str> = members.iter().map(|a| a.title.as_str()).collect();
    let hash = cluster_hash(&titles);

    let sources: BTreeSet<String> = members.iter().map(|a| a.source.clone()).collect();
    let latest_date = members
        .iter()
        .map(|a| a.published_at)
        .max()
        .expect("cluster is non-empty");
    let image = members.iter().find_map(|a| a.image.clone());

    Cluster {
        articles: std::mem::take(members),
        sources,
        latest_date,
        image,
        cluster_hash: hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn article(title: &str, source: &str, rel: Reliability, ts: i64) -> Article {
        Article {
            id: format!("{source}|{title}"),
            title: title.to_string(),
            description: String::new(),
            url: format!("https://example.org/{}", title.len()),
            image: None,
            published_at: Utc.timestamp_opt(ts, 0).unwrap(),
            source: source.to_string(),
            source_category: SourceCategory::Regional,
            source_reliability: rel,
            raw_body: String::new(),
        }
    }

    #[test]
    fn hash_invariant_under_permutation() {
        let a = cluster_hash(&["Clash in Upper Nile", "Upper Nile clash reported"]);
        let b = cluster_hash(&["Upper Nile clash reported", "Clash in Upper Nile"]);
        assert_eq!(a, b);

        let c = cluster_hash(&[
            "Clash in Upper Nile",
            "Upper Nile clash reported",
            "Completely different wording",
        ]);
        assert_ne!(a, c);
    }

    #[test]
    fn hash_normalizes_case_and_whitespace() {
        let a = cluster_hash(&["  Clash in Upper Nile  "]);
        let b = cluster_hash(&["clash in upper nile"]);
        assert_eq!(a, b);
    }

    #[test]
    fn similar_titles_share_a_cluster() {
        let articles = vec![
            article("Kiir meets Machar in Juba", "Sudan Tribune", Reliability::Medium, 2_000),
            article("Machar, Kiir hold Juba meeting", "Eye Radio", Reliability::Medium, 1_000),
            article("Floods displace 10000 in Jonglei", "Radio Tamazuj", Reliability::Medium, 1_500),
        ];
        let clusters = cluster_articles(articles);
        assert_eq!(clusters.len(), 2);
        let meeting = clusters
            .iter()
            .find(|c| c.articles.len() == 2)
            .expect("merged cluster");
        assert_eq!(meeting.source_count(), 2);
    }

    #[test]
    fn primary_prefers_reliability_then_recency() {
        let articles = vec![
            article("Ceasefire announced in Khartoum talks", "Google News Sudan", Reliability::Aggregator, 3_000),
            article("Khartoum talks ceasefire announced today", "BBC Africa", Reliability::High, 1_000),
            article("Ceasefire announced after Khartoum talks", "Sudan Tribune", Reliability::Medium, 2_000),
        ];
        let clusters = cluster_articles(articles);
        assert_eq!(clusters.len(), 1);
        let c = &clusters[0];
        assert_eq!(c.primary().source, "BBC Africa");
        assert_eq!(c.latest_date.timestamp(), 3_000);
    }

    #[test]
    fn first_nonempty_image_is_kept() {
        let mut a = article("Attack on convoy near Bentiu town", "Eye Radio", Reliability::Medium, 2_000);
        a.image = None;
        let mut b = article("Convoy attacked near Bentiu town", "Radio Tamazuj", Reliability::Medium, 1_000);
        b.image = Some("https://img.example.org/x.jpg".into());
        let clusters = cluster_articles(vec![a, b]);
        assert_eq!(clusters.len(), 1);
        assert_eq!(
            clusters[0].image.as_deref(),
            Some("https://img.example.org/x.jpg")
        );
    }

    #[test]
    fn cosine_threshold_separates_unrelated_stories() {
        let a = tokenize("Kiir meets Machar in Juba", "");
        let b = tokenize("Machar, Kiir hold Juba meeting", "");
        assert!(cosine_similarity(&a, &b) >= SIMILARITY_THRESHOLD);

        let c = tokenize("Floods displace 10000 in Jonglei", "");
        assert!(cosine_similarity(&a, &c) < SIMILARITY_THRESHOLD);
    }
}
