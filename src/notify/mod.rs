// src/notify/mod.rs
pub mod email;

use crate::digest::Digest;

/// Weekly digest subject line, e.g.
/// `Horn Risk Delta — Week 31 | 42 events, 6 high-severity`.
pub fn digest_subject(digest: &Digest) -> String {
    let mut subject = format!(
        "Horn Risk Delta — Week {} | {} events",
        digest.week_number, digest.topline.total_this_week
    );
    let high = digest.high_severity.len();
    if high > 0 {
        subject.push_str(&format!(", {high} high-severity"));
    }
    subject
}
