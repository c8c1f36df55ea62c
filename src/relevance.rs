// src/relevance.rs
//! Topical relevance gate. Two keyword banks per coverage area: STRONG terms
//! are title-sufficient, SUPPORTING terms are counted in the body. The lists
//! are deliberately hard-coded; drift is an operational concern.

/// Title-sufficient terms for South Sudan coverage.
pub(crate) const STRONG_SOUTH_SUDAN: &[&str] = &[
    "south sudan",
    "south sudanese",
    "salva kiir",
    "riek machar",
    "unmiss",
    "juba government",
    "splm-io",
];

/// Title-sufficient terms for Sudan coverage.
pub(crate) const STRONG_SUDAN: &[&str] = &[
    "khartoum",
    "sudan war",
    "sudanese army",
    "rapid support forces",
    "rsf",
    "al-burhan",
    "al burhan",
    "hemedti",
    "darfur",
    "port sudan",
];

/// Body-counted terms for South Sudan; threshold 2.
pub(crate) const SUPPORTING_SOUTH_SUDAN: &[&str] = &[
    "juba",
    "kiir",
    "machar",
    "unmiss",
    "splm",
    "spla",
    "jonglei",
    "upper nile",
    "equatoria",
    "unity state",
    "warrap",
    "bahr el ghazal",
    "malakal",
    "bentiu",
    "abyei",
    "white nile",
    "transitional government",
];

/// Body-counted terms for Sudan; threshold 3 (2 when `sudan` is in the title).
pub(crate) const SUPPORTING_SUDAN: &[&str] = &[
    "darfur",
    "el fasher",
    "al fasher",
    "nyala",
    "el geneina",
    "omdurman",
    "port sudan",
    "kordofan",
    "gezira",
    "wad madani",
    "burhan",
    "hemedti",
    "rapid support",
    "sudanese armed forces",
    "el obeid",
    "merowe",
];

fn count_hits(haystack: &str, needles: &[&str]) -> usize {
    needles.iter().filter(|n| haystack.contains(*n)).count()
}

fn any_hit(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(*n))
}

/// Accept/reject one item. `title` and `body` are compared case-insensitively;
/// the caller passes body = snippet + " " + content.
pub fn is_relevant(title: &str, body: &str) -> bool {
    let title = title.to_lowercase();
    let body = body.to_lowercase();

    // 1) STRONG match in the title is sufficient on its own.
    if any_hit(&title, STRONG_SOUTH_SUDAN) || any_hit(&title, STRONG_SUDAN) {
        return true;
    }

    // 2) Bare `sudan` in the title needs corroboration from the body.
    if title.contains("sudan") && !title.contains("south sudan") {
        if count_hits(&body, SUPPORTING_SUDAN) >= 2 {
            return true;
        }
    }

    // 3) Body-only acceptance: two South Sudan markers, or three Sudan markers.
    if count_hits(&body, SUPPORTING_SOUTH_SUDAN) >= 2 {
        return true;
    }
    if count_hits(&body, SUPPORTING_SUDAN) >= 3 {
        return true;
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strong_title_match_accepts() {
        assert!(is_relevant("South Sudan peace talks resume", ""));
        assert!(is_relevant("RSF shelling hits El Fasher", ""));
        assert!(is_relevant("Hemedti speech draws criticism", ""));
    }

    #[test]
    fn body_supporting_accepts_two_south_sudan_markers() {
        // Boundary scenario: body carries `juba` and `unmiss`.
        assert!(is_relevant(
            "Kiir addresses nation in Juba",
            "The president spoke in Juba while UNMISS observers attended."
        ));
    }

    #[test]
    fn single_supporting_mention_rejects() {
        assert!(!is_relevant(
            "Uganda tourism boom",
            "Visitors can also connect through Juba on some routings."
        ));
    }

    #[test]
    fn bare_sudan_title_needs_two_body_markers() {
        assert!(is_relevant(
            "Sudan ceasefire talks stall",
            "Fighting continued around Omdurman as Burhan's delegation left."
        ));
        assert!(!is_relevant(
            "Sudan qualifies for cup",
            "The squad trained in Cairo before the fixture."
        ));
    }

    #[test]
    fn three_sudan_markers_accept_without_title_signal() {
        assert!(is_relevant(
            "Aid agencies warn of famine",
            "Convoys bound for Nyala and El Obeid stalled while Kordofan routes stayed closed."
        ));
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert!(is_relevant("UNMISS condemns attack", ""));
        assert!(is_relevant("KHARTOUM under fire", ""));
    }
}
