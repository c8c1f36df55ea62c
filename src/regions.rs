// src/regions.rs
//! Region containment for fuzzy overlap. Admin geography is a shallow tree:
//! locality → state → historical region. Two region lists "overlap" when any
//! pair meets in that tree, which lets `El Fasher` bundle with `North Darfur`
//! without a gazetteer.

use std::collections::HashMap;

use once_cell::sync::Lazy;

/// child → ancestors, nearest first.
static ANCESTORS: Lazy<HashMap<&'static str, &'static [&'static str]>> = Lazy::new(|| {
    HashMap::from([
        // Sudan
        ("el fasher", &["north darfur", "darfur"][..]),
        ("al fasher", &["north darfur", "darfur"][..]),
        ("nyala", &["south darfur", "darfur"][..]),
        ("el geneina", &["west darfur", "darfur"][..]),
        ("zalingei", &["central darfur", "darfur"][..]),
        ("ed daein", &["east darfur", "darfur"][..]),
        ("north darfur", &["darfur"][..]),
        ("south darfur", &["darfur"][..]),
        ("west darfur", &["darfur"][..]),
        ("central darfur", &["darfur"][..]),
        ("east darfur", &["darfur"][..]),
        ("omdurman", &["khartoum"][..]),
        ("bahri", &["khartoum"][..]),
        ("khartoum north", &["khartoum"][..]),
        ("wad madani", &["gezira"][..]),
        ("el obeid", &["north kordofan", "kordofan"][..]),
        ("kadugli", &["south kordofan", "kordofan"][..]),
        ("babanusa", &["west kordofan", "kordofan"][..]),
        ("north kordofan", &["kordofan"][..]),
        ("south kordofan", &["kordofan"][..]),
        ("west kordofan", &["kordofan"][..]),
        ("port sudan", &["red sea"][..]),
        ("kassala town", &["kassala"][..]),
        ("ed damazin", &["blue nile"][..]),
        // South Sudan
        ("juba", &["central equatoria"][..]),
        ("yei", &["central equatoria"][..]),
        ("torit", &["eastern equatoria"][..]),
        ("yambio", &["western equatoria"][..]),
        ("malakal", &["upper nile"][..]),
        ("nasir", &["upper nile"][..]),
        ("renk", &["upper nile"][..]),
        ("bentiu", &["unity"][..]),
        ("bor", &["jonglei"][..]),
        ("pibor", &["jonglei"][..]),
        ("wau", &["western bahr el ghazal"][..]),
        ("aweil", &["northern bahr el ghazal"][..]),
        ("kuajok", &["warrap"][..]),
        ("rumbek", &["lakes"][..]),
    ])
});

fn canon(region: &str) -> String {
    region.trim().to_lowercase()
}

/// Ancestors of a region (nearest first); empty for unknown or top-level names.
pub fn ancestors(region: &str) -> &'static [&'static str] {
    ANCESTORS.get(canon(region).as_str()).copied().unwrap_or(&[])
}

fn pair_overlaps(a: &str, b: &str) -> bool {
    let (a, b) = (canon(a), canon(b));
    if a == b {
        return true;
    }
    let anc_a = ancestors(&a);
    let anc_b = ancestors(&b);
    anc_a.contains(&b.as_str())
        || anc_b.contains(&a.as_str())
        || anc_a.iter().any(|x| anc_b.contains(x))
}

/// Region-list overlap: any pair equal, contained, or sharing an ancestor.
/// Empty lists overlap with anything. Symmetric and reflexive by construction.
pub fn lists_overlap(a: &[String], b: &[String]) -> bool {
    if a.is_empty() || b.is_empty() {
        return true;
    }
    a.iter().any(|x| b.iter().any(|y| pair_overlaps(x, y)))
}

/// Title-case a canonical region name for rendering.
pub fn display_name(region: &str) -> String {
    canon(region)
        .split_whitespace()
        .map(|w| {
            let mut cs = w.chars();
            match cs.next() {
                Some(first) => first.to_uppercase().collect::<String>() + cs.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Collapse child/parent combinations before rendering:
/// - child + direct parent → `Parent (Child)`, parent dropped standalone;
/// - a top-level ancestor appearing alongside any of its specific children is
///   dropped outright.
pub fn collapse_for_display(regions: &[String]) -> Vec<String> {
    let canonical: Vec<String> = {
        let mut seen = std::collections::HashSet::new();
        regions
            .iter()
            .map(|r| canon(r))
            .filter(|r| !r.is_empty() && seen.insert(r.clone()))
            .collect()
    };

    let n = canonical.len();
    let mut suppressed = vec![false; n];
    // parent index → child index it absorbs
    let mut merged_child: Vec<Option<usize>> = vec![None; n];

    // Pass 1: every child claims its direct parent (if listed) and suppresses
    // deeper ancestors outright.
    for (i, region) in canonical.iter().enumerate() {
        let anc = ancestors(region);
        if anc.is_empty() {
            continue;
        }
        if let Some(parent) = anc.first() {
            if let Some(pi) = canonical.iter().position(|r| r == parent) {
                if merged_child[pi].is_none() {
                    merged_child[pi] = Some(i);
                }
            }
        }
        for further in anc.iter().skip(1) {
            if let Some(ai) = canonical.iter().position(|r| r == further) {
                suppressed[ai] = true;
            }
        }
    }

    // Pass 2: emit in input order; absorbed children render inside their parent.
    let absorbed: std::collections::HashSet<usize> =
        merged_child.iter().flatten().copied().collect();
    let mut out: Vec<String> = Vec::new();
    for (i, region) in canonical.iter().enumerate() {
        if suppressed[i] {
            continue;
        }
        if let Some(child) = merged_child[i] {
            out.push(format!(
                "{} ({})",
                display_name(region),
                display_name(&canonical[child])
            ));
            continue;
        }
        if absorbed.contains(&i) {
            continue;
        }
        out.push(display_name(region));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn overlap_is_reflexive_and_symmetric() {
        let a = v(&["El Fasher"]);
        let b = v(&["North Darfur"]);
        assert!(lists_overlap(&a, &a));
        assert_eq!(lists_overlap(&a, &b), lists_overlap(&b, &a));
        assert!(lists_overlap(&a, &b));
    }

    #[test]
    fn shared_ancestor_counts() {
        // Nyala (→ south darfur, darfur) and El Fasher (→ north darfur, darfur)
        // meet at Darfur.
        assert!(lists_overlap(&v(&["Nyala"]), &v(&["El Fasher"])));
        assert!(!lists_overlap(&v(&["Nyala"]), &v(&["Juba"])));
    }

    #[test]
    fn empty_lists_overlap_with_anything() {
        assert!(lists_overlap(&[], &v(&["Juba"])));
        assert!(lists_overlap(&v(&["Juba"]), &[]));
        assert!(lists_overlap(&[], &[]));
    }

    #[test]
    fn child_and_parent_collapse_to_merged_form() {
        let collapsed = collapse_for_display(&v(&["El Fasher", "North Darfur"]));
        assert_eq!(collapsed, vec!["North Darfur (El Fasher)".to_string()]);
    }

    #[test]
    fn top_level_ancestor_dropped_next_to_specific_child() {
        let collapsed = collapse_for_display(&v(&["El Fasher", "Darfur"]));
        assert_eq!(collapsed, vec!["El Fasher".to_string()]);
    }

    #[test]
    fn unrelated_regions_pass_through() {
        let collapsed = collapse_for_display(&v(&["Juba", "Khartoum"]));
        assert_eq!(
            collapsed,
            vec!["Juba".to_string(), "Khartoum".to_string()]
        );
    }

    #[test]
    fn collapse_is_order_independent() {
        let a = collapse_for_display(&v(&["North Darfur", "El Fasher"]));
        let b = collapse_for_display(&v(&["El Fasher", "North Darfur"]));
        assert_eq!(a, vec!["North Darfur (El Fasher)".to_string()]);
        assert_eq!(a, b);
    }

    #[test]
    fn display_name_title_cases() {
        assert_eq!(display_name("el fasher"), "El Fasher");
        assert_eq!(display_name("western bahr el ghazal"), "Western Bahr El Ghazal");
    }
}
