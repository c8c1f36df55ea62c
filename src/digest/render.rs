// src/digest/render.rs
//! Digest renderings: a standalone HTML document with inline CSS (email
//! clients ignore everything else) and a plain-text part for logs and the
//! text alternative. JSON comes from serde on the Digest itself.

use super::{Bundle, Digest};

/// Muted institutional ladder, one colour per severity.
fn severity_color(severity: i64) -> &'static str {
    match severity {
        5 => "#7f1d1d",
        4 => "#9a3412",
        3 => "#92400e",
        2 => "#1e3a5f",
        _ => "#4b5563",
    }
}

fn severity_label(severity: i64) -> &'static str {
    match severity {
        5 => "critical",
        4 => "severe",
        3 => "serious",
        2 => "notable",
        _ => "routine",
    }
}

fn esc(s: &str) -> String {
    html_escape::encode_text(s).into_owned()
}

fn pct_cell(pct: Option<i64>) -> String {
    match pct {
        Some(p) if p > 0 => format!("+{p}%"),
        Some(p) => format!("{p}%"),
        None => "—".to_string(),
    }
}

pub fn render_html(digest: &Digest) -> String {
    let mut html = String::with_capacity(16 * 1024);
    html.push_str(&format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>Horn Risk Delta — {label}</title></head>
<body style="margin:0;padding:24px;background:#f4f4f2;font-family:Georgia,'Times New Roman',serif;color:#1f2937;">
<div style="max-width:680px;margin:0 auto;background:#ffffff;border:1px solid #d6d3cd;padding:32px;">
<h1 style="margin:0 0 4px;font-size:22px;letter-spacing:0.5px;">Horn Risk Delta</h1>
<p style="margin:0 0 24px;color:#6b7280;font-size:13px;">Week {week} · {label}</p>
"#,
        label = esc(&digest.label),
        week = digest.week_number,
    ));

    if digest.baseline_weak {
        html.push_str(
            r#"<p style="margin:0 0 16px;padding:8px 12px;background:#fef9ec;border-left:3px solid #b45309;font-size:13px;">Previous week has too few events for a reliable baseline; raw counts only.</p>
"#,
        );
    }

    // Topline
    html.push_str(&format!(
        r#"<h2 style="font-size:15px;border-bottom:1px solid #d6d3cd;padding-bottom:6px;">Topline</h2>
<p style="font-size:14px;">{cur} events this week, {prev} last week{delta}.</p>
<table style="width:100%;border-collapse:collapse;font-size:13px;">
"#,
        cur = digest.topline.total_this_week,
        prev = digest.topline.total_last_week,
        delta = match digest.topline.change_pct {
            Some(p) => format!(" ({})", pct_cell(Some(p))),
            None => String::new(),
        },
    ));
    for row in &digest.topline.by_type {
        html.push_str(&format!(
            r#"<tr><td style="padding:4px 0;border-bottom:1px solid #eceae6;">{}</td><td style="text-align:right;border-bottom:1px solid #eceae6;">{}</td><td style="text-align:right;border-bottom:1px solid #eceae6;color:#6b7280;">{}</td></tr>
"#,
            esc(&row.event_type),
            row.this_week,
            pct_cell(row.change_pct),
        ));
    }
    html.push_str("</table>\n");

    // High-severity bundles
    if !digest.high_severity.is_empty() {
        html.push_str(
            r#"<h2 style="font-size:15px;border-bottom:1px solid #d6d3cd;padding-bottom:6px;margin-top:28px;">High-severity events</h2>
"#,
        );
        for bundle in &digest.high_severity {
            html.push_str(&render_bundle(bundle));
        }
    }

    // Hot regions
    if !digest.hot_regions.is_empty() {
        html.push_str(
            r#"<h2 style="font-size:15px;border-bottom:1px solid #d6d3cd;padding-bottom:6px;margin-top:28px;">Hot regions</h2>
<table style="width:100%;border-collapse:collapse;font-size:13px;">
<tr style="color:#6b7280;"><td>Region</td><td style="text-align:right;">Events</td><td style="text-align:right;">Weighted</td><td style="text-align:right;">Avg sev</td><td style="text-align:right;">WoW</td></tr>
"#,
        );
        for r in &digest.hot_regions {
            html.push_str(&format!(
                r#"<tr><td style="padding:4px 0;border-bottom:1px solid #eceae6;">{}</td><td style="text-align:right;border-bottom:1px solid #eceae6;">{}</td><td style="text-align:right;border-bottom:1px solid #eceae6;">{}</td><td style="text-align:right;border-bottom:1px solid #eceae6;">{:.1}</td><td style="text-align:right;border-bottom:1px solid #eceae6;color:#6b7280;">{}</td></tr>
"#,
                esc(&r.region),
                r.count,
                r.weighted,
                r.avg_severity,
                pct_cell(r.change_pct),
            ));
        }
        html.push_str("</table>\n");
    }

    // Actor spikes
    if !digest.actor_spikes.is_empty() {
        html.push_str(
            r#"<h2 style="font-size:15px;border-bottom:1px solid #d6d3cd;padding-bottom:6px;margin-top:28px;">Actor activity</h2>
<table style="width:100%;border-collapse:collapse;font-size:13px;">
"#,
        );
        for s in &digest.actor_spikes {
            let delta = if s.delta > 0 {
                format!("+{}", s.delta)
            } else {
                s.delta.to_string()
            };
            html.push_str(&format!(
                r#"<tr><td style="padding:4px 0;border-bottom:1px solid #eceae6;">{}</td><td style="text-align:right;border-bottom:1px solid #eceae6;">{} → {}</td><td style="text-align:right;border-bottom:1px solid #eceae6;color:#6b7280;">{} {}</td></tr>
"#,
                esc(&s.actor),
                s.last_week,
                s.this_week,
                delta,
                pct_cell(s.change_pct),
            ));
        }
        html.push_str("</table>\n");
    }

    html.push_str(
        r#"<p style="margin-top:32px;color:#9ca3af;font-size:11px;">Automated weekly comparison of extracted events, most recent 7 days against the prior 7.</p>
</div>
</body>
</html>
"#,
    );
    html
}

fn render_bundle(bundle: &Bundle) -> String {
    let color = severity_color(bundle.severity);
    let mut block = format!(
        r#"<div style="margin:12px 0;padding:12px 14px;border-left:4px solid {color};background:#faf9f7;">
<p style="margin:0;font-size:14px;"><span style="color:{color};font-weight:bold;text-transform:uppercase;font-size:11px;letter-spacing:1px;">{label} · sev {sev}</span></p>
<p style="margin:6px 0 4px;font-size:14px;">{summary}</p>
<p style="margin:0;color:#6b7280;font-size:12px;">{country}{regions} · {count} source report(s) · {status}</p>
"#,
        color = color,
        label = severity_label(bundle.severity),
        sev = bundle.severity,
        summary = esc(&bundle.summary),
        country = esc(&bundle.country),
        regions = if bundle.regions.is_empty() {
            String::new()
        } else {
            format!(" — {}", esc(&bundle.regions.join(", ")))
        },
        count = bundle.source_count,
        status = esc(&bundle.verification_status),
    );
    if !bundle.rationale.is_empty() {
        block.push_str(&format!(
            r#"<p style="margin:4px 0 0;color:#6b7280;font-size:12px;font-style:italic;">{}</p>
"#,
            esc(&bundle.rationale)
        ));
    }
    if let Some(url) = bundle.article_urls.first() {
        block.push_str(&format!(
            r#"<p style="margin:4px 0 0;font-size:12px;"><a href="{}" style="color:#1e3a5f;">coverage</a></p>
"#,
            esc(url)
        ));
    }
    block.push_str("</div>\n");
    block
}

pub fn render_text(digest: &Digest) -> String {
    let mut out = String::with_capacity(4 * 1024);
    out.push_str(&format!(
        "HORN RISK DELTA — Week {} ({})\n",
        digest.week_number, digest.label
    ));
    out.push_str(&"=".repeat(60));
    out.push('\n');

    if digest.baseline_weak {
        out.push_str("Note: previous week is a weak baseline; raw counts only.\n\n");
    }

    out.push_str(&format!(
        "TOPLINE: {} events this week, {} last week{}\n",
        digest.topline.total_this_week,
        digest.topline.total_last_week,
        match digest.topline.change_pct {
            Some(p) => format!(" ({})", pct_cell(Some(p))),
            None => String::new(),
        },
    ));
    for row in &digest.topline.by_type {
        out.push_str(&format!(
            "  {:<16} {:>3}  {}\n",
            row.event_type,
            row.this_week,
            pct_cell(row.change_pct)
        ));
    }

    if !digest.high_severity.is_empty() {
        out.push_str("\nHIGH-SEVERITY EVENTS\n");
        for bundle in &digest.high_severity {
            out.push_str(&format!(
                "  [sev {}] {} — {}{}\n",
                bundle.severity,
                bundle.country,
                bundle.summary,
                if bundle.regions.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", bundle.regions.join(", "))
                },
            ));
        }
    }

    if !digest.hot_regions.is_empty() {
        out.push_str("\nHOT REGIONS\n");
        for r in &digest.hot_regions {
            out.push_str(&format!(
                "  {:<28} {:>2} events, weighted {:>3}, avg {:.1}  {}\n",
                r.region,
                r.count,
                r.weighted,
                r.avg_severity,
                pct_cell(r.change_pct)
            ));
        }
    }

    if !digest.actor_spikes.is_empty() {
        out.push_str("\nACTOR ACTIVITY\n");
        for s in &digest.actor_spikes {
            out.push_str(&format!(
                "  {:<32} {} → {}  {}\n",
                s.actor,
                s.last_week,
                s.this_week,
                pct_cell(s.change_pct)
            ));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::{build_digest, windows_for_date};
    use chrono::NaiveDate;

    #[test]
    fn empty_digest_renders_without_sections() {
        let w = windows_for_date(NaiveDate::from_ymd_opt(2026, 8, 2).unwrap());
        let digest = build_digest(&w, &[], &[]);
        let html = render_html(&digest);
        assert!(html.contains("Horn Risk Delta"));
        assert!(!html.contains("High-severity events"));

        let text = render_text(&digest);
        assert!(text.contains("TOPLINE: 0 events"));
        // Weak baseline (0 < 5) must not leak percent strings.
        assert!(!text.contains('%'));
    }

    #[test]
    fn html_escapes_summaries() {
        let w = windows_for_date(NaiveDate::from_ymd_opt(2026, 8, 2).unwrap());
        let mut digest = build_digest(&w, &[], &[]);
        digest.high_severity.push(crate::digest::Bundle {
            summary: "<script>alert(1)</script>".into(),
            country: "Sudan".into(),
            event_subtype: "x".into(),
            severity: 5,
            verification_status: "reported".into(),
            regions: vec![],
            source_count: 1,
            sources: vec![],
            article_urls: vec![],
            actors: vec![],
            rationale: String::new(),
            raw_regions: vec![],
            latest: chrono::Utc::now(),
        });
        let html = render_html(&digest);
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
