//! Terminal output for a finished run.
//!
//! Formatting lives here so the pipeline stays free of presentation code and
//! output changes stay localized.

use crate::config::PipelineConfig;
use crate::report::{LineSummary, RunSummary};

/// Header, counts and per-line table.
pub fn format_run_summary(summary: &RunSummary, line_names: &[String], config: &PipelineConfig) -> String {
    let mut out = String::new();

    out.push_str("=== jedi - coronal dimming catalog ===\n");
    out.push_str(&format!(
        "Backend: {:?} | min fit score: {:.2} | align: {:?}\n",
        config.fit.backend, config.minimum_fit_score, config.peak_match.align
    ));
    out.push_str(&format!(
        "Flares: n={} | skipped={} | held over={} | interrupted={}\n",
        summary.flares, summary.flares_skipped, summary.flares_held_over, summary.flares_interrupted
    ));
    out.push_str(&format!("Records: n={} | {}\n", summary.records, fmt_counts(&summary.by_status)));
    out.push_str(&format!("Peak match: {}\n", fmt_counts(&summary.by_peak_match)));
    out.push_str(&format!(
        "Determined: fits={} depth={} slope={} duration={}\n",
        summary.fits_accepted, summary.depths, summary.slopes, summary.durations
    ));

    out.push_str("\nPer target line:\n");
    out.push_str(&format_line_table(&summary.lines, line_names));
    out
}

fn format_line_table(rows: &[LineSummary], line_names: &[String]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<16} {:>8} {:>8} {:>14} {:>14}",
            "line", "records", "depths", "median depth", "median dur"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(format!("{:-<16} {:-<8} {:-<8} {:-<14} {:-<14}", "", "", "", "", "").trim_end());
    out.push('\n');

    for r in rows {
        let name = line_names.get(r.line).map(String::as_str).unwrap_or("?");
        out.push_str(
            format!(
                "{:<16} {:>8} {:>8} {:>14} {:>14}",
                truncate(name, 16),
                r.records,
                r.depths,
                fmt_opt(r.median_depth, "%"),
                fmt_opt(r.median_duration, "s"),
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

fn fmt_counts(counts: &std::collections::BTreeMap<&'static str, usize>) -> String {
    if counts.is_empty() {
        return "-".to_string();
    }
    let parts: Vec<String> = counts.iter().map(|(k, v)| format!("{k}={v}")).collect();
    parts.join(" ")
}

fn fmt_opt(v: Option<f64>, unit: &str) -> String {
    match v {
        Some(v) => format!("{v:.2}{unit}"),
        None => "-".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_marks_undetermined_medians() {
        let summary = RunSummary {
            flares: 1,
            records: 2,
            lines: vec![
                LineSummary {
                    line: 0,
                    records: 1,
                    depths: 1,
                    median_depth: Some(-3.456),
                    median_duration: Some(5400.0),
                },
                LineSummary {
                    line: 1,
                    records: 1,
                    depths: 0,
                    median_depth: None,
                    median_duration: None,
                },
            ],
            ..RunSummary::default()
        };
        let names = vec!["Fe IX 171".to_string(), "an exceedingly long line name".to_string()];
        let text = format_run_summary(&summary, &names, &PipelineConfig::default());

        assert!(text.starts_with("=== jedi - coronal dimming catalog ===\n"));
        assert!(text.contains("Records: n=2 | -\n"));
        assert!(text.contains("-3.46%"));
        assert!(text.contains("5400.00s"));
        let last = text.lines().last().unwrap();
        assert!(last.starts_with("an exceedingly ."));
        assert!(last.ends_with('-'));
    }
}
