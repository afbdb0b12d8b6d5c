use std::fmt::Write;

use crate::config::AppConfig;
use crate::models::{PipelineOutput, SeasonTrend, ShowStatus};

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(v) => format!("{v:.precision$}"),
        None => "n/a".to_string(),
    }
}

/// Seasons ranked by catalog value index, highest first. Seasons without an
/// index sort last.
pub fn top_catalog_seasons(trends: &[SeasonTrend], limit: usize) -> Vec<&SeasonTrend> {
    let mut ranked: Vec<&SeasonTrend> = trends.iter().collect();
    ranked.sort_by(|a, b| {
        let a_index = a.catalog_value_index.unwrap_or(f64::NEG_INFINITY);
        let b_index = b.catalog_value_index.unwrap_or(f64::NEG_INFINITY);
        b_index
            .total_cmp(&a_index)
            .then_with(|| a.show_id().cmp(b.show_id()))
            .then_with(|| a.season().cmp(&b.season()))
    });
    ranked.truncate(limit);
    ranked
}

pub fn build_report(config: &AppConfig, output: &PipelineOutput) -> String {
    let mut report = String::new();

    let _ = writeln!(report, "# Series Drop-off Report");
    let _ = writeln!(
        report,
        "Baseline policy: {} ({} shows configured)",
        config.baseline_policy.as_str(),
        config.shows.len()
    );

    for result in &output.results {
        let title = config.title(&result.show_id);
        let _ = writeln!(report);
        let _ = writeln!(report, "## {} ({})", title, result.show_id);

        match (result.status, result.break_season) {
            (ShowStatus::InsufficientData, _) => {
                let _ = writeln!(report, "Insufficient data: no season has rated votes.");
            }
            (ShowStatus::Evaluated, Some(season)) => {
                let _ = writeln!(report, "Drop-off detected at season {season}.");
            }
            (ShowStatus::Evaluated, None) => {
                let _ = writeln!(report, "No drop-off detected.");
            }
        }
        if let Some(durability) = result.durability {
            let _ = writeln!(
                report,
                "Durability: {} of {} seasons at or above the series average.",
                durability, result.season_count
            );
        }

        let _ = writeln!(report);
        let _ = writeln!(report, "| Season | Episodes | Weighted | Rolling | Series avg | Rank |");
        let _ = writeln!(report, "|---|---|---|---|---|---|");
        for trend in output.trends.iter().filter(|t| t.show_id() == result.show_id) {
            let marker = if Some(trend.season()) == result.break_season {
                " *"
            } else {
                ""
            };
            let _ = writeln!(
                report,
                "| {}{} | {} | {} | {} | {} | {} |",
                trend.season(),
                marker,
                trend.aggregate.episode_count,
                fmt_opt(trend.aggregate.weighted_rating, 2),
                fmt_opt(trend.rolling_avg, 2),
                fmt_opt(trend.series_baseline, 2),
                trend
                    .season_rank_best
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "n/a".to_string())
            );
        }
    }

    if !output.missing_shows.is_empty() {
        let _ = writeln!(report);
        let _ = writeln!(report, "## Shows Without Data");
        for show_id in &output.missing_shows {
            let _ = writeln!(report, "- {} ({})", config.title(show_id), show_id);
        }
    }

    let _ = writeln!(report);
    let _ = writeln!(report, "## Highest Catalog Value Seasons");
    let top = top_catalog_seasons(&output.trends, 10);
    if top.is_empty() {
        let _ = writeln!(report, "No seasons in this run.");
    } else {
        for trend in top {
            let _ = writeln!(
                report,
                "- {} season {}: index {} (weighted {}, {} votes)",
                config.title(trend.show_id()),
                trend.season(),
                fmt_opt(trend.catalog_value_index, 2),
                fmt_opt(trend.aggregate.weighted_rating, 2),
                trend.aggregate.total_votes
            );
        }
    }

    report
}
