use std::collections::BTreeSet;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::aggregate::aggregate;
use crate::detect::detect_break;
use crate::error::EngineError;
use crate::models::{Episode, PipelineOutput, SeasonTrend, ShowResult};
use crate::trend::{compute_trends, BaselinePolicy};

/// Runs aggregation, trends and break detection for the requested shows.
///
/// Episodes of shows outside `show_ids` are ignored. Requested shows with no
/// episodes are reported in `missing_shows` and produce no rows; whether that
/// is an error is up to the caller. Trends and detection fan out one rayon
/// task per show; results come back in show order.
pub fn run_pipeline(
    episodes: &[Episode],
    show_ids: &[String],
    policy: BaselinePolicy,
) -> Result<PipelineOutput, EngineError> {
    let requested: BTreeSet<&str> = show_ids.iter().map(String::as_str).collect();
    let scoped: Vec<Episode> = episodes
        .iter()
        .filter(|e| requested.contains(e.show_id.as_str()))
        .cloned()
        .collect();
    debug!(
        scoped = scoped.len(),
        ignored = episodes.len() - scoped.len(),
        "scoped episodes to requested shows"
    );

    let aggregates = aggregate(&scoped)?;
    let present: BTreeSet<&str> = aggregates.iter().map(|a| a.show_id.as_str()).collect();
    let missing_shows: Vec<String> = requested
        .difference(&present)
        .map(|id| id.to_string())
        .collect();
    for show_id in &missing_shows {
        warn!(show_id = %show_id, "requested show has no episode rows");
    }

    let trends = compute_trends(&aggregates, policy)?;
    let shows: Vec<&[SeasonTrend]> = trends
        .chunk_by(|a, b| a.show_id() == b.show_id())
        .collect();
    let results: Vec<ShowResult> = shows
        .par_iter()
        .map(|seasons| detect_break(seasons[0].show_id(), seasons))
        .collect();

    Ok(PipelineOutput {
        trends,
        results,
        missing_shows,
    })
}
