use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::models::{SeasonAggregate, SeasonTrend};

/// Trailing window of the rolling average: the current season and up to two before it.
pub const ROLLING_WINDOW: usize = 3;

/// Slack for comparing a rolling average with the baseline. Both are means
/// over different sums, so a flat show can land one ulp either side.
pub const BASELINE_TOLERANCE: f64 = 1e-9;

/// Whether `rolling` sits below `baseline` by more than [`BASELINE_TOLERANCE`].
/// Undefined values are never below.
pub fn falls_below(rolling: Option<f64>, baseline: Option<f64>) -> bool {
    match (rolling, baseline) {
        (Some(rolling), Some(baseline)) => rolling < baseline - BASELINE_TOLERANCE,
        _ => false,
    }
}

/// How the per-show baseline is derived from season weighted ratings.
///
/// `SeasonMean` is the approved override: every season counts once, no matter
/// how many episodes or votes it has. `EpisodeWeighted` is kept for comparison
/// runs and weights each season by its episode count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BaselinePolicy {
    #[default]
    SeasonMean,
    EpisodeWeighted,
}

impl BaselinePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BaselinePolicy::SeasonMean => "season-mean",
            BaselinePolicy::EpisodeWeighted => "episode-weighted",
        }
    }

    /// Baseline over seasons with a defined weighted rating; `None` if there are none.
    pub fn baseline(&self, seasons: &[SeasonAggregate]) -> Option<f64> {
        let defined = seasons
            .iter()
            .filter_map(|s| s.weighted_rating.map(|rating| (rating, s.episode_count)));

        let (total, weight) = match self {
            BaselinePolicy::SeasonMean => defined.fold((0.0, 0.0), |(total, weight), (rating, _)| {
                (total + rating, weight + 1.0)
            }),
            BaselinePolicy::EpisodeWeighted => {
                defined.fold((0.0, 0.0), |(total, weight), (rating, episodes)| {
                    (total + rating * episodes as f64, weight + episodes as f64)
                })
            }
        };

        if weight == 0.0 {
            None
        } else {
            Some(total / weight)
        }
    }
}

/// Computes trend rows for every show in `aggregates`, one rayon task per
/// show. Output is sorted by show then season.
pub fn compute_trends(
    aggregates: &[SeasonAggregate],
    policy: BaselinePolicy,
) -> Result<Vec<SeasonTrend>, EngineError> {
    let mut by_show: BTreeMap<&str, Vec<SeasonAggregate>> = BTreeMap::new();
    for aggregate in aggregates {
        by_show
            .entry(aggregate.show_id.as_str())
            .or_default()
            .push(aggregate.clone());
    }

    let partitions: Vec<Vec<SeasonAggregate>> = by_show.into_values().collect();
    let per_show = partitions
        .into_par_iter()
        .map(|seasons| compute_show_trends(seasons, policy))
        .collect::<Result<Vec<_>, EngineError>>()?;
    Ok(per_show.into_iter().flatten().collect())
}

/// Trend rows for a single show's seasons.
pub fn compute_show_trends(
    mut seasons: Vec<SeasonAggregate>,
    policy: BaselinePolicy,
) -> Result<Vec<SeasonTrend>, EngineError> {
    seasons.sort_by_key(|s| s.season);
    if let Some(pair) = seasons.windows(2).find(|pair| pair[0].season == pair[1].season) {
        return Err(EngineError::DuplicateSeason {
            show_id: pair[1].show_id.clone(),
            season: pair[1].season,
        });
    }

    let baseline = policy.baseline(&seasons);
    let rolling: Vec<Option<f64>> = (0..seasons.len())
        .map(|idx| rolling_avg(&seasons, idx))
        .collect();
    let ranks: Vec<Option<usize>> = seasons.iter().map(|s| rank_best(&seasons, s)).collect();

    Ok(seasons
        .into_iter()
        .zip(rolling)
        .zip(ranks)
        .map(|((aggregate, rolling_avg), season_rank_best)| {
            let pct_high_rated = baseline.and_then(|b| pct_at_or_above(&aggregate, b));
            let catalog_value_index = catalog_value_index(&aggregate);
            SeasonTrend {
                aggregate,
                rolling_avg,
                series_baseline: baseline,
                pct_high_rated,
                season_rank_best,
                catalog_value_index,
            }
        })
        .collect())
}

/// Mean of the defined weighted ratings in the trailing window ending at row `idx`.
/// The window runs over existing rows, so a gap in season numbering is skipped.
fn rolling_avg(seasons: &[SeasonAggregate], idx: usize) -> Option<f64> {
    let start = (idx + 1).saturating_sub(ROLLING_WINDOW);
    let values: Vec<f64> = seasons[start..=idx]
        .iter()
        .filter_map(|s| s.weighted_rating)
        .collect();

    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Competition rank, highest weighted rating first. Ties share a rank and
/// leave a gap after them.
fn rank_best(seasons: &[SeasonAggregate], season: &SeasonAggregate) -> Option<usize> {
    let rating = season.weighted_rating?;
    let better = seasons
        .iter()
        .filter_map(|s| s.weighted_rating)
        .filter(|other| *other > rating)
        .count();
    Some(better + 1)
}

fn pct_at_or_above(season: &SeasonAggregate, baseline: f64) -> Option<f64> {
    if season.episode_count == 0 {
        return None;
    }
    let high = season
        .episode_ratings
        .iter()
        .filter(|rating| **rating >= baseline)
        .count();
    Some(100.0 * high as f64 / season.episode_count as f64)
}

/// `weighted_rating * log10(1 + votes)`. A season with no votes scores 0.
fn catalog_value_index(season: &SeasonAggregate) -> Option<f64> {
    if season.total_votes == 0 {
        return Some(0.0);
    }
    season
        .weighted_rating
        .map(|rating| rating * (1.0 + season.total_votes as f64).log10())
}
