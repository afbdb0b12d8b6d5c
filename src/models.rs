use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::trend::falls_below;

/// One cleaned episode row. Upstream cleaning guarantees non-null, non-zero
/// season and episode numbers, unique episode ids, finite ratings and
/// non-negative vote counts; the engine faults on the violations it can see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    #[serde(rename = "episode_tconst")]
    pub episode_id: String,
    #[serde(rename = "show_tconst")]
    pub show_id: String,
    #[serde(rename = "season_num")]
    pub season: i32,
    #[serde(rename = "episode_num")]
    pub episode: i32,
    #[serde(rename = "avg_rating")]
    pub rating: f64,
    #[serde(rename = "num_votes")]
    pub votes: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonAggregate {
    pub show_id: String,
    pub season: i32,
    pub episode_count: usize,
    pub total_votes: i64,
    /// `None` when the season has no votes at all.
    pub weighted_rating: Option<f64>,
    pub mean_rating: f64,
    /// Sample standard deviation, `None` below two episodes.
    pub rating_stddev: Option<f64>,
    /// Episode ratings in ascending order, kept for the high-rated share.
    pub episode_ratings: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeasonTrend {
    pub aggregate: SeasonAggregate,
    pub rolling_avg: Option<f64>,
    pub series_baseline: Option<f64>,
    pub pct_high_rated: Option<f64>,
    pub season_rank_best: Option<usize>,
    pub catalog_value_index: Option<f64>,
}

impl SeasonTrend {
    pub fn show_id(&self) -> &str {
        &self.aggregate.show_id
    }

    pub fn season(&self) -> i32 {
        self.aggregate.season
    }

    /// Rolling average below the baseline, beyond float noise. Undefined
    /// values are never below.
    pub fn is_below_baseline(&self) -> bool {
        falls_below(self.rolling_avg, self.series_baseline)
    }

    /// Rolling average at or above the baseline, within the same tolerance.
    pub fn is_durable(&self) -> bool {
        self.rolling_avg.is_some() && self.series_baseline.is_some() && !self.is_below_baseline()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShowStatus {
    Evaluated,
    /// No season of the show has a defined weighted rating, so there is no baseline.
    InsufficientData,
}

impl ShowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShowStatus::Evaluated => "evaluated",
            ShowStatus::InsufficientData => "insufficient-data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShowResult {
    pub show_id: String,
    pub status: ShowStatus,
    pub break_season: Option<i32>,
    pub durability: Option<usize>,
    pub season_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOutput {
    pub trends: Vec<SeasonTrend>,
    pub results: Vec<ShowResult>,
    pub missing_shows: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub baseline_policy: String,
    pub episode_count: i32,
    pub show_count: i64,
    pub break_count: i64,
}
