use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::{Episode, PipelineOutput, SeasonTrend, ShowResult, ShowStatus};

pub const KPI_FILE: &str = "agg_season_kpis.csv";
pub const BREAK_FILE: &str = "shark_jump_results.csv";
pub const DURABILITY_FILE: &str = "durability_index.csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiRow {
    pub show_tconst: String,
    pub season_num: i32,
    pub episode_count: usize,
    pub season_total_votes: i64,
    pub weighted_rating: Option<f64>,
    pub mean_rating: f64,
    pub rating_stddev: Option<f64>,
    pub pct_high_rated: Option<f64>,
    pub series_avg: Option<f64>,
    pub rolling_3_season_avg: Option<f64>,
    pub season_rank_best: Option<usize>,
    pub catalog_value_index: Option<f64>,
}

impl From<&SeasonTrend> for KpiRow {
    fn from(trend: &SeasonTrend) -> Self {
        let season = &trend.aggregate;
        KpiRow {
            show_tconst: season.show_id.clone(),
            season_num: season.season,
            episode_count: season.episode_count,
            season_total_votes: season.total_votes,
            weighted_rating: season.weighted_rating,
            mean_rating: season.mean_rating,
            rating_stddev: season.rating_stddev,
            pct_high_rated: trend.pct_high_rated,
            series_avg: trend.series_baseline,
            rolling_3_season_avg: trend.rolling_avg,
            season_rank_best: trend.season_rank_best,
            catalog_value_index: trend.catalog_value_index,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakRow {
    pub show_tconst: String,
    pub shark_jump_season: Option<i32>,
    pub status: ShowStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurabilityRow {
    pub show_tconst: String,
    pub durability_index: Option<usize>,
}

impl From<&ShowResult> for BreakRow {
    fn from(result: &ShowResult) -> Self {
        BreakRow {
            show_tconst: result.show_id.clone(),
            shark_jump_season: result.break_season,
            status: result.status,
        }
    }
}

impl From<&ShowResult> for DurabilityRow {
    fn from(result: &ShowResult) -> Self {
        DurabilityRow {
            show_tconst: result.show_id.clone(),
            durability_index: result.durability,
        }
    }
}

/// The three output tables as read back from disk.
#[derive(Debug, Clone, Default)]
pub struct OutputTables {
    pub kpis: Vec<KpiRow>,
    pub breaks: Vec<BreakRow>,
    pub durability: Vec<DurabilityRow>,
}

pub fn write_tables(dir: &Path, output: &PipelineOutput) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create output directory {}", dir.display()))?;

    let kpis: Vec<KpiRow> = output.trends.iter().map(KpiRow::from).collect();
    let breaks: Vec<BreakRow> = output.results.iter().map(BreakRow::from).collect();
    let durability: Vec<DurabilityRow> = output.results.iter().map(DurabilityRow::from).collect();

    let paths = vec![
        write_rows(&dir.join(KPI_FILE), &kpis)?,
        write_rows(&dir.join(BREAK_FILE), &breaks)?,
        write_rows(&dir.join(DURABILITY_FILE), &durability)?,
    ];
    Ok(paths)
}

pub fn write_episodes(path: &Path, episodes: &[Episode]) -> Result<PathBuf> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    write_rows(path, episodes)
}

pub fn read_tables(dir: &Path) -> Result<OutputTables> {
    Ok(OutputTables {
        kpis: read_rows(&dir.join(KPI_FILE))?,
        breaks: read_rows(&dir.join(BREAK_FILE))?,
        durability: read_rows(&dir.join(DURABILITY_FILE))?,
    })
}

pub fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut rows = Vec::new();
    for result in reader.deserialize::<T>() {
        rows.push(result.with_context(|| format!("malformed row in {}", path.display()))?);
    }
    Ok(rows)
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<PathBuf> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = rows.len(), "wrote table");
    Ok(path.to_path_buf())
}
