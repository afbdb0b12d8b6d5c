use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::models::Episode;

pub const EPISODES_FILE: &str = "episodes_filtered.csv";

/// Marker IMDb dumps use for missing values.
const NULL_MARKER: &str = "\\N";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleaningReport {
    pub rows_read: usize,
    pub out_of_scope: usize,
    pub dropped_null_season: usize,
    pub dropped_zero_season: usize,
    pub dropped_null_episode: usize,
    pub dropped_null_rating: usize,
    pub dropped_null_votes: usize,
    pub zero_vote_episodes: usize,
    pub kept: usize,
}

#[derive(Debug, Deserialize)]
struct RawEpisodeRow {
    episode_tconst: String,
    show_tconst: String,
    season_num: Option<String>,
    episode_num: Option<String>,
    avg_rating: Option<String>,
    num_votes: Option<String>,
}

pub fn load_episodes(path: &Path, show_ids: &[String]) -> Result<(Vec<Episode>, CleaningReport)> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open episode table {}", path.display()))?;
    let (episodes, report) = read_episodes(file, show_ids)
        .with_context(|| format!("failed to load episode table {}", path.display()))?;
    log_report(&report);
    Ok((episodes, report))
}

/// Reads the episode table and applies the cleaning rules in order: scope,
/// null/zero season, null episode number, null rating, null votes.
/// Zero-vote episodes are kept and only counted.
pub fn read_episodes<R: Read>(
    source: R,
    show_ids: &[String],
) -> Result<(Vec<Episode>, CleaningReport)> {
    let scope: HashSet<&str> = show_ids.iter().map(String::as_str).collect();
    let mut reader = csv::Reader::from_reader(source);
    let mut report = CleaningReport::default();
    let mut episodes = Vec::new();

    for (idx, result) in reader.deserialize::<RawEpisodeRow>().enumerate() {
        let line = idx + 2;
        let row = result.with_context(|| format!("malformed row at line {line}"))?;
        report.rows_read += 1;

        if !scope.contains(row.show_tconst.as_str()) {
            report.out_of_scope += 1;
            continue;
        }

        let Some(season) = parse_cell::<i32>(&row.season_num, "season_num", line)? else {
            report.dropped_null_season += 1;
            continue;
        };
        if season == 0 {
            report.dropped_zero_season += 1;
            continue;
        }
        let Some(episode) = parse_cell::<i32>(&row.episode_num, "episode_num", line)? else {
            report.dropped_null_episode += 1;
            continue;
        };
        let Some(rating) = parse_cell::<f64>(&row.avg_rating, "avg_rating", line)? else {
            report.dropped_null_rating += 1;
            continue;
        };
        let Some(votes) = parse_cell::<i64>(&row.num_votes, "num_votes", line)? else {
            report.dropped_null_votes += 1;
            continue;
        };

        if votes == 0 {
            report.zero_vote_episodes += 1;
        }

        episodes.push(Episode {
            episode_id: row.episode_tconst,
            show_id: row.show_tconst,
            season,
            episode,
            rating,
            votes,
        });
    }

    report.kept = episodes.len();
    Ok((episodes, report))
}

fn parse_cell<T>(value: &Option<String>, column: &str, line: usize) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value.as_deref().map(str::trim) {
        None | Some("") | Some(NULL_MARKER) => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("invalid {column} value {raw:?} at line {line}")),
    }
}

fn log_report(report: &CleaningReport) {
    info!(
        rows = report.rows_read,
        out_of_scope = report.out_of_scope,
        "read episode table"
    );
    info!(
        null_season = report.dropped_null_season,
        zero_season = report.dropped_zero_season,
        null_episode = report.dropped_null_episode,
        null_rating = report.dropped_null_rating,
        null_votes = report.dropped_null_votes,
        "dropped rows failing cleaning rules"
    );
    if report.zero_vote_episodes > 0 {
        info!(count = report.zero_vote_episodes, "episodes with zero votes kept");
    }
    info!(kept = report.kept, "episode rows ready");
}
