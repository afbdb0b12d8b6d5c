use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::path::Path;

use tracing::warn;

use crate::export::{self, KpiRow, OutputTables};
use crate::ingest::EPISODES_FILE;
use crate::models::{Episode, ShowStatus};
use crate::synth::SYNTHETIC_PREFIX;
use crate::trend::falls_below;

/// Break seasons before this one are reported before the rolling window is full.
const FULL_WINDOW_SEASON: i32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Fail,
    Warn,
}

impl CheckStatus {
    fn label(&self) -> &'static str {
        match self {
            CheckStatus::Pass => "PASS",
            CheckStatus::Fail => "FAIL",
            CheckStatus::Warn => "WARN",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

/// Tracks pass/fail/warn counts across all checks.
#[derive(Debug, Default)]
pub struct CheckRunner {
    pub outcomes: Vec<CheckOutcome>,
}

impl CheckRunner {
    pub fn check(&mut self, name: impl Into<String>, passed: bool, detail: impl Into<String>) {
        let status = if passed { CheckStatus::Pass } else { CheckStatus::Fail };
        self.record(name.into(), status, detail.into());
    }

    pub fn warn(&mut self, name: impl Into<String>, ok: bool, detail: impl Into<String>) {
        let status = if ok { CheckStatus::Pass } else { CheckStatus::Warn };
        self.record(name.into(), status, detail.into());
    }

    fn record(&mut self, name: String, status: CheckStatus, detail: String) {
        self.outcomes.push(CheckOutcome { name, status, detail });
    }

    pub fn count(&self, status: CheckStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn failures(&self) -> usize {
        self.count(CheckStatus::Fail)
    }

    pub fn render(&self) -> String {
        let mut lines: Vec<String> = self
            .outcomes
            .iter()
            .map(|o| {
                if o.detail.is_empty() {
                    format!("  [{}] {}", o.status.label(), o.name)
                } else {
                    format!("  [{}] {}: {}", o.status.label(), o.name, o.detail)
                }
            })
            .collect();
        lines.push(format!(
            "Results: {} checks, {} passed, {} failed, {} warnings",
            self.outcomes.len(),
            self.count(CheckStatus::Pass),
            self.failures(),
            self.count(CheckStatus::Warn)
        ));
        lines.join("\n")
    }
}

/// Runs every check over the episode table in `input_dir` and the output
/// tables in `output_dir`.
pub fn validate(
    input_dir: &Path,
    output_dir: &Path,
    show_ids: &[String],
    sample: bool,
) -> CheckRunner {
    let mut runner = CheckRunner::default();
    let scope: BTreeSet<&str> = show_ids.iter().map(String::as_str).collect();

    match export::read_rows::<Episode>(&input_dir.join(EPISODES_FILE)) {
        Ok(episodes) => check_episodes(&mut runner, &episodes, &scope, sample),
        Err(err) => {
            warn!(error = %err, "episode table unreadable");
            runner.check(
                "episode table readable",
                false,
                format!(
                    "expected a cleaned table with no null markers or blank cells \
                     (run generate-sample or the cleaning step first): {err:#}"
                ),
            );
        }
    }

    match export::read_tables(output_dir) {
        Ok(tables) => check_outputs(&mut runner, &tables, &scope, sample),
        Err(err) => {
            warn!(error = %err, "output tables unreadable");
            runner.check("output tables readable", false, format!("{err:#}"));
        }
    }

    runner
}

pub fn check_episodes(
    runner: &mut CheckRunner,
    episodes: &[Episode],
    scope: &BTreeSet<&str>,
    sample: bool,
) {
    let mut seen = HashSet::new();
    let duplicates = episodes
        .iter()
        .filter(|e| !seen.insert(e.episode_id.as_str()))
        .count();
    runner.check(
        "unique episode ids",
        duplicates == 0,
        format!("{} rows, {duplicates} duplicates", episodes.len()),
    );

    let bad_seasons = episodes.iter().filter(|e| e.season <= 0).count();
    runner.check("season numbers positive", bad_seasons == 0, format!("{bad_seasons} invalid"));

    let bad_episodes = episodes.iter().filter(|e| e.episode <= 0).count();
    runner.check("episode numbers positive", bad_episodes == 0, format!("{bad_episodes} invalid"));

    let out_of_range = episodes
        .iter()
        .filter(|e| !(1.0..=10.0).contains(&e.rating))
        .count();
    runner.check(
        "ratings within [1.0, 10.0]",
        out_of_range == 0,
        format!("{out_of_range} out of range"),
    );

    let negative_votes = episodes.iter().filter(|e| e.votes < 0).count();
    runner.check(
        "vote counts non-negative",
        negative_votes == 0,
        format!("{negative_votes} negative"),
    );

    let unexpected: BTreeSet<&str> = episodes
        .iter()
        .map(|e| e.show_id.as_str())
        .filter(|id| !scope.contains(id))
        .collect();
    runner.check(
        "episode shows are configured",
        unexpected.is_empty(),
        format!("unexpected: {unexpected:?}"),
    );

    if sample {
        let fabricated = episodes
            .iter()
            .filter(|e| !e.episode_id.starts_with(SYNTHETIC_PREFIX))
            .count();
        runner.check(
            format!("all episode ids start with {SYNTHETIC_PREFIX}"),
            fabricated == 0,
            format!("{fabricated} non-synthetic ids"),
        );
    }
}

pub fn check_outputs(
    runner: &mut CheckRunner,
    tables: &OutputTables,
    scope: &BTreeSet<&str>,
    sample: bool,
) {
    let mut keys = HashSet::new();
    let duplicate_keys = tables
        .kpis
        .iter()
        .filter(|k| !keys.insert((k.show_tconst.as_str(), k.season_num)))
        .count();
    runner.check(
        "unique (show, season) in season KPIs",
        duplicate_keys == 0,
        format!("{} rows, {duplicate_keys} duplicates", tables.kpis.len()),
    );

    let kpi_shows: BTreeSet<&str> = tables.kpis.iter().map(|k| k.show_tconst.as_str()).collect();
    let unexpected: Vec<&&str> = kpi_shows.difference(scope).collect();
    runner.check(
        "season KPI shows are configured",
        unexpected.is_empty(),
        format!("unexpected: {unexpected:?}"),
    );

    let bad_rows = tables
        .kpis
        .iter()
        .filter(|k| k.season_num <= 0 || k.episode_count == 0)
        .count();
    runner.check(
        "season numbers and episode counts positive",
        bad_rows == 0,
        format!("{bad_rows} invalid rows"),
    );

    let out_of_range = tables
        .kpis
        .iter()
        .filter_map(|k| k.weighted_rating)
        .filter(|r| !(1.0..=10.0).contains(r))
        .count();
    runner.check(
        "weighted ratings within [1.0, 10.0]",
        out_of_range == 0,
        format!("{out_of_range} out of range"),
    );

    let non_positive_index = tables
        .kpis
        .iter()
        .filter(|k| k.catalog_value_index.map_or(true, |v| v <= 0.0))
        .count();
    runner.warn(
        "catalog value index positive",
        non_positive_index == 0,
        format!("{non_positive_index} seasons at or below zero"),
    );

    check_grain(
        runner,
        "break results",
        tables.breaks.iter().map(|b| b.show_tconst.as_str()),
        scope,
    );
    check_grain(
        runner,
        "durability results",
        tables.durability.iter().map(|d| d.show_tconst.as_str()),
        scope,
    );

    let mut seasons_by_show: BTreeMap<&str, Vec<&KpiRow>> = BTreeMap::new();
    for kpi in &tables.kpis {
        seasons_by_show.entry(kpi.show_tconst.as_str()).or_default().push(kpi);
    }
    for rows in seasons_by_show.values_mut() {
        rows.sort_by_key(|k| k.season_num);
    }

    for durability in &tables.durability {
        let season_count = seasons_by_show
            .get(durability.show_tconst.as_str())
            .map_or(0, Vec::len);
        let ok = durability.durability_index.map_or(true, |d| d <= season_count);
        runner.check(
            format!("durability {}", durability.show_tconst),
            ok,
            format!("{:?} of {season_count} seasons", durability.durability_index),
        );
    }

    for row in &tables.breaks {
        let seasons = seasons_by_show
            .get(row.show_tconst.as_str())
            .map(Vec::as_slice)
            .unwrap_or_default();
        let expected = first_below_pair(seasons);
        runner.check(
            format!("break season {}", row.show_tconst),
            row.shark_jump_season == expected,
            format!("exported {:?}, derived {:?}", row.shark_jump_season, expected),
        );
        if let Some(season) = row.shark_jump_season {
            runner.warn(
                format!("break season {} has a full window", row.show_tconst),
                season >= FULL_WINDOW_SEASON,
                format!("season {season}"),
            );
        }
    }

    if sample {
        let triggered = tables
            .breaks
            .iter()
            .filter(|b| b.shark_jump_season.is_some())
            .count();
        runner.check(
            "at least one show breaks",
            triggered > 0,
            format!("{triggered} shows triggered"),
        );
    }

    let insufficient = tables
        .breaks
        .iter()
        .filter(|b| b.status == ShowStatus::InsufficientData)
        .count();
    runner.warn(
        "every show has a baseline",
        insufficient == 0,
        format!("{insufficient} shows with insufficient data"),
    );

    let break_shows: BTreeSet<&str> = tables
        .breaks
        .iter()
        .map(|b| b.show_tconst.as_str())
        .collect();
    let durability_shows: BTreeSet<&str> = tables
        .durability
        .iter()
        .map(|d| d.show_tconst.as_str())
        .collect();
    runner.check(
        "show sets identical across tables",
        kpi_shows == break_shows && break_shows == durability_shows,
        format!("kpi={kpi_shows:?}, breaks={break_shows:?}, durability={durability_shows:?}"),
    );
}

fn check_grain<'a>(
    runner: &mut CheckRunner,
    table: &str,
    show_ids: impl Iterator<Item = &'a str>,
    scope: &BTreeSet<&str>,
) {
    let ids: Vec<&str> = show_ids.collect();
    let unique: BTreeSet<&str> = ids.iter().copied().collect();
    runner.check(
        format!("one row per show in {table}"),
        ids.len() == unique.len() && unique.iter().eq(scope.iter()),
        format!("{} rows, {} shows, {} configured", ids.len(), unique.len(), scope.len()),
    );
}

/// Re-derives the break season from exported rows ordered by season.
fn first_below_pair(seasons: &[&KpiRow]) -> Option<i32> {
    let below = |k: &KpiRow| falls_below(k.rolling_3_season_avg, k.series_avg);
    seasons
        .windows(2)
        .find(|pair| below(pair[0]) && below(pair[1]))
        .map(|pair| pair[0].season_num)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::export::{write_episodes, write_tables};
    use crate::pipeline::run_pipeline;
    use crate::synth::{generate, DEFAULT_SEED};

    fn sample_run(dir: &Path) -> Vec<String> {
        let config = AppConfig::resolve(None);
        let ids = config.show_ids();
        let episodes = generate(&ids, DEFAULT_SEED).unwrap();
        write_episodes(&dir.join(EPISODES_FILE), &episodes).unwrap();
        let output = run_pipeline(&episodes, &ids, config.baseline_policy).unwrap();
        write_tables(dir, &output).unwrap();
        ids
    }

    #[test]
    fn clean_sample_run_passes() {
        let dir = tempfile::tempdir().unwrap();
        let ids = sample_run(dir.path());

        let runner = validate(dir.path(), dir.path(), &ids, true);
        assert_eq!(runner.failures(), 0, "{}", runner.render());
    }

    #[test]
    fn tampered_break_season_is_caught() {
        let dir = tempfile::tempdir().unwrap();
        let ids = sample_run(dir.path());

        let mut tables = export::read_tables(dir.path()).unwrap();
        let row = tables
            .breaks
            .iter_mut()
            .find(|b| b.shark_jump_season.is_some())
            .unwrap();
        row.shark_jump_season = row.shark_jump_season.map(|s| s + 1);

        let scope: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
        let mut runner = CheckRunner::default();
        check_outputs(&mut runner, &tables, &scope, true);
        assert_eq!(runner.failures(), 1, "{}", runner.render());
    }

    #[test]
    fn missing_outputs_fail() {
        let dir = tempfile::tempdir().unwrap();
        let runner = validate(dir.path(), dir.path(), &["tt1".to_string()], false);
        assert_eq!(runner.failures(), 2);
    }

    #[test]
    fn uncleaned_episode_table_explains_the_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(EPISODES_FILE),
            "episode_tconst,show_tconst,season_num,episode_num,avg_rating,num_votes\n\
             e1,tt1,\\N,1,7.0,10\n",
        )
        .unwrap();

        let runner = validate(dir.path(), dir.path(), &["tt1".to_string()], false);
        let outcome = runner
            .outcomes
            .iter()
            .find(|o| o.name == "episode table readable")
            .unwrap();
        assert_eq!(outcome.status, CheckStatus::Fail);
        assert!(outcome.detail.contains("no null markers"), "{}", outcome.detail);
    }

    #[test]
    fn bad_episode_rows_are_reported() {
        let scope: BTreeSet<&str> = ["tt1"].into_iter().collect();
        let episodes = vec![
            Episode {
                episode_id: "e1".to_string(),
                show_id: "tt1".to_string(),
                season: 1,
                episode: 1,
                rating: 11.0,
                votes: 10,
            },
            Episode {
                episode_id: "e1".to_string(),
                show_id: "tt2".to_string(),
                season: 1,
                episode: 2,
                rating: 7.0,
                votes: -1,
            },
        ];
        let mut runner = CheckRunner::default();
        check_episodes(&mut runner, &episodes, &scope, true);

        // duplicates, rating range, negative votes, unknown show, synthetic prefix
        assert_eq!(runner.failures(), 5, "{}", runner.render());
    }

    #[test]
    fn first_below_pair_uses_adjacent_rows() {
        let row = |season: i32, rolling: f64| KpiRow {
            show_tconst: "tt1".to_string(),
            season_num: season,
            episode_count: 1,
            season_total_votes: 10,
            weighted_rating: Some(rolling),
            mean_rating: rolling,
            rating_stddev: None,
            pct_high_rated: None,
            series_avg: Some(7.0),
            rolling_3_season_avg: Some(rolling),
            season_rank_best: None,
            catalog_value_index: None,
        };
        let rows = [row(1, 8.0), row(2, 6.0), row(3, 7.5), row(5, 6.5), row(6, 6.9)];
        let refs: Vec<&KpiRow> = rows.iter().collect();
        assert_eq!(first_below_pair(&refs), Some(5));
    }
}
