use anyhow::Context;
use chrono::Utc;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::export::KpiRow;
use crate::models::{PipelineOutput, RunSummary};
use crate::trend::BaselinePolicy;

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Stores one pipeline run and all of its rows in a single transaction.
pub async fn publish_run(
    pool: &PgPool,
    policy: BaselinePolicy,
    episode_count: usize,
    output: &PipelineOutput,
) -> anyhow::Result<Uuid> {
    let run_id = Uuid::new_v4();
    let mut tx = pool.begin().await.context("failed to open transaction")?;

    sqlx::query(
        r#"
        INSERT INTO dropoff.runs (id, created_at, baseline_policy, episode_count)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(run_id)
    .bind(Utc::now())
    .bind(policy.as_str())
    .bind(i32::try_from(episode_count).context("episode count out of range")?)
    .execute(&mut *tx)
    .await?;

    for trend in &output.trends {
        let row = KpiRow::from(trend);
        sqlx::query(
            r#"
            INSERT INTO dropoff.season_kpis
            (run_id, show_tconst, season_num, episode_count, season_total_votes,
             weighted_rating, mean_rating, rating_stddev, pct_high_rated, series_avg,
             rolling_3_season_avg, season_rank_best, catalog_value_index)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(run_id)
        .bind(&row.show_tconst)
        .bind(row.season_num)
        .bind(i32::try_from(row.episode_count).context("season episode count out of range")?)
        .bind(row.season_total_votes)
        .bind(row.weighted_rating)
        .bind(row.mean_rating)
        .bind(row.rating_stddev)
        .bind(row.pct_high_rated)
        .bind(row.series_avg)
        .bind(row.rolling_3_season_avg)
        .bind(to_db_int(row.season_rank_best).context("season rank out of range")?)
        .bind(row.catalog_value_index)
        .execute(&mut *tx)
        .await?;
    }

    for result in &output.results {
        sqlx::query(
            r#"
            INSERT INTO dropoff.show_results
            (run_id, show_tconst, status, shark_jump_season, durability_index, season_count)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(run_id)
        .bind(&result.show_id)
        .bind(result.status.as_str())
        .bind(result.break_season)
        .bind(to_db_int(result.durability).context("durability out of range")?)
        .bind(i32::try_from(result.season_count).context("season count out of range")?)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await.context("failed to commit run")?;
    Ok(run_id)
}

fn to_db_int(value: Option<usize>) -> Result<Option<i32>, std::num::TryFromIntError> {
    value.map(i32::try_from).transpose()
}

pub async fn fetch_recent_runs(pool: &PgPool, limit: i64) -> anyhow::Result<Vec<RunSummary>> {
    let records = sqlx::query(
        r#"
        SELECT r.id, r.created_at, r.baseline_policy, r.episode_count,
               COUNT(s.show_tconst) AS show_count,
               COUNT(s.shark_jump_season) AS break_count
        FROM dropoff.runs r
        LEFT JOIN dropoff.show_results s ON s.run_id = r.id
        GROUP BY r.id, r.created_at, r.baseline_policy, r.episode_count
        ORDER BY r.created_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    let mut runs = Vec::new();
    for row in records {
        runs.push(RunSummary {
            run_id: row.get("id"),
            created_at: row.get("created_at"),
            baseline_policy: row.get("baseline_policy"),
            episode_count: row.get("episode_count"),
            show_count: row.get("show_count"),
            break_count: row.get("break_count"),
        });
    }

    Ok(runs)
}
