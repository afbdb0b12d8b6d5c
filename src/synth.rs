use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::models::Episode;

pub const DEFAULT_SEED: u64 = 42;

/// Prefix of every fabricated episode id.
pub const SYNTHETIC_PREFIX: &str = "tt999";

/// Per-season profile: (episodes, target rating, base votes).
type SeasonProfile = (usize, f64, i64);

/// Designed rating shapes for the default franchises.
const PROFILES: &[(&str, &[SeasonProfile])] = &[
    // gradual decline
    (
        "tt0096697",
        &[
            (8, 8.5, 30000),
            (8, 8.3, 28000),
            (7, 8.0, 25000),
            (7, 7.7, 22000),
            (6, 7.3, 18000),
            (6, 7.0, 15000),
            (5, 6.7, 10000),
            (5, 6.4, 8000),
        ],
    ),
    // sharp drop after the third season
    (
        "tt0206512",
        &[
            (8, 8.5, 20000),
            (7, 8.7, 22000),
            (7, 8.8, 25000),
            (6, 6.5, 12000),
            (6, 6.2, 10000),
            (5, 6.0, 8000),
        ],
    ),
    // dip and recovery, no drop-off
    (
        "tt0182576",
        &[
            (7, 8.2, 25000),
            (7, 8.5, 27000),
            (6, 7.8, 15000),
            (6, 9.2, 30000),
            (6, 8.3, 22000),
            (5, 8.0, 18000),
            (5, 7.8, 15000),
        ],
    ),
    // late decline
    (
        "tt1520211",
        &[
            (8, 8.8, 35000),
            (8, 8.5, 32000),
            (7, 8.2, 28000),
            (7, 7.5, 20000),
            (6, 6.5, 12000),
            (6, 6.0, 8000),
        ],
    ),
];

const RATING_SPREAD: f64 = 0.3;
const VOTE_SPREAD: i64 = 5000;
const MIN_VOTES: i64 = 500;

/// Fabricates episodes for every requested show that has a designed profile.
/// Same seed, same rows.
pub fn generate(show_ids: &[String], seed: u64) -> Result<Vec<Episode>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, RATING_SPREAD).map_err(|e| anyhow!("invalid rating spread: {e}"))?;
    let mut episodes = Vec::new();
    let mut counter = 1usize;

    for (show_id, seasons) in PROFILES {
        if !show_ids.iter().any(|id| id == show_id) {
            continue;
        }
        for (season_idx, (count, target, base_votes)) in seasons.iter().enumerate() {
            let vote_lo = (base_votes - VOTE_SPREAD).max(MIN_VOTES);
            let vote_hi = base_votes + VOTE_SPREAD;

            for episode_idx in 0..*count {
                let raw = target + noise.sample(&mut rng);
                let rating = ((raw * 10.0).round() / 10.0).clamp(1.0, 10.0);
                let votes = rng.random_range(vote_lo..vote_hi);

                episodes.push(Episode {
                    episode_id: format!("{SYNTHETIC_PREFIX}{counter:04}"),
                    show_id: show_id.to_string(),
                    season: season_idx as i32 + 1,
                    episode: episode_idx as i32 + 1,
                    rating,
                    votes,
                });
                counter += 1;
            }
        }
    }

    Ok(episodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::pipeline::run_pipeline;
    use crate::trend::BaselinePolicy;

    #[test]
    fn generation_is_deterministic() {
        let ids = AppConfig::resolve(None).show_ids();
        let first = generate(&ids, DEFAULT_SEED).unwrap();
        let second = generate(&ids, DEFAULT_SEED).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 52 + 39 + 42 + 42);
    }

    #[test]
    fn rows_respect_the_cleaned_contract() {
        let ids = AppConfig::resolve(None).show_ids();
        for episode in generate(&ids, 7).unwrap() {
            assert!(episode.episode_id.starts_with(SYNTHETIC_PREFIX));
            assert!(episode.season >= 1 && episode.episode >= 1);
            assert!((1.0..=10.0).contains(&episode.rating));
            assert!(episode.votes >= MIN_VOTES);
        }
    }

    #[test]
    fn only_requested_shows_are_generated() {
        let episodes = generate(&["tt0182576".to_string(), "tt404".to_string()], 1).unwrap();
        assert!(!episodes.is_empty());
        assert!(episodes.iter().all(|e| e.show_id == "tt0182576"));
    }

    #[test]
    fn declining_shapes_trigger_breaks() {
        let ids = AppConfig::resolve(None).show_ids();
        let episodes = generate(&ids, DEFAULT_SEED).unwrap();
        let output = run_pipeline(&episodes, &ids, BaselinePolicy::SeasonMean).unwrap();

        for declining in ["tt0096697", "tt0206512", "tt1520211"] {
            let result = output
                .results
                .iter()
                .find(|r| r.show_id == declining)
                .unwrap();
            assert!(result.break_season.is_some(), "{declining} should break");
        }
    }
}
