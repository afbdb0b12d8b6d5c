use std::collections::{BTreeMap, HashSet};

use crate::error::EngineError;
use crate::models::{Episode, SeasonAggregate};

/// Reduces episode rows to one aggregate per (show, season), sorted by show
/// then season. Rows inside a group are summed in episode order so the result
/// does not depend on input ordering.
pub fn aggregate(episodes: &[Episode]) -> Result<Vec<SeasonAggregate>, EngineError> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(episodes.len());
    let mut groups: BTreeMap<(&str, i32), Vec<&Episode>> = BTreeMap::new();

    for episode in episodes {
        check_contract(episode)?;
        if !seen.insert(episode.episode_id.as_str()) {
            return Err(EngineError::DuplicateEpisode {
                episode_id: episode.episode_id.clone(),
            });
        }

        groups
            .entry((episode.show_id.as_str(), episode.season))
            .or_default()
            .push(episode);
    }

    Ok(groups
        .into_iter()
        .map(|((show_id, season), mut rows)| {
            rows.sort_by(|a, b| {
                a.episode
                    .cmp(&b.episode)
                    .then_with(|| a.episode_id.cmp(&b.episode_id))
            });
            summarize_season(show_id, season, &rows)
        })
        .collect())
}

fn check_contract(episode: &Episode) -> Result<(), EngineError> {
    if episode.votes < 0 {
        return Err(EngineError::NegativeVotes {
            episode_id: episode.episode_id.clone(),
            votes: episode.votes,
        });
    }
    if episode.season < 0 {
        return Err(EngineError::NegativeSeason {
            episode_id: episode.episode_id.clone(),
            season: episode.season,
        });
    }
    if episode.episode < 0 {
        return Err(EngineError::NegativeEpisode {
            episode_id: episode.episode_id.clone(),
            episode: episode.episode,
        });
    }
    if !episode.rating.is_finite() {
        return Err(EngineError::NonFiniteRating {
            episode_id: episode.episode_id.clone(),
        });
    }
    Ok(())
}

fn summarize_season(show_id: &str, season: i32, rows: &[&Episode]) -> SeasonAggregate {
    let episode_count = rows.len();
    let total_votes: i64 = rows.iter().map(|e| e.votes).sum();
    let weighted_sum: f64 = rows.iter().map(|e| e.rating * e.votes as f64).sum();

    let weighted_rating = if total_votes == 0 {
        None
    } else {
        Some(weighted_sum / total_votes as f64)
    };

    let mut episode_ratings: Vec<f64> = rows.iter().map(|e| e.rating).collect();
    let mean_rating = episode_ratings.iter().sum::<f64>() / episode_count as f64;
    let rating_stddev = sample_stddev(&episode_ratings, mean_rating);
    episode_ratings.sort_by(f64::total_cmp);

    SeasonAggregate {
        show_id: show_id.to_string(),
        season,
        episode_count,
        total_votes,
        weighted_rating,
        mean_rating,
        rating_stddev,
        episode_ratings,
    }
}

fn sample_stddev(values: &[f64], mean: f64) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let squares: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    Some((squares / (values.len() - 1) as f64).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(id: &str, show: &str, season: i32, num: i32, rating: f64, votes: i64) -> Episode {
        Episode {
            episode_id: id.to_string(),
            show_id: show.to_string(),
            season,
            episode: num,
            rating,
            votes,
        }
    }

    #[test]
    fn weighted_rating_uses_vote_counts() {
        let episodes = vec![
            episode("e1", "show", 1, 1, 8.0, 300),
            episode("e2", "show", 1, 2, 6.0, 100),
        ];

        let aggregates = aggregate(&episodes).unwrap();
        assert_eq!(aggregates.len(), 1);
        let season = &aggregates[0];
        assert_eq!(season.episode_count, 2);
        assert_eq!(season.total_votes, 400);
        assert!((season.weighted_rating.unwrap() - 7.5).abs() < 1e-9);
        assert!((season.mean_rating - 7.0).abs() < 1e-9);
        assert!((season.rating_stddev.unwrap() - 2.0_f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn zero_vote_season_has_no_weighted_rating() {
        let episodes = vec![episode("e1", "show", 1, 1, 7.2, 0)];

        let aggregates = aggregate(&episodes).unwrap();
        assert_eq!(aggregates[0].weighted_rating, None);
        assert_eq!(aggregates[0].rating_stddev, None);
        assert!((aggregates[0].mean_rating - 7.2).abs() < 1e-9);
    }

    #[test]
    fn groups_by_show_and_season_in_sorted_order() {
        let episodes = vec![
            episode("e4", "b", 1, 1, 7.0, 10),
            episode("e3", "a", 2, 1, 7.0, 10),
            episode("e1", "a", 1, 1, 7.0, 10),
            episode("e2", "a", 1, 2, 8.0, 10),
        ];

        let keys: Vec<(String, i32, usize)> = aggregate(&episodes)
            .unwrap()
            .into_iter()
            .map(|a| (a.show_id, a.season, a.episode_count))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("a".to_string(), 1, 2),
                ("a".to_string(), 2, 1),
                ("b".to_string(), 1, 1),
            ]
        );
    }

    #[test]
    fn input_order_does_not_change_output() {
        let mut episodes = vec![
            episode("e1", "show", 1, 1, 8.1, 1234),
            episode("e2", "show", 1, 2, 7.3, 999),
            episode("e3", "show", 1, 3, 6.9, 4321),
            episode("e4", "show", 2, 1, 8.8, 17),
        ];
        let forward = aggregate(&episodes).unwrap();
        episodes.reverse();
        let backward = aggregate(&episodes).unwrap();
        assert_eq!(forward, backward);
    }

    #[test]
    fn negative_votes_fail_fast() {
        let episodes = vec![episode("e1", "show", 1, 1, 8.0, -5)];
        assert_eq!(
            aggregate(&episodes),
            Err(EngineError::NegativeVotes {
                episode_id: "e1".to_string(),
                votes: -5
            })
        );
    }

    #[test]
    fn negative_season_fails_fast() {
        let episodes = vec![
            episode("e1", "show", 1, 1, 8.0, 5),
            episode("e2", "show", -1, 1, 8.0, 5),
        ];
        assert_eq!(
            aggregate(&episodes),
            Err(EngineError::NegativeSeason {
                episode_id: "e2".to_string(),
                season: -1
            })
        );
    }

    #[test]
    fn negative_episode_fails_fast() {
        let episodes = vec![episode("e1", "show", 1, -3, 8.0, 5)];
        assert_eq!(
            aggregate(&episodes),
            Err(EngineError::NegativeEpisode {
                episode_id: "e1".to_string(),
                episode: -3
            })
        );
    }

    #[test]
    fn duplicate_episode_ids_are_rejected() {
        let episodes = vec![
            episode("e1", "show", 1, 1, 8.0, 5),
            episode("e1", "show", 1, 2, 8.0, 5),
        ];
        assert!(matches!(
            aggregate(&episodes),
            Err(EngineError::DuplicateEpisode { .. })
        ));
    }

    #[test]
    fn non_finite_rating_is_rejected() {
        let episodes = vec![episode("e1", "show", 1, 1, f64::NAN, 5)];
        assert!(matches!(
            aggregate(&episodes),
            Err(EngineError::NonFiniteRating { .. })
        ));
    }
}
