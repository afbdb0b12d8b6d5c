use crate::models::{SeasonTrend, ShowResult, ShowStatus};

/// Scan state for a single show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    NotBelow,
    BelowOnce(i32),
    Confirmed(i32),
}

/// Finds the drop-off season of one show: the first season of the earliest
/// pair of adjacent rows whose rolling average is strictly below the series
/// baseline. Adjacency is over the rows present, not over season numbers.
///
/// Durability counts rows at or above the baseline over the whole sequence,
/// independently of whether a break was found.
pub fn detect_break(show_id: &str, trends: &[SeasonTrend]) -> ShowResult {
    let mut ordered: Vec<&SeasonTrend> = trends.iter().collect();
    ordered.sort_by_key(|t| t.season());

    let season_count = ordered.len();
    let has_baseline = ordered.iter().any(|t| t.series_baseline.is_some());
    if !has_baseline {
        return ShowResult {
            show_id: show_id.to_string(),
            status: ShowStatus::InsufficientData,
            break_season: None,
            durability: None,
            season_count,
        };
    }

    let mut state = ScanState::NotBelow;
    for trend in &ordered {
        state = match (state, trend.is_below_baseline()) {
            (ScanState::Confirmed(season), _) => ScanState::Confirmed(season),
            (ScanState::BelowOnce(start), true) => ScanState::Confirmed(start),
            (_, true) => ScanState::BelowOnce(trend.season()),
            (_, false) => ScanState::NotBelow,
        };
        if matches!(state, ScanState::Confirmed(_)) {
            break;
        }
    }

    let break_season = match state {
        ScanState::Confirmed(season) => Some(season),
        _ => None,
    };
    let durability = ordered.iter().filter(|t| t.is_durable()).count();

    ShowResult {
        show_id: show_id.to_string(),
        status: ShowStatus::Evaluated,
        break_season,
        durability: Some(durability),
        season_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SeasonAggregate;
    use crate::trend::{compute_show_trends, BaselinePolicy};

    fn trends_for(seasons: &[(i32, Option<f64>)]) -> Vec<SeasonTrend> {
        let aggregates = seasons
            .iter()
            .map(|(num, weighted)| SeasonAggregate {
                show_id: "x".to_string(),
                season: *num,
                episode_count: 1,
                total_votes: if weighted.is_some() { 100 } else { 0 },
                weighted_rating: *weighted,
                mean_rating: weighted.unwrap_or(5.0),
                rating_stddev: None,
                episode_ratings: vec![weighted.unwrap_or(5.0)],
            })
            .collect();
        compute_show_trends(aggregates, BaselinePolicy::SeasonMean).unwrap()
    }

    fn ratings(values: &[f64]) -> Vec<SeasonTrend> {
        let seasons: Vec<(i32, Option<f64>)> = values
            .iter()
            .enumerate()
            .map(|(idx, v)| (idx as i32 + 1, Some(*v)))
            .collect();
        trends_for(&seasons)
    }

    #[test]
    fn break_is_attributed_to_first_season_of_the_pair() {
        // Rolling averages 9.0, 7.0, 6.33, 5.0, 4.67, 4.33 against a baseline of 5.33.
        let result = detect_break("x", &ratings(&[9.0, 5.0, 5.0, 5.0, 4.0, 4.0]));
        assert_eq!(result.status, ShowStatus::Evaluated);
        assert_eq!(result.break_season, Some(4));
        assert_eq!(result.durability, Some(3));
    }

    #[test]
    fn late_single_dip_below_baseline_is_not_a_break() {
        // Rolling averages 8.0, 8.1, 8.03, 7.37, 6.57 against a baseline of 7.18:
        // only the last season is below, so no pair qualifies.
        let result = detect_break("x", &ratings(&[8.0, 8.2, 7.9, 6.0, 5.8]));
        assert_eq!(result.status, ShowStatus::Evaluated);
        assert_eq!(result.break_season, None);
        assert_eq!(result.durability, Some(4));
    }

    #[test]
    fn flat_show_has_no_break_and_is_fully_durable() {
        let result = detect_break("y", &ratings(&[7.0, 7.0, 7.0]));
        assert_eq!(result.break_season, None);
        assert_eq!(result.durability, Some(3));
    }

    #[test]
    fn long_flat_shows_ignore_rounding_noise() {
        for rating in [1.05, 1.06, 1.2] {
            for len in [6, 10, 12] {
                let result = detect_break("y", &ratings(&vec![rating; len]));
                assert_eq!(result.break_season, None, "rating {rating} over {len} seasons");
                assert_eq!(result.durability, Some(len), "rating {rating} over {len} seasons");
            }
        }
    }

    #[test]
    fn single_below_season_does_not_break() {
        // Rolling averages 8.0, 8.0, 7.33, 8.0, 8.0 against a baseline of 8.0.
        let result = detect_break("x", &ratings(&[8.0, 8.0, 6.0, 10.0, 8.0]));
        assert_eq!(result.break_season, None);
        assert_eq!(result.durability, Some(4));
    }

    #[test]
    fn dip_and_recovery_does_not_break() {
        let result = detect_break("x", &ratings(&[8.2, 8.5, 7.8, 9.2, 8.3, 8.0, 7.8]));
        assert_eq!(result.break_season, None);
    }

    #[test]
    fn gaps_in_season_numbers_are_adjacent_rows() {
        let trends = trends_for(&[
            (1, Some(9.0)),
            (2, Some(9.0)),
            (4, Some(5.0)),
            (7, Some(5.0)),
            (8, Some(5.0)),
        ]);
        let result = detect_break("x", &trends);
        assert_eq!(result.break_season, Some(7));
    }

    #[test]
    fn unordered_input_is_scanned_by_season() {
        let mut trends = ratings(&[9.0, 5.0, 5.0, 5.0, 4.0, 4.0]);
        trends.reverse();
        assert_eq!(detect_break("x", &trends).break_season, Some(4));
    }

    #[test]
    fn single_season_show_never_breaks() {
        let result = detect_break("x", &ratings(&[6.1]));
        assert_eq!(result.break_season, None);
        assert_eq!(result.durability, Some(1));
        assert_eq!(result.season_count, 1);
    }

    #[test]
    fn show_without_baseline_reports_insufficient_data() {
        let result = detect_break("x", &trends_for(&[(1, None), (2, None)]));
        assert_eq!(result.status, ShowStatus::InsufficientData);
        assert_eq!(result.break_season, None);
        assert_eq!(result.durability, None);
    }

    #[test]
    fn durability_never_exceeds_season_count() {
        for values in [
            vec![8.0, 7.0, 6.0, 5.0],
            vec![5.0, 6.0, 7.0, 8.0],
            vec![7.0, 7.0],
        ] {
            let result = detect_break("x", &ratings(&values));
            assert!(result.durability.unwrap() <= result.season_count);
        }
    }
}
