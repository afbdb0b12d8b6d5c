use thiserror::Error;

/// Contract violations surfaced by the metric engine. These are never
/// recovered internally: callers get the first offending row.
#[derive(Debug, Error, PartialEq)]
pub enum EngineError {
    #[error("episode {episode_id} has negative vote count {votes}")]
    NegativeVotes { episode_id: String, votes: i64 },

    #[error("episode {episode_id} has negative season number {season}")]
    NegativeSeason { episode_id: String, season: i32 },

    #[error("episode {episode_id} has negative episode number {episode}")]
    NegativeEpisode { episode_id: String, episode: i32 },

    #[error("episode {episode_id} has a non-finite rating")]
    NonFiniteRating { episode_id: String },

    #[error("episode {episode_id} appears more than once")]
    DuplicateEpisode { episode_id: String },

    #[error("show {show_id} has season {season} more than once")]
    DuplicateSeason { show_id: String, season: i32 },
}
