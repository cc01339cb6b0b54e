//! Static engine configuration
//!
//! The song and scoring table are fixed at configuration time and never
//! mutated while a session runs.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::*;

/// Configuration load/validation failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid config json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("song '{0}' has no notes")]
    EmptySong(String),
    #[error("song offsets must be non-decreasing (note {index}: {offset} < {previous})")]
    UnorderedOffsets {
        index: usize,
        offset: u64,
        previous: u64,
    },
    #[error("display margin must be greater than zero")]
    ZeroMargin,
}

/// An ordered, immutable list of note offsets (in blocks from session start)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    /// Song selector sent with the start request
    pub id: u64,
    pub title: String,
    offsets: Vec<u64>,
}

impl Song {
    pub fn new(id: u64, title: impl Into<String>, offsets: Vec<u64>) -> Self {
        Self {
            id,
            title: title.into(),
            offsets,
        }
    }

    /// The built-in demo song
    pub fn demo() -> Self {
        Self::new(0, "Demo Song", DEMO_SONG_OFFSETS.to_vec())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    #[inline]
    pub fn offset(&self, index: usize) -> Option<u64> {
        self.offsets.get(index).copied()
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.offsets.is_empty() {
            return Err(ConfigError::EmptySong(self.title.clone()));
        }
        for (i, pair) in self.offsets.windows(2).enumerate() {
            if pair[1] < pair[0] {
                return Err(ConfigError::UnorderedOffsets {
                    index: i + 1,
                    offset: pair[1],
                    previous: pair[0],
                });
            }
        }
        Ok(())
    }
}

/// Points credited per quality label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreTable {
    pub perfect: u64,
    pub good: u64,
    pub miss: u64,
}

impl Default for ScoreTable {
    fn default() -> Self {
        Self {
            perfect: PERFECT_POINTS,
            good: GOOD_POINTS,
            miss: MISS_POINTS,
        }
    }
}

/// Everything the engine needs that is decided before a session starts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub song: Song,
    /// Notes further than this many blocks from the hit line are not projected
    pub display_margin: u64,
    pub scoring: ScoreTable,

    // === Wall-clock pacing ===
    pub countdown_ms: u32,
    pub countdown_step_ms: u32,
    pub feedback_ms: u32,

    // === Layout ===
    pub hit_line_y: f32,
    pub pixels_per_block: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            song: Song::demo(),
            display_margin: DISPLAY_MARGIN,
            scoring: ScoreTable::default(),
            countdown_ms: COUNTDOWN_MS,
            countdown_step_ms: COUNTDOWN_STEP_MS,
            feedback_ms: FEEDBACK_MS,
            hit_line_y: HIT_LINE_Y,
            pixels_per_block: PIXELS_PER_BLOCK,
        }
    }
}

impl EngineConfig {
    /// Demo song with default pacing
    pub fn demo() -> Self {
        Self::default()
    }

    /// Config for a given song, everything else default
    pub fn with_song(song: Song) -> Self {
        Self {
            song,
            ..Self::default()
        }
    }

    /// Parse and validate a JSON config; missing fields fall back to defaults
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        log::info!(
            "Loaded config: '{}' ({} notes, margin {})",
            config.song.title,
            config.song.len(),
            config.display_margin
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.song.validate()?;
        if self.display_margin == 0 {
            return Err(ConfigError::ZeroMargin);
        }
        Ok(())
    }

    /// Best possible score for the configured song
    pub fn max_score(&self) -> u64 {
        self.song.len() as u64 * self.scoring.perfect
    }

    /// Whole countdown seconds left to display for `remaining_ms`
    pub fn countdown_display(&self, remaining_ms: u32) -> u32 {
        let step = self.countdown_step_ms.max(1);
        remaining_ms.div_ceil(step)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::demo();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_score(), DEMO_SONG_OFFSETS.len() as u64 * 100);
    }

    #[test]
    fn test_from_json_partial() {
        let json = r#"{ "song": { "id": 7, "title": "Short", "offsets": [0, 50, 120] } }"#;
        let config = EngineConfig::from_json(json).unwrap();
        assert_eq!(config.song.id, 7);
        assert_eq!(config.song.offsets(), &[0, 50, 120]);
        assert_eq!(config.display_margin, DISPLAY_MARGIN);
        assert_eq!(config.scoring.perfect, 100);
    }

    #[test]
    fn test_from_json_rejects_unordered() {
        let json = r#"{ "song": { "id": 1, "title": "Bad", "offsets": [0, 120, 50] } }"#;
        match EngineConfig::from_json(json) {
            Err(ConfigError::UnorderedOffsets { index, .. }) => assert_eq!(index, 2),
            other => panic!("expected UnorderedOffsets, got {:?}", other),
        }
    }

    #[test]
    fn test_from_json_rejects_empty_and_zero_margin() {
        let empty = r#"{ "song": { "id": 1, "title": "Empty", "offsets": [] } }"#;
        assert!(matches!(
            EngineConfig::from_json(empty),
            Err(ConfigError::EmptySong(_))
        ));

        let zero = r#"{ "display_margin": 0 }"#;
        assert!(matches!(
            EngineConfig::from_json(zero),
            Err(ConfigError::ZeroMargin)
        ));

        assert!(matches!(
            EngineConfig::from_json("not json"),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn test_countdown_display() {
        let config = EngineConfig::demo();
        assert_eq!(config.countdown_display(3000), 3);
        assert_eq!(config.countdown_display(2001), 3);
        assert_eq!(config.countdown_display(2000), 2);
        assert_eq!(config.countdown_display(1), 1);
        assert_eq!(config.countdown_display(0), 0);
    }
}
