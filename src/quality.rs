//! Content metrics: word count, reading time and quality score.
//!
//! Score weights (stable for a given input):
//!
//! | component | weight |
//! |---|---|
//! | length, `min(1, words / 1500)` | 0.60 |
//! | author metadata present | 0.15 |
//! | publish date metadata present | 0.15 |
//! | `1 - link_density` | 0.10 |
//!
//! Pages where more than half the text sits inside links have their score
//! halved. The result is clamped to `[0, 1]` and rounded to 3 decimals.

pub const WORDS_PER_MINUTE: usize = 200;
pub const SATURATION_WORDS: usize = 1500;

const LENGTH_WEIGHT: f64 = 0.6;
const AUTHOR_BONUS: f64 = 0.15;
const DATE_BONUS: f64 = 0.15;
const LINK_WEIGHT: f64 = 0.1;
const LINK_HEAVY_THRESHOLD: f64 = 0.5;

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// `ceil(words / 200)`, at least one minute for non-empty content
pub fn reading_time_minutes(words: usize) -> usize {
    if words == 0 {
        0
    } else {
        words.div_ceil(WORDS_PER_MINUTE).max(1)
    }
}

/// Inputs to [`quality_score`]
#[derive(Debug, Clone, Copy, Default)]
pub struct QualitySignals {
    pub words: usize,
    pub has_author: bool,
    pub has_publish_date: bool,
    /// Share of page text (by characters) inside `<a>` elements
    pub link_density: f64,
}

pub fn quality_score(signals: &QualitySignals) -> f64 {
    let length = (signals.words as f64 / SATURATION_WORDS as f64).min(1.0);
    let link_density = signals.link_density.clamp(0.0, 1.0);

    let mut score = LENGTH_WEIGHT * length + LINK_WEIGHT * (1.0 - link_density);
    if signals.has_author {
        score += AUTHOR_BONUS;
    }
    if signals.has_publish_date {
        score += DATE_BONUS;
    }
    if link_density > LINK_HEAVY_THRESHOLD {
        score *= 0.5;
    }
    (score.clamp(0.0, 1.0) * 1000.0).round() / 1000.0
}
