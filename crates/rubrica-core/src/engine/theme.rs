//! Thematic cap from the model's free-text theme-adherence signal.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeAdherence {
    OffTopic,
    Partial,
    Full,
}

impl ThemeAdherence {
    /// Ceiling on the 0–100 total, if any.
    pub fn cap(&self) -> Option<f64> {
        match self {
            Self::OffTopic => Some(20.0),
            Self::Partial => Some(60.0),
            Self::Full => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::OffTopic => "fuga ao tema",
            Self::Partial => "aderência parcial ao tema",
            Self::Full => "aderência plena ao tema",
        }
    }
}

/// Applied ceiling, recorded on the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeCap {
    pub adherence: ThemeAdherence,
    pub cap: f64,
    /// Whether the cap actually lowered the total.
    pub applied: bool,
}

lazy_static! {
    /// First match wins, so off-topic is checked before partial.
    static ref THEME_PATTERNS: Vec<(ThemeAdherence, Regex)> = vec![
        (
            ThemeAdherence::OffTopic,
            Regex::new(r"(?i)off[-\s]?topic|fuga\s+(?:de|ao|do)\s+tema|fora\s+do\s+tema").unwrap(),
        ),
        (
            ThemeAdherence::Partial,
            Regex::new(r"(?i)partial|ader[eê]ncia\s+parcial|parcial").unwrap(),
        ),
    ];
}

/// Classify the signal; anything unrecognized (or absent) counts as full adherence.
pub fn classify_theme(signal: Option<&str>) -> ThemeAdherence {
    let Some(signal) = signal else {
        return ThemeAdherence::Full;
    };
    THEME_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(signal))
        .map(|(adherence, _)| *adherence)
        .unwrap_or(ThemeAdherence::Full)
}
