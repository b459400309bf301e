//! Rubric model, catalog access and normalization.
//!
//! A rubric arrives from the catalog in one of several authored shapes
//! (criteria array, keyed mapping of name → weight, keyed mapping of
//! name → detail object). [`RubricLoader`] turns any of them into a
//! [`RubricDefinition`] whose weights sum to 1 and whose criteria are in
//! natural id order.

mod catalog;
mod loader;
mod order;
mod parse;

pub use catalog::{CatalogEntry, DirCatalog, EntryBody, MemoryCatalog, RubricCatalog};
pub use loader::{canonical_rubric_name, RubricLoader};
pub use order::natural_cmp;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Highest ordinal level a criterion can be judged at.
pub const MAX_LEVEL: u8 = 5;

/// One scored dimension of a rubric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    pub id: String,
    pub name: String,
    /// Normalized weight in `0..=1`.
    pub weight: f64,
    #[serde(default)]
    pub description: String,
    /// Optional description per level (0..=5).
    #[serde(default)]
    pub level_descriptions: BTreeMap<u8, String>,
}

/// A rubric-declared cap or floor on one or more criteria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardRule {
    pub id: String,
    #[serde(rename = "type")]
    pub rule_type: String,
    pub target_criterion_ids: Vec<String>,
    pub max_level: Option<u8>,
    pub min_level: Option<u8>,
    /// Natural-language trigger condition.
    pub condition: Option<String>,
}

/// A normalized rubric. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RubricDefinition {
    pub name: String,
    pub institution: Option<String>,
    pub criteria: Vec<Criterion>,
    pub rules: Vec<HardRule>,
    /// Level → value table for this rubric family.
    pub level_map: LevelValueMap,
    pub display_scale: DisplayScale,
    /// Whether the essay-length reduction applies to this rubric.
    pub length_policy: bool,
}

impl RubricDefinition {
    pub fn criterion(&self, id: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|c| c.id == id)
    }

    pub fn total_weight(&self) -> f64 {
        self.criteria.iter().map(|c| c.weight).sum()
    }
}

/// Fixed, non-decreasing level → value table (index = level 0..=5).
///
/// Authored either by name (`graded`, `linear`) or as an explicit
/// six-element array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LevelMapSpec")]
pub struct LevelValueMap([f64; 6]);

impl LevelValueMap {
    /// Unequal steps, level 0 worth nothing.
    pub const GRADED: LevelValueMap = LevelValueMap([0.0, 0.3, 0.5, 0.7, 0.9, 1.0]);
    /// Evenly spaced ("soft") table.
    pub const LINEAR: LevelValueMap = LevelValueMap([0.0, 0.2, 0.4, 0.6, 0.8, 1.0]);

    /// Validate a custom table: values in `[0, 1]`, non-decreasing.
    pub fn new(values: [f64; 6]) -> Result<Self, String> {
        if let Some(v) = values.iter().find(|v| !v.is_finite() || **v < 0.0 || **v > 1.0) {
            return Err(format!("level value {} outside [0, 1]", v));
        }
        if values.windows(2).any(|w| w[1] < w[0]) {
            return Err("level values must be non-decreasing".to_string());
        }
        Ok(Self(values))
    }

    pub fn named(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "graded" => Some(Self::GRADED),
            "linear" | "soft" => Some(Self::LINEAR),
            _ => None,
        }
    }

    /// Value for a level; levels above 5 read as 5.
    pub fn value(&self, level: u8) -> f64 {
        self.0[usize::from(level.min(MAX_LEVEL))]
    }

    pub fn values(&self) -> &[f64; 6] {
        &self.0
    }

    /// `0→0.00, 1→0.30, ...` for explanations.
    pub fn describe(&self) -> String {
        self.0
            .iter()
            .enumerate()
            .map(|(i, v)| format!("{}→{:.2}", i, v))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LevelMapSpec {
    Named(String),
    Table(Vec<f64>),
}

impl TryFrom<LevelMapSpec> for LevelValueMap {
    type Error = String;

    fn try_from(spec: LevelMapSpec) -> Result<Self, Self::Error> {
        match spec {
            LevelMapSpec::Named(name) => {
                Self::named(&name).ok_or_else(|| format!("unknown level map '{}'", name))
            }
            LevelMapSpec::Table(values) => {
                let table: [f64; 6] = values
                    .as_slice()
                    .try_into()
                    .map_err(|_| format!("level map needs 6 values, got {}", values.len()))?;
                Self::new(table)
            }
        }
    }
}

/// Scale the final score is shown on. The engine always works on 0–100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum DisplayScale {
    #[default]
    Hundred,
    Thousand,
}

impl DisplayScale {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Hundred => "0–100",
            Self::Thousand => "0–1000",
        }
    }

    /// Round a 0–100 score onto this scale.
    pub fn display(&self, score_0_100: f64) -> u32 {
        let scaled = match self {
            Self::Hundred => score_0_100,
            Self::Thousand => score_0_100 * 10.0,
        };
        scaled.round().max(0.0) as u32
    }
}

impl TryFrom<u32> for DisplayScale {
    type Error = String;

    fn try_from(max: u32) -> Result<Self, Self::Error> {
        match max {
            100 => Ok(Self::Hundred),
            1000 => Ok(Self::Thousand),
            other => Err(format!("unsupported display scale {}", other)),
        }
    }
}

impl From<DisplayScale> for u32 {
    fn from(scale: DisplayScale) -> u32 {
        match scale {
            DisplayScale::Hundred => 100,
            DisplayScale::Thousand => 1000,
        }
    }
}
