//! Pipeline configuration.
//!
//! Everything here is pure data. Patterns are kept as strings and compiled
//! by the component that uses them, so a bad pattern surfaces as
//! [`GradingError::Config`] when the pipeline is built.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{GradingError, GradingResult};
use crate::rubric::LevelValueMap;

/// Top-level configuration for a [`GradingPipeline`](crate::GradingPipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Model used for the grading judgment.
    pub judge_model: String,

    /// Ordered OCR models: primary first, then fallbacks.
    pub ocr_models: Vec<String>,

    /// Wall-clock limit for one judgment call.
    pub judge_timeout_secs: u64,

    /// Part of every cache key; bump when scoring behaviour changes.
    pub pipeline_version: String,

    /// Table used when a rubric does not declare `level_map`. `None` makes
    /// the field mandatory on every rubric.
    pub default_level_map: Option<LevelValueMap>,

    /// Rubric name → criterion id → weight. Applied after weight coercion.
    pub weight_overrides: BTreeMap<String, BTreeMap<String, f64>>,

    pub length_policy: LengthPolicyConfig,

    pub repertoire: RepertoireConfig,

    /// Upper bound on suggestions shown in the report.
    pub max_suggestions: usize,

    /// Transcribe a proposal image when no proposal text was supplied.
    pub transcribe_proposal_images: bool,

    /// Directory for [`DirCache`](crate::DirCache). `None` means in-memory only.
    pub cache_dir: Option<PathBuf>,

    /// Entry cap for the directory cache.
    pub cache_max_entries: Option<usize>,
}

/// Essay-length reduction for a named institution group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LengthPolicyConfig {
    /// Matched against rubric name and institution.
    pub institution_pattern: String,
    /// Matched against criterion id and name to pick the reduced criteria.
    pub criterion_pattern: String,
    pub low_threshold: usize,
    pub high_threshold: usize,
}

/// Criteria capped when an essay shows no external repertoire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepertoireConfig {
    pub argumentation: CriterionSelector,
    pub argumentation_max_level: u8,
    pub theme: CriterionSelector,
    pub theme_max_level: u8,
    /// Weak signals needed to count repertoire as present.
    pub min_weak_signals: usize,
    /// Extra strong-signal patterns appended to the built-in table.
    pub extra_strong_signals: Vec<SignalPatternConfig>,
}

/// Picks a criterion by exact id or by a name pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionSelector {
    #[serde(default)]
    pub ids: Vec<String>,
    #[serde(default)]
    pub name_pattern: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalPatternConfig {
    pub label: String,
    pub pattern: String,
}

fn default_judge_model() -> String {
    "gpt-4.1".to_string()
}

fn default_ocr_models() -> Vec<String> {
    vec![
        "gpt-4o".to_string(),
        "gpt-4o-mini".to_string(),
        "gpt-4.1-mini".to_string(),
    ]
}

fn default_timeout() -> u64 {
    240
}

fn default_pipeline_version() -> String {
    "rubrica-pipeline-v1".to_string()
}

fn default_weight_overrides() -> BTreeMap<String, BTreeMap<String, f64>> {
    let fuvest = [("C1", 0.30), ("C2", 0.20), ("C3", 0.30), ("C4", 0.20)]
        .into_iter()
        .map(|(id, w)| (id.to_string(), w))
        .collect();
    BTreeMap::from([("FUVEST".to_string(), fuvest)])
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            judge_model: default_judge_model(),
            ocr_models: default_ocr_models(),
            judge_timeout_secs: default_timeout(),
            pipeline_version: default_pipeline_version(),
            default_level_map: None,
            weight_overrides: default_weight_overrides(),
            length_policy: LengthPolicyConfig::default(),
            repertoire: RepertoireConfig::default(),
            max_suggestions: 5,
            transcribe_proposal_images: true,
            cache_dir: None,
            cache_max_entries: None,
        }
    }
}

impl Default for LengthPolicyConfig {
    fn default() -> Self {
        Self {
            institution_pattern: r"(?i)\b(?:UNESP|VUNESP|EINSTEIN|SANTA[\s_-]*CASA)\b".to_string(),
            criterion_pattern: r"(?i)^\s*[CD]\s*(?:[—–-]|$)".to_string(),
            low_threshold: 15,
            high_threshold: 20,
        }
    }
}

impl Default for RepertoireConfig {
    fn default() -> Self {
        Self {
            argumentation: CriterionSelector {
                ids: vec!["C2".to_string()],
                name_pattern: Some(r"(?i)argumenta".to_string()),
            },
            argumentation_max_level: 2,
            theme: CriterionSelector {
                ids: vec!["C1".to_string()],
                name_pattern: Some(r"(?i)tema|g[êe]nero|theme|genre".to_string()),
            },
            theme_max_level: 3,
            min_weak_signals: 2,
            extra_strong_signals: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with environment variables.
    ///
    /// | Variable | Description |
    /// |----------|-------------|
    /// | `RUBRICA_JUDGE_MODEL` | Judgment model id |
    /// | `RUBRICA_OCR_MODELS` | Comma-separated OCR model chain |
    /// | `RUBRICA_JUDGE_TIMEOUT_SECS` | Judgment timeout in seconds |
    /// | `RUBRICA_PIPELINE_VERSION` | Version tag folded into cache keys |
    /// | `RUBRICA_CACHE_DIR` | Directory for the on-disk grade cache |
    /// | `RUBRICA_CACHE_MAX_ENTRIES` | Entry cap for the on-disk grade cache |
    ///
    /// Unset or blank variables leave the default in place; a number that
    /// does not parse is a [`GradingError::Config`].
    pub fn from_env() -> GradingResult<Self> {
        let config = Self::default().with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Read a YAML file, then apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> GradingResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| GradingError::Config {
            message: format!("failed to read {}: {}", path.display(), e),
        })?;
        let config: Self = serde_yaml::from_str(&text).map_err(|e| GradingError::Config {
            message: format!("invalid config {}: {}", path.display(), e),
        })?;
        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn with_env_overrides(mut self) -> GradingResult<Self> {
        if let Some(model) = env_value("RUBRICA_JUDGE_MODEL") {
            self.judge_model = model;
        }
        if let Some(models) = env_value("RUBRICA_OCR_MODELS") {
            let models: Vec<String> = models
                .split(',')
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .collect();
            if !models.is_empty() {
                self.ocr_models = models;
            }
        }
        if let Some(secs) = env_number("RUBRICA_JUDGE_TIMEOUT_SECS")? {
            self.judge_timeout_secs = secs;
        }
        if let Some(version) = env_value("RUBRICA_PIPELINE_VERSION") {
            self.pipeline_version = version;
        }
        if let Some(dir) = env_value("RUBRICA_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(dir));
        }
        if let Some(max) = env_number("RUBRICA_CACHE_MAX_ENTRIES")? {
            self.cache_max_entries = Some(max);
        }
        Ok(self)
    }

    /// Reject values no component could work with.
    pub fn validate(&self) -> GradingResult<()> {
        if self.judge_timeout_secs == 0 {
            return Err(config_error("judge_timeout_secs must be positive"));
        }
        if self.length_policy.low_threshold > self.length_policy.high_threshold {
            return Err(config_error(
                "length_policy.low_threshold must not exceed high_threshold",
            ));
        }
        for (rubric, table) in &self.weight_overrides {
            if let Some((id, w)) = table.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
                return Err(config_error(format!(
                    "weight override {}/{} = {} is not a non-negative number",
                    rubric, id, w
                )));
            }
        }
        Ok(())
    }

    pub fn judge_timeout(&self) -> Duration {
        Duration::from_secs(self.judge_timeout_secs)
    }

    pub fn with_judge_model(mut self, model: impl Into<String>) -> Self {
        self.judge_model = model.into();
        self
    }

    pub fn with_default_level_map(mut self, map: LevelValueMap) -> Self {
        self.default_level_map = Some(map);
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }
}

/// Trimmed value of a set, non-blank variable.
fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_number<T: std::str::FromStr>(name: &str) -> GradingResult<Option<T>> {
    env_value(name)
        .map(|v| {
            v.parse()
                .map_err(|_| config_error(format!("{} must be a non-negative integer, got '{}'", name, v)))
        })
        .transpose()
}

fn config_error(message: impl Into<String>) -> GradingError {
    GradingError::Config {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::NamedTempFile;

    const ENV_VARS: &[&str] = &[
        "RUBRICA_JUDGE_MODEL",
        "RUBRICA_OCR_MODELS",
        "RUBRICA_JUDGE_TIMEOUT_SECS",
        "RUBRICA_PIPELINE_VERSION",
        "RUBRICA_CACHE_DIR",
        "RUBRICA_CACHE_MAX_ENTRIES",
    ];

    fn clear_env() {
        for name in ENV_VARS {
            std::env::remove_var(name);
        }
    }

    #[test]
    fn defaults_match_production_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.judge_model, "gpt-4.1");
        assert_eq!(config.ocr_models.len(), 3);
        assert_eq!(config.judge_timeout(), Duration::from_secs(240));
        assert_eq!(config.max_suggestions, 5);
        assert_eq!(config.weight_overrides["FUVEST"]["C3"], 0.30);
        assert!(config.default_level_map.is_none());
        config.validate().unwrap();
    }

    #[test]
    #[serial]
    fn load_reads_partial_yaml() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "judge_timeout_secs: 30\n\
             default_level_map: linear\n\
             length_policy:\n  low_threshold: 10\n\
             weight_overrides:\n  UNICAMP:\n    C1: 0.5\n",
        )
        .unwrap();

        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.judge_timeout_secs, 30);
        assert_eq!(config.default_level_map, Some(LevelValueMap::LINEAR));
        assert_eq!(config.length_policy.low_threshold, 10);
        assert_eq!(config.length_policy.high_threshold, 20);
        assert!(!config.weight_overrides.contains_key("FUVEST"));
        assert_eq!(config.weight_overrides["UNICAMP"]["C1"], 0.5);
    }

    #[test]
    #[serial]
    fn load_rejects_inverted_thresholds() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            "length_policy:\n  low_threshold: 30\n  high_threshold: 20\n",
        )
        .unwrap();

        let err = PipelineConfig::load(file.path()).unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[test]
    #[serial]
    fn load_missing_file_is_config_error() {
        let err = PipelineConfig::load("/no/such/rubrica.yaml").unwrap_err();
        assert!(err.to_string().contains("failed to read"));
    }

    #[test]
    #[serial]
    fn test_from_env_unset_keeps_defaults() {
        clear_env();
        std::env::set_var("RUBRICA_JUDGE_MODEL", "   ");

        let config = PipelineConfig::from_env();
        clear_env();

        assert_eq!(config.unwrap(), PipelineConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("RUBRICA_JUDGE_MODEL", " gpt-judge ");
        std::env::set_var("RUBRICA_OCR_MODELS", "vision-a, ,vision-b");
        std::env::set_var("RUBRICA_JUDGE_TIMEOUT_SECS", "90");
        std::env::set_var("RUBRICA_PIPELINE_VERSION", "rubrica-pipeline-v2");
        std::env::set_var("RUBRICA_CACHE_DIR", "/tmp/rubrica-cache");
        std::env::set_var("RUBRICA_CACHE_MAX_ENTRIES", "500");

        let config = PipelineConfig::from_env();
        clear_env();

        let config = config.unwrap();
        assert_eq!(config.judge_model, "gpt-judge");
        assert_eq!(config.ocr_models, vec!["vision-a", "vision-b"]);
        assert_eq!(config.judge_timeout(), Duration::from_secs(90));
        assert_eq!(config.pipeline_version, "rubrica-pipeline-v2");
        assert_eq!(config.cache_dir, Some(PathBuf::from("/tmp/rubrica-cache")));
        assert_eq!(config.cache_max_entries, Some(500));
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_timeout_is_config_error() {
        clear_env();
        std::env::set_var("RUBRICA_JUDGE_TIMEOUT_SECS", "four minutes");

        let result = PipelineConfig::from_env();
        clear_env();

        let err = result.unwrap_err();
        assert!(matches!(err, GradingError::Config { .. }));
        assert!(err.to_string().contains("RUBRICA_JUDGE_TIMEOUT_SECS"));
    }

    #[test]
    #[serial]
    fn test_from_env_zero_timeout_is_rejected() {
        clear_env();
        std::env::set_var("RUBRICA_JUDGE_TIMEOUT_SECS", "0");

        let result = PipelineConfig::from_env();
        clear_env();

        assert_eq!(result.unwrap_err().kind(), "config");
    }

    #[test]
    #[serial]
    fn test_env_overrides_apply_on_top_of_yaml() {
        clear_env();
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "judge_model: from-yaml\njudge_timeout_secs: 30\n").unwrap();
        std::env::set_var("RUBRICA_JUDGE_MODEL", "from-env");

        let config = PipelineConfig::load(file.path());
        clear_env();

        let config = config.unwrap();
        assert_eq!(config.judge_model, "from-env");
        assert_eq!(config.judge_timeout_secs, 30);
    }
}
