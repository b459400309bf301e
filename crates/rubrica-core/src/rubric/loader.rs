use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info};

use super::catalog::RubricCatalog;
use super::order::natural_cmp;
use super::parse::{parse_rubric_value, ParsedRubric};
use super::{LevelValueMap, RubricDefinition};
use crate::config::PipelineConfig;
use crate::errors::{GradingError, GradingResult};

lazy_static! {
    /// Display qualifiers the UI appends to rubric names.
    static ref NAME_QUALIFIER: Regex =
        Regex::new(r"(?i)\s*\((?:oficial|operacional)\)\s*").unwrap();
}

/// Strip display qualifiers such as `"FUVEST (oficial)"` from a requested name.
pub fn canonical_rubric_name(requested: &str) -> String {
    NAME_QUALIFIER.replace_all(requested, " ").trim().to_string()
}

/// Resolves rubric names against a catalog and normalizes the result.
#[derive(Clone)]
pub struct RubricLoader {
    catalog: Arc<dyn RubricCatalog>,
    default_level_map: Option<LevelValueMap>,
    /// Keyed by lowercase rubric name.
    weight_overrides: BTreeMap<String, BTreeMap<String, f64>>,
    length_group: Regex,
}

impl RubricLoader {
    pub fn new(catalog: Arc<dyn RubricCatalog>, config: &PipelineConfig) -> GradingResult<Self> {
        let length_group =
            Regex::new(&config.length_policy.institution_pattern).map_err(|e| {
                GradingError::Config {
                    message: format!("invalid length_policy.institution_pattern: {}", e),
                }
            })?;
        let weight_overrides = config
            .weight_overrides
            .iter()
            .map(|(name, table)| (name.to_lowercase(), table.clone()))
            .collect();

        Ok(Self {
            catalog,
            default_level_map: config.default_level_map,
            weight_overrides,
            length_group,
        })
    }

    /// Load and normalize the rubric named `name` (case-insensitive).
    pub async fn load_rubric(&self, name: &str) -> GradingResult<RubricDefinition> {
        let wanted = canonical_rubric_name(name);
        if wanted.is_empty() {
            return Err(GradingError::RubricNotFound {
                name: name.to_string(),
            });
        }

        let entry = self
            .catalog
            .lookup(&wanted)
            .await?
            .ok_or_else(|| GradingError::RubricNotFound {
                name: wanted.clone(),
            })?;

        let value = entry
            .body
            .into_value()
            .map_err(|reason| GradingError::malformed_rubric(&entry.name, reason))?;
        let parsed = parse_rubric_value(value)
            .map_err(|reason| GradingError::malformed_rubric(&entry.name, reason))?;

        let rubric = self.normalize(&entry.name, parsed)?;
        info!(
            rubric = %rubric.name,
            criteria = rubric.criteria.len(),
            rules = rubric.rules.len(),
            length_policy = rubric.length_policy,
            "rubric loaded"
        );
        Ok(rubric)
    }

    fn normalize(&self, entry_name: &str, parsed: ParsedRubric) -> GradingResult<RubricDefinition> {
        let ParsedRubric {
            name,
            institution,
            mut criteria,
            rules,
            level_map,
            display_scale,
            length_policy,
        } = parsed;

        let mut seen = HashSet::new();
        if let Some(dup) = criteria.iter().find(|c| !seen.insert(c.id.as_str())) {
            return Err(GradingError::malformed_rubric(
                entry_name,
                format!("duplicate criterion id '{}'", dup.id),
            ));
        }

        let level_map = level_map.or(self.default_level_map).ok_or_else(|| {
            GradingError::malformed_rubric(
                entry_name,
                "no level_map declared and no default configured",
            )
        })?;

        if let Some(table) = self.weight_overrides.get(&entry_name.to_lowercase()) {
            for criterion in criteria.iter_mut() {
                if let Some(w) = table.get(&criterion.id) {
                    debug!(rubric = entry_name, id = %criterion.id, weight = w, "weight override");
                    criterion.weight = w.max(0.0);
                }
            }
        }

        let sum: f64 = criteria.iter().map(|c| c.weight).sum();
        if sum > 0.0 {
            for criterion in criteria.iter_mut() {
                criterion.weight /= sum;
            }
        } else {
            debug!(rubric = entry_name, "all weights are zero; skipping rescale");
        }

        criteria.sort_by(|a, b| natural_cmp(&a.id, &b.id));

        let name = name.unwrap_or_else(|| entry_name.to_string());
        let length_policy = length_policy.unwrap_or_else(|| {
            self.length_group.is_match(entry_name)
                || self.length_group.is_match(&name)
                || institution
                    .as_deref()
                    .is_some_and(|i| self.length_group.is_match(i))
        });

        Ok(RubricDefinition {
            name,
            institution,
            criteria,
            rules,
            level_map,
            display_scale: display_scale.unwrap_or_default(),
            length_policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rubric::{DisplayScale, MemoryCatalog};
    use serde_json::json;

    fn loader(catalog: MemoryCatalog) -> RubricLoader {
        let config = PipelineConfig {
            default_level_map: Some(LevelValueMap::GRADED),
            ..PipelineConfig::default()
        };
        RubricLoader::new(Arc::new(catalog), &config).unwrap()
    }

    #[tokio::test]
    async fn weights_are_rescaled_and_sorted_naturally() {
        let catalog = MemoryCatalog::new().with_rubric(
            "CSA_EM_GERAL",
            json!({"criteria": [
                {"id": "C10", "weight": 10},
                {"id": "C2", "weight": 30},
                {"id": "C1", "weight": 20}
            ]}),
        );
        let rubric = loader(catalog).load_rubric("csa_em_geral").await.unwrap();

        let ids: Vec<&str> = rubric.criteria.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["C1", "C2", "C10"]);
        assert!((rubric.total_weight() - 1.0).abs() < 1e-9);
        assert!((rubric.criterion("C2").unwrap().weight - 0.5).abs() < 1e-9);
        assert_eq!(rubric.name, "CSA_EM_GERAL");
        assert_eq!(rubric.display_scale, DisplayScale::Hundred);
    }

    #[tokio::test]
    async fn zero_weights_are_left_alone() {
        let catalog = MemoryCatalog::new()
            .with_rubric("X", json!({"criteria": [{"id": "C1"}, {"id": "C2"}]}));
        let rubric = loader(catalog).load_rubric("X").await.unwrap();
        assert_eq!(rubric.total_weight(), 0.0);
    }

    #[tokio::test]
    async fn institution_override_replaces_listed_weights() {
        let catalog = MemoryCatalog::new().with_rubric(
            "FUVEST",
            json!({"criteria": [
                {"id": "C1", "weight": 25}, {"id": "C2", "weight": 25},
                {"id": "C3", "weight": 25}, {"id": "C4", "weight": 25}
            ]}),
        );
        let rubric = loader(catalog)
            .load_rubric("FUVEST (oficial)")
            .await
            .unwrap();
        let weights: Vec<f64> = rubric.criteria.iter().map(|c| c.weight).collect();
        for (got, want) in weights.iter().zip([0.3, 0.2, 0.3, 0.2]) {
            assert!((got - want).abs() < 1e-9, "{} != {}", got, want);
        }
    }

    #[tokio::test]
    async fn missing_rubric_is_not_found() {
        let err = loader(MemoryCatalog::new())
            .load_rubric("ENEM")
            .await
            .unwrap_err();
        assert!(matches!(err, GradingError::RubricNotFound { ref name } if name == "ENEM"));
    }

    #[tokio::test]
    async fn unusable_definitions_are_malformed() {
        let catalog = MemoryCatalog::new()
            .with_rubric("EMPTY", json!({"name": "EMPTY"}))
            .with_rubric("DUP", json!([{"id": "C1"}, {"id": "C1"}]));
        let loader = loader(catalog);

        let err = loader.load_rubric("EMPTY").await.unwrap_err();
        assert_eq!(err.kind(), "rubric_malformed");
        let err = loader.load_rubric("DUP").await.unwrap_err();
        assert!(err.to_string().contains("duplicate criterion id"));
    }

    #[tokio::test]
    async fn level_map_is_required_metadata() {
        let catalog = MemoryCatalog::new()
            .with_rubric("BANCA", json!({"criteria": [{"id": "C1", "weight": 1}]}))
            .with_rubric(
                "ENEM",
                json!({"level_map": "linear", "display_scale": 1000,
                       "criteria": [{"id": "C1", "weight": 1}]}),
            );
        let loader = RubricLoader::new(Arc::new(catalog), &PipelineConfig::default()).unwrap();

        let err = loader.load_rubric("BANCA").await.unwrap_err();
        assert_eq!(err.kind(), "rubric_malformed");

        let rubric = loader.load_rubric("ENEM").await.unwrap();
        assert_eq!(rubric.level_map, LevelValueMap::LINEAR);
        assert_eq!(rubric.display_scale, DisplayScale::Thousand);
    }

    #[tokio::test]
    async fn length_policy_follows_institution_group() {
        let catalog = MemoryCatalog::new()
            .with_rubric("VUNESP", json!({"C1": 1}))
            .with_rubric("SANTA_CASA", json!({"C1": 1}))
            .with_rubric("INSPER", json!({"C1": 1}))
            .with_rubric("EINSTEIN", json!({"length_policy": false, "C1": 1}));
        let loader = loader(catalog);

        assert!(loader.load_rubric("vunesp").await.unwrap().length_policy);
        assert!(loader.load_rubric("SANTA_CASA").await.unwrap().length_policy);
        assert!(!loader.load_rubric("INSPER").await.unwrap().length_policy);
        assert!(!loader.load_rubric("EINSTEIN").await.unwrap().length_policy);
    }

    #[test]
    fn strips_display_qualifiers() {
        assert_eq!(canonical_rubric_name(" FUVEST (Oficial) "), "FUVEST");
        assert_eq!(canonical_rubric_name("ENEM (operacional)"), "ENEM");
    }
}
