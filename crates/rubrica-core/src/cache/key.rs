use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::rubric::{LevelValueMap, RubricDefinition};

/// Everything a finished grade depends on. Field order is part of the key.
#[derive(Debug, Clone, Serialize)]
pub struct CacheKeyInput<'a> {
    pub rubric: &'a RubricDefinition,
    pub proposal_text: &'a str,
    pub has_proposal_image: bool,
    pub essay_text: &'a str,
    /// Non-empty lines of the essay as written; drives the length rule.
    pub essay_line_count: usize,
    pub level_map: &'a LevelValueMap,
    pub model: &'a str,
    pub pipeline_version: &'a str,
}

impl CacheKeyInput<'_> {
    /// Hex SHA-256 of the canonical JSON serialization.
    pub fn key(&self) -> Result<String, serde_json::Error> {
        let canonical = serde_json::to_vec(self)?;
        Ok(hex::encode(Sha256::digest(&canonical)))
    }
}

/// Keys are lowercase hex; anything else never touches the store.
pub(crate) fn is_valid_key(key: &str) -> bool {
    key.len() == 64 && key.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rubric::{Criterion, DisplayScale};
    use std::collections::BTreeMap;

    fn rubric() -> RubricDefinition {
        RubricDefinition {
            name: "ENEM".into(),
            institution: None,
            criteria: vec![Criterion {
                id: "C1".into(),
                name: "Norma".into(),
                weight: 1.0,
                description: String::new(),
                level_descriptions: BTreeMap::from([(5, "Excelente".to_string())]),
            }],
            rules: Vec::new(),
            level_map: LevelValueMap::LINEAR,
            display_scale: DisplayScale::Thousand,
            length_policy: false,
        }
    }

    fn input<'a>(rubric: &'a RubricDefinition, version: &'a str) -> CacheKeyInput<'a> {
        CacheKeyInput {
            rubric,
            proposal_text: "",
            has_proposal_image: false,
            essay_text: "Texto.",
            essay_line_count: 1,
            level_map: &rubric.level_map,
            model: "gpt-4.1",
            pipeline_version: version,
        }
    }

    #[test]
    fn key_is_stable_hex() {
        let rubric = rubric();
        let a = input(&rubric, "v1").key().unwrap();
        let b = input(&rubric, "v1").key().unwrap();
        assert_eq!(a, b);
        assert!(is_valid_key(&a));
    }

    #[test]
    fn key_changes_with_every_component() {
        let rubric = rubric();
        let base = input(&rubric, "v1").key().unwrap();

        assert_ne!(base, input(&rubric, "v2").key().unwrap());

        let mut with_image = input(&rubric, "v1");
        with_image.has_proposal_image = true;
        assert_ne!(base, with_image.key().unwrap());

        let mut longer = input(&rubric, "v1");
        longer.essay_line_count = 21;
        assert_ne!(base, longer.key().unwrap());

        let mut other_model = input(&rubric, "v1");
        other_model.model = "gpt-4o";
        assert_ne!(base, other_model.key().unwrap());

        let mut edited = rubric.clone();
        edited.criteria[0].weight = 0.5;
        assert_ne!(base, input(&edited, "v1").key().unwrap());
    }

    #[test]
    fn rejects_path_like_keys() {
        assert!(!is_valid_key("../etc/passwd"));
        assert!(!is_valid_key(&"A".repeat(64)));
    }
}
