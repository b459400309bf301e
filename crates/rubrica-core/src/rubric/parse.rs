//! Tagged-variant parser for authored rubric documents.
//!
//! Accepted shapes:
//!
//! ```text
//! [ {id, name, weight, ...}, ... ]                      bare criteria array
//! { name, criteria|items: [ ... ], rules: [ ... ] }     document with array
//! { name, criteria: { "C1": 0.25, "C2": {...} } }       document with keyed criteria
//! { name, "Tema": 25, "Coesão": {weight: 25}, ... }     keyed mapping at top level
//! ```

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use super::{Criterion, DisplayScale, HardRule, LevelValueMap, MAX_LEVEL};

/// Rubric fields before weight normalization and ordering.
#[derive(Debug)]
pub(crate) struct ParsedRubric {
    pub name: Option<String>,
    pub institution: Option<String>,
    pub criteria: Vec<Criterion>,
    pub rules: Vec<HardRule>,
    pub level_map: Option<LevelValueMap>,
    pub display_scale: Option<DisplayScale>,
    pub length_policy: Option<bool>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRubric {
    Bare(Vec<RawCriterion>),
    Document(RawDocument),
}

#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    institution: Option<String>,
    #[serde(default, alias = "items")]
    criteria: Option<RawCriteria>,
    #[serde(default)]
    rules: Vec<RawRule>,
    #[serde(default)]
    level_map: Option<LevelValueMap>,
    #[serde(default)]
    display_scale: Option<DisplayScale>,
    #[serde(default)]
    length_policy: Option<bool>,
    /// Everything else: candidate keyed-mapping criteria.
    #[serde(flatten)]
    keyed: BTreeMap<String, RawKeyedEntry>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawCriteria {
    List(Vec<RawCriterion>),
    Keyed(BTreeMap<String, RawKeyedEntry>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawKeyedEntry {
    Weight(RawNumber),
    // A map, not `RawCriterion` directly: derived structs also accept sequences.
    Detail(serde_json::Map<String, Value>),
    Other(serde::de::IgnoredAny),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Number(f64),
    Text(String),
}

impl RawNumber {
    fn as_f64(&self) -> Option<f64> {
        let n = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().trim_end_matches('%').trim().parse().ok()?,
        };
        n.is_finite().then_some(n)
    }
}

#[derive(Deserialize, Default)]
struct RawCriterion {
    #[serde(default, alias = "code", alias = "key")]
    id: Option<Value>,
    #[serde(default, alias = "title", alias = "label")]
    name: Option<String>,
    #[serde(default, alias = "peso", alias = "weight_pct")]
    weight: Option<RawNumber>,
    #[serde(default, alias = "desc")]
    description: Option<String>,
    #[serde(default, alias = "level_descriptions")]
    levels: Option<RawLevels>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawLevels {
    Keyed(BTreeMap<String, String>),
    List(Vec<String>),
}

#[derive(Deserialize)]
struct RawRule {
    #[serde(default)]
    id: Option<String>,
    #[serde(default, rename = "type", alias = "kind")]
    rule_type: Option<String>,
    #[serde(
        default,
        rename = "criterion_ids",
        alias = "target_criterion_ids",
        alias = "targets"
    )]
    criterion_ids: Vec<String>,
    #[serde(default)]
    max_level: Option<f64>,
    #[serde(default)]
    min_level: Option<f64>,
    #[serde(default, alias = "when")]
    condition: Option<String>,
}

/// Parse an authored rubric value. Weights are coerced (percentages → fractions)
/// but not yet rescaled.
pub(crate) fn parse_rubric_value(value: Value) -> Result<ParsedRubric, String> {
    let raw: RawRubric =
        serde_json::from_value(value).map_err(|e| format!("unrecognized rubric shape: {}", e))?;

    let parsed = match raw {
        RawRubric::Bare(items) => ParsedRubric {
            name: None,
            institution: None,
            criteria: list_criteria(items),
            rules: Vec::new(),
            level_map: None,
            display_scale: None,
            length_policy: None,
        },
        RawRubric::Document(doc) => {
            let criteria = match doc.criteria {
                Some(RawCriteria::List(items)) => list_criteria(items),
                Some(RawCriteria::Keyed(entries)) => keyed_criteria(entries),
                None => keyed_criteria(doc.keyed),
            };
            ParsedRubric {
                name: doc.name.filter(|n| !n.trim().is_empty()),
                institution: doc.institution.filter(|n| !n.trim().is_empty()),
                criteria,
                rules: parse_rules(doc.rules),
                level_map: doc.level_map,
                display_scale: doc.display_scale,
                length_policy: doc.length_policy,
            }
        }
    };

    if parsed.criteria.is_empty() {
        return Err("rubric defines no criteria".to_string());
    }
    Ok(parsed)
}

fn list_criteria(items: Vec<RawCriterion>) -> Vec<Criterion> {
    items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| build_criterion(item, None, idx))
        .collect()
}

fn keyed_criteria(entries: BTreeMap<String, RawKeyedEntry>) -> Vec<Criterion> {
    let mut out = Vec::new();
    for (key, entry) in entries {
        let idx = out.len();
        match entry {
            RawKeyedEntry::Detail(fields) => {
                match serde_json::from_value::<RawCriterion>(Value::Object(fields)) {
                    Ok(item) => out.push(build_criterion(item, Some(&key), idx)),
                    Err(e) => tracing::debug!(key = %key, error = %e, "skipping rubric entry"),
                }
            }
            RawKeyedEntry::Weight(w) => match w.as_f64() {
                Some(weight) => out.push(Criterion {
                    id: key.clone(),
                    name: key,
                    weight: coerce_weight(weight),
                    description: String::new(),
                    level_descriptions: BTreeMap::new(),
                }),
                None => tracing::debug!(key = %key, "skipping non-numeric rubric entry"),
            },
            RawKeyedEntry::Other(_) => tracing::debug!(key = %key, "skipping rubric entry"),
        }
    }
    out
}

fn build_criterion(item: RawCriterion, key: Option<&str>, idx: usize) -> Criterion {
    let id = item
        .id
        .as_ref()
        .and_then(scalar_to_string)
        .or_else(|| key.map(str::to_string))
        .unwrap_or_else(|| format!("C{}", idx + 1));
    let name = item
        .name
        .filter(|n| !n.trim().is_empty())
        .or_else(|| key.map(str::to_string))
        .unwrap_or_else(|| id.clone());
    let weight = item
        .weight
        .as_ref()
        .and_then(RawNumber::as_f64)
        .map(coerce_weight)
        .unwrap_or(0.0);

    Criterion {
        id,
        name,
        weight,
        description: item.description.unwrap_or_default(),
        level_descriptions: item.levels.map(level_descriptions).unwrap_or_default(),
    }
}

/// Percentages (`25`) become fractions (`0.25`); negatives clamp to 0.
fn coerce_weight(w: f64) -> f64 {
    let w = if w > 1.0 { w / 100.0 } else { w };
    w.max(0.0)
}

fn level_descriptions(levels: RawLevels) -> BTreeMap<u8, String> {
    let pairs: Vec<(u8, String)> = match levels {
        RawLevels::Keyed(map) => map
            .into_iter()
            .filter_map(|(k, v)| k.trim().parse::<u8>().ok().map(|lv| (lv, v)))
            .collect(),
        RawLevels::List(list) => list
            .into_iter()
            .enumerate()
            .filter_map(|(i, v)| u8::try_from(i).ok().map(|lv| (lv, v)))
            .collect(),
    };
    pairs
        .into_iter()
        .filter(|(lv, text)| *lv <= MAX_LEVEL && !text.trim().is_empty())
        .collect()
}

fn parse_rules(rules: Vec<RawRule>) -> Vec<HardRule> {
    rules
        .into_iter()
        .enumerate()
        .map(|(idx, r)| HardRule {
            id: r
                .id
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| format!("R{}", idx + 1)),
            rule_type: r.rule_type.unwrap_or_else(|| "cap".to_string()),
            target_criterion_ids: r.criterion_ids,
            max_level: r.max_level.map(clamp_level),
            min_level: r.min_level.map(clamp_level),
            condition: r.condition.filter(|s| !s.trim().is_empty()),
        })
        .collect()
}

fn clamp_level(v: f64) -> u8 {
    v.round().clamp(0.0, f64::from(MAX_LEVEL)) as u8
}

fn scalar_to_string(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_document_with_criteria_array() {
        let parsed = parse_rubric_value(json!({
            "name": "FUVEST",
            "level_map": "graded",
            "criteria": [
                {"id": "C1", "name": "Tema", "weight": 30, "levels": {"5": "Pleno", "0": "Fuga"}},
                {"code": "C2", "title": "Argumentação", "peso": "20"},
                {"name": "Coesão", "weight": 0.5}
            ],
            "rules": [
                {"id": "no_common_sense", "type": "cap", "criterion_ids": ["C2"], "max_level": 2,
                 "when": "argumentos de senso comum"}
            ]
        }))
        .unwrap();

        assert_eq!(parsed.name.as_deref(), Some("FUVEST"));
        assert_eq!(parsed.level_map, Some(LevelValueMap::GRADED));
        assert_eq!(parsed.criteria.len(), 3);
        assert_eq!(parsed.criteria[0].weight, 0.3);
        assert_eq!(parsed.criteria[0].level_descriptions.get(&5).unwrap(), "Pleno");
        assert_eq!(parsed.criteria[1].id, "C2");
        assert_eq!(parsed.criteria[1].name, "Argumentação");
        assert_eq!(parsed.criteria[1].weight, 0.2);
        assert_eq!(parsed.criteria[2].id, "C3");
        assert_eq!(parsed.rules[0].target_criterion_ids, vec!["C2"]);
        assert_eq!(parsed.rules[0].max_level, Some(2));
        assert_eq!(
            parsed.rules[0].condition.as_deref(),
            Some("argumentos de senso comum")
        );
    }

    #[test]
    fn parses_top_level_keyed_mapping() {
        let parsed = parse_rubric_value(json!({
            "name": "CSA_EM_GERAL",
            "Tema": 25,
            "Coesão": {"weight": 25, "description": "Articulação"},
            "Norma": "50",
            "notes": ["ignored"]
        }))
        .unwrap();

        let ids: Vec<&str> = parsed.criteria.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["Coesão", "Norma", "Tema"]);
        assert_eq!(parsed.criteria[0].description, "Articulação");
        assert_eq!(parsed.criteria[1].weight, 0.5);
    }

    #[test]
    fn parses_bare_array_and_nested_keyed_criteria() {
        let parsed = parse_rubric_value(json!([{"weight": 1}, {"weight": 1}])).unwrap();
        assert_eq!(parsed.criteria[1].id, "C2");
        assert!(parsed.name.is_none());

        let parsed = parse_rubric_value(json!({"criteria": {"C1": 0.4, "C2": {"weight": 0.6}}}))
            .unwrap();
        assert_eq!(parsed.criteria.len(), 2);
        assert_eq!(parsed.criteria[1].weight, 0.6);
    }

    #[test]
    fn skips_keyed_entries_that_are_not_criteria() {
        let parsed = parse_rubric_value(json!({
            "criteria": {
                "C1": 0.5,
                "C2": {"weight": 0.5},
                "draft": true,
                "removed": null,
                "tags": ["a", "b"]
            }
        }))
        .unwrap();

        let ids: Vec<&str> = parsed.criteria.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["C1", "C2"]);
    }

    #[test]
    fn rejects_empty_or_unusable_documents() {
        assert!(parse_rubric_value(json!({"name": "vazio"})).is_err());
        assert!(parse_rubric_value(json!([])).is_err());
        assert!(parse_rubric_value(json!("texto")).is_err());
    }
}
