use std::collections::HashSet;

use serde_json::{Map, Value};
use tracing::debug;

use super::{JudgedCriterion, ModelJudgment, TriggeredRule};
use crate::errors::{GradingError, GradingResult};
use crate::rubric::{natural_cmp, MAX_LEVEL};
use crate::text::soften_student_facing;

/// Parse and shape-normalize the model's answer.
pub(crate) fn parse_judgment(text: &str) -> GradingResult<ModelJudgment> {
    let object = extract_object(text).ok_or_else(|| {
        GradingError::malformed_judgment("response contains no JSON object")
    })?;

    let mut seen = HashSet::new();
    let mut criteria: Vec<JudgedCriterion> = object
        .get("criteria")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(criterion).collect())
        .unwrap_or_default();
    criteria.retain(|c| {
        let fresh = seen.insert(c.id.clone());
        if !fresh {
            debug!(id = %c.id, "dropping duplicate criterion in judgment");
        }
        fresh
    });
    if criteria.is_empty() {
        return Err(GradingError::malformed_judgment(
            "response has no usable 'criteria' entries",
        ));
    }
    criteria.sort_by(|a, b| natural_cmp(&a.id, &b.id));

    let suggestions = object
        .get("suggestions")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(soften_student_facing)
                .collect()
        })
        .unwrap_or_default();

    let triggered_rules = object
        .get("triggered_rules")
        .or_else(|| object.get("triggeredRules"))
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(triggered_rule).collect())
        .unwrap_or_default();

    let theme_adherence = ["addressing_of_theme", "theme_adherence", "addressing"]
        .iter()
        .find_map(|k| object.get(*k))
        .and_then(scalar_string)
        .filter(|s| !s.is_empty());

    Ok(ModelJudgment {
        criteria,
        suggestions,
        triggered_rules,
        theme_adherence,
    })
}

/// The whole text as an object, else the first balanced `{...}` that parses.
fn extract_object(text: &str) -> Option<Map<String, Value>> {
    let text = text.trim();
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        return Some(map);
    }

    for (idx, _) in text.match_indices('{') {
        let next = serde_json::Deserializer::from_str(&text[idx..])
            .into_iter::<Value>()
            .next();
        if let Some(Ok(Value::Object(map))) = next {
            return Some(map);
        }
    }
    None
}

fn criterion(value: &Value) -> Option<JudgedCriterion> {
    let obj = value.as_object()?;
    let id = obj.get("id").and_then(scalar_string).filter(|s| !s.is_empty())?;
    let name = obj.get("name").and_then(scalar_string).unwrap_or_default();
    let level = obj.get("level").map(coerce_level).unwrap_or(0);
    let justification = obj
        .get("justification")
        .or_else(|| obj.get("just"))
        .and_then(scalar_string)
        .unwrap_or_default();

    Some(JudgedCriterion {
        id,
        name,
        level,
        justification: soften_student_facing(&justification),
    })
}

fn triggered_rule(value: &Value) -> Option<TriggeredRule> {
    let obj = value.as_object()?;
    let id = obj.get("id").and_then(scalar_string).filter(|s| !s.is_empty())?;
    let criterion_ids = ["criterion_ids", "criterionIds", "target_criterion_ids"]
        .iter()
        .find_map(|k| obj.get(*k))
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(scalar_string).collect())
        .unwrap_or_default();
    let reason = obj.get("reason").and_then(scalar_string).unwrap_or_default();

    Some(TriggeredRule {
        id,
        criterion_ids,
        reason: soften_student_facing(&reason),
    })
}

/// Numbers and numeric strings, rounded and clamped to 0..=5; anything else is 0.
fn coerce_level(value: &Value) -> u8 {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    };
    match n {
        Some(n) if n.is_finite() => n.round().clamp(0.0, f64::from(MAX_LEVEL)) as u8,
        _ => 0,
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
