use super::GradingRequestContext;
use crate::providers::llm::{normalize_chat_request, ChatMessage, ChatRequest, ContentPart};
use crate::rubric::{RubricDefinition, MAX_LEVEL};

const JUDGE_SYSTEM: &str = "You are an essay grader who follows the rubric to the letter. \
Assign each criterion an integer level from 0 to 5 based only on the level descriptions \
and hard rules. Use 5 only when the performance fully meets the description, and apply \
caps whenever a rule requires it. Write justifications and suggestions in the language \
of the essay, addressed kindly to the student, without internal commands in capital \
letters. Return valid JSON only, with criteria ordered by id.";

const OUTPUT_SHAPE: &str = r#"Output format (JSON object, nothing else):
{
  "criteria": [ {"id": "C1", "name": "...", "level": 3, "justification": "..."}, ... ],
  "suggestions": ["...", "..."],
  "triggered_rules": [ {"id": "rule_id", "criterion_ids": ["C2"], "reason": "..."} ],
  "addressing_of_theme": "full | partial | off-topic"
}
Notes:
- "criteria" must contain EVERY rubric criterion, ordered by id (C1, C2, ...).
- "level" is an integer 0..5. If a rule demands a cap or a floor, respect it.
- "addressing_of_theme" states how well the essay addresses the proposed theme."#;

/// Render a rubric as the strict plain text embedded in the judgment request.
///
/// ```text
/// Rubric: FUVEST
/// Criteria (id | name | weight% | levels 0..5):
/// - C1 | Tema | 30%
///   level 5: ...
/// Hard rules (apply whenever the condition holds):
/// - [no_common_sense] type=cap target=C2 max_level=2
///   When: ...
/// ```
pub fn rubric_strict_text(rubric: &RubricDefinition) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Rubric: {}", rubric.name));
    lines.push("Criteria (id | name | weight% | levels 0..5):".to_string());
    for c in &rubric.criteria {
        lines.push(format!("- {} | {} | {:.0}%", c.id, c.name, c.weight * 100.0));
        if !c.description.trim().is_empty() {
            lines.push(format!("  description: {}", c.description.trim()));
        }
        for level in 0..=MAX_LEVEL {
            if let Some(text) = c.level_descriptions.get(&level) {
                lines.push(format!("  level {}: {}", level, text.trim()));
            }
        }
    }

    if !rubric.rules.is_empty() {
        lines.push("Hard rules (apply whenever the condition holds):".to_string());
        for rule in &rubric.rules {
            let mut line = format!(
                "- [{}] type={} target={}",
                rule.id,
                rule.rule_type,
                rule.target_criterion_ids.join(",")
            );
            if let Some(max) = rule.max_level {
                line.push_str(&format!(" max_level={}", max));
            }
            if let Some(min) = rule.min_level {
                line.push_str(&format!(" min_level={}", min));
            }
            lines.push(line);
            if let Some(condition) = &rule.condition {
                lines.push(format!("  When: {}", condition));
            }
        }
    }
    lines.join("\n")
}

pub(crate) fn build_request(
    model: &str,
    context: &GradingRequestContext,
) -> anyhow::Result<ChatRequest> {
    let rubric = context.rubric();
    let instructions = format!(
        "{}\n\nLevel map (level 0..5 → value 0..1): {}.\n{}",
        rubric_strict_text(rubric),
        rubric.level_map.describe(),
        OUTPUT_SHAPE
    );

    let mut messages = vec![
        ChatMessage::system(JUDGE_SYSTEM),
        ChatMessage::user(vec![ContentPart::text(instructions)]),
    ];

    if let Some(proposal) = context.proposal_text() {
        messages.push(ChatMessage::user(vec![ContentPart::text(format!(
            "Proposal text (if relevant):\n\"\"\"{}\"\"\"",
            proposal
        ))]));
    }
    if let Some(image) = context.proposal_image() {
        messages.push(ChatMessage::user(vec![
            ContentPart::text("Proposal image (consider the statement and visual elements):"),
            ContentPart::image_url(image.data_url()),
        ]));
    }
    messages.push(ChatMessage::user(vec![ContentPart::text(format!(
        "Student essay (final):\n\"\"\"{}\"\"\"",
        context.essay_text()
    ))]));

    normalize_chat_request(ChatRequest::new(model, messages).with_json_response())
}
