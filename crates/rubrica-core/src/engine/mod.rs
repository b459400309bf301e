//! Deterministic rule engine.
//!
//! The model's levels are advisory. Finalization re-derives every level and
//! the score from the rubric, in a fixed order:
//!
//! 1. clamp judged levels, align them with the rubric's criteria
//! 2. essay-length reduction (rubrics with `length_policy`)
//! 3. repertoire ceiling when no external reference is detected
//! 4. level → value via the rubric's [`LevelValueMap`], `value × weight × 100`
//! 5. thematic cap on the total
//!
//! The same inputs always produce the same [`ScoredResult`].

mod length;
mod repertoire;
mod theme;

pub use length::LengthRule;
pub use repertoire::{
    detect_repertoire, RepertoireReport, SignalPattern, SignalStrength, DEFAULT_SIGNALS,
};
pub use theme::{classify_theme, ThemeAdherence, ThemeCap};

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{CriterionSelector, PipelineConfig, RepertoireConfig};
use crate::errors::{GradingError, GradingResult};
use crate::judge::{ModelJudgment, TriggeredRule};
use crate::rubric::{natural_cmp, DisplayScale, LevelValueMap, RubricDefinition, MAX_LEVEL};
use crate::text::{count_non_empty_lines, soften_student_facing};

/// Synthetic rule id recorded when the repertoire ceiling lowers a level.
pub const REPERTOIRE_RULE_ID: &str = "repertoire_required_auto";
/// Synthetic rule id recorded when the length rule lowers a level.
pub const LENGTH_RULE_ID: &str = "length_policy_auto";
/// Synthetic rule id recorded when the thematic cap lowers the total.
pub const THEME_RULE_ID: &str = "theme_cap_auto";

/// One finalized criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub id: String,
    pub name: String,
    /// Final level after every adjustment.
    pub level: u8,
    /// Level as judged by the model (0 when the model omitted the criterion).
    pub model_level: u8,
    pub value: f64,
    pub weight: f64,
    pub contribution_points: f64,
    pub justification: String,
}

/// Authoritative outcome of finalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredResult {
    pub rubric_name: String,
    /// Ascending by id in natural order.
    pub criteria: Vec<CriterionScore>,
    /// Sum of contributions on 0–100, unrounded, before the thematic cap.
    pub total_before_rounding: f64,
    /// Rounded 0–100 score after the thematic cap.
    pub final_score: u32,
    /// `final_score` on the rubric's display scale.
    pub final_score_display: u32,
    pub scale_label: String,
    pub display_scale: DisplayScale,
    pub level_map: LevelValueMap,
    pub theme_cap: Option<ThemeCap>,
    pub repertoire: RepertoireReport,
    pub triggered_rules: Vec<TriggeredRule>,
    pub suggestions: Vec<String>,
}

impl ScoredResult {
    pub fn criterion(&self, id: &str) -> Option<&CriterionScore> {
        self.criteria.iter().find(|c| c.id == id)
    }
}

#[derive(Debug, Clone)]
struct CompiledSelector {
    ids: Vec<String>,
    name: Option<Regex>,
}

impl CompiledSelector {
    fn compile(selector: &CriterionSelector) -> Result<Self, regex::Error> {
        Ok(Self {
            ids: selector.ids.clone(),
            name: selector.name_pattern.as_deref().map(Regex::new).transpose()?,
        })
    }

    /// First criterion matched by id, else first matched by name.
    fn pick(&self, criteria: &[Working], exclude: Option<usize>) -> Option<usize> {
        let eligible = |i: &usize| Some(*i) != exclude;
        (0..criteria.len())
            .filter(eligible)
            .find(|&i| {
                self.ids
                    .iter()
                    .any(|id| id.eq_ignore_ascii_case(&criteria[i].id))
            })
            .or_else(|| {
                let re = self.name.as_ref()?;
                (0..criteria.len())
                    .filter(eligible)
                    .find(|&i| re.is_match(&criteria[i].name))
            })
    }
}

#[derive(Debug, Clone)]
struct RepertoirePolicy {
    argumentation: CompiledSelector,
    argumentation_max_level: u8,
    theme: CompiledSelector,
    theme_max_level: u8,
    min_weak_signals: usize,
    signals: Vec<SignalPattern>,
}

impl RepertoirePolicy {
    fn from_config(config: &RepertoireConfig) -> Result<Self, regex::Error> {
        let mut signals = DEFAULT_SIGNALS.clone();
        for extra in &config.extra_strong_signals {
            signals.push(SignalPattern::new(
                extra.label.clone(),
                SignalStrength::Strong,
                &extra.pattern,
            )?);
        }
        Ok(Self {
            argumentation: CompiledSelector::compile(&config.argumentation)?,
            argumentation_max_level: config.argumentation_max_level.min(MAX_LEVEL),
            theme: CompiledSelector::compile(&config.theme)?,
            theme_max_level: config.theme_max_level.min(MAX_LEVEL),
            min_weak_signals: config.min_weak_signals,
            signals,
        })
    }
}

/// Finalization with compiled policy tables.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    length: LengthRule,
    repertoire: RepertoirePolicy,
}

lazy_static! {
    static ref DEFAULT_ENGINE: RuleEngine =
        RuleEngine::from_config(&PipelineConfig::default())
            .expect("default length and repertoire patterns compile");
}

impl Default for RuleEngine {
    fn default() -> Self {
        DEFAULT_ENGINE.clone()
    }
}

struct Working {
    id: String,
    name: String,
    weight: f64,
    model_level: u8,
    level: u8,
    justification: String,
}

impl RuleEngine {
    pub fn from_config(config: &PipelineConfig) -> GradingResult<Self> {
        let length = LengthRule::from_config(&config.length_policy).map_err(|e| {
            GradingError::Config {
                message: format!("invalid length_policy.criterion_pattern: {}", e),
            }
        })?;
        let repertoire =
            RepertoirePolicy::from_config(&config.repertoire).map_err(|e| GradingError::Config {
                message: format!("invalid repertoire pattern: {}", e),
            })?;
        Ok(Self { length, repertoire })
    }

    /// Re-derive levels and the score. Pure: no I/O, no clock.
    ///
    /// The length rule counts the non-empty lines of `essay_text`; use
    /// [`finalize_with_line_count`](Self::finalize_with_line_count) when the
    /// count must come from the text as written, before normalization.
    pub fn finalize(
        &self,
        judgment: &ModelJudgment,
        rubric: &RubricDefinition,
        essay_text: &str,
        proposal_text: Option<&str>,
    ) -> ScoredResult {
        self.finalize_with_line_count(
            judgment,
            rubric,
            essay_text,
            count_non_empty_lines(essay_text),
            proposal_text,
        )
    }

    /// Like [`finalize`](Self::finalize), with the essay's non-empty line
    /// count supplied by the caller.
    pub fn finalize_with_line_count(
        &self,
        judgment: &ModelJudgment,
        rubric: &RubricDefinition,
        essay_text: &str,
        essay_line_count: usize,
        proposal_text: Option<&str>,
    ) -> ScoredResult {
        let mut criteria = align(judgment, rubric);
        let mut triggered_rules = judgment.triggered_rules.clone();

        if rubric.length_policy {
            if let Some(rule) = self.apply_length_rule(&mut criteria, essay_line_count) {
                triggered_rules.push(rule);
            }
        }

        let repertoire = detect_repertoire(
            &self.repertoire.signals,
            self.repertoire.min_weak_signals,
            essay_text,
            proposal_text,
        );
        if !repertoire.detected {
            if let Some(rule) = self.apply_repertoire_ceiling(&mut criteria, &repertoire) {
                triggered_rules.push(rule);
            }
        }

        let scored: Vec<CriterionScore> = criteria
            .into_iter()
            .map(|w| {
                let value = rubric.level_map.value(w.level);
                CriterionScore {
                    contribution_points: value * w.weight * 100.0,
                    id: w.id,
                    name: w.name,
                    level: w.level,
                    model_level: w.model_level,
                    value,
                    weight: w.weight,
                    justification: w.justification,
                }
            })
            .collect();
        let total: f64 = scored.iter().map(|c| c.contribution_points).sum();

        let adherence = classify_theme(judgment.theme_adherence.as_deref());
        let theme_cap = adherence.cap().map(|cap| ThemeCap {
            adherence,
            cap,
            applied: total > cap,
        });
        let final_total = match &theme_cap {
            Some(tc) => total.min(tc.cap),
            None => total,
        };
        if let Some(tc) = theme_cap.as_ref().filter(|tc| tc.applied) {
            triggered_rules.push(TriggeredRule {
                id: THEME_RULE_ID.to_string(),
                criterion_ids: Vec::new(),
                reason: format!(
                    "Texto com {}; a nota total foi limitada a {:.0} de 100.",
                    tc.adherence.label(),
                    tc.cap
                ),
            });
        }

        debug!(
            rubric = %rubric.name,
            total,
            final_total,
            repertoire = repertoire.detected,
            "score finalized"
        );

        ScoredResult {
            rubric_name: rubric.name.clone(),
            criteria: scored,
            total_before_rounding: total,
            final_score: DisplayScale::Hundred.display(final_total),
            final_score_display: rubric.display_scale.display(final_total),
            scale_label: rubric.display_scale.label().to_string(),
            display_scale: rubric.display_scale,
            level_map: rubric.level_map,
            theme_cap,
            repertoire,
            triggered_rules,
            suggestions: judgment.suggestions.clone(),
        }
    }

    fn apply_length_rule(&self, criteria: &mut [Working], lines: usize) -> Option<TriggeredRule> {
        let threshold = self.length.threshold_for(lines)?;

        let mut lowered = Vec::new();
        for c in criteria.iter_mut() {
            if !self.length.designates(&c.id, &c.name) {
                continue;
            }
            let level = self.length.adjust(lines, c.level);
            if level < c.level {
                debug!(id = %c.id, from = c.level, to = level, lines, "length reduction");
                c.level = level;
                c.justification = join_reason(
                    &format!(
                        "Texto com {} linhas não vazias (limite de {}); o nível foi reduzido para {}.",
                        lines, threshold, level
                    ),
                    &c.justification,
                );
                lowered.push(c.id.clone());
            }
        }

        (!lowered.is_empty()).then(|| TriggeredRule {
            id: LENGTH_RULE_ID.to_string(),
            criterion_ids: lowered,
            reason: format!(
                "A redação tem {} linhas não vazias, abaixo do mínimo de {}.",
                lines, threshold
            ),
        })
    }

    fn apply_repertoire_ceiling(
        &self,
        criteria: &mut [Working],
        report: &RepertoireReport,
    ) -> Option<TriggeredRule> {
        let policy = &self.repertoire;
        let argumentation = policy.argumentation.pick(criteria, None);
        let theme = policy.theme.pick(criteria, argumentation);

        let mut lowered = Vec::new();
        let targets = [
            (argumentation, policy.argumentation_max_level, "limitado ao"),
            (theme, policy.theme_max_level, "avaliado até o"),
        ];
        for (idx, cap, verb) in targets {
            let Some(c) = idx.map(|i| &mut criteria[i]) else {
                continue;
            };
            if c.level <= cap {
                continue;
            }
            debug!(id = %c.id, from = c.level, to = cap, "repertoire ceiling");
            c.level = cap;
            c.justification = soften_student_facing(&join_reason(
                &format!(
                    "Faltou repertório verificável; por isso, este critério foi {} nível {}.",
                    verb, cap
                ),
                &c.justification,
            ));
            lowered.push(c.id.clone());
        }

        if lowered.is_empty() {
            return None;
        }
        lowered.sort_by(|a, b| natural_cmp(a, b));
        Some(TriggeredRule {
            id: REPERTOIRE_RULE_ID.to_string(),
            criterion_ids: lowered,
            reason: report.summary.clone(),
        })
    }
}

/// Finalize with the default policy tables.
pub fn finalize_score(
    judgment: &ModelJudgment,
    rubric: &RubricDefinition,
    essay_text: &str,
    proposal_text: Option<&str>,
) -> ScoredResult {
    DEFAULT_ENGINE.finalize(judgment, rubric, essay_text, proposal_text)
}

/// Rubric criteria with their judged levels, plus judged extras at weight 0.
fn align(judgment: &ModelJudgment, rubric: &RubricDefinition) -> Vec<Working> {
    let mut out: Vec<Working> = rubric
        .criteria
        .iter()
        .map(|c| match judgment.criterion(&c.id) {
            Some(j) => Working {
                id: c.id.clone(),
                name: if c.name.trim().is_empty() {
                    j.name.clone()
                } else {
                    c.name.clone()
                },
                weight: c.weight,
                model_level: j.level.min(MAX_LEVEL),
                level: j.level.min(MAX_LEVEL),
                justification: j.justification.clone(),
            },
            None => Working {
                id: c.id.clone(),
                name: c.name.clone(),
                weight: c.weight,
                model_level: 0,
                level: 0,
                justification: "Critério não avaliado pelo modelo; considerado no nível 0."
                    .to_string(),
            },
        })
        .collect();

    for j in &judgment.criteria {
        if rubric.criterion(&j.id).is_none() {
            debug!(id = %j.id, rubric = %rubric.name, "judged criterion not in rubric; weight 0");
            out.push(Working {
                id: j.id.clone(),
                name: j.name.clone(),
                weight: 0.0,
                model_level: j.level.min(MAX_LEVEL),
                level: j.level.min(MAX_LEVEL),
                justification: j.justification.clone(),
            });
        }
    }

    out.sort_by(|a, b| natural_cmp(&a.id, &b.id));
    out
}

fn join_reason(reason: &str, justification: &str) -> String {
    if justification.trim().is_empty() {
        reason.to_string()
    } else {
        format!("{} {}", reason, justification.trim())
    }
}
