//! HTML report rendering.
//!
//! Output depends only on the inputs: no timestamps, no randomness. Every
//! interpolated string goes through [`escape_html`].

mod labels;

pub use labels::rule_label;

use std::fmt;

use crate::engine::ScoredResult;
use crate::rubric::{DisplayScale, RubricDefinition};
use crate::text::escape_html;

const STYLE: &str = "body{font-family:system-ui,-apple-system,Segoe UI,Roboto,Arial,sans-serif;padding:16px;color:#222}\
table{width:100%;border-collapse:collapse;margin-top:8px}\
th,td{border:1px solid #ddd;padding:8px;vertical-align:top}\
th{background:#f6f6f6;text-align:left}\
.right{text-align:right}\
.muted{color:#666}\
.badge{display:inline-block;padding:2px 6px;border-radius:6px;background:#eef;border:1px solid #dde}\
pre{white-space:pre-wrap;border:1px solid #eee;padding:10px;background:#fafafa}";

/// Renders scored results as a self-contained HTML document.
#[derive(Debug, Clone, Copy)]
pub struct ReportRenderer {
    max_suggestions: usize,
}

impl Default for ReportRenderer {
    fn default() -> Self {
        Self { max_suggestions: 5 }
    }
}

impl ReportRenderer {
    pub fn new(max_suggestions: usize) -> Self {
        Self { max_suggestions }
    }

    pub fn render(
        &self,
        rubric: &RubricDefinition,
        result: &ScoredResult,
        essay_text: &str,
        proposal_text: Option<&str>,
    ) -> String {
        let mut html = String::new();
        // Formatting into a String cannot fail.
        let _ = self.render_to(&mut html, rubric, result, essay_text, proposal_text);
        html
    }

    /// Write the report into any [`fmt::Write`] sink.
    pub fn render_to<W: fmt::Write>(
        &self,
        out: &mut W,
        rubric: &RubricDefinition,
        result: &ScoredResult,
        essay_text: &str,
        proposal_text: Option<&str>,
    ) -> fmt::Result {
        write!(
            out,
            "<!doctype html>\n<html lang=\"pt-br\">\n<head>\n<meta charset=\"utf-8\">\n\
             <title>Relatório - {}</title>\n<style>{}</style>\n</head>\n<body>\n",
            escape_html(&rubric.name),
            STYLE
        )?;

        writeln!(
            out,
            "<h2>Nota ({}): {} <span class=\"badge\">{}</span></h2>",
            escape_html(&result.scale_label),
            result.final_score_display,
            escape_html(&rubric.name)
        )?;
        if let Some(cap) = result.theme_cap.as_ref().filter(|c| c.applied) {
            writeln!(
                out,
                "<p class=\"muted\">Nota limitada a {:.0} de 100 ({}).</p>",
                cap.cap,
                escape_html(cap.adherence.label())
            )?;
        }

        criteria_table(out, result)?;
        explanation(out, result)?;
        triggered_rules(out, result)?;
        self.suggestions(out, result)?;

        if let Some(proposal) = proposal_text.filter(|p| !p.trim().is_empty()) {
            writeln!(
                out,
                "<details><summary><b>Proposta (texto usado na avaliação)</b></summary>\
                 <pre>{}</pre></details>",
                escape_html(proposal)
            )?;
        }
        writeln!(
            out,
            "<details open><summary><b>Texto enviado (redação)</b></summary><pre>{}</pre></details>",
            escape_html(essay_text)
        )?;
        out.write_str("</body>\n</html>\n")
    }

    fn suggestions<W: fmt::Write>(&self, out: &mut W, result: &ScoredResult) -> fmt::Result {
        let shown: Vec<&String> = result
            .suggestions
            .iter()
            .take(self.max_suggestions)
            .collect();
        if shown.is_empty() {
            return Ok(());
        }
        out.write_str("<details open><summary><b>Sugestões de melhoria</b></summary><ul>")?;
        for s in shown {
            write!(out, "<li>{}</li>", escape_html(s))?;
        }
        out.write_str("</ul></details>\n")
    }
}

fn criteria_table<W: fmt::Write>(out: &mut W, result: &ScoredResult) -> fmt::Result {
    out.write_str(
        "<details open><summary><b>Critérios</b></summary>\n<table>\n<thead><tr>\
         <th>ID</th><th>Critério</th><th>Nível</th><th>Valor</th><th>Peso</th>\
         <th class=\"right\">Contrib. (pts)</th><th>Justificativa</th></tr></thead>\n<tbody>\n",
    )?;
    for c in &result.criteria {
        writeln!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{} de 5</td><td>{:.2}</td><td>{:.0}%</td>\
             <td class=\"right\">{:.1}</td><td>{}</td></tr>",
            escape_html(&c.id),
            escape_html(&c.name),
            c.level,
            c.value,
            c.weight * 100.0,
            c.contribution_points,
            escape_html(&c.justification)
        )?;
    }
    writeln!(
        out,
        "<tr><td colspan=\"5\" class=\"right\"><b>Total (antes de arredondar)</b></td>\
         <td class=\"right\"><b>{:.1}</b></td><td></td></tr>\n</tbody>\n</table>\n</details>",
        result.total_before_rounding
    )
}

fn explanation<W: fmt::Write>(out: &mut W, result: &ScoredResult) -> fmt::Result {
    out.write_str("<details open><summary><b>Como a nota é calculada</b></summary><ul>")?;
    write!(
        out,
        "<li><b>Nível</b> (0–5) é convertido em <b>valor</b> pelo mapa: {}.</li>\
         <li><b>Peso</b> é a parcela do total exibida em %.</li>\
         <li><b>Contribuição</b> de cada critério: <code>valor × peso × 100</code>.</li>\
         <li><b>Nota final</b>: soma das contribuições, arredondada.</li>",
        escape_html(&result.level_map.describe())
    )?;
    if result.theme_cap.is_some() {
        out.write_str(
            "<li>Fuga ao tema limita a nota a 20; aderência parcial limita a nota a 60.</li>",
        )?;
    }
    if result.display_scale == DisplayScale::Thousand {
        out.write_str("<li>A nota é exibida na escala 0–1000 (nota de 0–100 × 10).</li>")?;
    }
    out.write_str("</ul></details>\n")
}

fn triggered_rules<W: fmt::Write>(out: &mut W, result: &ScoredResult) -> fmt::Result {
    if result.triggered_rules.is_empty() {
        return Ok(());
    }
    out.write_str("<details open><summary><b>Regras aplicadas</b></summary><ul>")?;
    for rule in &result.triggered_rules {
        write!(
            out,
            "<li><b>{}</b> → [{}]: {}</li>",
            escape_html(rule_label(&rule.id)),
            escape_html(&rule.criterion_ids.join(", ")),
            escape_html(&rule.reason)
        )?;
    }
    out.write_str("</ul></details>\n")
}

/// Render with the default suggestion limit.
pub fn render(
    rubric: &RubricDefinition,
    result: &ScoredResult,
    essay_text: &str,
    proposal_text: Option<&str>,
) -> String {
    ReportRenderer::default().render(rubric, result, essay_text, proposal_text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::finalize_score;
    use crate::judge::{JudgedCriterion, ModelJudgment};
    use crate::rubric::{Criterion, LevelValueMap};
    use std::collections::BTreeMap;

    fn rubric(scale: DisplayScale) -> RubricDefinition {
        RubricDefinition {
            name: "ENEM <2024>".into(),
            institution: None,
            criteria: vec![
                Criterion {
                    id: "C1".into(),
                    name: "Tema & gênero".into(),
                    weight: 0.5,
                    description: String::new(),
                    level_descriptions: BTreeMap::new(),
                },
                Criterion {
                    id: "C2".into(),
                    name: "Argumentação".into(),
                    weight: 0.5,
                    description: String::new(),
                    level_descriptions: BTreeMap::new(),
                },
            ],
            rules: Vec::new(),
            level_map: LevelValueMap::LINEAR,
            display_scale: scale,
            length_policy: false,
        }
    }

    fn judgment(suggestions: usize) -> ModelJudgment {
        ModelJudgment {
            criteria: vec![
                JudgedCriterion {
                    id: "C1".into(),
                    name: "Tema".into(),
                    level: 5,
                    justification: "Usa <b>bem</b> o tema".into(),
                },
                JudgedCriterion {
                    id: "C2".into(),
                    name: "Arg".into(),
                    level: 5,
                    justification: "Ótimo".into(),
                },
            ],
            suggestions: (1..=suggestions).map(|i| format!("Sugestão {}", i)).collect(),
            triggered_rules: Vec::new(),
            theme_adherence: None,
        }
    }

    #[test]
    fn escapes_everything_interpolated() {
        let rubric = rubric(DisplayScale::Hundred);
        let essay = "Sem referências <script>alert('x')</script>";
        let result = finalize_score(&judgment(1), &rubric, essay, None);
        let html = render(&rubric, &result, essay, Some("Proposta \"A\" & B"));

        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;"));
        assert!(html.contains("Usa &lt;b&gt;bem&lt;/b&gt; o tema"));
        assert!(html.contains("Tema &amp; gênero"));
        assert!(html.contains("ENEM &lt;2024&gt;"));
        assert!(html.contains("Proposta &quot;A&quot; &amp; B"));
    }

    #[test]
    fn shows_scale_rules_and_subtotal() {
        let rubric = rubric(DisplayScale::Thousand);
        let essay = "Texto sem nenhuma referência externa.";
        let result = finalize_score(&judgment(0), &rubric, essay, None);
        let html = render(&rubric, &result, essay, None);

        // C1 capped at 3 (0.6), C2 at 2 (0.4): 30 + 20
        assert!(html.contains("Nota (0–1000): 500"));
        assert!(html.contains("<b>50.0</b>"));
        assert!(html.contains("Repertório obrigatório"));
        assert!(html.contains("[C1, C2]"));
        assert!(html.contains("0→0.00, 1→0.20"));
        assert!(html.contains("escala 0–1000"));
        assert!(!html.contains("Sugestões de melhoria"));
        assert!(!html.contains("Proposta (texto"));
    }

    #[test]
    fn suggestions_are_bounded() {
        let rubric = rubric(DisplayScale::Hundred);
        let result = finalize_score(&judgment(8), &rubric, "Segundo o IBGE.", None);

        let html = render(&rubric, &result, "Segundo o IBGE.", None);
        assert!(html.contains("Sugestão 5"));
        assert!(!html.contains("Sugestão 6"));

        let html = ReportRenderer::new(2).render(&rubric, &result, "Segundo o IBGE.", None);
        assert!(html.contains("Sugestão 2"));
        assert!(!html.contains("Sugestão 3"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let rubric = rubric(DisplayScale::Hundred);
        let result = finalize_score(&judgment(3), &rubric, "Segundo o IBGE.", None);
        assert_eq!(
            render(&rubric, &result, "Segundo o IBGE.", None),
            render(&rubric, &result, "Segundo o IBGE.", None)
        );
    }

    struct FullSink {
        written: String,
        limit: usize,
    }

    impl fmt::Write for FullSink {
        fn write_str(&mut self, s: &str) -> fmt::Result {
            if self.written.len().saturating_add(s.len()) > self.limit {
                return Err(fmt::Error);
            }
            self.written.push_str(s);
            Ok(())
        }
    }

    #[test]
    fn render_to_propagates_writer_errors() {
        let rubric = rubric(DisplayScale::Hundred);
        let result = finalize_score(&judgment(3), &rubric, "Segundo o IBGE.", None);

        let mut sink = FullSink {
            written: String::new(),
            limit: 64,
        };
        let res = ReportRenderer::default().render_to(
            &mut sink,
            &rubric,
            &result,
            "Segundo o IBGE.",
            None,
        );
        assert!(res.is_err());
        assert!(sink.written.len() <= 64);

        let mut sink = FullSink {
            written: String::new(),
            limit: usize::MAX,
        };
        ReportRenderer::default()
            .render_to(&mut sink, &rubric, &result, "Segundo o IBGE.", None)
            .unwrap();
        assert_eq!(sink.written, render(&rubric, &result, "Segundo o IBGE.", None));
    }
}
