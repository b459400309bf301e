//! Student-facing tone softener.
//!
//! Judgment models sometimes leak internal policy phrasing ("MUST NOT EXCEED
//! LEVEL 2", "SEM REPERTÓRIO ... NÍVEL 2") into justifications. The rules
//! below rewrite those fragments into calm prose. This is a pure text
//! transform; it never changes a level.

use lazy_static::lazy_static;
use regex::{Captures, Regex};

/// One rewrite in the softener table.
pub struct SoftenerRule {
    pub name: &'static str,
    pattern: Regex,
    rewrite: fn(&Captures<'_>) -> String,
}

impl SoftenerRule {
    fn new(name: &'static str, pattern: &str, rewrite: fn(&Captures<'_>) -> String) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).unwrap(),
            rewrite,
        }
    }

    /// Apply this rule alone.
    pub fn apply(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, |caps: &Captures<'_>| (self.rewrite)(caps))
            .into_owned()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

fn group(caps: &Captures<'_>, i: usize) -> String {
    caps.get(i).map(|m| m.as_str().to_string()).unwrap_or_default()
}

lazy_static! {
    /// Ordered rewrite table; earlier rules see the raw model text.
    pub static ref SOFTENER_RULES: Vec<SoftenerRule> = vec![
        SoftenerRule::new(
            "pt_no_repertoire_cap",
            r"(?i)\bsem\s+repert[óo]rio[^.,;]*?n[íi]vel\s*(\d)",
            |c| format!(
                "Sem repertório verificável; por isso, este critério foi limitado ao nível {}.",
                group(c, 1)
            ),
        ),
        SoftenerRule::new(
            "en_no_repertoire_cap",
            r"(?i)\bno\s+(?:external\s+)?repertoire[^.,;]*?level\s*(\d)",
            |c| format!(
                "No verifiable repertoire was found, so this criterion was limited to level {}.",
                group(c, 1)
            ),
        ),
        SoftenerRule::new(
            "pt_must_not_exceed",
            r"(?i)n[ãa]o\s+pode\s+ultrapassar\s+o\s+n[íi]vel\s*(\d)",
            |c| format!("foi avaliado até o nível {}.", group(c, 1)),
        ),
        SoftenerRule::new(
            "en_must_not_exceed",
            r"(?i)must\s+not\s+exceed\s+level\s*(\d)",
            |c| format!("was assessed up to level {}.", group(c, 1)),
        ),
        SoftenerRule::new(
            "pt_required_repertoire_tag",
            r"(?i)repert[óo]rio[_ ]?obrigat[óo]rio",
            |_| "repertório obrigatório".to_string(),
        ),
        SoftenerRule::new(
            "en_required_repertoire_tag",
            r"(?i)\brepertoire[_ ]required\b",
            |_| "required repertoire".to_string(),
        ),
        // Acronyms shorter than six letters (ENEM, ONU, IBGE) stay untouched.
        SoftenerRule::new(
            "shouted_word",
            r"\b[A-ZÁÀÂÃÉÊÍÓÔÕÚÇ]{6,}\b",
            |c| {
                let word = &c[0];
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => {
                        let rest: String = chars.collect();
                        format!("{}{}", first, rest.to_lowercase())
                    }
                    None => String::new(),
                }
            },
        ),
    ];
}

/// Rewrite shouted / administrative phrasing into calm prose.
pub fn soften_student_facing(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    SOFTENER_RULES
        .iter()
        .fold(text.to_string(), |acc, rule| rule.apply(&acc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str) -> &'static SoftenerRule {
        SOFTENER_RULES
            .iter()
            .find(|r| r.name == name)
            .expect("rule exists")
    }

    #[test]
    fn rewrites_must_not_exceed() {
        assert_eq!(
            soften_student_facing("C2 MUST NOT EXCEED LEVEL 2"),
            "C2 was assessed up to level 2."
        );
        assert_eq!(
            soften_student_facing("O critério NÃO PODE ULTRAPASSAR O NÍVEL 3"),
            "O critério foi avaliado até o nível 3."
        );
    }

    #[test]
    fn rewrites_missing_repertoire_cap() {
        let out = soften_student_facing("SEM REPERTÓRIO NÃO ATRIBUIR ACIMA DO NÍVEL 2");
        assert_eq!(
            out,
            "Sem repertório verificável; por isso, este critério foi limitado ao nível 2."
        );
        assert!(rule("pt_no_repertoire_cap").is_match("sem repertorio nivel 1"));
    }

    #[test]
    fn lowers_shouted_words_but_keeps_acronyms() {
        let out = soften_student_facing("Dados do IBGE e da ONU: ARGUMENTAÇÃO FRACA no ENEM");
        assert_eq!(out, "Dados do IBGE e da ONU: Argumentação FRACA no ENEM");
    }

    #[test]
    fn required_repertoire_tag() {
        assert_eq!(
            rule("pt_required_repertoire_tag").apply("regra REPERTORIO_OBRIGATORIO"),
            "regra repertório obrigatório"
        );
    }

    #[test]
    fn plain_text_is_unchanged() {
        let text = "Boa introdução, mas a conclusão pode ser mais específica.";
        assert_eq!(soften_student_facing(text), text);
        assert_eq!(soften_student_facing(""), "");
    }
}
