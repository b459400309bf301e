//! External-repertoire detection as an explicit signal table.
//!
//! Repertoire counts as present when at least one strong signal matches, or
//! when enough distinct weak signals match.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStrength {
    Strong,
    Weak,
}

#[derive(Debug, Clone)]
pub struct SignalPattern {
    pub label: String,
    pub strength: SignalStrength,
    pattern: Regex,
}

impl SignalPattern {
    pub fn new(
        label: impl Into<String>,
        strength: SignalStrength,
        pattern: &str,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            label: label.into(),
            strength,
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

const BUILTIN_SIGNALS: &[(&str, SignalStrength, &str)] = &[
    ("ano/data", SignalStrength::Strong, r"\b(?:1[5-9]\d{2}|20\d{2}|21\d{2})\b"),
    ("%", SignalStrength::Strong, r"\b\d{1,3}(?:[.,]\d+)?\s?%|(?i)\bpor\s+cento\b"),
    ("lei n°", SignalStrength::Strong, r"(?i)\blei\s+n[º°o]?\.?\s?\d+"),
    (
        "lei/código",
        SignalStrength::Strong,
        r"(?i)\bconstitui[çc][ãa]o\b|\bc[óo]digo\b|\bestatuto\b",
    ),
    (
        "instituição",
        SignalStrength::Strong,
        r"(?i)\b(?:IBGE|ONU|OMS|UNESCO|IPEA|UNICEF|OCDE)\b",
    ),
    (
        "marcador de citação",
        SignalStrength::Strong,
        r"(?i)\bsegundo\b|\bde acordo com\b|\bconforme\b",
    ),
    (
        "estudo/pesquisa",
        SignalStrength::Strong,
        r"(?i)\bestudos?\b|\bpesquisas?\b|\brelat[óo]rios?\b|\bestat[íi]sticas?\b",
    ),
    (
        "autor clássico",
        SignalStrength::Strong,
        r"(?i)\b(?:Aristóteles|Platão|Durkheim|Weber|Foucault|Bauman|Habermas|Freud|Skinner|Piaget|Vygotsky|Bourdieu)\b",
    ),
    (
        "obra/autor",
        SignalStrength::Strong,
        r"(?i)\b(?:Orwell|Huxley|Kafka|Camus|Saramago|Machado de Assis|Drummond|Clarice Lispector)\b",
    ),
    ("número", SignalStrength::Weak, r"\b\d{2,}\b"),
    ("aspas/citação", SignalStrength::Weak, r#""[^"]{6,}""#),
    ("ano (fraco)", SignalStrength::Weak, r"(?i)\bem\s+(?:19|20)\d{2}\b"),
];

lazy_static! {
    pub static ref DEFAULT_SIGNALS: Vec<SignalPattern> = BUILTIN_SIGNALS
        .iter()
        .map(|(label, strength, pattern)| SignalPattern::new(*label, *strength, pattern).unwrap())
        .collect();
}

/// Outcome of one scan, carried on the result for the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepertoireReport {
    pub detected: bool,
    /// Labels of the strong signals that matched.
    pub signals: Vec<String>,
    /// Number of distinct weak patterns that matched.
    pub weak_signals: usize,
    pub summary: String,
}

/// Scan essay and proposal text against `patterns`.
pub fn detect_repertoire(
    patterns: &[SignalPattern],
    min_weak_signals: usize,
    essay: &str,
    proposal: Option<&str>,
) -> RepertoireReport {
    let text = format!("{}\n{}", essay, proposal.unwrap_or_default());

    let mut signals = Vec::new();
    let mut weak_signals = 0;
    for p in patterns.iter().filter(|p| p.is_match(&text)) {
        match p.strength {
            SignalStrength::Strong => {
                if !signals.contains(&p.label) {
                    signals.push(p.label.clone());
                }
            }
            SignalStrength::Weak => weak_signals += 1,
        }
    }

    let weak_enough = min_weak_signals > 0 && weak_signals >= min_weak_signals;
    let detected = !signals.is_empty() || weak_enough;
    let summary = if detected {
        let mut found = signals.clone();
        if weak_enough {
            found.push("indícios fracos".to_string());
        }
        format!("Sinais de repertório detectados: {}.", found.join(", "))
    } else {
        "Faltou repertório verificável (autores, dados, leis, obras, estudos, casos); \
         por isso alguns critérios podem ser limitados."
            .to_string()
    };

    RepertoireReport {
        detected,
        signals,
        weak_signals,
        summary,
    }
}
