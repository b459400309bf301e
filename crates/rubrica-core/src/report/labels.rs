use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Rule id pattern → label shown to the student. First match wins.
    static ref RULE_LABELS: Vec<(Regex, &'static str)> = vec![
        (Regex::new(r"(?i)no_common_sense").unwrap(), "Repertório insuficiente / senso comum"),
        (Regex::new(r"(?i)repert").unwrap(), "Repertório obrigatório"),
        (Regex::new(r"(?i)^length_policy").unwrap(), "Extensão mínima do texto"),
        (Regex::new(r"(?i)^theme_cap").unwrap(), "Limite por aderência ao tema"),
    ];
}

/// Human-readable label for a triggered rule id; unknown ids are shown as-is.
pub fn rule_label(id: &str) -> &str {
    RULE_LABELS
        .iter()
        .find(|(re, _)| re.is_match(id))
        .map(|(_, label)| *label)
        .unwrap_or(id)
}
