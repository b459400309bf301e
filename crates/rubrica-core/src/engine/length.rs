//! Essay-length reduction for rubrics flagged with `length_policy`.

use regex::Regex;

use crate::config::LengthPolicyConfig;
use crate::rubric::MAX_LEVEL;

#[derive(Debug, Clone)]
pub struct LengthRule {
    criterion: Regex,
    low_threshold: usize,
    high_threshold: usize,
}

impl LengthRule {
    pub fn from_config(config: &LengthPolicyConfig) -> Result<Self, regex::Error> {
        Ok(Self {
            criterion: Regex::new(&config.criterion_pattern)?,
            low_threshold: config.low_threshold,
            high_threshold: config.high_threshold,
        })
    }

    /// Whether the criterion is subject to the reduction (id or name match).
    pub fn designates(&self, id: &str, name: &str) -> bool {
        self.criterion.is_match(id) || self.criterion.is_match(name)
    }

    /// Level after the reduction. At or below the low threshold every
    /// designated criterion loses one level; otherwise, at or below the high
    /// threshold, a maximum level drops by one.
    pub fn adjust(&self, non_empty_lines: usize, level: u8) -> u8 {
        if non_empty_lines <= self.low_threshold {
            level.saturating_sub(1)
        } else if non_empty_lines <= self.high_threshold && level >= MAX_LEVEL {
            MAX_LEVEL - 1
        } else {
            level
        }
    }

    pub fn threshold_for(&self, non_empty_lines: usize) -> Option<usize> {
        if non_empty_lines <= self.low_threshold {
            Some(self.low_threshold)
        } else if non_empty_lines <= self.high_threshold {
            Some(self.high_threshold)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> LengthRule {
        LengthRule::from_config(&LengthPolicyConfig::default()).unwrap()
    }

    #[test]
    fn short_essays_lose_one_level_once() {
        let rule = rule();
        assert_eq!(rule.adjust(10, 5), 4);
        assert_eq!(rule.adjust(15, 3), 2);
        assert_eq!(rule.adjust(3, 0), 0);
    }

    #[test]
    fn medium_essays_only_lose_the_top_level() {
        let rule = rule();
        assert_eq!(rule.adjust(18, 5), 4);
        assert_eq!(rule.adjust(20, 4), 4);
        assert_eq!(rule.adjust(21, 5), 5);
    }

    #[test]
    fn designated_by_id_or_name_prefix() {
        let rule = rule();
        assert!(rule.designates("C", "Coesão"));
        assert!(rule.designates("X3", "D — Norma culta"));
        assert!(rule.designates("x", "c - coerência"));
        assert!(!rule.designates("C1", "Tema"));
        assert!(!rule.designates("A", "Correção"));
    }
}
