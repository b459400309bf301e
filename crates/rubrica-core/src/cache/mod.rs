//! Content-addressed memoization of finished grades.
//!
//! A hit skips the judgment call and everything after it. Entries are never
//! mutated; a change in rubric, model or scoring behaviour changes the key.
//! The cache is not a lock: two concurrent submissions with the same key may
//! both miss.

mod dir;
mod key;

pub use dir::DirCache;
pub use key::CacheKeyInput;
pub(crate) use key::is_valid_key;

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::engine::ScoredResult;

/// Stored value: the scored result plus its rendered report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedGrade {
    pub result: ScoredResult,
    pub report_html: String,
    pub stored_at: DateTime<Utc>,
}

impl CachedGrade {
    pub fn new(result: ScoredResult, report_html: String) -> Self {
        Self {
            result,
            report_html,
            stored_at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait GradeCache: Send + Sync {
    /// `Ok(None)` on a miss, including unreadable entries.
    async fn get(&self, key: &str) -> anyhow::Result<Option<CachedGrade>>;

    /// Store `value` unless `key` is already present.
    async fn put(&self, key: &str, value: CachedGrade) -> anyhow::Result<()>;
}

/// Process-local cache.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, CachedGrade>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl GradeCache for MemoryCache {
    async fn get(&self, key: &str) -> anyhow::Result<Option<CachedGrade>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: CachedGrade) -> anyhow::Result<()> {
        self.entries
            .write()
            .await
            .entry(key.to_string())
            .or_insert(value);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::engine::{finalize_score, ScoredResult};
    use crate::judge::{JudgedCriterion, ModelJudgment};
    use crate::rubric::{Criterion, DisplayScale, LevelValueMap, RubricDefinition};
    use std::collections::BTreeMap;

    pub(crate) fn scored(level: u8) -> ScoredResult {
        let rubric = RubricDefinition {
            name: "FUVEST".into(),
            institution: None,
            criteria: vec![Criterion {
                id: "C1".into(),
                name: "Tema".into(),
                weight: 1.0,
                description: String::new(),
                level_descriptions: BTreeMap::new(),
            }],
            rules: Vec::new(),
            level_map: LevelValueMap::GRADED,
            display_scale: DisplayScale::Hundred,
            length_policy: false,
        };
        let judgment = ModelJudgment {
            criteria: vec![JudgedCriterion {
                id: "C1".into(),
                name: "Tema".into(),
                level,
                justification: "ok".into(),
            }],
            suggestions: Vec::new(),
            triggered_rules: Vec::new(),
            theme_adherence: None,
        };
        finalize_score(&judgment, &rubric, "Segundo o IBGE.", None)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::scored;
    use super::*;

    #[tokio::test]
    async fn memory_round_trip() {
        let cache = MemoryCache::new();
        let value = CachedGrade::new(scored(4), "<html></html>".into());

        assert!(cache.get("k").await.unwrap().is_none());
        cache.put("k", value.clone()).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(value));
    }

    #[tokio::test]
    async fn memory_entries_are_immutable() {
        let cache = MemoryCache::new();
        let first = CachedGrade::new(scored(4), "first".into());
        cache.put("k", first.clone()).await.unwrap();
        cache
            .put("k", CachedGrade::new(scored(1), "second".into()))
            .await
            .unwrap();

        assert_eq!(cache.get("k").await.unwrap(), Some(first));
        assert_eq!(cache.len().await, 1);
    }
}
