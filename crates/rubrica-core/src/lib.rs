//! Rubric-grounded essay scoring.
//!
//! This crate turns an essay plus a named grading rubric into a reproducible,
//! auditable score:
//!
//! - Text normalization of typed or transcribed essays
//! - Rubric loading from a read-only catalog (array or keyed-mapping shapes)
//! - Image transcription through an ordered chain of vision models
//! - A single structured judgment request, raced against a fixed timeout
//! - A deterministic rule engine that owns the final levels and score
//! - Content-addressed memoization of finished results
//! - HTML report rendering
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use rubrica_core::{
//!     DirCatalog, GradingPipeline, MemoryCache, OpenAIClient, PipelineConfig, Submission,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = PipelineConfig::from_env()?;
//! let pipeline = GradingPipeline::new(
//!     config,
//!     Arc::new(DirCatalog::new("rubrics")),
//!     Arc::new(OpenAIClient::from_env()?),
//!     Arc::new(MemoryCache::new()),
//! )?;
//!
//! let outcome = pipeline
//!     .grade(&Submission::text("FUVEST", "Texto da redação..."))
//!     .await?;
//! println!("{} ({})", outcome.result.final_score_display, outcome.result.scale_label);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! | Environment Variable | Description |
//! |---------------------|-------------|
//! | `RUBRICA_JUDGE_MODEL` | Model used for the grading judgment |
//! | `RUBRICA_OCR_MODELS` | Comma-separated OCR model chain (primary first) |
//! | `RUBRICA_JUDGE_TIMEOUT_SECS` | Judgment timeout in seconds (default: 240) |
//! | `RUBRICA_PIPELINE_VERSION` | Version tag folded into cache keys |
//! | `RUBRICA_CACHE_DIR` | Directory for the on-disk result cache |
//! | `RUBRICA_CACHE_MAX_ENTRIES` | Entry cap for the on-disk result cache |
//! | `OPENAI_API_KEY` | API key for the OpenAI-compatible endpoint |
//! | `OPENAI_BASE_URL` | Endpoint base URL (default: `https://api.openai.com/v1`) |

pub mod cache;
pub mod config;
pub mod documents;
pub mod engine;
pub mod errors;
pub mod judge;
pub mod ocr;
pub mod pipeline;
pub mod providers;
pub mod report;
pub mod rubric;
pub mod text;

pub use cache::{CacheKeyInput, CachedGrade, DirCache, GradeCache, MemoryCache};
pub use config::{LengthPolicyConfig, PipelineConfig, RepertoireConfig};
pub use engine::{finalize_score, CriterionScore, RuleEngine, ScoredResult};
pub use errors::{GradingError, GradingResult};
pub use judge::{
    GradingInvoker, GradingRequestContext, JudgedCriterion, ModelJudgment, ProposalImage,
    TriggeredRule,
};
pub use ocr::TranscriptionGateway;
pub use pipeline::{EssayFile, EssayInput, GradeOutcome, GradingPipeline, ResultSource, Submission};
pub use providers::llm::fake::FakeClient;
pub use providers::llm::openai::OpenAIClient;
pub use providers::llm::{
    normalize_chat_request, ChatMessage, ChatRequest, ContentPart, LlmClient, LlmResponse,
};
pub use report::{render, ReportRenderer};
pub use rubric::{
    Criterion, DirCatalog, DisplayScale, HardRule, LevelValueMap, MemoryCatalog,
    RubricCatalog, RubricDefinition, RubricLoader,
};
