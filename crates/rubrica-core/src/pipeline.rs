//! Per-submission state machine.
//!
//! ```text
//! Received → Normalized → CacheHit → Done
//!                       ↘ Judging → Judged → Finalized → Rendered → Cached → Done
//!                                 ↘ Failed
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{CacheKeyInput, CachedGrade, DirCache, GradeCache, MemoryCache};
use crate::config::PipelineConfig;
use crate::documents::{decode_text_file, extract_pdf_text};
use crate::engine::{RuleEngine, ScoredResult};
use crate::errors::{GradingError, GradingResult};
use crate::judge::{GradingInvoker, GradingRequestContext, ProposalImage};
use crate::ocr::TranscriptionGateway;
use crate::providers::llm::LlmClient;
use crate::report::ReportRenderer;
use crate::rubric::{RubricCatalog, RubricDefinition, RubricLoader};
use crate::text::{count_non_empty_lines, normalize};

/// The essay as it will be read: typed text, then an image, then an
/// uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EssayInput<'a> {
    Text(&'a str),
    Image { bytes: &'a [u8], mime_type: &'a str },
    File { bytes: &'a [u8], mime_type: &'a str },
}

/// Uploaded essay document (plain text).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EssayFile {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// One grading request.
#[derive(Debug, Clone, Default)]
pub struct Submission {
    pub rubric: String,
    pub essay_text: Option<String>,
    pub essay_image: Option<ProposalImage>,
    pub essay_file: Option<EssayFile>,
    pub proposal_text: Option<String>,
    pub proposal_pdf: Option<Vec<u8>>,
    pub proposal_image: Option<ProposalImage>,
}

impl Submission {
    pub fn text(rubric: impl Into<String>, essay: impl Into<String>) -> Self {
        Self {
            rubric: rubric.into(),
            essay_text: Some(essay.into()),
            ..Self::default()
        }
    }

    pub fn image(rubric: impl Into<String>, bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            rubric: rubric.into(),
            essay_image: Some(ProposalImage::new(bytes, mime_type)),
            ..Self::default()
        }
    }

    /// An uploaded essay: images go through OCR, anything else is read as a
    /// document.
    pub fn file(rubric: impl Into<String>, bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        let mime_type = mime_type.into();
        if mime_type.to_ascii_lowercase().starts_with("image/") {
            Self::image(rubric, bytes, mime_type)
        } else {
            Self {
                rubric: rubric.into(),
                essay_file: Some(EssayFile { bytes, mime_type }),
                ..Self::default()
            }
        }
    }

    pub fn with_essay_image(mut self, bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        self.essay_image = Some(ProposalImage::new(bytes, mime_type));
        self
    }

    pub fn with_essay_file(mut self, bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        self.essay_file = Some(EssayFile {
            bytes,
            mime_type: mime_type.into(),
        });
        self
    }

    pub fn with_proposal_text(mut self, text: impl Into<String>) -> Self {
        self.proposal_text = Some(text.into());
        self
    }

    pub fn with_proposal_image(mut self, bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        self.proposal_image = Some(ProposalImage::new(bytes, mime_type));
        self
    }

    /// Proposal as a PDF; its text is used when no proposal text is given.
    pub fn with_proposal_pdf(mut self, bytes: Vec<u8>) -> Self {
        self.proposal_pdf = Some(bytes);
        self
    }

    pub fn essay_input(&self) -> Option<EssayInput<'_>> {
        if let Some(text) = self.essay_text.as_deref().filter(|t| !t.trim().is_empty()) {
            return Some(EssayInput::Text(text));
        }
        if let Some(image) = self.essay_image.as_ref().filter(|i| !i.bytes.is_empty()) {
            return Some(EssayInput::Image {
                bytes: &image.bytes,
                mime_type: &image.mime_type,
            });
        }
        self.essay_file
            .as_ref()
            .filter(|f| !f.bytes.is_empty())
            .map(|f| EssayInput::File {
                bytes: &f.bytes,
                mime_type: &f.mime_type,
            })
    }
}

/// Normalized essay plus the non-empty line count of the text as written.
struct ResolvedEssay {
    text: String,
    line_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Cache,
    Live,
}

impl ResultSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Live => "live",
        }
    }
}

/// What the report consumer receives.
#[derive(Debug, Clone, PartialEq)]
pub struct GradeOutcome {
    pub result: ScoredResult,
    pub report_html: String,
    pub source: ResultSource,
    /// `None` when no key could be derived (the result was not cached).
    pub cache_key: Option<String>,
    /// Normalized essay text that was graded.
    pub essay_text: String,
    /// Non-empty lines of the essay before normalization.
    pub essay_line_count: usize,
}

/// Wires loader, OCR, judgment, engine, renderer and cache together.
#[derive(Clone)]
pub struct GradingPipeline {
    config: PipelineConfig,
    loader: RubricLoader,
    ocr: TranscriptionGateway,
    invoker: GradingInvoker,
    engine: RuleEngine,
    renderer: ReportRenderer,
    cache: Arc<dyn GradeCache>,
}

impl GradingPipeline {
    pub fn new(
        config: PipelineConfig,
        catalog: Arc<dyn RubricCatalog>,
        client: Arc<dyn LlmClient>,
        cache: Arc<dyn GradeCache>,
    ) -> GradingResult<Self> {
        config.validate()?;
        Ok(Self {
            loader: RubricLoader::new(catalog, &config)?,
            ocr: TranscriptionGateway::new(client.clone(), config.ocr_models.clone()),
            invoker: GradingInvoker::new(client, config.judge_model.clone(), config.judge_timeout()),
            engine: RuleEngine::from_config(&config)?,
            renderer: ReportRenderer::new(config.max_suggestions),
            cache,
            config,
        })
    }

    /// Like [`new`](Self::new), with a [`DirCache`] when `cache_dir` is set and
    /// a [`MemoryCache`] otherwise.
    pub fn from_config(
        config: PipelineConfig,
        catalog: Arc<dyn RubricCatalog>,
        client: Arc<dyn LlmClient>,
    ) -> GradingResult<Self> {
        let cache: Arc<dyn GradeCache> = match &config.cache_dir {
            Some(dir) => {
                let mut cache = DirCache::new(dir);
                if let Some(max) = config.cache_max_entries {
                    cache = cache.with_max_entries(max);
                }
                Arc::new(cache)
            }
            None => Arc::new(MemoryCache::new()),
        };
        Self::new(config, catalog, client, cache)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn grade(&self, submission: &Submission) -> GradingResult<GradeOutcome> {
        let start = Instant::now();
        debug!(state = "received", rubric = %submission.rubric);

        let (rubric, essay, proposal_text) = tokio::try_join!(
            self.loader.load_rubric(&submission.rubric),
            self.resolve_essay(submission),
            self.resolve_proposal(submission),
        )?;
        let ResolvedEssay {
            text: essay_text,
            line_count: essay_line_count,
        } = essay;
        debug!(
            state = "normalized",
            rubric = %rubric.name,
            essay_chars = essay_text.chars().count(),
            essay_lines = essay_line_count,
            has_proposal_text = proposal_text.is_some()
        );

        let cache_key = self.cache_key(
            submission,
            &rubric,
            &essay_text,
            essay_line_count,
            proposal_text.as_deref(),
        );
        if let Some(key) = &cache_key {
            match self.cache.get(key).await {
                Ok(Some(hit)) => {
                    info!(state = "cache_hit", rubric = %rubric.name, key = %key, "grade served from cache");
                    return Ok(GradeOutcome {
                        result: hit.result,
                        report_html: hit.report_html,
                        source: ResultSource::Cache,
                        cache_key,
                        essay_text,
                        essay_line_count,
                    });
                }
                Ok(None) => {}
                Err(e) => warn!(key = %key, error = %e, "cache lookup failed; grading live"),
            }
        }

        debug!(state = "judging", model = %self.invoker.model());
        let mut context = GradingRequestContext::new(rubric.clone(), essay_text.clone())?;
        if let Some(text) = &proposal_text {
            context = context.with_proposal_text(text.clone());
        }
        if let Some(image) = &submission.proposal_image {
            if !image.bytes.is_empty() {
                context = context.with_proposal_image(image.clone());
            }
        }
        let judgment = match self.invoker.invoke_judgment(&context).await {
            Ok(judgment) => judgment,
            Err(e) => {
                warn!(state = "failed", kind = e.kind(), error = %e, "grading failed");
                return Err(e);
            }
        };
        debug!(state = "judged", criteria = judgment.criteria.len());

        let result = self.engine.finalize_with_line_count(
            &judgment,
            &rubric,
            &essay_text,
            essay_line_count,
            proposal_text.as_deref(),
        );
        debug!(state = "finalized", final_score = result.final_score);

        let report_html =
            self.renderer
                .render(&rubric, &result, &essay_text, proposal_text.as_deref());
        debug!(state = "rendered", bytes = report_html.len());

        if let Some(key) = &cache_key {
            let entry = CachedGrade::new(result.clone(), report_html.clone());
            match self.cache.put(key, entry).await {
                Ok(()) => debug!(state = "cached", key = %key),
                Err(e) => warn!(key = %key, error = %e, "failed to store grade in cache"),
            }
        }

        info!(
            state = "done",
            rubric = %rubric.name,
            final_score = result.final_score,
            display = result.final_score_display,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "grade completed"
        );
        Ok(GradeOutcome {
            result,
            report_html,
            source: ResultSource::Live,
            cache_key,
            essay_text,
            essay_line_count,
        })
    }

    /// Line count is taken before normalization merges hyphenated breaks.
    async fn resolve_essay(&self, submission: &Submission) -> GradingResult<ResolvedEssay> {
        let raw = match submission.essay_input() {
            Some(EssayInput::Text(text)) => text.to_string(),
            Some(EssayInput::Image { bytes, mime_type }) => {
                self.ocr.transcribe(bytes, mime_type).await?
            }
            Some(EssayInput::File { bytes, mime_type }) => decode_text_file(bytes, mime_type)?,
            None => {
                return Err(GradingError::invalid_input(
                    "submission has no essay text, image or file",
                ))
            }
        };
        let text = normalize(&raw);
        if text.is_empty() {
            return Err(GradingError::invalid_input(
                "essay text is empty after normalization",
            ));
        }
        Ok(ResolvedEssay {
            line_count: count_non_empty_lines(&raw),
            text,
        })
    }

    /// Proposal text as given, else extracted from the proposal PDF, else
    /// transcribed from the proposal image when enabled. Failed extraction
    /// or transcription is not fatal.
    async fn resolve_proposal(&self, submission: &Submission) -> GradingResult<Option<String>> {
        if let Some(text) = submission
            .proposal_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            return Ok(Some(text.to_string()));
        }
        if let Some(pdf) = submission.proposal_pdf.as_ref().filter(|b| !b.is_empty()) {
            match extract_pdf_text(pdf.clone()).await {
                Ok(text) if !text.is_empty() => {
                    debug!(chars = text.chars().count(), "proposal text extracted from PDF");
                    return Ok(Some(text));
                }
                Ok(_) => warn!("proposal PDF has no extractable text"),
                Err(e) => warn!(error = %e, "proposal PDF extraction failed"),
            }
        }
        let Some(image) = submission.proposal_image.as_ref() else {
            return Ok(None);
        };
        if !self.config.transcribe_proposal_images || image.bytes.is_empty() {
            return Ok(None);
        }
        match self.ocr.transcribe(&image.bytes, &image.mime_type).await {
            Ok(text) => Ok(Some(text.trim().to_string()).filter(|t| !t.is_empty())),
            Err(e) => {
                warn!(error = %e, "proposal transcription failed; continuing without text");
                Ok(None)
            }
        }
    }

    fn cache_key(
        &self,
        submission: &Submission,
        rubric: &RubricDefinition,
        essay_text: &str,
        essay_line_count: usize,
        proposal_text: Option<&str>,
    ) -> Option<String> {
        let input = CacheKeyInput {
            rubric,
            proposal_text: proposal_text.unwrap_or_default(),
            has_proposal_image: submission
                .proposal_image
                .as_ref()
                .is_some_and(|i| !i.bytes.is_empty()),
            essay_text,
            essay_line_count,
            level_map: &rubric.level_map,
            model: self.invoker.model(),
            pipeline_version: &self.config.pipeline_version,
        };
        match input.key() {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(error = %e, "could not derive cache key; result will not be cached");
                None
            }
        }
    }
}
