//! Grading invoker: one structured judgment request per submission.
//!
//! The model's answer is advisory. This module only guarantees its *shape*
//! (levels clamped to 0..=5, criteria sorted, prose softened); the final
//! levels and score are owned by [`crate::engine`].

mod parse;
mod prompt;

pub use prompt::rubric_strict_text;

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{GradingError, GradingResult};
use crate::providers::llm::LlmClient;
use crate::rubric::RubricDefinition;

/// Image of the essay prompt ("proposta"), sent inline with the judgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl ProposalImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.bytes))
    }
}

/// Everything the judgment request is built from.
#[derive(Debug, Clone)]
pub struct GradingRequestContext {
    rubric: RubricDefinition,
    proposal_text: Option<String>,
    proposal_image: Option<ProposalImage>,
    essay_text: String,
}

impl GradingRequestContext {
    /// Fails with `InvalidInput` when the essay is blank.
    pub fn new(rubric: RubricDefinition, essay_text: impl Into<String>) -> GradingResult<Self> {
        let essay_text = essay_text.into();
        if essay_text.trim().is_empty() {
            return Err(GradingError::invalid_input("essay text is empty"));
        }
        Ok(Self {
            rubric,
            proposal_text: None,
            proposal_image: None,
            essay_text,
        })
    }

    pub fn with_proposal_text(mut self, text: impl Into<String>) -> Self {
        let text = text.into();
        self.proposal_text = (!text.trim().is_empty()).then_some(text);
        self
    }

    pub fn with_proposal_image(mut self, image: ProposalImage) -> Self {
        self.proposal_image = Some(image);
        self
    }

    pub fn rubric(&self) -> &RubricDefinition {
        &self.rubric
    }

    pub fn proposal_text(&self) -> Option<&str> {
        self.proposal_text.as_deref()
    }

    pub fn proposal_image(&self) -> Option<&ProposalImage> {
        self.proposal_image.as_ref()
    }

    pub fn essay_text(&self) -> &str {
        &self.essay_text
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JudgedCriterion {
    pub id: String,
    pub name: String,
    /// Always within 0..=5.
    pub level: u8,
    pub justification: String,
}

/// A rule the model (or the engine) reports as applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggeredRule {
    pub id: String,
    pub criterion_ids: Vec<String>,
    pub reason: String,
}

/// The model's structured answer after shape normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelJudgment {
    /// Sorted by id in natural order.
    pub criteria: Vec<JudgedCriterion>,
    pub suggestions: Vec<String>,
    pub triggered_rules: Vec<TriggeredRule>,
    /// Free-text theme adherence signal (`addressing_of_theme`).
    pub theme_adherence: Option<String>,
}

impl ModelJudgment {
    pub fn criterion(&self, id: &str) -> Option<&JudgedCriterion> {
        self.criteria.iter().find(|c| c.id == id)
    }
}

/// Sends the judgment request and validates the answer.
#[derive(Clone)]
pub struct GradingInvoker {
    client: Arc<dyn LlmClient>,
    model: String,
    timeout: Duration,
}

impl GradingInvoker {
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build, send and parse one judgment.
    ///
    /// The call is raced against the configured timeout; on expiry the
    /// in-flight request future is dropped, which closes its connection.
    pub async fn invoke_judgment(
        &self,
        context: &GradingRequestContext,
    ) -> GradingResult<ModelJudgment> {
        let request = prompt::build_request(&self.model, context)
            .map_err(|e| GradingError::invalid_input(format!("{:#}", e)))?;

        debug!(
            model = %self.model,
            rubric = %context.rubric().name,
            has_proposal_text = context.proposal_text().is_some(),
            has_proposal_image = context.proposal_image().is_some(),
            "sending judgment request"
        );

        let start = Instant::now();
        let response =
            match tokio::time::timeout(self.timeout, self.client.complete(&request)).await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    warn!(model = %self.model, error = %e, "judgment call failed");
                    return Err(GradingError::Provider {
                        provider: self.client.provider_name().to_string(),
                        message: format!("{:#}", e),
                    });
                }
                Err(_) => {
                    warn!(
                        model = %self.model,
                        timeout_secs = self.timeout.as_secs(),
                        "judgment timed out"
                    );
                    return Err(GradingError::JudgmentTimeout {
                        model: self.model.clone(),
                        elapsed: self.timeout,
                    });
                }
            };

        let judgment = parse::parse_judgment(&response.text)?;
        info!(
            model = %response.model,
            criteria = judgment.criteria.len(),
            triggered_rules = judgment.triggered_rules.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "judgment received"
        );
        Ok(judgment)
    }
}
