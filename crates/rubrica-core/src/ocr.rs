//! Image → text through an ordered chain of vision models.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::errors::{GradingError, GradingResult};
use crate::providers::llm::{
    normalize_chat_request, ChatMessage, ChatRequest, ContentPart, LlmClient,
};

const OCR_SYSTEM: &str = "Você é um OCR em pt-BR. Transcreva com máxima fidelidade, \
numerando as linhas (1)(2)... Se alguma palavra estiver ilegível, use [?]. \
Ignore pautas e bordas.";

const OCR_USER: &str =
    "Transcreva o manuscrito. Devolva como texto puro com quebras de linha.";

/// Tries each model once, in order, and returns the first non-empty transcription.
#[derive(Clone)]
pub struct TranscriptionGateway {
    client: Arc<dyn LlmClient>,
    models: Vec<String>,
}

impl TranscriptionGateway {
    pub fn new(client: Arc<dyn LlmClient>, models: Vec<String>) -> Self {
        Self { client, models }
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub async fn transcribe(&self, image: &[u8], mime_type: &str) -> GradingResult<String> {
        if image.is_empty() {
            return Err(GradingError::invalid_input("image is empty"));
        }

        let mut last_error = String::from("no OCR models configured");
        let mut attempts = 0;

        for model in &self.models {
            attempts += 1;
            let start = Instant::now();
            match self.transcribe_with(model, image, mime_type).await {
                Ok(text) => {
                    info!(
                        model = %model,
                        attempts,
                        chars = text.chars().count(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "transcription succeeded"
                    );
                    return Ok(text);
                }
                Err(e) => {
                    warn!(model = %model, error = %e, "transcription attempt failed");
                    last_error = format!("{}: {}", model, e);
                }
            }
        }

        Err(GradingError::TranscriptionFailed {
            attempts,
            last_error,
        })
    }

    async fn transcribe_with(
        &self,
        model: &str,
        image: &[u8],
        mime_type: &str,
    ) -> anyhow::Result<String> {
        let request = normalize_chat_request(ChatRequest::new(
            model,
            vec![
                ChatMessage::system(OCR_SYSTEM),
                ChatMessage::user(vec![
                    ContentPart::text(OCR_USER),
                    ContentPart::image_data(mime_type, image),
                ]),
            ],
        ))?;

        debug!(model, bytes = image.len(), mime_type, "sending OCR request");
        let resp = self.client.complete(&request).await?;
        let text = resp.text.trim();
        if text.is_empty() {
            anyhow::bail!("empty transcription");
        }
        Ok(text.to_string())
    }
}
