//! Text from uploaded documents: proposal PDFs and plain-text essay files.

use anyhow::{anyhow, Context};
use tracing::debug;

use crate::errors::{GradingError, GradingResult};

/// Extract the text layer of a PDF.
///
/// Parsing runs on the blocking pool; a panic inside the parser surfaces as an
/// error instead of tearing down the caller.
pub async fn extract_pdf_text(bytes: Vec<u8>) -> anyhow::Result<String> {
    let size = bytes.len();
    let raw = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
        .await
        .context("pdf extraction task aborted")?
        .map_err(|e| anyhow!("failed to parse PDF: {}", e))?;
    debug!(bytes = size, chars = raw.chars().count(), "pdf text extracted");
    Ok(clean_extracted_text(&raw))
}

/// Unify line endings, drop NUL characters and trim.
pub(crate) fn clean_extracted_text(raw: &str) -> String {
    raw.replace("\r\n", "\n")
        .replace('\r', "\n")
        .replace('\0', "")
        .trim()
        .to_string()
}

/// Read an uploaded essay document.
///
/// Only text documents are accepted. Handwritten essays must be sent as an
/// image so they go through transcription.
pub fn decode_text_file(bytes: &[u8], mime_type: &str) -> GradingResult<String> {
    let mime = mime_type.to_ascii_lowercase();
    if mime.contains("pdf") {
        return Err(GradingError::invalid_input(
            "PDF essays are not read; attach a handwritten essay as an image (jpg/png)",
        ));
    }
    if !mime.starts_with("text/") {
        return Err(GradingError::invalid_input(format!(
            "unsupported essay file type '{}'",
            mime_type
        )));
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|e| GradingError::invalid_input(format!("essay file is not valid UTF-8: {}", e)))?;
    Ok(text.trim_start_matches('\u{feff}').to_string())
}
