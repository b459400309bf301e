//! Chat-completion model shared by the judgment and OCR calls.

pub mod fake;
pub mod openai;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One part of a multi-part message, in the OpenAI wire layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    /// `image_url` is `{"url": ...}` on the wire. Builders may hand in a bare
    /// string; [`normalize_chat_request`] rewrites it.
    ImageUrl {
        image_url: Value,
    },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        Self::ImageUrl {
            image_url: json!({ "url": url.into() }),
        }
    }

    /// Inline image as a `data:` URL.
    pub fn image_data(mime_type: &str, bytes: &[u8]) -> Self {
        Self::image_url(format!("data:{};base64,{}", mime_type, BASE64.encode(bytes)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: vec![ContentPart::text(text)],
        }
    }

    pub fn user(content: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }
}

/// A chat-completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Ask the endpoint for a single JSON object.
    #[serde(default)]
    pub json_response: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: 0.0,
            max_tokens: None,
            json_response: false,
        }
    }

    pub fn with_json_response(mut self) -> Self {
        self.json_response = true;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// Validate a request and bring image parts into wire shape.
///
/// A bare-string `image_url` becomes `{"url": "..."}`. Image parts without a
/// usable URL, empty messages and an empty model id are rejected.
pub fn normalize_chat_request(mut request: ChatRequest) -> anyhow::Result<ChatRequest> {
    if request.model.trim().is_empty() {
        anyhow::bail!("chat request has no model");
    }
    if request.messages.is_empty() {
        anyhow::bail!("chat request has no messages");
    }

    for (m, message) in request.messages.iter_mut().enumerate() {
        if message.content.is_empty() {
            anyhow::bail!("message {} has no content", m);
        }
        for part in message.content.iter_mut() {
            let ContentPart::ImageUrl { image_url } = part else {
                continue;
            };
            let url = match image_url {
                Value::String(s) => s.trim().to_string(),
                Value::Object(obj) => obj
                    .get("url")
                    .and_then(Value::as_str)
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default(),
                _ => String::new(),
            };
            if url.is_empty() {
                anyhow::bail!("message {} has an image part without a url", m);
            }
            match image_url {
                Value::Object(obj) => {
                    obj.insert("url".to_string(), Value::String(url));
                }
                other => *other = json!({ "url": url }),
            }
        }
    }
    Ok(request)
}

#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> anyhow::Result<LlmResponse>;

    fn provider_name(&self) -> &'static str;
}
