use super::{ChatRequest, LlmClient, LlmResponse};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
enum Reply {
    Text(String),
    Fail(String),
}

/// Scripted client for tests and offline runs.
///
/// Replies are chosen by the request's model id, falling back to the default
/// reply. Every request is recorded.
#[derive(Debug, Default)]
pub struct FakeClient {
    default_reply: Option<Reply>,
    by_model: HashMap<String, Reply>,
    delay: Option<Duration>,
    calls: Mutex<Vec<ChatRequest>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.default_reply = Some(Reply::Text(response.into()));
        self
    }

    pub fn with_model_response(mut self, model: &str, response: impl Into<String>) -> Self {
        self.by_model
            .insert(model.to_string(), Reply::Text(response.into()));
        self
    }

    pub fn with_model_failure(mut self, model: &str, message: impl Into<String>) -> Self {
        self.by_model
            .insert(model.to_string(), Reply::Fail(message.into()));
        self
    }

    /// Sleep before answering (drives timeout tests under paused time).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    /// Model ids in call order.
    pub async fn called_models(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .map(|r| r.model.clone())
            .collect()
    }
}

#[async_trait]
impl LlmClient for FakeClient {
    async fn complete(&self, request: &ChatRequest) -> anyhow::Result<LlmResponse> {
        self.calls.lock().await.push(request.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = self
            .by_model
            .get(&request.model)
            .or(self.default_reply.as_ref())
            .ok_or_else(|| anyhow::anyhow!("no scripted reply for model {}", request.model))?;

        match reply {
            Reply::Text(text) => Ok(LlmResponse {
                text: text.clone(),
                provider: "fake".to_string(),
                model: request.model.clone(),
            }),
            Reply::Fail(message) => anyhow::bail!("{}", message),
        }
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::ChatMessage;

    #[tokio::test]
    async fn replies_by_model_then_default() {
        let client = FakeClient::new()
            .with_response("default")
            .with_model_response("a", "from a")
            .with_model_failure("b", "boom");

        let ask = |m: &str| ChatRequest::new(m, vec![ChatMessage::system("x")]);

        assert_eq!(client.complete(&ask("a")).await.unwrap().text, "from a");
        assert_eq!(client.complete(&ask("c")).await.unwrap().text, "default");
        assert_eq!(
            client.complete(&ask("b")).await.unwrap_err().to_string(),
            "boom"
        );
        assert_eq!(client.called_models().await, vec!["a", "c", "b"]);
    }
}
