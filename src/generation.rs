//! Generation client abstraction.
//!
//! The answer-generation call is an external text-completion service; this
//! core only depends on the [`GenerationClient`] contract. The bundled
//! implementation talks to an OpenAI-compatible chat-completions endpoint
//! with the same retry/backoff policy as the embedding client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::error::{DocdexError, Result};

/// One prior exchange in a conversation, oldest first.
#[derive(Debug, Clone)]
pub struct HistoryTurn {
    pub question: String,
    pub answer: String,
}

/// Trait for answer-generation providers.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Generate an answer to `query` grounded in the retrieved `context`
    /// chunks. Fails with [`DocdexError::Generation`] on transport, auth,
    /// or rate-limit failure.
    async fn generate(
        &self,
        query: &str,
        context: &[String],
        model: &str,
        temperature: f64,
        history: Option<&[HistoryTurn]>,
    ) -> Result<String>;
}

/// Create the configured [`GenerationClient`]. The provider set is closed.
pub fn create_generation_client(config: &GenerationConfig) -> Result<Arc<dyn GenerationClient>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiGenerationClient::new(config)?)),
        other => Err(DocdexError::Config(format!(
            "unknown generation provider: {}",
            other
        ))),
    }
}

/// Generation client for the OpenAI chat-completions API (or any
/// compatible endpoint via `generation.url`).
pub struct OpenAiGenerationClient {
    url: String,
    max_retries: u32,
    http: reqwest::Client,
}

impl OpenAiGenerationClient {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com/v1/chat/completions".to_string());
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DocdexError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            url,
            max_retries: config.max_retries,
            http,
        })
    }
}

fn build_messages(
    query: &str,
    context: &[String],
    history: Option<&[HistoryTurn]>,
) -> Vec<serde_json::Value> {
    let mut messages = Vec::new();

    let system = if context.is_empty() {
        "Answer the user's question. If you do not know the answer, say so.".to_string()
    } else {
        format!(
            "Answer the user's question using only the context below. \
             If the context does not contain the answer, say so.\n\n\
             Context:\n{}",
            context.join("\n---\n")
        )
    };
    messages.push(serde_json::json!({"role": "system", "content": system}));

    if let Some(turns) = history {
        for turn in turns {
            messages.push(serde_json::json!({"role": "user", "content": turn.question}));
            messages.push(serde_json::json!({"role": "assistant", "content": turn.answer}));
        }
    }

    messages.push(serde_json::json!({"role": "user", "content": query}));
    messages
}

#[async_trait]
impl GenerationClient for OpenAiGenerationClient {
    async fn generate(
        &self,
        query: &str,
        context: &[String],
        model: &str,
        temperature: f64,
        history: Option<&[HistoryTurn]>,
    ) -> Result<String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| DocdexError::Generation("OPENAI_API_KEY not set".to_string()))?;

        let body = serde_json::json!({
            "model": model,
            "temperature": temperature,
            "messages": build_messages(query, context, history),
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .http
                .post(&self.url)
                .header("Authorization", format!("Bearer {}", api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await.map_err(|e| {
                            DocdexError::Generation(format!("invalid response body: {}", e))
                        })?;
                        return parse_completion(&json);
                    }

                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(DocdexError::Generation(format!(
                            "generation API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    return Err(DocdexError::Generation(format!(
                        "generation API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    last_err = Some(DocdexError::Generation(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            DocdexError::Generation("generation failed after retries".to_string())
        }))
    }
}

fn parse_completion(json: &serde_json::Value) -> Result<String> {
    json.get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .and_then(|choice| choice.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            DocdexError::Generation("invalid completion response: missing choices".to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_completion() {
        let json = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "42."}}]
        });
        assert_eq!(parse_completion(&json).unwrap(), "42.");
    }

    #[test]
    fn test_parse_completion_missing_choices() {
        let json = serde_json::json!({"error": "nope"});
        assert!(parse_completion(&json).is_err());
    }

    #[test]
    fn test_messages_include_context_and_history() {
        let history = vec![HistoryTurn {
            question: "earlier question".to_string(),
            answer: "earlier answer".to_string(),
        }];
        let messages = build_messages(
            "current question",
            &["chunk one".to_string(), "chunk two".to_string()],
            Some(&history),
        );
        assert_eq!(messages.len(), 4);
        let system = messages[0]["content"].as_str().unwrap();
        assert!(system.contains("chunk one"));
        assert!(system.contains("chunk two"));
        assert_eq!(messages[1]["content"], "earlier question");
        assert_eq!(messages[3]["content"], "current question");
    }
}
