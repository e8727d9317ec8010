//! Groq adapter — OpenAI-compatible chat-completions API, text only.

use async_trait::async_trait;
use serde_json::json;
use std::time::Instant;

use super::{parse_retry_after, with_retry, CompletionRequest, CompletionResponse, ProviderAdapter, TypedError};
use crate::types::ProviderConfig;

pub struct GroqAdapter {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl GroqAdapter {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    async fn call_once(&self, req: &CompletionRequest) -> Result<CompletionResponse, TypedError> {
        let credential = self
            .config
            .credential
            .as_deref()
            .ok_or(TypedError::InvalidAuth)?;

        let messages: Vec<serde_json::Value> = req
            .messages
            .iter()
            .map(|m| json!({"role": role_str(m.role), "content": &m.content}))
            .collect();

        let model = req.model.clone().unwrap_or_else(|| self.config.text_model.clone());
        let start = Instant::now();
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(credential)
            .json(&json!({
                "model": model,
                "messages": messages,
                "max_tokens": req.max_tokens,
                "temperature": req.temperature,
            }))
            .send()
            .await
            .map_err(|e| TypedError::Transport(e.to_string()))?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let status = resp.status().as_u16();
        if status != 200 {
            let retry_after = parse_retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            return Err(TypedError::classify_http(status, &body, retry_after));
        }

        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TypedError::BadResponse(e.to_string()))?;
        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        if text.trim().is_empty() {
            return Err(TypedError::BadResponse("empty completion".into()));
        }

        Ok(CompletionResponse {
            text,
            model,
            latency_ms,
            tokens_in: body["usage"]["prompt_tokens"].as_u64(),
            tokens_out: body["usage"]["completion_tokens"].as_u64(),
        })
    }
}

fn role_str(role: super::Role) -> &'static str {
    match role {
        super::Role::System => "system",
        super::Role::User => "user",
        super::Role::Assistant => "assistant",
    }
}

#[async_trait]
impl ProviderAdapter for GroqAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn complete_text(&self, req: &CompletionRequest) -> Result<CompletionResponse, TypedError> {
        with_retry(self.config.max_retries, || self.call_once(req)).await
    }

    async fn health(&self) -> Result<(), TypedError> {
        let credential = self.config.credential.as_deref().ok_or(TypedError::InvalidAuth)?;
        let resp = self
            .client
            .get(format!("{}/models", self.config.base_url))
            .bearer_auth(credential)
            .send()
            .await
            .map_err(|e| TypedError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        if status == 200 {
            Ok(())
        } else {
            let retry_after = parse_retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            Err(TypedError::classify_http(status, &body, retry_after))
        }
    }
}
