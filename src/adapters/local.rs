//! LocalLLM adapter — a self-hosted chat-completion endpoint, no vendor
//! credential. Wire shape mirrors the OpenAI-compatible servers this
//! talks to in practice (llama.cpp server, Ollama's OpenAI shim); vision
//! requests embed the image as a base64 data URL inline in the user turn,
//! the same convention those servers expect.

use async_trait::async_trait;
use base64::Engine;
use serde_json::json;
use std::time::Instant;

use super::{
    parse_retry_after, with_retry, CompletionRequest, CompletionResponse, ProviderAdapter, TypedError,
    VisionAdapter, VisionRequest,
};
use crate::types::ProviderConfig;

pub struct LocalLlmAdapter {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl LocalLlmAdapter {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    async fn post_chat(&self, body: serde_json::Value, model: String) -> Result<CompletionResponse, TypedError> {
        let start = Instant::now();
        let mut request = self.client.post(format!("{}/chat/completions", self.config.base_url));
        if let Some(credential) = &self.config.credential {
            request = request.bearer_auth(credential);
        }
        let resp = request
            .json(&body)
            .send()
            .await
            .map_err(|e| TypedError::Transport(e.to_string()))?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let status = resp.status().as_u16();
        if status != 200 {
            let retry_after = parse_retry_after(resp.headers());
            let error_body = resp.text().await.unwrap_or_default();
            return Err(TypedError::classify_http(status, &error_body, retry_after));
        }

        let resp_body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| TypedError::BadResponse(e.to_string()))?;
        let text = resp_body["choices"][0]["message"]["content"]
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
            tokens_in: resp_body["usage"]["prompt_tokens"].as_u64(),
            tokens_out: resp_body["usage"]["completion_tokens"].as_u64(),
        })
    }

    async fn call_once(&self, req: &CompletionRequest) -> Result<CompletionResponse, TypedError> {
        let messages: Vec<serde_json::Value> = req
            .messages
            .iter()
            .map(|m| json!({"role": role_str(m.role), "content": &m.content}))
            .collect();
        let model = req.model.clone().unwrap_or_else(|| self.config.text_model.clone());
        self.post_chat(
            json!({
                "model": model,
                "messages": messages,
                "max_tokens": req.max_tokens,
                "temperature": req.temperature,
            }),
            model.clone(),
        )
        .await
    }

    async fn call_vision_once(&self, req: &VisionRequest) -> Result<CompletionResponse, TypedError> {
        let model = req
            .model
            .clone()
            .or_else(|| self.config.vision_model.clone())
            .ok_or_else(|| TypedError::Fatal("no vision model configured".into()))?;
        let encoded = base64::engine::general_purpose::STANDARD.encode(&req.image_bytes);
        let data_url = format!("data:{};base64,{}", req.mime_type, encoded);
        let messages = json!([{
            "role": "user",
            "content": [
                {"type": "text", "text": &req.prompt},
                {"type": "image_url", "image_url": {"url": data_url}},
            ]
        }]);
        self.post_chat(
            json!({ "model": model, "messages": messages, "max_tokens": req.max_tokens }),
            model.clone(),
        )
        .await
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
impl ProviderAdapter for LocalLlmAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn supports_vision(&self) -> bool {
        self.config.supports_vision()
    }

    async fn complete_text(&self, req: &CompletionRequest) -> Result<CompletionResponse, TypedError> {
        with_retry(self.config.max_retries, || self.call_once(req)).await
    }

    async fn health(&self) -> Result<(), TypedError> {
        let resp = self
            .client
            .get(format!("{}/models", self.config.base_url))
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

#[async_trait]
impl VisionAdapter for LocalLlmAdapter {
    async fn complete_vision(&self, req: &VisionRequest) -> Result<CompletionResponse, TypedError> {
        let mut attempt = 0;
        loop {
            match self.call_vision_once(req).await {
                Ok(resp) => return Ok(resp),
                Err(TypedError::Transport(msg)) if attempt < self.config.max_retries => {
                    tokio::time::sleep(super::backoff_delay(attempt)).await;
                    attempt += 1;
                    tracing::warn!(attempt, "vision transport error, retrying: {msg}");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
