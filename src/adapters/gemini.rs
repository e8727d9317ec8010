//! Gemini adapter — Google's generativelanguage REST API.
//!
//! Unlike the OpenAI-shaped providers this speaks its own contents/parts
//! shape and authenticates via a URL query parameter rather than a
//! bearer header. It is the only vision-capable adapter in this core.

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};
use std::time::Instant;

use super::{
    parse_retry_after, with_retry, CompletionRequest, CompletionResponse, ProviderAdapter, TypedError,
    VisionAdapter, VisionRequest,
};
use crate::types::ProviderConfig;

pub struct GeminiAdapter {
    client: reqwest::Client,
    config: ProviderConfig,
}

impl GeminiAdapter {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(config.timeout)
                .build()
                .unwrap_or_default(),
            config,
        }
    }

    fn credential(&self) -> Result<&str, TypedError> {
        self.config.credential.as_deref().ok_or(TypedError::InvalidAuth)
    }

    fn contents_for(role: super::Role, content: &str) -> Value {
        let role = match role {
            super::Role::Assistant => "model",
            _ => "user",
        };
        json!({"role": role, "parts": [{"text": content}]})
    }

    async fn call_once(&self, req: &CompletionRequest) -> Result<CompletionResponse, TypedError> {
        let credential = self.credential()?;
        let model = req.model.clone().unwrap_or_else(|| self.config.text_model.clone());
        let url = format!(
            "{}/models/{model}:generateContent?key={credential}",
            self.config.base_url
        );

        let mut system_instruction = None;
        let mut contents = Vec::new();
        for msg in &req.messages {
            if msg.role == super::Role::System {
                system_instruction = Some(json!({"parts": [{"text": &msg.content}]}));
                continue;
            }
            contents.push(Self::contents_for(msg.role, &msg.content));
        }

        let mut body = json!({
            "contents": contents,
            "generationConfig": {
                "temperature": req.temperature,
                "maxOutputTokens": req.max_tokens,
            }
        });
        if let Some(sys) = system_instruction {
            body["systemInstruction"] = sys;
        }

        let start = Instant::now();
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| TypedError::Transport(e.to_string()))?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let status = resp.status().as_u16();
        if status != 200 {
            let retry_after = parse_retry_after(resp.headers());
            let error_body = resp.text().await.unwrap_or_default();
            return Err(Self::classify(status, &error_body, retry_after));
        }

        let resp_body: Value = resp
            .json()
            .await
            .map_err(|e| TypedError::BadResponse(e.to_string()))?;
        Self::response_from(resp_body, model, latency_ms)
    }

    async fn call_vision_once(&self, req: &VisionRequest) -> Result<CompletionResponse, TypedError> {
        let credential = self.credential()?;
        let model = req
            .model
            .clone()
            .or_else(|| self.config.vision_model.clone())
            .ok_or_else(|| TypedError::Fatal("no vision model configured".into()))?;
        let url = format!(
            "{}/models/{model}:generateContent?key={credential}",
            self.config.base_url
        );

        let encoded = base64::engine::general_purpose::STANDARD.encode(&req.image_bytes);
        let body = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    {"text": &req.prompt},
                    {"inline_data": {"mime_type": &req.mime_type, "data": encoded}},
                ]
            }],
            "generationConfig": { "maxOutputTokens": req.max_tokens }
        });

        let start = Instant::now();
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| TypedError::Transport(e.to_string()))?;
        let latency_ms = start.elapsed().as_millis() as u64;

        let status = resp.status().as_u16();
        if status != 200 {
            let retry_after = parse_retry_after(resp.headers());
            let error_body = resp.text().await.unwrap_or_default();
            return Err(Self::classify(status, &error_body, retry_after));
        }

        let resp_body: Value = resp
            .json()
            .await
            .map_err(|e| TypedError::BadResponse(e.to_string()))?;
        Self::response_from(resp_body, model, latency_ms)
    }

    fn response_from(resp_body: Value, model: String, latency_ms: u64) -> Result<CompletionResponse, TypedError> {
        let text = resp_body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        if text.trim().is_empty() {
            return Err(TypedError::BadResponse("empty completion".into()));
        }
        let usage = &resp_body["usageMetadata"];
        Ok(CompletionResponse {
            text,
            model,
            latency_ms,
            tokens_in: usage["promptTokenCount"].as_u64(),
            tokens_out: usage["candidatesTokenCount"].as_u64(),
        })
    }

    /// Gemini's error body wraps everything under `error.status`/`error.message`
    /// rather than a REST-standard status code family — it still maps onto
    /// the shared taxonomy via the HTTP status plus a keyword scan. A quota
    /// or rate-limit error carries its own `RetryInfo` detail
    /// (`error.details[].retryDelay`, e.g. `"19s"`) ahead of the HTTP
    /// `Retry-After` header, since Gemini populates the former even when
    /// the latter is absent.
    fn classify(status: u16, body: &str, header_retry_after: Option<std::time::Duration>) -> TypedError {
        let parsed: Value = serde_json::from_str(body).unwrap_or_default();
        let message = parsed["error"]["message"].as_str().unwrap_or(body);
        let retry_after = Self::retry_delay_from_details(&parsed).or(header_retry_after);

        if status == 429 || message.contains("RESOURCE_EXHAUSTED") {
            return TypedError::RateLimited { retry_after };
        }
        if message.to_lowercase().contains("quota exceeded") {
            return TypedError::QuotaExceeded {
                reset_hint: retry_after.map(|d| format!("{}s", d.as_secs())),
            };
        }
        TypedError::classify_http(status, body, retry_after)
    }

    /// Pull `retryDelay` (e.g. `"19s"`) out of a `google.rpc.RetryInfo`
    /// entry in `error.details`, if one was sent.
    fn retry_delay_from_details(parsed: &Value) -> Option<std::time::Duration> {
        parsed["error"]["details"].as_array()?.iter().find_map(|d| {
            let delay = d.get("retryDelay")?.as_str()?;
            delay.strip_suffix('s')?.parse::<f64>().ok().map(std::time::Duration::from_secs_f64)
        })
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
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
        let credential = self.credential()?;
        let url = format!("{}/models?key={credential}", self.config.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| TypedError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        if status == 200 {
            Ok(())
        } else {
            let retry_after = parse_retry_after(resp.headers());
            let body = resp.text().await.unwrap_or_default();
            Err(Self::classify(status, &body, retry_after))
        }
    }
}

#[async_trait]
impl VisionAdapter for GeminiAdapter {
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
