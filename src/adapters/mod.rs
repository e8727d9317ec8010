//! Provider adapter contract — capability-typed, vendor-neutral.
//!
//! Every provider (Groq, DeepSeek, Gemini, LocalLLM) implements
//! `ProviderAdapter`. Vision-capable providers additionally implement
//! `VisionAdapter`, so the type system — not a runtime flag — prevents
//! calling a vision method on a text-only adapter. The Provider Manager
//! calls adapters only through these traits; adapters never see each
//! other or the registry.

use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::types::DocumentType;

pub mod deepseek;
pub mod gemini;
pub mod groq;
pub mod local;

/// A single role-tagged conversation turn. Never carries a vendor
/// keyword — adapters translate to and from this shape.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Parameters for a single text-completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub messages: Vec<Message>,
    pub model: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Forwarded from the Orchestrator's classification so an adapter can
    /// pick a specialized model (DeepSeek's `deepseek-coder` for
    /// `DocumentType::Code`) without the Manager knowing per-vendor names.
    pub document_type: DocumentType,
}

/// Parameters for a vision call: a text prompt plus one image attachment.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub prompt: String,
    pub image_bytes: Vec<u8>,
    pub mime_type: String,
    pub model: Option<String>,
    pub max_tokens: u32,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub model: String,
    pub latency_ms: u64,
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
}

/// The closed error taxonomy every adapter classifies its failures into.
/// Nothing else escapes an adapter — a vendor SDK exception or a raw
/// `reqwest::Error` never reaches the Manager directly.
#[derive(Debug, Error, Clone)]
pub enum TypedError {
    #[error("invalid credential")]
    InvalidAuth,
    #[error("quota exceeded")]
    QuotaExceeded { reset_hint: Option<String> },
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("bad response: {0}")]
    BadResponse(String),
    #[error("fatal error: {0}")]
    Fatal(String),
}

impl TypedError {
    /// Classify an HTTP status + response body per the taxonomy table.
    /// Shared by every adapter so the interpretation stays consistent.
    /// `retry_after` is whatever the caller already parsed from the
    /// response headers (see `parse_retry_after`) — this function only
    /// decides which variant it belongs on.
    pub fn classify_http(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let lower = body.to_lowercase();
        match status {
            401 => TypedError::InvalidAuth,
            403 if lower.contains("quota") || lower.contains("credits") || lower.contains("exhausted") => {
                TypedError::QuotaExceeded {
                    reset_hint: retry_after.map(|d| format!("{}s", d.as_secs())),
                }
            }
            403 if lower.contains("rate") => TypedError::RateLimited { retry_after },
            429 => TypedError::RateLimited { retry_after },
            400..=499 => TypedError::Fatal(format!("http {status}: {}", truncate(body, 300))),
            _ => TypedError::BadResponse(format!("http {status}: {}", truncate(body, 300))),
        }
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, TypedError::Transport(_))
    }
}

/// Read the `Retry-After` header (seconds form) or, failing that,
/// `X-RateLimit-Reset` (epoch seconds, converted to a duration from now).
pub fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    if let Some(value) = headers.get(reqwest::header::RETRY_AFTER) {
        if let Ok(s) = value.to_str() {
            if let Ok(seconds) = s.parse::<u64>() {
                return Some(Duration::from_secs(seconds));
            }
        }
    }
    if let Some(value) = headers.get("x-ratelimit-reset") {
        if let Ok(s) = value.to_str() {
            if let Ok(reset_epoch) = s.parse::<u64>() {
                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();
                if reset_epoch > now {
                    return Some(Duration::from_secs(reset_epoch - now));
                }
            }
        }
    }
    None
}

fn truncate(s: &str, max: usize) -> &str {
    let end = s
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|&i| i <= max)
        .last()
        .unwrap_or(0);
    &s[..end]
}

/// Full-jitter exponential backoff for a transport-error retry attempt,
/// base 500 ms, cap 4 s.
pub fn backoff_delay(attempt: u32) -> Duration {
    const BASE_MS: u64 = 500;
    const CAP_MS: u64 = 4_000;
    let exp = BASE_MS.saturating_mul(1u64 << attempt.min(8)).min(CAP_MS);
    let jittered = if exp == 0 { 0 } else { rand::thread_rng().gen_range(0..=exp) };
    Duration::from_millis(jittered)
}

/// Retry a fallible adapter call: `Transport` errors are retried up to
/// `max_retries` times with backoff; a `RateLimited` whose hint is short
/// is retried once in place; everything else propagates immediately.
pub async fn with_retry<F, Fut>(max_retries: u32, mut call: F) -> Result<CompletionResponse, TypedError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<CompletionResponse, TypedError>>,
{
    let mut attempt = 0;
    let mut retried_rate_limit = false;
    loop {
        match call().await {
            Ok(resp) => return Ok(resp),
            Err(TypedError::Transport(msg)) if attempt < max_retries => {
                tokio::time::sleep(backoff_delay(attempt)).await;
                attempt += 1;
                tracing::warn!(attempt, "transport error, retrying: {msg}");
                continue;
            }
            Err(TypedError::RateLimited { retry_after })
                if !retried_rate_limit && retry_after.map(|d| d <= Duration::from_secs(2)).unwrap_or(false) =>
            {
                retried_rate_limit = true;
                tokio::time::sleep(retry_after.unwrap_or_default()).await;
                continue;
            }
            Err(e) => return Err(e),
        }
    }
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn supports_vision(&self) -> bool {
        false
    }

    async fn complete_text(&self, req: &CompletionRequest) -> Result<CompletionResponse, TypedError>;

    /// Cheap liveness probe used by the background refresh task.
    async fn health(&self) -> Result<(), TypedError>;
}

/// Implemented only by adapters whose `supports_vision()` is true.
#[async_trait]
pub trait VisionAdapter: ProviderAdapter {
    async fn complete_vision(&self, req: &VisionRequest) -> Result<CompletionResponse, TypedError>;
}

/// A registered adapter, known at registration time to be text-only or
/// vision-capable. Keeping the two as distinct variants (rather than an
/// `Arc<dyn ProviderAdapter>` plus a runtime `downcast`) is what lets the
/// Manager call `complete_vision` only where the type system already
/// knows it exists.
#[derive(Clone)]
pub enum AdapterHandle {
    Text(Arc<dyn ProviderAdapter>),
    Vision(Arc<dyn VisionAdapter>),
}

impl AdapterHandle {
    pub fn name(&self) -> &str {
        match self {
            AdapterHandle::Text(a) => a.name(),
            AdapterHandle::Vision(a) => a.name(),
        }
    }

    pub fn supports_vision(&self) -> bool {
        matches!(self, AdapterHandle::Vision(_))
    }

    pub async fn complete_text(&self, req: &CompletionRequest) -> Result<CompletionResponse, TypedError> {
        match self {
            AdapterHandle::Text(a) => a.complete_text(req).await,
            AdapterHandle::Vision(a) => a.complete_text(req).await,
        }
    }

    pub async fn complete_vision(&self, req: &VisionRequest) -> Result<CompletionResponse, TypedError> {
        match self {
            AdapterHandle::Text(_) => Err(TypedError::Fatal("provider has no vision capability".into())),
            AdapterHandle::Vision(a) => a.complete_vision(req).await,
        }
    }

    pub async fn health(&self) -> Result<(), TypedError> {
        match self {
            AdapterHandle::Text(a) => a.health().await,
            AdapterHandle::Vision(a) => a.health().await,
        }
    }
}
