//! Core data model — provider configuration, live status, and the
//! request/result pair that crosses the Orchestrator boundary.

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Static, immutable configuration for one provider. Built once at
/// startup by the Configuration Resolver and never mutated.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub enabled: bool,
    pub credential: Option<String>,
    pub base_url: String,
    pub text_model: String,
    pub vision_model: Option<String>,
    /// A code-specialized model, used instead of `text_model` for
    /// `DocumentType::Code` where the provider offers one.
    pub code_model: Option<String>,
    pub priority: i32,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl ProviderConfig {
    pub fn supports_vision(&self) -> bool {
        self.vision_model.is_some()
    }
}

/// The closed set of causes a provider can fail for. `ProviderStatus`
/// carries at most one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCause {
    InvalidAuth,
    QuotaExceeded,
    RateLimited,
    Transport,
    BadResponse,
    Fatal,
}

impl ErrorCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCause::InvalidAuth => "invalid_auth",
            ErrorCause::QuotaExceeded => "quota_exceeded",
            ErrorCause::RateLimited => "rate_limited",
            ErrorCause::Transport => "transport",
            ErrorCause::BadResponse => "bad_response",
            ErrorCause::Fatal => "fatal",
        }
    }
}

/// Live health record for one provider. Owned exclusively by the
/// Provider Manager; the Registry only stores and returns copies.
#[derive(Debug, Clone)]
pub struct ProviderStatus {
    pub name: String,
    pub available: bool,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_latency_ms: Option<u64>,
    pub last_error_cause: Option<ErrorCause>,
    pub cooldown_until: Option<DateTime<Utc>>,
    pub quota_reset_hint: Option<String>,
    pub supports_vision: bool,
}

impl ProviderStatus {
    pub fn healthy(name: &str, supports_vision: bool) -> Self {
        Self {
            name: name.to_string(),
            available: true,
            last_checked_at: None,
            last_latency_ms: None,
            last_error_cause: None,
            cooldown_until: None,
            quota_reset_hint: None,
            supports_vision,
        }
    }

    /// A cooldown that has already expired re-enables trial even though
    /// `available` is still false until the next successful attempt.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        if self.available {
            return true;
        }
        match self.cooldown_until {
            Some(until) => until <= now,
            None => false,
        }
    }

    pub fn mark_success(&mut self, latency_ms: u64, now: DateTime<Utc>) {
        self.available = true;
        self.last_checked_at = Some(now);
        self.last_latency_ms = Some(latency_ms);
        self.last_error_cause = None;
        self.cooldown_until = None;
        self.quota_reset_hint = None;
    }

    pub fn mark_failure(
        &mut self,
        cause: ErrorCause,
        cooldown_until: Option<DateTime<Utc>>,
        quota_reset_hint: Option<String>,
        now: DateTime<Utc>,
    ) {
        self.available = false;
        self.last_checked_at = Some(now);
        self.last_error_cause = Some(cause);
        self.cooldown_until = cooldown_until;
        self.quota_reset_hint = quota_reset_hint;
    }
}

/// The closed document-type enumeration. New values require a new
/// prompt template in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocumentType {
    General,
    Code,
    Invoice,
    Form,
    Handwritten,
    Multilingual,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::General => "general",
            DocumentType::Code => "code",
            DocumentType::Invoice => "invoice",
            DocumentType::Form => "form",
            DocumentType::Handwritten => "handwritten",
            DocumentType::Multilingual => "multilingual",
        }
    }
}

/// Input to `Orchestrator::enhance`.
#[derive(Debug, Clone)]
pub struct EnhancementRequest {
    pub text: String,
    /// `None` asks the Orchestrator to classify the document itself.
    pub document_type: Option<DocumentType>,
    pub image_bytes: Option<Vec<u8>>,
    pub image_mime_type: Option<String>,
    pub prefer_vision: bool,
    pub already_enhanced: bool,
}

impl EnhancementRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            document_type: None,
            image_bytes: None,
            image_mime_type: None,
            prefer_vision: true,
            already_enhanced: false,
        }
    }
}

/// Output of `Orchestrator::enhance`. `original_text` is always
/// populated, even when every provider failed.
#[derive(Debug, Clone)]
pub struct EnhancementResult {
    pub original_text: String,
    pub enhanced_text: Option<String>,
    pub provider_used: Option<String>,
    pub model_used: Option<String>,
    pub document_type: DocumentType,
    pub elapsed_ms: u64,
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
    pub improvements: Vec<String>,
    pub fallback_occurred: bool,
    pub error_message: Option<String>,
    /// Set when the call returned the `Cancelled` outcome rather than a
    /// success or an `AllFailed` chain. No provider status was touched by
    /// the attempt that was in flight when cancellation was observed.
    pub cancelled: bool,
}

impl EnhancementResult {
    pub fn passthrough(original_text: String, document_type: DocumentType, reason: &str) -> Self {
        Self {
            original_text,
            enhanced_text: None,
            provider_used: None,
            model_used: None,
            document_type,
            elapsed_ms: 0,
            tokens_in: None,
            tokens_out: None,
            improvements: Vec::new(),
            fallback_occurred: false,
            error_message: Some(reason.to_string()),
            cancelled: false,
        }
    }

    pub fn cancelled(original_text: String, document_type: DocumentType) -> Self {
        Self {
            original_text,
            enhanced_text: None,
            provider_used: None,
            model_used: None,
            document_type,
            elapsed_ms: 0,
            tokens_in: None,
            tokens_out: None,
            improvements: Vec::new(),
            fallback_occurred: false,
            error_message: Some("cancelled before completion".to_string()),
            cancelled: true,
        }
    }
}
