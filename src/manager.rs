//! Provider Manager — priority-ordered dispatch with quota detection,
//! cooldowns, and sticky success-caching.
//!
//! The selection loop is grounded on the pool manager's walk-with-fallback
//! pattern, generalized from per-key round-robin within one provider to
//! cross-provider priority ordering with a single sticky-preferred slot.
//! The background refresh task is grounded on the discovery poller's
//! periodic full-scan loop, shortened from a daily cadence to a default
//! ten minutes since there is no model catalog to refresh here — only
//! liveness.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::{Arc, RwLock};
use tokio::time::{self, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::adapters::{CompletionRequest, Message, TypedError, VisionRequest};
use crate::registry::Registry;
use crate::types::{DocumentType, ErrorCause};

const DEFAULT_QUOTA_COOLDOWN_SECS: i64 = 3600;
const DEFAULT_RATE_COOLDOWN_SECS: i64 = 60;
const DEFAULT_TRANSIENT_COOLDOWN_SECS: i64 = 300;

/// What `Manager::enhance` returns on success.
pub struct ManagerOutcome {
    pub provider_name: String,
    pub model_name: String,
    pub response_text: String,
    pub latency_ms: u64,
    pub tokens_in: Option<u64>,
    pub tokens_out: Option<u64>,
    pub fallback_occurred: bool,
}

/// Every adapter in the walk failed; carries one message per attempt so
/// the Orchestrator can summarize the chain.
#[derive(Debug, Clone)]
pub struct AllFailed {
    pub causes: Vec<(String, String)>,
}

/// The three caller-visible outcomes of `Manager::enhance`.
pub enum EnhanceOutcome {
    Success(ManagerOutcome),
    AllFailed(AllFailed),
    /// The cancellation token fired between attempts. No adapter was
    /// invoked after the check, and its status was left untouched.
    Cancelled,
}

pub struct Manager {
    registry: Arc<Registry>,
    sticky_preferred: RwLock<Option<String>>,
}

impl Manager {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            sticky_preferred: RwLock::new(None),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn sticky(&self) -> Option<String> {
        self.sticky_preferred.read().expect("sticky lock poisoned").clone()
    }

    fn set_sticky(&self, name: Option<String>) {
        *self.sticky_preferred.write().expect("sticky lock poisoned") = name;
    }

    /// Build the ordered attempt list: eligible (cooldown-expired or
    /// healthy) providers, sticky-preferred first, vision-capable
    /// partitioned ahead of text-only when vision is desired.
    fn eligible_ordered(&self, prefer_vision: bool, has_image: bool) -> Vec<String> {
        let now = Utc::now();
        let mut eligible: Vec<String> = self
            .registry
            .by_priority()
            .into_iter()
            .filter(|name| {
                self.registry
                    .status_of(name)
                    .map(|s| s.is_eligible(now))
                    .unwrap_or(false)
            })
            .collect();

        if let Some(sticky) = self.sticky() {
            if let Some(pos) = eligible.iter().position(|n| n == &sticky) {
                let name = eligible.remove(pos);
                eligible.insert(0, name);
            }
        }

        if prefer_vision && has_image {
            let (vision, text_only): (Vec<_>, Vec<_>) = eligible.into_iter().partition(|n| {
                self.registry
                    .status_of(n)
                    .map(|s| s.supports_vision)
                    .unwrap_or(false)
            });
            eligible = vision.into_iter().chain(text_only).collect();
        }

        eligible
    }

    /// `retry_after`/`reset_hint` override the defaults when the adapter
    /// parsed one off the failing response (header or vendor-specific
    /// retry detail); otherwise fall back to the fixed durations.
    fn cooldown_for(
        cause: ErrorCause,
        now: DateTime<Utc>,
        retry_after: Option<Duration>,
        reset_hint: Option<&str>,
    ) -> Option<DateTime<Utc>> {
        match cause {
            ErrorCause::QuotaExceeded => {
                let secs = reset_hint
                    .and_then(|h| h.trim_end_matches('s').parse::<i64>().ok())
                    .unwrap_or(DEFAULT_QUOTA_COOLDOWN_SECS);
                Some(now + ChronoDuration::seconds(secs))
            }
            ErrorCause::RateLimited => {
                let secs = retry_after.map(|d| d.as_secs() as i64).unwrap_or(DEFAULT_RATE_COOLDOWN_SECS);
                Some(now + ChronoDuration::seconds(secs))
            }
            ErrorCause::Transport | ErrorCause::BadResponse => {
                Some(now + ChronoDuration::seconds(DEFAULT_TRANSIENT_COOLDOWN_SECS))
            }
            ErrorCause::InvalidAuth | ErrorCause::Fatal => None, // disabled for the session
        }
    }

    fn record_failure(&self, name: &str, error: &TypedError) {
        let now = Utc::now();
        let (cause, reset_hint, retry_after) = match error {
            TypedError::InvalidAuth => (ErrorCause::InvalidAuth, None, None),
            TypedError::QuotaExceeded { reset_hint } => (ErrorCause::QuotaExceeded, reset_hint.clone(), None),
            TypedError::RateLimited { retry_after } => (ErrorCause::RateLimited, None, *retry_after),
            TypedError::Transport(_) => (ErrorCause::Transport, None, None),
            TypedError::BadResponse(_) => (ErrorCause::BadResponse, None, None),
            TypedError::Fatal(_) => (ErrorCause::Fatal, None, None),
        };
        let cooldown_until = Self::cooldown_for(cause, now, retry_after, reset_hint.as_deref());
        if let Some(mut status) = self.registry.status_of(name) {
            status.mark_failure(cause, cooldown_until, reset_hint, now);
            self.registry.update(name, status);
        }
        warn!(provider = %name, cause = cause.as_str(), "provider attempt failed");

        if self.sticky().as_deref() == Some(name) {
            self.set_sticky(None);
        }
    }

    fn record_success(&self, name: &str, latency_ms: u64) {
        let now = Utc::now();
        if let Some(mut status) = self.registry.status_of(name) {
            status.mark_success(latency_ms, now);
            self.registry.update(name, status);
        }
        self.set_sticky(Some(name.to_string()));
        info!(provider = %name, "provider succeeded, set as sticky preferred");
    }

    /// Walk the eligible list, attempting each provider until one
    /// succeeds, the list is exhausted, or `cancel` fires. The
    /// cancellation check happens only between attempts — it never
    /// interrupts one already in flight — so an adapter whose status was
    /// already updated this call stays updated; only the attempt that
    /// would have come next is skipped.
    pub async fn enhance(
        &self,
        messages: Vec<Message>,
        document_type: DocumentType,
        image: Option<(Vec<u8>, String)>,
        prefer_vision: bool,
        max_tokens: u32,
        cancel: &CancellationToken,
    ) -> EnhanceOutcome {
        let ordered = self.eligible_ordered(prefer_vision, image.is_some());
        let mut causes = Vec::new();

        for (idx, name) in ordered.iter().enumerate() {
            if cancel.is_cancelled() {
                return EnhanceOutcome::Cancelled;
            }

            let adapter = match self.registry.adapter(name) {
                Some(a) => a,
                None => continue,
            };

            let use_vision = prefer_vision && image.is_some() && adapter.supports_vision();
            let result = if use_vision {
                let (bytes, mime) = image.clone().expect("checked by use_vision");
                let prompt = messages
                    .iter()
                    .map(|m| m.content.as_str())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                adapter
                    .complete_vision(&VisionRequest {
                        prompt,
                        image_bytes: bytes,
                        mime_type: mime,
                        model: None,
                        max_tokens,
                    })
                    .await
            } else {
                adapter
                    .complete_text(&CompletionRequest {
                        messages: messages.clone(),
                        model: None,
                        temperature: 0.1,
                        max_tokens,
                        document_type,
                    })
                    .await
            };

            match result {
                Ok(resp) => {
                    self.record_success(name, resp.latency_ms);
                    return EnhanceOutcome::Success(ManagerOutcome {
                        provider_name: name.clone(),
                        model_name: resp.model,
                        response_text: resp.text,
                        latency_ms: resp.latency_ms,
                        tokens_in: resp.tokens_in,
                        tokens_out: resp.tokens_out,
                        fallback_occurred: idx > 0,
                    });
                }
                Err(err) => {
                    causes.push((name.clone(), err.to_string()));
                    self.record_failure(name, &err);
                }
            }
        }

        EnhanceOutcome::AllFailed(AllFailed { causes })
    }

    /// Probe every provider whose cooldown has expired or is close to
    /// expiring, so the next `enhance` call sees fresh eligibility
    /// without spending a trial request on it.
    pub async fn refresh_once(&self) {
        let now = Utc::now();
        for name in self.registry.names() {
            let status = match self.registry.status_of(&name) {
                Some(s) => s,
                None => continue,
            };
            if status.available {
                continue;
            }
            let due = status
                .cooldown_until
                .map(|until| until <= now + ChronoDuration::seconds(60))
                .unwrap_or(false);
            if !due {
                continue;
            }
            let adapter = match self.registry.adapter(&name) {
                Some(a) => a,
                None => continue,
            };
            match adapter.health().await {
                Ok(()) => {
                    let mut refreshed = status;
                    refreshed.mark_success(0, now);
                    self.registry.update(&name, refreshed);
                    info!(provider = %name, "background probe: provider healthy again");
                }
                Err(err) => {
                    self.record_failure(&name, &err);
                }
            }
        }
    }

    /// Run the periodic background refresh. Runs once immediately, then
    /// on every tick of `interval`.
    pub async fn run_background_refresh(self: Arc<Self>, interval: Duration) {
        info!("provider health probe starting — initial scan");
        self.refresh_once().await;

        let mut ticker = time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            info!("running scheduled provider health probe");
            self.refresh_once().await;
        }
    }
}
