//! Enhancement Orchestrator — the single entry point of this crate.
//!
//! Classifies the document, renders a prompt, dispatches to the Provider
//! Manager, validates the response, and always returns the original text
//! alongside whatever enhancement (if any) was produced.

use std::sync::Arc;
use std::time::Instant;

use once_cell::sync::Lazy;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::adapters::Message;
use crate::classify;
use crate::manager::{EnhanceOutcome, Manager};
use crate::prompts;
use crate::types::{DocumentType, EnhancementRequest, EnhancementResult};

static MIXED_ALNUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[A-Za-z]*\d[A-Za-z]+\b|\b[A-Za-z]+\d[A-Za-z]*\b").unwrap());
static DIACRITIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[À-ÿĀ-žḀ-ỿ]").unwrap());

pub struct Orchestrator {
    manager: Arc<Manager>,
    enabled: bool,
    use_vision_when_available: bool,
}

impl Orchestrator {
    pub fn new(manager: Arc<Manager>, enabled: bool, use_vision_when_available: bool) -> Self {
        Self {
            manager,
            enabled,
            use_vision_when_available,
        }
    }

    pub async fn enhance(&self, request: EnhancementRequest, cancel: &CancellationToken) -> EnhancementResult {
        let fallback_document_type = request.document_type.unwrap_or(DocumentType::General);

        if request.already_enhanced {
            return EnhancementResult::passthrough(
                request.text,
                fallback_document_type,
                "already enhanced — skipping a second pass",
            );
        }
        if !self.enabled {
            return EnhancementResult::passthrough(request.text, fallback_document_type, "enhancement disabled");
        }
        if cancel.is_cancelled() {
            return EnhancementResult::cancelled(request.text, fallback_document_type);
        }

        let start = Instant::now();
        let document_type = request
            .document_type
            .unwrap_or_else(|| classify::classify(&request.text));

        let rendered = prompts::render(document_type, &request.text);
        let messages = vec![Message::system(rendered.system.clone()), Message::user(rendered.user.clone())];

        let prefer_vision =
            self.use_vision_when_available && request.prefer_vision && request.image_bytes.is_some();
        let image = match (&request.image_bytes, &request.image_mime_type) {
            (Some(bytes), Some(mime)) => Some((bytes.clone(), mime.clone())),
            _ => None,
        };
        let max_tokens = estimate_max_tokens(&request.text);

        match self
            .manager
            .enhance(messages, document_type, image, prefer_vision, max_tokens, cancel)
            .await
        {
            EnhanceOutcome::Cancelled => EnhancementResult::cancelled(request.text, document_type),
            EnhanceOutcome::Success(outcome) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                if let Err(reason) = validate_response(&rendered.user, &request.text, &outcome.response_text) {
                    return EnhancementResult {
                        original_text: request.text,
                        enhanced_text: None,
                        provider_used: Some(outcome.provider_name),
                        model_used: Some(outcome.model_name),
                        document_type,
                        elapsed_ms,
                        tokens_in: outcome.tokens_in,
                        tokens_out: outcome.tokens_out,
                        improvements: Vec::new(),
                        fallback_occurred: outcome.fallback_occurred,
                        error_message: Some(reason),
                        cancelled: false,
                    };
                }

                let improvements = compute_improvements(&request.text, &outcome.response_text);
                EnhancementResult {
                    original_text: request.text,
                    enhanced_text: Some(outcome.response_text),
                    provider_used: Some(outcome.provider_name),
                    model_used: Some(outcome.model_name),
                    document_type,
                    elapsed_ms,
                    tokens_in: outcome.tokens_in,
                    tokens_out: outcome.tokens_out,
                    improvements,
                    fallback_occurred: outcome.fallback_occurred,
                    error_message: None,
                    cancelled: false,
                }
            }
            EnhanceOutcome::AllFailed(all_failed) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                let summary = all_failed
                    .causes
                    .iter()
                    .map(|(provider, message)| format!("{provider}: {message}"))
                    .collect::<Vec<_>>()
                    .join("; ");
                EnhancementResult {
                    original_text: request.text,
                    enhanced_text: None,
                    provider_used: None,
                    model_used: None,
                    document_type,
                    elapsed_ms,
                    tokens_in: None,
                    tokens_out: None,
                    improvements: Vec::new(),
                    fallback_occurred: !all_failed.causes.is_empty(),
                    error_message: Some(if summary.is_empty() {
                        "no providers available".to_string()
                    } else {
                        summary
                    }),
                    cancelled: false,
                }
            }
        }
    }
}

fn estimate_max_tokens(text: &str) -> u32 {
    let estimated_input_tokens = (text.chars().count() as f64 / 4.0).ceil() as u32;
    (estimated_input_tokens.saturating_mul(2)).clamp(256, 4096)
}

/// Guards against empty, echoed, or runaway-repetition responses.
fn validate_response(rendered_prompt: &str, original: &str, response: &str) -> Result<(), String> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err("provider returned an empty response".to_string());
    }
    if trimmed == rendered_prompt.trim() {
        return Err("provider echoed the prompt back unchanged".to_string());
    }
    let bound = original.chars().count().max(1) * 10;
    if trimmed.chars().count() > bound {
        return Err("provider response exceeded the 10x input-length sanity bound".to_string());
    }
    Ok(())
}

/// Advisory tags computed by comparing character classes between the
/// original and enhanced text. Never error-bearing.
fn compute_improvements(original: &str, enhanced: &str) -> Vec<String> {
    let mut tags = Vec::new();

    if MIXED_ALNUM.find_iter(original).count() > MIXED_ALNUM.find_iter(enhanced).count() {
        tags.push("digit→letter substitutions corrected".to_string());
    }
    if DIACRITIC.find_iter(enhanced).count() > DIACRITIC.find_iter(original).count() {
        tags.push("diacritics added".to_string());
    }

    let punct_before = original.chars().filter(|c| ".,;:!?".contains(*c)).count();
    let punct_after = enhanced.chars().filter(|c| ".,;:!?".contains(*c)).count();
    if punct_after > punct_before {
        tags.push("punctuation added".to_string());
    }

    if blank_line_runs(original) > blank_line_runs(enhanced) {
        tags.push("line breaks normalized".to_string());
    }

    tags
}

fn blank_line_runs(text: &str) -> usize {
    let lines: Vec<&str> = text.lines().collect();
    lines
        .windows(2)
        .filter(|w| w[0].trim().is_empty() && w[1].trim().is_empty())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{
        AdapterHandle, CompletionRequest, CompletionResponse, ProviderAdapter, TypedError, VisionAdapter,
        VisionRequest,
    };
    use crate::registry::Registry;
    use crate::types::ProviderStatus;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    /// A scripted adapter: returns its queued results in order, one per
    /// call, and records how many times it was invoked.
    struct MockAdapter {
        name: String,
        vision: bool,
        script: Mutex<Vec<Result<&'static str, TypedError>>>,
        calls: Mutex<u32>,
        /// When set, firing this token as a side effect of being invoked
        /// simulates cancellation racing with an in-flight attempt.
        cancel_on_call: Option<CancellationToken>,
    }

    impl MockAdapter {
        fn new(name: &str, vision: bool, script: Vec<Result<&'static str, TypedError>>) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                vision,
                script: Mutex::new(script),
                calls: Mutex::new(0),
                cancel_on_call: None,
            })
        }

        fn new_cancelling(
            name: &str,
            script: Vec<Result<&'static str, TypedError>>,
            cancel: CancellationToken,
        ) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                vision: false,
                script: Mutex::new(script),
                calls: Mutex::new(0),
                cancel_on_call: Some(cancel),
            })
        }

        fn call_count(&self) -> u32 {
            *self.calls.lock().unwrap()
        }

        fn next(&self) -> Result<CompletionResponse, TypedError> {
            *self.calls.lock().unwrap() += 1;
            if let Some(token) = &self.cancel_on_call {
                token.cancel();
            }
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                return Err(TypedError::Fatal("mock exhausted".into()));
            }
            match script.remove(0) {
                Ok(text) => Ok(CompletionResponse {
                    text: text.to_string(),
                    model: "mock-model".to_string(),
                    latency_ms: 1,
                    tokens_in: Some(10),
                    tokens_out: Some(10),
                }),
                Err(e) => Err(e),
            }
        }
    }

    #[async_trait]
    impl ProviderAdapter for MockAdapter {
        fn name(&self) -> &str {
            &self.name
        }
        fn supports_vision(&self) -> bool {
            self.vision
        }
        async fn complete_text(&self, _req: &CompletionRequest) -> Result<CompletionResponse, TypedError> {
            self.next()
        }
        async fn health(&self) -> Result<(), TypedError> {
            Ok(())
        }
    }

    #[async_trait]
    impl VisionAdapter for MockAdapter {
        async fn complete_vision(&self, _req: &VisionRequest) -> Result<CompletionResponse, TypedError> {
            self.next()
        }
    }

    fn make_orchestrator(entries: Vec<(Arc<MockAdapter>, i32)>) -> (Orchestrator, Vec<Arc<MockAdapter>>) {
        let mocks: Vec<Arc<MockAdapter>> = entries.iter().map(|(a, _)| Arc::clone(a)).collect();
        let registry_entries = entries
            .into_iter()
            .map(|(a, prio)| {
                let status = ProviderStatus::healthy(&a.name.clone(), a.vision);
                let handle = if a.vision {
                    AdapterHandle::Vision(a as Arc<dyn VisionAdapter>)
                } else {
                    AdapterHandle::Text(a as Arc<dyn ProviderAdapter>)
                };
                (handle, status, prio)
            })
            .collect();
        let registry = Arc::new(Registry::new(registry_entries));
        let manager = Arc::new(Manager::new(registry));
        (Orchestrator::new(manager, true, true), mocks)
    }

    #[tokio::test]
    async fn s1_diacritics_restored_single_provider() {
        let (orch, _mocks) = make_orchestrator(vec![(
            MockAdapter::new("groq", false, vec![Ok("Trường Đại học Bách Khoa Hà Nội")]),
            1,
        )]);
        let result = orch
            .enhance(EnhancementRequest::new("Truong Dai hoc Bach Khoa Ha Noi"), &CancellationToken::new())
            .await;
        assert_eq!(result.enhanced_text.as_deref(), Some("Trường Đại học Bách Khoa Hà Nội"));
        assert_eq!(result.provider_used.as_deref(), Some("groq"));
        assert!(!result.fallback_occurred);
        assert!(result.improvements.contains(&"diacritics added".to_string()));
    }

    #[tokio::test]
    async fn s2_digit_letter_corrections_tagged() {
        let (orch, _mocks) = make_orchestrator(vec![(
            MockAdapter::new("groq", false, vec![Ok("This is a sample document with OCR errors.")]),
            1,
        )]);
        let result = orch
            .enhance(
                EnhancementRequest::new("Th1s 1s a sampl3 d0cument w1th 0CR err0rs."),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.enhanced_text.as_deref(), Some("This is a sample document with OCR errors."));
        assert!(result
            .improvements
            .contains(&"digit→letter substitutions corrected".to_string()));
    }

    #[tokio::test]
    async fn s3_quota_fallback_to_second_provider() {
        let (orch, mocks) = make_orchestrator(vec![
            (
                MockAdapter::new("groq", false, vec![Err(TypedError::RateLimited { retry_after: None })]),
                1,
            ),
            (MockAdapter::new("deepseek", false, vec![Ok("clean correction")]), 2),
        ]);
        let result = orch.enhance(EnhancementRequest::new("ocr text"), &CancellationToken::new()).await;
        assert_eq!(result.provider_used.as_deref(), Some("deepseek"));
        assert!(result.fallback_occurred);
        assert_eq!(mocks[0].call_count(), 1);

        let groq_status = orch.manager.registry().status_of("groq").unwrap();
        assert!(!groq_status.available);
        assert!(groq_status.cooldown_until.is_some());
    }

    #[tokio::test]
    async fn s4_all_providers_fail() {
        let (orch, _mocks) = make_orchestrator(vec![
            (MockAdapter::new("groq", false, vec![Err(TypedError::Transport("timeout".into()))]), 1),
            (MockAdapter::new("deepseek", false, vec![Err(TypedError::Transport("timeout".into()))]), 2),
        ]);
        let original = "ocr text".to_string();
        let result = orch
            .enhance(EnhancementRequest::new(original.clone()), &CancellationToken::new())
            .await;
        assert_eq!(result.original_text, original);
        assert!(result.enhanced_text.is_none());
        assert!(result.error_message.is_some());
    }

    #[tokio::test]
    async fn s5_already_enhanced_guard_skips_every_adapter() {
        let (orch, mocks) = make_orchestrator(vec![(MockAdapter::new("groq", false, vec![Ok("unused")]), 1)]);
        let mut request = EnhancementRequest::new("already corrected text");
        request.already_enhanced = true;
        let result = orch.enhance(request, &CancellationToken::new()).await;
        assert!(result.enhanced_text.is_none());
        assert_eq!(result.original_text, "already corrected text");
        assert_eq!(mocks[0].call_count(), 0);
    }

    #[tokio::test]
    async fn s6_vision_capable_adapter_attempted_first() {
        let (orch, mocks) = make_orchestrator(vec![
            (MockAdapter::new("groq", false, vec![Ok("should not be used")]), 1),
            (MockAdapter::new("gemini", true, vec![Ok("vision result")]), 2),
        ]);
        let mut request = EnhancementRequest::new("ocr text");
        request.image_bytes = Some(vec![1, 2, 3]);
        request.image_mime_type = Some("image/png".to_string());
        request.prefer_vision = true;

        let result = orch.enhance(request, &CancellationToken::new()).await;
        assert_eq!(result.provider_used.as_deref(), Some("gemini"));
        assert_eq!(mocks[0].call_count(), 0);
        assert_eq!(mocks[1].call_count(), 1);
    }

    #[tokio::test]
    async fn enhancement_disabled_short_circuits() {
        let (mut orch, mocks) = make_orchestrator(vec![(MockAdapter::new("groq", false, vec![Ok("unused")]), 1)]);
        orch.enabled = false;
        let result = orch.enhance(EnhancementRequest::new("text"), &CancellationToken::new()).await;
        assert!(result.enhanced_text.is_none());
        assert_eq!(result.error_message.as_deref(), Some("enhancement disabled"));
        assert_eq!(mocks[0].call_count(), 0);
    }

    #[tokio::test]
    async fn s7_cancellation_between_attempts_leaves_next_status_untouched() {
        let cancel = CancellationToken::new();
        let (orch, mocks) = make_orchestrator(vec![
            (
                MockAdapter::new_cancelling(
                    "groq",
                    vec![Err(TypedError::Transport("timeout".into()))],
                    cancel.clone(),
                ),
                1,
            ),
            (MockAdapter::new("deepseek", false, vec![Ok("should never run")]), 2),
        ]);

        let result = orch.enhance(EnhancementRequest::new("ocr text"), &cancel).await;

        assert!(result.cancelled);
        assert!(result.enhanced_text.is_none());
        assert_eq!(mocks[0].call_count(), 1);
        assert_eq!(mocks[1].call_count(), 0);

        let deepseek_status = orch.manager.registry().status_of("deepseek").unwrap();
        assert!(deepseek_status.available);
        assert!(deepseek_status.cooldown_until.is_none());
    }

    #[tokio::test]
    async fn s8_cancelled_before_dispatch_short_circuits() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let (orch, mocks) =
            make_orchestrator(vec![(MockAdapter::new("groq", false, vec![Ok("unused")]), 1)]);

        let result = orch.enhance(EnhancementRequest::new("ocr text"), &cancel).await;

        assert!(result.cancelled);
        assert_eq!(result.original_text, "ocr text");
        assert_eq!(mocks[0].call_count(), 0);
    }
}
