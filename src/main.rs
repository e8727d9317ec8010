//! Multi-provider OCR text-enhancement core — demo entry point.
//!
//! Wires the Configuration Resolver into a Provider Registry, hands that
//! to the Provider Manager, starts its background health probe, and
//! drives one Orchestrator call against stdin so the whole pipeline can
//! be exercised end to end without a surrounding HTTP service.

use std::io::Read as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod adapters;
mod classify;
mod config;
mod manager;
mod orchestrator;
mod prompts;
mod registry;
mod types;

use adapters::deepseek::DeepSeekAdapter;
use adapters::gemini::GeminiAdapter;
use adapters::groq::GroqAdapter;
use adapters::local::LocalLlmAdapter;
use adapters::{AdapterHandle, ProviderAdapter, VisionAdapter};
use config::EnhancementConfig;
use manager::Manager;
use orchestrator::Orchestrator;
use registry::Registry;
use types::{EnhancementRequest, ProviderConfig, ProviderStatus};

const BACKGROUND_REFRESH_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "enhancer=info".into()),
        )
        .with_target(false)
        .init();

    info!("multi-provider text-enhancement core starting");

    let yaml_path = std::env::var("ENHANCEMENT_CONFIG_PATH").ok().map(std::path::PathBuf::from);
    let config = EnhancementConfig::from_env(yaml_path.as_deref()).context("failed to resolve configuration")?;

    let enabled_count = config.enabled_providers().len();
    info!(enabled_providers = enabled_count, "configuration resolved");

    let registry = Arc::new(build_registry(&config.providers));
    let manager = Arc::new(Manager::new(registry));

    let background = Arc::clone(&manager);
    tokio::spawn(async move {
        background.run_background_refresh(BACKGROUND_REFRESH_INTERVAL).await;
    });

    let orchestrator = Orchestrator::new(Arc::clone(&manager), config.enabled, config.use_vision_when_available);

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("reading OCR text from stdin")?;
    let input = input.trim();

    if input.is_empty() {
        info!("no stdin input provided — reporting provider health snapshot only");
    } else {
        let cancel = CancellationToken::new();
        let ctrl_c_cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                ctrl_c_cancel.cancel();
            }
        });
        let result = orchestrator.enhance(EnhancementRequest::new(input), &cancel).await;
        print_result(&result);
    }

    for status in manager.registry().status_snapshot() {
        info!(
            provider = %status.name,
            available = status.available,
            cause = status.last_error_cause.map(|c| c.as_str()).unwrap_or("none"),
            "provider status"
        );
    }

    Ok(())
}

fn build_registry(configs: &[ProviderConfig]) -> Registry {
    let mut entries = Vec::new();
    for cfg in configs {
        if !cfg.enabled {
            continue;
        }
        let supports_vision = cfg.supports_vision();
        let status = ProviderStatus::healthy(&cfg.name, supports_vision);
        let handle = make_adapter(cfg, supports_vision);
        entries.push((handle, status, cfg.priority));
    }
    Registry::new(entries)
}

fn make_adapter(cfg: &ProviderConfig, supports_vision: bool) -> AdapterHandle {
    match cfg.name.as_str() {
        "groq" => AdapterHandle::Text(Arc::new(GroqAdapter::new(cfg.clone())) as Arc<dyn ProviderAdapter>),
        "deepseek" => AdapterHandle::Text(Arc::new(DeepSeekAdapter::new(cfg.clone())) as Arc<dyn ProviderAdapter>),
        "gemini" if supports_vision => {
            AdapterHandle::Vision(Arc::new(GeminiAdapter::new(cfg.clone())) as Arc<dyn VisionAdapter>)
        }
        "gemini" => AdapterHandle::Text(Arc::new(GeminiAdapter::new(cfg.clone())) as Arc<dyn ProviderAdapter>),
        "local" if supports_vision => {
            AdapterHandle::Vision(Arc::new(LocalLlmAdapter::new(cfg.clone())) as Arc<dyn VisionAdapter>)
        }
        _ => AdapterHandle::Text(Arc::new(LocalLlmAdapter::new(cfg.clone())) as Arc<dyn ProviderAdapter>),
    }
}

fn print_result(result: &types::EnhancementResult) {
    info!(
        document_type = result.document_type.as_str(),
        provider = result.provider_used.as_deref().unwrap_or("none"),
        fallback_occurred = result.fallback_occurred,
        elapsed_ms = result.elapsed_ms,
        "enhancement complete"
    );
    match &result.enhanced_text {
        Some(text) => println!("{text}"),
        None => {
            println!("{}", result.original_text);
            if let Some(reason) = &result.error_message {
                info!(reason = %reason, "no enhancement applied");
            }
        }
    }
}
