use webrover_core::config::ProviderConfig;
use webrover_core::Config;

use crate::{OpenAIProvider, Provider};

/// Default api_base of each OpenAI-compatible provider.
fn default_api_base(provider_name: &str) -> &'static str {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1",
        "deepseek" => "https://api.deepseek.com/v1",
        "groq" => "https://api.groq.com/openai/v1",
        "vllm" => "http://localhost:8000/v1",
        "ollama" => "http://localhost:11434/v1",
        _ => "https://api.openai.com/v1",
    }
}

/// Infer the provider from the model name. `None` means fall back to the
/// first provider with a key.
pub fn infer_provider_from_model(model: &str) -> Option<&'static str> {
    if model.starts_with("ollama/") {
        Some("ollama")
    } else if model.starts_with("openai/")
        || model.starts_with("gpt-")
        || model.starts_with("o1")
        || model.starts_with("o3")
    {
        Some("openai")
    } else if model.starts_with("deepseek") {
        Some("deepseek")
    } else if model.starts_with("groq/") {
        Some("groq")
    } else if model.contains('/') {
        Some("openrouter")
    } else {
        None
    }
}

/// Strip the routing prefix that only selects a provider.
fn wire_model_name<'a>(provider: &str, model: &'a str) -> &'a str {
    match provider {
        "ollama" => model.strip_prefix("ollama/").unwrap_or(model),
        "openai" => model.strip_prefix("openai/").unwrap_or(model),
        "groq" => model.strip_prefix("groq/").unwrap_or(model),
        _ => model,
    }
}

fn needs_api_key(provider: &str) -> bool {
    !matches!(provider, "ollama" | "vllm")
}

/// Create the chat-completion transport.
///
/// Resolution order:
/// 1. `explicit_provider`
/// 2. model name prefix
/// 3. first provider with a configured key
///
/// A provider that needs a key and has none is an error, so a missing
/// `OPENAI_API_KEY` is reported before any session starts.
pub fn create_provider(
    config: &Config,
    model: &str,
    explicit_provider: Option<&str>,
) -> anyhow::Result<Box<dyn Provider>> {
    let max_tokens = config.agents.defaults.max_tokens;
    let temperature = config.agents.defaults.temperature;

    let effective_provider: &str = if let Some(ep) = explicit_provider {
        ep
    } else if let Some(inferred) = infer_provider_from_model(model) {
        inferred
    } else if let Some((name, _)) = config.get_api_key() {
        name
    } else {
        return Err(anyhow::anyhow!(
            "No API key configured. Set OPENAI_API_KEY or add a key to the providers section of the config file."
        ));
    };

    let empty_cfg = ProviderConfig::default();
    let provider_cfg = config.get_provider(effective_provider).unwrap_or(&empty_cfg);

    if needs_api_key(effective_provider) && provider_cfg.api_key.trim().is_empty() {
        return Err(anyhow::anyhow!(
            "Provider '{}' has no API key. Set OPENAI_API_KEY or providers.{}.apiKey in the config file.",
            effective_provider,
            effective_provider
        ));
    }

    let api_base = provider_cfg
        .api_base
        .as_deref()
        .unwrap_or_else(|| default_api_base(effective_provider));

    Ok(Box::new(OpenAIProvider::new_with_proxy(
        &provider_cfg.api_key,
        Some(api_base),
        wire_model_name(effective_provider, model),
        max_tokens,
        temperature,
        config.network.proxy.as_deref(),
    )) as Box<dyn Provider>)
}

/// Provider for the configured default model.
pub fn create_main_provider(config: &Config) -> anyhow::Result<Box<dyn Provider>> {
    let model = &config.agents.defaults.model;
    let explicit_provider = config.agents.defaults.provider.as_deref();
    create_provider(config, model, explicit_provider)
}
