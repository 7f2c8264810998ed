use tracing::info;
use webrover_agent::{AgentRuntime, LineOperator, OperatorMode, RuntimeSettings};
use webrover_core::{Config, Paths};
use webrover_providers::{create_main_provider, Provider};
use webrover_storage::TranscriptStore;
use webrover_tools::browser::CdpPage;

/// Flags of `webrover agent`.
#[derive(Debug, Default)]
pub struct AgentOptions {
    pub task: Option<String>,
    pub model: Option<String>,
    pub limit: Option<usize>,
    pub headless: Option<bool>,
    pub debug: bool,
    pub autopilot: bool,
}

/// Command-line flags win over the config file.
fn apply_overrides(config: &mut Config, options: &AgentOptions) {
    if let Some(model) = &options.model {
        config.agents.defaults.model = model.clone();
    }
    if let Some(limit) = options.limit {
        config.agents.defaults.context_length_limit = limit;
    }
    if let Some(headless) = options.headless {
        config.browser.headless = headless;
    }
}

pub async fn run(options: AgentOptions) -> anyhow::Result<()> {
    let paths = Paths::new();
    paths.ensure_dirs()?;

    let mut config = Config::load_or_default(&paths)?;
    config.apply_env();
    apply_overrides(&mut config, &options);

    // Fails on a missing API key before the browser is started.
    let provider = create_main_provider(&config)?;
    info!(
        model = %provider.model(),
        headless = config.browser.headless,
        autopilot = options.autopilot,
        "Starting agent"
    );

    let mode = if options.autopilot {
        OperatorMode::Autopilot
    } else {
        OperatorMode::Interactive
    };
    let operator = LineOperator::stdio(mode);

    let page = CdpPage::launch(&config.browser, &paths).await?;
    let settings = RuntimeSettings::from_config(&config, &paths);

    let mut runtime = AgentRuntime::new(provider, Box::new(page), Box::new(operator), settings);
    if options.debug {
        runtime = runtime.with_transcripts(TranscriptStore::new(paths.clone()));
        if let Some(id) = runtime.transcript_id() {
            eprintln!("Transcript: {}", paths.transcript_file(id).display());
        }
    }

    runtime.run(options.task).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let mut config = Config::default();
        let options = AgentOptions {
            model: Some("gpt-4o".into()),
            limit: Some(8000),
            headless: Some(true),
            ..Default::default()
        };
        apply_overrides(&mut config, &options);
        assert_eq!(config.agents.defaults.model, "gpt-4o");
        assert_eq!(config.agents.defaults.context_length_limit, 8000);
        assert!(config.browser.headless);
    }

    #[test]
    fn test_absent_flags_keep_config() {
        let mut config = Config::default();
        let before = config.agents.defaults.model.clone();
        apply_overrides(&mut config, &AgentOptions::default());
        assert_eq!(config.agents.defaults.model, before);
        assert_eq!(config.browser.headless, Config::default().browser.headless);
    }
}
