use webrover_core::{Config, Paths};

/// Show the effective configuration (file plus environment) as pretty JSON.
pub async fn show() -> anyhow::Result<()> {
    let paths = Paths::new();
    let mut config = Config::load_or_default(&paths)?;
    config.apply_env();
    let mut json = serde_json::to_value(&config)?;
    mask_api_keys(&mut json);

    println!();
    println!("Current configuration");
    println!("  File: {}", paths.config_file().display());
    println!();
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

pub async fn path() -> anyhow::Result<()> {
    println!("{}", Paths::new().config_file().display());
    Ok(())
}

/// Keep the last four characters of every provider key.
fn mask_api_keys(json: &mut serde_json::Value) {
    let Some(providers) = json.get_mut("providers").and_then(|p| p.as_object_mut()) else {
        return;
    };
    for provider in providers.values_mut() {
        if let Some(key) = provider.get_mut("apiKey") {
            if let Some(raw) = key.as_str() {
                if !raw.is_empty() {
                    let tail: String = raw.chars().rev().take(4).collect::<Vec<_>>().into_iter().rev().collect();
                    *key = serde_json::Value::String(format!("****{}", tail));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_api_keys() {
        let mut json = serde_json::json!({
            "providers": {
                "openai": {"apiKey": "sk-secret-1234"},
                "ollama": {"apiKey": ""}
            }
        });
        mask_api_keys(&mut json);
        assert_eq!(json["providers"]["openai"]["apiKey"], "****1234");
        assert_eq!(json["providers"]["ollama"]["apiKey"], "");
    }
}
