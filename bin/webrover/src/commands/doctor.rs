use webrover_core::{Config, Paths};
use webrover_providers::infer_provider_from_model;
use webrover_tools::browser::find_browser_binary;

/// Run environment diagnostics.
pub async fn run() -> anyhow::Result<()> {
    let paths = Paths::new();

    println!();
    println!("webrover doctor");
    println!("================================");
    println!();

    let mut ok_count = 0u32;
    let mut warn_count = 0u32;
    let mut err_count = 0u32;

    // --- 1. Config ---
    println!("Configuration");
    if paths.config_file().exists() {
        print_ok("Config file exists", &paths.config_file().display().to_string());
        ok_count += 1;
    } else {
        print_warn("Config file not found", "Built-in defaults are used");
        warn_count += 1;
    }

    let mut config = Config::load_or_default(&paths)?;
    config.apply_env();

    let model = &config.agents.defaults.model;
    let provider_name = config
        .agents
        .defaults
        .provider
        .as_deref()
        .or_else(|| infer_provider_from_model(model));
    let key_present = match provider_name {
        Some(name) => config.get_provider(name).map(|p| !p.api_key.is_empty()).unwrap_or(false),
        None => config.get_api_key().is_some(),
    };
    if key_present {
        print_ok("API key configured", &format!("Provider: {}", provider_name.unwrap_or("first configured")));
        ok_count += 1;
    } else if provider_name == Some("ollama") {
        print_ok("Local provider", "ollama needs no API key");
        ok_count += 1;
    } else {
        print_err("No API key configured", "Set OPENAI_API_KEY or add a provider key to config.json");
        err_count += 1;
    }

    println!("  Model: {}", model);
    println!("  Context length limit: {}", config.agents.defaults.context_length_limit);
    println!();

    // --- 2. Browser ---
    println!("Browser");
    let binary = config
        .browser
        .executable_path
        .clone()
        .filter(|p| std::path::Path::new(p).exists())
        .or_else(find_browser_binary);
    match binary {
        Some(path) => {
            print_ok("Chrome/Chromium found", &path);
            ok_count += 1;
        }
        None => {
            print_err("Chrome/Chromium not found", "Install Chrome or set browser.executablePath");
            err_count += 1;
        }
    }
    println!("  Headless: {}", config.browser.headless);
    println!();

    // --- 3. Directories ---
    println!("Directories");
    for (label, dir) in [
        ("Workspace", paths.workspace()),
        ("Transcripts", paths.transcripts_dir()),
        ("Downloads", paths.downloads_dir()),
    ] {
        if !dir.exists() {
            print_warn(&format!("{} directory not created yet", label), "Created on first agent run");
            warn_count += 1;
            continue;
        }
        let probe = dir.join(".doctor_test");
        match std::fs::write(&probe, "test") {
            Ok(_) => {
                let _ = std::fs::remove_file(&probe);
                print_ok(&format!("{} writable", label), &dir.display().to_string());
                ok_count += 1;
            }
            Err(e) => {
                print_err(&format!("{} not writable", label), &e.to_string());
                err_count += 1;
            }
        }
    }
    println!();

    // --- Summary ---
    println!("--------------------------------");
    println!("  {} passed, {} warnings, {} errors", ok_count, warn_count, err_count);
    if err_count > 0 {
        println!();
        println!("  {} error(s) must be fixed before the agent can run.", err_count);
    }
    println!();

    Ok(())
}

fn print_ok(label: &str, detail: &str) {
    if detail.is_empty() {
        println!("  [ok]   {}", label);
    } else {
        println!("  [ok]   {}: {}", label, detail);
    }
}

fn print_warn(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  [warn] {}", label);
    } else {
        println!("  [warn] {}: {}", label, hint);
    }
}

fn print_err(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  [err]  {}", label);
    } else {
        println!("  [err]  {}: {}", label, hint);
    }
}
