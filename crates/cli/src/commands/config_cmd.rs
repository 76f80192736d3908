//! `repolens config`: Configuration management commands.

use repolens_config::AppConfig;

const REDACTED: &str = "***";

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   warning: {w}");
                }
            }

            println!();
            println!("   Provider:  {}", config.provider.kind);
            println!("   Model:     {}", config.provider.default_model);
            println!("   Store:     {}", config.store.backend);
            println!(
                "   Gateway:   {}:{}",
                config.gateway.host, config.gateway.port
            );
            println!(
                "   Budgets:   {} steps with a GitHub session, {} without",
                config.agent.max_steps_authenticated, config.agent.max_steps_anonymous
            );
        }
        Err(e) => {
            println!("   Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&redacted(config))?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

/// Non-fatal problems worth pointing out.
fn warnings(config: &AppConfig) -> Vec<&'static str> {
    let mut warnings = Vec::new();
    if !config.has_api_key() {
        warnings.push("No model API key set (set REPOLENS_API_KEY, OPENROUTER_API_KEY or OPENAI_API_KEY)");
    }
    if config.github.token.is_none() {
        warnings.push("No GitHub token set; GitHub requests are unauthenticated and rate limited");
    }
    if config.gateway.host == "0.0.0.0" {
        warnings.push("Gateway bound to 0.0.0.0; x-user-id is trusted as sent");
    }
    warnings
}

fn redacted(mut config: AppConfig) -> AppConfig {
    if config.provider.api_key.is_some() {
        config.provider.api_key = Some(REDACTED.into());
    }
    if config.github.token.is_some() {
        config.github.token = Some(REDACTED.into());
    }
    config
}
