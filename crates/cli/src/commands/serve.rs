//! `repolens serve`: Start the HTTP API server.

use repolens_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    if !config.has_api_key() {
        return Err(super::chat::MISSING_KEY.into());
    }

    println!("RepoLens Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Model:     {}", config.provider.default_model);
    println!("   Store:     {}", config.store.backend);
    println!(
        "   GitHub:    {}",
        if config.github.token.is_some() {
            "server token configured"
        } else {
            "unauthenticated unless x-github-token is sent"
        }
    );

    repolens_gateway::start(config).await?;

    Ok(())
}
