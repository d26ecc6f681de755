//! `zaibridge config`: Show the effective configuration.

use zaibridge_config::AppConfig;
use zaibridge_core::error::Error;
use zaibridge_providers::AnthropicProvider;

use super::chat::describe_error;

pub async fn run(default: bool, check: bool) -> Result<(), Box<dyn std::error::Error>> {
    if default {
        print!("{}", AppConfig::default_toml());
        return Ok(());
    }
    if check {
        return check_connection().await;
    }

    let path = AppConfig::config_dir().join("config.toml");
    match AppConfig::load() {
        Ok(config) => {
            let sampling = config.sampling_params();
            println!("Configuration ({})", path.display());
            println!();
            println!("  API key:        {}", if config.has_api_key() { "set" } else { "missing" });
            println!("  Base URL:       {}", config.base_url);
            println!(
                "  Model:          {}{}",
                sampling.model,
                if config.recommended { " (recommended)" } else { "" }
            );
            println!("  Max tokens:     {}", sampling.max_tokens);
            println!("  Temperature:    {}", sampling.temperature);
            println!("  Max iterations: {}", config.max_iterations);
            println!("  Timeout:        {}s", config.timeout_secs);
            println!(
                "  Memory:         {}",
                if config.memory.enabled {
                    config.storage_dir().display().to_string()
                } else {
                    "disabled".into()
                }
            );
            if !config.has_api_key() {
                println!();
                println!("  Warning: no API key (set ZAIBRIDGE_API_KEY or ZAI_API_KEY)");
            }
            Ok(())
        }
        Err(e) => {
            println!("Config error: {e}");
            Err(e.into())
        }
    }
}

/// Send a short test request with the configured key and endpoint.
async fn check_connection() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let model = config.sampling_params().model;
    println!("Checking {} with {model}...", config.base_url);

    let result = match AnthropicProvider::from_config(&config) {
        Ok(provider) => provider.check_connection(&model).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(()) => {
            println!("  OK: the endpoint accepted the key and answered");
            Ok(())
        }
        Err(e) => {
            let message = describe_error(&Error::Provider(e));
            println!("  FAILED: {message}");
            Err(message.into())
        }
    }
}
