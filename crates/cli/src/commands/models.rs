//! `zaibridge models`: List the models the endpoint serves.

use zaibridge_config::{AppConfig, MODELS, RECOMMENDED_MODEL};

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let active = config.sampling_params().model;

    println!("Models at {}", config.base_url);
    println!();
    for line in model_lines(&active) {
        println!("{line}");
    }
    println!();
    println!("  Set `chat_model` and `recommended = false` in config.toml,");
    println!("  or export ZAIBRIDGE_MODEL, to pick another model.");
    Ok(())
}

fn model_lines(active: &str) -> Vec<String> {
    MODELS
        .iter()
        .map(|model| {
            let marker = if *model == active { "*" } else { " " };
            let note = if *model == RECOMMENDED_MODEL {
                "  (recommended)"
            } else {
                ""
            };
            format!("  {marker} {model}{note}")
        })
        .collect()
}
