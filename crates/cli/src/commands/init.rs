//! `helmsman init`: write a default config file.

use std::path::PathBuf;

use helmsman_config::AppConfig;

pub async fn run(config_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = config_path.unwrap_or_else(AppConfig::config_path);

    if config_path.exists() {
        println!("Config already exists at: {}", config_path.display());
        println!("Edit it manually or delete it and re-run init.");
        return Ok(());
    }

    if let Some(parent) = config_path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&config_path, AppConfig::default_toml()).await?;

    println!("Created {}", config_path.display());
    println!();
    println!("Next steps:");
    println!("  1. Point [model] base_url and model at your endpoint (Ollama by default)");
    println!("  2. Set api_key or HELMSMAN_API_KEY for hosted endpoints");
    println!("  3. Run: helmsman chat");
    Ok(())
}
