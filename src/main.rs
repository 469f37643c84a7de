//! # dynapi-engine
//!
//! Reads console commands from stdin, one per line, and writes one JSON
//! reply per line to stdout. Logs go to stderr.
//!
//! Usage: `dynapi-engine [settings.toml]`
use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info, warn};

use dynapi_engine::config::Settings;
use dynapi_engine::console::Console;
use dynapi_engine::{ConfigRegistry, ScriptSandbox, ValidationPipeline, logging};

#[tokio::main]
async fn main() {
    // Load settings
    let settings_path = env::args().nth(1).map(PathBuf::from);

    let settings = match Settings::load(settings_path.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ Failed to load settings: {}", e);
            std::process::exit(1);
        }
    };

    logging::init(&settings.logging);

    info!(
        environment = ?settings.environment,
        timeout_ms = settings.sandbox.timeout_ms,
        max_memory_mb = settings.sandbox.max_memory_mb,
        "🔧 Settings loaded"
    );

    let registry = Arc::new(ConfigRegistry::new());
    for preset in settings.configurations {
        let name = preset.name.clone();
        if let Err(e) = registry.create(preset) {
            warn!("⚠️  Skipping preset configuration '{}': {}", name, e);
        }
    }
    info!("✅ {} configuration(s) registered", registry.len());

    let sandbox = Arc::new(ScriptSandbox::new(settings.sandbox));
    let pipeline = ValidationPipeline::new(registry, sandbox);
    let console = Console::new(&pipeline, !settings.environment.is_production());

    if let Err(e) = serve(&console).await {
        error!("❌ Console I/O error: {}", e);
        std::process::exit(1);
    }
}

async fn serve(console: &Console<'_>) -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let Some(reply) = console.handle_line(&line).await else {
            continue;
        };

        let mut out = serde_json::to_string(&reply).map_err(std::io::Error::other)?;
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }

    info!("👋 Input closed, shutting down");
    Ok(())
}
