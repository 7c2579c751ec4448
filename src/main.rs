// Module declarations
mod config;
mod encoder;
mod flow;
mod models;
mod paths;
mod prompts;
mod server;
mod session;
mod storage;
mod vision;

use config::load_config;
use flow::ImageFlow;
use log::{error, info, warn};
use paths::find_env_file;
use server::{build_router, spawn_session_sweeper, AppState};
use std::sync::Arc;
use std::time::Duration;
use storage::ImageStorage;
use vision::HttpVisionClient;

#[tokio::main]
async fn main() {
    // Load the env file before the logger so RUST_LOG can live there too
    let env_file = find_env_file().map(|path| {
        let loaded = dotenvy::from_path(&path);
        (path, loaded)
    });

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match env_file {
        Some((path, Ok(()))) => info!("[main] Loaded environment from {}", path.display()),
        Some((path, Err(e))) => warn!("[main] Failed to load {}: {}", path.display(), e),
        None => info!("[main] No .env file found; using process environment"),
    }

    if let Err(e) = run().await {
        error!("[main] {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let config = load_config()?;
    if config.api_key.is_none() {
        warn!("[main] No vision API key configured; set GROQ_API_KEY or VISION_API_KEY");
    }

    let client = HttpVisionClient::from_config(&config)?;
    info!("[main] Using model {} at {}", client.model(), config.api_base);

    let storage = ImageStorage::new(&config.images_dir);
    info!("[main] Storing uploads in {}", storage.dir().display());

    let flow = ImageFlow::new(storage, Arc::new(client));
    let state = Arc::new(AppState::new(flow));
    if config.session_ttl_secs > 0 {
        spawn_session_sweeper(state.clone(), Duration::from_secs(config.session_ttl_secs));
    } else {
        info!("[main] Session expiry disabled");
    }
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .map_err(|e| format!("Failed to bind {}: {}", config.bind_addr, e))?;
    info!("[main] Listening on http://{}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| format!("Server error: {}", e))
}
