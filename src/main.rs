mod cache;
mod commands;
mod detect;
mod hash;
mod llm;
mod relay;
mod session;
mod state;

use std::sync::Arc;

use clap::Parser;
use tracing::{info, Level};

use cache::store::{CnidariumStore, MemoryStore};
use cache::CacheHandle;
use commands::Cli;
use llm::LlmClient;
use relay::Relay;
use state::{AppState, Mode, Settings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries answers and native-messaging frames.
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    // Load env
    let _ = dotenv::dotenv();
    let settings = Settings::from_env()?;

    let state = if commands::needs_state(&cli.command) {
        Some(init_state(settings.clone(), cli.memory_cache).await?)
    } else {
        None
    };

    commands::run(cli.command, state, &settings).await
}

async fn init_state(settings: Settings, memory_cache: bool) -> anyhow::Result<AppState> {
    // Init cache
    let cache = if memory_cache {
        info!("Response cache kept in memory");
        CacheHandle::spawn(MemoryStore::new(), settings.ttl)
    } else {
        let store = CnidariumStore::open(&settings.data_dir).await?;
        info!("Response cache initialized at {:?}", settings.data_dir);
        CacheHandle::spawn(store, settings.ttl)
    };

    // Init LLM client
    let llm_client = Arc::new(LlmClient::new(&settings)?);
    match settings.mode {
        Mode::Remote => info!(
            url = %settings.remote_api_url,
            key_set = settings.has_api_key(),
            "LLM client initialized (remote)"
        ),
        Mode::Local => info!(url = %settings.local_server_url, "LLM client initialized (local)"),
    }

    let relay = Arc::new(Relay::new(cache.clone(), llm_client, settings.model.clone()));

    Ok(AppState {
        settings,
        cache,
        relay,
    })
}
