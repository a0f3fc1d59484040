use std::sync::Arc;
use std::time::Duration;

use chatmate_shared::clients::db::create_pool;
use chatmate_shared::clients::telegram::TelegramClient;

use chatmate_bot::config::{AppConfig, StorageBackend};
use chatmate_bot::models::DEFAULT_INTERESTS;
use chatmate_bot::store::{MemoryStore, PgStore, ProfileStore, SessionStore};
use chatmate_bot::transport::telegram::run_polling;
use chatmate_bot::transport::{TelegramTransport, Transport};
use chatmate_bot::{routes, session, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    chatmate_shared::middleware::init_tracing("chatmate-bot");

    let config = AppConfig::load()?;
    let port = config.port;

    if config.telegram_bot_token.is_empty() {
        anyhow::bail!("CHATMATE__TELEGRAM_BOT_TOKEN is not set");
    }

    let metrics_handle = chatmate_shared::middleware::init_metrics()?;

    // Record store
    let (profiles, sessions) = match config.storage {
        StorageBackend::Postgres => {
            let pool = create_pool(&config.database_url, config.db_pool_size)?;
            let store = Arc::new(PgStore::new(pool, config.default_min_age, config.default_max_age));
            (store.clone() as Arc<dyn ProfileStore>, store as Arc<dyn SessionStore>)
        }
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage, data is lost on restart");
            let store = Arc::new(MemoryStore::new(config.default_min_age, config.default_max_age));
            (store.clone() as Arc<dyn ProfileStore>, store as Arc<dyn SessionStore>)
        }
    };

    let seeded = profiles.seed_interests(&DEFAULT_INTERESTS)?;
    tracing::info!(inserted = seeded, "interest catalogue seeded");

    // Transport
    let client = TelegramClient::new(
        &config.telegram_api_url,
        &config.telegram_bot_token,
        config.poll_timeout_secs,
    )?;
    let me = client.get_me().await?;
    tracing::info!(bot = %me.username.as_deref().unwrap_or(&me.first_name), "telegram token verified");
    let transport: Arc<dyn Transport> = Arc::new(TelegramTransport::new(client.clone()));

    let poll_timeout_secs = config.poll_timeout_secs;
    let chat_timeout = config.chat_timeout()?;
    let reaper_interval = Duration::from_secs(config.reaper_interval_secs);

    let state = Arc::new(AppState::new(
        config,
        profiles,
        sessions,
        transport.clone(),
        Some(metrics_handle),
    ));

    // Background work
    session::reaper::spawn(state.sessions.clone(), transport, chat_timeout, reaper_interval);
    tokio::spawn(run_polling(client, state.clone(), poll_timeout_secs));

    // Admin HTTP surface
    let app = routes::router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "chatmate-bot starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
