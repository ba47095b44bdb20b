use std::panic;
use std::sync::Arc;

use pathcolab_sync::clients::TranslateClient;
use pathcolab_sync::db::PgPathStore;
use pathcolab_sync::services::auth_service::JwtVerifier;
use pathcolab_sync::services::path_store::{InMemoryPathStore, PathStore};
use pathcolab_sync::services::translate_service::{CachedTextProvider, TextProvider, UnconfiguredProvider};
use pathcolab_sync::{create_app, AppState, Config};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

async fn build_store(config: &Config) -> Arc<dyn PathStore> {
    if let Some(db_url) = &config.db_url {
        match PgPathStore::new(db_url).await {
            Ok(store) => {
                info!("Database initialized successfully");
                return Arc::new(store);
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
            }
        }
    } else {
        warn!("No database URL configured");
    }
    warn!("Using the in-memory path store - nothing will be persisted");
    Arc::new(InMemoryPathStore::new())
}

fn build_provider(config: &Config) -> Arc<dyn TextProvider> {
    let Some(url) = &config.translate_url else {
        warn!("No translation provider configured - translate-content will fail");
        return Arc::new(UnconfiguredProvider);
    };
    match TranslateClient::new(url.clone(), config.translate_api_key.clone()) {
        Ok(client) => {
            info!("Translation provider at {}", url);
            Arc::new(CachedTextProvider::new(Arc::new(client), config.translate_cache_ttl()))
        }
        Err(e) => {
            error!("Failed to build translation client: {}", e);
            Arc::new(UnconfiguredProvider)
        }
    }
}

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Load configuration; failures are reported once tracing is up
    let loaded = Config::load();
    let log_filter = match &loaded {
        Ok(config) => config.log_filter(),
        Err(_) => Config::default().log_filter(),
    };

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .init();

    info!("Starting server...");

    let config = loaded.unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    let store = build_store(&config).await;
    let provider = build_provider(&config);
    let verifier = Arc::new(JwtVerifier::new(config.jwt_secret.clone()));
    let address = config.server_address();

    let state = AppState::new(config, store, verifier, provider);
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", address));

    info!("🚀 Server running on http://{}", address);
    info!("📡 WebSocket available at ws://{}/ws", address);
    info!("📚 Swagger UI available at http://{}/swagger", address);

    axum::serve(listener, app)
        .await
        .expect("Server failed to start");
}
