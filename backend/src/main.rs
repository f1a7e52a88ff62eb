mod config;
mod error;
mod routes;
mod store;
mod suggest;

use std::sync::Arc;

use anyhow::Context;
use tower_http::{cors::CorsLayer, services::ServeDir};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::{
    config::{Config, StoreBackend},
    routes::AppState,
    store::{MemoryTaskStore, RedisTaskStore, TaskStore},
    suggest::{OpenAiSuggester, Suggester},
};

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("backend=info,tower_http=info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let mut config = Config::from_env()?;

    let store: Arc<dyn TaskStore> = match config.store {
        StoreBackend::Redis => {
            tracing::info!(redis_url = %config.redis_url, "using redis task store");
            Arc::new(RedisTaskStore::open(&config.redis_url).context("Failed to open Redis client")?)
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory task store, tasks are lost on restart");
            Arc::new(MemoryTaskStore::default())
        }
    };

    let suggester: Option<Arc<dyn Suggester>> = match config.openai_api_key.take() {
        Some(api_key) => Some(Arc::new(OpenAiSuggester::new(
            api_key,
            config.openai_model.clone(),
            config.openai_base_url.clone(),
            config.suggestion_timeout,
        )?)),
        None => {
            tracing::warn!("OPENAI_API_KEY not set, /suggestions is disabled");
            None
        }
    };

    let api = routes::router(AppState { store, suggester })
        .fallback_service(ServeDir::new(&config.static_dir));
    let app = routes::with_request_layers(api, config.request_timeout).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!("Server running on http://{}", config.bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}
