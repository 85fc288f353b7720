//! Storefront - cart, checkout and order back office

use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::config::{AppConfig, Datastore};
use storefront::repository::{
    CartRepository, CartStores, InMemCartRepo, InMemOrderRepo, InMemProductRepo, OrderRepository, PgCartRepo,
    PgOrderRepo, PgProductRepo, ProductRepository, SessionCartRepo,
};
use storefront::service::{EventPublisher, LogPublisher, NatsPublisher};
use storefront::web::{self, AppState, LocalFileStorage};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    let session = Arc::new(SessionCartRepo::new(config.session_max_entries, config.session_idle));

    let (products, persisted, orders) = match &config.datastore {
        Datastore::Postgres { url, max_connections } => {
            let db = PgPoolOptions::new().max_connections(*max_connections).connect(url).await.context("connecting to database")?;
            sqlx::migrate!("./migrations").run(&db).await?;
            (
                Arc::new(PgProductRepo::new(db.clone())) as Arc<dyn ProductRepository>,
                Arc::new(PgCartRepo::new(db.clone())) as Arc<dyn CartRepository>,
                Arc::new(PgOrderRepo::new(db)) as Arc<dyn OrderRepository>,
            )
        }
        Datastore::Memory => {
            tracing::warn!("using in-memory datastore, nothing survives a restart");
            let catalog = InMemProductRepo::new();
            (
                Arc::new(catalog.clone()) as Arc<dyn ProductRepository>,
                Arc::new(InMemCartRepo::new(catalog)) as Arc<dyn CartRepository>,
                Arc::new(InMemOrderRepo::new()) as Arc<dyn OrderRepository>,
            )
        }
    };

    let events: Arc<dyn EventPublisher> = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Arc::new(NatsPublisher::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, domain events will only be logged");
                Arc::new(LogPublisher)
            }
        },
        None => Arc::new(LogPublisher),
    };

    let state = AppState::new(
        products,
        CartStores { session, persisted },
        orders,
        events,
        Arc::new(LocalFileStorage::new(&config.upload_dir, config.upload_max_bytes)),
        config.upload_max_bytes,
    );
    let app = web::router(state);

    tracing::info!("🚀 Storefront listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?, app).await?;
    Ok(())
}
