use std::sync::Arc;

use reqwest::Client as HttpClient;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use listing_api::{
    config::Config,
    db::{create_pool, PgListingStore},
    routes::{create_router, AppState},
    services::{IngestionOrchestrator, NominatimGeocoder, PhotoUploader},
    storage::HttpBlobStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("listing_api=info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    // Database
    let pool = create_pool(&config.database_url).await?;
    let store = PgListingStore::new(pool);
    store.migrate().await?;
    let store = Arc::new(store);

    // External services
    let geocoder = NominatimGeocoder::new(
        config.geocoding_url.clone(),
        &config.geocoding_user_agent,
        config.geocoding_timeout(),
        config.geocoding_retry_backoff(),
    )?;
    let blob_store = HttpBlobStore::new(
        HttpClient::new(),
        &config.blob_endpoint,
        config.public_blob_url(),
    );
    let uploader = PhotoUploader::new(
        Arc::new(blob_store),
        config.upload_concurrency,
        config.upload_max_attempts,
        config.upload_retry_backoff(),
    );

    let ingestion = IngestionOrchestrator::new(Arc::new(geocoder), uploader, store.clone());
    let state = AppState::new(store, ingestion).with_max_upload_bytes(config.max_upload_bytes);
    let app = create_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server running on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
