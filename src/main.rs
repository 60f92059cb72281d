use std::net::SocketAddr;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use linktrail::{config, geo::GeoResolver, router, store, AppState};

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (ignore error if file is absent; env vars may already be set)
    dotenvy::dotenv().ok();

    // Initialise structured logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "linktrail=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = config::AppConfig::from_env()?;
    tracing::info!("Starting linktrail on {}:{}", config.host, config.port);
    tracing::info!("Base URL: {}", config.base_url);

    let repo = store::open_repository(&config).await?;

    let geo = GeoResolver::for_mode(config.geo_mode, &config.geo_api_url, config.geo_timeout)?;
    tracing::info!(
        "Geo enrichment: {:?} mode, {:?} budget per tier",
        config.geo_mode,
        geo.budget()
    );

    let bind_addr = format!("{}:{}", config.host, config.port);
    let app = router(AppState::new(config, repo, geo));

    // ── Serve ──────────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
