use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{routing::get, Router};
use http::HeaderValue;
use tokio::signal;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

use catalog_api as api;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = api::config::load_config()?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    let db_pool = api::db::establish_connection_from_app_config(&cfg).await?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db = Arc::new(db_pool);

    let (event_sender, event_rx) = api::events::create_event_channel(1024);
    let event_sender = Arc::new(event_sender);
    tokio::spawn(api::events::process_events(event_rx));

    let assets: Arc<dyn api::catalog::AssetStore> = match cfg.asset_store.backend {
        api::config::AssetStoreBackend::Supabase => {
            info!(bucket = %cfg.asset_store.bucket, "using supabase asset store");
            Arc::new(api::catalog::SupabaseStorage::from_config(&cfg.asset_store))
        }
        api::config::AssetStoreBackend::Memory => {
            info!("using in-memory asset store");
            Arc::new(api::catalog::InMemoryAssetStore::new())
        }
    };

    let services = api::AppServices::new(db.clone(), event_sender.clone(), assets);

    let app_state = api::AppState {
        db: db.clone(),
        config: cfg.clone(),
        event_sender,
        services,
    };

    let cors_layer = build_cors_layer(&cfg);

    let app = Router::new()
        .route("/", get(|| async { "catalog-api up" }))
        .nest("/health", api::handlers::health::health_routes())
        .nest("/api/v1", api::api_v1_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(cors_layer)
        .with_state(app_state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port).parse()?;
    info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped; closing database pool");
    match Arc::try_unwrap(db) {
        Ok(pool) => api::db::close_pool(pool).await?,
        Err(_) => info!("database pool still shared; letting it drop with the process"),
    }

    Ok(())
}

fn build_cors_layer(cfg: &api::config::AppConfig) -> CorsLayer {
    let configured: Option<Vec<HeaderValue>> = cfg
        .cors_allowed_origins
        .as_ref()
        .map(|raw| {
            raw.split(',')
                .filter_map(|origin| {
                    let trimmed = origin.trim();
                    if trimmed.is_empty() {
                        None
                    } else {
                        HeaderValue::from_str(trimmed).ok()
                    }
                })
                .collect::<Vec<_>>()
        })
        .filter(|origins| !origins.is_empty());

    match configured {
        Some(origins) => CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any),
        None => {
            info!("no explicit CORS origins configured; using permissive CORS");
            CorsLayer::permissive()
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
