use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use stockroom_api::config::{init_tracing, load_config};
use stockroom_api::db::{establish_connection, run_migrations};
use stockroom_api::events::{process_events, EventSender};
use stockroom_api::platform::{HttpPlatformClient, PlatformClient};
use stockroom_api::{app_router, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().context("failed to load configuration")?;
    init_tracing(config.log_level(), config.log_json);

    info!(environment = %config.environment, "Starting stockroom-api");

    let db = establish_connection(&config)
        .await
        .context("failed to connect to database")?;
    if config.auto_migrate {
        run_migrations(&db).await.context("schema bootstrap failed")?;
    }

    let platform: Option<Arc<dyn PlatformClient>> = HttpPlatformClient::from_config(&config.platform)
        .context("failed to build platform client")?
        .map(|c| Arc::new(c) as Arc<dyn PlatformClient>);
    if platform.is_none() {
        warn!("Platform connection not configured; channel sync is disabled");
    }

    let (tx, rx) = mpsc::channel(1024);
    let event_sender = EventSender::new(tx);

    let state = AppState::new(db, config.clone(), Some(event_sender), platform.clone());
    tokio::spawn(process_events(rx, Arc::clone(&state.db), platform));

    let cors = match config.cors_allowed_origins.as_deref() {
        Some(origins) => {
            let origins = origins
                .split(',')
                .map(|o| o.trim().parse())
                .collect::<Result<Vec<_>, _>>()
                .context("invalid CORS origin")?;
            Some(
                CorsLayer::new()
                    .allow_origin(AllowOrigin::list(origins))
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
        }
        None if config.is_development() => Some(CorsLayer::permissive()),
        None => {
            warn!("No CORS origins configured; cross-origin requests will be refused");
            None
        }
    };

    let app = app_router(state);
    let app = match cors {
        Some(cors) => app.layer(cors),
        None => app,
    };

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl-c"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
