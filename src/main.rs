use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;

use ara_chat_service::config::Settings;
use ara_chat_service::persistence::PostgresBackend;
use ara_chat_service::postgres::PostgresPool;
use ara_chat_service::server::{create_app, AppState};
use ara_chat_service::tasks::PresenceSweepTask;
use ara_chat_service::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new()?;

    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!("Configuration loaded");

    let postgres_pool = init_postgres(&settings).await?;

    let state = AppState::new(settings.clone(), postgres_pool.clone());
    tracing::info!(
        backend = state.backend.backend_type(),
        allowed_role = %settings.chat.allowed_role,
        "Application state initialized"
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let sweep_task = PresenceSweepTask::new(
        settings.presence.clone(),
        settings.websocket.clone(),
        state.hub.clone(),
        shutdown_tx.subscribe(),
    );
    let sweep_handle = tokio::spawn(async move {
        sweep_task.run().await;
    });

    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown_tx))
        .await?;

    tracing::info!("Waiting for background tasks to finish...");
    let _ = sweep_handle.await;

    if let Some(pool) = postgres_pool {
        pool.close().await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Connect and prepare the schema when the postgres backend is selected
async fn init_postgres(settings: &Settings) -> Result<Option<Arc<PostgresPool>>> {
    if settings.persistence.backend != "postgres" {
        return Ok(None);
    }

    let Some(ref database) = settings.database else {
        tracing::warn!("persistence.backend is postgres but no database section is configured");
        return Ok(None);
    };

    let pool = PostgresPool::new(database).await?;
    PostgresBackend::new(pool.pool().clone()).ensure_schema().await?;

    Ok(Some(Arc::new(pool)))
}

async fn shutdown_signal_handler(shutdown_tx: broadcast::Sender<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }

    let _ = shutdown_tx.send(());
}
