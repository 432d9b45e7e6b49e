use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use solver_worker::config::WorkerConfig;
use solver_worker::runner::JobRunner;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "solver_worker=debug,solver_db=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!(
        concurrency = config.concurrency,
        cancel_poll_ms = config.cancel_poll_interval.as_millis() as u64,
        "Loaded worker configuration",
    );

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = solver_db::create_pool(&database_url, config.max_connections)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    solver_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    solver_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Runners ---
    let shutdown = CancellationToken::new();
    let handles: Vec<_> = (0..config.concurrency)
        .map(|i| {
            let runner = JobRunner::new(format!("worker-{i}"), pool.clone(), config.clone());
            let token = shutdown.child_token();
            tokio::spawn(async move { runner.run(token).await })
        })
        .collect();
    tracing::info!(count = handles.len(), "Job runners started");

    shutdown_signal().await;
    shutdown.cancel();

    // In-flight jobs run to completion; wait for them up to the deadline.
    let deadline = tokio::time::Instant::now() + config.shutdown_timeout;
    for handle in handles {
        match tokio::time::timeout_at(deadline, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Job runner task failed"),
            Err(_) => {
                tracing::warn!("Shutdown timeout reached with jobs still running");
                break;
            }
        }
    }

    pool.close().await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
