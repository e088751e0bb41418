use anyhow::Context;

use hrms_infra::{AppConfig, Services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    hrms_observability::init();

    let config = AppConfig::from_env()?;

    let services = match &config.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await
                .context("connect to postgres")?;
            Services::postgres(&config, pool).await?
        }
        None => {
            tracing::info!("USE_PERSISTENT_STORES not set; using in-memory stores");
            Services::in_memory(&config)
        }
    };

    let app = hrms_api::app::build_app(services.clone());

    let listener = tokio::net::TcpListener::bind(config.bind_addr.as_str())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    tracing::info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    services.audit.flush().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
    }
}
