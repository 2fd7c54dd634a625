//! Hedera Health ID
//!
//! Main entry point for the Hedera Health ID API server.

use actix_web::{web, App, HttpServer};
use anyhow::Context;
use tracing::info;
use tracing_actix_web::TracingLogger;

use healthid::{api, config, db, telemetry, AppState};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let settings = config::load_config().context("failed to load configuration")?;
    telemetry::init(&settings.logging);
    info!(
        environment = %settings.environment,
        backend = ?settings.database.backend,
        ledger_network = %settings.ledger.network,
        "starting Hedera Health ID"
    );

    let (store, database) = db::open_store(&settings.database)
        .await
        .context("failed to open the record store")?;

    let bind = settings.bind_address();
    let workers = settings.server.workers.max(1);
    let state = web::Data::new(AppState::new(settings, store));

    info!(%bind, workers, "HTTP server listening");
    HttpServer::new(move || {
        App::new()
            .wrap(api::middleware::cors(&state.config))
            .wrap(TracingLogger::default())
            .configure(api::app_config(state.clone()))
    })
    .workers(workers)
    .bind(&bind)
    .with_context(|| format!("failed to bind {}", bind))?
    .run()
    .await?;

    if let Some(database) = database {
        database.close().await;
    }
    info!("server stopped");
    Ok(())
}
