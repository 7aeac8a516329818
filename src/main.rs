mod config;
mod db;
mod errors;
mod middleware;
mod migration;
mod models;
mod routes;
mod services;
mod state;
mod utils;
#[cfg(test)]
mod test_utils;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware::Logger};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::services::webhook_dispatcher::{WebhookDispatcher, WebhookNotifier};
use crate::state::AppState;

fn build_cors(config: &Config) -> Cors {
    let cors = Cors::default()
        .allow_any_method()
        .allow_any_header()
        .max_age(3600);

    if config.allows_any_origin() {
        return cors.allow_any_origin();
    }
    config
        .cors_allowed_origins
        .iter()
        .fold(cors, |cors, origin| cors.allowed_origin(origin))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = Config::from_env().map_err(|e| std::io::Error::other(e.to_string()))?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.rust_log)))
        .init();

    tracing::info!("connecting to database");
    let db = db::establish_connection(&config.database_url).await.map_err(|e| {
        tracing::error!(error = %e, "database connection failed");
        std::io::Error::other(e.to_string())
    })?;
    tracing::info!("database connected, migrations applied");

    let notifier = WebhookNotifier::new();
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

    let dispatcher = WebhookDispatcher::new(db.clone(), config.webhook.clone(), notifier.clone())
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    let dispatcher_task = actix_web::rt::spawn(dispatcher.run(shutdown_rx));

    let state = AppState::new(db, config.clone(), notifier).map_err(std::io::Error::other)?;

    let bind = (config.host.clone(), config.port);
    tracing::info!(host = %bind.0, port = bind.1, "starting server");

    let server_config = config.clone();
    HttpServer::new(move || {
        let state = state.clone();
        App::new()
            .wrap(build_cors(&server_config))
            .wrap(Logger::default())
            .configure(move |cfg| state.configure(cfg))
            .configure(routes::configure_routes)
    })
    .bind(bind)?
    .run()
    .await?;

    tracing::info!("server stopped, shutting down webhook dispatcher");
    let _ = shutdown_tx.send(());
    if let Err(e) = dispatcher_task.await {
        tracing::warn!(error = %e, "webhook dispatcher task ended abnormally");
    }

    Ok(())
}
