use std::time::Duration;

use actix_web::web;
use sea_orm::DatabaseConnection;

use crate::config::Config;
use crate::services::signal_hub::SignalHub;
use crate::services::webhook_dispatcher::WebhookNotifier;

// Timeout du client HTTP utilisé par le proxy
const PROXY_TIMEOUT: Duration = Duration::from_secs(30);

/// Ressources partagées par tous les workers actix.
/// Chaque champ est enregistré séparément en `web::Data` pour que les handlers
/// ne demandent que ce dont ils ont besoin.
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Config,
    pub hub: SignalHub,
    pub notifier: WebhookNotifier,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: Config, notifier: WebhookNotifier) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(PROXY_TIMEOUT)
            .build()?;

        Ok(Self {
            db,
            hub: SignalHub::new(config.signal_stream_capacity),
            config,
            notifier,
            http,
        })
    }

    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::new(self.db.clone()))
            .app_data(web::Data::new(self.config.clone()))
            .app_data(web::Data::new(self.hub.clone()))
            .app_data(web::Data::new(self.notifier.clone()))
            .app_data(web::Data::new(self.http.clone()));
    }
}
