//! Outils partagés par les tests: BD SQLite en mémoire migrée, config, fixtures.

use actix_web::{App, body::MessageBody, dev::{ServiceFactory, ServiceRequest, ServiceResponse}};
use chrono::Utc;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

use crate::config::Config;
use crate::migration::Migrator;
use crate::models::dto::CreateSignalRequest;
use crate::models::trading_signals::{self, SignalDirection, SignalSource, SignalStatus};
use crate::models::users::{self, UserRole};
use crate::routes;
use crate::services::user_service::{NewUser, UserService};
use crate::services::webhook_dispatcher::WebhookNotifier;
use crate::state::AppState;
use crate::utils::jwt;

pub const TEST_INBOUND_SECRET: &str = "whsec_dGVzdC1pbmJvdW5kLXNlY3JldC0xMjM0NTY3ODkw";

pub fn test_config() -> Config {
    Config::from_lookup(|key| {
        let value = match key {
            "DATABASE_URL" => "sqlite::memory:",
            "JWT_SECRET" => "test-secret",
            "ADMIN_EMAILS" => "admin@example.com",
            "INBOUND_WEBHOOK_SECRET" => TEST_INBOUND_SECRET,
            _ => return None,
        };
        Some(value.to_string())
    })
    .expect("test config")
}

/// Une seule connexion: chaque connexion SQLite en mémoire est une base distincte
pub async fn setup_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:".to_owned());
    options.max_connections(1).min_connections(1).sqlx_logging(false);

    let db = Database::connect(options).await.expect("sqlite connection");
    Migrator::up(&db, None).await.expect("migrations");
    db
}

pub fn sample_signal_request() -> CreateSignalRequest {
    CreateSignalRequest {
        pair: "eurusd".to_string(),
        direction: "buy".to_string(),
        entry_price: 1.1000,
        stop_loss: 1.0950,
        take_profit: 1.1100,
        confidence: 75,
        timeframe: Some("H4".to_string()),
        analysis: Some("Breakout above resistance".to_string()),
    }
}

pub fn sample_signal_model(id: i32) -> trading_signals::Model {
    let now = Utc::now();
    trading_signals::Model {
        id,
        pair: "EUR/USD".to_string(),
        direction: SignalDirection::Buy,
        entry_price: 1.1000,
        stop_loss: 1.0950,
        take_profit: 1.1100,
        confidence: 75,
        timeframe: Some("H4".to_string()),
        analysis: None,
        status: SignalStatus::Active,
        source: SignalSource::Admin,
        external_id: None,
        created_by: None,
        created_at: now,
        updated_at: now,
        closed_at: None,
    }
}

pub async fn register_user(db: &DatabaseConnection, email: &str) -> users::Model {
    UserService::register(
        db,
        &test_config(),
        NewUser {
            email: email.to_string(),
            password: "password123".to_string(),
            ..Default::default()
        },
    )
    .await
    .expect("register user")
}

pub fn token_for(user: &users::Model) -> String {
    let config = test_config();
    jwt::generate_token(&config.jwt_secret, 1, user.id, &user.email, &user.role).expect("token")
}

pub fn bearer(token: &str) -> (&'static str, String) {
    ("Authorization", format!("Bearer {}", token))
}

pub fn test_state(db: DatabaseConnection) -> AppState {
    AppState::new(db, test_config(), WebhookNotifier::new()).expect("app state")
}

/// L'application complète, telle que montée par main()
pub fn test_app(
    state: &AppState,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Response = ServiceResponse<impl MessageBody + use<>>,
        Config = (),
        InitError = (),
        Error = actix_web::Error,
    > + use<>,
> {
    let state = state.clone();
    App::new()
        .configure(move |cfg| state.configure(cfg))
        .configure(routes::configure_routes)
}

/// Utilisateur enregistré + token (admin si l'email est dans ADMIN_EMAILS)
pub async fn user_with_token(db: &DatabaseConnection, email: &str) -> (users::Model, String) {
    let user = register_user(db, email).await;
    let token = token_for(&user);
    (user, token)
}

pub async fn admin_token(db: &DatabaseConnection) -> String {
    let (user, token) = user_with_token(db, "admin@example.com").await;
    assert_eq!(user.role, UserRole::Admin);
    token
}
