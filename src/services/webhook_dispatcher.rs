//! Livraison des webhooks sortants.
//!
//! ```text
//! transaction du signal
//!   └─ WebhookService::enqueue_event()   // 1 ligne 'pending' par abonné actif
//! commit
//!   └─ SignalService::announce()
//!        └─ notifier.notify()            // réveille le dispatcher
//!
//! WebhookDispatcher::run()               // boucle: notification OU intervalle
//!   └─ tick()
//!        ├─ DB: livraisons dues + abonné (LEFT JOIN)
//!        ├─ abonné absent/désactivé → 'exhausted' sans envoi
//!        ├─ signature HMAC + POST (concurrence bornée, timeout)
//!        └─ pour chaque résultat:
//!             ├─ 2xx → 'delivered', failure_count = 0
//!             └─ échec → retry selon le schedule, sinon 'exhausted'
//!                        et failure_count + 1 (désactivation au seuil)
//! ```
//!
//! Un seul dispatcher tourne par processus: les ticks sont séquentiels, une
//! livraison ne peut donc pas être réclamée deux fois.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use sea_orm::sea_query::Expr;
use sea_orm::*;
use tokio::sync::{Notify, broadcast};
use uuid::Uuid;

use crate::config::WebhookConfig;
use crate::errors::AppError;
use crate::models::dto::SignalEvent;
use crate::models::webhook_deliveries::{self, DeliveryStatus};
use crate::models::webhook_subscriptions;
use crate::utils::signing;

/// Réveille le dispatcher dès qu'une livraison est mise en file
#[derive(Clone, Default)]
pub struct WebhookNotifier(Arc<Notify>);

impl WebhookNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.0.notify_one();
    }

    async fn notified(&self) {
        self.0.notified().await;
    }
}

pub struct WebhookService;

impl WebhookService {
    /// Crée un abonné. Le secret est retourné une seule fois à l'admin.
    pub async fn create_subscription<C: ConnectionTrait>(
        db: &C,
        url: &str,
        description: Option<String>,
    ) -> Result<webhook_subscriptions::Model, AppError> {
        let url = url.trim();
        let parsed = reqwest::Url::parse(url)
            .map_err(|e| AppError::Validation(format!("Invalid webhook url: {}", e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(AppError::Validation("Webhook url must use http or https".to_string()));
        }

        let subscription = webhook_subscriptions::ActiveModel {
            url: Set(url.to_string()),
            secret: Set(signing::generate_secret()),
            description: Set(description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty())),
            active: Set(true),
            failure_count: Set(0),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        Ok(subscription.insert(db).await?)
    }

    pub async fn list_subscriptions<C: ConnectionTrait>(
        db: &C,
    ) -> Result<Vec<webhook_subscriptions::Model>, AppError> {
        Ok(webhook_subscriptions::Entity::find()
            .order_by_asc(webhook_subscriptions::Column::Id)
            .all(db)
            .await?)
    }

    pub async fn delete_subscription<C: ConnectionTrait>(db: &C, id: i32) -> Result<(), AppError> {
        // Les livraisons en attente sont supprimées explicitement (SQLite n'active pas
        // toujours les contraintes ON DELETE CASCADE)
        webhook_deliveries::Entity::delete_many()
            .filter(webhook_deliveries::Column::SubscriptionId.eq(id))
            .exec(db)
            .await?;

        let result = webhook_subscriptions::Entity::delete_by_id(id).exec(db).await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound(format!("Webhook {} not found", id)));
        }
        Ok(())
    }

    /// Réactive un abonné désactivé et remet son compteur d'échecs à zéro
    pub async fn enable_subscription<C: ConnectionTrait>(
        db: &C,
        id: i32,
    ) -> Result<webhook_subscriptions::Model, AppError> {
        let subscription = webhook_subscriptions::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Webhook {} not found", id)))?;

        let mut active: webhook_subscriptions::ActiveModel = subscription.into();
        active.active = Set(true);
        active.failure_count = Set(0);
        Ok(active.update(db).await?)
    }

    pub async fn list_deliveries<C: ConnectionTrait>(
        db: &C,
        subscription_id: i32,
        limit: u64,
    ) -> Result<Vec<webhook_deliveries::Model>, AppError> {
        Ok(webhook_deliveries::Entity::find()
            .filter(webhook_deliveries::Column::SubscriptionId.eq(subscription_id))
            .order_by_desc(webhook_deliveries::Column::Id)
            .limit(limit)
            .all(db)
            .await?)
    }

    /// Met l'événement en file pour chaque abonné actif. Retourne le nombre de livraisons créées.
    pub async fn enqueue_event<C: ConnectionTrait>(
        db: &C,
        event: &SignalEvent,
    ) -> Result<usize, AppError> {
        let subscriptions = webhook_subscriptions::Entity::find()
            .filter(webhook_subscriptions::Column::Active.eq(true))
            .all(db)
            .await?;

        if subscriptions.is_empty() {
            return Ok(0);
        }

        let payload = serde_json::to_string(event)
            .map_err(|e| AppError::Internal(format!("Failed to serialize event: {}", e)))?;
        let event_id = format!("evt_{}", Uuid::new_v4().simple());
        let now = Utc::now();

        let deliveries: Vec<webhook_deliveries::ActiveModel> = subscriptions
            .iter()
            .map(|sub| webhook_deliveries::ActiveModel {
                subscription_id: Set(sub.id),
                event_id: Set(event_id.clone()),
                event_type: Set(event.event_type.as_str().to_string()),
                payload: Set(payload.clone()),
                status: Set(DeliveryStatus::Pending),
                attempts: Set(0),
                next_attempt_at: Set(now),
                last_status_code: Set(None),
                last_error: Set(None),
                created_at: Set(now),
                delivered_at: Set(None),
                ..Default::default()
            })
            .collect();

        let count = deliveries.len();
        webhook_deliveries::Entity::insert_many(deliveries).exec(db).await?;
        Ok(count)
    }
}

/// Requête HTTP prête à partir (aucun accès BD pendant l'envoi)
#[derive(Debug)]
struct SendRequest {
    delivery: webhook_deliveries::Model,
    url: String,
    headers: Vec<(&'static str, String)>,
}

#[derive(Debug, PartialEq)]
enum SendOutcome {
    Success { status_code: u16 },
    Failure { status_code: Option<u16>, error: String },
}

/// Bilan d'un tick, utile aux logs et aux tests
#[derive(Debug, Default, PartialEq)]
pub struct TickSummary {
    pub delivered: usize,
    pub retried: usize,
    pub exhausted: usize,
}

pub struct WebhookDispatcher {
    db: DatabaseConnection,
    http: reqwest::Client,
    config: WebhookConfig,
    notifier: WebhookNotifier,
}

impl WebhookDispatcher {
    pub fn new(
        db: DatabaseConnection,
        config: WebhookConfig,
        notifier: WebhookNotifier,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create webhook HTTP client: {}", e)))?;

        Ok(Self {
            db,
            http,
            config,
            notifier,
        })
    }

    /// Boucle principale: tourne jusqu'au signal d'arrêt
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(self.config.poll_interval());
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            poll_secs = self.config.poll_interval_secs,
            max_concurrent = self.config.max_concurrent,
            "webhook dispatcher started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    tracing::info!("webhook dispatcher stopping");
                    break;
                }
                _ = interval.tick() => {}
                _ = self.notifier.notified() => {}
            }

            match self.tick().await {
                Ok(summary) if summary != TickSummary::default() => {
                    tracing::info!(
                        delivered = summary.delivered,
                        retried = summary.retried,
                        exhausted = summary.exhausted,
                        "webhook tick"
                    );
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "webhook tick failed"),
            }
        }
    }

    /// Un cycle: réclamer → signer → envoyer → enregistrer les résultats
    pub async fn tick(&self) -> Result<TickSummary, AppError> {
        let now = Utc::now();
        let due = webhook_deliveries::Entity::find()
            .find_also_related(webhook_subscriptions::Entity)
            .filter(webhook_deliveries::Column::Status.eq(DeliveryStatus::Pending))
            .filter(webhook_deliveries::Column::NextAttemptAt.lte(now))
            .order_by_asc(webhook_deliveries::Column::NextAttemptAt)
            .limit(self.config.batch_size)
            .all(&self.db)
            .await?;

        let mut summary = TickSummary::default();
        let mut requests = Vec::new();

        for (delivery, subscription) in due {
            let Some(subscription) = subscription.filter(|s| s.active) else {
                tracing::debug!(delivery_id = delivery.id, "subscription gone or disabled, exhausting delivery");
                self.mark_exhausted(delivery, None, "Subscription disabled".to_string(), false)
                    .await?;
                summary.exhausted += 1;
                continue;
            };

            match build_request(delivery, &subscription) {
                Ok(request) => requests.push(request),
                Err(delivery) => {
                    tracing::warn!(delivery_id = delivery.id, "failed to sign webhook payload");
                    self.mark_exhausted(delivery, None, "Invalid subscription secret".to_string(), false)
                        .await?;
                    summary.exhausted += 1;
                }
            }
        }

        let http = &self.http;
        let results: Vec<(webhook_deliveries::Model, SendOutcome)> = stream::iter(requests)
            .map(|request| async move {
                let outcome = send(http, &request).await;
                (request.delivery, outcome)
            })
            .buffer_unordered(self.config.max_concurrent.max(1))
            .collect()
            .await;

        for (delivery, outcome) in results {
            match outcome {
                SendOutcome::Success { status_code } => {
                    self.mark_delivered(delivery, status_code).await?;
                    summary.delivered += 1;
                }
                SendOutcome::Failure { status_code, error } => {
                    if self.record_failure(delivery, status_code, error).await? {
                        summary.retried += 1;
                    } else {
                        summary.exhausted += 1;
                    }
                }
            }
        }

        Ok(summary)
    }

    async fn mark_delivered(
        &self,
        delivery: webhook_deliveries::Model,
        status_code: u16,
    ) -> Result<(), AppError> {
        let subscription_id = delivery.subscription_id;
        let attempts = delivery.attempts + 1;

        let mut active: webhook_deliveries::ActiveModel = delivery.into();
        active.status = Set(DeliveryStatus::Delivered);
        active.attempts = Set(attempts);
        active.last_status_code = Set(Some(status_code as i32));
        active.last_error = Set(None);
        active.delivered_at = Set(Some(Utc::now()));
        active.update(&self.db).await?;

        webhook_subscriptions::Entity::update_many()
            .col_expr(webhook_subscriptions::Column::FailureCount, Expr::value(0))
            .filter(webhook_subscriptions::Column::Id.eq(subscription_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    /// Retourne true si une nouvelle tentative est planifiée
    async fn record_failure(
        &self,
        delivery: webhook_deliveries::Model,
        status_code: Option<u16>,
        error: String,
    ) -> Result<bool, AppError> {
        let attempts = delivery.attempts + 1;
        let delay = self
            .config
            .retry_schedule_secs
            .get((attempts - 1) as usize)
            .copied();

        tracing::debug!(delivery_id = delivery.id, attempts, ?status_code, error = %error, "webhook send failed");

        let Some(delay) = delay else {
            self.mark_exhausted(delivery, status_code, error, true).await?;
            return Ok(false);
        };

        let mut active: webhook_deliveries::ActiveModel = delivery.into();
        active.attempts = Set(attempts);
        active.last_status_code = Set(status_code.map(i32::from));
        active.last_error = Set(Some(error));
        active.next_attempt_at = Set(Utc::now() + chrono::Duration::seconds(delay));
        active.update(&self.db).await?;
        Ok(true)
    }

    async fn mark_exhausted(
        &self,
        delivery: webhook_deliveries::Model,
        status_code: Option<u16>,
        error: String,
        was_sent: bool,
    ) -> Result<(), AppError> {
        let subscription_id = delivery.subscription_id;
        let attempts = if was_sent { delivery.attempts + 1 } else { delivery.attempts };

        let mut active: webhook_deliveries::ActiveModel = delivery.into();
        active.status = Set(DeliveryStatus::Exhausted);
        active.attempts = Set(attempts);
        active.last_status_code = Set(status_code.map(i32::from));
        active.last_error = Set(Some(error));
        active.update(&self.db).await?;

        if was_sent {
            self.increment_failures(subscription_id).await?;
        }
        Ok(())
    }

    /// failure_count + 1, désactivation de l'abonné au seuil configuré
    async fn increment_failures(&self, subscription_id: i32) -> Result<(), AppError> {
        let Some(subscription) = webhook_subscriptions::Entity::find_by_id(subscription_id)
            .one(&self.db)
            .await?
        else {
            return Ok(());
        };

        let failures = subscription.failure_count + 1;
        let disable = failures >= self.config.disable_after_failures;

        let mut active: webhook_subscriptions::ActiveModel = subscription.into();
        active.failure_count = Set(failures);
        if disable {
            active.active = Set(false);
        }
        let updated = active.update(&self.db).await?;

        if disable {
            tracing::warn!(
                subscription_id,
                url = %updated.url,
                failures,
                "webhook subscription disabled after repeated failures"
            );
        }
        Ok(())
    }
}

/// Signe le payload stocké. En cas d'échec la livraison est rendue à l'appelant.
fn build_request(
    delivery: webhook_deliveries::Model,
    subscription: &webhook_subscriptions::Model,
) -> Result<SendRequest, webhook_deliveries::Model> {
    let timestamp = Utc::now().timestamp();
    let Some(signature) =
        signing::sign_payload(&delivery.event_id, timestamp, &delivery.payload, &subscription.secret)
    else {
        return Err(delivery);
    };

    let headers = vec![
        ("Content-Type", "application/json".to_string()),
        (signing::HEADER_ID, delivery.event_id.clone()),
        (signing::HEADER_TIMESTAMP, timestamp.to_string()),
        (signing::HEADER_SIGNATURE, signature),
    ];

    Ok(SendRequest {
        url: subscription.url.clone(),
        headers,
        delivery,
    })
}

async fn send(http: &reqwest::Client, request: &SendRequest) -> SendOutcome {
    let mut builder = http.post(&request.url).body(request.delivery.payload.clone());
    for (name, value) in &request.headers {
        builder = builder.header(*name, value);
    }

    match builder.send().await {
        Ok(response) if response.status().is_success() => SendOutcome::Success {
            status_code: response.status().as_u16(),
        },
        Ok(response) => SendOutcome::Failure {
            status_code: Some(response.status().as_u16()),
            error: format!("HTTP {}", response.status()),
        },
        Err(e) => SendOutcome::Failure {
            status_code: None,
            error: e.to_string(),
        },
    }
}
