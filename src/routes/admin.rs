use actix_web::{delete, get, patch, post, web, HttpResponse};
use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, TransactionTrait};
use serde::Deserialize;

use crate::errors::AppError;
use crate::middleware::AdminUser;
use crate::models::dto::{CreateSignalRequest, SignalEvent, SignalEventType, SignalResponse, UpdateSignalRequest, UserResponse};
use crate::models::trading_signals::SignalSource;
use crate::services::coupon_service::{CouponService, NewCoupon};
use crate::services::signal_hub::SignalHub;
use crate::services::signal_service::{FeedFilter, SignalService, MAX_FEED_LIMIT};
use crate::services::user_service::UserService;
use crate::services::webhook_dispatcher::{WebhookNotifier, WebhookService};

// ============================================================================
// SIGNAUX
// ============================================================================

/// POST /admin/signals - Publie un signal (ADMIN)
#[post("/signals")]
pub async fn create_signal(
    admin: AdminUser,
    body: web::Json<CreateSignalRequest>,
    db: web::Data<DatabaseConnection>,
    hub: web::Data<SignalHub>,
    notifier: web::Data<WebhookNotifier>,
) -> Result<HttpResponse, AppError> {
    // Signal et file webhook validés ensemble
    let txn = db.begin().await?;
    let signal = SignalService::create_signal(
        &txn,
        body.into_inner(),
        SignalSource::Admin,
        Some(admin.0.user_id),
        None,
    )
    .await?;
    let event = SignalEvent::new(SignalEventType::Created, signal.clone());
    let queued = SignalService::enqueue_webhooks(&txn, &event).await?;
    txn.commit().await?;

    SignalService::announce(&hub, &notifier, event, queued);

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "signal": SignalResponse::from(signal),
    })))
}

/// GET /admin/signals - Tous les signaux, annulés compris (ADMIN)
#[get("/signals")]
pub async fn list_all_signals(_admin: AdminUser, db: web::Data<DatabaseConnection>) -> Result<HttpResponse, AppError> {
    let signals: Vec<SignalResponse> = SignalService::list_signals(
        db.get_ref(),
        &FeedFilter { limit: MAX_FEED_LIMIT, ..Default::default() },
    )
    .await?
    .into_iter()
    .map(SignalResponse::from)
    .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "count": signals.len(),
        "signals": signals,
    })))
}

/// PATCH /admin/signals/{id} - Modifie niveaux / statut (ADMIN)
#[patch("/signals/{id}")]
pub async fn update_signal(
    _admin: AdminUser,
    path: web::Path<i32>,
    body: web::Json<UpdateSignalRequest>,
    db: web::Data<DatabaseConnection>,
    hub: web::Data<SignalHub>,
    notifier: web::Data<WebhookNotifier>,
) -> Result<HttpResponse, AppError> {
    let txn = db.begin().await?;
    let (signal, event_type) = SignalService::update_signal(&txn, path.into_inner(), body.into_inner()).await?;
    let event = SignalEvent::new(event_type, signal.clone());
    let queued = SignalService::enqueue_webhooks(&txn, &event).await?;
    txn.commit().await?;

    SignalService::announce(&hub, &notifier, event, queued);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "signal": SignalResponse::from(signal),
    })))
}

/// DELETE /admin/signals/{id} - Annulation (le signal reste en base) (ADMIN)
#[delete("/signals/{id}")]
pub async fn cancel_signal(
    _admin: AdminUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
    hub: web::Data<SignalHub>,
    notifier: web::Data<WebhookNotifier>,
) -> Result<HttpResponse, AppError> {
    let txn = db.begin().await?;
    let signal = SignalService::cancel_signal(&txn, path.into_inner()).await?;
    let event = SignalEvent::new(SignalEventType::Cancelled, signal.clone());
    let queued = SignalService::enqueue_webhooks(&txn, &event).await?;
    txn.commit().await?;

    SignalService::announce(&hub, &notifier, event, queued);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "signal": SignalResponse::from(signal),
    })))
}

// ============================================================================
// UTILISATEURS
// ============================================================================

#[get("/users")]
pub async fn list_users(_admin: AdminUser, db: web::Data<DatabaseConnection>) -> Result<HttpResponse, AppError> {
    let users: Vec<UserResponse> = UserService::list_users(db.get_ref())
        .await?
        .into_iter()
        .map(UserResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "count": users.len(),
        "users": users,
    })))
}

// ============================================================================
// COUPONS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateCouponRequest {
    pub code: String,
    #[serde(alias = "discount", alias = "discountPercent")]
    pub discount_percent: i32,
    #[serde(default, alias = "maxUses")]
    pub max_uses: Option<i32>,
    #[serde(default, alias = "expiresAt")]
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct SetCouponActiveRequest {
    pub active: bool,
}

#[post("/coupons")]
pub async fn create_coupon(
    _admin: AdminUser,
    body: web::Json<CreateCouponRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let coupon = CouponService::create(
        db.get_ref(),
        NewCoupon {
            code: body.code,
            discount_percent: body.discount_percent,
            max_uses: body.max_uses,
            expires_at: body.expires_at,
        },
    )
    .await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "coupon": coupon,
    })))
}

#[get("/coupons")]
pub async fn list_coupons(_admin: AdminUser, db: web::Data<DatabaseConnection>) -> Result<HttpResponse, AppError> {
    let coupons = CouponService::list(db.get_ref()).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "count": coupons.len(),
        "coupons": coupons,
    })))
}

/// PATCH /admin/coupons/{code} {"active": bool}
#[patch("/coupons/{code}")]
pub async fn set_coupon_active(
    _admin: AdminUser,
    path: web::Path<String>,
    body: web::Json<SetCouponActiveRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let coupon = CouponService::set_active(db.get_ref(), &path.into_inner(), body.active).await?;
    tracing::info!(coupon = %coupon.code, active = coupon.active, "coupon updated");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "coupon": coupon,
    })))
}

// ============================================================================
// WEBHOOKS SORTANTS
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateWebhookRequest {
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeliveriesQuery {
    pub limit: Option<u64>,
}

/// POST /admin/webhooks - Le secret n'est visible que dans cette réponse
#[post("/webhooks")]
pub async fn create_webhook(
    _admin: AdminUser,
    body: web::Json<CreateWebhookRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let subscription = WebhookService::create_subscription(db.get_ref(), &body.url, body.description).await?;
    tracing::info!(subscription_id = subscription.id, url = %subscription.url, "webhook subscription created");

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "secret": subscription.secret,
        "webhook": subscription,
    })))
}

#[get("/webhooks")]
pub async fn list_webhooks(_admin: AdminUser, db: web::Data<DatabaseConnection>) -> Result<HttpResponse, AppError> {
    let webhooks = WebhookService::list_subscriptions(db.get_ref()).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "count": webhooks.len(),
        "webhooks": webhooks,
    })))
}

#[delete("/webhooks/{id}")]
pub async fn delete_webhook(
    _admin: AdminUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    WebhookService::delete_subscription(db.get_ref(), id).await?;
    tracing::info!(subscription_id = id, "webhook subscription deleted");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": format!("Webhook {} deleted", id),
    })))
}

/// POST /admin/webhooks/{id}/enable - Réactive et remet les échecs à zéro
#[post("/webhooks/{id}/enable")]
pub async fn enable_webhook(
    _admin: AdminUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let webhook = WebhookService::enable_subscription(db.get_ref(), path.into_inner()).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "webhook": webhook,
    })))
}

#[get("/webhooks/{id}/deliveries")]
pub async fn list_deliveries(
    _admin: AdminUser,
    path: web::Path<i32>,
    query: web::Query<DeliveriesQuery>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    let limit = query.limit.unwrap_or(50).clamp(1, MAX_FEED_LIMIT);
    let deliveries = WebhookService::list_deliveries(db.get_ref(), path.into_inner(), limit).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "count": deliveries.len(),
        "deliveries": deliveries,
    })))
}

pub fn admin_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .service(create_signal)
            .service(list_all_signals)
            .service(update_signal)
            .service(cancel_signal)
            .service(list_users)
            .service(create_coupon)
            .service(list_coupons)
            .service(set_coupon_active)
            .service(create_webhook)
            .service(list_webhooks)
            .service(delete_webhook)
            .service(enable_webhook)
            .service(list_deliveries),
    );
}
