use actix_web::{get, post, web, HttpResponse};
use sea_orm::DatabaseConnection;
use serde::Deserialize;

use crate::config::Config;
use crate::errors::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::UserResponse;
use crate::models::users::PlanType;
use crate::services::payment_service::{NewPayment, PaymentService};

// Seuls les 4 derniers chiffres de carte sont acceptés: un numéro complet
// envoyé par un ancien client est rejeté par la validation
#[derive(Debug, Deserialize)]
pub struct PaymentRequest {
    #[serde(alias = "plan_type", alias = "membership_tier")]
    pub plan: String,
    #[serde(default, alias = "couponCode", alias = "coupon")]
    pub coupon_code: Option<String>,
    #[serde(alias = "paymentMethod")]
    pub payment_method: String,
    #[serde(default, alias = "cardLast4")]
    pub card_last4: Option<String>,
    #[serde(default, alias = "providerReference")]
    pub provider_reference: Option<String>,
}

/// POST /payments - Enregistre un paiement et active le plan (PROTÉGÉ)
#[post("")]
pub async fn create_payment(
    user: AuthUser,
    body: web::Json<PaymentRequest>,
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let plan: PlanType = body.plan.parse().map_err(AppError::Validation)?;

    let (payment, account) = PaymentService::record_payment(
        db.get_ref(),
        config.get_ref(),
        user.user_id,
        NewPayment {
            plan,
            coupon_code: body.coupon_code,
            payment_method: body.payment_method,
            card_last4: body.card_last4,
            provider_reference: body.provider_reference,
        },
    )
    .await?;

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "payment": payment,
        "user": UserResponse::from(account),
    })))
}

/// GET /payments - Historique des paiements de l'utilisateur (PROTÉGÉ)
#[get("")]
pub async fn list_payments(user: AuthUser, db: web::Data<DatabaseConnection>) -> Result<HttpResponse, AppError> {
    let payments = PaymentService::list_for_user(db.get_ref(), user.user_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "count": payments.len(),
        "payments": payments,
    })))
}

pub fn payment_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/payments")
            .service(create_payment)
            .service(list_payments),
    );
}
