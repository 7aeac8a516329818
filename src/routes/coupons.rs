use actix_web::{post, web, HttpResponse};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::errors::AppError;
use crate::models::users::PlanType;
use crate::services::coupon_service::{self, CouponService};

#[derive(Debug, Deserialize)]
pub struct ValidateCouponRequest {
    #[serde(alias = "coupon_code", alias = "couponCode")]
    pub code: String,
    #[serde(default, alias = "plan_type")]
    pub plan: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ValidateCouponResponse {
    pub success: bool,
    pub valid: bool,
    pub code: String,
    pub discount_percent: Option<i32>,
    pub original_cents: Option<i64>,
    pub final_cents: Option<i64>,
    pub message: String,
}

/// POST /coupons/validate - Vérifie un code promo (PUBLIC)
/// Un code refusé n'est pas une erreur HTTP: la réponse indique valid=false et la raison.
#[post("/validate")]
pub async fn validate_coupon(
    body: web::Json<ValidateCouponRequest>,
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let code = coupon_service::normalize_code(&body.code);
    if code.is_empty() {
        return Err(AppError::Validation("Coupon code is required".to_string()));
    }

    let plan = body
        .plan
        .as_deref()
        .map(str::parse::<PlanType>)
        .transpose()
        .map_err(AppError::Validation)?;

    let response = match CouponService::evaluate(db.get_ref(), &code).await? {
        Ok(coupon) => {
            let pricing = plan
                .filter(PlanType::is_paid)
                .map(|p| coupon_service::apply_discount(config.plan_price_cents(&p), coupon.discount_percent));

            ValidateCouponResponse {
                success: true,
                valid: true,
                code: coupon.code,
                discount_percent: Some(coupon.discount_percent),
                original_cents: pricing.map(|d| d.original_cents),
                final_cents: pricing.map(|d| d.final_cents),
                message: format!("{}% discount applied", coupon.discount_percent),
            }
        }
        Err(reason) => {
            tracing::debug!(coupon = %code, ?reason, "coupon rejected");
            ValidateCouponResponse {
                success: true,
                valid: false,
                code,
                discount_percent: None,
                original_cents: None,
                final_cents: None,
                message: reason.message().to_string(),
            }
        }
    };

    Ok(HttpResponse::Ok().json(response))
}

pub fn coupon_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/coupons").service(validate_coupon));
}

#[cfg(test)]
mod tests {
    use actix_web::test;
    use serde_json::{json, Value};

    use crate::services::coupon_service::{CouponService, NewCoupon};
    use crate::test_utils::{setup_db, test_app, test_state};

    #[actix_web::test]
    async fn test_validate_with_plan_pricing() {
        let db = setup_db().await;
        CouponService::create(
            &db,
            NewCoupon { code: "WELCOME20".to_string(), discount_percent: 20, max_uses: None, expires_at: None },
        )
        .await
        .unwrap();
        let state = test_state(db);
        let app = test::init_service(test_app(&state)).await;

        let req = test::TestRequest::post()
            .uri("/api/coupons/validate")
            .set_json(json!({"code": "welcome20", "plan": "premium"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["valid"], true);
        assert_eq!(body["discount_percent"], 20);
        assert_eq!(body["original_cents"], 4900);
        assert_eq!(body["final_cents"], 3920);

        let req = test::TestRequest::post()
            .uri("/api/coupons/validate")
            .set_json(json!({"coupon_code": "UNKNOWN"}))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["valid"], false);
        assert_eq!(body["message"], "Coupon code not found");
    }
}
