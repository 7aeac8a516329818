use chrono::Utc;
use sea_orm::*;
use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::payments;
use crate::models::users::{self, PlanType};
use crate::services::coupon_service::{self, CouponService};
use crate::services::user_service::UserService;

pub const PAYMENT_METHODS: [&str; 4] = ["card", "paypal", "crypto", "bank_transfer"];
const STATUS_COMPLETED: &str = "completed";

pub struct PaymentService;

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub plan: PlanType,
    pub coupon_code: Option<String>,
    pub payment_method: String,
    pub card_last4: Option<String>,
    pub provider_reference: Option<String>,
}

impl PaymentService {
    /// Enregistre le paiement, consomme le coupon et passe l'utilisateur au plan payé.
    /// Tout se fait dans une transaction: un échec n'en laisse aucune trace.
    pub async fn record_payment(
        db: &DatabaseConnection,
        config: &Config,
        user_id: i32,
        payment: NewPayment,
    ) -> Result<(payments::Model, users::Model), AppError> {
        if !payment.plan.is_paid() {
            return Err(AppError::Validation("Plan must be premium or vip".to_string()));
        }

        let payment_method = payment.payment_method.trim().to_lowercase();
        if !PAYMENT_METHODS.contains(&payment_method.as_str()) {
            return Err(AppError::Validation(format!(
                "Invalid payment_method. Must be one of: {}",
                PAYMENT_METHODS.join(", ")
            )));
        }

        let card_last4 = payment.card_last4.map(|c| c.trim().to_string()).filter(|c| !c.is_empty());
        if let Some(last4) = &card_last4 {
            if last4.len() != 4 || !last4.chars().all(|c| c.is_ascii_digit()) {
                return Err(AppError::Validation("card_last4 must be exactly 4 digits".to_string()));
            }
        }

        let provider_reference = payment
            .provider_reference
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| format!("pay_{}", Uuid::new_v4().simple()));

        let txn = db.begin().await?;

        let user = UserService::find_by_id(&txn, user_id).await?;
        let original_cents = config.plan_price_cents(&payment.plan);

        let coupon_code = payment
            .coupon_code
            .as_deref()
            .map(coupon_service::normalize_code)
            .filter(|c| !c.is_empty());

        let (coupon, discount) = match &coupon_code {
            Some(code) => {
                let coupon = CouponService::evaluate(&txn, code)
                    .await?
                    .map_err(|reason| AppError::Validation(reason.message().to_string()))?;
                let discount = coupon_service::apply_discount(original_cents, coupon.discount_percent);
                (Some(coupon), discount)
            }
            None => (None, coupon_service::apply_discount(original_cents, 0)),
        };

        let record = payments::ActiveModel {
            user_id: Set(user.id),
            plan_type: Set(payment.plan.clone()),
            amount_cents: Set(discount.final_cents),
            discount_cents: Set(discount.discount_cents),
            currency: Set(config.plan_currency.clone()),
            coupon_code: Set(coupon.as_ref().map(|c| c.code.clone())),
            payment_method: Set(payment_method),
            card_last4: Set(card_last4),
            provider_reference: Set(provider_reference),
            status: Set(STATUS_COMPLETED.to_string()),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| AppError::from_db_conflict(e, "Payment already recorded"))?;

        if let Some(coupon) = &coupon {
            CouponService::redeem(&txn, coupon.id).await?;
        }

        let mut active: users::ActiveModel = user.into();
        active.plan_type = Set(payment.plan);
        active.updated_at = Set(Utc::now());
        let user = active.update(&txn).await?;

        txn.commit().await?;

        tracing::info!(
            user_id,
            payment_id = record.id,
            plan = %record.plan_type,
            amount_cents = record.amount_cents,
            coupon = record.coupon_code.as_deref().unwrap_or("-"),
            "payment recorded"
        );

        Ok((record, user))
    }

    /// Paiements de l'utilisateur, du plus récent au plus ancien
    pub async fn list_for_user<C: ConnectionTrait>(
        db: &C,
        user_id: i32,
    ) -> Result<Vec<payments::Model>, AppError> {
        Ok(payments::Entity::find()
            .filter(payments::Column::UserId.eq(user_id))
            .order_by_desc(payments::Column::CreatedAt)
            .order_by_desc(payments::Column::Id)
            .all(db)
            .await?)
    }

    pub async fn latest_for_user<C: ConnectionTrait>(
        db: &C,
        user_id: i32,
    ) -> Result<Option<payments::Model>, AppError> {
        Ok(payments::Entity::find()
            .filter(payments::Column::UserId.eq(user_id))
            .order_by_desc(payments::Column::CreatedAt)
            .order_by_desc(payments::Column::Id)
            .one(db)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::coupon_service::NewCoupon;
    use crate::test_utils::{register_user, setup_db, test_config};

    fn premium(coupon: Option<&str>, reference: Option<&str>) -> NewPayment {
        NewPayment {
            plan: PlanType::Premium,
            coupon_code: coupon.map(str::to_string),
            payment_method: "Card".to_string(),
            card_last4: Some("4242".to_string()),
            provider_reference: reference.map(str::to_string),
        }
    }

    #[actix_web::test]
    async fn test_payment_upgrades_plan() {
        let db = setup_db().await;
        let config = test_config();
        let user = register_user(&db, "buyer@example.com").await;

        let (payment, user) = PaymentService::record_payment(&db, &config, user.id, premium(None, None))
            .await
            .unwrap();

        assert_eq!(user.plan_type, PlanType::Premium);
        assert_eq!(payment.amount_cents, config.premium_price_cents);
        assert_eq!(payment.discount_cents, 0);
        assert_eq!(payment.payment_method, "card");
        assert!(payment.provider_reference.starts_with("pay_"));
    }

    #[actix_web::test]
    async fn test_coupon_applied_and_counted() {
        let db = setup_db().await;
        let config = test_config();
        let user = register_user(&db, "saver@example.com").await;
        CouponService::create(
            &db,
            NewCoupon { code: "HALF".to_string(), discount_percent: 50, max_uses: Some(1), expires_at: None },
        )
        .await
        .unwrap();

        let (payment, _) = PaymentService::record_payment(&db, &config, user.id, premium(Some("half"), None))
            .await
            .unwrap();
        assert_eq!(payment.coupon_code.as_deref(), Some("HALF"));
        assert_eq!(payment.discount_cents, config.premium_price_cents / 2);

        // Le coupon est épuisé: le second paiement échoue sans rien enregistrer
        let err = PaymentService::record_payment(&db, &config, user.id, premium(Some("HALF"), None))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(PaymentService::list_for_user(&db, user.id).await.unwrap().len(), 1);
    }

    #[actix_web::test]
    async fn test_duplicate_reference_rolls_back() {
        let db = setup_db().await;
        let config = test_config();
        let user = register_user(&db, "dup@example.com").await;

        PaymentService::record_payment(&db, &config, user.id, premium(None, Some("ref-1")))
            .await
            .unwrap();

        let vip = NewPayment { plan: PlanType::Vip, ..premium(None, Some("ref-1")) };
        let err = PaymentService::record_payment(&db, &config, user.id, vip).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let user = UserService::find_by_id(&db, user.id).await.unwrap();
        assert_eq!(user.plan_type, PlanType::Premium);
    }

    #[actix_web::test]
    async fn test_invalid_input_rejected() {
        let db = setup_db().await;
        let config = test_config();
        let user = register_user(&db, "bad@example.com").await;

        let free = NewPayment { plan: PlanType::Free, ..premium(None, None) };
        assert!(PaymentService::record_payment(&db, &config, user.id, free).await.is_err());

        let card = NewPayment { card_last4: Some("4242424242424242".to_string()), ..premium(None, None) };
        assert!(PaymentService::record_payment(&db, &config, user.id, card).await.is_err());

        let method = NewPayment { payment_method: "cash".to_string(), ..premium(None, None) };
        assert!(PaymentService::record_payment(&db, &config, user.id, method).await.is_err());

        let unknown = PaymentService::record_payment(&db, &config, user.id, premium(Some("NOPE"), None))
            .await
            .unwrap_err();
        assert!(matches!(unknown, AppError::Validation(_)));
    }
}
