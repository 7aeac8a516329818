use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::sea_query::Expr;
use sea_orm::*;

use crate::errors::AppError;
use crate::models::coupons;

pub struct CouponService;

/// Raison pour laquelle un code est refusé
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponRejection {
    Unknown,
    Inactive,
    Expired,
    Exhausted,
}

impl CouponRejection {
    pub fn message(&self) -> &'static str {
        match self {
            CouponRejection::Unknown => "Coupon code not found",
            CouponRejection::Inactive => "Coupon is no longer active",
            CouponRejection::Expired => "Coupon has expired",
            CouponRejection::Exhausted => "Coupon usage limit reached",
        }
    }
}

/// Prix après remise, en centimes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Discount {
    pub original_cents: i64,
    pub discount_cents: i64,
    pub final_cents: i64,
}

#[derive(Debug, Clone)]
pub struct NewCoupon {
    pub code: String,
    pub discount_percent: i32,
    pub max_uses: Option<i32>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CouponService {
    /// Recherche le coupon et vérifie qu'il est utilisable maintenant
    pub async fn evaluate<C: ConnectionTrait>(
        db: &C,
        code: &str,
    ) -> Result<Result<coupons::Model, CouponRejection>, AppError> {
        let code = normalize_code(code);
        let Some(coupon) = coupons::Entity::find()
            .filter(coupons::Column::Code.eq(code))
            .one(db)
            .await?
        else {
            return Ok(Err(CouponRejection::Unknown));
        };

        Ok(check_usable(coupon, Utc::now()))
    }

    /// Incrémente used_count si la limite le permet. Le garde est dans le UPDATE:
    /// deux paiements concurrents ne peuvent pas dépasser max_uses.
    pub async fn redeem<C: ConnectionTrait>(db: &C, coupon_id: i32) -> Result<(), AppError> {
        let result = coupons::Entity::update_many()
            .col_expr(
                coupons::Column::UsedCount,
                Expr::col(coupons::Column::UsedCount).add(1),
            )
            .filter(coupons::Column::Id.eq(coupon_id))
            .filter(coupons::Column::Active.eq(true))
            .filter(
                Condition::any()
                    .add(coupons::Column::MaxUses.is_null())
                    .add(Expr::col(coupons::Column::UsedCount).lt(Expr::col(coupons::Column::MaxUses))),
            )
            .exec(db)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::Conflict(CouponRejection::Exhausted.message().to_string()));
        }
        Ok(())
    }

    pub async fn create(db: &DatabaseConnection, new_coupon: NewCoupon) -> Result<coupons::Model, AppError> {
        let code = normalize_code(&new_coupon.code);
        if code.is_empty() || !code.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(AppError::Validation(
                "Coupon code must contain only letters, digits, '-' or '_'".to_string(),
            ));
        }
        if !(1..=100).contains(&new_coupon.discount_percent) {
            return Err(AppError::Validation("discount_percent must be between 1 and 100".to_string()));
        }
        if new_coupon.max_uses.is_some_and(|m| m < 1) {
            return Err(AppError::Validation("max_uses must be at least 1".to_string()));
        }

        let coupon = coupons::ActiveModel {
            code: Set(code),
            discount_percent: Set(new_coupon.discount_percent),
            max_uses: Set(new_coupon.max_uses),
            used_count: Set(0),
            active: Set(true),
            expires_at: Set(new_coupon.expires_at),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        let coupon = coupon
            .insert(db)
            .await
            .map_err(|e| AppError::from_db_conflict(e, "Coupon code already exists"))?;

        tracing::info!(coupon = %coupon.code, percent = coupon.discount_percent, "coupon created");
        Ok(coupon)
    }

    pub async fn list(db: &DatabaseConnection) -> Result<Vec<coupons::Model>, AppError> {
        Ok(coupons::Entity::find()
            .order_by_desc(coupons::Column::CreatedAt)
            .all(db)
            .await?)
    }

    pub async fn set_active(db: &DatabaseConnection, code: &str, active: bool) -> Result<coupons::Model, AppError> {
        let code = normalize_code(code);
        let coupon = coupons::Entity::find()
            .filter(coupons::Column::Code.eq(code.clone()))
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Coupon {} not found", code)))?;

        let mut model: coupons::ActiveModel = coupon.into();
        model.active = Set(active);
        Ok(model.update(db).await?)
    }
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

fn check_usable(coupon: coupons::Model, now: DateTime<Utc>) -> Result<coupons::Model, CouponRejection> {
    if !coupon.active {
        return Err(CouponRejection::Inactive);
    }
    if coupon.expires_at.is_some_and(|exp| exp <= now) {
        return Err(CouponRejection::Expired);
    }
    if coupon.max_uses.is_some_and(|max| coupon.used_count >= max) {
        return Err(CouponRejection::Exhausted);
    }
    Ok(coupon)
}

/// Applique un pourcentage de remise. Arrondi au centime, demi vers le haut.
pub fn apply_discount(original_cents: i64, discount_percent: i32) -> Discount {
    let percent = Decimal::from(discount_percent.clamp(0, 100));
    let discount = (Decimal::from(original_cents) * percent / Decimal::ONE_HUNDRED)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);

    let discount_cents = discount.to_i64().unwrap_or(0).min(original_cents);
    Discount {
        original_cents,
        discount_cents,
        final_cents: original_cents - discount_cents,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::setup_db;

    fn coupon(code: &str, percent: i32, max_uses: Option<i32>) -> NewCoupon {
        NewCoupon {
            code: code.to_string(),
            discount_percent: percent,
            max_uses,
            expires_at: None,
        }
    }

    #[test]
    fn test_apply_discount_rounding() {
        assert_eq!(
            apply_discount(4900, 15),
            Discount { original_cents: 4900, discount_cents: 735, final_cents: 4165 }
        );
        // 999 * 25% = 249.75 → 250
        assert_eq!(apply_discount(999, 25).discount_cents, 250);
        // 4950 * 1% = 49.5 → 50
        assert_eq!(apply_discount(4950, 1).discount_cents, 50);
        assert_eq!(apply_discount(9900, 100).final_cents, 0);
    }

    #[actix_web::test]
    async fn test_evaluate_reasons() {
        let db = setup_db().await;
        CouponService::create(&db, coupon("save10", 10, None)).await.unwrap();

        let ok = CouponService::evaluate(&db, " SAVE10 ").await.unwrap();
        assert_eq!(ok.unwrap().discount_percent, 10);

        let unknown = CouponService::evaluate(&db, "NOPE").await.unwrap();
        assert_eq!(unknown.unwrap_err(), CouponRejection::Unknown);

        CouponService::set_active(&db, "save10", false).await.unwrap();
        let inactive = CouponService::evaluate(&db, "SAVE10").await.unwrap();
        assert_eq!(inactive.unwrap_err(), CouponRejection::Inactive);

        let expired = NewCoupon {
            expires_at: Some(Utc::now() - chrono::Duration::days(1)),
            ..coupon("OLD", 20, None)
        };
        CouponService::create(&db, expired).await.unwrap();
        let result = CouponService::evaluate(&db, "old").await.unwrap();
        assert_eq!(result.unwrap_err(), CouponRejection::Expired);
    }

    #[actix_web::test]
    async fn test_redeem_respects_max_uses() {
        let db = setup_db().await;
        let created = CouponService::create(&db, coupon("ONCE", 50, Some(1))).await.unwrap();

        CouponService::redeem(&db, created.id).await.unwrap();
        let err = CouponService::redeem(&db, created.id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let result = CouponService::evaluate(&db, "ONCE").await.unwrap();
        assert_eq!(result.unwrap_err(), CouponRejection::Exhausted);
    }

    #[actix_web::test]
    async fn test_create_validation() {
        let db = setup_db().await;
        assert!(CouponService::create(&db, coupon("BAD CODE", 10, None)).await.is_err());
        assert!(CouponService::create(&db, coupon("ZERO", 0, None)).await.is_err());
        assert!(CouponService::create(&db, coupon("LIMIT", 10, Some(0))).await.is_err());

        CouponService::create(&db, coupon("DUP", 10, None)).await.unwrap();
        let err = CouponService::create(&db, coupon("dup", 5, None)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
