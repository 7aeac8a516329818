use serde::{Serialize, Deserialize};
use sea_orm::entity::prelude::*;

use super::users::PlanType;

/// Paiement enregistré (remplace payment_details)
/// Aucun numéro de carte n'est stocké, seulement les 4 derniers chiffres
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "payments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub plan_type: PlanType,
    pub amount_cents: i64,   // Montant payé après remise
    pub discount_cents: i64,
    pub currency: String,
    pub coupon_code: Option<String>,
    pub payment_method: String,
    pub card_last4: Option<String>,
    #[sea_orm(unique)]
    pub provider_reference: String,
    pub status: String, // 'completed'
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    User,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
