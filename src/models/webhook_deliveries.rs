// ============================================================================
// MODÈLE : WEBHOOK DELIVERIES
// ============================================================================
//
// Workflow:
//   1. Un signal est créé / modifié / annulé
//   2. Une ligne 'pending' est insérée par abonné actif (même requête HTTP)
//   3. Le dispatcher réclame les lignes dues (next_attempt_at <= now)
//   4. Succès 2xx → 'delivered'
//      Échec → attempts + 1, next_attempt_at selon le retry schedule
//      Schedule épuisé → 'exhausted' et failure_count de l'abonné + 1
//
// Points d'attention:
//   - La file est en base: un redémarrage ne perd pas les livraisons
//   - event_id est réutilisé comme en-tête webhook-id (idempotence côté client)
//
// ============================================================================

use serde::{Serialize, Deserialize};
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "delivered")]
    Delivered,
    #[sea_orm(string_value = "exhausted")]
    Exhausted,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "webhook_deliveries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub subscription_id: i32,
    pub event_id: String,
    pub event_type: String,
    pub payload: String, // JSON sérialisé, signé tel quel
    pub status: DeliveryStatus,
    pub attempts: i32,
    pub next_attempt_at: DateTimeUtc,
    pub last_status_code: Option<i32>,
    pub last_error: Option<String>,
    pub created_at: DateTimeUtc,
    pub delivered_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::webhook_subscriptions::Entity",
        from = "Column::SubscriptionId",
        to = "super::webhook_subscriptions::Column::Id",
        on_delete = "Cascade"
    )]
    Subscription,
}

impl Related<super::webhook_subscriptions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Subscription.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
