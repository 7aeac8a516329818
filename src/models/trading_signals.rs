use std::str::FromStr;

use serde::{Serialize, Deserialize};
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum SignalDirection {
    #[sea_orm(string_value = "buy")]
    Buy,
    #[sea_orm(string_value = "sell")]
    Sell,
}

impl FromStr for SignalDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "buy" | "long" => Ok(SignalDirection::Buy),
            "sell" | "short" => Ok(SignalDirection::Sell),
            other => Err(format!("Invalid direction: {other}. Must be buy or sell")),
        }
    }
}

/// Cycle de vie d'un signal:
///   active → hit_target | hit_stop | closed | cancelled
/// Les états finaux ne changent plus.
#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "hit_target")]
    HitTarget,
    #[sea_orm(string_value = "hit_stop")]
    HitStop,
    #[sea_orm(string_value = "closed")]
    Closed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl SignalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SignalStatus::Active)
    }

    pub fn can_transition_to(&self, next: &SignalStatus) -> bool {
        matches!(self, SignalStatus::Active) && *next != SignalStatus::Active
    }
}

impl FromStr for SignalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" => Ok(SignalStatus::Active),
            "hit_target" => Ok(SignalStatus::HitTarget),
            "hit_stop" => Ok(SignalStatus::HitStop),
            "closed" => Ok(SignalStatus::Closed),
            "cancelled" => Ok(SignalStatus::Cancelled),
            other => Err(format!(
                "Invalid status: {other}. Must be one of: active, hit_target, hit_stop, closed, cancelled"
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum SignalSource {
    #[sea_orm(string_value = "admin")]
    Admin,
    #[sea_orm(string_value = "webhook")]
    Webhook,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "trading_signals")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub pair: String, // Format normalisé: "EUR/USD"
    pub direction: SignalDirection,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub confidence: i32, // 0 à 100
    pub timeframe: Option<String>,
    pub analysis: Option<String>,
    pub status: SignalStatus,
    pub source: SignalSource,
    // Identifiant du message webhook entrant (idempotence des relivraisons)
    #[sea_orm(unique)]
    pub external_id: Option<String>,
    pub created_by: Option<i32>,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub closed_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::CreatedBy",
        to = "super::users::Column::Id"
    )]
    Author,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Author.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
