//pour les requêtes/réponses partagées entre routes et services
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::trading_signals::{self, SignalDirection, SignalSource, SignalStatus};
use super::users::{self, PlanType, UserRole};

#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: i32,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub trading_experience: Option<String>,
    pub referral_source: Option<String>,
    pub newsletter_opt_in: bool,
    pub plan_type: PlanType,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

impl From<users::Model> for UserResponse {
    fn from(user: users::Model) -> Self {
        Self {
            id: user.id,
            email: user.email,
            first_name: user.first_name,
            last_name: user.last_name,
            phone: user.phone,
            country: user.country,
            trading_experience: user.trading_experience,
            referral_source: user.referral_source,
            newsletter_opt_in: user.newsletter_opt_in,
            plan_type: user.plan_type,
            role: user.role,
            created_at: user.created_at,
        }
    }
}

/// Corps accepté pour créer un signal (admin ou webhook entrant).
/// Les alias couvrent les différents noms de champs envoyés par les anciens clients.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateSignalRequest {
    #[serde(alias = "symbol")]
    pub pair: String,
    #[serde(alias = "side", alias = "action")]
    pub direction: String,
    #[serde(alias = "entry", alias = "entryPrice")]
    pub entry_price: f64,
    #[serde(alias = "stop", alias = "stopLoss", alias = "sl")]
    pub stop_loss: f64,
    #[serde(alias = "target", alias = "takeProfit", alias = "tp")]
    pub take_profit: f64,
    #[serde(default = "default_confidence", alias = "confidence_score", alias = "confidenceScore")]
    pub confidence: i32,
    pub timeframe: Option<String>,
    #[serde(alias = "notes", alias = "reason")]
    pub analysis: Option<String>,
}

fn default_confidence() -> i32 {
    50
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSignalRequest {
    pub status: Option<String>,
    #[serde(alias = "stop", alias = "stopLoss")]
    pub stop_loss: Option<f64>,
    #[serde(alias = "target", alias = "takeProfit")]
    pub take_profit: Option<f64>,
    pub confidence: Option<i32>,
    pub analysis: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalResponse {
    pub id: i32,
    pub pair: String,
    pub direction: SignalDirection,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub confidence: i32,
    pub risk_reward: Option<f64>,
    pub timeframe: Option<String>,
    pub analysis: Option<String>,
    pub status: SignalStatus,
    pub source: SignalSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl From<trading_signals::Model> for SignalResponse {
    fn from(signal: trading_signals::Model) -> Self {
        Self {
            id: signal.id,
            risk_reward: risk_reward(signal.entry_price, signal.stop_loss, signal.take_profit),
            pair: signal.pair,
            direction: signal.direction,
            entry_price: signal.entry_price,
            stop_loss: signal.stop_loss,
            take_profit: signal.take_profit,
            confidence: signal.confidence,
            timeframe: signal.timeframe,
            analysis: signal.analysis,
            status: signal.status,
            source: signal.source,
            created_at: signal.created_at,
            updated_at: signal.updated_at,
            closed_at: signal.closed_at,
        }
    }
}

/// Ratio gain/risque arrondi à 2 décimales
pub fn risk_reward(entry: f64, stop: f64, target: f64) -> Option<f64> {
    let risk = (entry - stop).abs();
    if risk == 0.0 || !risk.is_finite() {
        return None;
    }
    let ratio = (target - entry).abs() / risk;
    Some((ratio * 100.0).round() / 100.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalEventType {
    #[serde(rename = "signal.created")]
    Created,
    #[serde(rename = "signal.updated")]
    Updated,
    #[serde(rename = "signal.cancelled")]
    Cancelled,
}

impl SignalEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalEventType::Created => "signal.created",
            SignalEventType::Updated => "signal.updated",
            SignalEventType::Cancelled => "signal.cancelled",
        }
    }
}

/// Événement diffusé aux clients SSE et aux abonnés webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalEvent {
    #[serde(rename = "type")]
    pub event_type: SignalEventType,
    pub timestamp: DateTime<Utc>,
    pub data: SignalResponse,
}

impl SignalEvent {
    pub fn new(event_type: SignalEventType, signal: trading_signals::Model) -> Self {
        Self {
            event_type,
            timestamp: Utc::now(),
            data: signal.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SignalStats {
    pub active: u64,
    pub hit_target: u64,
    pub hit_stop: u64,
    // Pourcentage de signaux gagnants parmi les signaux résolus (None si aucun)
    pub win_rate: Option<f64>,
}
