use chrono::Utc;
use sea_orm::*;

use crate::errors::AppError;
use crate::models::dto::{CreateSignalRequest, SignalEvent, SignalEventType, SignalStats, UpdateSignalRequest};
use crate::models::trading_signals::{self, SignalDirection, SignalSource, SignalStatus};
use crate::models::users::PlanType;
use crate::services::signal_hub::SignalHub;
use crate::services::webhook_dispatcher::{WebhookNotifier, WebhookService};

pub const DEFAULT_FEED_LIMIT: u64 = 50;
pub const MAX_FEED_LIMIT: u64 = 200;

/// Filtres du fil de signaux (GET /api/signals)
#[derive(Debug, Clone, Default)]
pub struct FeedFilter {
    pub status: Option<SignalStatus>,
    pub pair: Option<String>,
    pub since_id: Option<i32>,
    // Plus petit id visible (fenêtre du plan gratuit)
    pub min_id: Option<i32>,
    pub limit: u64,
}

pub struct SignalService;

impl SignalService {
    /// Crée un signal après validation complète
    pub async fn create_signal<C: ConnectionTrait>(
        db: &C,
        request: CreateSignalRequest,
        source: SignalSource,
        created_by: Option<i32>,
        external_id: Option<String>,
    ) -> Result<trading_signals::Model, AppError> {
        let pair = normalize_pair(&request.pair)?;
        let direction: SignalDirection = request.direction.parse().map_err(AppError::Validation)?;
        validate_levels(&direction, request.entry_price, request.stop_loss, request.take_profit)?;
        validate_confidence(request.confidence)?;

        let now = Utc::now();
        let new_signal = trading_signals::ActiveModel {
            pair: Set(pair),
            direction: Set(direction),
            entry_price: Set(request.entry_price),
            stop_loss: Set(request.stop_loss),
            take_profit: Set(request.take_profit),
            confidence: Set(request.confidence),
            timeframe: Set(clean(request.timeframe)),
            analysis: Set(clean(request.analysis)),
            status: Set(SignalStatus::Active),
            source: Set(source),
            external_id: Set(external_id),
            created_by: Set(created_by),
            created_at: Set(now),
            updated_at: Set(now),
            closed_at: Set(None),
            ..Default::default()
        };

        new_signal
            .insert(db)
            .await
            .map_err(|e| AppError::from_db_conflict(e, "Signal already received"))
    }

    pub async fn get_signal<C: ConnectionTrait>(
        db: &C,
        id: i32,
    ) -> Result<trading_signals::Model, AppError> {
        trading_signals::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Signal {} not found", id)))
    }

    pub async fn find_by_external_id<C: ConnectionTrait>(
        db: &C,
        external_id: &str,
    ) -> Result<Option<trading_signals::Model>, AppError> {
        Ok(trading_signals::Entity::find()
            .filter(trading_signals::Column::ExternalId.eq(external_id))
            .one(db)
            .await?)
    }

    /// Modifie un signal actif (niveaux, confiance, analyse) et/ou le fait changer d'état.
    /// Retourne le type d'événement à diffuser.
    pub async fn update_signal<C: ConnectionTrait>(
        db: &C,
        id: i32,
        request: UpdateSignalRequest,
    ) -> Result<(trading_signals::Model, SignalEventType), AppError> {
        let signal = Self::get_signal(db, id).await?;

        if signal.status.is_terminal() {
            return Err(AppError::Conflict(format!(
                "Signal {} is already {:?} and can no longer change",
                id, signal.status
            )));
        }

        let next_status = request
            .status
            .as_deref()
            .map(str::parse::<SignalStatus>)
            .transpose()
            .map_err(AppError::Validation)?;

        if let Some(ref next) = next_status {
            if !signal.status.can_transition_to(next) {
                return Err(AppError::Conflict(format!(
                    "Cannot move signal {} from {:?} to {:?}",
                    id, signal.status, next
                )));
            }
        }

        let stop_loss = request.stop_loss.unwrap_or(signal.stop_loss);
        let take_profit = request.take_profit.unwrap_or(signal.take_profit);
        validate_levels(&signal.direction, signal.entry_price, stop_loss, take_profit)?;
        if let Some(confidence) = request.confidence {
            validate_confidence(confidence)?;
        }

        let now = Utc::now();
        let event_type = match next_status {
            Some(SignalStatus::Cancelled) => SignalEventType::Cancelled,
            _ => SignalEventType::Updated,
        };

        let mut active: trading_signals::ActiveModel = signal.into();
        active.stop_loss = Set(stop_loss);
        active.take_profit = Set(take_profit);
        if let Some(confidence) = request.confidence {
            active.confidence = Set(confidence);
        }
        if request.analysis.is_some() {
            active.analysis = Set(clean(request.analysis));
        }
        if let Some(next) = next_status {
            active.status = Set(next);
            active.closed_at = Set(Some(now));
        }
        active.updated_at = Set(now);

        let updated = active.update(db).await?;
        Ok((updated, event_type))
    }

    /// Suppression logique: le signal passe à 'cancelled'
    pub async fn cancel_signal<C: ConnectionTrait>(
        db: &C,
        id: i32,
    ) -> Result<trading_signals::Model, AppError> {
        let request = UpdateSignalRequest {
            status: Some("cancelled".to_string()),
            ..Default::default()
        };
        let (signal, _) = Self::update_signal(db, id, request).await?;
        Ok(signal)
    }

    /// Fil de signaux, plus récent d'abord
    pub async fn list_signals<C: ConnectionTrait>(
        db: &C,
        filter: &FeedFilter,
    ) -> Result<Vec<trading_signals::Model>, AppError> {
        let mut query = trading_signals::Entity::find();

        if let Some(ref status) = filter.status {
            query = query.filter(trading_signals::Column::Status.eq(status.clone()));
        }
        if let Some(ref pair) = filter.pair {
            query = query.filter(trading_signals::Column::Pair.eq(normalize_pair(pair)?));
        }
        if let Some(since_id) = filter.since_id {
            query = query.filter(trading_signals::Column::Id.gt(since_id));
        }
        if let Some(min_id) = filter.min_id {
            query = query.filter(trading_signals::Column::Id.gte(min_id));
        }

        Ok(query
            .order_by_desc(trading_signals::Column::Id)
            .limit(filter.limit)
            .all(db)
            .await?)
    }

    /// Plus ancien id de la fenêtre des `window` derniers signaux, tous statuts confondus.
    /// Les filtres s'appliquent ensuite à l'intérieur de cette fenêtre.
    pub async fn window_floor<C: ConnectionTrait>(db: &C, window: u64) -> Result<Option<i32>, AppError> {
        let ids: Vec<i32> = trading_signals::Entity::find()
            .select_only()
            .column(trading_signals::Column::Id)
            .order_by_desc(trading_signals::Column::Id)
            .limit(window)
            .into_tuple()
            .all(db)
            .await?;
        Ok(ids.last().copied())
    }

    pub async fn stats<C: ConnectionTrait>(db: &C) -> Result<SignalStats, AppError> {
        let count_status = |status: SignalStatus| {
            trading_signals::Entity::find()
                .filter(trading_signals::Column::Status.eq(status))
                .count(db)
        };

        let active = count_status(SignalStatus::Active).await?;
        let hit_target = count_status(SignalStatus::HitTarget).await?;
        let hit_stop = count_status(SignalStatus::HitStop).await?;

        let resolved = hit_target + hit_stop;
        let win_rate = if resolved == 0 {
            None
        } else {
            Some(((hit_target as f64 / resolved as f64) * 10000.0).round() / 100.0)
        };

        Ok(SignalStats {
            active,
            hit_target,
            hit_stop,
            win_rate,
        })
    }

    /// Écrit la file webhook d'un événement. À appeler dans la transaction
    /// qui écrit le signal: les deux sont validés ensemble.
    pub async fn enqueue_webhooks<C: ConnectionTrait>(db: &C, event: &SignalEvent) -> Result<u64, AppError> {
        WebhookService::enqueue_event(db, event).await.map(|n| n as u64)
    }

    /// Diffusion après commit: réveille le dispatcher puis pousse aux clients SSE.
    /// Ne bloque jamais.
    pub fn announce(hub: &SignalHub, notifier: &WebhookNotifier, event: SignalEvent, queued: u64) {
        if queued > 0 {
            notifier.notify();
        }

        let signal_id = event.data.id;
        let event_type = event.event_type.as_str();
        let listeners = hub.publish(event);
        tracing::info!(signal_id, event_type, listeners, webhooks = queued, "signal event announced");
    }
}

pub fn is_feed_limited(plan: &PlanType, is_admin: bool) -> bool {
    !plan.is_paid() && !is_admin
}

/// Nombre de signaux visibles pour un plan: le plan gratuit ne voit que les plus récents
pub fn visible_limit(requested: Option<u64>, plan: &PlanType, is_admin: bool, free_limit: u64) -> u64 {
    let limit = requested.unwrap_or(DEFAULT_FEED_LIMIT).clamp(1, MAX_FEED_LIMIT);
    if is_feed_limited(plan, is_admin) {
        limit.min(free_limit)
    } else {
        limit
    }
}

/// Normalise une paire: "eurusd", "EUR-USD", "eur/usd" → "EUR/USD"
pub fn normalize_pair(raw: &str) -> Result<String, AppError> {
    let cleaned: String = raw
        .trim()
        .to_uppercase()
        .chars()
        .map(|c| if c == '-' || c == '_' || c == ' ' { '/' } else { c })
        .collect();

    let invalid = || {
        AppError::Validation(format!(
            "Invalid pair: '{}'. Expected BASE/QUOTE (e.g. EUR/USD) or a 6-letter symbol",
            raw.trim()
        ))
    };

    let (base, quote) = match cleaned.split_once('/') {
        Some((base, quote)) => (base.to_string(), quote.to_string()),
        None if cleaned.len() == 6 && cleaned.chars().all(|c| c.is_ascii_alphabetic()) => {
            (cleaned[..3].to_string(), cleaned[3..].to_string())
        }
        None => return Err(invalid()),
    };

    let valid_part = |part: &str| {
        (2..=10).contains(&part.len()) && part.chars().all(|c| c.is_ascii_alphanumeric())
    };
    if !valid_part(&base) || !valid_part(&quote) {
        return Err(invalid());
    }

    Ok(format!("{}/{}", base, quote))
}

/// Cohérence des niveaux:
///   achat: stop < entrée < objectif
///   vente: objectif < entrée < stop
pub fn validate_levels(
    direction: &SignalDirection,
    entry: f64,
    stop: f64,
    target: f64,
) -> Result<(), AppError> {
    for (name, value) in [("entry_price", entry), ("stop_loss", stop), ("take_profit", target)] {
        if !value.is_finite() || value <= 0.0 {
            return Err(AppError::Validation(format!("{} must be a positive number", name)));
        }
    }

    match direction {
        SignalDirection::Buy if !(stop < entry && entry < target) => Err(AppError::Validation(
            "For a buy signal: stop_loss < entry_price < take_profit".to_string(),
        )),
        SignalDirection::Sell if !(target < entry && entry < stop) => Err(AppError::Validation(
            "For a sell signal: take_profit < entry_price < stop_loss".to_string(),
        )),
        _ => Ok(()),
    }
}

fn validate_confidence(confidence: i32) -> Result<(), AppError> {
    if !(0..=100).contains(&confidence) {
        return Err(AppError::Validation("confidence must be between 0 and 100".to_string()));
    }
    Ok(())
}

fn clean(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
