use std::convert::Infallible;
use std::time::Duration;

use actix_web::{get, web, HttpResponse};
use futures::future::ready;
use futures::stream::{self, StreamExt};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};

use crate::config::Config;
use crate::errors::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::{SignalEvent, SignalResponse};
use crate::models::trading_signals::SignalStatus;
use crate::services::signal_hub::SignalHub;
use crate::services::signal_service::{self, FeedFilter, SignalService};
use crate::services::user_service::UserService;

const KEEP_ALIVE: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub status: Option<String>,
    pub pair: Option<String>,
    pub since_id: Option<i32>,
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    pub pair: Option<String>,
}

/// GET /signals - Fil des signaux, plus récent d'abord (PROTÉGÉ)
/// Le plan gratuit ne voit que les FREE_FEED_LIMIT derniers signaux: les filtres
/// s'appliquent à l'intérieur de cette fenêtre.
#[get("")]
pub async fn list_signals(
    user: AuthUser,
    query: web::Query<FeedQuery>,
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let query = query.into_inner();
    let account = UserService::find_by_id(db.get_ref(), user.user_id).await?;

    let status = query
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(str::parse::<SignalStatus>)
        .transpose()
        .map_err(AppError::Validation)?;

    let limit = signal_service::visible_limit(
        query.limit,
        &account.plan_type,
        user.is_admin(),
        config.free_feed_limit,
    );
    let limited = signal_service::is_feed_limited(&account.plan_type, user.is_admin());
    let min_id = if limited {
        SignalService::window_floor(db.get_ref(), config.free_feed_limit).await?
    } else {
        None
    };

    let filter = FeedFilter {
        status,
        pair: query.pair.filter(|p| !p.trim().is_empty()),
        since_id: query.since_id,
        min_id,
        limit,
    };
    let signals: Vec<SignalResponse> = SignalService::list_signals(db.get_ref(), &filter)
        .await?
        .into_iter()
        .map(SignalResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "count": signals.len(),
        "plan": account.plan_type,
        "limited": limited,
        "signals": signals,
    })))
}

/// GET /signals/stream - Flux temps réel text/event-stream (plans payants)
#[get("/stream")]
pub async fn stream_signals(
    user: AuthUser,
    query: web::Query<StreamQuery>,
    db: web::Data<DatabaseConnection>,
    hub: web::Data<SignalHub>,
) -> Result<HttpResponse, AppError> {
    let account = UserService::find_by_id(db.get_ref(), user.user_id).await?;
    if signal_service::is_feed_limited(&account.plan_type, user.is_admin()) {
        return Err(AppError::PaymentRequired(
            "Live signals require a premium or vip plan".to_string(),
        ));
    }

    let pair = query
        .into_inner()
        .pair
        .filter(|p| !p.trim().is_empty())
        .map(|p| signal_service::normalize_pair(&p))
        .transpose()?;

    let receiver = hub.subscribe();
    tracing::info!(user_id = user.user_id, subscribers = hub.subscriber_count(), "signal stream opened");

    let events = BroadcastStream::new(receiver).filter_map(move |item| {
        let frame = match item {
            Ok(event) if pair.as_ref().is_none_or(|p| *p == event.data.pair) => Some(event_frame(&event)),
            Ok(_) => None,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "signal stream consumer lagged");
                Some(sse_frame("lagged", &serde_json::json!({ "skipped": skipped }).to_string()))
            }
        };
        ready(frame)
    });

    let keep_alive = IntervalStream::new(tokio::time::interval_at(
        tokio::time::Instant::now() + KEEP_ALIVE,
        KEEP_ALIVE,
    ))
    .map(|_| web::Bytes::from_static(b": keep-alive\n\n"));

    let body = stream::once(ready(web::Bytes::from_static(b": connected\n\n")))
        .chain(stream::select(events, keep_alive))
        .map(Ok::<_, Infallible>);

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(body))
}

fn event_frame(event: &SignalEvent) -> web::Bytes {
    match serde_json::to_string(event) {
        Ok(json) => sse_frame("signal", &json),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize signal event");
            web::Bytes::from_static(b": serialization error\n\n")
        }
    }
}

fn sse_frame(event: &str, data: &str) -> web::Bytes {
    web::Bytes::from(format!("event: {}\ndata: {}\n\n", event, data))
}

/// GET /signals/{id} (PROTÉGÉ)
/// Plan gratuit: 402 pour un signal sorti de la fenêtre des derniers signaux.
#[get("/{id}")]
pub async fn get_signal(
    user: AuthUser,
    path: web::Path<i32>,
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let signal = SignalService::get_signal(db.get_ref(), path.into_inner()).await?;

    let account = UserService::find_by_id(db.get_ref(), user.user_id).await?;
    if signal_service::is_feed_limited(&account.plan_type, user.is_admin()) {
        let floor = SignalService::window_floor(db.get_ref(), config.free_feed_limit).await?;
        if floor.is_none_or(|floor| signal.id < floor) {
            return Err(AppError::PaymentRequired(
                "Older signals require a premium or vip plan".to_string(),
            ));
        }
    }

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "signal": SignalResponse::from(signal),
    })))
}

pub fn signal_routes(cfg: &mut web::ServiceConfig) {
    // /stream avant /{id}
    cfg.service(
        web::scope("/signals")
            .service(list_signals)
            .service(stream_signals)
            .service(get_signal),
    );
}
