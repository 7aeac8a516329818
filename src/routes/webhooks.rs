use actix_web::{post, web, HttpRequest, HttpResponse};
use chrono::Utc;
use sea_orm::{DatabaseConnection, TransactionTrait};

use crate::config::Config;
use crate::errors::AppError;
use crate::models::dto::{CreateSignalRequest, SignalEvent, SignalEventType, SignalResponse};
use crate::models::trading_signals::SignalSource;
use crate::services::signal_hub::SignalHub;
use crate::services::signal_service::SignalService;
use crate::services::webhook_dispatcher::WebhookNotifier;
use crate::utils::signing;

fn header<'a>(req: &'a HttpRequest, name: &str) -> Result<&'a str, AppError> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized(format!("Missing {} header", name)))
}

/// Vérifie en-têtes, fenêtre de temps et signature. Retourne le webhook-id.
fn verify_inbound(req: &HttpRequest, payload: &str, secret: &str, tolerance_secs: i64) -> Result<String, AppError> {
    let msg_id = header(req, signing::HEADER_ID)?;
    let timestamp: i64 = header(req, signing::HEADER_TIMESTAMP)?
        .parse()
        .map_err(|_| AppError::Unauthorized("Invalid webhook timestamp".to_string()))?;
    let signature = header(req, signing::HEADER_SIGNATURE)?;

    // Horodatage extrême: pas de débordement, simplement hors tolérance
    let within_tolerance = Utc::now()
        .timestamp()
        .checked_sub(timestamp)
        .and_then(i64::checked_abs)
        .is_some_and(|drift| drift <= tolerance_secs);
    if !within_tolerance {
        return Err(AppError::Unauthorized("Webhook timestamp outside tolerance".to_string()));
    }

    if !signing::verify_signature(msg_id, timestamp, payload, signature, secret) {
        return Err(AppError::Unauthorized("Invalid webhook signature".to_string()));
    }

    Ok(msg_id.to_string())
}

/// POST /webhooks/signals - Réception d'un signal signé par une source externe
/// Idempotent: une même livraison (même webhook-id) ne crée qu'un signal.
#[post("/signals")]
pub async fn receive_signal(
    req: HttpRequest,
    body: web::Bytes,
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
    hub: web::Data<SignalHub>,
    notifier: web::Data<WebhookNotifier>,
) -> Result<HttpResponse, AppError> {
    let Some(secret) = config.inbound_webhook_secret.as_deref() else {
        return Err(AppError::NotFound("Inbound webhooks are not enabled".to_string()));
    };

    let payload = std::str::from_utf8(&body)
        .map_err(|_| AppError::Validation("Body must be UTF-8 JSON".to_string()))?;
    let external_id = verify_inbound(&req, payload, secret, config.webhook_tolerance_secs)?;

    if let Some(existing) = SignalService::find_by_external_id(db.get_ref(), &external_id).await? {
        tracing::debug!(signal_id = existing.id, external_id = %external_id, "duplicate inbound webhook");
        return Ok(duplicate_response(existing.into()));
    }

    let request: CreateSignalRequest = serde_json::from_str(payload)
        .map_err(|e| AppError::Validation(format!("Invalid signal payload: {}", e)))?;

    let txn = db.begin().await?;
    let signal = match SignalService::create_signal(
        &txn,
        request,
        SignalSource::Webhook,
        None,
        Some(external_id.clone()),
    )
    .await
    {
        Ok(signal) => signal,
        // Deux livraisons simultanées du même message: l'autre requête l'a créé
        Err(AppError::Conflict(_)) => {
            txn.rollback().await?;
            let existing = SignalService::find_by_external_id(db.get_ref(), &external_id)
                .await?
                .ok_or_else(|| AppError::Internal("Conflicting signal vanished".to_string()))?;
            return Ok(duplicate_response(existing.into()));
        }
        Err(e) => return Err(e),
    };
    let event = SignalEvent::new(SignalEventType::Created, signal.clone());
    let queued = SignalService::enqueue_webhooks(&txn, &event).await?;
    txn.commit().await?;

    tracing::info!(signal_id = signal.id, external_id = %external_id, "signal received by webhook");
    SignalService::announce(&hub, &notifier, event, queued);

    Ok(HttpResponse::Created().json(serde_json::json!({
        "success": true,
        "duplicate": false,
        "signal": SignalResponse::from(signal),
    })))
}

fn duplicate_response(signal: SignalResponse) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "duplicate": true,
        "signal": signal,
    }))
}

pub fn webhook_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/webhooks").service(receive_signal));
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test};
    use chrono::Utc;
    use serde_json::Value;

    use crate::test_utils::{setup_db, test_app, test_state, TEST_INBOUND_SECRET};
    use crate::utils::signing;

    const PAYLOAD: &str = r#"{"symbol":"XAUUSD","side":"long","entry":2300.0,"sl":2290.0,"tp":2330.0,"confidence":65}"#;

    fn signed_request(msg_id: &str, timestamp: i64, secret: &str) -> test::TestRequest {
        let signature = signing::sign_payload(msg_id, timestamp, PAYLOAD, secret).unwrap();
        test::TestRequest::post()
            .uri("/api/webhooks/signals")
            .insert_header(("Content-Type", "application/json"))
            .insert_header((signing::HEADER_ID, msg_id.to_string()))
            .insert_header((signing::HEADER_TIMESTAMP, timestamp.to_string()))
            .insert_header((signing::HEADER_SIGNATURE, signature))
            .set_payload(PAYLOAD)
    }

    #[actix_web::test]
    async fn test_inbound_signal_is_idempotent() {
        let state = test_state(setup_db().await);
        let mut events = state.hub.subscribe();
        let app = test::init_service(test_app(&state)).await;
        let now = Utc::now().timestamp();

        let resp = test::call_service(&app, signed_request("msg_1", now, TEST_INBOUND_SECRET).to_request()).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["signal"]["pair"], "XAU/USD");
        assert_eq!(body["signal"]["direction"], "buy");
        assert_eq!(body["signal"]["source"], "webhook");
        let id = body["signal"]["id"].clone();

        assert_eq!(events.recv().await.unwrap().data.pair, "XAU/USD");

        let resp = test::call_service(&app, signed_request("msg_1", now, TEST_INBOUND_SECRET).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["duplicate"], true);
        assert_eq!(body["signal"]["id"], id);
    }

    #[actix_web::test]
    async fn test_inbound_rejects_bad_signature_and_stale_timestamp() {
        let state = test_state(setup_db().await);
        let app = test::init_service(test_app(&state)).await;
        let now = Utc::now().timestamp();

        let other_secret = signing::generate_secret();
        let resp = test::call_service(&app, signed_request("msg_2", now, &other_secret).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let stale = now - 3600;
        let resp = test::call_service(&app, signed_request("msg_3", stale, TEST_INBOUND_SECRET).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/api/webhooks/signals")
            .set_payload(PAYLOAD)
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_inbound_extreme_timestamps_are_unauthorized() {
        let state = test_state(setup_db().await);
        let app = test::init_service(test_app(&state)).await;

        for (msg_id, timestamp) in [("msg_min", i64::MIN), ("msg_max", i64::MAX)] {
            let req = test::TestRequest::post()
                .uri("/api/webhooks/signals")
                .insert_header((signing::HEADER_ID, msg_id))
                .insert_header((signing::HEADER_TIMESTAMP, timestamp.to_string()))
                .insert_header((signing::HEADER_SIGNATURE, "v1,AAAA"))
                .set_payload(PAYLOAD)
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
        }

        // signé correctement mais à un horodatage extrême: toujours refusé
        let resp = test::call_service(&app, signed_request("msg_min_signed", i64::MIN, TEST_INBOUND_SECRET).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_inbound_disabled_without_secret() {
        let mut state = test_state(setup_db().await);
        state.config.inbound_webhook_secret = None;
        let app = test::init_service(test_app(&state)).await;

        let resp = test::call_service(
            &app,
            signed_request("msg_4", Utc::now().timestamp(), TEST_INBOUND_SECRET).to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}
