use actix_web::{get, web, HttpResponse};
use chrono::Utc;
use sea_orm::DatabaseConnection;

use crate::errors::AppError;
use crate::models::health::HealthResponse;

#[get("/health")]
pub async fn health_check() -> HttpResponse {
    let response = HealthResponse {
        status: "ok".to_string(),
        time: Utc::now(),
    };

    HttpResponse::Ok().json(response)
}

/// Vérifie que la base répond
#[get("/health/ready")]
pub async fn readiness(db: web::Data<DatabaseConnection>) -> Result<HttpResponse, AppError> {
    db.ping().await.map_err(|e| {
        tracing::warn!(error = %e, "database ping failed");
        AppError::ServiceUnavailable("Database unreachable".to_string())
    })?;

    Ok(HttpResponse::Ok().json(HealthResponse {
        status: "ready".to_string(),
        time: Utc::now(),
    }))
}

#[cfg(test)]
mod tests {
    use actix_web::test;

    use crate::test_utils::{setup_db, test_app, test_state};

    #[actix_web::test]
    async fn test_health_endpoints() {
        let state = test_state(setup_db().await);
        let app = test::init_service(test_app(&state)).await;

        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/health").to_request()).await;
        assert!(resp.status().is_success());
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["status"], "ok");

        let resp = test::call_service(&app, test::TestRequest::get().uri("/api/health/ready").to_request()).await;
        assert!(resp.status().is_success());
    }
}
