use actix_web::{get, web, HttpResponse};
use sea_orm::DatabaseConnection;

use crate::config::Config;
use crate::errors::AppError;
use crate::middleware::AuthUser;
use crate::services::dashboard_service::DashboardService;

/// GET /dashboard - Vue d'ensemble du compte (PROTÉGÉ)
#[get("")]
pub async fn get_dashboard(
    user: AuthUser,
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let dashboard = DashboardService::build(db.get_ref(), config.get_ref(), user.user_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "dashboard": dashboard,
    })))
}

pub fn dashboard_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::scope("/dashboard").service(get_dashboard));
}
