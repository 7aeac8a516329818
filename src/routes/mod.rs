pub mod health;
pub mod auth;
pub mod coupons;
pub mod payments;
pub mod questionnaire;
pub mod dashboard;
pub mod signals;
pub mod admin;
pub mod webhooks;
pub mod proxy;

use actix_web::{HttpRequest, error, web};

use crate::errors::AppError;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().limit(64 * 1024).error_handler(json_error))
        .app_data(web::QueryConfig::default().error_handler(query_error))
        .app_data(web::PathConfig::default().error_handler(path_error))
        .service(
            web::scope("/api")
                .service(health::health_check)
                .service(health::readiness)
                .configure(auth::auth_routes)
                .configure(coupons::coupon_routes)
                .configure(payments::payment_routes)
                .configure(questionnaire::questionnaire_routes)
                .configure(dashboard::dashboard_routes)
                .configure(signals::signal_routes)
                .configure(admin::admin_routes)
                .configure(webhooks::webhook_routes),
        )
        .configure(proxy::proxy_routes);
}

// Les erreurs d'extraction gardent l'enveloppe {"success": false, ...}
fn json_error(err: error::JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::Validation(format!("Invalid JSON body: {}", err)).into()
}

fn query_error(err: error::QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    AppError::Validation(format!("Invalid query string: {}", err)).into()
}

fn path_error(err: error::PathError, _req: &HttpRequest) -> actix_web::Error {
    AppError::Validation(format!("Invalid path parameter: {}", err)).into()
}
