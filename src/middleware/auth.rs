use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use futures::future::{ready, Ready};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::errors::AppError;
use crate::models::users::UserRole;
use crate::utils::jwt;

/// Structure qui contient les infos de l'utilisateur authentifié
/// Utilisée comme extracteur dans les routes protégées
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: i32,
    pub email: String,
    pub role: UserRole,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

/// Extracteur pour les routes /admin: 403 si le rôle n'est pas admin
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[derive(Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Le token vient du header Authorization, ou du paramètre ?token=
/// (EventSource côté navigateur ne peut pas envoyer de header)
fn extract_token(req: &HttpRequest) -> Result<String, AppError> {
    if let Some(header) = req.headers().get("Authorization") {
        let auth_str = header
            .to_str()
            .map_err(|_| AppError::Unauthorized("Invalid Authorization header".to_string()))?;

        return auth_str
            .strip_prefix("Bearer ")
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AppError::Unauthorized(
                    "Invalid Authorization format (expected: Bearer <token>)".to_string(),
                )
            });
    }

    web::Query::<TokenQuery>::from_query(req.query_string())
        .ok()
        .and_then(|q| q.into_inner().token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))
}

fn authenticate(req: &HttpRequest) -> Result<AuthUser, AppError> {
    let config = req
        .app_data::<web::Data<Config>>()
        .ok_or_else(|| AppError::Internal("Config not registered as app data".to_string()))?;

    let token = extract_token(req)?;

    let claims = jwt::verify_token(&config.jwt_secret, &token).map_err(AppError::Unauthorized)?;

    Ok(AuthUser {
        user_id: claims.sub,
        email: claims.email,
        role: claims.role,
    })
}

impl FromRequest for AuthUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}

impl FromRequest for AdminUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let result = authenticate(req).and_then(|user| {
            if user.is_admin() {
                Ok(AdminUser(user))
            } else {
                Err(AppError::Forbidden("Admin access required".to_string()))
            }
        });
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::test::TestRequest;

    use crate::test_utils::test_config;

    fn request_with(header: Option<&str>, uri: &str) -> HttpRequest {
        let mut req = TestRequest::get()
            .uri(uri)
            .app_data(web::Data::new(test_config()));
        if let Some(h) = header {
            req = req.insert_header(("Authorization", h));
        }
        req.to_http_request()
    }

    fn token_for(role: UserRole) -> String {
        let config = test_config();
        jwt::generate_token(&config.jwt_secret, 1, 7, "t@example.com", &role).unwrap()
    }

    #[test]
    fn test_bearer_header() {
        let token = token_for(UserRole::User);
        let req = request_with(Some(&format!("Bearer {}", token)), "/");
        let user = authenticate(&req).unwrap();
        assert_eq!(user.user_id, 7);
        assert!(!user.is_admin());
    }

    #[test]
    fn test_query_token_fallback() {
        let token = token_for(UserRole::Admin);
        let req = request_with(None, &format!("/stream?token={}", token));
        assert!(authenticate(&req).unwrap().is_admin());
    }

    #[test]
    fn test_missing_and_malformed() {
        assert!(matches!(
            authenticate(&request_with(None, "/")),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            authenticate(&request_with(Some("Token abc"), "/")),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            authenticate(&request_with(Some("Bearer garbage"), "/")),
            Err(AppError::Unauthorized(_))
        ));
    }
}
