use actix_web::{get, post, web, HttpResponse};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Deserializer, Serialize};
use validator::Validate;

use crate::config::Config;
use crate::errors::AppError;
use crate::middleware::AuthUser;
use crate::models::dto::UserResponse;
use crate::models::users::{self, PlanType};
use crate::services::user_service::{self, NewUser, UserService};
use crate::utils::jwt;

// DTO pour l'inscription (simple ou "enhanced": les champs marketing sont optionnels)
// Les alias couvrent les noms utilisés par les anciens formulaires
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    // Normalisé avant la validation: " Ada@Example.com " est accepté
    #[serde(deserialize_with = "normalized_email")]
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,
    #[serde(default, alias = "firstName")]
    pub first_name: Option<String>,
    #[serde(default, alias = "lastName")]
    pub last_name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default, alias = "tradingExperience")]
    pub trading_experience: Option<String>,
    #[serde(default, alias = "referralSource", alias = "heard_from", alias = "heardFrom")]
    pub referral_source: Option<String>,
    #[serde(default, alias = "newsletter_opt_in", alias = "newsletterOptIn")]
    pub newsletter: Option<bool>,
    #[serde(default, alias = "plan_type", alias = "membership_tier", alias = "account_type")]
    pub plan: Option<String>,
}

fn normalized_email<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(user_service::normalize_email(&raw))
}

// DTO pour la connexion
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

// DTO pour changer le mot de passe
#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[serde(alias = "currentPassword")]
    pub current_password: String,
    #[serde(alias = "newPassword")]
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

// Réponse après login/register
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub token: String,
    pub user: UserResponse,
    // Plan payant demandé à l'inscription: activé seulement après paiement
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested_plan: Option<PlanType>,
}

fn auth_response(config: &Config, user: users::Model, requested_plan: Option<PlanType>) -> Result<AuthResponse, AppError> {
    let token = jwt::generate_token(&config.jwt_secret, config.jwt_ttl_hours, user.id, &user.email, &user.role)
        .map_err(|e| AppError::Internal(format!("Failed to generate token: {}", e)))?;

    Ok(AuthResponse {
        success: true,
        token,
        user: user.into(),
        requested_plan,
    })
}

/// POST /auth/register (+ alias /user/register, /simple/signup, /signup-enhanced) - PUBLIC
pub async fn register(
    body: web::Json<RegisterRequest>,
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    body.validate()?;

    // Plan demandé: validé maintenant, appliqué au paiement
    let requested_plan = body
        .plan
        .as_deref()
        .filter(|p| !p.trim().is_empty())
        .map(str::parse::<PlanType>)
        .transpose()
        .map_err(AppError::Validation)?
        .filter(PlanType::is_paid);

    let new_user = NewUser {
        email: body.email,
        password: body.password,
        first_name: body.first_name,
        last_name: body.last_name,
        phone: body.phone,
        country: body.country,
        trading_experience: body.trading_experience,
        referral_source: body.referral_source,
        newsletter_opt_in: body.newsletter.unwrap_or(false),
    };

    let user = UserService::register(db.get_ref(), config.get_ref(), new_user).await?;

    Ok(HttpResponse::Created().json(auth_response(&config, user, requested_plan)?))
}

/// POST /auth/login - Se connecter (PUBLIC)
#[post("/login")]
pub async fn login(
    body: web::Json<LoginRequest>,
    db: web::Data<DatabaseConnection>,
    config: web::Data<Config>,
) -> Result<HttpResponse, AppError> {
    let user = UserService::authenticate(db.get_ref(), &body.email, &body.password).await?;
    tracing::info!(user_id = user.id, "user logged in");

    Ok(HttpResponse::Ok().json(auth_response(&config, user, None)?))
}

/// GET /auth/me - Profil de l'utilisateur connecté (PROTÉGÉ)
#[get("/me")]
pub async fn me(user: AuthUser, db: web::Data<DatabaseConnection>) -> Result<HttpResponse, AppError> {
    let user = UserService::find_by_id(db.get_ref(), user.user_id).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "user": UserResponse::from(user),
    })))
}

/// POST /auth/change-password (PROTÉGÉ)
#[post("/change-password")]
pub async fn change_password(
    user: AuthUser,
    body: web::Json<ChangePasswordRequest>,
    db: web::Data<DatabaseConnection>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;

    UserService::change_password(db.get_ref(), user.user_id, &body.current_password, &body.new_password).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": "Password updated successfully"
    })))
}

pub fn auth_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/auth")
            .route("/register", web::post().to(register))
            .service(login)
            .service(me)
            .service(change_password),
    )
    // Anciennes routes d'inscription: même handler
    .route("/user/register", web::post().to(register))
    .route("/simple/signup", web::post().to(register))
    .route("/signup-enhanced", web::post().to(register));
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test};
    use serde_json::{json, Value};

    use crate::test_utils::{bearer, setup_db, test_app, test_state, user_with_token};

    #[actix_web::test]
    async fn test_enhanced_signup_and_login() {
        let state = test_state(setup_db().await);
        let app = test::init_service(test_app(&state)).await;

        let req = test::TestRequest::post()
            .uri("/api/signup-enhanced")
            .set_json(json!({
                "email": " Trader@Example.com ",
                "password": "supersecret",
                "firstName": "Grace",
                "last_name": "Hopper",
                "tradingExperience": "intermediate",
                "heard_from": "twitter",
                "newsletter": true,
                "membership_tier": "pro"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["user"]["email"], "trader@example.com");
        assert_eq!(body["user"]["first_name"], "Grace");
        assert_eq!(body["user"]["referral_source"], "twitter");
        assert_eq!(body["user"]["plan_type"], "free");
        assert_eq!(body["requested_plan"], "premium");
        assert!(body["user"].get("password_hash").is_none());

        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({"email": "trader@example.com", "password": "supersecret"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = test::read_body_json(resp).await;
        let token = body["token"].as_str().unwrap().to_string();

        let req = test::TestRequest::get()
            .uri("/api/auth/me")
            .insert_header(bearer(&token))
            .to_request();
        let body: Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["user"]["last_name"], "Hopper");
    }

    #[actix_web::test]
    async fn test_register_trims_email_before_validation() {
        let state = test_state(setup_db().await);
        let app = test::init_service(test_app(&state)).await;

        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({"email": " Ada@Example.com ", "password": "password123"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["user"]["email"], "ada@example.com");

        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({"email": "   ", "password": "password123"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_signup_aliases_share_validation() {
        let state = test_state(setup_db().await);
        let app = test::init_service(test_app(&state)).await;

        for (i, uri) in ["/api/auth/register", "/api/user/register", "/api/simple/signup"]
            .iter()
            .enumerate()
        {
            let req = test::TestRequest::post()
                .uri(uri)
                .set_json(json!({"email": format!("user{}@example.com", i), "password": "password123"}))
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::CREATED);
        }

        // Doublon
        let req = test::TestRequest::post()
            .uri("/api/simple/signup")
            .set_json(json!({"email": "USER0@example.com", "password": "password123"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);
        let body: Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);

        // Mot de passe trop court, email invalide, plan inconnu
        for payload in [
            json!({"email": "short@example.com", "password": "123"}),
            json!({"email": "not-an-email", "password": "password123"}),
            json!({"email": "gold@example.com", "password": "password123", "plan": "gold"}),
            json!({"password": "password123"}),
        ] {
            let req = test::TestRequest::post()
                .uri("/api/auth/register")
                .set_json(payload)
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[actix_web::test]
    async fn test_login_rejections_and_me_requires_token() {
        let state = test_state(setup_db().await);
        let app = test::init_service(test_app(&state)).await;

        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({"email": "ghost@example.com", "password": "whatever1"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::get().uri("/api/auth/me").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn test_change_password_flow() {
        let db = setup_db().await;
        let (_, token) = user_with_token(&db, "change@example.com").await;
        let state = test_state(db);
        let app = test::init_service(test_app(&state)).await;

        let req = test::TestRequest::post()
            .uri("/api/auth/change-password")
            .insert_header(bearer(&token))
            .set_json(json!({"currentPassword": "password123", "newPassword": "brand-new-pass"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .set_json(json!({"email": "change@example.com", "password": "brand-new-pass"}))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
