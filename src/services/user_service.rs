use chrono::Utc;
use sea_orm::*;

use crate::config::Config;
use crate::errors::AppError;
use crate::models::users::{self, PlanType, UserRole};
use crate::utils::password;

pub struct UserService;

/// Données d'inscription déjà validées par la route
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub email: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub country: Option<String>,
    pub trading_experience: Option<String>,
    pub referral_source: Option<String>,
    pub newsletter_opt_in: bool,
}

const INVALID_CREDENTIALS: &str = "Invalid email or password";

impl UserService {
    /// Crée le compte. L'unicité de l'email est garantie par l'index unique:
    /// deux inscriptions simultanées ne peuvent pas réussir toutes les deux.
    pub async fn register(
        db: &DatabaseConnection,
        config: &Config,
        new_user: NewUser,
    ) -> Result<users::Model, AppError> {
        let email = normalize_email(&new_user.email);
        let password_hash = hash_blocking(new_user.password).await?;

        let role = if config.is_admin_email(&email) {
            UserRole::Admin
        } else {
            UserRole::User
        };

        let now = Utc::now();
        let user = users::ActiveModel {
            email: Set(email),
            password_hash: Set(password_hash),
            first_name: Set(clean(new_user.first_name)),
            last_name: Set(clean(new_user.last_name)),
            phone: Set(clean(new_user.phone)),
            country: Set(clean(new_user.country)),
            trading_experience: Set(clean(new_user.trading_experience)),
            referral_source: Set(clean(new_user.referral_source)),
            newsletter_opt_in: Set(new_user.newsletter_opt_in),
            plan_type: Set(PlanType::Free),
            role: Set(role),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let user = user
            .insert(db)
            .await
            .map_err(|e| AppError::from_db_conflict(e, "Email already registered"))?;

        tracing::info!(user_id = user.id, role = user.role.as_str(), "user registered");
        Ok(user)
    }

    /// Vérifie les identifiants. Un hash ancien format est remplacé par un hash PBKDF2.
    pub async fn authenticate(
        db: &DatabaseConnection,
        email: &str,
        password: &str,
    ) -> Result<users::Model, AppError> {
        let email = normalize_email(email);
        let user = users::Entity::find()
            .filter(users::Column::Email.eq(email))
            .one(db)
            .await?
            .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

        let valid = verify_blocking(password.to_string(), user.password_hash.clone()).await?;
        if !valid {
            tracing::debug!(user_id = user.id, "login rejected");
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        if password::needs_rehash(&user.password_hash) {
            let new_hash = hash_blocking(password.to_string()).await?;
            let mut active: users::ActiveModel = user.into();
            active.password_hash = Set(new_hash);
            active.updated_at = Set(Utc::now());
            let user = active.update(db).await?;
            tracing::info!(user_id = user.id, "password hash upgraded");
            return Ok(user);
        }

        Ok(user)
    }

    pub async fn change_password(
        db: &DatabaseConnection,
        user_id: i32,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let user = Self::find_by_id(db, user_id).await?;

        let valid = verify_blocking(current_password.to_string(), user.password_hash.clone()).await?;
        if !valid {
            return Err(AppError::Unauthorized("Current password is incorrect".to_string()));
        }

        let new_hash = hash_blocking(new_password.to_string()).await?;
        let mut active: users::ActiveModel = user.into();
        active.password_hash = Set(new_hash);
        active.updated_at = Set(Utc::now());
        active.update(db).await?;

        tracing::info!(user_id, "password changed");
        Ok(())
    }

    pub async fn find_by_id<C: ConnectionTrait>(db: &C, user_id: i32) -> Result<users::Model, AppError> {
        users::Entity::find_by_id(user_id)
            .one(db)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    pub async fn list_users(db: &DatabaseConnection) -> Result<Vec<users::Model>, AppError> {
        Ok(users::Entity::find()
            .order_by_desc(users::Column::Id)
            .all(db)
            .await?)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn clean(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

// PBKDF2 est coûteux: hors du thread de l'executor
async fn hash_blocking(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || password::hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
        .map_err(AppError::Internal)
}

async fn verify_blocking(password: String, stored_hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || password::verify_password(&password, &stored_hash))
        .await
        .map_err(|e| AppError::Internal(format!("Password check failed: {}", e)))?
        .map_err(AppError::Internal)
}
