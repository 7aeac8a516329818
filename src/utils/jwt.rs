use jsonwebtoken::{encode, decode, Header, Validation, EncodingKey, DecodingKey, Algorithm};
use serde::{Deserialize, Serialize};
use chrono::{Utc, Duration};

use crate::models::users::UserRole;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i32,        // user_id
    pub email: String,
    pub role: UserRole,
    pub exp: i64,        // expiration timestamp
}

/// Génère un JWT token pour un utilisateur
pub fn generate_token(
    secret: &str,
    ttl_hours: i64,
    user_id: i32,
    email: &str,
    role: &UserRole,
) -> Result<String, String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(ttl_hours))
        .ok_or("Failed to calculate expiration")?
        .timestamp();

    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        role: role.clone(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
        .map_err(|e| format!("Failed to generate token: {}", e))
}

/// Vérifie et décode un JWT token
pub fn verify_token(secret: &str, token: &str) -> Result<Claims, String> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::new(Algorithm::HS256),
    )
        .map(|data| data.claims)
        .map_err(|e| format!("Invalid token: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_generate_and_verify_token() {
        let token = generate_token(SECRET, 24, 123, "trader@example.com", &UserRole::Admin).unwrap();
        let claims = verify_token(SECRET, &token).unwrap();

        assert_eq!(claims.sub, 123);
        assert_eq!(claims.email, "trader@example.com");
        assert_eq!(claims.role, UserRole::Admin);
    }

    #[test]
    fn test_invalid_token() {
        let result = verify_token(SECRET, "invalid.token.here");
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = generate_token(SECRET, 24, 1, "a@b.co", &UserRole::User).unwrap();
        assert!(verify_token("other-secret", &token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        // exp dans le passé, au-delà de la marge par défaut de 60s
        let token = generate_token(SECRET, -2, 1, "a@b.co", &UserRole::User).unwrap();
        assert!(verify_token(SECRET, &token).is_err());
    }
}
