//! Signature HMAC-SHA256 des webhooks (format Standard Webhooks).
//!
//! - Contenu signé: `{msg_id}.{timestamp}.{payload}`
//! - Signature: `v1,{base64(hmac)}`
//! - En-têtes: `webhook-id`, `webhook-timestamp`, `webhook-signature`
//!
//! Utilisé dans les deux sens: livraison aux abonnés et réception de signaux externes.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use super::constant_time_eq;

type HmacSha256 = Hmac<Sha256>;

pub const SECRET_PREFIX: &str = "whsec_";

pub const HEADER_ID: &str = "webhook-id";
pub const HEADER_TIMESTAMP: &str = "webhook-timestamp";
pub const HEADER_SIGNATURE: &str = "webhook-signature";

/// Génère un secret `whsec_` (32 bytes aléatoires en base64)
pub fn generate_secret() -> String {
    let mut secret_bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut secret_bytes);

    format!("{}{}", SECRET_PREFIX, BASE64_STANDARD.encode(secret_bytes))
}

pub fn decode_secret(secret: &str) -> Option<Vec<u8>> {
    let encoded = secret.strip_prefix(SECRET_PREFIX)?;
    BASE64_STANDARD.decode(encoded).ok()
}

pub fn sign_payload(msg_id: &str, timestamp: i64, payload: &str, secret: &str) -> Option<String> {
    let secret_bytes = decode_secret(secret)?;

    let signed_content = format!("{}.{}.{}", msg_id, timestamp, payload);

    let mut mac = HmacSha256::new_from_slice(&secret_bytes).ok()?;
    mac.update(signed_content.as_bytes());
    let signature = mac.finalize().into_bytes();

    Some(format!("v1,{}", BASE64_STANDARD.encode(signature)))
}

/// Vérifie une signature. L'en-tête peut contenir plusieurs signatures séparées
/// par des espaces (rotation de secret): une seule valide suffit.
pub fn verify_signature(msg_id: &str, timestamp: i64, payload: &str, signature: &str, secret: &str) -> bool {
    let Some(expected) = sign_payload(msg_id, timestamp, payload, secret) else {
        return false;
    };
    let Some(expected_value) = expected.strip_prefix("v1,") else {
        return false;
    };

    signature
        .split_whitespace()
        .filter_map(|candidate| candidate.strip_prefix("v1,"))
        .any(|value| constant_time_eq(value.as_bytes(), expected_value.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_secret() {
        let secret = generate_secret();
        assert!(secret.starts_with(SECRET_PREFIX));
        assert_eq!(decode_secret(&secret).unwrap().len(), 32);
    }

    #[test]
    fn test_decode_secret_rejects_bad_input() {
        assert!(decode_secret("invalid_secret").is_none());
        assert!(decode_secret("whsec_not-valid-base64!!!").is_none());
    }

    #[test]
    fn test_sign_and_verify() {
        let secret = generate_secret();
        let payload = r#"{"type":"signal.created","data":{}}"#;
        let signature = sign_payload("msg_1", 1704067200, payload, &secret).unwrap();
        assert!(signature.starts_with("v1,"));

        assert!(verify_signature("msg_1", 1704067200, payload, &signature, &secret));
        assert!(!verify_signature("msg_1", 1704067200, "tampered", &signature, &secret));
        assert!(!verify_signature("msg_1", 1704067201, payload, &signature, &secret));
        assert!(!verify_signature("msg_2", 1704067200, payload, &signature, &secret));
        assert!(!verify_signature("msg_1", 1704067200, payload, &signature, &generate_secret()));
    }

    #[test]
    fn test_multiple_signatures_in_header() {
        let secret = generate_secret();
        let good = sign_payload("id", 10, "body", &secret).unwrap();
        let header = format!("v1,AAAA {}", good);
        assert!(verify_signature("id", 10, "body", &header, &secret));
        assert!(!verify_signature("id", 10, "body", "v2,abc", &secret));
    }
}
