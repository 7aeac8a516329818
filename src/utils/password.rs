use hmac::Hmac;
use pbkdf2::pbkdf2;
use sha2::{Digest, Sha256};
use rand::Rng;
use base64::{Engine, engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD}};

use super::constant_time_eq;

type HmacSha256 = Hmac<Sha256>;

#[cfg(not(test))]
const ITERATIONS: u32 = 260000;
// PBKDF2 en build debug est très lent: les tests utilisent moins d'itérations
#[cfg(test)]
const ITERATIONS: u32 = 2000;
const KEY_LENGTH: usize = 32;
const PREFIX: &str = "pbkdf2:sha256:";

/// Hash un mot de passe au format Werkzeug (compatible Python)
/// Utilise PBKDF2-HMAC-SHA256 avec 260000 itérations et un salt de 16 bytes
pub fn hash_password(password: &str) -> Result<String, String> {
    hash_with_iterations(password, ITERATIONS)
}

fn hash_with_iterations(password: &str, iterations: u32) -> Result<String, String> {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill(&mut salt);

    let mut key = [0u8; KEY_LENGTH];
    pbkdf2::<HmacSha256>(password.as_bytes(), &salt, iterations, &mut key)
        .map_err(|e| format!("PBKDF2 hash generation failed: {}", e))?;

    // Format: pbkdf2:sha256:iterations$salt$hash
    Ok(format!(
        "{}{}${}${}",
        PREFIX,
        iterations,
        URL_SAFE_NO_PAD.encode(salt),
        URL_SAFE_NO_PAD.encode(key)
    ))
}

/// Vérifie un mot de passe contre un hash stocké
/// Formats supportés:
///   - Werkzeug pbkdf2:sha256:iterations$salt$hash (base64 ou hex)
///   - SHA-256 hex sans salt (comptes créés par les anciens scripts d'inscription)
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, String> {
    if is_legacy_sha256(stored_hash) {
        let digest = hex::encode(Sha256::digest(password.as_bytes()));
        return Ok(constant_time_eq(
            digest.as_bytes(),
            stored_hash.to_ascii_lowercase().as_bytes(),
        ));
    }

    let parts: Vec<&str> = stored_hash.split('$').collect();
    if parts.len() != 3 {
        return Err("Invalid hash format".to_string());
    }

    let header_parts: Vec<&str> = parts[0].split(':').collect();
    if header_parts.len() != 3 || header_parts[0] != "pbkdf2" || header_parts[1] != "sha256" {
        return Err("Invalid header".to_string());
    }

    let iterations = header_parts[2]
        .parse::<u32>()
        .map_err(|_| "Invalid iterations".to_string())?;
    if iterations == 0 {
        return Err("Invalid iterations".to_string());
    }

    let salt = decode_flexible(parts[1])?;
    let expected_hash = decode_flexible(parts[2])?;
    if expected_hash.is_empty() {
        return Err("Invalid hash".to_string());
    }

    let mut computed = vec![0u8; expected_hash.len()];
    pbkdf2::<HmacSha256>(password.as_bytes(), &salt, iterations, &mut computed)
        .map_err(|e| format!("PBKDF2 hash verification failed: {}", e))?;

    Ok(constant_time_eq(&computed, &expected_hash))
}

/// Vrai si le hash doit être régénéré au prochain login réussi
pub fn needs_rehash(stored_hash: &str) -> bool {
    if is_legacy_sha256(stored_hash) {
        return true;
    }
    stored_hash
        .strip_prefix(PREFIX)
        .and_then(|rest| rest.split('$').next())
        .and_then(|it| it.parse::<u32>().ok())
        .is_none_or(|it| it < ITERATIONS)
}

fn is_legacy_sha256(stored_hash: &str) -> bool {
    stored_hash.len() == 64 && stored_hash.chars().all(|c| c.is_ascii_hexdigit())
}

/// Décode une chaîne encodée en base64 ou hexadécimal
fn decode_flexible(input: &str) -> Result<Vec<u8>, String> {
    // Format hexadécimal (64 caractères = 32 bytes)
    if input.len() == 64 && input.chars().all(|c| c.is_ascii_hexdigit()) {
        return hex::decode(input)
            .map_err(|e| format!("Hex decode failed: {}", e));
    }

    let padded = add_base64_padding(input);

    if let Ok(decoded) = URL_SAFE_NO_PAD.decode(input) {
        return Ok(decoded);
    }
    if let Ok(decoded) = STANDARD_NO_PAD.decode(input) {
        return Ok(decoded);
    }
    if let Ok(decoded) = STANDARD.decode(&padded) {
        return Ok(decoded);
    }
    if let Ok(decoded) = URL_SAFE.decode(&padded) {
        return Ok(decoded);
    }

    hex::decode(input)
        .map_err(|_| "Failed to decode".to_string())
}

/// Ajoute le padding '=' manquant pour base64
fn add_base64_padding(input: &str) -> String {
    let padding_needed = (4 - (input.len() % 4)) % 4;
    format!("{}{}", input, "=".repeat(padding_needed))
}
