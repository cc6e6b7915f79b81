//! Session management: JWTs, opaque random tokens and password hashing
//!
//! Two JWT flavours share the claim layout but never a key. Browser sessions
//! get a short-lived cookie token signed with the cookie secret; API clients
//! get a long-lived bearer token signed with the bearer secret. A token minted
//! for one channel therefore fails validation on the other.

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

/// JWT claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id as string
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid token")]
    InvalidToken,
    #[error("token expired")]
    Expired,
    #[error("password hashing failed: {0}")]
    Hash(String),
}

const ACCESS_TOKEN_EXPIRY_MINUTES: i64 = 10;
pub const REFRESH_TOKEN_EXPIRY_DAYS: i64 = 30;
const API_TOKEN_EXPIRY_DAYS: i64 = 30;

fn sign(user_id: i64, ttl: Duration, secret: &[u8]) -> Result<String, SessionError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + ttl).timestamp(),
        iat: now.timestamp(),
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
        .map_err(|_| SessionError::InvalidToken)
}

/// Create a JWT for the access_token cookie, valid for 10 minutes
pub fn create_access_token(user_id: i64, cookie_secret: &[u8]) -> Result<String, SessionError> {
    sign(user_id, Duration::minutes(ACCESS_TOKEN_EXPIRY_MINUTES), cookie_secret)
}

/// Create a bearer JWT for API clients, valid for 30 days
pub fn create_api_token(user_id: i64, bearer_secret: &[u8]) -> Result<String, SessionError> {
    sign(user_id, Duration::days(API_TOKEN_EXPIRY_DAYS), bearer_secret)
}

/// Validate a JWT against one secret and return the user_id
pub fn validate_token(token: &str, secret: &[u8]) -> Result<i64, SessionError> {
    // HS256 only
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_required_spec_claims(&["exp", "sub", "iat"]);

    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret), &validation)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
            _ => SessionError::InvalidToken,
        })?;

    token_data
        .claims
        .sub
        .parse::<i64>()
        .map_err(|_| SessionError::InvalidToken)
}

/// Random 32-byte token as hex (refresh tokens, email links, invitations, OAuth state)
pub fn generate_token() -> String {
    // ThreadRng is not Send; keep it out of any await
    use rand::Rng;
    let bytes: [u8; 32] = rand::rng().random();
    hex::encode(bytes.as_slice())
}

/// Hash a plain password with argon2id
pub fn hash_password(password: &str) -> Result<String, SessionError> {
    use argon2::Argon2;
    use password_hash::rand_core::OsRng;
    use password_hash::{PasswordHasher, SaltString};

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| SessionError::Hash(e.to_string()))
}

/// Verify a password against an argon2id hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    use argon2::Argon2;
    use password_hash::{PasswordHash, PasswordVerifier};

    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Lowercase hex for refresh and email tokens
pub mod hex {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

    pub fn encode(bytes: &[u8]) -> String {
        let mut result = String::with_capacity(bytes.len() * 2);
        for byte in bytes {
            result.push(HEX_CHARS[(byte >> 4) as usize] as char);
            result.push(HEX_CHARS[(byte & 0x0f) as usize] as char);
        }
        result
    }

    pub fn decode(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 != 0 {
            return None;
        }
        s.as_bytes()
            .chunks(2)
            .map(|pair| {
                let hi = (pair[0] as char).to_digit(16)?;
                let lo = (pair[1] as char).to_digit(16)?;
                Some((hi * 16 + lo) as u8)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const COOKIE: &[u8] = b"cookie-secret";
    const BEARER: &[u8] = b"bearer-secret";

    #[test]
    fn test_access_token_round_trip() {
        let token = create_access_token(7, COOKIE).unwrap();
        assert_eq!(validate_token(&token, COOKIE).unwrap(), 7);
    }

    #[test]
    fn test_cookie_token_rejected_as_bearer() {
        let token = create_access_token(7, COOKIE).unwrap();
        assert!(matches!(
            validate_token(&token, BEARER),
            Err(SessionError::InvalidToken)
        ));

        let api = create_api_token(7, BEARER).unwrap();
        assert!(validate_token(&api, COOKIE).is_err());
        assert_eq!(validate_token(&api, BEARER).unwrap(), 7);
    }

    #[test]
    fn test_expired_token() {
        let token = sign(7, Duration::minutes(-5), COOKIE).unwrap();
        assert!(matches!(validate_token(&token, COOKIE), Err(SessionError::Expired)));
    }

    #[test]
    fn test_generate_token_is_hex() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_password_hashing() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
        assert!(!verify_password("correct horse", "not-a-hash"));
    }

    #[test]
    fn test_hex_decode() {
        assert_eq!(hex::decode("00ff10").unwrap(), vec![0x00, 0xff, 0x10]);
        assert_eq!(hex::encode(&[0xde, 0xad]), "dead");
        assert!(hex::decode("abc").is_none());
        assert!(hex::decode("zz").is_none());
    }
}
