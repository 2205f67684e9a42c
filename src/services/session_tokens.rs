// src/services/session_tokens.rs
//! Bearer tokens carrying an operator session between requests.
//!
//! Tokens are HS256 JWTs. Each one has a random `jti` so logout can deny
//! that single token until it would have expired anyway.

use crate::error::Result;
use crate::models::credential::{Role, Session};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    institution: Option<String>,
    jti: String,
    exp: usize,
}

/// Issues, decodes and revokes session tokens.
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl_secs: u64,
    /// Revoked `jti` values with their expiry
    revoked: Mutex<HashMap<String, usize>>,
}

fn now_secs() -> usize {
    chrono::Utc::now().timestamp().max(0) as usize
}

fn random_id(len: usize) -> String {
    let bytes: Vec<u8> = (0..len).map(|_| rand::thread_rng().gen()).collect();
    base64::encode_config(bytes, base64::URL_SAFE_NO_PAD)
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl_secs: u64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation: Validation::default(),
            ttl_secs,
            revoked: Mutex::new(HashMap::new()),
        }
    }

    /// Generates a random secret for deployments that did not configure one.
    ///
    /// Tokens signed with it do not survive a restart.
    pub fn random_secret() -> String {
        random_id(32)
    }

    /// Signs a token for `session`.
    pub fn issue(&self, session: &Session) -> Result<String> {
        let claims = Claims {
            sub: session.username.clone(),
            role: session.role,
            institution: session.institution.clone(),
            jti: random_id(16),
            exp: now_secs() + self.ttl_secs as usize,
        };
        Ok(encode(&Header::default(), &claims, &self.encoding)?)
    }

    fn claims(&self, token: &str) -> Option<Claims> {
        let claims = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| log::debug!("rejected session token: {}", e))
            .ok()?
            .claims;
        let revoked = self.revoked.lock().unwrap_or_else(|e| e.into_inner());
        if revoked.contains_key(&claims.jti) {
            return None;
        }
        Some(claims)
    }

    /// Returns the session in `token` if it is authentic, unexpired and not revoked.
    pub fn decode(&self, token: &str) -> Option<Session> {
        self.claims(token).map(|claims| Session {
            username: claims.sub,
            role: claims.role,
            institution: claims.institution,
        })
    }

    /// Denies `token` from now on. Returns `false` if it was already unusable.
    pub fn revoke(&self, token: &str) -> bool {
        let claims = match self.claims(token) {
            Some(claims) => claims,
            None => return false,
        };
        let now = now_secs();
        let mut revoked = self.revoked.lock().unwrap_or_else(|e| e.into_inner());
        // Expired entries can no longer decode, so they need no denylist slot
        revoked.retain(|_, exp| *exp + self.validation.leeway as usize >= now);
        revoked.insert(claims.jti, claims.exp);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session {
            username: "university".into(),
            role: Role::University,
            institution: Some("Tech University".into()),
        }
    }

    #[test]
    fn test_issue_and_decode() {
        let issuer = TokenIssuer::new(b"test-secret", 3600);
        let token = issuer.issue(&session()).unwrap();
        assert_eq!(issuer.decode(&token), Some(session()));
    }

    #[test]
    fn test_tokens_are_unique() {
        let issuer = TokenIssuer::new(b"test-secret", 3600);
        assert_ne!(issuer.issue(&session()).unwrap(), issuer.issue(&session()).unwrap());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = TokenIssuer::new(b"test-secret", 3600);
        let other = TokenIssuer::new(b"another-secret", 3600);
        let token = other.issue(&session()).unwrap();
        assert_eq!(issuer.decode(&token), None);
        assert_eq!(issuer.decode("garbage"), None);
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = TokenIssuer::new(b"test-secret", 3600);
        let claims = Claims {
            sub: "admin".into(),
            role: Role::Admin,
            institution: None,
            jti: "old".into(),
            exp: now_secs() - 3600,
        };
        let token = encode(&Header::default(), &claims, &issuer.encoding).unwrap();
        assert_eq!(issuer.decode(&token), None);
    }

    #[test]
    fn test_revoke_only_affects_that_token() {
        let issuer = TokenIssuer::new(b"test-secret", 3600);
        let first = issuer.issue(&session()).unwrap();
        let second = issuer.issue(&session()).unwrap();

        assert!(issuer.revoke(&first));
        assert_eq!(issuer.decode(&first), None);
        assert!(issuer.decode(&second).is_some());

        // Already revoked
        assert!(!issuer.revoke(&first));
    }

    #[test]
    fn test_random_secret_length() {
        // 32 bytes, unpadded base64
        assert_eq!(TokenIssuer::random_secret().len(), 43);
    }
}
