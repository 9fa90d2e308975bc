//! Signed, time-boxed tracking tokens for citizen status links.

use anyhow::Result;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use zwerfmelder_common::constants::TRACKING_TOKEN_TTL_DAYS;

/// Claims bound into a tracking token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingClaims {
    /// Public id of the report this token grants status access to.
    pub public_id: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies HS256 tracking tokens.
#[derive(Clone)]
pub struct TrackingTokens {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: chrono::Duration,
}

impl TrackingTokens {
    pub fn new(secret: &str) -> Self {
        Self::with_ttl_days(secret, TRACKING_TOKEN_TTL_DAYS)
    }

    pub fn with_ttl_days(secret: &str, ttl_days: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: chrono::Duration::days(ttl_days),
        }
    }

    /// Issue a token bound to a report's public id.
    pub fn issue(&self, public_id: &str) -> Result<String> {
        let now = chrono::Utc::now();
        let claims = TrackingClaims {
            public_id: public_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(Into::into)
    }

    /// Verify signature and expiry, returning the claims.
    pub fn verify(&self, token: &str) -> Result<TrackingClaims> {
        decode::<TrackingClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_public_id() {
        let tokens = TrackingTokens::new("test-secret");
        let token = tokens.issue("AB12CD34").unwrap();
        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.public_id, "AB12CD34");
    }

    #[test]
    fn wrong_secret_fails_verification() {
        let issuer = TrackingTokens::new("secret-a");
        let verifier = TrackingTokens::new("secret-b");
        let token = issuer.issue("AB12CD34").unwrap();
        assert!(verifier.verify(&token).is_err());
    }

    #[test]
    fn expired_token_fails_verification() {
        let tokens = TrackingTokens::with_ttl_days("test-secret", -1);
        let token = tokens.issue("AB12CD34").unwrap();
        assert!(tokens.verify(&token).is_err());
    }
}
