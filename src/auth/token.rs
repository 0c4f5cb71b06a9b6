use async_trait::async_trait;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{Result, TripSyncError};

/// Verified identity produced by token validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub email: String,
}

/// Session-token validation collaborator
///
/// The application's session layer owns token issuance; the realtime
/// layer only needs the raw artifact turned into a verified identity.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, raw: &str) -> Result<Identity>;
}

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Account email
    pub email: String,
    /// Expiration time (as UTC timestamp)
    pub exp: usize,
    /// Issued at (as UTC timestamp)
    pub iat: usize,
}

impl Claims {
    /// Creates new claims for a user, valid for 24 hours
    pub fn new(user_id: String, email: String) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards")
            .as_secs() as usize;

        Self {
            sub: user_id,
            email,
            exp: now + 86400,
            iat: now,
        }
    }
}

/// HS256 implementation of [`TokenValidator`]
pub struct JwtTokenValidator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtTokenValidator {
    /// Creates a new validator with a shared secret
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    /// Issues a signed token for the given identity (tests and tooling)
    pub fn generate_token(&self, user_id: &str, email: &str) -> Result<String> {
        let claims = Claims::new(user_id.to_string(), email.to_string());
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| TripSyncError::ConfigError(format!("Failed to sign token: {}", e)))
    }
}

#[async_trait]
impl TokenValidator for JwtTokenValidator {
    async fn validate(&self, raw: &str) -> Result<Identity> {
        let data = decode::<Claims>(raw, &self.decoding_key, &self.validation)
            .map_err(|e| TripSyncError::Unauthorized(format!("Invalid token: {}", e)))?;

        Ok(Identity {
            user_id: data.claims.sub,
            email: data.claims.email,
        })
    }
}
