//! JWT client-token generation and validation.
//!
//! Tokens are HS256-signed and identify a client application, not a
//! person: `sub` is the client id and `scopes` lists what it may do
//! (see [`nrc_core::permissions`]).

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use nrc_core::permissions::Caller;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// JWT claims embedded in every client token.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject -- the client id.
    pub sub: String,
    /// Granted scopes, e.g. `notifications.publish`.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Unique token identifier for audit.
    pub jti: String,
}

impl Claims {
    pub fn into_caller(self) -> Caller {
        Caller {
            client_id: self.sub,
            scopes: self.scopes,
        }
    }
}

/// Configuration for JWT token generation and validation.
#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// HMAC-SHA256 secret shared with the token issuer.
    pub secret: String,
    /// Lifetime of tokens issued by [`generate_token`], in minutes.
    pub token_expiry_mins: i64,
}

/// Default token expiry in minutes.
const DEFAULT_EXPIRY_MINS: i64 = 60;

impl JwtConfig {
    /// Load JWT configuration from environment variables.
    ///
    /// | Env Var            | Required | Default |
    /// |--------------------|----------|---------|
    /// | `JWT_SECRET`       | **yes**  | --      |
    /// | `JWT_EXPIRY_MINS`  | no       | `60`    |
    ///
    /// # Panics
    ///
    /// Panics if `JWT_SECRET` is not set or is empty.
    pub fn from_env() -> Self {
        let secret =
            std::env::var("JWT_SECRET").expect("JWT_SECRET must be set in the environment");
        assert!(!secret.is_empty(), "JWT_SECRET must not be empty");

        let token_expiry_mins: i64 = std::env::var("JWT_EXPIRY_MINS")
            .unwrap_or_else(|_| DEFAULT_EXPIRY_MINS.to_string())
            .parse()
            .expect("JWT_EXPIRY_MINS must be a valid i64");

        Self {
            secret,
            token_expiry_mins,
        }
    }
}

/// Generate an HS256 token for a client with the given scopes.
pub fn generate_token(
    client_id: &str,
    scopes: &[&str],
    config: &JwtConfig,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = chrono::Utc::now().timestamp();
    let claims = Claims {
        sub: client_id.to_string(),
        scopes: scopes.iter().map(|s| s.to_string()).collect(),
        exp: now + config.token_expiry_mins * 60,
        iat: now,
        jti: Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(), // HS256
        &claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
}

/// Validate and decode a token, returning the embedded [`Claims`].
///
/// Validates the signature and expiration.
pub fn validate_token(
    token: &str,
    config: &JwtConfig,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(), // HS256, validates exp
    )?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use nrc_core::permissions::{SCOPE_CONSUME, SCOPE_PUBLISH};

    use super::*;

    fn test_config() -> JwtConfig {
        JwtConfig {
            secret: "test-secret-that-is-long-enough-for-hmac".to_string(),
            token_expiry_mins: 15,
        }
    }

    #[test]
    fn token_round_trip_carries_scopes() {
        let config = test_config();
        let token = generate_token("zrc", &[SCOPE_PUBLISH, SCOPE_CONSUME], &config).unwrap();
        let caller = validate_token(&token, &config).unwrap().into_caller();
        assert_eq!(caller.client_id, "zrc");
        assert!(caller.has_scope(SCOPE_PUBLISH));
        assert!(caller.has_scope(SCOPE_CONSUME));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_token("zrc", &[SCOPE_PUBLISH], &test_config()).unwrap();
        let other = JwtConfig {
            secret: "a-completely-different-secret-value".to_string(),
            token_expiry_mins: 15,
        };
        assert!(validate_token(&token, &other).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = JwtConfig {
            token_expiry_mins: -10,
            ..test_config()
        };
        let token = generate_token("zrc", &[SCOPE_PUBLISH], &config).unwrap();
        assert!(validate_token(&token, &config).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(validate_token("not.a.jwt", &test_config()).is_err());
    }
}
