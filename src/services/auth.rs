use jsonwebtoken::{Algorithm, DecodingKey, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::config::AppConfig;

/// Identity extracted from a previously issued access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Identifier of the authenticated user.
    #[serde(rename = "UserID")]
    pub user_id: String,
    /// Email the token was issued to.
    #[serde(rename = "Email")]
    pub email: String,
}

/// Reasons a token can be refused.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No token was supplied.
    #[error("missing auth token")]
    MissingToken,
    /// The `exp` claim is in the past.
    #[error("token is expired")]
    Expired,
    /// Signature, issuer or claims did not check out.
    #[error("invalid token: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
}

/// Verifies access tokens issued by the authentication service.
pub trait TokenValidator: Send + Sync {
    /// Decode `token` and return its claims.
    fn validate(&self, token: &str) -> Result<TokenClaims, AuthError>;
}

/// HS256 validator sharing its secret with the token issuer.
pub struct JwtTokenValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtTokenValidator {
    /// HS256 validator for `secret`, optionally pinned to an issuer.
    pub fn new(secret: &str, issuer: Option<&str>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = issuer {
            validation.set_issuer(&[issuer]);
        }

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Build the validator from configuration.
    ///
    /// Without a configured secret a random one is generated, so no external token validates.
    pub fn from_config(config: &AppConfig) -> Self {
        match config.jwt_secret() {
            Some(secret) => Self::new(secret, config.jwt_issuer()),
            None => {
                warn!("no JWT secret configured; group-scoped rooms will reject every token");
                Self::new(&Uuid::new_v4().simple().to_string(), config.jwt_issuer())
            }
        }
    }
}

impl TokenValidator for JwtTokenValidator {
    fn validate(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }

        jsonwebtoken::decode::<TokenClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(err),
            })
    }
}

#[cfg(test)]
mod tests {
    use std::time::{SystemTime, UNIX_EPOCH};

    use jsonwebtoken::{EncodingKey, Header};

    use super::*;

    #[derive(Serialize)]
    struct IssuedClaims<'a> {
        #[serde(rename = "UserID")]
        user_id: &'a str,
        #[serde(rename = "Email")]
        email: &'a str,
        exp: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        iss: Option<&'a str>,
    }

    fn now() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn issue(secret: &str, exp: u64, iss: Option<&str>) -> String {
        jsonwebtoken::encode(
            &Header::default(),
            &IssuedClaims {
                user_id: "u-1",
                email: "alice@example.com",
                exp,
                iss,
            },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn accepts_token_signed_with_shared_secret() {
        let validator = JwtTokenValidator::new("secret", None);
        let claims = validator
            .validate(&issue("secret", now() + 3600, None))
            .unwrap();
        assert_eq!(claims.user_id, "u-1");
        assert_eq!(claims.email, "alice@example.com");
    }

    #[test]
    fn rejects_token_signed_with_other_secret() {
        let validator = JwtTokenValidator::new("secret", None);
        let err = validator
            .validate(&issue("other", now() + 3600, None))
            .unwrap_err();
        assert!(matches!(err, AuthError::Invalid(_)));
    }

    #[test]
    fn rejects_expired_token() {
        let validator = JwtTokenValidator::new("secret", None);
        let err = validator
            .validate(&issue("secret", now() - 3600, None))
            .unwrap_err();
        assert!(matches!(err, AuthError::Expired));
    }

    #[test]
    fn enforces_configured_issuer() {
        let validator = JwtTokenValidator::new("secret", Some("quiz-auth"));
        assert!(
            validator
                .validate(&issue("secret", now() + 3600, Some("quiz-auth")))
                .is_ok()
        );
        assert!(
            validator
                .validate(&issue("secret", now() + 3600, Some("someone-else")))
                .is_err()
        );
    }

    #[test]
    fn blank_token_is_missing() {
        let validator = JwtTokenValidator::new("secret", None);
        assert!(matches!(
            validator.validate("  "),
            Err(AuthError::MissingToken)
        ));
    }
}
