//! JWT token generation and validation

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use litemaas_shared::UserRole;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

/// JWT claims structure for LiteMaaS-issued tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: Uuid,
    pub email: String,
    pub username: String,
    /// Role names held by the user, e.g. `["user", "adminReadonly"]`
    pub roles: Vec<String>,
    /// Issued at
    pub iat: i64,
    /// Expiration
    pub exp: i64,
    /// Token type (access or refresh)
    pub token_type: TokenType,
    /// JWT ID (jti)
    pub jti: String,
}

impl Claims {
    /// Highest role in the token
    pub fn role(&self) -> UserRole {
        UserRole::highest(self.roles.iter().map(String::as_str))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Access,
    Refresh,
}

/// Identity embedded in an issued token
#[derive(Debug, Clone, Copy)]
pub struct TokenSubject<'a> {
    pub user_id: Uuid,
    pub email: &'a str,
    pub username: &'a str,
    pub roles: &'a [String],
}

/// JWT manager for token operations
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_hours: i64,
    refresh_token_expiry_days: i64,
}

impl JwtManager {
    /// Create a new JWT manager
    pub fn new(secret: &str, access_token_expiry_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            access_token_expiry_hours,
            refresh_token_expiry_days: 30,
        }
    }

    fn generate(
        &self,
        subject: TokenSubject<'_>,
        token_type: TokenType,
        lifetime: Duration,
    ) -> Result<(String, String), JwtError> {
        let now = OffsetDateTime::now_utc();
        let jti = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: subject.user_id,
            email: subject.email.to_string(),
            username: subject.username.to_string(),
            roles: subject.roles.to_vec(),
            iat: now.unix_timestamp(),
            exp: (now + lifetime).unix_timestamp(),
            token_type,
            jti: jti.clone(),
        };

        // Explicit algorithm prevents algorithm confusion
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Encoding(e.to_string()))?;

        Ok((token, jti))
    }

    /// Generate an access token; returns (token, jti)
    pub fn generate_access_token(
        &self,
        subject: TokenSubject<'_>,
    ) -> Result<(String, String), JwtError> {
        self.generate(
            subject,
            TokenType::Access,
            Duration::hours(self.access_token_expiry_hours),
        )
    }

    /// Generate a refresh token; returns (token, jti)
    pub fn generate_refresh_token(
        &self,
        subject: TokenSubject<'_>,
    ) -> Result<(String, String), JwtError> {
        self.generate(
            subject,
            TokenType::Refresh,
            Duration::days(self.refresh_token_expiry_days),
        )
    }

    /// Validate and decode a token
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 60; // 60 second clock skew tolerance

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                jsonwebtoken::errors::ErrorKind::InvalidToken => JwtError::Invalid,
                jsonwebtoken::errors::ErrorKind::InvalidAlgorithm => JwtError::Invalid,
                _ => JwtError::Validation(e.to_string()),
            })
    }

    /// Validate an access token specifically
    pub fn validate_access_token(&self, token: &str) -> Result<Claims, JwtError> {
        let claims = self.validate_token(token)?;
        if claims.token_type != TokenType::Access {
            return Err(JwtError::WrongTokenType);
        }
        Ok(claims)
    }

    /// Validate a refresh token specifically
    pub fn validate_refresh_token(&self, token: &str) -> Result<Claims, JwtError> {
        let claims = self.validate_token(token)?;
        if claims.token_type != TokenType::Refresh {
            return Err(JwtError::WrongTokenType);
        }
        Ok(claims)
    }

    /// Get access token expiry in seconds
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_hours * 3600
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token")]
    Invalid,
    #[error("Wrong token type")]
    WrongTokenType,
    #[error("Token encoding failed: {0}")]
    Encoding(String),
    #[error("Token validation failed: {0}")]
    Validation(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn roles(names: &[&str]) -> Vec<String> {
        names.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn test_token_generation_and_validation() {
        let jwt = JwtManager::new("test-secret-key-at-least-32-chars!", 24);
        let user_id = Uuid::new_v4();
        let roles = roles(&["user", "adminReadonly"]);
        let subject = TokenSubject {
            user_id,
            email: "test@example.com",
            username: "test",
            roles: &roles,
        };

        let (access_token, access_jti) = jwt
            .generate_access_token(subject)
            .expect("Failed to generate token");
        let (refresh_token, refresh_jti) = jwt
            .generate_refresh_token(subject)
            .expect("Failed to generate token");

        let claims = jwt
            .validate_access_token(&access_token)
            .expect("Invalid access token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.username, "test");
        assert_eq!(claims.token_type, TokenType::Access);
        assert_eq!(claims.jti, access_jti);
        assert_eq!(claims.role(), UserRole::AdminReadonly);

        let refresh = jwt
            .validate_refresh_token(&refresh_token)
            .expect("Invalid refresh token");
        assert_eq!(refresh.jti, refresh_jti);
        assert_ne!(access_jti, refresh_jti);
    }

    #[test]
    fn test_wrong_token_type() {
        let jwt = JwtManager::new("test-secret-key-at-least-32-chars!", 24);
        let roles = roles(&["user"]);
        let (access_token, _jti) = jwt
            .generate_access_token(TokenSubject {
                user_id: Uuid::new_v4(),
                email: "test@example.com",
                username: "test",
                roles: &roles,
            })
            .expect("Failed to generate token");

        let result = jwt.validate_refresh_token(&access_token);
        assert!(matches!(result, Err(JwtError::WrongTokenType)));
    }

    #[test]
    fn test_rejects_foreign_secret() {
        let issuer = JwtManager::new("issuer-secret-key-at-least-32-chars", 1);
        let verifier = JwtManager::new("another-secret-key-at-least-32-chars", 1);
        let roles = roles(&["admin"]);
        let (token, _) = issuer
            .generate_access_token(TokenSubject {
                user_id: Uuid::new_v4(),
                email: "a@example.com",
                username: "a",
                roles: &roles,
            })
            .unwrap();

        assert!(verifier.validate_access_token(&token).is_err());
    }
}
