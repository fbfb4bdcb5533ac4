use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config::JwtConfig;
use crate::models::User;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("invalid or expired token")]
    InvalidToken,
    #[error("password hashing failed: {0}")]
    Hashing(String),
    #[error("token signing failed: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: i64,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Password hashing and HS256 tokens.
#[derive(Clone)]
pub struct AuthService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    token_lifetime: Duration,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding: DecodingKey::from_secret(config.secret.as_bytes()),
            token_lifetime: Duration::hours(config.expires_in_hours),
            bcrypt_cost: config.bcrypt_cost,
        }
    }

    pub async fn hash_password(&self, password: String) -> Result<String, AuthError> {
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// Checks `password` against the stored hash; a mismatch is
    /// `InvalidCredentials`.
    pub async fn verify_password(&self, password: String, hash: String) -> Result<(), AuthError> {
        let matches = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .map_err(|e| AuthError::Hashing(e.to_string()))?;

        if matches {
            Ok(())
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    pub fn issue_token(&self, user: &User) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            iat: now.timestamp(),
            exp: (now + self.token_lifetime).timestamp(),
        };
        Ok(encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("Token rejected: {}", e);
                AuthError::InvalidToken
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> AuthService {
        AuthService::new(&JwtConfig {
            secret: "test-secret".to_string(),
            expires_in_hours: 1,
            bcrypt_cost: 4,
        })
    }

    fn user() -> User {
        User {
            id: 42,
            name: "Ada".to_string(),
            email: "ada@example.com".to_string(),
            password_hash: String::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn issued_token_round_trips_claims() {
        let auth = service();
        let token = auth.issue_token(&user()).unwrap();
        let claims = auth.verify_token(&token).unwrap();
        assert_eq!(claims.sub, 42);
        assert_eq!(claims.email, "ada@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn token_signed_with_another_secret_is_rejected() {
        let other = AuthService::new(&JwtConfig {
            secret: "someone-else".to_string(),
            expires_in_hours: 1,
            bcrypt_cost: 4,
        });
        let token = other.issue_token(&user()).unwrap();
        assert!(matches!(
            service().verify_token(&token),
            Err(AuthError::InvalidToken)
        ));
    }

    #[test]
    fn tampered_token_is_rejected() {
        let auth = service();
        let token = auth.issue_token(&user()).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        parts[2] = "c2lnbmF0dXJl";
        assert!(auth.verify_token(&parts.join(".")).is_err());
        assert!(auth.verify_token("not-a-token").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let auth = service();
        let issued = Utc::now() - Duration::hours(3);
        let claims = Claims {
            sub: 42,
            email: "ada@example.com".to_string(),
            iat: issued.timestamp(),
            exp: (issued + Duration::hours(1)).timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &auth.encoding).unwrap();
        assert!(matches!(auth.verify_token(&token), Err(AuthError::InvalidToken)));
    }

    #[tokio::test]
    async fn password_hash_verifies_only_its_password() {
        let auth = service();
        let hash = auth.hash_password("hunter22".to_string()).await.unwrap();
        assert_ne!(hash, "hunter22");
        auth.verify_password("hunter22".to_string(), hash.clone())
            .await
            .unwrap();
        assert!(matches!(
            auth.verify_password("hunter23".to_string(), hash).await,
            Err(AuthError::InvalidCredentials)
        ));
    }
}
