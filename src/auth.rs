//! Tokens, password hashing and the bearer-token extractor.
//!
//! Tokens are HS256 JWTs carrying the user id. Protected handlers take an
//! [`AuthenticatedUser`] argument; extraction verifies the token, then
//! looks the user up in the store, and fails with 401 before the handler
//! body runs if either step does.

use actix_web::{dev::Payload, http::header, web, FromRequest, HttpRequest};
use chrono::{DateTime, Duration, Utc};
use futures::future::LocalBoxFuture;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error};

use crate::db::Database;
use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Error, Debug)]
pub enum TokenError {
    #[error("failed to sign token: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),

    #[error("token rejected: {0}")]
    Rejected(#[source] jsonwebtoken::errors::Error),
}

/// Issues and verifies signed, time-limited identity tokens.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: Duration::seconds(ttl_secs.min(u64::from(u32::MAX)) as i64),
        }
    }

    pub fn issue(&self, user_id: &str) -> Result<String, TokenError> {
        self.issue_at(user_id, Utc::now())
    }

    pub fn issue_at(&self, user_id: &str, issued_at: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = Claims {
            user_id: user_id.to_string(),
            iat: issued_at.timestamp(),
            exp: (issued_at + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(TokenError::Sign)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        decode::<Claims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(TokenError::Rejected)
    }
}

/// Hashes on the blocking pool; bcrypt is deliberately slow.
pub async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    let hashed = web::block(move || bcrypt::hash(password, cost)).await??;
    Ok(hashed)
}

pub async fn verify_password(password: String, hash: String) -> Result<bool, AppError> {
    let matches = web::block(move || bcrypt::verify(password, &hash)).await??;
    Ok(matches)
}

/// Identity resolved from the `Authorization: Bearer` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub id: String,
    pub username: String,
}

impl FromRequest for AuthenticatedUser {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let claims = verified_claims(req);
        let db = req.app_data::<web::Data<Database>>().cloned();

        Box::pin(async move {
            let claims = claims?;
            let Some(db) = db else {
                error!("[AUTH] Database missing from app data");
                return Err(AppError::internal("database not configured"));
            };
            resolve_user(&db, claims).await
        })
    }
}

fn bearer_token(req: &HttpRequest) -> Option<&str> {
    let value = req.headers().get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    (!token.is_empty()).then_some(token)
}

fn verified_claims(req: &HttpRequest) -> Result<Claims, AppError> {
    let Some(issuer) = req.app_data::<web::Data<TokenIssuer>>() else {
        error!("[AUTH] TokenIssuer missing from app data");
        return Err(AppError::internal("token issuer not configured"));
    };

    let token = bearer_token(req).ok_or(AppError::Unauthenticated)?;
    issuer.verify(token).map_err(|e| {
        debug!("[AUTH] {e}");
        AppError::Unauthenticated
    })
}

// A valid signature is not enough: the user must still exist.
async fn resolve_user(db: &Database, claims: Claims) -> Result<AuthenticatedUser, AppError> {
    match db.find_user_by_id(&claims.user_id).await? {
        Some(user) => Ok(AuthenticatedUser {
            id: user.id,
            username: user.username,
        }),
        None => {
            debug!("[AUTH] Token for unknown user {}", claims.user_id);
            Err(AppError::Unauthenticated)
        }
    }
}
