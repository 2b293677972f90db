use actix_web::{
    error::BlockingError,
    http::StatusCode,
    HttpResponse, ResponseError,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

use crate::{
    auth::TokenError,
    db::DbError,
    rules::{AccessError, RatingError},
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// JSON body of every non-2xx response, and of message-only successes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MessageBody {
    pub message: String,
}

impl MessageBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("Username already taken")]
    DuplicateUsername,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Not authenticated")]
    Unauthenticated,

    #[error(transparent)]
    Access(#[from] AccessError),

    #[error(transparent)]
    Rating(#[from] RatingError),

    #[error("Server Error")]
    Internal(#[source] BoxError),
}

impl AppError {
    pub fn internal(message: &str) -> Self {
        AppError::Internal(message.into())
    }
}

impl From<DbError> for AppError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::DuplicateUsername(_) => AppError::DuplicateUsername,
            DbError::NotFound => AppError::Access(AccessError::NotFound),
            DbError::Rating(rejected) => AppError::Rating(rejected),
            other => AppError::Internal(Box::new(other)),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Internal(Box::new(err))
    }
}

impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::Internal(Box::new(err))
    }
}

impl From<BlockingError> for AppError {
    fn from(err: BlockingError) -> Self {
        AppError::Internal(Box::new(err))
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::DuplicateUsername | AppError::Rating(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::InvalidCredentials
            | AppError::Unauthenticated
            | AppError::Access(AccessError::NotOwner(_)) => StatusCode::UNAUTHORIZED,
            AppError::Access(AccessError::NotFound) => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if let AppError::Internal(source) = self {
            error!("[API] Internal error: {source}");
        }
        HttpResponse::build(self.status_code()).json(MessageBody::new(self.to_string()))
    }
}
