use actix_web::{web, HttpResponse};
use tracing::{info, warn};

use crate::auth::{self, AuthenticatedUser, TokenIssuer};
use crate::config::Config;
use crate::db::Database;
use crate::error::{AppError, MessageBody};
use crate::models::review::{NewReview, RateRequest, ReviewUpdate};
use crate::models::user::{Credentials, TokenResponse};
use crate::rules::{self, AccessError, Action};

pub async fn register(
    db: web::Data<Database>,
    tokens: web::Data<TokenIssuer>,
    config: web::Data<Config>,
    body: web::Json<Credentials>,
) -> Result<HttpResponse, AppError> {
    let credentials = body.into_inner();
    credentials.validate().map_err(AppError::Validation)?;

    let hash = auth::hash_password(credentials.password, config.bcrypt_cost).await?;
    let user = db.create_user(&credentials.username, &hash).await.map_err(|e| {
        warn!("[API] Registration failed for {}: {}", credentials.username, e);
        AppError::from(e)
    })?;

    let token = tokens.issue(&user.id)?;
    info!("[API] Registered user {}", user.username);
    Ok(HttpResponse::Created().json(TokenResponse { token }))
}

pub async fn login(
    db: web::Data<Database>,
    tokens: web::Data<TokenIssuer>,
    body: web::Json<Credentials>,
) -> Result<HttpResponse, AppError> {
    let credentials = body.into_inner();

    let Some(user) = db.find_user_by_name(&credentials.username).await? else {
        info!("[API] Login for unknown user {}", credentials.username);
        return Err(AppError::InvalidCredentials);
    };
    if !auth::verify_password(credentials.password, user.password_hash.clone()).await? {
        info!("[API] Wrong password for {}", user.username);
        return Err(AppError::InvalidCredentials);
    }

    let token = tokens.issue(&user.id)?;
    Ok(HttpResponse::Ok().json(TokenResponse { token }))
}

pub async fn get_reviews(db: web::Data<Database>) -> Result<HttpResponse, AppError> {
    let reviews = db.find_all_reviews().await?;
    info!("[API] Returning {} reviews", reviews.len());
    Ok(HttpResponse::Ok().json(reviews))
}

pub async fn get_review(
    db: web::Data<Database>,
    review_id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let review = db
        .find_review_listing(&review_id)
        .await?
        .ok_or(AccessError::NotFound)?;
    Ok(HttpResponse::Ok().json(review))
}

pub async fn create_review(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    body: web::Json<NewReview>,
) -> Result<HttpResponse, AppError> {
    let new = body.into_inner();
    new.validate().map_err(AppError::Validation)?;

    let review = db.create_review(&user.id, new).await?;
    info!("[API] Review {} created by {}", review.id, user.id);
    Ok(HttpResponse::Created().json(review))
}

pub async fn update_review(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    review_id: web::Path<String>,
    body: web::Json<ReviewUpdate>,
) -> Result<HttpResponse, AppError> {
    let existing = db.find_review(&review_id).await?;
    rules::authorize(existing, &user.id, Action::Edit)?;

    let update = body.into_inner();
    update.validate().map_err(AppError::Validation)?;

    let review = db.update_review(&review_id, update).await?;
    Ok(HttpResponse::Ok().json(review))
}

pub async fn delete_review(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    review_id: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let existing = db.find_review(&review_id).await?;
    rules::authorize(existing, &user.id, Action::Delete)?;

    db.delete_review(&review_id).await?;
    info!("[API] Review {} deleted by {}", review_id, user.id);
    Ok(HttpResponse::Ok().json(MessageBody::new("Review deleted")))
}

pub async fn rate_review(
    db: web::Data<Database>,
    user: AuthenticatedUser,
    review_id: web::Path<String>,
    body: web::Json<RateRequest>,
) -> Result<HttpResponse, AppError> {
    db.add_rating(&review_id, &user.id, body.rating).await?;
    Ok(HttpResponse::Ok().json(MessageBody::new("Rating added")))
}
