//! Book review backend.
//!
//! Users register and log in for a bearer token, then write reviews of
//! books and rate each other's reviews. Reviews can only be edited or
//! deleted by their author, nobody rates their own review, and each user
//! rates a given review at most once.
//!
//! # Routes
//!
//! | Method | Path | Auth |
//! |---|---|---|
//! | POST | `/api/auth/register` | none |
//! | POST | `/api/auth/login` | none |
//! | GET | `/api/reviews` | none |
//! | GET | `/api/reviews/{id}` | none |
//! | POST | `/api/reviews` | token |
//! | PUT | `/api/reviews/{id}` | token, owner |
//! | DELETE | `/api/reviews/{id}` | token, owner |
//! | POST | `/api/reviews/{id}/rate` | token, non-owner |

use actix_web::web;

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod rules;

pub mod models {
    pub mod review;
    pub mod user;
}

use error::AppError;

/// Registers every route plus the JSON error handler. Shared state
/// (`Database`, `TokenIssuer`, `Config`) is added by the caller.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::Validation(err.to_string()).into()),
    )
    .service(
        web::scope("/api")
            .service(
                web::scope("/auth")
                    .route("/register", web::post().to(api::register))
                    .route("/login", web::post().to(api::login)),
            )
            .service(
                web::scope("/reviews")
                    .route("", web::get().to(api::get_reviews))
                    .route("", web::post().to(api::create_review))
                    .route("/{id}", web::get().to(api::get_review))
                    .route("/{id}", web::put().to(api::update_review))
                    .route("/{id}", web::delete().to(api::delete_review))
                    .route("/{id}/rate", web::post().to(api::rate_review)),
            ),
    );
}
