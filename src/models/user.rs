// src/models/user.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered account. The password is only ever held as a bcrypt hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: String,            // Unique ID for the user
    pub username: String,      // Unique login name
    pub password_hash: String, // bcrypt hash of the password
    pub created_at: DateTime<Utc>,
}

/// Body of both `POST /api/auth/register` and `POST /api/auth/login`.
#[derive(Deserialize, Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn validate(&self) -> Result<(), String> {
        if self.username.trim().is_empty() {
            return Err("username is required".into());
        }
        if self.password.is_empty() {
            return Err("password is required".into());
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TokenResponse {
    pub token: String,
}
