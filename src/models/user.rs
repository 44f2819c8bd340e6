//! User model, token claims and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::enums::Role;
use super::loan::LoanTransaction;
use crate::error::AppError;

/// User account
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i32,
    pub username: String,
    /// Student number; readers log in with it
    pub student_id: Option<String>,
    pub fullname: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub failed_attempts: i32,
    pub lock_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.lock_until.map(|until| until > now).unwrap_or(false)
    }
}

/// Account to insert
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub student_id: Option<String>,
    pub fullname: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Role,
    pub password_hash: String,
}

/// Staff request to register a reader
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateReader {
    /// Student number, also used as the login
    #[validate(length(min = 1, message = "Student id is required"))]
    pub student_id: String,
    #[validate(length(min = 1, message = "Full name is required"))]
    pub fullname: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

/// Change own password request
#[derive(Debug, Deserialize, ToSchema)]
pub struct ChangePassword {
    pub old_password: String,
    pub new_password: String,
}

/// Reader with circulation totals, as listed for staff
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
pub struct ReaderSummary {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub user: User,
    /// Open `borrowing` loans
    pub borrow_count: i64,
    /// Sum of unpaid fines
    pub total_fine: i64,
}

/// Reader search parameters
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct ReaderQuery {
    /// Substring of the full name or student id
    pub q: Option<String>,
}

/// Own profile with recent history
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Profile {
    pub user: User,
    pub history: Vec<LoanTransaction>,
}

/// JWT claims for authenticated users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserClaims {
    pub sub: String,
    pub user_id: i32,
    pub role: Role,
    pub fullname: String,
    pub exp: i64,
    pub iat: i64,
}

impl UserClaims {
    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse JWT token
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &Validation::default(),
        )?;
        Ok(token_data.claims)
    }

    /// Library staff
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }

    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(AppError::Authorization("Staff privileges required".to_string()))
        }
    }

    /// The acting principal handed to the circulation engine
    pub fn principal(&self) -> Principal {
        Principal {
            user_id: self.user_id,
            role: self.role,
        }
    }
}

/// Verified identity of the caller, trusted by the services
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user_id: i32,
    pub role: Role,
}

impl Principal {
    pub fn is_staff(&self) -> bool {
        self.role.is_staff()
    }
}
