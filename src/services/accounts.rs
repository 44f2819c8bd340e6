//! Accounts: login with lockout, profiles and staff reader administration

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{Duration, Utc};
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::{
        enums::Role,
        loan::LoanFilter,
        user::{CreateReader, NewUser, Profile, ReaderSummary, User, UserClaims},
    },
    repository::Repository,
};

/// Transactions shown on a profile page
const PROFILE_HISTORY: i64 = 10;
/// Matches returned by the reader quick search
const READER_SEARCH_LIMIT: i64 = 5;

/// Successful login
#[derive(Debug, Clone)]
pub struct Login {
    pub token: String,
    pub user: User,
}

#[derive(Clone)]
pub struct AccountsService {
    repository: Repository,
    config: AuthConfig,
}

impl AccountsService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Hash a password using Argon2
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    fn verify_password(&self, user: &User, password: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    fn issue_token(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let claims = UserClaims {
            sub: user.username.clone(),
            user_id: user.id,
            role: user.role,
            fullname: user.fullname.clone(),
            exp: now + (self.config.jwt_expiration_hours as i64 * 3600),
            iat: now,
        };
        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Authenticate by username or student id.
    ///
    /// Each wrong password counts towards a temporary lock; reaching the limit
    /// locks the account and starts a fresh count for when it reopens.
    pub async fn login(&self, login: &str, password: &str) -> AppResult<Login> {
        let login = login.trim();
        let user = self
            .repository
            .find_user_by_login(login)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Account {} does not exist", login)))?;

        let now = Utc::now();
        if let Some(until) = user.lock_until.filter(|until| *until > now) {
            return Err(AppError::Authorization(format!(
                "Account is locked until {}",
                until.format("%H:%M:%S")
            )));
        }

        if !self.verify_password(&user, password)? {
            let attempts = user.failed_attempts + 1;
            let max = self.config.max_failed_attempts;
            if attempts >= max {
                let until = now + Duration::minutes(self.config.lockout_minutes);
                self.repository
                    .record_failed_login(user.id, 0, Some(until))
                    .await?;
                tracing::warn!(user_id = user.id, "Account locked after failed logins");
                return Err(AppError::Authentication(format!(
                    "Wrong password ({}/{}); account locked for {} minutes",
                    attempts, max, self.config.lockout_minutes
                )));
            }
            self.repository
                .record_failed_login(user.id, attempts, None)
                .await?;
            return Err(AppError::Authentication(format!(
                "Wrong password ({}/{})",
                attempts, max
            )));
        }

        if user.failed_attempts > 0 || user.lock_until.is_some() {
            self.repository.reset_failed_logins(user.id).await?;
        }

        let token = self.issue_token(&user)?;
        tracing::info!(user_id = user.id, role = %user.role, "User logged in");
        Ok(Login { token, user })
    }

    pub async fn get_user(&self, user_id: i32) -> AppResult<User> {
        self.repository
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("User {} not found", user_id)))
    }

    /// Own account with the latest transactions
    pub async fn profile(&self, user_id: i32) -> AppResult<Profile> {
        let user = self.get_user(user_id).await?;
        let history = self
            .repository
            .list_transactions(&LoanFilter {
                user_id: Some(user_id),
                statuses: Vec::new(),
                limit: Some(PROFILE_HISTORY),
            })
            .await?;
        Ok(Profile { user, history })
    }

    pub async fn change_password(
        &self,
        user_id: i32,
        old_password: &str,
        new_password: &str,
    ) -> AppResult<()> {
        let user = self.get_user(user_id).await?;
        if !self.verify_password(&user, old_password)? {
            return Err(AppError::InvalidInput(
                "Current password is incorrect".to_string(),
            ));
        }
        if new_password.chars().count() < self.config.min_password_length {
            return Err(AppError::InvalidInput(format!(
                "New password must be at least {} characters",
                self.config.min_password_length
            )));
        }

        let hash = self.hash_password(new_password)?;
        self.repository.set_password(user_id, &hash).await?;
        tracing::info!(user_id, "Password changed");
        Ok(())
    }

    pub async fn list_readers(&self) -> AppResult<Vec<ReaderSummary>> {
        self.repository.list_readers(None, None).await
    }

    /// Quick search by name or student id
    pub async fn find_readers(&self, query: &str) -> AppResult<Vec<ReaderSummary>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.repository
            .list_readers(Some(query), Some(READER_SEARCH_LIMIT))
            .await
    }

    /// Register a reader who logs in with their student id and the default password
    pub async fn create_reader(&self, request: CreateReader) -> AppResult<User> {
        request.validate()?;
        let student_id = request.student_id.trim().to_string();
        let user = self
            .repository
            .create_user(&NewUser {
                username: student_id.clone(),
                student_id: Some(student_id),
                fullname: request.fullname.trim().to_string(),
                email: Some(request.email.trim().to_string()),
                phone: request.phone.filter(|p| !p.trim().is_empty()),
                role: Role::User,
                password_hash: self.hash_password(&self.config.default_password)?,
            })
            .await?;

        tracing::info!(user_id = user.id, username = %user.username, "Reader created");
        Ok(user)
    }

    /// Put a reader's password back to the default one
    pub async fn reset_password(&self, user_id: i32) -> AppResult<()> {
        let hash = self.hash_password(&self.config.default_password)?;
        self.repository.set_password(user_id, &hash).await?;
        self.repository.reset_failed_logins(user_id).await?;
        tracing::info!(user_id, "Password reset");
        Ok(())
    }

    /// Create the configured staff account if it does not exist yet
    pub async fn ensure_admin(&self) -> AppResult<()> {
        let Some(password) = self.config.admin_password.as_deref() else {
            return Ok(());
        };
        let username = self.config.admin_username.trim();
        if self.repository.find_user_by_login(username).await?.is_some() {
            return Ok(());
        }

        let user = self
            .repository
            .create_user(&NewUser {
                username: username.to_string(),
                student_id: None,
                fullname: "Administrator".to_string(),
                email: None,
                phone: None,
                role: Role::Admin,
                password_hash: self.hash_password(password)?,
            })
            .await?;
        tracing::info!(user_id = user.id, username, "Staff account created");
        Ok(())
    }
}
