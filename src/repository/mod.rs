//! Repository layer: the store boundary
//!
//! Every method of [`LibraryStore`] is one atomic unit with respect to the
//! copies, titles and transactions it touches. The circulation rules live in
//! the services; the store only guarantees that a copy is claimed at most once
//! and that `qty_avail` moves together with the copy status.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    config::{DatabaseConfig, StoreBackend},
    error::{AppError, AppResult},
    models::{
        cart::{CartAdd, CartItem},
        copy::Copy,
        enums::{CopyStatus, TransactionStatus},
        fine::{Fine, FineDetails, FinePayment, NewFine},
        loan::{ClaimTarget, LoanDraft, LoanFilter, LoanTransaction, ReturnPolicy, Settlement},
        title::Title,
        user::{NewUser, ReaderSummary, User},
    },
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Shared handle to the store, injected into every service
pub type Repository = Arc<dyn LibraryStore>;

/// Outcome of deleting a title
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TitleRemoval {
    Removed { copies: u64 },
    NotFound,
    /// At least one copy is not `available`
    InUse,
}

/// Outcome of deleting a single copy
#[derive(Debug, Clone)]
pub enum CopyRemoval {
    Removed(Copy),
    NotFound,
    InUse(CopyStatus),
}

/// A loan closed by a return
#[derive(Debug, Clone)]
pub struct ClosedLoan {
    pub loan: LoanTransaction,
    pub settlement: Settlement,
    /// Overdue fine raised in the same unit, when the settlement has one
    pub fine: Option<Fine>,
}

/// Copy totals across the whole collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyCounts {
    pub available: i64,
    pub in_use: i64,
}

#[async_trait]
pub trait LibraryStore: Send + Sync {
    /// Check the store is reachable
    async fn ping(&self) -> AppResult<()>;

    /// Release the underlying connections
    async fn close(&self);

    // -- catalog -----------------------------------------------------------

    /// Insert a title and its initial copies. Fails with `DuplicateKey` on ISBN.
    async fn create_title(&self, title: &Title, copies: &[Copy]) -> AppResult<()>;

    async fn get_title(&self, isbn: &str) -> AppResult<Option<Title>>;

    /// Case-insensitive substring search over title, author and ISBN
    async fn search_titles(&self, query: &str) -> AppResult<Vec<Title>>;

    /// Delete a title and cascade to its copies, unless any copy is in use
    async fn delete_title(&self, isbn: &str) -> AppResult<TitleRemoval>;

    async fn get_copy(&self, barcode: &str) -> AppResult<Option<Copy>>;

    async fn list_copies(&self, isbn: &str) -> AppResult<Vec<Copy>>;

    /// Append `qty` available copies numbered after the title's existing ones
    /// and raise both title counters. `None` when the title does not exist.
    async fn add_copies(
        &self,
        isbn: &str,
        qty: i32,
        location: Option<&str>,
    ) -> AppResult<Option<Vec<Copy>>>;

    /// Delete an `available` copy and lower both title counters
    async fn remove_copy(&self, barcode: &str) -> AppResult<CopyRemoval>;

    // -- circulation -------------------------------------------------------

    /// Claim one `available` copy matching `target` for a new transaction.
    ///
    /// Moves the copy to the hold status of `draft.status`, decrements the
    /// title's `qty_avail` and inserts the transaction, all or nothing.
    /// Returns `None` when no available copy matched, including when a
    /// concurrent claim won the race. With `draft.max_open_loans` set, the
    /// user's counted loans are checked inside the same unit and a full
    /// quota fails with `LoanLimitExceeded`.
    async fn claim_copy(
        &self,
        target: &ClaimTarget,
        draft: &LoanDraft,
    ) -> AppResult<Option<LoanTransaction>>;

    /// Promote the user's `pending` transaction on this barcode to
    /// `borrowing` and the copy from `pending` to `borrowed`. Fails with
    /// `LoanLimitExceeded` when the user already has `max_borrowing` loans.
    async fn fulfil_reservation(
        &self,
        user_id: i32,
        barcode: &str,
        borrow_date: DateTime<Utc>,
        due_date: DateTime<Utc>,
        max_borrowing: Option<i64>,
    ) -> AppResult<Option<LoanTransaction>>;

    /// Close the `borrowing` transaction on this barcode: stamp the return,
    /// store the settlement, shelve the copy, increment `qty_avail` and raise
    /// an overdue fine when one is due. `None` when nothing is borrowed.
    /// A missing copy or title, or a copy that is not `borrowed`, fails with
    /// `Internal` and leaves everything unchanged.
    async fn close_loan(&self, barcode: &str, policy: &ReturnPolicy)
        -> AppResult<Option<ClosedLoan>>;

    /// Extend a `borrowing` transaction whose renewal count is still
    /// `expected_renew_count`. `None` when it changed underneath.
    async fn extend_loan(
        &self,
        id: i32,
        expected_renew_count: i32,
        new_due_date: DateTime<Utc>,
    ) -> AppResult<Option<LoanTransaction>>;

    async fn get_transaction(&self, id: i32) -> AppResult<Option<LoanTransaction>>;

    /// Count transactions in any of `statuses`, for one user or everyone
    async fn count_transactions(
        &self,
        user_id: Option<i32>,
        statuses: &[TransactionStatus],
    ) -> AppResult<i64>;

    async fn list_transactions(&self, filter: &LoanFilter) -> AppResult<Vec<LoanTransaction>>;

    /// Borrowing transactions past their due date
    async fn count_overdue(&self, now: DateTime<Utc>) -> AppResult<i64>;

    // -- cart --------------------------------------------------------------

    async fn get_cart(&self, user_id: i32) -> AppResult<Vec<CartItem>>;

    /// Append to the cart unless the ISBN is already there or it is full
    async fn add_cart_item(
        &self,
        user_id: i32,
        item: &CartItem,
        capacity: usize,
    ) -> AppResult<CartAdd>;

    async fn remove_cart_item(&self, user_id: i32, isbn: &str) -> AppResult<bool>;

    async fn clear_cart(&self, user_id: i32) -> AppResult<()>;

    // -- fines -------------------------------------------------------------

    async fn insert_fine(&self, fine: &NewFine) -> AppResult<Fine>;

    /// Move a fine from unpaid to paid. Never re-stamps a paid fine.
    async fn pay_fine(&self, id: i32, now: DateTime<Utc>) -> AppResult<Option<FinePayment>>;

    /// All fines, unpaid first, then newest first
    async fn list_fines(&self) -> AppResult<Vec<FineDetails>>;

    /// Sum of paid fines whose payment date falls in `[from, to)`
    async fn fine_revenue(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppResult<i64>;

    // -- users -------------------------------------------------------------

    async fn get_user(&self, id: i32) -> AppResult<Option<User>>;

    /// Look up by username or student id
    async fn find_user_by_login(&self, login: &str) -> AppResult<Option<User>>;

    /// Fails with `DuplicateKey` on username, student id or email collision
    async fn create_user(&self, user: &NewUser) -> AppResult<User>;

    async fn record_failed_login(
        &self,
        id: i32,
        attempts: i32,
        lock_until: Option<DateTime<Utc>>,
    ) -> AppResult<()>;

    async fn reset_failed_logins(&self, id: i32) -> AppResult<()>;

    async fn set_password(&self, id: i32, password_hash: &str) -> AppResult<()>;

    /// Readers (role `user`) with circulation totals, optionally filtered by
    /// a name / student id substring
    async fn list_readers(
        &self,
        query: Option<&str>,
        limit: Option<i64>,
    ) -> AppResult<Vec<ReaderSummary>>;

    // -- stats -------------------------------------------------------------

    async fn count_titles(&self) -> AppResult<i64>;

    async fn copy_counts(&self) -> AppResult<CopyCounts>;
}

/// Reject a copy status move missing from the transition table
pub(crate) fn check_copy_move(barcode: &str, from: CopyStatus, to: CopyStatus) -> AppResult<()> {
    if from.can_transition(to) {
        Ok(())
    } else {
        Err(AppError::Internal(format!(
            "Copy {} cannot move from {} to {}",
            barcode, from, to
        )))
    }
}

/// Reject a transaction status move missing from the transition table
pub(crate) fn check_transaction_move(
    id: i32,
    from: TransactionStatus,
    to: TransactionStatus,
) -> AppResult<()> {
    if from.can_transition(to) {
        Ok(())
    } else {
        Err(AppError::Internal(format!(
            "Transaction {} cannot move from {} to {}",
            id, from, to
        )))
    }
}

/// Quota check shared by the stores' claim units
pub(crate) fn check_quota(open: i64, limit: Option<i64>) -> AppResult<()> {
    match limit {
        Some(limit) if open >= limit => Err(AppError::LoanLimitExceeded { open, limit }),
        _ => Ok(()),
    }
}

/// Open the store selected by configuration
pub async fn connect(config: &DatabaseConfig) -> AppResult<Repository> {
    match config.backend {
        StoreBackend::Postgres => {
            let store = PgStore::connect(config).await?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; data is lost on shutdown");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
