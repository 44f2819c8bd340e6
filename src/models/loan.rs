//! Loan transaction model and the pure circulation rules applied to it

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::enums::TransactionStatus;
use crate::error::{AppError, AppResult};

/// One loan lifecycle record. Never deleted; `returned` rows form the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LoanTransaction {
    pub id: i32,
    pub user_id: i32,
    pub barcode: String,
    pub isbn: String,
    /// Title at the time the loan was opened
    pub book_title: String,
    pub status: TransactionStatus,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub renew_count: i32,
    pub return_date: Option<DateTime<Utc>>,
    pub overdue_days: Option<i64>,
    pub fine_amount: Option<i64>,
}

/// Fields of a transaction opened by claiming a copy
#[derive(Debug, Clone)]
pub struct LoanDraft {
    pub user_id: i32,
    /// `Borrowing` for a direct loan, `Pending` for a reservation
    pub status: TransactionStatus,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    /// Refuse the claim when the user already holds this many counted loans
    pub max_open_loans: Option<i64>,
}

impl LoanDraft {
    /// Statuses that count towards `max_open_loans`: borrowing loans for a
    /// direct loan, every open transaction for a reservation
    pub fn counted_statuses(&self) -> &'static [TransactionStatus] {
        match self.status {
            TransactionStatus::Pending => &TransactionStatus::OPEN,
            _ => &[TransactionStatus::Borrowing],
        }
    }
}

/// Which copy a claim may take
#[derive(Debug, Clone)]
pub enum ClaimTarget {
    /// Exactly this copy, if it is still available
    Barcode(String),
    /// Any available copy of the title
    Isbn(String),
}

/// Outcome of closing a loan, computed from its due date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct Settlement {
    pub overdue_days: i64,
    pub fine_amount: i64,
}

impl Settlement {
    /// Whole days past `due_date` (never negative) at a flat daily rate
    pub fn compute(due_date: DateTime<Utc>, now: DateTime<Utc>, fine_per_day: i64) -> Self {
        let overdue_days = (now - due_date).num_days().max(0);
        Self {
            overdue_days,
            fine_amount: overdue_days * fine_per_day,
        }
    }
}

/// Parameters the store needs to close a loan atomically
#[derive(Debug, Clone, Copy)]
pub struct ReturnPolicy {
    pub now: DateTime<Utc>,
    pub fine_per_day: i64,
}

impl ReturnPolicy {
    pub fn settle(&self, loan: &LoanTransaction) -> Settlement {
        Settlement::compute(loan.due_date, self.now, self.fine_per_day)
    }
}

impl LoanTransaction {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == TransactionStatus::Borrowing && now > self.due_date
    }

    /// Renewal gate, checked in order: status, renewal count, due date.
    pub fn check_renewable(&self, now: DateTime<Utc>, max_renewals: i32) -> AppResult<()> {
        if self.status != TransactionStatus::Borrowing {
            return Err(AppError::InvalidState(format!(
                "Only borrowing loans can be renewed (loan {} is {})",
                self.id, self.status
            )));
        }
        if self.renew_count >= max_renewals {
            return Err(AppError::RenewalLimitReached(max_renewals));
        }
        if now > self.due_date {
            return Err(AppError::AlreadyOverdue);
        }
        Ok(())
    }

    pub fn renewed_due_date(&self, renewal_days: i64) -> DateTime<Utc> {
        self.due_date + Duration::days(renewal_days)
    }
}

/// Open loan as shown to staff and readers
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoanView {
    pub id: i32,
    pub user_id: i32,
    pub barcode: String,
    pub book_title: String,
    pub status: TransactionStatus,
    pub borrow_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub borrow_date_fmt: String,
    pub due_date_fmt: String,
    pub renew_count: i32,
    pub is_overdue: bool,
    /// Whole days until due, 0 once overdue
    pub days_left: i64,
}

pub const DISPLAY_DATE_FORMAT: &str = "%d/%m/%Y";

impl LoanView {
    pub fn from_transaction(loan: LoanTransaction, now: DateTime<Utc>) -> Self {
        let days_left = (loan.due_date - now).num_days().max(0);
        Self {
            is_overdue: now > loan.due_date,
            borrow_date_fmt: loan.borrow_date.format(DISPLAY_DATE_FORMAT).to_string(),
            due_date_fmt: loan.due_date.format(DISPLAY_DATE_FORMAT).to_string(),
            id: loan.id,
            user_id: loan.user_id,
            barcode: loan.barcode,
            book_title: loan.book_title,
            status: loan.status,
            borrow_date: loan.borrow_date,
            due_date: loan.due_date,
            renew_count: loan.renew_count,
            days_left,
        }
    }
}

/// Filter for transaction listings; results are newest `borrow_date` first
#[derive(Debug, Clone, Default)]
pub struct LoanFilter {
    pub user_id: Option<i32>,
    pub statuses: Vec<TransactionStatus>,
    pub limit: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loan(status: TransactionStatus, due_in_hours: i64, renew_count: i32) -> LoanTransaction {
        let now = Utc::now();
        LoanTransaction {
            id: 1,
            user_id: 7,
            barcode: "978-1-1".into(),
            isbn: "978-1".into(),
            book_title: "Clean Code".into(),
            status,
            borrow_date: now - Duration::days(7),
            due_date: now + Duration::hours(due_in_hours),
            renew_count,
            return_date: None,
            overdue_days: None,
            fine_amount: None,
        }
    }

    #[test]
    fn settlement_counts_whole_days_only() {
        let now = Utc::now();
        let s = Settlement::compute(now - Duration::days(3) - Duration::minutes(1), now, 1000);
        assert_eq!(s, Settlement { overdue_days: 3, fine_amount: 3000 });

        let s = Settlement::compute(now - Duration::hours(20), now, 1000);
        assert_eq!(s.overdue_days, 0);
        assert_eq!(s.fine_amount, 0);

        let s = Settlement::compute(now + Duration::days(4), now, 1000);
        assert_eq!(s, Settlement { overdue_days: 0, fine_amount: 0 });
    }

    #[test]
    fn renewal_gate_order() {
        let now = Utc::now();

        // A reservation is rejected on status even when also overdue.
        let pending = loan(TransactionStatus::Pending, -48, 0);
        assert!(matches!(pending.check_renewable(now, 1), Err(AppError::InvalidState(_))));

        // Limit is checked before the due date.
        let renewed_and_late = loan(TransactionStatus::Borrowing, -48, 1);
        assert!(matches!(
            renewed_and_late.check_renewable(now, 1),
            Err(AppError::RenewalLimitReached(1))
        ));

        let late = loan(TransactionStatus::Borrowing, -1, 0);
        assert!(matches!(late.check_renewable(now, 1), Err(AppError::AlreadyOverdue)));

        let fine = loan(TransactionStatus::Borrowing, 24, 0);
        assert!(fine.check_renewable(now, 1).is_ok());
    }

    #[test]
    fn renewal_extends_from_due_date() {
        let l = loan(TransactionStatus::Borrowing, 24, 0);
        assert_eq!(l.renewed_due_date(7), l.due_date + Duration::days(7));
    }

    #[test]
    fn view_reports_overdue_and_days_left() {
        let now = Utc::now();
        let view = LoanView::from_transaction(loan(TransactionStatus::Borrowing, -30, 0), now);
        assert!(view.is_overdue);
        assert_eq!(view.days_left, 0);

        let view = LoanView::from_transaction(loan(TransactionStatus::Borrowing, 24 * 5 + 2, 0), now);
        assert!(!view.is_overdue);
        assert_eq!(view.days_left, 5);
        assert_eq!(view.due_date_fmt.len(), 10);
    }
}
