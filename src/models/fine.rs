//! Fine ledger model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::enums::{FineReason, FineStatus};
use super::loan::{Settlement, DISPLAY_DATE_FORMAT};

/// Penalty owed by a reader
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Fine {
    pub id: i32,
    pub user_id: i32,
    /// Loan the fine was raised on, if any
    pub transaction_id: Option<i32>,
    pub amount: i64,
    pub reason: FineReason,
    pub description: String,
    pub status: FineStatus,
    pub created_at: DateTime<Utc>,
    pub payment_date: Option<DateTime<Utc>>,
}

/// Fine to insert
#[derive(Debug, Clone)]
pub struct NewFine {
    pub user_id: i32,
    pub transaction_id: Option<i32>,
    pub amount: i64,
    pub reason: FineReason,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

impl NewFine {
    /// Automatic overdue fine for a loan closed late
    pub fn overdue(
        user_id: i32,
        transaction_id: i32,
        book_title: &str,
        settlement: Settlement,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            transaction_id: Some(transaction_id),
            amount: settlement.fine_amount,
            reason: FineReason::Overdue,
            description: format!(
                "Overdue {} day(s) - Book: {}",
                settlement.overdue_days, book_title
            ),
            created_at: now,
        }
    }
}

/// Manual fine request (damage, loss or any other staff decision)
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateFine {
    pub user_id: i32,
    #[validate(range(min = 1, message = "Amount must be positive"))]
    pub amount: i64,
    /// `damaged`, `lost` or `other`
    pub reason: FineReason,
    #[serde(default)]
    pub note: String,
}

/// Fine with the reader's identity, as listed for staff
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct FineDetails {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub fine: Fine,
    pub user_name: String,
    pub student_id: Option<String>,
}

/// Listing row sent to the fines screen
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FineView {
    #[serde(flatten)]
    pub details: FineDetails,
    pub created_at_fmt: String,
    pub is_paid: bool,
}

impl From<FineDetails> for FineView {
    fn from(details: FineDetails) -> Self {
        Self {
            created_at_fmt: details.fine.created_at.format(DISPLAY_DATE_FORMAT).to_string(),
            is_paid: details.fine.status == FineStatus::Paid,
            details,
        }
    }
}

/// Result of a pay-fine attempt
#[derive(Debug, Clone)]
pub enum FinePayment {
    /// The fine moved from unpaid to paid just now
    Paid(Fine),
    /// The fine was already paid; nothing was changed
    AlreadyPaid(Fine),
}

/// Orders fines unpaid first, then newest first
pub fn ledger_order(a: &Fine, b: &Fine) -> std::cmp::Ordering {
    let rank = |f: &Fine| match f.status {
        FineStatus::Unpaid => 0,
        FineStatus::Paid => 1,
    };
    rank(a)
        .cmp(&rank(b))
        .then_with(|| b.created_at.cmp(&a.created_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn fine(id: i32, status: FineStatus, age_days: i64) -> Fine {
        Fine {
            id,
            user_id: 1,
            transaction_id: None,
            amount: 1000,
            reason: FineReason::Manual,
            description: String::new(),
            status,
            created_at: Utc::now() - Duration::days(age_days),
            payment_date: None,
        }
    }

    #[test]
    fn unpaid_first_then_newest() {
        let mut fines = vec![
            fine(1, FineStatus::Paid, 0),
            fine(2, FineStatus::Unpaid, 5),
            fine(3, FineStatus::Unpaid, 1),
            fine(4, FineStatus::Paid, 3),
        ];
        fines.sort_by(ledger_order);
        let ids: Vec<_> = fines.iter().map(|f| f.id).collect();
        assert_eq!(ids, [3, 2, 1, 4]);
    }

    #[test]
    fn overdue_description_names_days_and_title() {
        let f = NewFine::overdue(
            1,
            9,
            "Clean Code",
            Settlement { overdue_days: 3, fine_amount: 3000 },
            Utc::now(),
        );
        assert_eq!(f.amount, 3000);
        assert_eq!(f.reason, FineReason::Overdue);
        assert!(f.description.contains("3 day"));
        assert!(f.description.contains("Clean Code"));
    }
}
