//! Circulation engine: borrow, pickup, return, renew and cart checkout
//!
//! The engine decides what should happen to a copy; the store applies each
//! decision as one atomic unit and reports `None` when the copy moved
//! underneath, which the engine turns into the matching business error.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    config::CirculationConfig,
    error::{AppError, AppResult},
    models::{
        enums::{CopyStatus, TransactionStatus},
        loan::{ClaimTarget, LoanDraft, LoanFilter, LoanTransaction, LoanView, ReturnPolicy},
        user::Principal,
    },
    repository::Repository,
};

/// Optimistic renewals give up after this many lost races
const RENEW_ATTEMPTS: usize = 3;

/// Outcome of one barcode in a staff batch
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BorrowItemResult {
    pub barcode: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BorrowItemResult {
    fn admitted(loan: &LoanTransaction) -> Self {
        Self {
            barcode: loan.barcode.clone(),
            ok: true,
            transaction_id: Some(loan.id),
            due_date: Some(loan.due_date),
            error: None,
        }
    }

    fn rejected(barcode: &str, err: &AppError) -> Self {
        Self {
            barcode: barcode.to_string(),
            ok: false,
            transaction_id: None,
            due_date: None,
            error: Some(err.to_string()),
        }
    }
}

/// Staff batch borrow report; partial success is normal
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BatchBorrow {
    pub success_count: usize,
    pub items: Vec<BorrowItemResult>,
}

/// Receipt for a returned copy
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReturnReceipt {
    pub transaction_id: i32,
    pub user_id: i32,
    pub barcode: String,
    pub book_title: String,
    pub fine: i64,
    pub overdue_days: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fine_id: Option<i32>,
}

/// Cart checkout report
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutSummary {
    pub success_count: usize,
    pub reservations: Vec<LoanTransaction>,
    /// ISBNs that had no available copy
    pub skipped: Vec<String>,
}

#[derive(Clone)]
pub struct CirculationService {
    repository: Repository,
    rules: CirculationConfig,
}

impl CirculationService {
    pub fn new(repository: Repository, rules: CirculationConfig) -> Self {
        Self { repository, rules }
    }

    async fn require_user(&self, user_id: i32) -> AppResult<()> {
        match self.repository.get_user(user_id).await? {
            Some(_) => Ok(()),
            None => Err(AppError::NotFound(format!("User {} not found", user_id))),
        }
    }

    async fn borrowing_count(&self, user_id: i32) -> AppResult<i64> {
        self.repository
            .count_transactions(Some(user_id), &[TransactionStatus::Borrowing])
            .await
    }

    fn loan_window(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + Duration::days(self.rules.loan_days)
    }

    /// Borrow one scanned copy: claim it if available, or complete the
    /// user's own reservation on it if it is pending.
    async fn borrow_copy(&self, user_id: i32, barcode: &str) -> AppResult<LoanTransaction> {
        let copy = self
            .repository
            .get_copy(barcode)
            .await?
            .ok_or_else(|| AppError::UnknownBarcode(barcode.to_string()))?;

        let now = Utc::now();
        let due_date = self.loan_window(now);
        let loan = match copy.status {
            CopyStatus::Available => {
                let draft = LoanDraft {
                    user_id,
                    status: TransactionStatus::Borrowing,
                    borrow_date: now,
                    due_date,
                    max_open_loans: Some(self.rules.max_open_loans),
                };
                self.repository
                    .claim_copy(&ClaimTarget::Barcode(barcode.to_string()), &draft)
                    .await?
            }
            CopyStatus::Pending => {
                self.repository
                    .fulfil_reservation(
                        user_id,
                        barcode,
                        now,
                        due_date,
                        Some(self.rules.max_open_loans),
                    )
                    .await?
            }
            CopyStatus::Borrowed => None,
        };

        match loan {
            Some(loan) => {
                tracing::info!(
                    transaction_id = loan.id,
                    user_id,
                    barcode,
                    picked_up = copy.status == CopyStatus::Pending,
                    "Copy borrowed"
                );
                Ok(loan)
            }
            None => Err(AppError::OutOfStock(format!(
                "Copy {} is not available",
                barcode
            ))),
        }
    }

    /// Staff borrow of one or more scanned barcodes.
    ///
    /// Each barcode is processed on its own. With a single barcode its error
    /// is returned directly; in a batch, rejected barcodes are reported and
    /// the rest carry on.
    pub async fn borrow(&self, user_id: i32, barcodes: &[String]) -> AppResult<BatchBorrow> {
        let barcodes: Vec<&str> = barcodes
            .iter()
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .collect();
        if barcodes.is_empty() {
            return Err(AppError::InvalidInput(
                "At least one barcode is required".to_string(),
            ));
        }
        self.require_user(user_id).await?;

        let limit = self.rules.max_open_loans;
        let mut open = self.borrowing_count(user_id).await?;
        if open >= limit {
            tracing::warn!(user_id, open, limit, "Borrow rejected, loan limit reached");
            return Err(AppError::LoanLimitExceeded { open, limit });
        }

        let single = barcodes.len() == 1;
        let mut items = Vec::with_capacity(barcodes.len());
        for barcode in barcodes {
            let outcome = if open >= limit {
                Err(AppError::LoanLimitExceeded { open, limit })
            } else {
                self.borrow_copy(user_id, barcode).await
            };
            match outcome {
                Ok(loan) => {
                    open += 1;
                    items.push(BorrowItemResult::admitted(&loan));
                }
                Err(e) if single || e.is_server_error() => return Err(e),
                Err(e) => {
                    tracing::warn!(user_id, barcode, error = %e, "Barcode skipped");
                    items.push(BorrowItemResult::rejected(barcode, &e));
                }
            }
        }

        let success_count = items.iter().filter(|i| i.ok).count();
        Ok(BatchBorrow {
            success_count,
            items,
        })
    }

    /// Self-service borrow of any available copy of a title
    pub async fn borrow_title(&self, user_id: i32, isbn: &str) -> AppResult<LoanTransaction> {
        let limit = self.rules.max_open_loans;
        let open = self.borrowing_count(user_id).await?;
        if open >= limit {
            tracing::warn!(user_id, open, limit, "Borrow rejected, loan limit reached");
            return Err(AppError::LoanLimitExceeded { open, limit });
        }

        if self.repository.get_title(isbn).await?.is_none() {
            return Err(AppError::NotFound(format!("Book {} not found", isbn)));
        }

        let now = Utc::now();
        let draft = LoanDraft {
            user_id,
            status: TransactionStatus::Borrowing,
            borrow_date: now,
            due_date: self.loan_window(now),
            max_open_loans: Some(limit),
        };
        let loan = self
            .repository
            .claim_copy(&ClaimTarget::Isbn(isbn.to_string()), &draft)
            .await?
            .ok_or_else(|| AppError::OutOfStock(format!("No copy of {} is available", isbn)))?;

        tracing::info!(
            transaction_id = loan.id,
            user_id,
            barcode = %loan.barcode,
            "Title borrowed"
        );
        Ok(loan)
    }

    /// Turn the user's cart into pending reservations.
    ///
    /// The loan limit is checked for the whole cart and again by each claim.
    /// Items without an available copy are skipped. Each reserved item leaves
    /// the cart at once, so a checkout that fails part way can be retried.
    /// The cart is cleared when at least one reservation succeeds and kept
    /// intact otherwise.
    pub async fn checkout_cart(&self, user_id: i32) -> AppResult<CheckoutSummary> {
        let cart = self.repository.get_cart(user_id).await?;
        if cart.is_empty() {
            return Err(AppError::InvalidInput("Cart is empty".to_string()));
        }

        let limit = self.rules.max_open_loans;
        let open = self
            .repository
            .count_transactions(Some(user_id), &TransactionStatus::OPEN)
            .await?;
        let requested = open + cart.len() as i64;
        if requested > limit {
            tracing::warn!(user_id, open, cart = cart.len(), limit, "Checkout rejected");
            return Err(AppError::LoanLimitExceeded {
                open: requested,
                limit,
            });
        }

        let now = Utc::now();
        let draft = LoanDraft {
            user_id,
            status: TransactionStatus::Pending,
            borrow_date: now,
            due_date: now + Duration::days(self.rules.reservation_days),
            max_open_loans: Some(limit),
        };

        let mut reservations = Vec::new();
        let mut skipped = Vec::new();
        for item in &cart {
            match self
                .repository
                .claim_copy(&ClaimTarget::Isbn(item.isbn.clone()), &draft)
                .await?
            {
                Some(loan) => {
                    tracing::info!(
                        transaction_id = loan.id,
                        user_id,
                        barcode = %loan.barcode,
                        "Copy reserved"
                    );
                    self.repository.remove_cart_item(user_id, &item.isbn).await?;
                    reservations.push(loan);
                }
                None => skipped.push(item.isbn.clone()),
            }
        }

        if reservations.is_empty() {
            return Err(AppError::OutOfStock(
                "No copy is available for any book in the cart".to_string(),
            ));
        }

        self.repository.clear_cart(user_id).await?;
        Ok(CheckoutSummary {
            success_count: reservations.len(),
            reservations,
            skipped,
        })
    }

    /// Close the borrowing transaction on a copy and settle any overdue fine
    pub async fn return_copy(&self, barcode: &str) -> AppResult<ReturnReceipt> {
        let barcode = barcode.trim();
        let policy = ReturnPolicy {
            now: Utc::now(),
            fine_per_day: self.rules.fine_per_day,
        };

        let Some(closed) = self.repository.close_loan(barcode, &policy).await? else {
            return Err(match self.repository.get_copy(barcode).await? {
                None => AppError::UnknownBarcode(barcode.to_string()),
                Some(_) => AppError::NotCurrentlyBorrowed(barcode.to_string()),
            });
        };

        tracing::info!(
            transaction_id = closed.loan.id,
            user_id = closed.loan.user_id,
            barcode,
            overdue_days = closed.settlement.overdue_days,
            fine = closed.settlement.fine_amount,
            "Copy returned"
        );

        Ok(ReturnReceipt {
            transaction_id: closed.loan.id,
            user_id: closed.loan.user_id,
            barcode: closed.loan.barcode,
            book_title: closed.loan.book_title,
            fine: closed.settlement.fine_amount,
            overdue_days: closed.settlement.overdue_days,
            fine_id: closed.fine.map(|f| f.id),
        })
    }

    /// Extend a borrowing loan once, for its owner or staff
    pub async fn renew(&self, transaction_id: i32, principal: Principal) -> AppResult<LoanTransaction> {
        for _ in 0..RENEW_ATTEMPTS {
            let loan = self
                .repository
                .get_transaction(transaction_id)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(format!("Transaction {} not found", transaction_id))
                })?;

            if loan.user_id != principal.user_id && !principal.is_staff() {
                return Err(AppError::Authorization(
                    "Only the borrower or staff can renew this loan".to_string(),
                ));
            }

            loan.check_renewable(Utc::now(), self.rules.max_renewals)?;

            let new_due = loan.renewed_due_date(self.rules.renewal_days);
            if let Some(renewed) = self
                .repository
                .extend_loan(loan.id, loan.renew_count, new_due)
                .await?
            {
                tracing::info!(
                    transaction_id,
                    user_id = renewed.user_id,
                    renew_count = renewed.renew_count,
                    due_date = %renewed.due_date,
                    "Loan renewed"
                );
                return Ok(renewed);
            }
        }

        Err(AppError::InvalidState(format!(
            "Transaction {} changed while renewing, try again",
            transaction_id
        )))
    }

    /// Open borrowing loans of a reader, as seen by staff
    pub async fn user_loans(&self, user_id: i32) -> AppResult<Vec<LoanView>> {
        self.require_user(user_id).await?;
        self.loan_views(user_id, vec![TransactionStatus::Borrowing])
            .await
    }

    /// Reservations and loans of the calling reader
    pub async fn my_loans(&self, user_id: i32) -> AppResult<Vec<LoanView>> {
        self.loan_views(user_id, TransactionStatus::OPEN.to_vec())
            .await
    }

    async fn loan_views(
        &self,
        user_id: i32,
        statuses: Vec<TransactionStatus>,
    ) -> AppResult<Vec<LoanView>> {
        let filter = LoanFilter {
            user_id: Some(user_id),
            statuses,
            limit: None,
        };
        let now = Utc::now();
        Ok(self
            .repository
            .list_transactions(&filter)
            .await?
            .into_iter()
            .map(|loan| LoanView::from_transaction(loan, now))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use crate::{
        config::AppConfig,
        models::{enums::Role, title::NewTitle, user::NewUser},
        repository::{LibraryStore, MemoryStore, Repository},
        services::Services,
    };

    use super::*;

    async fn shelve(services: &Services, isbn: &str) {
        let request: NewTitle = serde_json::from_value(json!({
            "isbn": isbn,
            "title": format!("Book {}", isbn),
            "qty": 2,
        }))
        .unwrap();
        services.inventory.register_title(request).await.unwrap();
    }

    #[tokio::test]
    async fn failed_checkout_keeps_only_unreserved_items_in_the_cart() {
        let store = Arc::new(MemoryStore::new());
        let repository: Repository = store.clone();
        let services = Services::new(repository, &AppConfig::default());
        let reader = store
            .create_user(&NewUser {
                username: "C001".to_string(),
                student_id: Some("C001".to_string()),
                fullname: "Cart Reader".to_string(),
                email: None,
                phone: None,
                role: Role::User,
                password_hash: "unused".to_string(),
            })
            .await
            .unwrap();
        shelve(&services, "978-7-1").await;
        shelve(&services, "978-7-2").await;
        services.cart.add(reader.id, "978-7-1").await.unwrap();
        services.cart.add(reader.id, "978-7-2").await.unwrap();
        store.forget_title("978-7-2");

        let first = services.circulation.checkout_cart(reader.id).await;
        assert!(matches!(first, Err(AppError::Internal(_))));
        let cart = services.cart.list(reader.id).await.unwrap();
        assert_eq!(cart.len(), 1);
        assert_eq!(cart[0].isbn, "978-7-2");

        let retry = services.circulation.checkout_cart(reader.id).await;
        assert!(matches!(retry, Err(AppError::Internal(_))));
        let open = store
            .count_transactions(Some(reader.id), &TransactionStatus::OPEN)
            .await
            .unwrap();
        assert_eq!(open, 1);
        assert_eq!(store.get_title("978-7-1").await.unwrap().unwrap().qty_avail, 1);
    }
}
