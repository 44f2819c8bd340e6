//! In-process store used by tests and `database.backend = "memory"`
//!
//! All state sits behind one mutex that is never held across an await, so
//! each trait method is trivially atomic.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;

use super::{
    check_copy_move, check_quota, check_transaction_move, ClosedLoan, CopyCounts, CopyRemoval,
    LibraryStore, TitleRemoval,
};
use crate::{
    error::{AppError, AppResult},
    models::{
        cart::{CartAdd, CartItem},
        copy::{last_sequence, numbered_copies, Copy},
        enums::{CopyStatus, FineStatus, Role, TransactionStatus},
        fine::{ledger_order, Fine, FineDetails, FinePayment, NewFine},
        loan::{ClaimTarget, LoanDraft, LoanFilter, LoanTransaction, ReturnPolicy},
        title::{matches_query, Title},
        user::{NewUser, ReaderSummary, User},
    },
};

#[derive(Default)]
struct MemoryState {
    titles: IndexMap<String, Title>,
    /// Keyed by barcode, in creation order
    copies: IndexMap<String, Copy>,
    /// `transactions[i].id == i + 1`
    transactions: Vec<LoanTransaction>,
    carts: HashMap<i32, Vec<CartItem>>,
    /// `fines[i].id == i + 1`
    fines: Vec<Fine>,
    /// `users[i].id == i + 1`
    users: Vec<User>,
}

/// Position of a 1-based id in its vector
fn slot(id: i32) -> Option<usize> {
    usize::try_from(id).ok()?.checked_sub(1)
}

impl MemoryState {
    fn title_mut(&mut self, isbn: &str) -> AppResult<&mut Title> {
        self.titles
            .get_mut(isbn)
            .ok_or_else(|| AppError::Internal(format!("Copy references missing title {}", isbn)))
    }

    fn transaction(&self, id: i32) -> Option<&LoanTransaction> {
        self.transactions.get(slot(id)?)
    }

    fn transaction_mut(&mut self, id: i32) -> Option<&mut LoanTransaction> {
        let idx = slot(id)?;
        self.transactions.get_mut(idx)
    }

    fn fine_mut(&mut self, id: i32) -> Option<&mut Fine> {
        let idx = slot(id)?;
        self.fines.get_mut(idx)
    }

    fn user(&self, id: i32) -> Option<&User> {
        self.users.get(slot(id)?)
    }

    fn user_mut(&mut self, id: i32) -> Option<&mut User> {
        let idx = slot(id)?;
        self.users.get_mut(idx)
    }

    fn count_loans(&self, user_id: i32, statuses: &[TransactionStatus]) -> i64 {
        self.transactions
            .iter()
            .filter(|t| t.user_id == user_id && statuses.contains(&t.status))
            .count() as i64
    }

    fn push_fine(&mut self, fine: &NewFine) -> Fine {
        let record = Fine {
            id: self.fines.len() as i32 + 1,
            user_id: fine.user_id,
            transaction_id: fine.transaction_id,
            amount: fine.amount,
            reason: fine.reason,
            description: fine.description.clone(),
            status: FineStatus::Unpaid,
            created_at: fine.created_at,
            payment_date: None,
        };
        self.fines.push(record.clone());
        record
    }

    fn reader_summary(&self, user: &User) -> ReaderSummary {
        let borrow_count = self
            .transactions
            .iter()
            .filter(|t| t.user_id == user.id && t.status == TransactionStatus::Borrowing)
            .count() as i64;
        let total_fine = self
            .fines
            .iter()
            .filter(|f| f.user_id == user.id && f.status == FineStatus::Unpaid)
            .map(|f| f.amount)
            .sum();
        ReaderSummary {
            user: user.clone(),
            borrow_count,
            total_fine,
        }
    }
}

/// Store keeping everything in process memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LibraryStore for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn close(&self) {}

    async fn create_title(&self, title: &Title, copies: &[Copy]) -> AppResult<()> {
        let mut state = self.state.lock();
        if state.titles.contains_key(&title.isbn) {
            return Err(AppError::DuplicateKey(format!(
                "ISBN {} already exists",
                title.isbn
            )));
        }
        if let Some(taken) = copies.iter().find(|c| state.copies.contains_key(&c.barcode)) {
            return Err(AppError::DuplicateKey(format!(
                "Barcode {} already exists",
                taken.barcode
            )));
        }
        state.titles.insert(title.isbn.clone(), title.clone());
        for copy in copies {
            state.copies.insert(copy.barcode.clone(), copy.clone());
        }
        Ok(())
    }

    async fn get_title(&self, isbn: &str) -> AppResult<Option<Title>> {
        Ok(self.state.lock().titles.get(isbn).cloned())
    }

    async fn search_titles(&self, query: &str) -> AppResult<Vec<Title>> {
        let state = self.state.lock();
        Ok(state
            .titles
            .values()
            .filter(|t| {
                matches_query(
                    query,
                    &[Some(t.title.as_str()), t.author.as_deref(), Some(t.isbn.as_str())],
                )
            })
            .cloned()
            .collect())
    }

    async fn delete_title(&self, isbn: &str) -> AppResult<TitleRemoval> {
        let mut state = self.state.lock();
        if !state.titles.contains_key(isbn) {
            return Ok(TitleRemoval::NotFound);
        }
        let in_use = state
            .copies
            .values()
            .any(|c| c.isbn_ref == isbn && c.status.is_in_use());
        if in_use {
            return Ok(TitleRemoval::InUse);
        }
        let before = state.copies.len();
        state.copies.retain(|_, c| c.isbn_ref != isbn);
        let removed = (before - state.copies.len()) as u64;
        state.titles.shift_remove(isbn);
        Ok(TitleRemoval::Removed { copies: removed })
    }

    async fn get_copy(&self, barcode: &str) -> AppResult<Option<Copy>> {
        Ok(self.state.lock().copies.get(barcode).cloned())
    }

    async fn list_copies(&self, isbn: &str) -> AppResult<Vec<Copy>> {
        let state = self.state.lock();
        Ok(state
            .copies
            .values()
            .filter(|c| c.isbn_ref == isbn)
            .cloned()
            .collect())
    }

    async fn add_copies(
        &self,
        isbn: &str,
        qty: i32,
        location: Option<&str>,
    ) -> AppResult<Option<Vec<Copy>>> {
        let mut state = self.state.lock();
        if !state.titles.contains_key(isbn) {
            return Ok(None);
        }
        let last = last_sequence(
            isbn,
            state
                .copies
                .values()
                .filter(|c| c.isbn_ref == isbn)
                .map(|c| c.barcode.as_str()),
        );
        let copies = numbered_copies(isbn, last, qty, location);
        if let Some(taken) = copies.iter().find(|c| state.copies.contains_key(&c.barcode)) {
            return Err(AppError::DuplicateKey(format!(
                "Barcode {} already exists",
                taken.barcode
            )));
        }
        for copy in &copies {
            state.copies.insert(copy.barcode.clone(), copy.clone());
        }
        let title = state.title_mut(isbn)?;
        title.qty_total += qty;
        title.qty_avail += qty;
        Ok(Some(copies))
    }

    async fn remove_copy(&self, barcode: &str) -> AppResult<CopyRemoval> {
        let mut state = self.state.lock();
        let status = match state.copies.get(barcode) {
            None => return Ok(CopyRemoval::NotFound),
            Some(copy) => copy.status,
        };
        if status.is_in_use() {
            return Ok(CopyRemoval::InUse(status));
        }
        let Some(copy) = state.copies.shift_remove(barcode) else {
            return Ok(CopyRemoval::NotFound);
        };
        let title = state.title_mut(&copy.isbn_ref)?;
        title.qty_total -= 1;
        title.qty_avail -= 1;
        Ok(CopyRemoval::Removed(copy))
    }

    async fn claim_copy(
        &self,
        target: &ClaimTarget,
        draft: &LoanDraft,
    ) -> AppResult<Option<LoanTransaction>> {
        let hold = draft.status.copy_hold().ok_or_else(|| {
            AppError::Internal(format!("Cannot open a transaction as {}", draft.status))
        })?;

        let mut state = self.state.lock();
        check_quota(
            state.count_loans(draft.user_id, draft.counted_statuses()),
            draft.max_open_loans,
        )?;

        let claimed = match target {
            ClaimTarget::Barcode(barcode) => state
                .copies
                .get(barcode)
                .filter(|c| c.status == CopyStatus::Available),
            ClaimTarget::Isbn(isbn) => state
                .copies
                .values()
                .find(|c| &c.isbn_ref == isbn && c.status == CopyStatus::Available),
        };
        let Some(copy) = claimed else {
            return Ok(None);
        };
        check_copy_move(&copy.barcode, copy.status, hold)?;
        let barcode = copy.barcode.clone();
        let isbn = copy.isbn_ref.clone();

        let title = state.title_mut(&isbn)?;
        title.qty_avail -= 1;
        let book_title = title.title.clone();
        if let Some(copy) = state.copies.get_mut(&barcode) {
            copy.status = hold;
        }

        let loan = LoanTransaction {
            id: state.transactions.len() as i32 + 1,
            user_id: draft.user_id,
            barcode,
            isbn,
            book_title,
            status: draft.status,
            borrow_date: draft.borrow_date,
            due_date: draft.due_date,
            renew_count: 0,
            return_date: None,
            overdue_days: None,
            fine_amount: None,
        };
        state.transactions.push(loan.clone());
        Ok(Some(loan))
    }

    async fn fulfil_reservation(
        &self,
        user_id: i32,
        barcode: &str,
        borrow_date: DateTime<Utc>,
        due_date: DateTime<Utc>,
        max_borrowing: Option<i64>,
    ) -> AppResult<Option<LoanTransaction>> {
        let mut state = self.state.lock();
        let Some(copy_status) = state
            .copies
            .get(barcode)
            .map(|c| c.status)
            .filter(|status| *status == CopyStatus::Pending)
        else {
            return Ok(None);
        };
        let Some(idx) = state.transactions.iter().position(|t| {
            t.user_id == user_id && t.barcode == barcode && t.status == TransactionStatus::Pending
        }) else {
            return Ok(None);
        };

        check_quota(
            state.count_loans(user_id, &[TransactionStatus::Borrowing]),
            max_borrowing,
        )?;
        let loan = &state.transactions[idx];
        check_transaction_move(loan.id, loan.status, TransactionStatus::Borrowing)?;
        check_copy_move(barcode, copy_status, CopyStatus::Borrowed)?;

        let loan = &mut state.transactions[idx];
        loan.status = TransactionStatus::Borrowing;
        loan.borrow_date = borrow_date;
        loan.due_date = due_date;
        let loan = loan.clone();
        if let Some(copy) = state.copies.get_mut(barcode) {
            copy.status = CopyStatus::Borrowed;
        }
        Ok(Some(loan))
    }

    async fn close_loan(
        &self,
        barcode: &str,
        policy: &ReturnPolicy,
    ) -> AppResult<Option<ClosedLoan>> {
        let mut state = self.state.lock();
        let Some(idx) = state
            .transactions
            .iter()
            .position(|t| t.barcode == barcode && t.status == TransactionStatus::Borrowing)
        else {
            return Ok(None);
        };

        // Everything is checked before anything changes
        let (copy_status, isbn) = state
            .copies
            .get(barcode)
            .map(|c| (c.status, c.isbn_ref.clone()))
            .ok_or_else(|| {
                AppError::Internal(format!("Borrowed copy {} is missing from the store", barcode))
            })?;
        check_copy_move(barcode, copy_status, CopyStatus::Available)?;
        let open = &state.transactions[idx];
        check_transaction_move(open.id, open.status, TransactionStatus::Returned)?;
        state.title_mut(&isbn)?;

        let loan = &mut state.transactions[idx];
        let settlement = policy.settle(loan);
        loan.status = TransactionStatus::Returned;
        loan.return_date = Some(policy.now);
        loan.overdue_days = Some(settlement.overdue_days);
        loan.fine_amount = Some(settlement.fine_amount);
        let loan = loan.clone();

        if let Some(copy) = state.copies.get_mut(barcode) {
            copy.status = CopyStatus::Available;
        }
        state.title_mut(&isbn)?.qty_avail += 1;

        let fine = (settlement.fine_amount > 0).then(|| {
            state.push_fine(&NewFine::overdue(
                loan.user_id,
                loan.id,
                &loan.book_title,
                settlement,
                policy.now,
            ))
        });

        Ok(Some(ClosedLoan {
            loan,
            settlement,
            fine,
        }))
    }

    async fn extend_loan(
        &self,
        id: i32,
        expected_renew_count: i32,
        new_due_date: DateTime<Utc>,
    ) -> AppResult<Option<LoanTransaction>> {
        let mut state = self.state.lock();
        let Some(loan) = state.transaction_mut(id) else {
            return Ok(None);
        };
        if loan.status != TransactionStatus::Borrowing || loan.renew_count != expected_renew_count
        {
            return Ok(None);
        }
        loan.due_date = new_due_date;
        loan.renew_count += 1;
        Ok(Some(loan.clone()))
    }

    async fn get_transaction(&self, id: i32) -> AppResult<Option<LoanTransaction>> {
        Ok(self.state.lock().transaction(id).cloned())
    }

    async fn count_transactions(
        &self,
        user_id: Option<i32>,
        statuses: &[TransactionStatus],
    ) -> AppResult<i64> {
        let state = self.state.lock();
        Ok(state
            .transactions
            .iter()
            .filter(|t| user_id.map_or(true, |uid| t.user_id == uid))
            .filter(|t| statuses.contains(&t.status))
            .count() as i64)
    }

    async fn list_transactions(&self, filter: &LoanFilter) -> AppResult<Vec<LoanTransaction>> {
        let state = self.state.lock();
        let mut loans: Vec<LoanTransaction> = state
            .transactions
            .iter()
            .filter(|t| filter.user_id.map_or(true, |uid| t.user_id == uid))
            .filter(|t| filter.statuses.is_empty() || filter.statuses.contains(&t.status))
            .cloned()
            .collect();
        loans.sort_by(|a, b| b.borrow_date.cmp(&a.borrow_date).then(b.id.cmp(&a.id)));
        if let Some(limit) = filter.limit {
            loans.truncate(limit.max(0) as usize);
        }
        Ok(loans)
    }

    async fn count_overdue(&self, now: DateTime<Utc>) -> AppResult<i64> {
        let state = self.state.lock();
        Ok(state
            .transactions
            .iter()
            .filter(|t| t.status == TransactionStatus::Borrowing && t.due_date < now)
            .count() as i64)
    }

    async fn get_cart(&self, user_id: i32) -> AppResult<Vec<CartItem>> {
        Ok(self
            .state
            .lock()
            .carts
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn add_cart_item(
        &self,
        user_id: i32,
        item: &CartItem,
        capacity: usize,
    ) -> AppResult<CartAdd> {
        let mut state = self.state.lock();
        let cart = state.carts.entry(user_id).or_default();
        if cart.iter().any(|i| i.isbn == item.isbn) {
            return Ok(CartAdd::AlreadyPresent);
        }
        if cart.len() >= capacity {
            return Ok(CartAdd::Full);
        }
        cart.push(item.clone());
        Ok(CartAdd::Added)
    }

    async fn remove_cart_item(&self, user_id: i32, isbn: &str) -> AppResult<bool> {
        let mut state = self.state.lock();
        let Some(cart) = state.carts.get_mut(&user_id) else {
            return Ok(false);
        };
        let before = cart.len();
        cart.retain(|i| i.isbn != isbn);
        Ok(cart.len() != before)
    }

    async fn clear_cart(&self, user_id: i32) -> AppResult<()> {
        self.state.lock().carts.remove(&user_id);
        Ok(())
    }

    async fn insert_fine(&self, fine: &NewFine) -> AppResult<Fine> {
        Ok(self.state.lock().push_fine(fine))
    }

    async fn pay_fine(&self, id: i32, now: DateTime<Utc>) -> AppResult<Option<FinePayment>> {
        let mut state = self.state.lock();
        let Some(fine) = state.fine_mut(id) else {
            return Ok(None);
        };
        if fine.status == FineStatus::Paid {
            return Ok(Some(FinePayment::AlreadyPaid(fine.clone())));
        }
        fine.status = FineStatus::Paid;
        fine.payment_date = Some(now);
        Ok(Some(FinePayment::Paid(fine.clone())))
    }

    async fn list_fines(&self) -> AppResult<Vec<FineDetails>> {
        let state = self.state.lock();
        let mut fines = state.fines.clone();
        fines.sort_by(ledger_order);
        Ok(fines
            .into_iter()
            .map(|fine| {
                let user = state.user(fine.user_id);
                FineDetails {
                    user_name: user.map(|u| u.fullname.clone()).unwrap_or_default(),
                    student_id: user.and_then(|u| u.student_id.clone()),
                    fine,
                }
            })
            .collect())
    }

    async fn fine_revenue(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppResult<i64> {
        let state = self.state.lock();
        Ok(state
            .fines
            .iter()
            .filter(|f| f.status == FineStatus::Paid)
            .filter(|f| match f.payment_date {
                Some(paid) => from.map_or(true, |s| paid >= s) && to.map_or(true, |e| paid < e),
                None => from.is_none() && to.is_none(),
            })
            .map(|f| f.amount)
            .sum())
    }

    async fn get_user(&self, id: i32) -> AppResult<Option<User>> {
        Ok(self.state.lock().user(id).cloned())
    }

    async fn find_user_by_login(&self, login: &str) -> AppResult<Option<User>> {
        let state = self.state.lock();
        Ok(state
            .users
            .iter()
            .find(|u| u.username == login || u.student_id.as_deref() == Some(login))
            .cloned())
    }

    async fn create_user(&self, user: &NewUser) -> AppResult<User> {
        let mut state = self.state.lock();
        let taken = state.users.iter().any(|u| {
            u.username == user.username
                || (user.student_id.is_some() && u.student_id == user.student_id)
                || (user.email.is_some() && u.email == user.email)
        });
        if taken {
            return Err(AppError::DuplicateKey(
                "Username, student id or email already exists".to_string(),
            ));
        }
        let record = User {
            id: state.users.len() as i32 + 1,
            username: user.username.clone(),
            student_id: user.student_id.clone(),
            fullname: user.fullname.clone(),
            email: user.email.clone(),
            phone: user.phone.clone(),
            role: user.role,
            password_hash: user.password_hash.clone(),
            failed_attempts: 0,
            lock_until: None,
            created_at: Utc::now(),
        };
        state.users.push(record.clone());
        Ok(record)
    }

    async fn record_failed_login(
        &self,
        id: i32,
        attempts: i32,
        lock_until: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        let mut state = self.state.lock();
        if let Some(user) = state.user_mut(id) {
            user.failed_attempts = attempts;
            if lock_until.is_some() {
                user.lock_until = lock_until;
            }
        }
        Ok(())
    }

    async fn reset_failed_logins(&self, id: i32) -> AppResult<()> {
        let mut state = self.state.lock();
        if let Some(user) = state.user_mut(id) {
            user.failed_attempts = 0;
            user.lock_until = None;
        }
        Ok(())
    }

    async fn set_password(&self, id: i32, password_hash: &str) -> AppResult<()> {
        let mut state = self.state.lock();
        match state.user_mut(id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                Ok(())
            }
            None => Err(AppError::NotFound(format!("User {} not found", id))),
        }
    }

    async fn list_readers(
        &self,
        query: Option<&str>,
        limit: Option<i64>,
    ) -> AppResult<Vec<ReaderSummary>> {
        let state = self.state.lock();
        let mut readers: Vec<ReaderSummary> = state
            .users
            .iter()
            .filter(|u| u.role == Role::User)
            .filter(|u| {
                query.map_or(true, |q| {
                    matches_query(q, &[Some(u.fullname.as_str()), u.student_id.as_deref()])
                })
            })
            .map(|u| state.reader_summary(u))
            .collect();
        if let Some(limit) = limit {
            readers.truncate(limit.max(0) as usize);
        }
        Ok(readers)
    }

    async fn count_titles(&self) -> AppResult<i64> {
        Ok(self.state.lock().titles.len() as i64)
    }

    async fn copy_counts(&self) -> AppResult<CopyCounts> {
        let state = self.state.lock();
        let available = state
            .copies
            .values()
            .filter(|c| c.status == CopyStatus::Available)
            .count() as i64;
        Ok(CopyCounts {
            available,
            in_use: state.copies.len() as i64 - available,
        })
    }
}

#[cfg(test)]
impl MemoryStore {
    /// Drop a title row while leaving its copies behind
    pub(crate) fn forget_title(&self, isbn: &str) {
        self.state.lock().titles.shift_remove(isbn);
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use serde_json::json;

    use super::*;
    use crate::models::{copy::numbered_copies, title::NewTitle};

    const ISBN: &str = "978-0-00";
    const BARCODE: &str = "978-0-00-1";

    async fn store_with_loan() -> (MemoryStore, LoanTransaction) {
        let store = MemoryStore::new();
        let request: NewTitle = serde_json::from_value(json!({
            "isbn": ISBN,
            "title": "Stored Book",
            "qty": 1,
        }))
        .unwrap();
        let now = Utc::now();
        store
            .create_title(&request.into_title(now), &numbered_copies(ISBN, 0, 1, None))
            .await
            .unwrap();
        let loan = store
            .claim_copy(&ClaimTarget::Barcode(BARCODE.to_string()), &draft(now))
            .await
            .unwrap()
            .unwrap();
        (store, loan)
    }

    fn draft(now: DateTime<Utc>) -> LoanDraft {
        LoanDraft {
            user_id: 1,
            status: TransactionStatus::Borrowing,
            borrow_date: now,
            due_date: now + Duration::days(14),
            max_open_loans: None,
        }
    }

    fn policy() -> ReturnPolicy {
        ReturnPolicy {
            now: Utc::now(),
            fine_per_day: 5000,
        }
    }

    fn qty_avail(store: &MemoryStore) -> i32 {
        store.state.lock().titles[ISBN].qty_avail
    }

    #[tokio::test]
    async fn close_loan_without_its_copy_changes_nothing() {
        let (store, loan) = store_with_loan().await;
        store.state.lock().copies.shift_remove(BARCODE);

        let result = store.close_loan(BARCODE, &policy()).await;

        assert!(matches!(result, Err(AppError::Internal(_))));
        let kept = store.get_transaction(loan.id).await.unwrap().unwrap();
        assert_eq!(kept.status, TransactionStatus::Borrowing);
        assert!(kept.return_date.is_none());
        assert_eq!(qty_avail(&store), 0);
    }

    #[tokio::test]
    async fn close_loan_refuses_a_copy_that_is_not_borrowed() {
        let (store, loan) = store_with_loan().await;
        if let Some(copy) = store.state.lock().copies.get_mut(BARCODE) {
            copy.status = CopyStatus::Pending;
        }

        let result = store.close_loan(BARCODE, &policy()).await;

        assert!(matches!(result, Err(AppError::Internal(_))));
        let kept = store.get_transaction(loan.id).await.unwrap().unwrap();
        assert_eq!(kept.status, TransactionStatus::Borrowing);
        assert_eq!(store.get_copy(BARCODE).await.unwrap().unwrap().status, CopyStatus::Pending);
        assert_eq!(qty_avail(&store), 0);
        assert!(store.list_fines().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn close_loan_without_its_title_changes_nothing() {
        let (store, loan) = store_with_loan().await;
        store.forget_title(ISBN);

        let result = store.close_loan(BARCODE, &policy()).await;

        assert!(matches!(result, Err(AppError::Internal(_))));
        let kept = store.get_transaction(loan.id).await.unwrap().unwrap();
        assert_eq!(kept.status, TransactionStatus::Borrowing);
        assert_eq!(store.get_copy(BARCODE).await.unwrap().unwrap().status, CopyStatus::Borrowed);
    }

    #[tokio::test]
    async fn claim_without_its_title_leaves_the_copy_available() {
        let (store, _) = store_with_loan().await;
        store.close_loan(BARCODE, &policy()).await.unwrap().unwrap();
        store.forget_title(ISBN);

        let result = store
            .claim_copy(&ClaimTarget::Barcode(BARCODE.to_string()), &draft(Utc::now()))
            .await;

        assert!(matches!(result, Err(AppError::Internal(_))));
        assert_eq!(store.get_copy(BARCODE).await.unwrap().unwrap().status, CopyStatus::Available);
        assert_eq!(store.state.lock().transactions.len(), 1);
    }

    #[tokio::test]
    async fn pickup_refuses_a_copy_that_is_not_pending() {
        let (store, loan) = store_with_loan().await;
        store.state.lock().transactions[0].status = TransactionStatus::Pending;
        let now = Utc::now();

        // The copy is still borrowed, so the reservation cannot be picked up
        let picked = store
            .fulfil_reservation(1, BARCODE, now, now + Duration::days(14), None)
            .await
            .unwrap();

        assert!(picked.is_none());
        let kept = store.get_transaction(loan.id).await.unwrap().unwrap();
        assert_eq!(kept.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn claim_refuses_a_reader_at_the_loan_cap() {
        let (store, _) = store_with_loan().await;
        store
            .add_copies(ISBN, 1, None)
            .await
            .unwrap();
        let capped = LoanDraft {
            max_open_loans: Some(1),
            ..draft(Utc::now())
        };

        let result = store.claim_copy(&ClaimTarget::Isbn(ISBN.to_string()), &capped).await;

        assert!(matches!(
            result,
            Err(AppError::LoanLimitExceeded { open: 1, limit: 1 })
        ));
        assert_eq!(qty_avail(&store), 1);
    }
}
