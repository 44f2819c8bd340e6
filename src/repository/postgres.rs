//! PostgreSQL store
//!
//! Each circulation unit runs in its own transaction. Copies are claimed with
//! a conditional `UPDATE ... WHERE status = 'available'`, so two concurrent
//! claims on the same row cannot both succeed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, Executor, PgConnection, Pool, Postgres};

use super::{
    check_copy_move, check_quota, check_transaction_move, ClosedLoan, CopyCounts, CopyRemoval,
    LibraryStore, TitleRemoval,
};
use crate::{
    config::DatabaseConfig,
    error::{AppError, AppResult},
    models::{
        cart::{CartAdd, CartItem},
        copy::{last_sequence, numbered_copies, Copy},
        enums::{CopyStatus, TransactionStatus},
        fine::{Fine, FineDetails, FinePayment, NewFine},
        loan::{ClaimTarget, LoanDraft, LoanFilter, LoanTransaction, ReturnPolicy},
        title::Title,
        user::{NewUser, ReaderSummary, User},
    },
};

const COPY_COLUMNS: &str = "barcode, isbn_ref, status, location";

/// Map a unique-constraint violation to `DuplicateKey`, anything else to `Database`
fn unique_violation(err: sqlx::Error, message: impl Into<String>) -> AppError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::DuplicateKey(message.into())
        }
        _ => AppError::Database(err),
    }
}

fn status_texts(statuses: &[TransactionStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// Lock the user row, then count their transactions in `statuses`.
/// Concurrent claims for the same user queue on the row lock.
async fn lock_and_count_loans(
    conn: &mut PgConnection,
    user_id: i32,
    statuses: &[TransactionStatus],
) -> AppResult<i64> {
    sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
        .bind(user_id)
        .execute(&mut *conn)
        .await?;
    let open: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM loan_transactions WHERE user_id = $1 AND status = ANY($2)",
    )
    .bind(user_id)
    .bind(status_texts(statuses))
    .fetch_one(&mut *conn)
    .await?;
    Ok(open)
}

async fn insert_copy<'e, E>(executor: E, copy: &Copy) -> AppResult<()>
where
    E: Executor<'e, Database = Postgres>,
{
    sqlx::query("INSERT INTO copies (barcode, isbn_ref, status, location) VALUES ($1, $2, $3, $4)")
        .bind(&copy.barcode)
        .bind(&copy.isbn_ref)
        .bind(copy.status)
        .bind(&copy.location)
        .execute(executor)
        .await
        .map_err(|e| unique_violation(e, format!("Barcode {} already exists", copy.barcode)))?;
    Ok(())
}

async fn insert_fine<'e, E>(executor: E, fine: &NewFine) -> AppResult<Fine>
where
    E: Executor<'e, Database = Postgres>,
{
    let fine = sqlx::query_as::<_, Fine>(
        r#"
        INSERT INTO fines (user_id, transaction_id, amount, reason, description, status, created_at)
        VALUES ($1, $2, $3, $4, $5, 'unpaid', $6)
        RETURNING *
        "#,
    )
    .bind(fine.user_id)
    .bind(fine.transaction_id)
    .bind(fine.amount)
    .bind(fine.reason)
    .bind(&fine.description)
    .bind(fine.created_at)
    .fetch_one(executor)
    .await?;
    Ok(fine)
}

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Open the pool and bring the schema up to date
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect(&config.url)
            .await?;
        tracing::info!("Connected to database");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to run database migrations: {}", e)))?;
        tracing::info!("Database migrations completed");

        Ok(Self::new(pool))
    }
}

#[async_trait]
impl LibraryStore for PgStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    async fn create_title(&self, title: &Title, copies: &[Copy]) -> AppResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO titles (isbn, title, author, category, publisher, year, price,
                                language, location, image_url, qty_total, qty_avail, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(&title.isbn)
        .bind(&title.title)
        .bind(&title.author)
        .bind(&title.category)
        .bind(&title.publisher)
        .bind(&title.year)
        .bind(title.price)
        .bind(&title.language)
        .bind(&title.location)
        .bind(&title.image_url)
        .bind(title.qty_total)
        .bind(title.qty_avail)
        .bind(title.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_violation(e, format!("ISBN {} already exists", title.isbn)))?;

        for copy in copies {
            insert_copy(&mut *tx, copy).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_title(&self, isbn: &str) -> AppResult<Option<Title>> {
        let title = sqlx::query_as::<_, Title>("SELECT * FROM titles WHERE isbn = $1")
            .bind(isbn)
            .fetch_optional(&self.pool)
            .await?;
        Ok(title)
    }

    async fn search_titles(&self, query: &str) -> AppResult<Vec<Title>> {
        let titles = sqlx::query_as::<_, Title>(
            r#"
            SELECT * FROM titles
            WHERE $1 = ''
               OR POSITION(LOWER($1) IN LOWER(title)) > 0
               OR POSITION(LOWER($1) IN LOWER(COALESCE(author, ''))) > 0
               OR POSITION(LOWER($1) IN LOWER(isbn)) > 0
            ORDER BY created_at, isbn
            "#,
        )
        .bind(query)
        .fetch_all(&self.pool)
        .await?;
        Ok(titles)
    }

    async fn delete_title(&self, isbn: &str) -> AppResult<TitleRemoval> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<String> =
            sqlx::query_scalar("SELECT isbn FROM titles WHERE isbn = $1 FOR UPDATE")
                .bind(isbn)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Ok(TitleRemoval::NotFound);
        }

        let statuses: Vec<CopyStatus> =
            sqlx::query_scalar("SELECT status FROM copies WHERE isbn_ref = $1 FOR UPDATE")
                .bind(isbn)
                .fetch_all(&mut *tx)
                .await?;
        if statuses.iter().any(|s| s.is_in_use()) {
            return Ok(TitleRemoval::InUse);
        }

        let copies = sqlx::query("DELETE FROM copies WHERE isbn_ref = $1")
            .bind(isbn)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM titles WHERE isbn = $1")
            .bind(isbn)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(TitleRemoval::Removed { copies })
    }

    async fn get_copy(&self, barcode: &str) -> AppResult<Option<Copy>> {
        let copy = sqlx::query_as::<_, Copy>(&format!(
            "SELECT {} FROM copies WHERE barcode = $1",
            COPY_COLUMNS
        ))
        .bind(barcode)
        .fetch_optional(&self.pool)
        .await?;
        Ok(copy)
    }

    async fn list_copies(&self, isbn: &str) -> AppResult<Vec<Copy>> {
        let copies = sqlx::query_as::<_, Copy>(&format!(
            "SELECT {} FROM copies WHERE isbn_ref = $1 ORDER BY id",
            COPY_COLUMNS
        ))
        .bind(isbn)
        .fetch_all(&self.pool)
        .await?;
        Ok(copies)
    }

    async fn add_copies(
        &self,
        isbn: &str,
        qty: i32,
        location: Option<&str>,
    ) -> AppResult<Option<Vec<Copy>>> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<String> =
            sqlx::query_scalar("SELECT isbn FROM titles WHERE isbn = $1 FOR UPDATE")
                .bind(isbn)
                .fetch_optional(&mut *tx)
                .await?;
        if exists.is_none() {
            return Ok(None);
        }

        let barcodes: Vec<String> =
            sqlx::query_scalar("SELECT barcode FROM copies WHERE isbn_ref = $1")
                .bind(isbn)
                .fetch_all(&mut *tx)
                .await?;
        let last = last_sequence(isbn, barcodes.iter().map(String::as_str));
        let copies = numbered_copies(isbn, last, qty, location);
        for copy in &copies {
            insert_copy(&mut *tx, copy).await?;
        }

        sqlx::query(
            "UPDATE titles SET qty_total = qty_total + $2, qty_avail = qty_avail + $2 WHERE isbn = $1",
        )
        .bind(isbn)
        .bind(qty)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(copies))
    }

    async fn remove_copy(&self, barcode: &str) -> AppResult<CopyRemoval> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query_as::<_, Copy>(&format!(
            "DELETE FROM copies WHERE barcode = $1 AND status = 'available' RETURNING {}",
            COPY_COLUMNS
        ))
        .bind(barcode)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(copy) = removed else {
            let status: Option<CopyStatus> =
                sqlx::query_scalar("SELECT status FROM copies WHERE barcode = $1")
                    .bind(barcode)
                    .fetch_optional(&mut *tx)
                    .await?;
            return Ok(match status {
                Some(status) => CopyRemoval::InUse(status),
                None => CopyRemoval::NotFound,
            });
        };

        sqlx::query(
            "UPDATE titles SET qty_total = qty_total - 1, qty_avail = qty_avail - 1 WHERE isbn = $1",
        )
        .bind(&copy.isbn_ref)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
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

        let mut tx = self.pool.begin().await?;
        if draft.max_open_loans.is_some() {
            let open =
                lock_and_count_loans(&mut *tx, draft.user_id, draft.counted_statuses()).await?;
            check_quota(open, draft.max_open_loans)?;
        }

        let claimed = match target {
            ClaimTarget::Barcode(barcode) => {
                sqlx::query_as::<_, Copy>(&format!(
                    r#"
                    UPDATE copies SET status = $2
                    WHERE barcode = $1 AND status = 'available'
                    RETURNING {}
                    "#,
                    COPY_COLUMNS
                ))
                .bind(barcode)
                .bind(hold)
                .fetch_optional(&mut *tx)
                .await?
            }
            ClaimTarget::Isbn(isbn) => {
                sqlx::query_as::<_, Copy>(&format!(
                    r#"
                    UPDATE copies SET status = $2
                    WHERE id = (
                        SELECT id FROM copies
                        WHERE isbn_ref = $1 AND status = 'available'
                        ORDER BY id
                        LIMIT 1
                        FOR UPDATE SKIP LOCKED
                    )
                    RETURNING {}
                    "#,
                    COPY_COLUMNS
                ))
                .bind(isbn)
                .bind(hold)
                .fetch_optional(&mut *tx)
                .await?
            }
        };
        let Some(copy) = claimed else {
            return Ok(None);
        };
        check_copy_move(&copy.barcode, CopyStatus::Available, hold)?;

        let book_title: String = sqlx::query_scalar(
            "UPDATE titles SET qty_avail = qty_avail - 1 WHERE isbn = $1 RETURNING title",
        )
        .bind(&copy.isbn_ref)
        .fetch_one(&mut *tx)
        .await?;

        let loan = sqlx::query_as::<_, LoanTransaction>(
            r#"
            INSERT INTO loan_transactions (user_id, barcode, isbn, book_title, status,
                                           borrow_date, due_date, renew_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, 0)
            RETURNING *
            "#,
        )
        .bind(draft.user_id)
        .bind(&copy.barcode)
        .bind(&copy.isbn_ref)
        .bind(&book_title)
        .bind(draft.status)
        .bind(draft.borrow_date)
        .bind(draft.due_date)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;
        if max_borrowing.is_some() {
            let open =
                lock_and_count_loans(&mut *tx, user_id, &[TransactionStatus::Borrowing]).await?;
            check_quota(open, max_borrowing)?;
        }

        let loan = sqlx::query_as::<_, LoanTransaction>(
            r#"
            UPDATE loan_transactions
            SET status = 'borrowing', borrow_date = $3, due_date = $4
            WHERE user_id = $1 AND barcode = $2 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(barcode)
        .bind(borrow_date)
        .bind(due_date)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(loan) = loan else {
            return Ok(None);
        };

        let moved = sqlx::query(
            "UPDATE copies SET status = 'borrowed' WHERE barcode = $1 AND status = 'pending'",
        )
        .bind(barcode)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if moved == 0 {
            tx.rollback().await?;
            return Ok(None);
        }

        tx.commit().await?;
        Ok(Some(loan))
    }

    async fn close_loan(
        &self,
        barcode: &str,
        policy: &ReturnPolicy,
    ) -> AppResult<Option<ClosedLoan>> {
        let mut tx = self.pool.begin().await?;

        let open = sqlx::query_as::<_, LoanTransaction>(
            "SELECT * FROM loan_transactions WHERE barcode = $1 AND status = 'borrowing' FOR UPDATE",
        )
        .bind(barcode)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(open) = open else {
            return Ok(None);
        };
        check_transaction_move(open.id, open.status, TransactionStatus::Returned)?;

        let copy_status: Option<CopyStatus> =
            sqlx::query_scalar("SELECT status FROM copies WHERE barcode = $1 FOR UPDATE")
                .bind(barcode)
                .fetch_optional(&mut *tx)
                .await?;
        let copy_status = copy_status.ok_or_else(|| {
            AppError::Internal(format!("Borrowed copy {} is missing from the store", barcode))
        })?;
        check_copy_move(barcode, copy_status, CopyStatus::Available)?;

        let settlement = policy.settle(&open);
        let loan = sqlx::query_as::<_, LoanTransaction>(
            r#"
            UPDATE loan_transactions
            SET status = 'returned', return_date = $2, overdue_days = $3, fine_amount = $4
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(open.id)
        .bind(policy.now)
        .bind(settlement.overdue_days)
        .bind(settlement.fine_amount)
        .fetch_one(&mut *tx)
        .await?;

        let isbn: String = sqlx::query_scalar(
            "UPDATE copies SET status = 'available' WHERE barcode = $1 RETURNING isbn_ref",
        )
        .bind(barcode)
        .fetch_one(&mut *tx)
        .await?;

        let restored = sqlx::query("UPDATE titles SET qty_avail = qty_avail + 1 WHERE isbn = $1")
            .bind(&isbn)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if restored == 0 {
            return Err(AppError::Internal(format!("Title {} is missing from the store", isbn)));
        }

        let fine = if settlement.fine_amount > 0 {
            let fine = NewFine::overdue(
                loan.user_id,
                loan.id,
                &loan.book_title,
                settlement,
                policy.now,
            );
            Some(insert_fine(&mut *tx, &fine).await?)
        } else {
            None
        };

        tx.commit().await?;
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
        let loan = sqlx::query_as::<_, LoanTransaction>(
            r#"
            UPDATE loan_transactions
            SET due_date = $3, renew_count = renew_count + 1
            WHERE id = $1 AND status = 'borrowing' AND renew_count = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected_renew_count)
        .bind(new_due_date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(loan)
    }

    async fn get_transaction(&self, id: i32) -> AppResult<Option<LoanTransaction>> {
        let loan =
            sqlx::query_as::<_, LoanTransaction>("SELECT * FROM loan_transactions WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(loan)
    }

    async fn count_transactions(
        &self,
        user_id: Option<i32>,
        statuses: &[TransactionStatus],
    ) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM loan_transactions
            WHERE ($1::INT IS NULL OR user_id = $1)
              AND status = ANY($2)
            "#,
        )
        .bind(user_id)
        .bind(status_texts(statuses))
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn list_transactions(&self, filter: &LoanFilter) -> AppResult<Vec<LoanTransaction>> {
        let loans = sqlx::query_as::<_, LoanTransaction>(
            r#"
            SELECT * FROM loan_transactions
            WHERE ($1::INT IS NULL OR user_id = $1)
              AND (cardinality($2::TEXT[]) = 0 OR status = ANY($2))
            ORDER BY borrow_date DESC, id DESC
            LIMIT $3
            "#,
        )
        .bind(filter.user_id)
        .bind(status_texts(&filter.statuses))
        .bind(filter.limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(loans)
    }

    async fn count_overdue(&self, now: DateTime<Utc>) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM loan_transactions WHERE status = 'borrowing' AND due_date < $1",
        )
        .bind(now)
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn get_cart(&self, user_id: i32) -> AppResult<Vec<CartItem>> {
        let items = sqlx::query_as::<_, CartItem>(
            "SELECT isbn, title, author FROM cart_items WHERE user_id = $1 ORDER BY added_at, isbn",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(items)
    }

    async fn add_cart_item(
        &self,
        user_id: i32,
        item: &CartItem,
        capacity: usize,
    ) -> AppResult<CartAdd> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent adds to the same cart
        sqlx::query("SELECT id FROM users WHERE id = $1 FOR UPDATE")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let isbns: Vec<String> =
            sqlx::query_scalar("SELECT isbn FROM cart_items WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&mut *tx)
                .await?;
        if isbns.iter().any(|isbn| isbn == &item.isbn) {
            return Ok(CartAdd::AlreadyPresent);
        }
        if isbns.len() >= capacity {
            return Ok(CartAdd::Full);
        }

        sqlx::query(
            "INSERT INTO cart_items (user_id, isbn, title, author, added_at) VALUES ($1, $2, $3, $4, NOW())",
        )
        .bind(user_id)
        .bind(&item.isbn)
        .bind(&item.title)
        .bind(&item.author)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(CartAdd::Added)
    }

    async fn remove_cart_item(&self, user_id: i32, isbn: &str) -> AppResult<bool> {
        let removed = sqlx::query("DELETE FROM cart_items WHERE user_id = $1 AND isbn = $2")
            .bind(user_id)
            .bind(isbn)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(removed > 0)
    }

    async fn clear_cart(&self, user_id: i32) -> AppResult<()> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_fine(&self, fine: &NewFine) -> AppResult<Fine> {
        insert_fine(&self.pool, fine).await
    }

    async fn pay_fine(&self, id: i32, now: DateTime<Utc>) -> AppResult<Option<FinePayment>> {
        let paid = sqlx::query_as::<_, Fine>(
            r#"
            UPDATE fines SET status = 'paid', payment_date = $2
            WHERE id = $1 AND status = 'unpaid'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        if let Some(fine) = paid {
            return Ok(Some(FinePayment::Paid(fine)));
        }

        let existing = sqlx::query_as::<_, Fine>("SELECT * FROM fines WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(existing.map(FinePayment::AlreadyPaid))
    }

    async fn list_fines(&self) -> AppResult<Vec<FineDetails>> {
        let fines = sqlx::query_as::<_, FineDetails>(
            r#"
            SELECT f.*, COALESCE(u.fullname, '') AS user_name, u.student_id
            FROM fines f
            LEFT JOIN users u ON u.id = f.user_id
            ORDER BY (f.status = 'paid'), f.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(fines)
    }

    async fn fine_revenue(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> AppResult<i64> {
        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COALESCE(SUM(amount), 0)::BIGINT FROM fines
            WHERE status = 'paid'
              AND ($1::TIMESTAMPTZ IS NULL OR payment_date >= $1)
              AND ($2::TIMESTAMPTZ IS NULL OR payment_date < $2)
            "#,
        )
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;
        Ok(total)
    }

    async fn get_user(&self, id: i32) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_user_by_login(&self, login: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT * FROM users WHERE username = $1 OR student_id = $1 ORDER BY id LIMIT 1",
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, user: &NewUser) -> AppResult<User> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, student_id, fullname, email, phone, role, password_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&user.username)
        .bind(&user.student_id)
        .bind(&user.fullname)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.role)
        .bind(&user.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| unique_violation(e, "Username, student id or email already exists"))
    }

    async fn record_failed_login(
        &self,
        id: i32,
        attempts: i32,
        lock_until: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        sqlx::query(
            "UPDATE users SET failed_attempts = $2, lock_until = COALESCE($3, lock_until) WHERE id = $1",
        )
        .bind(id)
        .bind(attempts)
        .bind(lock_until)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn reset_failed_logins(&self, id: i32) -> AppResult<()> {
        sqlx::query("UPDATE users SET failed_attempts = 0, lock_until = NULL WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_password(&self, id: i32, password_hash: &str) -> AppResult<()> {
        let updated = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Err(AppError::NotFound(format!("User {} not found", id)));
        }
        Ok(())
    }

    async fn list_readers(
        &self,
        query: Option<&str>,
        limit: Option<i64>,
    ) -> AppResult<Vec<ReaderSummary>> {
        let readers = sqlx::query_as::<_, ReaderSummary>(
            r#"
            SELECT u.*,
                   (SELECT COUNT(*) FROM loan_transactions t
                    WHERE t.user_id = u.id AND t.status = 'borrowing') AS borrow_count,
                   (SELECT COALESCE(SUM(f.amount), 0)::BIGINT FROM fines f
                    WHERE f.user_id = u.id AND f.status = 'unpaid') AS total_fine
            FROM users u
            WHERE u.role = 'user'
              AND ($1::TEXT IS NULL
                   OR POSITION(LOWER($1) IN LOWER(u.fullname)) > 0
                   OR POSITION(LOWER($1) IN LOWER(COALESCE(u.student_id, ''))) > 0)
            ORDER BY u.id
            LIMIT $2
            "#,
        )
        .bind(query)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(readers)
    }

    async fn count_titles(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM titles")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn copy_counts(&self) -> AppResult<CopyCounts> {
        let (available, in_use): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FILTER (WHERE status = 'available'),
                   COUNT(*) FILTER (WHERE status <> 'available')
            FROM copies
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(CopyCounts { available, in_use })
    }
}
