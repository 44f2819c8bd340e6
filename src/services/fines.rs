//! Fine ledger: manual fines, payments and the staff listing

use chrono::Utc;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        enums::FineReason,
        fine::{CreateFine, Fine, FinePayment, FineView, NewFine},
    },
    repository::Repository,
};

#[derive(Clone)]
pub struct FinesService {
    repository: Repository,
}

impl FinesService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Record a damage, loss or other staff fine, independent of any loan
    pub async fn create_manual(&self, request: CreateFine) -> AppResult<Fine> {
        request.validate()?;
        if request.reason == FineReason::Overdue {
            return Err(AppError::InvalidInput(
                "Overdue fines are raised by returns".to_string(),
            ));
        }
        if self.repository.get_user(request.user_id).await?.is_none() {
            return Err(AppError::InvalidInput(format!(
                "User {} does not exist",
                request.user_id
            )));
        }

        let note = request.note.trim();
        let description = if note.is_empty() {
            format!("Fine: {}", request.reason)
        } else {
            note.to_string()
        };
        let fine = self
            .repository
            .insert_fine(&NewFine {
                user_id: request.user_id,
                transaction_id: None,
                amount: request.amount,
                reason: request.reason,
                description,
                created_at: Utc::now(),
            })
            .await?;

        tracing::info!(
            fine_id = fine.id,
            user_id = fine.user_id,
            amount = fine.amount,
            reason = %fine.reason,
            "Fine created"
        );
        Ok(fine)
    }

    /// Mark a fine paid. Paying it again changes nothing.
    pub async fn pay(&self, fine_id: i32) -> AppResult<FinePayment> {
        let payment = self
            .repository
            .pay_fine(fine_id, Utc::now())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Fine {} not found", fine_id)))?;

        match &payment {
            FinePayment::Paid(fine) => {
                tracing::info!(fine_id, user_id = fine.user_id, amount = fine.amount, "Fine paid")
            }
            FinePayment::AlreadyPaid(_) => {
                tracing::warn!(fine_id, "Fine was already paid")
            }
        }
        Ok(payment)
    }

    pub async fn list(&self) -> AppResult<Vec<FineView>> {
        Ok(self
            .repository
            .list_fines()
            .await?
            .into_iter()
            .map(FineView::from)
            .collect())
    }
}
