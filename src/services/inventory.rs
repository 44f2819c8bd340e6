//! Catalog and copy administration

use chrono::Utc;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::{
        copy::{numbered_copies, AddCopies, Copy, CopyPreview},
        title::{NewTitle, Title, TitleDetails},
    },
    repository::{CopyRemoval, Repository, TitleRemoval},
};

#[derive(Clone)]
pub struct InventoryService {
    repository: Repository,
}

impl InventoryService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    /// Register a title together with `qty` available copies
    pub async fn register_title(&self, mut request: NewTitle) -> AppResult<Title> {
        request.validate()?;
        request.isbn = request.isbn.trim().to_string();
        request.title = request.title.trim().to_string();
        if request.isbn.is_empty() || request.title.is_empty() {
            return Err(AppError::InvalidInput(
                "ISBN and title are required".to_string(),
            ));
        }

        let location = request.location.clone();
        let title = request.into_title(Utc::now());
        let copies = numbered_copies(&title.isbn, 0, title.qty_total, location.as_deref());
        self.repository.create_title(&title, &copies).await?;

        tracing::info!(isbn = %title.isbn, copies = copies.len(), "Title registered");
        Ok(title)
    }

    pub async fn search_titles(&self, query: Option<&str>) -> AppResult<Vec<Title>> {
        self.repository
            .search_titles(query.map(str::trim).unwrap_or(""))
            .await
    }

    pub async fn title_detail(&self, isbn: &str) -> AppResult<TitleDetails> {
        let book = self
            .repository
            .get_title(isbn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", isbn)))?;
        let copies = self.repository.list_copies(isbn).await?;
        Ok(TitleDetails { book, copies })
    }

    /// Append copies numbered after the title's highest barcode
    pub async fn add_copies(&self, isbn: &str, request: AddCopies) -> AppResult<Vec<Copy>> {
        request.validate()?;
        let copies = self
            .repository
            .add_copies(isbn, request.qty, request.location.as_deref())
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", isbn)))?;

        tracing::info!(isbn, added = copies.len(), "Copies added");
        Ok(copies)
    }

    /// Delete one copy, only while it is on the shelf
    pub async fn remove_copy(&self, barcode: &str) -> AppResult<Copy> {
        match self.repository.remove_copy(barcode).await? {
            CopyRemoval::Removed(copy) => {
                tracing::info!(barcode, isbn = %copy.isbn_ref, "Copy removed");
                Ok(copy)
            }
            CopyRemoval::NotFound => Err(AppError::UnknownBarcode(barcode.to_string())),
            CopyRemoval::InUse(status) => Err(AppError::CopyInUse(format!(
                "Copy {} is {}",
                barcode, status
            ))),
        }
    }

    /// Delete a title and its copies when none of them is in use
    pub async fn delete_title(&self, isbn: &str) -> AppResult<u64> {
        match self.repository.delete_title(isbn).await? {
            TitleRemoval::Removed { copies } => {
                tracing::info!(isbn, copies, "Title deleted");
                Ok(copies)
            }
            TitleRemoval::NotFound => Err(AppError::NotFound(format!("Book {} not found", isbn))),
            TitleRemoval::InUse => Err(AppError::CopyInUse(format!(
                "Book {} still has copies reserved or on loan",
                isbn
            ))),
        }
    }

    /// What a staff scan shows before borrowing or returning
    pub async fn check_copy(&self, barcode: &str) -> AppResult<CopyPreview> {
        let barcode = barcode.trim();
        let copy = self
            .repository
            .get_copy(barcode)
            .await?
            .ok_or_else(|| AppError::UnknownBarcode(barcode.to_string()))?;
        let title = self
            .repository
            .get_title(&copy.isbn_ref)
            .await?
            .ok_or_else(|| {
                AppError::Internal(format!("Copy {} references a missing title", barcode))
            })?;

        Ok(CopyPreview {
            barcode: copy.barcode,
            isbn: title.isbn,
            title: title.title,
            author: title.author,
            copy_status: copy.status,
        })
    }
}
