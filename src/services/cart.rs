//! Reservation cart

use crate::{
    error::{AppError, AppResult},
    models::cart::{CartAdd, CartItem},
    repository::Repository,
};

#[derive(Clone)]
pub struct CartService {
    repository: Repository,
    capacity: usize,
}

impl CartService {
    pub fn new(repository: Repository, capacity: usize) -> Self {
        Self {
            repository,
            capacity,
        }
    }

    pub async fn list(&self, user_id: i32) -> AppResult<Vec<CartItem>> {
        self.repository.get_cart(user_id).await
    }

    /// Add a title to the cart. No copy is held until checkout.
    pub async fn add(&self, user_id: i32, isbn: &str) -> AppResult<Vec<CartItem>> {
        let isbn = isbn.trim();
        let title = self
            .repository
            .get_title(isbn)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Book {} not found", isbn)))?;

        let item = CartItem {
            isbn: title.isbn,
            title: title.title,
            author: title.author,
        };
        match self
            .repository
            .add_cart_item(user_id, &item, self.capacity)
            .await?
        {
            CartAdd::Added => {
                tracing::debug!(user_id, isbn, "Added to cart");
                self.list(user_id).await
            }
            CartAdd::AlreadyPresent => Err(AppError::DuplicateKey(format!(
                "Book {} is already in the cart",
                isbn
            ))),
            CartAdd::Full => Err(AppError::InvalidState(format!(
                "Cart is full ({} books maximum)",
                self.capacity
            ))),
        }
    }

    pub async fn remove(&self, user_id: i32, isbn: &str) -> AppResult<Vec<CartItem>> {
        let isbn = isbn.trim();
        if !self.repository.remove_cart_item(user_id, isbn).await? {
            return Err(AppError::NotFound(format!("Book {} is not in the cart", isbn)));
        }
        self.list(user_id).await
    }
}
