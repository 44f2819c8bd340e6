//! Reservation cart model

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// One wished-for title. Holds no copy; availability is decided at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct CartItem {
    pub isbn: String,
    pub title: String,
    pub author: Option<String>,
}

/// Add to / remove from cart request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CartIsbn {
    #[validate(length(min = 1, message = "ISBN is required"))]
    pub isbn: String,
}

/// Result of an atomic cart insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CartAdd {
    Added,
    AlreadyPresent,
    Full,
}
