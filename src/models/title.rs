//! Title (catalog aggregate) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::copy::Copy;

/// Catalog entry aggregating every physical copy of one ISBN.
///
/// `qty_avail` always equals the number of this title's copies whose status
/// is `available`; only the store's circulation units change it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Title {
    pub isbn: String,
    pub title: String,
    pub author: Option<String>,
    pub category: Option<String>,
    pub publisher: Option<String>,
    pub year: Option<String>,
    pub price: i64,
    pub language: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub qty_total: i32,
    pub qty_avail: i32,
    pub created_at: DateTime<Utc>,
}

/// Register title request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct NewTitle {
    #[validate(length(min = 1, message = "ISBN is required"))]
    pub isbn: String,
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    pub author: Option<String>,
    pub category: Option<String>,
    pub publisher: Option<String>,
    pub year: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0, message = "Price cannot be negative"))]
    pub price: i64,
    pub language: Option<String>,
    pub location: Option<String>,
    pub image_url: Option<String>,
    /// Number of copies to create
    #[serde(default = "default_qty")]
    #[validate(range(min = 0, max = 1000, message = "Quantity must be between 0 and 1000"))]
    pub qty: i32,
}

fn default_qty() -> i32 {
    1
}

impl NewTitle {
    /// Title record as it is first stored, with every copy available
    pub fn into_title(self, now: DateTime<Utc>) -> Title {
        Title {
            isbn: self.isbn,
            title: self.title,
            author: self.author,
            category: self.category,
            publisher: self.publisher,
            year: self.year,
            price: self.price,
            language: self.language,
            location: self.location,
            image_url: self.image_url,
            qty_total: self.qty,
            qty_avail: self.qty,
            created_at: now,
        }
    }
}

/// Title search parameters
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
pub struct TitleQuery {
    /// Case-insensitive substring over title, author and ISBN
    pub q: Option<String>,
}

/// Title with its copies
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TitleDetails {
    pub book: Title,
    pub copies: Vec<Copy>,
}

/// Returns true when `needle` is empty or found case-insensitively in any field
pub fn matches_query(needle: &str, fields: &[Option<&str>]) -> bool {
    if needle.is_empty() {
        return true;
    }
    let needle = needle.to_lowercase();
    fields
        .iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(&needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_matches_any_field_ignoring_case() {
        let fields = [Some("Clean Code"), Some("Robert C. Martin"), Some("978-1")];
        assert!(matches_query("clean", &fields));
        assert!(matches_query("MARTIN", &fields));
        assert!(matches_query("978", &fields));
        assert!(!matches_query("kahneman", &fields));
        assert!(matches_query("", &fields));
    }

    #[test]
    fn registered_title_starts_fully_available() {
        let new = NewTitle {
            isbn: "978-1".into(),
            title: "Clean Code".into(),
            author: None,
            category: None,
            publisher: None,
            year: None,
            price: 0,
            language: None,
            location: None,
            image_url: None,
            qty: 3,
        };
        let title = new.into_title(Utc::now());
        assert_eq!(title.qty_total, 3);
        assert_eq!(title.qty_avail, 3);
    }
}
