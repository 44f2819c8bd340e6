//! Copy (physical item) model and related types

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::enums::CopyStatus;

/// One physical, barcoded instance of a title
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Copy {
    pub barcode: String,
    pub isbn_ref: String,
    pub status: CopyStatus,
    pub location: Option<String>,
}

/// Barcode of the `seq`-th copy of a title (1-based)
pub fn barcode_for(isbn: &str, seq: i64) -> String {
    format!("{}-{}", isbn, seq)
}

/// Highest sequence already used among a title's barcodes.
///
/// Starts from the copy count and moves past any higher numbered barcode so
/// that deleting a copy in the middle never leads to a reused barcode.
pub fn last_sequence<'a>(isbn: &str, barcodes: impl IntoIterator<Item = &'a str>) -> i64 {
    let prefix = format!("{}-", isbn);
    let mut count = 0i64;
    let mut highest = 0i64;
    for barcode in barcodes {
        count += 1;
        if let Some(seq) = barcode
            .strip_prefix(&prefix)
            .and_then(|rest| rest.parse::<i64>().ok())
        {
            highest = highest.max(seq);
        }
    }
    count.max(highest)
}

/// Copies numbered `existing + 1 ..= existing + qty`, all available
pub fn numbered_copies(isbn: &str, existing: i64, qty: i32, location: Option<&str>) -> Vec<Copy> {
    (1..=i64::from(qty.max(0)))
        .map(|offset| Copy {
            barcode: barcode_for(isbn, existing + offset),
            isbn_ref: isbn.to_string(),
            status: CopyStatus::Available,
            location: location.map(str::to_string),
        })
        .collect()
}

/// Add copies request
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AddCopies {
    #[serde(default = "default_qty")]
    #[validate(range(min = 1, max = 1000, message = "Quantity must be between 1 and 1000"))]
    pub qty: i32,
    pub location: Option<String>,
}

fn default_qty() -> i32 {
    1
}

/// What a staff scan shows before a borrow or return
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CopyPreview {
    pub barcode: String,
    pub isbn: String,
    pub title: String,
    pub author: Option<String>,
    pub copy_status: CopyStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbering_continues_after_existing_copies() {
        let copies = numbered_copies("978-1", 5, 2, Some("Shelf A"));
        let barcodes: Vec<_> = copies.iter().map(|c| c.barcode.as_str()).collect();
        assert_eq!(barcodes, ["978-1-6", "978-1-7"]);
        assert!(copies.iter().all(|c| c.status == CopyStatus::Available));
        assert_eq!(copies[0].location.as_deref(), Some("Shelf A"));
    }

    #[test]
    fn sequence_skips_past_gaps_left_by_deletions() {
        let left = ["978-1-1", "978-1-2", "978-1-4", "978-1-5"];
        assert_eq!(last_sequence("978-1", left), 5);
        assert_eq!(last_sequence("978-1", ["978-1-1", "custom"]), 2);
        assert_eq!(last_sequence("978-1", Vec::<&str>::new()), 0);
    }

    #[test]
    fn zero_quantity_creates_nothing() {
        assert!(numbered_copies("978-1", 0, 0, None).is_empty());
    }
}
