//! Closed status enums shared by the record types
//!
//! Every enum is stored as lowercase TEXT and serialized the same way on the
//! wire, so the database, the JSON API and the logs all agree on one spelling.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Implements `as_str`, `Display`, `FromStr` and the sqlx TEXT conversions
/// for a fieldless enum.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(format!("Invalid {} value: {}", stringify!($name), s)),
                }
            }
        }

        impl sqlx::Type<sqlx::Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <String as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $name {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s: String = sqlx::Decode::<sqlx::Postgres>::decode(value)?;
                s.parse().map_err(|e: String| e.into())
            }
        }

        impl sqlx::Encode<'_, sqlx::Postgres> for $name {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> sqlx::encode::IsNull {
                let s: String = self.as_str().to_string();
                <String as sqlx::Encode<sqlx::Postgres>>::encode(s, buf)
            }
        }
    };
}

// ---------------------------------------------------------------------------
// CopyStatus
// ---------------------------------------------------------------------------

/// Shelf status of one physical copy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CopyStatus {
    Available,
    /// Held for a self-service reservation, awaiting pickup
    Pending,
    Borrowed,
}

text_enum!(CopyStatus {
    Available => "available",
    Pending => "pending",
    Borrowed => "borrowed",
});

impl CopyStatus {
    /// Transitions the circulation engine is allowed to perform
    pub fn can_transition(self, to: CopyStatus) -> bool {
        matches!(
            (self, to),
            (CopyStatus::Available, CopyStatus::Pending)
                | (CopyStatus::Available, CopyStatus::Borrowed)
                | (CopyStatus::Pending, CopyStatus::Borrowed)
                | (CopyStatus::Borrowed, CopyStatus::Available)
        )
    }

    /// Anything but `available` blocks copy and title deletion
    pub fn is_in_use(self) -> bool {
        self != CopyStatus::Available
    }
}

// ---------------------------------------------------------------------------
// TransactionStatus
// ---------------------------------------------------------------------------

/// Lifecycle of a loan transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Borrowing,
    Returned,
}

text_enum!(TransactionStatus {
    Pending => "pending",
    Borrowing => "borrowing",
    Returned => "returned",
});

impl TransactionStatus {
    pub const OPEN: [TransactionStatus; 2] =
        [TransactionStatus::Pending, TransactionStatus::Borrowing];

    pub fn is_open(self) -> bool {
        self != TransactionStatus::Returned
    }

    pub fn can_transition(self, to: TransactionStatus) -> bool {
        matches!(
            (self, to),
            (TransactionStatus::Pending, TransactionStatus::Borrowing)
                | (TransactionStatus::Borrowing, TransactionStatus::Returned)
        )
    }

    /// Copy status that goes with a freshly opened transaction in this status
    pub fn copy_hold(self) -> Option<CopyStatus> {
        match self {
            TransactionStatus::Pending => Some(CopyStatus::Pending),
            TransactionStatus::Borrowing => Some(CopyStatus::Borrowed),
            TransactionStatus::Returned => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Fines
// ---------------------------------------------------------------------------

/// Why a fine was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FineReason {
    Overdue,
    Damaged,
    Lost,
    #[serde(alias = "other")]
    Manual,
}

text_enum!(FineReason {
    Overdue => "overdue",
    Damaged => "damaged",
    Lost => "lost",
    Manual => "manual",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FineStatus {
    Unpaid,
    Paid,
}

text_enum!(FineStatus {
    Unpaid => "unpaid",
    Paid => "paid",
});

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Account role. `Admin` is library staff, `User` a self-service reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

text_enum!(Role {
    Admin => "admin",
    User => "user",
});

impl Role {
    pub fn is_staff(self) -> bool {
        self == Role::Admin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_transition_table() {
        use CopyStatus::*;
        assert!(Available.can_transition(Borrowed));
        assert!(Available.can_transition(Pending));
        assert!(Pending.can_transition(Borrowed));
        assert!(Borrowed.can_transition(Available));

        assert!(!Borrowed.can_transition(Pending));
        assert!(!Pending.can_transition(Available));
        assert!(!Available.can_transition(Available));
    }

    #[test]
    fn transaction_transition_table() {
        use TransactionStatus::*;
        assert!(Pending.can_transition(Borrowing));
        assert!(Borrowing.can_transition(Returned));

        assert!(!Pending.can_transition(Returned));
        assert!(!Returned.can_transition(Borrowing));
        assert!(!Borrowing.can_transition(Pending));
    }

    #[test]
    fn open_statuses() {
        assert!(TransactionStatus::Pending.is_open());
        assert!(TransactionStatus::Borrowing.is_open());
        assert!(!TransactionStatus::Returned.is_open());
    }

    #[test]
    fn text_round_trip_uses_lowercase() {
        assert_eq!(CopyStatus::Borrowed.as_str(), "borrowed");
        assert_eq!("pending".parse::<TransactionStatus>(), Ok(TransactionStatus::Pending));
        assert!("Borrowed".parse::<CopyStatus>().is_err());
    }

    #[test]
    fn other_reason_is_accepted_as_manual() {
        let reason: FineReason = serde_json::from_str("\"other\"").unwrap();
        assert_eq!(reason, FineReason::Manual);
    }
}
