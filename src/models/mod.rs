//! Data models for the circulation server

pub mod cart;
pub mod copy;
pub mod enums;
pub mod fine;
pub mod loan;
pub mod title;
pub mod user;

// Re-export commonly used types
pub use cart::CartItem;
pub use copy::Copy;
pub use enums::{CopyStatus, FineReason, FineStatus, Role, TransactionStatus};
pub use fine::Fine;
pub use loan::LoanTransaction;
pub use title::Title;
pub use user::{Principal, User};
