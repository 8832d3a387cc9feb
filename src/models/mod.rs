//! Data models for the lending server

pub mod audit;
pub mod book;
pub mod loan;
pub mod user;

// Re-export commonly used types
pub use audit::AuditReport;
pub use book::Book;
pub use loan::Loan;
pub use user::{UserClaims, UserRecord};

use serde::{Deserialize, Deserializer};

/// Reads a JSON `null` list as empty, as legacy records store nil slices that way
pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}
