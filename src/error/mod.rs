//! Error Subsystem
//!
//! - One typed taxonomy for every public operation
//! - Raw store/locator codes are classified, never passed through untyped
//! - The only local recovery anywhere is the commit rollback in `partition`

mod classifier;
mod kinds;

pub use classifier::{codes, Classify, ErrorClassifier, RawError};
pub use kinds::{DirectoryError, DirectoryErrorKind, DirectoryResult};
