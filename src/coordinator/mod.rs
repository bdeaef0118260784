//! Role Coordinator
//!
//! - Discovers the single server allowed to write partition metadata
//! - Pushes single-object replication to close the window between a
//!   cross-reference being enabled elsewhere and the owner seeing it

mod role;

pub use role::{CoordinatorRef, RoleCoordinator};
