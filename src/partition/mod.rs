//! Partition Subsystem
//!
//! - `Partition`: a naming context, uncommitted until its head and
//!   cross-reference exist
//! - `PartitionManager`: create, commit, delete, lookup and server discovery
//!
//! Partition-defining metadata is only ever written at the naming role
//! owner.

mod manager;
#[allow(clippy::module_inception)]
mod partition;

pub use manager::PartitionManager;
pub use partition::{Lifecycle, Partition, PartitionKind, PartitionSummary};
