//! Replica Subsystem
//!
//! - `ReplicaServer`: closed enum of server variants, one per technology
//! - `ReplicaSet`: ordered, rule-checked membership bound to a partition
//!   cross-reference or to a site

mod server;
mod set;

pub use server::{PrimaryServer, ReplicaServer, SecondaryServer, ServerVersion};
pub use set::{Binding, ReplicaSet};
