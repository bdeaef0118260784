//! dirpart - directory partition lifecycle and replication topology
//!
//! Creates, commits, looks up and deletes directory partitions through the
//! naming role owner, manages their replica sets, and edits the site links
//! that carry replication between sites.
//!
//! The store and the locator are traits; `store::InMemoryDirectory`
//! implements both and backs the CLI and the tests.

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod observability;
pub mod partition;
pub mod replica;
pub mod store;
pub mod topology;
