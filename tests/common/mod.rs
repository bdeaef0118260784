//! Shared fixtures for the integration tests
//!
//! Primary directory `DC=corp,DC=com`:
//! - dc1.corp.com, Site1, version 6.3, naming role owner
//! - dc2.corp.com, Site1, version 6.3
//! - dc3.corp.com, Site2, version 5.0 (below the default floor)
//!
//! Secondary configuration set:
//! - ad1.corp.com:50000, Site1, naming role owner
//! - ad2.corp.com:50001, Site1
//! - ad3.corp.com:50002, Site2

#![allow(dead_code)]

use dirpart::config::PartitionPolicy;
use dirpart::partition::{Partition, PartitionKind, PartitionManager};
use dirpart::store::{DirectoryContext, DirectorySnapshot, InMemoryDirectory, ServerSpec, Technology};

pub const ROOT: &str = "DC=corp,DC=com";
pub const CONFIG: &str = "CN=Configuration,DC=corp,DC=com";
pub const PARTITIONS: &str = "CN=Partitions,CN=Configuration,DC=corp,DC=com";
pub const APPS: &str = "DC=apps,DC=corp,DC=com";
pub const APPS_DNS: &str = "apps.corp.com";

pub const AD1: &str = "ad1.corp.com:50000";
pub const AD2: &str = "ad2.corp.com:50001";
pub const AD3: &str = "ad3.corp.com:50002";

pub fn primary_snapshot() -> DirectorySnapshot {
    DirectorySnapshot::new(Technology::Primary, ROOT)
        .with_server(ServerSpec::primary("dc1.corp.com", "Site1", "6.3"))
        .with_server(ServerSpec::primary("dc2.corp.com", "Site1", "6.3"))
        .with_server(ServerSpec::primary("dc3.corp.com", "Site2", "5.0"))
}

pub fn primary_directory() -> InMemoryDirectory {
    InMemoryDirectory::new(primary_snapshot())
}

pub fn secondary_directory() -> InMemoryDirectory {
    InMemoryDirectory::new(
        DirectorySnapshot::new(Technology::Secondary, ROOT)
            .with_server(ServerSpec::secondary("ad1.corp.com", 50000, "Site1"))
            .with_server(ServerSpec::secondary("ad2.corp.com", 50001, "Site1"))
            .with_server(ServerSpec::secondary("ad3.corp.com", 50002, "Site2")),
    )
}

pub fn server(name: &str) -> DirectoryContext {
    DirectoryContext::server(name)
}

pub fn manager(dir: &InMemoryDirectory) -> PartitionManager<'_> {
    PartitionManager::new(dir, dir, PartitionPolicy::default())
}

/// Create and commit `APPS` on `host`.
pub fn committed_partition(dir: &InMemoryDirectory, host: &str, kind: PartitionKind) -> Partition {
    let manager = manager(dir);
    let mut partition = manager.create(&server(host), APPS, kind).unwrap();
    manager.commit(&mut partition).unwrap();
    partition
}
