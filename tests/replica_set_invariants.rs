//! Replica Set Invariant Tests
//!
//! - Membership rules are checked before anything changes
//! - Names compare case-insensitively
//! - Cross-reference-bound changes wait for the next commit
//! - Site-bound changes reach each server immediately, or not at all

mod common;

use common::*;
use dirpart::error::{codes, DirectoryError, RawError};
use dirpart::partition::PartitionKind;
use dirpart::replica::{ReplicaServer, SecondaryServer};
use dirpart::store::wellknown::attr;
use dirpart::store::{Fault, StoreOp};
use dirpart::topology::{SiteRef, Transport};

fn find(dir: &dirpart::store::InMemoryDirectory, name: &str) -> ReplicaServer {
    ReplicaServer::find(dir, &server("dc1"), name).unwrap()
}

fn renamed(server: &ReplicaServer, name: &str) -> ReplicaServer {
    let mut copy = server.clone();
    match &mut copy {
        ReplicaServer::Primary(s) => s.name = name.to_string(),
        ReplicaServer::Secondary(s) => s.name = name.to_string(),
    }
    copy
}

// =============================================================================
// Cross-reference binding
// =============================================================================

/// A server below the version floor is rejected and the set is unchanged.
#[test]
fn test_add_rejects_old_server() {
    let dir = primary_directory();
    let manager = manager(&dir);
    let mut partition = committed_partition(&dir, "dc2", PartitionKind::Primary);
    let dc3 = find(&dir, "dc3.corp.com");

    let set = manager.replica_set(&mut partition).unwrap();
    assert_eq!(set.len(), 1);

    let err = set.add(&dir, dc3).unwrap_err();
    assert!(matches!(err, DirectoryError::InvalidArgument { .. }));
    assert_eq!(set.len(), 1);
    assert!(!set.has_pending());
}

/// A secondary instance never joins a primary partition's set.
#[test]
fn test_add_rejects_wrong_variant() {
    let dir = primary_directory();
    let manager = manager(&dir);
    let mut partition = committed_partition(&dir, "dc2", PartitionKind::Primary);
    let dc1 = find(&dir, "dc1.corp.com");
    let instance = ReplicaServer::Secondary(SecondaryServer {
        name: "ad1.corp.com:50000".to_string(),
        host: "ad1.corp.com".to_string(),
        port: 50000,
        site_name: "Site1".to_string(),
        site_dn: dc1.site_dn().to_string(),
        server_dn: "CN=ad1$50000,CN=Servers,CN=Site1,CN=Sites,CN=Configuration,DC=corp,DC=com".to_string(),
        ntdsa_dn: "CN=NTDS Settings,CN=ad1$50000,CN=Servers,CN=Site1,CN=Sites,CN=Configuration,DC=corp,DC=com"
            .to_string(),
    });

    let set = manager.replica_set(&mut partition).unwrap();
    assert!(matches!(
        set.add(&dir, instance),
        Err(DirectoryError::InvalidArgument { .. })
    ));
    assert_eq!(set.len(), 1);
}

/// Duplicates are detected regardless of case.
#[test]
fn test_add_duplicate_name_already_exists() {
    let dir = primary_directory();
    let manager = manager(&dir);
    let mut partition = committed_partition(&dir, "dc2", PartitionKind::Primary);
    let dc1 = find(&dir, "dc1.corp.com");

    let set = manager.replica_set(&mut partition).unwrap();
    assert_eq!(set.add(&dir, dc1.clone()).unwrap(), 1);
    let pending = set.pending().len();

    let err = set.add(&dir, renamed(&dc1, "DC1.CORP.COM")).unwrap_err();
    assert!(matches!(err, DirectoryError::AlreadyExists(_)));
    assert_eq!(set.len(), 2);
    assert_eq!(set.pending().len(), pending);
    assert_eq!(set.index_of_name("Dc1.Corp.Com"), Some(1));
}

/// Queued additions are written to the role owner's cross-reference on
/// commit.
#[test]
fn test_changes_flushed_on_commit() {
    let dir = primary_directory();
    let manager = manager(&dir);
    let mut partition = committed_partition(&dir, "dc2", PartitionKind::Primary);
    let dc1 = find(&dir, "dc1.corp.com");
    let ntdsa = dc1.ntdsa_dn().to_string();

    manager.replica_set(&mut partition).unwrap().add(&dir, dc1).unwrap();
    assert!(partition.has_pending_changes());
    manager.commit(&mut partition).unwrap();
    assert!(!partition.has_pending_changes());

    let cross_ref = partition.cross_reference_dn().unwrap();
    let locations = dir.inspect_attribute("dc1", cross_ref, attr::REPLICA_LOCATIONS);
    assert!(locations.iter().any(|v| v.as_text() == Some(ntdsa.as_str())));
}

/// A set filled before the first commit is written as part of it.
#[test]
fn test_changes_before_first_commit() {
    let dir = primary_directory();
    let manager = manager(&dir);
    let mut partition = manager.create(&server("dc2"), APPS, PartitionKind::Primary).unwrap();
    let dc1 = find(&dir, "dc1.corp.com");
    let ntdsa = dc1.ntdsa_dn().to_string();

    let set = manager.replica_set(&mut partition).unwrap();
    assert!(set.is_empty());
    set.add(&dir, dc1).unwrap();

    manager.commit(&mut partition).unwrap();
    let cross_ref = partition.cross_reference_dn().unwrap();
    let locations = dir.inspect_attribute("dc1", cross_ref, attr::REPLICA_LOCATIONS);
    assert_eq!(locations.len(), 1);
    assert_eq!(locations[0].as_text(), Some(ntdsa.as_str()));
}

#[test]
fn test_remove_clear_and_index_rules() {
    let dir = primary_directory();
    let manager = manager(&dir);
    let mut partition = committed_partition(&dir, "dc2", PartitionKind::Primary);
    let dc1 = find(&dir, "dc1.corp.com");
    let dc2 = find(&dir, "dc2.corp.com");
    let dc3 = find(&dir, "dc3.corp.com");

    let set = manager.replica_set(&mut partition).unwrap();
    assert!(set.contains(&dc2));
    assert!(matches!(
        set.remove(&dir, &dc1),
        Err(DirectoryError::NotFound { .. })
    ));
    assert!(matches!(
        set.insert(&dir, 5, dc1.clone()),
        Err(DirectoryError::InvalidArgument { .. })
    ));

    // One bad element keeps the whole range out.
    assert!(set.add_range(&dir, vec![dc1.clone(), dc3]).is_err());
    assert_eq!(set.len(), 1);

    set.insert(&dir, 0, dc1.clone()).unwrap();
    assert_eq!(set.index_of(&dc1), Some(0));
    assert!(matches!(
        set.set(&dir, 1, dc1.clone()),
        Err(DirectoryError::AlreadyExists(_))
    ));

    let mut dest = vec![dc1.clone()];
    assert!(set.copy_to(&mut dest, 0).is_err());
    let mut dest = vec![dc1.clone(), dc1.clone(), dc1.clone()];
    set.copy_to(&mut dest, 1).unwrap();
    assert_eq!(dest[2].name(), "dc2.corp.com");

    set.remove(&dir, &renamed(&dc2, "DC2.corp.com")).unwrap();
    assert_eq!(set.len(), 1);
    set.clear(&dir).unwrap();
    assert!(set.is_empty());
    assert!(set.has_pending());
}

/// Secondary partitions take secondary instances only.
#[test]
fn test_secondary_set_membership() {
    let dir = secondary_directory();
    let manager = manager(&dir);
    let mut partition = committed_partition(&dir, AD2, PartitionKind::Secondary);
    let ad3 = ReplicaServer::find(&dir, &server(AD1), AD3).unwrap();

    let set = manager.replica_set(&mut partition).unwrap();
    assert_eq!(set.len(), 1);
    set.add(&dir, ad3).unwrap();
    assert_eq!(set.len(), 2);

    let primary = ReplicaServer::Primary(dirpart::replica::PrimaryServer {
        name: "dc1.corp.com".to_string(),
        site_name: "Site1".to_string(),
        site_dn: "CN=Site1,CN=Sites,CN=Configuration,DC=corp,DC=com".to_string(),
        server_dn: "CN=dc1,CN=Servers,CN=Site1,CN=Sites,CN=Configuration,DC=corp,DC=com".to_string(),
        ntdsa_dn: "CN=NTDS Settings,CN=dc1,CN=Servers,CN=Site1,CN=Sites,CN=Configuration,DC=corp,DC=com"
            .to_string(),
        version: dirpart::replica::ServerVersion::new(10, 0),
    });
    assert!(matches!(
        set.add(&dir, primary),
        Err(DirectoryError::InvalidArgument { .. })
    ));

    manager.commit(&mut partition).unwrap();
    let cross_ref = partition.cross_reference_dn().unwrap();
    assert_eq!(dir.inspect_attribute(AD1, cross_ref, attr::REPLICA_LOCATIONS).len(), 1);
}

// =============================================================================
// Site binding
// =============================================================================

/// A bridgehead from another site is rejected.
#[test]
fn test_site_set_rejects_foreign_server() {
    let dir = primary_directory();
    let ctx = server("dc1");
    let site = SiteRef::find(&dir, &ctx, "Site1").unwrap();
    let mut bridgeheads = site.bridgeheads(&dir, &ctx, Transport::Primary).unwrap();
    let dc3 = find(&dir, "dc3.corp.com");

    let err = bridgeheads.add(&dir, dc3.clone()).unwrap_err();
    assert!(matches!(err, DirectoryError::InvalidArgument { .. }));
    assert!(bridgeheads.is_empty());
    assert!(dir.inspect_attribute("dc1", dc3.server_dn(), attr::BRIDGEHEAD_TRANSPORT_LIST).is_empty());
}

/// Bridgehead changes are written immediately; clearing undoes every add.
#[test]
fn test_site_set_writes_through_and_clears() {
    let dir = primary_directory();
    let ctx = server("dc1");
    let site = SiteRef::find(&dir, &ctx, "Site1").unwrap();
    let dc1 = find(&dir, "dc1.corp.com");
    let dc2 = find(&dir, "dc2.corp.com");

    let mut bridgeheads = site.bridgeheads(&dir, &ctx, Transport::Primary).unwrap();
    bridgeheads.add(&dir, dc1.clone()).unwrap();
    bridgeheads.add(&dir, dc2.clone()).unwrap();
    assert!(!bridgeheads.has_pending());
    assert_eq!(
        dir.inspect_attribute("dc1", dc1.server_dn(), attr::BRIDGEHEAD_TRANSPORT_LIST).len(),
        1
    );

    let reloaded = site.bridgeheads(&dir, &ctx, Transport::Primary).unwrap();
    assert_eq!(reloaded.len(), 2);
    assert!(site.bridgeheads(&dir, &ctx, Transport::Alternate).unwrap().is_empty());

    bridgeheads.clear(&dir).unwrap();
    assert!(bridgeheads.is_empty());
    for server in [&dc1, &dc2] {
        assert!(dir
            .inspect_attribute("dc1", server.server_dn(), attr::BRIDGEHEAD_TRANSPORT_LIST)
            .is_empty());
    }
    assert!(site.bridgeheads(&dir, &ctx, Transport::Primary).unwrap().is_empty());
}

/// A bridgehead write the server cannot take leaves the set unchanged.
#[test]
fn test_site_set_write_failure_keeps_membership() {
    let dir = primary_directory();
    let ctx = server("dc1");
    let site = SiteRef::find(&dir, &ctx, "Site1").unwrap();
    let dc2 = find(&dir, "dc2.corp.com");
    dir.inject_fault(
        Fault::new(StoreOp::Commit, RawError::store(codes::DS_SERVER_DOWN, "server down")).on_dn("CN=dc2,"),
    )
    .unwrap();

    let mut bridgeheads = site.bridgeheads(&dir, &ctx, Transport::Primary).unwrap();
    let err = bridgeheads.add(&dir, dc2.clone()).unwrap_err();
    assert!(matches!(err, DirectoryError::ServerUnavailable { .. }));
    assert_eq!(bridgeheads.len(), 0);
    assert!(!bridgeheads.contains(&dc2));
    assert!(dir
        .inspect_attribute("dc1", dc2.server_dn(), attr::BRIDGEHEAD_TRANSPORT_LIST)
        .is_empty());

    bridgeheads.add(&dir, dc2).unwrap();
    assert_eq!(bridgeheads.len(), 1);
}

#[test]
fn test_unknown_site_not_found() {
    let dir = primary_directory();
    assert!(matches!(
        SiteRef::find(&dir, &server("dc1"), "Site9"),
        Err(DirectoryError::NotFound { .. })
    ));
    assert!(matches!(
        SiteRef::find(&dir, &server("dc1"), ""),
        Err(DirectoryError::InvalidArgument { .. })
    ));
}
