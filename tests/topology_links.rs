//! Site Link Tests
//!
//! - Defaults reported when nothing is stored
//! - Rejected values leave the stored value alone
//! - Only saved links can be deleted
//! - Options, schedule and site membership survive a reload
//! - Store failures surface classified and leave the link as it was

mod common;

use chrono::{Duration, Weekday};

use common::*;
use dirpart::config::LinkPolicy;
use dirpart::error::{codes, DirectoryError, RawError};
use dirpart::store::wellknown::attr;
use dirpart::store::{Fault, InMemoryDirectory, StoreOp};
use dirpart::topology::{LinkOptions, QuarterHour, Schedule, SiteRef, TopologyLink, Transport};

fn new_link<'a>(dir: &'a InMemoryDirectory, name: &str) -> TopologyLink<'a> {
    TopologyLink::create(dir, &server("dc1"), name, Transport::Primary, LinkPolicy::default()).unwrap()
}

fn reload<'a>(dir: &'a InMemoryDirectory, name: &str) -> TopologyLink<'a> {
    TopologyLink::find_by_name(dir, &server("dc1"), name, Transport::Primary).unwrap()
}

// =============================================================================
// Values
// =============================================================================

/// A link without stored values reports cost 0 and a 15 minute interval.
#[test]
fn test_defaults_without_stored_values() {
    let dir = primary_directory();
    let mut link = new_link(&dir, "Site1-Site2");
    link.save().unwrap();

    let link = reload(&dir, "Site1-Site2");
    assert_eq!(link.cost().unwrap(), 0);
    assert_eq!(link.replication_interval().unwrap(), Duration::minutes(15));
    assert!(!link.notification_enabled().unwrap());
    assert!(!link.reciprocal_replication_enabled().unwrap());
    assert!(link.data_compression_enabled().unwrap());
}

/// A negative cost is rejected and the previous cost kept.
#[test]
fn test_negative_cost_keeps_previous_value() {
    let dir = primary_directory();
    let mut link = new_link(&dir, "Site1-Site2");
    link.set_cost(250).unwrap();

    let err = link.set_cost(-1).unwrap_err();
    assert!(matches!(err, DirectoryError::InvalidArgument { .. }));
    assert_eq!(link.cost().unwrap(), 250);

    link.save().unwrap();
    assert_eq!(reload(&dir, "Site1-Site2").cost().unwrap(), 250);
}

#[test]
fn test_recommended_defaults_are_saved() {
    let dir = primary_directory();
    let policy = LinkPolicy {
        recommended_defaults: true,
    };
    let mut link = TopologyLink::create(&dir, &server("dc1"), "Site1-Site2", Transport::Primary, policy).unwrap();
    link.save().unwrap();

    let link = reload(&dir, "Site1-Site2");
    assert_eq!(link.cost().unwrap(), LinkPolicy::RECOMMENDED_COST);
    assert_eq!(
        link.replication_interval().unwrap(),
        Duration::minutes(LinkPolicy::RECOMMENDED_INTERVAL_MINUTES)
    );
}

/// Toggling one option leaves the others, and unknown bits, untouched.
#[test]
fn test_options_round_trip() {
    let dir = primary_directory();
    let mut link = new_link(&dir, "Site1-Site2");
    link.set_options(LinkOptions::from_bits_retain(0x40)).unwrap();
    link.set_notification_enabled(true).unwrap();
    link.set_reciprocal_replication_enabled(true).unwrap();
    link.set_data_compression_enabled(false).unwrap();
    link.save().unwrap();

    let mut link = reload(&dir, "Site1-Site2");
    assert_eq!(link.options().unwrap().bits(), 0x40 | 0x1 | 0x2 | 0x4);
    assert!(!link.data_compression_enabled().unwrap());

    link.set_reciprocal_replication_enabled(false).unwrap();
    assert!(link.notification_enabled().unwrap());
    assert!(!link.reciprocal_replication_enabled().unwrap());
    assert!(link.options().unwrap().contains(LinkOptions::from_bits_retain(0x40)));
}

#[test]
fn test_schedule_round_trip() {
    let dir = primary_directory();
    let mut schedule = Schedule::new();
    schedule
        .set_range(Weekday::Mon, 8, QuarterHour::Zero, 17, QuarterHour::FortyFive)
        .unwrap();

    let mut link = new_link(&dir, "Site1-Site2");
    link.set_schedule(Some(&schedule)).unwrap();
    link.save().unwrap();

    let mut link = reload(&dir, "Site1-Site2");
    let stored = link.schedule().unwrap().unwrap();
    assert_eq!(stored, schedule);
    assert!(stored.is_available(Weekday::Mon, 17, QuarterHour::FortyFive).unwrap());
    assert!(!stored.is_available(Weekday::Mon, 18, QuarterHour::Zero).unwrap());
    assert!(!stored.is_available(Weekday::Tue, 9, QuarterHour::Zero).unwrap());

    link.set_schedule(None).unwrap();
    link.save().unwrap();
    assert!(reload(&dir, "Site1-Site2").schedule().unwrap().is_none());
}

// =============================================================================
// Sites
// =============================================================================

#[test]
fn test_site_membership() {
    let dir = primary_directory();
    let ctx = server("dc1");
    let site1 = SiteRef::find(&dir, &ctx, "Site1").unwrap();
    let site2 = SiteRef::find(&dir, &ctx, "Site2").unwrap();

    let mut link = new_link(&dir, "Site1-Site2");
    assert!(link.sites().unwrap().is_empty());
    link.add_site(site1.clone()).unwrap();
    link.add_site(site2).unwrap();
    assert!(matches!(
        link.add_site(site1.clone()),
        Err(DirectoryError::AlreadyExists(_))
    ));
    link.save().unwrap();

    let mut link = reload(&dir, "Site1-Site2");
    let names: Vec<_> = link.sites().unwrap().iter().map(|s| s.name.clone()).collect();
    assert_eq!(names, vec!["Site1", "Site2"]);

    link.remove_site("site2").unwrap();
    assert!(matches!(
        link.remove_site("Site9"),
        Err(DirectoryError::NotFound { .. })
    ));
    link.save().unwrap();
    assert_eq!(reload(&dir, "Site1-Site2").sites().unwrap(), &[site1][..]);
}

// =============================================================================
// Lifecycle
// =============================================================================

/// Deleting an unsaved link is rejected; a saved link can be deleted.
#[test]
fn test_delete_requires_save() {
    let dir = primary_directory();
    let mut link = new_link(&dir, "Site1-Site2");
    let dn = link.dn().to_string();

    assert!(matches!(link.delete(), Err(DirectoryError::InvalidState(_))));
    assert!(!link.is_existing());
    assert!(!dir.has_entry("dc1", &dn));

    link.save().unwrap();
    assert!(link.is_existing());
    assert!(dir.has_entry("dc1", &dn));

    link.delete().unwrap();
    assert!(!dir.has_entry("dc1", &dn));
    assert!(matches!(
        TopologyLink::find_by_name(&dir, &server("dc1"), "Site1-Site2", Transport::Primary),
        Err(DirectoryError::NotFound { .. })
    ));
}

#[test]
fn test_find_missing_link() {
    let dir = primary_directory();
    let err = TopologyLink::find_by_name(&dir, &server("dc1"), "Nowhere", Transport::Primary).unwrap_err();
    assert!(matches!(err, DirectoryError::NotFound { .. }));
    assert!(matches!(
        TopologyLink::find_by_name(&dir, &server("dc1"), "", Transport::Primary),
        Err(DirectoryError::InvalidArgument { .. })
    ));
}

/// Links live under their transport; the same name may exist under both.
#[test]
fn test_transports_are_separate() {
    let dir = primary_directory();
    let ctx = server("dc1");
    let mut ip = new_link(&dir, "Backup");
    ip.save().unwrap();

    assert!(TopologyLink::find_by_name(&dir, &ctx, "Backup", Transport::Alternate).is_err());
    let mut smtp = TopologyLink::create(&dir, &ctx, "Backup", Transport::Alternate, LinkPolicy::default()).unwrap();
    smtp.save().unwrap();
    assert_ne!(ip.dn(), smtp.dn());

    let description = reload(&dir, "Backup").describe().unwrap();
    assert_eq!(description.transport, Transport::Primary);
    assert!(description.existing);
}

#[test]
fn test_alternate_transport_on_secondary() {
    let dir = secondary_directory();
    let err = TopologyLink::create(&dir, &server(AD1), "LinkA", Transport::Alternate, LinkPolicy::default())
        .unwrap_err();
    assert!(matches!(err, DirectoryError::NotSupported(_)));

    let mut link = TopologyLink::create(&dir, &server(AD1), "LinkA", Transport::Primary, LinkPolicy::default())
        .unwrap();
    link.save().unwrap();
    assert!(link.is_existing());
}

// =============================================================================
// Store failures
// =============================================================================

/// A busy server reads as unavailable, not as a default cost.
#[test]
fn test_busy_server_on_read_is_unavailable() {
    let dir = primary_directory();
    let mut link = new_link(&dir, "Site1-Site2");
    link.set_cost(250).unwrap();
    link.save().unwrap();

    let link = reload(&dir, "Site1-Site2");
    dir.inject_fault(
        Fault::new(StoreOp::GetAttribute, RawError::store(codes::DS_BUSY, "busy"))
            .on_dn("CN=Site1-Site2")
            .on_attribute(attr::COST),
    )
    .unwrap();

    let err = link.cost().unwrap_err();
    assert!(matches!(err, DirectoryError::ServerUnavailable { .. }));
    assert!(err.is_retryable());
    assert_eq!(link.cost().unwrap(), 250);
}

/// A refused first save leaves the link unsaved and absent from the store.
#[test]
fn test_denied_save_leaves_link_new() {
    let dir = primary_directory();
    let mut link = new_link(&dir, "Site1-Site2");
    let dn = link.dn().to_string();
    dir.inject_fault(
        Fault::new(StoreOp::Commit, RawError::store(codes::ACCESS_DENIED, "access denied"))
            .on_dn("CN=Site1-Site2"),
    )
    .unwrap();

    assert!(matches!(link.save(), Err(DirectoryError::AccessDenied(_))));
    assert!(!link.is_existing());
    assert!(!dir.has_entry("dc1", &dn));
    assert!(matches!(
        TopologyLink::find_by_name(&dir, &server("dc1"), "Site1-Site2", Transport::Primary),
        Err(DirectoryError::NotFound { .. })
    ));

    link.save().unwrap();
    assert!(link.is_existing());
}
