//! Partition state
//!
//! A `Partition` is a plain value; every store interaction goes through
//! `PartitionManager`.

use std::fmt;

use serde::Serialize;

use crate::error::{DirectoryError, DirectoryResult};
use crate::replica::ReplicaSet;
use crate::store::{DirectoryContext, Entry, Technology};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionKind {
    /// Cross-reference created by the server when the head is committed
    Primary,
    /// Cross-reference always created explicitly
    Secondary,
}

impl PartitionKind {
    pub fn technology(&self) -> Technology {
        match self {
            PartitionKind::Primary => Technology::Primary,
            PartitionKind::Secondary => Technology::Secondary,
        }
    }
}

impl From<Technology> for PartitionKind {
    fn from(technology: Technology) -> Self {
        match technology {
            Technology::Primary => PartitionKind::Primary,
            Technology::Secondary => PartitionKind::Secondary,
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.technology().as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Uncommitted,
    Committed,
}

#[derive(Debug)]
pub struct Partition {
    /// Bound to the server hosting (or about to host) the partition
    pub(crate) context: DirectoryContext,
    pub(crate) dn: String,
    pub(crate) dns_name: String,
    pub(crate) kind: PartitionKind,
    pub(crate) lifecycle: Lifecycle,
    /// Head entry until the partition is committed
    pub(crate) head: Option<Entry>,
    pub(crate) cross_ref_dn: Option<String>,
    pub(crate) security_reference_domain: Option<String>,
    pub(crate) security_reference_modified: bool,
    pub(crate) replica_set: Option<ReplicaSet>,
}

impl Partition {
    pub(crate) fn uncommitted(
        context: DirectoryContext,
        dn: impl Into<String>,
        dns_name: impl Into<String>,
        kind: PartitionKind,
        head: Entry,
    ) -> Self {
        Self {
            context,
            dn: dn.into(),
            dns_name: dns_name.into(),
            kind,
            lifecycle: Lifecycle::Uncommitted,
            head: Some(head),
            cross_ref_dn: None,
            security_reference_domain: None,
            security_reference_modified: false,
            replica_set: None,
        }
    }

    pub(crate) fn committed(
        context: DirectoryContext,
        dn: impl Into<String>,
        dns_name: impl Into<String>,
        kind: PartitionKind,
        cross_ref_dn: impl Into<String>,
        security_reference_domain: Option<String>,
    ) -> Self {
        Self {
            context,
            dn: dn.into(),
            dns_name: dns_name.into(),
            kind,
            lifecycle: Lifecycle::Committed,
            head: None,
            cross_ref_dn: Some(cross_ref_dn.into()),
            security_reference_domain,
            security_reference_modified: false,
            replica_set: None,
        }
    }

    /// Distinguished name of the partition head
    pub fn dn(&self) -> &str {
        &self.dn
    }

    /// DNS-style name
    pub fn name(&self) -> &str {
        &self.dns_name
    }

    pub fn kind(&self) -> PartitionKind {
        self.kind
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn is_committed(&self) -> bool {
        self.lifecycle == Lifecycle::Committed
    }

    /// Context bound to the hosting server
    pub fn context(&self) -> &DirectoryContext {
        &self.context
    }

    pub fn cross_reference_dn(&self) -> Option<&str> {
        self.cross_ref_dn.as_deref()
    }

    /// Loaded replica set, if it has been accessed
    pub fn loaded_replica_set(&self) -> Option<&ReplicaSet> {
        self.replica_set.as_ref()
    }

    pub fn security_reference_domain(&self) -> DirectoryResult<Option<&str>> {
        self.check_security_reference_supported()?;
        Ok(self.security_reference_domain.as_deref())
    }

    /// Buffer a new security reference domain; written on the next commit.
    /// `None` clears it.
    pub fn set_security_reference_domain(&mut self, domain: Option<&str>) -> DirectoryResult<()> {
        self.check_security_reference_supported()?;
        if let Some(domain) = domain {
            if domain.trim().is_empty() {
                return Err(DirectoryError::empty_argument("security_reference_domain"));
            }
        }
        self.security_reference_domain = domain.map(str::to_string);
        self.security_reference_modified = true;
        Ok(())
    }

    /// True when changes are waiting for the next commit
    pub fn has_pending_changes(&self) -> bool {
        self.security_reference_modified
            || self.replica_set.as_ref().map_or(false, ReplicaSet::has_pending)
    }

    fn check_security_reference_supported(&self) -> DirectoryResult<()> {
        match self.kind {
            PartitionKind::Primary => Ok(()),
            PartitionKind::Secondary => Err(DirectoryError::not_supported(
                "security reference domains exist only on primary partitions",
            )),
        }
    }

    pub fn summary(&self) -> PartitionSummary {
        PartitionSummary {
            dn: self.dn.clone(),
            name: self.dns_name.clone(),
            kind: self.kind,
            lifecycle: self.lifecycle,
            server: self.context.target().to_string(),
            cross_reference: self.cross_ref_dn.clone(),
            security_reference_domain: match self.kind {
                PartitionKind::Primary => self.security_reference_domain.clone(),
                PartitionKind::Secondary => None,
            },
        }
    }
}

/// Serializable view of a partition
#[derive(Debug, Clone, Serialize)]
pub struct PartitionSummary {
    pub dn: String,
    pub name: String,
    pub kind: PartitionKind,
    pub lifecycle: Lifecycle,
    pub server: String,
    pub cross_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_reference_domain: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition(kind: PartitionKind) -> Partition {
        Partition::committed(
            DirectoryContext::server("dc1.corp.com"),
            "DC=apps,DC=corp,DC=com",
            "apps.corp.com",
            kind,
            "CN={0},CN=Partitions,CN=Configuration,DC=corp,DC=com",
            None,
        )
    }

    #[test]
    fn test_security_reference_buffered() {
        let mut p = partition(PartitionKind::Primary);
        assert!(!p.has_pending_changes());
        p.set_security_reference_domain(Some("DC=corp,DC=com")).unwrap();
        assert!(p.has_pending_changes());
        assert_eq!(p.security_reference_domain().unwrap(), Some("DC=corp,DC=com"));
    }

    #[test]
    fn test_security_reference_unsupported_on_secondary() {
        let mut p = partition(PartitionKind::Secondary);
        assert!(matches!(p.security_reference_domain(), Err(DirectoryError::NotSupported(_))));
        assert!(matches!(
            p.set_security_reference_domain(Some("DC=corp,DC=com")),
            Err(DirectoryError::NotSupported(_))
        ));
    }

    #[test]
    fn test_empty_security_reference_rejected() {
        let mut p = partition(PartitionKind::Primary);
        assert!(p.set_security_reference_domain(Some("")).is_err());
        assert!(!p.has_pending_changes());
    }

    #[test]
    fn test_kind_from_technology() {
        assert_eq!(PartitionKind::from(Technology::Secondary), PartitionKind::Secondary);
        assert_eq!(PartitionKind::Primary.to_string(), "primary");
    }
}
