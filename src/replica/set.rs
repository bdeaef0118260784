//! Replica sets
//!
//! An ordered, duplicate-free list of servers bound either to a partition's
//! cross-reference or to a site:
//! - Membership rules are checked before anything changes
//! - Cross-reference-bound changes are queued until the partition is saved
//! - Site-bound changes are written to each server immediately
//! - Equality is case-insensitive server name throughout
//!
//! The set holds no handle back to its owner; the store is passed per call.

use std::slice;

use crate::error::{Classify, DirectoryError, DirectoryResult};
use crate::observability::{log_event_with_fields, Event};
use crate::store::wellknown::attr;
use crate::store::{AttributeValue, DirectoryContext, DirectoryStore, Modification, Technology};

use super::server::{ReplicaServer, ServerVersion};

/// What a replica set is persisted on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// Replica locations on a partition's cross-reference
    CrossReference {
        technology: Technology,
        min_version: ServerVersion,
    },
    /// Bridgehead servers of one site for one transport
    Site { site_dn: String, transport_dn: String },
}

#[derive(Debug, Clone)]
pub struct ReplicaSet {
    context: DirectoryContext,
    binding: Binding,
    members: Vec<ReplicaServer>,
    pending: Vec<Modification>,
}

impl ReplicaSet {
    /// A set persisted on a cross-reference, starting from `members`.
    pub fn for_cross_reference(
        context: DirectoryContext,
        technology: Technology,
        min_version: ServerVersion,
        members: Vec<ReplicaServer>,
    ) -> Self {
        Self {
            context,
            binding: Binding::CrossReference {
                technology,
                min_version,
            },
            members,
            pending: Vec::new(),
        }
    }

    /// A set of bridgeheads persisted on each member's server object.
    pub fn for_site(
        context: DirectoryContext,
        site_dn: impl Into<String>,
        transport_dn: impl Into<String>,
        members: Vec<ReplicaServer>,
    ) -> Self {
        Self {
            context,
            binding: Binding::Site {
                site_dn: site_dn.into(),
                transport_dn: transport_dn.into(),
            },
            members,
            pending: Vec::new(),
        }
    }

    pub fn binding(&self) -> &Binding {
        &self.binding
    }

    // ==================
    // Read access
    // ==================

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ReplicaServer> {
        self.members.get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, ReplicaServer> {
        self.members.iter()
    }

    pub fn index_of(&self, server: &ReplicaServer) -> Option<usize> {
        self.index_of_name(server.name())
    }

    pub fn index_of_name(&self, name: &str) -> Option<usize> {
        self.members.iter().position(|m| m.name().eq_ignore_ascii_case(name))
    }

    pub fn contains(&self, server: &ReplicaServer) -> bool {
        self.index_of(server).is_some()
    }

    /// Copy members into `dest` starting at `index`.
    pub fn copy_to(&self, dest: &mut [ReplicaServer], index: usize) -> DirectoryResult<()> {
        let end = index
            .checked_add(self.members.len())
            .filter(|end| *end <= dest.len())
            .ok_or_else(|| DirectoryError::invalid_argument("index", "destination is too small"))?;
        dest[index..end].clone_from_slice(&self.members);
        Ok(())
    }

    // ==================
    // Mutation
    // ==================

    /// Append a server; returns its index.
    pub fn add(&mut self, store: &dyn DirectoryStore, server: ReplicaServer) -> DirectoryResult<usize> {
        self.check_new_member(&server)?;
        self.persist_add(store, &server)?;
        self.members.push(server);
        Ok(self.members.len() - 1)
    }

    /// Insert a server at `index` (at most `len()`).
    pub fn insert(&mut self, store: &dyn DirectoryStore, index: usize, server: ReplicaServer) -> DirectoryResult<()> {
        if index > self.members.len() {
            return Err(DirectoryError::invalid_argument("index", "out of range"));
        }
        self.check_new_member(&server)?;
        self.persist_add(store, &server)?;
        self.members.insert(index, server);
        Ok(())
    }

    /// Append several servers. Every one is validated before any is added.
    pub fn add_range(&mut self, store: &dyn DirectoryStore, servers: Vec<ReplicaServer>) -> DirectoryResult<()> {
        for (i, server) in servers.iter().enumerate() {
            self.check_new_member(server)?;
            if servers[..i].iter().any(|s| s.same_name(server)) {
                return Err(DirectoryError::already_exists(server.name()));
            }
        }
        for server in servers {
            self.persist_add(store, &server)?;
            self.members.push(server);
        }
        Ok(())
    }

    /// Replace the member at `index`.
    pub fn set(&mut self, store: &dyn DirectoryStore, index: usize, server: ReplicaServer) -> DirectoryResult<()> {
        if index >= self.members.len() {
            return Err(DirectoryError::invalid_argument("index", "out of range"));
        }
        self.check_new_member(&server)?;
        let previous = self.members[index].clone();
        self.persist_remove(store, &previous)?;
        self.persist_add(store, &server)?;
        self.members[index] = server;
        Ok(())
    }

    /// Remove a server by name.
    pub fn remove(&mut self, store: &dyn DirectoryStore, server: &ReplicaServer) -> DirectoryResult<()> {
        let index = self
            .index_of(server)
            .ok_or_else(|| DirectoryError::not_found("Replica", server.name()))?;
        let member = self.members[index].clone();
        self.persist_remove(store, &member)?;
        self.members.remove(index);
        Ok(())
    }

    /// Remove every member. A site-bound set clears the transport
    /// attribute on every former member.
    pub fn clear(&mut self, store: &dyn DirectoryStore) -> DirectoryResult<()> {
        if matches!(self.binding, Binding::CrossReference { .. }) {
            self.pending.push(Modification::Clear {
                name: attr::REPLICA_LOCATIONS.to_string(),
            });
            self.members.clear();
            return Ok(());
        }
        while let Some(member) = self.members.last().cloned() {
            self.persist_remove(store, &member)?;
            self.members.pop();
        }
        Ok(())
    }

    // ==================
    // Pending cross-reference changes
    // ==================

    /// Queued changes for the cross-reference
    pub fn pending(&self) -> &[Modification] {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Forget queued changes once they have been written.
    pub fn mark_flushed(&mut self) {
        self.pending.clear();
    }

    // ==================
    // Rules and persistence
    // ==================

    fn check_new_member(&self, server: &ReplicaServer) -> DirectoryResult<()> {
        match (&self.binding, server) {
            (
                Binding::CrossReference {
                    technology: Technology::Primary,
                    min_version,
                },
                ReplicaServer::Primary(primary),
            ) => {
                if primary.version < *min_version {
                    return Err(DirectoryError::invalid_argument(
                        "server",
                        format!(
                            "{} runs version {}; at least {} is required",
                            primary.name, primary.version, min_version
                        ),
                    ));
                }
            }
            (Binding::CrossReference { technology: Technology::Primary, .. }, ReplicaServer::Secondary(_)) => {
                return Err(DirectoryError::invalid_argument(
                    "server",
                    "must be a primary-technology server",
                ));
            }
            (Binding::CrossReference { technology: Technology::Secondary, .. }, ReplicaServer::Secondary(_)) => {}
            (Binding::CrossReference { technology: Technology::Secondary, .. }, ReplicaServer::Primary(_)) => {
                return Err(DirectoryError::invalid_argument(
                    "server",
                    "must be a secondary-technology instance",
                ));
            }
            (Binding::Site { site_dn, .. }, server) => {
                if !crate::store::dn::dn_equals(server.site_dn(), site_dn) {
                    return Err(DirectoryError::invalid_argument(
                        "server",
                        format!("{} is in site {}, not {}", server.name(), server.site_dn(), site_dn),
                    ));
                }
            }
        }

        if self.contains(server) {
            return Err(DirectoryError::already_exists(server.name()));
        }
        Ok(())
    }

    fn persist_add(&mut self, store: &dyn DirectoryStore, server: &ReplicaServer) -> DirectoryResult<()> {
        match &self.binding {
            Binding::CrossReference { .. } => {
                self.pending.push(Modification::Add {
                    name: attr::REPLICA_LOCATIONS.to_string(),
                    value: server.ntdsa_dn().into(),
                });
                Ok(())
            }
            Binding::Site { transport_dn, .. } => {
                let value = vec![AttributeValue::from(transport_dn.as_str())];
                self.write_bridgehead(store, server, value)
            }
        }
    }

    fn persist_remove(&mut self, store: &dyn DirectoryStore, server: &ReplicaServer) -> DirectoryResult<()> {
        match &self.binding {
            Binding::CrossReference { .. } => {
                self.pending.push(Modification::Remove {
                    name: attr::REPLICA_LOCATIONS.to_string(),
                    value: server.ntdsa_dn().into(),
                });
                Ok(())
            }
            Binding::Site { .. } => self.write_bridgehead(store, server, Vec::new()),
        }
    }

    fn write_bridgehead(
        &self,
        store: &dyn DirectoryStore,
        server: &ReplicaServer,
        values: Vec<AttributeValue>,
    ) -> DirectoryResult<()> {
        let ctx = &self.context;
        let mut entry = store.get(ctx, server.server_dn()).classified(ctx)?;
        store
            .set_attribute(&mut entry, attr::BRIDGEHEAD_TRANSPORT_LIST, values)
            .classified(ctx)?;
        store.commit(ctx, &mut entry).classified(ctx)?;
        log_event_with_fields(Event::BridgeheadUpdated, &[("server", server.name())]);
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ReplicaSet {
    type Item = &'a ReplicaServer;
    type IntoIter = slice::Iter<'a, ReplicaServer>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.iter()
    }
}
