//! Partition lifecycle
//!
//! Commit protocol for a new partition:
//! 1. Primary kind: commit the head and let the server provision the
//!    cross-reference. A refusal with "inappropriate authentication" falls
//!    back to the explicit path when the policy allows it.
//! 2. Explicit path: reuse a cross-reference already naming the partition at
//!    the role owner, or create a disabled one there.
//! 3. Commit the head. On failure a cross-reference created in step 2 is
//!    deleted again and the original error is returned.
//! 4. Refresh the cross-reference at the role owner.
//! 5. Push the enabled cross-reference from the hosting server to the role
//!    owner.
//! 6. Mark the partition committed, then write buffered replica and security
//!    reference changes.
//!
//! Nothing here is atomic. A crash between steps 2 and 3 leaves a disabled
//! cross-reference behind.

use uuid::Uuid;

use crate::config::PartitionPolicy;
use crate::coordinator::{CoordinatorRef, RoleCoordinator};
use crate::error::{codes, Classify, DirectoryError, DirectoryResult, ErrorClassifier, RawError};
use crate::observability::{log_event_with_fields, Event, ObservationScope};
use crate::replica::{ReplicaServer, ReplicaSet};
use crate::store::wellknown::{attr, class, flags, partitions_container, sites_container};
use crate::store::{
    DirectoryContext, DirectoryStore, DistinguishedName, Entry, Filter, LocatorFlags, LocatorService, RootInfo,
    SearchScope, Technology,
};

use super::partition::{Lifecycle, Partition, PartitionKind};

/// Cross-references of non-domain naming contexts named `dn`
fn cross_ref_filter(dn: &str) -> Filter {
    Filter::And(vec![
        Filter::eq("objectCategory", class::CROSS_REF),
        Filter::bit_or(attr::SYSTEM_FLAGS, flags::CR_NTDS_NC),
        Filter::not(Filter::bit_and(attr::SYSTEM_FLAGS, flags::CR_NTDS_DOMAIN)),
        Filter::eq(attr::NC_NAME, dn),
    ])
}

fn check_site(site: Option<&str>) -> DirectoryResult<()> {
    match site {
        Some(s) if s.is_empty() => Err(DirectoryError::empty_argument("site")),
        _ => Ok(()),
    }
}

fn require_committed(partition: &Partition) -> DirectoryResult<()> {
    if !partition.is_committed() {
        return Err(DirectoryError::uncommitted());
    }
    Ok(())
}

/// Outcome of the explicit cross-reference path
struct ExplicitCrossRef {
    entry: Entry,
    /// Created by this commit, so removed again on failure
    provisioned: bool,
}

pub struct PartitionManager<'a> {
    store: &'a dyn DirectoryStore,
    locator: &'a dyn LocatorService,
    policy: PartitionPolicy,
}

impl<'a> PartitionManager<'a> {
    pub fn new(store: &'a dyn DirectoryStore, locator: &'a dyn LocatorService, policy: PartitionPolicy) -> Self {
        Self { store, locator, policy }
    }

    pub fn policy(&self) -> &PartitionPolicy {
        &self.policy
    }

    fn roles(&self) -> RoleCoordinator<'a> {
        RoleCoordinator::new(self.store)
    }

    // ==================
    // Creation
    // ==================

    /// Start a new partition on the server `context` names.
    ///
    /// The result is uncommitted; nothing exists in the store until `commit`.
    pub fn create(&self, context: &DirectoryContext, dn: &str, kind: PartitionKind) -> DirectoryResult<Partition> {
        let (parsed, dns_name) = Self::validate_new(context, dn)?;
        let root = RootInfo::read(self.store, context)?;
        if PartitionKind::from(root.technology) != kind {
            return Err(DirectoryError::not_supported(format!(
                "{} partitions cannot be created on a {} directory",
                kind,
                root.technology.as_str()
            )));
        }
        self.open_head(context, &root, &parsed, dns_name, kind, class::DOMAIN_DNS)
    }

    /// Start a new secondary partition whose head has `object_class`.
    pub fn create_with_class(
        &self,
        context: &DirectoryContext,
        dn: &str,
        object_class: &str,
    ) -> DirectoryResult<Partition> {
        let (parsed, dns_name) = Self::validate_new(context, dn)?;
        if object_class.trim().is_empty() {
            return Err(DirectoryError::empty_argument("object_class"));
        }
        let root = RootInfo::read(self.store, context)?;
        if root.technology != PartitionKind::Secondary.technology() {
            return Err(DirectoryError::not_supported(
                "an object class can only be chosen for secondary partitions",
            ));
        }
        self.open_head(context, &root, &parsed, dns_name, PartitionKind::Secondary, object_class)
    }

    fn validate_new(context: &DirectoryContext, dn: &str) -> DirectoryResult<(DistinguishedName, String)> {
        context.validate_server()?;
        if dn.is_empty() {
            return Err(DirectoryError::empty_argument("distinguished_name"));
        }
        let parsed = DistinguishedName::parse(dn)?;
        let dns_name = parsed.to_dns_name()?;
        if parsed.len() == 1 {
            return Err(DirectoryError::not_supported("single-level partitions are not supported"));
        }
        Ok((parsed, dns_name))
    }

    fn open_head(
        &self,
        context: &DirectoryContext,
        root: &RootInfo,
        parsed: &DistinguishedName,
        dns_name: String,
        kind: PartitionKind,
        object_class: &str,
    ) -> DirectoryResult<Partition> {
        // Head creation needs the server's DNS name, not whatever alias the
        // caller used.
        let target = match kind {
            PartitionKind::Primary => context.for_server(root.dns_host_name.as_str()),
            PartitionKind::Secondary => context.clone(),
        };
        let parent = parsed
            .parent()
            .ok_or_else(|| DirectoryError::not_supported("single-level partitions are not supported"))?;

        let mut head = self
            .store
            .create_child(&target, &parent.to_string(), &parsed.rdn(), object_class)
            .classified(&target)?;
        self.store
            .set_attribute(
                &mut head,
                attr::INSTANCE_TYPE,
                vec![(flags::IT_NC_HEAD | flags::IT_WRITE).into()],
            )
            .classified(&target)?;

        Ok(Partition::uncommitted(target, parsed.to_string(), dns_name, kind, head))
    }

    // ==================
    // Commit
    // ==================

    /// Create an uncommitted partition, or write buffered changes of a
    /// committed one.
    pub fn commit(&self, partition: &mut Partition) -> DirectoryResult<()> {
        if partition.is_committed() {
            return self.flush(partition);
        }

        let scope = ObservationScope::with_fields("PARTITION_COMMIT", &[("partition", partition.dn())]);
        match self.commit_new(partition) {
            Ok(()) => {
                scope.complete();
                Ok(())
            }
            Err(e) => {
                scope.fail(&e.to_string());
                Err(e)
            }
        }
    }

    /// Same as `commit`.
    pub fn save(&self, partition: &mut Partition) -> DirectoryResult<()> {
        self.commit(partition)
    }

    fn commit_new(&self, partition: &mut Partition) -> DirectoryResult<()> {
        let context = partition.context.clone();
        let coordinator = self.roles().locate(&context)?;
        let target_root = RootInfo::read(self.store, &context)?;

        let mut head = partition
            .head
            .take()
            .ok_or_else(|| DirectoryError::invalid_state("partition has no head entry to create"))?;
        // A head already written by an earlier attempt is not created again.
        let created = if head.is_new() {
            self.create_head(partition, &mut head, &coordinator, &target_root)
        } else {
            Ok(())
        };
        partition.head = Some(head);
        created?;

        let cross_ref = self.enabled_cross_ref(&context, &target_root, partition.dn())?;
        if !partition.security_reference_modified {
            partition.security_reference_domain = cross_ref.text(attr::SD_REFERENCE_DOMAIN).map(str::to_string);
        }
        partition.cross_ref_dn = Some(cross_ref.dn().to_string());

        let pushed = self
            .roles()
            .push_replication(cross_ref.dn(), &target_root.ds_service_name, &coordinator);

        // The head exists whether or not the push went through.
        partition.lifecycle = Lifecycle::Committed;
        partition.head = None;
        pushed?;

        self.flush(partition)
    }

    fn create_head(
        &self,
        partition: &Partition,
        head: &mut Entry,
        coordinator: &CoordinatorRef,
        target_root: &RootInfo,
    ) -> DirectoryResult<()> {
        let context = &partition.context;

        if partition.kind == PartitionKind::Primary {
            match self.store.commit(context, head) {
                Ok(()) => return Ok(()),
                Err(e) if e.is(codes::DS_INAPPROPRIATE_AUTH) && self.policy.manual_cross_ref_fallback => {
                    log_event_with_fields(Event::CrossRefManualFallback, &[("partition", partition.dn())]);
                }
                Err(e) => return Err(ErrorClassifier::classify(&e, Some(context))),
            }
        }

        let ExplicitCrossRef { mut entry, provisioned } =
            self.explicit_cross_ref(partition, coordinator, target_root)?;

        if let Err(e) = self.store.commit(context, head) {
            let error = ErrorClassifier::classify(&e, Some(context));
            if provisioned {
                self.roll_back(coordinator, entry.dn(), partition.dn());
            }
            return Err(error);
        }

        let coordinator_ctx = coordinator.context();
        self.store
            .refresh(coordinator_ctx, &mut entry)
            .classified(coordinator_ctx)
    }

    fn explicit_cross_ref(
        &self,
        partition: &Partition,
        coordinator: &CoordinatorRef,
        target_root: &RootInfo,
    ) -> DirectoryResult<ExplicitCrossRef> {
        if let Some(entry) = self.coordinator_cross_ref(coordinator, partition.dn())? {
            log_event_with_fields(
                Event::CrossRefReused,
                &[("partition", partition.dn()), ("cross_ref", entry.dn())],
            );
            return Ok(ExplicitCrossRef {
                entry,
                provisioned: false,
            });
        }

        let ctx = coordinator.context();
        let target = ReplicaServer::from_ntdsa(
            self.store,
            &partition.context,
            &target_root.ds_service_name,
            target_root.technology,
        )?;
        let coordinator_root = RootInfo::read(self.store, ctx)?;

        let mut entry = self
            .store
            .create_child(
                ctx,
                &partitions_container(&coordinator_root.configuration_nc),
                &format!("CN={{{}}}", Uuid::new_v4()),
                class::CROSS_REF,
            )
            .classified(ctx)?;
        self.store
            .set_attribute(&mut entry, attr::DNS_ROOT, vec![target.name().into()])
            .classified(ctx)?;
        self.store
            .set_attribute(&mut entry, attr::ENABLED, vec![false.into()])
            .classified(ctx)?;
        self.store
            .set_attribute(&mut entry, attr::NC_NAME, vec![partition.dn().into()])
            .classified(ctx)?;
        self.store.commit(ctx, &mut entry).classified(ctx)?;

        log_event_with_fields(
            Event::CrossRefProvisioned,
            &[("partition", partition.dn()), ("cross_ref", entry.dn())],
        );
        Ok(ExplicitCrossRef {
            entry,
            provisioned: true,
        })
    }

    /// Best effort; a failure leaves a disabled orphan and is only logged.
    fn roll_back(&self, coordinator: &CoordinatorRef, cross_ref_dn: &str, partition_dn: &str) {
        let fields = [("partition", partition_dn), ("cross_ref", cross_ref_dn)];
        match self.store.delete(coordinator.context(), cross_ref_dn) {
            Ok(()) => log_event_with_fields(Event::CrossRefRolledBack, &fields),
            Err(e) => {
                let reason = e.to_string();
                log_event_with_fields(
                    Event::CrossRefRollbackFailed,
                    &[fields[0], fields[1], ("reason", reason.as_str())],
                );
            }
        }
    }

    fn coordinator_cross_ref(&self, coordinator: &CoordinatorRef, dn: &str) -> DirectoryResult<Option<Entry>> {
        let ctx = coordinator.context();
        let root = RootInfo::read(self.store, ctx)?;
        self.store
            .search(
                ctx,
                &partitions_container(&root.configuration_nc),
                &cross_ref_filter(dn),
                SearchScope::OneLevel,
            )
            .classified(ctx)
    }

    /// The cross-reference as the hosting server sees it after head creation
    fn enabled_cross_ref(&self, context: &DirectoryContext, root: &RootInfo, dn: &str) -> DirectoryResult<Entry> {
        let filter = Filter::And(vec![cross_ref_filter(dn), Filter::eq(attr::ENABLED, "TRUE")]);
        self.store
            .search(
                context,
                &partitions_container(&root.configuration_nc),
                &filter,
                SearchScope::OneLevel,
            )
            .classified(context)?
            .ok_or_else(|| DirectoryError::operation_failed(0, format!("no enabled cross-reference names {}", dn)))
    }

    /// Write buffered replica and security reference changes to the
    /// cross-reference at the role owner.
    ///
    /// Changes already written are not undone if a later commit fails.
    fn flush(&self, partition: &mut Partition) -> DirectoryResult<()> {
        if !partition.has_pending_changes() {
            return Ok(());
        }

        let coordinator = self.roles().locate(&partition.context)?;
        let ctx = coordinator.context();
        let cross_ref_dn = match &partition.cross_ref_dn {
            Some(dn) => dn.clone(),
            None => self
                .coordinator_cross_ref(&coordinator, partition.dn())?
                .map(|e| e.dn().to_string())
                .ok_or_else(|| DirectoryError::not_found("Partition", partition.dn()))?,
        };

        let mut entry = self.store.get(ctx, &cross_ref_dn).classified(ctx)?;
        if let Some(set) = &partition.replica_set {
            for modification in set.pending() {
                entry.push(modification.clone());
            }
        }
        if partition.security_reference_modified {
            let value = partition
                .security_reference_domain
                .clone()
                .map(|d| vec![d.into()])
                .unwrap_or_default();
            self.store
                .set_attribute(&mut entry, attr::SD_REFERENCE_DOMAIN, value)
                .classified(ctx)?;
        }
        self.store.commit(ctx, &mut entry).classified(ctx)?;

        if let Some(set) = partition.replica_set.as_mut() {
            set.mark_flushed();
        }
        partition.security_reference_modified = false;
        log_event_with_fields(Event::CrossRefFlushed, &[("partition", partition.dn())]);
        Ok(())
    }

    // ==================
    // Deletion
    // ==================

    /// Remove the partition's cross-reference at the role owner.
    pub fn delete(&self, partition: &Partition) -> DirectoryResult<()> {
        require_committed(partition)?;
        let scope = ObservationScope::with_fields("PARTITION_DELETE", &[("partition", partition.dn())]);
        match self.delete_cross_ref(partition) {
            Ok(()) => {
                scope.complete();
                Ok(())
            }
            Err(e) => {
                scope.fail(&e.to_string());
                Err(e)
            }
        }
    }

    fn delete_cross_ref(&self, partition: &Partition) -> DirectoryResult<()> {
        let coordinator = self.roles().locate(&partition.context)?;
        let cross_ref_dn = self
            .coordinator_cross_ref(&coordinator, partition.dn())?
            .map(|e| e.dn().to_string())
            .ok_or_else(|| DirectoryError::not_found("Partition", partition.dn()))?;
        let ctx = coordinator.context();
        self.store.delete(ctx, &cross_ref_dn).classified(ctx)
    }

    // ==================
    // Lookup
    // ==================

    /// Look up a committed partition by distinguished name.
    ///
    /// A server context must name a server that hosts the partition.
    pub fn find_by_name(&self, context: &DirectoryContext, dn: &str) -> DirectoryResult<Partition> {
        context.validate()?;
        if dn.is_empty() {
            return Err(DirectoryError::empty_argument("distinguished_name"));
        }
        let parsed = DistinguishedName::parse(dn)?;

        let scope = ObservationScope::with_fields("PARTITION_FIND", &[("partition", dn)]);
        match self.find_committed(context, &parsed) {
            Ok(partition) => {
                scope.complete_with_fields(&[("server", partition.context.target())]);
                Ok(partition)
            }
            Err(e) => {
                scope.fail(&e.to_string());
                Err(e)
            }
        }
    }

    /// Look up a committed partition by DNS name. An unreachable server
    /// reads as a missing partition.
    pub fn open(&self, context: &DirectoryContext, dns_name: &str) -> DirectoryResult<Partition> {
        if dns_name.trim().is_empty() {
            return Err(DirectoryError::empty_argument("dns_name"));
        }
        let dn = DistinguishedName::from_dns_name(dns_name)?.to_string();
        self.find_by_name(context, &dn).map_err(|e| match e {
            DirectoryError::ServerUnavailable { .. } => DirectoryError::not_found("Partition", dns_name),
            other => other,
        })
    }

    fn find_committed(&self, context: &DirectoryContext, parsed: &DistinguishedName) -> DirectoryResult<Partition> {
        let normalized = parsed.to_string();
        let dn = normalized.as_str();
        let coordinator = self.roles().locate(context)?;
        let cross_ref = self
            .coordinator_cross_ref(&coordinator, dn)?
            .ok_or_else(|| DirectoryError::not_found("Partition", dn))?;

        let dns_name = match cross_ref.text(attr::DNS_ROOT) {
            Some(name) => name.to_string(),
            None => parsed.to_dns_name().unwrap_or_else(|_| dn.to_string()),
        };

        let root = RootInfo::read(self.store, context)?;
        let server_context = if context.is_server() {
            if !root.hosts(dn) {
                return Err(DirectoryError::not_found("Partition", dn));
            }
            context.clone()
        } else {
            let server = match root.technology {
                Technology::Primary => self
                    .locator
                    .find_server(&dns_name, None, LocatorFlags::ONLY_LDAP_NEEDED)
                    .map_err(|e| self.locator_error(&e, context, &dns_name))?,
                Technology::Secondary => self
                    .responsive_registry_server(context, dn, None)?
                    .map(|s| s.name().to_string())
                    .ok_or_else(|| DirectoryError::not_found("Partition", dn))?,
            };
            context.for_server(server)
        };

        let kind = PartitionKind::from(root.technology);
        let security_reference_domain = match kind {
            PartitionKind::Primary => cross_ref.text(attr::SD_REFERENCE_DOMAIN).map(str::to_string),
            PartitionKind::Secondary => None,
        };
        Ok(Partition::committed(
            server_context,
            dn,
            dns_name,
            kind,
            cross_ref.dn(),
            security_reference_domain,
        ))
    }

    // ==================
    // Replica set
    // ==================

    /// The partition's replica set. For a committed partition it is loaded
    /// from the servers that host it; changes are written on the next
    /// commit.
    pub fn replica_set<'p>(&self, partition: &'p mut Partition) -> DirectoryResult<&'p mut ReplicaSet> {
        if partition.replica_set.is_none() {
            let members = if partition.is_committed() {
                self.registry_servers(&partition.context, &partition.dn, None)?
            } else {
                Vec::new()
            };
            partition.replica_set = Some(ReplicaSet::for_cross_reference(
                partition.context.clone(),
                partition.kind.technology(),
                self.policy.min_primary_version,
                members,
            ));
        }
        partition
            .replica_set
            .as_mut()
            .ok_or_else(|| DirectoryError::invalid_state("replica set is not available"))
    }

    // ==================
    // Server discovery
    // ==================

    /// One server hosting the partition.
    pub fn find_server(
        &self,
        partition: &Partition,
        site: Option<&str>,
        force_rediscovery: bool,
    ) -> DirectoryResult<ReplicaServer> {
        require_committed(partition)?;
        check_site(site)?;
        let ctx = &partition.context;

        match partition.kind {
            PartitionKind::Primary => {
                let mut flags = LocatorFlags::ONLY_LDAP_NEEDED;
                if force_rediscovery {
                    flags |= LocatorFlags::FORCE_REDISCOVERY;
                }
                let name = self
                    .locator
                    .find_server(partition.name(), site, flags)
                    .map_err(|e| self.locator_error(&e, ctx, partition.name()))?;
                ReplicaServer::find(self.store, ctx, &name)
            }
            PartitionKind::Secondary => self
                .responsive_registry_server(ctx, partition.dn(), site)?
                .ok_or_else(|| DirectoryError::not_found("Server", partition.name())),
        }
    }

    /// Every server recorded as hosting the partition.
    pub fn find_all_servers(&self, partition: &Partition, site: Option<&str>) -> DirectoryResult<Vec<ReplicaServer>> {
        require_committed(partition)?;
        check_site(site)?;
        self.registry_servers(&partition.context, partition.dn(), site)
    }

    /// Servers the locator can discover. Primary partitions only.
    pub fn find_discoverable_servers(
        &self,
        partition: &Partition,
        site: Option<&str>,
    ) -> DirectoryResult<Vec<ReplicaServer>> {
        require_committed(partition)?;
        check_site(site)?;
        if partition.kind == PartitionKind::Secondary {
            return Err(DirectoryError::not_supported(
                "secondary partitions have no server discovery",
            ));
        }
        self.discover(partition, site, LocatorFlags::ONLY_LDAP_NEEDED)
    }

    /// Servers of the partition: discovered for primary partitions, read
    /// from the registry for secondary ones.
    pub fn find_servers(
        &self,
        partition: &Partition,
        site: Option<&str>,
        force_rediscovery: bool,
    ) -> DirectoryResult<Vec<ReplicaServer>> {
        require_committed(partition)?;
        check_site(site)?;
        match partition.kind {
            PartitionKind::Primary => {
                let mut flags = LocatorFlags::ONLY_LDAP_NEEDED;
                if force_rediscovery {
                    flags |= LocatorFlags::FORCE_REDISCOVERY;
                }
                self.discover(partition, site, flags)
            }
            PartitionKind::Secondary => self.registry_servers(&partition.context, partition.dn(), site),
        }
    }

    fn discover(
        &self,
        partition: &Partition,
        site: Option<&str>,
        flags: LocatorFlags,
    ) -> DirectoryResult<Vec<ReplicaServer>> {
        let ctx = &partition.context;
        let found = self
            .locator
            .enumerate_servers(partition.name(), site, flags)
            .map_err(|e| self.locator_error(&e, ctx, partition.name()))?;
        if let Some(error) = ErrorClassifier::aggregate(&found.errors, Some(ctx)) {
            return Err(error);
        }
        found
            .servers
            .iter()
            .map(|name| ReplicaServer::find(self.store, ctx, name))
            .collect()
    }

    /// Servers whose settings object lists `dn` as a hosted naming context
    fn registry_servers(
        &self,
        context: &DirectoryContext,
        dn: &str,
        site: Option<&str>,
    ) -> DirectoryResult<Vec<ReplicaServer>> {
        let root = RootInfo::read(self.store, context)?;
        let filter = Filter::And(vec![
            Filter::eq("objectCategory", class::NTDS_DSA),
            Filter::eq(attr::HAS_MASTER_NCS, dn),
        ]);
        let settings = self
            .store
            .search_all(
                context,
                &sites_container(&root.configuration_nc),
                &filter,
                SearchScope::Subtree,
            )
            .classified(context)?;

        let mut servers = Vec::with_capacity(settings.len());
        for entry in settings {
            let server = ReplicaServer::from_ntdsa(self.store, context, entry.dn(), root.technology)?;
            if site.map_or(true, |s| server.site_name().eq_ignore_ascii_case(s)) {
                servers.push(server);
            }
        }
        Ok(servers)
    }

    /// First registered server that answers; unreachable ones are skipped.
    fn responsive_registry_server(
        &self,
        context: &DirectoryContext,
        dn: &str,
        site: Option<&str>,
    ) -> DirectoryResult<Option<ReplicaServer>> {
        for server in self.registry_servers(context, dn, site)? {
            match RootInfo::read(self.store, &context.for_server(server.name())) {
                Ok(_) => return Ok(Some(server)),
                Err(DirectoryError::ServerUnavailable { .. }) => {
                    log_event_with_fields(Event::ServerSkipped, &[("server", server.name()), ("partition", dn)]);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    fn locator_error(&self, raw: &RawError, context: &DirectoryContext, dns_name: &str) -> DirectoryError {
        if raw.is(codes::NO_SUCH_DOMAIN) {
            DirectoryError::not_found("Partition", dns_name)
        } else {
            ErrorClassifier::classify(raw, Some(context))
        }
    }
}
