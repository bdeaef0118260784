//! In-memory multi-server directory
//!
//! Models the behavior the partition and topology code depends on:
//! - Each server holds its own copy of the data it hosts
//! - Configuration entries are shared by every server, except
//!   cross-references, which replicate lazily and stay per-server until
//!   `converge` or an explicit single-object replication
//! - Committing a naming-context head requires a cross-reference at the
//!   role owner; the head's server receives a copy and enables it
//! - Faults can be injected per operation, server, DN and attribute
//!
//! State serializes to JSON so the CLI can run against a snapshot file.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::context::{ContextKind, DirectoryContext};
use super::dn::{dn_equals, DistinguishedName};
use super::entry::{AttributeValue, Entry, Modification};
use super::filter::Filter;
use super::root::Technology;
use super::wellknown::{self, attr, class, flags};
use super::{
    DirectoryStore, LocatorEnumeration, LocatorFlags, LocatorService, SearchScope, StoreResult,
};
use crate::error::{codes, RawError};

/// Classes whose configuration entries replicate lazily
const LAGGING_CLASSES: &[&str] = &[class::CROSS_REF];

const DEFAULT_CROSS_REF_FLAGS: i64 = flags::CR_NTDS_NC | flags::CR_NTDS_NOT_GC_REPLICATED;

fn server_down(server: &str) -> RawError {
    RawError::store(codes::DS_SERVER_DOWN, format!("the server is not operational: {}", server))
}

fn no_such_object(dn: &str) -> RawError {
    RawError::store(codes::DS_NO_SUCH_OBJECT, format!("no such object: {}", dn))
}

fn unwilling(reason: &str) -> RawError {
    RawError::store(codes::DS_UNWILLING_TO_PERFORM, reason.to_string())
}

fn poisoned() -> RawError {
    RawError::new(0x8000_FFFF, "directory state lock poisoned")
}

fn key(dn: &str) -> StoreResult<String> {
    DistinguishedName::parse(dn)
        .map(|d| d.normalized())
        .map_err(|e| RawError::store(codes::DS_INVALID_DN_SYNTAX, e.to_string()))
}

fn parent_key(key: &str) -> Option<String> {
    DistinguishedName::parse(key)
        .ok()
        .and_then(|d| d.parent())
        .map(|p| p.normalized())
}

fn within(key: &str, base: &str) -> bool {
    match (DistinguishedName::parse(key), DistinguishedName::parse(base)) {
        (Ok(k), Ok(b)) => k.is_within(&b),
        _ => false,
    }
}

/// `pattern` names `server` by full name, host, or first host label
fn server_matches(pattern: &str, server: &str) -> bool {
    let host = server.split(':').next().unwrap_or(server);
    let label = host.split('.').next().unwrap_or(host);
    pattern.eq_ignore_ascii_case(server)
        || pattern.eq_ignore_ascii_case(host)
        || pattern.eq_ignore_ascii_case(label)
}

// ==================
// Snapshot model
// ==================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    dn: String,
    object_class: String,
    attributes: BTreeMap<String, Vec<AttributeValue>>,
}

impl StoredEntry {
    fn new(dn: impl Into<String>, object_class: &str) -> Self {
        Self {
            dn: dn.into(),
            object_class: object_class.to_string(),
            attributes: BTreeMap::new(),
        }
    }

    fn with(mut self, name: &str, values: Vec<AttributeValue>) -> Self {
        self.attributes.insert(name.to_ascii_lowercase(), values);
        self
    }

    fn text(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(&name.to_ascii_lowercase())
            .and_then(|v| v.first())
            .and_then(AttributeValue::as_text)
    }

    fn is_enabled(&self) -> bool {
        self.attributes
            .get(&attr::ENABLED.to_ascii_lowercase())
            .and_then(|v| v.first())
            .and_then(AttributeValue::as_bool)
            .unwrap_or(true)
    }

    fn to_entry(&self, server: &str) -> Entry {
        Entry::bound(server, self.dn.clone(), self.object_class.clone(), self.attributes.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Node {
    name: String,
    host: String,
    site: String,
    ntdsa_dn: String,
    reachable: bool,
    naming_contexts: Vec<String>,
    local: BTreeMap<String, StoredEntry>,
}

impl Node {
    fn matches(&self, target: &str) -> bool {
        server_matches(target, &self.name)
    }

    fn hosts_dns_name(&self, dns_name: &str) -> bool {
        self.naming_contexts.iter().any(|nc| {
            DistinguishedName::parse(nc)
                .and_then(|d| d.to_dns_name())
                .map_or(false, |n| n.eq_ignore_ascii_case(dns_name))
        })
    }
}

/// A server to add to a snapshot
#[derive(Debug, Clone)]
pub struct ServerSpec {
    host: String,
    port: Option<u16>,
    site: String,
    version: Option<String>,
}

impl ServerSpec {
    /// A primary-technology server reporting `version`
    pub fn primary(host: &str, site: &str, version: &str) -> Self {
        Self {
            host: host.to_string(),
            port: None,
            site: site.to_string(),
            version: Some(version.to_string()),
        }
    }

    /// A secondary-technology instance listening on `port`
    pub fn secondary(host: &str, port: u16, site: &str) -> Self {
        Self {
            host: host.to_string(),
            port: Some(port),
            site: site.to_string(),
            version: None,
        }
    }

    fn name(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }

    fn object_rdn(&self) -> String {
        let label = self.host.split('.').next().unwrap_or(&self.host);
        match self.port {
            Some(port) => format!("CN={}${}", label, port),
            None => format!("CN={}", label),
        }
    }
}

/// Serializable state of an [`InMemoryDirectory`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    technology: Technology,
    root_dn: String,
    configuration_nc: String,
    #[serde(default)]
    require_manual_cross_ref: bool,
    shared: BTreeMap<String, StoredEntry>,
    nodes: Vec<Node>,
}

impl DirectorySnapshot {
    /// An empty directory rooted at `root_dn`
    pub fn new(technology: Technology, root_dn: &str) -> Self {
        let config = wellknown::configuration_nc(root_dn);
        let mut snapshot = Self {
            technology,
            root_dn: root_dn.to_string(),
            configuration_nc: config.clone(),
            require_manual_cross_ref: false,
            shared: BTreeMap::new(),
            nodes: Vec::new(),
        };

        snapshot.insert_shared(StoredEntry::new(config.clone(), class::CONFIGURATION));
        snapshot.insert_shared(StoredEntry::new(
            wellknown::partitions_container(&config),
            class::CROSS_REF_CONTAINER,
        ));
        snapshot.insert_shared(StoredEntry::new(
            wellknown::sites_container(&config),
            class::SITES_CONTAINER,
        ));
        snapshot.insert_shared(StoredEntry::new(
            wellknown::transports_container(&config),
            class::CONTAINER,
        ));
        snapshot.insert_shared(StoredEntry::new(
            wellknown::transport_dn(&config, "IP"),
            class::INTER_SITE_TRANSPORT,
        ));
        if technology == Technology::Primary {
            snapshot.insert_shared(StoredEntry::new(
                wellknown::transport_dn(&config, "SMTP"),
                class::INTER_SITE_TRANSPORT,
            ));
        }
        snapshot
    }

    pub fn technology(&self) -> Technology {
        self.technology
    }

    pub fn root_dn(&self) -> &str {
        &self.root_dn
    }

    pub fn configuration_nc(&self) -> &str {
        &self.configuration_nc
    }

    /// Server names, in insertion order
    pub fn server_names(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.name.clone()).collect()
    }

    fn insert_shared(&mut self, entry: StoredEntry) {
        if let Ok(k) = key(&entry.dn) {
            self.shared.insert(k, entry);
        }
    }

    /// Add a site with its servers container.
    pub fn with_site(mut self, site: &str) -> Self {
        self.ensure_site(site);
        self
    }

    fn ensure_site(&mut self, site: &str) {
        let site_dn = wellknown::site_dn(&self.configuration_nc, site);
        if key(&site_dn).map_or(false, |k| self.shared.contains_key(&k)) {
            return;
        }
        self.insert_shared(StoredEntry::new(site_dn, class::SITE));
        self.insert_shared(StoredEntry::new(
            wellknown::servers_container(&self.configuration_nc, site),
            class::SERVERS_CONTAINER,
        ));
    }

    /// Add a server. The first server added becomes the role owner.
    pub fn with_server(mut self, spec: ServerSpec) -> Self {
        self.ensure_site(&spec.site);

        let server_dn = format!(
            "{},{}",
            spec.object_rdn(),
            wellknown::servers_container(&self.configuration_nc, &spec.site)
        );
        let ntdsa_dn = format!("{},{}", wellknown::NTDS_SETTINGS_RDN, server_dn);

        let mut server = StoredEntry::new(server_dn, class::SERVER)
            .with(attr::DNS_HOST_NAME, vec![spec.host.clone().into()]);
        if let Some(version) = &spec.version {
            server = server.with(attr::SERVER_VERSION, vec![version.clone().into()]);
        }

        let mut naming_contexts = vec![self.configuration_nc.clone()];
        let mut local = BTreeMap::new();
        if self.technology == Technology::Primary {
            naming_contexts.push(self.root_dn.clone());
            if let Ok(k) = key(&self.root_dn) {
                local.insert(
                    k,
                    StoredEntry::new(self.root_dn.clone(), class::DOMAIN_DNS).with(
                        attr::INSTANCE_TYPE,
                        vec![(flags::IT_NC_HEAD | flags::IT_WRITE).into()],
                    ),
                );
            }
        }

        let mut ntdsa = StoredEntry::new(ntdsa_dn.clone(), class::NTDS_DSA).with(
            attr::HAS_MASTER_NCS,
            naming_contexts.iter().cloned().map(AttributeValue::from).collect(),
        );
        if let Some(port) = spec.port {
            ntdsa = ntdsa.with(attr::LDAP_PORT, vec![i64::from(port).into()]);
        }

        self.insert_shared(server);
        self.insert_shared(ntdsa);

        let first = self.nodes.is_empty();
        self.nodes.push(Node {
            name: spec.name(),
            host: spec.host.clone(),
            site: spec.site.clone(),
            ntdsa_dn,
            reachable: true,
            naming_contexts,
            local,
        });

        if first {
            let name = spec.name();
            self = self.with_role_owner(&name);
        }
        self
    }

    /// Move the naming role to `server`. Unknown names are ignored.
    pub fn with_role_owner(mut self, server: &str) -> Self {
        let owner = self
            .nodes
            .iter()
            .find(|n| n.matches(server))
            .map(|n| n.ntdsa_dn.clone());
        if let (Some(owner), Ok(k)) = (owner, key(&wellknown::partitions_container(&self.configuration_nc))) {
            if let Some(container) = self.shared.get_mut(&k) {
                container
                    .attributes
                    .insert(attr::FSMO_ROLE_OWNER.to_ascii_lowercase(), vec![owner.into()]);
            }
        }
        self
    }

    /// Refuse automatic cross-reference creation during head commits,
    /// forcing callers onto the manual path.
    pub fn with_manual_cross_ref(mut self, required: bool) -> Self {
        self.require_manual_cross_ref = required;
        self
    }

    /// Read a snapshot from a JSON file.
    pub fn load(path: &Path) -> io::Result<Self> {
        let data = fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    /// Write the snapshot as JSON.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(path, data)
    }

    // ==================
    // Server-side lookups
    // ==================

    fn node_index(&self, context: &DirectoryContext) -> StoreResult<usize> {
        let index = match context.kind() {
            ContextKind::Server => self.nodes.iter().position(|n| n.matches(context.target())),
            ContextKind::Forest | ContextKind::ConfigurationSet => {
                self.nodes.iter().position(|n| n.reachable)
            }
        };
        let index = index.ok_or_else(|| server_down(context.target()))?;
        if !self.nodes[index].reachable {
            return Err(server_down(&self.nodes[index].name));
        }
        Ok(index)
    }

    fn lookup(&self, node: usize, k: &str) -> Option<&StoredEntry> {
        self.nodes[node].local.get(k).or_else(|| self.shared.get(k))
    }

    fn visible(&self, node: usize) -> BTreeMap<&String, &StoredEntry> {
        let mut merged: BTreeMap<&String, &StoredEntry> = self.shared.iter().collect();
        merged.extend(self.nodes[node].local.iter());
        merged
    }

    fn is_shared(&self, k: &str, object_class: &str) -> bool {
        !LAGGING_CLASSES.iter().any(|c| c.eq_ignore_ascii_case(object_class))
            && key(&self.configuration_nc).map_or(false, |config| within(k, &config))
    }

    fn root_entry(&self, node: usize) -> StoredEntry {
        let n = &self.nodes[node];
        StoredEntry::new(wellknown::ROOT_DSE, class::ROOT_DSE)
            .with(attr::DNS_HOST_NAME, vec![n.host.clone().into()])
            .with(attr::DS_SERVICE_NAME, vec![n.ntdsa_dn.clone().into()])
            .with(attr::CONFIGURATION_NC, vec![self.configuration_nc.clone().into()])
            .with(
                attr::NAMING_CONTEXTS,
                n.naming_contexts.iter().cloned().map(AttributeValue::from).collect(),
            )
            .with(
                attr::SUPPORTED_CAPABILITIES,
                vec![self.technology.capability_oid().into()],
            )
    }

    fn role_owner(&self) -> StoreResult<usize> {
        let container = key(&wellknown::partitions_container(&self.configuration_nc))?;
        let owner = self
            .shared
            .get(&container)
            .and_then(|c| c.text(attr::FSMO_ROLE_OWNER))
            .ok_or_else(|| unwilling("no naming role owner"))?;
        let index = self
            .nodes
            .iter()
            .position(|n| dn_equals(&n.ntdsa_dn, owner))
            .ok_or_else(|| unwilling("naming role owner is not a known server"))?;
        if !self.nodes[index].reachable {
            return Err(server_down(&self.nodes[index].name));
        }
        Ok(index)
    }

    fn find_cross_ref(&self, node: usize, nc: &str) -> Option<String> {
        self.visible(node)
            .into_iter()
            .find(|(_, e)| {
                e.object_class.eq_ignore_ascii_case(class::CROSS_REF)
                    && e.text(attr::NC_NAME).map_or(false, |n| dn_equals(n, nc))
            })
            .map(|(k, _)| k.clone())
    }

    // ==================
    // Server-side writes
    // ==================

    fn commit_nc_head(&mut self, node: usize, k: String, head: StoredEntry) -> StoreResult<()> {
        let owner = self.role_owner()?;

        let cross_ref_key = match self.find_cross_ref(owner, &head.dn) {
            Some(existing) => existing,
            None if self.technology == Technology::Primary && !self.require_manual_cross_ref => {
                let dn = format!(
                    "CN={},{}",
                    Uuid::new_v4(),
                    wellknown::partitions_container(&self.configuration_nc)
                );
                let created = StoredEntry::new(dn.clone(), class::CROSS_REF)
                    .with(attr::NC_NAME, vec![head.dn.clone().into()])
                    .with(attr::DNS_ROOT, vec![self.nodes[node].host.clone().into()])
                    .with(attr::ENABLED, vec![false.into()])
                    .with(attr::SYSTEM_FLAGS, vec![DEFAULT_CROSS_REF_FLAGS.into()]);
                let created_key = key(&dn)?;
                self.nodes[owner].local.insert(created_key.clone(), created);
                created_key
            }
            None if self.technology == Technology::Primary => {
                return Err(RawError::store(
                    codes::DS_INAPPROPRIATE_AUTH,
                    "cross-reference must be created explicitly",
                ));
            }
            None => return Err(unwilling("no cross-reference names this naming context")),
        };

        let mut copy = self
            .lookup(owner, &cross_ref_key)
            .cloned()
            .ok_or_else(|| no_such_object(&cross_ref_key))?;
        copy.attributes
            .insert(attr::ENABLED.to_ascii_lowercase(), vec![true.into()]);
        // dnsRoot names the creating host until the naming context exists.
        if let Ok(dns_name) = DistinguishedName::parse(&head.dn).and_then(|d| d.to_dns_name()) {
            copy.attributes
                .insert(attr::DNS_ROOT.to_ascii_lowercase(), vec![dns_name.into()]);
        }
        self.nodes[node].local.insert(cross_ref_key, copy);

        let dn = head.dn.clone();
        self.nodes[node].local.insert(k, head);
        self.nodes[node].naming_contexts.push(dn.clone());

        let ntdsa = key(&self.nodes[node].ntdsa_dn)?;
        if let Some(entry) = self.shared.get_mut(&ntdsa) {
            Modification::Add {
                name: attr::HAS_MASTER_NCS.to_string(),
                value: dn.into(),
            }
            .apply_to(&mut entry.attributes);
        }
        Ok(())
    }

    fn commit_root(&mut self, node: usize, pending: &[Modification]) -> StoreResult<()> {
        for modification in pending {
            if !modification.attribute().eq_ignore_ascii_case(attr::REPLICATE_SINGLE_OBJECT) {
                return Err(unwilling("RootDSE attribute is not writable"));
            }
            let values: Vec<&AttributeValue> = match modification {
                Modification::Replace { values, .. } => values.iter().collect(),
                Modification::Add { value, .. } => vec![value],
                _ => return Err(unwilling("RootDSE operation attribute can only be written")),
            };
            for value in values {
                let text = value.as_text().ok_or_else(|| unwilling("malformed replication request"))?;
                self.replicate_single_object(node, text)?;
            }
        }
        Ok(())
    }

    fn replicate_single_object(&mut self, node: usize, request: &str) -> StoreResult<()> {
        let (source_dsa, dn) = request
            .split_once(':')
            .ok_or_else(|| unwilling("malformed replication request"))?;
        let source = self
            .nodes
            .iter()
            .position(|n| dn_equals(&n.ntdsa_dn, source_dsa))
            .ok_or_else(|| unwilling("replication source is not a known server"))?;
        if !self.nodes[source].reachable {
            return Err(server_down(&self.nodes[source].name));
        }

        let k = key(dn)?;
        if let Some(entry) = self.nodes[source].local.get(&k).cloned() {
            self.nodes[node].local.insert(k, entry);
            Ok(())
        } else if self.shared.contains_key(&k) {
            Ok(())
        } else {
            Err(no_such_object(dn))
        }
    }

    fn converge(&mut self) {
        let mut winners: BTreeMap<String, StoredEntry> = BTreeMap::new();
        for node in &self.nodes {
            for (k, entry) in &node.local {
                if !LAGGING_CLASSES.iter().any(|c| c.eq_ignore_ascii_case(&entry.object_class)) {
                    continue;
                }
                let replace = winners.get(k).map_or(true, |w| !w.is_enabled() && entry.is_enabled());
                if replace {
                    winners.insert(k.clone(), entry.clone());
                }
            }
        }
        for node in &mut self.nodes {
            for (k, entry) in &winners {
                node.local.insert(k.clone(), entry.clone());
            }
        }
    }
}

// ==================
// Fault injection
// ==================

/// Store or locator operation, for fault matching and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Get,
    CreateChild,
    Commit,
    Refresh,
    Delete,
    Search,
    GetAttribute,
    SetAttribute,
    FindServer,
    EnumerateServers,
}

/// An injected failure
///
/// Fires once unless `repeated`. For `EnumerateServers` the error is
/// reported as a per-server failure rather than failing the call.
#[derive(Debug, Clone)]
pub struct Fault {
    op: StoreOp,
    server: Option<String>,
    dn_contains: Option<String>,
    attribute: Option<String>,
    repeated: bool,
    error: RawError,
}

impl Fault {
    pub fn new(op: StoreOp, error: RawError) -> Self {
        Self {
            op,
            server: None,
            dn_contains: None,
            attribute: None,
            repeated: false,
            error,
        }
    }

    pub fn on_server(mut self, server: &str) -> Self {
        self.server = Some(server.to_string());
        self
    }

    /// Match DNs containing `fragment`, case-insensitively
    pub fn on_dn(mut self, fragment: &str) -> Self {
        self.dn_contains = Some(fragment.to_ascii_lowercase());
        self
    }

    pub fn on_attribute(mut self, name: &str) -> Self {
        self.attribute = Some(name.to_string());
        self
    }

    pub fn repeated(mut self) -> Self {
        self.repeated = true;
        self
    }

    fn matches(&self, op: StoreOp, server: &str, dn: &str, attribute: Option<&str>) -> bool {
        self.op == op
            && self.server.as_deref().map_or(true, |s| server_matches(s, server))
            && self
                .dn_contains
                .as_deref()
                .map_or(true, |f| dn.to_ascii_lowercase().contains(f))
            && self.attribute.as_deref().map_or(true, |a| {
                attribute.map_or(false, |name| name.eq_ignore_ascii_case(a))
            })
    }
}

#[derive(Debug, Default)]
struct Trace {
    ops: Vec<StoreOp>,
    last_locator_flags: Option<LocatorFlags>,
}

// ==================
// InMemoryDirectory
// ==================

/// Thread-safe directory over a [`DirectorySnapshot`]
#[derive(Debug)]
pub struct InMemoryDirectory {
    state: RwLock<DirectorySnapshot>,
    faults: RwLock<Vec<Fault>>,
    trace: RwLock<Trace>,
}

impl InMemoryDirectory {
    pub fn new(snapshot: DirectorySnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
            faults: RwLock::new(Vec::new()),
            trace: RwLock::new(Trace::default()),
        }
    }

    fn read_state(&self) -> StoreResult<RwLockReadGuard<'_, DirectorySnapshot>> {
        self.state.read().map_err(|_| poisoned())
    }

    fn write_state(&self) -> StoreResult<RwLockWriteGuard<'_, DirectorySnapshot>> {
        self.state.write().map_err(|_| poisoned())
    }

    /// Current state, for persisting
    pub fn snapshot(&self) -> StoreResult<DirectorySnapshot> {
        Ok(self.read_state()?.clone())
    }

    pub fn inject_fault(&self, fault: Fault) -> StoreResult<()> {
        self.faults.write().map_err(|_| poisoned())?.push(fault);
        Ok(())
    }

    /// Take a server offline or bring it back.
    pub fn set_reachable(&self, server: &str, reachable: bool) -> StoreResult<()> {
        let mut state = self.write_state()?;
        let node = state
            .nodes
            .iter_mut()
            .find(|n| n.matches(server))
            .ok_or_else(|| server_down(server))?;
        node.reachable = reachable;
        Ok(())
    }

    /// Complete normal propagation of lazily replicated entries.
    pub fn converge(&self) -> StoreResult<()> {
        self.write_state()?.converge();
        Ok(())
    }

    /// Number of store and locator calls received
    pub fn call_count(&self) -> usize {
        self.trace.read().map(|t| t.ops.len()).unwrap_or(0)
    }

    /// Number of calls of one kind received
    pub fn calls(&self, op: StoreOp) -> usize {
        self.trace
            .read()
            .map(|t| t.ops.iter().filter(|o| **o == op).count())
            .unwrap_or(0)
    }

    pub fn last_locator_flags(&self) -> Option<LocatorFlags> {
        self.trace.read().ok().and_then(|t| t.last_locator_flags)
    }

    /// Whether `server` holds `dn`, read without going through the store API
    pub fn has_entry(&self, server: &str, dn: &str) -> bool {
        self.inspect(server, dn).is_some()
    }

    /// Attribute values of `dn` on `server`, read without going through the
    /// store API
    pub fn inspect_attribute(&self, server: &str, dn: &str, name: &str) -> Vec<AttributeValue> {
        self.inspect(server, dn)
            .map(|e| e.values(name).to_vec())
            .unwrap_or_default()
    }

    fn inspect(&self, server: &str, dn: &str) -> Option<Entry> {
        let state = self.read_state().ok()?;
        let node = state.nodes.iter().position(|n| n.matches(server))?;
        let k = key(dn).ok()?;
        state.lookup(node, &k).map(|e| e.to_entry(&state.nodes[node].name))
    }

    fn record(&self, op: StoreOp) {
        if let Ok(mut trace) = self.trace.write() {
            trace.ops.push(op);
        }
    }

    fn check_fault(&self, op: StoreOp, server: &str, dn: &str, attribute: Option<&str>) -> StoreResult<()> {
        let mut faults = self.faults.write().map_err(|_| poisoned())?;
        if let Some(index) = faults.iter().position(|f| f.matches(op, server, dn, attribute)) {
            let error = faults[index].error.clone();
            if !faults[index].repeated {
                faults.remove(index);
            }
            return Err(error);
        }
        Ok(())
    }

    fn drain_faults(&self, op: StoreOp, dn: &str) -> StoreResult<Vec<RawError>> {
        let mut faults = self.faults.write().map_err(|_| poisoned())?;
        let mut fired = Vec::new();
        faults.retain(|f| {
            let dn_matches = f
                .dn_contains
                .as_deref()
                .map_or(true, |fragment| dn.to_ascii_lowercase().contains(fragment));
            if f.op == op && dn_matches {
                fired.push(f.error.clone());
                f.repeated
            } else {
                true
            }
        });
        Ok(fired)
    }

    fn begin(&self, op: StoreOp, context: &DirectoryContext, dn: &str) -> StoreResult<usize> {
        self.record(op);
        let state = self.read_state()?;
        let node = state.node_index(context)?;
        let name = state.nodes[node].name.clone();
        drop(state);
        self.check_fault(op, &name, dn, None)?;
        Ok(node)
    }
}

impl DirectoryStore for InMemoryDirectory {
    fn get(&self, context: &DirectoryContext, dn: &str) -> StoreResult<Entry> {
        let node = self.begin(StoreOp::Get, context, dn)?;
        let state = self.read_state()?;
        let server = &state.nodes[node].name;
        if dn.is_empty() {
            return Ok(state.root_entry(node).to_entry(server));
        }
        let k = key(dn)?;
        state
            .lookup(node, &k)
            .map(|e| e.to_entry(server))
            .ok_or_else(|| no_such_object(dn))
    }

    fn create_child(
        &self,
        context: &DirectoryContext,
        parent: &str,
        rdn: &str,
        object_class: &str,
    ) -> StoreResult<Entry> {
        let node = self.begin(StoreOp::CreateChild, context, parent)?;
        let dn = format!("{},{}", rdn, parent);
        key(&dn)?;
        let state = self.read_state()?;
        Ok(Entry::provisional(state.nodes[node].name.clone(), dn, object_class))
    }

    fn commit(&self, context: &DirectoryContext, entry: &mut Entry) -> StoreResult<()> {
        let node = self.begin(StoreOp::Commit, context, entry.dn())?;
        let mut state = self.write_state()?;

        if entry.dn().is_empty() {
            state.commit_root(node, entry.pending())?;
            entry.mark_committed();
            return Ok(());
        }

        let k = key(entry.dn())?;
        if entry.is_new() {
            if state.lookup(node, &k).is_some() {
                return Err(RawError::store(
                    codes::OBJECT_ALREADY_EXISTS,
                    format!("object already exists: {}", entry.dn()),
                ));
            }

            let mut stored = StoredEntry::new(entry.dn(), entry.object_class());
            for m in entry.pending() {
                m.apply_to(&mut stored.attributes);
            }

            let instance_type = stored
                .attributes
                .get(&attr::INSTANCE_TYPE.to_ascii_lowercase())
                .and_then(|v| v.first())
                .and_then(AttributeValue::as_int)
                .unwrap_or(0);

            if instance_type & flags::IT_NC_HEAD != 0 {
                state.commit_nc_head(node, k, stored)?;
            } else {
                let parent = parent_key(&k).ok_or_else(|| no_such_object(entry.dn()))?;
                if state.lookup(node, &parent).is_none() {
                    return Err(no_such_object(entry.dn()));
                }
                if stored.object_class.eq_ignore_ascii_case(class::CROSS_REF) {
                    stored
                        .attributes
                        .entry(attr::SYSTEM_FLAGS.to_ascii_lowercase())
                        .or_insert_with(|| vec![DEFAULT_CROSS_REF_FLAGS.into()]);
                }
                if state.is_shared(&k, &stored.object_class) {
                    state.shared.insert(k, stored);
                } else {
                    state.nodes[node].local.insert(k, stored);
                }
            }
        } else {
            let current = state
                .lookup(node, &k)
                .cloned()
                .ok_or_else(|| no_such_object(entry.dn()))?;

            let touches_locations = entry
                .pending()
                .iter()
                .any(|m| m.attribute().eq_ignore_ascii_case(attr::REPLICA_LOCATIONS));
            if current.object_class.eq_ignore_ascii_case(class::CROSS_REF)
                && touches_locations
                && !current.is_enabled()
            {
                return Err(unwilling("cross-reference is not enabled on this server"));
            }

            let mut updated = current;
            for m in entry.pending() {
                m.apply_to(&mut updated.attributes);
            }
            if state.nodes[node].local.contains_key(&k) {
                state.nodes[node].local.insert(k, updated);
            } else {
                state.shared.insert(k, updated);
            }
        }

        entry.mark_committed();
        Ok(())
    }

    fn refresh(&self, context: &DirectoryContext, entry: &mut Entry) -> StoreResult<()> {
        let node = self.begin(StoreOp::Refresh, context, entry.dn())?;
        let state = self.read_state()?;
        let stored = if entry.dn().is_empty() {
            state.root_entry(node)
        } else {
            let k = key(entry.dn())?;
            state
                .lookup(node, &k)
                .cloned()
                .ok_or_else(|| no_such_object(entry.dn()))?
        };
        entry.reload(stored.object_class, stored.attributes);
        Ok(())
    }

    fn delete(&self, context: &DirectoryContext, dn: &str) -> StoreResult<()> {
        let node = self.begin(StoreOp::Delete, context, dn)?;
        let mut state = self.write_state()?;
        let k = key(dn)?;
        if state.lookup(node, &k).is_none() {
            return Err(no_such_object(dn));
        }
        let has_children = state
            .visible(node)
            .keys()
            .any(|child| parent_key(child).as_deref() == Some(k.as_str()));
        if has_children {
            return Err(RawError::store(
                codes::DS_NOT_ALLOWED_ON_NON_LEAF,
                format!("object has children: {}", dn),
            ));
        }

        if state.nodes[node].local.remove(&k).is_none() {
            state.shared.remove(&k);
        }

        let was_head = state.nodes[node].naming_contexts.iter().any(|nc| dn_equals(nc, dn));
        if was_head {
            state.nodes[node].naming_contexts.retain(|nc| !dn_equals(nc, dn));
            let ntdsa = key(&state.nodes[node].ntdsa_dn)?;
            if let Some(entry) = state.shared.get_mut(&ntdsa) {
                Modification::Remove {
                    name: attr::HAS_MASTER_NCS.to_string(),
                    value: dn.into(),
                }
                .apply_to(&mut entry.attributes);
            }
        }
        Ok(())
    }

    fn search_all(
        &self,
        context: &DirectoryContext,
        base: &str,
        filter: &Filter,
        scope: SearchScope,
    ) -> StoreResult<Vec<Entry>> {
        let node = self.begin(StoreOp::Search, context, base)?;
        let state = self.read_state()?;
        let base_key = key(base)?;
        if state.lookup(node, &base_key).is_none() {
            return Err(no_such_object(base));
        }

        let server = &state.nodes[node].name;
        Ok(state
            .visible(node)
            .into_iter()
            .filter(|(k, _)| match scope {
                SearchScope::Base => **k == base_key,
                SearchScope::OneLevel => parent_key(k).as_deref() == Some(base_key.as_str()),
                SearchScope::Subtree => within(k, &base_key),
            })
            .map(|(_, e)| e.to_entry(server))
            .filter(|e| filter.matches(e))
            .collect())
    }

    fn get_attribute(&self, entry: &Entry, name: &str) -> StoreResult<Vec<AttributeValue>> {
        self.record(StoreOp::GetAttribute);
        self.check_fault(StoreOp::GetAttribute, entry.server(), entry.dn(), Some(name))?;
        Ok(entry.values(name).to_vec())
    }

    fn set_attribute(&self, entry: &mut Entry, name: &str, values: Vec<AttributeValue>) -> StoreResult<()> {
        self.record(StoreOp::SetAttribute);
        self.check_fault(StoreOp::SetAttribute, entry.server(), entry.dn(), Some(name))?;
        entry.replace(name, values);
        Ok(())
    }
}

impl LocatorService for InMemoryDirectory {
    fn find_server(&self, domain: &str, site: Option<&str>, flags: LocatorFlags) -> StoreResult<String> {
        self.record(StoreOp::FindServer);
        if let Ok(mut trace) = self.trace.write() {
            trace.last_locator_flags = Some(flags);
        }
        self.check_fault(StoreOp::FindServer, "", domain, None)?;

        let state = self.read_state()?;
        state
            .nodes
            .iter()
            .filter(|n| n.reachable && n.hosts_dns_name(domain))
            .find(|n| site.map_or(true, |s| n.site.eq_ignore_ascii_case(s)))
            .map(|n| n.name.clone())
            .ok_or_else(|| {
                RawError::locator(codes::NO_SUCH_DOMAIN, format!("no server found for {}", domain))
            })
    }

    fn enumerate_servers(
        &self,
        domain: &str,
        site: Option<&str>,
        flags: LocatorFlags,
    ) -> StoreResult<LocatorEnumeration> {
        self.record(StoreOp::EnumerateServers);
        if let Ok(mut trace) = self.trace.write() {
            trace.last_locator_flags = Some(flags);
        }
        let errors = self.drain_faults(StoreOp::EnumerateServers, domain)?;

        let state = self.read_state()?;
        let servers = state
            .nodes
            .iter()
            .filter(|n| n.hosts_dns_name(domain))
            .filter(|n| site.map_or(true, |s| n.site.eq_ignore_ascii_case(s)))
            .map(|n| n.name.clone())
            .collect();
        Ok(LocatorEnumeration { servers, errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> InMemoryDirectory {
        InMemoryDirectory::new(
            DirectorySnapshot::new(Technology::Primary, "DC=corp,DC=com")
                .with_server(ServerSpec::primary("dc1.corp.com", "Site1", "6.3"))
                .with_server(ServerSpec::primary("dc2.corp.com", "Site2", "6.3")),
        )
    }

    #[test]
    fn test_root_dse_reports_server_identity() {
        let dir = directory();
        let root = dir.get(&DirectoryContext::server("dc2"), "").unwrap();
        assert_eq!(root.text(attr::DNS_HOST_NAME), Some("dc2.corp.com"));
        assert!(root
            .texts(attr::NAMING_CONTEXTS)
            .contains(&"DC=corp,DC=com"));
    }

    #[test]
    fn test_unreachable_server_is_down() {
        let dir = directory();
        dir.set_reachable("dc2", false).unwrap();
        let err = dir.get(&DirectoryContext::server("dc2"), "").unwrap_err();
        assert!(err.is(codes::DS_SERVER_DOWN));
    }

    #[test]
    fn test_config_writes_are_shared() {
        let dir = directory();
        let ctx = DirectoryContext::server("dc1");
        let mut entry = dir
            .create_child(&ctx, "CN=Sites,CN=Configuration,DC=corp,DC=com", "CN=Site3", class::SITE)
            .unwrap();
        dir.commit(&ctx, &mut entry).unwrap();
        assert!(dir.has_entry("dc2", "CN=Site3,CN=Sites,CN=Configuration,DC=corp,DC=com"));
    }

    #[test]
    fn test_cross_refs_lag_until_converge() {
        let dir = directory();
        let ctx = DirectoryContext::server("dc1");
        let dn = "CN=x,CN=Partitions,CN=Configuration,DC=corp,DC=com";
        let mut entry = dir
            .create_child(&ctx, "CN=Partitions,CN=Configuration,DC=corp,DC=com", "CN=x", class::CROSS_REF)
            .unwrap();
        dir.commit(&ctx, &mut entry).unwrap();

        assert!(dir.has_entry("dc1", dn));
        assert!(!dir.has_entry("dc2", dn));
        dir.converge().unwrap();
        assert!(dir.has_entry("dc2", dn));
    }

    #[test]
    fn test_missing_parent_is_rejected() {
        let dir = directory();
        let ctx = DirectoryContext::server("dc1");
        let mut entry = dir
            .create_child(&ctx, "CN=Nowhere,DC=corp,DC=com", "CN=x", class::CONTAINER)
            .unwrap();
        let err = dir.commit(&ctx, &mut entry).unwrap_err();
        assert!(err.is(codes::DS_NO_SUCH_OBJECT));
    }

    #[test]
    fn test_non_leaf_delete_is_rejected() {
        let dir = directory();
        let err = dir
            .delete(&DirectoryContext::server("dc1"), "CN=Sites,CN=Configuration,DC=corp,DC=com")
            .unwrap_err();
        assert!(err.is(codes::DS_NOT_ALLOWED_ON_NON_LEAF));
    }

    #[test]
    fn test_fault_fires_once() {
        let dir = directory();
        dir.inject_fault(
            Fault::new(StoreOp::Get, RawError::store(codes::DS_BUSY, "busy")).on_server("dc1"),
        )
        .unwrap();
        let ctx = DirectoryContext::server("dc1.corp.com");
        assert!(dir.get(&ctx, "").unwrap_err().is(codes::DS_BUSY));
        assert!(dir.get(&ctx, "").is_ok());
        assert_eq!(dir.calls(StoreOp::Get), 2);
    }

    #[test]
    fn test_locator_site_filter() {
        let dir = directory();
        let found = dir
            .find_server("corp.com", Some("Site2"), LocatorFlags::empty())
            .unwrap();
        assert_eq!(found, "dc2.corp.com");

        let err = dir
            .find_server("other.com", None, LocatorFlags::FORCE_REDISCOVERY)
            .unwrap_err();
        assert!(err.is(codes::NO_SUCH_DOMAIN));
        assert_eq!(dir.last_locator_flags(), Some(LocatorFlags::FORCE_REDISCOVERY));
    }
}
