//! Site links
//!
//! A link is one `siteLink` entry under its transport's container. Attribute
//! writes are buffered on the entry until `save`; a link created in memory
//! does not exist in the store before its first save.

use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::Serialize;

use crate::config::LinkPolicy;
use crate::error::{codes, Classify, DirectoryError, DirectoryResult, ErrorClassifier};
use crate::observability::ObservationScope;
use crate::store::dn::{dn_equals, escape_value};
use crate::store::wellknown::{attr, class, transport_dn};
use crate::store::{
    AttributeValue, DirectoryContext, DirectoryStore, Entry, Filter, RootInfo, SearchScope, Technology,
};

use super::options::LinkOptions;
use super::schedule::Schedule;
use super::site::SiteRef;

/// Cost reported when none is stored
pub const DEFAULT_COST: i32 = 0;
/// Interval reported when none is stored
pub const DEFAULT_INTERVAL_MINUTES: i64 = 15;

/// Inter-site transport a link belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// RPC over IP
    Primary,
    /// Mail-based, primary technology only
    Alternate,
}

impl Transport {
    /// RDN value of the transport container
    pub fn rdn(&self) -> &'static str {
        match self {
            Transport::Primary => "IP",
            Transport::Alternate => "SMTP",
        }
    }
}

impl FromStr for Transport {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ip" | "primary" => Ok(Transport::Primary),
            "smtp" | "alternate" => Ok(Transport::Alternate),
            _ => Err(DirectoryError::invalid_argument(
                "transport",
                format!("'{}' is not a transport (ip, smtp)", s),
            )),
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.rdn())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LinkState {
    /// Not yet saved
    New,
    Existing,
    Deleted,
}

/// Read-only view of a link, for display
#[derive(Debug, Clone, Serialize)]
pub struct LinkDescription {
    pub name: String,
    pub transport: Transport,
    pub existing: bool,
    pub cost: i32,
    pub replication_interval_minutes: i64,
    pub options: u32,
    pub has_schedule: bool,
    pub sites: Vec<SiteRef>,
}

pub struct TopologyLink<'a> {
    store: &'a dyn DirectoryStore,
    context: DirectoryContext,
    name: String,
    transport: Transport,
    state: LinkState,
    entry: Entry,
    sites: Vec<SiteRef>,
    sites_loaded: bool,
}

impl<'a> TopologyLink<'a> {
    /// A new link under `transport`. Nothing is written until `save`.
    pub fn create(
        store: &'a dyn DirectoryStore,
        context: &DirectoryContext,
        name: &str,
        transport: Transport,
        policy: LinkPolicy,
    ) -> DirectoryResult<Self> {
        if name.trim().is_empty() {
            return Err(DirectoryError::empty_argument("name"));
        }
        context.validate()?;

        let container = Self::container(store, context, transport)?;
        let rdn = format!("CN={}", escape_value(name));
        let entry = store
            .create_child(context, &container, &rdn, class::SITE_LINK)
            .classified(context)?;

        let mut link = Self {
            store,
            context: context.clone(),
            name: name.to_string(),
            transport,
            state: LinkState::New,
            entry,
            sites: Vec::new(),
            sites_loaded: true,
        };
        if policy.recommended_defaults {
            link.set_cost(LinkPolicy::RECOMMENDED_COST)?;
            link.set_replication_interval(Duration::minutes(LinkPolicy::RECOMMENDED_INTERVAL_MINUTES))?;
        }
        Ok(link)
    }

    /// Bind to an existing link.
    pub fn find_by_name(
        store: &'a dyn DirectoryStore,
        context: &DirectoryContext,
        name: &str,
        transport: Transport,
    ) -> DirectoryResult<Self> {
        if name.trim().is_empty() {
            return Err(DirectoryError::empty_argument("name"));
        }
        context.validate()?;

        let container = Self::container(store, context, transport)?;
        let filter = Filter::And(vec![Filter::eq("objectCategory", class::SITE_LINK), Filter::eq("name", name)]);
        let entry = store
            .search(context, &container, &filter, SearchScope::OneLevel)
            .classified(context)?
            .ok_or_else(|| DirectoryError::not_found("SiteLink", name))?;

        Ok(Self {
            store,
            context: context.clone(),
            name: name.to_string(),
            transport,
            state: LinkState::Existing,
            entry,
            sites: Vec::new(),
            sites_loaded: false,
        })
    }

    fn container(
        store: &dyn DirectoryStore,
        context: &DirectoryContext,
        transport: Transport,
    ) -> DirectoryResult<String> {
        let root = RootInfo::read(store, context)?;
        let dn = transport_dn(&root.configuration_nc, transport.rdn());
        match store.get(context, &dn) {
            Ok(_) => Ok(dn),
            Err(e)
                if e.is(codes::DS_NO_SUCH_OBJECT)
                    && root.technology == Technology::Secondary
                    && transport == Transport::Alternate =>
            {
                Err(DirectoryError::not_supported(
                    "the alternate transport is not available on this directory",
                ))
            }
            Err(e) => Err(ErrorClassifier::classify(&e, Some(context))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    pub fn dn(&self) -> &str {
        self.entry.dn()
    }

    /// True once the link has been saved
    pub fn is_existing(&self) -> bool {
        self.state == LinkState::Existing
    }

    // ==================
    // Attribute access
    // ==================

    fn live(&self) -> DirectoryResult<()> {
        if self.state == LinkState::Deleted {
            return Err(DirectoryError::invalid_state("the site link has been deleted"));
        }
        Ok(())
    }

    fn read(&self, name: &str) -> DirectoryResult<Vec<AttributeValue>> {
        self.live()?;
        self.store.get_attribute(&self.entry, name).classified(&self.context)
    }

    fn write(&mut self, name: &str, values: Vec<AttributeValue>) -> DirectoryResult<()> {
        self.live()?;
        self.store
            .set_attribute(&mut self.entry, name, values)
            .classified(&self.context)
    }

    fn read_int(&self, name: &str) -> DirectoryResult<Option<i64>> {
        Ok(self.read(name)?.first().and_then(AttributeValue::as_int))
    }

    pub fn cost(&self) -> DirectoryResult<i32> {
        match self.read_int(attr::COST)? {
            None => Ok(DEFAULT_COST),
            Some(v) => i32::try_from(v)
                .map_err(|_| DirectoryError::operation_failed(0, format!("stored cost {} is out of range", v))),
        }
    }

    pub fn set_cost(&mut self, cost: i32) -> DirectoryResult<()> {
        self.live()?;
        if cost < 0 {
            return Err(DirectoryError::invalid_argument("cost", "must not be negative"));
        }
        self.write(attr::COST, vec![i64::from(cost).into()])
    }

    pub fn replication_interval(&self) -> DirectoryResult<Duration> {
        let minutes = self.read_int(attr::REPL_INTERVAL)?.unwrap_or(DEFAULT_INTERVAL_MINUTES);
        Ok(Duration::minutes(minutes))
    }

    /// Whole minutes only, up to `i32::MAX` minutes.
    pub fn set_replication_interval(&mut self, interval: Duration) -> DirectoryResult<()> {
        self.live()?;
        if interval < Duration::zero() {
            return Err(DirectoryError::invalid_argument("interval", "must not be negative"));
        }
        let minutes = interval.num_minutes();
        if minutes > i64::from(i32::MAX) {
            return Err(DirectoryError::invalid_argument("interval", "is too large"));
        }
        if interval != Duration::minutes(minutes) {
            return Err(DirectoryError::invalid_argument("interval", "must be a whole number of minutes"));
        }
        self.write(attr::REPL_INTERVAL, vec![minutes.into()])
    }

    pub fn options(&self) -> DirectoryResult<LinkOptions> {
        let bits = self.read_int(attr::OPTIONS)?.unwrap_or(0);
        Ok(LinkOptions::from_bits_retain(bits as u32))
    }

    pub fn set_options(&mut self, options: LinkOptions) -> DirectoryResult<()> {
        self.write(attr::OPTIONS, vec![i64::from(options.bits()).into()])
    }

    fn toggle(&mut self, flag: LinkOptions, enabled: bool) -> DirectoryResult<()> {
        let mut options = self.options()?;
        options.set(flag, enabled);
        self.set_options(options)
    }

    pub fn notification_enabled(&self) -> DirectoryResult<bool> {
        Ok(self.options()?.contains(LinkOptions::USE_NOTIFICATION))
    }

    pub fn set_notification_enabled(&mut self, enabled: bool) -> DirectoryResult<()> {
        self.toggle(LinkOptions::USE_NOTIFICATION, enabled)
    }

    pub fn reciprocal_replication_enabled(&self) -> DirectoryResult<bool> {
        Ok(self.options()?.contains(LinkOptions::TWO_WAY_SYNC))
    }

    pub fn set_reciprocal_replication_enabled(&mut self, enabled: bool) -> DirectoryResult<()> {
        self.toggle(LinkOptions::TWO_WAY_SYNC, enabled)
    }

    /// Compression is on unless the link disables it.
    pub fn data_compression_enabled(&self) -> DirectoryResult<bool> {
        Ok(!self.options()?.contains(LinkOptions::COMPRESSION_DISABLED))
    }

    pub fn set_data_compression_enabled(&mut self, enabled: bool) -> DirectoryResult<()> {
        self.toggle(LinkOptions::COMPRESSION_DISABLED, !enabled)
    }

    /// `None` means always available.
    pub fn schedule(&self) -> DirectoryResult<Option<Schedule>> {
        let values = self.read(attr::SCHEDULE)?;
        match values.first().and_then(AttributeValue::as_binary) {
            Some(bytes) => Schedule::from_bytes(bytes).map(Some),
            None => Ok(None),
        }
    }

    pub fn set_schedule(&mut self, schedule: Option<&Schedule>) -> DirectoryResult<()> {
        let values = schedule
            .map(|s| vec![AttributeValue::Binary(s.to_bytes())])
            .unwrap_or_default();
        self.write(attr::SCHEDULE, values)
    }

    // ==================
    // Site membership
    // ==================

    /// Member sites. Read from the store once for an existing link.
    pub fn sites(&mut self) -> DirectoryResult<&[SiteRef]> {
        self.live()?;
        if !self.sites_loaded {
            let values = self.read(attr::SITE_LIST)?;
            self.sites = values
                .iter()
                .filter_map(AttributeValue::as_text)
                .map(SiteRef::from_dn)
                .collect::<DirectoryResult<Vec<_>>>()?;
            self.sites_loaded = true;
        }
        Ok(&self.sites)
    }

    pub fn add_site(&mut self, site: SiteRef) -> DirectoryResult<()> {
        if self.sites()?.iter().any(|s| dn_equals(&s.dn, &site.dn)) {
            return Err(DirectoryError::already_exists(site.name));
        }
        let mut updated = self.sites.clone();
        updated.push(site);
        self.write_sites(updated)
    }

    pub fn remove_site(&mut self, name: &str) -> DirectoryResult<()> {
        let index = self
            .sites()?
            .iter()
            .position(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| DirectoryError::not_found("Site", name))?;
        let mut updated = self.sites.clone();
        updated.remove(index);
        self.write_sites(updated)
    }

    fn write_sites(&mut self, sites: Vec<SiteRef>) -> DirectoryResult<()> {
        let values = sites.iter().map(|s| AttributeValue::from(s.dn.as_str())).collect();
        self.write(attr::SITE_LIST, values)?;
        self.sites = sites;
        Ok(())
    }

    // ==================
    // Lifecycle
    // ==================

    /// Write pending changes; the first save creates the link.
    pub fn save(&mut self) -> DirectoryResult<()> {
        self.live()?;
        let scope = ObservationScope::with_fields("LINK_SAVE", &[("link", self.name.as_str())]);
        if let Err(e) = self.store.commit(&self.context, &mut self.entry).classified(&self.context) {
            scope.fail(&e.to_string());
            return Err(e);
        }

        match self.state {
            LinkState::New => self.state = LinkState::Existing,
            _ => self.sites_loaded = false,
        }
        scope.complete();
        Ok(())
    }

    /// Remove the link from the store. Only a saved link can be deleted.
    pub fn delete(&mut self) -> DirectoryResult<()> {
        match self.state {
            LinkState::New => {
                return Err(DirectoryError::invalid_state("the site link has not been saved"));
            }
            LinkState::Deleted => self.live()?,
            LinkState::Existing => {}
        }

        let scope = ObservationScope::with_fields("LINK_DELETE", &[("link", self.name.as_str())]);
        if let Err(e) = self.store.delete(&self.context, self.entry.dn()).classified(&self.context) {
            scope.fail(&e.to_string());
            return Err(e);
        }
        self.state = LinkState::Deleted;
        scope.complete();
        Ok(())
    }

    pub fn describe(&mut self) -> DirectoryResult<LinkDescription> {
        Ok(LinkDescription {
            name: self.name.clone(),
            transport: self.transport,
            existing: self.is_existing(),
            cost: self.cost()?,
            replication_interval_minutes: self.replication_interval()?.num_minutes(),
            options: self.options()?.bits(),
            has_schedule: self.schedule()?.is_some(),
            sites: self.sites()?.to_vec(),
        })
    }
}

impl fmt::Debug for TopologyLink<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TopologyLink")
            .field("name", &self.name)
            .field("transport", &self.transport)
            .field("state", &self.state)
            .field("dn", &self.entry.dn())
            .finish()
    }
}
