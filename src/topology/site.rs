//! Site references and per-site bridgehead sets

use serde::Serialize;

use crate::error::{Classify, DirectoryError, DirectoryResult};
use crate::replica::{ReplicaServer, ReplicaSet};
use crate::store::wellknown::{attr, class, sites_container, transport_dn, NTDS_SETTINGS_RDN};
use crate::store::{DirectoryContext, DirectoryStore, DistinguishedName, Filter, RootInfo, SearchScope};

use super::link::Transport;

/// A site, by name and DN
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteRef {
    pub name: String,
    pub dn: String,
}

impl SiteRef {
    /// Build from a site DN; the name is its leaf value.
    pub fn from_dn(dn: &str) -> DirectoryResult<Self> {
        let parsed = DistinguishedName::parse(dn)?;
        Ok(Self {
            name: parsed.leaf_value(),
            dn: dn.to_string(),
        })
    }

    pub fn find(store: &dyn DirectoryStore, context: &DirectoryContext, name: &str) -> DirectoryResult<Self> {
        if name.trim().is_empty() {
            return Err(DirectoryError::empty_argument("site"));
        }
        context.validate()?;
        let root = RootInfo::read(store, context)?;
        let filter = Filter::And(vec![Filter::eq("objectCategory", class::SITE), Filter::eq("name", name)]);
        let site = store
            .search(context, &sites_container(&root.configuration_nc), &filter, SearchScope::OneLevel)
            .classified(context)?
            .ok_or_else(|| DirectoryError::not_found("Site", name))?;
        Self::from_dn(site.dn())
    }

    /// Servers of this site designated as bridgeheads for `transport`.
    ///
    /// Changes to the returned set are written to each server immediately.
    pub fn bridgeheads(
        &self,
        store: &dyn DirectoryStore,
        context: &DirectoryContext,
        transport: Transport,
    ) -> DirectoryResult<ReplicaSet> {
        let root = RootInfo::read(store, context)?;
        let transport_dn = transport_dn(&root.configuration_nc, transport.rdn());
        let filter = Filter::And(vec![
            Filter::eq("objectCategory", class::SERVER),
            Filter::eq(attr::BRIDGEHEAD_TRANSPORT_LIST, transport_dn.as_str()),
        ]);
        let servers = store
            .search_all(context, &self.dn, &filter, SearchScope::Subtree)
            .classified(context)?;

        let members = servers
            .iter()
            .map(|server| {
                let ntdsa_dn = format!("{},{}", NTDS_SETTINGS_RDN, server.dn());
                ReplicaServer::from_ntdsa(store, context, &ntdsa_dn, root.technology)
            })
            .collect::<DirectoryResult<Vec<_>>>()?;

        Ok(ReplicaSet::for_site(context.clone(), self.dn.clone(), transport_dn, members))
    }
}
