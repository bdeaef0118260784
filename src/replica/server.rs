//! Replica servers
//!
//! A closed set of server variants, one per store technology. Code that needs
//! a variant-specific identifier matches exhaustively.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::{Classify, DirectoryError, DirectoryResult};
use crate::store::wellknown::{attr, class, sites_container};
use crate::store::{DirectoryContext, DirectoryStore, DistinguishedName, Filter, RootInfo, SearchScope, Technology};

/// `major.minor` server version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
}

impl ServerVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl FromStr for ServerVersion {
    type Err = DirectoryError;

    /// Accepts `major`, `major.minor` or longer forms such as `6.3 (9600)`;
    /// anything past the minor number is ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DirectoryError::invalid_argument("version", format!("'{}' is not a version", s));
        let numeric: String = s
            .trim()
            .chars()
            .take_while(|c| c.is_ascii_digit() || *c == '.')
            .collect();
        let mut parts = numeric.split('.').filter(|p| !p.is_empty());
        let major = parts.next().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
        let minor = match parts.next() {
            Some(p) => p.parse().map_err(|_| invalid())?,
            None => 0,
        };
        Ok(Self { major, minor })
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl Serialize for ServerVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A server of the primary technology
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PrimaryServer {
    /// DNS host name
    pub name: String,
    pub site_name: String,
    pub site_dn: String,
    pub server_dn: String,
    pub ntdsa_dn: String,
    pub version: ServerVersion,
}

/// An instance of the secondary technology
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecondaryServer {
    /// `host:port`
    pub name: String,
    pub host: String,
    pub port: u16,
    pub site_name: String,
    pub site_dn: String,
    pub server_dn: String,
    pub ntdsa_dn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "technology", rename_all = "lowercase")]
pub enum ReplicaServer {
    Primary(PrimaryServer),
    Secondary(SecondaryServer),
}

impl ReplicaServer {
    pub fn name(&self) -> &str {
        match self {
            ReplicaServer::Primary(s) => &s.name,
            ReplicaServer::Secondary(s) => &s.name,
        }
    }

    pub fn site_name(&self) -> &str {
        match self {
            ReplicaServer::Primary(s) => &s.site_name,
            ReplicaServer::Secondary(s) => &s.site_name,
        }
    }

    /// DN of the server's directory-service settings object; this is the
    /// identifier stored in replica location lists
    pub fn ntdsa_dn(&self) -> &str {
        match self {
            ReplicaServer::Primary(s) => &s.ntdsa_dn,
            ReplicaServer::Secondary(s) => &s.ntdsa_dn,
        }
    }

    /// DN of the server object under its site
    pub fn server_dn(&self) -> &str {
        match self {
            ReplicaServer::Primary(s) => &s.server_dn,
            ReplicaServer::Secondary(s) => &s.server_dn,
        }
    }

    pub fn site_dn(&self) -> &str {
        match self {
            ReplicaServer::Primary(s) => &s.site_dn,
            ReplicaServer::Secondary(s) => &s.site_dn,
        }
    }

    pub fn technology(&self) -> Technology {
        match self {
            ReplicaServer::Primary(_) => Technology::Primary,
            ReplicaServer::Secondary(_) => Technology::Secondary,
        }
    }

    /// Collection equality: case-insensitive name
    pub fn same_name(&self, other: &ReplicaServer) -> bool {
        self.name().eq_ignore_ascii_case(other.name())
    }

    /// Resolve a server from the DN of its settings object.
    pub fn from_ntdsa(
        store: &dyn DirectoryStore,
        context: &DirectoryContext,
        ntdsa_dn: &str,
        technology: Technology,
    ) -> DirectoryResult<Self> {
        let ntdsa = DistinguishedName::parse(ntdsa_dn)?;
        let server_dn = ntdsa
            .parent()
            .ok_or_else(|| DirectoryError::invalid_argument("ntdsa_dn", "has no server object"))?;
        // server -> Servers container -> site
        let site_dn = server_dn
            .parent()
            .and_then(|servers| servers.parent())
            .ok_or_else(|| DirectoryError::invalid_argument("ntdsa_dn", "is not under a site"))?;

        let server = store.get(context, &server_dn.to_string()).classified(context)?;
        let host = server
            .text(attr::DNS_HOST_NAME)
            .ok_or_else(|| DirectoryError::operation_failed(0, format!("{} has no host name", server_dn)))?
            .to_string();

        match technology {
            Technology::Primary => {
                let version = server
                    .text(attr::SERVER_VERSION)
                    .map(str::parse::<ServerVersion>)
                    .transpose()?
                    .unwrap_or(ServerVersion::new(0, 0));
                Ok(ReplicaServer::Primary(PrimaryServer {
                    name: host,
                    site_name: site_dn.leaf_value(),
                    site_dn: site_dn.to_string(),
                    server_dn: server_dn.to_string(),
                    ntdsa_dn: ntdsa_dn.to_string(),
                    version,
                }))
            }
            Technology::Secondary => {
                let settings = store.get(context, ntdsa_dn).classified(context)?;
                let port = settings
                    .int(attr::LDAP_PORT)
                    .and_then(|p| u16::try_from(p).ok())
                    .ok_or_else(|| DirectoryError::operation_failed(0, format!("{} has no port", ntdsa_dn)))?;
                Ok(ReplicaServer::Secondary(SecondaryServer {
                    name: format!("{}:{}", host, port),
                    host,
                    port,
                    site_name: site_dn.leaf_value(),
                    site_dn: site_dn.to_string(),
                    server_dn: server_dn.to_string(),
                    ntdsa_dn: ntdsa_dn.to_string(),
                }))
            }
        }
    }

    /// Resolve a server by name (`host` or `host:port`).
    pub fn find(store: &dyn DirectoryStore, context: &DirectoryContext, name: &str) -> DirectoryResult<Self> {
        if name.trim().is_empty() {
            return Err(DirectoryError::empty_argument("name"));
        }
        let root = RootInfo::read(store, context)?;
        let (host, port) = match name.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| DirectoryError::invalid_argument("name", "port is not a number"))?;
                (host, Some(port))
            }
            None => (name, None),
        };

        let filter = Filter::And(vec![
            Filter::eq("objectCategory", class::SERVER),
            Filter::eq(attr::DNS_HOST_NAME, host),
        ]);
        let candidates = store
            .search_all(context, &sites_container(&root.configuration_nc), &filter, SearchScope::Subtree)
            .classified(context)?;

        for candidate in candidates {
            let ntdsa_dn = format!("CN=NTDS Settings,{}", candidate.dn());
            let server = Self::from_ntdsa(store, context, &ntdsa_dn, root.technology)?;
            let port_matches = match (&server, port) {
                (ReplicaServer::Secondary(s), Some(port)) => s.port == port,
                (ReplicaServer::Secondary(_), None) => false,
                (ReplicaServer::Primary(_), _) => port.is_none(),
            };
            if port_matches {
                return Ok(server);
            }
        }
        Err(DirectoryError::not_found("Server", name))
    }
}

impl fmt::Display for ReplicaServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parse_and_order() {
        assert_eq!("5.2".parse::<ServerVersion>().unwrap(), ServerVersion::new(5, 2));
        assert_eq!("6.3 (9600)".parse::<ServerVersion>().unwrap(), ServerVersion::new(6, 3));
        assert_eq!("10".parse::<ServerVersion>().unwrap(), ServerVersion::new(10, 0));
        assert!("five".parse::<ServerVersion>().is_err());
        assert!(ServerVersion::new(5, 0) < ServerVersion::new(5, 2));
        assert!(ServerVersion::new(10, 0) > ServerVersion::new(6, 3));
    }

    #[test]
    fn test_same_name_is_case_insensitive() {
        let a = ReplicaServer::Primary(PrimaryServer {
            name: "DC1.corp.com".into(),
            site_name: "Site1".into(),
            site_dn: String::new(),
            server_dn: String::new(),
            ntdsa_dn: String::new(),
            version: ServerVersion::new(6, 3),
        });
        let mut b = a.clone();
        if let ReplicaServer::Primary(p) = &mut b {
            p.name = "dc1.CORP.com".into();
        }
        assert!(a.same_name(&b));
    }
}
