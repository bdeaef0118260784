//! RootDSE reads and store technology detection

use serde::{Deserialize, Serialize};

use super::context::DirectoryContext;
use super::wellknown::{attr, capability, ROOT_DSE};
use super::DirectoryStore;
use crate::error::{Classify, DirectoryError, DirectoryResult};

/// Directory technology a server runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Technology {
    /// Forest-wide directory with locator-based discovery
    Primary,
    /// Standalone instances grouped in configuration sets
    Secondary,
}

impl Technology {
    /// Detect from advertised capability OIDs
    pub fn from_capabilities<'a>(mut capabilities: impl Iterator<Item = &'a str>) -> Option<Self> {
        capabilities.find_map(|oid| match oid {
            capability::PRIMARY => Some(Technology::Primary),
            capability::SECONDARY => Some(Technology::Secondary),
            _ => None,
        })
    }

    pub fn capability_oid(&self) -> &'static str {
        match self {
            Technology::Primary => capability::PRIMARY,
            Technology::Secondary => capability::SECONDARY,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Technology::Primary => "primary",
            Technology::Secondary => "secondary",
        }
    }
}

/// The RootDSE attributes this crate relies on
#[derive(Debug, Clone)]
pub struct RootInfo {
    pub dns_host_name: String,
    pub ds_service_name: String,
    pub configuration_nc: String,
    pub naming_contexts: Vec<String>,
    pub technology: Technology,
}

impl RootInfo {
    /// Read the RootDSE of the server `context` resolves to.
    pub fn read(store: &dyn DirectoryStore, context: &DirectoryContext) -> DirectoryResult<Self> {
        let root = store.get(context, ROOT_DSE).classified(context)?;
        let required = |name: &str| {
            root.text(name).map(str::to_string).ok_or_else(|| {
                DirectoryError::operation_failed(0, format!("RootDSE is missing {}", name))
            })
        };

        let technology = Technology::from_capabilities(root.texts(attr::SUPPORTED_CAPABILITIES).into_iter())
            .ok_or_else(|| DirectoryError::operation_failed(0, "server advertises no known directory capability"))?;

        Ok(Self {
            dns_host_name: required(attr::DNS_HOST_NAME)?,
            ds_service_name: required(attr::DS_SERVICE_NAME)?,
            configuration_nc: required(attr::CONFIGURATION_NC)?,
            naming_contexts: root
                .texts(attr::NAMING_CONTEXTS)
                .into_iter()
                .map(str::to_string)
                .collect(),
            technology,
        })
    }

    /// Whether the server hosts the naming context `dn`
    pub fn hosts(&self, dn: &str) -> bool {
        self.naming_contexts
            .iter()
            .any(|nc| super::dn::dn_equals(nc, dn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_technology_from_capabilities() {
        let caps = ["1.2.840.113556.1.4.1670", capability::PRIMARY];
        assert_eq!(Technology::from_capabilities(caps.into_iter()), Some(Technology::Primary));

        let caps = [capability::SECONDARY];
        assert_eq!(Technology::from_capabilities(caps.into_iter()), Some(Technology::Secondary));

        assert_eq!(Technology::from_capabilities(std::iter::empty()), None);
    }
}
