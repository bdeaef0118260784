//! Well-known names: attributes, object classes, containers and flags

/// Attribute names
pub mod attr {
    pub const DNS_ROOT: &str = "dnsRoot";
    pub const ENABLED: &str = "Enabled";
    pub const NC_NAME: &str = "nCName";
    pub const SYSTEM_FLAGS: &str = "systemFlags";
    pub const REPLICA_LOCATIONS: &str = "msDS-NC-Replica-Locations";
    pub const SD_REFERENCE_DOMAIN: &str = "msDS-SDReferenceDomain";
    pub const FSMO_ROLE_OWNER: &str = "fSMORoleOwner";
    pub const INSTANCE_TYPE: &str = "instanceType";
    pub const HAS_MASTER_NCS: &str = "msDS-HasMasterNCs";
    pub const DNS_HOST_NAME: &str = "dNSHostName";
    pub const SERVER_VERSION: &str = "operatingSystemVersion";
    pub const LDAP_PORT: &str = "msDS-PortLDAP";
    pub const BRIDGEHEAD_TRANSPORT_LIST: &str = "bridgeheadTransportList";

    pub const SITE_LIST: &str = "siteList";
    pub const COST: &str = "cost";
    pub const REPL_INTERVAL: &str = "replInterval";
    pub const OPTIONS: &str = "options";
    pub const SCHEDULE: &str = "schedule";

    // RootDSE
    pub const DS_SERVICE_NAME: &str = "dsServiceName";
    pub const CONFIGURATION_NC: &str = "configurationNamingContext";
    pub const NAMING_CONTEXTS: &str = "namingContexts";
    pub const SUPPORTED_CAPABILITIES: &str = "supportedCapabilities";
    pub const REPLICATE_SINGLE_OBJECT: &str = "replicateSingleObject";
}

/// Object classes
pub mod class {
    pub const CROSS_REF: &str = "crossRef";
    pub const CROSS_REF_CONTAINER: &str = "crossRefContainer";
    pub const DOMAIN_DNS: &str = "domainDNS";
    pub const CONFIGURATION: &str = "configuration";
    pub const CONTAINER: &str = "container";
    pub const SITES_CONTAINER: &str = "sitesContainer";
    pub const SITE: &str = "site";
    pub const SERVERS_CONTAINER: &str = "serversContainer";
    pub const SERVER: &str = "server";
    pub const NTDS_DSA: &str = "nTDSDSA";
    pub const INTER_SITE_TRANSPORT: &str = "interSiteTransport";
    pub const SITE_LINK: &str = "siteLink";
    pub const ROOT_DSE: &str = "rootDSE";
}

/// Capability OIDs advertised on the RootDSE
pub mod capability {
    pub const PRIMARY: &str = "1.2.840.113556.1.4.800";
    pub const SECONDARY: &str = "1.2.840.113556.1.4.1851";
}

/// Bit flags
pub mod flags {
    /// systemFlags: cross-reference names a naming context of this directory
    pub const CR_NTDS_NC: i64 = 0x1;
    /// systemFlags: cross-reference names a domain
    pub const CR_NTDS_DOMAIN: i64 = 0x2;
    /// systemFlags: not replicated to global catalogs
    pub const CR_NTDS_NOT_GC_REPLICATED: i64 = 0x4;

    /// instanceType: head of a naming context
    pub const IT_NC_HEAD: i64 = 0x1;
    /// instanceType: writable on this server
    pub const IT_WRITE: i64 = 0x4;
}

/// The RootDSE is addressed by the empty DN
pub const ROOT_DSE: &str = "";

pub const NTDS_SETTINGS_RDN: &str = "CN=NTDS Settings";

pub fn configuration_nc(root_dn: &str) -> String {
    format!("CN=Configuration,{}", root_dn)
}

pub fn partitions_container(config_nc: &str) -> String {
    format!("CN=Partitions,{}", config_nc)
}

pub fn sites_container(config_nc: &str) -> String {
    format!("CN=Sites,{}", config_nc)
}

pub fn site_dn(config_nc: &str, site: &str) -> String {
    format!("CN={},CN=Sites,{}", super::dn::escape_value(site), config_nc)
}

pub fn servers_container(config_nc: &str, site: &str) -> String {
    format!("CN=Servers,{}", site_dn(config_nc, site))
}

pub fn transports_container(config_nc: &str) -> String {
    format!("CN=Inter-Site Transports,CN=Sites,{}", config_nc)
}

pub fn transport_dn(config_nc: &str, transport_rdn: &str) -> String {
    format!("CN={},{}", transport_rdn, transports_container(config_nc))
}
