//! Directory Store Subsystem
//!
//! The seams to the outside world:
//! - `DirectoryStore`: entry read/create/commit/delete/search against one
//!   server named by a `DirectoryContext`
//! - `LocatorService`: DNS-style discovery of servers hosting a domain or
//!   partition
//!
//! Both report failures as `RawError` codes; callers classify them.
//! `InMemoryDirectory` implements both over a multi-server model and is what
//! the tests and the CLI run against.

mod context;
pub mod dn;
mod entry;
mod filter;
mod memory;
mod root;
pub mod wellknown;

pub use context::{ContextKind, Credentials, DirectoryContext};
pub use dn::DistinguishedName;
pub use entry::{AttributeValue, Entry, Modification};
pub use filter::Filter;
pub use memory::{DirectorySnapshot, Fault, InMemoryDirectory, ServerSpec, StoreOp};
pub use root::{RootInfo, Technology};

use crate::error::RawError;

/// Result of a raw store or locator call
pub type StoreResult<T> = Result<T, RawError>;

/// Search depth relative to the base object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    Base,
    OneLevel,
    Subtree,
}

/// Directory entry access against the server a context names
///
/// Writes are buffered on the `Entry` until `commit`.
pub trait DirectoryStore: Send + Sync {
    /// Bind to an existing object. `""` is the RootDSE.
    fn get(&self, context: &DirectoryContext, dn: &str) -> StoreResult<Entry>;

    /// Provisional child of `parent`; nothing is written until commit
    fn create_child(
        &self,
        context: &DirectoryContext,
        parent: &str,
        rdn: &str,
        object_class: &str,
    ) -> StoreResult<Entry>;

    /// Write a new entry or its pending modifications.
    fn commit(&self, context: &DirectoryContext, entry: &mut Entry) -> StoreResult<()>;

    /// Reload an entry's attributes from the server.
    fn refresh(&self, context: &DirectoryContext, entry: &mut Entry) -> StoreResult<()>;

    /// Delete a leaf object.
    fn delete(&self, context: &DirectoryContext, dn: &str) -> StoreResult<()>;

    /// First match under `base`
    fn search(
        &self,
        context: &DirectoryContext,
        base: &str,
        filter: &Filter,
        scope: SearchScope,
    ) -> StoreResult<Option<Entry>> {
        Ok(self.search_all(context, base, filter, scope)?.into_iter().next())
    }

    /// All matches under `base`
    fn search_all(
        &self,
        context: &DirectoryContext,
        base: &str,
        filter: &Filter,
        scope: SearchScope,
    ) -> StoreResult<Vec<Entry>>;

    /// Read an attribute from the entry's cache.
    fn get_attribute(&self, entry: &Entry, name: &str) -> StoreResult<Vec<AttributeValue>> {
        Ok(entry.values(name).to_vec())
    }

    /// Buffer a full replacement of an attribute. Empty `values` clears it.
    fn set_attribute(&self, entry: &mut Entry, name: &str, values: Vec<AttributeValue>) -> StoreResult<()> {
        entry.replace(name, values);
        Ok(())
    }
}

bitflags::bitflags! {
    /// Locator request flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct LocatorFlags: u32 {
        /// Bypass the locator cache
        const FORCE_REDISCOVERY = 0x0000_0001;
        /// Any server offering LDAP qualifies
        const ONLY_LDAP_NEEDED = 0x0000_8000;
    }
}

/// Outcome of a server enumeration
///
/// Per-server failures are reported alongside the names that did resolve.
#[derive(Debug, Clone, Default)]
pub struct LocatorEnumeration {
    pub servers: Vec<String>,
    pub errors: Vec<RawError>,
}

/// Server discovery by domain (or partition) DNS name
pub trait LocatorService: Send + Sync {
    /// One server hosting `domain`, optionally restricted to `site`
    fn find_server(&self, domain: &str, site: Option<&str>, flags: LocatorFlags) -> StoreResult<String>;

    /// Every server hosting `domain`, optionally restricted to `site`
    fn enumerate_servers(
        &self,
        domain: &str,
        site: Option<&str>,
        flags: LocatorFlags,
    ) -> StoreResult<LocatorEnumeration>;
}
