//! Directory contexts
//!
//! A context names the target of an operation. It is immutable; deriving a
//! context for another server produces a new value with the same credentials.

use std::fmt;

use crate::error::{DirectoryError, DirectoryResult};

/// What a context's target names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    /// A single directory server (`host` or `host:port`)
    Server,
    /// A forest, by its root DNS name
    Forest,
    /// A configuration set of secondary-technology instances
    ConfigurationSet,
}

/// Bind credentials. The password never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user: String,
    password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Target and credentials for a directory operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryContext {
    kind: ContextKind,
    target: String,
    credentials: Option<Credentials>,
}

impl DirectoryContext {
    /// Context for a single server
    pub fn server(name: impl Into<String>) -> Self {
        Self::new(ContextKind::Server, name)
    }

    /// Context for a forest
    pub fn forest(name: impl Into<String>) -> Self {
        Self::new(ContextKind::Forest, name)
    }

    /// Context for a configuration set
    pub fn configuration_set(name: impl Into<String>) -> Self {
        Self::new(ContextKind::ConfigurationSet, name)
    }

    fn new(kind: ContextKind, target: impl Into<String>) -> Self {
        Self {
            kind,
            target: target.into(),
            credentials: None,
        }
    }

    /// Same target, bound with `credentials`
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Server context for `name`, carrying over the credentials
    pub fn for_server(&self, name: impl Into<String>) -> Self {
        Self {
            kind: ContextKind::Server,
            target: name.into(),
            credentials: self.credentials.clone(),
        }
    }

    pub fn kind(&self) -> ContextKind {
        self.kind
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn is_server(&self) -> bool {
        self.kind == ContextKind::Server
    }

    /// The server name, for server contexts only
    pub fn server_name(&self) -> Option<&str> {
        self.is_server().then_some(self.target.as_str())
    }

    /// Reject an empty target.
    pub fn validate(&self) -> DirectoryResult<()> {
        if self.target.trim().is_empty() {
            return Err(DirectoryError::empty_argument("context.target"));
        }
        Ok(())
    }

    /// Reject an empty target or a non-server context.
    pub fn validate_server(&self) -> DirectoryResult<()> {
        self.validate()?;
        if !self.is_server() {
            return Err(DirectoryError::invalid_argument(
                "context",
                "must target a directory server",
            ));
        }
        Ok(())
    }
}

impl fmt::Display for DirectoryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.target)
    }
}
