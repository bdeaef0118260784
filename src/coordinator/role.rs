//! Naming role owner discovery and single-object replication
//!
//! The role is assigned outside this crate; `locate` only reads who holds it.

use crate::error::{Classify, DirectoryError, DirectoryResult};
use crate::observability::ObservationScope;
use crate::replica::ReplicaServer;
use crate::store::wellknown::{attr, partitions_container, ROOT_DSE};
use crate::store::{DirectoryContext, DirectoryStore, RootInfo};

/// The server currently holding the naming role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorRef {
    server: ReplicaServer,
    context: DirectoryContext,
}

impl CoordinatorRef {
    pub fn name(&self) -> &str {
        self.server.name()
    }

    pub fn ntdsa_dn(&self) -> &str {
        self.server.ntdsa_dn()
    }

    pub fn server(&self) -> &ReplicaServer {
        &self.server
    }

    /// Context bound to the coordinator
    pub fn context(&self) -> &DirectoryContext {
        &self.context
    }
}

pub struct RoleCoordinator<'a> {
    store: &'a dyn DirectoryStore,
}

impl<'a> RoleCoordinator<'a> {
    pub fn new(store: &'a dyn DirectoryStore) -> Self {
        Self { store }
    }

    /// Read the naming role owner as seen from `context`.
    pub fn locate(&self, context: &DirectoryContext) -> DirectoryResult<CoordinatorRef> {
        let root = RootInfo::read(self.store, context)?;
        let container = self
            .store
            .get(context, &partitions_container(&root.configuration_nc))
            .classified(context)?;
        let owner = container
            .text(attr::FSMO_ROLE_OWNER)
            .ok_or_else(|| DirectoryError::operation_failed(0, "naming role owner is not set"))?;

        let server = ReplicaServer::from_ntdsa(self.store, context, owner, root.technology)?;
        let context = context.for_server(server.name());
        Ok(CoordinatorRef { server, context })
    }

    /// Ask `coordinator` to pull `object_dn` from the server whose settings
    /// object is `source_ntdsa`, ahead of normal propagation.
    pub fn push_replication(
        &self,
        object_dn: &str,
        source_ntdsa: &str,
        coordinator: &CoordinatorRef,
    ) -> DirectoryResult<()> {
        let scope = ObservationScope::with_fields(
            "REPLICATION_PUSH",
            &[("object", object_dn), ("coordinator", coordinator.name())],
        );

        let result = self.write_directive(object_dn, source_ntdsa, coordinator.context());
        match &result {
            Ok(()) => scope.complete(),
            Err(e) => scope.fail(&e.to_string()),
        }
        result
    }

    fn write_directive(&self, object_dn: &str, source_ntdsa: &str, ctx: &DirectoryContext) -> DirectoryResult<()> {
        let mut root = self.store.get(ctx, ROOT_DSE).classified(ctx)?;
        let directive = format!("{}:{}", source_ntdsa, object_dn);
        self.store
            .set_attribute(&mut root, attr::REPLICATE_SINGLE_OBJECT, vec![directive.into()])
            .classified(ctx)?;
        self.store.commit(ctx, &mut root).classified(ctx)
    }
}
