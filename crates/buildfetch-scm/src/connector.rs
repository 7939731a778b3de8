//! Connector trait definition for buildfetch
//!
//! `ScmConnector` is the only seam between the core and a source-control
//! server. Each server operation the fetch pipeline needs is one typed
//! method; transports, credentials and retry policy live behind it.
//!
//! An in-memory implementation is provided in the `fakes` module.

use async_trait::async_trait;

use crate::error::RepositoryResult;
use crate::model::{
    AcceptOutcome, ComponentDescriptor, ItemId, LoadOutcome, LoadRequest, SelectionMode,
    ServerInfo, SourceHandle,
};

/// Typed access to a source-control server.
///
/// Guarantees expected by the core:
/// - `list_components` returns components in server order.
/// - `accept` only accepts change sets of the listed components; pending
///   change sets of other components are reported as discarded.
/// - `load` writes only inside `request.destination_root`.
#[async_trait]
pub trait ScmConnector: Send + Sync {
    /// Probe the server and report its version.
    async fn test_connection(&self) -> RepositoryResult<ServerInfo>;

    /// Resolve a workspace/stream/snapshot/build-definition selection.
    async fn resolve_source(&self, selection: &SelectionMode) -> RepositoryResult<SourceHandle>;

    /// Components of the resolved source, in server order.
    async fn list_components(
        &self,
        source: &SourceHandle,
    ) -> RepositoryResult<Vec<ComponentDescriptor>>;

    /// Read a text file stored in a component (load-rule files).
    async fn read_file(
        &self,
        source: &SourceHandle,
        component: &ItemId,
        path: &str,
    ) -> RepositoryResult<String>;

    /// Accept pending change sets of `components` into the source workspace.
    async fn accept(
        &self,
        source: &SourceHandle,
        components: &[ItemId],
    ) -> RepositoryResult<AcceptOutcome>;

    /// Materialize files according to `request`.
    async fn load(
        &self,
        source: &SourceHandle,
        request: &LoadRequest,
    ) -> RepositoryResult<LoadOutcome>;
}
