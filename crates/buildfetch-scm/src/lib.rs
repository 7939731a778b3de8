//! buildfetch-scm: Source-Control Model and Connector Seam
//!
//! This crate defines what the fetch pipeline knows about a source-control
//! server: item identities, components, raw change-set data and the
//! `ScmConnector` trait with one typed method per server operation.
//!
//! ## Layer 0 - Repository access
//!
//! Focus: a narrow, mockable interface. Transport, credentials and retry
//! belong to concrete adapters.
//!
//! ## Key Components
//!
//! - `ScmConnector`: accept/load/test-connection operations
//! - `ServerVersion`: dotted version with numeric ordering
//! - `fakes::MemoryRepository`: in-memory adapter driven by fixtures

pub mod connector;
mod error;
pub mod fakes;
pub mod model;
mod version;

pub use connector::ScmConnector;
pub use error::{RepositoryError, RepositoryResult};
pub use model::{
    normalize_path, AcceptOutcome, BaselineIdentity, ComponentAction, ComponentChange,
    ComponentDescriptor, ItemId, LoadOutcome, LoadRequest, LoadRequestEntry, RawChangeSet,
    RawVersionableChange, SelectionMode, ServerInfo, SourceHandle, WorkItemDesc,
};
pub use version::ServerVersion;
