//! Federation router for the Lattice multi-cluster data-management
//! platform.
//!
//! A single cluster exposes a uniform object API, but any given object
//! may live on a peer cluster. The router sits between the cluster's
//! HTTP front end and its local backend, dispatching each call either
//! locally or to a peer over the same API, so callers see one
//! federated namespace. Along the way it shapes bearer tokens for each
//! peer, verifies content hashes on federated reads, and keeps local
//! copies of authoritative user records fresh.

pub mod api;
pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod federation;
pub mod rpc;
pub mod tokens;

pub use backend::Backend;
pub use config::{Cluster, LoginConfig, RemoteCluster};
pub use context::RequestContext;
pub use error::{RouterError, RouterResult};
pub use federation::Router;
