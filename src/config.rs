use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{RouterError, RouterResult};

/// A peer cluster this cluster knows about.
///
/// Only entries with `proxy = true` are reachable through the router;
/// the rest are recognized in identifiers but never contacted.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RemoteCluster {
    /// URL scheme used to reach the peer, normally "https".
    pub scheme: String,
    /// Host (and optional port) of the peer's API endpoint.
    pub host: String,
    /// Whether this cluster is willing to forward requests to the peer.
    pub proxy: bool,
    /// Skip TLS certificate verification when talking to the peer.
    pub insecure: bool,
}

impl RemoteCluster {
    pub fn base_url(&self) -> RouterResult<Url> {
        Url::parse(&format!("{}://{}/", self.scheme, self.host)).map_err(|err| {
            RouterError::config(format!("invalid remote address {:?}: {}", self.host, err))
        })
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LoginConfig {
    /// Cluster id of the peer designated authoritative for identity,
    /// or empty when this cluster manages its own accounts.
    #[serde(default)]
    pub login_cluster: String,
}

/// Cluster configuration owned by the router for its lifetime.
///
/// Captured at construction and immutable afterwards; replacing the
/// configuration means constructing a new router.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Cluster {
    /// Five-character lowercase-alphanumeric cluster id.
    pub cluster_id: String,
    /// Root credential used for writes the router performs on its own
    /// behalf. Never serialized into the exported configuration.
    #[serde(skip_serializing, default)]
    pub system_root_token: String,
    #[serde(default)]
    pub login: LoginConfig,
    /// Peer clusters keyed by cluster id.
    #[serde(default)]
    pub remote_clusters: HashMap<String, RemoteCluster>,
}

impl Cluster {
    /// The JSON view served by `config_get`. Secret fields are skipped
    /// at the serde level, so serializing the whole value is safe.
    pub fn exported_config(&self) -> RouterResult<serde_json::Value> {
        serde_json::to_value(self)
            .map_err(|err| anyhow::anyhow!("error exporting configuration: {}", err).into())
    }
}
