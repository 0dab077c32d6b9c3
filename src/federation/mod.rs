//! The federation router: one entry point per API operation, each
//! dispatched to the local backend or to a peer cluster so callers see
//! a single federated namespace.

pub(crate) mod dispatch;
pub mod manifest;
pub(crate) mod users;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::api::*;
use crate::backend::Backend;
use crate::config::Cluster;
use crate::context::RequestContext;
use crate::error::{RouterError, RouterResult};
use crate::rpc::RpcClient;
use crate::tokens::TokenSalter;
use manifest::{portable_data_hash, rewrite_manifest};

/// Federation router for one cluster. Holds the cluster configuration,
/// the local backend, and one backend per reachable peer; all three are
/// fixed at construction.
pub struct Router {
    cluster: Arc<Cluster>,
    local: Arc<dyn Backend>,
    remotes: HashMap<String, Arc<dyn Backend>>,
}

impl Router {
    /// Build a router from configuration. Every remote with
    /// `proxy = true` gets an RPC client whose tokens are salted for
    /// that peer through the local backend.
    pub fn new(cluster: Arc<Cluster>, local: Arc<dyn Backend>) -> RouterResult<Self> {
        let mut remotes: HashMap<String, Arc<dyn Backend>> = HashMap::new();
        for (id, remote) in &cluster.remote_clusters {
            if !remote.proxy {
                continue;
            }
            let salter = Arc::new(TokenSalter::new(local.clone(), id.clone()));
            let client = RpcClient::new(id.clone(), remote.base_url()?, remote.insecure, salter);
            tracing::info!(remote = %id, host = %remote.host, "configured proxy remote");
            remotes.insert(id.clone(), Arc::new(client));
        }
        Ok(Router {
            cluster,
            local,
            remotes,
        })
    }

    /// Build a router around pre-built remote backends. Used by tests
    /// and by embedders that bring their own transport.
    pub fn with_backends(
        cluster: Arc<Cluster>,
        local: Arc<dyn Backend>,
        remotes: HashMap<String, Arc<dyn Backend>>,
    ) -> Self {
        Router {
            cluster,
            local,
            remotes,
        }
    }

    pub(crate) fn cluster(&self) -> &Cluster {
        &self.cluster
    }

    pub(crate) fn local(&self) -> &Arc<dyn Backend> {
        &self.local
    }

    pub(crate) fn remotes(&self) -> &HashMap<String, Arc<dyn Backend>> {
        &self.remotes
    }

    /// Serialize this cluster's exported (secret-free) configuration.
    /// Always answered locally.
    pub async fn config_get(&self, _ctx: &RequestContext) -> RouterResult<Value> {
        self.cluster.exported_config()
    }

    /// When a peer is designated authoritative for identity, answer
    /// with an application-layer redirect to its login endpoint without
    /// contacting any backend; otherwise defer to the local backend.
    pub async fn login(
        &self,
        ctx: &RequestContext,
        options: LoginOptions,
    ) -> RouterResult<LoginResponse> {
        let id = &self.cluster.login.login_cluster;
        if id.is_empty() || id == &self.cluster.cluster_id {
            return self.local.login(ctx, options).await;
        }
        let remote = self.remotes.get(id).ok_or_else(|| {
            RouterError::config(format!(
                "designated login cluster {:?} is not defined",
                id
            ))
        })?;
        let mut target = remote.base_url().join(endpoint::LOGIN.path).map_err(|err| {
            anyhow::anyhow!("internal error getting redirect target: {}", err)
        })?;
        {
            let mut query = target.query_pairs_mut();
            query.append_pair("return_to", &options.return_to);
            if !options.remote.is_empty() {
                query.append_pair("remote", &options.remote);
            }
        }
        Ok(LoginResponse {
            redirect_location: target.to_string(),
        })
    }

    pub async fn collection_create(
        &self,
        ctx: &RequestContext,
        options: CreateOptions,
    ) -> RouterResult<Collection> {
        self.choose_backend(&options.cluster_id)
            .collection_create(ctx, options)
            .await
    }

    pub async fn collection_update(
        &self,
        ctx: &RequestContext,
        options: UpdateOptions,
    ) -> RouterResult<Collection> {
        self.choose_backend(&options.uuid)
            .collection_update(ctx, options)
            .await
    }

    /// Get a collection by object UUID or by content hash.
    ///
    /// A UUID read goes to the owning cluster; if that is a remote, the
    /// returned manifest is rewritten so its signed locators come back
    /// through this cluster. A content-hash read federates: local
    /// first, then every remote, and each response must hash back to
    /// the requested identifier before it can win.
    pub async fn collection_get(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Collection> {
        if options.uuid.len() == 27 {
            let backend = self.choose_backend(&options.uuid);
            let mut collection = backend.collection_get(ctx, options.clone()).await?;
            if &options.uuid[..5] != self.cluster.cluster_id.as_str() {
                collection.manifest_text =
                    rewrite_manifest(&collection.manifest_text, &options.uuid[..5]);
            }
            return Ok(collection);
        }

        let (winner_tx, mut winner_rx) = mpsc::channel::<Collection>(1);
        let requested = options.uuid.clone();
        let fan_options = options;
        self.try_local_then_remotes(ctx, move |ctx, remote_id, backend| {
            let options = fan_options.clone();
            let requested = requested.clone();
            let winner_tx = winner_tx.clone();
            async move {
                let mut collection = backend.collection_get(&ctx, options).await?;
                // The requested id is either hash+size or
                // hash+size+hints; only the hash+size part must match
                // the recomputed value.
                let pdh = portable_data_hash(&collection.manifest_text);
                if pdh != requested && !requested.starts_with(&format!("{}+", pdh)) {
                    let err = RouterError::bad_gateway(format!(
                        "bad portable data hash {:?} received from remote {:?} (expected {:?})",
                        pdh, remote_id, requested
                    ));
                    tracing::warn!(
                        computed = %pdh,
                        remote = %remote_id,
                        expected = %requested,
                        "content hash mismatch in federated read"
                    );
                    return Err(err);
                }
                if !remote_id.is_empty() {
                    collection.manifest_text =
                        rewrite_manifest(&collection.manifest_text, &remote_id);
                }
                // Single-slot rendezvous: the first writer delivers
                // the result, later writers see the slot full and
                // their value is discarded.
                let _ = winner_tx.try_send(collection);
                Ok(())
            }
        })
        .await?;
        winner_rx.recv().await.ok_or_else(|| {
            anyhow::anyhow!("federated read succeeded but no result was published").into()
        })
    }

    pub async fn collection_list(
        &self,
        ctx: &RequestContext,
        options: ListOptions,
    ) -> RouterResult<CollectionList> {
        self.choose_backend(&options.cluster_id)
            .collection_list(ctx, options)
            .await
    }

    pub async fn collection_provenance(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Value> {
        self.choose_backend(&options.uuid)
            .collection_provenance(ctx, options)
            .await
    }

    pub async fn collection_used_by(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Value> {
        self.choose_backend(&options.uuid)
            .collection_used_by(ctx, options)
            .await
    }

    pub async fn collection_delete(
        &self,
        ctx: &RequestContext,
        options: DeleteOptions,
    ) -> RouterResult<Collection> {
        self.choose_backend(&options.uuid)
            .collection_delete(ctx, options)
            .await
    }

    pub async fn collection_trash(
        &self,
        ctx: &RequestContext,
        options: DeleteOptions,
    ) -> RouterResult<Collection> {
        self.choose_backend(&options.uuid)
            .collection_trash(ctx, options)
            .await
    }

    pub async fn collection_untrash(
        &self,
        ctx: &RequestContext,
        options: UntrashOptions,
    ) -> RouterResult<Collection> {
        self.choose_backend(&options.uuid)
            .collection_untrash(ctx, options)
            .await
    }

    pub async fn container_create(
        &self,
        ctx: &RequestContext,
        options: CreateOptions,
    ) -> RouterResult<Container> {
        self.choose_backend(&options.cluster_id)
            .container_create(ctx, options)
            .await
    }

    pub async fn container_update(
        &self,
        ctx: &RequestContext,
        options: UpdateOptions,
    ) -> RouterResult<Container> {
        self.choose_backend(&options.uuid)
            .container_update(ctx, options)
            .await
    }

    pub async fn container_get(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Container> {
        self.choose_backend(&options.uuid)
            .container_get(ctx, options)
            .await
    }

    pub async fn container_list(
        &self,
        ctx: &RequestContext,
        options: ListOptions,
    ) -> RouterResult<ContainerList> {
        self.choose_backend(&options.cluster_id)
            .container_list(ctx, options)
            .await
    }

    pub async fn container_delete(
        &self,
        ctx: &RequestContext,
        options: DeleteOptions,
    ) -> RouterResult<Container> {
        self.choose_backend(&options.uuid)
            .container_delete(ctx, options)
            .await
    }

    pub async fn container_lock(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Container> {
        self.choose_backend(&options.uuid)
            .container_lock(ctx, options)
            .await
    }

    pub async fn container_unlock(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Container> {
        self.choose_backend(&options.uuid)
            .container_unlock(ctx, options)
            .await
    }

    pub async fn specimen_create(
        &self,
        ctx: &RequestContext,
        options: CreateOptions,
    ) -> RouterResult<Specimen> {
        self.choose_backend(&options.cluster_id)
            .specimen_create(ctx, options)
            .await
    }

    pub async fn specimen_update(
        &self,
        ctx: &RequestContext,
        options: UpdateOptions,
    ) -> RouterResult<Specimen> {
        self.choose_backend(&options.uuid)
            .specimen_update(ctx, options)
            .await
    }

    pub async fn specimen_get(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Specimen> {
        self.choose_backend(&options.uuid)
            .specimen_get(ctx, options)
            .await
    }

    pub async fn specimen_list(
        &self,
        ctx: &RequestContext,
        options: ListOptions,
    ) -> RouterResult<SpecimenList> {
        self.choose_backend(&options.cluster_id)
            .specimen_list(ctx, options)
            .await
    }

    pub async fn specimen_delete(
        &self,
        ctx: &RequestContext,
        options: DeleteOptions,
    ) -> RouterResult<Specimen> {
        self.choose_backend(&options.uuid)
            .specimen_delete(ctx, options)
            .await
    }

    pub async fn user_create(
        &self,
        ctx: &RequestContext,
        options: CreateOptions,
    ) -> RouterResult<User> {
        self.choose_backend(&options.cluster_id)
            .user_create(ctx, options)
            .await
    }

    pub async fn user_update(
        &self,
        ctx: &RequestContext,
        options: UpdateOptions,
    ) -> RouterResult<User> {
        self.choose_backend(&options.uuid)
            .user_update(ctx, options)
            .await
    }

    pub async fn user_update_uuid(
        &self,
        ctx: &RequestContext,
        options: UpdateUuidOptions,
    ) -> RouterResult<User> {
        self.choose_backend(&options.uuid)
            .user_update_uuid(ctx, options)
            .await
    }

    /// Merging two accounts runs where the account being absorbed
    /// lives.
    pub async fn user_merge(
        &self,
        ctx: &RequestContext,
        options: UserMergeOptions,
    ) -> RouterResult<User> {
        self.choose_backend(&options.old_user_uuid)
            .user_merge(ctx, options)
            .await
    }

    pub async fn user_activate(
        &self,
        ctx: &RequestContext,
        options: UserActivateOptions,
    ) -> RouterResult<User> {
        self.choose_backend(&options.uuid)
            .user_activate(ctx, options)
            .await
    }

    pub async fn user_setup(
        &self,
        ctx: &RequestContext,
        options: UserSetupOptions,
    ) -> RouterResult<Value> {
        self.choose_backend(&options.uuid)
            .user_setup(ctx, options)
            .await
    }

    pub async fn user_unsetup(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<User> {
        self.choose_backend(&options.uuid)
            .user_unsetup(ctx, options)
            .await
    }

    pub async fn user_get(&self, ctx: &RequestContext, options: GetOptions) -> RouterResult<User> {
        self.choose_backend(&options.uuid).user_get(ctx, options).await
    }

    pub async fn user_get_current(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<User> {
        self.choose_backend(&options.uuid)
            .user_get_current(ctx, options)
            .await
    }

    pub async fn user_get_system(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<User> {
        self.choose_backend(&options.uuid)
            .user_get_system(ctx, options)
            .await
    }

    /// List users, mirroring authoritative records into the local
    /// cluster when a login cluster is designated.
    pub async fn user_list(
        &self,
        ctx: &RequestContext,
        options: ListOptions,
    ) -> RouterResult<UserList> {
        let login_cluster = self.cluster.login.login_cluster.clone();
        if !login_cluster.is_empty() && login_cluster != self.cluster.cluster_id {
            self.user_list_via_login_cluster(ctx, options, &login_cluster)
                .await
        } else {
            self.choose_backend(&options.cluster_id)
                .user_list(ctx, options)
                .await
        }
    }

    pub async fn user_delete(
        &self,
        ctx: &RequestContext,
        options: DeleteOptions,
    ) -> RouterResult<User> {
        self.choose_backend(&options.uuid)
            .user_delete(ctx, options)
            .await
    }

    /// Batch updates are a local-store maintenance operation; they
    /// never route to a peer.
    pub async fn user_batch_update(
        &self,
        ctx: &RequestContext,
        options: UserBatchUpdateOptions,
    ) -> RouterResult<UserList> {
        self.local.user_batch_update(ctx, options).await
    }

    pub async fn api_client_authorization_current(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<ApiClientAuthorization> {
        self.choose_backend(&options.uuid)
            .api_client_authorization_current(ctx, options)
            .await
    }
}
