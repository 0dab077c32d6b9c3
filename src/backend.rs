use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use crate::api::*;
use crate::context::RequestContext;
use crate::error::RouterResult;

/// The uniform API surface every backend exposes: the local backend,
/// each remote proxy, and the router facade itself.
///
/// `base_url` is used to compute redirect targets; it never triggers
/// I/O. All other methods may suspend for arbitrarily long and must
/// honor the context's cancellation signal. Implementations are
/// long-lived and safe for concurrent use.
#[async_trait]
pub trait Backend: Send + Sync {
    fn base_url(&self) -> Url;

    async fn config_get(&self, ctx: &RequestContext) -> RouterResult<Value>;
    async fn login(&self, ctx: &RequestContext, options: LoginOptions)
        -> RouterResult<LoginResponse>;

    async fn collection_create(
        &self,
        ctx: &RequestContext,
        options: CreateOptions,
    ) -> RouterResult<Collection>;
    async fn collection_update(
        &self,
        ctx: &RequestContext,
        options: UpdateOptions,
    ) -> RouterResult<Collection>;
    async fn collection_get(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Collection>;
    async fn collection_list(
        &self,
        ctx: &RequestContext,
        options: ListOptions,
    ) -> RouterResult<CollectionList>;
    async fn collection_provenance(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Value>;
    async fn collection_used_by(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Value>;
    async fn collection_delete(
        &self,
        ctx: &RequestContext,
        options: DeleteOptions,
    ) -> RouterResult<Collection>;
    async fn collection_trash(
        &self,
        ctx: &RequestContext,
        options: DeleteOptions,
    ) -> RouterResult<Collection>;
    async fn collection_untrash(
        &self,
        ctx: &RequestContext,
        options: UntrashOptions,
    ) -> RouterResult<Collection>;

    async fn container_create(
        &self,
        ctx: &RequestContext,
        options: CreateOptions,
    ) -> RouterResult<Container>;
    async fn container_update(
        &self,
        ctx: &RequestContext,
        options: UpdateOptions,
    ) -> RouterResult<Container>;
    async fn container_get(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Container>;
    async fn container_list(
        &self,
        ctx: &RequestContext,
        options: ListOptions,
    ) -> RouterResult<ContainerList>;
    async fn container_delete(
        &self,
        ctx: &RequestContext,
        options: DeleteOptions,
    ) -> RouterResult<Container>;
    async fn container_lock(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Container>;
    async fn container_unlock(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Container>;

    async fn specimen_create(
        &self,
        ctx: &RequestContext,
        options: CreateOptions,
    ) -> RouterResult<Specimen>;
    async fn specimen_update(
        &self,
        ctx: &RequestContext,
        options: UpdateOptions,
    ) -> RouterResult<Specimen>;
    async fn specimen_get(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Specimen>;
    async fn specimen_list(
        &self,
        ctx: &RequestContext,
        options: ListOptions,
    ) -> RouterResult<SpecimenList>;
    async fn specimen_delete(
        &self,
        ctx: &RequestContext,
        options: DeleteOptions,
    ) -> RouterResult<Specimen>;

    async fn user_create(&self, ctx: &RequestContext, options: CreateOptions)
        -> RouterResult<User>;
    async fn user_update(&self, ctx: &RequestContext, options: UpdateOptions)
        -> RouterResult<User>;
    async fn user_update_uuid(
        &self,
        ctx: &RequestContext,
        options: UpdateUuidOptions,
    ) -> RouterResult<User>;
    async fn user_merge(
        &self,
        ctx: &RequestContext,
        options: UserMergeOptions,
    ) -> RouterResult<User>;
    async fn user_activate(
        &self,
        ctx: &RequestContext,
        options: UserActivateOptions,
    ) -> RouterResult<User>;
    async fn user_setup(
        &self,
        ctx: &RequestContext,
        options: UserSetupOptions,
    ) -> RouterResult<Value>;
    async fn user_unsetup(&self, ctx: &RequestContext, options: GetOptions) -> RouterResult<User>;
    async fn user_get(&self, ctx: &RequestContext, options: GetOptions) -> RouterResult<User>;
    async fn user_get_current(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<User>;
    async fn user_get_system(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<User>;
    async fn user_list(&self, ctx: &RequestContext, options: ListOptions)
        -> RouterResult<UserList>;
    async fn user_delete(&self, ctx: &RequestContext, options: DeleteOptions)
        -> RouterResult<User>;
    async fn user_batch_update(
        &self,
        ctx: &RequestContext,
        options: UserBatchUpdateOptions,
    ) -> RouterResult<UserList>;

    async fn api_client_authorization_current(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<ApiClientAuthorization>;
}
