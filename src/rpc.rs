//! HTTP client for the object API of a peer cluster. Each configured
//! proxy remote gets one `RpcClient`, wired to a token provider that
//! shapes the caller's credentials for that peer.

use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::api::*;
use crate::backend::Backend;
use crate::context::RequestContext;
use crate::error::{RouterError, RouterResult};

/// Supplies the tokens to attach to an outgoing request. The salter is
/// the production implementation; [`PassthroughTokenProvider`] forwards
/// the caller's tokens untouched.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn tokens_for(&self, ctx: &RequestContext) -> RouterResult<Vec<String>>;
}

pub struct PassthroughTokenProvider;

#[async_trait]
impl TokenProvider for PassthroughTokenProvider {
    async fn tokens_for(&self, ctx: &RequestContext) -> RouterResult<Vec<String>> {
        Ok(ctx.tokens().to_vec())
    }
}

pub struct RpcClient {
    cluster_id: String,
    base_url: Url,
    http_client: reqwest::Client,
    token_provider: Arc<dyn TokenProvider>,
}

impl RpcClient {
    pub fn new(
        cluster_id: impl Into<String>,
        base_url: Url,
        insecure: bool,
        token_provider: Arc<dyn TokenProvider>,
    ) -> Self {
        let cluster_id = cluster_id.into();
        if insecure {
            tracing::warn!(
                remote = %cluster_id,
                "TLS certificate verification disabled for remote cluster"
            );
        }
        RpcClient {
            cluster_id,
            base_url,
            http_client: reqwest::Client::builder()
                .danger_accept_invalid_certs(insecure)
                .build()
                .expect("failed to create HTTP client"),
            token_provider,
        }
    }

    pub fn cluster_id(&self) -> &str {
        &self.cluster_id
    }

    async fn request<B, T>(
        &self,
        ctx: &RequestContext,
        ep: &Endpoint,
        uuid: &str,
        options: &B,
    ) -> RouterResult<T>
    where
        B: Serialize,
        T: DeserializeOwned,
    {
        let tokens = self.token_provider.tokens_for(ctx).await?;
        let url = self
            .base_url
            .join(&ep.path.replace("{uuid}", uuid))
            .map_err(|err| anyhow::anyhow!("invalid request path: {}", err))?;
        let method = Method::from_bytes(ep.method.as_bytes())
            .map_err(|err| anyhow::anyhow!("invalid request method: {}", err))?;

        let mut body = serde_json::to_value(options)
            .map_err(|err| anyhow::anyhow!("error encoding request: {}", err))?;
        // Create/update requests nest the new attributes under the
        // resource's own key.
        if !ep.attrs_key.is_empty() {
            if let Some(obj) = body.as_object_mut() {
                if let Some(attrs) = obj.remove("attrs") {
                    obj.insert(ep.attrs_key.to_string(), attrs);
                }
            }
        }

        let mut req = self.http_client.request(method, url).json(&body);
        if let Some(value) = authorization_header(&tokens) {
            req = req.header(http::header::AUTHORIZATION, value);
        }

        let exchange = async {
            let response = req.send().await?;
            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(RouterError::http(status, error_message(status, &text)));
            }
            response.json::<T>().await.map_err(RouterError::from)
        };
        let deadline_elapsed = async {
            match ctx.deadline() {
                Some(deadline) => {
                    tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await
                }
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = ctx.cancellation().cancelled() => Err(RouterError::Cancelled),
            _ = deadline_elapsed => {
                Err(RouterError::http(StatusCode::GATEWAY_TIMEOUT, "deadline exceeded"))
            }
            result = exchange => result,
        }
    }
}

/// Every supplied token is forwarded, comma-joined into one bearer
/// credential list in provider order; the peer tries each in turn.
/// A caller may hold a primary token plus reader tokens, and dropping
/// any of them would turn a readable object into a 404 on the remote.
fn authorization_header(tokens: &[String]) -> Option<String> {
    if tokens.is_empty() {
        None
    } else {
        Some(format!("Bearer {}", tokens.join(", ")))
    }
}

/// Peers report failures as `{"errors": [...]}`; fall back to the raw
/// body, then to the bare status.
fn error_message(status: StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        errors: Vec<String>,
    }
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if !parsed.errors.is_empty() {
            return parsed.errors.join("; ");
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("request failed: HTTP {}", status)
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl Backend for RpcClient {
    fn base_url(&self) -> Url {
        self.base_url.clone()
    }

    async fn config_get(&self, ctx: &RequestContext) -> RouterResult<Value> {
        self.request(ctx, &endpoint::CONFIG_GET, "", &Value::Object(Default::default()))
            .await
    }

    async fn login(
        &self,
        ctx: &RequestContext,
        options: LoginOptions,
    ) -> RouterResult<LoginResponse> {
        self.request(ctx, &endpoint::LOGIN, "", &options).await
    }

    async fn collection_create(
        &self,
        ctx: &RequestContext,
        options: CreateOptions,
    ) -> RouterResult<Collection> {
        self.request(ctx, &endpoint::COLLECTION_CREATE, "", &options)
            .await
    }

    async fn collection_update(
        &self,
        ctx: &RequestContext,
        options: UpdateOptions,
    ) -> RouterResult<Collection> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::COLLECTION_UPDATE, &uuid, &options)
            .await
    }

    async fn collection_get(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Collection> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::COLLECTION_GET, &uuid, &options)
            .await
    }

    async fn collection_list(
        &self,
        ctx: &RequestContext,
        options: ListOptions,
    ) -> RouterResult<CollectionList> {
        self.request(ctx, &endpoint::COLLECTION_LIST, "", &options)
            .await
    }

    async fn collection_provenance(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Value> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::COLLECTION_PROVENANCE, &uuid, &options)
            .await
    }

    async fn collection_used_by(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Value> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::COLLECTION_USED_BY, &uuid, &options)
            .await
    }

    async fn collection_delete(
        &self,
        ctx: &RequestContext,
        options: DeleteOptions,
    ) -> RouterResult<Collection> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::COLLECTION_DELETE, &uuid, &options)
            .await
    }

    async fn collection_trash(
        &self,
        ctx: &RequestContext,
        options: DeleteOptions,
    ) -> RouterResult<Collection> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::COLLECTION_TRASH, &uuid, &options)
            .await
    }

    async fn collection_untrash(
        &self,
        ctx: &RequestContext,
        options: UntrashOptions,
    ) -> RouterResult<Collection> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::COLLECTION_UNTRASH, &uuid, &options)
            .await
    }

    async fn container_create(
        &self,
        ctx: &RequestContext,
        options: CreateOptions,
    ) -> RouterResult<Container> {
        self.request(ctx, &endpoint::CONTAINER_CREATE, "", &options)
            .await
    }

    async fn container_update(
        &self,
        ctx: &RequestContext,
        options: UpdateOptions,
    ) -> RouterResult<Container> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::CONTAINER_UPDATE, &uuid, &options)
            .await
    }

    async fn container_get(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Container> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::CONTAINER_GET, &uuid, &options)
            .await
    }

    async fn container_list(
        &self,
        ctx: &RequestContext,
        options: ListOptions,
    ) -> RouterResult<ContainerList> {
        self.request(ctx, &endpoint::CONTAINER_LIST, "", &options)
            .await
    }

    async fn container_delete(
        &self,
        ctx: &RequestContext,
        options: DeleteOptions,
    ) -> RouterResult<Container> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::CONTAINER_DELETE, &uuid, &options)
            .await
    }

    async fn container_lock(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Container> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::CONTAINER_LOCK, &uuid, &options)
            .await
    }

    async fn container_unlock(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Container> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::CONTAINER_UNLOCK, &uuid, &options)
            .await
    }

    async fn specimen_create(
        &self,
        ctx: &RequestContext,
        options: CreateOptions,
    ) -> RouterResult<Specimen> {
        self.request(ctx, &endpoint::SPECIMEN_CREATE, "", &options)
            .await
    }

    async fn specimen_update(
        &self,
        ctx: &RequestContext,
        options: UpdateOptions,
    ) -> RouterResult<Specimen> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::SPECIMEN_UPDATE, &uuid, &options)
            .await
    }

    async fn specimen_get(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<Specimen> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::SPECIMEN_GET, &uuid, &options)
            .await
    }

    async fn specimen_list(
        &self,
        ctx: &RequestContext,
        options: ListOptions,
    ) -> RouterResult<SpecimenList> {
        self.request(ctx, &endpoint::SPECIMEN_LIST, "", &options)
            .await
    }

    async fn specimen_delete(
        &self,
        ctx: &RequestContext,
        options: DeleteOptions,
    ) -> RouterResult<Specimen> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::SPECIMEN_DELETE, &uuid, &options)
            .await
    }

    async fn user_create(
        &self,
        ctx: &RequestContext,
        options: CreateOptions,
    ) -> RouterResult<User> {
        self.request(ctx, &endpoint::USER_CREATE, "", &options).await
    }

    async fn user_update(
        &self,
        ctx: &RequestContext,
        options: UpdateOptions,
    ) -> RouterResult<User> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::USER_UPDATE, &uuid, &options)
            .await
    }

    async fn user_update_uuid(
        &self,
        ctx: &RequestContext,
        options: UpdateUuidOptions,
    ) -> RouterResult<User> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::USER_UPDATE_UUID, &uuid, &options)
            .await
    }

    async fn user_merge(
        &self,
        ctx: &RequestContext,
        options: UserMergeOptions,
    ) -> RouterResult<User> {
        self.request(ctx, &endpoint::USER_MERGE, "", &options).await
    }

    async fn user_activate(
        &self,
        ctx: &RequestContext,
        options: UserActivateOptions,
    ) -> RouterResult<User> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::USER_ACTIVATE, &uuid, &options)
            .await
    }

    async fn user_setup(
        &self,
        ctx: &RequestContext,
        options: UserSetupOptions,
    ) -> RouterResult<Value> {
        self.request(ctx, &endpoint::USER_SETUP, "", &options).await
    }

    async fn user_unsetup(&self, ctx: &RequestContext, options: GetOptions) -> RouterResult<User> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::USER_UNSETUP, &uuid, &options)
            .await
    }

    async fn user_get(&self, ctx: &RequestContext, options: GetOptions) -> RouterResult<User> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::USER_GET, &uuid, &options).await
    }

    async fn user_get_current(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<User> {
        self.request(ctx, &endpoint::USER_GET_CURRENT, "", &options)
            .await
    }

    async fn user_get_system(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<User> {
        self.request(ctx, &endpoint::USER_GET_SYSTEM, "", &options)
            .await
    }

    async fn user_list(
        &self,
        ctx: &RequestContext,
        options: ListOptions,
    ) -> RouterResult<UserList> {
        self.request(ctx, &endpoint::USER_LIST, "", &options).await
    }

    async fn user_delete(
        &self,
        ctx: &RequestContext,
        options: DeleteOptions,
    ) -> RouterResult<User> {
        let uuid = options.uuid.clone();
        self.request(ctx, &endpoint::USER_DELETE, &uuid, &options)
            .await
    }

    async fn user_batch_update(
        &self,
        ctx: &RequestContext,
        options: UserBatchUpdateOptions,
    ) -> RouterResult<UserList> {
        self.request(ctx, &endpoint::USER_BATCH_UPDATE, "", &options)
            .await
    }

    async fn api_client_authorization_current(
        &self,
        ctx: &RequestContext,
        options: GetOptions,
    ) -> RouterResult<ApiClientAuthorization> {
        self.request(ctx, &endpoint::API_CLIENT_AUTHORIZATION_CURRENT, "", &options)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_passthrough_token_provider_forwards_caller_tokens() {
        let ctx = RequestContext::new(vec!["t1".to_string(), "t2".to_string()]);
        let tokens = PassthroughTokenProvider.tokens_for(&ctx).await.unwrap();
        assert_eq!(tokens, vec!["t1", "t2"]);
    }

    #[test]
    fn test_authorization_header_carries_every_token_in_order() {
        assert_eq!(authorization_header(&[]), None);
        assert_eq!(
            authorization_header(&["t1".to_string()]).unwrap(),
            "Bearer t1"
        );
        assert_eq!(
            authorization_header(&["t1".to_string(), "t2".to_string(), "t3".to_string()])
                .unwrap(),
            "Bearer t1, t2, t3"
        );
    }

    #[test]
    fn test_error_message_prefers_structured_errors() {
        let msg = error_message(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"errors": ["name taken", "try again"]}"#,
        );
        assert_eq!(msg, "name taken; try again");
    }

    #[test]
    fn test_error_message_falls_back_to_body_then_status() {
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "upstream exploded"),
            "upstream exploded"
        );
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "  "),
            "request failed: HTTP 502 Bad Gateway"
        );
    }
}
