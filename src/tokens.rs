//! Token salting: deriving per-remote bearer credentials so a peer
//! cluster can validate a caller without ever seeing this cluster's
//! secrets.

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use http::StatusCode;
use regex::Regex;
use sha2::Sha256;
use thiserror::Error;

use crate::api::GetOptions;
use crate::backend::Backend;
use crate::context::RequestContext;
use crate::error::{RouterError, RouterResult};

type HmacSha256 = Hmac<Sha256>;

/// Hex width of a salted secret (HMAC-SHA256). A v2 token whose secret
/// has this width is taken to be salted already.
const SALTED_SECRET_LEN: usize = 64;

/// Legacy bare tokens: a long run of lowercase alphanumerics with no
/// embedded metadata. These cannot be salted directly.
static OBSOLETE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-z]{41,}$").expect("invalid obsolete-token pattern"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaltError {
    /// The token is already shaped for a remote and cannot be re-salted.
    #[error("token already salted")]
    AlreadySalted,
    /// Legacy token form; resolve it to a current authorization first.
    #[error("obsolete token format")]
    ObsoleteToken,
    #[error("badly formatted token")]
    TokenFormat,
}

/// Derive the form of `token` that the cluster `remote` will accept.
///
/// A plain v2 token `v2/<uuid>/<secret>` keeps its uuid and version
/// prefix; the forwarded secret is the hex HMAC-SHA256 of `remote`
/// keyed by the original secret. Deterministic: the remote can verify
/// the result against its copy of the relationship without learning
/// `secret`.
pub fn salt_token(token: &str, remote: &str) -> Result<String, SaltError> {
    let parts: Vec<&str> = token.split('/').collect();
    if parts.len() < 3 || parts[0] != "v2" {
        if OBSOLETE_TOKEN.is_match(token) {
            return Err(SaltError::ObsoleteToken);
        }
        return Err(SaltError::TokenFormat);
    }
    let uuid = parts[1];
    let secret = parts[2];
    if secret.len() == SALTED_SECRET_LEN && secret.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(SaltError::AlreadySalted);
    }
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any size");
    mac.update(remote.as_bytes());
    Ok(format!(
        "v2/{}/{}",
        uuid,
        hex::encode(mac.finalize().into_bytes())
    ))
}

/// Produces the tokens to forward to one remote cluster, given an
/// incoming request context.
///
/// Plain tokens are salted; already-salted tokens pass through
/// unchanged; obsolete tokens are resolved to a current authorization
/// through the local backend and then salted. Output order matches
/// input order.
pub struct TokenSalter {
    local: Arc<dyn Backend>,
    remote_id: String,
}

impl TokenSalter {
    pub fn new(local: Arc<dyn Backend>, remote_id: impl Into<String>) -> Self {
        TokenSalter {
            local,
            remote_id: remote_id.into(),
        }
    }

    pub async fn salted_tokens(&self, ctx: &RequestContext) -> RouterResult<Vec<String>> {
        if ctx.tokens().is_empty() {
            return Err(RouterError::NoToken);
        }
        let mut tokens = Vec::with_capacity(ctx.tokens().len());
        for token in ctx.tokens() {
            match salt_token(token, &self.remote_id) {
                Ok(salted) => tokens.push(salted),
                Err(SaltError::AlreadySalted) => tokens.push(token.clone()),
                Err(SaltError::ObsoleteToken) => {
                    // Ask the local backend what authorization this
                    // legacy token maps to, using a sub-context that
                    // carries only this token.
                    let sub = ctx.with_tokens(vec![token.clone()]);
                    let auth = match self
                        .local
                        .api_client_authorization_current(&sub, GetOptions::default())
                        .await
                    {
                        Ok(auth) => auth,
                        Err(err) if err.http_status() == StatusCode::UNAUTHORIZED => {
                            // Not ours to rescue; let the remote
                            // reject it.
                            tokens.push(token.clone());
                            continue;
                        }
                        Err(err) => return Err(err),
                    };
                    let salted = salt_token(&auth.token_v2(), &self.remote_id)
                        .map_err(|err| RouterError::Internal(anyhow::Error::new(err)))?;
                    tokens.push(salted);
                }
                Err(err) => return Err(RouterError::Internal(anyhow::Error::new(err))),
            }
        }
        Ok(tokens)
    }
}

#[async_trait]
impl crate::rpc::TokenProvider for TokenSalter {
    async fn tokens_for(&self, ctx: &RequestContext) -> RouterResult<Vec<String>> {
        self.salted_tokens(ctx).await
    }
}
