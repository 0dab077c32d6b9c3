//! Dispatch engine: identifier classification and the
//! local-then-remotes fan-out used for reads that no cluster id binds.

use std::future::Future;
use std::sync::Arc;

use http::StatusCode;
use tokio::sync::mpsc;

use crate::backend::Backend;
use crate::context::RequestContext;
use crate::error::{RouterError, RouterResult};
use crate::federation::Router;

impl Router {
    /// The backend responsible for `id`: a 27-char object UUID routes
    /// by its leading 5 chars, a bare 5-char cluster id routes
    /// directly, anything else (content hashes included) stays local.
    ///
    /// An id naming an unknown or non-proxy cluster also returns the
    /// local backend: the local store reports a structured not-found,
    /// which beats fabricating a routing error here.
    pub(crate) fn choose_backend(&self, id: &str) -> Arc<dyn Backend> {
        let cluster_id = if id.len() == 27 {
            &id[..5]
        } else if id.len() == 5 {
            id
        } else {
            return self.local().clone();
        };
        if cluster_id == self.cluster().cluster_id {
            self.local().clone()
        } else if let Some(backend) = self.remotes().get(cluster_id) {
            backend.clone()
        } else {
            self.local().clone()
        }
    }

    /// Run `f` against the local backend; if (and only if) that fails
    /// with 404, run it concurrently against every proxy remote under a
    /// cancellable sub-context until one succeeds.
    ///
    /// `f` receives the cluster id of the remote, or "" for the local
    /// attempt, and is responsible for publishing its own result (the
    /// single-slot rendezvous in the caller) and any per-response
    /// transformation.
    ///
    /// An error means every backend failed: 404 when all of them
    /// reported 404, 502 with the aggregated messages otherwise.
    pub(crate) async fn try_local_then_remotes<F, Fut>(
        &self,
        ctx: &RequestContext,
        f: F,
    ) -> RouterResult<()>
    where
        F: Fn(RequestContext, String, Arc<dyn Backend>) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = RouterResult<()>> + Send + 'static,
    {
        match f(ctx.clone(), String::new(), self.local().clone()).await {
            Ok(()) => return Ok(()),
            Err(err) if err.http_status() != StatusCode::NOT_FOUND => return Err(err),
            Err(_) => {}
        }

        // One task per remote. The sub-context is cancelled whenever
        // this function returns; in-flight tasks observe that and exit,
        // and their late outcomes are dropped with the channel.
        let sub = ctx.child();
        let _cancel_on_return = sub.cancellation().clone().drop_guard();
        let (outcome_tx, mut outcome_rx) = mpsc::channel(self.remotes().len().max(1));
        for (remote_id, backend) in self.remotes() {
            let f = f.clone();
            let sub = sub.clone();
            let outcome_tx = outcome_tx.clone();
            let remote_id = remote_id.clone();
            let backend = backend.clone();
            tokio::spawn(async move {
                let _ = outcome_tx.send(f(sub, remote_id, backend).await).await;
            });
        }
        drop(outcome_tx);

        let mut all_not_found = true;
        let mut failures: Vec<RouterError> = Vec::new();
        for _ in 0..self.remotes().len() {
            match outcome_rx.recv().await {
                Some(Ok(())) => return Ok(()),
                Some(Err(err)) => {
                    all_not_found = all_not_found && err.http_status() == StatusCode::NOT_FOUND;
                    failures.push(err);
                }
                None => break,
            }
        }
        if ctx.is_cancelled() {
            return Err(RouterError::Cancelled);
        }
        if all_not_found {
            Err(RouterError::NotFound)
        } else {
            Err(RouterError::bad_gateway(format!(
                "errors: [{}]",
                failures
                    .iter()
                    .map(|err| err.to_string())
                    .collect::<Vec<_>>()
                    .join("; ")
            )))
        }
    }
}
