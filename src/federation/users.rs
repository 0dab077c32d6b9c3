//! Write-through identity cache: when a peer cluster is authoritative
//! for accounts, every user listing refreshes the local copies of the
//! records it returned.

use std::collections::HashMap;

use chrono::Utc;
use serde_json::{Map, Value};

use crate::api::{ListOptions, UserBatchUpdateOptions, UserList};
use crate::error::{RouterError, RouterResult};
use crate::federation::Router;

/// Mirroring policy for user records cached from the login cluster,
/// field by field. Fields marked `false` are never written locally:
/// `uuid` and `owner_uuid` would break object identity, `identity_url`
/// is bound to the authoritative cluster, and `full_name`/`is_invited`
/// are derived attributes the local store computes itself.
///
/// Must have an entry for every serialized field of
/// [`crate::api::User`]; `test_mirror_policy_covers_every_user_field`
/// fails on any addition that forgets one.
pub(crate) const USER_FIELD_MIRROR_POLICY: [(&str, bool); 16] = [
    ("created_at", true),
    ("email", true),
    ("first_name", true),
    ("is_active", true),
    ("is_admin", true),
    ("last_name", true),
    ("modified_at", true),
    ("modified_by_client_uuid", true),
    ("modified_by_user_uuid", true),
    ("prefs", true),
    ("username", true),
    ("full_name", false),
    ("identity_url", false),
    ("is_invited", false),
    ("owner_uuid", false),
    ("uuid", false),
];

fn is_mirrorable(field: &str) -> bool {
    USER_FIELD_MIRROR_POLICY
        .iter()
        .any(|(name, mirrored)| *name == field && *mirrored)
}

impl Router {
    /// List users through the designated login cluster and project the
    /// authoritative records into a local batch update before returning
    /// the upstream response unchanged.
    pub(crate) async fn user_list_via_login_cluster(
        &self,
        ctx: &crate::context::RequestContext,
        options: ListOptions,
        login_cluster: &str,
    ) -> RouterResult<UserList> {
        let resp = self
            .choose_backend(login_cluster)
            .user_list(ctx, options.clone())
            .await?;

        let mut updates: HashMap<String, Map<String, Value>> = HashMap::new();
        for user in &resp.items {
            // Users not owned by the login cluster are returned to the
            // caller but never mirrored.
            if !user.uuid.starts_with(login_cluster) {
                continue;
            }
            tracing::debug!(uuid = %user.uuid, "caching user record from login cluster");

            let mut user = user.clone();
            // The authoritative cluster may carry placeholder
            // timestamps the local store rejects.
            if user.modified_at.is_none() {
                user.modified_at = Some(Utc::now());
            }
            if user.created_at.is_none() {
                user.created_at = Some(Utc::now());
            }

            let all_fields = match serde_json::to_value(&user) {
                Ok(Value::Object(fields)) => fields,
                Ok(_) => {
                    return Err(anyhow::anyhow!(
                        "error encoding user record from remote response"
                    )
                    .into())
                }
                Err(err) => {
                    return Err(anyhow::anyhow!(
                        "error encoding user record from remote response: {}",
                        err
                    )
                    .into())
                }
            };
            let projected: Map<String, Value> = if !options.select.is_empty() {
                let mut projected = Map::new();
                for name in &options.select {
                    if !is_mirrorable(name) {
                        continue;
                    }
                    if let Some(value) = all_fields.get(name.as_str()) {
                        projected.insert(name.clone(), value.clone());
                    }
                }
                projected
            } else {
                all_fields
                    .into_iter()
                    .filter(|(name, _)| is_mirrorable(name))
                    .collect()
            };
            updates.insert(user.uuid.clone(), projected);
        }

        if !updates.is_empty() {
            // The write runs under the system root token, not the
            // caller's credentials.
            let root_ctx =
                ctx.with_tokens(vec![self.cluster().system_root_token.clone()]);
            self.local()
                .user_batch_update(&root_ctx, UserBatchUpdateOptions { updates })
                .await
                .map_err(|err| {
                    RouterError::Internal(anyhow::anyhow!(
                        "error updating local user records: {}",
                        err
                    ))
                })?;
        }
        Ok(resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::User;

    #[test]
    fn test_mirror_policy_covers_every_user_field() {
        let encoded = serde_json::to_value(User::default()).unwrap();
        let Value::Object(fields) = encoded else {
            panic!("user record did not serialize to an object");
        };
        for name in fields.keys() {
            assert!(
                USER_FIELD_MIRROR_POLICY.iter().any(|(k, _)| k == name),
                "field name {:?} missing from USER_FIELD_MIRROR_POLICY",
                name
            );
        }
    }

    #[test]
    fn test_policy_has_no_stale_entries() {
        let encoded = serde_json::to_value(User::default()).unwrap();
        let Value::Object(fields) = encoded else {
            panic!("user record did not serialize to an object");
        };
        for (name, _) in USER_FIELD_MIRROR_POLICY {
            assert!(
                fields.contains_key(name),
                "USER_FIELD_MIRROR_POLICY names {:?}, which is not a user field",
                name
            );
        }
    }

    #[test]
    fn test_identity_fields_are_never_mirrorable() {
        for name in ["uuid", "owner_uuid", "identity_url", "is_invited", "full_name"] {
            assert!(!is_mirrorable(name), "{:?} must not be mirrored", name);
        }
        assert!(is_mirrorable("email"));
        assert!(is_mirrorable("prefs"));
    }
}
