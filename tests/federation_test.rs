//! End-to-end routing behavior over stub backends: single-target
//! dispatch, content-hash fan-out, login redirects, the user mirror,
//! and token salting against a live local backend.


use std::sync::Arc;
use std::time::Duration;

use http::StatusCode;
use serde_json::json;

use lattice_router::api::*;
use lattice_router::federation::manifest::portable_data_hash;
use lattice_router::tokens::{salt_token, TokenSalter};
use lattice_router::{Backend, RequestContext, RouterError};

use test_utils::*;

const BLOCK: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

fn signed_manifest() -> String {
    format!(". {}+123+Asig@exp 0:123:foo.txt\n", BLOCK)
}

fn bare_manifest() -> String {
    format!(". {}+123 0:123:foo.txt\n", BLOCK)
}

async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within timeout");
}

// ---------------------------------------------------------------------------
// Single-target dispatch
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_local_uuid_read_stays_local() {
    let (router, local, remotes) = stub_router(&["bbbbb"], "");
    local.stub_ok(
        "collection_get",
        json!({"uuid": "aaaaa-4zz18-000000000000000", "manifest_text": signed_manifest()}),
    );

    let collection = router
        .collection_get(&caller_ctx(), GetOptions::uuid("aaaaa-4zz18-000000000000000"))
        .await
        .unwrap();

    // Manifest comes back untouched on a local hit.
    assert_eq!(collection.manifest_text, signed_manifest());
    assert_eq!(local.call_count("collection_get"), 1);
    assert_eq!(remotes["bbbbb"].call_count("collection_get"), 0);
}

#[tokio::test]
async fn test_remote_uuid_read_rewrites_manifest() {
    let (router, local, remotes) = stub_router(&["bbbbb"], "");
    remotes["bbbbb"].stub_ok(
        "collection_get",
        json!({"uuid": "bbbbb-4zz18-000000000000000", "manifest_text": signed_manifest()}),
    );

    let collection = router
        .collection_get(&caller_ctx(), GetOptions::uuid("bbbbb-4zz18-000000000000000"))
        .await
        .unwrap();

    assert_eq!(
        collection.manifest_text,
        format!(". {}+123+Rbbbbb-sig@exp 0:123:foo.txt\n", BLOCK)
    );
    assert_eq!(local.call_count("collection_get"), 0);
    assert_eq!(remotes["bbbbb"].call_count("collection_get"), 1);
}

#[tokio::test]
async fn test_dispatch_is_deterministic() {
    let (router, local, remotes) = stub_router(&["bbbbb"], "");
    remotes["bbbbb"].stub_ok(
        "container_get",
        json!({"uuid": "bbbbb-dz642-000000000000000"}),
    );

    for _ in 0..3 {
        router
            .container_get(&caller_ctx(), GetOptions::uuid("bbbbb-dz642-000000000000000"))
            .await
            .unwrap();
    }
    assert_eq!(remotes["bbbbb"].call_count("container_get"), 3);
    assert_eq!(local.call_count("container_get"), 0);
}

#[tokio::test]
async fn test_unknown_cluster_id_falls_back_to_local() {
    let (router, local, remotes) = stub_router(&["bbbbb"], "");
    local.stub_err("collection_get", 404, "no such object");

    let err = router
        .collection_get(&caller_ctx(), GetOptions::uuid("ddddd-4zz18-000000000000000"))
        .await
        .unwrap_err();

    // The local backend's structured 404 is surfaced as-is; the router
    // never fabricates a routing error for an unknown cluster id.
    assert_eq!(err.http_status(), StatusCode::NOT_FOUND);
    assert_eq!(local.call_count("collection_get"), 1);
    assert_eq!(remotes["bbbbb"].call_count("collection_get"), 0);
}

#[tokio::test]
async fn test_create_routes_by_cluster_id() {
    let (router, local, remotes) = stub_router(&["bbbbb"], "");
    remotes["bbbbb"].stub_ok("container_create", json!({"uuid": "bbbbb-dz642-000000000000000"}));
    local.stub_ok("container_create", json!({"uuid": "aaaaa-dz642-000000000000000"}));

    let remote_made = router
        .container_create(
            &caller_ctx(),
            CreateOptions {
                cluster_id: "bbbbb".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(remote_made.uuid, "bbbbb-dz642-000000000000000");

    let local_made = router
        .container_create(&caller_ctx(), CreateOptions::default())
        .await
        .unwrap();
    assert_eq!(local_made.uuid, "aaaaa-dz642-000000000000000");
}

#[tokio::test]
async fn test_merge_routes_by_old_user_uuid() {
    let (router, _local, remotes) = stub_router(&["bbbbb"], "");
    remotes["bbbbb"].stub_ok("user_merge", json!({"uuid": "bbbbb-tpzed-111111111111111"}));

    router
        .user_merge(
            &caller_ctx(),
            UserMergeOptions {
                old_user_uuid: "bbbbb-tpzed-000000000000000".to_string(),
                new_user_uuid: "aaaaa-tpzed-111111111111111".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(remotes["bbbbb"].call_count("user_merge"), 1);
}

#[tokio::test]
async fn test_batch_update_is_always_local() {
    let (router, local, remotes) = stub_router(&["bbbbb"], "");
    local.stub_ok("user_batch_update", json!({"items": []}));

    router
        .user_batch_update(&caller_ctx(), UserBatchUpdateOptions::default())
        .await
        .unwrap();
    assert_eq!(local.call_count("user_batch_update"), 1);
    assert_eq!(remotes["bbbbb"].call_count("user_batch_update"), 0);
}

#[tokio::test]
async fn test_config_get_serves_local_configuration() {
    let (router, local, _remotes) = stub_router(&["bbbbb"], "");

    let exported = router.config_get(&caller_ctx()).await.unwrap();
    assert_eq!(exported["cluster_id"], LOCAL_ID);
    assert!(!exported.to_string().contains("systemroottoken"));
    // Answered from configuration, not from any backend.
    assert_eq!(local.call_count("config_get"), 0);
}

// ---------------------------------------------------------------------------
// Content-hash fan-out
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_content_hash_read_wins_once() {
    let (router, local, remotes) = stub_router(&["bbbbb", "ccccc"], "");
    let manifest = bare_manifest();
    let requested = portable_data_hash(&manifest);
    local.stub_err("collection_get", 404, "not found");
    for id in ["bbbbb", "ccccc"] {
        remotes[id].stub_ok("collection_get", json!({"manifest_text": manifest}));
    }

    let collection = router
        .collection_get(&caller_ctx(), GetOptions::uuid(requested.as_str()))
        .await
        .unwrap();
    assert_eq!(collection.manifest_text, manifest);

    // The local attempt happens before any remote is started, and both
    // remotes are eventually attempted even after the winner returns.
    assert_eq!(local.call_count("collection_get"), 1);
    eventually(|| {
        remotes["bbbbb"].call_count("collection_get") == 1
            && remotes["ccccc"].call_count("collection_get") == 1
    })
    .await;

    // The fan-out sub-context is cancelled once a winner is chosen;
    // the caller's own context is not.
    for id in ["bbbbb", "ccccc"] {
        for call in remotes[id].calls("collection_get") {
            assert!(call.ctx.is_cancelled());
        }
    }
    assert!(!local.calls("collection_get")[0].ctx.is_cancelled());
}

#[tokio::test]
async fn test_content_hash_read_skips_remotes_on_local_hit() {
    let (router, local, remotes) = stub_router(&["bbbbb"], "");
    let manifest = bare_manifest();
    let requested = portable_data_hash(&manifest);
    local.stub_ok("collection_get", json!({"manifest_text": manifest}));

    router
        .collection_get(&caller_ctx(), GetOptions::uuid(requested.as_str()))
        .await
        .unwrap();
    assert_eq!(local.call_count("collection_get"), 1);
    assert_eq!(remotes["bbbbb"].call_count("collection_get"), 0);
}

#[tokio::test]
async fn test_content_hash_read_stops_on_local_non_404_failure() {
    let (router, local, remotes) = stub_router(&["bbbbb"], "");
    local.stub_err("collection_get", 403, "forbidden");

    let err = router
        .collection_get(
            &caller_ctx(),
            GetOptions::uuid("d41d8cd98f00b204e9800998ecf8427e+0"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), StatusCode::FORBIDDEN);
    assert_eq!(remotes["bbbbb"].call_count("collection_get"), 0);
}

#[tokio::test]
async fn test_content_hash_read_404_everywhere_is_404() {
    let (router, local, remotes) = stub_router(&["bbbbb", "ccccc"], "");
    local.stub_err("collection_get", 404, "not found");
    remotes["bbbbb"].stub_err("collection_get", 404, "not found");
    remotes["ccccc"].stub_err("collection_get", 404, "not found");

    let err = router
        .collection_get(
            &caller_ctx(),
            GetOptions::uuid("d41d8cd98f00b204e9800998ecf8427e+0"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), StatusCode::NOT_FOUND);
    assert_eq!(err.to_string(), "not found");
}

#[tokio::test]
async fn test_content_hash_read_mixed_failures_are_bad_gateway() {
    let (router, local, remotes) = stub_router(&["bbbbb", "ccccc"], "");
    local.stub_err("collection_get", 404, "not found");
    remotes["bbbbb"].stub_err("collection_get", 500, "remote exploded");
    remotes["ccccc"].stub_err("collection_get", 404, "not found");

    let err = router
        .collection_get(
            &caller_ctx(),
            GetOptions::uuid("d41d8cd98f00b204e9800998ecf8427e+0"),
        )
        .await
        .unwrap_err();
    assert_eq!(err.http_status(), StatusCode::BAD_GATEWAY);
    assert!(err.to_string().contains("remote exploded"));
}

#[tokio::test]
async fn test_content_hash_mismatch_rejects_that_remote() {
    let (router, local, remotes) = stub_router(&["bbbbb", "ccccc"], "");
    let manifest = bare_manifest();
    let requested = portable_data_hash(&manifest);
    local.stub_err("collection_get", 404, "not found");
    // bbbbb answers with content that does not hash to the requested
    // identifier; ccccc answers correctly.
    remotes["bbbbb"].stub_ok(
        "collection_get",
        json!({"manifest_text": ". deadbeefdeadbeefdeadbeefdeadbeef+9 0:9:bad\n"}),
    );
    remotes["ccccc"].stub_ok("collection_get", json!({"manifest_text": manifest}));

    let collection = router
        .collection_get(&caller_ctx(), GetOptions::uuid(requested.as_str()))
        .await
        .unwrap();
    assert_eq!(collection.manifest_text, manifest);
}

#[tokio::test]
async fn test_content_hash_mismatch_counts_as_non_404_failure() {
    let (router, local, remotes) = stub_router(&["bbbbb", "ccccc"], "");
    let manifest = bare_manifest();
    let requested = portable_data_hash(&manifest);
    local.stub_err("collection_get", 404, "not found");
    remotes["bbbbb"].stub_ok(
        "collection_get",
        json!({"manifest_text": ". deadbeefdeadbeefdeadbeefdeadbeef+9 0:9:bad\n"}),
    );
    remotes["ccccc"].stub_err("collection_get", 404, "not found");

    let err = router
        .collection_get(&caller_ctx(), GetOptions::uuid(requested.as_str()))
        .await
        .unwrap_err();
    // An integrity failure is a 502, not a 404, so the aggregate is a
    // gateway error.
    assert_eq!(err.http_status(), StatusCode::BAD_GATEWAY);
    assert!(err.to_string().contains("bad portable data hash"));
}

#[tokio::test]
async fn test_content_hash_read_accepts_hinted_request() {
    let (router, local, remotes) = stub_router(&["bbbbb"], "");
    let manifest = bare_manifest();
    let requested = format!("{}+Asig@exp", portable_data_hash(&manifest));
    local.stub_err("collection_get", 404, "not found");
    remotes["bbbbb"].stub_ok("collection_get", json!({"manifest_text": manifest}));

    // hash+size+hints: only the hash+size part must match.
    router
        .collection_get(&caller_ctx(), GetOptions::uuid(requested.as_str()))
        .await
        .unwrap();
}

// ---------------------------------------------------------------------------
// Login redirection
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_login_redirects_to_login_cluster() {
    let (router, local, remotes) = stub_router(&["bbbbb"], "bbbbb");

    let resp = router
        .login(
            &caller_ctx(),
            LoginOptions {
                return_to: "/x".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(
        resp.redirect_location,
        "https://bbbbb.example/login?return_to=%2Fx"
    );
    // Redirect is computed without contacting any backend.
    assert_eq!(local.call_count("login"), 0);
    assert_eq!(remotes["bbbbb"].call_count("login"), 0);
}

#[tokio::test]
async fn test_login_redirect_preserves_remote_param() {
    let (router, _local, _remotes) = stub_router(&["bbbbb"], "bbbbb");

    let resp = router
        .login(
            &caller_ctx(),
            LoginOptions {
                return_to: "/x".to_string(),
                remote: "ccccc".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(
        resp.redirect_location,
        "https://bbbbb.example/login?return_to=%2Fx&remote=ccccc"
    );
}

#[tokio::test]
async fn test_login_with_undefined_login_cluster_is_config_error() {
    let (router, _local, _remotes) = stub_router(&["bbbbb"], "ddddd");

    let err = router
        .login(
            &caller_ctx(),
            LoginOptions {
                return_to: "/x".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::Config(_)));
    assert!(err.to_string().contains("ddddd"));
}

#[tokio::test]
async fn test_login_without_login_cluster_goes_local() {
    let (router, local, _remotes) = stub_router(&["bbbbb"], "");
    local.stub_ok("login", json!({"redirect_location": "/local-login"}));

    let resp = router
        .login(
            &caller_ctx(),
            LoginOptions {
                return_to: "/x".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(resp.redirect_location, "/local-login");
    assert_eq!(local.call_count("login"), 1);
}

// ---------------------------------------------------------------------------
// User mirror under a login cluster
// ---------------------------------------------------------------------------

fn login_cluster_user() -> serde_json::Value {
    json!({
        "uuid": "zzzzz-tpzed-000000000000000",
        "email": "user@lattice.example",
        "is_admin": true,
        "is_invited": true,
        "created_at": null,
        "modified_at": null
    })
}

#[tokio::test]
async fn test_user_list_mirrors_selected_fields() {
    let (router, local, remotes) = stub_router(&["zzzzz"], "zzzzz");
    remotes["zzzzz"].stub_ok(
        "user_list",
        json!({"items": [login_cluster_user()], "items_available": 1}),
    );
    local.stub_ok("user_batch_update", json!({"items": []}));

    let resp = router
        .user_list(
            &caller_ctx(),
            ListOptions {
                select: vec!["uuid".to_string(), "email".to_string()],
                ..Default::default()
            },
        )
        .await
        .unwrap();

    // Upstream response comes back unchanged, virtual fields included.
    assert_eq!(resp.items.len(), 1);
    assert_eq!(resp.items[0].email, "user@lattice.example");
    assert!(resp.items[0].is_invited);

    let batch_calls = local.calls("user_batch_update");
    assert_eq!(batch_calls.len(), 1);
    // The mirror write runs under the system root token, not the
    // caller's.
    assert_eq!(batch_calls[0].tokens(), vec![ROOT_TOKEN.to_string()]);

    let updates = &batch_calls[0].options["updates"]["zzzzz-tpzed-000000000000000"];
    let keys: Vec<&String> = updates.as_object().unwrap().keys().collect();
    // Exactly the selected-and-mirrorable intersection: email yes,
    // uuid never.
    assert_eq!(keys, vec!["email"]);
    assert_eq!(updates["email"], "user@lattice.example");
}

#[tokio::test]
async fn test_user_list_mirrors_all_mirrorable_fields_without_select() {
    let (router, local, remotes) = stub_router(&["zzzzz"], "zzzzz");
    remotes["zzzzz"].stub_ok(
        "user_list",
        json!({"items": [login_cluster_user()], "items_available": 1}),
    );
    local.stub_ok("user_batch_update", json!({"items": []}));

    router
        .user_list(&caller_ctx(), ListOptions::default())
        .await
        .unwrap();

    let batch_calls = local.calls("user_batch_update");
    assert_eq!(batch_calls.len(), 1);
    let updates = batch_calls[0].options["updates"]["zzzzz-tpzed-000000000000000"]
        .as_object()
        .unwrap()
        .clone();

    for mirrored in ["email", "is_admin", "first_name", "prefs", "username"] {
        assert!(updates.contains_key(mirrored), "missing {:?}", mirrored);
    }
    for never in ["uuid", "owner_uuid", "identity_url", "is_invited", "full_name"] {
        assert!(!updates.contains_key(never), "must not mirror {:?}", never);
    }
    // Placeholder timestamps are replaced before the local write.
    assert!(updates["created_at"].is_string());
    assert!(updates["modified_at"].is_string());
}

#[tokio::test]
async fn test_user_list_skips_foreign_users_and_empty_batches() {
    let (router, local, remotes) = stub_router(&["zzzzz"], "zzzzz");
    remotes["zzzzz"].stub_ok(
        "user_list",
        json!({"items": [{"uuid": "yyyyy-tpzed-000000000000000", "email": "other@y"}],
               "items_available": 1}),
    );

    let resp = router
        .user_list(&caller_ctx(), ListOptions::default())
        .await
        .unwrap();

    // Foreign users are returned to the caller but never mirrored, and
    // with nothing to mirror there is no local write at all.
    assert_eq!(resp.items.len(), 1);
    assert_eq!(local.call_count("user_batch_update"), 0);
}

#[tokio::test]
async fn test_user_list_fails_when_local_update_fails() {
    let (router, local, remotes) = stub_router(&["zzzzz"], "zzzzz");
    remotes["zzzzz"].stub_ok(
        "user_list",
        json!({"items": [login_cluster_user()], "items_available": 1}),
    );
    local.stub_err("user_batch_update", 500, "local cluster failure");

    let err = router
        .user_list(&caller_ctx(), ListOptions::default())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("error updating local user records"));
}

#[tokio::test]
async fn test_user_list_without_login_cluster_routes_normally() {
    let (router, local, _remotes) = stub_router(&["zzzzz"], "");
    local.stub_ok("user_list", json!({"items": [], "items_available": 0}));

    router
        .user_list(&caller_ctx(), ListOptions::default())
        .await
        .unwrap();
    assert_eq!(local.call_count("user_list"), 1);
    assert_eq!(local.call_count("user_batch_update"), 0);
}

// ---------------------------------------------------------------------------
// Token salting against the local backend
// ---------------------------------------------------------------------------

const OBSOLETE_TOKEN: &str = "3kg6k6lzmp9kj5cpkcoxie963cmvjahbt2fod9zru30k1jqdmi";

#[tokio::test]
async fn test_salter_resolves_obsolete_token() {
    let local = StubBackend::new(LOCAL_ID);
    local.stub_ok(
        "api_client_authorization_current",
        json!({"uuid": "aaaaa-gj3su-222222222222222", "api_token": "abcdef"}),
    );
    let salter = TokenSalter::new(local.clone() as Arc<dyn Backend>, "bbbbb");

    let ctx = RequestContext::new(vec![OBSOLETE_TOKEN.to_string()]);
    let tokens = salter.salted_tokens(&ctx).await.unwrap();

    let expected = salt_token("v2/aaaaa-gj3su-222222222222222/abcdef", "bbbbb").unwrap();
    assert_eq!(tokens, vec![expected]);

    // The lookup ran in a sub-context carrying only the token being
    // resolved.
    let lookups = local.calls("api_client_authorization_current");
    assert_eq!(lookups.len(), 1);
    assert_eq!(lookups[0].tokens(), vec![OBSOLETE_TOKEN.to_string()]);
}

#[tokio::test]
async fn test_salter_passes_unrescuable_token_through() {
    let local = StubBackend::new(LOCAL_ID);
    local.stub_err("api_client_authorization_current", 401, "invalid token");
    let salter = TokenSalter::new(local as Arc<dyn Backend>, "bbbbb");

    let ctx = RequestContext::new(vec![OBSOLETE_TOKEN.to_string()]);
    let tokens = salter.salted_tokens(&ctx).await.unwrap();
    // Not ours to rescue; the remote gets the original and rejects it.
    assert_eq!(tokens, vec![OBSOLETE_TOKEN.to_string()]);
}

#[tokio::test]
async fn test_salter_aborts_on_other_lookup_errors() {
    let local = StubBackend::new(LOCAL_ID);
    local.stub_err("api_client_authorization_current", 500, "database down");
    let salter = TokenSalter::new(local as Arc<dyn Backend>, "bbbbb");

    let ctx = RequestContext::new(vec![OBSOLETE_TOKEN.to_string()]);
    let err = salter.salted_tokens(&ctx).await.unwrap_err();
    assert_eq!(err.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_salter_requires_a_token() {
    let local = StubBackend::new(LOCAL_ID);
    let salter = TokenSalter::new(local as Arc<dyn Backend>, "bbbbb");

    let err = salter
        .salted_tokens(&RequestContext::new(vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, RouterError::NoToken));
    assert_eq!(err.to_string(), "no token provided");
}

#[tokio::test]
async fn test_salter_preserves_token_order() {
    let local = StubBackend::new(LOCAL_ID);
    local.stub_ok(
        "api_client_authorization_current",
        json!({"uuid": "aaaaa-gj3su-222222222222222", "api_token": "abcdef"}),
    );
    let salter = TokenSalter::new(local as Arc<dyn Backend>, "bbbbb");

    let plain = CALLER_TOKEN.to_string();
    let already_salted = salt_token(&plain, "bbbbb").unwrap();
    let ctx = RequestContext::new(vec![
        plain.clone(),
        already_salted.clone(),
        OBSOLETE_TOKEN.to_string(),
    ]);

    let tokens = salter.salted_tokens(&ctx).await.unwrap();
    assert_eq!(
        tokens,
        vec![
            salt_token(&plain, "bbbbb").unwrap(),
            // A token salted elsewhere cannot be re-salted; it passes
            // through unchanged.
            already_salted,
            salt_token("v2/aaaaa-gj3su-222222222222222/abcdef", "bbbbb").unwrap(),
        ]
    );
}
