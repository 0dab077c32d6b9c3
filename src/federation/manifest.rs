//! Manifest text utilities: rewriting block hints for cross-cluster
//! delivery and recomputing the portable data hash.
//!
//! Manifests are line-oriented, space-separated text. A block token is
//! a 32-char hex hash followed by `+size` and optional `+hint`s; only
//! block tokens are touched here, everything else passes through
//! verbatim.

use std::sync::LazyLock;

use regex::Regex;

static BLOCK_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" [0-9a-f]{32}\+[^ ]*").expect("invalid block token pattern"));

static BLOCK_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ [0-9a-f]{32}\+\d+").expect("invalid block prefix pattern"));

static MANIFEST_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" ?[^ ]*").expect("invalid manifest token pattern"));

/// Rewrite a manifest fetched from remote cluster `remote_id` for
/// delivery to a local caller: every `+A` hint prefix becomes
/// `+R<remote_id>-`, marking signed locators as needing a re-sign by
/// this cluster before use. No other transformation.
pub fn rewrite_manifest(manifest: &str, remote_id: &str) -> String {
    let replacement = format!("+R{}-", remote_id);
    BLOCK_TOKEN
        .replace_all(manifest, |caps: &regex::Captures<'_>| {
            caps[0].replace("+A", &replacement)
        })
        .into_owned()
}

/// Recompute the portable data hash of a manifest:
/// `md5(canonical) + "+" + len(canonical)`, where the canonical form
/// keeps each block token's `hash+size` prefix, drops its hints, and
/// keeps every non-block run (including the space that introduces each
/// token) verbatim.
pub fn portable_data_hash(manifest: &str) -> String {
    let mut digest = md5::Context::new();
    let mut size = 0usize;
    for tok in MANIFEST_TOKEN.find_iter(manifest) {
        let tok = tok.as_str();
        let emit = match BLOCK_PREFIX.find(tok) {
            // Block token: hash+size only, hints dropped.
            Some(prefix) => prefix.as_str(),
            None => tok,
        };
        digest.consume(emit.as_bytes());
        size += emit.len();
    }
    format!("{:x}+{}", digest.compute(), size)
}
