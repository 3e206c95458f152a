//! Cache key layout.
//!
//! Content keys are grouped by family (`reports`, `blogs`, `press_releases`) so that a
//! mutation can purge every derived list with one prefix scan.

use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::domain::types::ContentKind;

pub fn content_by_id(kind: ContentKind, id: u32) -> String {
    format!("{}:id:{id}", kind.family())
}

pub fn content_by_slug(kind: ContentKind, slug: &str) -> String {
    format!("{}:slug:{slug}", kind.family())
}

/// List key; category-filtered lists live under their own prefix so they can be purged
/// per category.
pub fn content_list(kind: ContentKind, category: Option<&str>, query_hash: &str) -> String {
    match category {
        Some(category) => format!("{}:category:{category}:{query_hash}", kind.family()),
        None => format!("{}:list:{query_hash}", kind.family()),
    }
}

/// Patterns purged after any mutation in a family.
pub fn family_patterns(kind: ContentKind) -> [String; 2] {
    [
        format!("{}:list:*", kind.family()),
        format!("{}:category:*", kind.family()),
    ]
}

pub fn session(principal_id: u32, token_id: &str) -> String {
    format!("session:{principal_id}:{token_id}")
}

pub fn sessions_of(principal_id: u32) -> String {
    format!("session:{principal_id}:*")
}

pub fn csrf(token: &str) -> String {
    format!("csrf:{token}")
}

pub fn rate_limit(client: &str, path: &str) -> String {
    format!("ratelimit:{client}:{path}")
}

/// Stable short digest of a serialisable query description.
pub fn hash_query<T: Serialize + ?Sized>(value: &T) -> String {
    let encoded = serde_json::to_vec(value).unwrap_or_default();
    let digest = Sha256::digest(&encoded);
    hex::encode(&digest[..12])
}
