//! Deterministic cache keys for outbound requests.
//!
//! A key is `xweather:` followed by the hex SHA-256 of the canonical JSON form of
//! `{path, params}`, with every value rendered as the text sent on the wire. The
//! parameter map is a `BTreeMap`, so the JSON is sorted by name and insertion order
//! never affects the key. `appid` is dropped before hashing.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::model::{QueryParams, REDACTED_PARAM};

pub const KEY_PREFIX: &str = "xweather:";

#[derive(Serialize)]
struct KeyMaterial<'a> {
    path: &'a str,
    params: BTreeMap<&'a str, String>,
}

pub fn cache_key(path: &str, params: &QueryParams) -> String {
    let material = KeyMaterial {
        path,
        params: params
            .iter()
            .filter(|(k, _)| k.as_str() != REDACTED_PARAM)
            .map(|(k, v)| (k.as_str(), v.to_string()))
            .collect(),
    };

    // A map of strings always serializes.
    let raw = serde_json::to_vec(&material).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(&raw);
    format!("{KEY_PREFIX}{}", hex::encode(hasher.finalize()))
}
