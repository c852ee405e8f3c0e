use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// One decoded lightning record. The layer above the service decides what the fields mean.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// Query parameters keyed by name. Sorted, so two maps with the same pairs compare
/// and serialize identically regardless of insertion order.
pub type QueryParams = BTreeMap<String, ParamValue>;

pub const CLIENT_ID_PARAM: &str = "client_id";
pub const CLIENT_SECRET_PARAM: &str = "client_secret";

/// Kept out of cache keys and log lines.
pub const REDACTED_PARAM: &str = "appid";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Bool(v) => write!(f, "{v}"),
            ParamValue::Integer(v) => write!(f, "{v}"),
            ParamValue::Float(v) => write!(f, "{v}"),
            ParamValue::Text(v) => f.write_str(v),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Text(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Text(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Integer(value)
    }
}

impl From<u32> for ParamValue {
    fn from(value: u32) -> Self {
        ParamValue::Integer(i64::from(value))
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

/// Build a [`QueryParams`] map from `(name, value)` pairs.
pub fn params<K, V, I>(pairs: I) -> QueryParams
where
    K: Into<String>,
    V: Into<ParamValue>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Client credentials injected into every outbound request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl Credentials {
    /// Returns a copy of `params` with both credential fields set. Unset credentials are
    /// sent as empty values so the service reports the auth failure itself.
    pub fn merge_into(&self, params: &QueryParams) -> QueryParams {
        let mut merged = params.clone();
        merged.insert(
            CLIENT_ID_PARAM.to_string(),
            ParamValue::Text(self.client_id.clone().unwrap_or_default()),
        );
        merged.insert(
            CLIENT_SECRET_PARAM.to_string(),
            ParamValue::Text(self.client_secret.clone().unwrap_or_default()),
        );
        merged
    }
}

/// What the transport hands back and what cache stores hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawResponse {
    pub status: u16,
    pub body: String,
}

impl RawResponse {
    pub fn ok(body: impl Into<String>) -> Self {
        Self { status: 200, body: body.into() }
    }
}

/// Parameters safe to print: no `appid`, no client secret.
pub(crate) fn redacted(params: &QueryParams) -> QueryParams {
    params
        .iter()
        .filter(|(k, _)| k.as_str() != REDACTED_PARAM && k.as_str() != CLIENT_SECRET_PARAM)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
