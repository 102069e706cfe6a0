//! Version envelope: `{"v": "<major>.<minor>", "data": <marshaled value>}`.
//!
//! Decoding accepts exactly the compiled-in version. There is no
//! compatibility window in either direction.

use crate::config::ProtocolConfig;
use crate::marshal::marshal_value;
use crate::registry::MakeRef;
use crate::unmarshal::{json_kind, unmarshal_value, ResolveRef};
use crate::value::Value;
use crate::{Result, RpcError};
use serde_json::{Map, Value as Json};

/// Join version parts with dots.
pub fn encode_version(parts: &[u32]) -> String {
    parts
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(".")
}

/// Parse a dot-separated version string.
///
/// Surrounding dots are ignored and each part may carry whitespace, so
/// `"1."` is `[1]` and `" 5 . 8 "` is `[5, 8]`. Returns `None` if any part
/// is not an integer.
pub fn decode_version(text: &str) -> Option<Vec<u32>> {
    let trimmed = text.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .split('.')
        .map(|part| part.trim().parse::<u32>().ok())
        .collect()
}

fn current_version() -> [u32; 2] {
    let (major, minor) = ProtocolConfig::VERSION;
    [major, minor]
}

/// Marshal `value` and wrap it with the protocol version.
pub fn encode_envelope(value: &Value, make_ref: Option<&dyn MakeRef>) -> Result<Json> {
    let mut map = Map::new();
    map.insert("v".to_string(), Json::from(encode_version(&current_version())));
    map.insert("data".to_string(), marshal_value(value, make_ref)?);
    Ok(Json::Object(map))
}

/// Check the version of an envelope and unmarshal its payload.
pub fn decode_envelope(tree: &Json, resolver: Option<&dyn ResolveRef>) -> Result<Value> {
    let obj = tree.as_object().ok_or(RpcError::NotAnEnvelope {
        found: json_kind(tree),
    })?;
    let (version, data) = match (obj.get("v"), obj.get("data")) {
        (Some(Json::String(v)), Some(data)) => (v, data),
        _ => return Err(RpcError::MissingVersionInfo),
    };
    let parsed = decode_version(version).ok_or(RpcError::MissingVersionInfo)?;
    if parsed != current_version() {
        return Err(RpcError::UnsupportedVersion {
            version: version.clone(),
        });
    }
    unmarshal_value(data, resolver)
}

/// Encode an envelope straight to JSON text.
pub fn marshal_to_string(value: &Value, make_ref: Option<&dyn MakeRef>) -> Result<String> {
    Ok(serde_json::to_string(&encode_envelope(value, make_ref)?)?)
}

/// Parse JSON text and decode the envelope it holds.
pub fn unmarshal_from_str(text: &str, resolver: Option<&dyn ResolveRef>) -> Result<Value> {
    let tree: Json = serde_json::from_str(text)?;
    decode_envelope(&tree, resolver)
}
