//! JSON tree → Value decoder, the mirror of [`crate::marshal`].

use crate::marshal::TypeTag;
use crate::tensor::NdArray;
use crate::value::{Complex, RemoteRef, Value, ValueSet};
use crate::{Result, RpcError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Value as Json};

/// Turns a decoded `ref` tag into a value.
///
/// The server maps reference urls back to live objects; the client keeps
/// them as [`Value::Ref`] so they can become proxies.
pub trait ResolveRef {
    fn resolve_ref(&self, remote: RemoteRef) -> Result<Value>;
}

impl<F> ResolveRef for F
where
    F: Fn(RemoteRef) -> Result<Value>,
{
    fn resolve_ref(&self, remote: RemoteRef) -> Result<Value> {
        self(remote)
    }
}

/// Resolver that keeps every reference as a plain [`Value::Ref`].
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepRefs;

impl ResolveRef for KeepRefs {
    fn resolve_ref(&self, remote: RemoteRef) -> Result<Value> {
        Ok(Value::Ref(remote))
    }
}

/// Short name of a JSON node kind, for error messages.
pub(crate) fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "bool",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn field<'a>(obj: &'a Map<String, Json>, tag: TypeTag, name: &'static str) -> Result<&'a Json> {
    obj.get(name).ok_or_else(|| RpcError::MissingField {
        tag: tag.to_string(),
        field: name,
    })
}

fn str_field<'a>(obj: &'a Map<String, Json>, tag: TypeTag, name: &'static str) -> Result<&'a str> {
    let value = field(obj, tag, name)?;
    value.as_str().ok_or_else(|| {
        RpcError::decode(format!(
            "'{}' field of '{}' must be a string, got {}",
            name,
            tag,
            json_kind(value)
        ))
    })
}

fn array_field<'a>(
    obj: &'a Map<String, Json>,
    tag: TypeTag,
    name: &'static str,
) -> Result<&'a Vec<Json>> {
    let value = field(obj, tag, name)?;
    value.as_array().ok_or_else(|| {
        RpcError::decode(format!(
            "'{}' field of '{}' must be an array, got {}",
            name,
            tag,
            json_kind(value)
        ))
    })
}

fn decode_base64(text: &str, tag: TypeTag) -> Result<Vec<u8>> {
    STANDARD
        .decode(text.as_bytes())
        .map_err(|e| RpcError::decode(format!("invalid base64 in '{}': {}", tag, e)))
}

fn decode_special_float(text: &str) -> Result<f64> {
    match text {
        "inf" => Ok(f64::INFINITY),
        "-inf" => Ok(f64::NEG_INFINITY),
        "nan" => Ok(f64::NAN),
        other => Err(RpcError::decode(format!("invalid float literal '{}'", other))),
    }
}

/// A float component: a JSON number or a tagged non-finite float.
fn decode_float(json: &Json) -> Result<f64> {
    if let Some(f) = json.as_f64() {
        return Ok(f);
    }
    if let Some(obj) = json.as_object() {
        if obj.get("type").and_then(Json::as_str) == Some(TypeTag::Float.as_str()) {
            return decode_special_float(str_field(obj, TypeTag::Float, "data")?);
        }
    }
    Err(RpcError::decode(format!("expected a number, got {}", json_kind(json))))
}

fn decode_seq(items: &[Json], resolver: Option<&dyn ResolveRef>) -> Result<Vec<Value>> {
    items
        .iter()
        .map(|item| unmarshal_value(item, resolver))
        .collect()
}

fn decode_tagged(obj: &Map<String, Json>, resolver: Option<&dyn ResolveRef>) -> Result<Value> {
    let tag_name = match obj.get("type") {
        Some(Json::String(tag)) => tag.as_str(),
        Some(other) => {
            return Err(RpcError::decode(format!(
                "type annotation must be a string, got {}",
                json_kind(other)
            )))
        }
        None => return Err(RpcError::decode("object has no type annotation")),
    };
    let tag = TypeTag::parse(tag_name).ok_or_else(|| RpcError::UnknownTypeTag {
        tag: tag_name.to_string(),
    })?;

    match tag {
        TypeTag::Dict => {
            let data = field(obj, tag, "data")?;
            let inner = data.as_object().ok_or_else(|| {
                RpcError::decode(format!("'data' of 'dict' must be an object, got {}", json_kind(data)))
            })?;
            let mut map = std::collections::BTreeMap::new();
            for (key, value) in inner {
                map.insert(key.clone(), unmarshal_value(value, resolver)?);
            }
            Ok(Value::Dict(map))
        }
        TypeTag::Tuple => Ok(Value::Tuple(decode_seq(array_field(obj, tag, "data")?, resolver)?)),
        TypeTag::Set => {
            let items = decode_seq(array_field(obj, tag, "data")?, resolver)?;
            Ok(Value::Set(items.into_iter().collect::<ValueSet>()))
        }
        TypeTag::NdArray => {
            let binary = decode_base64(str_field(obj, tag, "data")?, tag)?;
            Ok(Value::Array(NdArray::from_npy(&binary)?))
        }
        TypeTag::Complex => match array_field(obj, tag, "data")?.as_slice() {
            [re, im] => Ok(Value::Complex(Complex::new(decode_float(re)?, decode_float(im)?))),
            other => Err(RpcError::decode(format!(
                "'data' of 'complex' must hold 2 numbers, got {}",
                other.len()
            ))),
        },
        TypeTag::Bytes => Ok(Value::Bytes(decode_base64(str_field(obj, tag, "data")?, tag)?)),
        TypeTag::Float => Ok(Value::Float(decode_special_float(str_field(obj, tag, "data")?)?)),
        TypeTag::Ref => {
            let url = str_field(obj, tag, "url")?.to_string();
            let class = obj
                .get("class")
                .and_then(Json::as_str)
                .unwrap_or_default()
                .to_string();
            match resolver {
                Some(resolver) => resolver.resolve_ref(RemoteRef { url, class }),
                None => Err(RpcError::decode(format!(
                    "no reference resolver for '{}'",
                    url
                ))),
            }
        }
    }
}

/// Unmarshal a JSON tree into a value.
///
/// `resolver` handles `ref` tags; without it they fail to decode.
pub fn unmarshal_value(tree: &Json, resolver: Option<&dyn ResolveRef>) -> Result<Value> {
    match tree {
        Json::Null => Ok(Value::Null),
        Json::Bool(b) => Ok(Value::Bool(*b)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Int(i))
            } else if let Some(u) = n.as_u64() {
                Ok(Value::UInt(u))
            } else {
                n.as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| RpcError::decode(format!("unrepresentable number {}", n)))
            }
        }
        Json::String(s) => Ok(Value::Str(s.clone())),
        Json::Array(items) => Ok(Value::List(decode_seq(items, resolver)?)),
        Json::Object(obj) => decode_tagged(obj, resolver),
    }
}
