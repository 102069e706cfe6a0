//! Value → JSON tree encoder.
//!
//! Native JSON scalars pass through unchanged, plain lists become bare
//! arrays, and everything else is wrapped as `{"type": <tag>, "data": ...}`.
//! Dispatch follows a fixed order because the categories overlap for live
//! objects: float adapter, mapping adapter, set adapter, iterable adapter,
//! then reference fallback.
//!
//! Cyclic graphs reachable through container adapters are not detected and
//! recurse until the stack is exhausted.

use crate::object::RemoteObject;
use crate::registry::MakeRef;
use crate::tensor::NdArray;
use crate::value::{Complex, Value};
use crate::{Result, RpcError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{Map, Number, Value as Json};
use std::sync::Arc;

/// Discriminator of a tagged JSON object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Dict,
    Tuple,
    Set,
    NdArray,
    Complex,
    Bytes,
    Ref,
    /// Non-finite float (`inf`, `-inf`, `nan`), which JSON cannot carry as a number.
    Float,
}

impl TypeTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeTag::Dict => "dict",
            TypeTag::Tuple => "tuple",
            TypeTag::Set => "set",
            TypeTag::NdArray => "ndarray",
            TypeTag::Complex => "complex",
            TypeTag::Bytes => "bytes",
            TypeTag::Ref => "ref",
            TypeTag::Float => "float",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "dict" => Some(TypeTag::Dict),
            "tuple" => Some(TypeTag::Tuple),
            "set" => Some(TypeTag::Set),
            "ndarray" => Some(TypeTag::NdArray),
            "complex" => Some(TypeTag::Complex),
            "bytes" => Some(TypeTag::Bytes),
            "ref" => Some(TypeTag::Ref),
            "float" => Some(TypeTag::Float),
            _ => None,
        }
    }
}

impl std::fmt::Display for TypeTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// `{"type": tag, "data": data}`.
fn wrapped(tag: TypeTag, data: Json) -> Map<String, Json> {
    let mut map = Map::new();
    map.insert("type".to_string(), Json::from(tag.as_str()));
    map.insert("data".to_string(), data);
    map
}

pub(crate) fn encode_float(f: f64) -> Json {
    match Number::from_f64(f) {
        Some(n) => Json::Number(n),
        None => {
            let text = if f.is_nan() {
                "nan"
            } else if f > 0.0 {
                "inf"
            } else {
                "-inf"
            };
            Json::Object(wrapped(TypeTag::Float, Json::from(text)))
        }
    }
}

fn encode_complex(c: &Complex) -> Json {
    let data = Json::Array(vec![encode_float(c.re), encode_float(c.im)]);
    Json::Object(wrapped(TypeTag::Complex, data))
}

fn encode_ndarray(arr: &NdArray) -> Json {
    let data = STANDARD.encode(arr.to_npy());
    let mut map = wrapped(TypeTag::NdArray, Json::from(data));
    map.insert(
        "shape".to_string(),
        Json::Array(arr.shape().iter().map(|d| Json::from(*d)).collect()),
    );
    map.insert("size".to_string(), Json::from(arr.size()));
    Json::Object(map)
}

fn encode_ref(url: String, class: &str) -> Json {
    let mut map = Map::new();
    map.insert("type".to_string(), Json::from(TypeTag::Ref.as_str()));
    map.insert("url".to_string(), Json::from(url));
    map.insert("class".to_string(), Json::from(class));
    Json::Object(map)
}

fn encode_seq<'a>(
    items: impl IntoIterator<Item = &'a Value>,
    make_ref: Option<&dyn MakeRef>,
) -> Result<Vec<Json>> {
    items
        .into_iter()
        .map(|item| marshal_value(item, make_ref))
        .collect()
}

fn encode_dict<'a>(
    entries: impl IntoIterator<Item = (&'a String, &'a Value)>,
    make_ref: Option<&dyn MakeRef>,
) -> Result<Json> {
    let mut inner = Map::new();
    for (key, value) in entries {
        inner.insert(key.clone(), marshal_value(value, make_ref)?);
    }
    Ok(Json::Object(wrapped(TypeTag::Dict, Json::Object(inner))))
}

/// Encode a live object through its adapters, falling back to a reference.
fn encode_object(obj: &Arc<dyn RemoteObject>, make_ref: Option<&dyn MakeRef>) -> Result<Json> {
    if let Some(f) = obj.as_float() {
        return Ok(encode_float(f));
    }
    if let Some(mapping) = obj.to_mapping() {
        return encode_dict(&mapping, make_ref);
    }
    if let Some(set) = obj.to_set() {
        let data = encode_seq(&set, make_ref)?;
        return Ok(Json::Object(wrapped(TypeTag::Set, Json::Array(data))));
    }
    if let Some(items) = obj.to_sequence() {
        return Ok(Json::Array(encode_seq(&items, make_ref)?));
    }
    match make_ref {
        Some(make_ref) => Ok(encode_ref(make_ref.make_ref(obj), obj.type_name())),
        None => Err(RpcError::UnsupportedType {
            type_name: obj.type_name().to_string(),
        }),
    }
}

/// Marshal a value into a JSON tree.
///
/// `make_ref` is consulted only for live objects with no value
/// representation; without it those fail with [`RpcError::UnsupportedType`].
pub fn marshal_value(value: &Value, make_ref: Option<&dyn MakeRef>) -> Result<Json> {
    let json = match value {
        // native JSON scalars
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::UInt(u) => Json::from(*u),
        Value::Float(f) => encode_float(*f),
        Value::Str(s) => Json::from(s.as_str()),

        Value::Complex(c) => encode_complex(c),
        Value::Array(arr) => encode_ndarray(arr),
        Value::Bytes(bytes) => Json::Object(wrapped(TypeTag::Bytes, Json::from(STANDARD.encode(bytes)))),

        // composite types
        Value::Dict(map) => encode_dict(map, make_ref)?,
        Value::Set(set) => {
            let data = encode_seq(set, make_ref)?;
            Json::Object(wrapped(TypeTag::Set, Json::Array(data)))
        }
        Value::Tuple(items) => {
            let data = encode_seq(items, make_ref)?;
            Json::Object(wrapped(TypeTag::Tuple, Json::Array(data)))
        }
        Value::List(items) => Json::Array(encode_seq(items, make_ref)?),

        // a reference received earlier goes back out unchanged
        Value::Ref(r) => encode_ref(r.url.clone(), &r.class),
        Value::Object(obj) => encode_object(obj, make_ref)?,
    };
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{ExposedObject, RemoteObject};
    use crate::value::ValueSet;
    use crate::{dict, tuple};
    use serde_json::json;
    use std::collections::BTreeMap;

    struct TestType;

    impl RemoteObject for TestType {
        fn type_name(&self) -> &str {
            "TestType"
        }
    }

    struct Temperature(f64);

    impl RemoteObject for Temperature {
        fn type_name(&self) -> &str {
            "Temperature"
        }

        fn as_float(&self) -> Option<f64> {
            Some(self.0)
        }

        // the float adapter wins over the mapping adapter
        fn to_mapping(&self) -> Option<BTreeMap<String, Value>> {
            Some(BTreeMap::new())
        }
    }

    struct Settings;

    impl RemoteObject for Settings {
        fn type_name(&self) -> &str {
            "Settings"
        }

        fn to_mapping(&self) -> Option<BTreeMap<String, Value>> {
            let mut map = BTreeMap::new();
            map.insert("gain".to_string(), Value::Int(3));
            Some(map)
        }
    }

    struct Channels;

    impl RemoteObject for Channels {
        fn type_name(&self) -> &str {
            "Channels"
        }

        fn to_set(&self) -> Option<ValueSet> {
            Some(vec![Value::from("a")].into_iter().collect())
        }

        fn to_sequence(&self) -> Option<Vec<Value>> {
            Some(vec![Value::from("never")])
        }
    }

    struct Samples;

    impl RemoteObject for Samples {
        fn type_name(&self) -> &str {
            "Samples"
        }

        fn to_sequence(&self) -> Option<Vec<Value>> {
            Some(vec![Value::Int(1), Value::Int(2)])
        }
    }

    #[test]
    fn test_scalars_pass_through() {
        assert_eq!(marshal_value(&Value::Int(5), None).unwrap(), json!(5));
        assert_eq!(marshal_value(&Value::UInt(u64::MAX), None).unwrap(), json!(u64::MAX));
        assert_eq!(marshal_value(&Value::Float(0.03125), None).unwrap(), json!(0.03125));
        assert_eq!(marshal_value(&Value::from("s\0"), None).unwrap(), json!("s\0"));
        assert_eq!(marshal_value(&Value::Null, None).unwrap(), json!(null));
        assert_eq!(marshal_value(&Value::Bool(true), None).unwrap(), json!(true));
    }

    #[test]
    fn test_dict() {
        let value = dict! { "a" => 5, "b" => vec![1, 2] };
        assert_eq!(
            marshal_value(&value, None).unwrap(),
            json!({"type": "dict", "data": {"a": 5, "b": [1, 2]}})
        );
    }

    #[test]
    fn test_nested_dict() {
        let value = dict! { "a" => dict! { "a" => 5, "b" => 10 }, "d" => 10 };
        assert_eq!(
            marshal_value(&value, None).unwrap(),
            json!({
                "type": "dict",
                "data": {"a": {"type": "dict", "data": {"a": 5, "b": 10}}, "d": 10}
            })
        );
    }

    #[test]
    fn test_tuple_and_list() {
        assert_eq!(
            marshal_value(&tuple!(1, 2, 3), None).unwrap(),
            json!({"type": "tuple", "data": [1, 2, 3]})
        );
        assert_eq!(marshal_value(&Value::from(vec![1, 2, 3]), None).unwrap(), json!([1, 2, 3]));
    }

    #[test]
    fn test_complex_and_bytes() {
        assert_eq!(
            marshal_value(&Value::Complex(Complex::new(1.0, -1.0)), None).unwrap(),
            json!({"type": "complex", "data": [1.0, -1.0]})
        );
        assert_eq!(
            marshal_value(&Value::Bytes(b"\0\x05\x08text\rs".to_vec()), None).unwrap(),
            json!({"type": "bytes", "data": "AAUIdGV4dA1z"})
        );
    }

    #[test]
    fn test_non_finite_floats() {
        assert_eq!(
            marshal_value(&Value::Float(f64::INFINITY), None).unwrap(),
            json!({"type": "float", "data": "inf"})
        );
        assert_eq!(
            marshal_value(&Value::Float(f64::NEG_INFINITY), None).unwrap(),
            json!({"type": "float", "data": "-inf"})
        );
        assert_eq!(
            marshal_value(&Value::Float(f64::NAN), None).unwrap(),
            json!({"type": "float", "data": "nan"})
        );
    }

    #[test]
    fn test_ndarray() {
        let values: Vec<u8> = (0..18).collect();
        let arr = NdArray::from_vec(vec![3, 3, 2], values).unwrap();
        assert_eq!(
            marshal_value(&Value::Array(arr), None).unwrap(),
            json!({
                "type": "ndarray",
                "shape": [3, 3, 2],
                "size": 18,
                "data": "k05VTVBZAwB0AAAAeydkZXNjcic6ICd8dTEnLCAnZm9ydHJhb\
                         l9vcmRlcic6IEZhbHNlLCAnc2hhcGUnOiAoMywgMywgMiksIH\
                         0gICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgICAgICA\
                         gICAgICAgICAgICAgICAgIAoAAQIDBAUGBwgJCgsMDQ4PEBE="
            })
        );
    }

    #[test]
    fn test_ref_with_callback() {
        let make_ref = |_: &Arc<dyn RemoteObject>| "/ref_url".to_string();
        let value = Value::object(TestType);
        assert_eq!(
            marshal_value(&value, Some(&make_ref)).unwrap(),
            json!({"type": "ref", "url": "/ref_url", "class": "TestType"})
        );
    }

    #[test]
    fn test_unsupported_without_callback() {
        match marshal_value(&Value::object(TestType), None) {
            Err(RpcError::UnsupportedType { type_name }) => assert_eq!(type_name, "TestType"),
            other => panic!("Expected UnsupportedType, got: {:?}", other),
        }

        // failure inside a container propagates
        let value = Value::List(vec![Value::Int(1), Value::object(ExposedObject::new("Inner"))]);
        assert!(matches!(
            marshal_value(&value, None),
            Err(RpcError::UnsupportedType { .. })
        ));
    }

    #[test]
    fn test_adapter_dispatch_order() {
        assert_eq!(marshal_value(&Value::object(Temperature(21.5)), None).unwrap(), json!(21.5));
        assert_eq!(
            marshal_value(&Value::object(Settings), None).unwrap(),
            json!({"type": "dict", "data": {"gain": 3}})
        );
        assert_eq!(
            marshal_value(&Value::object(Channels), None).unwrap(),
            json!({"type": "set", "data": ["a"]})
        );
        assert_eq!(marshal_value(&Value::object(Samples), None).unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_received_ref_is_reemitted() {
        let value = Value::Ref(crate::value::RemoteRef {
            url: "/id/abc/".into(),
            class: "Stage".into(),
        });
        assert_eq!(
            marshal_value(&value, None).unwrap(),
            json!({"type": "ref", "url": "/id/abc/", "class": "Stage"})
        );
    }

    #[test]
    fn test_type_tag_names() {
        for tag in [
            TypeTag::Dict,
            TypeTag::Tuple,
            TypeTag::Set,
            TypeTag::NdArray,
            TypeTag::Complex,
            TypeTag::Bytes,
            TypeTag::Ref,
            TypeTag::Float,
        ] {
            assert_eq!(TypeTag::parse(tag.as_str()), Some(tag));
        }
        assert_eq!(TypeTag::parse("bogus"), None);
    }
}
