//! The closed set of value shapes the marshal engine understands.
//!
//! [`Value::Object`] is the open end: anything the engines cannot copy by
//! value is held as a live [`RemoteObject`] and either narrowed through one
//! of its adapters or sent as a reference.

use crate::object::RemoteObject;
use crate::tensor::NdArray;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A complex number of two `f64` components.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex {
    pub re: f64,
    pub im: f64,
}

impl Complex {
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

/// A decoded reference to an object held by the server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteRef {
    /// Absolute or relative path of the live object (`/id/<id>/`).
    pub url: String,
    /// Display name of the object's type. Never used for dispatch.
    pub class: String,
}

/// An unordered collection of unique values.
///
/// Scalars, strings and bytes are indexed by hash. Members with no stable
/// hash (containers, arrays, live objects) are compared one by one.
/// Comparison ignores order.
#[derive(Debug, Clone, Default)]
pub struct ValueSet {
    items: Vec<Value>,
    hashed: HashMap<u64, Vec<usize>>,
    unhashed: Vec<usize>,
}

/// Hash of a value consistent with `Value::eq`, or `None` for members
/// that need a linear scan.
fn member_hash(value: &Value) -> Option<u64> {
    let mut hasher = DefaultHasher::new();
    match value {
        Value::Null => 0u8.hash(&mut hasher),
        Value::Bool(b) => (1u8, b).hash(&mut hasher),
        // non-negative ints equal the same uint
        Value::Int(i) => match u64::try_from(*i) {
            Ok(u) => (2u8, u).hash(&mut hasher),
            Err(_) => (3u8, i).hash(&mut hasher),
        },
        Value::UInt(u) => (2u8, u).hash(&mut hasher),
        Value::Float(x) => (4u8, float_bits(*x)).hash(&mut hasher),
        Value::Complex(c) => (5u8, float_bits(c.re), float_bits(c.im)).hash(&mut hasher),
        Value::Str(s) => (6u8, s).hash(&mut hasher),
        Value::Bytes(b) => (7u8, b).hash(&mut hasher),
        Value::Ref(r) => (8u8, r).hash(&mut hasher),
        _ => return None,
    }
    Some(hasher.finish())
}

/// `0.0` and `-0.0` compare equal, so they share bits here.
fn float_bits(x: f64) -> u64 {
    if x == 0.0 {
        0
    } else {
        x.to_bits()
    }
}

impl ValueSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, returning `false` if an equal value was present.
    pub fn insert(&mut self, value: Value) -> bool {
        if self.contains(&value) {
            return false;
        }
        let index = self.items.len();
        match member_hash(&value) {
            Some(hash) => self.hashed.entry(hash).or_default().push(index),
            None => self.unhashed.push(index),
        }
        self.items.push(value);
        true
    }

    pub fn contains(&self, value: &Value) -> bool {
        let candidates = match member_hash(value) {
            Some(hash) => match self.hashed.get(&hash) {
                Some(bucket) => bucket.as_slice(),
                None => return false,
            },
            None => self.unhashed.as_slice(),
        };
        candidates.iter().any(|&index| self.items[index] == *value)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.items.iter()
    }
}

impl PartialEq for ValueSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|item| other.contains(item))
    }
}

impl FromIterator<Value> for ValueSet {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        let mut set = ValueSet::new();
        for value in iter {
            set.insert(value);
        }
        set
    }
}

impl IntoIterator for ValueSet {
    type Item = Value;
    type IntoIter = std::vec::IntoIter<Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValueSet {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// A value that can cross the wire.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Complex(Complex),
    Bytes(Vec<u8>),
    /// Ordered sequence that may decode as any sequence.
    List(Vec<Value>),
    /// Fixed-arity sequence that must decode back into a tuple.
    Tuple(Vec<Value>),
    Set(ValueSet),
    Dict(BTreeMap<String, Value>),
    Array(NdArray),
    Ref(RemoteRef),
    Object(Arc<dyn RemoteObject>),
}

impl Value {
    /// Runtime type name, as reported in errors and `ref` tags.
    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) | Value::UInt(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Complex(_) => "complex",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Set(_) => "set",
            Value::Dict(_) => "dict",
            Value::Array(_) => "ndarray",
            Value::Ref(r) => &r.class,
            Value::Object(obj) => obj.type_name(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::UInt(u) => i64::try_from(*u).ok(),
            _ => None,
        }
    }

    /// Numeric value as `f64`, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::UInt(u) => Some(*u as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// Elements of a list or tuple.
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Dict(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&NdArray> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_remote_ref(&self) -> Option<&RemoteRef> {
        match self {
            Value::Ref(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<dyn RemoteObject>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    /// Look up a key of a dict value.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_dict().and_then(|map| map.get(key))
    }

    /// Wrap a live object.
    pub fn object<T: RemoteObject>(obj: T) -> Self {
        Value::Object(Arc::new(obj))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::UInt(a), Value::UInt(b)) => a == b,
            (Value::Int(a), Value::UInt(b)) | (Value::UInt(b), Value::Int(a)) => {
                u64::try_from(*a).map(|a| a == *b).unwrap_or(false)
            }
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Complex(a), Value::Complex(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => a == b,
            (Value::Dict(a), Value::Dict(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Ref(a), Value::Ref(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Int(i) => write!(f, "Int({})", i),
            Value::UInt(u) => write!(f, "UInt({})", u),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Str(s) => write!(f, "Str({:?})", s),
            Value::Complex(c) => write!(f, "Complex({}, {})", c.re, c.im),
            Value::Bytes(b) => write!(f, "Bytes({:?})", b),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Tuple(items) => f.debug_tuple("Tuple").field(items).finish(),
            Value::Set(set) => f.debug_set().entries(set.iter()).finish(),
            Value::Dict(map) => f.debug_map().entries(map.iter()).finish(),
            Value::Array(arr) => write!(f, "Array({} {:?})", arr.dtype(), arr.shape()),
            Value::Ref(r) => write!(f, "Ref({} {})", r.class, r.url),
            Value::Object(obj) => write!(f, "<{} object>", obj.type_name()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! from_signed {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::Int(v as i64)
            }
        })*
    };
}

macro_rules! from_unsigned {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::UInt(v as u64)
            }
        })*
    };
}

from_signed!(i8, i16, i32, i64);
from_unsigned!(u8, u16, u32, u64, usize);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Complex> for Value {
    fn from(v: Complex) -> Self {
        Value::Complex(v)
    }
}

impl From<NdArray> for Value {
    fn from(v: NdArray) -> Self {
        Value::Array(v)
    }
}

impl From<RemoteRef> for Value {
    fn from(v: RemoteRef) -> Self {
        Value::Ref(v)
    }
}

impl From<ValueSet> for Value {
    fn from(v: ValueSet) -> Self {
        Value::Set(v)
    }
}

impl From<Arc<dyn RemoteObject>> for Value {
    fn from(v: Arc<dyn RemoteObject>) -> Self {
        Value::Object(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<V: Into<Value>> FromIterator<(String, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Value::Dict(iter.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

/// Build a [`Value::Tuple`] from a list of expressions.
#[macro_export]
macro_rules! tuple {
    ($($item:expr),* $(,)?) => {
        $crate::Value::Tuple(vec![$($crate::Value::from($item)),*])
    };
}

/// Build a [`Value::Dict`] from `key => value` pairs.
#[macro_export]
macro_rules! dict {
    ($($key:expr => $value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut map = ::std::collections::BTreeMap::new();
        $(map.insert(::std::string::String::from($key), $crate::Value::from($value));)*
        $crate::Value::Dict(map)
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_ignores_order_and_duplicates() {
        let a: ValueSet = vec![Value::Int(1), Value::Int(5), Value::Int(8), Value::Int(5)]
            .into_iter()
            .collect();
        let b: ValueSet = vec![Value::Int(8), Value::Int(1), Value::Int(5)]
            .into_iter()
            .collect();
        assert_eq!(a.len(), 3);
        assert_eq!(a, b);
    }

    #[test]
    fn test_int_uint_equality() {
        assert_eq!(Value::Int(5), Value::UInt(5));
        assert_ne!(Value::Int(-1), Value::UInt(u64::MAX));
        assert_ne!(Value::Int(1), Value::Float(1.0));
    }

    #[test]
    fn test_list_and_tuple_differ() {
        assert_ne!(Value::from(vec![1, 2]), tuple!(1, 2));
        assert_eq!(tuple!(1, 2).as_sequence(), Value::from(vec![1, 2]).as_sequence());
    }

    #[test]
    fn test_dict_macro() {
        let d = dict! { "a" => 5, "b" => vec![1, 2] };
        assert_eq!(d.get("a"), Some(&Value::Int(5)));
        assert_eq!(d.get("b").and_then(Value::as_sequence).map(|s| s.len()), Some(2));
        assert_eq!(d.type_name(), "dict");
    }

    #[test]
    fn test_option_into_value() {
        assert!(Value::from(None::<i32>).is_null());
        assert_eq!(Value::from(Some("x")), Value::Str("x".into()));
    }

    #[test]
    fn test_set_membership_follows_equality() {
        let set: ValueSet = vec![
            Value::Int(1),
            Value::UInt(1),
            Value::Float(0.0),
            Value::Float(-0.0),
            Value::Float(f64::NAN),
            Value::Float(f64::NAN),
            Value::from(vec![1, 2]),
            Value::from(vec![1, 2]),
            Value::from("a"),
            Value::Bytes(b"a".to_vec()),
        ]
        .into_iter()
        .collect();
        // NaN never equals itself, so both stay
        assert_eq!(set.len(), 7);
        assert!(set.contains(&Value::UInt(1)));
        assert!(set.contains(&Value::Float(-0.0)));
        assert!(set.contains(&Value::from(vec![1, 2])));
        assert!(!set.contains(&Value::Float(1.0)));
        assert!(!set.contains(&Value::Float(f64::NAN)));
    }

    #[test]
    fn test_large_set_builds_quickly() {
        let start = std::time::Instant::now();
        let set: ValueSet = (0..200_000i64)
            .chain(0..200_000)
            .map(Value::Int)
            .collect();
        assert_eq!(set.len(), 200_000);
        assert!(start.elapsed() < std::time::Duration::from_secs(10));
    }
}
