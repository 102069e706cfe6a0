//! Objects that can be navigated and invoked remotely.
//!
//! Nothing is reachable by reflection: an exposed type implements
//! [`RemoteObject`] (usually through [`ExposedObject`]) and declares up front
//! which attributes and methods the endpoint resolver may reach.

use crate::value::{Value, ValueSet};
use crate::{Result, RpcError};
use anyhow::{anyhow, bail};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Capability interface consumed by the endpoint resolver and marshal engine.
///
/// Every method except [`type_name`](RemoteObject::type_name) has a default,
/// so an implementor only declares what it actually supports.
pub trait RemoteObject: Send + Sync + 'static {
    /// Display name of the type, sent as the `class` of a reference.
    fn type_name(&self) -> &str;

    /// Documentation string served under `__doc__`.
    fn doc(&self) -> Option<String> {
        None
    }

    /// Resolve a named attribute, or `None` if it is not exposed.
    fn attr(&self, name: &str) -> Option<Value> {
        let _ = name;
        None
    }

    /// Call signature served under `__sig__`.
    fn signature(&self) -> Option<Signature> {
        None
    }

    fn is_callable(&self) -> bool {
        false
    }

    fn call(&self, args: CallArgs) -> anyhow::Result<Value> {
        let _ = args;
        bail!("'{}' object is not callable", self.type_name())
    }

    /// Float conversion adapter; marshaled as a plain float when present.
    fn as_float(&self) -> Option<f64> {
        None
    }

    /// Mapping adapter; marshaled as `dict` when present.
    fn to_mapping(&self) -> Option<BTreeMap<String, Value>> {
        None
    }

    /// Set adapter; marshaled as `set` when present.
    fn to_set(&self) -> Option<ValueSet> {
        None
    }

    /// Iterable adapter; marshaled as a bare list when present.
    fn to_sequence(&self) -> Option<Vec<Value>> {
        None
    }
}

/// Positional and keyword arguments of a call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CallArgs {
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
}

impl CallArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn positional(args: Vec<Value>) -> Self {
        Self {
            args,
            kwargs: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Interpret a decoded POST body.
    ///
    /// A dict is read as `{args, kwargs}` (both optional), a list or tuple as
    /// positional arguments, and any other value as a single argument.
    pub fn from_body(body: Value) -> Result<Self> {
        match body {
            Value::Dict(mut map) => {
                let args = match map.remove("args") {
                    None => Vec::new(),
                    Some(Value::List(items)) | Some(Value::Tuple(items)) => items,
                    Some(other) => {
                        return Err(RpcError::InvalidBody {
                            message: format!("'args' must be a sequence, got {}", other.type_name()),
                        })
                    }
                };
                let kwargs = match map.remove("kwargs") {
                    None => BTreeMap::new(),
                    Some(Value::Dict(kwargs)) => kwargs,
                    Some(other) => {
                        return Err(RpcError::InvalidBody {
                            message: format!("'kwargs' must be a dict, got {}", other.type_name()),
                        })
                    }
                };
                Ok(Self { args, kwargs })
            }
            Value::List(items) | Value::Tuple(items) => Ok(Self::positional(items)),
            other => Ok(Self::positional(vec![other])),
        }
    }

    /// The `{args, kwargs}` body a client sends.
    pub fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("args".to_string(), Value::Tuple(self.args.clone()));
        map.insert("kwargs".to_string(), Value::Dict(self.kwargs.clone()));
        Value::Dict(map)
    }

    /// Argument by position, falling back to keyword.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.args.get(index).or_else(|| self.kwargs.get(name))
    }

    /// Like [`get`](Self::get), failing when the argument is absent.
    pub fn require(&self, index: usize, name: &str) -> anyhow::Result<&Value> {
        self.get(index, name)
            .ok_or_else(|| anyhow!("missing required argument '{}'", name))
    }
}

/// How a parameter may be bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    PositionalOnly,
    PositionalOrKeyword,
    VarPositional,
    KeywordOnly,
    VarKeyword,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::PositionalOnly => "POSITIONAL_ONLY",
            ParamKind::PositionalOrKeyword => "POSITIONAL_OR_KEYWORD",
            ParamKind::VarPositional => "VAR_POSITIONAL",
            ParamKind::KeywordOnly => "KEYWORD_ONLY",
            ParamKind::VarKeyword => "VAR_KEYWORD",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
    pub default: Option<Value>,
}

/// Description of a callable's parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    pub params: Vec<Param>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, name: &str, kind: ParamKind, default: Option<Value>) -> Self {
        self.params.push(Param {
            name: name.to_string(),
            kind,
            default,
        });
        self
    }

    pub fn param(self, name: &str) -> Self {
        self.push(name, ParamKind::PositionalOrKeyword, None)
    }

    pub fn param_with_default(self, name: &str, default: impl Into<Value>) -> Self {
        self.push(name, ParamKind::PositionalOrKeyword, Some(default.into()))
    }

    pub fn keyword_only(self, name: &str, default: Option<Value>) -> Self {
        self.push(name, ParamKind::KeywordOnly, default)
    }

    pub fn var_args(self, name: &str) -> Self {
        self.push(name, ParamKind::VarPositional, None)
    }

    pub fn var_kwargs(self, name: &str) -> Self {
        self.push(name, ParamKind::VarKeyword, None)
    }

    /// Check that `args` can be bound to these parameters.
    pub fn check(&self, args: &CallArgs) -> anyhow::Result<()> {
        let positional: Vec<&Param> = self
            .params
            .iter()
            .filter(|p| matches!(p.kind, ParamKind::PositionalOnly | ParamKind::PositionalOrKeyword))
            .collect();
        let has_var_args = self.params.iter().any(|p| p.kind == ParamKind::VarPositional);
        let has_var_kwargs = self.params.iter().any(|p| p.kind == ParamKind::VarKeyword);

        if args.args.len() > positional.len() && !has_var_args {
            bail!(
                "takes {} positional arguments but {} were given",
                positional.len(),
                args.args.len()
            );
        }

        for name in args.kwargs.keys() {
            match self.params.iter().position(|p| &p.name == name) {
                Some(i) => {
                    let param = &self.params[i];
                    match param.kind {
                        ParamKind::PositionalOrKeyword => {
                            let slot = positional.iter().position(|p| &p.name == name);
                            if slot.map(|s| s < args.args.len()).unwrap_or(false) {
                                bail!("got multiple values for argument '{}'", name);
                            }
                        }
                        ParamKind::KeywordOnly => {}
                        _ if has_var_kwargs => {}
                        _ => bail!("got an unexpected keyword argument '{}'", name),
                    }
                }
                None if has_var_kwargs => {}
                None => bail!("got an unexpected keyword argument '{}'", name),
            }
        }

        for (slot, param) in positional.iter().enumerate() {
            let bound = slot < args.args.len()
                || (param.kind == ParamKind::PositionalOrKeyword
                    && args.kwargs.contains_key(&param.name));
            if !bound && param.default.is_none() {
                bail!("missing required argument '{}'", param.name);
            }
        }
        for param in self.params.iter().filter(|p| p.kind == ParamKind::KeywordOnly) {
            if param.default.is_none() && !args.kwargs.contains_key(&param.name) {
                bail!("missing required keyword-only argument '{}'", param.name);
            }
        }
        Ok(())
    }

    /// Python-style rendering, e.g. `(a, b=1, *args, **kwargs)`.
    pub fn text(&self) -> String {
        let mut parts = Vec::with_capacity(self.params.len());
        let mut star_written = false;
        for param in &self.params {
            let part = match param.kind {
                ParamKind::VarPositional => {
                    star_written = true;
                    format!("*{}", param.name)
                }
                ParamKind::VarKeyword => format!("**{}", param.name),
                ParamKind::KeywordOnly if !star_written => {
                    star_written = true;
                    parts.push("*".to_string());
                    with_default(param)
                }
                _ => with_default(param),
            };
            parts.push(part);
        }
        if let Some(last_positional_only) = self
            .params
            .iter()
            .rposition(|p| p.kind == ParamKind::PositionalOnly)
        {
            parts.insert(last_positional_only + 1, "/".to_string());
        }
        format!("({})", parts.join(", "))
    }

    /// Marshalable description: `{name?, parameters, text}`.
    pub fn to_value(&self, name: Option<&str>) -> Value {
        let parameters = self
            .params
            .iter()
            .map(|p| {
                let mut map = BTreeMap::new();
                map.insert("name".to_string(), Value::from(p.name.as_str()));
                map.insert("kind".to_string(), Value::from(p.kind.as_str()));
                if let Some(default) = &p.default {
                    map.insert("default".to_string(), default.clone());
                }
                Value::Dict(map)
            })
            .collect();

        let mut map = BTreeMap::new();
        if let Some(name) = name {
            map.insert("name".to_string(), Value::from(name));
        }
        map.insert("parameters".to_string(), Value::List(parameters));
        map.insert("text".to_string(), Value::Str(self.text()));
        Value::Dict(map)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text())
    }
}

fn with_default(param: &Param) -> String {
    match &param.default {
        Some(default) => format!("{}={}", param.name, repr(default)),
        None => param.name.clone(),
    }
}

/// Short python-like literal for signature defaults.
fn repr(value: &Value) -> String {
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Int(i) => i.to_string(),
        Value::UInt(u) => u.to_string(),
        Value::Float(f) => format!("{:?}", f),
        Value::Str(s) => format!("'{}'", s),
        other => format!("<{}>", other.type_name()),
    }
}

type MethodFn = dyn Fn(CallArgs) -> anyhow::Result<Value> + Send + Sync;

/// A named callable with optional documentation and signature.
///
/// When a signature is declared, arguments are checked against it before
/// the function runs.
#[derive(Clone)]
pub struct Method {
    name: String,
    doc: Option<String>,
    signature: Option<Signature>,
    func: Arc<MethodFn>,
}

impl Method {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(CallArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            doc: None,
            signature: None,
            func: Arc::new(func),
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}

impl RemoteObject for Method {
    fn type_name(&self) -> &str {
        "method"
    }

    fn doc(&self) -> Option<String> {
        self.doc.clone()
    }

    fn attr(&self, name: &str) -> Option<Value> {
        match name {
            "__name__" => Some(Value::from(self.name.as_str())),
            _ => None,
        }
    }

    fn signature(&self) -> Option<Signature> {
        self.signature.clone()
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn call(&self, args: CallArgs) -> anyhow::Result<Value> {
        if let Some(signature) = &self.signature {
            signature
                .check(&args)
                .map_err(|e| anyhow!("{}() {}", self.name, e))?;
        }
        (self.func)(args)
    }
}

type Getter = dyn Fn() -> Value + Send + Sync;

enum Member {
    Value(Value),
    Getter(Arc<Getter>),
}

/// Declarative [`RemoteObject`]: a type name plus the members it exposes.
///
/// ```rust,ignore
/// let root = ExposedObject::new("Microscope")
///     .with_doc("Stage and detector control")
///     .value("constant_value", 5)
///     .method(Method::new("fun", |_| Ok(Value::from(10))).with_doc("Doc string 1"));
/// ```
pub struct ExposedObject {
    type_name: String,
    doc: Option<String>,
    members: BTreeMap<String, Member>,
}

impl ExposedObject {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            doc: None,
            members: BTreeMap::new(),
        }
    }

    pub fn with_doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Expose a constant attribute.
    pub fn value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.members.insert(name.into(), Member::Value(value.into()));
        self
    }

    /// Expose a nested object.
    pub fn object(self, name: impl Into<String>, obj: Arc<dyn RemoteObject>) -> Self {
        self.value(name, Value::Object(obj))
    }

    /// Expose an attribute recomputed on every access.
    pub fn getter<F>(mut self, name: impl Into<String>, getter: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.members.insert(name.into(), Member::Getter(Arc::new(getter)));
        self
    }

    /// Expose a method under its own name.
    pub fn method(self, method: Method) -> Self {
        let name = method.name().to_string();
        self.value(name, Value::Object(Arc::new(method)))
    }

    /// Names of every exposed member, sorted.
    pub fn member_names(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }
}

impl fmt::Debug for ExposedObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExposedObject")
            .field("type_name", &self.type_name)
            .field("members", &self.members.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RemoteObject for ExposedObject {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn doc(&self) -> Option<String> {
        self.doc.clone()
    }

    fn attr(&self, name: &str) -> Option<Value> {
        match self.members.get(name)? {
            Member::Value(value) => Some(value.clone()),
            Member::Getter(getter) => Some(getter()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict;

    fn add_method() -> Method {
        Method::new("add", |args| {
            let a = args.require(0, "a")?.as_i64().ok_or_else(|| anyhow!("a must be int"))?;
            let b = args.require(1, "b")?.as_i64().ok_or_else(|| anyhow!("b must be int"))?;
            Ok(Value::Int(a + b))
        })
        .with_signature(Signature::new().param("a").param_with_default("b", 1))
    }

    #[test]
    fn test_call_args_from_body() {
        let body = dict! { "args" => vec![1, 2], "kwargs" => dict! { "x" => "y" } };
        let args = CallArgs::from_body(body).unwrap();
        assert_eq!(args.args, vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(args.kwargs.get("x"), Some(&Value::from("y")));

        let args = CallArgs::from_body(Value::from(vec![3, 4])).unwrap();
        assert_eq!(args.args.len(), 2);
        assert!(args.kwargs.is_empty());

        let args = CallArgs::from_body(Value::from("solo")).unwrap();
        assert_eq!(args.args, vec![Value::from("solo")]);

        let args = CallArgs::from_body(dict! {}).unwrap();
        assert_eq!(args, CallArgs::new());
    }

    #[test]
    fn test_call_args_rejects_bad_kwargs() {
        let body = dict! { "args" => vec![1], "kwargs" => 5 };
        match CallArgs::from_body(body) {
            Err(RpcError::InvalidBody { message }) => assert!(message.contains("kwargs")),
            other => panic!("Expected InvalidBody, got: {:?}", other),
        }
    }

    #[test]
    fn test_call_args_to_value_uses_tuple() {
        let value = CallArgs::new().arg(1).kwarg("k", true).to_value();
        assert_eq!(value.get("args"), Some(&crate::tuple!(1)));
        assert_eq!(value.get("kwargs"), Some(&dict! { "k" => true }));
    }

    #[test]
    fn test_signature_text() {
        let sig = Signature::new()
            .param("a")
            .param_with_default("b", 1)
            .var_args("args")
            .keyword_only("flag", Some(Value::Bool(false)))
            .var_kwargs("kwargs");
        assert_eq!(sig.text(), "(a, b=1, *args, flag=False, **kwargs)");

        let sig = Signature::new().keyword_only("name", Some(Value::from("x")));
        assert_eq!(sig.text(), "(*, name='x')");
        assert_eq!(Signature::new().to_string(), "()");
    }

    #[test]
    fn test_signature_check() {
        let method = add_method();
        assert_eq!(method.call(CallArgs::new().arg(1).arg(2)).unwrap(), Value::Int(3));
        assert_eq!(method.call(CallArgs::new().arg(4)).unwrap(), Value::Int(5));
        assert_eq!(
            method.call(CallArgs::new().kwarg("a", 2).kwarg("b", 2)).unwrap(),
            Value::Int(4)
        );

        let err = method.call(CallArgs::new()).unwrap_err();
        assert_eq!(err.to_string(), "add() missing required argument 'a'");

        let err = method.call(CallArgs::new().arg(1).arg(2).arg(3)).unwrap_err();
        assert!(err.to_string().contains("takes 2 positional arguments but 3 were given"));

        let err = method.call(CallArgs::new().arg(1).kwarg("a", 1)).unwrap_err();
        assert!(err.to_string().contains("multiple values"));

        let err = method.call(CallArgs::new().arg(1).kwarg("c", 1)).unwrap_err();
        assert!(err.to_string().contains("unexpected keyword argument 'c'"));
    }

    #[test]
    fn test_signature_to_value() {
        let value = Signature::new().param("a").param_with_default("b", 1).to_value(Some("add"));
        assert_eq!(value.get("name"), Some(&Value::from("add")));
        assert_eq!(value.get("text"), Some(&Value::from("(a, b=1)")));
        let params = value.get("parameters").and_then(Value::as_sequence).unwrap();
        assert_eq!(params[1].get("default"), Some(&Value::Int(1)));
        assert_eq!(params[0].get("kind"), Some(&Value::from("POSITIONAL_OR_KEYWORD")));
    }

    #[test]
    fn test_exposed_object_members() {
        let obj = ExposedObject::new("TestObj")
            .with_doc("A test object")
            .value("constant_value", 5)
            .getter("computed", || Value::from("fresh"))
            .method(add_method());

        assert_eq!(obj.type_name(), "TestObj");
        assert_eq!(obj.doc().as_deref(), Some("A test object"));
        assert_eq!(obj.attr("constant_value"), Some(Value::Int(5)));
        assert_eq!(obj.attr("computed"), Some(Value::from("fresh")));
        assert!(obj.attr("missing").is_none());

        let method = obj.attr("add").unwrap();
        let method = method.as_object().unwrap();
        assert!(method.is_callable());
        assert_eq!(method.attr("__name__"), Some(Value::from("add")));

        // the same method instance is handed out on every access
        assert_eq!(obj.attr("add"), obj.attr("add"));

        let names: Vec<&str> = obj.member_names().collect();
        assert_eq!(names, vec!["add", "computed", "constant_value"]);
    }

    #[test]
    fn test_default_call_is_not_callable() {
        let obj = ExposedObject::new("Plain");
        assert!(!obj.is_callable());
        let err = obj.call(CallArgs::new()).unwrap_err();
        assert_eq!(err.to_string(), "'Plain' object is not callable");
    }
}
