//! Path-based endpoint resolution over an exposed object graph.
//!
//! A path is walked segment by segment from the root object, or from a
//! registry entry when it starts with `id/<ref-id>`. `__doc__` and `__sig__`
//! replace the current object with its documentation or call signature.

use crate::config::ProtocolConfig;
use crate::envelope::{decode_envelope, encode_envelope};
use crate::object::{CallArgs, RemoteObject};
use crate::registry::RefRegistry;
use crate::unmarshal::ResolveRef;
use crate::value::{RemoteRef, Value};
use crate::{Result, RpcError};
use serde_json::Value as Json;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Non-empty, percent-decoded segments of a request path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointPath {
    segments: Vec<String>,
}

impl EndpointPath {
    /// Split `path` on `/`, dropping empty segments.
    pub fn parse(path: &str) -> Result<Self> {
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                urlencoding::decode(s)
                    .map(|decoded| decoded.into_owned())
                    .map_err(|e| RpcError::decode(format!("invalid path segment '{}': {}", s, e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segments joined without a leading slash, as used in error messages.
    pub fn endpoint(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for EndpointPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.endpoint())
    }
}

/// Resolves paths against a root object and the reference registry.
///
/// Cheap to clone; all clones share the same registry.
#[derive(Clone)]
pub struct Resolver {
    root: Arc<dyn RemoteObject>,
    refs: Arc<RefRegistry>,
}

impl Resolver {
    pub fn new(root: Arc<dyn RemoteObject>) -> Self {
        Self::with_registry(root, Arc::new(RefRegistry::new()))
    }

    pub fn with_registry(root: Arc<dyn RemoteObject>, refs: Arc<RefRegistry>) -> Self {
        Self { root, refs }
    }

    pub fn root(&self) -> &Arc<dyn RemoteObject> {
        &self.root
    }

    pub fn registry(&self) -> &RefRegistry {
        &self.refs
    }

    /// Walk `path` and return the value it names.
    pub fn resolve(&self, path: &EndpointPath) -> Result<Value> {
        debug!("Resolving '{}'", path);
        let segments = path.segments();

        let (mut current, start) = match segments.first().map(String::as_str) {
            Some(prefix) if prefix == ProtocolConfig::REF_PREFIX => {
                let id = segments.get(1).ok_or_else(|| RpcError::NotFound {
                    endpoint: format!("/{}", ProtocolConfig::REF_PREFIX),
                })?;
                let obj = self.refs.resolve(id).ok_or_else(|| RpcError::NotFound {
                    endpoint: format!("/{}/{}", ProtocolConfig::REF_PREFIX, id),
                })?;
                (Value::Object(obj), 2)
            }
            _ => (Value::Object(self.root.clone()), 0),
        };

        for (index, segment) in segments.iter().enumerate().skip(start) {
            let not_found = || RpcError::NotFound {
                endpoint: segments[..=index].join("/"),
            };
            current = match segment.as_str() {
                ProtocolConfig::DOC_SEGMENT => doc_of(&current),
                ProtocolConfig::SIG_SEGMENT => {
                    let name = index.checked_sub(1).map(|i| segments[i].as_str());
                    signature_of(&current, name).ok_or_else(not_found)?
                }
                name => attr_of(&current, name).ok_or_else(not_found)?,
            };
        }
        Ok(current)
    }

    /// Resolve `path` to an object that can be invoked.
    pub fn callable(&self, path: &EndpointPath) -> Result<Arc<dyn RemoteObject>> {
        match self.resolve(path)? {
            Value::Object(obj) if obj.is_callable() => Ok(obj),
            _ => Err(RpcError::NotCallable {
                endpoint: path.endpoint(),
            }),
        }
    }

    /// Resolve `path` and invoke it with `args`.
    pub fn call(&self, path: &EndpointPath, args: CallArgs) -> Result<Value> {
        let target = self.callable(path)?;
        self.invoke(path, &target, args)
    }

    /// Invoke an already resolved target.
    ///
    /// Errors raised by the callee come back as [`RpcError::CallFailed`]
    /// with the full error chain as text.
    pub fn invoke(
        &self,
        path: &EndpointPath,
        target: &Arc<dyn RemoteObject>,
        args: CallArgs,
    ) -> Result<Value> {
        debug!(
            "Calling '{}' with {} positional and {} keyword arguments",
            path,
            args.args.len(),
            args.kwargs.len()
        );
        target.call(args).map_err(|e| {
            warn!("Call to '{}' failed: {:#}", path, e);
            RpcError::CallFailed {
                endpoint: path.endpoint(),
                trace: format!("{:?}", e),
            }
        })
    }

    /// GET: resolve `path` and wrap the result in an envelope.
    pub fn get(&self, path: &EndpointPath) -> Result<Json> {
        let value = self.resolve(path)?;
        self.encode(&value)
    }

    /// POST: resolve a callable, decode `body` into its arguments, invoke it
    /// and wrap the result in an envelope.
    pub fn post(&self, path: &EndpointPath, body: &[u8]) -> Result<Json> {
        let target = self.callable(path)?;
        let args = self.decode_call(body)?;
        let value = self.invoke(path, &target, args)?;
        self.encode(&value)
    }

    /// Wrap a result in an envelope, registering references as needed.
    pub fn encode(&self, value: &Value) -> Result<Json> {
        encode_envelope(value, Some(self.refs.as_ref()))
    }

    /// Decode a POST body into call arguments.
    ///
    /// References in the body resolve back to the objects they name. Any
    /// decode failure is reported as [`RpcError::InvalidBody`].
    pub fn decode_call(&self, body: &[u8]) -> Result<CallArgs> {
        let decoded = serde_json::from_slice::<Json>(body)
            .map_err(RpcError::from)
            .and_then(|tree| decode_envelope(&tree, Some(self)));
        match decoded {
            Ok(value) => CallArgs::from_body(value),
            Err(RpcError::InvalidBody { message }) => Err(RpcError::InvalidBody { message }),
            Err(e) => Err(RpcError::InvalidBody {
                message: e.to_string(),
            }),
        }
    }
}

impl ResolveRef for Resolver {
    fn resolve_ref(&self, remote: RemoteRef) -> Result<Value> {
        let path = EndpointPath::parse(url_path(&remote.url))?;
        self.resolve(&path).map_err(|e| match e {
            RpcError::NotFound { .. } => RpcError::InvalidBody {
                message: format!("unknown reference '{}'", remote.url),
            },
            other => other,
        })
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("root", &self.root.type_name())
            .field("refs", &self.refs)
            .finish()
    }
}

/// Path part of an absolute or relative url.
fn url_path(url: &str) -> &str {
    match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            rest.find('/').map_or("/", |slash| &rest[slash..])
        }
        None => url,
    }
}

fn attr_of(value: &Value, name: &str) -> Option<Value> {
    value.as_object()?.attr(name)
}

fn doc_of(value: &Value) -> Value {
    Value::from(value.as_object().and_then(|obj| obj.doc()))
}

fn signature_of(value: &Value, name: Option<&str>) -> Option<Value> {
    let obj = value.as_object()?;
    let signature = obj.signature()?;
    let name = match obj.attr("__name__") {
        Some(Value::Str(own)) => Some(own),
        _ => name.map(str::to_string),
    };
    Some(signature.to_value(name.as_deref()))
}
