//! Client-side stand-in for a remote object.
//!
//! Every method on [`RemoteProxy`] is one HTTP round trip. Results that come
//! back as references become new proxies; everything else is a plain value.

use crate::connection::Connection;
use crate::error::{ClientError, Result};
use objrpc::{CallArgs, ProtocolConfig, RemoteRef, RpcError, Value};
use std::fmt;

/// Outcome of a proxy operation.
#[derive(Debug, Clone)]
pub enum Reply {
    Value(Value),
    Proxy(RemoteProxy),
}

impl Reply {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Reply::Value(value) => Some(value),
            Reply::Proxy(_) => None,
        }
    }

    pub fn into_proxy(self) -> Option<RemoteProxy> {
        match self {
            Reply::Proxy(proxy) => Some(proxy),
            Reply::Value(_) => None,
        }
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Reply::Value(value) => Some(value),
            Reply::Proxy(_) => None,
        }
    }

    pub fn is_proxy(&self) -> bool {
        matches!(self, Reply::Proxy(_))
    }
}

/// A remote object addressed by an endpoint path on one connection.
#[derive(Clone)]
pub struct RemoteProxy {
    connection: Connection,
    endpoint: String,
    class: String,
}

impl RemoteProxy {
    pub fn new(connection: Connection, endpoint: impl Into<String>) -> Self {
        Self::with_class(connection, endpoint, String::new())
    }

    /// A proxy that remembers the class name the server reported.
    pub fn with_class(
        connection: Connection,
        endpoint: impl Into<String>,
        class: impl Into<String>,
    ) -> Self {
        Self {
            connection,
            endpoint: endpoint.into(),
            class: class.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Class name from the reference this proxy came from, empty if unknown.
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Endpoint of the attribute `name` below this one.
    pub fn attr_endpoint(&self, name: &str) -> String {
        let name = urlencoding::encode(name);
        if self.endpoint.ends_with('/') {
            format!("{}{}", self.endpoint, name)
        } else {
            format!("{}/{}", self.endpoint, name)
        }
    }

    fn reply(&self, value: Value) -> Reply {
        match value {
            Value::Ref(remote) => Reply::Proxy(self.connection.proxy_for(&remote)),
            value => Reply::Value(value),
        }
    }

    /// Read the attribute `name` (`GET endpoint/name`).
    pub async fn get(&self, name: &str) -> Result<Reply> {
        let value = self.connection.get(&self.attr_endpoint(name)).await?;
        Ok(self.reply(value))
    }

    /// Read the object itself (`GET endpoint`).
    pub async fn value(&self) -> Result<Reply> {
        let value = self.connection.get(&self.endpoint).await?;
        Ok(self.reply(value))
    }

    /// Call the object (`POST endpoint`).
    pub async fn call(&self, args: CallArgs) -> Result<Reply> {
        let value = self.connection.post(&self.endpoint, &args).await?;
        Ok(self.reply(value))
    }

    /// Call the attribute `name` (`POST endpoint/name`).
    pub async fn call_method(&self, name: &str, args: CallArgs) -> Result<Reply> {
        let value = self.connection.post(&self.attr_endpoint(name), &args).await?;
        Ok(self.reply(value))
    }

    /// Documentation string, `None` when the object has none.
    pub async fn doc(&self) -> Result<Option<String>> {
        let value = self
            .connection
            .get(&self.attr_endpoint(ProtocolConfig::DOC_SEGMENT))
            .await?;
        match value {
            Value::Null => Ok(None),
            Value::Str(doc) => Ok(Some(doc)),
            other => Err(ClientError::Protocol(RpcError::Decode {
                message: format!("expected a doc string, got {}", other.type_name()),
            })),
        }
    }

    /// Call signature description (`{name, parameters, text}`).
    pub async fn signature(&self) -> Result<Value> {
        self.connection
            .get(&self.attr_endpoint(ProtocolConfig::SIG_SEGMENT))
            .await
    }

    /// Assign the attribute `name` (`PUT endpoint/name`).
    pub async fn set(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        self.connection
            .put(&self.attr_endpoint(name), &value.into())
            .await?;
        Ok(())
    }
}

impl fmt::Debug for RemoteProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteProxy")
            .field("base_url", &self.connection.base_url())
            .field("endpoint", &self.endpoint)
            .field("class", &self.class)
            .finish()
    }
}

/// A proxy passed as an argument travels as a reference to its endpoint.
impl From<&RemoteProxy> for Value {
    fn from(proxy: &RemoteProxy) -> Self {
        Value::Ref(RemoteRef {
            url: proxy.endpoint.clone(),
            class: proxy.class.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Connection {
        Connection::new("localhost", Some(1)).unwrap()
    }

    #[test]
    fn test_attr_endpoint() {
        let root = connection().root();
        assert_eq!(root.endpoint(), "/");
        assert_eq!(root.attr_endpoint("child"), "/child");

        let child = RemoteProxy::new(connection(), "/child");
        assert_eq!(child.attr_endpoint("x"), "/child/x");
        assert_eq!(child.attr_endpoint("a b"), "/child/a%20b");

        let by_ref = RemoteProxy::new(connection(), "/id/ab/");
        assert_eq!(by_ref.attr_endpoint("__doc__"), "/id/ab/__doc__");
    }

    #[test]
    fn test_reply_wraps_references() {
        let root = connection().root();
        let remote = RemoteRef {
            url: "id/ab/".into(),
            class: "Counter".into(),
        };
        match root.reply(Value::Ref(remote)) {
            Reply::Proxy(proxy) => {
                assert_eq!(proxy.endpoint(), "/id/ab/");
                assert_eq!(proxy.class(), "Counter");
            }
            other => panic!("Expected Proxy, got: {:?}", other),
        }
        assert_eq!(root.reply(Value::Int(5)).into_value(), Some(Value::Int(5)));
    }

    #[test]
    fn test_proxy_as_argument() {
        let proxy = RemoteProxy::with_class(connection(), "/id/ab/", "Counter");
        assert_eq!(
            Value::from(&proxy),
            Value::Ref(RemoteRef {
                url: "/id/ab/".into(),
                class: "Counter".into()
            })
        );
    }
}
