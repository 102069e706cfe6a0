//! HTTP connection to an objrpc server.

use crate::error::{ClientError, Result};
use crate::proxy::RemoteProxy;
use objrpc::{marshal_to_string, unmarshal_from_str, CallArgs, ClientConfig, ProtocolConfig};
use objrpc::{RemoteRef, Value};
use reqwest::{header, Client, Method};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Address parts of a connection, before an HTTP client is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Address {
    scheme: String,
    host: String,
    port: Option<u16>,
    base_path: String,
}

fn invalid(address: &str, message: impl Into<String>) -> ClientError {
    ClientError::InvalidAddress {
        address: address.to_string(),
        message: message.into(),
    }
}

/// Split `host[:port]`. A suffix that is not all digits stays part of the host.
fn split_host_and_port(netloc: &str) -> (String, Option<u16>) {
    if let Some((host, port)) = netloc.rsplit_once(':') {
        if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(port) = port.parse() {
                return (host.to_string(), Some(port));
            }
        }
    }
    (netloc.to_string(), None)
}

fn parse_address(address: &str) -> Result<Address> {
    if address.contains("//") {
        if let Ok(url) = Url::parse(address) {
            let host = url
                .host_str()
                .ok_or_else(|| invalid(address, "missing host"))?
                .to_string();
            let base_path = match url.path() {
                "" => "/".to_string(),
                path => path.to_string(),
            };
            return Ok(Address {
                scheme: url.scheme().to_string(),
                host,
                port: url.port(),
                base_path,
            });
        }
    }

    let (netloc, path) = address.split_once('/').unwrap_or((address, ""));
    let (host, port) = split_host_and_port(netloc);
    if host.is_empty() {
        return Err(invalid(address, "missing host"));
    }
    Ok(Address {
        scheme: ClientConfig::DEFAULT_SCHEME.to_string(),
        host,
        port,
        base_path: format!("/{}", path),
    })
}

/// Connection to one server.
///
/// Cheap to clone; clones share the underlying HTTP client.
#[derive(Debug, Clone)]
pub struct Connection {
    scheme: String,
    host: String,
    port: u16,
    base_path: String,
    base_url: Url,
    client: Client,
}

impl Connection {
    /// Connect to `address` (`scheme://host:port/path` or `host[:port][/path]`).
    ///
    /// Port precedence: `port`, then the port in `address`, then the default.
    pub fn new(address: &str, port: Option<u16>) -> Result<Self> {
        Self::with_timeout(address, port, ClientConfig::REQUEST_TIMEOUT)
    }

    /// Like [`new`](Self::new) with a per-request timeout.
    pub fn with_timeout(address: &str, port: Option<u16>, timeout: Duration) -> Result<Self> {
        let parsed = parse_address(address)?;
        let port = port.or(parsed.port).unwrap_or(ClientConfig::DEFAULT_PORT);
        let base = format!("{}://{}:{}{}", parsed.scheme, parsed.host, port, parsed.base_path);
        let base_url = Url::parse(&base).map_err(|e| invalid(address, e.to_string()))?;

        let client = Client::builder()
            .timeout(timeout)
            .user_agent(ProtocolConfig::AGENT)
            .build()
            .map_err(|e| ClientError::Transport {
                message: format!("Failed to create HTTP client: {}", e),
                source: Some(e),
            })?;

        Ok(Self {
            scheme: parsed.scheme,
            host: parsed.host,
            port,
            base_path: parsed.base_path,
            base_url,
            client,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`.
    pub fn netloc(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// `scheme://host:port/base_path`.
    pub fn base_url(&self) -> String {
        format!("{}://{}{}", self.scheme, self.netloc(), self.base_path)
    }

    /// Proxy for the server's root object.
    pub fn root(&self) -> RemoteProxy {
        RemoteProxy::new(self.clone(), self.base_path.clone())
    }

    /// Proxy for a reference received inside a larger value.
    pub fn proxy_for(&self, remote: &RemoteRef) -> RemoteProxy {
        RemoteProxy::with_class(self.clone(), self.normalize(&remote.url), remote.class.clone())
    }

    /// Resolve a relative reference url against the base path.
    pub fn normalize(&self, url: &str) -> String {
        if url.starts_with('/') || url.contains("://") {
            url.to_string()
        } else {
            format!("{}{}", self.base_path, url)
        }
    }

    fn url_for(&self, endpoint: &str) -> Result<Url> {
        self.base_url
            .join(endpoint)
            .map_err(|e| invalid(endpoint, e.to_string()))
    }

    async fn fetch(&self, method: Method, endpoint: &str, body: Option<String>) -> Result<Value> {
        let url = self.url_for(endpoint)?;
        match &body {
            Some(body) => debug!("{} {} body: {}", method, url, body),
            None => debug!("{} {}", method, url),
        }

        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request
                .header(header::CONTENT_TYPE, ProtocolConfig::DEFAULT_MEDIA_TYPE)
                .body(body);
        }
        let response = request.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        if status != 200 {
            debug!("Server answered {}: {}", status, text);
            return Err(ClientError::from_status(status, text));
        }
        let resolver = |remote: RemoteRef| -> objrpc::Result<Value> {
            Ok(Value::Ref(RemoteRef {
                url: self.normalize(&remote.url),
                class: remote.class,
            }))
        };
        Ok(unmarshal_from_str(&text, Some(&resolver))?)
    }

    /// `GET endpoint`.
    pub async fn get(&self, endpoint: &str) -> Result<Value> {
        self.fetch(Method::GET, endpoint, None).await
    }

    /// `POST endpoint` with `{args, kwargs}`.
    pub async fn post(&self, endpoint: &str, args: &CallArgs) -> Result<Value> {
        let body = marshal_to_string(&args.to_value(), None)?;
        self.fetch(Method::POST, endpoint, Some(body)).await
    }

    /// `PUT endpoint` with a single value. Servers may not implement it.
    pub async fn put(&self, endpoint: &str, value: &Value) -> Result<Value> {
        let body = marshal_to_string(value, None)?;
        self.fetch(Method::PUT, endpoint, Some(body)).await
    }
}
