//! Centralized configuration for objrpc.
//!
//! Protocol constants shared by both halves, plus the defaults the server
//! binary and the client connection start from.

use std::time::Duration;

/// Wire protocol constants.
pub struct ProtocolConfig;

impl ProtocolConfig {
    /// Compiled-in protocol version. Envelopes must match it exactly.
    pub const VERSION: (u32, u32) = (0, 1);
    pub const VERSION_STR: &'static str = "0.1";

    /// Identification string sent as `Server` and `User-Agent`.
    pub const AGENT: &'static str = "objrpc/0.1";

    /// Media types accepted for POST bodies.
    pub const ACCEPTED_MEDIA_TYPES: &'static [&'static str] =
        &["application/json", "application/x-json"];

    /// Media type assumed when a POST carries no `Content-Type`.
    pub const DEFAULT_MEDIA_TYPE: &'static str = "application/json";

    pub const JSON_CONTENT_TYPE: &'static str = "application/json; charset=UTF-8";
    pub const TEXT_CONTENT_TYPE: &'static str = "text/plain; charset=UTF-8";

    /// Reserved leaf segment returning the documentation string.
    pub const DOC_SEGMENT: &'static str = "__doc__";
    /// Reserved leaf segment returning the call signature.
    pub const SIG_SEGMENT: &'static str = "__sig__";
    /// Reserved first segment addressing the reference registry.
    pub const REF_PREFIX: &'static str = "id";
}

/// Server defaults.
pub struct ServerConfig;

impl ServerConfig {
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 8888;
    /// Upper bound on accepted request bodies.
    pub const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;
}

/// Client defaults.
pub struct ClientConfig;

impl ClientConfig {
    pub const DEFAULT_SCHEME: &'static str = "http";
    pub const DEFAULT_PORT: u16 = 8888;
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
}
