//! objrpc - Object RPC over HTTP with a versioned JSON envelope.
//!
//! This crate holds the transport-free half of the protocol: the value model,
//! the marshal/unmarshal engines, the version envelope, the reference
//! registry and the endpoint resolver. The HTTP server lives in
//! `objrpc-server` and the client proxy in `objrpc-client`.
//!
//! # Example
//!
//! ```rust,ignore
//! use objrpc::{dict, marshal_to_string, unmarshal_from_str};
//!
//! let value = dict! { "a" => 5, "b" => vec![1, 2] };
//! let text = marshal_to_string(&value, None)?;
//! // {"v":"0.1","data":{"type":"dict","data":{"a":5,"b":[1,2]}}}
//! assert_eq!(unmarshal_from_str(&text, None)?, value);
//! ```

pub mod config;
pub mod endpoint;
pub mod envelope;
pub mod error;
pub mod marshal;
pub mod object;
pub mod registry;
pub mod tensor;
pub mod unmarshal;
pub mod value;

// Re-export commonly used types
pub use config::{ClientConfig, ProtocolConfig, ServerConfig};
pub use endpoint::{EndpointPath, Resolver};
pub use envelope::{
    decode_envelope, decode_version, encode_envelope, encode_version, marshal_to_string,
    unmarshal_from_str,
};
pub use error::{Result, RpcError};
pub use marshal::{marshal_value, TypeTag};
pub use object::{CallArgs, ExposedObject, Method, Param, ParamKind, RemoteObject, Signature};
pub use registry::{MakeRef, RefRegistry};
pub use tensor::{DType, Element, NdArray};
pub use unmarshal::{unmarshal_value, KeepRefs, ResolveRef};
pub use value::{Complex, RemoteRef, Value, ValueSet};
