//! objrpc client.
//!
//! # Example
//!
//! ```rust,ignore
//! use objrpc::CallArgs;
//! use objrpc_client::Connection;
//!
//! let conn = Connection::new("localhost:8888", None)?;
//! let root = conn.root();
//! let sum = root.call_method("add", CallArgs::new().arg(1).arg(2)).await?;
//! let child = root.get("child").await?.into_proxy().unwrap();
//! println!("{:?}", child.get("value").await?);
//! ```

pub mod connection;
pub mod error;
pub mod proxy;

pub use connection::Connection;
pub use error::{ClientError, Result};
pub use proxy::{RemoteProxy, Reply};
