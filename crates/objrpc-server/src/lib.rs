//! objrpc HTTP server.
//!
//! Serves one root object: `GET <path>` reads the attribute the path names,
//! `POST <path>` calls it. Responses carry the versioned JSON envelope on
//! success and a plain-text error otherwise.

pub mod demo;
pub mod handler;
pub mod server;

pub use server::{build_router, start_server, AppState};
