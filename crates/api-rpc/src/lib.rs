//! JSON-RPC API Layer
//!
//! Exposes the PyRunner executor, background jobs, scratch files and the
//! import pre-check as JSON-RPC 2.0 methods on localhost.

pub mod error;
pub mod handler;
pub mod rate_limiter;
pub mod server;
pub mod types;

pub use handler::{RpcHandler, RpcServices};
pub use server::{RpcServer, RpcServerConfig, RpcServerError};
