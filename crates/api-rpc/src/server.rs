//! JSON-RPC Server
//!
//! JSON-RPC 2.0 over HTTP, bound to localhost by default.

use crate::handler::{RpcHandler, RpcServices};
use crate::rate_limiter::RateLimiter;
use crate::types::{
    JobRequest, ListFilesRequest, PolicyCheckRequest, ReadFileRequest, RunRequest,
};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use pyrunner_core::domain::{DEFAULT_BLOCKED_MODULES, MAX_SOURCE_BYTES};
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9537;
const DEFAULT_RATE_LIMIT_BURST: u32 = 20;
const DEFAULT_RATE_LIMIT_PER_SEC: u32 = 10;

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    /// 0 picks a free port (see the address returned by `start`)
    pub port: u16,
    pub rate_limit_burst: u32,
    pub rate_limit_per_sec: u32,
    /// Denylist for requests that do not send `blocked_modules`
    pub default_blocked_modules: Vec<String>,
    pub max_source_bytes: usize,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
            rate_limit_burst: DEFAULT_RATE_LIMIT_BURST,
            rate_limit_per_sec: DEFAULT_RATE_LIMIT_PER_SEC,
            default_blocked_modules: DEFAULT_BLOCKED_MODULES
                .iter()
                .map(|m| m.to_string())
                .collect(),
            max_source_bytes: MAX_SOURCE_BYTES,
        }
    }
}

/// Server start-up failures
#[derive(Error, Debug)]
pub enum RpcServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to register method {method}: {reason}")]
    Register { method: &'static str, reason: String },
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(config: RpcServerConfig, services: RpcServices) -> Self {
        let handler = RpcHandler::new(
            services,
            config.default_blocked_modules.clone(),
            config.max_source_bytes,
            RateLimiter::new(config.rate_limit_burst, config.rate_limit_per_sec),
        );
        Self {
            config,
            handler: Arc::new(handler),
        }
    }

    /// Start the JSON-RPC server
    ///
    /// # Returns
    /// The bound address and a handle that stops the server when `stop()` is called
    ///
    /// # Errors
    /// - RpcServerError::Bind if the address is unavailable
    pub async fn start(self) -> Result<(SocketAddr, ServerHandle), RpcServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let bind_error = |source| RpcServerError::Bind {
            addr: addr.clone(),
            source,
        };

        let server = Server::builder().build(&addr).await.map_err(bind_error)?;
        let local_addr = server.local_addr().map_err(bind_error)?;

        let module = self.module()?;
        let handle = server.start(module);

        info!(
            addr = %local_addr,
            rate_limit_burst = self.config.rate_limit_burst,
            rate_limit_per_sec = self.config.rate_limit_per_sec,
            "JSON-RPC server started"
        );

        Ok((local_addr, handle))
    }

    fn module(&self) -> Result<RpcModule<()>, RpcServerError> {
        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method("exec.run.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: RunRequest = params.parse()?;
                    handler.run(req).await
                }
            })
            .map_err(register_error("exec.run.v1"))?;

        let handler = self.handler.clone();
        module
            .register_async_method("exec.submit.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: RunRequest = params.parse()?;
                    handler.submit(req).await
                }
            })
            .map_err(register_error("exec.submit.v1"))?;

        let handler = self.handler.clone();
        module
            .register_async_method("exec.status.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: JobRequest = params.parse()?;
                    handler.status(req).await
                }
            })
            .map_err(register_error("exec.status.v1"))?;

        let handler = self.handler.clone();
        module
            .register_async_method("exec.cancel.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: JobRequest = params.parse()?;
                    handler.cancel(req).await
                }
            })
            .map_err(register_error("exec.cancel.v1"))?;

        let handler = self.handler.clone();
        module
            .register_async_method("files.list.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ListFilesRequest = params.parse()?;
                    handler.list_files(req).await
                }
            })
            .map_err(register_error("files.list.v1"))?;

        let handler = self.handler.clone();
        module
            .register_async_method("files.read.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: ReadFileRequest = params.parse()?;
                    handler.read_file(req).await
                }
            })
            .map_err(register_error("files.read.v1"))?;

        let handler = self.handler.clone();
        module
            .register_async_method("policy.check.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: PolicyCheckRequest = params.parse()?;
                    handler.check_policy(req).await
                }
            })
            .map_err(register_error("policy.check.v1"))?;

        // Parameters, if any, are ignored
        let handler = self.handler.clone();
        module
            .register_async_method("admin.stats.v1", move |_, _, _| {
                let handler = handler.clone();
                async move { handler.stats().await }
            })
            .map_err(register_error("admin.stats.v1"))?;

        Ok(module)
    }
}

fn register_error<E: std::fmt::Display>(method: &'static str) -> impl FnOnce(E) -> RpcServerError {
    move |e| RpcServerError::Register {
        method,
        reason: e.to_string(),
    }
}
