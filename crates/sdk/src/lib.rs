//! PyRunner SDK - Rust Client Library
//!
//! Provides a client for the PyRunner daemon's JSON-RPC API.
//!
//! # Example
//!
//! ```no_run
//! use pyrunner_sdk::{PyRunnerClient, RunRequest};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = PyRunnerClient::connect("http://127.0.0.1:9537").await?;
//!
//!     let result = client
//!         .run(RunRequest::new("print('hi')").timeout_seconds(5))
//!         .await?;
//!
//!     println!("{:?}: {}", result.outcome, result.stdout);
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;

pub use client::PyRunnerClient;
pub use error::{codes, Result, SdkError};
pub use types::{
    CancelResponse, JobCounts, JobState, ListFilesResponse, Outcome, PolicyCheckResponse,
    RunRequest, RunResult, ScratchFile, StatsResponse, StatusResponse, SubmitResponse,
    DEFAULT_TIMEOUT_SECS,
};
