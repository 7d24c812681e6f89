//! PyRunner Client Implementation

use crate::error::{Result, SdkError};
use crate::types::{
    CancelResponse, JobRequest, ListFilesRequest, ListFilesResponse, PolicyCheckRequest,
    PolicyCheckResponse, ReadFileRequest, ReadFileResponse, RunRequest, RunResult,
    StatsResponse, StatusResponse, SubmitResponse,
};
use base64::Engine;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::Serialize;
use std::time::Duration;

/// Longest run (60s) plus headroom for scheduling and the kill
const REQUEST_TIMEOUT: Duration = Duration::from_secs(90);

/// PyRunner daemon client
///
/// # Example
///
/// ```no_run
/// use pyrunner_sdk::{PyRunnerClient, RunRequest};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = PyRunnerClient::connect("http://127.0.0.1:9537").await?;
/// let result = client.run(RunRequest::new("print(6 * 7)")).await?;
/// assert_eq!(result.stdout, "42\n");
/// # Ok(())
/// # }
/// ```
pub struct PyRunnerClient {
    client: HttpClient,
}

/// Send a request struct as named JSON-RPC parameters
fn object_params<T: Serialize>(request: &T) -> Result<ObjectParams> {
    let value = serde_json::to_value(request)?;
    let serde_json::Value::Object(fields) = value else {
        return Err(SdkError::Other("Request must serialize to an object".to_string()));
    };

    let mut params = ObjectParams::new();
    for (name, value) in fields {
        params.insert(&name, value)?;
    }
    Ok(params)
}

impl PyRunnerClient {
    /// Connect to the PyRunner daemon
    ///
    /// # Arguments
    ///
    /// * `url` - RPC endpoint URL (e.g., `http://127.0.0.1:9537`)
    pub async fn connect(url: impl AsRef<str>) -> Result<Self> {
        let url = url.as_ref();

        let client = HttpClientBuilder::default()
            .request_timeout(REQUEST_TIMEOUT)
            .build(url)
            .map_err(|e| SdkError::Connection(format!("Failed to create client: {}", e)))?;

        Ok(Self { client })
    }

    /// Run a script and wait for its result
    ///
    /// A blocked import is not an error: the result's outcome is
    /// `PolicyViolation` and stderr names the module.
    pub async fn run(&self, request: RunRequest) -> Result<RunResult> {
        let response: RunResult = self
            .client
            .request("exec.run.v1", object_params(&request)?)
            .await?;

        Ok(response)
    }

    /// Start a script as a background job
    ///
    /// # Errors
    ///
    /// Rpc with code 4003 when the daemon is throttling new jobs
    pub async fn submit(&self, request: RunRequest) -> Result<SubmitResponse> {
        let response: SubmitResponse = self
            .client
            .request("exec.submit.v1", object_params(&request)?)
            .await?;

        Ok(response)
    }

    /// Poll a background job
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use pyrunner_sdk::{PyRunnerClient, RunRequest};
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// # let client = PyRunnerClient::connect("http://127.0.0.1:9537").await?;
    /// let job = client.submit(RunRequest::new("import time; time.sleep(1)")).await?;
    /// loop {
    ///     let status = client.status(&job.job_id).await?;
    ///     if status.state.is_terminal() {
    ///         break;
    ///     }
    ///     print!("{}", status.stdout);
    ///     tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn status(&self, job_id: impl Into<String>) -> Result<StatusResponse> {
        let request = JobRequest {
            job_id: job_id.into(),
        };
        let response: StatusResponse = self
            .client
            .request("exec.status.v1", object_params(&request)?)
            .await?;

        Ok(response)
    }

    /// Cancel a background job; `cancelled` is false if it had already ended
    pub async fn cancel(&self, job_id: impl Into<String>) -> Result<CancelResponse> {
        let request = JobRequest {
            job_id: job_id.into(),
        };
        let response: CancelResponse = self
            .client
            .request("exec.cancel.v1", object_params(&request)?)
            .await?;

        Ok(response)
    }

    /// Files a run left in its scratch directory
    pub async fn list_files(&self, run_id: impl Into<String>) -> Result<ListFilesResponse> {
        let request = ListFilesRequest {
            run_id: run_id.into(),
        };
        let response: ListFilesResponse = self
            .client
            .request("files.list.v1", object_params(&request)?)
            .await?;

        Ok(response)
    }

    /// Download one scratch file, decoded
    pub async fn read_file(
        &self,
        run_id: impl Into<String>,
        path: impl Into<String>,
    ) -> Result<Vec<u8>> {
        let request = ReadFileRequest {
            run_id: run_id.into(),
            path: path.into(),
        };
        let response: ReadFileResponse = self
            .client
            .request("files.read.v1", object_params(&request)?)
            .await?;

        base64::engine::general_purpose::STANDARD
            .decode(response.content_base64)
            .map_err(|e| SdkError::Other(format!("Invalid file content: {}", e)))
    }

    /// Run only the import pre-check
    pub async fn check_policy(
        &self,
        source_code: impl Into<String>,
        blocked_modules: Option<Vec<String>>,
    ) -> Result<PolicyCheckResponse> {
        let request = PolicyCheckRequest {
            source_code: source_code.into(),
            blocked_modules,
        };
        let response: PolicyCheckResponse = self
            .client
            .request("policy.check.v1", object_params(&request)?)
            .await?;

        Ok(response)
    }

    pub async fn stats(&self) -> Result<StatsResponse> {
        let response: StatsResponse = self.client.request("admin.stats.v1", rpc_params![]).await?;

        Ok(response)
    }
}
