// Execution Request Domain Model

use super::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Default upper bound on accepted source size (256 KiB)
pub const MAX_SOURCE_BYTES: usize = 256 * 1024;

/// Wall-clock timeout for one run, always within `MIN..=MAX` seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct TimeoutSecs(u64);

impl TimeoutSecs {
    pub const MIN: u64 = 2;
    pub const MAX: u64 = 60;
    pub const DEFAULT: u64 = 8;

    /// Validate a timeout, rejecting values outside the allowed window
    pub fn new(secs: u64) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&secs) {
            Ok(Self(secs))
        } else {
            Err(DomainError::TimeoutOutOfRange(secs))
        }
    }

    /// Clamp any value into the allowed window (never fails)
    pub fn clamped(secs: u64) -> Self {
        Self(secs.clamp(Self::MIN, Self::MAX))
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }
}

impl Default for TimeoutSecs {
    fn default() -> Self {
        Self(Self::DEFAULT)
    }
}

impl TryFrom<u64> for TimeoutSecs {
    type Error = DomainError;

    fn try_from(value: u64) -> Result<Self> {
        Self::new(value)
    }
}

impl From<TimeoutSecs> for u64 {
    fn from(value: TimeoutSecs) -> Self {
        value.0
    }
}

/// One request to run a piece of Python source.
///
/// Immutable once built: fields are private and only readable through accessors.
/// Use [`ExecutionRequest::builder`] to construct one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    source_code: String,
    timeout: TimeoutSecs,
    allow_async: bool,
    restrict_writes: bool,
    blocked_modules: BTreeSet<String>,
}

impl ExecutionRequest {
    /// Start building a request for `source_code` with default options
    ///
    /// # Example
    /// ```
    /// use pyrunner_core::domain::ExecutionRequest;
    ///
    /// let request = ExecutionRequest::builder("print('hi')")
    ///     .timeout_secs(5)
    ///     .restrict_writes(true)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(request.timeout().as_secs(), 5);
    /// ```
    pub fn builder(source_code: impl Into<String>) -> ExecutionRequestBuilder {
        ExecutionRequestBuilder::new(source_code)
    }

    pub fn source_code(&self) -> &str {
        &self.source_code
    }

    pub fn timeout(&self) -> TimeoutSecs {
        self.timeout
    }

    pub fn allow_async(&self) -> bool {
        self.allow_async
    }

    pub fn restrict_writes(&self) -> bool {
        self.restrict_writes
    }

    pub fn blocked_modules(&self) -> &BTreeSet<String> {
        &self.blocked_modules
    }
}

/// Builder for [`ExecutionRequest`]; validation happens in [`build`](Self::build)
#[derive(Debug, Clone)]
pub struct ExecutionRequestBuilder {
    source_code: String,
    timeout_secs: u64,
    allow_async: bool,
    restrict_writes: bool,
    blocked_modules: BTreeSet<String>,
    max_source_bytes: usize,
}

impl ExecutionRequestBuilder {
    fn new(source_code: impl Into<String>) -> Self {
        Self {
            source_code: source_code.into(),
            timeout_secs: TimeoutSecs::DEFAULT,
            allow_async: false,
            restrict_writes: false,
            blocked_modules: BTreeSet::new(),
            max_source_bytes: MAX_SOURCE_BYTES,
        }
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn allow_async(mut self, enabled: bool) -> Self {
        self.allow_async = enabled;
        self
    }

    pub fn restrict_writes(mut self, enabled: bool) -> Self {
        self.restrict_writes = enabled;
        self
    }

    pub fn blocked_modules<I, S>(mut self, modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocked_modules = modules.into_iter().map(Into::into).collect();
        self
    }

    /// Override the source size limit (the daemon passes its configured value)
    pub fn max_source_bytes(mut self, max: usize) -> Self {
        self.max_source_bytes = max;
        self
    }

    pub fn build(self) -> Result<ExecutionRequest> {
        let timeout = TimeoutSecs::new(self.timeout_secs)?;

        if self.source_code.len() > self.max_source_bytes {
            return Err(DomainError::SourceTooLarge {
                size: self.source_code.len(),
                max: self.max_source_bytes,
            });
        }

        if let Some(bad) = self
            .blocked_modules
            .iter()
            .find(|m| m.is_empty() || m.chars().any(char::is_whitespace))
        {
            return Err(DomainError::InvalidModuleName(bad.clone()));
        }

        Ok(ExecutionRequest {
            source_code: self.source_code,
            timeout,
            allow_async: self.allow_async,
            restrict_writes: self.restrict_writes,
            blocked_modules: self.blocked_modules,
        })
    }
}
