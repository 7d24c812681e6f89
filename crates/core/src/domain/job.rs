// Background Job Domain Model

use super::error::{DomainError, Result};
use super::result::ExecutionResult;
use serde::{Deserialize, Serialize};

/// Job ID (UUID v4); the job's run uses the same ID for its scratch directory
pub type JobId = String;

/// Background job state. Only `Running` has outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Running,
    Finished,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobState::Running)
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Running => write!(f, "RUNNING"),
            JobState::Finished => write!(f, "FINISHED"),
            JobState::Failed => write!(f, "FAILED"),
            JobState::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A run submitted in background mode
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackgroundJob {
    pub id: JobId,
    pub state: JobState,
    pub created_at: i64, // epoch ms
    pub finished_at: Option<i64>,
    /// Set when the run produced a result (any outcome, including faults)
    pub result: Option<ExecutionResult>,
    /// Set when the run could not produce a result (spawn failure, panic)
    pub error: Option<String>,
}

impl BackgroundJob {
    /// Create a running job
    ///
    /// # Arguments
    ///
    /// * `id` - Job ID (injected, not generated)
    /// * `created_at` - Creation timestamp in epoch ms (injected, not system time)
    pub fn new(id: impl Into<String>, created_at: i64) -> Self {
        Self {
            id: id.into(),
            state: JobState::Running,
            created_at,
            finished_at: None,
            result: None,
            error: None,
        }
    }

    /// Transition to Finished with the run's result
    pub fn finish(&mut self, result: ExecutionResult, now_millis: i64) -> Result<()> {
        self.transition(JobState::Finished, now_millis)?;
        self.result = Some(result);
        Ok(())
    }

    /// Transition to Failed with an infrastructure error message
    pub fn fail(&mut self, error: impl Into<String>, now_millis: i64) -> Result<()> {
        self.transition(JobState::Failed, now_millis)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// Transition to Cancelled
    pub fn cancel(&mut self, now_millis: i64) -> Result<()> {
        self.transition(JobState::Cancelled, now_millis)
    }

    fn transition(&mut self, to: JobState, now_millis: i64) -> Result<()> {
        if self.state.is_terminal() {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        self.state = to;
        self.finished_at = Some(now_millis);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_running() {
        let job = BackgroundJob::new("job-1", 1000);
        assert_eq!(job.state, JobState::Running);
        assert!(job.finished_at.is_none());
    }

    #[test]
    fn test_finish_records_result() {
        let mut job = BackgroundJob::new("job-1", 1000);
        let result = ExecutionResult::policy_violation("job-1", "blocked");
        job.finish(result.clone(), 2000).unwrap();
        assert_eq!(job.state, JobState::Finished);
        assert_eq!(job.finished_at, Some(2000));
        assert_eq!(job.result, Some(result));
    }

    #[test]
    fn test_terminal_state_rejects_transition() {
        let mut job = BackgroundJob::new("job-1", 1000);
        job.cancel(1500).unwrap();

        let err = job.fail("late failure", 2000).unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidStateTransition {
                from: "CANCELLED".to_string(),
                to: "FAILED".to_string(),
            }
        );
        assert_eq!(job.finished_at, Some(1500));
        assert!(job.error.is_none());
    }

    #[test]
    fn test_cancel_twice_fails() {
        let mut job = BackgroundJob::new("job-1", 1000);
        assert!(job.cancel(1100).is_ok());
        assert!(job.cancel(1200).is_err());
    }
}
