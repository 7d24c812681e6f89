//! Background jobs over the real interpreter: live output, cancel, throttle.

mod common;

use std::time::Duration;

use pyrunner_core::application::{JobManager, JobSnapshot};
use pyrunner_core::domain::{ExecutionOutcome, ExecutionRequest, JobState};
use pyrunner_core::error::AppError;

/// Poll until `done` holds or 10s pass
async fn wait_for(
    jobs: &JobManager,
    job_id: &str,
    done: impl Fn(&JobSnapshot) -> bool,
) -> JobSnapshot {
    for _ in 0..200 {
        let snapshot = jobs.status(job_id).unwrap();
        if done(&snapshot) {
            return snapshot;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("job {} did not reach the expected state", job_id);
}

#[tokio::test]
async fn test_live_output_then_result() {
    let Some(h) = common::harness_or_skip(2).await else {
        return;
    };
    let jobs = h.job_manager();
    let req = ExecutionRequest::builder(
        "import time\nprint('tick', flush=True)\ntime.sleep(1.5)\nprint('tock')\n",
    )
    .build()
    .unwrap();

    let job_id = jobs.submit(req).await.unwrap();

    let running = wait_for(&jobs, &job_id, |s| s.live_stdout.contains("tick")).await;
    assert_eq!(running.job.state, JobState::Running);
    assert!(running.job.result.is_none());

    let done = wait_for(&jobs, &job_id, |s| s.job.state.is_terminal()).await;
    assert_eq!(done.job.state, JobState::Finished);
    let result = done.job.result.unwrap();
    assert_eq!(result.outcome, ExecutionOutcome::Completed);
    assert_eq!(result.stdout, "tick\ntock\n");
    assert_eq!(result.run_id, job_id);
}

#[tokio::test]
async fn test_faulting_job_still_finishes() {
    let Some(h) = common::harness_or_skip(2).await else {
        return;
    };
    let jobs = h.job_manager();
    let req = ExecutionRequest::builder("raise ValueError('bad input')")
        .build()
        .unwrap();

    let job_id = jobs.submit(req).await.unwrap();
    let done = wait_for(&jobs, &job_id, |s| s.job.state.is_terminal()).await;

    assert_eq!(done.job.state, JobState::Finished);
    let result = done.job.result.unwrap();
    assert_eq!(result.outcome, ExecutionOutcome::RuntimeFault);
    assert!(result.stderr.contains("ValueError: bad input"), "{}", result.stderr);
}

#[tokio::test]
async fn test_cancel_kills_the_interpreter() {
    let Some(h) = common::harness_or_skip(2).await else {
        return;
    };
    let jobs = h.job_manager();
    let req = ExecutionRequest::builder(
        "import time\nprint('waiting', flush=True)\ntime.sleep(1)\nopen('late.txt', 'w').write('x')\n",
    )
    .build()
    .unwrap();

    let job_id = jobs.submit(req).await.unwrap();
    wait_for(&jobs, &job_id, |s| s.live_stdout.contains("waiting")).await;

    assert!(jobs.cancel(&job_id).unwrap());
    assert!(!jobs.cancel(&job_id).unwrap());

    tokio::time::sleep(Duration::from_millis(2000)).await;
    let snapshot = jobs.status(&job_id).unwrap();
    assert_eq!(snapshot.job.state, JobState::Cancelled);
    assert!(snapshot.job.result.is_none());
    assert!(!h.scratch.root().join(&job_id).join("late.txt").exists());
    assert_eq!(jobs.counts().cancelled, 1);
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_cancel_kills_processes_the_job_started() {
    let Some(h) = common::harness_or_skip(2).await else {
        return;
    };
    let jobs = h.job_manager();
    let req = ExecutionRequest::builder(
        "import subprocess, time\nchild = subprocess.Popen(['sleep', '30'])\nprint(child.pid, flush=True)\ntime.sleep(30)\n",
    )
    .timeout_secs(30)
    .build()
    .unwrap();

    let job_id = jobs.submit(req).await.unwrap();
    let running = wait_for(&jobs, &job_id, |s| s.live_stdout.ends_with('\n')).await;
    let pid: i32 = running.live_stdout.trim().parse().unwrap();
    assert!(common::process_alive(pid));

    assert!(jobs.cancel(&job_id).unwrap());

    assert!(common::gone_within(pid, Duration::from_secs(5)).await);
}

#[tokio::test]
async fn test_submit_refused_when_cpu_is_busy() {
    let Some(h) = common::harness_or_skip(2).await else {
        return;
    };
    let jobs = h.job_manager();
    h.probe.set_cpu_usage(99.0);

    let result = jobs
        .submit(ExecutionRequest::builder("print(1)").build().unwrap())
        .await;

    assert!(matches!(result, Err(AppError::Throttled(_))));
    assert_eq!(jobs.counts().running, 0);
}

#[tokio::test]
async fn test_unknown_job() {
    let Some(h) = common::harness_or_skip(2).await else {
        return;
    };
    let jobs = h.job_manager();

    assert!(matches!(jobs.status("nope"), Err(AppError::NotFound(_))));
    assert!(matches!(jobs.cancel("nope"), Err(AppError::NotFound(_))));
}
