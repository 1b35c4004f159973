//! Remote job client: submit, wait, read the result.
//!
//! Waiting is a suspension point, not a busy loop: between polls the
//! task sleeps on the tokio timer, so one slow job never holds up other
//! requests sharing the runtime.

use std::time::Duration;

use tokio::time::Instant;

use crate::error::JobError;
use crate::job::{ImageRef, Job, JobInput, JobOutput, JobStatus, Target};
use crate::service::PredictionService;

/// Client for one inference service.
///
/// Holds no per-job state; everything needed to re-poll a job lives in
/// the [`Job`] itself.
#[derive(Debug, Clone)]
pub struct JobClient<S> {
    service: S,
}

impl<S: PredictionService> JobClient<S> {
    /// Wrap a service.
    pub const fn new(service: S) -> Self {
        Self { service }
    }

    /// Create a job.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Submission`] if the service rejects the
    /// request.
    pub async fn submit(&self, target: &Target, input: JobInput) -> Result<Job, JobError> {
        let prediction = self
            .service
            .create_prediction(target, &input)
            .await
            .map_err(|source| JobError::Submission {
                target: target.clone(),
                source,
            })?;
        tracing::debug!(job_id = %prediction.id, %target, status = %prediction.status, "job submitted");
        Ok(Job::submitted(target.clone(), input, prediction))
    }

    /// Poll until the job reaches a terminal status.
    ///
    /// A job that is already terminal is returned without polling.
    ///
    /// # Errors
    ///
    /// Returns [`JobError::Timeout`] if `timeout` elapses first; the job
    /// is left running. Returns [`JobError::Poll`] if a status request
    /// fails.
    pub async fn await_completion(
        &self,
        mut job: Job,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<Job, JobError> {
        let started = Instant::now();
        let deadline = started + timeout;

        while !job.status.is_terminal() {
            let now = Instant::now();
            if now >= deadline {
                tracing::warn!(job_id = %job.id, status = %job.status, "job timed out, abandoning");
                return Err(JobError::Timeout {
                    job_id: job.id,
                    status: job.status,
                    waited: now - started,
                    logs: job.logs,
                });
            }
            tokio::time::sleep(poll_interval.min(deadline - now)).await;

            let prediction = self
                .service
                .get_prediction(&job.id)
                .await
                .map_err(|source| JobError::Poll {
                    job_id: job.id.clone(),
                    source,
                })?;
            if job.observe(prediction) {
                tracing::debug!(job_id = %job.id, status = %job.status, "job status changed");
            }
        }

        Ok(job)
    }

    /// Ask the service to stop a job. Best effort: failures are logged
    /// and otherwise ignored.
    pub async fn cancel(&self, job: &Job) {
        match self.service.cancel_prediction(&job.id).await {
            Ok(prediction) => {
                tracing::info!(job_id = %job.id, status = %prediction.status, "cancel requested");
            }
            Err(e) => tracing::warn!(job_id = %job.id, error = %e, "cancel request failed"),
        }
    }
}

/// The single image reference a finished job produced.
///
/// # Errors
///
/// Returns [`JobError::JobFailed`] if the job did not succeed,
/// carrying the service's error and log text. Returns
/// [`JobError::OutputShape`] if the output is missing, an empty list,
/// or not a string; only element 0 of a list is read. Both errors keep
/// the job's log text.
pub fn extract_output(job: &Job) -> Result<ImageRef, JobError> {
    if job.status != JobStatus::Succeeded {
        return Err(JobError::JobFailed {
            job_id: job.id.clone(),
            status: job.status,
            error: job.error.clone(),
            logs: job.logs.clone(),
        });
    }

    let shape_error = |reason: String| JobError::OutputShape {
        job_id: job.id.clone(),
        reason,
        logs: job.logs.clone(),
    };
    let raw = job
        .output
        .as_ref()
        .ok_or_else(|| shape_error("job succeeded without output".to_owned()))?;
    JobOutput::try_from(raw)
        .map(JobOutput::into_primary)
        .map_err(|e| shape_error(e.0))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ServiceError;
    use crate::job::{JobId, Prediction};
    use crate::memory::{Script, ScriptedService};

    const POLL: Duration = Duration::from_secs(2);

    fn target() -> Target {
        "owner/model:abc".parse().unwrap()
    }

    fn finished(status: JobStatus, output: Option<serde_json::Value>) -> Job {
        Job::submitted(
            target(),
            JobInput::new(),
            Prediction {
                id: JobId::new("j"),
                status,
                output,
                error: Some(json!("boom")),
                logs: Some("step 1\nstep 2\n".into()),
            },
        )
    }

    #[test]
    fn extract_takes_first_of_sequence() {
        let job = finished(JobStatus::Succeeded, Some(json!(["a", "b"])));
        assert_eq!(extract_output(&job).unwrap(), ImageRef::new("a"));
    }

    #[test]
    fn extract_ignores_trailing_metadata() {
        let job = finished(JobStatus::Succeeded, Some(json!(["a", {"seed": 1}])));
        assert_eq!(extract_output(&job).unwrap(), ImageRef::new("a"));
    }

    #[test]
    fn extract_single_value() {
        let job = finished(JobStatus::Succeeded, Some(json!("x")));
        assert_eq!(extract_output(&job).unwrap(), ImageRef::new("x"));
    }

    #[test]
    fn extract_empty_sequence_is_shape_error() {
        let job = finished(JobStatus::Succeeded, Some(json!([])));
        let err = extract_output(&job).unwrap_err();
        assert!(matches!(err, JobError::OutputShape { .. }));
    }

    #[test]
    fn extract_missing_output_is_shape_error() {
        let job = finished(JobStatus::Succeeded, None);
        let err = extract_output(&job).unwrap_err();
        assert!(matches!(err, JobError::OutputShape { .. }));
    }

    #[test]
    fn shape_error_keeps_logs() {
        let job = finished(JobStatus::Succeeded, Some(json!({"url": "x"})));
        let err = extract_output(&job).unwrap_err();
        assert!(matches!(err, JobError::OutputShape { .. }));
        assert_eq!(err.logs(), Some("step 1\nstep 2\n"));
    }

    #[test]
    fn extract_from_failed_job_carries_logs() {
        let job = finished(JobStatus::Failed, None);
        let err = extract_output(&job).unwrap_err();
        match err {
            JobError::JobFailed {
                status,
                error,
                logs,
                ..
            } => {
                assert_eq!(status, JobStatus::Failed);
                assert_eq!(error.as_deref(), Some("boom"));
                assert_eq!(logs.as_deref(), Some("step 1\nstep 2\n"));
            }
            other => panic!("expected JobFailed, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn await_polls_until_terminal() {
        let service = ScriptedService::new();
        service.script(target(), Script::succeed_after(3, json!("out.png")));
        let client = JobClient::new(&service);

        let job = client.submit(&target(), JobInput::new()).await.unwrap();
        assert_eq!(job.status, JobStatus::Starting);

        let started = Instant::now();
        let job = client
            .await_completion(job, POLL, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(service.poll_count(), 3);
        assert_eq!(started.elapsed(), POLL * 3);
        assert_eq!(extract_output(&job).unwrap(), ImageRef::new("out.png"));
    }

    #[tokio::test(start_paused = true)]
    async fn await_times_out_without_canceling() {
        let service = ScriptedService::new();
        service.script(target(), Script::Pending);
        let client = JobClient::new(&service);

        let mut job = client.submit(&target(), JobInput::new()).await.unwrap();
        job.logs = Some("still working\n".into());
        let err = client
            .await_completion(job, POLL, Duration::from_secs(9))
            .await
            .unwrap_err();
        match err {
            JobError::Timeout {
                waited,
                status,
                logs,
                ..
            } => {
                assert_eq!(waited, Duration::from_secs(9));
                assert!(!status.is_terminal());
                assert_eq!(logs.as_deref(), Some("still working\n"));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
        assert!(service.canceled().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_job_is_not_polled() {
        let service = ScriptedService::new();
        let client = JobClient::new(&service);
        let job = finished(JobStatus::Canceled, None);
        let job = client
            .await_completion(job, POLL, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(job.status, JobStatus::Canceled);
        assert_eq!(service.poll_count(), 0);
    }

    #[tokio::test]
    async fn rejected_submission_is_submission_error() {
        let service = ScriptedService::new();
        service.script(
            target(),
            Script::Reject {
                status: 401,
                detail: "invalid token".into(),
            },
        );
        let client = JobClient::new(&service);
        let err = client.submit(&target(), JobInput::new()).await.unwrap_err();
        assert!(matches!(
            err,
            JobError::Submission {
                source: ServiceError::Rejected { status: 401, .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn cancel_is_recorded() {
        let service = ScriptedService::new();
        service.script(target(), Script::Pending);
        let client = JobClient::new(&service);
        let job = client.submit(&target(), JobInput::new()).await.unwrap();
        client.cancel(&job).await;
        assert_eq!(service.canceled(), vec![job.id]);
    }
}
