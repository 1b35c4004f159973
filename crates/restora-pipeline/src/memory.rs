//! In-memory stand-ins for the inference service and the object host.
//!
//! Used for dry runs (exercising the whole request flow without network
//! or credentials) and throughout the test suite. Both record what was
//! asked of them so callers can assert on it afterwards.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::error::{HostError, ServiceError};
use crate::hosting::ObjectHost;
use crate::job::{ImageRef, JobId, JobInput, JobStatus, Prediction, Target};
use crate::service::PredictionService;

/// How a scripted target behaves.
#[derive(Debug, Clone, PartialEq)]
pub enum Script {
    /// Succeed with `output` on the `polls`-th status poll
    /// (immediately on submission when `polls` is 0).
    Succeed {
        /// Raw output to report.
        output: Value,
        /// Polls before the job finishes.
        polls: u32,
    },
    /// Finish with a `Failed` or `Canceled` status.
    Fail {
        /// Terminal status to report.
        status: JobStatus,
        /// Error detail to report.
        error: Option<String>,
        /// Log text to report.
        logs: Option<String>,
        /// Polls before the job finishes.
        polls: u32,
    },
    /// Never finish.
    Pending,
    /// Refuse the submission.
    Reject {
        /// HTTP status to report.
        status: u16,
        /// Response body to report.
        detail: String,
    },
}

impl Script {
    /// Succeed with `output` after `polls` polls.
    #[must_use]
    pub const fn succeed_after(polls: u32, output: Value) -> Self {
        Self::Succeed { output, polls }
    }

    /// Fail with `error` and `logs` after one poll.
    #[must_use]
    pub fn fail(error: impl Into<String>, logs: impl Into<String>) -> Self {
        Self::Fail {
            status: JobStatus::Failed,
            error: Some(error.into()),
            logs: Some(logs.into()),
            polls: 1,
        }
    }
}

/// One accepted submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    /// Identifier handed out.
    pub job_id: JobId,
    /// What was submitted.
    pub target: Target,
    /// With what input.
    pub input: JobInput,
}

#[derive(Debug)]
struct ScriptedJob {
    script: Script,
    polls_left: u32,
    canceled: bool,
}

#[derive(Debug, Default)]
struct ServiceState {
    scripts: HashMap<Target, Script>,
    jobs: HashMap<JobId, ScriptedJob>,
    submissions: Vec<Submission>,
    canceled: Vec<JobId>,
    polls: u64,
}

/// A [`PredictionService`] answering from per-target scripts.
///
/// Targets without a script succeed after one poll with the output
/// `memory://jobs/{id}/output.png`.
#[derive(Debug, Default)]
pub struct ScriptedService {
    state: Mutex<ServiceState>,
}

impl ScriptedService {
    /// A service with no scripts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set how jobs for `target` behave from now on.
    pub fn script(&self, target: Target, script: Script) {
        self.lock().scripts.insert(target, script);
    }

    /// Every accepted submission, in order.
    #[must_use]
    pub fn submissions(&self) -> Vec<Submission> {
        self.lock().submissions.clone()
    }

    /// Jobs a cancel was requested for, in order.
    #[must_use]
    pub fn canceled(&self) -> Vec<JobId> {
        self.lock().canceled.clone()
    }

    /// Total status polls served.
    #[must_use]
    pub fn poll_count(&self) -> u64 {
        self.lock().polls
    }
}

fn snapshot(id: &JobId, job: &ScriptedJob) -> Prediction {
    let mut prediction = Prediction {
        id: id.clone(),
        status: JobStatus::Processing,
        output: None,
        error: None,
        logs: None,
    };
    if job.canceled {
        prediction.status = JobStatus::Canceled;
        return prediction;
    }
    if job.polls_left > 0 {
        return prediction;
    }
    match &job.script {
        Script::Succeed { output, .. } => {
            prediction.status = JobStatus::Succeeded;
            prediction.output = Some(output.clone());
        }
        Script::Fail {
            status,
            error,
            logs,
            ..
        } => {
            prediction.status = *status;
            prediction.error = error.clone().map(Value::String);
            prediction.logs.clone_from(logs);
        }
        Script::Pending | Script::Reject { .. } => {}
    }
    prediction
}

impl PredictionService for ScriptedService {
    async fn create_prediction(
        &self,
        target: &Target,
        input: &JobInput,
    ) -> Result<Prediction, ServiceError> {
        let mut state = self.lock();
        let id = JobId::new(format!("job-{}", state.submissions.len() + 1));
        let script = state.scripts.get(target).cloned().unwrap_or_else(|| {
            Script::succeed_after(1, Value::String(format!("memory://jobs/{id}/output.png")))
        });

        let polls_left = match &script {
            Script::Reject { status, detail } => {
                return Err(ServiceError::Rejected {
                    status: *status,
                    detail: detail.clone(),
                });
            }
            Script::Succeed { polls, .. } | Script::Fail { polls, .. } => *polls,
            Script::Pending => u32::MAX,
        };

        state.submissions.push(Submission {
            job_id: id.clone(),
            target: target.clone(),
            input: input.clone(),
        });
        let job = ScriptedJob {
            script,
            polls_left,
            canceled: false,
        };
        let mut prediction = snapshot(&id, &job);
        if !prediction.status.is_terminal() {
            prediction.status = JobStatus::Starting;
        }
        state.jobs.insert(id, job);
        Ok(prediction)
    }

    async fn get_prediction(&self, id: &JobId) -> Result<Prediction, ServiceError> {
        let mut state = self.lock();
        state.polls += 1;
        let job = state
            .jobs
            .get_mut(id)
            .ok_or_else(|| ServiceError::UnknownJob(id.clone()))?;
        if !matches!(job.script, Script::Pending) {
            job.polls_left = job.polls_left.saturating_sub(1);
        }
        Ok(snapshot(id, job))
    }

    async fn cancel_prediction(&self, id: &JobId) -> Result<Prediction, ServiceError> {
        let mut state = self.lock();
        let job = state
            .jobs
            .get_mut(id)
            .ok_or_else(|| ServiceError::UnknownJob(id.clone()))?;
        job.canceled = true;
        let prediction = snapshot(id, job);
        state.canceled.push(id.clone());
        Ok(prediction)
    }
}

#[derive(Debug, Default)]
struct HostState {
    objects: HashMap<String, Vec<u8>>,
    stored: Vec<ImageRef>,
    fail_uploads: bool,
}

/// An [`ObjectHost`] keeping objects in a map.
///
/// Stored objects get locators `memory://objects/{n}/{file_name}`.
#[derive(Debug, Default)]
pub struct MemoryHost {
    state: Mutex<HostState>,
}

impl MemoryHost {
    /// An empty host.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make an object available at `url`.
    pub fn insert(&self, url: &ImageRef, bytes: Vec<u8>) {
        self.lock().objects.insert(url.as_str().to_owned(), bytes);
    }

    /// The bytes stored at `url`, if any.
    #[must_use]
    pub fn get(&self, url: &ImageRef) -> Option<Vec<u8>> {
        self.lock().objects.get(url.as_str()).cloned()
    }

    /// Locators handed out by [`ObjectHost::store_bytes`], in order.
    #[must_use]
    pub fn stored(&self) -> Vec<ImageRef> {
        self.lock().stored.clone()
    }

    /// Make every subsequent upload fail.
    pub fn fail_uploads(&self) {
        self.lock().fail_uploads = true;
    }
}

impl ObjectHost for MemoryHost {
    async fn store_bytes(&self, bytes: Vec<u8>, file_name: &str) -> Result<ImageRef, HostError> {
        let mut state = self.lock();
        if state.fail_uploads {
            return Err(HostError::Upload {
                file_name: file_name.to_owned(),
                detail: "uploads disabled".to_owned(),
            });
        }
        let url = ImageRef::new(format!(
            "memory://objects/{}/{file_name}",
            state.stored.len() + 1
        ));
        state.objects.insert(url.as_str().to_owned(), bytes);
        state.stored.push(url.clone());
        Ok(url)
    }

    async fn fetch_bytes(&self, url: &ImageRef) -> Result<Vec<u8>, HostError> {
        self.lock()
            .objects
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| HostError::Download {
                url: url.to_string(),
                detail: "no such object".to_owned(),
            })
    }
}
