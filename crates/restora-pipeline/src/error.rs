//! Error taxonomy.
//!
//! Nothing here is retried by this crate. Every failure reaches the
//! caller as one of these values, with whatever diagnostic text the
//! remote side supplied.

use std::time::Duration;

use crate::job::{JobId, JobStatus, Target};
use crate::stage::StageName;

/// Failure talking to the inference service.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    /// The service answered with a non-success HTTP status.
    #[error("service returned HTTP {status}: {detail}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body, verbatim.
        detail: String,
    },

    /// The request never got an answer (connect, TLS, timeout).
    #[error("transport error: {0}")]
    Transport(String),

    /// The answer was not a job snapshot.
    #[error("unexpected response: {0}")]
    Decode(String),

    /// The service has no job with this id.
    #[error("unknown job {0}")]
    UnknownJob(JobId),
}

/// Failure of one remote job.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum JobError {
    /// The service refused the job (bad input, auth, quota).
    #[error("submission of {target} rejected: {source}")]
    Submission {
        /// What was being submitted.
        target: Target,
        /// Why it was refused.
        #[source]
        source: ServiceError,
    },

    /// The job did not reach a terminal status in time. It is abandoned,
    /// not canceled, unless the caller cancels it.
    #[error("job {job_id} still {status} after {waited:?}")]
    Timeout {
        /// The abandoned job.
        job_id: JobId,
        /// Last status observed.
        status: JobStatus,
        /// How long we waited.
        waited: Duration,
        /// Log text from the last snapshot, verbatim.
        logs: Option<String>,
    },

    /// The service reported the job failed or was canceled.
    #[error("job {job_id} {status}: {}", .error.as_deref().unwrap_or("no error detail"))]
    JobFailed {
        /// The failed job.
        job_id: JobId,
        /// `Failed` or `Canceled`.
        status: JobStatus,
        /// Error detail from the service, verbatim.
        error: Option<String>,
        /// Log text from the service, verbatim.
        logs: Option<String>,
    },

    /// The job succeeded but its output is not one image reference.
    #[error("job {job_id} output unusable: {reason}")]
    OutputShape {
        /// The job whose output was unusable.
        job_id: JobId,
        /// What was wrong with it.
        reason: String,
        /// Log text from the service, verbatim.
        logs: Option<String>,
    },

    /// A status poll failed.
    #[error("polling job {job_id} failed: {source}")]
    Poll {
        /// The job being polled.
        job_id: JobId,
        /// Why the poll failed.
        #[source]
        source: ServiceError,
    },
}

impl JobError {
    /// The job this error concerns, if one was created.
    #[must_use]
    pub const fn job_id(&self) -> Option<&JobId> {
        match self {
            Self::Submission { .. } => None,
            Self::Timeout { job_id, .. }
            | Self::JobFailed { job_id, .. }
            | Self::OutputShape { job_id, .. }
            | Self::Poll { job_id, .. } => Some(job_id),
        }
    }

    /// Remote log text, when the service provided any.
    #[must_use]
    pub fn logs(&self) -> Option<&str> {
        match self {
            Self::Timeout { logs, .. }
            | Self::JobFailed { logs, .. }
            | Self::OutputShape { logs, .. } => logs.as_deref(),
            Self::Submission { .. } | Self::Poll { .. } => None,
        }
    }
}

/// Failure moving bytes to or from the object host.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    /// Storing bytes failed.
    #[error("upload of {file_name} failed: {detail}")]
    Upload {
        /// Name the bytes were uploaded under.
        file_name: String,
        /// What went wrong.
        detail: String,
    },

    /// Fetching bytes failed.
    #[error("download of {url} failed: {detail}")]
    Download {
        /// Where the bytes were fetched from.
        url: String,
        /// What went wrong.
        detail: String,
    },
}

/// A stage's input could not be built from the outputs so far.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageInputError {
    /// An upstream stage has not produced its output.
    #[error("{stage} needs the output of {needs}, which has not run")]
    MissingOutput {
        /// Stage being built.
        stage: StageName,
        /// Stage whose output is missing.
        needs: StageName,
    },

    /// The defect mask has not been generated.
    #[error("{stage} needs a defect mask, none was supplied")]
    MissingMask {
        /// Stage being built.
        stage: StageName,
    },
}

/// A stage output was recorded twice.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("output of {0} already recorded")]
pub struct DuplicateOutput(pub StageName);
