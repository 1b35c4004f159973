//! The seam between the job client and a concrete inference service.
//!
//! Only three calls are needed: create a job, fetch a job's current
//! snapshot, and (best effort) cancel one. [`crate::replicate`] speaks
//! HTTP; [`crate::memory`] answers from a script.

use std::future::Future;

use crate::error::ServiceError;
use crate::job::{JobId, JobInput, Prediction, Target};

/// A remote service running inference jobs.
pub trait PredictionService: Send + Sync {
    /// Create a job running `target` on `input`.
    fn create_prediction(
        &self,
        target: &Target,
        input: &JobInput,
    ) -> impl Future<Output = Result<Prediction, ServiceError>> + Send;

    /// Fetch a job's current snapshot.
    fn get_prediction(
        &self,
        id: &JobId,
    ) -> impl Future<Output = Result<Prediction, ServiceError>> + Send;

    /// Ask the service to stop a job.
    fn cancel_prediction(
        &self,
        id: &JobId,
    ) -> impl Future<Output = Result<Prediction, ServiceError>> + Send;
}

impl<S: PredictionService> PredictionService for &S {
    fn create_prediction(
        &self,
        target: &Target,
        input: &JobInput,
    ) -> impl Future<Output = Result<Prediction, ServiceError>> + Send {
        (**self).create_prediction(target, input)
    }

    fn get_prediction(
        &self,
        id: &JobId,
    ) -> impl Future<Output = Result<Prediction, ServiceError>> + Send {
        (**self).get_prediction(id)
    }

    fn cancel_prediction(
        &self,
        id: &JobId,
    ) -> impl Future<Output = Result<Prediction, ServiceError>> + Send {
        (**self).cancel_prediction(id)
    }
}
