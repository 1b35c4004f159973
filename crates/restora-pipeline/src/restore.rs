//! One restoration request, end to end.
//!
//! 1. Get the original: upload raw bytes, or fetch a pre-hosted URL.
//! 2. Generate the defect mask off the async runtime.
//! 3. Host the mask, and the shrunken original if it was downscaled.
//! 4. Run the stages.
//!
//! Steps 1-3 apply only to stage sets that need a mask; otherwise an
//! uploaded original is hosted as-is and a URL is passed straight on.

use std::collections::BTreeMap;

use restora_mask::{DefectMask, MaskDiagnostics, MaskError};
use serde::Serialize;

use crate::error::HostError;
use crate::hosting::ObjectHost;
use crate::job::{ImageRef, JobId};
use crate::orchestrator::{Orchestrator, PipelineError, PipelineResult, PollSettings, StageRecord};
use crate::service::PredictionService;
use crate::stage::{StageName, StageSet};
use crate::state::PipelineState;

/// File name the mask is hosted under.
const MASK_FILE_NAME: &str = "mask.png";

/// File name a downscaled original is hosted under.
const WORKING_FILE_NAME: &str = "original.png";

/// Where the photograph comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    /// Raw encoded bytes, not yet hosted.
    Upload {
        /// PNG, JPEG, BMP or WebP bytes.
        bytes: Vec<u8>,
        /// Name to host the bytes under.
        file_name: String,
    },
    /// An image already reachable by the inference service.
    Url(ImageRef),
}

/// A restoration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    /// The photograph.
    pub source: ImageSource,
    /// Which stages to run.
    pub stages: StageSet,
}

/// Errors of a restoration request.
#[derive(Debug, thiserror::Error)]
pub enum RestoreError {
    /// The original could not be fetched.
    #[error("fetching the original failed: {0}")]
    Fetch(#[source] HostError),

    /// The defect mask could not be generated.
    #[error("mask generation failed: {0}")]
    Mask(#[from] MaskError),

    /// The mask task panicked or was cancelled.
    #[error("mask generation task failed: {0}")]
    MaskTask(String),

    /// The original or the mask could not be hosted.
    #[error("hosting failed: {0}")]
    Store(#[source] HostError),

    /// A stage failed.
    #[error(transparent)]
    Pipeline(Box<PipelineError>),
}

impl RestoreError {
    /// Short machine-readable failure kind.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(_) | Self::Store(_) => "upstream_io",
            Self::Mask(_) | Self::MaskTask(_) => "mask",
            Self::Pipeline(_) => "stage_failed",
        }
    }
}

impl From<PipelineError> for RestoreError {
    fn from(e: PipelineError) -> Self {
        Self::Pipeline(Box::new(e))
    }
}

/// A completed restoration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutput {
    /// The stage outputs.
    pub result: PipelineResult,
    /// Mask statistics, when a mask was generated.
    pub mask: Option<MaskDiagnostics>,
}

/// Runs restoration requests against one service and one object host.
#[derive(Debug, Clone)]
pub struct Restorer<S, H> {
    service: S,
    host: H,
    poll: PollSettings,
}

impl<S: PredictionService, H: ObjectHost> Restorer<S, H> {
    /// A restorer using `service` for jobs and `host` for images.
    pub const fn new(service: S, host: H, poll: PollSettings) -> Self {
        Self {
            service,
            host,
            poll,
        }
    }

    /// Run one request.
    ///
    /// # Errors
    ///
    /// Returns [`RestoreError`] for the first step that fails.
    pub async fn restore(&self, request: RestoreRequest) -> Result<RestoreOutput, RestoreError> {
        let (seed, mask) = if request.stages.needs_mask() {
            let (seed, diagnostics) = self.prepare_with_mask(request.source).await?;
            (seed, Some(diagnostics))
        } else {
            (PipelineState::new(self.host_original(request.source).await?), None)
        };

        let orchestrator = Orchestrator::for_set(&self.service, request.stages, self.poll);
        let result = orchestrator.run(seed).await?;
        Ok(RestoreOutput { result, mask })
    }

    /// Run one request and shape the outcome as a response.
    pub async fn respond(&self, request: RestoreRequest) -> RestoreResponse {
        RestoreResponse::from(self.restore(request).await)
    }

    async fn host_original(&self, source: ImageSource) -> Result<ImageRef, RestoreError> {
        match source {
            ImageSource::Url(url) => Ok(url),
            ImageSource::Upload { bytes, file_name } => self
                .host
                .store_bytes(bytes, &file_name)
                .await
                .map_err(RestoreError::Store),
        }
    }

    async fn prepare_with_mask(
        &self,
        source: ImageSource,
    ) -> Result<(PipelineState, MaskDiagnostics), RestoreError> {
        // 1. Obtain the original's bytes.
        let (bytes, hosted, file_name) = match source {
            ImageSource::Upload { bytes, file_name } => (bytes, None, file_name),
            ImageSource::Url(url) => {
                let bytes = self.host.fetch_bytes(&url).await.map_err(RestoreError::Fetch)?;
                (bytes, Some(url), WORKING_FILE_NAME.to_owned())
            }
        };

        // 2. Generate the mask on the blocking pool.
        let (bytes, mask) = tokio::task::spawn_blocking(move || {
            let mask = restora_mask::generate(&bytes);
            (bytes, mask)
        })
        .await
        .map_err(|e| RestoreError::MaskTask(e.to_string()))?;
        let mask: DefectMask = mask?;
        let diagnostics = mask.diagnostics;
        tracing::info!(
            mask_pixels = diagnostics.mask_pixels,
            components = diagnostics.components_kept,
            downscaled = mask.downscaled,
            "defect mask generated"
        );
        if mask.is_empty() {
            tracing::warn!("no defects detected, inpainting with an empty mask");
        }

        // 3. Host what the first stage reads. The mask lines up with the
        //    working image, so a downscaled original is re-hosted.
        let original = match (hosted, mask.downscaled) {
            (Some(url), false) => url,
            (_, true) => self.store(mask.working_png()?, WORKING_FILE_NAME).await?,
            (None, false) => self.store(bytes, &file_name).await?,
        };
        let mask_ref = self.store(mask.mask_png()?, MASK_FILE_NAME).await?;

        Ok((PipelineState::new(original).with_mask(mask_ref), diagnostics))
    }

    async fn store(&self, bytes: Vec<u8>, file_name: &str) -> Result<ImageRef, RestoreError> {
        self.host
            .store_bytes(bytes, file_name)
            .await
            .map_err(RestoreError::Store)
    }
}

/// Outcome of a request, shaped for a caller that speaks JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RestoreResponse {
    /// Every stage finished.
    Succeeded(RestoreSuccess),
    /// Something failed.
    Failed(RestoreFailure),
}

impl RestoreResponse {
    /// HTTP-style status code: 200 on success, 500 on failure.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Succeeded(s) => s.status_code,
            Self::Failed(f) => f.status_code,
        }
    }
}

/// Success payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreSuccess {
    /// Always 200.
    pub status_code: u16,
    /// The image the stages started from.
    pub original: ImageRef,
    /// The defect mask, when one was generated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask: Option<ImageRef>,
    /// Every stage's output by stage name.
    pub outputs: BTreeMap<StageName, ImageRef>,
    /// The last stage's output.
    pub final_output: ImageRef,
    /// Which job produced each output.
    pub jobs: Vec<StageRecord>,
    /// Mask statistics, when a mask was generated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mask_diagnostics: Option<MaskDiagnostics>,
}

/// Failure payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreFailure {
    /// Always 500.
    pub status_code: u16,
    /// Short failure kind, see [`RestoreError::kind`].
    pub kind: &'static str,
    /// Human-readable description.
    pub error: String,
    /// The failed stage, for stage failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<StageName>,
    /// Its 1-based position.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage_index: Option<usize>,
    /// Its job, if one was created.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<JobId>,
    /// Remote log text, verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logs: Option<String>,
    /// Outputs of the stages that finished first.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<PipelineState>,
}

impl From<RestoreOutput> for RestoreSuccess {
    fn from(output: RestoreOutput) -> Self {
        let RestoreOutput { result, mask } = output;
        Self {
            status_code: 200,
            original: result.state.original().clone(),
            mask: result.state.mask().cloned(),
            outputs: result.state.outputs().iter().cloned().collect(),
            final_output: result.final_output,
            jobs: result.jobs,
            mask_diagnostics: mask,
        }
    }
}

impl From<&RestoreError> for RestoreFailure {
    fn from(e: &RestoreError) -> Self {
        let mut failure = Self {
            status_code: 500,
            kind: e.kind(),
            error: e.to_string(),
            stage: None,
            stage_index: None,
            job_id: None,
            logs: None,
            partial: None,
        };
        if let RestoreError::Pipeline(p) = e {
            failure.stage = Some(p.stage);
            failure.stage_index = Some(p.stage_index);
            failure.job_id.clone_from(&p.job_id);
            failure.logs = p.logs().map(str::to_owned);
            failure.partial = Some(p.partial.clone());
        }
        failure
    }
}

impl From<Result<RestoreOutput, RestoreError>> for RestoreResponse {
    fn from(outcome: Result<RestoreOutput, RestoreError>) -> Self {
        match outcome {
            Ok(output) => Self::Succeeded(output.into()),
            Err(e) => Self::Failed(RestoreFailure::from(&e)),
        }
    }
}
