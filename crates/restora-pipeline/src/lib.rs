//! restora-pipeline: photo restoration as a chain of remote inference jobs.
//!
//! A restoration runs a fixed, ordered list of [`Stage`]s. Each stage
//! builds a job input from the outputs recorded so far, submits it to a
//! [`PredictionService`], waits for the job to finish, and records the
//! job's output image reference in the [`PipelineState`]. The
//! [`Orchestrator`] drives that loop and stops at the first failure,
//! returning whatever finished before it.
//!
//! [`Restorer`] wraps the orchestrator with everything a request needs
//! before the first job: fetching or uploading the original through an
//! [`ObjectHost`] and generating its defect mask with [`restora_mask`].
//!
//! HTTP implementations ([`ReplicateService`], [`ImgbbHost`]) and
//! in-memory ones ([`memory`]) share the same traits; the orchestration
//! code never knows which it is talking to.

pub mod client;
pub mod config;
pub mod error;
pub mod hosting;
pub mod job;
pub mod memory;
pub mod naming;
pub mod orchestrator;
pub mod replicate;
pub mod restore;
pub mod service;
pub mod stage;
pub mod state;

pub use client::{JobClient, extract_output};
pub use config::{ConfigError, RestoraConfig};
pub use error::{DuplicateOutput, HostError, JobError, ServiceError, StageInputError};
pub use hosting::{ImgbbHost, ObjectHost};
pub use job::{ImageRef, Job, JobId, JobInput, JobOutput, JobStatus, Target};
pub use naming::allocate_result_name;
pub use orchestrator::{
    Orchestrator, PipelineError, PipelineResult, PollSettings, RunPhase, StageFailure,
};
pub use replicate::ReplicateService;
pub use restore::{ImageSource, RestoreError, RestoreRequest, RestoreResponse, Restorer};
pub use service::PredictionService;
pub use stage::{Stage, StageName, StageSet};
pub use state::PipelineState;
