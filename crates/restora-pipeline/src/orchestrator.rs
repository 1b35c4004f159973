//! Runs a stage list against the job client, one stage at a time.
//!
//! ```text
//! NotStarted ─> Running(1) ─> Running(2) ─> … ─> Completed
//!                   │             │
//!                   └─────────────┴─> Failed(i)
//! ```
//!
//! Each stage's input is built from the outputs recorded so far, so a
//! stage never starts before everything it reads has finished. The first
//! failure stops the run; nothing is retried or rolled back, and the
//! outputs of the stages that did finish are handed back with the error.

use std::time::Duration;

use serde::Serialize;

use crate::client::{JobClient, extract_output};
use crate::config::PollingConfig;
use crate::error::{DuplicateOutput, JobError, StageInputError};
use crate::job::{ImageRef, JobId};
use crate::service::PredictionService;
use crate::stage::{Stage, StageName, StageSet};
use crate::state::PipelineState;

/// Where a run is in its lifecycle. Stage indices are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    /// Nothing submitted yet.
    NotStarted,
    /// Stage `stage_index` is being built, submitted or awaited.
    Running {
        /// 1-based position of the active stage.
        stage_index: usize,
    },
    /// Every stage recorded an output.
    Completed,
    /// Stage `stage_index` failed; later stages were not attempted.
    Failed {
        /// 1-based position of the failed stage.
        stage_index: usize,
    },
}

/// How jobs are awaited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    /// Pause between status polls.
    pub interval: Duration,
    /// Ceiling on waiting for one job.
    pub timeout: Duration,
    /// Ask the service to stop a job that timed out.
    pub cancel_on_timeout: bool,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollSettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: config.interval(),
            timeout: config.timeout(),
            cancel_on_timeout: config.cancel_on_timeout,
        }
    }
}

/// Which job ran a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageRecord {
    /// The stage.
    pub stage: StageName,
    /// The job that produced its output.
    pub job_id: JobId,
}

/// A finished run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineResult {
    /// Original, mask and every stage output.
    pub state: PipelineState,
    /// The last stage, or `None` if the stage list was empty.
    pub final_stage: Option<StageName>,
    /// The last stage's output, or the original for an empty stage list.
    pub final_output: ImageRef,
    /// Jobs in stage order.
    pub jobs: Vec<StageRecord>,
}

/// Why a stage failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageFailure {
    /// Its input could not be built.
    #[error(transparent)]
    Input(#[from] StageInputError),

    /// Its job could not be submitted, did not finish, failed, or
    /// produced unusable output.
    #[error(transparent)]
    Job(#[from] JobError),

    /// Its output collided with one already recorded.
    #[error(transparent)]
    Record(#[from] DuplicateOutput),
}

/// A run that stopped at a failing stage.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("stage {stage_index} ({stage}) failed: {reason}")]
pub struct PipelineError {
    /// 1-based position of the failed stage.
    pub stage_index: usize,
    /// The failed stage.
    pub stage: StageName,
    /// The stage's job, if one was created.
    pub job_id: Option<JobId>,
    /// What went wrong.
    #[source]
    pub reason: StageFailure,
    /// Outputs of the stages that finished before the failure.
    pub partial: PipelineState,
}

impl PipelineError {
    /// Remote log text of the failed job, when the service provided any.
    #[must_use]
    pub fn logs(&self) -> Option<&str> {
        match &self.reason {
            StageFailure::Job(e) => e.logs(),
            StageFailure::Input(_) | StageFailure::Record(_) => None,
        }
    }
}

/// Runs an ordered stage list.
#[derive(Debug, Clone)]
pub struct Orchestrator<S> {
    client: JobClient<S>,
    stages: Vec<Stage>,
    poll: PollSettings,
}

impl<S: PredictionService> Orchestrator<S> {
    /// Run `stages` with `service`, polling with `poll`.
    pub const fn new(service: S, stages: Vec<Stage>, poll: PollSettings) -> Self {
        Self {
            client: JobClient::new(service),
            stages,
            poll,
        }
    }

    /// Run the stages of `set`.
    pub fn for_set(service: S, set: StageSet, poll: PollSettings) -> Self {
        Self::new(service, set.stages(), poll)
    }

    /// The stages in run order.
    #[must_use]
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Run every stage in order starting from `seed`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] for the first stage that fails.
    pub async fn run(&self, seed: PipelineState) -> Result<PipelineResult, PipelineError> {
        self.run_with(seed, |_| {}).await
    }

    /// [`run`](Self::run), reporting each phase change to `on_phase`.
    ///
    /// `on_phase` sees `NotStarted`, then `Running` once per attempted
    /// stage, then exactly one of `Completed` or `Failed`.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] for the first stage that fails.
    pub async fn run_with(
        &self,
        seed: PipelineState,
        mut on_phase: impl FnMut(RunPhase) + Send,
    ) -> Result<PipelineResult, PipelineError> {
        let mut state = seed;
        let mut jobs = Vec::with_capacity(self.stages.len());
        on_phase(RunPhase::NotStarted);

        for (offset, stage) in self.stages.iter().enumerate() {
            let stage_index = offset + 1;
            on_phase(RunPhase::Running { stage_index });
            tracing::info!(stage_index, stage = %stage.name(), target = %stage.target(), "stage started");

            match self.run_stage(stage, &mut state).await {
                Ok((job_id, output)) => {
                    tracing::info!(stage_index, stage = %stage.name(), %job_id, %output, "stage finished");
                    jobs.push(StageRecord {
                        stage: stage.name(),
                        job_id,
                    });
                }
                Err((job_id, reason)) => {
                    tracing::error!(
                        stage_index,
                        stage = %stage.name(),
                        job_id = job_id.as_ref().map(JobId::as_str),
                        error = %reason,
                        "stage failed, stopping run"
                    );
                    on_phase(RunPhase::Failed { stage_index });
                    return Err(PipelineError {
                        stage_index,
                        stage: stage.name(),
                        job_id,
                        reason,
                        partial: state,
                    });
                }
            }
        }

        let (final_stage, final_output) = match state.last_output() {
            Some((name, image)) => (Some(name), image.clone()),
            None => (None, state.original().clone()),
        };
        on_phase(RunPhase::Completed);
        tracing::info!(stages = jobs.len(), %final_output, "run completed");
        Ok(PipelineResult {
            state,
            final_stage,
            final_output,
            jobs,
        })
    }

    async fn run_stage(
        &self,
        stage: &Stage,
        state: &mut PipelineState,
    ) -> Result<(JobId, ImageRef), (Option<JobId>, StageFailure)> {
        // 1. Build the input from what is recorded so far.
        let input = stage.build_input(state).map_err(|e| (None, e.into()))?;

        // 2. Submit.
        let job = self
            .client
            .submit(stage.target(), input)
            .await
            .map_err(|e| (None, e.into()))?;
        let job_id = job.id.clone();

        // 3. Await a terminal status.
        let job = match self
            .client
            .await_completion(job.clone(), self.poll.interval, self.poll.timeout)
            .await
        {
            Ok(job) => job,
            Err(e) => {
                if self.poll.cancel_on_timeout && matches!(e, JobError::Timeout { .. }) {
                    self.client.cancel(&job).await;
                }
                return Err((Some(job_id), e.into()));
            }
        };

        // 4. Read the output.
        let output = extract_output(&job).map_err(|e| (Some(job_id.clone()), e.into()))?;

        // 5. Record it.
        state
            .record(stage.name(), output.clone())
            .map_err(|e| (Some(job_id.clone()), e.into()))?;
        Ok((job_id, output))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::memory::{Script, ScriptedService};
    use crate::stage::{COLORIZE_TARGET, DEPTH_TARGET, FINAL_ENHANCEMENT_TARGET};

    fn poll() -> PollSettings {
        PollSettings {
            interval: Duration::from_secs(2),
            timeout: Duration::from_secs(60),
            cancel_on_timeout: false,
        }
    }

    fn seed() -> PipelineState {
        PipelineState::new(ImageRef::new("R0")).with_mask(ImageRef::new("M0"))
    }

    fn target(s: &str) -> crate::job::Target {
        s.parse().unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn failure_at_stage_three_stops_the_run() {
        let service = ScriptedService::new();
        service.script(
            target(COLORIZE_TARGET),
            Script::fail("CUDA out of memory", "loading weights\n"),
        );
        let orchestrator = Orchestrator::for_set(&service, StageSet::Full, poll());

        let err = orchestrator.run(seed()).await.unwrap_err();
        assert_eq!(err.stage_index, 3);
        assert_eq!(err.stage, StageName::Colorize);
        assert_eq!(err.job_id, Some(crate::job::JobId::new("job-3")));
        assert_eq!(err.logs(), Some("loading weights\n"));
        assert!(matches!(
            err.reason,
            StageFailure::Job(JobError::JobFailed { .. })
        ));

        // Nothing submitted past the failing stage.
        assert_eq!(service.submissions().len(), 3);
        assert_eq!(err.partial.len(), 2);
        assert!(err.partial.output(StageName::DefectRemoval).is_some());
        assert!(err.partial.output(StageName::Denoise).is_some());
        assert!(err.partial.output(StageName::Colorize).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn fan_out_and_join_read_the_right_outputs() {
        let service = ScriptedService::new();
        let orchestrator = Orchestrator::for_set(&service, StageSet::Full, poll());
        let result = orchestrator.run(seed()).await.unwrap();

        let out = |n: usize| json!(format!("memory://jobs/job-{n}/output.png"));
        let submissions = service.submissions();
        assert_eq!(submissions.len(), 6);
        assert_eq!(submissions[0].input["image"], json!("R0"));
        assert_eq!(submissions[0].input["mask"], json!("M0"));
        assert_eq!(submissions[1].input["image"], out(1));
        assert_eq!(submissions[2].input["input_image"], out(2));
        assert_eq!(submissions[3].target, target(DEPTH_TARGET));
        assert_eq!(submissions[3].input["image"], out(3));
        assert_eq!(submissions[4].input["image"], out(3));
        assert_eq!(submissions[5].target, target(FINAL_ENHANCEMENT_TARGET));
        assert_eq!(submissions[5].input["image"], out(5));
        assert_eq!(
            submissions[5].input["conditioning"],
            json!([{ "type": "depth", "image": out(4) }])
        );

        assert_eq!(result.final_stage, Some(StageName::FinalEnhancement));
        assert_eq!(result.final_output, ImageRef::new("memory://jobs/job-6/output.png"));
        assert_eq!(result.state.len(), 6);
        assert_eq!(result.jobs.len(), 6);
    }

    #[tokio::test]
    async fn empty_stage_list_has_no_final_stage() {
        let service = ScriptedService::new();
        let orchestrator = Orchestrator::new(&service, Vec::new(), poll());
        let result = orchestrator.run(seed()).await.unwrap();
        assert_eq!(result.final_stage, None);
        assert_eq!(result.final_output, ImageRef::new("R0"));
        assert!(result.jobs.is_empty());
        assert!(service.submissions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn phases_are_reported_in_order() {
        let service = ScriptedService::new();
        service.script(target(DEPTH_TARGET), Script::fail("bad", ""));
        let orchestrator = Orchestrator::for_set(&service, StageSet::WithoutDefectRemoval, poll());

        let mut phases = Vec::new();
        let err = orchestrator
            .run_with(PipelineState::new(ImageRef::new("R0")), |phase| {
                phases.push(phase);
            })
            .await
            .unwrap_err();
        assert_eq!(err.stage, StageName::Depth);
        assert_eq!(
            phases,
            vec![
                RunPhase::NotStarted,
                RunPhase::Running { stage_index: 1 },
                RunPhase::Running { stage_index: 2 },
                RunPhase::Running { stage_index: 3 },
                RunPhase::Failed { stage_index: 3 },
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn state_grows_by_one_output_per_stage() {
        let service = ScriptedService::new();
        let orchestrator = Orchestrator::for_set(&service, StageSet::Full, poll());
        let result = orchestrator.run(seed()).await.unwrap();
        let names: Vec<_> = result.state.outputs().iter().map(|(n, _)| *n).collect();
        let expected: Vec<_> = orchestrator.stages().iter().map(Stage::name).collect();
        assert_eq!(names, expected);
        let job_stages: Vec<_> = result.jobs.iter().map(|r| r.stage).collect();
        assert_eq!(job_stages, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_mask_fails_before_submitting() {
        let service = ScriptedService::new();
        let orchestrator = Orchestrator::for_set(&service, StageSet::Full, poll());
        let err = orchestrator
            .run(PipelineState::new(ImageRef::new("R0")))
            .await
            .unwrap_err();
        assert_eq!(err.stage_index, 1);
        assert!(err.job_id.is_none());
        assert!(matches!(err.reason, StageFailure::Input(_)));
        assert!(service.submissions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_cancels_only_when_configured() {
        for cancel_on_timeout in [false, true] {
            let service = ScriptedService::new();
            service.script(target(COLORIZE_TARGET), Script::Pending);
            let settings = PollSettings {
                cancel_on_timeout,
                ..poll()
            };
            let orchestrator = Orchestrator::for_set(&service, StageSet::Full, settings);
            let err = orchestrator.run(seed()).await.unwrap_err();
            assert!(matches!(
                err.reason,
                StageFailure::Job(JobError::Timeout { .. })
            ));
            let expected = if cancel_on_timeout {
                vec![crate::job::JobId::new("job-3")]
            } else {
                Vec::new()
            };
            assert_eq!(service.canceled(), expected);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn submission_rejection_has_no_job_id() {
        let service = ScriptedService::new();
        service.script(
            target(COLORIZE_TARGET),
            Script::Reject {
                status: 422,
                detail: "input_image is required".into(),
            },
        );
        let orchestrator = Orchestrator::for_set(&service, StageSet::Full, poll());
        let err = orchestrator.run(seed()).await.unwrap_err();
        assert_eq!(err.stage_index, 3);
        assert!(err.job_id.is_none());
        assert!(err.to_string().contains("HTTP 422"));
    }
}
