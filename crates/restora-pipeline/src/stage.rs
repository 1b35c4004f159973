//! The restoration stages, in order.
//!
//! A stage pairs a remote target with a pure input builder. Builders read
//! the [`PipelineState`] accumulated so far and never perform I/O; order
//! in a [`StageSet`] is the dependency graph.
//!
//! ```text
//! original ─┬─> defect_removal ─> denoise ─> colorize ─┬─> depth ─────────────┐
//!   mask ───┘                                          └─> face_restoration ─┴─> final_enhancement
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::error::StageInputError;
use crate::job::{JobInput, Target};
use crate::state::PipelineState;

/// Inpainting model that removes masked scratches.
pub const DEFECT_REMOVAL_TARGET: &str =
    "allenhooo/lama:cdac78a1bec5b23c07fd29692fb70baa513ea403a39e643c48ec5edadb15fe72";

/// Film-grain and JPEG artifact removal.
pub const DENOISE_TARGET: &str =
    "660d922d33153019e8c263a3bba265de882e7f4f70396546b6c9c8f9d47a021a";

/// Black-and-white colorization.
pub const COLORIZE_TARGET: &str =
    "0da600fab0c45a66211339f1c16b71345d22f26ef5fea3dca1bb90bb5711e950";

/// Monocular depth estimation.
pub const DEPTH_TARGET: &str = "6375723d97400d3ac7b88e3022b738bf6f433ae165c4a2acd1955eaa6b8fcb62";

/// Face restoration.
pub const FACE_RESTORATION_TARGET: &str =
    "cc4956dd26fa5a7185d5660cc9100fab1b8070a1d1654a8bb5eb6d443b020bb2";

/// Depth-conditioned diffusion pass.
pub const FINAL_ENHANCEMENT_TARGET: &str =
    "lucataco/sdxl-controlnet:06d6fae3b75ab68a28cd2900afa6033166910dd09fd9751047043a5bbb4c184b";

/// Prompt for the final enhancement pass.
pub const FINAL_PROMPT: &str = "restored original photo, no changes, sharp and clear";

/// Stage identity; also the key its output is recorded under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Scratch inpainting guided by the defect mask.
    DefectRemoval,
    /// Noise removal.
    Denoise,
    /// Colorization.
    Colorize,
    /// Depth map of the colorized image.
    Depth,
    /// Face restoration on the colorized image.
    FaceRestoration,
    /// Depth-conditioned enhancement of the restored faces.
    FinalEnhancement,
}

impl StageName {
    /// Wire name, as used for result keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DefectRemoval => "defect_removal",
            Self::Denoise => "denoise",
            Self::Colorize => "colorize",
            Self::Depth => "depth",
            Self::FaceRestoration => "face_restoration",
            Self::FinalEnhancement => "final_enhancement",
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builds a stage's job input from the state so far.
pub type InputBuilder = fn(&PipelineState) -> Result<JobInput, StageInputError>;

/// One pipeline step.
#[derive(Debug, Clone)]
pub struct Stage {
    name: StageName,
    target: Target,
    build: InputBuilder,
}

impl Stage {
    /// A stage running `target` with inputs from `build`.
    #[must_use]
    pub const fn new(name: StageName, target: Target, build: InputBuilder) -> Self {
        Self {
            name,
            target,
            build,
        }
    }

    /// The stage's name.
    #[must_use]
    pub const fn name(&self) -> StageName {
        self.name
    }

    /// What the stage runs.
    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.target
    }

    /// The job input for this stage.
    ///
    /// # Errors
    ///
    /// Returns [`StageInputError`] if an output this stage reads has not
    /// been recorded.
    pub fn build_input(&self, state: &PipelineState) -> Result<JobInput, StageInputError> {
        (self.build)(state)
    }
}

/// Which stage list to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageSet {
    /// All six stages, starting with mask-guided defect removal.
    #[default]
    Full,
    /// Five stages; denoise reads the original and no mask is needed.
    WithoutDefectRemoval,
}

impl StageSet {
    /// Whether the first stage needs a defect mask.
    #[must_use]
    pub const fn needs_mask(self) -> bool {
        matches!(self, Self::Full)
    }

    /// The ordered stages.
    #[must_use]
    pub fn stages(self) -> Vec<Stage> {
        let denoise = match self {
            Self::Full => Stage::new(StageName::Denoise, target(DENOISE_TARGET), denoise_cleaned),
            Self::WithoutDefectRemoval => {
                Stage::new(StageName::Denoise, target(DENOISE_TARGET), denoise_original)
            }
        };
        let mut stages = Vec::with_capacity(6);
        if self.needs_mask() {
            stages.push(Stage::new(
                StageName::DefectRemoval,
                target(DEFECT_REMOVAL_TARGET),
                defect_removal,
            ));
        }
        stages.extend([
            denoise,
            Stage::new(StageName::Colorize, target(COLORIZE_TARGET), colorize),
            Stage::new(StageName::Depth, target(DEPTH_TARGET), depth),
            Stage::new(
                StageName::FaceRestoration,
                target(FACE_RESTORATION_TARGET),
                face_restoration,
            ),
            Stage::new(
                StageName::FinalEnhancement,
                target(FINAL_ENHANCEMENT_TARGET),
                final_enhancement,
            ),
        ]);
        stages
    }
}

/// Error parsing a [`StageSet`] name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage set {0:?}, expected \"full\" or \"without_defect_removal\"")]
pub struct UnknownStageSet(String);

impl std::str::FromStr for StageSet {
    type Err = UnknownStageSet;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(Self::Full),
            "without_defect_removal" | "without-defect-removal" => Ok(Self::WithoutDefectRemoval),
            other => Err(UnknownStageSet(other.to_owned())),
        }
    }
}

// The constants above are all well-formed, so parsing cannot fail; an
// unparsable string still yields a usable bare-version target.
fn target(s: &str) -> Target {
    s.parse().unwrap_or_else(|_| Target::Version(s.to_owned()))
}

fn input(pairs: impl IntoIterator<Item = (&'static str, Value)>) -> JobInput {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_owned(), value))
        .collect()
}

fn needs(
    state: &PipelineState,
    stage: StageName,
    upstream: StageName,
) -> Result<Value, StageInputError> {
    state
        .output(upstream)
        .map(Value::from)
        .ok_or(StageInputError::MissingOutput {
            stage,
            needs: upstream,
        })
}

fn defect_removal(state: &PipelineState) -> Result<JobInput, StageInputError> {
    let mask = state.mask().ok_or(StageInputError::MissingMask {
        stage: StageName::DefectRemoval,
    })?;
    Ok(input([
        ("image", Value::from(state.original())),
        ("mask", Value::from(mask)),
    ]))
}

fn denoise_with(image: Value) -> JobInput {
    input([
        ("image", image),
        ("jpeg", json!(40)),
        ("noise", json!(15)),
    ])
}

/// Denoise the defect-removal output.
///
/// # Errors
///
/// Returns [`StageInputError::MissingOutput`] if defect removal has not
/// run.
pub fn denoise_cleaned(state: &PipelineState) -> Result<JobInput, StageInputError> {
    let cleaned = needs(state, StageName::Denoise, StageName::DefectRemoval)?;
    Ok(denoise_with(cleaned))
}

/// Denoise the original image.
///
/// # Errors
///
/// Never fails; the signature matches [`InputBuilder`].
pub fn denoise_original(state: &PipelineState) -> Result<JobInput, StageInputError> {
    Ok(denoise_with(Value::from(state.original())))
}

fn colorize(state: &PipelineState) -> Result<JobInput, StageInputError> {
    Ok(input([
        (
            "input_image",
            needs(state, StageName::Colorize, StageName::Denoise)?,
        ),
        ("model_name", json!("Artistic")),
    ]))
}

fn depth(state: &PipelineState) -> Result<JobInput, StageInputError> {
    Ok(input([(
        "image",
        needs(state, StageName::Depth, StageName::Colorize)?,
    )]))
}

fn face_restoration(state: &PipelineState) -> Result<JobInput, StageInputError> {
    Ok(input([
        (
            "image",
            needs(state, StageName::FaceRestoration, StageName::Colorize)?,
        ),
        ("codeformer_fidelity", json!(0.1)),
    ]))
}

fn final_enhancement(state: &PipelineState) -> Result<JobInput, StageInputError> {
    let faces = needs(state, StageName::FinalEnhancement, StageName::FaceRestoration)?;
    let depth = needs(state, StageName::FinalEnhancement, StageName::Depth)?;
    Ok(input([
        ("image", faces),
        ("conditioning", json!([{ "type": "depth", "image": depth }])),
        ("prompt", json!(FINAL_PROMPT)),
        ("width", json!(768)),
        ("height", json!(768)),
        ("num_inference_steps", json!(25)),
        ("apply_watermark", json!(false)),
    ]))
}
