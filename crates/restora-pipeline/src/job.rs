//! Remote job data model.
//!
//! A [`Job`] is one asynchronous unit of inference work: submitted with a
//! [`Target`] and a JSON input object, then polled until its
//! [`JobStatus`] is terminal. The service's raw output is kept as JSON
//! and only interpreted by [`JobOutput::try_from`] when a caller asks
//! for the result.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Named job parameters: scalars, image references or nested objects.
pub type JobInput = serde_json::Map<String, Value>;

/// Opaque locator of an image at rest, normally a retrievable URL.
///
/// References are never edited; each stage produces a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef(String);

impl ImageRef {
    /// Wrap a locator.
    #[must_use]
    pub fn new(locator: impl Into<String>) -> Self {
        Self(locator.into())
    }

    /// The locator as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<ImageRef> for Value {
    fn from(image: ImageRef) -> Self {
        Self::String(image.0)
    }
}

impl From<&ImageRef> for Value {
    fn from(image: &ImageRef) -> Self {
        Self::String(image.0.clone())
    }
}

/// Job identifier assigned by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    /// Wrap an identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a job runs.
///
/// The two addressing modes are told apart by syntax alone: a string
/// containing `/` names a model (`owner/name`, optionally pinned as
/// `owner/name:version`); anything else is a bare version identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// A bare version hash.
    Version(String),
    /// A named model, optionally pinned to a version.
    Model {
        /// Account that owns the model.
        owner: String,
        /// Model name.
        name: String,
        /// Pinned version, or `None` for the model's latest.
        version: Option<String>,
    },
}

impl Target {
    /// The version identifier to submit, if the target pins one.
    #[must_use]
    pub fn version(&self) -> Option<&str> {
        match self {
            Self::Version(v) => Some(v),
            Self::Model { version, .. } => version.as_deref(),
        }
    }
}

/// Error parsing a [`Target`] string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid job target {0:?}")]
pub struct InvalidTarget(String);

impl FromStr for Target {
    type Err = InvalidTarget;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidTarget(s.to_owned());
        if s.trim().is_empty() || s.chars().any(char::is_whitespace) {
            return Err(invalid());
        }

        let Some((owner, rest)) = s.split_once('/') else {
            return Ok(Self::Version(s.to_owned()));
        };
        let (name, version) = match rest.split_once(':') {
            Some((name, version)) => (name, Some(version)),
            None => (rest, None),
        };
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }
        if version.is_some_and(str::is_empty) {
            return Err(invalid());
        }
        Ok(Self::Model {
            owner: owner.to_owned(),
            name: name.to_owned(),
            version: version.map(str::to_owned),
        })
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Version(v) => f.write_str(v),
            Self::Model {
                owner,
                name,
                version: Some(version),
            } => write!(f, "{owner}/{name}:{version}"),
            Self::Model {
                owner,
                name,
                version: None,
            } => write!(f, "{owner}/{name}"),
        }
    }
}

impl Serialize for Target {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Lifecycle status reported by the remote service.
///
/// `Starting` and `Processing` are the non-terminal (pending / running)
/// states; the other three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, not yet running.
    Starting,
    /// Running.
    Processing,
    /// Finished with output.
    Succeeded,
    /// Finished with an error.
    Failed,
    /// Stopped before finishing.
    Canceled,
}

impl JobStatus {
    /// Whether the job can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }

    /// Position in the lifecycle; statuses never move to a lower rank.
    const fn rank(self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::Processing => 1,
            Self::Succeeded | Self::Failed | Self::Canceled => 2,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Starting => "starting",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        })
    }
}

/// A snapshot of a job as returned by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Service-assigned identifier.
    pub id: JobId,
    /// Current status.
    pub status: JobStatus,
    /// Raw output; only meaningful once succeeded.
    #[serde(default)]
    pub output: Option<Value>,
    /// Error detail; a string, or occasionally structured JSON.
    #[serde(default)]
    pub error: Option<Value>,
    /// Log text the model emitted so far.
    #[serde(default)]
    pub logs: Option<String>,
}

/// One remote unit of work and everything known about it.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// Service-assigned identifier.
    pub id: JobId,
    /// What was run.
    pub target: Target,
    /// What it was run with.
    pub input: JobInput,
    /// Latest observed status.
    pub status: JobStatus,
    /// Raw output, present once the service reports one.
    pub output: Option<Value>,
    /// Error detail, present when failed or canceled.
    pub error: Option<String>,
    /// Diagnostic log text.
    pub logs: Option<String>,
}

impl Job {
    /// Build a job from the service's response to a submission.
    #[must_use]
    pub fn submitted(target: Target, input: JobInput, prediction: Prediction) -> Self {
        let mut job = Self {
            id: prediction.id.clone(),
            target,
            input,
            status: JobStatus::Starting,
            output: None,
            error: None,
            logs: None,
        };
        job.observe(prediction);
        job
    }

    /// Fold a fresh snapshot into the job.
    ///
    /// Status only moves forward: a snapshot reporting an earlier
    /// lifecycle stage than already observed keeps the current status,
    /// and nothing changes once the job is terminal. Returns whether the
    /// status changed.
    pub fn observe(&mut self, prediction: Prediction) -> bool {
        if self.status.is_terminal() || prediction.status.rank() < self.status.rank() {
            return false;
        }
        let changed = prediction.status != self.status;
        self.status = prediction.status;
        if prediction.output.is_some() {
            self.output = prediction.output;
        }
        if let Some(error) = prediction.error {
            self.error = error_text(error);
        }
        if prediction.logs.is_some() {
            self.logs = prediction.logs;
        }
        changed
    }
}

fn error_text(error: Value) -> Option<String> {
    match error {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// A job's output, interpreted.
///
/// Services return either one value or a list of values; a list is never
/// passed on as-is. Only its first element is read, whatever follows it
/// (previews, seeds, metadata) is ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutput {
    /// One reference (or scalar rendered as text).
    Single(ImageRef),
    /// A non-empty list.
    Sequence {
        /// Element 0.
        first: ImageRef,
        /// Number of elements in the list.
        len: usize,
    },
}

impl JobOutput {
    /// The one reference this output designates: the value itself for
    /// [`JobOutput::Single`], element 0 for [`JobOutput::Sequence`].
    #[must_use]
    pub const fn primary(&self) -> &ImageRef {
        match self {
            Self::Single(image) | Self::Sequence { first: image, .. } => image,
        }
    }

    /// Take the designated reference.
    #[must_use]
    pub fn into_primary(self) -> ImageRef {
        match self {
            Self::Single(image) | Self::Sequence { first: image, .. } => image,
        }
    }
}

/// Why a raw output could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct UnrecognizedOutput(pub String);

impl TryFrom<&Value> for JobOutput {
    type Error = UnrecognizedOutput;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        match value {
            Value::String(s) => Ok(Self::Single(ImageRef::new(s.clone()))),
            Value::Number(n) => Ok(Self::Single(ImageRef::new(n.to_string()))),
            Value::Bool(b) => Ok(Self::Single(ImageRef::new(b.to_string()))),
            Value::Array(items) => match items.first() {
                None => Err(UnrecognizedOutput("output list is empty".to_owned())),
                Some(Value::String(s)) => Ok(Self::Sequence {
                    first: ImageRef::new(s.clone()),
                    len: items.len(),
                }),
                Some(other) => Err(UnrecognizedOutput(format!(
                    "first list element is {}, expected a string",
                    kind(other)
                ))),
            },
            Value::Null | Value::Object(_) => Err(UnrecognizedOutput(format!(
                "output is {}, expected a string or a list of strings",
                kind(value)
            ))),
        }
    }
}

const fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn prediction(status: JobStatus) -> Prediction {
        Prediction {
            id: JobId::new("p1"),
            status,
            output: None,
            error: None,
            logs: None,
        }
    }

    #[test]
    fn bare_hash_is_version_target() {
        let target: Target = "660d922d33153019e8c263a3bba265de".parse().unwrap();
        assert_eq!(target, Target::Version("660d922d33153019e8c263a3bba265de".into()));
        assert_eq!(target.version(), Some("660d922d33153019e8c263a3bba265de"));
    }

    #[test]
    fn slash_selects_model_target() {
        let pinned: Target = "allenhooo/lama:cdac78a1".parse().unwrap();
        assert_eq!(
            pinned,
            Target::Model {
                owner: "allenhooo".into(),
                name: "lama".into(),
                version: Some("cdac78a1".into()),
            }
        );
        assert_eq!(pinned.to_string(), "allenhooo/lama:cdac78a1");

        let latest: Target = "lucataco/sdxl-controlnet".parse().unwrap();
        assert_eq!(latest.version(), None);
        assert_eq!(latest.to_string(), "lucataco/sdxl-controlnet");
    }

    #[test]
    fn malformed_targets_rejected() {
        for bad in ["", "  ", "/lama", "owner/", "a/b/c", "owner/name:", "has space"] {
            assert!(bad.parse::<Target>().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn status_wire_names() {
        let status: JobStatus = serde_json::from_value(json!("processing")).unwrap();
        assert_eq!(status, JobStatus::Processing);
        assert_eq!(serde_json::to_value(JobStatus::Canceled).unwrap(), json!("canceled"));
        assert!(!JobStatus::Starting.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn prediction_deserializes_with_missing_fields() {
        let p: Prediction = serde_json::from_value(json!({
            "id": "abc",
            "status": "starting",
        }))
        .unwrap();
        assert_eq!(p.id, JobId::new("abc"));
        assert!(p.output.is_none());
    }

    #[test]
    fn terminal_status_never_changes() {
        let mut job = Job::submitted(
            Target::Version("v".into()),
            JobInput::new(),
            prediction(JobStatus::Failed),
        );
        assert!(!job.observe(prediction(JobStatus::Processing)));
        assert!(!job.observe(prediction(JobStatus::Succeeded)));
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn status_does_not_regress() {
        let mut job = Job::submitted(
            Target::Version("v".into()),
            JobInput::new(),
            prediction(JobStatus::Processing),
        );
        assert!(!job.observe(prediction(JobStatus::Starting)));
        assert_eq!(job.status, JobStatus::Processing);
        assert!(job.observe(prediction(JobStatus::Succeeded)));
    }

    #[test]
    fn structured_error_is_rendered_as_json() {
        let mut p = prediction(JobStatus::Failed);
        p.error = Some(json!({"code": 42}));
        let job = Job::submitted(Target::Version("v".into()), JobInput::new(), p);
        assert_eq!(job.error.as_deref(), Some(r#"{"code":42}"#));
    }

    #[test]
    fn sequence_output_takes_first_element() {
        let output = JobOutput::try_from(&json!(["a", "b"])).unwrap();
        assert_eq!(output.primary(), &ImageRef::new("a"));
    }

    #[test]
    fn trailing_list_elements_are_not_inspected() {
        let output = JobOutput::try_from(&json!(["a", {"seed": 1}, null])).unwrap();
        assert_eq!(
            output,
            JobOutput::Sequence {
                first: ImageRef::new("a"),
                len: 3,
            }
        );
    }

    #[test]
    fn single_output_is_itself() {
        let output = JobOutput::try_from(&json!("x")).unwrap();
        assert_eq!(output, JobOutput::Single(ImageRef::new("x")));
        assert_eq!(output.primary(), &ImageRef::new("x"));
    }

    #[test]
    fn scalar_output_is_coerced_to_text() {
        let output = JobOutput::try_from(&json!(0.5)).unwrap();
        assert_eq!(output.into_primary(), ImageRef::new("0.5"));
    }

    #[test]
    fn objects_and_nested_lists_unrecognized() {
        assert!(JobOutput::try_from(&json!({"url": "x"})).is_err());
        assert!(JobOutput::try_from(&json!([["x"]])).is_err());
        assert!(JobOutput::try_from(&json!([])).is_err());
        assert!(JobOutput::try_from(&Value::Null).is_err());
    }
}
