//! Accumulated outputs of one pipeline run.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::DuplicateOutput;
use crate::job::ImageRef;
use crate::stage::StageName;

/// The original image, its defect mask, and every stage output so far.
///
/// Append-only: an output is recorded once and never replaced. Outputs
/// keep the order they were recorded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineState {
    original: ImageRef,
    mask: Option<ImageRef>,
    outputs: Vec<(StageName, ImageRef)>,
}

impl PipelineState {
    /// A state holding only the original image.
    #[must_use]
    pub const fn new(original: ImageRef) -> Self {
        Self {
            original,
            mask: None,
            outputs: Vec::new(),
        }
    }

    /// Attach the defect mask.
    #[must_use]
    pub fn with_mask(self, mask: ImageRef) -> Self {
        Self {
            mask: Some(mask),
            ..self
        }
    }

    /// The image the run started from.
    #[must_use]
    pub const fn original(&self) -> &ImageRef {
        &self.original
    }

    /// The defect mask, if one was generated.
    #[must_use]
    pub const fn mask(&self) -> Option<&ImageRef> {
        self.mask.as_ref()
    }

    /// The output `stage` produced, if it has run.
    #[must_use]
    pub fn output(&self, stage: StageName) -> Option<&ImageRef> {
        self.outputs
            .iter()
            .find_map(|(name, image)| (*name == stage).then_some(image))
    }

    /// Record `stage`'s output.
    ///
    /// # Errors
    ///
    /// Returns [`DuplicateOutput`] if `stage` already has one; the
    /// existing output is kept.
    pub fn record(&mut self, stage: StageName, image: ImageRef) -> Result<(), DuplicateOutput> {
        if self.output(stage).is_some() {
            return Err(DuplicateOutput(stage));
        }
        self.outputs.push((stage, image));
        Ok(())
    }

    /// Recorded outputs in the order they were produced.
    #[must_use]
    pub fn outputs(&self) -> &[(StageName, ImageRef)] {
        &self.outputs
    }

    /// The most recently recorded output.
    #[must_use]
    pub fn last_output(&self) -> Option<(StageName, &ImageRef)> {
        self.outputs.last().map(|(name, image)| (*name, image))
    }

    /// Number of recorded outputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.outputs.len()
    }

    /// Whether no stage has recorded an output yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outputs.is_empty()
    }
}

/// Serializes as a flat map: `original`, `mask` when present, then each
/// stage output under its stage name.
impl Serialize for PipelineState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(
            1 + usize::from(self.mask.is_some()) + self.outputs.len(),
        ))?;
        map.serialize_entry("original", &self.original)?;
        if let Some(mask) = &self.mask {
            map.serialize_entry("mask", mask)?;
        }
        for (name, image) in &self.outputs {
            map.serialize_entry(name.as_str(), image)?;
        }
        map.end()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn duplicate_record_is_rejected_and_keeps_first() {
        let mut state = PipelineState::new(ImageRef::new("R0"));
        state.record(StageName::Denoise, ImageRef::new("R1")).unwrap();
        let err = state
            .record(StageName::Denoise, ImageRef::new("other"))
            .unwrap_err();
        assert_eq!(err, DuplicateOutput(StageName::Denoise));
        assert_eq!(state.output(StageName::Denoise), Some(&ImageRef::new("R1")));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn outputs_keep_record_order() {
        let mut state = PipelineState::new(ImageRef::new("R0"));
        assert!(state.is_empty());
        state.record(StageName::Colorize, ImageRef::new("c")).unwrap();
        state.record(StageName::Denoise, ImageRef::new("d")).unwrap();
        let names: Vec<_> = state.outputs().iter().map(|(name, _)| *name).collect();
        assert_eq!(names, vec![StageName::Colorize, StageName::Denoise]);
        assert_eq!(state.last_output(), Some((StageName::Denoise, &ImageRef::new("d"))));
    }

    #[test]
    fn serializes_as_named_map() {
        let mut state = PipelineState::new(ImageRef::new("R0")).with_mask(ImageRef::new("M0"));
        state
            .record(StageName::DefectRemoval, ImageRef::new("R1"))
            .unwrap();
        assert_eq!(
            serde_json::to_value(&state).unwrap(),
            json!({ "original": "R0", "mask": "M0", "defect_removal": "R1" })
        );
    }

    #[test]
    fn mask_is_omitted_when_absent() {
        let state = PipelineState::new(ImageRef::new("R0"));
        assert_eq!(serde_json::to_value(&state).unwrap(), json!({ "original": "R0" }));
    }
}
