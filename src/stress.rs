//! The stress prediction model. Given the phonemizer's output sequence it scores each phoneme
//! with the probability of carrying primary lexical stress; the model applies its own sigmoid so
//! the output is already in `[0, 1]`.
//!
//! The stage is deliberately thin - the actual marker insertion lives in
//! [`crate::phonemes::insert_stress`] as a pure function. All this wrapper does is run the
//! session and flatten the last axis of whatever tensor comes back. The caller compares the
//! probability count against its phoneme count; a mismatch means the model and phonemizer
//! disagree about the sequence and stress marking is skipped for that sentence rather than
//! guessed at.
use crate::phonemes::PhonemeId;
use anyhow::{bail, Context};
use ndarray::prelude::*;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use ort::inputs;
use std::path::Path;

/// Handle to the stress ONNX session.
pub struct StressModel {
    session: Session,
}

impl StressModel {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level1)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?
            .commit_from_file(path.as_ref())
            .context("converting stress model to runnable model")?;
        Ok(Self { session })
    }

    /// Scores a phoneme id sequence, returning the last axis of the output tensor as per-phoneme
    /// probabilities.
    pub fn predict(&mut self, phoneme_ids: &[PhonemeId]) -> anyhow::Result<Vec<f32>> {
        let input = Array2::from_shape_vec((1, phoneme_ids.len()), phoneme_ids.to_vec())
            .context("invalid dimensions")?;

        let outputs = self
            .session
            .run(inputs!["phoneme_ids" => TensorRef::from_array_view(input.view())?])?;
        if outputs.len() < 1 {
            bail!("stress model produced no outputs");
        }
        let view = outputs[0]
            .try_extract_array::<f32>()
            .context("stress model output is not a float tensor")?;
        let num_probabilities = view.shape().last().copied().unwrap_or(0);
        Ok(view.iter().copied().take(num_probabilities).collect())
    }
}
