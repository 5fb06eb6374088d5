//! The grapheme to phoneme model. This is a CTC-trained sequence model: for a sentence of L
//! char ids it emits a `[1, T, V]` logits tensor, T frames over a phoneme vocabulary of size V,
//! and the symbol sequence is recovered by collapsing the frame-level argmaxes.
//!
//! CTC collapse is worth spelling out because it is easy to get subtly wrong. The blank symbol
//! means "no new phoneme this frame" and repeated argmaxes mean "still the same phoneme", so the
//! rule is: drop blanks, drop a frame that repeats the previous emission, and crucially a blank
//! *resets* the repeat memory - `a a _ a` decodes to `a a`, not `a`. Skipping softmax is fine
//! here since argmax is monotone in the logits.
use crate::phonemes::{CharId, PhonemeId};
use anyhow::{bail, Context};
use ndarray::prelude::*;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use ort::inputs;
use std::path::Path;
use tracing::debug;

/// Handle to the G2P ONNX session.
pub struct Phonemizer {
    session: Session,
    blank_id: PhonemeId,
}

impl Phonemizer {
    /// Loads the phonemizer model. The blank id comes from the phonemizer config, it is a
    /// property of how the model was trained rather than of the file format.
    pub fn load(path: impl AsRef<Path>, blank_id: PhonemeId) -> anyhow::Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level1)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?
            .commit_from_file(path.as_ref())
            .context("converting phonemizer to runnable model")?;
        Ok(Self { session, blank_id })
    }

    /// Runs one sentence of char ids through the model and CTC-decodes the result.
    pub fn phonemize(&mut self, char_ids: &[CharId]) -> anyhow::Result<Vec<PhonemeId>> {
        let input = Array2::from_shape_vec((1, char_ids.len()), char_ids.to_vec())
            .context("invalid dimensions")?;

        let outputs = self
            .session
            .run(inputs!["input_ids" => TensorRef::from_array_view(input.view())?])?;
        if outputs.len() < 1 {
            bail!("phonemizer produced no outputs");
        }
        let logits = outputs[0]
            .try_extract_array::<f32>()
            .context("phonemizer output is not a float tensor")?
            .into_dimensionality::<Ix3>()
            .context("phonemizer logits are not rank 3")?;

        let phoneme_ids = decode_logits(logits.index_axis(Axis(0), 0), self.blank_id);
        debug!(
            "Phonemized {} chars into {} phonemes",
            char_ids.len(),
            phoneme_ids.len()
        );
        Ok(phoneme_ids)
    }
}

/// Collapses `[frames, vocabulary]` logits into a phoneme id sequence: per-frame argmax (ties
/// break towards the lowest index), blanks dropped, consecutive repeats dropped, with a blank
/// resetting the repeat memory.
pub fn decode_logits(logits: ArrayView2<'_, f32>, blank_id: PhonemeId) -> Vec<PhonemeId> {
    let mut phoneme_ids = Vec::new();
    let mut prev_id: Option<PhonemeId> = None;

    for frame in logits.rows() {
        let mut best_logit: Option<f32> = None;
        let mut best_id = 0;
        for (id, logit) in frame.iter().enumerate() {
            if best_logit.map_or(true, |best| *logit > best) {
                best_logit = Some(*logit);
                best_id = id as PhonemeId;
            }
        }

        if best_id == blank_id {
            prev_id = None;
            continue;
        }
        if prev_id == Some(best_id) {
            continue;
        }
        phoneme_ids.push(best_id);
        prev_id = Some(best_id);
    }
    phoneme_ids
}
