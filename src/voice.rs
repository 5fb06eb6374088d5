//! The acoustic voice model, a VITS-style network that maps a framed phoneme id sequence
//! straight to waveform samples - no separate vocoder stage, the raw float samples fall out of
//! the graph's last dimension.
//!
//! The input contract is fixed by the export script of the voice family: `input` is the id
//! sequence, `input_lengths` its length, `scales` is the ordered triple
//! `[noise_scale, length_scale, noise_w_scale]`, and multi-speaker voices additionally take a
//! `sid` tensor. Single-speaker graphs do not have the `sid` input at all, so it must be
//! omitted rather than zeroed.
use crate::phonemes::PhonemeId;
use crate::SynthesisOptions;
use anyhow::{bail, Context};
use ndarray::prelude::*;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;
use ort::inputs;
use std::path::Path;
use tracing::debug;

/// Handle to the voice ONNX session.
pub struct VoiceModel {
    session: Session,
    num_speakers: i64,
}

impl VoiceModel {
    pub fn load(path: impl AsRef<Path>, num_speakers: i64) -> anyhow::Result<Self> {
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level1)
            .map_err(|e| anyhow::anyhow!(e.to_string()))?
            .commit_from_file(path.as_ref())
            .context("converting voice model to runnable model")?;
        Ok(Self {
            session,
            num_speakers,
        })
    }

    /// Synthesises one sentence of framed phoneme ids into raw audio samples.
    pub fn synthesise(
        &mut self,
        phoneme_ids: &[PhonemeId],
        options: &SynthesisOptions,
    ) -> anyhow::Result<Vec<f32>> {
        let input = Array2::from_shape_vec((1, phoneme_ids.len()), phoneme_ids.to_vec())
            .context("invalid dimensions")?;
        let input_lengths = arr1(&[phoneme_ids.len() as i64]);
        let scales = arr1(&[
            options.noise_scale,
            options.length_scale,
            options.noise_w_scale,
        ]);

        let outputs = match speaker_tensor(self.num_speakers, options.speaker_id) {
            Some(sid) => self.session.run(inputs![
                "input" => TensorRef::from_array_view(input.view())?,
                "input_lengths" => TensorRef::from_array_view(input_lengths.view())?,
                "scales" => TensorRef::from_array_view(scales.view())?,
                "sid" => TensorRef::from_array_view(sid.view())?,
            ])?,
            None => self.session.run(inputs![
                "input" => TensorRef::from_array_view(input.view())?,
                "input_lengths" => TensorRef::from_array_view(input_lengths.view())?,
                "scales" => TensorRef::from_array_view(scales.view())?,
            ])?,
        };
        if outputs.len() < 1 {
            bail!("voice model produced no outputs");
        }

        let view = outputs[0]
            .try_extract_array::<f32>()
            .context("voice model output is not a float tensor")?;
        let num_samples = view.shape().last().copied().unwrap_or(0);
        debug!(
            "Synthesised {} samples from {} phoneme ids",
            num_samples,
            phoneme_ids.len()
        );
        Ok(view.iter().copied().take(num_samples).collect())
    }
}

/// The speaker id tensor, present only for multi-speaker voices. Single-speaker graphs reject
/// unknown inputs so the tensor has to be absent, not zero.
fn speaker_tensor(num_speakers: i64, speaker_id: i64) -> Option<Array1<i64>> {
    if num_speakers > 1 {
        Some(arr1(&[speaker_id]))
    } else {
        None
    }
}
