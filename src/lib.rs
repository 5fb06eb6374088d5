#![doc = include_str!("../README.md")]
use crate::config::{PhonemizerConfig, VoiceConfig};
use crate::phonemizer::Phonemizer;
use crate::stress::StressModel;
use crate::text_normaliser::Locale;
use crate::voice::VoiceModel;
use anyhow::Context;
use ort::ep::CPU;
use std::collections::{HashMap, VecDeque};
use std::env;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::{Layer, Registry};

pub mod config;
pub mod phonemes;
pub mod phonemizer;
pub mod stress;
pub mod text_normaliser;
pub mod voice;

pub use phonemes::{CharId, PhonemeId, SpeakerId};

/// Per-synthesis knobs. Every field falls back to the voice config's defaults (or the global
/// defaults when the config is silent), obtained via [`Synthesizer::default_options`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SynthesisOptions {
    /// Speaker to use for multi-speaker voices, 0 is the first speaker. Ignored by
    /// single-speaker voices.
    pub speaker_id: SpeakerId,
    /// Speaking rate: 0.5 is twice as fast, 2.0 twice as slow.
    pub length_scale: f32,
    /// Amount of noise added during synthesis.
    pub noise_scale: f32,
    /// How much phoneme durations are allowed to vary.
    pub noise_w_scale: f32,
}

impl SynthesisOptions {
    fn from_voice_config(config: &VoiceConfig) -> Self {
        Self {
            speaker_id: 0,
            length_scale: config.inference.length_scale,
            noise_scale: config.inference.noise_scale,
            noise_w_scale: config.inference.noise_w,
        }
    }
}

/// One sentence worth of synthesised audio plus the symbolic surfaces that produced it, handy
/// for debugging a voice without an audio device.
///
/// All slices borrow the synthesizer's internal buffers: a chunk is valid until the next call
/// on the synthesizer that produced it, which the borrow checker enforces.
#[derive(Debug)]
pub struct AudioChunk<'a> {
    /// Raw samples straight from the voice model.
    pub samples: &'a [f32],
    /// Sample rate in hertz.
    pub sample_rate: u32,
    /// True on the last chunk of the stream.
    pub is_last: bool,
    /// The normalised text of this sentence, as far as the phonemizer vocabulary knows it.
    pub chars: &'a str,
    /// The phoneme string including stress markers.
    pub phonemes: &'a str,
    /// The framed id sequence fed to the voice model.
    pub phoneme_ids: &'a [PhonemeId],
}

/// Builder collecting the model and config paths a [`Synthesizer`] needs. Config paths are
/// optional and default to the model path with `.json` appended.
#[derive(Debug, Default)]
pub struct SynthesizerBuilder {
    locale: Option<String>,
    voice_model: Option<PathBuf>,
    voice_config: Option<PathBuf>,
    phonemizer_model: Option<PathBuf>,
    phonemizer_config: Option<PathBuf>,
    stress_model: Option<PathBuf>,
}

impl SynthesizerBuilder {
    /// Locale tag used for text normalisation, e.g. `en_US`. Defaults to English.
    pub fn locale(mut self, tag: &str) -> Self {
        self.locale = Some(tag.to_string());
        self
    }

    pub fn voice_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.voice_model = Some(path.into());
        self
    }

    pub fn voice_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.voice_config = Some(path.into());
        self
    }

    pub fn phonemizer_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.phonemizer_model = Some(path.into());
        self
    }

    pub fn phonemizer_config(mut self, path: impl Into<PathBuf>) -> Self {
        self.phonemizer_config = Some(path.into());
        self
    }

    pub fn stress_model(mut self, path: impl Into<PathBuf>) -> Self {
        self.stress_model = Some(path.into());
        self
    }

    /// Loads configs and models and builds the synthesizer. Any missing path, missing required
    /// config field or model load failure aborts construction - a synthesizer either holds a
    /// fully loaded model triple or doesn't exist.
    pub fn build(self) -> anyhow::Result<Synthesizer> {
        let voice_model = self
            .voice_model
            .context("no voice model path was given")?;
        let phonemizer_model = self
            .phonemizer_model
            .context("no phonemizer model path was given")?;
        let stress_model = self
            .stress_model
            .context("no stress model path was given")?;

        let voice_config_path = self
            .voice_config
            .unwrap_or_else(|| config::default_config_path(&voice_model));
        let phonemizer_config_path = self
            .phonemizer_config
            .unwrap_or_else(|| config::default_config_path(&phonemizer_model));

        let voice_config = VoiceConfig::load(&voice_config_path)?;
        let phonemizer_config = PhonemizerConfig::load(&phonemizer_config_path)?;

        let locale = match &self.locale {
            Some(tag) => Locale::new(tag),
            None => Locale::default(),
        };

        // The inference runtime keeps one process-wide environment that has to be initialised
        // before any session exists. Calling init repeatedly is fine, so every build does it
        // rather than coordinating a single first caller.
        ort::init()
            .with_name("wren_tts")
            .with_execution_providers(&[CPU::default().build()])
            .commit();

        let phonemizer =
            Phonemizer::load(&phonemizer_model, phonemizer_config.phoneme_blank_id)?;
        let stress = StressModel::load(&stress_model)?;
        let voice = VoiceModel::load(&voice_model, voice_config.num_speakers)?;

        let defaults = SynthesisOptions::from_voice_config(&voice_config);

        Ok(Synthesizer {
            locale,
            sample_rate: voice_config.audio.sample_rate,
            defaults,
            char_map: phonemizer_config.char_map.clone(),
            char_id_map: phonemizer_config.char_id_map.clone(),
            id_char_map: phonemizer_config.id_char_map(),
            id_phoneme_map: phonemizer_config.id_phoneme_map(),
            phoneme_map: phonemizer_config.phoneme_map.clone(),
            apply_phoneme_map: phonemizer_config.apply_phoneme_map,
            stress_char: phonemizer_config.stress_char.clone(),
            voice_phoneme_id_map: voice_config.codepoint_id_map(),
            phonemizer,
            stress,
            voice,
            options: defaults,
            queue: VecDeque::new(),
            chunk_samples: Vec::new(),
            chunk_chars: String::new(),
            chunk_phonemes: String::new(),
            chunk_phoneme_ids: Vec::new(),
        })
    }
}

/// A streaming text-to-speech synthesizer: three ONNX models plus the lookup tables from their
/// configs.
///
/// One synthesizer serialises its own use through `&mut self`; separate instances are
/// independent and may live on different threads (the underlying inference runtime's global
/// environment supports concurrent session use).
pub struct Synthesizer {
    locale: Locale,
    sample_rate: u32,
    defaults: SynthesisOptions,

    // Lookup tables, read-only after construction
    char_map: HashMap<String, String>,
    char_id_map: HashMap<String, CharId>,
    id_char_map: HashMap<CharId, String>,
    id_phoneme_map: HashMap<PhonemeId, String>,
    phoneme_map: HashMap<String, String>,
    apply_phoneme_map: bool,
    stress_char: String,
    voice_phoneme_id_map: HashMap<char, Vec<PhonemeId>>,

    phonemizer: Phonemizer,
    stress: StressModel,
    voice: VoiceModel,

    // Streaming state: options for the current stream, one queued char id vector per pending
    // sentence, and the scratch buffers the most recent chunk borrows from
    options: SynthesisOptions,
    queue: VecDeque<Vec<CharId>>,
    chunk_samples: Vec<f32>,
    chunk_chars: String,
    chunk_phonemes: String,
    chunk_phoneme_ids: Vec<PhonemeId>,
}

impl Synthesizer {
    /// Starts building a synthesizer from model and config paths.
    pub fn create() -> SynthesizerBuilder {
        SynthesizerBuilder::default()
    }

    /// The default synthesis options for this voice: speaker 0 and the scales from the voice
    /// config.
    pub fn default_options(&self) -> SynthesisOptions {
        self.defaults
    }

    /// Sample rate of the audio this voice generates, in hertz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Begins synthesis of `text`, replacing any stream still in progress. The text is
    /// normalised and encoded up front; audio is generated sentence by sentence through
    /// [`Synthesizer::next_chunk`].
    pub fn start(&mut self, text: &str, options: Option<&SynthesisOptions>) {
        self.queue.clear();
        self.clear_scratch();
        self.options = options.copied().unwrap_or(self.defaults);

        let start = Instant::now();
        let sentences = text_normaliser::normalise(text, &self.locale);
        self.queue
            .extend(phonemes::encode_sentences(&sentences, &self.char_map, &self.char_id_map));
        debug!(
            "Queued {} sentences in {:?}",
            self.queue.len(),
            start.elapsed()
        );
    }

    /// Synthesises the next queued sentence. Returns `Ok(None)` once the stream is exhausted;
    /// the last real chunk carries `is_last = true`.
    ///
    /// An inference error aborts the current sentence but the synthesizer stays usable - the
    /// next call picks up at the following queued sentence.
    pub fn next_chunk(&mut self) -> anyhow::Result<Option<AudioChunk<'_>>> {
        self.clear_scratch();

        let Some(char_ids) = self.queue.pop_front() else {
            return Ok(None);
        };

        for char_id in &char_ids {
            if let Some(grapheme) = self.id_char_map.get(char_id) {
                self.chunk_chars.push_str(grapheme);
            }
        }

        let start = Instant::now();
        let phoneme_ids = self.phonemizer.phonemize(&char_ids)?;
        let g2p_done = Instant::now();

        let probabilities = self.stress.predict(&phoneme_ids)?;
        let mut phoneme_strs = if probabilities.len() == phoneme_ids.len() {
            phonemes::insert_stress(
                &phoneme_ids,
                &probabilities,
                &self.stress_char,
                &self.id_phoneme_map,
            )
        } else {
            warn!(
                "Stress output length {} disagrees with phoneme count {}, skipping stress markers",
                probabilities.len(),
                phoneme_ids.len()
            );
            phonemes::phoneme_strings(&phoneme_ids, &self.id_phoneme_map)
        };
        let stress_done = Instant::now();

        if self.apply_phoneme_map {
            for phoneme in &mut phoneme_strs {
                if let Some(mapped) = self.phoneme_map.get(phoneme) {
                    *phoneme = mapped.clone();
                }
            }
        }
        for phoneme in &phoneme_strs {
            self.chunk_phonemes.push_str(phoneme);
        }

        self.chunk_phoneme_ids =
            phonemes::encode_voice_phonemes(&phoneme_strs, &self.voice_phoneme_id_map);
        self.chunk_samples = self.voice.synthesise(&self.chunk_phoneme_ids, &self.options)?;
        let end = Instant::now();

        info!("G2P time: {:?}", g2p_done - start);
        info!("Stress time: {:?}", stress_done - g2p_done);
        info!("Voice time: {:?}", end - stress_done);

        Ok(Some(AudioChunk {
            samples: &self.chunk_samples,
            sample_rate: self.sample_rate,
            is_last: self.queue.is_empty(),
            chars: &self.chunk_chars,
            phonemes: &self.chunk_phonemes,
            phoneme_ids: &self.chunk_phoneme_ids,
        }))
    }

    fn clear_scratch(&mut self) {
        self.chunk_samples.clear();
        self.chunk_chars.clear();
        self.chunk_phonemes.clear();
        self.chunk_phoneme_ids.clear();
    }
}

/// Convenience function to set up logging for the binaries. Defaults the binaries and the
/// library crate to `info` logging unless `RUST_LOG` says otherwise.
pub fn setup_logging() {
    let filter = match env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_env("RUST_LOG"),
        _ => EnvFilter::new("wren_tts=info,app=info"),
    };

    let fmt = tracing_subscriber::fmt::Layer::default();

    let subscriber = filter.and_then(fmt).with_subscriber(Registry::default());

    tracing::subscriber::set_global_default(subscriber).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_track_voice_config() {
        let json = r#"{
            "audio": { "sample_rate": 22050 },
            "num_speakers": 1,
            "phoneme_id_map": {},
            "inference": { "noise_scale": 0.5, "length_scale": 1.1, "noise_w": 0.7 }
        }"#;
        let config: VoiceConfig = serde_json::from_str(json).unwrap();

        let options = SynthesisOptions::from_voice_config(&config);
        assert_eq!(options.speaker_id, 0);
        assert_eq!(options.noise_scale, 0.5);
        assert_eq!(options.length_scale, 1.1);
        assert_eq!(options.noise_w_scale, 0.7);

        // Idempotent: building the options twice gives equal structs
        assert_eq!(options, SynthesisOptions::from_voice_config(&config));
    }

    #[test]
    fn default_options_fall_back_to_global_defaults() {
        let json = r#"{
            "audio": { "sample_rate": 22050 },
            "num_speakers": 1,
            "phoneme_id_map": {}
        }"#;
        let config: VoiceConfig = serde_json::from_str(json).unwrap();

        let options = SynthesisOptions::from_voice_config(&config);
        assert_eq!(options.noise_scale, config::DEFAULT_NOISE_SCALE);
        assert_eq!(options.length_scale, config::DEFAULT_LENGTH_SCALE);
        assert_eq!(options.noise_w_scale, config::DEFAULT_NOISE_W_SCALE);
    }
}
