//! Voice and phonemizer configuration. Every model file ships with a JSON sidecar describing its
//! vocabulary; the conventional location is the model path with `.json` appended, though callers
//! can point elsewhere. Parsing is strict about the required tables - a model without its
//! vocabulary is unusable so we fail construction rather than limping on with an empty map.
//!
//! Lookup tables are built once here and never rebuilt; they are read-only for the life of a
//! synthesizer.
use crate::phonemes::{CharId, PhonemeId};
use anyhow::{bail, Context};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs::File;
use std::hash::Hash;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub const DEFAULT_NOISE_SCALE: f32 = 0.667;
pub const DEFAULT_LENGTH_SCALE: f32 = 1.0;
pub const DEFAULT_NOISE_W_SCALE: f32 = 0.8;

/// Audio parameters of the voice model.
#[derive(Clone, Debug, Deserialize)]
pub struct AudioConfig {
    /// Sample rate of generated audio in hertz
    pub sample_rate: u32,
}

/// Default inference scales baked into the voice at export time. Any field may be omitted in the
/// config, in which case the global default applies.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_noise_scale")]
    pub noise_scale: f32,
    #[serde(default = "default_length_scale")]
    pub length_scale: f32,
    #[serde(default = "default_noise_w")]
    pub noise_w: f32,
}

fn default_noise_scale() -> f32 {
    DEFAULT_NOISE_SCALE
}

fn default_length_scale() -> f32 {
    DEFAULT_LENGTH_SCALE
}

fn default_noise_w() -> f32 {
    DEFAULT_NOISE_W_SCALE
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            noise_scale: DEFAULT_NOISE_SCALE,
            length_scale: DEFAULT_LENGTH_SCALE,
            noise_w: DEFAULT_NOISE_W_SCALE,
        }
    }
}

/// Parsed voice model config.
#[derive(Debug, Deserialize)]
pub struct VoiceConfig {
    pub audio: AudioConfig,
    pub num_speakers: i64,
    /// Phoneme string to one or more voice model ids. Keys are UTF-8 strings in the file but
    /// only their first codepoint is significant, see [`VoiceConfig::codepoint_id_map`].
    pub phoneme_id_map: HashMap<String, Vec<PhonemeId>>,
    #[serde(default)]
    pub inference: InferenceConfig,
}

impl VoiceConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("opening voice config '{}'", path.display()))?;
        let config: VoiceConfig = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing voice config '{}'", path.display()))?;
        if config.num_speakers < 1 {
            bail!("voice config must have at least one speaker");
        }
        Ok(config)
    }

    /// The id map keyed on the first codepoint of each entry. Entries whose key decodes to the
    /// empty string are skipped.
    pub fn codepoint_id_map(&self) -> HashMap<char, Vec<PhonemeId>> {
        self.phoneme_id_map
            .iter()
            .filter_map(|(phoneme, ids)| {
                phoneme
                    .chars()
                    .next()
                    .map(|codepoint| (codepoint, ids.clone()))
            })
            .collect()
    }
}

/// Parsed phonemizer + stress model config.
#[derive(Debug, Deserialize)]
pub struct PhonemizerConfig {
    /// Grapheme to phonemizer input id
    pub char_id_map: HashMap<String, CharId>,
    /// CTC blank id in the phonemizer's output vocabulary
    pub phoneme_blank_id: PhonemeId,
    /// Phoneme string to phonemizer output id
    pub phoneme_id_map: HashMap<String, PhonemeId>,
    /// Grapheme rewrites applied before `char_id_map` lookup
    #[serde(default)]
    pub char_map: HashMap<String, String>,
    /// Phoneme rewrites, only consulted when `apply_phoneme_map` is set
    #[serde(default)]
    pub phoneme_map: HashMap<String, String>,
    /// Opt-in switch for `phoneme_map`; off by default
    #[serde(default)]
    pub apply_phoneme_map: bool,
    /// Marker string inserted before a phoneme carrying primary stress
    pub stress_char: String,
}

impl PhonemizerConfig {
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("opening phonemizer config '{}'", path.display()))?;
        serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing phonemizer config '{}'", path.display()))
    }

    /// Id back to grapheme, needed to reconstruct the text surface of a chunk.
    pub fn id_char_map(&self) -> HashMap<CharId, String> {
        reversed_mapping(&self.char_id_map)
    }

    /// Id back to phoneme string for the stress stage and the chunk's phoneme surface.
    pub fn id_phoneme_map(&self) -> HashMap<PhonemeId, String> {
        reversed_mapping(&self.phoneme_id_map)
    }
}

/// Flips a lookup table. If two keys share a value one of them wins arbitrarily, which is fine
/// for our vocabularies where the mapping is a bijection by construction.
pub fn reversed_mapping<K, V>(input: &HashMap<K, V>) -> HashMap<V, K>
where
    K: Clone,
    V: Clone + Eq + Hash,
{
    input
        .iter()
        .map(|(k, v)| (v.clone(), k.clone()))
        .collect()
}

/// The conventional config location: the model path with `.json` appended (so `voice.onnx`
/// pairs with `voice.onnx.json`).
pub fn default_config_path(model_path: &Path) -> PathBuf {
    let mut path = model_path.as_os_str().to_os_string();
    path.push(".json");
    PathBuf::from(path)
}
