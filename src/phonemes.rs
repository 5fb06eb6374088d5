//! The symbolic middle of the pipeline: the id types the three models exchange and the pure
//! encoding steps between them. Everything in here is a plain function over slices and maps so it
//! can be tested without touching an inference runtime.
//!
//! There are two separate vocabularies to keep straight. The phonemizer model has its own
//! grapheme vocabulary (`char_id_map`) and phoneme vocabulary (`phoneme_id_map`), both closed
//! sets. The voice model has a third vocabulary mapping single codepoints to one or more ids.
//! Both vocabularies being closed means an input the map doesn't know is simply dropped - there
//! is no UNK token to fall back on, and passing a made-up id to a network produces garbage audio
//! rather than an error.
//!
//! The voice model also has a framing convention inherited from its training data: every real id
//! is followed by a pad, the whole sentence is wrapped in begin/end markers, and the begin marker
//! gets its own pad so the interleave is uniform from the model's perspective.
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

/// Id of a phoneme in either the phonemizer's or the voice model's vocabulary.
pub type PhonemeId = i64;
/// Id of a grapheme in the phonemizer's input vocabulary.
pub type CharId = i64;
/// Id of a speaker in a multi-speaker voice model.
pub type SpeakerId = i64;

/// Interleaved between every id fed to the voice model.
pub const ID_PAD: PhonemeId = 0;
/// Beginning of sentence marker for the voice model.
pub const ID_BOS: PhonemeId = 1;
/// End of sentence marker for the voice model.
pub const ID_EOS: PhonemeId = 2;

/// Codepoints conventionally bound to the pad/bos/eos ids in voice configs. The ids above are
/// used directly, these exist so config files can be cross-checked by eye.
pub const PHONEME_PAD: char = '_';
pub const PHONEME_BOS: char = '^';
pub const PHONEME_EOS: char = '$';

/// Encodes one sentence of graphemes into phonemizer char ids. Each grapheme is first rewritten
/// through `char_map` if it has an entry (the replacement is total, not per-codepoint) and then
/// looked up in `char_id_map`. Graphemes the vocabulary doesn't know are dropped.
pub fn encode_chars(
    graphemes: &[String],
    char_map: &HashMap<String, String>,
    char_id_map: &HashMap<String, CharId>,
) -> Vec<CharId> {
    let mut char_ids = Vec::with_capacity(graphemes.len());
    for grapheme in graphemes {
        let grapheme = char_map.get(grapheme).unwrap_or(grapheme);
        if let Some(id) = char_id_map.get(grapheme) {
            char_ids.push(*id);
        }
    }
    char_ids
}

/// Encodes normalised sentences into the per-sentence char id vectors the phonemizer consumes.
/// Whitespace-only sentences (such as the bare leading-space sentence an empty input produces)
/// are skipped, as are sentences whose encoding comes out empty - there is nothing to say for
/// either.
pub fn encode_sentences(
    sentences: &[Vec<String>],
    char_map: &HashMap<String, String>,
    char_id_map: &HashMap<String, CharId>,
) -> Vec<Vec<CharId>> {
    let mut encoded = Vec::with_capacity(sentences.len());
    for sentence in sentences {
        if sentence.iter().all(|g| g.trim().is_empty()) {
            continue;
        }
        let char_ids = encode_chars(sentence, char_map, char_id_map);
        if !char_ids.is_empty() {
            encoded.push(char_ids);
        }
    }
    encoded
}

/// Maps phoneme ids back to their string form, skipping ids outside the table.
pub fn phoneme_strings(
    phoneme_ids: &[PhonemeId],
    id_phoneme_map: &HashMap<PhonemeId, String>,
) -> Vec<String> {
    phoneme_ids
        .iter()
        .filter_map(|id| id_phoneme_map.get(id).cloned())
        .collect()
}

/// Maps phoneme ids to strings, inserting the primary stress marker before any phoneme whose
/// predicted probability exceeds 0.5. The caller is responsible for checking that
/// `probabilities` and `phoneme_ids` agree in length; a disagreement means the stress stage is
/// not applicable to this sentence at all.
pub fn insert_stress(
    phoneme_ids: &[PhonemeId],
    probabilities: &[f32],
    stress_char: &str,
    id_phoneme_map: &HashMap<PhonemeId, String>,
) -> Vec<String> {
    debug_assert_eq!(phoneme_ids.len(), probabilities.len());
    let mut phonemes = Vec::with_capacity(phoneme_ids.len());
    for (phoneme_id, probability) in phoneme_ids.iter().zip(probabilities) {
        if *probability > 0.5 {
            // Primary stress goes in front of the vowel it applies to
            phonemes.push(stress_char.to_string());
        }
        if let Some(phoneme) = id_phoneme_map.get(phoneme_id) {
            phonemes.push(phoneme.clone());
        }
    }
    phonemes
}

/// Encodes phoneme strings into the framed id vector the voice model consumes:
/// `[bos, pad, id, pad, id, pad, ..., eos]`.
///
/// The voice vocabulary is keyed on single NFD codepoints, so each phoneme string is
/// decomposed first and only the first codepoint of each grapheme cluster is looked up - a
/// precomposed `é` finds its base `e` this way. One codepoint may expand to several ids; every
/// emitted id is followed by a pad. Codepoints outside the vocabulary are skipped.
pub fn encode_voice_phonemes(
    phonemes: &[String],
    phoneme_id_map: &HashMap<char, Vec<PhonemeId>>,
) -> Vec<PhonemeId> {
    let mut phoneme_ids = vec![ID_BOS, ID_PAD];
    for phoneme in phonemes {
        let decomposed = phoneme.nfd().collect::<String>();
        for grapheme in decomposed.graphemes(true) {
            let Some(codepoint) = grapheme.chars().next() else {
                continue;
            };
            if let Some(mapped) = phoneme_id_map.get(&codepoint) {
                for id in mapped {
                    phoneme_ids.push(*id);
                    phoneme_ids.push(ID_PAD);
                }
            }
        }
    }
    phoneme_ids.push(ID_EOS);
    phoneme_ids
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_tables() -> (HashMap<String, String>, HashMap<String, CharId>) {
        let char_map = HashMap::from([("!".to_string(), ".".to_string())]);
        let char_id_map = HashMap::from([
            (" ".to_string(), 3),
            (".".to_string(), 4),
            ("h".to_string(), 10),
            ("i".to_string(), 11),
        ]);
        (char_map, char_id_map)
    }

    #[test]
    fn char_encoding_drops_unknown_graphemes() {
        let (char_map, char_id_map) = char_tables();
        let graphemes: Vec<String> = [" ", "h", "i", "🌟", "."]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(
            encode_chars(&graphemes, &char_map, &char_id_map),
            vec![3, 10, 11, 4]
        );
    }

    #[test]
    fn char_map_rewrites_before_id_lookup() {
        let (char_map, char_id_map) = char_tables();
        let graphemes = vec!["h".to_string(), "!".to_string()];
        // "!" has no id of its own but rewrites to "." which does
        assert_eq!(
            encode_chars(&graphemes, &char_map, &char_id_map),
            vec![10, 4]
        );
    }

    #[test]
    fn blank_sentences_are_not_encoded() {
        let (char_map, char_id_map) = char_tables();
        // What an empty input looks like after normalisation: one sentence of one space
        let sentences = vec![vec![" ".to_string()]];
        assert!(encode_sentences(&sentences, &char_map, &char_id_map).is_empty());

        let sentences = vec![
            vec![" ".to_string(), "h".to_string(), "i".to_string()],
            vec!["🌟".to_string()],
            vec!["h".to_string()],
        ];
        // The star-only sentence encodes to nothing and is dropped entirely
        assert_eq!(
            encode_sentences(&sentences, &char_map, &char_id_map),
            vec![vec![3, 10, 11], vec![10]]
        );
    }

    #[test]
    fn stress_markers_inserted_above_threshold() {
        let id_phoneme_map = HashMap::from([
            (5, "a".to_string()),
            (6, "b".to_string()),
            (7, "c".to_string()),
        ]);
        let phonemes = insert_stress(&[5, 6, 7], &[0.9, 0.5, 0.51], "ˈ", &id_phoneme_map);
        // 0.5 is not strictly greater than the threshold
        assert_eq!(phonemes, vec!["ˈ", "a", "b", "ˈ", "c"]);

        let unstressed = phoneme_strings(&[5, 6, 7], &id_phoneme_map);
        assert_eq!(unstressed, vec!["a", "b", "c"]);
    }

    #[test]
    fn stress_output_length_matches_marker_count() {
        let id_phoneme_map = HashMap::from([(1, "x".to_string()), (2, "y".to_string())]);
        let probabilities = [0.6, 0.2, 0.8, 0.9];
        let phoneme_ids = [1, 2, 1, 2];
        let stressed = insert_stress(&phoneme_ids, &probabilities, "ˈ", &id_phoneme_map);
        let marked = probabilities.iter().filter(|p| **p > 0.5).count();
        assert_eq!(stressed.len(), phoneme_ids.len() + marked);
    }

    #[test]
    fn voice_framing_interleaves_padding() {
        let map = HashMap::from([('a', vec![5]), ('b', vec![6])]);
        let phonemes = vec!["a".to_string(), "b".to_string()];
        assert_eq!(
            encode_voice_phonemes(&phonemes, &map),
            vec![ID_BOS, ID_PAD, 5, ID_PAD, 6, ID_PAD, ID_EOS]
        );
    }

    #[test]
    fn multi_id_phonemes_expand_in_order() {
        let map = HashMap::from([('t', vec![20, 21])]);
        let phonemes = vec!["t".to_string()];
        assert_eq!(
            encode_voice_phonemes(&phonemes, &map),
            vec![ID_BOS, ID_PAD, 20, ID_PAD, 21, ID_PAD, ID_EOS]
        );
    }

    #[test]
    fn voice_encoding_decomposes_before_lookup() {
        // The map is keyed on base codepoints. A precomposed é only hits the map after NFD
        // decomposition exposes the base letter; the combining acute rides along in the same
        // grapheme cluster and only the cluster's first codepoint is consulted.
        let map = HashMap::from([('e', vec![7]), ('\u{301}', vec![8])]);
        let phonemes = vec!["\u{e9}".to_string()]; // precomposed é
        assert_eq!(
            encode_voice_phonemes(&phonemes, &map),
            vec![ID_BOS, ID_PAD, 7, ID_PAD, ID_EOS]
        );
    }

    #[test]
    fn unmapped_codepoints_skipped() {
        let map = HashMap::from([('a', vec![5])]);
        let phonemes = vec!["a".to_string(), "ʒ".to_string()];
        assert_eq!(
            encode_voice_phonemes(&phonemes, &map),
            vec![ID_BOS, ID_PAD, 5, ID_PAD, ID_EOS]
        );
    }

    #[test]
    fn empty_input_still_framed() {
        let map = HashMap::new();
        assert_eq!(
            encode_voice_phonemes(&[], &map),
            vec![ID_BOS, ID_PAD, ID_EOS]
        );
    }
}
