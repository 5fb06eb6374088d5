//! The text normaliser is the first stage of the pipeline: it takes the user's text and reduces
//! it to the orthographic form the phonemizer model was trained on. For an example consider:
//!
//! > In 1999 we MOVED to Málaga.
//!
//! The phonemizer has never seen a digit, an uppercase letter or an accented vowel - its
//! vocabulary is the closed set of graphemes in `char_id_map`. So before any encoding happens the
//! text is lowercased, accents are stripped back to their base letters and numbers are rewritten
//! as words:
//!
//! > in nineteen ninety-nine we moved to malaga.
//!
//! Numbers are the interesting part. A year is not read the way a cardinal is ("nineteen
//! ninety-nine", not "one thousand nine hundred and ninety-nine"), so integers in the range a
//! calendar year plausibly occupies get the year reading. Everything else gets a cardinal
//! spellout, floats included. Currencies, ordinals, phone numbers and dates are all further
//! refinements a production normaliser grows sooner or later; they are deliberately absent here
//! and such tokens fall back to digit-by-digit oblivion or cardinal readings.
//!
//! Segmentation is Unicode-correct throughout: sentences, words and graphemes all come from the
//! UAX #29 rules rather than from splitting on ASCII. That matters because the downstream stages
//! are defined over graphemes (user-perceived characters), and a naive `char` loop would tear
//! apart combining sequences the vocabulary treats as single units.
//!
//! The locale tag only selects the spellout language for numbers. Case folding and segmentation
//! use the Unicode default rules; genuinely locale-tailored behaviour (Turkish dotless i,
//! Japanese sentence particles) would need a full ICU binding which this crate intentionally
//! avoids.
use num2words::{Lang, Num2Words};
use once_cell::sync::OnceCell;
use regex::Regex;
use std::str::FromStr;
use tracing::{debug, warn};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;
use unicode_segmentation::UnicodeSegmentation;

/// Language selection for number spellout. Built from a BCP-47 style tag (`en`, `en_US`,
/// `fr-FR`); only the primary language subtag is consulted. Unsupported languages fall back to
/// English with a warning.
#[derive(Clone, Debug)]
pub struct Locale {
    tag: String,
    spellout: Lang,
}

impl Default for Locale {
    fn default() -> Self {
        Self::new("en")
    }
}

impl Locale {
    pub fn new(tag: &str) -> Self {
        let subtag = tag.split(['-', '_']).next().unwrap_or("en");
        let spellout = match Lang::from_str(subtag) {
            Ok(lang) => lang,
            Err(_) => {
                warn!("No number spellout rules for '{tag}', falling back to English");
                Lang::English
            }
        };
        Self {
            tag: tag.to_string(),
            spellout,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }
}

/// Runs the full normalisation pipeline and returns the text as sentences of graphemes, ready
/// for char encoding. A single ASCII space is prepended first because the phonemizer model was
/// trained with a leading space of context on every sentence.
pub fn normalise(text: &str, locale: &Locale) -> Vec<Vec<String>> {
    let mut lowered = text.to_lowercase();
    lowered.insert(0, ' ');
    let stripped = strip_accents(&lowered);

    let mut sentences = Vec::new();
    for sentence in stripped.split_sentence_bounds() {
        let mut graphemes = Vec::new();
        for word in sentence.split_word_bounds() {
            match expand_number(word, locale) {
                Some(spelled) => {
                    graphemes.extend(spelled.graphemes(true).map(|g| g.to_string()))
                }
                None => graphemes.extend(word.graphemes(true).map(|g| g.to_string())),
            }
        }
        sentences.push(graphemes);
    }
    debug!("Normalised {:?} into {} sentences", text, sentences.len());
    sentences
}

/// Strips accents while preserving base letters: canonical decomposition, drop the combining
/// marks, recompose. `café` becomes `cafe`, `Müller` becomes `Muller`, and anything that was
/// never accented passes through untouched.
pub fn strip_accents(text: &str) -> String {
    text.nfd().filter(|c| !is_combining_mark(*c)).nfc().collect()
}

/// Rewrites a numeric token as words, or `None` if the token isn't a number we can spell. Word
/// segmentation keeps digit runs with their grouping commas and decimal point as one token, so
/// `1,234.5` arrives here whole.
fn expand_number(word: &str, locale: &Locale) -> Option<String> {
    static IS_NUMBER: OnceCell<Regex> = OnceCell::new();
    let is_number = IS_NUMBER.get_or_init(|| Regex::new(r#"^\d[\d,]*(\.\d+)?$"#).unwrap());

    if !is_number.is_match(word) {
        return None;
    }
    let plain = word.replace(',', "");

    let spelled = if let Ok(number) = plain.parse::<i64>() {
        if number > 1000 && number < 3000 {
            // Calendar years read differently to cardinals. If the spellout language has no
            // year form, the cardinal reading is still better than digits.
            Num2Words::new(number)
                .lang(locale.spellout.clone())
                .year()
                .to_words()
                .or_else(|_| {
                    Num2Words::new(number)
                        .lang(locale.spellout.clone())
                        .cardinal()
                        .to_words()
                })
                .ok()?
        } else {
            Num2Words::new(number)
                .lang(locale.spellout.clone())
                .cardinal()
                .to_words()
                .ok()?
        }
    } else if let Ok(number) = plain.parse::<f64>() {
        Num2Words::new(number)
            .lang(locale.spellout.clone())
            .cardinal()
            .to_words()
            .ok()?
    } else {
        return None;
    };

    if spelled.is_empty() {
        None
    } else {
        Some(spelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flatten(sentences: &[Vec<String>]) -> String {
        sentences.concat().concat()
    }

    #[test]
    fn lowercase_and_leading_space() {
        let locale = Locale::default();
        let sentences = normalise("Hello", &locale);
        assert_eq!(flatten(&sentences), " hello");
    }

    #[test]
    fn accents_stripped_to_base_letters() {
        assert_eq!(strip_accents("café"), "cafe");
        assert_eq!(strip_accents("Málaga"), "Malaga");
        assert_eq!(strip_accents("naïve coöp"), "naive coop");
        // Characters without combining marks are untouched
        assert_eq!(strip_accents("hello 🌟"), "hello 🌟");
    }

    #[test]
    fn sentences_are_segmented() {
        let locale = Locale::default();
        let sentences = normalise("Hello. World.", &locale);
        assert_eq!(sentences.len(), 2);
        assert_eq!(flatten(&sentences[..1]), " hello. ");
        assert_eq!(flatten(&sentences[1..]), "world.");
    }

    #[test]
    fn years_use_the_year_reading() {
        let locale = Locale::default();
        let text = flatten(&normalise("In 1999 we ran.", &locale));
        assert!(text.contains("nineteen ninety"), "got: {text}");
        assert!(!text.contains("1999"));
    }

    #[test]
    fn year_guard_is_a_strict_range() {
        let locale = Locale::default();
        // 3000 is outside the year range so it reads as a cardinal
        let text = flatten(&normalise("3000", &locale));
        assert!(text.contains("three thousand"), "got: {text}");

        let text = flatten(&normalise("1000", &locale));
        assert!(text.contains("one thousand"), "got: {text}");
    }

    #[test]
    fn cardinals_and_floats_spelled_out() {
        let locale = Locale::default();
        let text = flatten(&normalise("42", &locale));
        assert!(text.contains("forty-two"), "got: {text}");

        let text = flatten(&normalise("3.5", &locale));
        assert!(text.contains("three point five"), "got: {text}");
    }

    #[test]
    fn grouped_digits_parse_as_one_number() {
        let locale = Locale::default();
        let text = flatten(&normalise("1,234,567", &locale));
        assert!(text.contains("million"), "got: {text}");
    }

    #[test]
    fn non_numbers_pass_through() {
        let locale = Locale::default();
        let text = flatten(&normalise("route 66b ok", &locale));
        // "66b" is not purely numeric so it is left alone
        assert!(text.contains("66b"), "got: {text}");
    }

    #[test]
    fn graphemes_not_codepoints() {
        let locale = Locale::default();
        // A family emoji is many codepoints but one grapheme
        let sentences = normalise("👨‍👩‍👧", &locale);
        let graphemes: Vec<&String> = sentences
            .iter()
            .flatten()
            .filter(|g| !g.trim().is_empty())
            .collect();
        assert_eq!(graphemes.len(), 1);
    }

    #[test]
    fn unknown_locale_falls_back_to_english() {
        let locale = Locale::new("zz_ZZ");
        let text = flatten(&normalise("2", &locale));
        assert!(text.contains("two"), "got: {text}");
    }
}
