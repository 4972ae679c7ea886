use anyhow::{anyhow, Result};
use isolang::Language;
use once_cell::sync::Lazy;
use regex::Regex;

/// Language utilities
///
/// This module validates ISO 639 language codes and BCP-47 style tags such as
/// `zh-CN`, and provides the pluggable source-language detector used by the
/// pipeline to build cache keys.
/// Language code type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageCodeType {
    /// ISO 639-1 (2-letter) code
    Part1,
    /// ISO 639-2/T (3-letter) code
    Part2T,
    /// ISO 639-2/B (3-letter) code
    Part2B,
}

/// ISO 639-2/B codes that differ from their 639-2/T counterpart
const PART2B_TO_PART2T: &[(&str, &str)] = &[
    ("fre", "fra"),
    ("ger", "deu"),
    ("dut", "nld"),
    ("gre", "ell"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("ice", "isl"),
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("per", "fas"),
    ("geo", "kat"),
    ("may", "msa"),
    ("mac", "mkd"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

fn part2b_to_part2t(code: &str) -> Option<&'static str> {
    PART2B_TO_PART2T.iter().find(|(b, _)| *b == code).map(|(_, t)| *t)
}

/// Validate if a language code is a valid ISO 639-1 or ISO 639-2 code
pub fn validate_language_code(code: &str) -> Result<LanguageCodeType> {
    let normalized_code = code.trim().to_lowercase();

    match normalized_code.len() {
        2 if Language::from_639_1(&normalized_code).is_some() => Ok(LanguageCodeType::Part1),
        3 if Language::from_639_3(&normalized_code).is_some() => Ok(LanguageCodeType::Part2T),
        3 if part2b_to_part2t(&normalized_code).is_some() => Ok(LanguageCodeType::Part2B),
        _ => Err(anyhow!("Invalid language code: {}", code)),
    }
}

/// Primary language subtag of a tag like `zh-CN` or `pt_BR`
pub fn primary_subtag(tag: &str) -> &str {
    tag.trim().split(['-', '_']).next().unwrap_or("")
}

/// Validate a language tag whose primary subtag is an ISO 639 code
pub fn validate_language_tag(tag: &str) -> Result<LanguageCodeType> {
    validate_language_code(primary_subtag(tag)).map_err(|_| anyhow!("Invalid language tag: {}", tag))
}

/// Normalize a language code to ISO 639-2/T (3-letter) format
pub fn normalize_to_part2t(code: &str) -> Result<String> {
    let normalized_code = primary_subtag(code).to_lowercase();

    match validate_language_code(&normalized_code)? {
        LanguageCodeType::Part1 => Language::from_639_1(&normalized_code)
            .map(|lang| lang.to_639_3().to_string())
            .ok_or_else(|| anyhow!("Cannot normalize invalid language code: {}", code)),
        LanguageCodeType::Part2T => Ok(normalized_code),
        LanguageCodeType::Part2B => part2b_to_part2t(&normalized_code)
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Cannot normalize invalid language code: {}", code)),
    }
}

/// Check if two language tags name the same language (ignoring region subtags)
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (normalize_to_part2t(code1), normalize_to_part2t(code2)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Get the English language name from a code
pub fn get_language_name(code: &str) -> Result<String> {
    let normalized = normalize_to_part2t(code)?;
    let lang = Language::from_639_3(&normalized)
        .ok_or_else(|| anyhow!("Failed to get language from code: {}", normalized))?;

    Ok(lang.to_name().to_string())
}

/// Coarse source-language classifier.
///
/// The pipeline uses the returned tag as the source half of the cache key and to
/// skip content that is already in the target language.
pub trait LanguageDetector: Send + Sync {
    /// Return a language tag for `text`
    fn detect(&self, text: &str) -> String;
}

/// Fallback tag when no script-specific range is present
pub const FALLBACK_LANGUAGE: &str = "en";

static HAN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\x{4e00}-\x{9fa5}]").expect("valid Han range"));
static KANA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{3040}-\x{30ff}\x{31f0}-\x{31ff}]").expect("valid kana range"));
static HANGUL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{3130}-\x{318f}\x{ac00}-\x{d7af}]").expect("valid Hangul range"));

/// Character-range heuristic: Han → `zh`, kana → `ja`, Hangul → `ko`, otherwise `en`.
///
/// Han is checked first, so Japanese text mixing kanji and kana reports `zh`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptHeuristicDetector;

impl LanguageDetector for ScriptHeuristicDetector {
    fn detect(&self, text: &str) -> String {
        let tag = if HAN.is_match(text) {
            "zh"
        } else if KANA.is_match(text) {
            "ja"
        } else if HANGUL.is_match(text) {
            "ko"
        } else {
            FALLBACK_LANGUAGE
        };
        tag.to_string()
    }
}

/// Detector that always reports the same tag, for a configured source language
#[derive(Debug, Clone)]
pub struct FixedLanguage(pub String);

impl LanguageDetector for FixedLanguage {
    fn detect(&self, _text: &str) -> String {
        self.0.clone()
    }
}
