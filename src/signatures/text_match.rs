//! Text-match operators used by literal instruction entries.

use dashmap::DashMap;
use regex::Regex;
use rustc_hash::FxBuildHasher;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// How a reference text is compared against a candidate string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextMatchMode {
    Equals,
    EqualsIgnoreCase,
    Contains,
    ContainsIgnoreCase,
    StartsWith,
    StartsWithIgnoreCase,
    EndsWith,
    EndsWithIgnoreCase,
    RegexFullMatch,
    RegexPartialMatch,
    Anything,
    Nothing,
}

impl TextMatchMode {
    pub const ALL: [TextMatchMode; 12] = [
        TextMatchMode::Equals,
        TextMatchMode::EqualsIgnoreCase,
        TextMatchMode::Contains,
        TextMatchMode::ContainsIgnoreCase,
        TextMatchMode::StartsWith,
        TextMatchMode::StartsWithIgnoreCase,
        TextMatchMode::EndsWith,
        TextMatchMode::EndsWithIgnoreCase,
        TextMatchMode::RegexFullMatch,
        TextMatchMode::RegexPartialMatch,
        TextMatchMode::Anything,
        TextMatchMode::Nothing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TextMatchMode::Equals => "EQUALS",
            TextMatchMode::EqualsIgnoreCase => "EQUALS_IGNORE_CASE",
            TextMatchMode::Contains => "CONTAINS",
            TextMatchMode::ContainsIgnoreCase => "CONTAINS_IGNORE_CASE",
            TextMatchMode::StartsWith => "STARTS_WITH",
            TextMatchMode::StartsWithIgnoreCase => "STARTS_WITH_IGNORE_CASE",
            TextMatchMode::EndsWith => "ENDS_WITH",
            TextMatchMode::EndsWithIgnoreCase => "ENDS_WITH_IGNORE_CASE",
            TextMatchMode::RegexFullMatch => "REGEX_FULL_MATCH",
            TextMatchMode::RegexPartialMatch => "REGEX_PARTIAL_MATCH",
            TextMatchMode::Anything => "ANYTHING",
            TextMatchMode::Nothing => "NOTHING",
        }
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, TextMatchMode::RegexFullMatch | TextMatchMode::RegexPartialMatch)
    }

    pub fn is_case_insensitive(&self) -> bool {
        matches!(
            self,
            TextMatchMode::EqualsIgnoreCase
                | TextMatchMode::ContainsIgnoreCase
                | TextMatchMode::StartsWithIgnoreCase
                | TextMatchMode::EndsWithIgnoreCase
        )
    }

    /// Compare `reference` against `candidate` for the non-regex modes.
    /// Regex modes need a compiled pattern; see [`TextMatcher`].
    fn compare(&self, reference: &str, candidate: &str) -> bool {
        if self.is_case_insensitive() {
            let reference = reference.to_lowercase();
            let candidate = candidate.to_lowercase();
            return self.compare_exact_case(&reference, &candidate);
        }
        self.compare_exact_case(reference, candidate)
    }

    fn compare_exact_case(&self, reference: &str, candidate: &str) -> bool {
        match self {
            TextMatchMode::Equals | TextMatchMode::EqualsIgnoreCase => candidate == reference,
            TextMatchMode::Contains | TextMatchMode::ContainsIgnoreCase => candidate.contains(reference),
            TextMatchMode::StartsWith | TextMatchMode::StartsWithIgnoreCase => {
                candidate.starts_with(reference)
            }
            TextMatchMode::EndsWith | TextMatchMode::EndsWithIgnoreCase => candidate.ends_with(reference),
            TextMatchMode::Anything => true,
            TextMatchMode::Nothing | TextMatchMode::RegexFullMatch | TextMatchMode::RegexPartialMatch => {
                false
            }
        }
    }
}

impl fmt::Display for TextMatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TextMatchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Compiled regex patterns keyed by (reference text, anchored).
///
/// Owned by the signature loader and shared by every matcher it builds.
/// Invalid patterns are cached as `None` and never match, anchored or not.
#[derive(Debug)]
pub struct RegexCache {
    patterns: DashMap<(String, bool), Option<Regex>, FxBuildHasher>,
}

impl Default for RegexCache {
    fn default() -> Self {
        Self::new()
    }
}

impl RegexCache {
    pub fn new() -> Self {
        Self { patterns: DashMap::with_hasher(FxBuildHasher::default()) }
    }

    /// Compiled pattern for `source`, or `None` if it does not compile.
    /// `anchored` wraps a valid pattern as `^(?:source)$`.
    pub fn get_or_compile(&self, source: &str, anchored: bool) -> Option<Regex> {
        let key = (source.to_string(), anchored);
        if let Some(cached) = self.patterns.get(&key) {
            return cached.value().clone();
        }
        self.patterns
            .entry(key)
            .or_insert_with(|| match Self::compile(source, anchored) {
                Ok(re) => Some(re),
                Err(e) => {
                    debug!("Pattern '{}' does not compile, it will never match: {}", source, e);
                    None
                }
            })
            .value()
            .clone()
    }

    fn compile(source: &str, anchored: bool) -> Result<Regex, regex::Error> {
        let raw = Regex::new(source)?;
        if anchored {
            Regex::new(&format!("^(?:{})$", raw.as_str()))
        } else {
            Ok(raw)
        }
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn clear(&self) {
        self.patterns.clear();
    }
}

/// A text-match operator bound to its reference text.
///
/// Equality ignores the compiled pattern: two matchers are equal when mode
/// and reference text are.
#[derive(Debug, Clone)]
pub struct TextMatcher {
    mode: TextMatchMode,
    text: String,
    regex: Option<Regex>,
}

impl TextMatcher {
    pub fn new<S: Into<String>>(mode: TextMatchMode, text: S, cache: &RegexCache) -> Self {
        let text = text.into();
        let regex = match mode {
            TextMatchMode::RegexFullMatch => cache.get_or_compile(&text, true),
            TextMatchMode::RegexPartialMatch => cache.get_or_compile(&text, false),
            _ => None,
        };
        Self { mode, text, regex }
    }

    /// Parse the `"<MODE> <text>"` encoding. A bare mode name has empty text.
    pub fn parse(encoded: &str, cache: &RegexCache) -> Result<Self, String> {
        let (mode, text) = encoded.split_once(' ').unwrap_or((encoded, ""));
        let mode = mode.parse::<TextMatchMode>()?;
        Ok(Self::new(mode, text, cache))
    }

    pub fn encode(&self) -> String {
        if self.text.is_empty() {
            self.mode.as_str().to_string()
        } else {
            format!("{} {}", self.mode.as_str(), self.text)
        }
    }

    pub fn mode(&self) -> TextMatchMode {
        self.mode
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// A missing candidate only satisfies `ANYTHING`.
    pub fn matches(&self, candidate: Option<&str>) -> bool {
        let Some(candidate) = candidate else {
            return self.mode == TextMatchMode::Anything;
        };
        match self.mode {
            TextMatchMode::RegexFullMatch | TextMatchMode::RegexPartialMatch => self
                .regex
                .as_ref()
                .is_some_and(|re| re.is_match(candidate)),
            mode => mode.compare(&self.text, candidate),
        }
    }
}

impl PartialEq for TextMatcher {
    fn eq(&self, other: &Self) -> bool {
        self.mode == other.mode && self.text == other.text
    }
}

impl Eq for TextMatcher {}

impl fmt::Display for TextMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}
