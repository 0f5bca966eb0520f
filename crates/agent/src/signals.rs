//! Signal Detection
//!
//! Keyword and regex matching of raw user text against the configured signal
//! lists. Matching is case-insensitive and a keyword only matches as a whole
//! word or phrase, so "no" does not fire inside "know".

use std::collections::{BTreeMap, BTreeSet};

use regex::Regex;
use roleplay_config::{ConfigError, SignalsConfig};

/// Compiled matchers of one signal
#[derive(Debug, Clone)]
struct SignalMatcher {
    /// Lowercased keywords
    keywords: Vec<String>,
    patterns: Vec<Regex>,
}

impl SignalMatcher {
    fn matches(&self, lowered: &str, original: &str) -> bool {
        self.keywords.iter().any(|kw| contains_phrase(lowered, kw))
            || self.patterns.iter().any(|re| re.is_match(original))
    }
}

/// Detects named signals in user text
#[derive(Debug, Clone)]
pub struct SignalDetector {
    matchers: BTreeMap<String, SignalMatcher>,
}

impl SignalDetector {
    /// Build a detector. Fails if a required category is missing or a
    /// pattern does not compile.
    pub fn new(config: &SignalsConfig) -> Result<Self, ConfigError> {
        let missing = config.missing_required();
        if !missing.is_empty() {
            return Err(ConfigError::MissingSignals(missing));
        }

        let mut matchers = BTreeMap::new();
        for (name, definition) in &config.signals {
            let keywords = definition
                .keywords
                .iter()
                .map(|kw| kw.trim().to_lowercase())
                .filter(|kw| !kw.is_empty())
                .collect();

            let patterns = definition
                .patterns
                .iter()
                .map(|p| {
                    Regex::new(&format!("(?i){}", p)).map_err(|e| ConfigError::InvalidPattern {
                        signal: name.clone(),
                        message: e.to_string(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            matchers.insert(name.clone(), SignalMatcher { keywords, patterns });
        }

        tracing::debug!(signals = matchers.len(), "Signal detector initialized");
        Ok(Self { matchers })
    }

    /// True when `signal` fires on `text`. Unknown signals never fire.
    pub fn detect(&self, text: &str, signal: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        let Some(matcher) = self.matchers.get(signal) else {
            return false;
        };
        matcher.matches(&text.to_lowercase(), text)
    }

    /// Every signal that fires on `text`
    pub fn detect_all(&self, text: &str) -> BTreeSet<String> {
        if text.trim().is_empty() {
            return BTreeSet::new();
        }
        let lowered = text.to_lowercase();
        self.matchers
            .iter()
            .filter(|(_, matcher)| matcher.matches(&lowered, text))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// First of `candidates`, in the given order, that fires on `text`
    pub fn first_match<'a>(&self, text: &str, candidates: &[&'a str]) -> Option<&'a str> {
        candidates
            .iter()
            .copied()
            .find(|candidate| self.detect(text, candidate))
    }

    pub fn knows(&self, signal: &str) -> bool {
        self.matchers.contains_key(signal)
    }

    pub fn signal_names(&self) -> impl Iterator<Item = &str> {
        self.matchers.keys().map(|k| k.as_str())
    }
}

/// Whole-phrase containment: every occurrence is checked for
/// non-alphanumeric neighbours.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    haystack.match_indices(phrase).any(|(start, _)| {
        let end = start + phrase.len();
        let before_ok = haystack[..start]
            .chars()
            .next_back()
            .map_or(true, |c| !c.is_alphanumeric());
        let after_ok = haystack[end..]
            .chars()
            .next()
            .map_or(true, |c| !c.is_alphanumeric());
        before_ok && after_ok
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use roleplay_config::{SignalDefinition, REQUIRED_SIGNALS};

    fn config() -> SignalsConfig {
        let mut config = SignalsConfig::default();
        for name in REQUIRED_SIGNALS {
            config
                .signals
                .insert(name.to_string(), SignalDefinition::default());
        }
        config.signals.insert(
            "objection".to_string(),
            SignalDefinition {
                keywords: vec!["no".into(), "too expensive".into()],
                ..Default::default()
            },
        );
        config.signals.insert(
            "demand_directness".to_string(),
            SignalDefinition {
                keywords: vec!["get to the point".into()],
                patterns: vec![r"just tell me".into(), r"how much\s+exactly".into()],
                ..Default::default()
            },
        );
        config.signals.insert(
            "walking".to_string(),
            SignalDefinition {
                keywords: vec!["not interested".into(), "no".into()],
                ..Default::default()
            },
        );
        config
    }

    #[test]
    fn test_keyword_boundaries() {
        let detector = SignalDetector::new(&config()).unwrap();
        assert!(detector.detect("No, thanks", "objection"));
        assert!(detector.detect("That's TOO expensive!", "objection"));
        assert!(!detector.detect("I know what you mean", "objection"));
        assert!(!detector.detect("nobody asked", "objection"));
    }

    #[test]
    fn test_patterns() {
        let detector = SignalDetector::new(&config()).unwrap();
        assert!(detector.detect("Just Tell Me the price", "demand_directness"));
        assert!(detector.detect("how much   exactly?", "demand_directness"));
        assert!(!detector.detect("tell me more", "demand_directness"));
    }

    #[test]
    fn test_unknown_signal_fails_closed() {
        let detector = SignalDetector::new(&config()).unwrap();
        assert!(!detector.detect("anything", "telepathy"));
        assert!(!detector.knows("telepathy"));
    }

    #[test]
    fn test_empty_text() {
        let detector = SignalDetector::new(&config()).unwrap();
        assert!(detector.detect_all("   ").is_empty());
        assert!(!detector.detect("", "objection"));
    }

    #[test]
    fn test_detect_all_and_first_match() {
        let detector = SignalDetector::new(&config()).unwrap();
        let found = detector.detect_all("No. Just tell me.");
        assert!(found.contains("objection"));
        assert!(found.contains("walking"));
        assert!(found.contains("demand_directness"));

        assert_eq!(
            detector.first_match("no", &["walking", "objection"]),
            Some("walking")
        );
        assert_eq!(
            detector.first_match("no", &["objection", "walking"]),
            Some("objection")
        );
        assert_eq!(detector.first_match("hello", &["objection"]), None);
    }

    #[test]
    fn test_missing_category_fails_fast() {
        let mut config = config();
        config.signals.remove("soft_positive");
        let err = SignalDetector::new(&config).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSignals(ref m) if m == &vec!["soft_positive".to_string()]));
    }

    #[test]
    fn test_bad_pattern() {
        let mut config = config();
        config.signals.insert(
            "guarded".to_string(),
            SignalDefinition {
                patterns: vec!["(unclosed".into()],
                ..Default::default()
            },
        );
        let err = SignalDetector::new(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { ref signal, .. } if signal == "guarded"));
    }

    #[test]
    fn test_contains_phrase_unicode() {
        assert!(contains_phrase("ok, café time", "café"));
        assert!(!contains_phrase("cafés", "café"));
    }
}
