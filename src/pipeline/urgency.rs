//! Keyword urgency detection
//!
//! A fast regex pass over inbound text, run before any LLM call. The
//! vocabulary covers what people actually type at a plumber, electrician,
//! or restaurant when something is wrong. False positives only cost an
//! extra owner alert, so the net is cast wide.

use std::sync::OnceLock;

use regex::Regex;

const URGENCY_PATTERN: &str = r"(?i)\b(?:emergency|urgent(?:ly)?|asap|right away|immediately|leak(?:ing|s)?|flood(?:ing|ed)?|burst|no (?:heat|hot water|power|water)|gas (?:leak|smell)|smells? like gas|smell gas|carbon monoxide|sparking|on fire|injur(?:y|ed)|bleeding|locked out|lockout|overflow(?:ing|ed)?|sewage)\b";

fn urgency_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| match Regex::new(URGENCY_PATTERN) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(error = %e, "invalid urgency pattern");
            None
        }
    })
    .as_ref()
}

/// Check whether the text contains an urgency keyword.
#[must_use]
pub fn keyword_hit(text: &str) -> bool {
    urgency_regex().is_some_and(|re| re.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emergency_vocabulary_hits() {
        assert!(keyword_hit("URGENT: pipe burst in the basement"));
        assert!(keyword_hit("we have no hot water since this morning"));
        assert!(keyword_hit("water is leaking through the ceiling"));
        assert!(keyword_hit("I'm locked out of the house"));
        assert!(keyword_hit("need someone asap"));
        assert!(keyword_hit("it smells like gas in here"));
    }

    #[test]
    fn case_is_ignored() {
        assert!(keyword_hit("EMERGENCY"));
        assert!(keyword_hit("Emergency"));
    }

    #[test]
    fn ordinary_messages_miss() {
        assert!(!keyword_hit("what are your hours on Saturday?"));
        assert!(!keyword_hit("can I get a quote for a new faucet"));
        assert!(!keyword_hit(""));
    }

    #[test]
    fn partial_words_do_not_hit() {
        // "bleak" contains "leak", "floodlight" contains "flood".
        assert!(!keyword_hit("the outlook is bleak"));
        assert!(!keyword_hit("my floodlight stopped working"));
    }
}
