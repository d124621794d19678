//! Domain relevance classification
//!
//! Decides whether a query is about the community-platform domain at all.
//! Out-of-domain queries skip the knowledge base and go straight to the
//! generic lookup tool.
//!
//! The heuristic lives behind the [`Relevance`] trait so orchestration never
//! depends on how the decision is made; a learned classifier can replace the
//! keyword/pattern version without touching the agent loop.

use crate::types::Query;
use regex::Regex;

/// Classification outcome. Carries only the in-domain verdict today; kept as
/// a struct so confidence or matched-rule metadata can be added without
/// changing the trait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    /// True when the query should be answered from the knowledge base
    pub in_domain: bool,
}

/// Predicate deciding whether a query is in-domain.
pub trait Relevance: Send + Sync {
    /// Classify a query. Pure; must not fail — ambiguous input defaults
    /// in-domain.
    fn classify(&self, query: &Query) -> Classification;
}

/// Vocabulary a community-platform question is expected to touch.
const DOMAIN_KEYWORDS: &[&str] = &[
    "server",
    "channel",
    "role",
    "permission",
    "webhook",
    "bot",
    "moderation",
    "moderator",
    "admin",
    "member",
    "invite",
    "guild",
    "embed",
    "slash command",
    "voice",
    "emoji",
    "audit log",
    "community",
];

/// Maximum words for the "too short to be a real question" rule.
const SHORT_QUERY_WORDS: usize = 3;

/// Length ceiling for the generic "what is X?" out-of-domain rule.
const GENERIC_WHAT_IS_MAX_LEN: usize = 100;

/// Keyword/pattern relevance classifier.
///
/// Decision order:
/// 1. Any domain keyword in the normalized query → in-domain (overrides
///    everything below).
/// 2. Greeting or ≤3 words → out-of-domain.
/// 3. First match in the ordered out-of-domain pattern list → out-of-domain.
/// 4. Otherwise in-domain (fail-open).
pub struct KeywordClassifier {
    greeting: Regex,
    out_of_domain: Vec<Regex>,
    generic_what_is: Regex,
}

impl KeywordClassifier {
    /// Compile the pattern set. Fails only if a hardcoded pattern is
    /// invalid, which would be a programming error caught by tests.
    pub fn new() -> anyhow::Result<Self> {
        let greeting = Regex::new(
            r"(?i)^(hi|hello|hey|yo|sup|thanks|thank you|good (morning|afternoon|evening))\b",
        )?;

        // Ordered: first match wins. Arithmetic first, then general-knowledge
        // question shapes, then education/program vocabulary.
        let out_of_domain = vec![
            Regex::new(r"(?i)^what is \d+\s*[-+*/]\s*\d+")?,
            Regex::new(r"(?i)^calculate")?,
            Regex::new(r"\d+\s*[-+*/]\s*\d+")?,
            Regex::new(r"(?i)^who is .*(president|prime minister|leader|ceo)")?,
            Regex::new(r"(?i)^when (did|was|is) .*(happen|occur|begin|built|founded)")?,
            Regex::new(r"(?i)^where (is|are|was|were) .*(located|found)")?,
            Regex::new(r"(?i)^how (many|much|long|far|old|tall)")?,
            Regex::new(r"(?i)(fellowship|university|college|school|course|degree|academy)")?,
        ];

        let generic_what_is = Regex::new(r"(?i)^what (is|are) .+$")?;

        Ok(Self {
            greeting,
            out_of_domain,
            generic_what_is,
        })
    }

    fn has_domain_keyword(&self, normalized: &str) -> bool {
        DOMAIN_KEYWORDS.iter().any(|kw| normalized.contains(kw))
    }
}

impl Relevance for KeywordClassifier {
    fn classify(&self, query: &Query) -> Classification {
        let text = &query.normalized;

        // Rule 1: domain vocabulary short-circuits everything else
        if self.has_domain_keyword(text) {
            return Classification { in_domain: true };
        }

        // Rule 2: greetings and fragments are not questions for the KB
        if self.greeting.is_match(text) || query.word_count() <= SHORT_QUERY_WORDS {
            return Classification { in_domain: false };
        }

        // Rule 3: explicit out-of-domain shapes, first match wins
        for pattern in &self.out_of_domain {
            if pattern.is_match(text) {
                return Classification { in_domain: false };
            }
        }

        // Short generic "what is X?" questions without domain vocabulary are
        // treated as general knowledge. This can misfire on domain questions
        // phrased that way; accepted as-is since intent is ambiguous.
        if self.generic_what_is.is_match(text) && text.len() < GENERIC_WHAT_IS_MAX_LEN {
            return Classification { in_domain: false };
        }

        // Rule 4: fail open
        Classification { in_domain: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn classifier() -> KeywordClassifier {
        KeywordClassifier::new().unwrap()
    }

    fn query(text: &str) -> Query {
        Query::new(text, BTreeMap::new())
    }

    #[test]
    fn test_domain_keyword_is_in_domain() {
        let c = classifier();
        assert!(c.classify(&query("how do I set up a webhook?")).in_domain);
        assert!(c.classify(&query("What permissions does a moderator need?")).in_domain);
    }

    #[test]
    fn test_domain_keyword_overrides_out_patterns() {
        let c = classifier();
        // Matches the "how many" general-knowledge shape, but mentions roles
        assert!(c.classify(&query("how many roles can a server have?")).in_domain);
    }

    #[test]
    fn test_greeting_is_out_of_domain() {
        let c = classifier();
        assert!(!c.classify(&query("hello there, how are you doing today")).in_domain);
        assert!(!c.classify(&query("thanks a lot for everything you did")).in_domain);
    }

    #[test]
    fn test_short_query_is_out_of_domain() {
        let c = classifier();
        assert!(!c.classify(&query("ok then what")).in_domain);
    }

    #[test]
    fn test_arithmetic_is_out_of_domain() {
        let c = classifier();
        assert!(!c.classify(&query("what is 2+2")).in_domain);
        assert!(!c.classify(&query("please calculate 144 / 12 for me")).in_domain);
    }

    #[test]
    fn test_general_knowledge_is_out_of_domain() {
        let c = classifier();
        assert!(!c.classify(&query("who is the president of france right now")).in_domain);
        assert!(!c.classify(&query("when did the second world war begin exactly")).in_domain);
    }

    #[test]
    fn test_generic_what_is_under_threshold_is_out_of_domain() {
        let c = classifier();
        assert!(!c.classify(&query("what is the tej fellowship program about")).in_domain);
    }

    #[test]
    fn test_unmatched_defaults_in_domain() {
        let c = classifier();
        // No domain keyword, no pattern match, longer than three words
        assert!(c.classify(&query("my friends keep losing access after the last update happened")).in_domain);
    }
}
