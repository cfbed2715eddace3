//! FAQ matching for inbound texts
//!
//! Two passes over normalized text: whole-question containment for messages
//! that quote a configured question, then token overlap for paraphrases
//! ("hours?" against "What are your hours?"). Overlap is scored against the
//! question's significant tokens only, so filler words never carry a match.

use std::collections::HashSet;

use crate::db::Faq;

/// Words ignored when scoring token overlap
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "can", "do", "does", "for", "how", "i", "in", "is", "it", "my", "of",
    "on", "or", "the", "to", "u", "we", "what", "when", "where", "you", "your",
];

/// Lowercase the text, strip punctuation, and collapse whitespace.
#[must_use]
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c.is_alphanumeric() {
            for lc in c.to_lowercase() {
                out.push(lc);
            }
        } else if !out.ends_with(' ') {
            out.push(' ');
        }
    }
    out.trim().to_string()
}

fn significant_tokens(normalized: &str) -> Vec<&str> {
    normalized
        .split_whitespace()
        .filter(|t| !STOPWORDS.contains(t))
        .collect()
}

/// Find the best-matching FAQ for an inbound message, if any.
///
/// Containment of a whole normalized question wins immediately. Otherwise
/// a FAQ matches when at least three fifths of its significant tokens
/// appear in the message. The densest match wins, longer questions beat
/// shorter ones at equal density, and position order breaks what remains.
#[must_use]
pub fn best_match<'a>(text: &str, faqs: &'a [Faq]) -> Option<&'a Faq> {
    let text_norm = normalize(text);
    if text_norm.is_empty() {
        return None;
    }
    let text_tokens: HashSet<&str> = text_norm.split_whitespace().collect();

    let mut best: Option<(&Faq, usize, usize)> = None;
    for faq in faqs {
        let q_norm = normalize(&faq.question);
        if q_norm.is_empty() {
            continue;
        }

        if text_norm.contains(&q_norm) {
            return Some(faq);
        }

        let q_tokens = significant_tokens(&q_norm);
        let total = q_tokens.len();
        if total == 0 {
            continue;
        }
        let overlap = q_tokens
            .iter()
            .filter(|t| text_tokens.contains(*t))
            .count();
        if overlap * 5 < total * 3 {
            continue;
        }

        // Compare overlap ratios without floats: a/b > c/d iff a*d > c*b.
        let better = match best {
            None => true,
            Some((_, best_overlap, best_total)) => {
                let lhs = overlap * best_total;
                let rhs = best_overlap * total;
                lhs > rhs || (lhs == rhs && overlap > best_overlap)
            }
        };
        if better {
            best = Some((faq, overlap, total));
        }
    }

    best.map(|(faq, _, _)| faq)
}
