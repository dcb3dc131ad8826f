// Text Processing Service
// Normalization, sentence splitting and the stylometric statistics the text detector scores

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Phrases that show up far more often in assistant-written prose than in casual human writing.
pub const FILLER_PHRASES: &[&str] = &[
    "it is important to note",
    "it's important to note",
    "it is worth noting",
    "it's worth noting",
    "in today's fast-paced",
    "in today's digital",
    "plays a crucial role",
    "plays a vital role",
    "a testament to",
    "navigate the complexities",
    "delve into",
    "delves into",
    "rich tapestry",
    "in conclusion",
    "in summary",
    "overall,",
    "furthermore,",
    "moreover,",
    "additionally,",
    "ultimately,",
    "when it comes to",
    "a wide range of",
    "embark on",
    "unlock the potential",
    "seamlessly",
    "ever-evolving",
    "game-changer",
    "as an ai",
];

const TRANSITION_OPENERS: &[&str] = &[
    "furthermore",
    "moreover",
    "additionally",
    "however",
    "overall",
    "firstly",
    "secondly",
    "thirdly",
    "finally",
    "ultimately",
    "lastly",
    "consequently",
];

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9']+|[\u{4e00}-\u{9fff}]").expect("word regex"))
}

fn sentence_end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[.!?。！？]+(\s+|$)").expect("sentence regex"))
}

fn space_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t\x0C\x0B\u{3000}\u{00A0}]+").expect("space regex"))
}

/// Normalize punctuation and whitespace so statistics are not skewed by typography
pub fn normalize_text(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let s = text
        .replace(['\u{201c}', '\u{201d}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
        .replace("\r\n", "\n")
        .replace('\r', "\n");
    let s = space_re().replace_all(&s, " ");

    s.lines().map(|ln| ln.trim()).collect::<Vec<_>>().join("\n").trim().to_string()
}

pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in sentence_end_re().find_iter(text) {
        let s = text[start..m.end()].trim();
        if !s.is_empty() {
            sentences.push(s);
        }
        start = m.end();
    }
    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

pub fn words(text: &str) -> Vec<&str> {
    word_re().find_iter(text).map(|m| m.as_str()).collect()
}

fn split_paragraphs(text: &str) -> Vec<&str> {
    text.split("\n\n").map(|p| p.trim()).filter(|p| !p.is_empty()).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TextStatistics {
    pub char_count: usize,
    pub word_count: usize,
    pub sentence_count: usize,
    /// Coefficient of variation of sentence lengths in words; `None` below three sentences.
    pub burstiness: Option<f64>,
    /// Type-token ratio over lowercased words.
    pub ttr: f64,
    /// Filler-phrase hits per 100 words.
    pub filler_density: f64,
    pub filler_hits: usize,
    /// Share of paragraphs opening with a stock transition; `None` below three paragraphs.
    pub opener_uniformity: Option<f64>,
    pub ngram_repeat_rate: f64,
}

pub fn sentence_burstiness(sentences: &[&str]) -> Option<f64> {
    if sentences.len() < 3 {
        return None;
    }
    let lengths: Vec<f64> = sentences.iter().map(|s| words(s).len() as f64).collect();
    let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
    if mean <= 0.0 {
        return None;
    }
    let var = lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / lengths.len() as f64;
    Some(var.sqrt() / mean)
}

pub fn type_token_ratio(tokens: &[String]) -> f64 {
    if tokens.is_empty() {
        return 0.0;
    }
    let unique: HashSet<&str> = tokens.iter().map(|t| t.as_str()).collect();
    unique.len() as f64 / tokens.len() as f64
}

pub fn filler_hits(lowered: &str) -> usize {
    FILLER_PHRASES.iter().map(|p| lowered.matches(p).count()).sum()
}

fn opener_uniformity(paragraphs: &[&str]) -> Option<f64> {
    if paragraphs.len() < 3 {
        return None;
    }
    let stock = paragraphs
        .iter()
        .filter(|p| {
            let lowered = p.to_lowercase();
            let first = lowered
                .split(|c: char| c.is_whitespace() || c == ',')
                .next()
                .unwrap_or_default();
            TRANSITION_OPENERS.contains(&first)
        })
        .count();
    Some(stock as f64 / paragraphs.len() as f64)
}

fn ngram_repeat_rate(tokens: &[String], n: usize) -> f64 {
    if n == 0 || tokens.len() < n + 1 {
        return 0.0;
    }
    let mut counts: HashMap<&[String], usize> = HashMap::new();
    for window in tokens.windows(n) {
        *counts.entry(window).or_insert(0) += 1;
    }
    let total = tokens.len() - n + 1;
    let repeats = counts.values().filter(|&&c| c >= 2).map(|&c| c - 1).sum::<usize>();
    repeats as f64 / total as f64
}

pub fn compute_text_statistics(text: &str) -> TextStatistics {
    let text = normalize_text(text);
    if text.is_empty() {
        return TextStatistics::default();
    }
    let lowered = text.to_lowercase();
    let tokens: Vec<String> = words(&lowered).into_iter().map(|w| w.to_string()).collect();
    let sentences = split_sentences(&text);
    let paragraphs = split_paragraphs(&text);
    let hits = filler_hits(&lowered);

    TextStatistics {
        char_count: text.chars().count(),
        word_count: tokens.len(),
        sentence_count: sentences.len(),
        burstiness: sentence_burstiness(&sentences),
        ttr: type_token_ratio(&tokens),
        filler_density: hits as f64 * 100.0 / tokens.len().max(1) as f64,
        filler_hits: hits,
        opener_uniformity: opener_uniformity(&paragraphs),
        ngram_repeat_rate: ngram_repeat_rate(&tokens, 3),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        let out = normalize_text("  \u{201c}Hi\u{201d}\u{00A0}there\r\n  next\tline  ");
        assert_eq!(out, "\"Hi\" there\nnext line");
    }

    #[test]
    fn test_split_sentences() {
        let s = split_sentences("One two. Three four five! Six? Trailing");
        assert_eq!(s, vec!["One two.", "Three four five!", "Six?", "Trailing"]);
        // Decimal points are not sentence ends.
        assert_eq!(split_sentences("Pi is 3.14 roughly.").len(), 1);
    }

    #[test]
    fn test_uniform_sentences_have_low_burstiness() {
        let even = ["a b c d e.", "f g h i j.", "k l m n o."];
        assert_eq!(sentence_burstiness(&even), Some(0.0));
        let uneven = ["a.", "b c d e f g h i j k l m.", "n o."];
        assert!(sentence_burstiness(&uneven).unwrap() > 0.8);
        assert_eq!(sentence_burstiness(&even[..2]), None);
    }

    #[test]
    fn test_type_token_ratio() {
        let tokens: Vec<String> = ["the", "cat", "the", "hat"].iter().map(|s| s.to_string()).collect();
        assert_eq!(type_token_ratio(&tokens), 0.75);
        assert_eq!(type_token_ratio(&[]), 0.0);
    }

    #[test]
    fn test_filler_phrases_are_counted() {
        let stats = compute_text_statistics(
            "It is important to note that this plays a crucial role. Furthermore, we delve into details.",
        );
        assert_eq!(stats.filler_hits, 4);
        assert!(stats.filler_density > 20.0);
    }

    #[test]
    fn test_opener_uniformity() {
        let text = "Furthermore, one.\n\nMoreover, two.\n\nI went home.\n\nOverall, done.";
        let stats = compute_text_statistics(text);
        assert_eq!(stats.opener_uniformity, Some(0.75));
    }

    #[test]
    fn test_repeated_trigrams() {
        let tokens: Vec<String> = "a b c a b c".split(' ').map(|s| s.to_string()).collect();
        assert!((ngram_repeat_rate(&tokens, 3) - 0.25).abs() < 1e-12);
    }
}
