//! Prompt assembly and citation extraction.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::mode::Mode;
use crate::search::SearchResult;

/// A `[n]` marker in the answer paired with the source it points at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    /// Marker number as written in the answer (1-based)
    pub marker: usize,
    /// URL of the n-th search result
    pub url: String,
}

/// Render search results as the context block appended to the system prompt.
///
/// Empty when there are no results.
pub fn search_context(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return String::new();
    }
    let blocks: Vec<String> = results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {} — {}\n\"{}\"", i + 1, r.title, r.url, r.snippet))
        .collect();
    format!("\n\nRelevant Web Results:\n{}", blocks.join("\n\n"))
}

/// Build the full prompt sent to the model.
pub fn assemble_prompt(mode: Mode, results: &[SearchResult], input: &str) -> String {
    format!(
        "{}\n{}\n\nUser input: {}\nVeritas:",
        mode.system_prompt(),
        search_context(results),
        input
    )
}

fn marker_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(\d{1,3})\]").expect("citation pattern is valid"))
}

/// Pair each `[n]` marker in `text` with the n-th result's URL.
///
/// Markers are reported once each, in order of first appearance. Markers
/// with no matching result are dropped.
pub fn extract_citations(text: &str, results: &[SearchResult]) -> Vec<Citation> {
    let mut seen = HashSet::new();
    marker_regex()
        .captures_iter(text)
        .filter_map(|caps| caps[1].parse::<usize>().ok())
        .filter(|n| *n >= 1 && *n <= results.len())
        .filter(|n| seen.insert(*n))
        .map(|n| Citation {
            marker: n,
            url: results[n - 1].url.clone(),
        })
        .collect()
}
