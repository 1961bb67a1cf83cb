//! Local search over downloaded content

use crate::content::{Deity, Stotra};

const HONORIFICS: [&str; 6] = ["sri", "shri", "lord", "goddess", "devi", "swami"];

const KNOWN_NAMES: [&str; 14] = [
    "rama",
    "krishna",
    "shiva",
    "vishnu",
    "ganesha",
    "ganesh",
    "hanuman",
    "lakshmi",
    "saraswati",
    "durga",
    "kali",
    "venkateswara",
    "venkatesh",
    "balaji",
];

/// Lowercase, drop leading honorifics, keep only `[a-z0-9]`
pub fn normalize_text(text: &str) -> String {
    let mut normalized = text.trim().to_lowercase();

    for prefix in HONORIFICS {
        if let Some(rest) = normalized.strip_prefix(prefix) {
            normalized = rest.trim_start().to_string();
        }
    }

    normalized.chars().filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit()).collect()
}

/// Split a query into known deity names, or the whole normalized query
///
/// `"ramakrishna"` yields `["rama", "krishna"]`.
pub fn tokenize_query(query: &str) -> Vec<String> {
    let normalized = normalize_text(query);
    if normalized.is_empty() {
        return Vec::new();
    }

    let tokens: Vec<String> = KNOWN_NAMES
        .iter()
        .filter(|name| normalized.contains(*name))
        .map(|name| name.to_string())
        .collect();

    if tokens.is_empty() {
        vec![normalized]
    } else {
        tokens
    }
}

/// Deities matching a query
///
/// Plain substring matches on either name win outright. Otherwise deities are
/// ranked by how many query tokens their normalized names contain.
pub fn search_deities<'a>(deities: &'a [Deity], query: &str) -> Vec<&'a Deity> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return deities.iter().collect();
    }

    let substring: Vec<&Deity> = deities
        .iter()
        .filter(|d| {
            d.name.to_lowercase().contains(&needle)
                || d.name_english.to_lowercase().contains(&needle)
        })
        .collect();
    if !substring.is_empty() {
        return substring;
    }

    let tokens = tokenize_query(query);
    let mut ranked: Vec<(usize, &Deity)> = deities
        .iter()
        .filter_map(|d| {
            let name = normalize_text(&d.name);
            let english = normalize_text(&d.name_english);
            let hits = tokens
                .iter()
                .filter(|t| name.contains(t.as_str()) || english.contains(t.as_str()))
                .count();
            (hits > 0).then_some((hits, d))
        })
        .collect();

    ranked.sort_by(|a, b| b.0.cmp(&a.0));
    ranked.into_iter().map(|(_, d)| d).collect()
}

/// Stotras whose title or English title contains the query
pub fn search_stotras<'a>(stotras: &'a [Stotra], query: &str) -> Vec<&'a Stotra> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return stotras.iter().collect();
    }

    stotras
        .iter()
        .filter(|s| {
            s.title.to_lowercase().contains(&needle)
                || s.title_english.to_lowercase().contains(&needle)
        })
        .collect()
}
