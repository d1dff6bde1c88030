//! Template engine — `{{variable}}` substitution with fallback chains.
//!
//! A placeholder body containing `|` is a fallback chain: each segment is
//! tried in order against the value map, first non-empty value wins.
//! Every segment is a variable *name* lookup — a quoted segment like
//! `"friend"` is looked up with its quotes intact, never resolved as a
//! string constant (upstream-compatible behavior).
//!
//! Hand-rolled scanner, no template crate — same spirit as the in-house
//! cron parser.

use std::collections::HashMap;

/// All candidate variable names in a template, in order of first
/// appearance, deduplicated. Chain placeholders contribute every segment.
pub fn parse_variables(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    for body in placeholder_bodies(template) {
        for name in body.split('|').map(str::trim) {
            if !name.is_empty() && !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
    }
    names
}

/// Render a template. Plain placeholders missing from `values` (and
/// chains where no candidate resolves) fall back to `fallback`.
pub fn apply(template: &str, values: &HashMap<String, String>, fallback: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let body = &after[..end];
                out.push_str(&resolve(body, values, fallback));
                rest = &after[end + 2..];
            }
            None => {
                // Unterminated placeholder: emit verbatim
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Variables that would not render: plain placeholders absent or empty in
/// `values`; chains where *no* candidate resolves (reported by their
/// first candidate name).
pub fn missing_variables(template: &str, values: &HashMap<String, String>) -> Vec<String> {
    let mut missing = Vec::new();
    for body in placeholder_bodies(template) {
        let candidates: Vec<&str> = body.split('|').map(str::trim).collect();
        let resolved = candidates
            .iter()
            .any(|name| values.get(*name).is_some_and(|v| !v.is_empty()));
        if !resolved
            && let Some(first) = candidates.first().filter(|n| !n.is_empty())
            && !missing.iter().any(|m| m == first)
        {
            missing.push(first.to_string());
        }
    }
    missing
}

/// Render a preview, synthesizing a bracketed `[name]` sample for every
/// variable the sample map leaves unresolved.
pub fn sample_preview(template: &str, samples: &HashMap<String, String>) -> String {
    let mut filled = samples.clone();
    for name in missing_variables(template, samples) {
        filled.insert(name.clone(), format!("[{name}]"));
    }
    apply(template, &filled, "")
}

/// Resolve one placeholder body against the value map.
fn resolve(body: &str, values: &HashMap<String, String>, fallback: &str) -> String {
    for name in body.split('|').map(str::trim) {
        if let Some(value) = values.get(name)
            && !value.is_empty()
        {
            return value.clone();
        }
    }
    fallback.to_string()
}

/// Iterate `{{…}}` bodies left to right.
fn placeholder_bodies(template: &str) -> Vec<&str> {
    let mut bodies = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                bodies.push(&after[..end]);
                rest = &after[end + 2..];
            }
            None => break,
        }
    }
    bodies
}
