use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::models::ProfileCandidate;

/// Keys that mark a JSON object as a possible social profile.
const PROFILE_MARKER_KEYS: &[&str] = &["profileId", "displayName"];

const MAX_SCAN_DEPTH: usize = 4;

fn assignment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"window\.[A-Za-z_$][\w$]*\s*=\s*").expect("assignment pattern is valid")
    })
}

fn json_parse_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"JSON\.parse\(\s*"((?:[^"\\]|\\.)*)"\s*\)"#)
            .expect("JSON.parse pattern is valid")
    })
}

/// Scan a logged-in page for embedded profile objects.
///
/// Looks at every `<script>` element for `window.NAME = {...}` assignments and
/// `JSON.parse("...")` calls, then walks the decoded JSON for objects carrying
/// profile keys. Each call starts from scratch; no match state is kept.
pub fn discover_profiles(page: &str) -> Vec<ProfileCandidate> {
    let document = Html::parse_document(page);
    let Ok(script_selector) = Selector::parse("script") else {
        return Vec::new();
    };

    let mut candidates = Vec::new();

    for script in document.select(&script_selector) {
        let text: String = script.text().collect();
        for value in embedded_json_values(&text) {
            collect_profiles(value, 0, &mut candidates);
        }
    }

    candidates
}

fn embedded_json_values(script: &str) -> Vec<Value> {
    let mut values = Vec::new();

    for assignment in assignment_regex().find_iter(script) {
        let rest = &script[assignment.end()..];
        if let Some(value) = first_json_value(rest) {
            values.push(value);
        }
    }

    for captures in json_parse_regex().captures_iter(script) {
        let Some(literal) = captures.get(1) else {
            continue;
        };
        let Ok(decoded) = serde_json::from_str::<String>(&format!("\"{}\"", literal.as_str()))
        else {
            continue;
        };
        if let Ok(value) = serde_json::from_str::<Value>(&decoded) {
            values.push(value);
        }
    }

    values
}

fn first_json_value(text: &str) -> Option<Value> {
    let trimmed = text.trim_start();
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        return None;
    }

    serde_json::Deserializer::from_str(trimmed)
        .into_iter::<Value>()
        .next()
        .and_then(|parsed| parsed.ok())
}

fn collect_profiles(value: Value, depth: usize, out: &mut Vec<ProfileCandidate>) {
    if depth > MAX_SCAN_DEPTH {
        return;
    }

    match value {
        Value::Object(map) => {
            let looks_like_profile = PROFILE_MARKER_KEYS.iter().any(|key| map.contains_key(*key));
            if looks_like_profile {
                if let Some(candidate) = ProfileCandidate::from_value(Value::Object(map)) {
                    out.push(candidate);
                }
                return;
            }

            for (_, child) in map {
                collect_profiles(child, depth + 1, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_profiles(item, depth + 1, out);
            }
        }
        _ => {}
    }
}
