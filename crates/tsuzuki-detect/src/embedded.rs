//! Tolerant parsing of data blobs embedded in pages (JSON-LD, hydration
//! state assigned to `window`).

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use tracing::debug;

use crate::dom::Dom;
use crate::scanner::Scanner;

static ASSIGNMENT_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:window\.)?[A-Za-z_$][\w$.]*\s*=\s*").unwrap());
static BARE_LITERALS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(:\s*|\[\s*|,\s*)(?:undefined|NaN|-?Infinity)\b").unwrap());
static TRAILING_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",(\s*[}\]])").unwrap());

/// Parse a blob: raw first, then a sanitized retry, otherwise `None`.
pub fn parse_blob(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match serde_json::from_str(trimmed) {
        Ok(value) => return Some(value),
        Err(e) => debug!(error = %e, "Raw blob parse failed, retrying sanitized"),
    }
    let sanitized = sanitize(trimmed);
    match serde_json::from_str(&sanitized) {
        Ok(value) => Some(value),
        Err(e) => {
            debug!(error = %e, "Sanitized blob parse failed, ignoring blob");
            None
        }
    }
}

/// Rewrite JavaScript-literal quirks into JSON.
fn sanitize(raw: &str) -> String {
    let body = ASSIGNMENT_PREFIX.replace(raw, "");
    let body = body.trim().trim_end_matches(';').trim_end();
    let body = BARE_LITERALS.replace_all(body, "${1}null");
    TRAILING_COMMA.replace_all(&body, "$1").into_owned()
}

/// Fields of interest from a schema.org `Movie`/`TVEpisode` description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkedData {
    pub name: Option<String>,
    pub series_name: Option<String>,
    pub episode_number: Option<u32>,
    pub season_number: Option<u32>,
    pub is_episode: bool,
}

impl LinkedData {
    /// Read the first JSON-LD script on the page that describes a video.
    pub fn from_page(dom: &dyn Dom) -> Option<Self> {
        Scanner::new(dom).find_first_match(&["script[type='application/ld+json']"], |el| {
            let value = parse_blob(&dom.text_content(el)?)?;
            Self::from_value(&value)
        })
    }

    /// Interpret a parsed blob; arrays and `@graph` wrappers are searched.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Array(items) => items.iter().find_map(Self::from_value),
            Value::Object(map) => {
                if let Some(graph) = map.get("@graph") {
                    if let Some(found) = Self::from_value(graph) {
                        return Some(found);
                    }
                }
                let kind = map.get("@type").and_then(Value::as_str).unwrap_or_default();
                if !matches!(kind, "Movie" | "TVEpisode" | "Episode" | "VideoObject" | "TVSeries") {
                    return None;
                }
                let is_episode = matches!(kind, "TVEpisode" | "Episode");
                let series_name = map
                    .get("partOfSeries")
                    .and_then(|s| s.get("name"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or_else(|| {
                        (kind == "TVSeries")
                            .then(|| map.get("name").and_then(Value::as_str).map(str::to_string))
                            .flatten()
                    });
                let season_number = map
                    .get("partOfSeason")
                    .and_then(|s| s.get("seasonNumber"))
                    .and_then(number_field);
                Some(Self {
                    name: map.get("name").and_then(Value::as_str).map(str::to_string),
                    series_name,
                    episode_number: map.get("episodeNumber").and_then(number_field),
                    season_number,
                    is_episode,
                })
            }
            _ => None,
        }
    }
}

/// Accept both `3` and `"3"`.
fn number_field(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
