//! Season/episode heuristics over free-form titles.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Season and episode parsed from a title.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeInfo {
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// Text before the season/episode marker, if any.
    pub series_title: Option<String>,
}

static SXXEYY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bS(\d{1,3})\s*[:.\-]?\s*E(\d{1,4})\b").unwrap());
static NXM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(\d{1,2})x(\d{1,3})\b").unwrap());
static SEASON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:season|staffel|saison|temporada)\s*(\d{1,3})").unwrap());
static EPISODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:\bepisode|\bep\.?|\bfolge|\bépisode|\bepisodio)\s*(\d{1,4})\b").unwrap()
});

/// Separators a site appends before its own name in `document.title`.
const TITLE_SEPARATORS: &[&str] = &[" | ", " - ", " \u{2013} ", " \u{2014} ", " · "];

/// Parse season/episode markers out of `title`.
///
/// Recognises `S01E02`, `1x02`, `Season 1`, `Episode 2`, `Ep. 2`, `Folge 2`.
/// Returns `None` when no marker is present.
pub fn infer_episode_info(title: &str) -> Option<EpisodeInfo> {
    let mut info = EpisodeInfo::default();
    let mut first_marker: Option<usize> = None;
    let mut note = |start: usize| {
        first_marker = Some(first_marker.map_or(start, |m| m.min(start)));
    };

    if let Some(caps) = SXXEYY.captures(title) {
        info.season = caps.get(1).and_then(|m| m.as_str().parse().ok());
        info.episode = caps.get(2).and_then(|m| m.as_str().parse().ok());
        note(caps.get(0).map_or(0, |m| m.start()));
    } else if let Some(caps) = NXM.captures(title) {
        info.season = caps.get(1).and_then(|m| m.as_str().parse().ok());
        info.episode = caps.get(2).and_then(|m| m.as_str().parse().ok());
        note(caps.get(0).map_or(0, |m| m.start()));
    }

    if info.season.is_none() {
        if let Some(caps) = SEASON.captures(title) {
            info.season = caps.get(1).and_then(|m| m.as_str().parse().ok());
            note(caps.get(0).map_or(0, |m| m.start()));
        }
    }
    if info.episode.is_none() {
        if let Some(caps) = EPISODE.captures(title) {
            info.episode = caps.get(1).and_then(|m| m.as_str().parse().ok());
            note(caps.get(0).map_or(0, |m| m.start()));
        }
    }

    if info.season.is_none() && info.episode.is_none() {
        return None;
    }

    info.series_title = first_marker
        .map(|pos| trim_separators(&title[..pos]))
        .filter(|s| !s.is_empty());
    Some(info)
}

/// Whether `title` carries any season/episode marker.
pub fn looks_episodic(title: &str) -> bool {
    SXXEYY.is_match(title) || NXM.is_match(title) || SEASON.is_match(title) || EPISODE.is_match(title)
}

/// Strip a trailing site name (`"Show | Netflix"` → `"Show"`) and a leading
/// `"Watch "`.
///
/// The last segment is kept when it looks like an episode marker, so
/// `"Show - Episode 3"` survives intact.
pub fn clean_document_title(title: &str) -> String {
    let mut title = title.trim();
    if let Some(rest) = title.strip_prefix("Watch ") {
        title = rest.trim_start();
    }

    let cut = TITLE_SEPARATORS
        .iter()
        .filter_map(|sep| title.rfind(sep).map(|pos| (pos, sep.len())))
        .max_by_key(|(pos, _)| *pos);

    if let Some((pos, sep_len)) = cut {
        let tail = &title[pos + sep_len..];
        if pos > 0 && !looks_episodic(tail) {
            return title[..pos].trim().to_string();
        }
    }
    title.to_string()
}

fn trim_separators(s: &str) -> String {
    s.trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | ':' | '|' | ',' | '.' | '\u{2013}' | '\u{2014}' | '('))
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sxxeyy() {
        let info = infer_episode_info("The Office S03E12 - The Convict").unwrap();
        assert_eq!(info.season, Some(3));
        assert_eq!(info.episode, Some(12));
        assert_eq!(info.series_title.as_deref(), Some("The Office"));
    }

    #[test]
    fn test_nxm() {
        let info = infer_episode_info("Dark 2x04").unwrap();
        assert_eq!(info.season, Some(2));
        assert_eq!(info.episode, Some(4));
    }

    #[test]
    fn test_words() {
        let info = infer_episode_info("Frieren: Season 1 Episode 7").unwrap();
        assert_eq!(info.season, Some(1));
        assert_eq!(info.episode, Some(7));
        assert_eq!(info.series_title.as_deref(), Some("Frieren"));

        let info = infer_episode_info("Tatort Folge 1200").unwrap();
        assert_eq!(info.season, None);
        assert_eq!(info.episode, Some(1200));
    }

    #[test]
    fn test_no_marker() {
        assert!(infer_episode_info("Inception").is_none());
        assert!(!looks_episodic("Inception"));
        assert!(looks_episodic("Show Ep. 3"));
    }

    #[test]
    fn test_resolution_is_not_nxm() {
        assert!(infer_episode_info("Trailer 1920x1080").is_none());
    }

    #[test]
    fn test_clean_document_title() {
        assert_eq!(clean_document_title("Breaking Bad | Netflix"), "Breaking Bad");
        assert_eq!(clean_document_title("Watch Dune - Prime Video"), "Dune");
        assert_eq!(clean_document_title("Show - Episode 3"), "Show - Episode 3");
        assert_eq!(clean_document_title("Plain"), "Plain");
    }
}
