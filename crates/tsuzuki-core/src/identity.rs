//! Deterministic content keys.
//!
//! A key names a piece of content independent of the page it was watched on:
//! every episode of a series shares one key per platform, a movie has its own.

use crate::models::{ContentType, PlaybackMetadata};
use crate::normalize::{identity_text, strip_query};

/// Prefix shared by every progress key in the store.
pub const KEY_PREFIX: &str = "content_";

/// 32-bit rolling hash (`h = h * 31 + unit`, wrapping) over UTF-16 code units.
pub fn rolling_hash(s: &str) -> i32 {
    s.encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(i32::from(unit)))
}

fn key_from(base: &str) -> String {
    format!("{KEY_PREFIX}{}", rolling_hash(base).unsigned_abs())
}

/// Key for `(platform, content_type, title)`, after normalization.
pub fn content_key(platform: &str, content_type: ContentType, title: &str) -> String {
    key_from(&format!(
        "{}_{}_{}",
        identity_text(platform),
        content_type.as_str(),
        identity_text(title)
    ))
}

/// Key for a metadata snapshot.
///
/// Uses the series title for episodes and the title otherwise. If the title
/// normalizes to nothing, the query-stripped URL stands in for it.
pub fn content_key_for(meta: &PlaybackMetadata) -> String {
    let title = meta.identity_title();
    if identity_text(title).is_empty() {
        return content_key(&meta.platform, meta.content_type, strip_query(&meta.url));
    }
    content_key(&meta.platform, meta.content_type, title)
}

/// Keys that older derivations produced for the same episode.
///
/// Earlier versions keyed episodes by page URL, by the raw (per-episode) title,
/// or by title plus season/episode suffix. Those records are superseded by the
/// series-level key and get migrated away on save.
pub fn legacy_keys(meta: &PlaybackMetadata) -> Vec<String> {
    if meta.content_type != ContentType::Episode {
        return Vec::new();
    }
    let platform = identity_text(&meta.platform);
    let mut keys = vec![
        key_from(strip_query(&meta.url)),
        key_from(&format!("{platform}_{}", meta.title)),
        key_from(&format!(
            "{platform}_{}_s{}e{}",
            identity_text(&meta.title),
            meta.season_number.map(|n| n.to_string()).unwrap_or_default(),
            meta.episode_number.map(|n| n.to_string()).unwrap_or_default(),
        )),
    ];
    if !meta.original_title.is_empty() && meta.original_title != meta.title {
        keys.push(key_from(&format!("{platform}_{}", meta.original_title)));
    }

    let current = content_key_for(meta);
    keys.retain(|k| *k != current);
    keys.sort();
    keys.dedup();
    keys
}

/// Fingerprint of what is playing. Only the URL's query string is ignored.
pub fn metadata_signature(meta: &PlaybackMetadata) -> String {
    let number = |n: Option<u32>| n.map(|n| n.to_string()).unwrap_or_default();
    [
        meta.platform.as_str(),
        meta.content_type.as_str(),
        meta.series_title.as_deref().unwrap_or_default(),
        meta.title.as_str(),
        meta.episode_name.as_deref().unwrap_or_default(),
        &format!("s{}", number(meta.season_number)),
        &format!("e{}", number(meta.episode_number)),
        strip_query(&meta.url),
    ]
    .join("|")
    .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(series: &str, season: u32, ep: u32) -> PlaybackMetadata {
        PlaybackMetadata {
            title: format!("{series} S{season:02}E{ep:02}"),
            original_title: String::new(),
            series_title: Some(series.into()),
            platform: "Netflix".into(),
            content_type: ContentType::Episode,
            season_number: Some(season),
            episode_number: Some(ep),
            url: format!("https://www.netflix.com/watch/{season}{ep}?trackId=1"),
            ..Default::default()
        }
    }

    #[test]
    fn test_rolling_hash_known_values() {
        assert_eq!(rolling_hash(""), 0);
        assert_eq!(rolling_hash("a"), 97);
        assert_eq!(rolling_hash("ab"), 97 * 31 + 98);
        // Same as Java's "hello".hashCode().
        assert_eq!(rolling_hash("hello"), 99_162_322);
    }

    #[test]
    fn test_hash_wraps_and_abs_is_safe() {
        let long = "x".repeat(1000);
        let key = key_from(&long);
        assert!(key.starts_with(KEY_PREFIX));
        assert!(key[KEY_PREFIX.len()..].parse::<u64>().is_ok());
    }

    #[test]
    fn test_key_is_deterministic() {
        let a = content_key("Netflix", ContentType::Episode, "The Office");
        let b = content_key("netflix", ContentType::Episode, "the office!");
        assert_eq!(a, b);
        assert_eq!(a, content_key("Netflix", ContentType::Episode, "The Office"));
        assert_ne!(a, content_key("Netflix", ContentType::Movie, "The Office"));
        assert_ne!(a, content_key("Hulu", ContentType::Episode, "The Office"));
    }

    #[test]
    fn test_episodes_share_series_key() {
        assert_eq!(content_key_for(&episode("Show", 1, 2)), content_key_for(&episode("Show", 1, 3)));
    }

    #[test]
    fn test_empty_title_falls_back_to_url() {
        let meta = PlaybackMetadata {
            title: "!!!".into(),
            platform: "Example".into(),
            url: "https://example.com/v/1?x=1".into(),
            ..Default::default()
        };
        assert_eq!(
            content_key_for(&meta),
            content_key("Example", ContentType::Movie, "https://example.com/v/1")
        );
    }

    #[test]
    fn test_legacy_keys() {
        let meta = episode("Show", 1, 2);
        let legacy = legacy_keys(&meta);
        assert!(!legacy.is_empty());
        assert!(!legacy.contains(&content_key_for(&meta)));
        assert!(legacy.contains(&key_from("https://www.netflix.com/watch/12")));

        let movie = PlaybackMetadata {
            title: "Dune".into(),
            ..Default::default()
        };
        assert!(legacy_keys(&movie).is_empty());
    }

    #[test]
    fn test_signature_ignores_query_string() {
        let mut meta = PlaybackMetadata {
            title: "Show".into(),
            platform: "Netflix".into(),
            content_type: ContentType::Episode,
            season_number: Some(1),
            episode_number: Some(2),
            url: "https://www.netflix.com/watch/1?trackId=1".into(),
            ..Default::default()
        };
        let a = metadata_signature(&meta);
        meta.url = "https://www.netflix.com/watch/1?trackId=99&t=5".into();
        assert_eq!(a, metadata_signature(&meta));

        meta.episode_number = Some(3);
        assert_ne!(a, metadata_signature(&meta));
        assert!(a.contains("|s1|e2|"));
    }
}
