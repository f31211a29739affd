use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use tsuzuki_detect::ContentType;

use tsuzuki_detect::episode;

/// What is playing, as composed from the page at one save attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackMetadata {
    pub title: String,
    /// Title as first read, before cleaning.
    #[serde(default)]
    pub original_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_name: Option<String>,
    pub platform: String,
    #[serde(default)]
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_number: Option<u32>,
    pub url: String,
    #[serde(default)]
    pub is_from_embedded_frame: bool,
}

impl PlaybackMetadata {
    /// Episode number, season number or a non-empty episode name is present.
    pub fn has_episode_markers(&self) -> bool {
        self.episode_number.is_some()
            || self.season_number.is_some()
            || self.episode_name.as_deref().is_some_and(|n| !n.trim().is_empty())
    }

    /// Promote to [`ContentType::Episode`] when episode markers are present.
    pub fn escalate_content_type(&mut self) {
        if self.has_episode_markers() {
            self.content_type = ContentType::Episode;
        }
    }

    /// Title the content is identified by: the series for episodes, otherwise
    /// the title itself.
    pub fn identity_title(&self) -> &str {
        match (self.content_type, self.series_title.as_deref()) {
            (ContentType::Episode, Some(series)) if !series.trim().is_empty() => series,
            _ => &self.title,
        }
    }
}

/// One persisted progress entry, keyed by its content key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredProgressRecord {
    pub content_key: String,
    pub url: String,
    pub title: String,
    pub current_time: f64,
    pub duration: f64,
    pub percent_complete: f64,
    #[serde(rename = "lastWatchedTimestamp", with = "chrono::serde::ts_milliseconds")]
    pub last_watched: DateTime<Utc>,
    pub platform: String,
    pub content_type: ContentType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_title: Option<String>,
}

impl StoredProgressRecord {
    /// Has episode/season numbers, an episode name or an episodic title.
    pub fn looks_episodic(&self) -> bool {
        self.episode_number.is_some()
            || self.season_number.is_some()
            || self.episode_name.as_deref().is_some_and(|n| !n.trim().is_empty())
            || episode::looks_episodic(&self.title)
    }

    /// Series this record belongs to: the stored series title, else the text
    /// before an episode marker in the title, else the title itself.
    pub fn series_name(&self) -> String {
        if let Some(series) = self.series_title.as_deref().filter(|s| !s.trim().is_empty()) {
            return series.to_string();
        }
        episode::infer_episode_info(&self.title)
            .and_then(|info| info.series_title)
            .unwrap_or_else(|| self.title.clone())
    }
}

/// Percentage watched, clamped to `0..=100`. Unknown durations count as 0 %.
pub fn percent_complete(current_time: f64, duration: f64) -> f64 {
    if !(duration.is_finite() && duration > 0.0) || !current_time.is_finite() {
        return 0.0;
    }
    (current_time / duration * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escalation() {
        let mut meta = PlaybackMetadata {
            title: "Show".into(),
            platform: "Netflix".into(),
            episode_name: Some("  ".into()),
            ..Default::default()
        };
        meta.escalate_content_type();
        assert_eq!(meta.content_type, ContentType::Movie);

        meta.season_number = Some(1);
        meta.escalate_content_type();
        assert_eq!(meta.content_type, ContentType::Episode);
    }

    #[test]
    fn test_identity_title() {
        let meta = PlaybackMetadata {
            title: "Pilot".into(),
            series_title: Some("Show".into()),
            content_type: ContentType::Episode,
            ..Default::default()
        };
        assert_eq!(meta.identity_title(), "Show");

        let movie = PlaybackMetadata {
            title: "Dune".into(),
            series_title: Some("Dune Saga".into()),
            ..Default::default()
        };
        assert_eq!(movie.identity_title(), "Dune");
    }

    #[test]
    fn test_percent_complete() {
        assert_eq!(percent_complete(900.0, 1800.0), 50.0);
        assert_eq!(percent_complete(10.0, 0.0), 0.0);
        assert_eq!(percent_complete(10.0, f64::NAN), 0.0);
        assert_eq!(percent_complete(2000.0, 1800.0), 100.0);
    }

    #[test]
    fn test_record_json_shape() {
        let record = StoredProgressRecord {
            content_key: "content_1".into(),
            url: "https://example.com/watch/1".into(),
            title: "Dune".into(),
            current_time: 60.0,
            duration: 600.0,
            percent_complete: 10.0,
            last_watched: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            platform: "Example".into(),
            content_type: ContentType::Movie,
            episode_number: None,
            season_number: None,
            series_title: None,
            episode_name: None,
            original_title: None,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["contentKey"], "content_1");
        assert_eq!(json["lastWatchedTimestamp"], 1_700_000_000_000_i64);
        assert_eq!(json["contentType"], "movie");
        assert!(json.get("episodeNumber").is_none());
    }
}
