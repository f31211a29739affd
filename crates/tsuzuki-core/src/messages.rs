//! Wire shapes exchanged with the progress store and between frames.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::{ContentType, PlaybackMetadata, StoredProgressRecord};

/// `saveProgress` payload: the metadata plus the playback position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveProgressRequest {
    #[serde(flatten)]
    pub metadata: PlaybackMetadata,
    pub current_time: f64,
    pub duration: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveProgressResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SaveProgressResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// `getProgress` reply. `data` is absent when nothing matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetProgressResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<StoredProgressRecord>,
}

/// Context the top-level document relays to an embedded player frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParentInfo {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub series_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub episode_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<ContentType>,
}

impl ParentInfo {
    /// Describe what the top-level page is showing.
    pub fn from_metadata(meta: &PlaybackMetadata) -> Self {
        Self {
            url: meta.url.clone(),
            title: meta.title.clone(),
            episode_number: meta.episode_number,
            season_number: meta.season_number,
            series_title: meta.series_title.clone(),
            episode_title: meta.episode_name.clone(),
            canonical_url: None,
            content_type: Some(meta.content_type),
        }
    }

    /// URL the relayed content should be stored under.
    pub fn content_url(&self) -> &str {
        self.canonical_url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or(&self.url)
    }
}

/// Cross-frame handshake messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FrameMessage {
    /// Sent by an embedded frame; carries no payload.
    RequestInfo,
    /// Reply from the top-level document.
    ParentInfo(ParentInfo),
}

impl FrameMessage {
    /// Parse a posted message, ignoring shapes this protocol does not know.
    pub fn parse(value: &serde_json::Value) -> Option<Self> {
        match serde_json::from_value(value.clone()) {
            Ok(msg) => Some(msg),
            Err(e) => {
                debug!(error = %e, "Ignoring unrecognized frame message");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_save_request_is_flat() {
        let request = SaveProgressRequest {
            metadata: PlaybackMetadata {
                title: "Dune".into(),
                platform: "Example".into(),
                url: "https://example.com/m/1".into(),
                ..Default::default()
            },
            current_time: 12.5,
            duration: 600.0,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["title"], "Dune");
        assert_eq!(value["currentTime"], 12.5);
        assert_eq!(value["contentType"], "movie");

        let back: SaveProgressRequest = serde_json::from_value(value).unwrap();
        assert_eq!(back, request);
    }

    #[test]
    fn test_parse_frame_messages() {
        assert_eq!(
            FrameMessage::parse(&json!({"type": "REQUEST_INFO"})),
            Some(FrameMessage::RequestInfo)
        );

        let msg = FrameMessage::parse(&json!({
            "type": "PARENT_INFO",
            "url": "https://site.example/show/1",
            "title": "Show",
            "episodeNumber": 4,
            "episodeTitle": "The Heist",
            "contentType": "episode"
        }))
        .unwrap();
        let FrameMessage::ParentInfo(info) = msg else {
            panic!("expected parent info");
        };
        assert_eq!(info.episode_number, Some(4));
        assert_eq!(info.episode_title.as_deref(), Some("The Heist"));
        assert_eq!(info.content_type, Some(ContentType::Episode));
    }

    #[test]
    fn test_unknown_shapes_are_ignored() {
        assert!(FrameMessage::parse(&json!({"type": "SOMETHING_ELSE"})).is_none());
        assert!(FrameMessage::parse(&json!("REQUEST_INFO")).is_none());
        assert!(FrameMessage::parse(&json!({"type": "PARENT_INFO"})).is_none());
    }

    #[test]
    fn test_save_response_shape() {
        let ok = serde_json::to_value(SaveProgressResponse::ok()).unwrap();
        assert_eq!(ok, json!({"success": true}));
        let failed = serde_json::to_value(SaveProgressResponse::failed("closed")).unwrap();
        assert_eq!(failed["error"], "closed");
    }
}
