//! Per-source metadata extraction.
//!
//! A [`SourceStrategy`] knows how one content source lays out its pages. Every
//! capability has a default, so an implementation only overrides what its
//! source actually needs.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::dom::{Dom, NodeId};
use crate::episode::EpisodeInfo;

/// Whether a piece of content is a standalone title or part of a series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    Movie,
    Episode,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "movie",
            Self::Episode => "episode",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a strategy gets to look at.
#[derive(Clone, Copy)]
pub struct PageContext<'a> {
    pub dom: &'a dyn Dom,
    pub url: &'a Url,
}

impl<'a> PageContext<'a> {
    pub fn new(dom: &'a dyn Dom, url: &'a Url) -> Self {
        Self { dom, url }
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }
}

/// Errors a strategy factory may report instead of producing a strategy.
#[derive(Debug, thiserror::Error)]
pub enum StrategyError {
    #[error("strategy does not support host {0}")]
    UnsupportedHost(String),
    #[error("strategy construction failed: {0}")]
    Construction(String),
}

/// Capability set of a content source.
pub trait SourceStrategy {
    /// Whether this strategy applies to pages on `host`.
    fn can_handle(&self, host: &str) -> bool;

    /// Display name stored with every progress record (e.g. "Netflix").
    fn platform_name(&self) -> &str;

    fn extract_episode_number(&self, _ctx: &PageContext<'_>) -> Option<u32> {
        None
    }

    fn extract_season_number(&self, _ctx: &PageContext<'_>) -> Option<u32> {
        None
    }

    /// Series title for episodic content, otherwise the content title.
    fn extract_title(&self, _ctx: &PageContext<'_>) -> Option<String> {
        None
    }

    fn extract_episode_name(&self, _ctx: &PageContext<'_>) -> Option<String> {
        None
    }

    /// Parse season/episode out of a title string in this source's own
    /// format. The composer falls back to [`crate::episode::infer_episode_info`].
    fn infer_episode_info_from_title(&self, _title: &str) -> Option<EpisodeInfo> {
        None
    }

    fn content_type(&self, _ctx: &PageContext<'_>) -> Option<ContentType> {
        None
    }

    /// `false` on browse/landing pages where a video is only a preview.
    fn is_valid_playback_page(&self, _ctx: &PageContext<'_>) -> bool {
        true
    }

    /// Drop candidates that are certainly not the main video.
    fn filter_video_elements(&self, _ctx: &PageContext<'_>, candidates: Vec<NodeId>) -> Vec<NodeId> {
        candidates
    }

    /// Source-specific pick among the (filtered) candidates. `None` defers to
    /// the generic scorer.
    fn select_video_element(&self, _ctx: &PageContext<'_>, _candidates: &[NodeId]) -> Option<NodeId> {
        None
    }
}
