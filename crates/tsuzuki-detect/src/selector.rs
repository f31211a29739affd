//! Weighted scoring of video candidates.
//!
//! When several videos are on a page (hero trailers, ads, thumbnails that play
//! on hover), the one the user is watching is usually the largest, loaded,
//! long, buffered, sourced from a blob or the site's own CDN, and sitting in
//! the player container.

use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::dom::{closest_across_shadow, ready_state, Dom, NodeId};
use crate::scanner::Scanner;
use crate::strategy::{ContentType, PageContext, SourceStrategy};

/// Scoring weights and page hints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorConfig {
    /// Area (px²) up to which size scores linearly.
    pub area_threshold: f64,
    /// Area divisor below the threshold.
    pub area_divisor: f64,
    /// Area divisor beyond the threshold (diminishing weight).
    pub area_overflow_divisor: f64,
    /// Cap on the points earned beyond the threshold.
    pub area_overflow_cap: f64,
    pub ready_bonus: f64,
    pub ready_extra_bonus: f64,
    /// Durations above this are long-form content.
    pub long_form_seconds: f64,
    pub long_form_bonus: f64,
    /// Durations above this are longer than a typical ad.
    pub ad_length_seconds: f64,
    pub medium_duration_bonus: f64,
    pub any_duration_bonus: f64,
    pub buffered_bonus: f64,
    pub blob_bonus: f64,
    pub first_party_bonus: f64,
    pub shape_bonus: f64,
    pub playback_view_bonus: f64,
    pub autoplay_bonus: f64,
    /// Containers that hold the real player on common sites.
    pub playback_roots: Vec<String>,
    /// Media CDNs owned by the content sources.
    pub first_party_hosts: Vec<String>,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            area_threshold: 640.0 * 360.0,
            area_divisor: 2304.0,
            area_overflow_divisor: 23040.0,
            area_overflow_cap: 50.0,
            ready_bonus: 40.0,
            ready_extra_bonus: 15.0,
            long_form_seconds: 600.0,
            long_form_bonus: 60.0,
            ad_length_seconds: 45.0,
            medium_duration_bonus: 30.0,
            any_duration_bonus: 10.0,
            buffered_bonus: 20.0,
            blob_bonus: 25.0,
            first_party_bonus: 15.0,
            shape_bonus: 30.0,
            playback_view_bonus: 35.0,
            autoplay_bonus: 10.0,
            playback_roots: vec![
                "#player".into(),
                ".video-player".into(),
                ".player-container".into(),
                "[data-testid='player']".into(),
                "[data-uia='player']".into(),
                ".watch-video".into(),
                "#movie_player".into(),
            ],
            first_party_hosts: vec![
                "nflxvideo.net".into(),
                "googlevideo.com".into(),
                "dssott.com".into(),
                "aiv-cdn.net".into(),
                "akamaized.net".into(),
                "vrv.co".into(),
            ],
        }
    }
}

/// Properties of one video read during a single selection pass.
#[derive(Debug, Clone)]
pub struct VideoCandidate {
    pub node: NodeId,
    pub area: f64,
    pub visible: bool,
    pub ready_state: u8,
    pub duration: Option<f64>,
    pub buffered: bool,
    pub source: Option<String>,
    pub autoplay: bool,
    pub looping: bool,
}

impl VideoCandidate {
    /// Read `node`'s current state. Non-media elements yield a bare candidate
    /// with nothing but its geometry.
    pub fn read(dom: &dyn Dom, node: NodeId) -> Self {
        let media = dom.media(node).unwrap_or_default();
        Self {
            node,
            area: dom.bounding_rect(node).area(),
            visible: dom.is_visible(node),
            ready_state: media.ready_state,
            duration: media.known_duration(),
            buffered: media.buffered_ranges > 0,
            source: media.current_src.filter(|s| !s.is_empty()),
            autoplay: media.autoplay,
            looping: media.looping,
        }
    }
}

/// Chooses the attached video among the discovered candidates.
pub struct CandidateSelector<'a> {
    dom: &'a dyn Dom,
    config: &'a SelectorConfig,
    page_host: Option<String>,
    content_type: Option<ContentType>,
    roots_present: bool,
}

impl<'a> CandidateSelector<'a> {
    pub fn new(ctx: &PageContext<'a>, config: &'a SelectorConfig) -> Self {
        let roots: Vec<&str> = config.playback_roots.iter().map(String::as_str).collect();
        let roots_present = Scanner::new(ctx.dom).any_match(&roots);
        Self {
            dom: ctx.dom,
            config,
            page_host: ctx.url.host_str().map(str::to_string),
            content_type: None,
            roots_present,
        }
    }

    /// Content type expected by the active strategy, enabling the shape bonus.
    pub fn with_content_type(mut self, content_type: Option<ContentType>) -> Self {
        self.content_type = content_type;
        self
    }

    /// Filter through the strategy, let it pick if it wants to, otherwise
    /// score. Never returns `None` for a non-empty input.
    pub fn select(
        &self,
        ctx: &PageContext<'_>,
        strategy: Option<&dyn SourceStrategy>,
        candidates: Vec<NodeId>,
    ) -> Option<NodeId> {
        if candidates.is_empty() {
            return None;
        }

        let pool = match strategy {
            Some(s) => {
                let filtered = s.filter_video_elements(ctx, candidates.clone());
                if filtered.is_empty() {
                    debug!(count = candidates.len(), "Strategy filtered every candidate, using all");
                    candidates
                } else {
                    filtered
                }
            }
            None => candidates,
        };

        if let Some(chosen) = strategy.and_then(|s| s.select_video_element(ctx, &pool)) {
            debug!(element = ?chosen, "Strategy picked video");
            return Some(chosen);
        }

        if pool.len() == 1 {
            return pool.first().copied();
        }

        let scored: Vec<(NodeId, f64)> = pool
            .iter()
            .map(|&node| {
                let score = self.score(&VideoCandidate::read(self.dom, node));
                debug!(element = ?node, score, "Scored candidate");
                (node, score)
            })
            .collect();
        pick_best(&scored)
    }

    /// Weighted score of one candidate.
    pub fn score(&self, c: &VideoCandidate) -> f64 {
        let cfg = self.config;
        let mut score = 0.0;

        score += if c.area <= cfg.area_threshold {
            c.area / cfg.area_divisor
        } else {
            cfg.area_threshold / cfg.area_divisor
                + ((c.area - cfg.area_threshold) / cfg.area_overflow_divisor).min(cfg.area_overflow_cap)
        };

        if c.ready_state >= ready_state::HAVE_METADATA {
            score += cfg.ready_bonus;
            if c.ready_state > ready_state::HAVE_METADATA {
                score += cfg.ready_extra_bonus;
            }
        }

        if let Some(duration) = c.duration {
            score += if duration > cfg.long_form_seconds {
                cfg.long_form_bonus
            } else if duration > cfg.ad_length_seconds {
                cfg.medium_duration_bonus
            } else {
                cfg.any_duration_bonus
            };
        }

        if c.buffered {
            score += cfg.buffered_bonus;
        }

        if let Some(src) = &c.source {
            if src.starts_with("blob:") {
                score += cfg.blob_bonus;
            } else if self.is_first_party(src) {
                score += cfg.first_party_bonus;
            }
        }

        let in_view = self.in_playback_view(c.node);
        if self.matches_shape(c, in_view) {
            score += cfg.shape_bonus;
        }
        if in_view {
            score += cfg.playback_view_bonus;
        }

        if c.autoplay && !c.looping {
            score += cfg.autoplay_bonus;
        }

        score
    }

    /// Inside a known player container, or no such container on the page.
    fn in_playback_view(&self, node: NodeId) -> bool {
        if !self.roots_present {
            return true;
        }
        self.config
            .playback_roots
            .iter()
            .any(|sel| closest_across_shadow(self.dom, node, sel).is_some())
    }

    fn matches_shape(&self, c: &VideoCandidate, in_view: bool) -> bool {
        match self.content_type {
            Some(ContentType::Episode) => {
                c.visible && in_view && c.ready_state >= ready_state::HAVE_METADATA
            }
            Some(ContentType::Movie) => {
                c.visible && in_view && c.duration.is_some_and(|d| d >= self.config.long_form_seconds)
            }
            None => false,
        }
    }

    fn is_first_party(&self, src: &str) -> bool {
        let Some(host) = Url::parse(src).ok().and_then(|u| u.host_str().map(str::to_string)) else {
            return false;
        };
        if self.page_host.as_deref() == Some(host.as_str()) {
            return true;
        }
        self.config
            .first_party_hosts
            .iter()
            .any(|h| host == *h || host.ends_with(&format!(".{h}")))
    }
}

/// Highest score wins, first-encountered on ties. If nothing scores above
/// zero, the first candidate is returned.
pub fn pick_best(scored: &[(NodeId, f64)]) -> Option<NodeId> {
    let (first, _) = *scored.first()?;
    let mut best: Option<(NodeId, f64)> = None;
    for &(node, score) in scored {
        if score > 0.0 && best.is_none_or(|(_, top)| score > top) {
            best = Some((node, score));
        }
    }
    Some(best.map_or(first, |(node, _)| node))
}
