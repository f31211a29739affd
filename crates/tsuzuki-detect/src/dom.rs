//! The page as seen by the detector.
//!
//! Everything the scanner, selector, strategies and session tracker know about
//! the page goes through [`Dom`]. A browser binding implements it over the real
//! document; tests use [`crate::fake::FakeDom`].

use serde::{Deserialize, Serialize};

/// Opaque handle to a node (element, document or shadow root).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Errors raised by a page query. Callers treat these as "no data".
#[derive(Debug, Clone, thiserror::Error)]
pub enum DomError {
    #[error("invalid selector: {0}")]
    InvalidSelector(String),
    #[error("node {0:?} is no longer available")]
    Detached(NodeId),
    #[error("page query failed: {0}")]
    Query(String),
}

/// Bounding client rectangle of an element, in CSS pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Rect {
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// Visible area; negative or NaN extents count as zero.
    pub fn area(&self) -> f64 {
        let w = if self.width.is_finite() { self.width.max(0.0) } else { 0.0 };
        let h = if self.height.is_finite() { self.height.max(0.0) } else { 0.0 };
        w * h
    }
}

/// `HTMLMediaElement.readyState` values.
pub mod ready_state {
    pub const HAVE_NOTHING: u8 = 0;
    pub const HAVE_METADATA: u8 = 1;
    pub const HAVE_CURRENT_DATA: u8 = 2;
    pub const HAVE_FUTURE_DATA: u8 = 3;
    pub const HAVE_ENOUGH_DATA: u8 = 4;
}

/// Point-in-time read of a media element's playback properties.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaSnapshot {
    pub ready_state: u8,
    pub current_time: f64,
    /// Seconds; `NaN` or infinite while unknown or live.
    pub duration: f64,
    pub paused: bool,
    pub buffered_ranges: usize,
    pub current_src: Option<String>,
    pub autoplay: bool,
    pub looping: bool,
}

impl MediaSnapshot {
    /// Duration when it is known and positive.
    pub fn known_duration(&self) -> Option<f64> {
        (self.duration.is_finite() && self.duration > 0.0).then_some(self.duration)
    }
}

/// Media events the session tracker listens for on the attached element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaEvent {
    Play,
    Pause,
    TimeUpdate,
    Ended,
    LoadedMetadata,
    DurationChange,
    Emptied,
}

impl MediaEvent {
    /// Every event wired on attach.
    pub const ALL: [MediaEvent; 7] = [
        MediaEvent::Play,
        MediaEvent::Pause,
        MediaEvent::TimeUpdate,
        MediaEvent::Ended,
        MediaEvent::LoadedMetadata,
        MediaEvent::DurationChange,
        MediaEvent::Emptied,
    ];

    /// DOM event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::TimeUpdate => "timeupdate",
            Self::Ended => "ended",
            Self::LoadedMetadata => "loadedmetadata",
            Self::DurationChange => "durationchange",
            Self::Emptied => "emptied",
        }
    }
}

/// Read and minimal write access to a live page.
///
/// All methods take `&self`; a browser binding forwards to the page, which
/// has its own interior state.
pub trait Dom {
    /// The primary document node.
    fn document(&self) -> NodeId;

    /// `scope.querySelectorAll(selector)` in document order.
    fn query_selector_all(&self, scope: NodeId, selector: &str) -> Result<Vec<NodeId>, DomError>;

    /// Every element below `scope` (not crossing shadow boundaries).
    fn elements(&self, scope: NodeId) -> Result<Vec<NodeId>, DomError>;

    /// Open shadow root attached to `element`, if any.
    fn shadow_root(&self, element: NodeId) -> Option<NodeId>;

    /// Parent node. For an element at the top of a shadow tree this is the
    /// shadow root itself.
    fn parent(&self, node: NodeId) -> Option<NodeId>;

    /// Host element when `node` is a shadow root.
    fn shadow_host(&self, node: NodeId) -> Option<NodeId>;

    /// `element.matches(selector)`.
    fn matches(&self, element: NodeId, selector: &str) -> Result<bool, DomError>;

    fn is_connected(&self, element: NodeId) -> bool;

    fn text_content(&self, element: NodeId) -> Option<String>;

    fn attribute(&self, element: NodeId, name: &str) -> Option<String>;

    fn bounding_rect(&self, element: NodeId) -> Rect;

    /// Rendered and not hidden by `display`, `visibility` or zero opacity.
    fn is_visible(&self, element: NodeId) -> bool;

    /// Media properties, or `None` if `element` is not a media element.
    fn media(&self, element: NodeId) -> Option<MediaSnapshot>;

    fn listen(&self, element: NodeId, events: &[MediaEvent]) -> Result<(), DomError>;

    fn unlisten(&self, element: NodeId, events: &[MediaEvent]) -> Result<(), DomError>;

    fn seek(&self, element: NodeId, seconds: f64) -> Result<(), DomError>;

    /// `document.title`.
    fn title(&self) -> String;

    /// `location.href`.
    fn location(&self) -> String;

    /// `false` when running inside an embedded frame.
    fn is_top_level(&self) -> bool;
}

/// Nearest ancestor-or-self of `element` matching `selector`, walking out of
/// shadow trees through their hosts.
pub fn closest_across_shadow(dom: &dyn Dom, element: NodeId, selector: &str) -> Option<NodeId> {
    let mut current = Some(element);
    while let Some(node) = current {
        match dom.matches(node, selector) {
            Ok(true) => return Some(node),
            Ok(false) => {}
            Err(e) => {
                tracing::trace!(node = ?node, error = %e, "closest: match failed");
                return None;
            }
        }
        current = dom.parent(node).map(|p| dom.shadow_host(p).unwrap_or(p));
        if current == Some(dom.document()) {
            break;
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_area_clamps_negative_and_nan() {
        assert_eq!(Rect::new(10.0, 5.0).area(), 50.0);
        assert_eq!(Rect::new(-10.0, 5.0).area(), 0.0);
        assert_eq!(Rect::new(f64::NAN, 5.0).area(), 0.0);
    }

    #[test]
    fn test_known_duration() {
        let mut snap = MediaSnapshot {
            duration: f64::NAN,
            ..Default::default()
        };
        assert_eq!(snap.known_duration(), None);
        snap.duration = f64::INFINITY;
        assert_eq!(snap.known_duration(), None);
        snap.duration = 42.0;
        assert_eq!(snap.known_duration(), Some(42.0));
    }
}
