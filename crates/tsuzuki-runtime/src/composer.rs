//! Builds the metadata saved with each progress snapshot.

use tracing::debug;

use tsuzuki_core::messages::ParentInfo;
use tsuzuki_core::models::{ContentType, PlaybackMetadata};
use tsuzuki_detect::embedded::LinkedData;
use tsuzuki_detect::episode::{clean_document_title, infer_episode_info};
use tsuzuki_detect::{PageContext, Scanner, SourceStrategy};

/// Places a generic page tends to put the title of what is playing.
const GENERIC_TITLE_SELECTORS: &[&str] = &[
    "[data-testid='title']",
    "[itemprop='name']",
    ".video-title",
    ".player-title",
    "h1",
];

/// Per-session composition state.
///
/// The title cache only holds generic fallback results; strategy output is
/// read fresh every time.
#[derive(Debug, Default)]
pub struct MetadataComposer {
    title_cache: Option<(String, String)>,
    parent: Option<ParentInfo>,
    episode_locked: bool,
    linked_data: Option<Option<LinkedData>>,
}

impl MetadataComposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaching to a new element invalidates the cached title.
    pub fn reset_for_attach(&mut self) {
        self.title_cache = None;
    }

    /// A navigation starts a new session: every cache goes, and content type
    /// may drop back to movie.
    pub fn reset_for_navigation(&mut self) {
        self.title_cache = None;
        self.parent = None;
        self.episode_locked = false;
        self.linked_data = None;
    }

    /// Record context relayed by the top-level page. Returns whether it
    /// differs from what was known.
    pub fn set_parent_info(&mut self, info: ParentInfo) -> bool {
        if self.parent.as_ref() == Some(&info) {
            return false;
        }
        self.parent = Some(info);
        true
    }

    pub fn parent_info(&self) -> Option<&ParentInfo> {
        self.parent.as_ref()
    }

    /// URL progress for the current page is stored under: the relayed one
    /// inside an embedded frame, otherwise the page's own.
    pub fn content_url(&self, ctx: &PageContext<'_>) -> String {
        match &self.parent {
            Some(parent) if !ctx.dom.is_top_level() && !parent.content_url().is_empty() => {
                parent.content_url().to_string()
            }
            _ => ctx.url.as_str().to_string(),
        }
    }

    /// Compose metadata for the page as it is now.
    pub fn compose(
        &mut self,
        ctx: &PageContext<'_>,
        strategy: Option<&dyn SourceStrategy>,
    ) -> PlaybackMetadata {
        let linked = self.linked_data(ctx).cloned().unwrap_or_default();

        let (title, original_title) = match strategy
            .and_then(|s| s.extract_title(ctx))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
        {
            Some(t) => (t.clone(), t),
            None => self.generic_title(ctx, &linked),
        };

        let inferred = strategy
            .and_then(|s| s.infer_episode_info_from_title(&original_title))
            .or_else(|| infer_episode_info(&original_title))
            .unwrap_or_default();

        let episode_number = strategy
            .and_then(|s| s.extract_episode_number(ctx))
            .or(inferred.episode)
            .or(linked.episode_number);
        let season_number = strategy
            .and_then(|s| s.extract_season_number(ctx))
            .or(inferred.season)
            .or(linked.season_number);
        let episode_name = strategy
            .and_then(|s| s.extract_episode_name(ctx))
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let content_type = strategy
            .and_then(|s| s.content_type(ctx))
            .or_else(|| linked.is_episode.then_some(ContentType::Episode))
            .unwrap_or_default();

        let mut meta = PlaybackMetadata {
            title,
            original_title,
            series_title: linked.series_name.clone().or(inferred.series_title),
            episode_name,
            platform: strategy
                .map(|s| s.platform_name().to_string())
                .unwrap_or_else(|| host_label(ctx.url.host_str().unwrap_or_default())),
            content_type,
            episode_number,
            season_number,
            url: ctx.url.as_str().to_string(),
            is_from_embedded_frame: !ctx.dom.is_top_level(),
        };

        if meta.is_from_embedded_frame {
            if let Some(parent) = &self.parent {
                apply_parent(&mut meta, parent, strategy.is_none());
            }
        }

        if self.episode_locked {
            meta.content_type = ContentType::Episode;
        }
        meta.escalate_content_type();
        if meta.content_type == ContentType::Episode {
            self.episode_locked = true;
        }
        meta
    }

    fn linked_data(&mut self, ctx: &PageContext<'_>) -> Option<&LinkedData> {
        self.linked_data
            .get_or_insert_with(|| LinkedData::from_page(ctx.dom))
            .as_ref()
    }

    /// Generic title and the raw text it came from, cached for the session.
    fn generic_title(&mut self, ctx: &PageContext<'_>, linked: &LinkedData) -> (String, String) {
        if let Some(cached) = &self.title_cache {
            return cached.clone();
        }

        let dom = ctx.dom;
        let found = Scanner::new(dom)
            .find_first_match(GENERIC_TITLE_SELECTORS, |el| {
                dom.text_content(el)
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
            })
            .map(|t| (t.clone(), t))
            .or_else(|| {
                Scanner::new(dom)
                    .find_first_match(&["meta[property='og:title']"], |el| {
                        dom.attribute(el, "content").filter(|t| !t.trim().is_empty())
                    })
                    .map(|raw| (clean_document_title(&raw), raw))
            })
            .or_else(|| linked.name.clone().map(|n| (n.clone(), n)))
            .unwrap_or_else(|| {
                let raw = dom.title();
                (clean_document_title(&raw), raw)
            });

        debug!(title = %found.0, "Generic title");
        if !found.0.is_empty() {
            self.title_cache = Some(found.clone());
        }
        found
    }
}

/// Overlay relayed context. A non-empty relayed value always wins over what
/// the frame extracted locally.
fn apply_parent(meta: &mut PlaybackMetadata, parent: &ParentInfo, derive_platform: bool) {
    let url = parent.content_url();
    if !url.is_empty() {
        meta.url = url.to_string();
        if derive_platform {
            if let Ok(parsed) = url::Url::parse(url) {
                meta.platform = host_label(parsed.host_str().unwrap_or_default());
            }
        }
    }
    if !parent.title.trim().is_empty() {
        meta.title = parent.title.trim().to_string();
    }
    if let Some(series) = parent.series_title.as_deref().filter(|s| !s.trim().is_empty()) {
        meta.series_title = Some(series.trim().to_string());
    }
    if let Some(name) = parent.episode_title.as_deref().filter(|s| !s.trim().is_empty()) {
        meta.episode_name = Some(name.trim().to_string());
    }
    if parent.episode_number.is_some() {
        meta.episode_number = parent.episode_number;
    }
    if parent.season_number.is_some() {
        meta.season_number = parent.season_number;
    }
    if parent.content_type == Some(ContentType::Episode) {
        meta.content_type = ContentType::Episode;
    }
}

/// Host without a leading `www.`, used as the platform name when no strategy
/// claims the page.
fn host_label(host: &str) -> String {
    host.strip_prefix("www.").unwrap_or(host).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsuzuki_detect::fake::FakeDom;
    use url::Url;

    fn compose(dom: &FakeDom, composer: &mut MetadataComposer) -> PlaybackMetadata {
        let url = Url::parse(&tsuzuki_detect::Dom::location(dom)).unwrap();
        let ctx = PageContext::new(dom, &url);
        let registry = tsuzuki_detect::default_registry();
        let strategy = registry.select(ctx.host());
        composer.compose(&ctx, strategy.as_deref())
    }

    #[test]
    fn test_generic_title_from_document() {
        let dom = FakeDom::new("https://www.example.com/watch/7?t=3");
        dom.set_title("Show S01E02 | Example");
        let meta = compose(&dom, &mut MetadataComposer::new());
        assert_eq!(meta.title, "Show S01E02");
        assert_eq!(meta.original_title, "Show S01E02 | Example");
        assert_eq!(meta.platform, "example.com");
        assert_eq!(meta.series_title.as_deref(), Some("Show"));
        assert_eq!(meta.season_number, Some(1));
        assert_eq!(meta.episode_number, Some(2));
        assert_eq!(meta.content_type, ContentType::Episode);
    }

    #[test]
    fn test_strategy_title() {
        let dom = FakeDom::new("https://www.netflix.com/watch/80100");
        let el = dom.add_element(FakeDom::DOCUMENT, "div[data-uia='video-title']");
        dom.set_text(el, "Dark");
        dom.set_title("Netflix");
        let meta = compose(&dom, &mut MetadataComposer::new());
        assert_eq!(meta.platform, "Netflix");
        assert_eq!(meta.title, "Dark");
    }

    #[test]
    fn test_title_cache_until_attach() {
        let dom = FakeDom::new("https://example.com/v/1");
        dom.set_title("First Film - Example");
        let mut composer = MetadataComposer::new();
        assert_eq!(compose(&dom, &mut composer).title, "First Film");

        dom.set_title("Second Film - Example");
        assert_eq!(compose(&dom, &mut composer).title, "First Film");

        composer.reset_for_attach();
        assert_eq!(compose(&dom, &mut composer).title, "Second Film");
    }

    #[test]
    fn test_episode_type_is_sticky_within_session() {
        let dom = FakeDom::new("https://example.com/v/1");
        dom.set_title("Show Episode 4");
        let mut composer = MetadataComposer::new();
        assert_eq!(compose(&dom, &mut composer).content_type, ContentType::Episode);

        dom.set_title("Show");
        composer.reset_for_attach();
        assert_eq!(compose(&dom, &mut composer).content_type, ContentType::Episode);

        composer.reset_for_navigation();
        assert_eq!(compose(&dom, &mut composer).content_type, ContentType::Movie);
    }

    #[test]
    fn test_parent_info_wins_in_embedded_frame() {
        let dom = FakeDom::new("https://player.cdn.example/embed/abc");
        dom.set_top_level(false);
        dom.set_title("Player");
        let mut composer = MetadataComposer::new();
        composer.set_parent_info(ParentInfo {
            url: "https://anime.example/show/ep-4?ref=x".into(),
            title: "Show".into(),
            episode_number: Some(4),
            episode_title: Some("The Heist".into()),
            canonical_url: Some("https://anime.example/show/ep-4".into()),
            ..Default::default()
        });

        let meta = compose(&dom, &mut composer);
        assert!(meta.is_from_embedded_frame);
        assert_eq!(meta.title, "Show");
        assert_eq!(meta.url, "https://anime.example/show/ep-4");
        assert_eq!(meta.platform, "anime.example");
        assert_eq!(meta.episode_name.as_deref(), Some("The Heist"));
        assert_eq!(meta.content_type, ContentType::Episode);
    }

    #[test]
    fn test_parent_info_ignored_at_top_level() {
        let dom = FakeDom::new("https://example.com/v/1");
        dom.set_title("Film - Example");
        let mut composer = MetadataComposer::new();
        composer.set_parent_info(ParentInfo {
            url: "https://elsewhere.example/".into(),
            title: "Other".into(),
            ..Default::default()
        });
        let meta = compose(&dom, &mut composer);
        assert_eq!(meta.title, "Film");
        assert!(!meta.is_from_embedded_frame);
    }

    #[test]
    fn test_linked_data_fallback() {
        let dom = FakeDom::new("https://example.com/v/9");
        let script = dom.add_element(FakeDom::DOCUMENT, "script[type='application/ld+json']");
        dom.set_text(
            script,
            r#"{"@type":"TVEpisode","name":"Pilot","episodeNumber":1,
                "partOfSeason":{"seasonNumber":"2"},"partOfSeries":{"name":"Show"},}"#,
        );
        let meta = compose(&dom, &mut MetadataComposer::new());
        assert_eq!(meta.title, "Pilot");
        assert_eq!(meta.series_title.as_deref(), Some("Show"));
        assert_eq!(meta.season_number, Some(2));
        assert_eq!(meta.content_type, ContentType::Episode);
    }
}
