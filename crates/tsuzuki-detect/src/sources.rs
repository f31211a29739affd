//! Data-driven source strategies.
//!
//! Most sources only differ in a handful of selectors and URL shapes, so they
//! are described in TOML rather than code. Each enabled definition is exposed
//! to the registry as a [`DeclarativeStrategy`].

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dom::{closest_across_shadow, NodeId};
use crate::registry::{StrategyFactory, StrategyRegistry};
use crate::scanner::Scanner;
use crate::strategy::{ContentType, PageContext, SourceStrategy, StrategyError};

/// Embedded source database.
const EMBEDDED_DB: &str = include_str!("../data/sources.toml");

/// Definition of a content source and how to read its pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDef {
    /// Display name, also used as the platform of stored records.
    pub name: String,
    /// Regex patterns matched against the page host.
    pub hosts: Vec<String>,
    /// Selectors whose text is the (series) title, tried in order.
    #[serde(default)]
    pub title_selectors: Vec<String>,
    /// Selectors whose text is the episode name.
    #[serde(default)]
    pub episode_name_selectors: Vec<String>,
    /// Regex with capture group 1 extracting the title from `document.title`.
    #[serde(default)]
    pub document_title_pattern: Option<String>,
    /// URL patterns of real playback pages. Empty means every page.
    #[serde(default)]
    pub playback_url_patterns: Vec<String>,
    /// URL patterns that identify episodic content.
    #[serde(default)]
    pub series_url_patterns: Vec<String>,
    /// URL patterns that identify movies.
    #[serde(default)]
    pub movie_url_patterns: Vec<String>,
    /// Containers whose videos are never the main video (ads, consent
    /// dialogs, hover previews).
    #[serde(default)]
    pub exclude_selectors: Vec<String>,
    /// Looping videos shorter than this many seconds are dropped.
    #[serde(default)]
    pub min_loop_duration: Option<f64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Wrapper for TOML deserialization.
#[derive(Debug, Deserialize)]
struct SourceDbFile {
    #[serde(rename = "source")]
    sources: Vec<SourceDef>,
}

/// A source definition with its patterns compiled.
#[derive(Debug)]
pub struct CompiledSource {
    pub def: SourceDef,
    hosts: Vec<Regex>,
    document_title: Option<Regex>,
    playback_urls: Vec<Regex>,
    series_urls: Vec<Regex>,
    movie_urls: Vec<Regex>,
}

impl CompiledSource {
    fn compile(def: SourceDef) -> Self {
        let compile_all = |patterns: &[String]| -> Vec<Regex> {
            patterns
                .iter()
                .filter_map(|p| match Regex::new(p) {
                    Ok(re) => Some(re),
                    Err(e) => {
                        warn!(source = %def.name, pattern = %p, error = %e, "Skipping invalid pattern");
                        None
                    }
                })
                .collect()
        };
        let hosts = compile_all(&def.hosts);
        let playback_urls = compile_all(&def.playback_url_patterns);
        let series_urls = compile_all(&def.series_url_patterns);
        let movie_urls = compile_all(&def.movie_url_patterns);
        let document_title = def
            .document_title_pattern
            .as_deref()
            .and_then(|p| compile_all(&[p.to_string()]).into_iter().next());
        Self {
            def,
            hosts,
            document_title,
            playback_urls,
            series_urls,
            movie_urls,
        }
    }
}

/// Database of known content sources.
#[derive(Debug, Clone)]
pub struct SourceDatabase {
    sources: Vec<Arc<CompiledSource>>,
}

impl SourceDatabase {
    /// Load the embedded source database.
    pub fn embedded() -> Self {
        Self::from_toml(EMBEDDED_DB).expect("embedded sources.toml should be valid")
    }

    /// Load a source database from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let db: SourceDbFile = toml::from_str(toml_str)?;
        Ok(Self {
            sources: db
                .sources
                .into_iter()
                .map(|def| Arc::new(CompiledSource::compile(def)))
                .collect(),
        })
    }

    /// Merge a user database into this one.
    /// Sources with matching names are replaced; new sources are appended.
    pub fn merge_user(&mut self, user_db: &SourceDatabase) {
        for user_source in &user_db.sources {
            if let Some(existing) = self
                .sources
                .iter_mut()
                .find(|s| s.def.name == user_source.def.name)
            {
                *existing = Arc::clone(user_source);
            } else {
                self.sources.push(Arc::clone(user_source));
            }
        }
    }

    /// Register one factory per enabled source, in database order.
    pub fn register_all(&self, registry: &mut StrategyRegistry) {
        for source in self.sources.iter().filter(|s| s.def.enabled) {
            let source = Arc::clone(source);
            let factory: Arc<dyn StrategyFactory> = Arc::new(
                move |_host: &str| -> Result<Box<dyn SourceStrategy>, StrategyError> {
                    Ok(Box::new(DeclarativeStrategy {
                        source: Arc::clone(&source),
                    }))
                },
            );
            registry.register(factory);
        }
    }

    /// Names of all sources, enabled or not.
    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.def.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Strategy backed by a [`SourceDef`].
#[derive(Debug, Clone)]
pub struct DeclarativeStrategy {
    source: Arc<CompiledSource>,
}

impl DeclarativeStrategy {
    fn first_text(&self, ctx: &PageContext<'_>, selectors: &[String]) -> Option<String> {
        if selectors.is_empty() {
            return None;
        }
        let selectors: Vec<&str> = selectors.iter().map(String::as_str).collect();
        Scanner::new(ctx.dom).find_first_match(&selectors, |el| {
            ctx.dom
                .text_content(el)
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
        })
    }

    fn is_excluded(&self, ctx: &PageContext<'_>, element: NodeId) -> bool {
        self.source
            .def
            .exclude_selectors
            .iter()
            .any(|sel| closest_across_shadow(ctx.dom, element, sel).is_some())
    }

    fn is_short_loop(&self, ctx: &PageContext<'_>, element: NodeId) -> bool {
        let Some(min) = self.source.def.min_loop_duration else {
            return false;
        };
        ctx.dom
            .media(element)
            .is_some_and(|m| m.looping && m.known_duration().is_some_and(|d| d < min))
    }
}

impl SourceStrategy for DeclarativeStrategy {
    fn can_handle(&self, host: &str) -> bool {
        self.source.hosts.iter().any(|re| re.is_match(host))
    }

    fn platform_name(&self) -> &str {
        &self.source.def.name
    }

    fn extract_title(&self, ctx: &PageContext<'_>) -> Option<String> {
        if let Some(title) = self.first_text(ctx, &self.source.def.title_selectors) {
            return Some(title);
        }
        let re = self.source.document_title.as_ref()?;
        let page_title = ctx.dom.title();
        let caps = re.captures(&page_title)?;
        let extracted = caps.get(1)?.as_str().trim();
        (!extracted.is_empty()).then(|| extracted.to_string())
    }

    fn extract_episode_name(&self, ctx: &PageContext<'_>) -> Option<String> {
        self.first_text(ctx, &self.source.def.episode_name_selectors)
    }

    fn content_type(&self, ctx: &PageContext<'_>) -> Option<ContentType> {
        let url = ctx.url.as_str();
        if self.source.series_urls.iter().any(|re| re.is_match(url)) {
            Some(ContentType::Episode)
        } else if self.source.movie_urls.iter().any(|re| re.is_match(url)) {
            Some(ContentType::Movie)
        } else {
            None
        }
    }

    fn is_valid_playback_page(&self, ctx: &PageContext<'_>) -> bool {
        self.source.playback_urls.is_empty()
            || self
                .source
                .playback_urls
                .iter()
                .any(|re| re.is_match(ctx.url.as_str()))
    }

    fn filter_video_elements(&self, ctx: &PageContext<'_>, candidates: Vec<NodeId>) -> Vec<NodeId> {
        candidates
            .into_iter()
            .filter(|el| !self.is_excluded(ctx, *el) && !self.is_short_loop(ctx, *el))
            .collect()
    }
}
