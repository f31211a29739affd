//! Finding the video a user is watching and reading what it is.
//!
//! The page is reached through the [`Dom`] trait. [`Scanner`] enumerates
//! videos across shadow trees, [`StrategyRegistry`] picks the
//! [`SourceStrategy`] for the current host and [`CandidateSelector`] chooses
//! among several videos.

pub mod dom;
pub mod embedded;
pub mod episode;
#[cfg(any(test, feature = "fake-dom"))]
pub mod fake;
pub mod registry;
pub mod scanner;
pub mod selector;
pub mod sources;
pub mod strategy;

pub use dom::{Dom, DomError, MediaEvent, MediaSnapshot, NodeId, Rect};
pub use episode::EpisodeInfo;
pub use registry::{StrategyFactory, StrategyRegistry};
pub use scanner::Scanner;
pub use selector::{CandidateSelector, SelectorConfig, VideoCandidate};
pub use sources::{SourceDatabase, SourceDef};
pub use strategy::{ContentType, PageContext, SourceStrategy, StrategyError};

/// Registry seeded with the embedded source database.
pub fn default_registry() -> StrategyRegistry {
    let mut registry = StrategyRegistry::new();
    SourceDatabase::embedded().register_all(&mut registry);
    registry
}
