//! Ordered collection of strategy factories.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::strategy::{SourceStrategy, StrategyError};

/// Builds a strategy for the page currently open on `host`.
pub trait StrategyFactory {
    fn create(&self, host: &str) -> Result<Box<dyn SourceStrategy>, StrategyError>;
}

impl<F> StrategyFactory for F
where
    F: Fn(&str) -> Result<Box<dyn SourceStrategy>, StrategyError>,
{
    fn create(&self, host: &str) -> Result<Box<dyn SourceStrategy>, StrategyError> {
        self(host)
    }
}

/// Factories in registration order.
///
/// Registering the same factory handle twice is a no-op; distinct handles are
/// always kept, even if they build identical strategies.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    factories: Vec<Arc<dyn StrategyFactory>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `factory` unless this exact handle is already registered.
    /// Returns whether it was added.
    pub fn register(&mut self, factory: Arc<dyn StrategyFactory>) -> bool {
        let ptr = Arc::as_ptr(&factory) as *const ();
        if self
            .factories
            .iter()
            .any(|f| Arc::as_ptr(f) as *const () == ptr)
        {
            return false;
        }
        self.factories.push(factory);
        true
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Instantiate every factory for `host`. Factories that fail are logged
    /// and left out.
    pub fn create_all(&self, host: &str) -> Vec<Box<dyn SourceStrategy>> {
        self.factories
            .iter()
            .enumerate()
            .filter_map(|(index, factory)| match factory.create(host) {
                Ok(strategy) => Some(strategy),
                Err(e) => {
                    warn!(index, host, error = %e, "Strategy factory failed");
                    None
                }
            })
            .collect()
    }

    /// First strategy, in registration order, that claims `host`.
    pub fn select(&self, host: &str) -> Option<Box<dyn SourceStrategy>> {
        let chosen = self
            .create_all(host)
            .into_iter()
            .find(|s| s.can_handle(host));
        match &chosen {
            Some(s) => debug!(host, platform = s.platform_name(), "Strategy selected"),
            None => debug!(host, "No strategy for host, using generic fallbacks"),
        }
        chosen
    }
}
