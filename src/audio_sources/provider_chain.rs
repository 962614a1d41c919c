//! Ordered fallthrough across hosted providers.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{ProviderResult, ResolveOptions, StreamProvider};

/// Asks each provider in turn and returns the first non-empty result.
///
/// An empty result means every provider declined, which is the caller's cue to fall
/// back to local extraction.
pub async fn resolve_first(
    query: &str,
    providers: &[Arc<dyn StreamProvider>],
    options: &ResolveOptions,
) -> ProviderResult {
    for provider in providers {
        debug!("Trying provider {} for: {}", provider.name(), query);
        let result = provider.resolve(query, options).await;

        if !result.is_empty() {
            info!("Provider {} resolved: {}", provider.name(), query);
            return result;
        }
        debug!("Provider {} declined: {}", provider.name(), query);
    }

    warn!("No provider could resolve: {}", query);
    ProviderResult::empty()
}

/// A fixed, prioritized list of providers sharing one set of options.
#[derive(Clone, Default)]
pub struct ProviderChain {
    providers: Vec<Arc<dyn StreamProvider>>,
    options: ResolveOptions,
}

impl ProviderChain {
    pub fn new(options: ResolveOptions) -> Self {
        Self {
            providers: Vec::new(),
            options,
        }
    }

    /// Appends a provider with lower priority than the ones already present.
    pub fn with_provider(mut self, provider: Arc<dyn StreamProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn options(&self) -> &ResolveOptions {
        &self.options
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub async fn resolve_first(&self, query: &str) -> ProviderResult {
        resolve_first(query, &self.providers, &self.options).await
    }
}
