//! Cache + circuit breaker in front of any market-structure provider.

use super::{
    CircuitBreaker, MarketCache, MarketSeries, MarketStructureProvider, ProviderError,
    SymbolResolution,
};
use crate::domain::Instrument;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct CachedProvider<P> {
    inner: P,
    cache: Arc<MarketCache>,
    breaker: CircuitBreaker,
}

impl<P: MarketStructureProvider> CachedProvider<P> {
    pub fn new(inner: P, cache: Arc<MarketCache>) -> Self {
        Self::with_breaker(inner, cache, CircuitBreaker::default_provider())
    }

    pub fn with_breaker(inner: P, cache: Arc<MarketCache>, breaker: CircuitBreaker) -> Self {
        Self {
            inner,
            cache,
            breaker,
        }
    }

    pub fn cache(&self) -> &MarketCache {
        &self.cache
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

impl<P: MarketStructureProvider> MarketStructureProvider for CachedProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn resolve(&self, instrument: &Instrument) -> SymbolResolution {
        self.inner.resolve(instrument)
    }

    fn fetch(&self, instrument: &Instrument) -> Result<MarketSeries, ProviderError> {
        if let Some(hit) = self.cache.get(&instrument.symbol) {
            debug!(symbol = %instrument.symbol, "market cache hit");
            return Ok((*hit).clone());
        }

        if !self.breaker.is_allowed() {
            return Err(ProviderError::CircuitOpen);
        }

        match self.inner.fetch(instrument) {
            Ok(series) => {
                self.breaker.record_success();
                let series = series.normalized();
                self.cache.insert(instrument.symbol.clone(), series.clone());
                Ok(series)
            }
            Err(err) => {
                if err.counts_against_provider() {
                    self.breaker.record_failure();
                    warn!(
                        provider = self.inner.name(),
                        symbol = %instrument.symbol,
                        error = %err,
                        "market-structure fetch failed"
                    );
                }
                Err(err)
            }
        }
    }
}
