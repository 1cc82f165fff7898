//! Per-temperature provider cache.
//!
//! Self-consistency runs the same prompt at several temperatures. Providers are built
//! lazily, once per distinct temperature, and reused for every later call.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use tracing::debug;

use crate::GenerationService;

type ProviderFactory = Box<dyn Fn(f32) -> Result<Arc<dyn GenerationService>> + Send + Sync>;

pub struct ProviderPool {
    factory: ProviderFactory,
    /// Keyed by the temperature's bit pattern
    providers: Mutex<HashMap<u32, Arc<dyn GenerationService>>>,
}

impl ProviderPool {
    pub fn new<F>(factory: F) -> Self
    where
        F: Fn(f32) -> Result<Arc<dyn GenerationService>> + Send + Sync + 'static,
    {
        Self {
            factory: Box::new(factory),
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// The provider for `temperature`, building it on first use.
    pub fn get(&self, temperature: f32) -> Result<Arc<dyn GenerationService>> {
        let mut providers = self.providers.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(provider) = providers.get(&temperature.to_bits()) {
            return Ok(Arc::clone(provider));
        }

        let provider = (self.factory)(temperature)?;
        debug!(
            "Created provider {} at temperature {}",
            provider.name(),
            temperature
        );
        providers.insert(temperature.to_bits(), Arc::clone(&provider));
        Ok(provider)
    }

    pub fn len(&self) -> usize {
        self.providers.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ProviderPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let providers = self.providers.lock().unwrap_or_else(|e| e.into_inner());
        let mut temperatures: Vec<f32> = providers.keys().map(|bits| f32::from_bits(*bits)).collect();
        temperatures.sort_by(|a, b| a.total_cmp(b));
        f.debug_struct("ProviderPool")
            .field("temperatures", &temperatures)
            .finish_non_exhaustive()
    }
}
