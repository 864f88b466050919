//! Generative-call adapters
//!
//! The `Generator` trait is the seam between the session controller and
//! the model: the proxied callable is the primary adapter (it can analyze
//! images server-side), the direct endpoint is the text-only fallback,
//! and `GeneratorChain` orders them.

use crate::config::GeneratorConfig;
use crate::error::Result;
use std::sync::Arc;

pub mod base;
pub mod chain;
pub mod direct;
pub mod proxied;

pub use base::{GenerateRequest, Generator, HistoryEntry, REFUSAL_FALLBACK};
pub use chain::GeneratorChain;
pub use direct::DirectGenerator;
pub use proxied::ProxiedGenerator;

#[cfg(test)]
pub use base::MockGenerator;

/// Build the generator stack described by the configuration
///
/// Proxied + direct yields the full fallback chain; a single configured
/// endpoint is used on its own.
///
/// # Errors
///
/// Returns error if no endpoint is configured or a client fails to build
pub fn create_generator(config: &GeneratorConfig) -> Result<Arc<dyn Generator>> {
    let has_direct = !config.direct.endpoint.is_empty();
    let has_proxied = !config.proxied.endpoint.is_empty();

    match (has_proxied, has_direct) {
        (true, true) => {
            let primary = Arc::new(ProxiedGenerator::new(config.proxied.clone())?);
            let fallback = Arc::new(DirectGenerator::new(config.direct.clone())?);
            Ok(Arc::new(GeneratorChain::new(primary, fallback)))
        }
        (true, false) => Ok(Arc::new(ProxiedGenerator::new(config.proxied.clone())?)),
        (false, true) => Ok(Arc::new(DirectGenerator::new(config.direct.clone())?)),
        (false, false) => Err(crate::error::AgrichatError::Config(
            "No generative endpoint configured".to_string(),
        )
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_generator_requires_an_endpoint() {
        let config = GeneratorConfig::default();
        assert!(create_generator(&config).is_err());
    }

    #[test]
    fn test_create_generator_direct_only() {
        let mut config = GeneratorConfig::default();
        config.direct.endpoint = "https://model.example/v1".to_string();
        config.direct.api_key = "key".to_string();
        assert!(create_generator(&config).is_ok());
    }

    #[test]
    fn test_create_generator_proxied_only() {
        let mut config = GeneratorConfig::default();
        config.proxied.endpoint = "https://fn.example/chat".to_string();
        assert!(create_generator(&config).is_ok());
    }

    #[test]
    fn test_create_generator_full_chain() {
        let mut config = GeneratorConfig::default();
        config.proxied.endpoint = "https://fn.example/chat".to_string();
        config.direct.endpoint = "https://model.example/v1".to_string();
        config.direct.api_key = "key".to_string();
        assert!(create_generator(&config).is_ok());
    }
}
