//! Generator fallback chain
//!
//! Orders two adapters: the proxied callable first, the direct text-only
//! endpoint second. Routing is driven by the structured error kind, never
//! by error message text:
//!
//! - image-analysis failures propagate distinctly (the user sees a
//!   different notification than a general failure);
//! - other failures on an image turn fall back to the direct call with the
//!   image stripped;
//! - failures on a text-only turn propagate unchanged.

use crate::error::{classify, ErrorKind, Result};
use crate::providers::base::{GenerateRequest, Generator};
use async_trait::async_trait;
use std::sync::Arc;

/// Ordered chain of generative-call adapters
pub struct GeneratorChain {
    primary: Arc<dyn Generator>,
    fallback: Option<Arc<dyn Generator>>,
}

impl GeneratorChain {
    /// Chain a primary adapter with a text-only fallback
    pub fn new(primary: Arc<dyn Generator>, fallback: Arc<dyn Generator>) -> Self {
        Self {
            primary,
            fallback: Some(fallback),
        }
    }

    /// A chain with no fallback; failures always propagate
    pub fn without_fallback(primary: Arc<dyn Generator>) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }
}

#[async_trait]
impl Generator for GeneratorChain {
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        match self.primary.generate(request).await {
            Ok(text) => Ok(text),
            Err(err) => {
                let kind = classify(&err);

                if kind == ErrorKind::ImageAnalysis {
                    return Err(err);
                }

                if request.image_url.is_some() {
                    if let Some(fallback) = &self.fallback {
                        tracing::warn!(
                            "primary generator failed on image turn, falling back text-only: {}",
                            err
                        );
                        return fallback.generate(&request.without_image()).await;
                    }
                }

                Err(err)
            }
        }
    }
}
