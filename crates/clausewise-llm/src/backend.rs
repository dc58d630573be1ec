use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use clausewise_core::traits::GenerationService;

/// The generation backend chosen at startup.
#[derive(Clone)]
pub struct SelectedBackend {
    pub service: Arc<dyn GenerationService>,
    /// True when the primary did not answer its probe and the fallback did.
    pub is_fallback: bool,
}

impl SelectedBackend {
    pub fn name(&self) -> &str {
        self.service.name()
    }
}

/// Runtime counters reported alongside analysis results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendStats {
    pub active_backend: String,
    pub is_fallback: bool,
    pub admitted_requests: u64,
}

/// Probe the primary once; use the fallback only if the primary is
/// unreachable and the fallback answers. With neither reachable the primary
/// is kept and its calls fail later through the normal retry path.
pub async fn select_backend(primary: Arc<dyn GenerationService>, fallback: Option<Arc<dyn GenerationService>>) -> SelectedBackend {
    if primary.probe().await {
        info!(backend = primary.name(), "using primary generation backend");
        return SelectedBackend { service: primary, is_fallback: false };
    }
    if let Some(fallback) = fallback {
        if fallback.probe().await {
            warn!(primary = primary.name(), fallback = fallback.name(), "primary generation backend unreachable, using fallback");
            return SelectedBackend { service: fallback, is_fallback: true };
        }
    }
    warn!(backend = primary.name(), "no generation backend answered its probe");
    SelectedBackend { service: primary, is_fallback: false }
}
