//! Self-checks for hosts that want to know whether conversion can work
//! before they try one.

use crate::loader::{EngineLoader, WorkerSource};
use serde::Serialize;
use tracing::debug;

/// Outcome of an engine initialisation attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineProbe {
    pub available: bool,
    /// Engine name, when one came up.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_src: Option<WorkerSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Whether the local worker candidate is reachable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerResourceCheck {
    pub exists: bool,
    /// The location that was checked; `None` when no local candidate is
    /// configured.
    pub url: Option<String>,
}

impl EngineLoader {
    /// Try to bring the engine up. A success leaves it initialised for later
    /// conversions; a failure leaves nothing behind.
    pub async fn probe_engine(&self) -> EngineProbe {
        match self.acquire().await {
            Ok(handle) => EngineProbe {
                available: true,
                engine: Some(handle.engine().name().to_string()),
                worker_src: Some(handle.worker_src().clone()),
                error: None,
            },
            Err(e) => EngineProbe {
                available: false,
                engine: None,
                worker_src: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Run the same existence probe initialisation would run. Never fails.
    pub async fn check_worker_resource(&self) -> WorkerResourceCheck {
        match self.probe_local().await {
            Some((location, outcome)) => {
                if let Err(e) = &outcome {
                    debug!("Worker resource check: {}", e);
                }
                WorkerResourceCheck {
                    exists: outcome.is_ok(),
                    url: Some(location.to_string()),
                }
            }
            None => WorkerResourceCheck {
                exists: false,
                url: None,
            },
        }
    }
}

/// [`EngineLoader::probe_engine`] on the process-wide loader.
pub async fn probe_engine() -> EngineProbe {
    EngineLoader::global().probe_engine().await
}

/// [`EngineLoader::check_worker_resource`] on the process-wide loader.
pub async fn check_worker_resource() -> WorkerResourceCheck {
    EngineLoader::global().check_worker_resource().await
}
