//! The ephemeral-container execution engine.
//!
//! [`Engine`] is a stateless façade: each call to [`Engine::execute`]
//! constructs a fresh [`Session`](session::Session) that owns one container
//! from admission through teardown, after giving the stale-container reaper
//! a chance to run. A single engine instance is shared across concurrent
//! requests; sessions share nothing but the container client.

mod logs;
mod reaper;
mod session;

pub use logs::LogLine;
pub use reaper::STALE_AGE_SECONDS;
pub use session::{EngineRequest, RunResult, SourceFile};

use std::sync::Arc;
use std::time::Duration;

use crate::docker::ContainerClient;
use crate::errors::EngineError;
use reaper::StaleContainerReaper;
use session::Session;

/// Minimum spacing between reaper sweeps across all requests.
const REAPER_INTERVAL: Duration = Duration::from_secs(60);

pub struct Engine {
    client: Arc<dyn ContainerClient>,
    reaper: StaleContainerReaper,
}

impl Engine {
    pub fn new(client: Arc<dyn ContainerClient>) -> Self {
        Engine {
            client,
            reaper: StaleContainerReaper::new(REAPER_INTERVAL),
        }
    }

    /// Execute one request in a disposable container.
    pub async fn execute(&self, req: EngineRequest) -> Result<RunResult, EngineError> {
        self.reaper.sweep_if_due(self.client.as_ref()).await;
        Session::new(Arc::clone(&self.client), req).run().await
    }
}
