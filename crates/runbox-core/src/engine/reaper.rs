//! Stale-container reaper.
//!
//! Crashed or stuck sessions can leak containers; every container is created
//! with a `sleep 300` placeholder command and auto-remove, so anything older
//! than [`STALE_AGE_SECONDS`] (or already stuck in the daemon's `removing`
//! state) is fair game. Containers younger than the stale age are never
//! touched, which is the only coordination needed with in-flight sessions.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{info, warn};

use crate::docker::ContainerClient;

/// Age past which an unowned container is considered leaked. Also the
/// lifetime of the placeholder `sleep` process every session container runs.
pub const STALE_AGE_SECONDS: i64 = 300;

pub(crate) struct StaleContainerReaper {
    min_interval: Duration,
    last_sweep: Mutex<Option<Instant>>,
}

impl StaleContainerReaper {
    pub fn new(min_interval: Duration) -> Self {
        StaleContainerReaper {
            min_interval,
            last_sweep: Mutex::new(None),
        }
    }

    /// Sweep at most once per `min_interval`; called at request admission.
    pub async fn sweep_if_due(&self, client: &dyn ContainerClient) {
        {
            let mut last = match self.last_sweep.lock() {
                Ok(last) => last,
                Err(poisoned) => poisoned.into_inner(),
            };
            if last.is_some_and(|at| at.elapsed() < self.min_interval) {
                return;
            }
            *last = Some(Instant::now());
        }
        self.sweep(client).await;
    }

    pub async fn sweep(&self, client: &dyn ContainerClient) {
        let containers = match client.list_containers().await {
            Ok(containers) => containers,
            Err(err) => {
                warn!("reaper: container listing failed: {err}");
                return;
            }
        };

        let now = Utc::now().timestamp();
        for container in containers {
            let age = now - container.created_at;
            if container.state != "removing" && age <= STALE_AGE_SECONDS {
                continue;
            }
            info!(
                "reaper: removing container {} ({}, state {}, age {}s)",
                short_id(&container.id),
                container.name,
                container.state,
                age
            );
            if let Err(err) = client.remove_container(&container.id).await {
                warn!("reaper: remove of {} failed: {err}", short_id(&container.id));
            }
        }
    }
}

fn short_id(id: &str) -> &str {
    &id[..id.len().min(10)]
}
