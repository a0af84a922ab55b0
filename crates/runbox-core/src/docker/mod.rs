//! Container runtime client abstraction.
//!
//! The engine consumes a container daemon through the [`ContainerClient`]
//! trait rather than a concrete client, so a session can be driven against
//! the real daemon ([`DockerClient`]) or a scripted double
//! ([`crate::testutil::MockContainerClient`]) that fails a chosen step.
//! The capability set is exactly what one container lifecycle needs: image
//! presence and pull, create, tar copy-in, start, exec create/attach with
//! demultiplexed output, one-shot stats, exec inspect, tar copy-out, remove,
//! and a container listing for the stale reaper.

mod client;
mod reference;

pub use client::DockerClient;
pub(crate) use reference::normalize_reference;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::Stream;
use thiserror::Error;

/// Which of the exec's standard streams a chunk or log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

impl LogStream {
    /// Wire digit used by the HTTP transcript encoding.
    pub fn code(self) -> u8 {
        match self {
            LogStream::Stdout => 1,
            LogStream::Stderr => 2,
        }
    }
}

/// One demultiplexed chunk of exec output. Chunk boundaries are arbitrary;
/// a chunk may contain several lines or a fragment of one.
#[derive(Debug, Clone)]
pub struct LogChunk {
    pub stream: LogStream,
    pub bytes: Bytes,
}

pub type LogChunkStream = Pin<Box<dyn Stream<Item = Result<LogChunk, ContainerError>> + Send>>;
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ContainerError>> + Send>>;

/// Parameters for creating one container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub cmd: Vec<String>,
    /// Empty means the image default.
    pub working_dir: String,
    /// Empty means the image default.
    pub user: String,
    pub auto_remove: bool,
    pub pids_limit: i64,
}

/// Parameters for creating one exec inside a running container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecSpec {
    pub cmd: Vec<String>,
    pub env: Vec<String>,
}

/// One-shot resource sample for a running container.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContainerStats {
    /// Cumulative CPU usage over all cores, in nanoseconds.
    pub cpu_total_ns: u64,
    /// Current resident memory, in bytes.
    pub memory_bytes: u64,
}

/// Exit state of an exec.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecStatus {
    pub exit_code: Option<i64>,
    pub running: bool,
}

/// Summary row from the daemon's container listing, as consumed by the
/// stale-container reaper.
#[derive(Debug, Clone, Default)]
pub struct ContainerBrief {
    pub id: String,
    pub name: String,
    pub state: String,
    /// Unix timestamp of container creation.
    pub created_at: i64,
}

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("docker api: {0}")]
    Api(#[from] bollard::errors::Error),
    #[error("archive: {0}")]
    Archive(#[from] std::io::Error),
    #[error("{0}")]
    Fault(String),
}

/// The container daemon capability set consumed by the engine.
///
/// Implementations must be safe to share across concurrent sessions.
#[async_trait]
pub trait ContainerClient: Send + Sync {
    /// All locally present image tags, in `repo:tag` form.
    async fn list_images(&self) -> Result<Vec<String>, ContainerError>;

    /// Pull an image, draining the progress stream until it closes.
    async fn pull_image(&self, image: &str) -> Result<(), ContainerError>;

    /// Create a container and return its daemon-assigned id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, ContainerError>;

    /// Unpack a tar archive at the container's filesystem root.
    async fn copy_in(&self, id: &str, archive: Vec<u8>) -> Result<(), ContainerError>;

    async fn start_container(&self, id: &str) -> Result<(), ContainerError>;

    /// Create an exec with stdout and stderr attached; returns the exec id.
    async fn create_exec(&self, id: &str, spec: &ExecSpec) -> Result<String, ContainerError>;

    /// Attach to a created exec, starting it, and return its demultiplexed
    /// output stream.
    async fn attach_exec(&self, exec_id: &str) -> Result<LogChunkStream, ContainerError>;

    /// Take a single stats sample without streaming.
    async fn stats_once(&self, id: &str) -> Result<ContainerStats, ContainerError>;

    async fn inspect_exec(&self, exec_id: &str) -> Result<ExecStatus, ContainerError>;

    /// Stream a directory out of the container as a tar archive.
    async fn copy_out(&self, id: &str, path: &str) -> Result<ByteStream, ContainerError>;

    /// Force-remove a container.
    async fn remove_container(&self, id: &str) -> Result<(), ContainerError>;

    /// List all containers, running or not.
    async fn list_containers(&self) -> Result<Vec<ContainerBrief>, ContainerError>;
}
