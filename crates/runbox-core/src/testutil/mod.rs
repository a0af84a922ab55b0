//! Test support: a scriptable container client and table-test helpers.
//!
//! The engine's fault behavior is exercised by failing a single chosen step
//! of the container protocol; [`MockContainerClient`] injects that failure
//! at a [`FailPoint`] and records every lifecycle call so tests can assert
//! on container hygiene (was the container removed on this path?) without a
//! daemon.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use futures_util::StreamExt;

use crate::docker::{
    ByteStream, ContainerBrief, ContainerClient, ContainerError, ContainerSpec, ContainerStats,
    ExecSpec, ExecStatus, LogChunk, LogChunkStream, LogStream,
};

/// Protocol step at which the mock fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailPoint {
    ListImages,
    PullImage,
    Create,
    CopyIn,
    Start,
    CreateExec,
    AttachExec,
    Stats,
    InspectExec,
    CopyOut,
    Remove,
    ListContainers,
}

#[derive(Default)]
pub struct MockContainerClient {
    images: Vec<String>,
    chunks: Vec<(LogStream, Vec<u8>)>,
    hang_after_output: bool,
    exit_code: i64,
    exec_running: bool,
    stats: Mutex<VecDeque<ContainerStats>>,
    stats_calls: AtomicU64,
    copy_out_archive: Option<Vec<u8>>,
    containers: Vec<ContainerBrief>,
    list_calls: AtomicU64,
    fail: Option<FailPoint>,
    next_id: AtomicU64,
    pub pulled: Mutex<Vec<String>>,
    pub created: Mutex<Vec<ContainerSpec>>,
    pub copied: Mutex<Vec<Vec<u8>>>,
    pub started: Mutex<Vec<String>>,
    pub execs: Mutex<Vec<ExecSpec>>,
    pub removed: Mutex<Vec<String>>,
}

impl MockContainerClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locally present image tags, `repo:tag` form.
    pub fn with_images(mut self, tags: &[&str]) -> Self {
        self.images = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// One exec output chunk; may contain any number of (partial) lines.
    pub fn with_chunk(mut self, stream: LogStream, bytes: &str) -> Self {
        self.chunks.push((stream, bytes.as_bytes().to_vec()));
        self
    }

    /// Keep the exec output stream open forever after the scripted chunks,
    /// forcing the session's deadline to fire.
    pub fn with_hanging_stream(mut self) -> Self {
        self.hang_after_output = true;
        self
    }

    pub fn with_exit_code(mut self, code: i64) -> Self {
        self.exit_code = code;
        self
    }

    /// Report the exec as still running at inspect time.
    pub fn with_exec_running(mut self) -> Self {
        self.exec_running = true;
        self
    }

    /// Queue stats samples returned in order (baseline first).
    pub fn with_stats(self, samples: &[ContainerStats]) -> Self {
        match self.stats.lock() {
            Ok(mut stats) => stats.extend(samples.iter().copied()),
            Err(_) => unreachable!("mock stats lock poisoned during setup"),
        }
        self
    }

    /// Tar archive served by copy-out.
    pub fn with_copy_out_archive(mut self, archive: Vec<u8>) -> Self {
        self.copy_out_archive = Some(archive);
        self
    }

    /// Containers reported by the listing, for reaper tests.
    pub fn with_containers(mut self, containers: Vec<ContainerBrief>) -> Self {
        self.containers = containers;
        self
    }

    pub fn with_failure(mut self, point: FailPoint) -> Self {
        self.fail = Some(point);
        self
    }

    pub fn stats_calls(&self) -> u64 {
        self.stats_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::SeqCst)
    }

    fn check(&self, point: FailPoint) -> Result<(), ContainerError> {
        if self.fail == Some(point) {
            Err(ContainerError::Fault(format!("injected failure at {point:?}")))
        } else {
            Ok(())
        }
    }

    fn record(list: &Mutex<Vec<ContainerSpec>>, spec: &ContainerSpec) {
        if let Ok(mut list) = list.lock() {
            list.push(spec.clone());
        }
    }
}

#[async_trait]
impl ContainerClient for MockContainerClient {
    async fn list_images(&self) -> Result<Vec<String>, ContainerError> {
        self.check(FailPoint::ListImages)?;
        Ok(self.images.clone())
    }

    async fn pull_image(&self, image: &str) -> Result<(), ContainerError> {
        self.check(FailPoint::PullImage)?;
        if let Ok(mut pulled) = self.pulled.lock() {
            pulled.push(image.to_string());
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, ContainerError> {
        self.check(FailPoint::Create)?;
        Self::record(&self.created, spec);
        let seq = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("container-{seq}"))
    }

    async fn copy_in(&self, _id: &str, archive: Vec<u8>) -> Result<(), ContainerError> {
        self.check(FailPoint::CopyIn)?;
        if let Ok(mut copied) = self.copied.lock() {
            copied.push(archive);
        }
        Ok(())
    }

    async fn start_container(&self, id: &str) -> Result<(), ContainerError> {
        self.check(FailPoint::Start)?;
        if let Ok(mut started) = self.started.lock() {
            started.push(id.to_string());
        }
        Ok(())
    }

    async fn create_exec(&self, _id: &str, spec: &ExecSpec) -> Result<String, ContainerError> {
        self.check(FailPoint::CreateExec)?;
        if let Ok(mut execs) = self.execs.lock() {
            execs.push(spec.clone());
        }
        Ok("exec-0".to_string())
    }

    async fn attach_exec(&self, _exec_id: &str) -> Result<LogChunkStream, ContainerError> {
        self.check(FailPoint::AttachExec)?;
        let chunks: Vec<Result<LogChunk, ContainerError>> = self
            .chunks
            .iter()
            .map(|(stream, bytes)| {
                Ok(LogChunk {
                    stream: *stream,
                    bytes: Bytes::from(bytes.clone()),
                })
            })
            .collect();
        if self.hang_after_output {
            Ok(Box::pin(stream::iter(chunks).chain(stream::pending())))
        } else {
            Ok(Box::pin(stream::iter(chunks)))
        }
    }

    async fn stats_once(&self, _id: &str) -> Result<ContainerStats, ContainerError> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        self.check(FailPoint::Stats)?;
        let sample = match self.stats.lock() {
            Ok(mut stats) => stats.pop_front(),
            Err(_) => None,
        };
        Ok(sample.unwrap_or_default())
    }

    async fn inspect_exec(&self, _exec_id: &str) -> Result<ExecStatus, ContainerError> {
        self.check(FailPoint::InspectExec)?;
        Ok(ExecStatus {
            exit_code: Some(self.exit_code),
            running: self.exec_running,
        })
    }

    async fn copy_out(&self, _id: &str, _path: &str) -> Result<ByteStream, ContainerError> {
        self.check(FailPoint::CopyOut)?;
        let chunks: Vec<Result<Bytes, ContainerError>> = self
            .copy_out_archive
            .iter()
            .map(|archive| Ok(Bytes::from(archive.clone())))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn remove_container(&self, id: &str) -> Result<(), ContainerError> {
        self.check(FailPoint::Remove)?;
        if let Ok(mut removed) = self.removed.lock() {
            removed.push(id.to_string());
        }
        Ok(())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerBrief>, ContainerError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.check(FailPoint::ListContainers)?;
        Ok(self.containers.clone())
    }
}

/// Format a table-test case name: two-digit index, whitespace and
/// underscores collapsed, `/` replaced, truncated to 64 characters.
pub fn case_name(index: usize, parts: &[&str]) -> String {
    let mut name = format!("{index:02}");
    for part in parts {
        name.push(' ');
        name.push_str(part);
    }
    let mut collapsed = String::with_capacity(name.len());
    let mut in_gap = false;
    for ch in name.chars() {
        if ch.is_whitespace() || ch == '_' {
            in_gap = true;
            continue;
        }
        if in_gap && !collapsed.is_empty() {
            collapsed.push(' ');
        }
        in_gap = false;
        collapsed.push(if ch == '/' { '%' } else { ch });
    }
    if collapsed.chars().count() > 64 {
        let cut: String = collapsed.chars().take(61).collect();
        format!("{cut}...")
    } else {
        collapsed
    }
}
