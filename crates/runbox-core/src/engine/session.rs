//! One container's full lifecycle.
//!
//! A session executes a single [`EngineRequest`] exactly once: image check,
//! create (with a long-running `sleep` placeholder so execs can attach),
//! in-memory tar copy-in, start, exec with demultiplexed draining against a
//! deadline timer, stats sampling around the exec, exit inspection, optional
//! PNG artifact collection, and an unconditional force-remove on every exit
//! path. Failures after create still tear the container down; teardown
//! errors themselves are swallowed because containers are auto-remove and
//! the stale reaper bounds any residue.

use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures_util::StreamExt;
use log::{debug, warn};

use crate::docker::{
    normalize_reference, ContainerClient, ContainerError, ContainerSpec, ExecSpec, LogStream,
};
use crate::engine::logs::{LogLine, LogSink, Transcript};
use crate::engine::reaper::STALE_AGE_SECONDS;
use crate::errors::EngineError;
use crate::runid;

/// Largest artifact the collector will pick up, in bytes.
const MAX_IMAGE_BYTES: u64 = 100 * 1024;

/// A fully-resolved execution request, as produced by the language router
/// or the notebook runner.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineRequest {
    pub image: String,
    /// Interpreter for `command`, invoked as `<shell> -c <command>`.
    pub shell: String,
    pub command: String,
    /// `KEY=VALUE` entries applied to the exec.
    pub env: Vec<String>,
    /// Empty means the image default.
    pub working_dir: String,
    /// Empty means the image default.
    pub user: String,
    /// Files written into the container before the command starts.
    pub files: Vec<SourceFile>,
    pub timeout_ms: u64,
    pub pids_limit: i64,
    pub collect_stats: bool,
    pub pull_if_missing: bool,
    pub collect_images: bool,
    pub collect_images_count: usize,
    /// Optional cumulative character budget for the transcript.
    pub output_limit: Option<usize>,
}

impl Default for EngineRequest {
    fn default() -> Self {
        EngineRequest {
            image: String::new(),
            shell: "sh".to_string(),
            command: String::new(),
            env: Vec::new(),
            working_dir: String::new(),
            user: String::new(),
            files: Vec::new(),
            timeout_ms: 60_000,
            pids_limit: 100,
            collect_stats: true,
            pull_if_missing: true,
            collect_images: false,
            collect_images_count: 2,
            output_limit: None,
        }
    }
}

/// One file to inject, rooted at the container's filesystem root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path inside the container.
    pub path: String,
    pub body: Vec<u8>,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        SourceFile {
            path: path.into(),
            body: body.into(),
        }
    }
}

/// Outcome of one execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunResult {
    /// Transcript lines in emission order (per stream; cross-stream order is
    /// arrival order).
    pub logs: Vec<LogLine>,
    /// Exit code of the exec'd command; 0 when unknown.
    pub code: i64,
    /// Core-microseconds consumed during the exec; 0 with stats disabled.
    pub cpu: u64,
    /// Peak observed resident set in kibibytes; 0 with stats disabled.
    pub mem: u64,
    /// Wall-clock milliseconds of the exec phase.
    pub time: u64,
    pub timedout: bool,
    pub output_limit_reached: bool,
    /// Base64-encoded PNG artifacts from the working directory.
    pub images: Vec<String>,
}

pub(crate) struct Session {
    client: Arc<dyn ContainerClient>,
    req: EngineRequest,
    container_id: Option<String>,
    baseline_cpu_us: u64,
    result: RunResult,
}

impl Session {
    pub fn new(client: Arc<dyn ContainerClient>, req: EngineRequest) -> Self {
        Session {
            client,
            req,
            container_id: None,
            baseline_cpu_us: 0,
            result: RunResult::default(),
        }
    }

    /// Drive the request to completion. Each session may be run at most
    /// once; the container, if one was created, is removed on every path.
    pub async fn run(mut self) -> Result<RunResult, EngineError> {
        let outcome = self.drive().await;
        self.teardown().await;
        outcome?;
        Ok(self.result)
    }

    async fn drive(&mut self) -> Result<(), EngineError> {
        self.ensure_image().await?;
        let id = self.create().await?;
        self.copy_files(&id).await?;
        self.client
            .start_container(&id)
            .await
            .map_err(EngineError::StartFailed)?;
        self.execute(&id).await?;
        self.collect_images(&id).await;
        Ok(())
    }

    async fn ensure_image(&self) -> Result<(), EngineError> {
        let tagged = normalize_reference(&self.req.image)
            .ok_or_else(|| EngineError::InvalidImageReference(self.req.image.clone()))?;

        let present = match self.client.list_images().await {
            Ok(tags) => tags.contains(&tagged),
            Err(err) => {
                warn!("image listing failed, assuming {tagged} absent: {err}");
                false
            }
        };
        if present {
            return Ok(());
        }
        if !self.req.pull_if_missing {
            return Err(EngineError::ImageNotPresent(self.req.image.clone()));
        }
        debug!("pulling image {}", self.req.image);
        self.client
            .pull_image(&self.req.image)
            .await
            .map_err(|source| EngineError::ImagePullFailed {
                image: self.req.image.clone(),
                source,
            })
    }

    async fn create(&mut self) -> Result<String, EngineError> {
        let spec = ContainerSpec {
            name: runid::new(&["runbox"]),
            image: self.req.image.clone(),
            // Placeholder process so the container stays up for exec
            // attachment; its lifetime doubles as the reaper's stale age.
            cmd: vec!["sleep".to_string(), STALE_AGE_SECONDS.to_string()],
            working_dir: self.req.working_dir.clone(),
            user: self.req.user.clone(),
            auto_remove: true,
            pids_limit: self.req.pids_limit,
        };
        let id = self
            .client
            .create_container(&spec)
            .await
            .map_err(EngineError::CreateFailed)?;
        self.container_id = Some(id.clone());
        Ok(id)
    }

    async fn copy_files(&self, id: &str) -> Result<(), EngineError> {
        if self.req.files.is_empty() {
            return Ok(());
        }
        let archive = build_archive(&self.req.files)
            .map_err(|err| EngineError::CopyInFailed(ContainerError::Archive(err)))?;
        self.client
            .copy_in(id, archive)
            .await
            .map_err(EngineError::CopyInFailed)
    }

    async fn execute(&mut self, id: &str) -> Result<(), EngineError> {
        let spec = ExecSpec {
            cmd: vec![
                self.req.shell.clone(),
                "-c".to_string(),
                self.req.command.clone(),
            ],
            env: self.req.env.clone(),
        };
        let exec_id = self
            .client
            .create_exec(id, &spec)
            .await
            .map_err(EngineError::ExecAttachFailed)?;

        if self.req.collect_stats {
            match self.client.stats_once(id).await {
                Ok(stats) => self.baseline_cpu_us = stats.cpu_total_ns / 1000,
                Err(err) => warn!("baseline stats sample failed: {err}"),
            }
        }

        let mut output = self
            .client
            .attach_exec(&exec_id)
            .await
            .map_err(EngineError::ExecAttachFailed)?;

        let started = Instant::now();
        let mut stdout = LogSink::new(LogStream::Stdout);
        let mut stderr = LogSink::new(LogStream::Stderr);
        let mut transcript = Transcript::new(self.req.output_limit);

        let deadline = tokio::time::sleep(Duration::from_millis(self.req.timeout_ms));
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    self.result.timedout = true;
                    break;
                }
                chunk = output.next() => match chunk {
                    Some(Ok(chunk)) => {
                        let sink = match chunk.stream {
                            LogStream::Stdout => &mut stdout,
                            LogStream::Stderr => &mut stderr,
                        };
                        if !sink.write(&chunk.bytes, &mut transcript) {
                            break;
                        }
                    }
                    Some(Err(err)) => {
                        warn!("exec output stream failed: {err}");
                        break;
                    }
                    None => break,
                },
            }
        }

        self.result.time = started.elapsed().as_millis() as u64;
        stdout.close(&mut transcript);
        stderr.close(&mut transcript);
        (self.result.logs, self.result.output_limit_reached) = transcript.finish();

        if self.req.collect_stats {
            match self.client.stats_once(id).await {
                Ok(stats) => {
                    self.result.cpu = (stats.cpu_total_ns / 1000).saturating_sub(self.baseline_cpu_us);
                    self.result.mem = stats.memory_bytes / 1024;
                }
                Err(err) => warn!("final stats sample failed: {err}"),
            }
        }

        // The exec may already be gone (timeout teardown races ahead) or
        // still running; the exit code stays 0 in both cases.
        match self.client.inspect_exec(&exec_id).await {
            Ok(status) if !status.running => {
                self.result.code = status.exit_code.unwrap_or(0);
            }
            Ok(_) => {}
            Err(err) => debug!("exec inspect failed: {err}"),
        }
        Ok(())
    }

    async fn collect_images(&mut self, id: &str) {
        if !self.req.collect_images {
            return;
        }
        let mut stream = match self.client.copy_out(id, &self.req.working_dir).await {
            Ok(stream) => stream,
            Err(err) => {
                warn!("artifact copy-out failed: {err}");
                return;
            }
        };

        let mut archive_bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            match chunk {
                Ok(bytes) => archive_bytes.extend_from_slice(&bytes),
                // Partial reads are end-of-stream, not failures.
                Err(_) => break,
            }
        }

        let mut archive = tar::Archive::new(archive_bytes.as_slice());
        let entries = match archive.entries() {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries {
            let Ok(mut entry) = entry else { break };
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let is_png = entry
                .path()
                .map(|p| p.extension().is_some_and(|ext| ext == "png"))
                .unwrap_or(false);
            if !is_png || entry.size() > MAX_IMAGE_BYTES {
                continue;
            }
            let mut content = Vec::with_capacity(entry.size() as usize);
            if entry.read_to_end(&mut content).is_err() {
                break;
            }
            self.result.images.push(STANDARD.encode(&content));
            if self.result.images.len() >= self.req.collect_images_count {
                break;
            }
        }
    }

    async fn teardown(&mut self) {
        if let Some(id) = self.container_id.take() {
            if let Err(err) = self.client.remove_container(&id).await {
                debug!("container remove failed (auto-remove will finish it): {err}");
            }
        }
    }
}

/// Pack the request files into an in-memory tar archive rooted at `/`.
fn build_archive(files: &[SourceFile]) -> std::io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    for file in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(file.body.len() as u64);
        header.set_mode(0o644);
        builder.append_data(&mut header, file.path.trim_start_matches('/'), file.body.as_slice())?;
    }
    builder.into_inner()
}
