//! Core engine for a multi-tenant code-execution sandbox service.
//!
//! Given a program in one of a fixed set of languages, the service executes
//! it inside a disposable container, enforces time and pids limits, captures
//! stdout/stderr as a structured transcript, measures CPU and memory, and
//! optionally extracts image artifacts — one request, one container, one
//! response.
//!
//! # Architecture Overview
//!
//! - **Container client**: the daemon capability set behind an object-safe
//!   trait, with a bollard implementation and a scriptable test double
//! - **Engine & sessions**: a stateless façade constructing one session per
//!   request; the session owns the container's whole lifecycle and always
//!   removes it, with a stale-container reaper bounding leaks across crashes
//! - **Language router**: the table of per-language recipes turning a
//!   language-tagged program into a concrete container invocation
//! - **Notebook runner**: notebook-format marshaling around the same engine

pub mod docker;
pub mod engine;
pub mod errors;
pub mod languages;
pub mod notebook;
pub mod runid;
pub mod testutil;

pub use docker::{ContainerClient, DockerClient, LogStream};
pub use engine::{Engine, EngineRequest, LogLine, RunResult, SourceFile, STALE_AGE_SECONDS};
pub use errors::EngineError;
pub use languages::{LangRunner, LanguageRequest, Overrides};
pub use notebook::{NotebookRequest, NotebookResult, NotebookRunner};
