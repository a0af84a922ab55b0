//! Notebook execution on top of the engine.
//!
//! A notebook request is marshaled into an nbformat-4 document, executed by
//! `jupyter nbconvert` inside the language's notebook image, and the emitted
//! notebook is parsed back into one output group per input cell.

pub mod nbformat;

use std::sync::Arc;

use serde::Deserialize;

use crate::docker::LogStream;
use crate::engine::{Engine, EngineRequest, RunResult, SourceFile};
use crate::errors::EngineError;
use nbformat::{Cell, Notebook, Output};

/// Repository for notebook kernel images, tagged `<lang>-notebook`.
pub const NOTEBOOK_IMAGE_REPOSITORY: &str = "jmnote/runbox";

const NOTEBOOK_PATH: &str = "/tmp/runbox.ipynb";
const NBCONVERT_COMMAND: &str =
    "jupyter nbconvert --execute --to notebook --allow-errors --stdout /tmp/runbox.ipynb";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotebookRequest {
    pub lang: String,
    pub cell_texts: Vec<Vec<String>>,
}

/// One output group per input cell, in cell order, plus the engine's
/// resource figures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotebookResult {
    pub cell_outputs: Vec<Vec<Output>>,
    pub cpu: u64,
    pub mem: u64,
    pub time: u64,
    pub timedout: bool,
}

/// Runs notebook requests through the engine.
pub struct NotebookRunner {
    engine: Arc<Engine>,
}

impl NotebookRunner {
    pub fn new(engine: Arc<Engine>) -> Self {
        NotebookRunner { engine }
    }

    pub async fn execute(&self, req: &NotebookRequest) -> Result<NotebookResult, EngineError> {
        let notebook = build_notebook(req)?;
        let json = serde_json::to_vec(&notebook).map_err(EngineError::NotebookParseFailed)?;

        let result = self
            .engine
            .execute(EngineRequest {
                image: format!("{NOTEBOOK_IMAGE_REPOSITORY}:{}-notebook", req.lang),
                command: NBCONVERT_COMMAND.to_string(),
                working_dir: "/tmp".to_string(),
                files: vec![SourceFile::new(NOTEBOOK_PATH, json)],
                ..Default::default()
            })
            .await?;

        let executed = parse_notebook(&result)?;
        Ok(NotebookResult {
            cell_outputs: executed.cells.into_iter().map(|cell| cell.outputs).collect(),
            cpu: result.cpu,
            mem: result.mem,
            time: result.time,
            timedout: result.timedout,
        })
    }
}

fn build_notebook(req: &NotebookRequest) -> Result<Notebook, EngineError> {
    let mut notebook = Notebook {
        nbformat: 4,
        nbformat_minor: 4,
        ..Default::default()
    };
    match req.lang.as_str() {
        "python" => {
            notebook.metadata.kernelspec.name = "python3".to_string();
            notebook.metadata.language_info.name = "python".to_string();
        }
        "r" => {
            notebook.metadata.kernelspec.name = "ir".to_string();
            notebook.metadata.language_info.name = "R".to_string();
        }
        _ => return Err(EngineError::InvalidLanguage),
    }
    if req.cell_texts.is_empty() {
        return Err(EngineError::NoSources);
    }
    notebook.cells = req.cell_texts.iter().cloned().map(Cell::code).collect();
    Ok(notebook)
}

/// nbconvert writes the executed notebook to stdout; stderr carries kernel
/// chatter and is ignored.
fn parse_notebook(result: &RunResult) -> Result<Notebook, EngineError> {
    let stdout: String = result
        .logs
        .iter()
        .filter(|line| line.stream == LogStream::Stdout)
        .map(|line| line.text.as_str())
        .collect();
    serde_json::from_str(&stdout).map_err(EngineError::NotebookParseFailed)
}

#[cfg(test)]
mod tests;
