use std::io::Read;
use std::sync::Arc;

use serde_json::{json, Value};

use super::nbformat::Output;
use super::*;
use crate::docker::LogStream;
use crate::engine::Engine;
use crate::testutil::MockContainerClient;

fn notebook_request(lang: &str, cells: &[&str]) -> NotebookRequest {
    NotebookRequest {
        lang: lang.to_string(),
        cell_texts: cells.iter().map(|c| vec![c.to_string()]).collect(),
    }
}

fn runner(client: MockContainerClient) -> (Arc<MockContainerClient>, NotebookRunner) {
    let client = Arc::new(client);
    let engine = Arc::new(Engine::new(client.clone()));
    (client, NotebookRunner::new(engine))
}

/// The notebook nbconvert would print for the given request, with one
/// stdout stream output per cell.
fn executed_notebook_json(req: &NotebookRequest, texts: &[&str]) -> String {
    let notebook = build_notebook(req).unwrap();
    let mut value = serde_json::to_value(&notebook).unwrap();
    for (cell, text) in value["cells"].as_array_mut().unwrap().iter_mut().zip(texts) {
        cell["outputs"] = json!([{
            "output_type": "stream",
            "name": "stdout",
            "text": [text],
        }]);
    }
    value.to_string()
}

#[tokio::test]
async fn invalid_language_rejected() {
    let (client, runner) = runner(MockContainerClient::new());
    let err = runner.execute(&notebook_request("julia", &["1+1"])).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidLanguage));
    assert!(client.created.lock().map(|c| c.is_empty()).unwrap_or(false));
}

#[tokio::test]
async fn empty_cells_rejected() {
    let (client, runner) = runner(MockContainerClient::new());
    let err = runner.execute(&notebook_request("python", &[])).await.unwrap_err();
    assert!(matches!(err, EngineError::NoSources));
    assert!(client.created.lock().map(|c| c.is_empty()).unwrap_or(false));
}

#[test]
fn marshaled_document_shape() {
    let notebook = build_notebook(&notebook_request("python", &["print('a')", "print('b')"])).unwrap();
    let value = serde_json::to_value(&notebook).unwrap();

    assert_eq!(value["nbformat"], 4);
    assert_eq!(value["nbformat_minor"], 4);
    assert_eq!(value["metadata"]["kernelspec"]["name"], "python3");
    assert_eq!(value["metadata"]["language_info"]["name"], "python");
    let cells = value["cells"].as_array().unwrap();
    assert_eq!(cells.len(), 2);
    assert_eq!(cells[0]["cell_type"], "code");
    assert_eq!(cells[0]["source"], json!(["print('a')"]));
    assert_eq!(cells[0]["outputs"], json!([]));
    assert_eq!(cells[1]["source"], json!(["print('b')"]));
}

#[test]
fn r_kernelspec() {
    let notebook = build_notebook(&notebook_request("r", &["1"])).unwrap();
    assert_eq!(notebook.metadata.kernelspec.name, "ir");
    assert_eq!(notebook.metadata.language_info.name, "R");
}

#[tokio::test]
async fn executes_in_notebook_image_with_injected_document() {
    let req = notebook_request("python", &["print('a')"]);
    let stdout = executed_notebook_json(&req, &["a\n"]);
    let client = MockContainerClient::new().with_chunk(LogStream::Stdout, &stdout);
    let (client, runner) = runner(client);

    runner.execute(&req).await.unwrap();

    let created = client.created.lock().map(|c| c.clone()).unwrap_or_default();
    assert_eq!(created[0].image, "jmnote/runbox:python-notebook");
    assert_eq!(created[0].working_dir, "/tmp");

    let execs = client.execs.lock().map(|e| e.clone()).unwrap_or_default();
    assert_eq!(
        execs[0].cmd,
        vec![
            "sh".to_string(),
            "-c".to_string(),
            "jupyter nbconvert --execute --to notebook --allow-errors --stdout /tmp/runbox.ipynb"
                .to_string(),
        ]
    );

    let copied = client.copied.lock().map(|c| c.clone()).unwrap_or_default();
    let mut archive = tar::Archive::new(copied[0].as_slice());
    let mut entry = archive.entries().unwrap().next().unwrap().unwrap();
    assert_eq!(entry.path().unwrap().to_string_lossy(), "tmp/runbox.ipynb");
    let mut body = String::new();
    entry.read_to_string(&mut body).unwrap();
    let document: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(document["nbformat"], 4);
}

#[tokio::test]
async fn one_output_group_per_cell_in_order() {
    let req = notebook_request("python", &["print('a')", "print('b')"]);
    let stdout = executed_notebook_json(&req, &["a\n", "b\n"]);
    let client = MockContainerClient::new()
        .with_chunk(LogStream::Stdout, &stdout)
        .with_chunk(LogStream::Stderr, "[NbConvertApp] Converting notebook\n");
    let (_, runner) = runner(client);

    let result = runner.execute(&req).await.unwrap();

    assert_eq!(result.cell_outputs.len(), 2);
    assert_eq!(
        result.cell_outputs[0],
        vec![Output::Stream {
            name: "stdout".to_string(),
            text: vec!["a\n".to_string()],
        }]
    );
    assert_eq!(
        result.cell_outputs[1],
        vec![Output::Stream {
            name: "stdout".to_string(),
            text: vec!["b\n".to_string()],
        }]
    );
}

#[tokio::test]
async fn cells_without_output_keep_their_position() {
    let req = notebook_request("python", &["x = 1", "print(x)"]);
    let executed = {
        let notebook = build_notebook(&req).unwrap();
        let mut value = serde_json::to_value(&notebook).unwrap();
        value["cells"][1]["outputs"] = json!([{
            "output_type": "execute_result",
            "execution_count": 2,
            "data": {"text/plain": ["1"]},
            "metadata": {},
        }]);
        value.to_string()
    };
    let client = MockContainerClient::new().with_chunk(LogStream::Stdout, &executed);
    let (_, runner) = runner(client);

    let result = runner.execute(&req).await.unwrap();

    assert_eq!(result.cell_outputs.len(), 2);
    assert!(result.cell_outputs[0].is_empty());
    assert!(matches!(
        &result.cell_outputs[1][0],
        Output::ExecuteResult { execution_count: Some(2), .. }
    ));
}

#[tokio::test]
async fn stdout_split_across_lines_reassembles() {
    // The engine frames stdout into lines; parsing must tolerate the
    // document arriving as many lines.
    let req = notebook_request("python", &["print('a')"]);
    let stdout = executed_notebook_json(&req, &["a\n"]);
    let pretty: String = {
        let value: Value = serde_json::from_str(&stdout).unwrap();
        serde_json::to_string_pretty(&value).unwrap()
    };
    let client = MockContainerClient::new().with_chunk(LogStream::Stdout, &pretty);
    let (_, runner) = runner(client);

    let result = runner.execute(&req).await.unwrap();
    assert_eq!(result.cell_outputs.len(), 1);
}

#[tokio::test]
async fn garbage_stdout_is_a_parse_error() {
    let client = MockContainerClient::new().with_chunk(LogStream::Stdout, "kernel died\n");
    let (_, runner) = runner(client);
    let err = runner
        .execute(&notebook_request("python", &["print('a')"]))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotebookParseFailed(_)));
}

#[tokio::test]
async fn resource_figures_pass_through() {
    use crate::docker::ContainerStats;

    let req = notebook_request("python", &["print('a')"]);
    let stdout = executed_notebook_json(&req, &["a\n"]);
    let client = MockContainerClient::new()
        .with_chunk(LogStream::Stdout, &stdout)
        .with_stats(&[
            ContainerStats { cpu_total_ns: 0, memory_bytes: 0 },
            ContainerStats { cpu_total_ns: 7_000_000, memory_bytes: 2048 * 1024 },
        ]);
    let (_, runner) = runner(client);

    let result = runner.execute(&req).await.unwrap();
    assert_eq!(result.cpu, 7_000);
    assert_eq!(result.mem, 2048);
    assert!(!result.timedout);
}
