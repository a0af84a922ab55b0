//! Jupyter notebook (nbformat 4) document model.
//!
//! Only the slice of the format this service touches: code cells with their
//! sources and the four output kinds nbconvert attaches to them. Unknown
//! fields are ignored on parse and omitted on serialization.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Notebook {
    pub metadata: Metadata,
    pub nbformat_minor: i32,
    pub nbformat: i32,
    pub cells: Vec<Cell>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub kernelspec: Kernelspec,
    #[serde(default)]
    pub language_info: LanguageInfo,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Kernelspec {
    pub name: String,
    pub display_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguageInfo {
    pub name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cell {
    pub cell_type: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub source: Vec<String>,
    #[serde(default)]
    pub execution_count: Option<i64>,
    #[serde(default)]
    pub outputs: Vec<Output>,
}

impl Cell {
    pub fn code(source: Vec<String>) -> Self {
        Cell {
            cell_type: "code".to_string(),
            metadata: Map::new(),
            source,
            execution_count: None,
            outputs: Vec::new(),
        }
    }
}

/// One entry of a code cell's `outputs` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "output_type", rename_all = "snake_case")]
pub enum Output {
    Stream {
        name: String,
        text: Vec<String>,
    },
    Error {
        ename: String,
        evalue: String,
        traceback: Vec<String>,
    },
    DisplayData {
        #[serde(default)]
        data: Map<String, Value>,
        #[serde(default)]
        metadata: Map<String, Value>,
    },
    ExecuteResult {
        #[serde(default)]
        execution_count: Option<i64>,
        #[serde(default)]
        data: Map<String, Value>,
        #[serde(default)]
        metadata: Map<String, Value>,
    },
}
