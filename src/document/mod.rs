mod library;
mod splitter;

pub use library::{generate_library, LAWS};
pub use splitter::{split_document, Chunk};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use crate::error::AppError;

/// A piece of source text plus where it came from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

impl Document {
    pub fn new(text: impl Into<String>, metadata: BTreeMap<String, String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: text.into(),
            metadata,
        }
    }

    pub fn from_source(text: impl Into<String>, url: &str, title: &str) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), url.to_string());
        metadata.insert("title".to_string(), title.to_string());
        Self::new(text, metadata)
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }
}

/// Reads every `.txt`/`.md` file in `dir`, sorted by file name.
pub fn load_directory(dir: &Path) -> Result<Vec<Document>, AppError> {
    if !dir.is_dir() {
        return Err(AppError::Config(format!(
            "Data directory {} does not exist",
            dir.display()
        )));
    }

    let mut paths: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.is_file()
                && matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("txt") | Some("md")
                )
        })
        .collect();
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    for path in paths {
        let text = std::fs::read_to_string(&path)?;
        if text.trim().is_empty() {
            log::debug!("Skipping empty file {}", path.display());
            continue;
        }

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let title = path
            .file_stem()
            .map(|s| s.to_string_lossy().replace('_', " "))
            .unwrap_or_default();

        let mut metadata = BTreeMap::new();
        metadata.insert("file_name".to_string(), file_name);
        metadata.insert("source".to_string(), path.display().to_string());
        metadata.insert("title".to_string(), title);
        documents.push(Document::new(text, metadata));
    }

    Ok(documents)
}
