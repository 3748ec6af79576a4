use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::Result;
use crate::types::Document;

/// Documents in arrival order; `Document::id` is the position.
#[derive(Debug, Clone, Default)]
pub struct Corpus {
    documents: Vec<Document>,
}

impl Corpus {
    pub fn new() -> Self { Self::default() }

    pub fn from_pairs<I, N, T>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, T)>,
        N: Into<String>,
        T: Into<String>,
    {
        let mut corpus = Self::new();
        for (name, text) in pairs {
            corpus.push(name, text);
        }
        corpus
    }

    /// Load every `.txt` file under `data_dir`, sorted by path.
    ///
    /// A file that cannot be read is logged and kept as an empty document so
    /// the remaining files still load.
    pub fn from_dir(data_dir: &Path) -> Result<Self> {
        let files = list_txt_files(data_dir);
        if files.is_empty() {
            info!(dir = %data_dir.display(), "no .txt files found");
        }
        let mut corpus = Self::new();
        for (file_index, file_path) in files.iter().enumerate() {
            info!(file = %file_path.display(), "loading file {}/{}", file_index + 1, files.len());
            let text = match read_file_content(file_path) {
                Ok(text) => text,
                Err(e) => {
                    warn!(file = %file_path.display(), error = %e, "extraction failed, treating as empty");
                    String::new()
                }
            };
            let name = file_path.strip_prefix(data_dir).unwrap_or(file_path).to_string_lossy().to_string();
            corpus.push(name, text);
        }
        Ok(corpus)
    }

    pub fn push(&mut self, name: impl Into<String>, text: impl Into<String>) -> usize {
        let id = self.documents.len();
        self.documents.push(Document { id, name: name.into(), text: text.into() });
        id
    }

    pub fn documents(&self) -> &[Document] { &self.documents }

    pub fn len(&self) -> usize { self.documents.len() }

    pub fn is_empty(&self) -> bool { self.documents.is_empty() }
}

fn read_file_content(file_path: &Path) -> std::io::Result<String> {
    match fs::read_to_string(file_path) {
        Ok(content) => Ok(content),
        Err(_) => Ok(String::from_utf8_lossy(&fs::read(file_path)?).to_string()),
    }
}

fn list_txt_files(root: &Path) -> Vec<PathBuf> {
    let mut txt_files: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("txt"))
        .map(|e| e.path().to_path_buf())
        .collect();
    txt_files.sort();
    txt_files
}
