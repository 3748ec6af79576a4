//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (nested keys separated by `__`, e.g.
//! `APP_RETRIEVAL__TOP_K=8`).
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::Metric;

/// Heading vocabulary recognised by the chunker out of the box.
pub const DEFAULT_SECTION_HEADINGS: &[&str] = &[
    "abstract", "introduction", "related work", "background",
    "method", "methods", "methodology", "approach", "model",
    "experiments", "experimental setup", "setup", "evaluation",
    "results", "analysis", "discussion", "conclusion", "conclusions",
    "future work", "limitations", "references", "acknowledgements",
    "acknowledgments", "appendix",
];

pub const DEFAULT_SKIP_SECTIONS: &[&str] = &["references", "acknowledgments", "appendix"];

pub const DEFAULT_SECTION_PRIORITY: &[(&str, f32)] = &[
    ("abstract", 3.0),
    ("introduction", 2.5),
    ("method", 2.2),
    ("methods", 2.2),
    ("approach", 2.0),
    ("model", 1.8),
    ("analysis", 1.8),
    ("results", 1.6),
    ("experiments", 1.4),
    ("evaluation", 1.3),
    ("conclusion", 1.3),
    ("discussion", 1.2),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub sentences_per_chunk: usize,
    pub overlap_sentences: usize,
    pub headings: Vec<String>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            sentences_per_chunk: 4,
            overlap_sentences: 1,
            headings: DEFAULT_SECTION_HEADINGS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ChunkingConfig {
    pub fn with_window(sentences_per_chunk: usize, overlap_sentences: usize) -> Self {
        Self { sentences_per_chunk, overlap_sentences, ..Self::default() }
    }

    /// The window must advance: `overlap_sentences < sentences_per_chunk`.
    pub fn validate(&self) -> Result<()> {
        if self.overlap_sentences >= self.sentences_per_chunk {
            return Err(Error::Config(format!(
                "overlap_sentences ({}) must be smaller than sentences_per_chunk ({})",
                self.overlap_sentences, self.sentences_per_chunk
            )));
        }
        Ok(())
    }

    pub fn step(&self) -> usize { self.sentences_per_chunk - self.overlap_sentences }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub metric: String,
    pub dir: String,
    /// `cpu`, `cuda:N` or `metal:N`; unset keeps the index on the host.
    pub accelerator: Option<String>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { metric: Metric::L2.as_str().to_string(), dir: "index".to_string(), accelerator: None }
    }
}

impl IndexConfig {
    pub fn metric(&self) -> Result<Metric> { self.metric.parse() }

    /// Index directory with `~` and env vars expanded, relative to `base`.
    pub fn dir_in(&self, base: &Path) -> PathBuf { resolve_with_base(base, &self.dir) }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub batch_size: usize,
    pub dimension: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self { Self { batch_size: 32, dimension: 384, timeout_secs: 30 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub oversample_factor: usize,
    pub rewrite_query: bool,
    pub skip_sections: BTreeSet<String>,
    pub section_priority: BTreeMap<String, f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            oversample_factor: 3,
            rewrite_query: false,
            skip_sections: DEFAULT_SKIP_SECTIONS.iter().map(|s| s.to_string()).collect(),
            section_priority: DEFAULT_SECTION_PRIORITY.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        }
    }
}

impl RetrievalConfig {
    /// Weight for a section label; unknown sections weigh 1.0. Labels and
    /// configured keys compare case-insensitively.
    pub fn priority(&self, section: &str) -> f32 {
        if let Some(weight) = self.section_priority.get(section) {
            return *weight;
        }
        self.section_priority
            .iter()
            .find(|(label, _)| label.eq_ignore_ascii_case(section))
            .map_or(1.0, |(_, weight)| *weight)
    }

    pub fn is_skipped(&self, section: &str) -> bool {
        self.skip_sections.contains(section) || self.skip_sections.iter().any(|label| label.eq_ignore_ascii_case(section))
    }
}

/// Typed view over every configurable knob.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunking: ChunkingConfig,
    pub index: IndexConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.index.metric()?;
        if self.embedding.batch_size == 0 {
            return Err(Error::Config("embedding.batch_size must be positive".into()));
        }
        if self.retrieval.oversample_factor == 0 {
            return Err(Error::Config("retrieval.oversample_factor must be at least 1".into()));
        }
        if self.retrieval.top_k == 0 {
            return Err(Error::Config("retrieval.top_k must be positive".into()));
        }
        Ok(())
    }
}

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> { Self::load_in(Path::new(".")) }

    /// Merge defaults, `config.toml`, `config.<RUST_ENV>.toml` and `APP_*` env vars.
    pub fn load_in(base: &Path) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(base.join("config.toml")));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file(base.join("config.dev.toml"))),
            "prod" | "production" => figment = figment.merge(Toml::file(base.join("config.prod.toml"))),
            "test" | "testing" => figment = figment.merge(Toml::file(base.join("config.test.toml"))),
            other => figment = figment.merge(Toml::file(base.join(format!("config.{other}.toml")))),
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self { Self { figment } }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        Ok(self.figment.extract_inner(key)?)
    }

    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self.figment.extract()?;
        settings.validate()?;
        Ok(settings)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
