//! Knowledge store collaborator and a local, read-only implementation.
//!
//! The local store reads every `*.json` file under `<root>/<namespace>/`
//! once at open time. Each file holds one record or an array of records.

use crate::error::StoreError;
use crate::models::{truncate_chars, SourceDocument};
use crate::routing::terms::{contains_term, normalize};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Characters of record content kept as a document excerpt.
const EXCERPT_CHARS: usize = 1200;

/// Query terms shorter than this are ignored when scoring.
const MIN_TERM_LEN: usize = 3;

/// Vector-search collaborator.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Up to `k` documents ranked by descending relevance in [0, 1].
    async fn search(
        &self,
        namespace: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SourceDocument>, StoreError>;

    /// Every document in a namespace, in corpus order.
    async fn list(&self, namespace: &str) -> Result<Vec<SourceDocument>, StoreError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum PageRef {
    Number(u64),
    Text(String),
}

impl PageRef {
    fn into_string(self) -> String {
        match self {
            PageRef::Number(n) => n.to_string(),
            PageRef::Text(s) => s,
        }
    }
}

/// One knowledge record on disk.
#[derive(Debug, Clone, Deserialize)]
pub struct KnowledgeRecord {
    pub file_path: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    page: Option<PageRef>,
    #[serde(default)]
    section: Option<String>,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    source_type: Option<String>,
    #[serde(default)]
    pub content: String,
}

impl KnowledgeRecord {
    fn haystack(&self) -> String {
        let mut text = normalize(&self.content);
        if let Some(title) = &self.title {
            text.push(' ');
            text.push_str(&normalize(title));
        }
        text
    }

    fn to_document(&self, relevance: f32) -> SourceDocument {
        let mut doc = SourceDocument::from_path(&self.file_path, relevance)
            .with_excerpt(truncate_chars(self.content.trim(), EXCERPT_CHARS));
        if let Some(title) = &self.title {
            doc = doc.with_title(title.clone());
        }
        if let Some(page) = &self.page {
            doc = doc.with_page(page.clone().into_string());
        }
        if let Some(section) = &self.section {
            doc = doc.with_section(section.clone());
        }
        if let Some(company) = &self.company {
            doc = doc.with_company(company.clone());
        }
        if let Some(date) = &self.date {
            doc = doc.with_date(date.clone());
        }
        if let Some(source_type) = &self.source_type {
            doc = doc.with_source_type(source_type.clone());
        }
        doc
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RecordFile {
    Many(Vec<KnowledgeRecord>),
    One(KnowledgeRecord),
}

/// Distinct lowercase terms of at least [`MIN_TERM_LEN`] characters.
fn query_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    normalize(query)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= MIN_TERM_LEN)
        .filter(|t| seen.insert(t.to_string()))
        .map(String::from)
        .collect()
}

/// Knowledge store loaded from a directory tree.
#[derive(Debug, Clone, Default)]
pub struct LocalKnowledgeStore {
    namespaces: BTreeMap<String, Vec<KnowledgeRecord>>,
}

impl LocalKnowledgeStore {
    /// Loads every namespace under `root`. Unreadable or malformed files fail the open.
    pub fn open(root: &Path) -> Result<Self, StoreError> {
        let entries = fs::read_dir(root).map_err(|source| StoreError::Io {
            path: root.to_path_buf(),
            source,
        })?;

        let mut namespaces = BTreeMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let records = Self::load_namespace(&path)?;
            debug!("Loaded {} record(s) for namespace '{}'", records.len(), name);
            namespaces.insert(name, records);
        }

        info!(
            "Opened knowledge store at {} ({} namespace(s))",
            root.display(),
            namespaces.len()
        );
        Ok(Self { namespaces })
    }

    fn load_namespace(dir: &Path) -> Result<Vec<KnowledgeRecord>, StoreError> {
        let mut records = Vec::new();

        for entry in WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("json")
            {
                continue;
            }

            let content = fs::read_to_string(path).map_err(|source| StoreError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            let parsed: RecordFile =
                serde_json::from_str(&content).map_err(|e| StoreError::Parse {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;

            match parsed {
                RecordFile::Many(many) => records.extend(many),
                RecordFile::One(one) => records.push(one),
            }
        }

        if records.is_empty() {
            warn!("Namespace directory {} holds no records", dir.display());
        }
        Ok(records)
    }

    /// Builds a store from in-memory records.
    pub fn from_records(namespaces: BTreeMap<String, Vec<KnowledgeRecord>>) -> Self {
        Self { namespaces }
    }

    pub fn namespaces(&self) -> Vec<&str> {
        self.namespaces.keys().map(String::as_str).collect()
    }

    fn records(&self, namespace: &str) -> Result<&[KnowledgeRecord], StoreError> {
        self.namespaces
            .get(namespace)
            .map(Vec::as_slice)
            .ok_or_else(|| StoreError::UnknownNamespace(namespace.to_string()))
    }

    /// Synchronous search used by the trait implementation.
    pub fn search_sync(
        &self,
        namespace: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SourceDocument>, StoreError> {
        let records = self.records(namespace)?;
        let terms = query_terms(query);
        if terms.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(f32, &KnowledgeRecord)> = records
            .iter()
            .filter_map(|record| {
                let haystack = record.haystack();
                let hits = terms.iter().filter(|t| contains_term(&haystack, t)).count();
                (hits > 0).then(|| (hits as f32 / terms.len() as f32, record))
            })
            .collect();

        // Stable sort keeps corpus order among equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, record)| record.to_document(score))
            .collect())
    }
}

#[async_trait]
impl KnowledgeStore for LocalKnowledgeStore {
    async fn search(
        &self,
        namespace: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SourceDocument>, StoreError> {
        self.search_sync(namespace, query, k)
    }

    async fn list(&self, namespace: &str) -> Result<Vec<SourceDocument>, StoreError> {
        Ok(self
            .records(namespace)?
            .iter()
            .map(|r| r.to_document(0.0))
            .collect())
    }
}
