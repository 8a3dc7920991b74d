//! Manifest loading: a directory of YAML documents into a [`Submission`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use kubegrade_cluster::{DocumentSource, ResourceDocument, ResourceKind, ResourceRef};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::domain::error::LoadError;

const MANIFEST_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Reads submission directories.
#[derive(Debug, Clone)]
pub struct ManifestLoader {
    default_namespace: String,
}

impl Default for ManifestLoader {
    fn default() -> Self {
        Self::new("default")
    }
}

impl ManifestLoader {
    pub fn new(default_namespace: impl Into<String>) -> Self {
        Self {
            default_namespace: default_namespace.into(),
        }
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    /// Load every manifest file directly inside `dir`.
    ///
    /// Files are read in file-name order and documents keep their in-file
    /// order. Any malformed document fails the whole load.
    pub fn load_dir(&self, dir: &Path) -> Result<Submission, LoadError> {
        let files = manifest_files(dir)?;

        let mut hasher = Sha256::new();
        let mut documents = Vec::new();

        for path in files {
            let text = fs::read_to_string(&path).map_err(|source| LoadError::Io {
                path: path.clone(),
                source,
            })?;

            if let Some(name) = path.file_name() {
                hasher.update(name.to_string_lossy().as_bytes());
            }
            hasher.update(b"\0");
            hasher.update(text.as_bytes());
            hasher.update(b"\0");

            documents.extend(self.parse_documents(&path, &text)?);
        }
        reject_duplicates(&documents)?;

        if documents.is_empty() {
            return Err(LoadError::Empty(dir.to_path_buf()));
        }

        debug!(dir = %dir.display(), documents = documents.len(), "submission loaded");
        Ok(Submission {
            documents,
            source_dir: dir.to_path_buf(),
            digest: hex::encode(hasher.finalize()),
        })
    }

    /// Parse one multi-document YAML stream.
    pub fn parse_documents(&self, path: &Path, text: &str) -> Result<Vec<ResourceDocument>, LoadError> {
        let mut documents = Vec::new();

        for (index, de) in serde_yaml::Deserializer::from_str(text).enumerate() {
            let value = Value::deserialize(de).map_err(|e| {
                let (line, column) = e
                    .location()
                    .map(|loc| (loc.line(), loc.column()))
                    .unwrap_or((0, 0));
                LoadError::Parse {
                    path: path.to_path_buf(),
                    document: index + 1,
                    line,
                    column,
                    message: e.to_string(),
                }
            })?;

            let body = match value {
                Value::Null => continue,
                Value::Mapping(m) if m.is_empty() => continue,
                Value::Mapping(m) => m,
                _ => {
                    return Err(LoadError::NotAMapping {
                        path: path.to_path_buf(),
                        document: index + 1,
                    })
                }
            };

            documents.push(self.document_from_body(path, index, body)?);
        }

        Ok(documents)
    }

    fn document_from_body(
        &self,
        path: &Path,
        index: usize,
        body: Mapping,
    ) -> Result<ResourceDocument, LoadError> {
        let missing = |field: &'static str| LoadError::MissingField {
            path: path.to_path_buf(),
            document: index + 1,
            field,
        };

        let kind = non_empty_str(body.get("kind")).ok_or_else(|| missing("kind"))?;
        let metadata = body.get("metadata");
        let name = non_empty_str(metadata.and_then(|m| m.get("name")))
            .ok_or_else(|| missing("metadata.name"))?;
        let namespace = non_empty_str(metadata.and_then(|m| m.get("namespace")))
            .unwrap_or_else(|| self.default_namespace.clone());
        let api_version = non_empty_str(body.get("apiVersion"));

        Ok(ResourceDocument {
            kind: ResourceKind::from(kind),
            api_version,
            name,
            namespace,
            body,
            source: DocumentSource {
                path: path.to_path_buf(),
                index,
            },
        })
    }
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Two documents may not address the same kind, namespace and name.
fn reject_duplicates(documents: &[ResourceDocument]) -> Result<(), LoadError> {
    let mut seen: HashMap<ResourceRef, &DocumentSource> = HashMap::new();
    for doc in documents {
        let reference = doc.reference();
        if let Some(first) = seen.get(&reference) {
            return Err(LoadError::Duplicate {
                resource: reference,
                first: first.to_string(),
                second: doc.source.to_string(),
            });
        }
        seen.insert(reference, &doc.source);
    }
    Ok(())
}

fn manifest_files(dir: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let io_err = |source| LoadError::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let entry = entry.map_err(io_err)?;
        let path = entry.path();
        if !entry.file_type().map_err(io_err)?.is_file() {
            continue;
        }
        let is_manifest = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| MANIFEST_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_manifest {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// A loaded submission: the documents in load order.
#[derive(Debug, Clone)]
pub struct Submission {
    documents: Vec<ResourceDocument>,
    source_dir: PathBuf,
    digest: String,
}

impl Submission {
    /// Build a submission from already-parsed documents, with the same
    /// duplicate check as [`ManifestLoader::load_dir`].
    pub fn from_documents(documents: Vec<ResourceDocument>, source_dir: PathBuf) -> Result<Self, LoadError> {
        reject_duplicates(&documents)?;
        let mut hasher = Sha256::new();
        for doc in &documents {
            hasher.update(doc.reference().to_string().as_bytes());
            hasher.update(b"\0");
        }
        Ok(Self {
            documents,
            source_dir,
            digest: hex::encode(hasher.finalize()),
        })
    }

    pub fn documents(&self) -> &[ResourceDocument] {
        &self.documents
    }

    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    /// SHA-256 over file names and contents, in load order.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn of_kind<'a>(&'a self, kind: &'a ResourceKind) -> impl Iterator<Item = &'a ResourceDocument> + 'a {
        self.documents.iter().filter(move |d| &d.kind == kind)
    }

    fn named(&self, kind: &ResourceKind, name: Option<&str>) -> Option<&ResourceDocument> {
        let mut candidates = self.documents.iter().filter(|d| &d.kind == kind);
        match name {
            Some(name) => candidates.find(|d| d.name == name),
            None => candidates.next(),
        }
    }

    /// The named Deployment, or the first one when `name` is `None`.
    pub fn deployment(&self, name: Option<&str>) -> Option<&ResourceDocument> {
        self.named(&ResourceKind::Deployment, name)
    }

    /// The named Service, or the first one when `name` is `None`.
    pub fn service(&self, name: Option<&str>) -> Option<&ResourceDocument> {
        self.named(&ResourceKind::Service, name)
    }

    pub fn config_map(&self, name: &str) -> Option<&ResourceDocument> {
        self.named(&ResourceKind::ConfigMap, Some(name))
    }

    pub fn secret(&self, name: &str) -> Option<&ResourceDocument> {
        self.named(&ResourceKind::Secret, Some(name))
    }

    pub fn find(&self, reference: &ResourceRef) -> Option<&ResourceDocument> {
        self.documents.iter().find(|d| {
            d.kind == reference.kind && d.name == reference.name && d.namespace == reference.namespace
        })
    }
}
