//! Domain-level error taxonomy for kubegrade.

use std::path::PathBuf;

use kubegrade_cluster::ResourceRef;

/// Errors produced while reading a submission directory.
///
/// Any of these aborts the run before the cluster is touched.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: document {document} is not valid YAML at line {line}, column {column}: {message}")]
    Parse {
        path: PathBuf,
        document: usize,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("{path}: document {document} is not a mapping")]
    NotAMapping { path: PathBuf, document: usize },

    #[error("{path}: document {document} is missing required field `{field}`")]
    MissingField {
        path: PathBuf,
        document: usize,
        field: &'static str,
    },

    #[error("duplicate resource {resource}: defined in {first} and again in {second}")]
    Duplicate {
        resource: ResourceRef,
        first: String,
        second: String,
    },

    #[error("no resource documents found in {0}")]
    Empty(PathBuf),
}

impl LoadError {
    /// The file the error points at, when there is one.
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            LoadError::Io { path, .. }
            | LoadError::Parse { path, .. }
            | LoadError::NotAMapping { path, .. }
            | LoadError::MissingField { path, .. } => Some(path),
            LoadError::Duplicate { .. } => None,
            LoadError::Empty(path) => Some(path),
        }
    }
}

/// Errors in grading bookkeeping: rubric construction, configuration and
/// outcome aggregation.
#[derive(Debug, thiserror::Error)]
pub enum GradeError {
    #[error("invalid rubric: {0}")]
    InvalidRubric(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("outcome mismatch for rubric item `{item}`: {detail}")]
    OutcomeMismatch { item: String, detail: String },

    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for grading operations.
pub type Result<T> = std::result::Result<T, GradeError>;
