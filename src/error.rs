//! Error types for catalog access, model building and configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a metadata source
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("query failed: {message}\n  SQL: {sql}")]
    Query { sql: String, message: String },

    #[error("failed to read {object} metadata: {message}")]
    Metadata { object: String, message: String },

    #[error("unsupported by this catalog: {0}")]
    Unsupported(String),
}

impl CatalogError {
    pub fn query(sql: impl Into<String>, err: impl std::fmt::Display) -> Self {
        CatalogError::Query {
            sql: sql.into(),
            message: err.to_string(),
        }
    }

    pub fn metadata(object: impl Into<String>, err: impl std::fmt::Display) -> Self {
        CatalogError::Metadata {
            object: object.into(),
            message: err.to_string(),
        }
    }
}

/// Fatal model-building failure
#[derive(Debug, Error)]
pub enum BuildError {
    /// Basic table/column metadata could not be read at all
    #[error("connection/metadata failure: {0}")]
    Metadata(#[from] CatalogError),

    #[error("no tables or views found in schema '{schema}'")]
    NoTables { schema: String },

    /// The configured check-constraint query is malformed
    #[error("check constraint query failed: {0}")]
    CheckConstraints(#[source] CatalogError),

    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Failure loading a YAML configuration or catalog file
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },
}
