//! YAML configuration for an analysis run.
//!
//! Every field has a default so a config file only needs the settings it
//! changes. CLI flags are applied on top of the loaded file.

use crate::error::{BuildError, ConfigError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Implied-relationship inference settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpliedConfig {
    /// Run positional (name/type/length) inference
    pub enabled: bool,
    /// Also match `<singular>_id` columns against pluralized table names
    pub convention: bool,
    /// Inference is abandoned when duplicate primary-key registrations exceed
    /// `distinct keys * max_duplicate_ratio`
    pub max_duplicate_ratio: f64,
    /// `table.column` patterns of columns that never take part in inference
    pub disabled_columns: Vec<String>,
}

impl Default for ImpliedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            convention: false,
            max_duplicate_ratio: 1.0,
            disabled_columns: Vec::new(),
        }
    }
}

/// Column exclusions applied while extracting relationship diagrams
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExclusionConfig {
    /// `table.column` pattern excluded from every diagram
    pub columns: Option<String>,
    /// `table.column` pattern excluded unless it belongs to the focal table
    pub indirect_columns: Option<String>,
}

/// Optional catalog-specific SQL fragments.
///
/// `:schema` and `:table` are replaced with the current schema/table name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogQueries {
    /// Returns `table_name`, `constraint_name`, `text`
    pub check_constraints: Option<String>,
    /// Returns `table_name`, `table_id`
    pub table_ids: Option<String>,
    /// Returns `table_name`, `index_name`, `index_id`
    pub index_ids: Option<String>,
    /// Returns `table_name`, `comments`
    pub table_comments: Option<String>,
    /// Returns `table_name`, `column_name`, `comments`
    pub column_comments: Option<String>,
    /// Returns the view text in its first column
    pub view_definition: Option<String>,
}

/// Complete YAML configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Schema to analyze (catalog default when unset)
    pub schema: Option<String>,
    pub description: Option<String>,
    /// Regex a table name must match to be included
    pub include_tables: Option<String>,
    /// Regex of table names to skip
    pub exclude_tables: Option<String>,
    /// Load views as well as tables
    pub views: bool,
    /// Query row counts for every table
    pub row_counts: bool,
    /// Maximum concurrent table loaders (1 = sequential)
    pub max_threads: usize,
    pub implied: ImpliedConfig,
    pub exclusions: ExclusionConfig,
    pub queries: CatalogQueries,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            schema: None,
            description: None,
            include_tables: None,
            exclude_tables: None,
            views: true,
            row_counts: true,
            max_threads: 1,
            implied: ImpliedConfig::default(),
            exclusions: ExclusionConfig::default(),
            queries: CatalogQueries::default(),
        }
    }
}

impl AnalysisConfig {
    /// Load configuration from a YAML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml_ng::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Compile every pattern in the configuration
    pub fn compile(&self) -> Result<CompiledPatterns, BuildError> {
        Ok(CompiledPatterns {
            include_tables: compile_opt(self.include_tables.as_deref())?,
            exclude_tables: compile_opt(self.exclude_tables.as_deref())?,
            disabled_implied: self
                .implied
                .disabled_columns
                .iter()
                .map(|p| anchored(p))
                .collect::<Result<_, _>>()?,
            exclusions: ColumnExclusions {
                columns: compile_opt(self.exclusions.columns.as_deref())?,
                indirect_columns: compile_opt(self.exclusions.indirect_columns.as_deref())?,
            },
        })
    }
}

/// Compiled regexes from an `AnalysisConfig`
#[derive(Debug, Clone, Default)]
pub struct CompiledPatterns {
    pub include_tables: Option<Regex>,
    pub exclude_tables: Option<Regex>,
    pub disabled_implied: Vec<Regex>,
    pub exclusions: ColumnExclusions,
}

impl CompiledPatterns {
    /// Whether a table name passes the include/exclude filters
    pub fn accepts_table(&self, name: &str) -> bool {
        if let Some(ref include) = self.include_tables {
            if !include.is_match(name) {
                return false;
            }
        }
        match self.exclude_tables {
            Some(ref exclude) => !exclude.is_match(name),
            None => true,
        }
    }

    /// Whether `table.column` is opted out of implied matching
    pub fn implied_disabled(&self, qualified_column: &str) -> bool {
        self.disabled_implied
            .iter()
            .any(|p| p.is_match(qualified_column))
    }
}

/// Column exclusion patterns, matched against `table.column`
#[derive(Debug, Clone, Default)]
pub struct ColumnExclusions {
    pub columns: Option<Regex>,
    pub indirect_columns: Option<Regex>,
}

impl ColumnExclusions {
    pub fn new(
        columns: Option<&str>,
        indirect_columns: Option<&str>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            columns: compile_opt(columns)?,
            indirect_columns: compile_opt(indirect_columns)?,
        })
    }

    /// Excluded from every diagram
    pub fn is_all_excluded(&self, qualified_column: &str) -> bool {
        self.columns
            .as_ref()
            .is_some_and(|p| p.is_match(qualified_column))
    }

    /// Excluded unless the column's table is the focus of the diagram
    pub fn is_indirectly_excluded(&self, qualified_column: &str) -> bool {
        self.indirect_columns
            .as_ref()
            .is_some_and(|p| p.is_match(qualified_column))
    }
}

/// Patterns are matched against whole names, case-insensitively
fn anchored(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("(?i)^(?:{})$", pattern))
}

fn compile_opt(pattern: Option<&str>) -> Result<Option<Regex>, regex::Error> {
    pattern.map(anchored).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let yaml = r#"
schema: public
include_tables: "(orders|customers).*"
max_threads: 4
implied:
  convention: true
  disabled_columns:
    - "audit_log\\..*"
exclusions:
  columns: ".*\\.created_by"
queries:
  check_constraints: "select * from checks where schema = ':schema'"
"#;
        let config: AnalysisConfig = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(config.schema.as_deref(), Some("public"));
        assert_eq!(config.max_threads, 4);
        assert!(config.implied.enabled);
        assert!(config.implied.convention);
        assert_eq!(config.implied.max_duplicate_ratio, 1.0);
        assert!(config.views);
        assert!(config.queries.check_constraints.is_some());

        let patterns = config.compile().unwrap();
        assert!(patterns.accepts_table("orders"));
        assert!(patterns.accepts_table("Customers_archive"));
        assert!(!patterns.accepts_table("products"));
        assert!(patterns.implied_disabled("audit_log.user_id"));
        assert!(patterns.exclusions.is_all_excluded("orders.created_by"));
        assert!(!patterns.exclusions.is_all_excluded("orders.created_by_id"));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let config = AnalysisConfig {
            exclude_tables: Some("(unclosed".to_string()),
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            config.compile(),
            Err(BuildError::InvalidPattern(_))
        ));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AnalysisConfig = serde_yaml_ng::from_str("{}").unwrap();
        assert_eq!(config.max_threads, 1);
        assert!(config.row_counts);
        assert!(config.compile().unwrap().accepts_table("anything"));
    }
}
