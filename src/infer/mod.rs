//! Implied foreign key inference.
//!
//! Columns that are not the child side of any real relationship are matched
//! against single-column primary keys by name, type and length. Matches are
//! wired into the model as implied constraints.
//!
//! The duplicate-key guard mirrors a long-standing heuristic: when more
//! primary keys share a key signature than there are distinct signatures,
//! the schema uses generic key names (`ID` everywhere) and positional matching
//! would link unrelated tables. The comparison is exposed as a ratio so it
//! can be loosened or tightened per schema.

use crate::config::ImpliedConfig;
use crate::model::{ColumnRef, ConstraintId, Database, TableId};
use ahash::AHashMap;
use tracing::{debug, info};

/// Options for one inference run
#[derive(Debug, Clone, Copy)]
pub struct InferOptions {
    /// Abort when `duplicates > distinct * max_duplicate_ratio`
    pub max_duplicate_ratio: f64,
}

impl Default for InferOptions {
    fn default() -> Self {
        Self {
            max_duplicate_ratio: 1.0,
        }
    }
}

impl From<&ImpliedConfig> for InferOptions {
    fn from(config: &ImpliedConfig) -> Self {
        Self {
            max_duplicate_ratio: config.max_duplicate_ratio,
        }
    }
}

/// Column signature used to match children against primary keys
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct KeySignature {
    name: String,
    type_name: String,
    length: i32,
}

impl KeySignature {
    fn new(name: &str, type_name: &str, length: i32) -> Self {
        Self {
            name: name.to_lowercase(),
            type_name: type_name.to_lowercase(),
            length,
        }
    }
}

/// Registered single-column primary keys
#[derive(Default)]
struct PrimaryKeyIndex {
    /// Keyed by the primary key column's own name; last registration wins
    exact: AHashMap<KeySignature, ColumnRef>,
    /// How many tables registered each exact signature
    owners: AHashMap<KeySignature, usize>,
    /// `<table>_<pk>` and `<singular table>_<pk>` aliases
    aliases: AHashMap<KeySignature, ColumnRef>,
    duplicates: usize,
}

impl PrimaryKeyIndex {
    fn collect(db: &Database) -> Self {
        let mut index = Self::default();
        for table in db.tables() {
            let [pk] = table.primary_key[..] else {
                continue;
            };
            let column = table.column(pk);
            let pk_ref = ColumnRef::new(table.id, pk);

            let signature = KeySignature::new(&column.name, &column.type_name, column.length);
            if index.exact.insert(signature.clone(), pk_ref).is_some() {
                index.duplicates += 1;
            }
            *index.owners.entry(signature).or_default() += 1;

            let mut prefixes = vec![table.name.to_lowercase()];
            let singular = singularize(&prefixes[0]);
            if singular != prefixes[0] {
                prefixes.push(singular);
            }
            for prefix in prefixes {
                let alias = format!("{}_{}", prefix, column.name);
                if alias.eq_ignore_ascii_case(&column.name) {
                    continue;
                }
                index
                    .aliases
                    .entry(KeySignature::new(&alias, &column.type_name, column.length))
                    .or_insert(pk_ref);
            }
        }
        index
    }
}

/// Detect relationships implied by column naming and typing.
///
/// Returns the newly created constraints, already wired into the model.
/// Returns nothing when the duplicate primary key guard trips.
pub fn find_implied_constraints(db: &mut Database, options: InferOptions) -> Vec<ConstraintId> {
    let keys = PrimaryKeyIndex::collect(db);
    let distinct = keys.exact.len();
    if keys.duplicates as f64 > distinct as f64 * options.max_duplicate_ratio {
        info!(
            duplicates = keys.duplicates,
            distinct, "generic primary key names detected, skipping implied relationships"
        );
        return Vec::new();
    }

    let candidates = candidate_columns(db);
    let mut implied = Vec::new();

    for child in candidates {
        let column = db.column(child);
        let signature = KeySignature::new(&column.name, &column.type_name, column.length);
        let is_own_key = db.table(child.table).is_primary_column(child.column);

        let exact = keys.exact.get(&signature).copied().filter(|_| {
            // A key column only matches a key signature nobody else shares
            !is_own_key || keys.owners.get(&signature) == Some(&1)
        });
        let Some(parent) = exact.or_else(|| keys.aliases.get(&signature).copied()) else {
            continue;
        };

        if parent.table == child.table
            || !db.column(parent).allow_implied_children
            || db.has_edge_between(parent, child)
        {
            continue;
        }

        let id = db.add_implied_constraint(child, parent);
        debug!(constraint = %db.constraint_label(id), "implied relationship");
        implied.push(id);
    }

    info!(count = implied.len(), "implied relationships found");
    implied
}

/// Match `<singular>_id` columns against pluralized table names.
///
/// Independent of the duplicate-key guard. The referenced table must have a
/// primary key column named `id`.
pub fn find_convention_constraints(db: &mut Database) -> Vec<ConstraintId> {
    let candidates = candidate_columns(db);
    let mut implied = Vec::new();

    for child in candidates {
        let name = db.column(child).name.to_lowercase();
        let Some(prefix) = name.strip_suffix("_id").filter(|p| !p.is_empty()) else {
            continue;
        };
        let Some(parent_table) = db.get_table_id(&pluralize(prefix)) else {
            continue;
        };
        if parent_table == child.table {
            continue;
        }
        let Some(parent) = id_key(db, parent_table) else {
            continue;
        };
        if !db.column(parent).allow_implied_children || db.has_edge_between(parent, child) {
            continue;
        }

        let id = db.add_implied_constraint(child, parent);
        debug!(constraint = %db.constraint_label(id), "convention relationship");
        implied.push(id);
    }

    implied
}

fn id_key(db: &Database, table: TableId) -> Option<ColumnRef> {
    let t = db.table(table);
    t.primary_key
        .iter()
        .find(|&&c| t.column(c).name.eq_ignore_ascii_case("id"))
        .map(|&c| ColumnRef::new(table, c))
}

/// Parentless, eligible columns of tables and views, ordered by
/// (table name, column name)
fn candidate_columns(db: &Database) -> Vec<ColumnRef> {
    let mut candidates: Vec<(String, String, ColumnRef)> = db
        .all()
        .flat_map(|table| {
            table
                .columns
                .iter()
                .filter(|c| c.parents.is_empty() && c.allow_implied_parents)
                .map(move |c| {
                    (
                        table.name.to_lowercase(),
                        c.name.to_lowercase(),
                        ColumnRef::new(table.id, c.id),
                    )
                })
        })
        .collect();
    candidates.sort();
    candidates.into_iter().map(|(_, _, col)| col).collect()
}

fn pluralize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{}ies", stem);
        }
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|s| word.ends_with(s)) {
        return format!("{}es", word);
    }
    format!("{}s", word)
}

fn singularize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{}y", stem);
    }
    if let Some(stem) = ["ses", "xes", "zes", "ches", "shes"]
        .iter()
        .find_map(|s| word.strip_suffix(s).map(|stem| (stem, &s[..s.len() - 2])))
    {
        return format!("{}{}", stem.0, stem.1);
    }
    match word.strip_suffix('s') {
        Some(stem) if !stem.ends_with('s') => stem.to_string(),
        _ => word.to_string(),
    }
}
