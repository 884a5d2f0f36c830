//! Foreign key constraints, real and implied.

use super::{ColumnId, ConstraintId, TableId};
use std::fmt;
use std::str::FromStr;

/// Label reported for constraints that have no catalog name
pub const IMPLIED_CONSTRAINT_LABEL: &str = "Implied Constraint";

/// ON UPDATE / ON DELETE behavior reported by the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl FromStr for ReferentialAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('_', " ").as_str() {
            "NO ACTION" | "" => Ok(ReferentialAction::NoAction),
            "RESTRICT" => Ok(ReferentialAction::Restrict),
            "CASCADE" => Ok(ReferentialAction::Cascade),
            "SET NULL" => Ok(ReferentialAction::SetNull),
            "SET DEFAULT" => Ok(ReferentialAction::SetDefault),
            _ => Err(format!(
                "Unknown referential action: {}. Valid options: no action, restrict, cascade, set null, set default",
                s
            )),
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferentialAction::NoAction => write!(f, "NO ACTION"),
            ReferentialAction::Restrict => write!(f, "RESTRICT"),
            ReferentialAction::Cascade => write!(f, "CASCADE"),
            ReferentialAction::SetNull => write!(f, "SET NULL"),
            ReferentialAction::SetDefault => write!(f, "SET DEFAULT"),
        }
    }
}

/// A parent/child relationship between one child table and one parent table.
///
/// Column lists are parallel but may differ in length when the catalog
/// referenced a column that could not be resolved.
#[derive(Debug, Clone)]
pub struct ForeignKeyConstraint {
    pub id: ConstraintId,
    /// Catalog name; `None` only for implied constraints
    pub name: Option<String>,
    pub child_table: TableId,
    pub child_columns: Vec<ColumnId>,
    pub parent_table: TableId,
    pub parent_columns: Vec<ColumnId>,
    pub implied: bool,
    pub update_rule: ReferentialAction,
    pub delete_rule: ReferentialAction,
}

impl ForeignKeyConstraint {
    pub(crate) fn new(
        id: ConstraintId,
        name: Option<String>,
        child_table: TableId,
        parent_table: TableId,
        implied: bool,
    ) -> Self {
        Self {
            id,
            name,
            child_table,
            child_columns: Vec::new(),
            parent_table,
            parent_columns: Vec::new(),
            implied,
            update_rule: ReferentialAction::default(),
            delete_rule: ReferentialAction::default(),
        }
    }

    /// Catalog name, or the synthetic label for implied constraints
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(IMPLIED_CONSTRAINT_LABEL)
    }

    pub fn is_self_referencing(&self) -> bool {
        self.child_table == self.parent_table
    }

    /// Column lists ended up with different lengths
    pub fn is_mismatched(&self) -> bool {
        self.child_columns.len() != self.parent_columns.len()
    }

    /// Whether deleting a parent row cascades to children
    pub fn is_cascade_on_delete(&self) -> bool {
        self.delete_rule == ReferentialAction::Cascade
    }
}
