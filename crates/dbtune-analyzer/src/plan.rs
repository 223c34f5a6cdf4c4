//! Query Plan Model - Structured `EXPLAIN QUERY PLAN` output
//!
//! SQLite reports a plan as rows of `(id, parent, notused, detail)`, where
//! `parent` links each step to the step it is nested under:
//!
//! ```text
//! QUERY PLAN
//! |--SCAN users
//! |--SEARCH orders USING INDEX idx_user_id (user_id=?)
//! `--USE TEMP B-TREE FOR ORDER BY
//! ```

use std::fmt;

use dbtune_core::{QueryResult, Row, Value};
use serde::{Deserialize, Serialize};

/// What a plan step does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepKind {
    /// Full table scan
    Scan,
    /// Scan driven by an index
    IndexScan,
    /// Index or rowid lookup
    Search,
    /// Temporary B-tree for ORDER BY, GROUP BY or DISTINCT
    TempBTree,
    /// Subquery, co-routine or compound select
    Subquery,
    Other,
}

/// A single step of a query plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: i64,
    /// Id of the enclosing step, 0 for top-level steps
    pub parent: i64,
    /// Engine description, e.g. `SEARCH users USING INDEX idx_email (email=?)`
    pub detail: String,
    pub kind: StepKind,
    pub table: Option<String>,
    pub index: Option<String>,
}

impl PlanStep {
    /// Classify a plan step from its detail text
    pub fn new(id: i64, parent: i64, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let upper = detail.trim().to_uppercase();

        let (kind, table, index) = if upper.starts_with("SCAN") {
            let index = index_name(&detail);
            let kind = if index.is_some() {
                StepKind::IndexScan
            } else if upper.contains("SUBQUERY") {
                StepKind::Subquery
            } else {
                StepKind::Scan
            };
            (kind, table_name(&detail, "SCAN"), index)
        } else if upper.starts_with("SEARCH") {
            let index = if upper.contains("INTEGER PRIMARY KEY") {
                Some("PRIMARY KEY".to_string())
            } else {
                index_name(&detail)
            };
            (StepKind::Search, table_name(&detail, "SEARCH"), index)
        } else if upper.contains("TEMP B-TREE") {
            (StepKind::TempBTree, None, None)
        } else if upper.starts_with("CO-ROUTINE")
            || upper.starts_with("MATERIALIZE")
            || upper.starts_with("COMPOUND")
            || upper.starts_with("CORRELATED")
            || upper.starts_with("SCALAR SUBQUERY")
            || upper.starts_with("LIST SUBQUERY")
        {
            (StepKind::Subquery, None, None)
        } else {
            (StepKind::Other, None, None)
        };

        Self {
            id,
            parent,
            detail,
            kind,
            table,
            index,
        }
    }

    /// Returns true if this step reads a whole table without an index
    pub fn is_full_scan(&self) -> bool {
        self.kind == StepKind::Scan && self.table.is_some()
    }
}

/// Extracts the table name following the operation keyword
fn table_name(detail: &str, operation: &str) -> Option<String> {
    let upper = detail.to_uppercase();
    let start = upper.find(operation)? + operation.len();
    let remaining = detail[start..].trim();

    // Skip optional "TABLE" keyword
    let remaining = if remaining.to_uppercase().starts_with("TABLE ") {
        remaining[6..].trim()
    } else {
        remaining
    };

    let name = remaining.split_whitespace().next()?;
    let upper_name = name.to_uppercase();
    if upper_name == "CONSTANT" || upper_name == "SUBQUERY" {
        return None;
    }
    Some(name.to_string())
}

/// Extracts the index name following `INDEX`
fn index_name(detail: &str) -> Option<String> {
    let upper = detail.to_uppercase();
    let start = upper.find(" INDEX ")? + " INDEX ".len();
    let name = detail[start..].split_whitespace().next()?;
    let name = name.split('(').next()?;
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// An ordered list of plan steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub steps: Vec<PlanStep>,
}

impl QueryPlan {
    /// A plan with no steps, recorded when the engine could not explain a query
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(steps: Vec<PlanStep>) -> Self {
        Self { steps }
    }

    /// Builds a plan from the rows of an `EXPLAIN QUERY PLAN` result
    ///
    /// Columns are looked up by name (`id`, `parent`, `detail`), falling back
    /// to positions 0, 1 and 3. Rows without a detail are skipped.
    pub fn from_result(result: &QueryResult) -> Self {
        let steps = result.rows.iter().filter_map(step_from_row).collect();
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if any step scans a table without an index
    pub fn has_full_scan(&self) -> bool {
        self.steps.iter().any(PlanStep::is_full_scan)
    }

    /// Tables read by full scans
    pub fn scanned_tables(&self) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.is_full_scan())
            .filter_map(|s| s.table.as_deref())
            .collect()
    }

    /// Returns true if the plan builds a temporary B-tree
    pub fn uses_temp_btree(&self) -> bool {
        self.steps.iter().any(|s| s.kind == StepKind::TempBTree)
    }

    fn depth(&self, step: &PlanStep) -> usize {
        let mut depth = 0;
        let mut parent = step.parent;
        while parent != 0 && depth < self.steps.len() {
            match self.steps.iter().find(|s| s.id == parent) {
                Some(p) => {
                    depth += 1;
                    parent = p.parent;
                }
                None => break,
            }
        }
        depth
    }
}

fn column<'a>(row: &'a Row, name: &str, position: usize) -> Option<&'a Value> {
    row.get_by_name(name).or_else(|| row.get(position))
}

fn step_from_row(row: &Row) -> Option<PlanStep> {
    let detail = match column(row, "detail", 3)? {
        Value::String(s) => s.clone(),
        _ => return None,
    };
    let id = column(row, "id", 0).and_then(Value::as_i64).unwrap_or_default();
    let parent = column(row, "parent", 1)
        .and_then(Value::as_i64)
        .unwrap_or_default();
    Some(PlanStep::new(id, parent, detail))
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "QUERY PLAN")?;
        for step in &self.steps {
            let indent = "   ".repeat(self.depth(step));
            writeln!(f, "{indent}|--{}", step.detail)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbtune_core::ColumnMeta;
    use pretty_assertions::assert_eq;

    fn explain_rows(steps: &[(i64, i64, &str)]) -> QueryResult {
        let names = ["id", "parent", "notused", "detail"];
        let columns = names
            .iter()
            .enumerate()
            .map(|(ordinal, name)| ColumnMeta {
                name: name.to_string(),
                data_type: String::new(),
                ordinal,
            })
            .collect();
        let rows = steps
            .iter()
            .map(|(id, parent, detail)| {
                Row::new(
                    names.iter().map(|n| n.to_string()).collect(),
                    vec![
                        Value::Int64(*id),
                        Value::Int64(*parent),
                        Value::Int64(0),
                        Value::from(*detail),
                    ],
                )
            })
            .collect();
        QueryResult::from_rows(columns, rows)
    }

    #[test]
    fn test_scan_step() {
        let step = PlanStep::new(2, 0, "SCAN users");
        assert_eq!(step.kind, StepKind::Scan);
        assert_eq!(step.table.as_deref(), Some("users"));
        assert_eq!(step.index, None);
        assert!(step.is_full_scan());
    }

    #[test]
    fn test_scan_with_covering_index() {
        let step = PlanStep::new(2, 0, "SCAN users USING COVERING INDEX idx_users_email");
        assert_eq!(step.kind, StepKind::IndexScan);
        assert_eq!(step.index.as_deref(), Some("idx_users_email"));
        assert!(!step.is_full_scan());
    }

    #[test]
    fn test_search_steps() {
        let step = PlanStep::new(3, 0, "SEARCH orders USING INDEX idx_orders_user (user_id=?)");
        assert_eq!(step.kind, StepKind::Search);
        assert_eq!(step.table.as_deref(), Some("orders"));
        assert_eq!(step.index.as_deref(), Some("idx_orders_user"));

        let step = PlanStep::new(3, 0, "SEARCH users USING INTEGER PRIMARY KEY (rowid=?)");
        assert_eq!(step.index.as_deref(), Some("PRIMARY KEY"));
    }

    #[test]
    fn test_other_steps() {
        assert_eq!(
            PlanStep::new(5, 0, "USE TEMP B-TREE FOR ORDER BY").kind,
            StepKind::TempBTree
        );
        assert_eq!(
            PlanStep::new(6, 0, "CORRELATED SCALAR SUBQUERY 1").kind,
            StepKind::Subquery
        );
        let constant = PlanStep::new(7, 0, "SCAN CONSTANT ROW");
        assert_eq!(constant.table, None);
        assert!(!constant.is_full_scan());
    }

    #[test]
    fn test_plan_from_explain_rows() {
        let plan = QueryPlan::from_result(&explain_rows(&[
            (2, 0, "SCAN users"),
            (5, 0, "SEARCH orders USING INDEX idx_orders_user (user_id=?)"),
            (9, 0, "USE TEMP B-TREE FOR ORDER BY"),
        ]));

        assert_eq!(plan.len(), 3);
        assert!(plan.has_full_scan());
        assert!(plan.uses_temp_btree());
        assert_eq!(plan.scanned_tables(), vec!["users"]);
    }

    #[test]
    fn test_plan_from_positional_rows() {
        let row = Row::new(
            Vec::new(),
            vec![
                Value::Int64(3),
                Value::Int64(0),
                Value::Int64(0),
                Value::from("SEARCH users USING INDEX idx_email (email=?)"),
            ],
        );
        let plan = QueryPlan::from_result(&QueryResult::from_rows(Vec::new(), vec![row]));
        assert_eq!(plan.steps[0].id, 3);
        assert_eq!(plan.steps[0].kind, StepKind::Search);
        assert!(!plan.has_full_scan());
    }

    #[test]
    fn test_empty_plan() {
        let plan = QueryPlan::empty();
        assert!(plan.is_empty());
        assert!(!plan.has_full_scan());
        assert_eq!(QueryPlan::from_result(&QueryResult::empty()), plan);
    }

    #[test]
    fn test_plan_display_nests_children() {
        let plan = QueryPlan::from_result(&explain_rows(&[
            (2, 0, "SCAN orders"),
            (4, 0, "CORRELATED SCALAR SUBQUERY 1"),
            (7, 4, "SEARCH users USING INTEGER PRIMARY KEY (rowid=?)"),
        ]));

        assert_eq!(
            plan.to_string(),
            "QUERY PLAN\n\
             |--SCAN orders\n\
             |--CORRELATED SCALAR SUBQUERY 1\n   \
             |--SEARCH users USING INTEGER PRIMARY KEY (rowid=?)\n"
        );
    }
}
