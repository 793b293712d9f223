//! Query Profile - Extracts characteristics from SQL before execution
//!
//! Passed to the query executor as an optimization hint so it can pick the
//! right backend engine. Also used to refuse statements that write.

use serde::{Deserialize, Serialize};
use sqlparser::ast::{Query, SetExpr, Statement, TableFactor};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

/// Query profile extracted from the SQL AST
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryProfile {
    /// Query uses Common Table Expressions (WITH clauses)
    pub uses_ctes: bool,

    /// Query uses window functions
    pub uses_window_functions: bool,

    /// Query aggregates (GROUP BY or aggregate functions)
    pub uses_aggregation: bool,

    /// Number of joins in the query
    pub join_count: usize,

    /// Tables referenced in FROM/JOIN clauses
    pub tables: Vec<String>,

    /// Query complexity score (0-100)
    pub complexity_score: u8,

    /// Whether query is read-only
    pub is_read_only: bool,

    /// Whether the AST parser accepted the SQL
    pub parsed: bool,
}

impl QueryProfile {
    /// Extract profile from SQL string using the SQL parser, with a keyword
    /// heuristic when parsing fails.
    pub fn from_sql(sql: &str) -> Self {
        let upper = sql.to_uppercase();
        let mut profile = Self {
            uses_window_functions: upper.contains(" OVER (") || upper.contains(" OVER("),
            uses_aggregation: upper.contains("GROUP BY")
                || ["SUM(", "AVG(", "COUNT(", "MIN(", "MAX("]
                    .iter()
                    .any(|f| upper.contains(f)),
            is_read_only: true,
            ..Self::default()
        };

        match Parser::parse_sql(&GenericDialect {}, sql) {
            Ok(statements) => {
                profile.parsed = true;
                for statement in &statements {
                    match statement {
                        Statement::Query(query) => profile.analyze_query(query),
                        _ => profile.is_read_only = false,
                    }
                }
            }
            Err(e) => {
                tracing::debug!("SQL parsing failed: {}, using heuristic profile", e);
                profile.apply_heuristics(&upper);
            }
        }

        profile.complexity_score = profile.score(&upper);
        profile
    }

    fn analyze_query(&mut self, query: &Query) {
        if let Some(with) = &query.with {
            self.uses_ctes = true;
            for cte in &with.cte_tables {
                self.analyze_query(&cte.query);
            }
        }
        self.analyze_set_expr(&query.body);
    }

    fn analyze_set_expr(&mut self, body: &SetExpr) {
        match body {
            SetExpr::Select(select) => {
                for table in &select.from {
                    self.record_table(&table.relation);
                    for join in &table.joins {
                        self.join_count += 1;
                        self.record_table(&join.relation);
                    }
                }
                self.join_count += select.from.len().saturating_sub(1);
            }
            SetExpr::Query(query) => self.analyze_query(query),
            SetExpr::SetOperation { left, right, .. } => {
                self.analyze_set_expr(left);
                self.analyze_set_expr(right);
            }
            _ => {}
        }
    }

    fn record_table(&mut self, factor: &TableFactor) {
        match factor {
            TableFactor::Table { name, .. } => {
                let name = name.to_string();
                if !self.tables.contains(&name) {
                    self.tables.push(name);
                }
            }
            TableFactor::Derived { subquery, .. } => self.analyze_query(subquery),
            _ => {}
        }
    }

    fn apply_heuristics(&mut self, upper: &str) {
        self.uses_ctes = upper.trim_start().starts_with("WITH ");
        self.join_count = upper.matches(" JOIN ").count();
        self.is_read_only = !["INSERT ", "UPDATE ", "DELETE ", "DROP ", "ALTER ", "CREATE ", "TRUNCATE "]
            .iter()
            .any(|kw| upper.contains(kw));
    }

    fn score(&self, upper: &str) -> u8 {
        let mut complexity = 0usize;
        if self.uses_ctes {
            complexity += 10;
        }
        if self.uses_window_functions {
            complexity += 15;
        }
        if self.uses_aggregation {
            complexity += 10;
        }
        if upper.contains("HAVING") {
            complexity += 5;
        }
        if upper.contains("UNION") {
            complexity += 10;
        }
        if upper.contains("(SELECT") {
            complexity += 10;
        }
        complexity += (self.join_count * 5).min(30);
        complexity.min(100) as u8
    }
}
