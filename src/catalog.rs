//! The catalog: an in-memory snapshot of database schema metadata.
//!
//! A catalog is produced by a loader (see `loader`) from a live connection
//! and the accumulated retrieval options, then consumed read-only by the
//! render engine. It is a point-in-time snapshot: tearing down the
//! connection does not invalidate the data, only its freshness.

use crate::options::{CrawlOptions, GrepOptions, InfoLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    pub schema: String,
    pub name: String,
    /// "table" or "view", as reported by the system catalog.
    pub table_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    pub columns: Vec<Column>,
    /// Full names of tables referenced by foreign keys.
    pub referenced_tables: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,
}

impl Table {
    pub fn full_name(&self) -> String {
        if self.schema.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routine {
    pub schema: String,
    pub name: String,
    /// "function" or "procedure".
    pub routine_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_type: Option<String>,
    pub parameters: Vec<Parameter>,
}

impl Routine {
    pub fn full_name(&self) -> String {
        if self.schema.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.schema, self.name)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    pub schema: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Synonym {
    pub schema: String,
    pub name: String,
    pub referenced_object: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub database_product: String,
    pub database_version: String,
    /// Server identifier of the connector that produced the snapshot.
    pub server_id: String,
    pub info_level: InfoLevel,
    pub loaded_at: DateTime<Utc>,
    pub tables: Vec<Table>,
    pub routines: Vec<Routine>,
    pub sequences: Vec<Sequence>,
    pub synonyms: Vec<Synonym>,
}

impl Catalog {
    /// Apply the accumulated retrieval rules to a freshly fetched snapshot.
    /// Loaders call this once, after fetching; the order is limit rules,
    /// then grep matching with FK-depth expansion, then structural filters.
    pub fn apply_rules(&mut self, options: &CrawlOptions) {
        self.apply_limit(options);
        self.apply_grep(&options.grep, options.filter.parent_depth, options.filter.child_depth);
        if options.filter.exclude_empty_tables {
            self.tables.retain(|t| t.row_count != Some(0));
        }
    }

    fn apply_limit(&mut self, options: &CrawlOptions) {
        let limit = &options.limit;
        self.tables.retain(|t| {
            if let Some(rule) = &limit.schemas {
                if !rule.accepts(&t.schema) {
                    return false;
                }
            }
            if let Some(types) = &limit.table_types {
                if !types.iter().any(|ty| ty.eq_ignore_ascii_case(&t.table_type)) {
                    return false;
                }
            }
            if let Some(rule) = &limit.tables {
                if !rule.accepts(&t.full_name()) {
                    return false;
                }
            }
            true
        });
        if let Some(rule) = &limit.exclude_columns {
            for table in &mut self.tables {
                let prefix = table.full_name();
                table
                    .columns
                    .retain(|c| rule.accepts(&format!("{}.{}", prefix, c.name)));
            }
        }
        self.routines.retain(|r| {
            if let Some(rule) = &limit.schemas {
                if !rule.accepts(&r.schema) {
                    return false;
                }
            }
            if let Some(types) = &limit.routine_types {
                if !types.iter().any(|ty| ty.eq_ignore_ascii_case(&r.routine_type)) {
                    return false;
                }
            }
            if let Some(rule) = &limit.routines {
                if !rule.accepts(&r.full_name()) {
                    return false;
                }
            }
            true
        });
        if let Some(rule) = &limit.exclude_parameters {
            for routine in &mut self.routines {
                let prefix = routine.full_name();
                routine
                    .parameters
                    .retain(|p| rule.accepts(&format!("{}.{}", prefix, p.name)));
            }
        }
        if let Some(rule) = &limit.sequences {
            self.sequences
                .retain(|s| rule.accepts(&format!("{}.{}", s.schema, s.name)));
        }
        if let Some(rule) = &limit.synonyms {
            self.synonyms
                .retain(|s| rule.accepts(&format!("{}.{}", s.schema, s.name)));
        }
    }

    fn apply_grep(&mut self, grep: &GrepOptions, parent_depth: u32, child_depth: u32) {
        if !grep.is_active() {
            return;
        }

        let mut kept: HashSet<String> = self
            .tables
            .iter()
            .filter(|t| {
                let mut matched = false;
                if let Some(rule) = &grep.columns {
                    let prefix = t.full_name();
                    matched |= t
                        .columns
                        .iter()
                        .any(|c| rule.accepts(&format!("{}.{}", prefix, c.name)));
                }
                if let Some(rule) = &grep.definitions {
                    matched |= t
                        .definition
                        .as_deref()
                        .is_some_and(|def| rule.accepts(def));
                }
                matched != grep.invert_match
            })
            .map(|t| t.full_name())
            .collect();

        // Walk FK edges outwards from the matched set: ancestors are the
        // tables a matched table references, descendants reference it.
        for _ in 0..parent_depth {
            let parents: Vec<String> = self
                .tables
                .iter()
                .filter(|t| kept.contains(&t.full_name()))
                .flat_map(|t| t.referenced_tables.iter().cloned())
                .collect();
            kept.extend(parents);
        }
        for _ in 0..child_depth {
            let children: Vec<String> = self
                .tables
                .iter()
                .filter(|t| t.referenced_tables.iter().any(|r| kept.contains(r)))
                .map(|t| t.full_name())
                .collect();
            kept.extend(children);
        }

        self.tables.retain(|t| kept.contains(&t.full_name()));
        if grep.only_matching {
            for table in &mut self.tables {
                table.referenced_tables.retain(|r| kept.contains(r));
            }
        }

        if let Some(rule) = &grep.parameters {
            self.routines.retain(|r| {
                let prefix = r.full_name();
                let matched = r
                    .parameters
                    .iter()
                    .any(|p| rule.accepts(&format!("{}.{}", prefix, p.name)));
                matched != grep.invert_match
            });
        }
    }

    /// Foreign-key-like relationships inferred from column naming: a column
    /// `<table>_id` pointing at a table with no declared FK edge between the
    /// two. Rendered only when the `weakassociations` show flag is set.
    pub fn weak_associations(&self) -> Vec<(String, String)> {
        let mut associations = Vec::new();
        for table in &self.tables {
            for column in &table.columns {
                let Some(target) = column.name.strip_suffix("_id") else {
                    continue;
                };
                let plural = format!("{}s", target);
                let Some(other) = self.tables.iter().find(|t| {
                    (t.name.eq_ignore_ascii_case(target) || t.name.eq_ignore_ascii_case(&plural))
                        && t.name != table.name
                }) else {
                    continue;
                };
                if !table.referenced_tables.contains(&other.full_name()) {
                    associations.push((table.full_name(), other.full_name()));
                }
            }
        }
        associations
    }
}
