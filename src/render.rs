//! The render engine behind `execute`: named commands over a loaded catalog.
//!
//! The command registry is fixed at startup; `commands` lists it. Text
//! output goes through prettytable, JSON through serde, and the `dot`
//! diagram format emits a Graphviz digraph of foreign-key edges.

use crate::catalog::{Catalog, Table};
use crate::options::{OutputFormat, OutputOptions};
use crate::session::SessionError;
use prettytable::{Cell, Row, Table as TextTable, format};
use std::fmt::Write as _;

pub struct RenderCommand {
    pub name: &'static str,
    pub description: &'static str,
}

pub static RENDER_COMMANDS: &[RenderCommand] = &[
    RenderCommand {
        name: "brief",
        description: "Tables and views, one line each",
    },
    RenderCommand {
        name: "list",
        description: "All catalog objects, grouped by kind",
    },
    RenderCommand {
        name: "schema",
        description: "Tables with columns, references and remarks",
    },
    RenderCommand {
        name: "count",
        description: "Row counts per table",
    },
];

pub fn lookup(name: &str) -> Option<&'static RenderCommand> {
    RENDER_COMMANDS.iter().find(|c| c.name == name)
}

/// Render `command` over the catalog in the configured format.
pub fn render(
    catalog: &Catalog,
    command: &str,
    options: &OutputOptions,
) -> Result<String, SessionError> {
    if lookup(command).is_none() {
        return Err(SessionError::UnknownCommand(command.to_string()));
    }
    match options.format {
        OutputFormat::Text => Ok(render_text(catalog, command, options)),
        OutputFormat::Json => serde_json::to_string_pretty(catalog)
            .map(|json| json + "\n")
            .map_err(|e| SessionError::Render(e.to_string())),
        OutputFormat::Html => Ok(render_html(catalog, command, options)),
        OutputFormat::Dot => Ok(render_dot(catalog, options)),
    }
}

fn display_name(table: &Table, options: &OutputOptions) -> String {
    if options.show.portable_names {
        table.name.clone()
    } else {
        table.full_name()
    }
}

fn sorted_tables<'a>(catalog: &'a Catalog, options: &OutputOptions) -> Vec<&'a Table> {
    let mut tables: Vec<&Table> = catalog.tables.iter().collect();
    if options.sort.tables {
        tables.sort_by_key(|t| t.full_name());
    }
    tables
}

fn header(catalog: &Catalog, options: &OutputOptions) -> String {
    let mut out = String::new();
    if let Some(title) = &options.title {
        let _ = writeln!(out, "{}", title);
        let _ = writeln!(out, "{}", "=".repeat(title.len()));
    }
    if !options.show.no_info {
        let _ = writeln!(
            out,
            "{} {}",
            catalog.database_product, catalog.database_version
        );
        let _ = writeln!(
            out,
            "catalog loaded {} at info level '{}'",
            catalog.loaded_at.format("%Y-%m-%d %H:%M:%S UTC"),
            catalog.info_level
        );
    }
    if !out.is_empty() {
        out.push('\n');
    }
    out
}

fn clean_table() -> TextTable {
    let mut table = TextTable::new();
    table.set_format(*format::consts::FORMAT_CLEAN);
    table
}

fn render_text(catalog: &Catalog, command: &str, options: &OutputOptions) -> String {
    let mut out = header(catalog, options);
    match command {
        "brief" => {
            let mut text = clean_table();
            text.add_row(Row::new(vec![Cell::new("Name"), Cell::new("Type")]));
            for table in sorted_tables(catalog, options) {
                text.add_row(Row::new(vec![
                    Cell::new(&display_name(table, options)),
                    Cell::new(&table.table_type),
                ]));
            }
            let _ = write!(out, "{}", text);
        }
        "list" => {
            for table in sorted_tables(catalog, options) {
                let _ = writeln!(
                    out,
                    "{} [{}]",
                    display_name(table, options),
                    table.table_type
                );
            }
            for routine in &catalog.routines {
                let _ = writeln!(out, "{} [{}]", routine.full_name(), routine.routine_type);
            }
            for sequence in &catalog.sequences {
                let _ = writeln!(out, "{}.{} [sequence]", sequence.schema, sequence.name);
            }
            for synonym in &catalog.synonyms {
                let _ = writeln!(
                    out,
                    "{}.{} -> {} [synonym]",
                    synonym.schema, synonym.name, synonym.referenced_object
                );
            }
        }
        "schema" => {
            for table in sorted_tables(catalog, options) {
                let _ = writeln!(
                    out,
                    "{} [{}]",
                    display_name(table, options),
                    table.table_type
                );
                if let Some(remarks) = table.remarks.as_deref().filter(|_| !options.show.no_remarks)
                {
                    let _ = writeln!(out, "  {}", remarks);
                }
                let mut columns: Vec<_> = table.columns.iter().collect();
                if options.sort.columns {
                    columns.sort_by_key(|c| c.name.clone());
                }
                let mut text = clean_table();
                for column in columns {
                    let nullable = if column.nullable { "" } else { "not null" };
                    text.add_row(Row::new(vec![
                        Cell::new(&format!("  {}", column.name)),
                        Cell::new(&column.data_type),
                        Cell::new(nullable),
                    ]));
                }
                let _ = write!(out, "{}", text);
                for referenced in &table.referenced_tables {
                    let _ = writeln!(out, "  --> {}", referenced);
                }
                out.push('\n');
            }
            for routine in &catalog.routines {
                let _ = writeln!(out, "{} [{}]", routine.full_name(), routine.routine_type);
                let mut parameters: Vec<_> = routine.parameters.iter().collect();
                if options.sort.parameters {
                    parameters.sort_by_key(|p| p.name.clone());
                }
                for parameter in parameters {
                    let _ = writeln!(
                        out,
                        "  {} {} {}",
                        parameter.mode.as_deref().unwrap_or("in"),
                        parameter.name,
                        parameter.data_type
                    );
                }
            }
            if options.show.weak_associations {
                let associations = catalog.weak_associations();
                if !associations.is_empty() {
                    let _ = writeln!(out, "weak associations:");
                    for (from, to) in associations {
                        let _ = writeln!(out, "  {} ~~> {}", from, to);
                    }
                }
            }
        }
        "count" => {
            let mut text = clean_table();
            text.add_row(Row::new(vec![Cell::new("Table"), Cell::new("Rows")]));
            for table in sorted_tables(catalog, options) {
                let count = table
                    .row_count
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "-".to_string());
                text.add_row(Row::new(vec![
                    Cell::new(&display_name(table, options)),
                    Cell::new(&count),
                ]));
            }
            let _ = write!(out, "{}", text);
        }
        _ => unreachable!("validated by lookup"),
    }
    out
}

fn render_html(catalog: &Catalog, command: &str, options: &OutputOptions) -> String {
    let title = options
        .title
        .as_deref()
        .unwrap_or(&catalog.database_product);
    let mut out = String::new();
    let _ = writeln!(out, "<!DOCTYPE html>");
    let _ = writeln!(out, "<html><head><title>{}</title></head><body>", title);
    let _ = writeln!(out, "<h1>{}</h1>", title);
    if !options.show.no_info {
        let _ = writeln!(
            out,
            "<p>{} {}</p>",
            catalog.database_product, catalog.database_version
        );
    }
    for table in sorted_tables(catalog, options) {
        let _ = writeln!(
            out,
            "<h2>{} [{}]</h2>",
            display_name(table, options),
            table.table_type
        );
        if command == "brief" || command == "list" {
            continue;
        }
        let _ = writeln!(out, "<table>");
        for column in &table.columns {
            let _ = writeln!(
                out,
                "<tr><td>{}</td><td>{}</td></tr>",
                column.name, column.data_type
            );
        }
        if command == "count" {
            if let Some(count) = table.row_count {
                let _ = writeln!(out, "<tr><td>rows</td><td>{}</td></tr>", count);
            }
        }
        let _ = writeln!(out, "</table>");
    }
    let _ = writeln!(out, "</body></html>");
    out
}

fn render_dot(catalog: &Catalog, options: &OutputOptions) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph schema {{");
    let _ = writeln!(out, "  rankdir=LR;");
    let _ = writeln!(out, "  node [shape=box];");
    for table in sorted_tables(catalog, options) {
        let _ = writeln!(out, "  \"{}\";", table.full_name());
        for referenced in &table.referenced_tables {
            let _ = writeln!(out, "  \"{}\" -> \"{}\";", table.full_name(), referenced);
        }
    }
    let _ = writeln!(out, "}}");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Column;
    use crate::options::{InfoLevel, ShowOptions, SortOptions};
    use chrono::Utc;

    fn catalog() -> Catalog {
        Catalog {
            database_product: "SQLite".to_string(),
            database_version: "3.46.0".to_string(),
            server_id: "sqlite".to_string(),
            info_level: InfoLevel::Standard,
            loaded_at: Utc::now(),
            tables: vec![
                Table {
                    schema: "main".to_string(),
                    name: "books".to_string(),
                    table_type: "table".to_string(),
                    remarks: Some("library stock".to_string()),
                    definition: None,
                    columns: vec![Column {
                        name: "title".to_string(),
                        data_type: "text".to_string(),
                        nullable: false,
                        default_value: None,
                        remarks: None,
                    }],
                    referenced_tables: vec!["main.authors".to_string()],
                    row_count: Some(42),
                },
                Table {
                    schema: "main".to_string(),
                    name: "authors".to_string(),
                    table_type: "table".to_string(),
                    remarks: None,
                    definition: None,
                    columns: vec![],
                    referenced_tables: vec![],
                    row_count: Some(7),
                },
            ],
            routines: vec![],
            sequences: vec![],
            synonyms: vec![],
        }
    }

    #[test]
    fn unknown_render_command_is_rejected() {
        let result = render(&catalog(), "everything", &OutputOptions::default());
        assert!(matches!(result, Err(SessionError::UnknownCommand(_))));
    }

    #[test]
    fn brief_lists_tables() {
        let out = render(&catalog(), "brief", &OutputOptions::default()).unwrap();
        assert!(out.contains("main.books"));
        assert!(out.contains("main.authors"));
        assert!(out.contains("SQLite 3.46.0"));
    }

    #[test]
    fn no_info_suppresses_the_header() {
        let options = OutputOptions {
            show: ShowOptions {
                no_info: true,
                ..ShowOptions::default()
            },
            ..OutputOptions::default()
        };
        let out = render(&catalog(), "brief", &options).unwrap();
        assert!(!out.contains("SQLite 3.46.0"));
    }

    #[test]
    fn portable_names_drop_the_schema_prefix() {
        let options = OutputOptions {
            show: ShowOptions {
                portable_names: true,
                ..ShowOptions::default()
            },
            ..OutputOptions::default()
        };
        let out = render(&catalog(), "brief", &options).unwrap();
        assert!(!out.contains("main.books"));
        assert!(out.contains("books"));
    }

    #[test]
    fn sort_tables_orders_by_name() {
        let options = OutputOptions {
            sort: SortOptions {
                tables: true,
                ..SortOptions::default()
            },
            ..OutputOptions::default()
        };
        let out = render(&catalog(), "list", &options).unwrap();
        let authors = out.find("main.authors").unwrap();
        let books = out.find("main.books").unwrap();
        assert!(authors < books);
    }

    #[test]
    fn count_shows_row_counts() {
        let out = render(&catalog(), "count", &OutputOptions::default()).unwrap();
        assert!(out.contains("42"));
        assert!(out.contains("7"));
    }

    #[test]
    fn schema_honors_no_remarks() {
        let out = render(&catalog(), "schema", &OutputOptions::default()).unwrap();
        assert!(out.contains("library stock"));

        let options = OutputOptions {
            show: ShowOptions {
                no_remarks: true,
                ..ShowOptions::default()
            },
            ..OutputOptions::default()
        };
        let out = render(&catalog(), "schema", &options).unwrap();
        assert!(!out.contains("library stock"));
    }

    #[test]
    fn json_output_round_trips() {
        let options = OutputOptions {
            format: OutputFormat::Json,
            ..OutputOptions::default()
        };
        let out = render(&catalog(), "schema", &options).unwrap();
        let value: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(value["tables"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn dot_output_has_foreign_key_edges() {
        let options = OutputOptions {
            format: OutputFormat::Dot,
            ..OutputOptions::default()
        };
        let out = render(&catalog(), "schema", &options).unwrap();
        assert!(out.starts_with("digraph schema {"));
        assert!(out.contains("\"main.books\" -> \"main.authors\";"));
    }
}
