//! PostgreSQL catalog loader, built on `information_schema`.

use crate::catalog::{Catalog, Column, Parameter, Routine, Sequence, Table};
use crate::loader::{CatalogLoader, wants_row_counts};
use crate::options::{CrawlOptions, InfoLevel};
use crate::session::SessionError;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{AnyPool, Row};
use std::collections::HashMap;
use tracing::debug;

pub struct PostgresLoader;

const SYSTEM_SCHEMAS: &str = "('pg_catalog', 'information_schema')";

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn normalize_table_type(raw: &str) -> String {
    match raw {
        "BASE TABLE" => "table".to_string(),
        "VIEW" => "view".to_string(),
        other => other.to_ascii_lowercase(),
    }
}

#[async_trait]
impl CatalogLoader for PostgresLoader {
    fn system_id(&self) -> &'static str {
        "postgresql"
    }

    async fn load(
        &self,
        pool: &AnyPool,
        options: &CrawlOptions,
        _extra: &HashMap<String, String>,
    ) -> Result<Catalog, SessionError> {
        let version: String = sqlx::query("SELECT current_setting('server_version')")
            .fetch_one(pool)
            .await?
            .try_get(0)?;
        debug!(%version, "loading PostgreSQL catalog");

        let table_rows = sqlx::query(&format!(
            "SELECT table_schema, table_name, table_type \
             FROM information_schema.tables \
             WHERE table_schema NOT IN {SYSTEM_SCHEMAS} \
             ORDER BY table_schema, table_name"
        ))
        .fetch_all(pool)
        .await?;

        let mut tables = Vec::with_capacity(table_rows.len());
        for row in table_rows {
            let schema: String = row.try_get("table_schema")?;
            let name: String = row.try_get("table_name")?;
            let table_type = normalize_table_type(&row.try_get::<String, _>("table_type")?);
            tables.push(Table {
                schema,
                name,
                table_type,
                remarks: None,
                definition: None,
                columns: Vec::new(),
                referenced_tables: Vec::new(),
                row_count: None,
            });
        }

        if options.info_level >= InfoLevel::Standard {
            let column_rows = sqlx::query(&format!(
                "SELECT table_schema, table_name, column_name, data_type, \
                        is_nullable, column_default \
                 FROM information_schema.columns \
                 WHERE table_schema NOT IN {SYSTEM_SCHEMAS} \
                 ORDER BY table_schema, table_name, ordinal_position"
            ))
            .fetch_all(pool)
            .await?;
            for row in column_rows {
                let schema: String = row.try_get("table_schema")?;
                let name: String = row.try_get("table_name")?;
                if let Some(table) = tables
                    .iter_mut()
                    .find(|t| t.schema == schema && t.name == name)
                {
                    table.columns.push(Column {
                        name: row.try_get("column_name")?,
                        data_type: row.try_get("data_type")?,
                        nullable: row.try_get::<String, _>("is_nullable")? == "YES",
                        default_value: row.try_get("column_default")?,
                        remarks: None,
                    });
                }
            }

            let fk_rows = sqlx::query(
                "SELECT tc.table_schema, tc.table_name, \
                        ccu.table_schema AS ref_schema, ccu.table_name AS ref_table \
                 FROM information_schema.table_constraints tc \
                 JOIN information_schema.constraint_column_usage ccu \
                   ON tc.constraint_name = ccu.constraint_name \
                  AND tc.constraint_schema = ccu.constraint_schema \
                 WHERE tc.constraint_type = 'FOREIGN KEY'",
            )
            .fetch_all(pool)
            .await?;
            for row in fk_rows {
                let schema: String = row.try_get("table_schema")?;
                let name: String = row.try_get("table_name")?;
                let ref_schema: String = row.try_get("ref_schema")?;
                let ref_table: String = row.try_get("ref_table")?;
                if let Some(table) = tables
                    .iter_mut()
                    .find(|t| t.schema == schema && t.name == name)
                {
                    let referenced = format!("{}.{}", ref_schema, ref_table);
                    if !table.referenced_tables.contains(&referenced) {
                        table.referenced_tables.push(referenced);
                    }
                }
            }
        }

        if options.info_level >= InfoLevel::Detailed {
            let view_rows = sqlx::query(&format!(
                "SELECT table_schema, table_name, view_definition \
                 FROM information_schema.views \
                 WHERE table_schema NOT IN {SYSTEM_SCHEMAS}"
            ))
            .fetch_all(pool)
            .await?;
            for row in view_rows {
                let schema: String = row.try_get("table_schema")?;
                let name: String = row.try_get("table_name")?;
                if let Some(table) = tables
                    .iter_mut()
                    .find(|t| t.schema == schema && t.name == name)
                {
                    table.definition = row.try_get("view_definition")?;
                }
            }
        }

        if wants_row_counts(options) {
            for table in &mut tables {
                if table.table_type != "table" {
                    continue;
                }
                let count_row = sqlx::query(&format!(
                    "SELECT COUNT(*) FROM {}.{}",
                    quote_ident(&table.schema),
                    quote_ident(&table.name)
                ))
                .fetch_one(pool)
                .await?;
                table.row_count = Some(count_row.try_get::<i64, _>(0)?);
            }
        }

        let routines = if options.info_level >= InfoLevel::Detailed {
            load_routines(pool).await?
        } else {
            Vec::new()
        };
        let sequences = if options.info_level >= InfoLevel::Detailed {
            let rows = sqlx::query(
                "SELECT sequence_schema, sequence_name FROM information_schema.sequences \
                 ORDER BY sequence_schema, sequence_name",
            )
            .fetch_all(pool)
            .await?;
            rows.into_iter()
                .map(|row| {
                    Ok(Sequence {
                        schema: row.try_get("sequence_schema")?,
                        name: row.try_get("sequence_name")?,
                    })
                })
                .collect::<Result<Vec<_>, sqlx::Error>>()?
        } else {
            Vec::new()
        };

        let mut catalog = Catalog {
            database_product: "PostgreSQL".to_string(),
            database_version: version,
            server_id: self.system_id().to_string(),
            info_level: options.info_level,
            loaded_at: Utc::now(),
            tables,
            routines,
            sequences,
            synonyms: Vec::new(),
        };
        catalog.apply_rules(options);
        Ok(catalog)
    }
}

async fn load_routines(pool: &AnyPool) -> Result<Vec<Routine>, SessionError> {
    let routine_rows = sqlx::query(&format!(
        "SELECT routine_schema, routine_name, routine_type, data_type, specific_name \
         FROM information_schema.routines \
         WHERE routine_schema NOT IN {SYSTEM_SCHEMAS} \
         ORDER BY routine_schema, routine_name"
    ))
    .fetch_all(pool)
    .await?;

    let mut routines = Vec::with_capacity(routine_rows.len());
    let mut specific_names = Vec::with_capacity(routine_rows.len());
    for row in routine_rows {
        specific_names.push(row.try_get::<String, _>("specific_name")?);
        routines.push(Routine {
            schema: row.try_get("routine_schema")?,
            name: row.try_get("routine_name")?,
            routine_type: row
                .try_get::<String, _>("routine_type")?
                .to_ascii_lowercase(),
            return_type: row.try_get("data_type")?,
            parameters: Vec::new(),
        });
    }

    let parameter_rows = sqlx::query(&format!(
        "SELECT specific_name, parameter_name, data_type, parameter_mode \
         FROM information_schema.parameters \
         WHERE specific_schema NOT IN {SYSTEM_SCHEMAS} \
         ORDER BY specific_name, ordinal_position"
    ))
    .fetch_all(pool)
    .await?;
    for row in parameter_rows {
        let specific: String = row.try_get("specific_name")?;
        if let Some(index) = specific_names.iter().position(|s| *s == specific) {
            routines[index].parameters.push(Parameter {
                name: row
                    .try_get::<Option<String>, _>("parameter_name")?
                    .unwrap_or_default(),
                data_type: row
                    .try_get::<Option<String>, _>("data_type")?
                    .unwrap_or_default(),
                mode: row.try_get("parameter_mode")?,
            });
        }
    }

    Ok(routines)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_types_are_normalized() {
        assert_eq!(normalize_table_type("BASE TABLE"), "table");
        assert_eq!(normalize_table_type("VIEW"), "view");
        assert_eq!(normalize_table_type("FOREIGN"), "foreign");
    }
}
