//! SQLite catalog loader.
//!
//! Everything comes out of `sqlite_master` and the `pragma_*` table-valued
//! functions. SQLite has no routines, sequences or synonyms to report; the
//! single attached database is surfaced as the `main` schema.

use crate::catalog::{Catalog, Column, Table};
use crate::loader::{CatalogLoader, wants_row_counts};
use crate::options::{CrawlOptions, InfoLevel};
use crate::session::SessionError;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{AnyPool, Row};
use std::collections::HashMap;
use tracing::debug;

pub struct SqliteLoader;

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
impl CatalogLoader for SqliteLoader {
    fn system_id(&self) -> &'static str {
        "sqlite"
    }

    async fn load(
        &self,
        pool: &AnyPool,
        options: &CrawlOptions,
        _extra: &HashMap<String, String>,
    ) -> Result<Catalog, SessionError> {
        let version: String = sqlx::query("SELECT sqlite_version()")
            .fetch_one(pool)
            .await?
            .try_get(0)?;
        debug!(%version, "loading SQLite catalog");

        let rows = sqlx::query(
            "SELECT name, type, sql FROM sqlite_master \
             WHERE type IN ('table', 'view') AND name NOT LIKE 'sqlite_%' \
             ORDER BY name",
        )
        .fetch_all(pool)
        .await?;

        let mut tables = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get("name")?;
            let table_type: String = row.try_get("type")?;
            let definition: Option<String> = if options.info_level >= InfoLevel::Detailed {
                row.try_get("sql")?
            } else {
                None
            };

            let mut columns = Vec::new();
            let mut referenced_tables = Vec::new();
            if options.info_level >= InfoLevel::Standard {
                let column_rows = sqlx::query(
                    "SELECT name, type, \"notnull\", dflt_value \
                     FROM pragma_table_info(?) ORDER BY cid",
                )
                .bind(&name)
                .fetch_all(pool)
                .await?;
                for column in column_rows {
                    columns.push(Column {
                        name: column.try_get("name")?,
                        data_type: column.try_get("type")?,
                        nullable: column.try_get::<i64, _>("notnull")? == 0,
                        default_value: column.try_get("dflt_value")?,
                        remarks: None,
                    });
                }

                let fk_rows =
                    sqlx::query("SELECT DISTINCT \"table\" FROM pragma_foreign_key_list(?)")
                        .bind(&name)
                        .fetch_all(pool)
                        .await?;
                for fk in fk_rows {
                    let referenced: String = fk.try_get("table")?;
                    referenced_tables.push(format!("main.{}", referenced));
                }
            }

            let row_count = if wants_row_counts(options) && table_type == "table" {
                let count_row =
                    sqlx::query(&format!("SELECT COUNT(*) FROM {}", quote_ident(&name)))
                        .fetch_one(pool)
                        .await?;
                Some(count_row.try_get::<i64, _>(0)?)
            } else {
                None
            };

            tables.push(Table {
                schema: "main".to_string(),
                name,
                table_type,
                remarks: None,
                definition,
                columns,
                referenced_tables,
                row_count,
            });
        }

        let mut catalog = Catalog {
            database_product: "SQLite".to_string(),
            database_version: version,
            server_id: self.system_id().to_string(),
            info_level: options.info_level,
            loaded_at: Utc::now(),
            tables,
            routines: Vec::new(),
            sequences: Vec::new(),
            synonyms: Vec::new(),
        };
        catalog.apply_rules(options);
        Ok(catalog)
    }
}
