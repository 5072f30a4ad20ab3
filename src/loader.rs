//! Catalog loaders: one per supported database system.
//!
//! A loader plays the role of the retrieval engine: given a live pool and
//! the accumulated crawl options it fetches whatever the info level asks
//! for from the system catalog, then applies the limit/grep/filter rules.
//! Loaders are resolved by the system identifier of the connected database,
//! the same identifier the connector registry uses.

use crate::catalog::Catalog;
use crate::options::CrawlOptions;
use crate::session::SessionError;
use async_trait::async_trait;
use sqlx::AnyPool;
use std::collections::HashMap;

#[async_trait]
pub trait CatalogLoader: Send + Sync {
    /// System identifier this loader answers to.
    fn system_id(&self) -> &'static str;

    /// Fetch a catalog snapshot. `extra` is the free-form settings bag for
    /// anything the typed options don't model.
    async fn load(
        &self,
        pool: &AnyPool,
        options: &CrawlOptions,
        extra: &HashMap<String, String>,
    ) -> Result<Catalog, SessionError>;
}

static LOADERS: &[&(dyn CatalogLoader)] = &[
    &crate::loader_sqlite::SqliteLoader,
    &crate::loader_postgresql::PostgresLoader,
    &crate::loader_mysql::MySqlLoader,
];

/// Resolve the loader registered for a database system identifier.
pub fn loader_for(system_id: &str) -> Option<&'static dyn CatalogLoader> {
    LOADERS
        .iter()
        .find(|l| l.system_id() == system_id)
        .copied()
}

/// Whether the current options require per-table row counts.
pub(crate) fn wants_row_counts(options: &CrawlOptions) -> bool {
    options.info_level == crate::options::InfoLevel::Maximum
        || options.filter.exclude_empty_tables
}
