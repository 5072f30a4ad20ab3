//! The mutable session threaded through every shell command.
//!
//! One `SessionState` lives for the whole interactive session, owned by the
//! shell loop and passed by reference into command handlers. It owns the
//! connection pool, the accumulated retrieval and output options, the extra
//! settings bag and the loaded catalog. Handlers either complete all their
//! mutations or none; failures never leave partial state behind.

use crate::catalog::Catalog;
use crate::config::Config;
use crate::connector::DatabaseConnector;
use crate::loader::loader_for;
use crate::options::{CrawlOptions, FilterOptions, GrepOptions, InfoLevel, LimitOptions,
                     OutputFormat, OutputOptions, ShowOptions, SortOptions};
use crate::render;
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Once;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// User-facing error kinds for the session commands. Library errors are
/// wrapped here so the shell layer only ever prints one of these.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("unknown database server '{0}', see the servers command")]
    UnknownServer(String),

    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("no catalog loader for database system '{0}'")]
    NoLoaderFound(String),

    #[error("output format '{0}' is a diagram format and needs an output file")]
    MissingOutputTarget(OutputFormat),

    #[error("unknown command '{0}', see the commands command")]
    UnknownCommand(String),

    #[error("there is no database connection")]
    NotConnected,

    #[error("there is no schema metadata loaded")]
    NotLoaded,

    #[error("database error: {0}")]
    Connection(#[from] sqlx::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("render error: {0}")]
    Render(String),
}

/// Where `execute` sent its output.
#[derive(Debug)]
pub enum ExecuteOutcome {
    File { path: PathBuf },
    Console { rendered: String },
}

impl ExecuteOutcome {
    pub fn status(&self) -> String {
        match self {
            ExecuteOutcome::File { path } => format!("Output sent to {}", path.display()),
            ExecuteOutcome::Console { .. } => "Command completed to console".to_string(),
        }
    }
}

static DRIVERS: Once = Once::new();

fn install_drivers() {
    DRIVERS.call_once(sqlx::any::install_default_drivers);
}

#[derive(Default)]
pub struct SessionState {
    pool: Option<AnyPool>,
    connector: Option<&'static DatabaseConnector>,
    crawl_options: CrawlOptions,
    output_options: OutputOptions,
    extra_settings: HashMap<String, String>,
    catalog: Option<Catalog>,
    description: Option<String>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect using a server identifier and structured connection fields.
    /// An unknown identifier fails before any prior state is touched; any
    /// later failure leaves the session swept with no connection stored.
    pub async fn connect(
        &mut self,
        server_id: &str,
        host: Option<&str>,
        port: Option<u16>,
        database: &str,
        urlx: Option<&str>,
        user: &str,
        password: Option<&str>,
        config: &Config,
    ) -> Result<&'static DatabaseConnector, SessionError> {
        let connector = DatabaseConnector::lookup(server_id)
            .ok_or_else(|| SessionError::UnknownServer(server_id.to_string()))?;
        let url = connector.build_url(host, port, database, urlx, user, password);
        self.open(connector, &url, user, database, config).await?;
        Ok(connector)
    }

    /// Connect using a caller-supplied URL; the connector is resolved from
    /// the URL scheme.
    pub async fn connect_url(
        &mut self,
        url: &str,
        user: &str,
        password: Option<&str>,
        config: &Config,
    ) -> Result<&'static DatabaseConnector, SessionError> {
        let connector = DatabaseConnector::lookup_from_url(url)
            .ok_or_else(|| SessionError::UnknownServer(url.to_string()))?;
        let url = connector.url_with_credentials(url, user, password);
        self.open(connector, &url, user, "", config).await?;
        Ok(connector)
    }

    async fn open(
        &mut self,
        connector: &'static DatabaseConnector,
        url: &str,
        user: &str,
        database: &str,
        config: &Config,
    ) -> Result<(), SessionError> {
        // A connect is a fresh session, not additive.
        self.sweep().await;
        install_drivers();
        debug!(server = connector.server_id, "opening connection pool");
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        info!(server = connector.server_id, "connected");

        self.pool = Some(pool);
        self.connector = Some(connector);
        self.extra_settings = config.extra.clone();
        self.crawl_options = CrawlOptions {
            info_level: config.default_info_level,
            ..CrawlOptions::default()
        };
        self.output_options = OutputOptions {
            format: config.default_output_format,
            ..OutputOptions::default()
        };
        let target = if database.is_empty() {
            connector.display_name.to_string()
        } else {
            database.to_string()
        };
        self.description = Some(format!("{}@{}", user, target));
        Ok(())
    }

    /// Probe the stored pool by acquiring and releasing a connection.
    /// Returns false, never an error, when absent or failing.
    pub async fn is_connected(&self) -> bool {
        match &self.pool {
            Some(pool) if !pool.is_closed() => match pool.acquire().await {
                Ok(_connection) => true,
                Err(e) => {
                    warn!("connection probe failed: {e}");
                    false
                }
            },
            _ => false,
        }
    }

    /// Drop the network resource only; options and catalog stay.
    pub async fn disconnect(&mut self) {
        if let Some(pool) = self.pool.take() {
            // Close failures are best-effort; sqlx close does not report them.
            pool.close().await;
            debug!("connection pool closed");
        }
        self.connector = None;
        self.description = None;
    }

    /// Reset the whole session to its disconnected, unconfigured state.
    pub async fn sweep(&mut self) {
        self.catalog = None;
        self.extra_settings = HashMap::new();
        self.crawl_options = CrawlOptions::default();
        self.output_options = OutputOptions::default();
        self.disconnect().await;
    }

    /// Load a catalog snapshot at the given info level. On any failure the
    /// catalog field is cleared, never left stale, and the error surfaces.
    pub async fn load_catalog(&mut self, info_level: InfoLevel) -> Result<(), SessionError> {
        // Load always starts from "not loaded" for its own outcome.
        self.catalog = None;
        let pool = self.pool.as_ref().ok_or(SessionError::NotConnected)?;
        let connector = self.connector.ok_or(SessionError::NotConnected)?;
        let loader = loader_for(connector.server_id)
            .ok_or_else(|| SessionError::NoLoaderFound(connector.server_id.to_string()))?;

        self.crawl_options.info_level = info_level;
        match loader
            .load(pool, &self.crawl_options, &self.extra_settings)
            .await
        {
            Ok(catalog) => {
                info!(
                    tables = catalog.tables.len(),
                    level = %info_level,
                    "catalog loaded"
                );
                self.catalog = Some(catalog);
                Ok(())
            }
            Err(e) => {
                warn!("catalog load failed: {e}");
                self.catalog = None;
                Err(e)
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.catalog.is_some()
    }

    /// Run a render command over the loaded catalog. Explicit output file
    /// and format win over the accumulated output options. Execution works
    /// from the snapshot alone; a live connection is re-acquired only when
    /// the session still holds an open pool, and released on every path.
    pub async fn execute(
        &self,
        command: &str,
        output_file: Option<PathBuf>,
        output_format: Option<OutputFormat>,
    ) -> Result<ExecuteOutcome, SessionError> {
        let catalog = self.catalog.as_ref().ok_or(SessionError::NotLoaded)?;

        let mut options = self.output_options.clone();
        if let Some(format) = output_format {
            options.format = format;
        }
        if let Some(path) = output_file {
            options.output_file = Some(path);
        }
        if options.format.is_diagram() && options.output_file.is_none() {
            return Err(SessionError::MissingOutputTarget(options.format));
        }

        let _connection = match &self.pool {
            Some(pool) if !pool.is_closed() => pool.acquire().await.ok(),
            _ => None,
        };

        let rendered = render::render(catalog, command, &options)?;
        match options.output_file {
            Some(path) => {
                fs::write(&path, rendered)?;
                Ok(ExecuteOutcome::File { path })
            }
            None => Ok(ExecuteOutcome::Console { rendered }),
        }
    }

    // Option mutators. The command layer validates patterns before calling
    // these, so a handler never applies half of its settings.

    pub fn set_filter(&mut self, filter: FilterOptions) {
        self.crawl_options.filter = filter;
    }

    pub fn set_grep(&mut self, grep: GrepOptions) {
        self.crawl_options.grep = grep;
    }

    pub fn set_limit(&mut self, limit: LimitOptions) {
        self.crawl_options.limit = limit;
    }

    pub fn set_output(
        &mut self,
        title: Option<String>,
        output_file: Option<PathBuf>,
        format: Option<OutputFormat>,
    ) {
        if let Some(title) = title {
            self.output_options.title = Some(title);
        }
        if let Some(path) = output_file {
            self.output_options.output_file = Some(path);
        }
        if let Some(format) = format {
            self.output_options.format = format;
        }
    }

    pub fn set_show(&mut self, show: ShowOptions) {
        self.output_options.show = show;
    }

    pub fn set_sort(&mut self, sort: SortOptions) {
        self.output_options.sort = sort;
    }

    pub fn merge_extra_settings(&mut self, settings: HashMap<String, String>) {
        self.extra_settings.extend(settings);
    }

    // Accessors.

    pub fn pool(&self) -> Option<&AnyPool> {
        self.pool.as_ref()
    }

    pub fn connector(&self) -> Option<&'static DatabaseConnector> {
        self.connector
    }

    pub fn crawl_options(&self) -> &CrawlOptions {
        &self.crawl_options
    }

    pub fn output_options(&self) -> &OutputOptions {
        &self.output_options
    }

    pub fn extra_settings(&self) -> &HashMap<String, String> {
        &self.extra_settings
    }

    pub fn catalog(&self) -> Option<&Catalog> {
        self.catalog.as_ref()
    }

    /// Short "user@target" text for the prompt, present while connected.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::InclusionRule;
    use tempfile::TempDir;

    async fn sqlite_session(dir: &TempDir) -> SessionState {
        let config = Config::default();
        let database = dir.path().join("fixture.db");
        let mut session = SessionState::new();
        session
            .connect(
                "sqlite",
                None,
                None,
                database.to_str().unwrap(),
                Some("mode=rwc"),
                "sa",
                None,
                &config,
            )
            .await
            .expect("connect to fixture database");

        let pool = session.pool().unwrap();
        sqlx::query("CREATE TABLE authors (id INTEGER PRIMARY KEY, name TEXT NOT NULL)")
            .execute(pool)
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE books (id INTEGER PRIMARY KEY, title TEXT NOT NULL, \
             author_id INTEGER REFERENCES authors(id))",
        )
        .execute(pool)
        .await
        .unwrap();
        session
    }

    #[tokio::test]
    async fn connect_then_probe_reports_connected() {
        let dir = TempDir::new().unwrap();
        let session = sqlite_session(&dir).await;
        assert!(session.is_connected().await);
        assert!(!session.is_loaded());
    }

    #[tokio::test]
    async fn fresh_session_is_disconnected() {
        let session = SessionState::new();
        assert!(!session.is_connected().await);
        assert!(!session.is_loaded());
    }

    #[tokio::test]
    async fn unknown_server_leaves_state_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut session = sqlite_session(&dir).await;
        let result = session
            .connect("oracle", None, None, "x", None, "sa", None, &Config::default())
            .await;
        assert!(matches!(result, Err(SessionError::UnknownServer(_))));
        assert!(session.is_connected().await);
    }

    #[tokio::test]
    async fn failed_connect_leaves_no_connection() {
        let mut session = SessionState::new();
        let result = session
            .connect_url(
                "postgres://nobody@localhost:1/void",
                "nobody",
                None,
                &Config::default(),
            )
            .await;
        assert!(result.is_err());
        assert!(!session.is_connected().await);
    }

    #[tokio::test]
    async fn load_catalog_stores_the_snapshot() {
        let dir = TempDir::new().unwrap();
        let mut session = sqlite_session(&dir).await;
        session.load_catalog(InfoLevel::Standard).await.unwrap();
        assert!(session.is_loaded());
        let catalog = session.catalog().unwrap();
        assert_eq!(catalog.tables.len(), 2);
        let books = catalog.tables.iter().find(|t| t.name == "books").unwrap();
        assert_eq!(books.columns.len(), 3);
        assert_eq!(books.referenced_tables, vec!["main.authors".to_string()]);
    }

    #[tokio::test]
    async fn failed_load_clears_a_previously_loaded_catalog() {
        let dir = TempDir::new().unwrap();
        let mut session = sqlite_session(&dir).await;
        session.load_catalog(InfoLevel::Standard).await.unwrap();
        assert!(session.is_loaded());

        session.disconnect().await;
        let result = session.load_catalog(InfoLevel::Standard).await;
        assert!(matches!(result, Err(SessionError::NotConnected)));
        assert!(!session.is_loaded());
    }

    #[tokio::test]
    async fn disconnect_keeps_options_and_catalog() {
        let dir = TempDir::new().unwrap();
        let mut session = sqlite_session(&dir).await;
        session.load_catalog(InfoLevel::Standard).await.unwrap();
        session.set_output(Some("inventory".to_string()), None, None);

        session.disconnect().await;
        assert!(!session.is_connected().await);
        assert!(session.is_loaded());
        assert_eq!(session.output_options().title.as_deref(), Some("inventory"));
    }

    #[tokio::test]
    async fn sweep_resets_everything() {
        let dir = TempDir::new().unwrap();
        let mut session = sqlite_session(&dir).await;
        session.load_catalog(InfoLevel::Standard).await.unwrap();
        session.set_output(Some("inventory".to_string()), None, None);
        session.merge_extra_settings(HashMap::from([("k".to_string(), "v".to_string())]));

        session.sweep().await;
        assert!(!session.is_connected().await);
        assert!(!session.is_loaded());
        assert!(session.output_options().title.is_none());
        assert!(session.extra_settings().is_empty());
        assert!(!session.crawl_options().grep.is_active());
    }

    #[tokio::test]
    async fn disconnect_and_sweep_are_idempotent() {
        let dir = TempDir::new().unwrap();
        let mut session = sqlite_session(&dir).await;
        session.disconnect().await;
        session.disconnect().await;
        session.sweep().await;
        session.sweep().await;
        assert!(!session.is_connected().await);
        assert!(!session.is_loaded());
    }

    #[tokio::test]
    async fn grep_rules_are_stored_as_given() {
        let dir = TempDir::new().unwrap();
        let mut session = sqlite_session(&dir).await;
        session.set_grep(GrepOptions {
            columns: Some(InclusionRule::include("t.*t").unwrap()),
            parameters: Some(InclusionRule::include("t.*t").unwrap()),
            definitions: Some(InclusionRule::include("t.*t").unwrap()),
            invert_match: true,
            only_matching: true,
        });
        let grep = &session.crawl_options().grep;
        assert_eq!(grep.columns.as_ref().unwrap().pattern(), "t.*t");
        assert_eq!(grep.parameters.as_ref().unwrap().pattern(), "t.*t");
        assert_eq!(grep.definitions.as_ref().unwrap().pattern(), "t.*t");
        assert!(grep.invert_match);
        assert!(grep.only_matching);
    }

    #[tokio::test]
    async fn execute_diagram_without_file_fails_before_rendering() {
        let dir = TempDir::new().unwrap();
        let mut session = sqlite_session(&dir).await;
        session.load_catalog(InfoLevel::Standard).await.unwrap();

        let result = session
            .execute("schema", None, Some(OutputFormat::Dot))
            .await;
        assert!(matches!(result, Err(SessionError::MissingOutputTarget(_))));
    }

    #[tokio::test]
    async fn execute_diagram_with_file_writes_it() {
        let dir = TempDir::new().unwrap();
        let mut session = sqlite_session(&dir).await;
        session.load_catalog(InfoLevel::Standard).await.unwrap();

        let path = dir.path().join("schema.dot");
        let outcome = session
            .execute("schema", Some(path.clone()), Some(OutputFormat::Dot))
            .await
            .unwrap();
        assert!(outcome.status().starts_with("Output sent to"));
        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.contains("\"main.books\" -> \"main.authors\";"));
    }

    #[tokio::test]
    async fn execute_works_from_the_snapshot_without_a_connection() {
        let dir = TempDir::new().unwrap();
        let mut session = sqlite_session(&dir).await;
        session.load_catalog(InfoLevel::Standard).await.unwrap();
        session.disconnect().await;

        let outcome = session.execute("brief", None, None).await.unwrap();
        assert_eq!(outcome.status(), "Command completed to console");
        match outcome {
            ExecuteOutcome::Console { rendered } => assert!(rendered.contains("main.books")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn execute_row_counts_at_maximum_info_level() {
        let dir = TempDir::new().unwrap();
        let mut session = sqlite_session(&dir).await;
        let pool = session.pool().unwrap();
        sqlx::query("INSERT INTO authors (name) VALUES ('Calvino'), ('Borges')")
            .execute(pool)
            .await
            .unwrap();
        session.load_catalog(InfoLevel::Maximum).await.unwrap();

        let authors = session
            .catalog()
            .unwrap()
            .tables
            .iter()
            .find(|t| t.name == "authors")
            .unwrap();
        assert_eq!(authors.row_count, Some(2));
    }
}
