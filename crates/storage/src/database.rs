//! Database abstraction layer
//!
//! This module provides the SQLite connection pool backing the local document
//! store, additive schema migrations, and transaction support.

use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Error as SqlxError, Sqlite, SqliteConnection, SqlitePool, Transaction,
};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Database error types
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// SQLx error
    #[error("Database error: {0}")]
    Sqlx(#[from] SqlxError),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(String),
}

/// Result type for database operations
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file path
    pub path: String,
    /// Maximum number of connections in pool
    pub max_connections: u32,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Enable WAL mode
    pub wal_mode: bool,
    /// Synchronous mode
    pub synchronous: SynchronousMode,
}

/// SQLite synchronous mode
#[derive(Debug, Clone, Copy)]
pub enum SynchronousMode {
    /// Off - no synchronization
    Off,
    /// Normal - synchronize at critical moments
    Normal,
    /// Full - synchronize after each write
    Full,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "content.db".to_string(),
            max_connections: 4,
            connect_timeout: Duration::from_secs(30),
            wal_mode: true,
            synchronous: SynchronousMode::Normal,
        }
    }
}

impl DatabaseConfig {
    /// Create a new database configuration
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), ..Default::default() }
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Set connection timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enable or disable WAL mode
    pub fn wal_mode(mut self, enabled: bool) -> Self {
        self.wal_mode = enabled;
        self
    }

    /// Set synchronous mode
    pub fn synchronous(mut self, mode: SynchronousMode) -> Self {
        self.synchronous = mode;
        self
    }
}

/// SQLite database implementation
#[derive(Debug, Clone)]
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Create a new SQLite database with configuration
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        let mut options = SqliteConnectOptions::from_str(&format!("sqlite://{}", config.path))
            .map_err(|e| DatabaseError::Config(e.to_string()))?
            .create_if_missing(true);

        if config.wal_mode {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        options = match config.synchronous {
            SynchronousMode::Off => options.synchronous(SqliteSynchronous::Off),
            SynchronousMode::Normal => options.synchronous(SqliteSynchronous::Normal),
            SynchronousMode::Full => options.synchronous(SqliteSynchronous::Full),
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connect_timeout)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Create an in-memory database (for testing)
    ///
    /// The pool holds exactly one connection that is never recycled, since
    /// every new `sqlite::memory:` connection would see an empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Ok(Self { pool })
    }

    /// Get the underlying pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Run pending migrations in version order
    ///
    /// Versions already recorded in `_migrations` are skipped, and every step
    /// is idempotent on its own, so replaying a migration is a no-op.
    pub async fn migrate(&self, migrations: &[MigrationDefinition]) -> Result<i64> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                installed_on TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                checksum TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let current_version = self.current_version().await?;

        for migration in migrations {
            if migration.version <= current_version {
                continue;
            }

            tracing::info!("Applying migration {} - {}", migration.version, migration.description);

            let mut tx = self.pool.begin().await?;

            for step in &migration.steps {
                step.apply(&mut *tx).await?;
            }

            sqlx::query(
                "INSERT OR REPLACE INTO _migrations (version, description, checksum) VALUES (?, ?, ?)",
            )
            .bind(migration.version)
            .bind(&migration.description)
            .bind(&migration.checksum)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;

            tracing::info!("Migration {} applied successfully", migration.version);
        }

        self.current_version().await
    }

    /// Get current migration version
    pub async fn current_version(&self) -> Result<i64> {
        let version: Option<Option<i64>> =
            sqlx::query_scalar("SELECT MAX(version) FROM _migrations")
                .fetch_optional(&self.pool)
                .await?;

        Ok(version.flatten().unwrap_or(0))
    }

    /// Column names of a table, in declaration order
    pub async fn columns(&self, table: &str) -> Result<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        table_columns(&mut *conn, table).await
    }

    /// Execute a raw SQL statement
    pub async fn execute(&self, sql: &str) -> Result<u64> {
        let result = sqlx::query(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    /// Begin a transaction
    pub async fn begin(&self) -> Result<DatabaseTransaction> {
        let tx = self.pool.begin().await?;
        Ok(DatabaseTransaction { tx: Some(tx) })
    }

    /// Close the database connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn already_committed() -> DatabaseError {
    DatabaseError::Transaction("Transaction already committed".to_string())
}

/// Database transaction wrapper
///
/// Dropping a transaction that was never committed rolls it back.
pub struct DatabaseTransaction {
    tx: Option<Transaction<'static, Sqlite>>,
}

impl DatabaseTransaction {
    /// Borrow the connection the transaction runs on
    pub fn connection(&mut self) -> Result<&mut SqliteConnection> {
        let tx = self.tx.as_mut().ok_or_else(already_committed)?;

        Ok(&mut **tx)
    }

    /// Commit the transaction
    pub async fn commit(mut self) -> Result<()> {
        let tx = self.tx.take().ok_or_else(already_committed)?;

        tx.commit().await?;
        Ok(())
    }

    /// Rollback the transaction
    pub async fn rollback(mut self) -> Result<()> {
        let tx = self.tx.take().ok_or_else(already_committed)?;

        tx.rollback().await?;
        Ok(())
    }
}

async fn table_columns(conn: &mut SqliteConnection, table: &str) -> Result<Vec<String>> {
    let names: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info(?)")
        .bind(table)
        .fetch_all(&mut *conn)
        .await?;
    Ok(names)
}

/// Storage class of a managed column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// UTF-8 text, defaults to `''`
    Text,
    /// 64-bit integer, defaults to `0`
    Integer,
    /// Boolean stored as integer, defaults to `0`
    Boolean,
}

impl ColumnType {
    fn sql(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT NOT NULL DEFAULT ''",
            ColumnType::Integer | ColumnType::Boolean => "INTEGER NOT NULL DEFAULT 0",
        }
    }
}

/// Column definition used by schema steps
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    /// Column name
    pub name: String,
    /// Column type
    pub kind: ColumnType,
    /// Whether to create an index on the column
    pub indexed: bool,
}

impl ColumnDef {
    /// Text column
    pub fn text(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: ColumnType::Text, indexed: false }
    }

    /// Integer column
    pub fn integer(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: ColumnType::Integer, indexed: false }
    }

    /// Boolean column
    pub fn boolean(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: ColumnType::Boolean, indexed: false }
    }

    /// Mark the column as indexed
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }
}

/// One additive schema change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaStep {
    /// Create a table with an internal `id` row identifier
    CreateTable {
        /// Table name
        name: String,
        /// Columns besides `id`
        columns: Vec<ColumnDef>,
    },
    /// Add columns to an existing table, skipping ones already present
    AddColumns {
        /// Table name
        table: String,
        /// Columns to add
        columns: Vec<ColumnDef>,
    },
    /// Create an index on one column
    CreateIndex {
        /// Table name
        table: String,
        /// Indexed column
        column: String,
    },
    /// Raw statement; must be safe to run more than once
    Sql(String),
}

impl SchemaStep {
    /// Render the step as SQL statements
    pub fn render(&self) -> Vec<String> {
        match self {
            SchemaStep::CreateTable { name, columns } => {
                let mut defs = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
                defs.extend(columns.iter().map(|c| format!("{} {}", c.name, c.kind.sql())));

                let mut statements =
                    vec![format!("CREATE TABLE IF NOT EXISTS {} ({})", name, defs.join(", "))];
                statements.extend(
                    columns
                        .iter()
                        .filter(|c| c.indexed)
                        .map(|c| create_index_sql(name, &c.name)),
                );
                statements
            }
            SchemaStep::AddColumns { table, columns } => {
                let mut statements: Vec<String> = columns
                    .iter()
                    .map(|c| {
                        format!("ALTER TABLE {} ADD COLUMN {} {}", table, c.name, c.kind.sql())
                    })
                    .collect();
                statements.extend(
                    columns
                        .iter()
                        .filter(|c| c.indexed)
                        .map(|c| create_index_sql(table, &c.name)),
                );
                statements
            }
            SchemaStep::CreateIndex { table, column } => vec![create_index_sql(table, column)],
            SchemaStep::Sql(sql) => vec![sql.clone()],
        }
    }

    async fn apply(&self, conn: &mut SqliteConnection) -> Result<()> {
        match self {
            SchemaStep::AddColumns { table, columns } => {
                let existing = table_columns(conn, table).await?;
                if existing.is_empty() {
                    return Err(DatabaseError::Migration(format!(
                        "Cannot add columns to missing table {}",
                        table
                    )));
                }

                for column in columns {
                    if !existing.iter().any(|name| name == &column.name) {
                        let sql = format!(
                            "ALTER TABLE {} ADD COLUMN {} {}",
                            table,
                            column.name,
                            column.kind.sql()
                        );
                        sqlx::query(&sql).execute(&mut *conn).await?;
                    } else {
                        tracing::debug!("Column {}.{} already present", table, column.name);
                    }

                    if column.indexed {
                        sqlx::query(&create_index_sql(table, &column.name))
                            .execute(&mut *conn)
                            .await?;
                    }
                }
                Ok(())
            }
            other => {
                for sql in other.render() {
                    sqlx::query(&sql).execute(&mut *conn).await?;
                }
                Ok(())
            }
        }
    }
}

fn create_index_sql(table: &str, column: &str) -> String {
    format!("CREATE INDEX IF NOT EXISTS idx_{table}_{column} ON {table} ({column})")
}

/// Migration definition
#[derive(Debug, Clone)]
pub struct MigrationDefinition {
    /// Target schema version
    pub version: i64,
    /// Migration description
    pub description: String,
    /// Additive steps
    pub steps: Vec<SchemaStep>,
    /// Checksum for verification
    pub checksum: String,
}

impl MigrationDefinition {
    /// Create a new migration definition
    pub fn new(version: i64, description: impl Into<String>, steps: Vec<SchemaStep>) -> Self {
        let rendered: Vec<String> = steps.iter().flat_map(|s| s.render()).collect();
        let checksum = format!("{:x}", md5::compute(rendered.join(";\n")));

        Self { version, description: description.into(), steps, checksum }
    }
}
