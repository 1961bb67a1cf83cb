//! Local document store
//!
//! Mirrors the remote deity/stotra collections in language-partitioned SQLite
//! tables. One row type per entity is shared by every language; the
//! [`Language`] argument selects the table.
//!
//! Every mutation goes through a [`ContentTransaction`], which is atomic: it
//! either commits as a whole or leaves the tables untouched.

use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection};
use std::collections::HashSet;
use thiserror::Error;

use crate::database::{DatabaseError, DatabaseTransaction, SqliteDatabase};
use crate::language::Language;
use crate::schema::content_migrations;

/// Content store error types
#[derive(Debug, Error)]
pub enum ContentError {
    /// Underlying database error
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// A record is missing a required identifier
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl From<sqlx::Error> for ContentError {
    fn from(err: sqlx::Error) -> Self {
        ContentError::Database(DatabaseError::Sqlx(err))
    }
}

/// Result type for content store operations
pub type Result<T> = std::result::Result<T, ContentError>;

/// Deity row as stored locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deity {
    /// Internal row identifier
    pub id: i64,
    /// Stable external identifier
    pub deity_id: String,
    /// Display name in the table's language
    pub name: String,
    /// English transliteration
    pub name_english: String,
    /// Image reference
    pub image: String,
}

/// Stotra row as stored locally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stotra {
    /// Internal row identifier
    pub id: i64,
    /// Stable external identifier
    pub stotra_id: String,
    /// External identifier of the parent deity
    pub deity_id: String,
    /// Display title in the table's language
    pub title: String,
    /// English title
    pub title_english: String,
    /// Full text body
    pub content: String,
    /// Marked as favorite by the user
    pub is_favorite: bool,
    /// Remote-assigned version, epoch millis
    pub version_timestamp: i64,
}

/// Fields needed to create a deity row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeityRecord {
    /// Stable external identifier
    pub deity_id: String,
    /// Display name
    pub name: String,
    /// English transliteration
    #[serde(default)]
    pub name_english: String,
    /// Image reference
    #[serde(default)]
    pub image: String,
}

/// Fields needed to create a stotra row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StotraRecord {
    /// Stable external identifier
    pub stotra_id: String,
    /// External identifier of the parent deity
    pub deity_id: String,
    /// Display title
    pub title: String,
    /// English title
    #[serde(default)]
    pub title_english: String,
    /// Full text body
    pub content: String,
    /// Favorite flag
    #[serde(default)]
    pub is_favorite: bool,
    /// Remote-assigned version, epoch millis
    #[serde(default)]
    pub version_timestamp: i64,
}

impl From<&Deity> for DeityRecord {
    fn from(deity: &Deity) -> Self {
        Self {
            deity_id: deity.deity_id.clone(),
            name: deity.name.clone(),
            name_english: deity.name_english.clone(),
            image: deity.image.clone(),
        }
    }
}

impl From<&Stotra> for StotraRecord {
    fn from(stotra: &Stotra) -> Self {
        Self {
            stotra_id: stotra.stotra_id.clone(),
            deity_id: stotra.deity_id.clone(),
            title: stotra.title.clone(),
            title_english: stotra.title_english.clone(),
            content: stotra.content.clone(),
            is_favorite: stotra.is_favorite,
            version_timestamp: stotra.version_timestamp,
        }
    }
}

/// Row predicate for stotra queries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StotraFilter<'a> {
    /// Every stotra
    All,
    /// Stotras belonging to a deity (by external identifier)
    Deity(&'a str),
    /// Stotras marked favorite
    Favorites,
    /// A single stotra by external identifier
    StotraId(&'a str),
}

/// Row counts for one language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContentCounts {
    /// Number of deities
    pub deities: usize,
    /// Number of stotras
    pub stotras: usize,
}

/// Language-partitioned deity/stotra store
#[derive(Debug, Clone)]
pub struct ContentStore {
    db: SqliteDatabase,
}

impl ContentStore {
    /// Wrap a database, bringing its schema up to date
    pub async fn open(db: SqliteDatabase) -> Result<Self> {
        db.migrate(&content_migrations()).await?;
        Ok(Self { db })
    }

    /// Create a store backed by an in-memory database
    pub async fn in_memory() -> Result<Self> {
        Self::open(SqliteDatabase::in_memory().await?).await
    }

    /// Underlying database handle
    pub fn database(&self) -> &SqliteDatabase {
        &self.db
    }

    /// Schema version currently applied
    pub async fn schema_version(&self) -> Result<i64> {
        Ok(self.db.current_version().await?)
    }

    /// All deities for a language
    pub async fn deities(&self, language: Language) -> Result<Vec<Deity>> {
        let mut conn = self.db.pool().acquire().await?;
        fetch_deities(&mut conn, language).await
    }

    /// Find a deity by external identifier
    pub async fn find_deity(&self, language: Language, deity_id: &str) -> Result<Option<Deity>> {
        let mut conn = self.db.pool().acquire().await?;
        fetch_deity(&mut conn, language, deity_id).await
    }

    /// Stotras matching a predicate
    pub async fn query_stotras(
        &self,
        language: Language,
        filter: StotraFilter<'_>,
    ) -> Result<Vec<Stotra>> {
        let mut conn = self.db.pool().acquire().await?;
        fetch_stotras(&mut conn, language, filter).await
    }

    /// All stotras for a language
    pub async fn stotras(&self, language: Language) -> Result<Vec<Stotra>> {
        self.query_stotras(language, StotraFilter::All).await
    }

    /// Stotras belonging to one deity
    pub async fn stotras_for_deity(
        &self,
        language: Language,
        deity_id: &str,
    ) -> Result<Vec<Stotra>> {
        self.query_stotras(language, StotraFilter::Deity(deity_id)).await
    }

    /// Stotras marked favorite
    pub async fn favorites(&self, language: Language) -> Result<Vec<Stotra>> {
        self.query_stotras(language, StotraFilter::Favorites).await
    }

    /// Find a stotra by external identifier
    pub async fn find_stotra(&self, language: Language, stotra_id: &str) -> Result<Option<Stotra>> {
        Ok(self
            .query_stotras(language, StotraFilter::StotraId(stotra_id))
            .await?
            .into_iter()
            .next())
    }

    /// Row counts for a language
    pub async fn counts(&self, language: Language) -> Result<ContentCounts> {
        let deities: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", language.deities_table()))
                .fetch_one(self.db.pool())
                .await?;
        let stotras: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", language.stotras_table()))
                .fetch_one(self.db.pool())
                .await?;

        Ok(ContentCounts { deities: deities as usize, stotras: stotras as usize })
    }

    /// Set the favorite flag of one stotra
    ///
    /// Returns `false` when no stotra has the given identifier.
    pub async fn set_favorite(
        &self,
        language: Language,
        stotra_id: &str,
        is_favorite: bool,
    ) -> Result<bool> {
        let mut tx = self.begin_write().await?;
        let found = tx.set_favorite(language, stotra_id, is_favorite).await?;
        tx.commit().await?;
        Ok(found)
    }

    /// Begin a write transaction
    ///
    /// With a single-connection pool, reads through the store wait until the
    /// transaction finishes; use the transaction's own read methods instead.
    pub async fn begin_write(&self) -> Result<ContentTransaction> {
        Ok(ContentTransaction { tx: self.db.begin().await? })
    }
}

/// Atomic unit of writes against the content tables
pub struct ContentTransaction {
    tx: DatabaseTransaction,
}

impl ContentTransaction {
    /// Delete every deity and stotra row of a language
    pub async fn delete_all(&mut self, language: Language) -> Result<ContentCounts> {
        let conn = self.tx.connection()?;

        let stotras = sqlx::query(&format!("DELETE FROM {}", language.stotras_table()))
            .execute(&mut *conn)
            .await?
            .rows_affected();
        let deities = sqlx::query(&format!("DELETE FROM {}", language.deities_table()))
            .execute(&mut *conn)
            .await?
            .rows_affected();

        Ok(ContentCounts { deities: deities as usize, stotras: stotras as usize })
    }

    /// Insert a deity row, returning its internal identifier
    pub async fn insert_deity(&mut self, language: Language, record: &DeityRecord) -> Result<i64> {
        if record.deity_id.trim().is_empty() {
            return Err(ContentError::InvalidRecord("deity without deity_id".to_string()));
        }

        let conn = self.tx.connection()?;
        let result = sqlx::query(&format!(
            "INSERT INTO {} (deity_id, name, name_english, image) VALUES (?, ?, ?, ?)",
            language.deities_table()
        ))
        .bind(&record.deity_id)
        .bind(&record.name)
        .bind(&record.name_english)
        .bind(&record.image)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Insert a stotra row, returning its internal identifier
    pub async fn insert_stotra(
        &mut self,
        language: Language,
        record: &StotraRecord,
    ) -> Result<i64> {
        validate_stotra(record)?;

        let conn = self.tx.connection()?;
        let result = sqlx::query(&format!(
            "INSERT INTO {} (stotra_id, deity_id, title, title_english, content, is_favorite, version_timestamp)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            language.stotras_table()
        ))
        .bind(&record.stotra_id)
        .bind(&record.deity_id)
        .bind(&record.title)
        .bind(&record.title_english)
        .bind(&record.content)
        .bind(record.is_favorite)
        .bind(record.version_timestamp)
        .execute(&mut *conn)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Overwrite the remote-sourced fields of an existing stotra
    ///
    /// `is_favorite` is left untouched. Returns `false` when no row matches.
    pub async fn update_stotra_content(
        &mut self,
        language: Language,
        record: &StotraRecord,
    ) -> Result<bool> {
        validate_stotra(record)?;

        let conn = self.tx.connection()?;
        let result = sqlx::query(&format!(
            "UPDATE {} SET deity_id = ?, title = ?, title_english = ?, content = ?, version_timestamp = ?
             WHERE stotra_id = ?",
            language.stotras_table()
        ))
        .bind(&record.deity_id)
        .bind(&record.title)
        .bind(&record.title_english)
        .bind(&record.content)
        .bind(record.version_timestamp)
        .bind(&record.stotra_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Set the favorite flag of one stotra
    pub async fn set_favorite(
        &mut self,
        language: Language,
        stotra_id: &str,
        is_favorite: bool,
    ) -> Result<bool> {
        let conn = self.tx.connection()?;
        let result = sqlx::query(&format!(
            "UPDATE {} SET is_favorite = ? WHERE stotra_id = ?",
            language.stotras_table()
        ))
        .bind(is_favorite)
        .bind(stotra_id)
        .execute(&mut *conn)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Find a deity by external identifier
    pub async fn find_deity(
        &mut self,
        language: Language,
        deity_id: &str,
    ) -> Result<Option<Deity>> {
        fetch_deity(self.tx.connection()?, language, deity_id).await
    }

    /// Find a stotra by external identifier
    pub async fn find_stotra(
        &mut self,
        language: Language,
        stotra_id: &str,
    ) -> Result<Option<Stotra>> {
        Ok(fetch_stotras(self.tx.connection()?, language, StotraFilter::StotraId(stotra_id))
            .await?
            .into_iter()
            .next())
    }

    /// External identifiers of favorite stotras
    pub async fn favorite_ids(&mut self, language: Language) -> Result<HashSet<String>> {
        let conn = self.tx.connection()?;
        let ids: Vec<String> = sqlx::query_scalar(&format!(
            "SELECT stotra_id FROM {} WHERE is_favorite = 1",
            language.stotras_table()
        ))
        .fetch_all(&mut *conn)
        .await?;

        Ok(ids.into_iter().collect())
    }

    /// Commit all writes
    pub async fn commit(self) -> Result<()> {
        Ok(self.tx.commit().await?)
    }

    /// Discard all writes
    pub async fn rollback(self) -> Result<()> {
        Ok(self.tx.rollback().await?)
    }
}

fn validate_stotra(record: &StotraRecord) -> Result<()> {
    if record.stotra_id.trim().is_empty() {
        return Err(ContentError::InvalidRecord("stotra without stotra_id".to_string()));
    }
    if record.deity_id.trim().is_empty() {
        return Err(ContentError::InvalidRecord(format!(
            "stotra {} without deity_id",
            record.stotra_id
        )));
    }
    Ok(())
}

const DEITY_COLUMNS: &str = "id, deity_id, name, name_english, image";
const STOTRA_COLUMNS: &str =
    "id, stotra_id, deity_id, title, title_english, content, is_favorite, version_timestamp";

fn deity_from_row(row: &SqliteRow) -> std::result::Result<Deity, sqlx::Error> {
    Ok(Deity {
        id: row.try_get("id")?,
        deity_id: row.try_get("deity_id")?,
        name: row.try_get("name")?,
        name_english: row.try_get("name_english")?,
        image: row.try_get("image")?,
    })
}

fn stotra_from_row(row: &SqliteRow) -> std::result::Result<Stotra, sqlx::Error> {
    Ok(Stotra {
        id: row.try_get("id")?,
        stotra_id: row.try_get("stotra_id")?,
        deity_id: row.try_get("deity_id")?,
        title: row.try_get("title")?,
        title_english: row.try_get("title_english")?,
        content: row.try_get("content")?,
        is_favorite: row.try_get("is_favorite")?,
        version_timestamp: row.try_get("version_timestamp")?,
    })
}

async fn fetch_deities(conn: &mut SqliteConnection, language: Language) -> Result<Vec<Deity>> {
    let sql = format!("SELECT {} FROM {} ORDER BY id", DEITY_COLUMNS, language.deities_table());
    let rows = sqlx::query(&sql).fetch_all(&mut *conn).await?;
    Ok(rows.iter().map(deity_from_row).collect::<std::result::Result<_, _>>()?)
}

async fn fetch_deity(
    conn: &mut SqliteConnection,
    language: Language,
    deity_id: &str,
) -> Result<Option<Deity>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE deity_id = ? ORDER BY id LIMIT 1",
        DEITY_COLUMNS,
        language.deities_table()
    );
    let row = sqlx::query(&sql).bind(deity_id).fetch_optional(&mut *conn).await?;
    Ok(row.as_ref().map(deity_from_row).transpose()?)
}

async fn fetch_stotras(
    conn: &mut SqliteConnection,
    language: Language,
    filter: StotraFilter<'_>,
) -> Result<Vec<Stotra>> {
    let table = language.stotras_table();
    let (predicate, value) = match filter {
        StotraFilter::All => ("", None),
        StotraFilter::Deity(deity_id) => (" WHERE deity_id = ?", Some(deity_id)),
        StotraFilter::Favorites => (" WHERE is_favorite = 1", None),
        StotraFilter::StotraId(stotra_id) => (" WHERE stotra_id = ?", Some(stotra_id)),
    };
    let sql = format!("SELECT {} FROM {}{} ORDER BY id", STOTRA_COLUMNS, table, predicate);

    let mut query = sqlx::query(&sql);
    if let Some(value) = value {
        query = query.bind(value);
    }
    let rows = query.fetch_all(&mut *conn).await?;

    Ok(rows.iter().map(stotra_from_row).collect::<std::result::Result<_, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deity(id: &str, name: &str) -> DeityRecord {
        DeityRecord {
            deity_id: id.to_string(),
            name: name.to_string(),
            name_english: id.to_string(),
            image: format!("{}.png", id),
        }
    }

    fn stotra(id: &str, deity_id: &str, title: &str) -> StotraRecord {
        StotraRecord {
            stotra_id: id.to_string(),
            deity_id: deity_id.to_string(),
            title: title.to_string(),
            title_english: String::new(),
            content: format!("{} text", title),
            is_favorite: false,
            version_timestamp: 1_700_000_000_000,
        }
    }

    async fn seeded() -> ContentStore {
        let store = ContentStore::in_memory().await.unwrap();
        let mut tx = store.begin_write().await.unwrap();
        tx.insert_deity(Language::Telugu, &deity("ganesha", "గణేశుడు")).await.unwrap();
        tx.insert_deity(Language::Telugu, &deity("hanuman", "హనుమాన్")).await.unwrap();
        tx.insert_stotra(Language::Telugu, &stotra("s1", "ganesha", "పంచరత్నం"))
            .await
            .unwrap();
        tx.insert_stotra(Language::Telugu, &stotra("s2", "hanuman", "చాలీసా"))
            .await
            .unwrap();
        tx.insert_stotra(Language::Telugu, &stotra("s3", "ganesha", "అష్టకం"))
            .await
            .unwrap();
        tx.commit().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_create_and_query() {
        let store = seeded().await;

        let deities = store.deities(Language::Telugu).await.unwrap();
        assert_eq!(deities.len(), 2);
        assert_eq!(deities[0].deity_id, "ganesha");

        let ganesha = store.stotras_for_deity(Language::Telugu, "ganesha").await.unwrap();
        let ids: Vec<&str> = ganesha.iter().map(|s| s.stotra_id.as_str()).collect();
        assert_eq!(ids, vec!["s1", "s3"]);

        let found = store.find_stotra(Language::Telugu, "s2").await.unwrap().unwrap();
        assert_eq!(found.title, "చాలీసా");
        assert!(store.find_stotra(Language::Telugu, "missing").await.unwrap().is_none());

        let counts = store.counts(Language::Telugu).await.unwrap();
        assert_eq!(counts, ContentCounts { deities: 2, stotras: 3 });
    }

    #[tokio::test]
    async fn test_languages_are_partitioned() {
        let store = seeded().await;

        assert!(store.deities(Language::Kannada).await.unwrap().is_empty());
        assert_eq!(store.counts(Language::Kannada).await.unwrap(), ContentCounts::default());
    }

    #[tokio::test]
    async fn test_favorites() {
        let store = seeded().await;

        assert!(store.set_favorite(Language::Telugu, "s2", true).await.unwrap());
        assert!(!store.set_favorite(Language::Telugu, "nope", true).await.unwrap());

        let favorites = store.favorites(Language::Telugu).await.unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(favorites[0].stotra_id, "s2");
        assert!(favorites[0].is_favorite);
    }

    #[tokio::test]
    async fn test_update_preserves_favorite() {
        let store = seeded().await;
        store.set_favorite(Language::Telugu, "s1", true).await.unwrap();

        let mut updated = stotra("s1", "ganesha", "కొత్త శీర్షిక");
        updated.version_timestamp = 1_700_000_005_000;

        let mut tx = store.begin_write().await.unwrap();
        assert!(tx.update_stotra_content(Language::Telugu, &updated).await.unwrap());
        tx.commit().await.unwrap();

        let row = store.find_stotra(Language::Telugu, "s1").await.unwrap().unwrap();
        assert_eq!(row.title, "కొత్త శీర్షిక");
        assert_eq!(row.version_timestamp, 1_700_000_005_000);
        assert!(row.is_favorite);
    }

    #[tokio::test]
    async fn test_delete_all_is_transactional() {
        let store = seeded().await;

        let mut tx = store.begin_write().await.unwrap();
        let removed = tx.delete_all(Language::Telugu).await.unwrap();
        assert_eq!(removed, ContentCounts { deities: 2, stotras: 3 });
        tx.rollback().await.unwrap();

        assert_eq!(store.counts(Language::Telugu).await.unwrap().stotras, 3);

        let mut tx = store.begin_write().await.unwrap();
        tx.delete_all(Language::Telugu).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.counts(Language::Telugu).await.unwrap(), ContentCounts::default());
    }

    #[tokio::test]
    async fn test_transaction_reads_and_favorite_ids() {
        let store = seeded().await;
        store.set_favorite(Language::Telugu, "s3", true).await.unwrap();

        let mut tx = store.begin_write().await.unwrap();
        let deity = tx.find_deity(Language::Telugu, "hanuman").await.unwrap().unwrap();
        assert_eq!(deity.name, "హనుమాన్");
        assert!(tx.find_stotra(Language::Telugu, "s1").await.unwrap().is_some());

        let ids = tx.favorite_ids(Language::Telugu).await.unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("s3"));
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_records_without_identifiers() {
        let store = ContentStore::in_memory().await.unwrap();
        let mut tx = store.begin_write().await.unwrap();

        let result = tx.insert_deity(Language::Kannada, &deity("", "x")).await;
        assert!(matches!(result, Err(ContentError::InvalidRecord(_))));

        let result = tx.insert_stotra(Language::Kannada, &stotra("s1", " ", "x")).await;
        assert!(matches!(result, Err(ContentError::InvalidRecord(_))));
    }

    #[test]
    fn test_record_from_row_drops_internal_id() {
        let row = Stotra {
            id: 42,
            stotra_id: "s1".to_string(),
            deity_id: "ganesha".to_string(),
            title: "t".to_string(),
            title_english: "T".to_string(),
            content: "c".to_string(),
            is_favorite: true,
            version_timestamp: 7,
        };
        let record = StotraRecord::from(&row);
        assert_eq!(record.stotra_id, "s1");
        assert!(record.is_favorite);
        assert_eq!(record.version_timestamp, 7);
    }
}
