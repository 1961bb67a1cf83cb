//! Local content schema
//!
//! Versioned, additive-only migrations for the language-partitioned content
//! tables. New versions append a [`MigrationDefinition`]; existing entries are
//! never edited.

use crate::database::{ColumnDef, MigrationDefinition, SchemaStep};
use crate::language::Language;

/// Schema version produced by [`content_migrations`]
pub const CONTENT_SCHEMA_VERSION: i64 = 3;

/// Migrations for the content tables, in version order
pub fn content_migrations() -> Vec<MigrationDefinition> {
    let mut create_tables = Vec::new();
    let mut add_deity_english = Vec::new();
    let mut add_stotra_english = Vec::new();
    let mut backfill = Vec::new();

    for language in Language::all() {
        create_tables.push(SchemaStep::CreateTable {
            name: language.deities_table().to_string(),
            columns: vec![
                ColumnDef::text("deity_id").indexed(),
                ColumnDef::text("name"),
                ColumnDef::text("image"),
            ],
        });
        create_tables.push(SchemaStep::CreateTable {
            name: language.stotras_table().to_string(),
            columns: vec![
                ColumnDef::text("stotra_id").indexed(),
                ColumnDef::text("deity_id").indexed(),
                ColumnDef::text("title"),
                ColumnDef::text("content"),
                ColumnDef::boolean("is_favorite"),
                ColumnDef::integer("version_timestamp"),
            ],
        });

        add_deity_english.push(SchemaStep::AddColumns {
            table: language.deities_table().to_string(),
            columns: vec![ColumnDef::text("name_english")],
        });

        add_stotra_english.push(SchemaStep::AddColumns {
            table: language.stotras_table().to_string(),
            columns: vec![ColumnDef::text("title_english")],
        });
        backfill.push(SchemaStep::Sql(format!(
            "UPDATE {} SET name_english = '' WHERE name_english IS NULL",
            language.deities_table()
        )));
        backfill.push(SchemaStep::Sql(format!(
            "UPDATE {} SET title_english = '' WHERE title_english IS NULL",
            language.stotras_table()
        )));
    }

    add_stotra_english.extend(backfill);

    vec![
        MigrationDefinition::new(1, "Language-partitioned content tables", create_tables),
        MigrationDefinition::new(2, "English deity names", add_deity_english),
        MigrationDefinition::new(3, "English stotra titles", add_stotra_english),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SqliteDatabase;
    use sqlx::Row;

    #[test]
    fn test_versions_are_strictly_increasing() {
        let migrations = content_migrations();
        let versions: Vec<i64> = migrations.iter().map(|m| m.version).collect();
        assert_eq!(versions, vec![1, 2, 3]);
        assert_eq!(*versions.last().unwrap(), CONTENT_SCHEMA_VERSION);
    }

    #[tokio::test]
    async fn test_terminal_shape() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let version = db.migrate(&content_migrations()).await.unwrap();
        assert_eq!(version, CONTENT_SCHEMA_VERSION);

        for language in Language::all() {
            assert_eq!(
                db.columns(language.deities_table()).await.unwrap(),
                vec!["id", "deity_id", "name", "image", "name_english"]
            );
            assert_eq!(
                db.columns(language.stotras_table()).await.unwrap(),
                vec![
                    "id",
                    "stotra_id",
                    "deity_id",
                    "title",
                    "content",
                    "is_favorite",
                    "version_timestamp",
                    "title_english"
                ]
            );
        }

        let indexes = sqlx::query("SELECT name FROM sqlite_master WHERE type = 'index' AND name LIKE 'idx_%'")
            .fetch_all(db.pool())
            .await
            .unwrap();
        let names: Vec<String> = indexes.iter().map(|r| r.get("name")).collect();
        assert!(names.contains(&"idx_stotras_telugu_stotra_id".to_string()));
        assert!(names.contains(&"idx_stotras_kannada_deity_id".to_string()));
        assert!(names.contains(&"idx_deities_telugu_deity_id".to_string()));
    }

    #[tokio::test]
    async fn test_upgrade_from_version_one() {
        let db = SqliteDatabase::in_memory().await.unwrap();
        let migrations = content_migrations();

        db.migrate(&migrations[..1]).await.unwrap();
        db.execute(
            "INSERT INTO deities_telugu (deity_id, name, image) VALUES ('ganesha', 'గణేశుడు', 'ganesha')",
        )
        .await
        .unwrap();

        db.migrate(&migrations).await.unwrap();

        let row = sqlx::query(
            "SELECT name, name_english FROM deities_telugu WHERE deity_id = 'ganesha'",
        )
        .fetch_one(db.pool())
        .await
        .unwrap();
        let english: String = row.get("name_english");
        assert_eq!(english, "");
        let name: String = row.get("name");
        assert_eq!(name, "గణేశుడు");
    }
}
