//! Skill Repository
//!
//! Persistence contract for skill records plus the SQLite implementation.
//! The core depends only on the [`SkillRepository`] trait; everything else
//! (schema, ordering, actor columns) is an implementation detail.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::path::Path;
use tracing::info;

use crate::error::{Result, SkillError};

/// Persisted skill record
#[derive(Debug, Clone, Serialize)]
pub struct SkillRecord {
    pub slug: String,
    pub name: String,
    pub description: String,
    /// Storage directory, relative to the data dir (e.g. `skills/demo`)
    pub dir_path: String,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// CRUD contract the content store depends on
#[async_trait]
pub trait SkillRepository: Send + Sync {
    /// All skills, most-recently-updated first
    async fn list_all(&self) -> Result<Vec<SkillRecord>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<SkillRecord>>;

    async fn exists_slug(&self, slug: &str) -> Result<bool>;

    async fn create(
        &self,
        slug: &str,
        name: &str,
        description: &str,
        dir_path: &str,
        created_by: Option<&str>,
    ) -> Result<SkillRecord>;

    async fn update_metadata(
        &self,
        slug: &str,
        name: &str,
        description: &str,
        updated_by: Option<&str>,
    ) -> Result<SkillRecord>;

    async fn delete(&self, slug: &str) -> Result<()>;
}

/// SQLite-backed repository
pub struct SqliteSkillRepository {
    conn: Mutex<Connection>,
}

impl SqliteSkillRepository {
    /// Open or create the database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.init_schema()?;

        info!("Skill repository opened: {}", path.display());
        Ok(repo)
    }

    /// In-memory database, for tests
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS skills (
                slug TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                dir_path TEXT NOT NULL,
                created_by TEXT,
                updated_by TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_skills_updated ON skills(updated_at DESC);
            "#,
        )?;
        Ok(())
    }

    fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<SkillRecord> {
        Ok(SkillRecord {
            slug: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            dir_path: row.get(3)?,
            created_by: row.get(4)?,
            updated_by: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}

const SELECT_COLUMNS: &str =
    "slug, name, description, dir_path, created_by, updated_by, created_at, updated_at";

#[async_trait]
impl SkillRepository for SqliteSkillRepository {
    async fn list_all(&self) -> Result<Vec<SkillRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM skills ORDER BY updated_at DESC, rowid DESC",
            SELECT_COLUMNS
        ))?;
        let rows = stmt.query_map([], Self::row_to_record)?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<SkillRecord>> {
        let conn = self.conn.lock();
        let item = conn
            .query_row(
                &format!("SELECT {} FROM skills WHERE slug = ?1", SELECT_COLUMNS),
                params![slug],
                Self::row_to_record,
            )
            .optional()?;
        Ok(item)
    }

    async fn exists_slug(&self, slug: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM skills WHERE slug = ?1",
            params![slug],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    async fn create(
        &self,
        slug: &str,
        name: &str,
        description: &str,
        dir_path: &str,
        created_by: Option<&str>,
    ) -> Result<SkillRecord> {
        let now = Utc::now().timestamp_millis();
        {
            let conn = self.conn.lock();
            conn.execute(
                r#"
                INSERT INTO skills (slug, name, description, dir_path, created_by, updated_by, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, ?6)
                "#,
                params![slug, name, description, dir_path, created_by, now],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    SkillError::Conflict(format!("skill slug '{}' already exists", slug))
                }
                other => other.into(),
            })?;
        }

        self.get_by_slug(slug)
            .await?
            .ok_or_else(|| SkillError::Persistence("created skill vanished".to_string()))
    }

    async fn update_metadata(
        &self,
        slug: &str,
        name: &str,
        description: &str,
        updated_by: Option<&str>,
    ) -> Result<SkillRecord> {
        let now = Utc::now().timestamp_millis();
        let changed = {
            let conn = self.conn.lock();
            conn.execute(
                "UPDATE skills SET name = ?2, description = ?3, updated_by = ?4, updated_at = ?5 WHERE slug = ?1",
                params![slug, name, description, updated_by, now],
            )?
        };
        if changed == 0 {
            return Err(SkillError::not_found(format!("skill '{}'", slug)));
        }

        self.get_by_slug(slug)
            .await?
            .ok_or_else(|| SkillError::Persistence("updated skill vanished".to_string()))
    }

    async fn delete(&self, slug: &str) -> Result<()> {
        let changed = {
            let conn = self.conn.lock();
            conn.execute("DELETE FROM skills WHERE slug = ?1", params![slug])?
        };
        if changed == 0 {
            return Err(SkillError::not_found(format!("skill '{}'", slug)));
        }
        Ok(())
    }
}
