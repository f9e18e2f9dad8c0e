use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags, OptionalExtension, Row, params};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::catalog::Mode;
use crate::error::SkillError;

const SKILLS_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS skills (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    mode TEXT NOT NULL,
    content TEXT NOT NULL,
    hash TEXT NOT NULL,
    summary TEXT,
    updated_at_unix INTEGER NOT NULL,
    UNIQUE(name, mode)
);
CREATE INDEX IF NOT EXISTS idx_skills_name ON skills(name);
"#;

const SKILL_COLUMNS: &str = "id, name, mode, content, hash, summary, updated_at_unix";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillPage {
    pub id: i64,
    pub name: String,
    pub mode: Mode,
    pub content: String,
    pub hash: String,
    pub summary: Option<String>,
    pub updated_at_unix: i64,
}

impl SkillPage {
    pub fn has_summary(&self) -> bool {
        self.summary
            .as_deref()
            .is_some_and(|summary| !summary.trim().is_empty())
    }
}

/// Handle to the SQLite database holding SkillPage records. Each call opens
/// its own connection, so the handle is cheap to clone and share.
#[derive(Debug, Clone)]
pub struct SkillStore {
    db_path: PathBuf,
}

impl SkillStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Opens a connection with the schema in place.
    pub fn connect(&self) -> Result<Connection> {
        ensure_db_parent(&self.db_path)?;
        let connection = Connection::open(&self.db_path)
            .with_context(|| format!("failed to open {}", self.db_path.display()))?;
        connection
            .busy_timeout(Duration::from_secs(5))
            .context("failed to set sqlite busy timeout")?;
        initialize_schema(&connection)?;
        Ok(connection)
    }

    /// Creates the database file and schema if they are missing.
    pub fn initialize(&self) -> Result<()> {
        self.connect().map(drop)
    }

    /// Round-trips `SELECT 1` against an existing database. Never creates
    /// directories, the file, or the schema.
    pub fn ping(&self) -> Result<()> {
        let connection = Connection::open_with_flags(
            &self.db_path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open {}", self.db_path.display()))?;
        connection
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .context("failed to run SELECT 1")?;
        Ok(())
    }

    pub fn find(&self, name: &str, mode: Mode) -> Result<Option<SkillPage>> {
        let connection = self.connect()?;
        find_skill(&connection, name, mode)
    }

    pub fn insert(&self, name: &str, mode: Mode, content: &str, hash: &str) -> Result<SkillPage> {
        let connection = self.connect()?;
        let now = unix_timestamp()?;
        connection
            .execute(
                "INSERT INTO skills (name, mode, content, hash, summary, updated_at_unix)
                 VALUES (?1, ?2, ?3, ?4, NULL, ?5)",
                params![name, mode.as_str(), content, hash, now],
            )
            .with_context(|| format!("failed to insert skill row for {name} ({mode})"))?;
        let id = connection.last_insert_rowid();
        Ok(SkillPage {
            id,
            name: name.to_string(),
            mode,
            content: content.to_string(),
            hash: hash.to_string(),
            summary: None,
            updated_at_unix: now,
        })
    }

    /// Replaces content and hash in place and clears the summary.
    pub fn update_content(&self, id: i64, content: &str, hash: &str) -> Result<()> {
        let connection = self.connect()?;
        let now = unix_timestamp()?;
        let changed = connection
            .execute(
                "UPDATE skills SET content = ?1, hash = ?2, summary = NULL, updated_at_unix = ?3
                 WHERE id = ?4",
                params![content, hash, now, id],
            )
            .with_context(|| format!("failed to update skill row {id}"))?;
        if changed == 0 {
            return Err(SkillError::Storage(format!("skill row {id} no longer exists")).into());
        }
        Ok(())
    }

    pub fn set_summary(&self, id: i64, summary: &str) -> Result<()> {
        let connection = self.connect()?;
        let changed = connection
            .execute(
                "UPDATE skills SET summary = ?1 WHERE id = ?2",
                params![summary, id],
            )
            .with_context(|| format!("failed to store summary for skill row {id}"))?;
        if changed == 0 {
            return Err(SkillError::Storage(format!("skill row {id} no longer exists")).into());
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<SkillPage>> {
        let connection = self.connect()?;
        let mut statement = connection
            .prepare(&format!("SELECT {SKILL_COLUMNS} FROM skills ORDER BY id"))
            .context("failed to prepare skill listing query")?;
        let rows = statement
            .query_map([], decode_skill_row)
            .context("failed to run skill listing query")?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.context("failed to decode skill row")?);
        }
        Ok(out)
    }

    pub fn count(&self) -> Result<usize> {
        let connection = self.connect()?;
        let count: i64 = connection
            .query_row("SELECT COUNT(*) FROM skills", [], |row| row.get(0))
            .context("failed to count skill rows")?;
        usize::try_from(count).context("skill row count does not fit into usize")
    }
}

pub fn compute_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let mut output = String::with_capacity(digest.len() * 2);
    for byte in digest.iter() {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

fn find_skill(connection: &Connection, name: &str, mode: Mode) -> Result<Option<SkillPage>> {
    connection
        .query_row(
            &format!("SELECT {SKILL_COLUMNS} FROM skills WHERE name = ?1 AND mode = ?2 LIMIT 1"),
            params![name, mode.as_str()],
            decode_skill_row,
        )
        .optional()
        .with_context(|| format!("failed to look up skill {name} ({mode})"))
}

fn decode_skill_row(row: &Row<'_>) -> rusqlite::Result<SkillPage> {
    let mode_text: String = row.get(2)?;
    let mode = Mode::parse(&mode_text).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            error.into(),
        )
    })?;
    Ok(SkillPage {
        id: row.get(0)?,
        name: row.get(1)?,
        mode,
        content: row.get(3)?,
        hash: row.get(4)?,
        summary: row.get(5)?,
        updated_at_unix: row.get(6)?,
    })
}

fn initialize_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(SKILLS_SCHEMA_SQL)
        .context("failed to initialize skills schema")
}

fn ensure_db_parent(db_path: &Path) -> Result<()> {
    let Some(parent) = db_path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    fs::create_dir_all(parent).map_err(|error| {
        SkillError::Storage(format!(
            "failed to create database parent directory {}: {error}",
            parent.display()
        ))
        .into()
    })
}

fn unix_timestamp() -> Result<i64> {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before UNIX_EPOCH")?
        .as_secs();
    i64::try_from(seconds).context("timestamp does not fit into i64")
}
