use crate::error::{PipelineError, Result};
use crate::model::{GitWebhook, Ontology};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OwnedMutexGuard;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// SQLite-backed pipeline metadata: watched ontologies, webhook deliveries,
/// the per-stage version guard and durable bus consumer offsets.
pub struct PipelineMeta {
    conn: Mutex<Connection>,
    stage_locks: Mutex<HashMap<(i64, String), Arc<tokio::sync::Mutex<()>>>>,
}

/// Result of trying to take the version guard for one stage run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionClaim {
    Claimed,
    Superseded { committed: i64 },
}

impl PipelineMeta {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA busy_timeout=5000;
            CREATE TABLE IF NOT EXISTS ontologies (
                id                  INTEGER PRIMARY KEY,
                name                TEXT NOT NULL,
                repo_resource_path  TEXT,
                date_created        TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS git_webhooks (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                ontology_id   INTEGER NOT NULL,
                date_created  TEXT NOT NULL,
                commit_id     TEXT
            );
            CREATE INDEX IF NOT EXISTS git_webhooks_by_ontology ON git_webhooks (ontology_id, id);
            CREATE TABLE IF NOT EXISTS committed_versions (
                ontology_id       INTEGER NOT NULL,
                stage             TEXT NOT NULL,
                webhook_event_id  INTEGER NOT NULL,
                committed_at      TEXT NOT NULL,
                PRIMARY KEY (ontology_id, stage)
            );
            CREATE TABLE IF NOT EXISTS consumer_offsets (
                consumer     TEXT PRIMARY KEY,
                byte_offset  INTEGER NOT NULL,
                delivery_id  TEXT
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
            stage_locks: Mutex::new(HashMap::new()),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| PipelineError::lock_poisoned("metadata connection"))
    }

    // Ontologies
    pub fn register_ontology(&self, id: i64, name: &str, repo_resource_path: Option<&str>) -> Result<Ontology> {
        {
            let conn = self.conn()?;
            conn.execute(
                "INSERT OR IGNORE INTO ontologies (id, name, repo_resource_path, date_created)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, name, repo_resource_path, now_text()],
            )?;
        }
        self.get_ontology(id)?.ok_or(PipelineError::OntologyNotFound(id))
    }

    pub fn get_ontology(&self, id: i64) -> Result<Option<Ontology>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, name, repo_resource_path, date_created FROM ontologies WHERE id = ?1",
                params![id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        match row {
            Some((id, name, repo_resource_path, created)) => Ok(Some(Ontology {
                id,
                name,
                repo_resource_path,
                date_created: parse_timestamp(&created)?,
            })),
            None => Ok(None),
        }
    }

    // Git webhooks
    pub fn record_webhook(
        &self,
        ontology_id: i64,
        date_created: NaiveDateTime,
        commit_id: Option<&str>,
    ) -> Result<GitWebhook> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO git_webhooks (ontology_id, date_created, commit_id) VALUES (?1, ?2, ?3)",
            params![ontology_id, date_created.format(TIMESTAMP_FORMAT).to_string(), commit_id],
        )?;
        Ok(GitWebhook {
            id: conn.last_insert_rowid(),
            ontology_id,
            date_created,
            commit_id: commit_id.map(str::to_string),
        })
    }

    /// Webhooks of one ontology ordered by id.
    pub fn webhooks_for(&self, ontology_id: i64) -> Result<Vec<GitWebhook>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, ontology_id, date_created, commit_id FROM git_webhooks
             WHERE ontology_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![ontology_id], webhook_columns)?;
        let mut webhooks = Vec::new();
        for row in rows {
            let (id, ontology_id, created, commit_id) = row?;
            webhooks.push(GitWebhook {
                id,
                ontology_id,
                date_created: parse_timestamp(&created)?,
                commit_id,
            });
        }
        Ok(webhooks)
    }

    pub fn get_webhook(&self, id: i64) -> Result<Option<GitWebhook>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT id, ontology_id, date_created, commit_id FROM git_webhooks WHERE id = ?1",
                params![id],
                webhook_columns,
            )
            .optional()?;
        match row {
            Some((id, ontology_id, created, commit_id)) => Ok(Some(GitWebhook {
                id,
                ontology_id,
                date_created: parse_timestamp(&created)?,
                commit_id,
            })),
            None => Ok(None),
        }
    }

    // Version guard
    pub fn committed_version(&self, ontology_id: i64, stage: &str) -> Result<Option<i64>> {
        let conn = self.conn()?;
        Ok(conn
            .query_row(
                "SELECT webhook_event_id FROM committed_versions WHERE ontology_id = ?1 AND stage = ?2",
                params![ontology_id, stage],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Atomically record `webhook_event_id` as the stage's version unless a
    /// strictly newer id already holds it. Equal ids are claimed again.
    pub fn claim_version(&self, ontology_id: i64, stage: &str, webhook_event_id: i64) -> Result<VersionClaim> {
        let conn = self.conn()?;
        let changed = conn.execute(
            "INSERT INTO committed_versions (ontology_id, stage, webhook_event_id, committed_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(ontology_id, stage) DO UPDATE SET
                webhook_event_id = excluded.webhook_event_id,
                committed_at = excluded.committed_at
             WHERE excluded.webhook_event_id >= committed_versions.webhook_event_id",
            params![ontology_id, stage, webhook_event_id, now_text()],
        )?;
        if changed > 0 {
            return Ok(VersionClaim::Claimed);
        }
        let committed: i64 = conn.query_row(
            "SELECT webhook_event_id FROM committed_versions WHERE ontology_id = ?1 AND stage = ?2",
            params![ontology_id, stage],
            |row| row.get(0),
        )?;
        Ok(VersionClaim::Superseded { committed })
    }

    /// Serialises runs of one stage for one ontology within this process, so
    /// a claim and the backend writes that follow it are not interleaved
    /// with another run's.
    pub async fn lock_stage(&self, ontology_id: i64, stage: &str) -> Result<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self
                .stage_locks
                .lock()
                .map_err(|_| PipelineError::lock_poisoned("stage locks"))?;
            locks
                .entry((ontology_id, stage.to_string()))
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        Ok(lock.lock_owned().await)
    }

    // Consumer offsets
    pub fn get_offset(&self, consumer: &str) -> Result<u64> {
        let conn = self.conn()?;
        let offset: Option<i64> = conn
            .query_row(
                "SELECT byte_offset FROM consumer_offsets WHERE consumer = ?1",
                params![consumer],
                |row| row.get(0),
            )
            .optional()?;
        Ok(offset.unwrap_or(0).max(0) as u64)
    }

    pub fn set_offset(&self, consumer: &str, byte_offset: u64, delivery_id: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO consumer_offsets (consumer, byte_offset, delivery_id) VALUES (?1, ?2, ?3)
             ON CONFLICT(consumer) DO UPDATE SET byte_offset=excluded.byte_offset, delivery_id=excluded.delivery_id",
            params![consumer, byte_offset as i64, delivery_id],
        )?;
        Ok(())
    }
}

type WebhookColumns = (i64, i64, String, Option<String>);

fn webhook_columns(row: &Row<'_>) -> rusqlite::Result<WebhookColumns> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn now_text() -> String {
    chrono::Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(text: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map_err(|e| PipelineError::Backend(format!("bad stored timestamp '{}': {}", text, e)))
}
