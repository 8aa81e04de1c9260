//! SQLite-backed job store.
//!
//! Two tables back the two collections: `pending_generations` and
//! `generation_history`, indexed by owner and (for history) completion
//! timestamp. The schema is created on open.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};

use courseforge_core::{CourseArtifact, CourseSpec, GenerationId, UserId};

use crate::store::{JobStore, StoreError};
use crate::types::{GenerationJob, HistoryRecord, JobStatus};

/// Durable job store on an embedded SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
}

impl SqliteJobStore {
    /// Open (or create) the store at `path` and ensure the schema exists.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| StoreError::Unavailable(format!("create {parent:?}: {e}")))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(format!("open {path:?}: {e}")))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open a private in-memory database (single connection, since each
    /// SQLite `:memory:` connection is its own database).
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::Unavailable(format!("open in-memory store: {e}")))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_generations (
                id           TEXT PRIMARY KEY,
                owner_id     TEXT NOT NULL,
                title        TEXT NOT NULL,
                spec         TEXT NOT NULL,
                status       TEXT NOT NULL,
                attempt      INTEGER NOT NULL,
                last_error   TEXT NULL,
                created_at   TEXT NOT NULL,
                updated_at   TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS generation_history (
                id           TEXT PRIMARY KEY,
                owner_id     TEXT NOT NULL,
                title        TEXT NOT NULL,
                spec         TEXT NOT NULL,
                result       TEXT NOT NULL,
                created_at   TEXT NOT NULL,
                completed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        for ddl in [
            "CREATE INDEX IF NOT EXISTS idx_pending_owner ON pending_generations(owner_id)",
            "CREATE INDEX IF NOT EXISTS idx_history_owner ON generation_history(owner_id)",
            "CREATE INDEX IF NOT EXISTS idx_history_completed ON generation_history(completed_at)",
        ] {
            sqlx::query(ddl).execute(&self.pool).await.map_err(storage)?;
        }

        Ok(())
    }
}

/// Resolve the default database path: `{os data dir}/courseforge/queue.db`.
pub fn default_db_path() -> Result<PathBuf, StoreError> {
    let base = dirs::data_dir()
        .or_else(|| {
            dirs::home_dir().map(|mut h| {
                h.push(".local");
                h.push("share");
                h
            })
        })
        .ok_or_else(|| StoreError::Unavailable("no OS data directory".to_string()))?;

    let mut path = base;
    path.push("courseforge");
    path.push("queue.db");
    Ok(path)
}

fn storage(err: sqlx::Error) -> StoreError {
    StoreError::Storage(err.to_string())
}

// Fixed-width UTC timestamps so string comparison in SQL matches
// chronological order.
fn encode_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_ts(raw: &str, column: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Storage(format!("invalid {column}: {e}")))
}

fn row_to_job(row: &SqliteRow) -> Result<GenerationJob, StoreError> {
    let id: String = row.try_get("id").map_err(storage)?;
    let owner: String = row.try_get("owner_id").map_err(storage)?;
    let spec: String = row.try_get("spec").map_err(storage)?;
    let status: String = row.try_get("status").map_err(storage)?;
    let attempt: i64 = row.try_get("attempt").map_err(storage)?;
    let created_at: String = row.try_get("created_at").map_err(storage)?;
    let updated_at: String = row.try_get("updated_at").map_err(storage)?;

    Ok(GenerationJob {
        id: GenerationId::from_str(&id).map_err(|e| StoreError::Storage(e.to_string()))?,
        title: row.try_get("title").map_err(storage)?,
        spec: serde_json::from_str::<CourseSpec>(&spec)
            .map_err(|e| StoreError::Storage(format!("invalid spec column: {e}")))?,
        owner: UserId::from_str(&owner).map_err(|e| StoreError::Storage(e.to_string()))?,
        status: JobStatus::from_str(&status).map_err(StoreError::Storage)?,
        attempt: attempt.max(0) as u32,
        last_error: row.try_get("last_error").map_err(storage)?,
        created_at: decode_ts(&created_at, "created_at")?,
        updated_at: decode_ts(&updated_at, "updated_at")?,
    })
}

fn row_to_record(row: &SqliteRow) -> Result<HistoryRecord, StoreError> {
    let id: String = row.try_get("id").map_err(storage)?;
    let owner: String = row.try_get("owner_id").map_err(storage)?;
    let spec: String = row.try_get("spec").map_err(storage)?;
    let result: String = row.try_get("result").map_err(storage)?;
    let created_at: String = row.try_get("created_at").map_err(storage)?;
    let completed_at: String = row.try_get("completed_at").map_err(storage)?;

    Ok(HistoryRecord {
        id: GenerationId::from_str(&id).map_err(|e| StoreError::Storage(e.to_string()))?,
        title: row.try_get("title").map_err(storage)?,
        spec: serde_json::from_str::<CourseSpec>(&spec)
            .map_err(|e| StoreError::Storage(format!("invalid spec column: {e}")))?,
        owner: UserId::from_str(&owner).map_err(|e| StoreError::Storage(e.to_string()))?,
        result: serde_json::from_str::<CourseArtifact>(&result)
            .map_err(|e| StoreError::Storage(format!("invalid result column: {e}")))?,
        created_at: decode_ts(&created_at, "created_at")?,
        completed_at: decode_ts(&completed_at, "completed_at")?,
    })
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn insert_pending(&self, job: GenerationJob) -> Result<(), StoreError> {
        let spec = serde_json::to_string(&job.spec)
            .map_err(|e| StoreError::Storage(format!("encode spec: {e}")))?;

        let result = sqlx::query(
            r#"
            INSERT INTO pending_generations
                (id, owner_id, title, spec, status, attempt, last_error, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(job.id.as_str())
        .bind(job.owner.to_string())
        .bind(&job.title)
        .bind(spec)
        .bind(job.status.as_str())
        .bind(job.attempt as i64)
        .bind(&job.last_error)
        .bind(encode_ts(job.created_at))
        .bind(encode_ts(job.updated_at))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::DuplicateId(job.id))
            }
            Err(e) => Err(storage(e)),
        }
    }

    async fn get_pending(&self, id: &GenerationId) -> Result<Option<GenerationJob>, StoreError> {
        let row = sqlx::query("SELECT * FROM pending_generations WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        row.as_ref().map(row_to_job).transpose()
    }

    async fn update(&self, job: &GenerationJob) -> Result<(), StoreError> {
        let spec = serde_json::to_string(&job.spec)
            .map_err(|e| StoreError::Storage(format!("encode spec: {e}")))?;

        let result = sqlx::query(
            r#"
            UPDATE pending_generations
            SET title = ?2,
                spec = ?3,
                status = ?4,
                attempt = ?5,
                last_error = ?6,
                updated_at = ?7
            WHERE id = ?1
            "#,
        )
        .bind(job.id.as_str())
        .bind(&job.title)
        .bind(spec)
        .bind(job.status.as_str())
        .bind(job.attempt as i64)
        .bind(&job.last_error)
        .bind(encode_ts(job.updated_at))
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(job.id.clone()));
        }
        Ok(())
    }

    async fn update_status(
        &self,
        id: &GenerationId,
        status: JobStatus,
        last_error: Option<String>,
    ) -> Result<JobStatus, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE pending_generations
            SET status = ?2,
                last_error = COALESCE(?3, last_error),
                updated_at = ?4
            WHERE id = ?1
              AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(id.as_str())
        .bind(status.as_str())
        .bind(&last_error)
        .bind(encode_ts(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(storage)?;

        if result.rows_affected() > 0 {
            return Ok(status);
        }

        // Either the job is gone, or its status is terminal and absorbing.
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM pending_generations WHERE id = ?1")
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;

        match current {
            Some(raw) => JobStatus::from_str(&raw).map_err(StoreError::Storage),
            None => Err(StoreError::NotFound(id.clone())),
        }
    }

    async fn list_pending(&self, owner: &UserId) -> Result<Vec<GenerationJob>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM pending_generations WHERE owner_id = ?1 ORDER BY created_at ASC",
        )
        .bind(owner.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter().map(row_to_job).collect()
    }

    async fn move_to_history(
        &self,
        id: &GenerationId,
        result: CourseArtifact,
    ) -> Result<HistoryRecord, StoreError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let row = sqlx::query("SELECT * FROM pending_generations WHERE id = ?1")
            .bind(id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage)?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let job = row_to_job(&row)?;

        let record = HistoryRecord::from_job(job, result, Utc::now());
        let spec = serde_json::to_string(&record.spec)
            .map_err(|e| StoreError::Storage(format!("encode spec: {e}")))?;
        let artifact = serde_json::to_string(&record.result)
            .map_err(|e| StoreError::Storage(format!("encode result: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO generation_history
                (id, owner_id, title, spec, result, created_at, completed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(record.id.as_str())
        .bind(record.owner.to_string())
        .bind(&record.title)
        .bind(spec)
        .bind(artifact)
        .bind(encode_ts(record.created_at))
        .bind(encode_ts(record.completed_at))
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        sqlx::query("DELETE FROM pending_generations WHERE id = ?1")
            .bind(record.id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(record)
    }

    async fn list_history(&self, owner: &UserId) -> Result<Vec<HistoryRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM generation_history WHERE owner_id = ?1 ORDER BY completed_at DESC",
        )
        .bind(owner.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter().map(row_to_record).collect()
    }

    async fn purge_history_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM generation_history WHERE completed_at < ?1")
            .bind(encode_ts(cutoff))
            .execute(&self.pool)
            .await
            .map_err(storage)?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn job_for(owner: UserId, title: &str) -> GenerationJob {
        GenerationJob::new(CourseSpec::new(title), owner)
    }

    #[tokio::test]
    async fn round_trips_a_pending_job() {
        let store = SqliteJobStore::open_in_memory().await.unwrap();
        let owner = UserId::new();
        let job = job_for(owner, "Algebra Basics");
        let id = job.id.clone();

        store.insert_pending(job.clone()).await.unwrap();

        let loaded = store.get_pending(&id).await.unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.owner, owner);
        assert_eq!(loaded.title, "Algebra Basics");
        assert_eq!(loaded.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected() {
        let store = SqliteJobStore::open_in_memory().await.unwrap();
        let job = job_for(UserId::new(), "Algebra Basics");

        store.insert_pending(job.clone()).await.unwrap();
        let err = store.insert_pending(job).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateId(_)));
    }

    #[tokio::test]
    async fn terminal_status_is_absorbing() {
        let store = SqliteJobStore::open_in_memory().await.unwrap();
        let job = job_for(UserId::new(), "Algebra Basics");
        let id = job.id.clone();
        store.insert_pending(job).await.unwrap();

        store
            .update_status(&id, JobStatus::Failed, Some("gave up".into()))
            .await
            .unwrap();
        let status = store
            .update_status(&id, JobStatus::Processing, None)
            .await
            .unwrap();
        assert_eq!(status, JobStatus::Failed);
    }

    #[tokio::test]
    async fn move_is_atomic_within_one_database() {
        let store = SqliteJobStore::open_in_memory().await.unwrap();
        let owner = UserId::new();
        let job = job_for(owner, "Algebra Basics");
        let id = job.id.clone();
        store.insert_pending(job).await.unwrap();

        let artifact = CourseArtifact::new(serde_json::json!({"id": "course42"}));
        store.move_to_history(&id, artifact).await.unwrap();

        assert!(store.get_pending(&id).await.unwrap().is_none());
        let history = store.list_history(&owner).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].result.course["id"], "course42");

        // Moving again reports NotFound (already in history).
        let err = store
            .move_to_history(&id, CourseArtifact::new(serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn purge_uses_completion_cutoff() {
        let store = SqliteJobStore::open_in_memory().await.unwrap();
        let owner = UserId::new();
        let now = Utc::now();

        for (title, age_days) in [("Old", 10), ("Fresh", 1)] {
            let record = HistoryRecord::from_job(
                job_for(owner, title),
                CourseArtifact::new(serde_json::json!({})),
                now - Duration::days(age_days),
            );
            let spec = serde_json::to_string(&record.spec).unwrap();
            let result = serde_json::to_string(&record.result).unwrap();
            sqlx::query(
                r#"
                INSERT INTO generation_history
                    (id, owner_id, title, spec, result, created_at, completed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(record.id.as_str())
            .bind(record.owner.to_string())
            .bind(&record.title)
            .bind(spec)
            .bind(result)
            .bind(encode_ts(record.created_at))
            .bind(encode_ts(record.completed_at))
            .execute(&store.pool)
            .await
            .unwrap();
        }

        let purged = store
            .purge_history_before(now - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(purged, 1);

        let remaining = store.list_history(&owner).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].title, "Fresh");
    }
}
