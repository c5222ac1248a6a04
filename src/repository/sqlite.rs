use std::{fs, num::NonZeroU32, path::Path};

use chrono::{NaiveDateTime, SubsecRound, Utc};
use log::{debug, info};
use sqlx::{
    Row, SqliteConnection, SqlitePool,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow},
};
use tokio::sync::Mutex;

use crate::{
    repository::{
        GenerationRepository,
        errors::{RepositoryError, Result},
        models::{GenerationRecord, NewGenerationRecord},
    },
    utils::get_env,
};

const DATABASE_PATH_VAR: &str = "DATABASE_PATH";
const DEFAULT_DATABASE_PATH: &str = "./data/generation_results.db";

// Fixed width so stored timestamps sort lexically. Rows written by older
// tooling carry CURRENT_TIMESTAMP values without a fraction, which the parse
// format also accepts.
const TIMESTAMP_WRITE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const TIMESTAMP_READ_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub struct SQLiteGenerationRepository {
    pool: SqlitePool,
    initialized: bool,
    // Held for the whole of every write. Also remembers the newest timestamp
    // handed out so timestamps never run backwards against ids.
    last_timestamp: Mutex<Option<NaiveDateTime>>,
}

impl SQLiteGenerationRepository {
    /// Opens the database named by `DATABASE_PATH`.
    pub async fn new() -> Result<Self> {
        let path = get_env(DATABASE_PATH_VAR, DEFAULT_DATABASE_PATH);
        Self::open(path).await
    }

    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        // Ensure the directory for the DB exists
        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir).map_err(|e| {
                RepositoryError::InitializationError(format!(
                    "unable to create directory {}: {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            RepositoryError::InitializationError(format!(
                "unable to open {}: {}",
                path.display(),
                e
            ))
        })?;

        info!("SQLite database {} connection pool created", path.display());

        let mut repo = Self {
            pool,
            initialized: false,
            last_timestamp: Mutex::new(None),
        };
        repo.initialize().await?;
        Ok(repo)
    }

    async fn create_tables_if_not_exists(&self) -> Result<()> {
        let sql = r#"
            CREATE TABLE IF NOT EXISTS generation_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp DATETIME DEFAULT CURRENT_TIMESTAMP,
                model_name TEXT NOT NULL,
                prompt TEXT NOT NULL,
                response TEXT NOT NULL,
                max_tokens INTEGER,
                temperature REAL,
                prompt_index INTEGER,
                batch_id TEXT,
                is_batch BOOLEAN DEFAULT FALSE
            )
        "#;
        sqlx::query(sql).execute(&self.pool).await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_generation_results_batch
             ON generation_results (batch_id, prompt_index)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_generation_results_model
             ON generation_results (model_name, id)",
        )
        .execute(&self.pool)
        .await?;

        info!("Generation results table created (if not exists)");
        Ok(())
    }

    async fn latest_timestamp(&self) -> Result<Option<NaiveDateTime>> {
        let row = sqlx::query("SELECT timestamp FROM generation_results ORDER BY id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let raw: String = row.try_get("timestamp")?;
                Ok(Some(parse_timestamp(&raw)?))
            }
            None => Ok(None),
        }
    }
}

impl GenerationRepository for SQLiteGenerationRepository {
    async fn initialize(&mut self) -> Result<()> {
        if self.initialized {
            return Ok(());
        }
        self.create_tables_if_not_exists().await?;
        let latest = self.latest_timestamp().await?;
        *self.last_timestamp.get_mut() = latest;
        self.initialized = true;
        info!("Database initialization complete");
        Ok(())
    }

    async fn insert(&self, record: NewGenerationRecord) -> Result<GenerationRecord> {
        record.validate()?;

        let mut last = self.last_timestamp.lock().await;
        let timestamp = next_timestamp(*last);
        let mut conn = self.pool.acquire().await?;
        let stored = insert_record(&mut conn, record, timestamp).await?;
        *last = Some(timestamp);

        debug!(
            "Generation result {} saved (batch: {})",
            stored.id, stored.is_batch
        );
        Ok(stored)
    }

    async fn insert_batch(&self, records: Vec<NewGenerationRecord>) -> Result<Vec<GenerationRecord>> {
        for record in &records {
            record.validate()?;
        }

        let mut last = self.last_timestamp.lock().await;
        let mut timestamp = *last;
        let mut tx = self.pool.begin().await?;
        let mut stored = Vec::with_capacity(records.len());
        for record in records {
            let ts = next_timestamp(timestamp);
            stored.push(insert_record(&mut tx, record, ts).await?);
            timestamp = Some(ts);
        }
        tx.commit().await?;
        *last = timestamp;

        info!("{} generation results saved in one transaction", stored.len());
        Ok(stored)
    }

    async fn query_by_batch(&self, batch_id: &str) -> Result<Vec<GenerationRecord>> {
        let rows = sqlx::query(
            "SELECT id, timestamp, model_name, prompt, response, max_tokens, temperature,
                    prompt_index, batch_id, is_batch
             FROM generation_results
             WHERE batch_id = ?
             ORDER BY prompt_index ASC, id ASC",
        )
        .bind(batch_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn query_recent(&self, limit: NonZeroU32) -> Result<Vec<GenerationRecord>> {
        let rows = sqlx::query(
            "SELECT id, timestamp, model_name, prompt, response, max_tokens, temperature,
                    prompt_index, batch_id, is_batch
             FROM generation_results
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(i64::from(limit.get()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn query_by_model(
        &self,
        model_name: &str,
        limit: NonZeroU32,
    ) -> Result<Vec<GenerationRecord>> {
        let rows = sqlx::query(
            "SELECT id, timestamp, model_name, prompt, response, max_tokens, temperature,
                    prompt_index, batch_id, is_batch
             FROM generation_results
             WHERE model_name = ?
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(model_name)
        .bind(i64::from(limit.get()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }
}

async fn insert_record(
    conn: &mut SqliteConnection,
    record: NewGenerationRecord,
    timestamp: NaiveDateTime,
) -> Result<GenerationRecord> {
    let is_batch = record.is_batch();
    let (batch_id, prompt_index) = match record.batch {
        Some(slot) => (Some(slot.batch_id), Some(slot.prompt_index)),
        None => (None, None),
    };

    let result = sqlx::query(
        "INSERT INTO generation_results
         (timestamp, model_name, prompt, response, max_tokens, temperature, prompt_index, batch_id, is_batch)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(timestamp.format(TIMESTAMP_WRITE_FORMAT).to_string())
    .bind(&record.model_name)
    .bind(&record.prompt)
    .bind(&record.response)
    .bind(record.max_tokens)
    .bind(record.temperature)
    .bind(prompt_index)
    .bind(&batch_id)
    .bind(is_batch)
    .execute(&mut *conn)
    .await?;

    Ok(GenerationRecord {
        id: result.last_insert_rowid(),
        timestamp: timestamp.and_utc(),
        model_name: record.model_name,
        prompt: record.prompt,
        response: record.response,
        max_tokens: record.max_tokens,
        temperature: record.temperature,
        prompt_index,
        batch_id,
        is_batch,
    })
}

fn next_timestamp(last: Option<NaiveDateTime>) -> NaiveDateTime {
    let now = Utc::now().naive_utc().trunc_subsecs(6);
    match last {
        Some(last) if last > now => last,
        _ => now,
    }
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, TIMESTAMP_READ_FORMAT).map_err(|e| {
        RepositoryError::DecodingError(format!("invalid timestamp '{}': {}", raw, e))
    })
}

fn record_from_row(row: &SqliteRow) -> Result<GenerationRecord> {
    let raw_timestamp: String = row.try_get("timestamp")?;
    Ok(GenerationRecord {
        id: row.try_get("id")?,
        timestamp: parse_timestamp(&raw_timestamp)?.and_utc(),
        model_name: row.try_get("model_name")?,
        prompt: row.try_get("prompt")?,
        response: row.try_get("response")?,
        max_tokens: row.try_get("max_tokens")?,
        temperature: row.try_get("temperature")?,
        prompt_index: row.try_get("prompt_index")?,
        batch_id: row.try_get("batch_id")?,
        is_batch: row.try_get("is_batch")?,
    })
}
