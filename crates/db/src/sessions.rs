// crates/db/src/sessions.rs
//! Session CRUD and query operations.
//!
//! Writes obey the session lifecycle: rows are created `running`, mutated
//! only by progress appends, and finalized exactly once. Terminal rows are
//! immutable: every mutating statement is guarded with
//! `WHERE status = 'running'` so a late writer cannot resurrect or clobber
//! a finished session.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use molecular_pipeline_core::PipelineInput;

use crate::{Database, DbError, DbResult};

/// Session lifecycle status. Monotonic: `running` → {`completed`, `error`}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Running,
    Completed,
    Error,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Error => "error",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}

/// Full session record as served by the by-id endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub input_parameters: serde_json::Value,
    pub status: SessionStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

/// Listing row: everything except the (potentially large) result payload.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub input_parameters: serde_json::Value,
    pub status: SessionStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<i64>,
}

#[derive(Debug)]
struct FullRow {
    session_id: String,
    input_parameters: String,
    status: String,
    progress: i64,
    current_stage: Option<String>,
    error_message: Option<String>,
    result: Option<String>,
    created_at: i64,
    updated_at: i64,
    completed_at: Option<i64>,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for FullRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            session_id: row.try_get("session_id")?,
            input_parameters: row.try_get("input_parameters")?,
            status: row.try_get("status")?,
            progress: row.try_get("progress")?,
            current_stage: row.try_get("current_stage")?,
            error_message: row.try_get("error_message")?,
            result: row.try_get("result")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

#[derive(Debug)]
struct SummaryRow {
    session_id: String,
    input_parameters: String,
    status: String,
    progress: i64,
    current_stage: Option<String>,
    created_at: i64,
    updated_at: i64,
    completed_at: Option<i64>,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for SummaryRow {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            session_id: row.try_get("session_id")?,
            input_parameters: row.try_get("input_parameters")?,
            status: row.try_get("status")?,
            progress: row.try_get("progress")?,
            current_stage: row.try_get("current_stage")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }
}

fn decode_json(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or(serde_json::Value::Null)
}

fn decode_status(raw: &str, session_id: &str) -> SessionStatus {
    SessionStatus::parse(raw).unwrap_or_else(|| {
        tracing::error!(session_id, status = raw, "unknown status in store, treating as error");
        SessionStatus::Error
    })
}

impl From<FullRow> for SessionRecord {
    fn from(row: FullRow) -> Self {
        let status = decode_status(&row.status, &row.session_id);
        Self {
            session_id: row.session_id,
            input_parameters: decode_json(&row.input_parameters),
            status,
            progress: row.progress.clamp(0, 100) as u8,
            current_stage: row.current_stage,
            error_message: row.error_message,
            result: row.result.as_deref().map(decode_json),
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        }
    }
}

impl From<SummaryRow> for SessionSummary {
    fn from(row: SummaryRow) -> Self {
        let status = decode_status(&row.status, &row.session_id);
        Self {
            session_id: row.session_id,
            input_parameters: decode_json(&row.input_parameters),
            status,
            progress: row.progress.clamp(0, 100) as u8,
            current_stage: row.current_stage,
            created_at: row.created_at,
            updated_at: row.updated_at,
            completed_at: row.completed_at,
        }
    }
}

const FULL_COLUMNS: &str = "session_id, input_parameters, status, progress, current_stage, \
                            error_message, result, created_at, updated_at, completed_at";

impl Database {
    /// Persist the initial `running` record for a freshly started session.
    ///
    /// Durable before the caller proceeds: a crash immediately after this
    /// returns leaves a discoverable `running` row for the startup sweep.
    pub async fn create_session(&self, session_id: &str, input: &PipelineInput) -> DbResult<()> {
        let input_json = serde_json::to_string(input)?;
        let now = Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO sessions (session_id, input_parameters, status, progress, current_stage, created_at, updated_at)
            VALUES (?1, ?2, 'running', 0, 'initializing', ?3, ?3)
            "#,
        )
        .bind(session_id)
        .bind(&input_json)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    /// Record a progress update for a running session.
    ///
    /// `NotFound` for unknown ids. Calls after a terminal transition are a
    /// silent no-op; the last write before termination wins, and nothing
    /// resurrects `running`. The stored percentage never decreases.
    pub async fn append_progress(&self, session_id: &str, percent: u8, stage: &str) -> DbResult<()> {
        let now = Utc::now().timestamp();
        let rows = sqlx::query(
            r#"
            UPDATE sessions
            SET progress = MAX(progress, ?2), current_stage = ?3, updated_at = ?4
            WHERE session_id = ?1 AND status = 'running'
            "#,
        )
        .bind(session_id)
        .bind(percent.min(100) as i64)
        .bind(stage)
        .bind(now)
        .execute(self.pool())
        .await?
        .rows_affected();

        if rows == 0 {
            // Either the id is unknown or the session already terminated.
            if !self.session_exists(session_id).await? {
                return Err(DbError::SessionNotFound(session_id.to_string()));
            }
            tracing::debug!(session_id, "progress after terminal transition ignored");
        }
        Ok(())
    }

    /// Terminal transition to `completed`. Exactly once per session.
    pub async fn complete_session(
        &self,
        session_id: &str,
        result: &serde_json::Value,
    ) -> DbResult<()> {
        let result_json = serde_json::to_string(result)?;
        let now = Utc::now().timestamp();
        let rows = sqlx::query(
            r#"
            UPDATE sessions
            SET status = 'completed', progress = 100, current_stage = 'complete',
                result = ?2, updated_at = ?3, completed_at = ?3
            WHERE session_id = ?1 AND status = 'running'
            "#,
        )
        .bind(session_id)
        .bind(&result_json)
        .bind(now)
        .execute(self.pool())
        .await?
        .rows_affected();

        self.check_transition(session_id, rows).await
    }

    /// Terminal transition to `error`. Exactly once per session; progress is
    /// left at its last known value.
    pub async fn fail_session(&self, session_id: &str, error_message: &str) -> DbResult<()> {
        let now = Utc::now().timestamp();
        let rows = sqlx::query(
            r#"
            UPDATE sessions
            SET status = 'error', current_stage = 'error',
                error_message = ?2, updated_at = ?3, completed_at = ?3
            WHERE session_id = ?1 AND status = 'running'
            "#,
        )
        .bind(session_id)
        .bind(error_message)
        .bind(now)
        .execute(self.pool())
        .await?
        .rows_affected();

        self.check_transition(session_id, rows).await
    }

    /// Fetch the full record for one session.
    pub async fn get_session(&self, session_id: &str) -> DbResult<SessionRecord> {
        let query = format!("SELECT {FULL_COLUMNS} FROM sessions WHERE session_id = ?1");
        let row: Option<FullRow> = sqlx::query_as(&query)
            .bind(session_id)
            .fetch_optional(self.pool())
            .await?;
        row.map(SessionRecord::from)
            .ok_or_else(|| DbError::SessionNotFound(session_id.to_string()))
    }

    /// List sessions newest-created first, optionally filtered by status.
    pub async fn list_sessions(
        &self,
        limit: u32,
        status: Option<SessionStatus>,
    ) -> DbResult<Vec<SessionSummary>> {
        let rows: Vec<SummaryRow> = match status {
            Some(status) => {
                sqlx::query_as(
                    r#"
                    SELECT session_id, input_parameters, status, progress, current_stage,
                           created_at, updated_at, completed_at
                    FROM sessions
                    WHERE status = ?1
                    ORDER BY created_at DESC, rowid DESC
                    LIMIT ?2
                    "#,
                )
                .bind(status.as_str())
                .bind(limit as i64)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT session_id, input_parameters, status, progress, current_stage,
                           created_at, updated_at, completed_at
                    FROM sessions
                    ORDER BY created_at DESC, rowid DESC
                    LIMIT ?1
                    "#,
                )
                .bind(limit as i64)
                .fetch_all(self.pool())
                .await?
            }
        };
        Ok(rows.into_iter().map(SessionSummary::from).collect())
    }

    /// The single `running` session, if any. At most one exists while the
    /// Concurrency Gate does its job; the query still orders defensively.
    pub async fn find_active_running(&self) -> DbResult<Option<SessionRecord>> {
        let query = format!(
            "SELECT {FULL_COLUMNS} FROM sessions WHERE status = 'running' \
             ORDER BY created_at DESC, rowid DESC LIMIT 1"
        );
        let row: Option<FullRow> = sqlx::query_as(&query).fetch_optional(self.pool()).await?;
        Ok(row.map(SessionRecord::from))
    }

    /// Startup sweep: flip stale `running` rows (left behind by a process
    /// that died mid-run) to `error`. Returns the number of rows swept.
    pub async fn mark_interrupted(&self) -> DbResult<u64> {
        let now = Utc::now().timestamp();
        let rows = sqlx::query(
            r#"
            UPDATE sessions
            SET status = 'error', current_stage = 'error',
                error_message = 'interrupted by server restart',
                updated_at = ?1, completed_at = ?1
            WHERE status = 'running'
            "#,
        )
        .bind(now)
        .execute(self.pool())
        .await?
        .rows_affected();
        Ok(rows)
    }

    async fn session_exists(&self, session_id: &str) -> DbResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM sessions WHERE session_id = ?1")
            .bind(session_id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.is_some())
    }

    async fn check_transition(&self, session_id: &str, rows_affected: u64) -> DbResult<()> {
        if rows_affected == 1 {
            return Ok(());
        }
        if self.session_exists(session_id).await? {
            Err(DbError::TerminalSession(session_id.to_string()))
        } else {
            Err(DbError::SessionNotFound(session_id.to_string()))
        }
    }
}
