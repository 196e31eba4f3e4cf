/// Inline SQL migrations for the session store schema.
///
/// We use simple inline migrations rather than sqlx migration files
/// because the schema is small and self-contained.
pub const MIGRATIONS: &[&str] = &[
    // Migration 1: sessions table
    r#"
CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    input_parameters TEXT NOT NULL,
    status TEXT NOT NULL,
    progress INTEGER NOT NULL DEFAULT 0 CHECK (progress BETWEEN 0 AND 100),
    current_stage TEXT,
    error_message TEXT,
    result TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    completed_at INTEGER
);
"#,
    // Migration 2: sessions indexes
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions(created_at DESC);"#,
    r#"CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);"#,
];
