//! SQLite schema. Applied idempotently on open.

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS residents (
    resident_id INTEGER PRIMARY KEY AUTOINCREMENT,
    full_name   TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS visitors (
    visitor_id INTEGER PRIMARY KEY AUTOINCREMENT,
    full_name  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS security_officers (
    officer_id INTEGER PRIMARY KEY AUTOINCREMENT,
    full_name  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS internal_staff (
    staff_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    full_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS temp_staff (
    temp_id         INTEGER PRIMARY KEY AUTOINCREMENT,
    full_name       TEXT NOT NULL,
    work_start_date TEXT,
    work_end_date   TEXT
);

CREATE TABLE IF NOT EXISTS admins (
    admin_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    full_name TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS face_embeddings (
    embedding_id INTEGER PRIMARY KEY AUTOINCREMENT,
    category     TEXT NOT NULL CHECK (category IN
        ('resident', 'visitor', 'security_officer', 'internal_staff', 'temp_staff', 'admin')),
    reference_id INTEGER NOT NULL,
    dimension    INTEGER NOT NULL,
    vector       BLOB NOT NULL,
    created_at   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_face_embeddings_scan
    ON face_embeddings (dimension, category, embedding_id);
CREATE INDEX IF NOT EXISTS idx_face_embeddings_owner
    ON face_embeddings (category, reference_id);

-- embedding_id is a weak reference: no foreign key, rows outlive embeddings.
CREATE TABLE IF NOT EXISTS access_logs (
    log_id            INTEGER PRIMARY KEY AUTOINCREMENT,
    attempt_id        TEXT NOT NULL UNIQUE,
    access_time       TEXT NOT NULL,
    recognized_person TEXT NOT NULL,
    category          TEXT NOT NULL CHECK (category IN
        ('resident', 'visitor', 'security_officer', 'internal_staff', 'temp_staff', 'admin', 'unknown')),
    confidence        REAL NOT NULL CHECK (confidence >= 0.0 AND confidence <= 1.0),
    access_result     TEXT NOT NULL CHECK (access_result IN ('granted', 'denied')),
    embedding_id      INTEGER
);

CREATE INDEX IF NOT EXISTS idx_access_logs_time ON access_logs (access_time);
"#;
