//! Idempotent schema creation (spec §4.J): `CREATE TABLE IF NOT EXISTS`
//! only, no migrations — the store's state is operational, not a system
//! of record that needs versioned evolution.

pub const ENABLE_WAL: &str = "PRAGMA journal_mode = WAL;";
pub const SET_SYNCHRONOUS: &str = "PRAGMA synchronous = NORMAL;";
pub const ENABLE_FOREIGN_KEYS: &str = "PRAGMA foreign_keys = ON;";
pub const SET_BUSY_TIMEOUT: &str = "PRAGMA busy_timeout = 5000;";

pub const CREATE_APPROVALS: &str = "
CREATE TABLE IF NOT EXISTS approvals (
    decision_id TEXT PRIMARY KEY,
    actor       TEXT NOT NULL,
    risk_class  TEXT NOT NULL,
    granted     INTEGER NOT NULL,
    created_at  INTEGER NOT NULL,
    expires_at  INTEGER NOT NULL
);
";

pub const CREATE_RATE_LIMITS: &str = "
CREATE TABLE IF NOT EXISTS rate_limits (
    limiter_type TEXT NOT NULL,
    key          TEXT NOT NULL,
    window_start INTEGER NOT NULL,
    points       INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (limiter_type, key, window_start)
);
";

pub const CREATE_IDENTITY_LINKS: &str = "
CREATE TABLE IF NOT EXISTS identity_links (
    id          TEXT PRIMARY KEY,
    actor       TEXT NOT NULL,
    provider    TEXT NOT NULL,
    external_id TEXT NOT NULL,
    created_at  INTEGER NOT NULL
);
";

pub const CREATE_PENDING_LINK_CODES: &str = "
CREATE TABLE IF NOT EXISTS pending_link_codes (
    code        TEXT PRIMARY KEY,
    actor       TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    expires_at  INTEGER NOT NULL
);
";

/// Persisted record of sessions issued, kept for inspection/audit tooling.
/// The authoritative bearer-token cache lives in-memory in the issuer
/// (spec §4.C); this table is not consulted on the `resolve` hot path.
pub const CREATE_SESSIONS: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    token_hash  TEXT PRIMARY KEY,
    scope       TEXT NOT NULL,
    issued_at   INTEGER NOT NULL,
    expires_at  INTEGER NOT NULL
);
";

pub const CREATE_CIRCUIT_BREAKER: &str = "
CREATE TABLE IF NOT EXISTS circuit_breaker (
    name        TEXT PRIMARY KEY,
    state       TEXT NOT NULL,
    opened_at   INTEGER,
    failure_count INTEGER NOT NULL DEFAULT 0
);
";

pub const CREATE_ATTACHMENT_REFS: &str = "
CREATE TABLE IF NOT EXISTS attachment_refs (
    hash        TEXT PRIMARY KEY,
    actor       TEXT NOT NULL,
    provider    TEXT NOT NULL,
    filepath    TEXT NOT NULL,
    filename    TEXT NOT NULL,
    mime_type   TEXT NOT NULL,
    created_at  INTEGER NOT NULL,
    expires_at  INTEGER NOT NULL
);
";

pub const CREATE_MEMORY_ENTRIES: &str = "
CREATE TABLE IF NOT EXISTS memory_entries (
    id            TEXT PRIMARY KEY,
    category      TEXT NOT NULL,
    content       TEXT NOT NULL,
    source        TEXT NOT NULL,
    trust         TEXT NOT NULL,
    chat_id       TEXT,
    created_at    INTEGER NOT NULL,
    promoted_at   INTEGER,
    promoted_by   TEXT,
    posted_at     INTEGER
);
";

pub const CREATE_MEMORY_ENTRIES_SCOPE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_memory_entries_source_trust ON memory_entries (source, trust, created_at DESC);";
pub const CREATE_MEMORY_ENTRIES_CATEGORY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_memory_entries_category ON memory_entries (category, created_at DESC);";
pub const CREATE_MEMORY_ENTRIES_CHAT_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_memory_entries_chat ON memory_entries (chat_id, created_at DESC);";

pub const ALL_STATEMENTS: &[&str] = &[
    CREATE_APPROVALS,
    CREATE_RATE_LIMITS,
    CREATE_IDENTITY_LINKS,
    CREATE_PENDING_LINK_CODES,
    CREATE_SESSIONS,
    CREATE_CIRCUIT_BREAKER,
    CREATE_ATTACHMENT_REFS,
    CREATE_MEMORY_ENTRIES,
    CREATE_MEMORY_ENTRIES_SCOPE_INDEX,
    CREATE_MEMORY_ENTRIES_CATEGORY_INDEX,
    CREATE_MEMORY_ENTRIES_CHAT_INDEX,
];

/// Tables with an `expires_at` column, pruned by the periodic cleanup job.
pub const TTL_TABLES: &[(&str, &str)] = &[
    ("approvals", "expires_at"),
    ("pending_link_codes", "expires_at"),
    ("sessions", "expires_at"),
    ("attachment_refs", "expires_at"),
];
