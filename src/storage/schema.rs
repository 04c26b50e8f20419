//! Database schema definitions
//!
//! The SQLite engine keeps a single ordered key-value table. Keys are the
//! namespaced strings produced by the store; values are JSON snapshots.

/// The `kv` table; `WITHOUT ROWID` keeps rows clustered by key for prefix ranges
pub const SCHEMA_SQL: &str = r#"
-- "{collection}:{scoped-id}" -> JSON snapshot
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY NOT NULL,
    value BLOB NOT NULL
) WITHOUT ROWID;
"#;

/// Creates the `kv` table if it does not exist yet
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)
}
