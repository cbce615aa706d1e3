//! Schema migrations, applied on the worker thread before it accepts
//! work. Versioned via `PRAGMA user_version`.

use rusqlite::Connection;
use tracing::info;

use crate::StoreError;

pub(crate) fn run_migrations(conn: &mut Connection) -> Result<(), StoreError> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version < 1 {
        info!("applying schema migration 1");
        let tx = conn.transaction()?;
        tx.execute_batch(
            "CREATE TABLE moments (
                 id           TEXT PRIMARY KEY,
                 timestamp_ms INTEGER NOT NULL,
                 latitude     REAL,
                 longitude    REAL,
                 user_agent   TEXT NOT NULL,
                 predictions  TEXT NOT NULL
             );
             CREATE INDEX idx_moments_timestamp ON moments(timestamp_ms DESC);
             CREATE TABLE attachments (
                 moment_id     TEXT NOT NULL REFERENCES moments(id) ON DELETE CASCADE,
                 attachment_id TEXT NOT NULL,
                 content_type  TEXT NOT NULL,
                 data          BLOB NOT NULL,
                 PRIMARY KEY (moment_id, attachment_id)
             );
             PRAGMA user_version = 1;",
        )?;
        tx.commit()?;
    }

    Ok(())
}
