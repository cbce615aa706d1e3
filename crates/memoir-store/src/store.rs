//! The async moment store facade.

use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{OptionalExtension, params};
use tracing::debug;

use crate::moment::{Attachment, GeoPoint, Moment};
use crate::worker::{Location, SqliteWorker};
use crate::StoreError;

type MomentRow = (String, i64, Option<f64>, Option<f64>, String, String);

fn parse_moment_row(row: MomentRow) -> Result<Moment, StoreError> {
    let (id, timestamp_ms, latitude, longitude, user_agent, predictions) = row;
    let timestamp: DateTime<Utc> = Utc
        .timestamp_millis_opt(timestamp_ms)
        .single()
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp {timestamp_ms} out of range")))?;
    let geolocation = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(GeoPoint {
            latitude,
            longitude,
        }),
        (None, None) => None,
        _ => {
            return Err(StoreError::Corrupt(format!(
                "moment {id} has a partial geolocation"
            )));
        }
    };
    Ok(Moment {
        id,
        timestamp,
        geolocation,
        user_agent,
        predictions: serde_json::from_str(&predictions)?,
    })
}

const MOMENT_COLUMNS: &str = "id, timestamp_ms, latitude, longitude, user_agent, predictions";

/// SQLite-backed moment storage. Cheap to clone; all clones share the
/// same worker thread.
#[derive(Clone)]
pub struct MomentStore {
    worker: SqliteWorker,
}

impl MomentStore {
    /// Open (or create) the database at `path` and apply migrations.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Ok(Self {
            worker: SqliteWorker::open(Location::Disk(path.into()))?,
        })
    }

    /// In-memory store; contents vanish on drop.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self {
            worker: SqliteWorker::open(Location::Memory)?,
        })
    }

    /// Insert the moment, or replace the record with the same id.
    pub async fn upsert(&self, moment: &Moment) -> Result<(), StoreError> {
        let record = moment.clone();
        self.worker
            .call(move |conn| {
                let predictions = serde_json::to_string(&record.predictions)?;
                conn.execute(
                    "INSERT INTO moments (id, timestamp_ms, latitude, longitude, user_agent, predictions)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(id) DO UPDATE SET
                         timestamp_ms = excluded.timestamp_ms,
                         latitude     = excluded.latitude,
                         longitude    = excluded.longitude,
                         user_agent   = excluded.user_agent,
                         predictions  = excluded.predictions",
                    params![
                        record.id,
                        record.timestamp.timestamp_millis(),
                        record.geolocation.map(|point| point.latitude),
                        record.geolocation.map(|point| point.longitude),
                        record.user_agent,
                        predictions,
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Every moment, newest first.
    pub async fn all(&self) -> Result<Vec<Moment>, StoreError> {
        self.worker
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {MOMENT_COLUMNS} FROM moments ORDER BY timestamp_ms DESC, id"
                ))?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })?;
                let mut moments = Vec::new();
                for row in rows {
                    moments.push(parse_moment_row(row?)?);
                }
                Ok(moments)
            })
            .await
    }

    /// Single moment lookup.
    pub async fn get(&self, id: &str) -> Result<Option<Moment>, StoreError> {
        let id = id.to_string();
        self.worker
            .call(move |conn| {
                let row: Option<MomentRow> = conn
                    .query_row(
                        &format!("SELECT {MOMENT_COLUMNS} FROM moments WHERE id = ?1"),
                        [&id],
                        |row| {
                            Ok((
                                row.get(0)?,
                                row.get(1)?,
                                row.get(2)?,
                                row.get(3)?,
                                row.get(4)?,
                                row.get(5)?,
                            ))
                        },
                    )
                    .optional()?;
                row.map(parse_moment_row).transpose()
            })
            .await
    }

    /// Remove every listed moment (and, with it, its attachments).
    /// Absent ids are skipped. Returns the number of moments removed.
    pub async fn remove_all(&self, ids: Vec<String>) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        self.worker
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut removed = 0;
                {
                    let mut stmt = tx.prepare("DELETE FROM moments WHERE id = ?1")?;
                    for id in &ids {
                        removed += stmt.execute([id])?;
                    }
                }
                tx.commit()?;
                debug!(removed, "moments removed");
                Ok(removed)
            })
            .await
    }

    /// Attach (or replace) binary data on a moment.
    pub async fn put_attachment(
        &self,
        moment_id: &str,
        attachment_id: &str,
        content_type: &str,
        data: Vec<u8>,
    ) -> Result<(), StoreError> {
        let moment_id = moment_id.to_string();
        let attachment_id = attachment_id.to_string();
        let content_type = content_type.to_string();
        self.worker
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO attachments (moment_id, attachment_id, content_type, data)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![moment_id, attachment_id, content_type, data],
                )?;
                Ok(())
            })
            .await
    }

    /// Read an attachment back.
    pub async fn get_attachment(
        &self,
        moment_id: &str,
        attachment_id: &str,
    ) -> Result<Option<Attachment>, StoreError> {
        let moment_id = moment_id.to_string();
        let attachment_id = attachment_id.to_string();
        self.worker
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        "SELECT moment_id, attachment_id, content_type, data
                         FROM attachments WHERE moment_id = ?1 AND attachment_id = ?2",
                        [&moment_id, &attachment_id],
                        |row| {
                            Ok(Attachment {
                                moment_id: row.get(0)?,
                                attachment_id: row.get(1)?,
                                content_type: row.get(2)?,
                                data: row.get(3)?,
                            })
                        },
                    )
                    .optional()?)
            })
            .await
    }

    /// Number of stored moments.
    pub async fn count(&self) -> Result<u64, StoreError> {
        self.worker
            .call(|conn| {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM moments", [], |row| row.get(0))?;
                Ok(u64::try_from(count).unwrap_or(0))
            })
            .await
    }
}
