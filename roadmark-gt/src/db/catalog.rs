//! Catalog entry persistence
//!
//! Row-level access for the `catalog_entries` table. Each mutation in the
//! catalog store writes through here before the merge call returns;
//! round-tripping this service's own writes is the only compatibility
//! requirement.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use roadmark_common::geo::Coordinate;
use roadmark_common::notification::CatalogEntry;
use sqlx::SqlitePool;
use uuid::Uuid;

/// Raw row shape as stored in SQLite
#[derive(Debug, sqlx::FromRow)]
struct CatalogRow {
    id: String,
    latitude: f64,
    longitude: f64,
    distance_m: f64,
    lateral_m: f64,
    size_m2: f64,
    detection_count: i64,
    pending_detections: i64,
    first_seen: DateTime<Utc>,
    last_seen: DateTime<Utc>,
}

impl TryFrom<CatalogRow> for CatalogEntry {
    type Error = Error;

    fn try_from(row: CatalogRow) -> Result<CatalogEntry> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| Error::Internal(format!("Corrupt catalog id '{}': {}", row.id, e)))?;

        Ok(CatalogEntry {
            id,
            coordinate: Coordinate::new(row.latitude, row.longitude),
            distance_m: row.distance_m,
            lateral_m: row.lateral_m,
            size_m2: row.size_m2,
            detection_count: row.detection_count.max(0) as u32,
            pending_detections: row.pending_detections.max(0) as u32,
            first_seen: row.first_seen,
            last_seen: row.last_seen,
        })
    }
}

/// Write one entry through to the database (insert or replace)
pub async fn upsert_entry(pool: &SqlitePool, entry: &CatalogEntry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO catalog_entries
            (id, latitude, longitude, distance_m, lateral_m, size_m2,
             detection_count, pending_detections, first_seen, last_seen)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            size_m2 = excluded.size_m2,
            detection_count = excluded.detection_count,
            pending_detections = excluded.pending_detections,
            last_seen = excluded.last_seen
        "#,
    )
    .bind(entry.id.to_string())
    .bind(entry.coordinate.latitude)
    .bind(entry.coordinate.longitude)
    .bind(entry.distance_m)
    .bind(entry.lateral_m)
    .bind(entry.size_m2)
    .bind(entry.detection_count as i64)
    .bind(entry.pending_detections as i64)
    .bind(entry.first_seen)
    .bind(entry.last_seen)
    .execute(pool)
    .await?;

    Ok(())
}

/// Load every entry, oldest first
pub async fn load_entries(pool: &SqlitePool) -> Result<Vec<CatalogEntry>> {
    let rows: Vec<CatalogRow> =
        sqlx::query_as("SELECT * FROM catalog_entries ORDER BY first_seen ASC")
            .fetch_all(pool)
            .await?;

    rows.into_iter().map(CatalogEntry::try_from).collect()
}
