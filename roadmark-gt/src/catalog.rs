//! Durable catalog of distinct physical defects
//!
//! Spatial deduplication with hysteresis: a detection either creates a new
//! entry, matches an existing one (buffered toward a count increment), or
//! is suppressed as sensor jitter at a stationary defect. The
//! scan-then-mutate sequence is a single critical section so concurrent
//! ingests can never both observe "no nearby entry" and create duplicates
//! for the same physical defect.
//!
//! Every mutation is written through to SQLite before the merge call
//! returns. When the store is unreachable the in-memory state stays
//! authoritative: the entry is marked dirty and a background task retries
//! with a bounded attempt budget.

use crate::config::RuntimeSettings;
use crate::db;
use crate::error::Result;
use chrono::Utc;
use roadmark_common::detection::DetectionSnapshot;
use roadmark_common::geo::{self, Coordinate};
use roadmark_common::notification::{CatalogEntry, CatalogVerdict};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Result of merging one resolved detection into the catalog
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub entry: CatalogEntry,
    pub verdict: CatalogVerdict,
}

impl MergeOutcome {
    pub fn is_new_entry(&self) -> bool {
        matches!(self.verdict, CatalogVerdict::NewEntry)
    }

    pub fn count_incremented(&self) -> bool {
        matches!(
            self.verdict,
            CatalogVerdict::ExistingMatch {
                count_incremented: true
            }
        )
    }
}

/// Mutable state guarded by the merge critical section
struct CatalogInner {
    entries: Vec<CatalogEntry>,
    /// Entries whose latest state has not reached the database, with the
    /// number of failed write attempts so far
    dirty: HashMap<Uuid, u32>,
}

/// Durable store of distinct physical defects
///
/// Explicitly constructed at startup and passed into the ingestion and
/// query paths; independent instances never interfere.
pub struct PotholeCatalog {
    pool: SqlitePool,
    duplicate_radius_m: f64,
    noise_radius_m: f64,
    detections_per_increment: u32,
    persist_max_retries: u32,
    inner: Mutex<CatalogInner>,
}

impl PotholeCatalog {
    /// Open the catalog, loading previously persisted entries
    pub async fn open(pool: SqlitePool, settings: &RuntimeSettings) -> Result<Self> {
        let entries = db::catalog::load_entries(&pool).await?;
        debug!("Loaded {} catalog entries from database", entries.len());

        Ok(Self {
            pool,
            duplicate_radius_m: settings.duplicate_radius_m,
            noise_radius_m: settings.noise_radius_m,
            detections_per_increment: settings.detections_per_increment,
            persist_max_retries: settings.persist_max_retries,
            inner: Mutex::new(CatalogInner {
                entries,
                dirty: HashMap::new(),
            }),
        })
    }

    /// Merge a resolved detection into the catalog
    ///
    /// Scans for an entry within the duplicate radius. No match creates a
    /// new entry; a match within the noise radius refreshes `last_seen`
    /// only; any other match feeds the hysteresis buffer, consolidating
    /// into one `detection_count` increment per
    /// `detections_per_increment` qualifying detections.
    pub async fn add_or_merge(
        &self,
        coordinate: Coordinate,
        detection: &DetectionSnapshot,
    ) -> MergeOutcome {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;

        let nearest = inner
            .entries
            .iter()
            .enumerate()
            .map(|(idx, entry)| (geo::distance(entry.coordinate, coordinate), idx))
            .filter(|(d, _)| *d <= self.duplicate_radius_m)
            .min_by(|(a, _), (b, _)| a.total_cmp(b));

        let outcome = match nearest {
            None => {
                let entry = CatalogEntry {
                    id: Uuid::new_v4(),
                    coordinate,
                    distance_m: detection.forward_distance_m,
                    lateral_m: detection.lateral_offset_m,
                    size_m2: detection.size_m2,
                    detection_count: 1,
                    pending_detections: 1,
                    first_seen: now,
                    last_seen: now,
                };
                inner.entries.push(entry.clone());
                MergeOutcome {
                    entry,
                    verdict: CatalogVerdict::NewEntry,
                }
            }
            Some((dist, idx)) if dist <= self.noise_radius_m => {
                // Jitter at a stationary defect: refresh visibility only,
                // the hysteresis buffer does not move
                let entry = &mut inner.entries[idx];
                entry.last_seen = now;
                MergeOutcome {
                    entry: entry.clone(),
                    verdict: CatalogVerdict::NoiseRepeat,
                }
            }
            Some((_, idx)) => {
                let entry = &mut inner.entries[idx];
                entry.pending_detections += 1;
                entry.size_m2 = entry.size_m2.max(detection.size_m2);
                entry.last_seen = now;

                let count_incremented = entry.pending_detections >= self.detections_per_increment;
                if count_incremented {
                    entry.detection_count += 1;
                    entry.pending_detections = 0;
                }
                MergeOutcome {
                    entry: entry.clone(),
                    verdict: CatalogVerdict::ExistingMatch { count_incremented },
                }
            }
        };

        // Write-through before returning; on failure the entry goes dirty
        // and ingestion continues against in-memory state
        if let Err(e) = db::catalog::upsert_entry(&self.pool, &outcome.entry).await {
            warn!(
                "Catalog persistence failed for {}: {} (will retry)",
                outcome.entry.id, e
            );
            inner.dirty.entry(outcome.entry.id).or_insert(0);
        } else {
            inner.dirty.remove(&outcome.entry.id);
        }

        outcome
    }

    /// Entries within `radius_m` of `coordinate`, nearest first
    pub async fn nearby(&self, coordinate: Coordinate, radius_m: f64) -> Vec<CatalogEntry> {
        let inner = self.inner.lock().await;
        let mut matches: Vec<(f64, CatalogEntry)> = inner
            .entries
            .iter()
            .map(|entry| (geo::distance(entry.coordinate, coordinate), entry.clone()))
            .filter(|(d, _)| *d <= radius_m)
            .collect();
        matches.sort_by(|(a, _), (b, _)| a.total_cmp(b));
        matches.into_iter().map(|(_, entry)| entry).collect()
    }

    /// Snapshot of every entry
    pub async fn entries(&self) -> Vec<CatalogEntry> {
        self.inner.lock().await.entries.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// Entries still awaiting a successful write-through
    pub async fn dirty_count(&self) -> usize {
        self.inner.lock().await.dirty.len()
    }

    /// Retry persistence for dirty entries; returns how many remain dirty
    ///
    /// Entries that exhaust their attempt budget are dropped from the
    /// retry set (the in-memory copy remains authoritative) so one
    /// unreachable row cannot occupy the retry loop forever.
    pub async fn retry_dirty(&self) -> usize {
        let mut inner = self.inner.lock().await;
        if inner.dirty.is_empty() {
            return 0;
        }

        let dirty_ids: Vec<Uuid> = inner.dirty.keys().copied().collect();
        for id in dirty_ids {
            let Some(entry) = inner.entries.iter().find(|e| e.id == id).cloned() else {
                inner.dirty.remove(&id);
                continue;
            };

            match db::catalog::upsert_entry(&self.pool, &entry).await {
                Ok(()) => {
                    inner.dirty.remove(&id);
                    debug!("Deferred persistence succeeded for {}", id);
                }
                Err(e) => {
                    let attempts = inner.dirty.entry(id).or_insert(0);
                    *attempts += 1;
                    if *attempts >= self.persist_max_retries {
                        error!(
                            "Giving up persisting catalog entry {} after {} attempts: {}",
                            id, attempts, e
                        );
                        inner.dirty.remove(&id);
                    }
                }
            }
        }

        inner.dirty.len()
    }
}
