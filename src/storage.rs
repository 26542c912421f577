//! Lot catalog and append-only status snapshot log.

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::{now_s, ParkingStatus, StatusTally};

/// Fields supplied when registering a lot.
#[derive(Clone, Debug)]
pub struct NewLot {
    pub name: String,
    pub video_path: String,
    pub zones_path: String,
    pub start_frame: u64,
}

impl NewLot {
    pub fn new(
        name: impl Into<String>,
        video_path: impl Into<String>,
        zones_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            video_path: video_path.into(),
            zones_path: zones_path.into(),
            start_frame: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotRecord {
    pub id: String,
    pub name: String,
    pub video_path: String,
    pub zones_path: String,
    pub start_frame: u64,
    pub is_active: bool,
    pub created_at: u64,
    pub updated_at: u64,
}

/// Counts of one lot at one instant plus the raw per-zone statuses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub lot_id: String,
    pub total: usize,
    pub free: usize,
    pub occupied: usize,
    pub unknown: usize,
    pub raw_statuses: Vec<ParkingStatus>,
    pub captured_at: u64,
}

impl StatusSnapshot {
    pub fn capture(lot_id: &str, statuses: &[ParkingStatus]) -> Result<Self> {
        let tally = StatusTally::from_statuses(statuses);
        Ok(Self {
            lot_id: lot_id.to_string(),
            total: tally.total,
            free: tally.free,
            occupied: tally.occupied,
            unknown: tally.unknown,
            raw_statuses: statuses.to_vec(),
            captured_at: now_s()?,
        })
    }

    pub fn tally(&self) -> StatusTally {
        StatusTally {
            total: self.total,
            free: self.free,
            occupied: self.occupied,
            unknown: self.unknown,
        }
    }
}

pub trait LotStore: Send {
    fn create_lot(&mut self, lot: NewLot) -> Result<LotRecord>;

    fn lot(&self, id: &str) -> Result<Option<LotRecord>>;

    /// Lots in creation order, optionally only the active ones.
    fn list_lots(&self, active_only: bool) -> Result<Vec<LotRecord>>;

    /// Returns false when no lot has this id.
    fn set_active(&mut self, id: &str, active: bool) -> Result<bool>;

    fn append_snapshot(&mut self, snapshot: &StatusSnapshot) -> Result<()>;

    fn latest_snapshot(&self, lot_id: &str) -> Result<Option<StatusSnapshot>>;

    /// Latest snapshot of every active lot (`None` for lots never snapshotted).
    fn latest_snapshots(&self) -> Result<Vec<(LotRecord, Option<StatusSnapshot>)>> {
        let mut out = Vec::new();
        for lot in self.list_lots(true)? {
            let snapshot = self.latest_snapshot(&lot.id)?;
            out.push((lot, snapshot));
        }
        Ok(out)
    }
}

fn new_record(lot: NewLot) -> Result<LotRecord> {
    if lot.name.trim().is_empty() {
        return Err(anyhow!("lot name must not be empty"));
    }
    let now = now_s()?;
    Ok(LotRecord {
        id: uuid::Uuid::new_v4().to_string(),
        name: lot.name,
        video_path: lot.video_path,
        zones_path: lot.zones_path,
        start_frame: lot.start_frame,
        is_active: true,
        created_at: now,
        updated_at: now,
    })
}

fn to_i64(value: u64, what: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| anyhow!("{} exceeds i64 range", what))
}

fn to_u64(value: i64, what: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| anyhow!("corrupt store: negative {}", what))
}

pub struct SqliteLotStore {
    conn: Connection,
}

impl SqliteLotStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open lot database {}", db_path))?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut store = Self {
            conn: Connection::open_in_memory()?,
        };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS lots (
              id TEXT PRIMARY KEY,
              name TEXT NOT NULL,
              video_path TEXT NOT NULL,
              zones_path TEXT NOT NULL,
              start_frame INTEGER NOT NULL DEFAULT 1,
              is_active INTEGER NOT NULL DEFAULT 1,
              created_at INTEGER NOT NULL,
              updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS status_snapshots (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              lot_id TEXT NOT NULL REFERENCES lots(id) ON DELETE CASCADE,
              total_spaces INTEGER NOT NULL,
              free_spaces INTEGER NOT NULL,
              occupied_spaces INTEGER NOT NULL,
              unknown_spaces INTEGER NOT NULL,
              raw_statuses TEXT NOT NULL,
              captured_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_snapshots_lot ON status_snapshots(lot_id, id);
            "#,
        )?;
        Ok(())
    }

    fn lot_from_row(row: &Row<'_>) -> Result<LotRecord> {
        Ok(LotRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            video_path: row.get(2)?,
            zones_path: row.get(3)?,
            start_frame: to_u64(row.get(4)?, "start_frame")?,
            is_active: row.get(5)?,
            created_at: to_u64(row.get(6)?, "created_at")?,
            updated_at: to_u64(row.get(7)?, "updated_at")?,
        })
    }
}

const LOT_COLUMNS: &str =
    "id, name, video_path, zones_path, start_frame, is_active, created_at, updated_at";

impl LotStore for SqliteLotStore {
    fn create_lot(&mut self, lot: NewLot) -> Result<LotRecord> {
        let record = new_record(lot)?;
        self.conn.execute(
            r#"
            INSERT INTO lots(id, name, video_path, zones_path, start_frame, is_active, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                record.id,
                record.name,
                record.video_path,
                record.zones_path,
                to_i64(record.start_frame, "start_frame")?,
                record.is_active,
                to_i64(record.created_at, "created_at")?,
                to_i64(record.updated_at, "updated_at")?
            ],
        )?;
        Ok(record)
    }

    fn lot(&self, id: &str) -> Result<Option<LotRecord>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM lots WHERE id = ?1", LOT_COLUMNS))?;
        let mut rows = stmt.query(params![id])?;
        match rows.next()? {
            Some(row) => Ok(Some(Self::lot_from_row(row)?)),
            None => Ok(None),
        }
    }

    fn list_lots(&self, active_only: bool) -> Result<Vec<LotRecord>> {
        let sql = if active_only {
            format!(
                "SELECT {} FROM lots WHERE is_active = 1 ORDER BY created_at ASC, rowid ASC",
                LOT_COLUMNS
            )
        } else {
            format!(
                "SELECT {} FROM lots ORDER BY created_at ASC, rowid ASC",
                LOT_COLUMNS
            )
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(Self::lot_from_row(row)?);
        }
        Ok(out)
    }

    fn set_active(&mut self, id: &str, active: bool) -> Result<bool> {
        let updated_at = to_i64(now_s()?, "updated_at")?;
        let changed = self.conn.execute(
            "UPDATE lots SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
            params![active, updated_at, id],
        )?;
        Ok(changed > 0)
    }

    fn append_snapshot(&mut self, snapshot: &StatusSnapshot) -> Result<()> {
        let raw_statuses = serde_json::to_string(&snapshot.raw_statuses)?;
        self.conn
            .execute(
                r#"
                INSERT INTO status_snapshots(lot_id, total_spaces, free_spaces, occupied_spaces, unknown_spaces, raw_statuses, captured_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
                params![
                    snapshot.lot_id,
                    snapshot.total as i64,
                    snapshot.free as i64,
                    snapshot.occupied as i64,
                    snapshot.unknown as i64,
                    raw_statuses,
                    to_i64(snapshot.captured_at, "captured_at")?
                ],
            )
            .with_context(|| format!("failed to append snapshot for lot {}", snapshot.lot_id))?;
        Ok(())
    }

    fn latest_snapshot(&self, lot_id: &str) -> Result<Option<StatusSnapshot>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT total_spaces, free_spaces, occupied_spaces, unknown_spaces, raw_statuses, captured_at
                FROM status_snapshots WHERE lot_id = ?1 ORDER BY id DESC LIMIT 1
                "#,
                params![lot_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                },
            )
            .optional()?;
        let Some((total, free, occupied, unknown, raw, captured_at)) = row else {
            return Ok(None);
        };
        let count = |value: i64, what: &str| -> Result<usize> {
            usize::try_from(value).map_err(|_| anyhow!("corrupt snapshot: {} = {}", what, value))
        };
        Ok(Some(StatusSnapshot {
            lot_id: lot_id.to_string(),
            total: count(total, "total_spaces")?,
            free: count(free, "free_spaces")?,
            occupied: count(occupied, "occupied_spaces")?,
            unknown: count(unknown, "unknown_spaces")?,
            raw_statuses: serde_json::from_str(&raw)
                .context("corrupt snapshot: raw_statuses is not a status list")?,
            captured_at: to_u64(captured_at, "captured_at")?,
        }))
    }
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryLotStore {
    lots: Vec<LotRecord>,
    snapshots: Vec<StatusSnapshot>,
}

impl InMemoryLotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every snapshot appended so far, oldest first.
    pub fn snapshots(&self) -> &[StatusSnapshot] {
        &self.snapshots
    }
}

impl LotStore for InMemoryLotStore {
    fn create_lot(&mut self, lot: NewLot) -> Result<LotRecord> {
        let record = new_record(lot)?;
        self.lots.push(record.clone());
        Ok(record)
    }

    fn lot(&self, id: &str) -> Result<Option<LotRecord>> {
        Ok(self.lots.iter().find(|lot| lot.id == id).cloned())
    }

    fn list_lots(&self, active_only: bool) -> Result<Vec<LotRecord>> {
        Ok(self
            .lots
            .iter()
            .filter(|lot| !active_only || lot.is_active)
            .cloned()
            .collect())
    }

    fn set_active(&mut self, id: &str, active: bool) -> Result<bool> {
        let now = now_s()?;
        match self.lots.iter_mut().find(|lot| lot.id == id) {
            Some(lot) => {
                lot.is_active = active;
                lot.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn append_snapshot(&mut self, snapshot: &StatusSnapshot) -> Result<()> {
        if !self.lots.iter().any(|lot| lot.id == snapshot.lot_id) {
            return Err(anyhow!(
                "failed to append snapshot for unknown lot {}",
                snapshot.lot_id
            ));
        }
        self.snapshots.push(snapshot.clone());
        Ok(())
    }

    fn latest_snapshot(&self, lot_id: &str) -> Result<Option<StatusSnapshot>> {
        Ok(self
            .snapshots
            .iter()
            .rev()
            .find(|snapshot| snapshot.lot_id == lot_id)
            .cloned())
    }
}
