//! SQLite record store.
//!
//! RULE: Only store.rs talks to the database.
//! The engine never reads the store; callers load records and pass them in.

use crate::{
    error::StaffingResult,
    features::FeatureColumn,
    record::PharmacyRecord,
    types::{PharmacyId, RoleBreakdown},
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::BTreeMap;

const PHARMACY_COLUMNS: &str =
    "id, city, region, typ, bloky, trzby, podiel_rx, fte_f, fte_l, fte_zf, fte_n, productivity, \
     bloky_trend";

pub struct PharmacyStore {
    conn: Connection,
}

impl PharmacyStore {
    /// Open (or create) the record database at `path`.
    pub fn open(path: &str) -> StaffingResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> StaffingResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    pub fn migrate(&self) -> StaffingResult<()> {
        self.conn.execute_batch(include_str!("../migrations/001_pharmacy.sql"))?;
        Ok(())
    }

    // ── Pharmacy ───────────────────────────────────────────────

    /// Insert or replace a record together with its feature values.
    pub fn insert_pharmacy(&mut self, record: &PharmacyRecord) -> StaffingResult<()> {
        record.validate()?;
        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO pharmacy
             (id, city, region, typ, bloky, trzby, podiel_rx, fte_f, fte_l, fte_zf, fte_n, productivity, bloky_trend)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                record.id,
                record.city,
                record.region,
                record.typ,
                record.bloky,
                record.trzby,
                record.podiel_rx,
                record.staff_net.pharmacist,
                record.staff_net.assistant,
                record.staff_net.deputy,
                record.absence_fte,
                record.productivity,
                record.bloky_trend,
            ],
        )?;
        tx.execute("DELETE FROM pharmacy_feature WHERE pharmacy_id = ?1", params![record.id])?;
        for (column, value) in &record.features {
            tx.execute(
                "INSERT INTO pharmacy_feature (pharmacy_id, column_name, value) VALUES (?1, ?2, ?3)",
                params![record.id, column.name(), value],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn pharmacy(&self, id: PharmacyId) -> StaffingResult<Option<PharmacyRecord>> {
        let sql = format!("SELECT {PHARMACY_COLUMNS} FROM pharmacy WHERE id = ?1");
        let record = self
            .conn
            .query_row(&sql, params![id], record_from_row)
            .optional()?;
        match record {
            Some(mut r) => {
                r.features = self.features_for(id)?;
                Ok(Some(r))
            }
            None => Ok(None),
        }
    }

    pub fn all_pharmacies(&self) -> StaffingResult<Vec<PharmacyRecord>> {
        let sql = format!("SELECT {PHARMACY_COLUMNS} FROM pharmacy ORDER BY id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let mut records = stmt
            .query_map([], record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        for record in &mut records {
            record.features = self.features_for(record.id)?;
        }
        Ok(records)
    }

    pub fn pharmacy_count(&self) -> StaffingResult<usize> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM pharmacy", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ── Features ───────────────────────────────────────────────

    /// Unknown column names are skipped so an older model can read a
    /// newer store.
    fn features_for(&self, id: PharmacyId) -> StaffingResult<BTreeMap<FeatureColumn, f64>> {
        let mut stmt = self.conn.prepare(
            "SELECT column_name, value FROM pharmacy_feature WHERE pharmacy_id = ?1",
        )?;
        let rows = stmt
            .query_map(params![id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut features = BTreeMap::new();
        for (name, value) in rows {
            match name.parse::<FeatureColumn>() {
                Ok(column) => {
                    features.insert(column, value);
                }
                Err(_) => log::warn!("store: pharmacy {id} has unknown feature '{name}'"),
            }
        }
        Ok(features)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<PharmacyRecord> {
    Ok(PharmacyRecord {
        id:           row.get(0)?,
        city:         row.get(1)?,
        region:       row.get(2)?,
        typ:          row.get(3)?,
        bloky:        row.get(4)?,
        trzby:        row.get(5)?,
        podiel_rx:    row.get(6)?,
        staff_net:    RoleBreakdown::new(row.get(7)?, row.get(8)?, row.get(9)?),
        absence_fte:  row.get(10)?,
        productivity: row.get(11)?,
        bloky_trend:  row.get(12)?,
        features:     BTreeMap::new(),
    })
}
