//! SQLite-backed store.

use super::{
    AttachmentRecord, Category, LineItemRecord, Process, Store, Supplier, SupplierResultRecord,
    SweepRecord, SweepState,
};
use crate::error::StoreError;
use crate::events::OfferStatus;
use crate::extract::{OfferAttachment, OfferItem, SupplierProfile};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// SQLite store. The connection is mutex-guarded — writes are short and
/// the sweep loop is serial anyway.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store at the given path.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let db = Connection::open(path)?;
        Self::init(db)
    }

    /// Open an in-process database that vanishes on drop. Used by
    /// `--ephemeral` runs and tests that want real SQL.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Default database path: `PROFORMA_DB_PATH` env, else
    /// `~/.proforma/proforma.db`.
    pub fn default_path() -> PathBuf {
        if let Ok(p) = std::env::var("PROFORMA_DB_PATH") {
            return PathBuf::from(p);
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join(".proforma")
            .join("proforma.db")
    }

    fn init(db: Connection) -> Result<Self, StoreError> {
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );
            CREATE TABLE IF NOT EXISTS processes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                portal_code TEXT NOT NULL,
                display_code TEXT,
                category_id INTEGER NOT NULL REFERENCES categories(id)
            );
            CREATE TABLE IF NOT EXISTS suppliers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ruc TEXT NOT NULL UNIQUE,
                name TEXT,
                email TEXT,
                phone TEXT,
                country TEXT,
                province TEXT,
                canton TEXT,
                address TEXT,
                category_id INTEGER NOT NULL REFERENCES categories(id)
            );
            CREATE TABLE IF NOT EXISTS sweeps (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                process_id INTEGER NOT NULL REFERENCES processes(id),
                state TEXT NOT NULL,
                started_at TEXT NOT NULL,
                finished_at TEXT
            );
            CREATE TABLE IF NOT EXISTS supplier_results (
                sweep_id INTEGER NOT NULL REFERENCES sweeps(id),
                supplier_ruc TEXT NOT NULL,
                status TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS line_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sweep_id INTEGER NOT NULL REFERENCES sweeps(id),
                supplier_ruc TEXT NOT NULL,
                supplier_name TEXT NOT NULL,
                item_number TEXT NOT NULL,
                cpc TEXT NOT NULL,
                description TEXT NOT NULL,
                unit TEXT NOT NULL,
                quantity REAL NOT NULL,
                unit_value REAL NOT NULL,
                total_value REAL NOT NULL,
                collected_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS attachments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                sweep_id INTEGER NOT NULL REFERENCES sweeps(id),
                supplier_ruc TEXT NOT NULL,
                name TEXT NOT NULL,
                url TEXT NOT NULL,
                collected_at TEXT NOT NULL
            );",
        )?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned mutex means another thread panicked mid-statement;
        // the connection itself is still usable.
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn supplier_from_row(row: &Row<'_>) -> rusqlite::Result<Supplier> {
    Ok(Supplier {
        id: row.get(0)?,
        ruc: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        phone: row.get(4)?,
        country: row.get(5)?,
        province: row.get(6)?,
        canton: row.get(7)?,
        address: row.get(8)?,
        category_id: row.get(9)?,
    })
}

const SUPPLIER_COLS: &str =
    "id, ruc, name, email, phone, country, province, canton, address, category_id";

fn sweep_from_row(row: &Row<'_>) -> rusqlite::Result<SweepRecord> {
    let state: String = row.get(2)?;
    let started: String = row.get(3)?;
    let finished: Option<String> = row.get(4)?;
    Ok(SweepRecord {
        id: row.get(0)?,
        process_id: row.get(1)?,
        state: SweepState::parse(&state).unwrap_or(SweepState::Pending),
        started_at: parse_ts(&started),
        finished_at: finished.map(|s| parse_ts(&s)),
    })
}

impl Store for SqliteStore {
    fn add_category(&self, name: &str) -> Result<Category, StoreError> {
        let db = self.lock();
        db.execute("INSERT INTO categories (name) VALUES (?1)", params![name])
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    StoreError::Conflict(format!("category '{name}' already exists"))
                }
                other => StoreError::Database(other),
            })?;
        Ok(Category {
            id: db.last_insert_rowid(),
            name: name.to_string(),
        })
    }

    fn categories(&self) -> Result<Vec<Category>, StoreError> {
        let db = self.lock();
        let mut stmt = db.prepare("SELECT id, name FROM categories ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Category {
                    id: row.get(0)?,
                    name: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn add_process(&self, portal_code: &str, category_id: i64) -> Result<Process, StoreError> {
        let db = self.lock();
        let exists: Option<i64> = db
            .query_row(
                "SELECT id FROM categories WHERE id = ?1",
                params![category_id],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::missing("category", category_id));
        }
        db.execute(
            "INSERT INTO processes (portal_code, category_id) VALUES (?1, ?2)",
            params![portal_code, category_id],
        )?;
        Ok(Process {
            id: db.last_insert_rowid(),
            portal_code: portal_code.to_string(),
            display_code: None,
            category_id,
        })
    }

    fn process(&self, id: i64) -> Result<Option<Process>, StoreError> {
        let db = self.lock();
        let process = db
            .query_row(
                "SELECT id, portal_code, display_code, category_id FROM processes WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Process {
                        id: row.get(0)?,
                        portal_code: row.get(1)?,
                        display_code: row.get(2)?,
                        category_id: row.get(3)?,
                    })
                },
            )
            .optional()?;
        Ok(process)
    }

    fn processes(&self) -> Result<Vec<Process>, StoreError> {
        let db = self.lock();
        let mut stmt = db.prepare(
            "SELECT id, portal_code, display_code, category_id FROM processes ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Process {
                    id: row.get(0)?,
                    portal_code: row.get(1)?,
                    display_code: row.get(2)?,
                    category_id: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn delete_process(&self, id: i64) -> Result<(), StoreError> {
        let mut db = self.lock();
        let tx = db.transaction()?;
        tx.execute(
            "DELETE FROM line_items WHERE sweep_id IN (SELECT id FROM sweeps WHERE process_id = ?1)",
            params![id],
        )?;
        tx.execute(
            "DELETE FROM attachments WHERE sweep_id IN (SELECT id FROM sweeps WHERE process_id = ?1)",
            params![id],
        )?;
        tx.execute(
            "DELETE FROM supplier_results WHERE sweep_id IN (SELECT id FROM sweeps WHERE process_id = ?1)",
            params![id],
        )?;
        tx.execute("DELETE FROM sweeps WHERE process_id = ?1", params![id])?;
        tx.execute("DELETE FROM processes WHERE id = ?1", params![id])?;
        tx.commit()?;
        Ok(())
    }

    fn set_display_code(&self, process_id: i64, code: &str) -> Result<(), StoreError> {
        let db = self.lock();
        let changed = db.execute(
            "UPDATE processes SET display_code = ?1 WHERE id = ?2",
            params![code, process_id],
        )?;
        if changed == 0 {
            return Err(StoreError::missing("process", process_id));
        }
        Ok(())
    }

    fn add_supplier(&self, ruc: &str, category_id: i64) -> Result<Supplier, StoreError> {
        let db = self.lock();
        db.execute(
            "INSERT INTO suppliers (ruc, category_id) VALUES (?1, ?2)",
            params![ruc, category_id],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(format!("supplier with RUC {ruc} already exists"))
            }
            other => StoreError::Database(other),
        })?;
        Ok(Supplier {
            id: db.last_insert_rowid(),
            ruc: ruc.to_string(),
            name: None,
            email: None,
            phone: None,
            country: None,
            province: None,
            canton: None,
            address: None,
            category_id,
        })
    }

    fn suppliers(&self) -> Result<Vec<Supplier>, StoreError> {
        let db = self.lock();
        let mut stmt =
            db.prepare(&format!("SELECT {SUPPLIER_COLS} FROM suppliers ORDER BY id"))?;
        let rows = stmt
            .query_map([], supplier_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn suppliers_in_category(&self, category_id: i64) -> Result<Vec<Supplier>, StoreError> {
        let db = self.lock();
        let mut stmt = db.prepare(&format!(
            "SELECT {SUPPLIER_COLS} FROM suppliers WHERE category_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt
            .query_map(params![category_id], supplier_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn merge_supplier_profile(
        &self,
        ruc: &str,
        profile: &SupplierProfile,
    ) -> Result<(), StoreError> {
        let db = self.lock();
        let changed = db.execute(
            "UPDATE suppliers SET name = ?1, email = ?2, phone = ?3, country = ?4,
                    province = ?5, canton = ?6, address = ?7
             WHERE ruc = ?8",
            params![
                profile.legal_name,
                profile.email,
                profile.phone,
                profile.country,
                profile.province,
                profile.canton,
                profile.address,
                ruc
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::missing("supplier", ruc));
        }
        Ok(())
    }

    fn create_sweep(&self, process_id: i64) -> Result<SweepRecord, StoreError> {
        let started = Utc::now();
        let db = self.lock();
        db.execute(
            "INSERT INTO sweeps (process_id, state, started_at) VALUES (?1, ?2, ?3)",
            params![
                process_id,
                SweepState::Running.as_str(),
                started.to_rfc3339()
            ],
        )?;
        Ok(SweepRecord {
            id: db.last_insert_rowid(),
            process_id,
            state: SweepState::Running,
            started_at: started,
            finished_at: None,
        })
    }

    fn finalize_sweep(&self, sweep_id: i64) -> Result<(), StoreError> {
        let db = self.lock();
        let changed = db.execute(
            "UPDATE sweeps SET state = ?1, finished_at = ?2 WHERE id = ?3",
            params![
                SweepState::Completed.as_str(),
                Utc::now().to_rfc3339(),
                sweep_id
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::missing("sweep", sweep_id));
        }
        Ok(())
    }

    fn sweeps_for_process(&self, process_id: i64) -> Result<Vec<SweepRecord>, StoreError> {
        let db = self.lock();
        let mut stmt = db.prepare(
            "SELECT id, process_id, state, started_at, finished_at
             FROM sweeps WHERE process_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![process_id], sweep_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn record_outcome(
        &self,
        sweep_id: i64,
        ruc: &str,
        status: OfferStatus,
    ) -> Result<(), StoreError> {
        let db = self.lock();
        db.execute(
            "INSERT INTO supplier_results (sweep_id, supplier_ruc, status) VALUES (?1, ?2, ?3)",
            params![sweep_id, ruc, status.as_str()],
        )?;
        Ok(())
    }

    fn add_line_item(
        &self,
        sweep_id: i64,
        ruc: &str,
        supplier_name: &str,
        item: &OfferItem,
    ) -> Result<(), StoreError> {
        let db = self.lock();
        db.execute(
            "INSERT INTO line_items (sweep_id, supplier_ruc, supplier_name, item_number, cpc,
                    description, unit, quantity, unit_value, total_value, collected_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                sweep_id,
                ruc,
                supplier_name,
                item.number,
                item.cpc,
                item.description,
                item.unit,
                item.quantity,
                item.unit_value,
                item.total_value,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn add_attachment(
        &self,
        sweep_id: i64,
        ruc: &str,
        attachment: &OfferAttachment,
    ) -> Result<(), StoreError> {
        let db = self.lock();
        db.execute(
            "INSERT INTO attachments (sweep_id, supplier_ruc, name, url, collected_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                sweep_id,
                ruc,
                attachment.name,
                attachment.url,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }

    fn line_items(&self, sweep_id: i64) -> Result<Vec<LineItemRecord>, StoreError> {
        let db = self.lock();
        let mut stmt = db.prepare(
            "SELECT id, sweep_id, supplier_ruc, supplier_name, item_number, cpc, description,
                    unit, quantity, unit_value, total_value, collected_at
             FROM line_items WHERE sweep_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![sweep_id], |row| {
                let collected: String = row.get(11)?;
                Ok(LineItemRecord {
                    id: row.get(0)?,
                    sweep_id: row.get(1)?,
                    supplier_ruc: row.get(2)?,
                    supplier_name: row.get(3)?,
                    item_number: row.get(4)?,
                    cpc: row.get(5)?,
                    description: row.get(6)?,
                    unit: row.get(7)?,
                    quantity: row.get(8)?,
                    unit_value: row.get(9)?,
                    total_value: row.get(10)?,
                    collected_at: parse_ts(&collected),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn attachments(&self, sweep_id: i64) -> Result<Vec<AttachmentRecord>, StoreError> {
        let db = self.lock();
        let mut stmt = db.prepare(
            "SELECT id, sweep_id, supplier_ruc, name, url, collected_at
             FROM attachments WHERE sweep_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![sweep_id], |row| {
                let collected: String = row.get(5)?;
                Ok(AttachmentRecord {
                    id: row.get(0)?,
                    sweep_id: row.get(1)?,
                    supplier_ruc: row.get(2)?,
                    name: row.get(3)?,
                    url: row.get(4)?,
                    collected_at: parse_ts(&collected),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn outcomes(&self, sweep_id: i64) -> Result<Vec<SupplierResultRecord>, StoreError> {
        let db = self.lock();
        let mut stmt = db.prepare(
            "SELECT sweep_id, supplier_ruc, status FROM supplier_results
             WHERE sweep_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map(params![sweep_id], |row| {
                let status: String = row.get(2)?;
                Ok(SupplierResultRecord {
                    sweep_id: row.get(0)?,
                    supplier_ruc: row.get(1)?,
                    status: status.parse().unwrap_or(OfferStatus::Error),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn seeded() -> (SqliteStore, Category, Process, Supplier) {
        let store = SqliteStore::open_in_memory().unwrap();
        let cat = store.add_category("Ferretería").unwrap();
        let process = store.add_process("ABC-123,", cat.id).unwrap();
        let supplier = store.add_supplier("1790012345001", cat.id).unwrap();
        (store, cat, process, supplier)
    }

    #[test]
    fn test_open_on_disk_and_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("proforma.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.add_category("Obras").unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        let cats = store.categories().unwrap();
        assert_eq!(cats.len(), 1);
        assert_eq!(cats[0].name, "Obras");
    }

    #[test]
    fn test_duplicate_ruc_conflicts() {
        let (store, cat, _, _) = seeded();
        let err = store.add_supplier("1790012345001", cat.id).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn test_process_missing_category_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.add_process("X", 99).unwrap_err();
        assert!(matches!(err, StoreError::MissingRecord { .. }));
    }

    #[test]
    fn test_display_code_write_visible() {
        let (store, _, process, _) = seeded();
        store.set_display_code(process.id, "NIC-637055-2024-2").unwrap();
        let got = store.process(process.id).unwrap().unwrap();
        assert_eq!(got.display_code.as_deref(), Some("NIC-637055-2024-2"));
    }

    #[test]
    fn test_sweep_lifecycle_round_trip() {
        let (store, _, process, _) = seeded();
        let sweep = store.create_sweep(process.id).unwrap();
        assert_eq!(sweep.state, SweepState::Running);

        store.finalize_sweep(sweep.id).unwrap();
        let sweeps = store.sweeps_for_process(process.id).unwrap();
        assert_eq!(sweeps.len(), 1);
        assert_eq!(sweeps[0].state, SweepState::Completed);
        assert!(sweeps[0].finished_at.is_some());
    }

    #[test]
    fn test_line_items_and_attachments_round_trip() {
        let (store, _, process, supplier) = seeded();
        let sweep = store.create_sweep(process.id).unwrap();

        let item = OfferItem {
            number: "1".into(),
            cpc: "43230".into(),
            description: "[43230] Cemento - saco 50kg".into(),
            unit: "Saco".into(),
            quantity: 10.0,
            unit_value: 8.5,
            total_value: 85.0,
        };
        store
            .add_line_item(sweep.id, &supplier.ruc, "ACME", &item)
            .unwrap();
        store
            .add_attachment(
                sweep.id,
                &supplier.ruc,
                &OfferAttachment {
                    name: "Oferta firmada".into(),
                    url: "https://www.compraspublicas.gob.ec/e/ExeGENBajarArchivoGeneral?id=1"
                        .into(),
                },
            )
            .unwrap();
        store
            .record_outcome(sweep.id, &supplier.ruc, OfferStatus::Ok)
            .unwrap();

        let items = store.line_items(sweep.id).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].total_value, 85.0);
        assert_eq!(items[0].supplier_name, "ACME");

        let attachments = store.attachments(sweep.id).unwrap();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].name, "Oferta firmada");

        let outcomes = store.outcomes(sweep.id).unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, OfferStatus::Ok);
    }

    #[test]
    fn test_merge_profile_updates_supplier() {
        let (store, cat, _, supplier) = seeded();
        let profile = SupplierProfile {
            ruc: supplier.ruc.clone(),
            legal_name: "FERRETERIA ANDINA CIA. LTDA.".into(),
            email: "ventas@andina.ec".into(),
            phone: "022555555".into(),
            country: "Ecuador".into(),
            province: "Pichincha".into(),
            canton: "Quito".into(),
            address: "Av. Amazonas N34-451".into(),
        };
        store.merge_supplier_profile(&supplier.ruc, &profile).unwrap();

        let suppliers = store.suppliers_in_category(cat.id).unwrap();
        assert_eq!(
            suppliers[0].name.as_deref(),
            Some("FERRETERIA ANDINA CIA. LTDA.")
        );
        assert_eq!(suppliers[0].canton.as_deref(), Some("Quito"));
    }

    #[test]
    fn test_delete_process_cascades() {
        let (store, _, process, supplier) = seeded();
        let sweep = store.create_sweep(process.id).unwrap();
        store
            .record_outcome(sweep.id, &supplier.ruc, OfferStatus::NoData)
            .unwrap();

        store.delete_process(process.id).unwrap();
        assert!(store.process(process.id).unwrap().is_none());
        assert!(store.sweeps_for_process(process.id).unwrap().is_empty());
    }
}
