use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::founders::is_valid_tax_id;

/// PersistedRecord - one row of tracked state, keyed by INN
/// Column names follow the spreadsheet layout it replaces
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct PersistedRecord {
    #[serde(rename = "INN")]
    pub inn: String,

    #[serde(rename = "Name")]
    pub name: String,

    /// Canonical founder lines, sorted, newline-joined
    #[serde(rename = "Current founders")]
    pub current_founders: String,

    #[serde(rename = "Former founders")]
    pub former_founders: String,

    #[serde(rename = "Change date")]
    pub change_date: String,
}

impl PersistedRecord {
    /// Blank record for a freshly tracked INN
    pub fn empty(inn: &str) -> Self {
        PersistedRecord {
            inn: inn.to_string(),
            ..Default::default()
        }
    }
}

/// Event for audit trail: every founder change is recorded
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }

    /// Event about one tracked company
    pub fn company(event_type: &str, inn: &str, data: serde_json::Value, actor: &str) -> Self {
        Self::new(event_type, COMPANY_ENTITY, inn, data, actor)
    }
}

pub const COMPANY_ENTITY: &str = "company";

// ============================================================================
// STATE STORE
// ============================================================================

/// StateStore - where tracked companies and their founder state live
///
/// Records are addressed by INN, never by row position.
pub trait StateStore {
    /// Tracked INNs in the order they were added
    fn list_tracked_ids(&self) -> Result<Vec<String>>;

    fn get_record(&self, inn: &str) -> Result<Option<PersistedRecord>>;

    /// Overwrite the record of a tracked INN
    fn put_record(&self, inn: &str, record: &PersistedRecord) -> Result<()>;

    /// Append audit events (stores without an audit trail ignore them)
    fn record_events(&self, _events: &[Event]) -> Result<()> {
        Ok(())
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Companies Table (one row per tracked INN)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS companies (
            inn TEXT PRIMARY KEY NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL DEFAULT '',
            current_founders TEXT NOT NULL DEFAULT '',
            former_founders TEXT NOT NULL DEFAULT '',
            change_date TEXT NOT NULL DEFAULT '',
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_companies_position ON companies(position)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let timestamp_str: String = row.get(1)?;
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                    .map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
                    })?
                    .with_timezone(&Utc),
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
                })?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// SQLite-backed state store (the spreadsheet's replacement)
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        setup_database(&conn)?;
        debug!("Database opened: {}", path.display());
        Ok(SqliteStore { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        setup_database(&conn)?;
        Ok(SqliteStore { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Start tracking an INN; returns false when it was already tracked
    pub fn track(&self, inn: &str) -> Result<bool> {
        let inn = inn.trim();
        if !is_valid_tax_id(inn) {
            bail!("Not a valid INN: {:?}", inn);
        }

        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO companies (inn, position)
             VALUES (?1, (SELECT COALESCE(MAX(position), 0) + 1 FROM companies))",
            params![inn],
        )?;

        Ok(inserted > 0)
    }

    /// Every record in tracking order
    pub fn all_records(&self) -> Result<Vec<PersistedRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT inn, name, current_founders, former_founders, change_date
             FROM companies
             ORDER BY position, inn",
        )?;

        let records = stmt
            .query_map([], row_to_record)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Read tracked INNs from the first column of a CSV file (header row expected)
    ///
    /// Blank cells are skipped, invalid INNs are an error naming the line.
    pub fn import_tracked_csv(&self, csv_path: &Path) -> Result<usize> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(csv_path)
            .with_context(|| format!("Failed to open CSV file: {}", csv_path.display()))?;

        let mut added = 0;
        for (line_num, result) in rdr.records().enumerate() {
            let record = result.with_context(|| {
                format!("Failed to parse CSV line {} in {}", line_num + 2, csv_path.display())
            })?;

            let inn = record.get(0).unwrap_or("").trim();
            if inn.is_empty() {
                continue;
            }

            if self
                .track(inn)
                .with_context(|| format!("Line {} of {}", line_num + 2, csv_path.display()))?
            {
                added += 1;
            }
        }

        info!("Imported {} new INNs from {}", added, csv_path.display());
        Ok(added)
    }

    /// Write the spreadsheet view (INN, Name, Current founders, Former founders, Change date)
    pub fn export_csv(&self, csv_path: &Path) -> Result<usize> {
        let records = self.all_records()?;
        let mut wtr = csv::Writer::from_path(csv_path)
            .with_context(|| format!("Failed to create CSV file: {}", csv_path.display()))?;

        for record in &records {
            wtr.serialize(record)?;
        }
        wtr.flush()?;

        Ok(records.len())
    }

    /// Maintenance: blank founders and change date of every row, keep INN and name
    pub fn clear_founder_columns(&self) -> Result<usize> {
        let cleared = self.conn.execute(
            "UPDATE companies
             SET current_founders = '', former_founders = '', change_date = '', updated_at = ?1",
            params![Utc::now().to_rfc3339()],
        )?;

        info!("Cleared founder columns of {} companies", cleared);
        Ok(cleared)
    }

    pub fn events_for_company(&self, inn: &str) -> Result<Vec<Event>> {
        get_events_for_entity(&self.conn, COMPANY_ENTITY, inn)
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PersistedRecord> {
    Ok(PersistedRecord {
        inn: row.get(0)?,
        name: row.get(1)?,
        current_founders: row.get(2)?,
        former_founders: row.get(3)?,
        change_date: row.get(4)?,
    })
}

impl StateStore for SqliteStore {
    fn list_tracked_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT inn FROM companies ORDER BY position, inn")?;

        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(ids)
    }

    fn get_record(&self, inn: &str) -> Result<Option<PersistedRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT inn, name, current_founders, former_founders, change_date
                 FROM companies WHERE inn = ?1",
                params![inn],
                row_to_record,
            )
            .optional()?;

        Ok(record)
    }

    fn put_record(&self, inn: &str, record: &PersistedRecord) -> Result<()> {
        if record.inn != inn {
            bail!("Record for {} cannot be stored under {}", record.inn, inn);
        }

        let updated = self.conn.execute(
            "UPDATE companies
             SET name = ?2, current_founders = ?3, former_founders = ?4, change_date = ?5,
                 updated_at = ?6
             WHERE inn = ?1",
            params![
                inn,
                record.name,
                record.current_founders,
                record.former_founders,
                record.change_date,
                Utc::now().to_rfc3339(),
            ],
        )?;

        if updated == 0 {
            return Err(anyhow!("Company with INN {} is not tracked", inn));
        }

        Ok(())
    }

    fn record_events(&self, events: &[Event]) -> Result<()> {
        for event in events {
            insert_event(&self.conn, event)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn store_with(inns: &[&str]) -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        for inn in inns {
            store.track(inn).unwrap();
        }
        store
    }

    #[test]
    fn test_track_keeps_order_and_ignores_duplicates() {
        let store = store_with(&["7707083893", "7704256957"]);
        assert!(!store.track("7707083893").unwrap());

        let ids = store.list_tracked_ids().unwrap();
        assert_eq!(ids, vec!["7707083893", "7704256957"]);
    }

    #[test]
    fn test_track_rejects_invalid_inn() {
        let store = store_with(&[]);
        assert!(store.track("12345").is_err());
        assert!(store.track("ООО").is_err());
    }

    #[test]
    fn test_new_record_is_blank() {
        let store = store_with(&["7704256957"]);
        let record = store.get_record("7704256957").unwrap().unwrap();
        assert_eq!(record, PersistedRecord::empty("7704256957"));
        assert_eq!(store.get_record("7707083893").unwrap(), None);
    }

    #[test]
    fn test_put_and_get_record() {
        let store = store_with(&["7704256957"]);
        let record = PersistedRecord {
            inn: "7704256957".to_string(),
            name: "ООО \"РОМАШКА\"".to_string(),
            current_founders: "A - 111 - 01.01.2020\nB - 222 - 02.02.2020".to_string(),
            former_founders: "C - 333 - 03.03.2019".to_string(),
            change_date: "02.02.2020".to_string(),
        };

        store.put_record("7704256957", &record).unwrap();
        assert_eq!(store.get_record("7704256957").unwrap(), Some(record));
    }

    #[test]
    fn test_put_record_requires_tracking() {
        let store = store_with(&[]);
        let record = PersistedRecord::empty("7704256957");
        assert!(store.put_record("7704256957", &record).is_err());
    }

    #[test]
    fn test_put_record_rejects_mismatched_inn() {
        let store = store_with(&["7704256957", "7707083893"]);
        let record = PersistedRecord::empty("7707083893");
        assert!(store.put_record("7704256957", &record).is_err());
    }

    #[test]
    fn test_clear_founder_columns_keeps_name() {
        let store = store_with(&["7704256957"]);
        let record = PersistedRecord {
            inn: "7704256957".to_string(),
            name: "ООО \"РОМАШКА\"".to_string(),
            current_founders: "A - 111 - 01.01.2020".to_string(),
            former_founders: "C - 333 - 03.03.2019".to_string(),
            change_date: "01.01.2020".to_string(),
        };
        store.put_record("7704256957", &record).unwrap();

        assert_eq!(store.clear_founder_columns().unwrap(), 1);
        let cleared = store.get_record("7704256957").unwrap().unwrap();
        assert_eq!(cleared.name, "ООО \"РОМАШКА\"");
        assert!(cleared.current_founders.is_empty());
        assert!(cleared.former_founders.is_empty());
        assert!(cleared.change_date.is_empty());
    }

    #[test]
    fn test_import_and_export_csv() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("tracked.csv");
        fs::write(&input, "INN,Name\n7704256957,Ромашка\n\n7707083893\n7704256957,dup\n").unwrap();

        let store = store_with(&[]);
        assert_eq!(store.import_tracked_csv(&input).unwrap(), 2);
        assert_eq!(
            store.list_tracked_ids().unwrap(),
            vec!["7704256957", "7707083893"]
        );

        let output = dir.path().join("export.csv");
        assert_eq!(store.export_csv(&output).unwrap(), 2);
        let exported = fs::read_to_string(&output).unwrap();
        assert!(exported.starts_with("INN,Name,Current founders,Former founders,Change date"));
        assert!(exported.contains("7707083893"));
    }

    #[test]
    fn test_import_csv_reports_bad_line() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("tracked.csv");
        fs::write(&input, "INN\n7704256957\nnot-an-inn\n").unwrap();

        let store = store_with(&[]);
        let err = store.import_tracked_csv(&input).unwrap_err();
        assert!(format!("{:#}", err).contains("Line 3"));
    }

    #[test]
    fn test_events_round_trip_newest_first() {
        let store = store_with(&["7704256957"]);
        let first = Event::company(
            "founder_added",
            "7704256957",
            serde_json::json!({"founder": "A - 111 - 01.01.2020"}),
            "test",
        );
        let mut second = Event::company(
            "founder_removed",
            "7704256957",
            serde_json::json!({"founder": "B - 222 - 02.02.2020"}),
            "test",
        );
        second.timestamp = first.timestamp + chrono::Duration::seconds(1);

        store.record_events(&[first, second]).unwrap();

        let events = store.events_for_company("7704256957").unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "founder_removed");
        assert_eq!(events[1].data["founder"], "A - 111 - 01.01.2020");
        assert!(store.events_for_company("7707083893").unwrap().is_empty());
    }
}
