// 🗄️ Persistence - SQLite key-value snapshot + audit trail
//
// The ledger is stored as two independent JSON lists under the keys
// "participants" and "expenses", plus a SHA-256 "checksum" over both.
// The selected payer lives under "default_payer" (JSON string or null).
// Every save overwrites the previous snapshot inside one transaction.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

use crate::ledger::{Expense, Ledger, LedgerSnapshot};

pub const KEY_PARTICIPANTS: &str = "participants";
pub const KEY_EXPENSES: &str = "expenses";
pub const KEY_CHECKSUM: &str = "checksum";
pub const KEY_DEFAULT_PAYER: &str = "default_payer";

// ============================================================================
// AUDIT EVENTS
// ============================================================================

/// One ledger mutation, appended to the audit trail.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
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

    pub fn participant_added(name: &str, actor: &str) -> Self {
        Self::new("participant_added", "participant", name, serde_json::json!({}), actor)
    }

    pub fn participant_removed(name: &str, actor: &str) -> Self {
        Self::new("participant_removed", "participant", name, serde_json::json!({}), actor)
    }

    pub fn expense_added(expense: &Expense, actor: &str) -> Self {
        Self::new(
            "expense_added",
            "expense",
            &expense.id.to_string(),
            serde_json::json!({
                "amount": expense.amount,
                "payer": expense.payer,
                "participants": expense.participants,
                "description": expense.description,
            }),
            actor,
        )
    }

    pub fn expense_removed(expense: &Expense, actor: &str) -> Self {
        Self::new(
            "expense_removed",
            "expense",
            &expense.id.to_string(),
            serde_json::json!({
                "amount": expense.amount,
                "payer": expense.payer,
            }),
            actor,
        )
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Open (or create) the database file and make sure the schema exists.
pub fn open_database(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database {}", path.display()))?;
    setup_database(&conn)?;
    info!(path = %path.display(), "database ready");
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS snapshot (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

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

// ============================================================================
// SNAPSHOT
// ============================================================================

/// SHA-256 over both lists, hex encoded.
pub fn snapshot_checksum(participants_json: &str, expenses_json: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(participants_json.as_bytes());
    hasher.update([0u8]);
    hasher.update(expenses_json.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn save_snapshot(conn: &Connection, snapshot: &LedgerSnapshot) -> Result<()> {
    let participants_json = serde_json::to_string(&snapshot.participants)?;
    let expenses_json = serde_json::to_string(&snapshot.expenses)?;
    let payer_json = serde_json::to_string(&snapshot.default_payer)?;
    let checksum = snapshot_checksum(&participants_json, &expenses_json);
    let now = Utc::now().to_rfc3339();

    let tx = conn.unchecked_transaction()?;
    for (key, value) in [
        (KEY_PARTICIPANTS, &participants_json),
        (KEY_EXPENSES, &expenses_json),
        (KEY_CHECKSUM, &checksum),
        (KEY_DEFAULT_PAYER, &payer_json),
    ] {
        tx.execute(
            "INSERT INTO snapshot (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
    }
    tx.commit()?;

    debug!(
        participants = snapshot.participants.len(),
        expenses = snapshot.expenses.len(),
        "snapshot saved"
    );
    Ok(())
}

/// Load the stored snapshot. `None` when nothing was ever saved.
///
/// A missing list is read as empty; a present checksum must match.
pub fn load_snapshot(conn: &Connection) -> Result<Option<LedgerSnapshot>> {
    let participants_json = get_value(conn, KEY_PARTICIPANTS)?;
    let expenses_json = get_value(conn, KEY_EXPENSES)?;

    if participants_json.is_none() && expenses_json.is_none() {
        return Ok(None);
    }

    let participants_json = participants_json.unwrap_or_else(|| "[]".to_string());
    let expenses_json = expenses_json.unwrap_or_else(|| "[]".to_string());

    if let Some(stored) = get_value(conn, KEY_CHECKSUM)? {
        let actual = snapshot_checksum(&participants_json, &expenses_json);
        if stored != actual {
            bail!("Snapshot checksum mismatch (stored {}, computed {})", stored, actual);
        }
    }

    let participants: Vec<String> = serde_json::from_str(&participants_json)
        .context("Failed to deserialize participants")?;
    let expenses: Vec<Expense> =
        serde_json::from_str(&expenses_json).context("Failed to deserialize expenses")?;
    let default_payer: Option<String> = match get_value(conn, KEY_DEFAULT_PAYER)? {
        Some(json) => serde_json::from_str(&json).context("Failed to deserialize default payer")?,
        None => None,
    };

    Ok(Some(LedgerSnapshot {
        participants,
        expenses,
        default_payer,
    }))
}

fn get_value(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM snapshot WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

pub fn save_ledger(conn: &Connection, ledger: &Ledger) -> Result<()> {
    save_snapshot(conn, &ledger.snapshot())
}

/// Load the stored ledger, or an empty one when nothing was saved yet.
pub fn load_ledger(conn: &Connection, currency: &str) -> Result<Ledger> {
    let mut ledger = match load_snapshot(conn)? {
        Some(snapshot) => Ledger::from_snapshot(snapshot).context("Stored ledger is invalid")?,
        None => Ledger::new(),
    };
    ledger.set_currency(currency);
    Ok(ledger)
}

// ============================================================================
// AUDIT TRAIL
// ============================================================================

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
         ORDER BY id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], row_to_event)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

/// Most recent events across all entities, newest first
pub fn get_recent_events(conn: &Connection, limit: usize) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         ORDER BY id DESC
         LIMIT ?1",
    )?;

    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let events = stmt
        .query_map(params![limit], row_to_event)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<Event> {
    let timestamp_str: String = row.get(1)?;
    let data_json: String = row.get(5)?;

    let timestamp = DateTime::parse_from_rfc3339(&timestamp_str)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Utc);
    let data = serde_json::from_str(&data_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Event {
        event_id: row.get(0)?,
        timestamp,
        event_type: row.get(2)?,
        entity_type: row.get(3)?,
        entity_id: row.get(4)?,
        data,
        actor: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn sample_ledger() -> Ledger {
        let mut ledger = Ledger::new();
        ledger.add_participant("A");
        ledger.add_participant("B");
        ledger.add_participant("C");
        ledger
            .add_expense(dec!(90), "A", &["A", "B", "C"], Some("Dinner"))
            .unwrap();
        ledger.add_expense(dec!(100), "B", &["A", "C"], None).unwrap();
        ledger
    }

    #[test]
    fn test_empty_database_loads_empty_ledger() {
        let conn = test_connection();

        assert!(load_snapshot(&conn).unwrap().is_none());

        let ledger = load_ledger(&conn, "$").unwrap();
        assert!(ledger.is_empty());
        assert_eq!(ledger.currency(), "$");
    }

    #[test]
    fn test_snapshot_round_trip() {
        let conn = test_connection();
        let ledger = sample_ledger();

        save_ledger(&conn, &ledger).unwrap();
        // Saving twice overwrites instead of duplicating keys
        save_ledger(&conn, &ledger).unwrap();

        let keys: i64 = conn
            .query_row("SELECT COUNT(*) FROM snapshot", [], |row| row.get(0))
            .unwrap();
        assert_eq!(keys, 4);

        let restored = load_ledger(&conn, "₹").unwrap();
        assert_eq!(restored.participants(), ledger.participants());
        assert_eq!(restored.expenses(), ledger.expenses());
        assert_eq!(restored.balances(), ledger.balances());

        println!("✅ Snapshot round trip: {} expenses", restored.expenses().len());
    }

    #[test]
    fn test_selected_payer_survives_reload() {
        let conn = test_connection();
        let mut ledger = Ledger::new();
        ledger.add_participant("A");
        ledger.add_participant("B");
        ledger.set_default_payer("B").unwrap();
        save_ledger(&conn, &ledger).unwrap();

        let mut restored = load_ledger(&conn, "₹").unwrap();
        assert_eq!(restored.default_payer(), Some("B"));

        let id = crate::command::ExpenseDraft::parse("10 - *")
            .unwrap()
            .apply(&mut restored)
            .unwrap();
        assert_eq!(restored.expense(id).unwrap().payer, "B");
        println!("✅ Default payer reload test PASSED");
    }

    #[test]
    fn test_tampered_snapshot_is_rejected() {
        let conn = test_connection();
        save_ledger(&conn, &sample_ledger()).unwrap();

        conn.execute(
            "UPDATE snapshot SET value = '[\"A\",\"B\",\"C\",\"Mallory\"]' WHERE key = ?1",
            params![KEY_PARTICIPANTS],
        )
        .unwrap();

        let err = load_snapshot(&conn).unwrap_err();
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_lists_are_independent_keys() {
        let conn = test_connection();
        conn.execute(
            "INSERT INTO snapshot (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![KEY_PARTICIPANTS, "[\"Solo\"]", Utc::now().to_rfc3339()],
        )
        .unwrap();

        // No expenses key and no checksum: participants alone still load
        let snapshot = load_snapshot(&conn).unwrap().unwrap();
        assert_eq!(snapshot.participants, vec!["Solo".to_string()]);
        assert!(snapshot.expenses.is_empty());
    }

    #[test]
    fn test_invalid_stored_ledger_is_an_error() {
        let conn = test_connection();
        let mut snapshot = sample_ledger().snapshot();
        snapshot.participants.retain(|p| p != "C");
        save_snapshot(&conn, &snapshot).unwrap();

        assert!(load_ledger(&conn, "₹").is_err());
    }

    #[test]
    fn test_event_log() {
        let conn = test_connection();
        let ledger = sample_ledger();
        let expense = &ledger.expenses()[0];

        insert_event(&conn, &Event::participant_added("A", "test_actor")).unwrap();
        insert_event(&conn, &Event::expense_added(expense, "test_actor")).unwrap();
        insert_event(&conn, &Event::expense_removed(expense, "test_actor")).unwrap();

        let events = get_events_for_entity(&conn, "expense", &expense.id.to_string()).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "expense_removed");
        assert_eq!(events[1].event_type, "expense_added");
        assert_eq!(events[1].data["payer"], "A");

        let recent = get_recent_events(&conn, 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].event_type, "expense_added");

        let all = get_recent_events(&conn, 10).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[2].entity_id, "A");
        assert_eq!(all[2].actor, "test_actor");

        println!("✅ Event log test PASSED");
    }
}
