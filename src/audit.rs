// 📜 Audit Log - Every committed reconcile run is an event trail
//
//   runs   → one row per committed run (counts, backup, summary)
//   events → one row per added / updated / disputed creature
//
// Rows are staged in one SQLite transaction before the store is replaced
// and committed once the save succeeds; a failed save rolls them back.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Transaction};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::entities::DexNumber;
use crate::reconciliation::MergeReport;
use crate::store::BackupHandle;

/// Event for the audit trail
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Event {
    pub event_id: String,
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        run_id: &str,
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            run_id: run_id.to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

/// One committed run
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RunRecord {
    pub run_id: String,
    pub reconciled_at: DateTime<Utc>,
    pub added: i64,
    pub updated: i64,
    pub conflicts: i64,
    pub field_issues: i64,
    pub backup_path: Option<String>,
    pub summary: String,
}

/// Open (or create) the audit database at `path`
pub fn open(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create audit directory {:?}", parent))?;
    }
    let conn = Connection::open(path).with_context(|| format!("Failed to open audit db {:?}", path))?;
    setup_database(&conn)?;
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // ==========================================================================
    // Runs Table
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            reconciled_at TEXT NOT NULL,
            added INTEGER NOT NULL,
            updated INTEGER NOT NULL,
            conflicts INTEGER NOT NULL,
            field_issues INTEGER NOT NULL,
            backup_path TEXT,
            summary TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
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
            run_id TEXT NOT NULL,
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
        "CREATE INDEX IF NOT EXISTS idx_events_run ON events(run_id)",
        [],
    )?;

    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> Result<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, run_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            event.event_id,
            event.run_id,
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

/// A run whose audit rows are written but not yet committed
pub struct PendingRun<'conn> {
    tx: Transaction<'conn>,
    run_id: String,
    events: usize,
}

impl<'conn> PendingRun<'conn> {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Attach the backup taken by the save and commit; returns the event count
    pub fn commit(self, backup: Option<&BackupHandle>) -> Result<usize> {
        self.tx.execute(
            "UPDATE runs SET backup_path = ?1 WHERE run_id = ?2",
            params![backup.map(|b| b.path.display().to_string()), self.run_id],
        )?;
        self.tx.commit()?;
        Ok(self.events)
    }
}

/// Stage the run row and one event per added, updated or disputed creature.
/// Dropping the returned run without `commit` rolls everything back.
pub fn begin_run<'conn>(
    conn: &'conn mut Connection,
    report: &MergeReport,
    actor: &str,
) -> Result<PendingRun<'conn>> {
    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO runs (
            run_id, reconciled_at, added, updated, conflicts, field_issues, backup_path, summary
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL, ?7)",
        params![
            report.run_id,
            report.reconciled_at.to_rfc3339(),
            report.added_ids.len() as i64,
            report.updated_ids.len() as i64,
            report.conflicts.len() as i64,
            report.field_issues.len() as i64,
            report.summary(),
        ],
    )?;

    let mut events = Vec::new();
    for id in &report.added_ids {
        events.push(creature_event(report, "creature_added", *id, serde_json::json!({}), actor));
    }
    for id in &report.updated_ids {
        events.push(creature_event(report, "creature_updated", *id, serde_json::json!({}), actor));
    }
    for conflict in &report.conflicts {
        events.push(creature_event(
            report,
            "conflict_recorded",
            conflict.id,
            serde_json::to_value(conflict)?,
            actor,
        ));
    }
    for issue in &report.field_issues {
        events.push(creature_event(
            report,
            "field_issue",
            issue.id,
            serde_json::to_value(issue)?,
            actor,
        ));
    }

    for event in &events {
        insert_event(&tx, event)?;
    }

    Ok(PendingRun {
        tx,
        run_id: report.run_id.clone(),
        events: events.len(),
    })
}

/// Record an already committed run in one step
pub fn record_run(
    conn: &mut Connection,
    report: &MergeReport,
    backup: Option<&BackupHandle>,
    actor: &str,
) -> Result<usize> {
    begin_run(conn, report, actor)?.commit(backup)
}

fn creature_event(
    report: &MergeReport,
    event_type: &str,
    id: DexNumber,
    data: serde_json::Value,
    actor: &str,
) -> Event {
    Event::new(&report.run_id, event_type, "creature", &id.padded(), data, actor)
}

fn parse_timestamp(text: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e)))
}

/// Get events for one creature, newest first
pub fn get_events_for_creature(conn: &Connection, id: DexNumber) -> Result<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, run_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = 'creature' AND entity_id = ?1
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![id.padded()], |row| {
            let timestamp_str: String = row.get(2)?;
            let data_json: String = row.get(6)?;

            Ok(Event {
                event_id: row.get(0)?,
                run_id: row.get(1)?,
                timestamp: parse_timestamp(&timestamp_str)?,
                event_type: row.get(3)?,
                entity_type: row.get(4)?,
                entity_id: row.get(5)?,
                data: serde_json::from_str(&data_json).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
                })?,
                actor: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

/// Most recent runs first
pub fn list_runs(conn: &Connection, limit: usize) -> Result<Vec<RunRecord>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, reconciled_at, added, updated, conflicts, field_issues, backup_path, summary
         FROM runs
         ORDER BY id DESC
         LIMIT ?1",
    )?;

    let runs = stmt
        .query_map(params![limit as i64], |row| {
            let reconciled_at: String = row.get(1)?;
            Ok(RunRecord {
                run_id: row.get(0)?,
                reconciled_at: parse_timestamp(&reconciled_at)?,
                added: row.get(2)?,
                updated: row.get(3)?,
                conflicts: row.get(4)?,
                field_issues: row.get(5)?,
                backup_path: row.get(6)?,
                summary: row.get(7)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(runs)
}

// ============================================================================
// TESTS
// ============================================================================
