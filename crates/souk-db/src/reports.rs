use anyhow::Result;
use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};
use uuid::Uuid;

use souk_types::models::Principal;

use crate::Database;
use crate::models::{ReportRow, parse_principal, parse_ts, parse_uuid};

const ROW_COLS: &str = "id, message_id, conversation_id, reported_by_id, reported_by_kind, \
                        reason, details, context, action_taken, action_taken_by, action_at, \
                        created_at";

fn read_row(row: &Row) -> rusqlite::Result<ReportRow> {
    let id: String = row.get(0)?;
    let message_id: String = row.get(1)?;
    let conversation_id: String = row.get(2)?;
    let by_id: String = row.get(3)?;
    let by_kind: String = row.get(4)?;
    let actor: Option<String> = row.get(9)?;
    let action_at: Option<String> = row.get(10)?;
    let created: String = row.get(11)?;
    Ok(ReportRow {
        id: parse_uuid(&id, 0)?,
        message_id: parse_uuid(&message_id, 1)?,
        conversation_id: parse_uuid(&conversation_id, 2)?,
        reported_by: parse_principal(&by_id, &by_kind, 3)?,
        reason: row.get(5)?,
        details: row.get(6)?,
        context_json: row.get(7)?,
        action_taken: row.get(8)?,
        action_taken_by: actor.and_then(|s| Uuid::parse_str(&s).ok()),
        action_at: match action_at {
            Some(ts) => Some(parse_ts(&ts, 10)?),
            None => None,
        },
        created_at: parse_ts(&created, 11)?,
    })
}

impl Database {
    pub fn create_report(
        &self,
        message_id: Uuid,
        conversation_id: Uuid,
        reported_by: Principal,
        reason: &str,
        details: Option<&str>,
        context_json: &str,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO message_reports
                     (id, message_id, conversation_id, reported_by_id, reported_by_kind,
                      reason, details, context, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id.to_string(),
                    message_id.to_string(),
                    conversation_id.to_string(),
                    reported_by.id().to_string(),
                    reported_by.kind().as_str(),
                    reason,
                    details,
                    context_json,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(id)
        })
    }

    pub fn report(&self, id: Uuid) -> Result<Option<ReportRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {ROW_COLS} FROM message_reports WHERE id = ?1"),
                    [id.to_string()],
                    read_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Latest report filed against a message, if any.
    pub fn report_for_message(&self, message_id: Uuid) -> Result<Option<ReportRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {ROW_COLS} FROM message_reports
                         WHERE message_id = ?1 ORDER BY rowid DESC LIMIT 1"
                    ),
                    [message_id.to_string()],
                    read_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Records the moderation outcome (status, actor, timestamp) on a report.
    pub fn record_report_action(&self, report_id: Uuid, action: &str, actor: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE message_reports
                 SET action_taken = ?1, action_taken_by = ?2, action_at = ?3
                 WHERE id = ?4",
                params![
                    action,
                    actor.to_string(),
                    Utc::now().to_rfc3339(),
                    report_id.to_string(),
                ],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn reports_page(&self, page: u32, items_per_page: u32) -> Result<(Vec<ReportRow>, u64)> {
        self.with_conn(|conn| {
            let total: u64 =
                conn.query_row("SELECT COUNT(*) FROM message_reports", [], |row| row.get(0))?;

            let mut stmt = conn.prepare(&format!(
                "SELECT {ROW_COLS} FROM message_reports
                 ORDER BY rowid DESC LIMIT ?1 OFFSET ?2"
            ))?;
            let offset = (page.max(1) - 1) * items_per_page;
            let rows = stmt
                .query_map(params![items_per_page, offset], read_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((rows, total))
        })
    }
}
