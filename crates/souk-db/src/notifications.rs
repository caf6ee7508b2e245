use anyhow::Result;
use chrono::Utc;
use rusqlite::{Row, params};
use uuid::Uuid;

use souk_types::api::NotificationView;

use crate::Database;
use crate::models::{parse_ts, parse_uuid};

fn read_row(row: &Row) -> rusqlite::Result<NotificationView> {
    let id: String = row.get(0)?;
    let recipient: String = row.get(1)?;
    let created: String = row.get(6)?;
    Ok(NotificationView {
        id: parse_uuid(&id, 0)?,
        recipient_id: parse_uuid(&recipient, 1)?,
        action_type: row.get(2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        is_read: row.get(5)?,
        created_at: parse_ts(&created, 6)?,
    })
}

impl Database {
    pub fn create_notification(
        &self,
        recipient_id: Uuid,
        action_type: &str,
        title: &str,
        message: &str,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notifications
                     (id, recipient_id, action_type, title, message, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.to_string(),
                    recipient_id.to_string(),
                    action_type,
                    title,
                    message,
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(id)
        })
    }

    pub fn notifications_page(
        &self,
        recipient_id: Uuid,
        page: u32,
        items_per_page: u32,
    ) -> Result<(Vec<NotificationView>, u64)> {
        self.with_conn(|conn| {
            let total: u64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1",
                [recipient_id.to_string()],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(
                "SELECT id, recipient_id, action_type, title, message, is_read, created_at
                 FROM notifications
                 WHERE recipient_id = ?1
                 ORDER BY rowid DESC LIMIT ?2 OFFSET ?3",
            )?;
            let offset = (page.max(1) - 1) * items_per_page;
            let rows = stmt
                .query_map(
                    params![recipient_id.to_string(), items_per_page, offset],
                    read_row,
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((rows, total))
        })
    }

    /// Bulk mark-read: the only mutation notifications see after creation.
    pub fn mark_all_notifications_read(&self, recipient_id: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notifications SET is_read = 1 WHERE recipient_id = ?1 AND is_read = 0",
                [recipient_id.to_string()],
            )?;
            Ok(changed)
        })
    }

    pub fn notification_count(&self, recipient_id: Uuid) -> Result<u64> {
        self.with_conn(|conn| {
            let count: u64 = conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE recipient_id = ?1",
                [recipient_id.to_string()],
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_all_read_touches_only_unread_rows() {
        let db = Database::open_in_memory().unwrap();
        let recipient = Uuid::new_v4();
        db.create_notification(recipient, "KYC", "Heads up", "first")
            .unwrap();
        db.create_notification(recipient, "KYC", "Heads up", "second")
            .unwrap();

        assert_eq!(db.mark_all_notifications_read(recipient).unwrap(), 2);
        assert_eq!(db.mark_all_notifications_read(recipient).unwrap(), 0);

        let (rows, total) = db.notifications_page(recipient, 1, 10).unwrap();
        assert_eq!(total, 2);
        assert!(rows.iter().all(|n| n.is_read));
    }
}
