use anyhow::Result;
use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};
use uuid::Uuid;

use souk_types::models::{ConversationKind, MessageKind, Principal};

use crate::Database;
use crate::models::{ConversationRow, parse_conversation_kind, parse_principal, parse_ts, parse_uuid};

/// Deterministic key for a direct pair: unordered, so both send directions
/// resolve to the same conversation.
pub fn direct_channel_key(a: Uuid, b: Uuid) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("dm_{lo}_{hi}")
}

fn read_row(row: &Row) -> rusqlite::Result<ConversationRow> {
    let id: String = row.get(0)?;
    let kind: String = row.get(1)?;
    let init_id: String = row.get(4)?;
    let init_kind: String = row.get(5)?;
    let created: String = row.get(6)?;
    let updated: String = row.get(7)?;
    Ok(ConversationRow {
        id: parse_uuid(&id, 0)?,
        kind: parse_conversation_kind(&kind, 1)?,
        channel_key: row.get(2)?,
        product_name: row.get(3)?,
        initiated_by: parse_principal(&init_id, &init_kind, 4)?,
        created_at: parse_ts(&created, 6)?,
        updated_at: parse_ts(&updated, 7)?,
    })
}

const ROW_COLS: &str = "id, kind, channel_key, product_name, initiated_by_id, initiated_by_kind, \
                        created_at, updated_at";

impl Database {
    pub fn conversation(&self, id: Uuid) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {ROW_COLS} FROM conversations WHERE id = ?1"),
                    [id.to_string()],
                    read_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn conversation_by_channel_key(
        &self,
        channel_key: &str,
        kind: ConversationKind,
    ) -> Result<Option<ConversationRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!(
                        "SELECT {ROW_COLS} FROM conversations
                         WHERE channel_key = ?1 AND kind = ?2"
                    ),
                    params![channel_key, kind.as_str()],
                    read_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// Atomic find-or-create for a direct pair. `INSERT OR IGNORE` against the
    /// unique channel key plus the re-select run inside one transaction, so
    /// two concurrent first messages converge on a single conversation.
    pub fn find_or_create_direct(&self, author: Uuid, receiver: Uuid) -> Result<ConversationRow> {
        let key = direct_channel_key(author, receiver);
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = Utc::now().to_rfc3339();
            let id = Uuid::new_v4();

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO conversations
                     (id, kind, channel_key, initiated_by_id, initiated_by_kind,
                      created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
                params![
                    id.to_string(),
                    ConversationKind::Direct.as_str(),
                    key,
                    author.to_string(),
                    "user",
                    now,
                ],
            )?;

            let row = tx.query_row(
                &format!("SELECT {ROW_COLS} FROM conversations WHERE channel_key = ?1"),
                [&key],
                read_row,
            )?;

            if inserted > 0 {
                for participant in [author, receiver] {
                    tx.execute(
                        "INSERT OR IGNORE INTO conversation_participants
                             (conversation_id, principal_id, principal_kind, joined_at)
                         VALUES (?1, ?2, 'user', ?3)",
                        params![row.id.to_string(), participant.to_string(), now],
                    )?;
                }
            }

            tx.commit()?;
            Ok(row)
        })
    }

    /// Find-or-create for a community/stake channel. Returns the row and
    /// whether this call created it (the creator seeds rooms and admins).
    pub fn find_or_create_channel(
        &self,
        channel_key: &str,
        kind: ConversationKind,
        product_name: &str,
        initiated_by: Principal,
        participants: &[Principal],
    ) -> Result<(ConversationRow, bool)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = Utc::now().to_rfc3339();
            let id = Uuid::new_v4();

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO conversations
                     (id, kind, channel_key, product_name, initiated_by_id,
                      initiated_by_kind, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                params![
                    id.to_string(),
                    kind.as_str(),
                    channel_key,
                    product_name,
                    initiated_by.id().to_string(),
                    initiated_by.kind().as_str(),
                    now,
                ],
            )?;

            let row = tx.query_row(
                &format!(
                    "SELECT {ROW_COLS} FROM conversations
                     WHERE channel_key = ?1 AND kind = ?2"
                ),
                params![channel_key, kind.as_str()],
                read_row,
            )?;

            if inserted > 0 {
                for participant in participants {
                    tx.execute(
                        "INSERT OR IGNORE INTO conversation_participants
                             (conversation_id, principal_id, principal_kind, joined_at)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![
                            row.id.to_string(),
                            participant.id().to_string(),
                            participant.kind().as_str(),
                            now,
                        ],
                    )?;
                }
            }

            tx.commit()?;
            Ok((row, inserted > 0))
        })
    }

    /// Idempotent append — the participant PK is the check-before-insert.
    pub fn append_participant(&self, conversation_id: Uuid, principal: Principal) -> Result<bool> {
        self.with_conn(|conn| {
            let added = conn.execute(
                "INSERT OR IGNORE INTO conversation_participants
                     (conversation_id, principal_id, principal_kind, joined_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    conversation_id.to_string(),
                    principal.id().to_string(),
                    principal.kind().as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(added > 0)
        })
    }

    /// Participants in join order.
    pub fn participants(&self, conversation_id: Uuid) -> Result<Vec<Principal>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT principal_id, principal_kind FROM conversation_participants
                 WHERE conversation_id = ?1 ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([conversation_id.to_string()], |row| {
                    let id: String = row.get(0)?;
                    let kind: String = row.get(1)?;
                    parse_principal(&id, &kind, 0)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Channel rooms to rejoin on connect: every group-kind conversation the
    /// principal participates in. Direct chats have no broadcast room.
    pub fn channel_rooms_for(&self, principal_id: Uuid) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.channel_key FROM conversations c
                 JOIN conversation_participants p ON p.conversation_id = c.id
                 WHERE p.principal_id = ?1 AND c.kind != ?2
                 ORDER BY c.rowid",
            )?;
            let rooms = stmt
                .query_map(
                    params![principal_id.to_string(), ConversationKind::Direct.as_str()],
                    |row| row.get::<_, String>(0),
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rooms)
        })
    }

    /// Conversation ids for one page of the principal's list, newest activity
    /// first, plus the unfiltered total.
    pub fn conversations_page(
        &self,
        principal_id: Uuid,
        kind: ConversationKind,
        page: u32,
        items_per_page: u32,
    ) -> Result<(Vec<Uuid>, u64)> {
        self.with_conn(|conn| {
            let total: u64 = conn.query_row(
                "SELECT COUNT(*) FROM conversations c
                 JOIN conversation_participants p ON p.conversation_id = c.id
                 WHERE p.principal_id = ?1 AND c.kind = ?2",
                params![principal_id.to_string(), kind.as_str()],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(
                "SELECT c.id FROM conversations c
                 JOIN conversation_participants p ON p.conversation_id = c.id
                 WHERE p.principal_id = ?1 AND c.kind = ?2
                 ORDER BY c.updated_at DESC
                 LIMIT ?3 OFFSET ?4",
            )?;
            let offset = (page.max(1) - 1) * items_per_page;
            let ids = stmt
                .query_map(
                    params![
                        principal_id.to_string(),
                        kind.as_str(),
                        items_per_page,
                        offset
                    ],
                    |row| {
                        let id: String = row.get(0)?;
                        parse_uuid(&id, 0)
                    },
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok((ids, total))
        })
    }

    /// Unread messages addressed to `reader` in one conversation.
    pub fn unread_count_in(
        &self,
        conversation_id: Uuid,
        reader: Principal,
        kind: MessageKind,
    ) -> Result<u64> {
        self.with_conn(|conn| {
            let addressed = match kind {
                MessageKind::DirectMessage => "m.receiver_id = ?2",
                _ => {
                    "EXISTS (SELECT 1 FROM message_receivers mr
                             WHERE mr.message_id = m.id AND mr.principal_id = ?2)"
                }
            };
            let sql = format!(
                "SELECT COUNT(*) FROM messages m
                 WHERE m.conversation_id = ?1 AND m.kind = ?3 AND {addressed}
                   AND NOT EXISTS (SELECT 1 FROM message_read_by rb
                                   WHERE rb.message_id = m.id AND rb.principal_id = ?2)"
            );
            let count: u64 = conn.query_row(
                &sql,
                params![
                    conversation_id.to_string(),
                    reader.id().to_string(),
                    kind.as_str()
                ],
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
    fn direct_key_is_order_independent() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(direct_channel_key(a, b), direct_channel_key(b, a));
    }

    #[test]
    fn concurrent_first_messages_share_one_direct_conversation() {
        let db = Database::open_in_memory().unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        // Both sides resolve "first", as with two racing senders.
        let from_a = db.find_or_create_direct(a, b).unwrap();
        let from_b = db.find_or_create_direct(b, a).unwrap();

        assert_eq!(from_a.id, from_b.id);
        let participants = db.participants(from_a.id).unwrap();
        assert_eq!(participants.len(), 2);
        assert_eq!(participants[0], Principal::User(a));
        assert_eq!(participants[1], Principal::User(b));
    }

    #[test]
    fn initiator_append_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let owner = Principal::User(Uuid::new_v4());
        let joiner = Principal::User(Uuid::new_v4());

        let (row, created) = db
            .find_or_create_channel(
                "com_Widget_1",
                ConversationKind::Community,
                "Widget",
                owner,
                &[owner],
            )
            .unwrap();
        assert!(created);

        assert!(db.append_participant(row.id, joiner).unwrap());
        assert!(!db.append_participant(row.id, joiner).unwrap());
        assert_eq!(db.participants(row.id).unwrap().len(), 2);
    }

    #[test]
    fn channel_rooms_exclude_direct_conversations() {
        let db = Database::open_in_memory().unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        db.find_or_create_direct(a, b).unwrap();
        db.find_or_create_channel(
            "stake_Widget_1",
            ConversationKind::Stake,
            "Widget",
            Principal::User(a),
            &[Principal::User(a)],
        )
        .unwrap();

        assert_eq!(db.channel_rooms_for(a).unwrap(), vec!["stake_Widget_1"]);
    }
}
