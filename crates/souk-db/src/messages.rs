use anyhow::Result;
use chrono::Utc;
use rusqlite::{OptionalExtension, Row, params};
use uuid::Uuid;

use souk_types::models::{
    MessageKind, MessageView, PollOptionView, PollSpec, PollView, Principal, ReactionEntry,
    UnreadFlags,
};

use crate::Database;
use crate::models::{MessageRow, parse_message_kind, parse_principal, parse_ts, parse_uuid};

const MSG_COLS: &str = "id, conversation_id, author_id, author_kind, kind, content, \
                        receiver_id, receiver_kind, reaction, poll_question, \
                        poll_allow_multiple, created_at";

fn read_message_row(row: &Row) -> rusqlite::Result<MessageRow> {
    let id: String = row.get(0)?;
    let conversation_id: String = row.get(1)?;
    let author_id: String = row.get(2)?;
    let author_kind: String = row.get(3)?;
    let kind: String = row.get(4)?;
    let receiver_id: Option<String> = row.get(6)?;
    let receiver_kind: Option<String> = row.get(7)?;
    let created_at: String = row.get(11)?;

    let receiver = match (receiver_id, receiver_kind) {
        (Some(id), Some(kind)) => Some(parse_principal(&id, &kind, 6)?),
        _ => None,
    };

    Ok(MessageRow {
        id: parse_uuid(&id, 0)?,
        conversation_id: parse_uuid(&conversation_id, 1)?,
        author: parse_principal(&author_id, &author_kind, 2)?,
        kind: parse_message_kind(&kind, 4)?,
        content: row.get(5)?,
        receiver,
        reaction: row.get(8)?,
        poll_question: row.get(9)?,
        poll_allow_multiple: row.get::<_, Option<bool>>(10)?.unwrap_or(false),
        created_at: parse_ts(&created_at, 11)?,
    })
}

impl Database {
    // -- Inserts --

    pub fn insert_direct_message(
        &self,
        conversation_id: Uuid,
        author: Principal,
        receiver: Principal,
        content: &str,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = Utc::now().to_rfc3339();
            tx.execute(
                "INSERT INTO messages
                     (id, conversation_id, author_id, author_kind, kind, content,
                      receiver_id, receiver_kind, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id.to_string(),
                    conversation_id.to_string(),
                    author.id().to_string(),
                    author.kind().as_str(),
                    MessageKind::DirectMessage.as_str(),
                    content,
                    receiver.id().to_string(),
                    receiver.kind().as_str(),
                    now,
                ],
            )?;
            tx.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                params![now, conversation_id.to_string()],
            )?;
            tx.commit()?;
            Ok(id)
        })
    }

    /// Group message insert: message, receiver snapshot, and poll structure
    /// land in one transaction.
    pub fn insert_channel_message(
        &self,
        conversation_id: Uuid,
        author: Principal,
        kind: MessageKind,
        content: Option<&str>,
        receivers: &[Principal],
        poll: Option<&PollSpec>,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let now = Utc::now().to_rfc3339();
            tx.execute(
                "INSERT INTO messages
                     (id, conversation_id, author_id, author_kind, kind, content,
                      poll_question, poll_allow_multiple, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    id.to_string(),
                    conversation_id.to_string(),
                    author.id().to_string(),
                    author.kind().as_str(),
                    kind.as_str(),
                    content,
                    poll.map(|p| p.question.as_str()),
                    poll.map(|p| p.allow_multiple),
                    now,
                ],
            )?;

            for receiver in receivers {
                tx.execute(
                    "INSERT OR IGNORE INTO message_receivers
                         (message_id, principal_id, principal_kind)
                     VALUES (?1, ?2, ?3)",
                    params![
                        id.to_string(),
                        receiver.id().to_string(),
                        receiver.kind().as_str()
                    ],
                )?;
            }

            if let Some(poll) = poll {
                for (ord, label) in poll.options.iter().enumerate() {
                    tx.execute(
                        "INSERT INTO poll_options (id, message_id, label, ord)
                         VALUES (?1, ?2, ?3, ?4)",
                        params![
                            Uuid::new_v4().to_string(),
                            id.to_string(),
                            label,
                            ord as i64
                        ],
                    )?;
                }
            }

            tx.execute(
                "UPDATE conversations SET updated_at = ?1 WHERE id = ?2",
                params![now, conversation_id.to_string()],
            )?;
            tx.commit()?;
            Ok(id)
        })
    }

    // -- Lookups --

    pub fn message_row(&self, id: Uuid) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {MSG_COLS} FROM messages WHERE id = ?1"),
                    [id.to_string()],
                    read_message_row,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn receivers_of(&self, message_id: Uuid) -> Result<Vec<Principal>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT principal_id, principal_kind FROM message_receivers
                 WHERE message_id = ?1 ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([message_id.to_string()], |row| {
                    let id: String = row.get(0)?;
                    let kind: String = row.get(1)?;
                    parse_principal(&id, &kind, 0)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn read_by_of(&self, message_id: Uuid) -> Result<Vec<Principal>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT principal_id, principal_kind FROM message_read_by
                 WHERE message_id = ?1 ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([message_id.to_string()], |row| {
                    let id: String = row.get(0)?;
                    let kind: String = row.get(1)?;
                    parse_principal(&id, &kind, 0)
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Re-read a message with display fields resolved for client rendering.
    pub fn message_view(&self, id: Uuid) -> Result<Option<MessageView>> {
        let Some(row) = self.message_row(id)? else {
            return Ok(None);
        };

        let receiver = row.receiver.map(|r| self.profile_or_unknown(r));
        let receivers = self
            .receivers_of(id)?
            .into_iter()
            .map(|p| self.profile_or_unknown(p))
            .collect();
        let pool = if row.poll_question.is_some() {
            self.poll_view(id)?
        } else {
            None
        };

        Ok(Some(MessageView {
            id: row.id,
            conversation_id: row.conversation_id,
            kind: row.kind,
            content: row.content,
            author: self.profile_or_unknown(row.author),
            receiver,
            receivers,
            read_by: self.read_by_of(id)?,
            reaction: row.reaction,
            reactions: self.reactions_for(id)?,
            pool,
            created_at: row.created_at,
        }))
    }

    /// One page of a conversation's messages, newest first, plus the total.
    pub fn messages_page(
        &self,
        conversation_id: Uuid,
        kind: MessageKind,
        page: u32,
        items_per_page: u32,
    ) -> Result<(Vec<Uuid>, u64)> {
        self.with_conn(|conn| {
            let total: u64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE conversation_id = ?1 AND kind = ?2",
                params![conversation_id.to_string(), kind.as_str()],
                |row| row.get(0),
            )?;

            let mut stmt = conn.prepare(
                "SELECT id FROM messages
                 WHERE conversation_id = ?1 AND kind = ?2
                 ORDER BY rowid DESC LIMIT ?3 OFFSET ?4",
            )?;
            let offset = (page.max(1) - 1) * items_per_page;
            let ids = stmt
                .query_map(
                    params![
                        conversation_id.to_string(),
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

    /// Latest message id of a conversation, if any.
    pub fn last_message_id(&self, conversation_id: Uuid, kind: MessageKind) -> Result<Option<Uuid>> {
        self.with_conn(|conn| {
            let id: Option<String> = conn
                .query_row(
                    "SELECT id FROM messages
                     WHERE conversation_id = ?1 AND kind = ?2
                     ORDER BY rowid DESC LIMIT 1",
                    params![conversation_id.to_string(), kind.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(id.and_then(|s| Uuid::parse_str(&s).ok()))
        })
    }

    /// The reported message plus up to 10 preceding ones (oldest first), for
    /// the report context capture.
    pub fn report_context(
        &self,
        conversation_id: Uuid,
        message_id: Uuid,
    ) -> Result<Vec<(Option<String>, Principal)>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT content, author_id, author_kind FROM messages
                 WHERE conversation_id = ?1
                   AND rowid <= (SELECT rowid FROM messages WHERE id = ?2)
                 ORDER BY rowid DESC LIMIT 11",
            )?;
            let mut rows = stmt
                .query_map(
                    params![conversation_id.to_string(), message_id.to_string()],
                    |row| {
                        let content: Option<String> = row.get(0)?;
                        let author_id: String = row.get(1)?;
                        let author_kind: String = row.get(2)?;
                        Ok((content, parse_principal(&author_id, &author_kind, 1)?))
                    },
                )?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }

    /// Deletes a message; receivers, read marks, reactions, and poll rows go
    /// with it via cascade.
    pub fn delete_message(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM messages WHERE id = ?1", [id.to_string()])?;
            Ok(changed > 0)
        })
    }

    // -- Read receipts --

    /// Marks one message read for `reader`, guarded by the conversation match
    /// and the read_by primary key. Returns false when already read.
    pub fn mark_message_read(
        &self,
        message_id: Uuid,
        conversation_id: Uuid,
        reader: Principal,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "INSERT OR IGNORE INTO message_read_by
                     (message_id, principal_id, principal_kind, read_at)
                 SELECT m.id, ?3, ?4, ?5 FROM messages m
                 WHERE m.id = ?1 AND m.conversation_id = ?2",
                params![
                    message_id.to_string(),
                    conversation_id.to_string(),
                    reader.id().to_string(),
                    reader.kind().as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(changed > 0)
        })
    }

    /// Bulk read-receipt: every message of `kind` in the conversation that is
    /// addressed to `reader` and not yet read. Idempotent — a second call
    /// inserts nothing.
    pub fn mark_conversation_read(
        &self,
        conversation_id: Uuid,
        reader: Principal,
        kind: MessageKind,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let addressed = match kind {
                MessageKind::DirectMessage => "m.receiver_id = ?3",
                _ => {
                    "EXISTS (SELECT 1 FROM message_receivers mr
                             WHERE mr.message_id = m.id AND mr.principal_id = ?3)"
                }
            };
            let sql = format!(
                "INSERT OR IGNORE INTO message_read_by
                     (message_id, principal_id, principal_kind, read_at)
                 SELECT m.id, ?3, ?4, ?5 FROM messages m
                 WHERE m.conversation_id = ?1 AND m.kind = ?2 AND {addressed}"
            );
            let inserted = conn.execute(
                &sql,
                params![
                    conversation_id.to_string(),
                    kind.as_str(),
                    reader.id().to_string(),
                    reader.kind().as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )?;
            Ok(inserted)
        })
    }

    /// Per-kind "has unread" buckets for the reader.
    pub fn unread_flags(&self, reader: Principal) -> Result<UnreadFlags> {
        self.with_conn(|conn| {
            let reader_id = reader.id().to_string();

            let direct: bool = conn.query_row(
                "SELECT EXISTS (
                     SELECT 1 FROM messages m
                     WHERE m.kind = 'DIRECT_MESSAGE' AND m.receiver_id = ?1
                       AND NOT EXISTS (SELECT 1 FROM message_read_by rb
                                       WHERE rb.message_id = m.id AND rb.principal_id = ?1))",
                [&reader_id],
                |row| row.get(0),
            )?;

            let group = |kind: &str| -> rusqlite::Result<bool> {
                conn.query_row(
                    "SELECT EXISTS (
                         SELECT 1 FROM messages m
                         JOIN message_receivers mr ON mr.message_id = m.id
                         WHERE m.kind = ?1 AND mr.principal_id = ?2
                           AND NOT EXISTS (SELECT 1 FROM message_read_by rb
                                           WHERE rb.message_id = m.id AND rb.principal_id = ?2))",
                    params![kind, reader_id],
                    |row| row.get(0),
                )
            };

            Ok(UnreadFlags {
                personal: direct,
                community: group("COM_CHAT_MESSAGE")?,
                stake: group("STAKE_CHAT_MESSAGE")?,
            })
        })
    }

    // -- Reactions --

    /// Direct-chat reaction: one scalar, last writer wins.
    pub fn set_direct_reaction(&self, message_id: Uuid, reaction: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE messages SET reaction = ?1 WHERE id = ?2",
                params![reaction, message_id.to_string()],
            )?;
            Ok(changed > 0)
        })
    }

    /// Group reaction: update the sender's entry in place, or append one.
    /// There is no removal path by design.
    pub fn upsert_group_reaction(
        &self,
        message_id: Uuid,
        sender: Principal,
        reaction: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO message_reactions (message_id, sender_id, sender_kind, reaction)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(message_id, sender_id)
                 DO UPDATE SET reaction = excluded.reaction",
                params![
                    message_id.to_string(),
                    sender.id().to_string(),
                    sender.kind().as_str(),
                    reaction,
                ],
            )?;
            Ok(())
        })
    }

    pub fn reactions_for(&self, message_id: Uuid) -> Result<Vec<ReactionEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT sender_id, sender_kind, reaction FROM message_reactions
                 WHERE message_id = ?1 ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([message_id.to_string()], |row| {
                    let id: String = row.get(0)?;
                    let kind: String = row.get(1)?;
                    Ok(ReactionEntry {
                        sender: parse_principal(&id, &kind, 0)?,
                        reaction: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Polls --

    /// Applies a vote against persisted state in one transaction. With
    /// `allow_multiple = false` the voter is first removed from every option
    /// of the message (mutual exclusion), then the target option is mutated
    /// per `checked`. The connection mutex plus this transaction serializes
    /// concurrent voters.
    pub fn cast_poll_vote(
        &self,
        message_id: Uuid,
        option_id: Uuid,
        voter: Principal,
        checked: bool,
        allow_multiple: bool,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            if !allow_multiple {
                tx.execute(
                    "DELETE FROM poll_votes WHERE voter_id = ?1 AND option_id IN
                         (SELECT id FROM poll_options WHERE message_id = ?2)",
                    params![voter.id().to_string(), message_id.to_string()],
                )?;
            }

            if checked {
                // The message_id guard keeps a stray option id from another
                // poll out of this one.
                tx.execute(
                    "INSERT OR IGNORE INTO poll_votes (option_id, voter_id, voter_kind)
                     SELECT id, ?2, ?3 FROM poll_options
                     WHERE id = ?1 AND message_id = ?4",
                    params![
                        option_id.to_string(),
                        voter.id().to_string(),
                        voter.kind().as_str(),
                        message_id.to_string(),
                    ],
                )?;
            } else {
                tx.execute(
                    "DELETE FROM poll_votes WHERE option_id = ?1 AND voter_id = ?2",
                    params![option_id.to_string(), voter.id().to_string()],
                )?;
            }

            tx.commit()?;
            Ok(())
        })
    }

    /// Removes the voter from every option of the message.
    pub fn clear_poll_votes(&self, message_id: Uuid, voter: Principal) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "DELETE FROM poll_votes WHERE voter_id = ?1 AND option_id IN
                     (SELECT id FROM poll_options WHERE message_id = ?2)",
                params![voter.id().to_string(), message_id.to_string()],
            )?;
            Ok(())
        })
    }

    pub fn poll_view(&self, message_id: Uuid) -> Result<Option<PollView>> {
        self.with_conn(|conn| {
            let header: Option<(String, bool)> = conn
                .query_row(
                    "SELECT poll_question, COALESCE(poll_allow_multiple, 0) FROM messages
                     WHERE id = ?1 AND poll_question IS NOT NULL",
                    [message_id.to_string()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((question, allow_multiple)) = header else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT id, label FROM poll_options WHERE message_id = ?1 ORDER BY ord",
            )?;
            let option_rows = stmt
                .query_map([message_id.to_string()], |row| {
                    let id: String = row.get(0)?;
                    Ok((parse_uuid(&id, 0)?, row.get::<_, String>(1)?))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut vote_stmt = conn.prepare(
                "SELECT voter_id, voter_kind FROM poll_votes
                 WHERE option_id = ?1 ORDER BY rowid",
            )?;
            let mut options = Vec::with_capacity(option_rows.len());
            for (id, label) in option_rows {
                let voters = vote_stmt
                    .query_map([id.to_string()], |row| {
                        let vid: String = row.get(0)?;
                        let vkind: String = row.get(1)?;
                        parse_principal(&vid, &vkind, 0)
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                options.push(PollOptionView { id, label, voters });
            }

            Ok(Some(PollView {
                question,
                options,
                allow_multiple,
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use souk_types::models::Audience;

    fn seed_direct(db: &Database) -> (Uuid, Principal, Principal) {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        db.create_user(a, "alia", "Alia", Audience::Buyer).unwrap();
        db.create_user(b, "badr", "Badr", Audience::Seller).unwrap();
        let conversation = db.find_or_create_direct(a, b).unwrap();
        (conversation.id, Principal::User(a), Principal::User(b))
    }

    fn seed_channel(db: &Database, members: &[Principal]) -> Uuid {
        let (row, _) = db
            .find_or_create_channel(
                "com_Widget_9",
                souk_types::models::ConversationKind::Community,
                "Widget",
                members[0],
                members,
            )
            .unwrap();
        row.id
    }

    #[test]
    fn mark_conversation_read_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let (conversation, author, reader) = seed_direct(&db);

        db.insert_direct_message(conversation, author, reader, "one")
            .unwrap();
        db.insert_direct_message(conversation, author, reader, "two")
            .unwrap();

        let first = db
            .mark_conversation_read(conversation, reader, MessageKind::DirectMessage)
            .unwrap();
        assert_eq!(first, 2);

        let second = db
            .mark_conversation_read(conversation, reader, MessageKind::DirectMessage)
            .unwrap();
        assert_eq!(second, 0);
    }

    #[test]
    fn direct_reaction_last_writer_wins() {
        let db = Database::open_in_memory().unwrap();
        let (conversation, author, receiver) = seed_direct(&db);
        let message = db
            .insert_direct_message(conversation, author, receiver, "hi")
            .unwrap();

        db.set_direct_reaction(message, "👍").unwrap();
        db.set_direct_reaction(message, "🔥").unwrap();

        let row = db.message_row(message).unwrap().unwrap();
        assert_eq!(row.reaction, "🔥");
    }

    #[test]
    fn group_reaction_keeps_one_entry_per_sender() {
        let db = Database::open_in_memory().unwrap();
        let a = Principal::User(Uuid::new_v4());
        let b = Principal::User(Uuid::new_v4());
        let conversation = seed_channel(&db, &[a, b]);
        let message = db
            .insert_channel_message(
                conversation,
                a,
                MessageKind::ComChatMessage,
                Some("hello"),
                &[b],
                None,
            )
            .unwrap();

        db.upsert_group_reaction(message, b, "👍").unwrap();
        db.upsert_group_reaction(message, b, "🎉").unwrap();
        db.upsert_group_reaction(message, a, "👀").unwrap();

        let reactions = db.reactions_for(message).unwrap();
        assert_eq!(reactions.len(), 2);
        assert_eq!(reactions[0].sender, b);
        assert_eq!(reactions[0].reaction, "🎉");
    }

    fn seed_poll(db: &Database, allow_multiple: bool) -> (Uuid, Vec<Uuid>) {
        let a = Principal::User(Uuid::new_v4());
        let conversation = seed_channel(db, &[a]);
        let message = db
            .insert_channel_message(
                conversation,
                a,
                MessageKind::ComChatMessage,
                None,
                &[],
                Some(&PollSpec {
                    question: "Ship it?".into(),
                    options: vec!["yes".into(), "no".into(), "later".into()],
                    allow_multiple,
                }),
            )
            .unwrap();
        let poll = db.poll_view(message).unwrap().unwrap();
        let options = poll.options.iter().map(|o| o.id).collect();
        (message, options)
    }

    #[test]
    fn single_choice_vote_lands_in_exactly_one_option() {
        let db = Database::open_in_memory().unwrap();
        let (message, options) = seed_poll(&db, false);
        let voter = Principal::User(Uuid::new_v4());

        db.cast_poll_vote(message, options[0], voter, true, false)
            .unwrap();
        db.cast_poll_vote(message, options[2], voter, true, false)
            .unwrap();

        let poll = db.poll_view(message).unwrap().unwrap();
        let holding: Vec<_> = poll
            .options
            .iter()
            .filter(|o| o.voters.contains(&voter))
            .collect();
        assert_eq!(holding.len(), 1);
        assert_eq!(holding[0].id, options[2]);
    }

    #[test]
    fn unchecking_removes_the_voter_everywhere() {
        let db = Database::open_in_memory().unwrap();
        let (message, options) = seed_poll(&db, false);
        let voter = Principal::User(Uuid::new_v4());

        db.cast_poll_vote(message, options[1], voter, true, false)
            .unwrap();
        db.cast_poll_vote(message, options[1], voter, false, false)
            .unwrap();

        let poll = db.poll_view(message).unwrap().unwrap();
        assert!(poll.options.iter().all(|o| !o.voters.contains(&voter)));
    }

    #[test]
    fn multi_choice_vote_leaves_other_options_alone() {
        let db = Database::open_in_memory().unwrap();
        let (message, options) = seed_poll(&db, true);
        let voter = Principal::Admin(Uuid::new_v4());

        db.cast_poll_vote(message, options[0], voter, true, true)
            .unwrap();
        db.cast_poll_vote(message, options[1], voter, true, true)
            .unwrap();

        let poll = db.poll_view(message).unwrap().unwrap();
        assert!(poll.options[0].voters.contains(&voter));
        assert!(poll.options[1].voters.contains(&voter));

        db.clear_poll_votes(message, voter).unwrap();
        let poll = db.poll_view(message).unwrap().unwrap();
        assert!(poll.options.iter().all(|o| o.voters.is_empty()));
    }

    #[test]
    fn unread_flags_bucket_by_kind() {
        let db = Database::open_in_memory().unwrap();
        let (direct_conversation, author, reader) = seed_direct(&db);
        db.insert_direct_message(direct_conversation, author, reader, "ping")
            .unwrap();

        let stake_conversation = {
            let (row, _) = db
                .find_or_create_channel(
                    "stake_Widget_3",
                    souk_types::models::ConversationKind::Stake,
                    "Widget",
                    author,
                    &[author, reader],
                )
                .unwrap();
            row.id
        };
        db.insert_channel_message(
            stake_conversation,
            author,
            MessageKind::StakeChatMessage,
            Some("update"),
            &[reader],
            None,
        )
        .unwrap();

        let flags = db.unread_flags(reader).unwrap();
        assert!(flags.personal);
        assert!(!flags.community);
        assert!(flags.stake);

        db.mark_conversation_read(direct_conversation, reader, MessageKind::DirectMessage)
            .unwrap();
        db.mark_conversation_read(stake_conversation, reader, MessageKind::StakeChatMessage)
            .unwrap();

        let flags = db.unread_flags(reader).unwrap();
        assert!(!flags.personal && !flags.community && !flags.stake);
    }

    #[test]
    fn author_unaddressed_messages_never_count_as_unread() {
        let db = Database::open_in_memory().unwrap();
        let (conversation, author, receiver) = seed_direct(&db);
        db.insert_direct_message(conversation, author, receiver, "hi")
            .unwrap();

        // The author is not in the receiver set of their own message.
        let flags = db.unread_flags(author).unwrap();
        assert!(!flags.personal);
    }
}
