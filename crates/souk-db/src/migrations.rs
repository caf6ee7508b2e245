use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            full_name       TEXT NOT NULL DEFAULT '',
            profile_picture TEXT,
            audience        TEXT NOT NULL DEFAULT 'buyer',
            status          TEXT NOT NULL DEFAULT 'active',
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS admins (
            id              TEXT PRIMARY KEY,
            username        TEXT NOT NULL UNIQUE,
            full_name       TEXT NOT NULL DEFAULT '',
            profile_picture TEXT,
            status          TEXT NOT NULL DEFAULT 'active',
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS roles (
            id    TEXT PRIMARY KEY,
            name  TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS admin_roles (
            admin_id TEXT NOT NULL REFERENCES admins(id),
            role_id  TEXT NOT NULL REFERENCES roles(id),
            PRIMARY KEY (admin_id, role_id)
        );

        -- Persisted bearer sessions, written by the auth service and deleted
        -- here on moderation revoke. One live session per principal.
        CREATE TABLE IF NOT EXISTS auth_sessions (
            principal_id   TEXT NOT NULL,
            principal_kind TEXT NOT NULL,
            token          TEXT NOT NULL,
            created_at     TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (principal_id, principal_kind)
        );

        -- channel_key is the deterministic natural key per kind:
        -- dm_<min>_<max> for DIRECT, {com|stake}_<name>_<id> for channels.
        -- The UNIQUE index is what makes find-or-create atomic.
        CREATE TABLE IF NOT EXISTS conversations (
            id                TEXT PRIMARY KEY,
            kind              TEXT NOT NULL,
            channel_key       TEXT NOT NULL UNIQUE,
            product_name      TEXT,
            initiated_by_id   TEXT NOT NULL,
            initiated_by_kind TEXT NOT NULL,
            created_at        TEXT NOT NULL,
            updated_at        TEXT NOT NULL
        );

        -- Join order = insertion order (rowid); uniqueness by principal id.
        CREATE TABLE IF NOT EXISTS conversation_participants (
            conversation_id TEXT NOT NULL REFERENCES conversations(id),
            principal_id    TEXT NOT NULL,
            principal_kind  TEXT NOT NULL,
            joined_at       TEXT NOT NULL,
            PRIMARY KEY (conversation_id, principal_id)
        );

        CREATE INDEX IF NOT EXISTS idx_participants_principal
            ON conversation_participants(principal_id);

        CREATE TABLE IF NOT EXISTS messages (
            id                  TEXT PRIMARY KEY,
            conversation_id     TEXT NOT NULL REFERENCES conversations(id),
            author_id           TEXT NOT NULL,
            author_kind         TEXT NOT NULL,
            kind                TEXT NOT NULL,
            content             TEXT,
            receiver_id         TEXT,
            receiver_kind       TEXT,
            reaction            TEXT NOT NULL DEFAULT '',
            poll_question       TEXT,
            poll_allow_multiple INTEGER,
            created_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at);

        -- Receiver set snapshotted at send time; never recomputed.
        CREATE TABLE IF NOT EXISTS message_receivers (
            message_id     TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            principal_id   TEXT NOT NULL,
            principal_kind TEXT NOT NULL,
            PRIMARY KEY (message_id, principal_id)
        );

        -- Append-only; the PK is the not-already-present guard that makes
        -- mark-read idempotent.
        CREATE TABLE IF NOT EXISTS message_read_by (
            message_id     TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            principal_id   TEXT NOT NULL,
            principal_kind TEXT NOT NULL,
            read_at        TEXT NOT NULL,
            PRIMARY KEY (message_id, principal_id)
        );

        -- Group reactions: at most one entry per sender, updated in place.
        CREATE TABLE IF NOT EXISTS message_reactions (
            message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            sender_id   TEXT NOT NULL,
            sender_kind TEXT NOT NULL,
            reaction    TEXT NOT NULL,
            PRIMARY KEY (message_id, sender_id)
        );

        CREATE TABLE IF NOT EXISTS poll_options (
            id         TEXT PRIMARY KEY,
            message_id TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            label      TEXT NOT NULL,
            ord        INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_poll_options_message
            ON poll_options(message_id);

        CREATE TABLE IF NOT EXISTS poll_votes (
            option_id  TEXT NOT NULL REFERENCES poll_options(id) ON DELETE CASCADE,
            voter_id   TEXT NOT NULL,
            voter_kind TEXT NOT NULL,
            PRIMARY KEY (option_id, voter_id)
        );

        CREATE TABLE IF NOT EXISTS notifications (
            id           TEXT PRIMARY KEY,
            recipient_id TEXT NOT NULL,
            action_type  TEXT NOT NULL,
            title        TEXT NOT NULL,
            message      TEXT NOT NULL,
            is_read      INTEGER NOT NULL DEFAULT 0,
            created_at   TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notifications_recipient
            ON notifications(recipient_id, created_at);

        CREATE TABLE IF NOT EXISTS message_reports (
            id               TEXT PRIMARY KEY,
            message_id       TEXT NOT NULL,
            conversation_id  TEXT NOT NULL,
            reported_by_id   TEXT NOT NULL,
            reported_by_kind TEXT NOT NULL,
            reason           TEXT NOT NULL,
            details          TEXT,
            context          TEXT NOT NULL DEFAULT '[]',
            action_taken     TEXT,
            action_taken_by  TEXT,
            action_at        TEXT,
            created_at       TEXT NOT NULL
        );

        -- Seed the super-admin role referenced by channel seeding and fan-out
        INSERT OR IGNORE INTO roles (id, name)
            VALUES ('00000000-0000-0000-0000-000000000001', 'SUPER_ADMIN');
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
