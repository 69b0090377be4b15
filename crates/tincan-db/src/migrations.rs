use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            name        TEXT NOT NULL,
            username    TEXT UNIQUE,
            image       TEXT,
            password    TEXT,
            created_at  TEXT NOT NULL
        );

        -- Exactly two participants per chat; the unordered pair is unique,
        -- which chat_for_pair enforces by checking both stored orders.
        CREATE TABLE IF NOT EXISTS chats (
            id               TEXT PRIMARY KEY,
            user_a           TEXT NOT NULL REFERENCES users(id),
            user_b           TEXT NOT NULL REFERENCES users(id),
            last_message_at  TEXT NOT NULL,
            created_at       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chats_pair
            ON chats(user_a, user_b);
        CREATE INDEX IF NOT EXISTS idx_chats_activity
            ON chats(last_message_at);

        CREATE TABLE IF NOT EXISTS chat_mutes (
            chat_id     TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id),
            PRIMARY KEY (chat_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            chat_id     TEXT NOT NULL REFERENCES chats(id) ON DELETE CASCADE,
            sender_id   TEXT NOT NULL REFERENCES users(id),
            body        TEXT,
            image       TEXT,
            reply_to    TEXT REFERENCES messages(id) ON DELETE SET NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_chat
            ON messages(chat_id, created_at);

        CREATE TABLE IF NOT EXISTS message_seen (
            message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            user_id     TEXT NOT NULL REFERENCES users(id),
            seen_at     TEXT NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS reactions (
            id          TEXT PRIMARY KEY,
            message_id  TEXT NOT NULL REFERENCES messages(id) ON DELETE CASCADE,
            sender_id   TEXT NOT NULL REFERENCES users(id),
            body        TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            UNIQUE(message_id, sender_id, body)
        );

        CREATE INDEX IF NOT EXISTS idx_reactions_message
            ON reactions(message_id);
        ",
    )?;

    info!("Store migrations complete");
    Ok(())
}
