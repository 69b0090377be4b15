use anyhow::Result;
use rusqlite::{Connection, OptionalExtension, params};

use crate::models::{ChatRow, MessageRow, ReactionRow, UserRow};
use crate::{Store, timestamp_now};

impl Store {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        name: &str,
        username: Option<&str>,
        image: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<()> {
        let now = timestamp_now();
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (id, name, username, image, password, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![id, name, username, image, password_hash, now],
            )?;
            Ok(())
        })
    }

    pub fn user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    pub fn user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    pub fn set_username(&self, id: &str, username: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "UPDATE users SET username = ?2 WHERE id = ?1",
                params![id, username],
            )?;
            Ok(())
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, username, image, password, created_at
                 FROM users ORDER BY created_at DESC, rowid DESC",
            )?;
            let rows = stmt
                .query_map([], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Chats --

    pub fn create_chat(&self, id: &str, user_a: &str, user_b: &str) -> Result<()> {
        let now = timestamp_now();
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO chats (id, user_a, user_b, last_message_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![id, user_a, user_b, now],
            )?;
            Ok(())
        })
    }

    pub fn chat_by_id(&self, id: &str) -> Result<Option<ChatRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_a, user_b, last_message_at, created_at
                     FROM chats WHERE id = ?1",
                    [id],
                    map_chat,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// The unordered-pair lookup behind idempotent chat creation: matches the
    /// pair in either stored order.
    pub fn chat_for_pair(&self, user_a: &str, user_b: &str) -> Result<Option<ChatRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, user_a, user_b, last_message_at, created_at
                     FROM chats
                     WHERE (user_a = ?1 AND user_b = ?2) OR (user_a = ?2 AND user_b = ?1)",
                    params![user_a, user_b],
                    map_chat,
                )
                .optional()?;
            Ok(row)
        })
    }

    pub fn chats_for_user(&self, user_id: &str) -> Result<Vec<ChatRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_a, user_b, last_message_at, created_at
                 FROM chats
                 WHERE user_a = ?1 OR user_b = ?1
                 ORDER BY last_message_at DESC, rowid DESC",
            )?;
            let rows = stmt
                .query_map([user_id], map_chat)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false if the chat didn't exist. Messages, seen rows, reactions
    /// and mutes go with it via cascades.
    pub fn delete_chat(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM chats WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    /// Flips the caller's mute row. Returns true when the chat is now muted.
    pub fn toggle_mute(&self, chat_id: &str, user_id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let removed = conn.execute(
                "DELETE FROM chat_mutes WHERE chat_id = ?1 AND user_id = ?2",
                params![chat_id, user_id],
            )?;
            if removed > 0 {
                return Ok(false);
            }
            conn.execute(
                "INSERT INTO chat_mutes (chat_id, user_id) VALUES (?1, ?2)",
                params![chat_id, user_id],
            )?;
            Ok(true)
        })
    }

    pub fn mutes_for_chat(&self, chat_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM chat_mutes WHERE chat_id = ?1 ORDER BY user_id",
            )?;
            let rows = stmt
                .query_map([chat_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Creates the message, seeds the sender into its seen set and bumps the
    /// chat's activity timestamp, all in one transaction.
    pub fn insert_message(
        &self,
        id: &str,
        chat_id: &str,
        sender_id: &str,
        body: Option<&str>,
        image: Option<&str>,
        reply_to: Option<&str>,
    ) -> Result<()> {
        let now = timestamp_now();
        self.with_conn_mut(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "INSERT INTO messages (id, chat_id, sender_id, body, image, reply_to, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, chat_id, sender_id, body, image, reply_to, now],
            )?;
            tx.execute(
                "INSERT INTO message_seen (message_id, user_id, seen_at) VALUES (?1, ?2, ?3)",
                params![id, sender_id, now],
            )?;
            tx.execute(
                "UPDATE chats SET last_message_at = ?2 WHERE id = ?1",
                params![chat_id, now],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn message_by_id(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, chat_id, sender_id, body, image, reply_to, created_at
                     FROM messages WHERE id = ?1",
                    [id],
                    map_message,
                )
                .optional()?;
            Ok(row)
        })
    }

    /// A page of messages, newest first. `offset` is in rows, not pages.
    pub fn messages_page(&self, chat_id: &str, limit: u32, offset: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, chat_id, sender_id, body, image, reply_to, created_at
                 FROM messages
                 WHERE chat_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt
                .query_map(params![chat_id, limit, offset], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn latest_message(&self, chat_id: &str) -> Result<Option<MessageRow>> {
        Ok(self.messages_page(chat_id, 1, 0)?.into_iter().next())
    }

    /// Returns false if the message didn't exist. Reactions and seen rows
    /// cascade; replies keep their row with `reply_to` nulled.
    pub fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let n = conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    /// Idempotent: returns true only when the user was newly added to the
    /// seen set. The set never shrinks.
    pub fn mark_seen(&self, message_id: &str, user_id: &str) -> Result<bool> {
        let now = timestamp_now();
        self.with_conn_mut(|conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO message_seen (message_id, user_id, seen_at)
                 VALUES (?1, ?2, ?3)",
                params![message_id, user_id, now],
            )?;
            Ok(n > 0)
        })
    }

    pub fn seen_for_message(&self, message_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT user_id FROM message_seen
                 WHERE message_id = ?1
                 ORDER BY seen_at, user_id",
            )?;
            let rows = stmt
                .query_map([message_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch seen rows for a page of messages as (message_id, user_id).
    pub fn seen_for_messages(&self, message_ids: &[String]) -> Result<Vec<(String, String)>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT message_id, user_id FROM message_seen
                 WHERE message_id IN ({})
                 ORDER BY seen_at, user_id",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Reactions --

    /// Toggle a reaction: removes if the (sender, message, body) row exists,
    /// inserts if not. Returns (added, id of the affected row).
    pub fn toggle_reaction(
        &self,
        id: &str,
        message_id: &str,
        sender_id: &str,
        body: &str,
    ) -> Result<(bool, Option<String>)> {
        let now = timestamp_now();
        self.with_conn_mut(|conn| {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT id FROM reactions
                     WHERE message_id = ?1 AND sender_id = ?2 AND body = ?3",
                    params![message_id, sender_id, body],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing_id) = existing {
                conn.execute("DELETE FROM reactions WHERE id = ?1", [&existing_id])?;
                Ok((false, Some(existing_id)))
            } else {
                conn.execute(
                    "INSERT INTO reactions (id, message_id, sender_id, body, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![id, message_id, sender_id, body, now],
                )?;
                Ok((true, Some(id.to_string())))
            }
        })
    }

    pub fn reactions_for_message(&self, message_id: &str) -> Result<Vec<ReactionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, message_id, sender_id, body, created_at
                 FROM reactions
                 WHERE message_id = ?1
                 ORDER BY created_at, rowid",
            )?;
            let rows = stmt
                .query_map([message_id], map_reaction)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Batch-fetch reactions for a page of messages.
    pub fn reactions_for_messages(&self, message_ids: &[String]) -> Result<Vec<ReactionRow>> {
        if message_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=message_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT id, message_id, sender_id, body, created_at
                 FROM reactions WHERE message_id IN ({})
                 ORDER BY created_at, rowid",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = message_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), map_reaction)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

// -- Row mapping --

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        name: row.get(1)?,
        username: row.get(2)?,
        image: row.get(3)?,
        password: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn map_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatRow> {
    Ok(ChatRow {
        id: row.get(0)?,
        user_a: row.get(1)?,
        user_b: row.get(2)?,
        last_message_at: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn map_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        sender_id: row.get(2)?,
        body: row.get(3)?,
        image: row.get(4)?,
        reply_to: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_reaction(row: &rusqlite::Row<'_>) -> rusqlite::Result<ReactionRow> {
    Ok(ReactionRow {
        id: row.get(0)?,
        message_id: row.get(1)?,
        sender_id: row.get(2)?,
        body: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn query_user_by_id(conn: &Connection, id: &str) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            "SELECT id, name, username, image, password, created_at
             FROM users WHERE id = ?1",
            [id],
            map_user,
        )
        .optional()?;
    Ok(row)
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let row = conn
        .query_row(
            "SELECT id, name, username, image, password, created_at
             FROM users WHERE username = ?1",
            [username],
            map_user,
        )
        .optional()?;
    Ok(row)
}
