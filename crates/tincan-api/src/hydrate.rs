//! Assembly of API models from store rows. Ids and timestamps are stored as
//! text; anything unparseable is a data integrity error and propagates.

use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use uuid::Uuid;

use tincan_db::models::{ChatRow, MessageRow, ReactionRow, UserRow};
use tincan_db::{Store, parse_timestamp};
use tincan_types::models::{Chat, Message, Reaction, User};

pub fn user_from_row(row: UserRow) -> Result<User> {
    Ok(User {
        id: parse_id(&row.id)?,
        name: row.name,
        username: row.username,
        image: row.image,
        created_at: parse_timestamp(&row.created_at)?,
    })
}

pub fn reaction_from_row(row: ReactionRow) -> Result<Reaction> {
    Ok(Reaction {
        id: parse_id(&row.id)?,
        message_id: parse_id(&row.message_id)?,
        sender_id: parse_id(&row.sender_id)?,
        body: row.body,
        created_at: parse_timestamp(&row.created_at)?,
    })
}

/// Expand a chat row: participants, mute set and the hydrated latest message.
pub fn chat_from_row(store: &Store, row: ChatRow) -> Result<Chat> {
    let user_a = parse_id(&row.user_a)?;
    let user_b = parse_id(&row.user_b)?;

    let users = vec![load_user(store, &row.user_a)?, load_user(store, &row.user_b)?];

    let muted_by = store
        .mutes_for_chat(&row.id)?
        .iter()
        .map(|id| parse_id(id))
        .collect::<Result<Vec<_>>>()?;

    let latest_message = match store.latest_message(&row.id)? {
        Some(message_row) => Some(message_from_row(store, message_row)?),
        None => None,
    };

    Ok(Chat {
        id: parse_id(&row.id)?,
        user_ids: [user_a, user_b],
        users,
        muted_by,
        last_message_at: parse_timestamp(&row.last_message_at)?,
        created_at: parse_timestamp(&row.created_at)?,
        latest_message,
    })
}

/// Expand a single message row: sender, seen set and reactions.
pub fn message_from_row(store: &Store, row: MessageRow) -> Result<Message> {
    let sender = load_user(store, &row.sender_id)?;

    let seen_by = store
        .seen_for_message(&row.id)?
        .iter()
        .map(|id| parse_id(id))
        .collect::<Result<Vec<_>>>()?;

    let reactions = store
        .reactions_for_message(&row.id)?
        .into_iter()
        .map(reaction_from_row)
        .collect::<Result<Vec<_>>>()?;

    assemble_message(row, sender, seen_by, reactions)
}

/// Expand a page of message rows with batched seen and reaction lookups.
pub fn messages_from_rows(store: &Store, rows: Vec<MessageRow>) -> Result<Vec<Message>> {
    let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();

    let mut seen_map: HashMap<String, Vec<Uuid>> = HashMap::new();
    for (message_id, user_id) in store.seen_for_messages(&ids)? {
        seen_map
            .entry(message_id)
            .or_default()
            .push(parse_id(&user_id)?);
    }

    let mut reaction_map: HashMap<String, Vec<Reaction>> = HashMap::new();
    for row in store.reactions_for_messages(&ids)? {
        reaction_map
            .entry(row.message_id.clone())
            .or_default()
            .push(reaction_from_row(row)?);
    }

    // At most two distinct senders per chat, so a tiny cache suffices.
    let mut senders: HashMap<String, User> = HashMap::new();
    for row in &rows {
        if !senders.contains_key(&row.sender_id) {
            senders.insert(row.sender_id.clone(), load_user(store, &row.sender_id)?);
        }
    }

    rows.into_iter()
        .map(|row| {
            let sender = senders
                .get(&row.sender_id)
                .cloned()
                .ok_or_else(|| anyhow!("sender {} missing from cache", row.sender_id))?;
            let seen_by = seen_map.remove(&row.id).unwrap_or_default();
            let reactions = reaction_map.remove(&row.id).unwrap_or_default();
            assemble_message(row, sender, seen_by, reactions)
        })
        .collect()
}

fn assemble_message(
    row: MessageRow,
    sender: User,
    seen_by: Vec<Uuid>,
    reactions: Vec<Reaction>,
) -> Result<Message> {
    let reply_to = row.reply_to.as_deref().map(parse_id).transpose()?;
    Ok(Message {
        id: parse_id(&row.id)?,
        chat_id: parse_id(&row.chat_id)?,
        sender_id: parse_id(&row.sender_id)?,
        sender,
        body: row.body,
        image: row.image,
        reply_to,
        seen_by,
        reactions,
        created_at: parse_timestamp(&row.created_at)?,
    })
}

fn load_user(store: &Store, id: &str) -> Result<User> {
    let row = store
        .user_by_id(id)?
        .ok_or_else(|| anyhow!("user {} referenced but not found", id))?;
    user_from_row(row)
}

pub(crate) fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).with_context(|| format!("corrupt id: {raw}"))
}
