//! Client/provider conversations.
//!
//! A conversation row carries a summary of its latest message and one unread
//! counter per side. Sending a message and bumping the recipient's counter
//! happen in one transaction, as do marking messages read and zeroing the
//! reader's counter.

use chrono::Utc;
use sqlx::{SqliteConnection, SqlitePool};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::{
    auth::{new_id, Session},
    error::{AppError, AppResult},
    models::{Conversation, Message, Role, SenderType},
    state::{publish, ServerEvent},
    stores::{is_unique_violation, profiles},
};

const CONVERSATION_COLUMNS: &str = "id, client_id, provider_id, client_name, provider_name, \
     last_message, last_message_date, client_unread, provider_unread, created_at, updated_at";

const MESSAGE_COLUMNS: &str = "id, conversation_id, sender_id, sender_name, sender_type, text, created_at, read";

async fn fetch_conversation(
    conn: &mut SqliteConnection,
    conversation_id: &str,
) -> Result<Option<Conversation>, sqlx::Error> {
    sqlx::query_as::<_, Conversation>(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?"
    ))
    .bind(conversation_id)
    .fetch_optional(conn)
    .await
}

async fn conversation_between(
    pool: &SqlitePool,
    client_id: &str,
    provider_id: &str,
) -> AppResult<Option<Conversation>> {
    let conversation = sqlx::query_as::<_, Conversation>(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE client_id = ? AND provider_id = ?"
    ))
    .bind(client_id)
    .bind(provider_id)
    .fetch_optional(pool)
    .await?;
    Ok(conversation)
}

/// Loads a conversation and the caller's side of it.
pub async fn get_conversation(
    pool: &SqlitePool,
    session: &Session,
    conversation_id: &str,
) -> AppResult<(Conversation, SenderType)> {
    let mut conn = pool.acquire().await?;
    let conversation = fetch_conversation(&mut *conn, conversation_id)
        .await?
        .ok_or(AppError::NotFound("conversation"))?;
    let side = conversation.side_of(&session.user_id).ok_or(AppError::Forbidden)?;
    Ok((conversation, side))
}

/// Opens the client's conversation with a provider, reusing the existing one.
pub async fn start_conversation(
    pool: &SqlitePool,
    session: &Session,
    provider_id: &str,
) -> AppResult<Conversation> {
    session.require(Role::Client)?;
    if let Some(existing) = conversation_between(pool, &session.user_id, provider_id).await? {
        return Ok(existing);
    }

    let provider = profiles::provider_profile(pool, provider_id).await?;
    let now = Utc::now();
    let conversation = Conversation {
        id: new_id(),
        client_id: session.user_id.clone(),
        provider_id: provider.id,
        client_name: session.display_name.clone(),
        provider_name: provider.business_name.unwrap_or(provider.display_name),
        last_message: None,
        last_message_date: None,
        client_unread: 0,
        provider_unread: 0,
        created_at: now,
        updated_at: now,
    };

    let inserted = sqlx::query(&format!(
        "INSERT INTO conversations ({CONVERSATION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&conversation.id)
    .bind(&conversation.client_id)
    .bind(&conversation.provider_id)
    .bind(&conversation.client_name)
    .bind(&conversation.provider_name)
    .bind(&conversation.last_message)
    .bind(conversation.last_message_date)
    .bind(conversation.client_unread)
    .bind(conversation.provider_unread)
    .bind(conversation.created_at)
    .bind(conversation.updated_at)
    .execute(pool)
    .await;

    match inserted {
        Ok(_) => Ok(conversation),
        Err(err) if is_unique_violation(&err) => {
            conversation_between(pool, &session.user_id, provider_id)
                .await?
                .ok_or(AppError::NotFound("conversation"))
        }
        Err(err) => Err(err.into()),
    }
}

/// The caller's conversations, most recently active first. `search` matches
/// the other party's name or the last message.
pub async fn conversations_for(
    pool: &SqlitePool,
    session: &Session,
    search: Option<&str>,
) -> AppResult<Vec<Conversation>> {
    let column = match session.role {
        Role::Client => "client_id",
        Role::Provider => "provider_id",
        Role::Admin => return Err(AppError::Forbidden),
    };
    let conversations = sqlx::query_as::<_, Conversation>(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE {column} = ? ORDER BY updated_at DESC"
    ))
    .bind(&session.user_id)
    .fetch_all(pool)
    .await?;

    let term = search
        .map(|term| term.trim().to_lowercase())
        .filter(|term| !term.is_empty());
    let Some(term) = term else {
        return Ok(conversations);
    };
    Ok(conversations
        .into_iter()
        .filter(|conversation| {
            let other = match session.role {
                Role::Provider => &conversation.client_name,
                _ => &conversation.provider_name,
            };
            other.to_lowercase().contains(&term)
                || conversation
                    .last_message
                    .as_deref()
                    .is_some_and(|text| text.to_lowercase().contains(&term))
        })
        .collect())
}

pub async fn send_message(
    pool: &SqlitePool,
    events: &broadcast::Sender<ServerEvent>,
    session: &Session,
    conversation_id: &str,
    text: &str,
) -> AppResult<Message> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AppError::validation("Message cannot be empty."));
    }

    let (mut conversation, side) = get_conversation(pool, session, conversation_id).await?;

    let message = Message {
        id: new_id(),
        conversation_id: conversation.id.clone(),
        sender_id: session.user_id.clone(),
        sender_name: session.display_name.clone(),
        sender_type: side,
        text: text.to_string(),
        created_at: Utc::now(),
        read: false,
    };
    // Participants never change; the transaction opens with a write so it
    // queues on the lock.
    let mut tx = pool.begin().await?;
    sqlx::query(&format!(
        "INSERT INTO messages ({MESSAGE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
    ))
    .bind(&message.id)
    .bind(&message.conversation_id)
    .bind(&message.sender_id)
    .bind(&message.sender_name)
    .bind(message.sender_type)
    .bind(&message.text)
    .bind(message.created_at)
    .bind(message.read)
    .execute(&mut *tx)
    .await?;

    let unread_column = match side {
        SenderType::Client => "provider_unread",
        SenderType::Provider => "client_unread",
    };
    sqlx::query(&format!(
        "UPDATE conversations
         SET last_message = ?, last_message_date = ?, updated_at = ?, {unread_column} = {unread_column} + 1
         WHERE id = ?"
    ))
    .bind(&message.text)
    .bind(message.created_at)
    .bind(message.created_at)
    .bind(&conversation.id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    conversation.last_message = Some(message.text.clone());
    conversation.last_message_date = Some(message.created_at);
    conversation.updated_at = message.created_at;
    publish(events, ServerEvent::from_conversation("message", &conversation));
    Ok(message)
}

/// Marks the other party's messages read and zeroes the caller's counter.
/// Returns how many messages changed; only a non-zero change is published.
pub async fn mark_conversation_read(
    pool: &SqlitePool,
    events: &broadcast::Sender<ServerEvent>,
    session: &Session,
    conversation_id: &str,
) -> AppResult<u64> {
    let (conversation, side) = get_conversation(pool, session, conversation_id).await?;

    let mut tx = pool.begin().await?;
    let marked = sqlx::query(
        "UPDATE messages SET read = 1 WHERE conversation_id = ? AND sender_id <> ? AND read = 0",
    )
    .bind(&conversation.id)
    .bind(&session.user_id)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    let unread_column = match side {
        SenderType::Client => "client_unread",
        SenderType::Provider => "provider_unread",
    };
    sqlx::query(&format!("UPDATE conversations SET {unread_column} = 0 WHERE id = ?"))
        .bind(&conversation.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    if marked > 0 {
        publish(events, ServerEvent::from_conversation("messages_read", &conversation));
    }
    Ok(marked)
}

async fn load_messages(pool: &SqlitePool, conversation_id: &str) -> AppResult<Vec<Message>> {
    let mut messages = sqlx::query_as::<_, Message>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages WHERE conversation_id = ? ORDER BY rowid"
    ))
    .bind(conversation_id)
    .fetch_all(pool)
    .await?;
    messages.sort_by_key(|message| message.created_at);
    Ok(messages)
}

/// Oldest first.
pub async fn messages(pool: &SqlitePool, session: &Session, conversation_id: &str) -> AppResult<Vec<Message>> {
    get_conversation(pool, session, conversation_id).await?;
    load_messages(pool, conversation_id).await
}

/// Live view of one conversation. Yields the full ordered message list first
/// and again after every change to the conversation. Each snapshot marks the
/// peer's messages read. Dropping it drops the broadcast receiver.
pub struct MessageSubscription {
    pool: SqlitePool,
    events: broadcast::Sender<ServerEvent>,
    receiver: broadcast::Receiver<ServerEvent>,
    session: Session,
    conversation_id: String,
    delivered_first: bool,
}

impl MessageSubscription {
    async fn snapshot(&self) -> AppResult<Vec<Message>> {
        mark_conversation_read(&self.pool, &self.events, &self.session, &self.conversation_id).await?;
        load_messages(&self.pool, &self.conversation_id).await
    }

    /// Waits for the next snapshot. `None` once the event channel closes.
    pub async fn next(&mut self) -> AppResult<Option<Vec<Message>>> {
        if !self.delivered_first {
            self.delivered_first = true;
            return self.snapshot().await.map(Some);
        }

        loop {
            match self.receiver.recv().await {
                Ok(event) if event.conversation_id.as_deref() == Some(self.conversation_id.as_str()) => {
                    return self.snapshot().await.map(Some);
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    log::debug!("Message listener skipped {skipped} events");
                    return self.snapshot().await.map(Some);
                }
                Err(RecvError::Closed) => return Ok(None),
            }
        }
    }
}

pub async fn subscribe_to_messages(
    pool: &SqlitePool,
    events: &broadcast::Sender<ServerEvent>,
    session: &Session,
    conversation_id: &str,
) -> AppResult<MessageSubscription> {
    // Subscribe before the first read so no change falls between the two.
    let receiver = events.subscribe();
    get_conversation(pool, session, conversation_id).await?;
    Ok(MessageSubscription {
        pool: pool.clone(),
        events: events.clone(),
        receiver,
        session: session.clone(),
        conversation_id: conversation_id.to_string(),
        delivered_first: false,
    })
}
