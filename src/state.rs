use serde::Serialize;
use sqlx::SqlitePool;
use tokio::sync::broadcast;

use crate::models::{Booking, BookingStatus, Conversation};

pub const EVENT_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: broadcast::Sender<ServerEvent>,
}

impl AppState {
    pub fn new(db: SqlitePool) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self { db, events }
    }
}

/// Change notification fanned out to live listeners. Listeners re-read the
/// records they care about; the event only says what changed and for whom.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServerEvent {
    pub kind: String,
    pub booking_id: Option<String>,
    pub conversation_id: Option<String>,
    pub status: Option<BookingStatus>,
    pub client_id: String,
    pub provider_id: String,
}

impl ServerEvent {
    pub fn from_booking(kind: &str, booking: &Booking) -> Self {
        Self {
            kind: kind.to_string(),
            booking_id: Some(booking.id.clone()),
            conversation_id: None,
            status: Some(booking.status),
            client_id: booking.client_id.clone(),
            provider_id: booking.provider_id.clone(),
        }
    }

    pub fn from_conversation(kind: &str, conversation: &Conversation) -> Self {
        Self {
            kind: kind.to_string(),
            booking_id: None,
            conversation_id: Some(conversation.id.clone()),
            status: None,
            client_id: conversation.client_id.clone(),
            provider_id: conversation.provider_id.clone(),
        }
    }

    pub fn concerns(&self, user_id: &str) -> bool {
        self.client_id == user_id || self.provider_id == user_id
    }
}

/// Sends are best effort: no receivers is not an error.
pub fn publish(events: &broadcast::Sender<ServerEvent>, event: ServerEvent) {
    let _ = events.send(event);
}
