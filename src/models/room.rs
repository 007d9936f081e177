use chrono::{DateTime, Utc};

use super::{RoomId, UserId};

#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub creator_id: UserId,
    pub creator_name: String,
    pub created_at: DateTime<Utc>,
}
