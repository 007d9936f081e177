use chrono::{DateTime, Utc};

use super::{PostId, UserId};

#[derive(Debug, Clone)]
pub struct ReadStatus {
    pub post_id: PostId,
    pub user_id: UserId,
    pub nickname: String,
    pub read_at: DateTime<Utc>,
}
