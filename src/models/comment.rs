use chrono::{DateTime, Utc};

use super::{CommentId, PostId, UserId};

#[derive(Debug, Clone)]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub author_id: UserId,
    pub author_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
