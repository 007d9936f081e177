use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

use super::{PostId, RoomId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostType {
    Notice,
    General,
}

impl PostType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostType::Notice => "NOTICE",
            PostType::General => "GENERAL",
        }
    }
}

impl fmt::Display for PostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PostType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NOTICE" => Ok(PostType::Notice),
            "GENERAL" => Ok(PostType::General),
            other => Err(format!("unknown post type: {other}")),
        }
    }
}

/// Which slice of a room's posts a listing asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostFilter {
    All,
    Only(PostType),
}

#[derive(Debug, Clone)]
pub struct Post {
    pub id: PostId,
    pub room_id: RoomId,
    pub author_id: UserId,
    pub author_name: String,
    pub title: String,
    pub content: String,
    pub post_type: PostType,
    pub has_assignment: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct CreatePost {
    pub room_id: RoomId,
    pub title: String,
    pub content: String,
    pub post_type: PostType,
}
