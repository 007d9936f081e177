pub mod assignment;
pub mod comment;
pub mod post;
pub mod read_status;
pub mod room;
pub mod user;

pub type UserId = u64;
pub type RoomId = u64;
pub type PostId = u64;
pub type CommentId = u64;
pub type AssignmentId = u64;
pub type SubmissionId = u64;

/// Timestamp layout used in list payloads and detail responses.
pub const WIRE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";
