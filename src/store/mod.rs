//! Business collaborators reached from the connection handler.
//!
//! The gateway only routes commands; ownership checks, uniqueness rules and
//! persistence live behind these traits. [`memory::MemoryStore`] is the
//! in-process implementation used by the server binary and the tests.

pub mod memory;

use std::sync::Arc;

use crate::error::StoreError;
use crate::models::assignment::{
    Assignment, CreateAssignment, GradeSubmission, Submission, SubmitAssignment,
};
use crate::models::comment::Comment;
use crate::models::post::{CreatePost, Post, PostFilter};
use crate::models::read_status::ReadStatus;
use crate::models::room::Room;
use crate::models::user::{CreateUser, User};
use crate::models::{AssignmentId, PostId, RoomId, UserId};

pub type StoreResult<T> = Result<T, StoreError>;

pub trait UserDirectory: Send + Sync {
    fn register(&self, input: CreateUser) -> StoreResult<User>;
    fn login(&self, username: &str, password: &str) -> StoreResult<User>;
    fn find_user(&self, user_id: UserId) -> StoreResult<User>;
}

pub trait RoomStore: Send + Sync {
    fn create_room(&self, name: &str, creator_id: UserId, creator_name: &str) -> StoreResult<Room>;
    /// Only the creator may delete a room.
    fn delete_room(&self, room_id: RoomId, user_id: UserId) -> StoreResult<Room>;
    fn list_rooms(&self) -> StoreResult<Vec<Room>>;
    fn find_room(&self, room_id: RoomId) -> StoreResult<Room>;
}

pub trait PostStore: Send + Sync {
    /// Notices may only be written by the room creator.
    fn create_post(&self, author_id: UserId, author_name: &str, input: CreatePost)
        -> StoreResult<Post>;
    /// Only the author may delete a post. Returns the removed post.
    fn delete_post(&self, post_id: PostId, user_id: UserId) -> StoreResult<Post>;
    /// Newest first.
    fn list_posts(&self, room_id: RoomId, filter: PostFilter) -> StoreResult<Vec<Post>>;
    fn find_post(&self, post_id: PostId) -> StoreResult<Post>;
}

pub trait CommentStore: Send + Sync {
    fn create_comment(
        &self,
        post_id: PostId,
        author_id: UserId,
        author_name: &str,
        content: &str,
    ) -> StoreResult<Comment>;
    /// Oldest first.
    fn list_comments(&self, post_id: PostId) -> StoreResult<Vec<Comment>>;
}

pub trait ReadStatusStore: Send + Sync {
    /// Fails with `Conflict` when the user already read the post.
    fn mark_read(&self, post_id: PostId, user_id: UserId, nickname: &str)
        -> StoreResult<ReadStatus>;
    fn read_status(&self, post_id: PostId) -> StoreResult<Vec<ReadStatus>>;
}

pub trait AssignmentStore: Send + Sync {
    /// Only the post author may attach an assignment to a post.
    fn create_assignment(&self, user_id: UserId, input: CreateAssignment)
        -> StoreResult<Assignment>;
    fn find_assignment(&self, assignment_id: AssignmentId) -> StoreResult<Assignment>;
    fn assignment_for_post(&self, post_id: PostId) -> StoreResult<Assignment>;
    /// One submission per user per assignment.
    fn submit(&self, user_id: UserId, nickname: &str, input: SubmitAssignment)
        -> StoreResult<Submission>;
    fn list_submissions(&self, assignment_id: AssignmentId) -> StoreResult<Vec<Submission>>;
    fn my_submission(&self, assignment_id: AssignmentId, user_id: UserId)
        -> StoreResult<Submission>;
    /// Only the author of the assignment's post may grade.
    fn grade(&self, user_id: UserId, input: GradeSubmission) -> StoreResult<Submission>;
}

/// The full set of collaborators a connection handler talks to.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserDirectory>,
    pub rooms: Arc<dyn RoomStore>,
    pub posts: Arc<dyn PostStore>,
    pub comments: Arc<dyn CommentStore>,
    pub reads: Arc<dyn ReadStatusStore>,
    pub assignments: Arc<dyn AssignmentStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self::from_memory(Arc::new(memory::MemoryStore::new()))
    }

    pub fn from_memory(store: Arc<memory::MemoryStore>) -> Self {
        Self {
            users: store.clone(),
            rooms: store.clone(),
            posts: store.clone(),
            comments: store.clone(),
            reads: store.clone(),
            assignments: store,
        }
    }
}
