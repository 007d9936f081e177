use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU64, Ordering};

use super::{
    AssignmentStore, CommentStore, PostStore, ReadStatusStore, RoomStore, StoreResult,
    UserDirectory,
};
use crate::error::StoreError;
use crate::models::assignment::{
    Assignment, CreateAssignment, GradeSubmission, Submission, SubmissionStatus,
    SubmitAssignment,
};
use crate::models::comment::Comment;
use crate::models::post::{CreatePost, Post, PostFilter, PostType};
use crate::models::read_status::ReadStatus;
use crate::models::room::Room;
use crate::models::user::{CreateUser, User};
use crate::models::{AssignmentId, CommentId, PostId, RoomId, SubmissionId, UserId};

fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Process-local collaborator backing every store trait with concurrent maps.
#[derive(Default)]
pub struct MemoryStore {
    next_id: AtomicU64,
    users: DashMap<UserId, User>,
    usernames: DashMap<String, UserId>,
    rooms: DashMap<RoomId, Room>,
    posts: DashMap<PostId, Post>,
    comments: DashMap<CommentId, Comment>,
    reads: DashMap<(PostId, UserId), ReadStatus>,
    assignments: DashMap<AssignmentId, Assignment>,
    submissions: DashMap<SubmissionId, Submission>,
    submitted: DashMap<(AssignmentId, UserId), SubmissionId>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Demo data for a freshly started server: one user and one room.
    pub fn seed_demo(&self) -> StoreResult<(User, Room)> {
        let user = self.register(CreateUser {
            username: "demo".to_string(),
            password: "demo".to_string(),
            nickname: "Demo".to_string(),
        })?;
        let room = self.create_room("Lobby", user.id, &user.nickname)?;
        Ok((user, room))
    }
}

impl UserDirectory for MemoryStore {
    fn register(&self, input: CreateUser) -> StoreResult<User> {
        if input.username.trim().is_empty() || input.password.is_empty() {
            return Err(StoreError::BadRequest(
                "username and password are required".to_string(),
            ));
        }
        let id = match self.usernames.entry(input.username.clone()) {
            Entry::Occupied(_) => {
                return Err(StoreError::Conflict("username already exists".to_string()))
            }
            Entry::Vacant(slot) => {
                let id = self.allocate_id();
                slot.insert(id);
                id
            }
        };
        let salt = format!("{:016x}", rand::random::<u64>());
        let user = User {
            id,
            password_hash: hash_password(&salt, &input.password),
            salt,
            username: input.username,
            nickname: input.nickname,
        };
        self.users.insert(id, user.clone());
        Ok(user)
    }

    fn login(&self, username: &str, password: &str) -> StoreResult<User> {
        let id = self
            .usernames
            .get(username)
            .map(|entry| *entry.value())
            .ok_or_else(|| StoreError::NotFound("unknown user".to_string()))?;
        let user = self.find_user(id)?;
        if hash_password(&user.salt, password) != user.password_hash {
            return Err(StoreError::Forbidden("password does not match".to_string()));
        }
        Ok(user)
    }

    fn find_user(&self, user_id: UserId) -> StoreResult<User> {
        self.users
            .get(&user_id)
            .map(|u| u.clone())
            .ok_or_else(|| StoreError::NotFound("unknown user".to_string()))
    }
}

impl RoomStore for MemoryStore {
    fn create_room(&self, name: &str, creator_id: UserId, creator_name: &str) -> StoreResult<Room> {
        if name.trim().is_empty() {
            return Err(StoreError::BadRequest("room name is required".to_string()));
        }
        let room = Room {
            id: self.allocate_id(),
            name: name.to_string(),
            creator_id,
            creator_name: creator_name.to_string(),
            created_at: Utc::now(),
        };
        self.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    fn delete_room(&self, room_id: RoomId, user_id: UserId) -> StoreResult<Room> {
        let room = self.find_room(room_id)?;
        if room.creator_id != user_id {
            return Err(StoreError::Forbidden(
                "only the room creator can delete it".to_string(),
            ));
        }
        self.rooms.remove(&room_id);
        self.posts.retain(|_, post| post.room_id != room_id);
        Ok(room)
    }

    fn list_rooms(&self) -> StoreResult<Vec<Room>> {
        let mut rooms: Vec<Room> = self.rooms.iter().map(|r| r.value().clone()).collect();
        rooms.sort_by_key(|r| r.id);
        Ok(rooms)
    }

    fn find_room(&self, room_id: RoomId) -> StoreResult<Room> {
        self.rooms
            .get(&room_id)
            .map(|r| r.clone())
            .ok_or_else(|| StoreError::NotFound("unknown room".to_string()))
    }
}

impl PostStore for MemoryStore {
    fn create_post(
        &self,
        author_id: UserId,
        author_name: &str,
        input: CreatePost,
    ) -> StoreResult<Post> {
        let room = self.find_room(input.room_id)?;
        if input.post_type == PostType::Notice && room.creator_id != author_id {
            return Err(StoreError::Forbidden(
                "only the room creator can write notices".to_string(),
            ));
        }
        if input.title.trim().is_empty() {
            return Err(StoreError::BadRequest("title is required".to_string()));
        }
        let post = Post {
            id: self.allocate_id(),
            room_id: room.id,
            author_id,
            author_name: author_name.to_string(),
            title: input.title,
            content: input.content,
            post_type: input.post_type,
            has_assignment: false,
            created_at: Utc::now(),
        };
        self.posts.insert(post.id, post.clone());
        Ok(post)
    }

    fn delete_post(&self, post_id: PostId, user_id: UserId) -> StoreResult<Post> {
        let post = self.find_post(post_id)?;
        if post.author_id != user_id {
            return Err(StoreError::Forbidden(
                "only the author can delete this post".to_string(),
            ));
        }
        self.posts.remove(&post_id);
        self.comments.retain(|_, c| c.post_id != post_id);
        self.reads.retain(|(pid, _), _| *pid != post_id);
        Ok(post)
    }

    fn list_posts(&self, room_id: RoomId, filter: PostFilter) -> StoreResult<Vec<Post>> {
        let mut posts: Vec<Post> = self
            .posts
            .iter()
            .filter(|p| p.room_id == room_id)
            .filter(|p| match filter {
                PostFilter::All => true,
                PostFilter::Only(kind) => p.post_type == kind,
            })
            .map(|p| p.value().clone())
            .collect();
        posts.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(posts)
    }

    fn find_post(&self, post_id: PostId) -> StoreResult<Post> {
        self.posts
            .get(&post_id)
            .map(|p| p.clone())
            .ok_or_else(|| StoreError::NotFound("unknown post".to_string()))
    }
}

impl CommentStore for MemoryStore {
    fn create_comment(
        &self,
        post_id: PostId,
        author_id: UserId,
        author_name: &str,
        content: &str,
    ) -> StoreResult<Comment> {
        self.find_post(post_id)?;
        if content.trim().is_empty() {
            return Err(StoreError::BadRequest("comment is empty".to_string()));
        }
        let comment = Comment {
            id: self.allocate_id(),
            post_id,
            author_id,
            author_name: author_name.to_string(),
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.comments.insert(comment.id, comment.clone());
        Ok(comment)
    }

    fn list_comments(&self, post_id: PostId) -> StoreResult<Vec<Comment>> {
        let mut comments: Vec<Comment> = self
            .comments
            .iter()
            .filter(|c| c.post_id == post_id)
            .map(|c| c.value().clone())
            .collect();
        comments.sort_by_key(|c| c.id);
        Ok(comments)
    }
}

impl ReadStatusStore for MemoryStore {
    fn mark_read(&self, post_id: PostId, user_id: UserId, nickname: &str) -> StoreResult<ReadStatus> {
        self.find_post(post_id)?;
        match self.reads.entry((post_id, user_id)) {
            Entry::Occupied(_) => Err(StoreError::Conflict("post already read".to_string())),
            Entry::Vacant(slot) => {
                let status = ReadStatus {
                    post_id,
                    user_id,
                    nickname: nickname.to_string(),
                    read_at: Utc::now(),
                };
                slot.insert(status.clone());
                Ok(status)
            }
        }
    }

    fn read_status(&self, post_id: PostId) -> StoreResult<Vec<ReadStatus>> {
        let mut statuses: Vec<ReadStatus> = self
            .reads
            .iter()
            .filter(|r| r.key().0 == post_id)
            .map(|r| r.value().clone())
            .collect();
        statuses.sort_by_key(|r| r.read_at);
        Ok(statuses)
    }
}

impl AssignmentStore for MemoryStore {
    fn create_assignment(&self, user_id: UserId, input: CreateAssignment) -> StoreResult<Assignment> {
        // The post entry stays locked until the flag is set, so only one
        // assignment per post can get through.
        let mut post = self
            .posts
            .get_mut(&input.post_id)
            .ok_or_else(|| StoreError::NotFound("unknown post".to_string()))?;
        if post.author_id != user_id {
            return Err(StoreError::Forbidden(
                "only the post author can attach an assignment".to_string(),
            ));
        }
        if post.has_assignment {
            return Err(StoreError::Conflict("post already has an assignment".to_string()));
        }
        let assignment = Assignment {
            id: self.allocate_id(),
            post_id: post.id,
            title: input.title,
            description: input.description,
            due_date: input.due_date,
        };
        self.assignments.insert(assignment.id, assignment.clone());
        post.has_assignment = true;
        Ok(assignment)
    }

    fn find_assignment(&self, assignment_id: AssignmentId) -> StoreResult<Assignment> {
        self.assignments
            .get(&assignment_id)
            .map(|a| a.clone())
            .ok_or_else(|| StoreError::NotFound("unknown assignment".to_string()))
    }

    fn assignment_for_post(&self, post_id: PostId) -> StoreResult<Assignment> {
        self.assignments
            .iter()
            .find(|a| a.post_id == post_id)
            .map(|a| a.value().clone())
            .ok_or_else(|| StoreError::NotFound("post has no assignment".to_string()))
    }

    fn submit(&self, user_id: UserId, nickname: &str, input: SubmitAssignment) -> StoreResult<Submission> {
        let assignment = self.find_assignment(input.assignment_id)?;
        let id = match self.submitted.entry((assignment.id, user_id)) {
            Entry::Occupied(_) => {
                return Err(StoreError::Conflict("assignment already submitted".to_string()))
            }
            Entry::Vacant(slot) => {
                let id = self.allocate_id();
                slot.insert(id);
                id
            }
        };
        let submission = Submission {
            id,
            assignment_id: assignment.id,
            user_id,
            nickname: nickname.to_string(),
            content: input.content,
            attachment: input.attachment,
            status: SubmissionStatus::Submitted,
            score: None,
            feedback: None,
            submitted_at: Utc::now(),
            graded_at: None,
        };
        self.submissions.insert(id, submission.clone());
        Ok(submission)
    }

    fn list_submissions(&self, assignment_id: AssignmentId) -> StoreResult<Vec<Submission>> {
        let mut submissions: Vec<Submission> = self
            .submissions
            .iter()
            .filter(|s| s.assignment_id == assignment_id)
            .map(|s| s.value().clone())
            .collect();
        submissions.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at).then(b.id.cmp(&a.id)));
        Ok(submissions)
    }

    fn my_submission(&self, assignment_id: AssignmentId, user_id: UserId) -> StoreResult<Submission> {
        let id = self
            .submitted
            .get(&(assignment_id, user_id))
            .map(|entry| *entry.value())
            .ok_or_else(|| StoreError::NotFound("no submission yet".to_string()))?;
        self.submissions
            .get(&id)
            .map(|s| s.clone())
            .ok_or_else(|| StoreError::NotFound("no submission yet".to_string()))
    }

    fn grade(&self, user_id: UserId, input: GradeSubmission) -> StoreResult<Submission> {
        let assignment_id = self
            .submissions
            .get(&input.submission_id)
            .map(|s| s.assignment_id)
            .ok_or_else(|| StoreError::NotFound("unknown submission".to_string()))?;
        let assignment = self.find_assignment(assignment_id)?;
        let post = self.find_post(assignment.post_id)?;
        if post.author_id != user_id {
            return Err(StoreError::Forbidden(
                "only the post author can grade submissions".to_string(),
            ));
        }
        let mut submission = self
            .submissions
            .get_mut(&input.submission_id)
            .ok_or_else(|| StoreError::NotFound("unknown submission".to_string()))?;
        submission.score = Some(input.score);
        submission.feedback = Some(input.feedback);
        submission.status = SubmissionStatus::Graded;
        submission.graded_at = Some(Utc::now());
        Ok(submission.clone())
    }
}
