use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;

use super::{AssignmentId, PostId, SubmissionId, UserId};

#[derive(Debug, Clone)]
pub struct Assignment {
    pub id: AssignmentId,
    pub post_id: PostId,
    pub title: String,
    pub description: String,
    pub due_date: Option<NaiveDateTime>,
}

#[derive(Debug)]
pub struct CreateAssignment {
    pub post_id: PostId,
    pub title: String,
    pub description: String,
    pub due_date: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Submitted,
    Graded,
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubmissionStatus::Submitted => f.write_str("SUBMITTED"),
            SubmissionStatus::Graded => f.write_str("GRADED"),
        }
    }
}

/// Attachment metadata; the file bytes live in external storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentRef {
    pub file_name: String,
    pub file_path: String,
    pub file_size: u64,
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub id: SubmissionId,
    pub assignment_id: AssignmentId,
    pub user_id: UserId,
    pub nickname: String,
    pub content: String,
    pub attachment: Option<AttachmentRef>,
    pub status: SubmissionStatus,
    pub score: Option<i32>,
    pub feedback: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub graded_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
pub struct SubmitAssignment {
    pub assignment_id: AssignmentId,
    pub content: String,
    pub attachment: Option<AttachmentRef>,
}

#[derive(Debug)]
pub struct GradeSubmission {
    pub submission_id: SubmissionId,
    pub score: i32,
    pub feedback: String,
}
