//! Line frames exchanged over a connection.
//!
//! Client to server: a one-off handshake (`AUTH:<id>:<name>`) and
//! `|`-delimited requests. Server to client: `|`-delimited responses and
//! `:`-delimited pushes. A request may carry an `<id>#` prefix which the
//! matching response echoes back.

use std::fmt;

use crate::codec::{decode, encode};
use crate::error::AppError;
use crate::models::UserId;

pub const HANDSHAKE_TAG: &str = "AUTH";
pub const RESPONSE_SUFFIX: &str = "_RESPONSE";
pub const SUCCESS: &str = "SUCCESS";
pub const ERROR: &str = "ERROR";
/// Longest line either side reads before giving up on the peer.
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

macro_rules! vocabulary {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }

            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($wire => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

vocabulary!(
    /// Request commands understood by the connection handler.
    Command {
        Login => "LOGIN",
        Register => "REGISTER",
        GetUser => "GET_USER",
        GetRooms => "GET_ROOMS",
        CreateRoom => "CREATE_ROOM",
        DeleteRoom => "DELETE_ROOM",
        JoinRoom => "JOIN_ROOM",
        LeaveRoom => "LEAVE_ROOM",
        GetPosts => "GET_POSTS",
        GetNotices => "GET_NOTICES",
        GetGeneralPosts => "GET_GENERAL_POSTS",
        CreatePost => "CREATE_POST",
        DeletePost => "DELETE_POST",
        GetPost => "GET_POST",
        GetComments => "GET_COMMENTS",
        CreateComment => "CREATE_COMMENT",
        MarkRead => "MARK_READ",
        GetReadStatus => "GET_READ_STATUS",
        CreateAssignment => "CREATE_ASSIGNMENT",
        GetAssignment => "GET_ASSIGNMENT",
        SubmitAssignment => "SUBMIT_ASSIGNMENT",
        GetSubmissions => "GET_SUBMISSIONS",
        GetMySubmission => "GET_MY_SUBMISSION",
        GradeSubmission => "GRADE_SUBMISSION",
        Chat => "CHAT",
        AnnounceRead => "ANNOUNCE_READ",
    }
);

vocabulary!(
    /// Tags of unsolicited server frames.
    PushTag {
        Connected => "CONNECTED",
        UserList => "USERLIST",
        NewRoom => "NEW_ROOM",
        RoomDeleted => "ROOM_DELETED",
        PostUpdate => "POST_UPDATE",
        RoomJoin => "ROOM_JOIN",
        RoomLeave => "ROOM_LEAVE",
        RoomUserList => "ROOM_USERLIST",
        NewPost => "NEW_POST",
        PostDeleted => "POST_DELETED",
        NewComment => "NEW_COMMENT",
        PostRead => "POST_READ",
        AssignmentSubmitted => "ASSIGNMENT_SUBMITTED",
        SubmissionGraded => "SUBMISSION_GRADED",
        Chat => "CHAT",
        SessionReplaced => "SESSION_REPLACED",
        ServerShutdown => "SERVER_SHUTDOWN",
    }
);

impl Command {
    /// Number of `|` arguments the command cannot do without.
    pub fn min_args(&self) -> usize {
        match self {
            Command::GetRooms => 0,
            Command::CreatePost | Command::CreateAssignment => 4,
            Command::Register | Command::GradeSubmission => 3,
            Command::Login | Command::CreateComment | Command::SubmitAssignment => 2,
            _ => 1,
        }
    }

    /// Commands usable before the handshake.
    pub fn requires_identity(&self) -> bool {
        !matches!(self, Command::Login | Command::Register)
    }
}

/// Split an optional `<digits>#` correlation prefix off a line.
fn split_request_id(line: &str) -> Result<(Option<u64>, &str), AppError> {
    match line.split_once('#') {
        Some((prefix, rest))
            if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) =>
        {
            let id = prefix
                .parse()
                .map_err(|_| AppError::MalformedFrame("request id out of range".to_string()))?;
            Ok((Some(id), rest))
        }
        _ => Ok((None, line)),
    }
}

fn with_request_id(id: Option<u64>, body: String) -> String {
    match id {
        Some(id) => format!("{id}#{body}"),
        None => body,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub user_id: UserId,
    pub name: String,
}

impl Handshake {
    pub fn to_wire(&self) -> String {
        format!("{HANDSHAKE_TAG}:{}:{}", self.user_id, encode(&self.name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub id: Option<u64>,
    /// Command name as sent; may be outside the [`Command`] vocabulary.
    pub name: String,
    /// Decoded arguments.
    pub args: Vec<String>,
}

impl Request {
    pub fn new(id: Option<u64>, command: Command, args: Vec<String>) -> Self {
        Self {
            id,
            name: command.as_str().to_string(),
            args,
        }
    }

    pub fn command(&self) -> Option<Command> {
        Command::parse(&self.name)
    }

    pub fn to_wire(&self) -> String {
        let mut body = self.name.clone();
        for arg in &self.args {
            body.push('|');
            body.push_str(&encode(arg));
        }
        with_request_id(self.id, body)
    }
}

/// Anything a client may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Handshake(Handshake),
    Request(Request),
}

impl ClientFrame {
    pub fn parse(line: &str) -> Result<Self, AppError> {
        if line.is_empty() {
            return Err(AppError::MalformedFrame("empty frame".to_string()));
        }
        if let Some(rest) = line.strip_prefix(HANDSHAKE_TAG).and_then(|r| r.strip_prefix(':')) {
            let tokens: Vec<&str> = rest.split(':').collect();
            let [id, name] = tokens.as_slice() else {
                return Err(AppError::MalformedFrame(
                    "handshake needs an identity and a display name".to_string(),
                ));
            };
            let user_id = id
                .parse()
                .map_err(|_| AppError::MalformedFrame("identity must be numeric".to_string()))?;
            let name = decode(name);
            if name.trim().is_empty() {
                return Err(AppError::MalformedFrame("display name is empty".to_string()));
            }
            return Ok(ClientFrame::Handshake(Handshake { user_id, name }));
        }

        let (id, body) = split_request_id(line)?;
        let mut fields = body.split('|');
        let name = fields.next().unwrap_or_default().to_string();
        if name.is_empty() {
            return Err(AppError::MalformedFrame("missing command".to_string()));
        }
        Ok(ClientFrame::Request(Request {
            id,
            name,
            args: fields.map(decode).collect(),
        }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Payload fields as they appear on the wire (free text still encoded).
    Success(Vec<String>),
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub id: Option<u64>,
    /// Name of the answered command, without the `_RESPONSE` suffix.
    pub command: String,
    pub outcome: Outcome,
}

impl Response {
    pub fn success(request: &Request, fields: Vec<String>) -> Self {
        Self {
            id: request.id,
            command: request.name.clone(),
            outcome: Outcome::Success(fields),
        }
    }

    pub fn error(request: &Request, message: impl Into<String>) -> Self {
        Self {
            id: request.id,
            command: request.name.clone(),
            outcome: Outcome::Error(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Success(_))
    }

    /// Decoded payload field `index`.
    pub fn value(&self, index: usize) -> Option<String> {
        match &self.outcome {
            Outcome::Success(fields) => fields.get(index).map(|f| decode(f)),
            Outcome::Error(_) => None,
        }
    }

    /// Payload fields split into decoded `:` subfields, one entry per list item.
    pub fn items(&self) -> Vec<Vec<String>> {
        match &self.outcome {
            Outcome::Success(fields) => fields
                .iter()
                .map(|f| f.split(':').map(decode).collect())
                .collect(),
            Outcome::Error(_) => Vec::new(),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.outcome {
            Outcome::Error(msg) => Some(msg),
            Outcome::Success(_) => None,
        }
    }

    pub fn to_wire(&self) -> String {
        let mut body = format!("{}{RESPONSE_SUFFIX}|", self.command);
        match &self.outcome {
            Outcome::Success(fields) => {
                body.push_str(SUCCESS);
                for field in fields {
                    body.push('|');
                    body.push_str(field);
                }
            }
            Outcome::Error(msg) => {
                body.push_str(ERROR);
                body.push('|');
                body.push_str(&encode(msg));
            }
        }
        with_request_id(self.id, body)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Push {
    pub tag: PushTag,
    /// Fields as they appear on the wire (free text still encoded).
    pub fields: Vec<String>,
}

impl Push {
    pub fn new(tag: PushTag) -> Self {
        Self {
            tag,
            fields: Vec::new(),
        }
    }

    /// Append a structural field (ids, type names) verbatim.
    pub fn field(mut self, value: impl fmt::Display) -> Self {
        self.fields.push(value.to_string());
        self
    }

    /// Append a free-text field, escaped.
    pub fn text(mut self, value: &str) -> Self {
        self.fields.push(encode(value));
        self
    }

    /// Decoded field `index`.
    pub fn value(&self, index: usize) -> Option<String> {
        self.fields.get(index).map(|f| decode(f))
    }

    /// `(id, name)` entries of a roster push, starting at field `offset`.
    pub fn roster_entries(&self, offset: usize) -> Vec<(UserId, String)> {
        let joined = self.fields.get(offset..).unwrap_or_default().join(":");
        joined
            .split(',')
            .filter_map(|entry| {
                let (id, name) = entry.split_once(':')?;
                Some((id.parse().ok()?, decode(name)))
            })
            .collect()
    }

    pub fn to_wire(&self) -> String {
        let mut line = self.tag.as_str().to_string();
        for field in &self.fields {
            line.push(':');
            line.push_str(field);
        }
        line
    }
}

/// Anything a server may send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerFrame {
    Response(Response),
    Push(Push),
}

impl ServerFrame {
    /// Responses are the only frames whose first separator is `|`; pushes use
    /// `:` throughout and their tag must be in the [`PushTag`] vocabulary.
    pub fn parse(line: &str) -> Result<Self, AppError> {
        let (id, body) = split_request_id(line)?;
        let first_pipe = body.find('|');
        let first_colon = body.find(':');
        let is_response = match (first_pipe, first_colon) {
            (Some(p), Some(c)) => p < c,
            (Some(_), None) => true,
            _ => false,
        };

        if is_response {
            let mut fields = body.split('|');
            let head = fields.next().unwrap_or_default();
            let command = head.strip_suffix(RESPONSE_SUFFIX).ok_or_else(|| {
                AppError::MalformedFrame(format!("not a response head: {head}"))
            })?;
            let outcome = match fields.next() {
                Some(SUCCESS) => Outcome::Success(fields.map(str::to_string).collect()),
                Some(ERROR) => Outcome::Error(decode(fields.next().unwrap_or_default())),
                other => {
                    return Err(AppError::MalformedFrame(format!(
                        "unknown response status: {other:?}"
                    )))
                }
            };
            return Ok(ServerFrame::Response(Response {
                id,
                command: command.to_string(),
                outcome,
            }));
        }

        if id.is_some() {
            return Err(AppError::MalformedFrame("push frames carry no request id".to_string()));
        }
        let mut fields = body.split(':');
        let head = fields.next().unwrap_or_default();
        let tag = PushTag::parse(head)
            .ok_or_else(|| AppError::MalformedFrame(format!("unknown push tag: {head}")))?;
        Ok(ServerFrame::Push(Push {
            tag,
            fields: fields.map(str::to_string).collect(),
        }))
    }
}
