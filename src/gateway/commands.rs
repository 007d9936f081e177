//! Request routing: argument parsing, collaborator calls, response payloads
//! and the pushes that follow a successful mutation.

use chrono::{NaiveDate, NaiveDateTime};

use super::frame::{Command, Request};
use super::handler::{ConnectionHandler, Reply};
use super::session::Identity;
use crate::codec::encode;
use crate::error::AppError;
use crate::models::assignment::{
    AttachmentRef, CreateAssignment, GradeSubmission, Submission, SubmitAssignment,
};
use crate::models::post::{CreatePost, Post, PostFilter, PostType};
use crate::models::user::CreateUser;
use crate::models::WIRE_TIME_FORMAT;

fn arg<'a>(request: &'a Request, index: usize) -> &'a str {
    request.args.get(index).map(String::as_str).unwrap_or_default()
}

fn id_arg(request: &Request, index: usize, what: &str) -> Result<u64, AppError> {
    arg(request, index)
        .trim()
        .parse()
        .map_err(|_| AppError::MalformedFrame(format!("{what} must be a number")))
}

fn parse_due_date(raw: &str) -> Result<Option<NaiveDateTime>, AppError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    for layout in [WIRE_TIME_FORMAT, "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(due) = NaiveDateTime::parse_from_str(raw, layout) {
            return Ok(Some(due));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(23, 59, 0))
        .map(Some)
        .ok_or_else(|| AppError::MalformedFrame(format!("unrecognised due date: {raw}")))
}

fn post_item(post: &Post) -> String {
    format!(
        "{}:{}:{}:{}:{}:{}:{}",
        post.id,
        encode(&post.title),
        post.author_id,
        encode(&post.author_name),
        post.post_type,
        encode(&post.created_at.format(WIRE_TIME_FORMAT).to_string()),
        post.has_assignment
    )
}

fn submission_item(s: &Submission) -> String {
    format!(
        "{}:{}:{}:{}:{}:{}:{}:{}",
        s.id,
        s.user_id,
        encode(&s.nickname),
        encode(&s.content),
        encode(s.feedback.as_deref().unwrap_or_default()),
        s.status,
        s.score.map(|v| v.to_string()).unwrap_or_default(),
        encode(&s.submitted_at.format(WIRE_TIME_FORMAT).to_string())
    )
}

impl ConnectionHandler {
    pub(super) fn dispatch(&mut self, request: &Request) -> Result<Reply, AppError> {
        let command = request
            .command()
            .ok_or_else(|| AppError::MalformedFrame("unknown command".to_string()))?;
        if request.args.len() < command.min_args() {
            return Err(AppError::MalformedFrame(format!(
                "{command} expects at least {} argument(s)",
                command.min_args()
            )));
        }
        let me = if command.requires_identity() {
            Some(self.session.require_identity()?.clone())
        } else {
            None
        };

        match (command, me) {
            (Command::Login, _) => self.login(request),
            (Command::Register, _) => self.register(request),
            (_, None) => Err(AppError::Unauthenticated),
            (Command::GetUser, Some(_)) => self.get_user(request),
            (Command::GetRooms, Some(_)) => self.get_rooms(),
            (Command::CreateRoom, Some(me)) => self.create_room(request, me),
            (Command::DeleteRoom, Some(me)) => self.delete_room(request, me),
            (Command::JoinRoom, Some(me)) => self.join_room(request, me),
            (Command::LeaveRoom, Some(me)) => self.leave_room(request, me),
            (Command::GetPosts, Some(_)) => self.list_posts(request, PostFilter::All),
            (Command::GetNotices, Some(_)) => {
                self.list_posts(request, PostFilter::Only(PostType::Notice))
            }
            (Command::GetGeneralPosts, Some(_)) => {
                self.list_posts(request, PostFilter::Only(PostType::General))
            }
            (Command::CreatePost, Some(me)) => self.create_post(request, me),
            (Command::DeletePost, Some(me)) => self.delete_post(request, me),
            (Command::GetPost, Some(_)) => self.get_post(request),
            (Command::GetComments, Some(_)) => self.get_comments(request),
            (Command::CreateComment, Some(me)) => self.create_comment(request, me),
            (Command::MarkRead, Some(me)) => self.mark_read(request, me),
            (Command::GetReadStatus, Some(_)) => self.get_read_status(request),
            (Command::CreateAssignment, Some(me)) => self.create_assignment(request, me),
            (Command::GetAssignment, Some(_)) => self.get_assignment(request),
            (Command::SubmitAssignment, Some(me)) => self.submit_assignment(request, me),
            (Command::GetSubmissions, Some(_)) => self.get_submissions(request),
            (Command::GetMySubmission, Some(me)) => self.get_my_submission(request, me),
            (Command::GradeSubmission, Some(me)) => self.grade_submission(request, me),
            (Command::Chat, Some(me)) => Ok(Self::chat(request, me)),
            (Command::AnnounceRead, Some(me)) => self.announce_read(request, me),
        }
    }

    fn login(&self, request: &Request) -> Result<Reply, AppError> {
        let user = self.state.stores.users.login(arg(request, 0), arg(request, 1))?;
        Ok(Reply::with(vec![user.id.to_string(), encode(&user.nickname)]))
    }

    fn register(&self, request: &Request) -> Result<Reply, AppError> {
        let user = self.state.stores.users.register(CreateUser {
            username: arg(request, 0).to_string(),
            password: arg(request, 1).to_string(),
            nickname: arg(request, 2).to_string(),
        })?;
        Ok(Reply::with(vec![user.id.to_string()]))
    }

    fn get_user(&self, request: &Request) -> Result<Reply, AppError> {
        let user = self.state.stores.users.find_user(id_arg(request, 0, "user id")?)?;
        Ok(Reply::with(vec![
            user.id.to_string(),
            encode(&user.username),
            encode(&user.nickname),
        ]))
    }

    fn get_rooms(&self) -> Result<Reply, AppError> {
        let rooms = self.state.stores.rooms.list_rooms()?;
        let items = rooms
            .iter()
            .map(|room| {
                format!(
                    "{}:{}:{}:{}:{}",
                    room.id,
                    encode(&room.name),
                    room.creator_id,
                    encode(&room.creator_name),
                    self.state.registry.members(room.id).len()
                )
            })
            .collect();
        Ok(Reply::with(items))
    }

    fn create_room(&self, request: &Request, me: Identity) -> Result<Reply, AppError> {
        let room = self
            .state
            .stores
            .rooms
            .create_room(arg(request, 0), me.id, &me.name)?;
        Ok(Reply::with(vec![room.id.to_string()])
            .then(move |registry| registry.notify_new_room(room.id, &room.name, &me)))
    }

    fn delete_room(&self, request: &Request, me: Identity) -> Result<Reply, AppError> {
        let room = self
            .state
            .stores
            .rooms
            .delete_room(id_arg(request, 0, "room id")?, me.id)?;
        Ok(Reply::ok().then(move |registry| registry.notify_room_deleted(room.id)))
    }

    fn join_room(&mut self, request: &Request, me: Identity) -> Result<Reply, AppError> {
        let room = self
            .state
            .stores
            .rooms
            .find_room(id_arg(request, 0, "room id")?)?;
        let previous = self.session.active_room().filter(|prev| *prev != room.id);
        self.session.set_active_room(Some(room.id));
        Ok(Reply::ok().then(move |registry| {
            if let Some(prev) = previous {
                if registry.leave_room(prev, me.id) {
                    registry.broadcast_room_roster(prev);
                }
            }
            registry.join_room(room.id, me.id);
            registry.broadcast_room_roster(room.id);
        }))
    }

    fn leave_room(&mut self, request: &Request, me: Identity) -> Result<Reply, AppError> {
        let room = id_arg(request, 0, "room id")?;
        if self.session.active_room() == Some(room) {
            self.session.set_active_room(None);
        }
        Ok(Reply::ok().then(move |registry| {
            if registry.leave_room(room, me.id) {
                registry.broadcast_room_roster(room);
            }
        }))
    }

    fn list_posts(&self, request: &Request, filter: PostFilter) -> Result<Reply, AppError> {
        let room = id_arg(request, 0, "room id")?;
        let posts = self.state.stores.posts.list_posts(room, filter)?;
        Ok(Reply::with(posts.iter().map(post_item).collect()))
    }

    fn create_post(&self, request: &Request, me: Identity) -> Result<Reply, AppError> {
        let post_type = arg(request, 3)
            .parse::<PostType>()
            .map_err(AppError::MalformedFrame)?;
        let post = self.state.stores.posts.create_post(
            me.id,
            &me.name,
            CreatePost {
                room_id: id_arg(request, 0, "room id")?,
                title: arg(request, 1).to_string(),
                content: arg(request, 2).to_string(),
                post_type,
            },
        )?;
        Ok(Reply::with(vec![post.id.to_string()]).then(move |registry| {
            registry.notify_new_post(
                post.room_id,
                post.id,
                &post.title,
                &post.author_name,
                post.post_type.as_str(),
            )
        }))
    }

    fn delete_post(&self, request: &Request, me: Identity) -> Result<Reply, AppError> {
        let post = self
            .state
            .stores
            .posts
            .delete_post(id_arg(request, 0, "post id")?, me.id)?;
        Ok(Reply::ok().then(move |registry| registry.notify_post_deleted(post.room_id, post.id)))
    }

    fn get_post(&self, request: &Request) -> Result<Reply, AppError> {
        let post = self
            .state
            .stores
            .posts
            .find_post(id_arg(request, 0, "post id")?)?;
        Ok(Reply::with(vec![
            post.id.to_string(),
            post.room_id.to_string(),
            encode(&post.title),
            encode(&post.content),
            post.author_id.to_string(),
            encode(&post.author_name),
            post.post_type.to_string(),
            encode(&post.created_at.format(WIRE_TIME_FORMAT).to_string()),
            post.has_assignment.to_string(),
        ]))
    }

    fn get_comments(&self, request: &Request) -> Result<Reply, AppError> {
        let comments = self
            .state
            .stores
            .comments
            .list_comments(id_arg(request, 0, "post id")?)?;
        let items = comments
            .iter()
            .map(|c| {
                format!(
                    "{}:{}:{}:{}:{}",
                    c.id,
                    c.author_id,
                    encode(&c.author_name),
                    encode(&c.content),
                    encode(&c.created_at.format(WIRE_TIME_FORMAT).to_string())
                )
            })
            .collect();
        Ok(Reply::with(items))
    }

    fn create_comment(&self, request: &Request, me: Identity) -> Result<Reply, AppError> {
        let post = self
            .state
            .stores
            .posts
            .find_post(id_arg(request, 0, "post id")?)?;
        let comment =
            self.state
                .stores
                .comments
                .create_comment(post.id, me.id, &me.name, arg(request, 1))?;
        Ok(Reply::with(vec![comment.id.to_string()]).then(move |registry| {
            registry.notify_new_comment(
                post.room_id,
                post.id,
                comment.id,
                &comment.author_name,
                &comment.content,
            )
        }))
    }

    fn mark_read(&self, request: &Request, me: Identity) -> Result<Reply, AppError> {
        let post = self
            .state
            .stores
            .posts
            .find_post(id_arg(request, 0, "post id")?)?;
        self.state.stores.reads.mark_read(post.id, me.id, &me.name)?;
        Ok(Reply::ok().then(move |registry| registry.notify_post_read(post.room_id, post.id, &me)))
    }

    fn get_read_status(&self, request: &Request) -> Result<Reply, AppError> {
        let statuses = self
            .state
            .stores
            .reads
            .read_status(id_arg(request, 0, "post id")?)?;
        let items = statuses
            .iter()
            .map(|r| {
                format!(
                    "{}:{}:{}",
                    r.user_id,
                    encode(&r.nickname),
                    encode(&r.read_at.format(WIRE_TIME_FORMAT).to_string())
                )
            })
            .collect();
        Ok(Reply::with(items))
    }

    fn create_assignment(&self, request: &Request, me: Identity) -> Result<Reply, AppError> {
        let assignment = self.state.stores.assignments.create_assignment(
            me.id,
            CreateAssignment {
                post_id: id_arg(request, 0, "post id")?,
                title: arg(request, 1).to_string(),
                description: arg(request, 2).to_string(),
                due_date: parse_due_date(arg(request, 3))?,
            },
        )?;
        Ok(Reply::with(vec![assignment.id.to_string()]))
    }

    fn get_assignment(&self, request: &Request) -> Result<Reply, AppError> {
        let assignment = self
            .state
            .stores
            .assignments
            .assignment_for_post(id_arg(request, 0, "post id")?)?;
        let due = assignment
            .due_date
            .map(|d| d.format(WIRE_TIME_FORMAT).to_string())
            .unwrap_or_default();
        Ok(Reply::with(vec![
            assignment.id.to_string(),
            assignment.post_id.to_string(),
            encode(&assignment.title),
            encode(&assignment.description),
            encode(&due),
        ]))
    }

    fn submit_assignment(&self, request: &Request, me: Identity) -> Result<Reply, AppError> {
        let attachment = match arg(request, 2) {
            "" => None,
            file_name => Some(AttachmentRef {
                file_name: file_name.to_string(),
                file_path: arg(request, 3).to_string(),
                file_size: match arg(request, 4) {
                    "" => 0,
                    size => size.trim().parse().map_err(|_| {
                        AppError::MalformedFrame("file size must be a number".to_string())
                    })?,
                },
            }),
        };
        let stores = &self.state.stores;
        let assignment = stores
            .assignments
            .find_assignment(id_arg(request, 0, "assignment id")?)?;
        let post = stores.posts.find_post(assignment.post_id)?;
        let submission = stores.assignments.submit(
            me.id,
            &me.name,
            SubmitAssignment {
                assignment_id: assignment.id,
                content: arg(request, 1).to_string(),
                attachment,
            },
        )?;
        Ok(Reply::with(vec![submission.id.to_string()]).then(move |registry| {
            registry.notify_assignment_submitted(post.author_id, assignment.id, &me)
        }))
    }

    fn get_submissions(&self, request: &Request) -> Result<Reply, AppError> {
        let submissions = self
            .state
            .stores
            .assignments
            .list_submissions(id_arg(request, 0, "assignment id")?)?;
        Ok(Reply::with(submissions.iter().map(submission_item).collect()))
    }

    fn get_my_submission(&self, request: &Request, me: Identity) -> Result<Reply, AppError> {
        let submission = self
            .state
            .stores
            .assignments
            .my_submission(id_arg(request, 0, "assignment id")?, me.id)?;
        Ok(Reply::with(vec![
            submission.id.to_string(),
            encode(&submission.content),
            submission.status.to_string(),
            submission.score.map(|v| v.to_string()).unwrap_or_default(),
            encode(&submission.submitted_at.format(WIRE_TIME_FORMAT).to_string()),
            encode(submission.feedback.as_deref().unwrap_or_default()),
        ]))
    }

    fn grade_submission(&self, request: &Request, me: Identity) -> Result<Reply, AppError> {
        let score = arg(request, 1)
            .trim()
            .parse()
            .map_err(|_| AppError::MalformedFrame("score must be a number".to_string()))?;
        let graded = self.state.stores.assignments.grade(
            me.id,
            GradeSubmission {
                submission_id: id_arg(request, 0, "submission id")?,
                score,
                feedback: arg(request, 2).to_string(),
            },
        )?;
        Ok(Reply::ok().then(move |registry| {
            registry.notify_submission_graded(
                graded.user_id,
                graded.assignment_id,
                graded.id,
                score,
            )
        }))
    }

    fn chat(request: &Request, me: Identity) -> Reply {
        let message = arg(request, 0).to_string();
        Reply::ok().then(move |registry| registry.notify_chat(&me, &message))
    }

    fn announce_read(&self, request: &Request, me: Identity) -> Result<Reply, AppError> {
        let post = self
            .state
            .stores
            .posts
            .find_post(id_arg(request, 0, "post id")?)?;
        Ok(Reply::ok().then(move |registry| registry.notify_post_read(post.room_id, post.id, &me)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::frame::{Response, ServerFrame};
    use crate::gateway::registry::Registry;
    use crate::gateway::session::Outbound;
    use crate::state::AppState;
    use crate::store::Stores;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    struct Peer {
        handler: ConnectionHandler,
        rx: mpsc::UnboundedReceiver<Outbound>,
    }

    impl Peer {
        fn login(state: &AppState, id: u64, name: &str) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let mut peer = Self {
                handler: ConnectionHandler::new(state.clone(), tx),
                rx,
            };
            peer.handler.handle_line(&format!("AUTH:{id}:{name}"));
            peer.frames();
            peer
        }

        fn frames(&mut self) -> Vec<String> {
            let mut frames = Vec::new();
            while let Ok(out) = self.rx.try_recv() {
                if let Outbound::Frame(line) = out {
                    frames.push(line);
                }
            }
            frames
        }

        /// The response to `line`. Pushes queued before it are discarded,
        /// pushes queued after it stay unread.
        fn call(&mut self, line: &str) -> Response {
            self.handler.handle_line(line);
            loop {
                match self.rx.try_recv() {
                    Ok(Outbound::Frame(frame)) => match ServerFrame::parse(&frame) {
                        Ok(ServerFrame::Response(response)) => return response,
                        Ok(ServerFrame::Push(_)) => continue,
                        Err(e) => panic!("unparseable frame {frame:?}: {e}"),
                    },
                    other => panic!("no response queued: {other:?}"),
                }
            }
        }

        fn id(&mut self, line: &str) -> u64 {
            let response = self.call(line);
            assert!(response.is_success(), "{line}: {response:?}");
            response.value(0).unwrap().parse().unwrap()
        }
    }

    fn state() -> AppState {
        AppState {
            registry: Arc::new(Registry::new()),
            stores: Stores::in_memory(),
        }
    }

    #[test]
    fn test_arity_and_vocabulary_errors() {
        let state = state();
        let mut kim = Peer::login(&state, 1, "Kim");
        let response = kim.call("CREATE_POST|1|title");
        assert_eq!(
            response.error_message(),
            Some("CREATE_POST expects at least 4 argument(s)")
        );
        let response = kim.call("FLY_AWAY");
        assert_eq!(response.error_message(), Some("unknown command"));
        let response = kim.call("JOIN_ROOM|abc");
        assert_eq!(response.error_message(), Some("room id must be a number"));
    }

    #[test]
    fn test_notice_rules_and_post_type() {
        let state = state();
        let mut kim = Peer::login(&state, 1, "Kim");
        let mut lee = Peer::login(&state, 2, "Lee");
        let room = kim.id("CREATE_ROOM|Rust");

        assert!(!lee.call(&format!("CREATE_POST|{room}|Exam|Friday|NOTICE")).is_success());
        assert!(!lee.call(&format!("CREATE_POST|{room}|Meme|lol|MEME")).is_success());
        lee.id(&format!("CREATE_POST|{room}|Question|borrowck?|general"));
        kim.id(&format!("CREATE_POST|{room}|Exam|Friday|NOTICE"));

        assert_eq!(kim.call(&format!("GET_POSTS|{room}")).items().len(), 2);
        let notices = kim.call(&format!("GET_NOTICES|{room}")).items();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0][1], "Exam");
        assert_eq!(notices[0][3], "Kim");
        assert_eq!(notices[0][4], "NOTICE");
        assert_eq!(notices[0][6], "false");
        assert_eq!(kim.call(&format!("GET_GENERAL_POSTS|{room}")).items().len(), 1);
    }

    #[test]
    fn test_post_detail_keeps_separators_in_text() {
        let state = state();
        let mut kim = Peer::login(&state, 1, "Kim");
        let room = kim.id("CREATE_ROOM|Rust");
        let request = Request::new(
            None,
            Command::CreatePost,
            vec![
                room.to_string(),
                "a|b: c, d".to_string(),
                "line one\nline two".to_string(),
                "GENERAL".to_string(),
            ],
        );
        let post = kim.id(&request.to_wire());

        let detail = kim.call(&format!("GET_POST|{post}"));
        assert_eq!(detail.value(1), Some(room.to_string()));
        assert_eq!(detail.value(2).as_deref(), Some("a|b: c, d"));
        assert_eq!(detail.value(3).as_deref(), Some("line one\nline two"));
        assert_eq!(detail.value(5).as_deref(), Some("Kim"));
    }

    #[test]
    fn test_join_switches_active_room() {
        let state = state();
        let mut kim = Peer::login(&state, 1, "Kim");
        let first = kim.id("CREATE_ROOM|One");
        let second = kim.id("CREATE_ROOM|Two");
        kim.frames();

        kim.call(&format!("JOIN_ROOM|{first}"));
        let frames = kim.frames();
        assert!(frames.contains(&format!("ROOM_JOIN:{first}:1:Kim")));
        assert!(frames.contains(&format!("ROOM_USERLIST:{first}:1:Kim")));

        kim.call(&format!("JOIN_ROOM|{second}"));
        let frames = kim.frames();
        assert!(frames.contains(&format!("ROOM_LEAVE:{first}:1:Kim")));
        assert!(frames.contains(&format!("ROOM_JOIN:{second}:1:Kim")));
        assert!(state.registry.members(first).is_empty());
        assert_eq!(state.registry.members(second), vec![1]);
        assert_eq!(kim.handler.session().active_room(), Some(second));

        assert!(kim.call(&format!("LEAVE_ROOM|{second}")).is_success());
        assert_eq!(kim.handler.session().active_room(), None);
        // Leaving a room you are not in is a quiet success.
        kim.frames();
        assert!(kim.call(&format!("LEAVE_ROOM|{second}")).is_success());
        assert!(kim.frames().is_empty());
    }

    #[test]
    fn test_delete_room_is_creator_only() {
        let state = state();
        let mut kim = Peer::login(&state, 1, "Kim");
        let mut lee = Peer::login(&state, 2, "Lee");
        let room = kim.id("CREATE_ROOM|Rust");
        lee.frames();

        let denied = lee.call(&format!("DELETE_ROOM|{room}"));
        assert_eq!(denied.error_message(), Some("only the room creator can delete it"));
        assert!(kim.call(&format!("DELETE_ROOM|{room}")).is_success());
        assert_eq!(lee.frames(), vec![format!("ROOM_DELETED:{room}")]);
        assert!(kim.call("GET_ROOMS").items().is_empty());
    }

    #[test]
    fn test_read_receipts() {
        let state = state();
        let mut kim = Peer::login(&state, 1, "Kim");
        let mut lee = Peer::login(&state, 2, "Lee");
        let room = kim.id("CREATE_ROOM|Rust");
        let post = kim.id(&format!("CREATE_POST|{room}|Exam|Friday|NOTICE"));
        kim.call(&format!("JOIN_ROOM|{room}"));
        kim.frames();

        assert!(lee.call(&format!("MARK_READ|{post}")).is_success());
        assert_eq!(kim.frames(), vec![format!("POST_READ:{room}:{post}:2:Lee")]);
        let again = lee.call(&format!("MARK_READ|{post}"));
        assert_eq!(again.error_message(), Some("post already read"));
        assert!(kim.frames().is_empty());

        let status = kim.call(&format!("GET_READ_STATUS|{post}")).items();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0][0], "2");
        assert_eq!(status[0][1], "Lee");

        assert!(lee.call(&format!("ANNOUNCE_READ|{post}")).is_success());
        assert_eq!(kim.frames(), vec![format!("POST_READ:{room}:{post}:2:Lee")]);
    }

    #[test]
    fn test_assignment_submit_and_grade() {
        let state = state();
        let mut kim = Peer::login(&state, 1, "Kim");
        let mut lee = Peer::login(&state, 2, "Lee");
        let room = kim.id("CREATE_ROOM|Rust");
        let post = kim.id(&format!("CREATE_POST|{room}|HW1|Traits|GENERAL"));

        let bad_date = kim.call(&format!("CREATE_ASSIGNMENT|{post}|HW1|Traits|someday"));
        assert!(!bad_date.is_success());
        let denied = lee.call(&format!("CREATE_ASSIGNMENT|{post}|HW1|Traits|"));
        assert!(!denied.is_success());
        let assignment = kim.id(&format!("CREATE_ASSIGNMENT|{post}|HW1|Traits|2026-11-01"));

        let detail = lee.call(&format!("GET_ASSIGNMENT|{post}"));
        assert_eq!(detail.value(0), Some(assignment.to_string()));
        assert_eq!(detail.value(4).as_deref(), Some("2026-11-01 23:59"));
        let posts = lee.call(&format!("GET_POSTS|{room}")).items();
        assert_eq!(posts[0][6], "true");
        kim.frames();

        let submission = lee.id(&format!(
            "SUBMIT_ASSIGNMENT|{assignment}|impl Display|hw1.rs|/uploads/hw1.rs|2048"
        ));
        assert_eq!(
            kim.frames(),
            vec![format!("ASSIGNMENT_SUBMITTED:{assignment}:2:Lee")]
        );
        let twice = lee.call(&format!("SUBMIT_ASSIGNMENT|{assignment}|again"));
        assert_eq!(twice.error_message(), Some("assignment already submitted"));

        let list = kim.call(&format!("GET_SUBMISSIONS|{assignment}")).items();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0][2], "Lee");
        assert_eq!(list[0][5], "SUBMITTED");
        assert_eq!(list[0][6], "");

        assert!(!lee.call(&format!("GRADE_SUBMISSION|{submission}|100|self-graded")).is_success());
        assert!(!kim.call(&format!("GRADE_SUBMISSION|{submission}|A+|great")).is_success());
        lee.frames();
        assert!(kim.call(&format!("GRADE_SUBMISSION|{submission}|95|nice, tidy")).is_success());
        assert_eq!(
            lee.frames(),
            vec![format!("SUBMISSION_GRADED:{assignment}:{submission}:95")]
        );

        let mine = lee.call(&format!("GET_MY_SUBMISSION|{assignment}"));
        assert_eq!(mine.value(0), Some(submission.to_string()));
        assert_eq!(mine.value(1).as_deref(), Some("impl Display"));
        assert_eq!(mine.value(2).as_deref(), Some("GRADED"));
        assert_eq!(mine.value(3).as_deref(), Some("95"));
        assert_eq!(mine.value(5).as_deref(), Some("nice, tidy"));
    }

    #[test]
    fn test_login_and_register_need_no_handshake() {
        let state = state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut handler = ConnectionHandler::new(state.clone(), tx);
        handler.handle_line("REGISTER|kim|secret|Kim");
        handler.handle_line("LOGIN|kim|secret");
        handler.handle_line("LOGIN|kim|wrong");
        let mut frames = Vec::new();
        while let Ok(Outbound::Frame(line)) = rx.try_recv() {
            frames.push(line);
        }
        let id = frames[0]
            .strip_prefix("REGISTER_RESPONSE|SUCCESS|")
            .unwrap()
            .to_string();
        assert_eq!(frames[1], format!("LOGIN_RESPONSE|SUCCESS|{id}|Kim"));
        assert!(frames[2].starts_with("LOGIN_RESPONSE|ERROR|"));

        let mut peer = Peer::login(&state, id.parse().unwrap(), "Kim");
        let user = peer.call(&format!("GET_USER|{id}"));
        assert_eq!(user.value(1).as_deref(), Some("kim"));
        assert_eq!(user.value(2).as_deref(), Some("Kim"));
    }

    #[test]
    fn test_parse_due_date_layouts() {
        assert_eq!(parse_due_date("").unwrap(), None);
        let due = parse_due_date("2026-11-01 18:30").unwrap().unwrap();
        assert_eq!(due.format(WIRE_TIME_FORMAT).to_string(), "2026-11-01 18:30");
        let end_of_day = parse_due_date("2026-11-01").unwrap().unwrap();
        assert_eq!(end_of_day.format(WIRE_TIME_FORMAT).to_string(), "2026-11-01 23:59");
        assert!(parse_due_date("next friday").is_err());
    }
}
