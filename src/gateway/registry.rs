use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use super::frame::{Push, PushTag};
use super::session::{Identity, SessionHandle};
use crate::codec::encode;
use crate::models::{AssignmentId, CommentId, PostId, RoomId, SubmissionId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterScope {
    All,
    Room(RoomId),
}

/// Live sessions and room membership, shared by every connection task.
///
/// The two maps are updated independently; nothing reads them as one
/// consistent snapshot.
/// A connection pushed out by a newer registration of the same identity.
#[derive(Debug)]
pub struct Superseded {
    pub handle: SessionHandle,
    /// Rooms the identity was a member of through the old connection.
    pub rooms: Vec<RoomId>,
}

#[derive(Default)]
pub struct Registry {
    sessions: DashMap<UserId, SessionHandle>,
    rooms: DashMap<RoomId, HashSet<UserId>>,
    next_connection_id: AtomicU64,
}

fn format_roster(entries: &[Identity]) -> String {
    entries
        .iter()
        .map(|i| format!("{}:{}", i.id, encode(&i.name)))
        .collect::<Vec<_>>()
        .join(",")
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_connection_id(&self) -> u64 {
        self.next_connection_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Insert a session, replacing any other connection of the same identity.
    ///
    /// The replaced connection is returned so the caller can close it and
    /// announce the rooms it was dropped from; the new connection starts idle.
    pub fn register(&self, handle: SessionHandle) -> Option<Superseded> {
        let identity = handle.identity.clone();
        let previous = self.sessions.insert(identity.id, handle);
        tracing::info!("user connected: {} (id {})", identity.name, identity.id);
        let previous = previous?;
        tracing::info!("user {} reconnected, superseding the previous connection", identity.id);
        Some(Superseded {
            rooms: self.remove_from_all_rooms(identity.id),
            handle: previous,
        })
    }

    /// Remove an identity from the session map and every room. Idempotent.
    pub fn unregister(&self, user_id: UserId) -> Option<SessionHandle> {
        let removed = self.sessions.remove(&user_id).map(|(_, handle)| handle);
        if let Some(ref handle) = removed {
            tracing::info!(
                "user disconnected: {} (id {})",
                handle.identity.name,
                handle.identity.id
            );
        }
        self.remove_from_all_rooms(user_id);
        removed
    }

    /// Like [`Registry::unregister`], but only while `connection_id` is still
    /// the registered connection for the identity. Returns the rooms the
    /// identity was removed from, or `None` if nothing was owned.
    pub fn unregister_connection(&self, user_id: UserId, connection_id: u64) -> Option<Vec<RoomId>> {
        let (_, handle) = self
            .sessions
            .remove_if(&user_id, |_, h| h.connection_id == connection_id)?;
        tracing::info!(
            "user disconnected: {} (id {})",
            handle.identity.name,
            handle.identity.id
        );
        Some(self.remove_from_all_rooms(user_id))
    }

    /// Whether `connection_id` is the registered connection for `user_id`.
    pub fn is_current(&self, user_id: UserId, connection_id: u64) -> bool {
        self.sessions
            .get(&user_id)
            .map(|h| h.connection_id == connection_id)
            .unwrap_or(false)
    }

    fn remove_from_all_rooms(&self, user_id: UserId) -> Vec<RoomId> {
        let mut left = Vec::new();
        for mut entry in self.rooms.iter_mut() {
            if entry.value_mut().remove(&user_id) {
                left.push(*entry.key());
            }
        }
        self.rooms.retain(|_, members| !members.is_empty());
        left
    }

    /// Add `user_id` to `room` and announce it to the room, the newcomer included.
    pub fn join_room(&self, room: RoomId, user_id: UserId) -> bool {
        let inserted = self.rooms.entry(room).or_default().insert(user_id);
        if let Some(identity) = self.identity_of(user_id) {
            let push = Push::new(PushTag::RoomJoin)
                .field(room)
                .field(identity.id)
                .text(&identity.name);
            self.broadcast_room(room, &push);
        }
        inserted
    }

    /// Remove `user_id` from `room`. The leave notice reaches the remaining
    /// members and the leaver; nothing is sent if it was not a member.
    pub fn leave_room(&self, room: RoomId, user_id: UserId) -> bool {
        let removed = self
            .rooms
            .get_mut(&room)
            .map(|mut members| members.remove(&user_id))
            .unwrap_or(false);
        if !removed {
            return false;
        }
        self.rooms.remove_if(&room, |_, members| members.is_empty());
        if let Some(identity) = self.identity_of(user_id) {
            let push = Push::new(PushTag::RoomLeave)
                .field(room)
                .field(identity.id)
                .text(&identity.name);
            self.broadcast_room(room, &push);
            self.send_to(user_id, &push);
        }
        true
    }

    /// Tell the remaining members of `room` that `identity` is gone, for a
    /// membership that was already removed.
    pub fn announce_departure(&self, room: RoomId, identity: &Identity) {
        let push = Push::new(PushTag::RoomLeave)
            .field(room)
            .field(identity.id)
            .text(&identity.name);
        self.broadcast_room(room, &push);
        self.broadcast_room_roster(room);
    }

    fn identity_of(&self, user_id: UserId) -> Option<Identity> {
        self.sessions.get(&user_id).map(|h| h.identity.clone())
    }

    fn deliver(handle: &SessionHandle, line: &str) -> bool {
        if handle.send(line) {
            true
        } else {
            tracing::warn!(
                "dropping frame for user {}: connection closed",
                handle.identity.id
            );
            false
        }
    }

    /// Best-effort delivery to every registered session. Returns how many
    /// sessions accepted the frame.
    pub fn broadcast_all(&self, push: &Push) -> usize {
        let line = push.to_wire();
        let handles: Vec<SessionHandle> = self.sessions.iter().map(|h| h.value().clone()).collect();
        handles.iter().filter(|h| Self::deliver(h, &line)).count()
    }

    /// Delivery restricted to the current members of `room`.
    pub fn broadcast_room(&self, room: RoomId, push: &Push) -> usize {
        let line = push.to_wire();
        self.members(room)
            .into_iter()
            .filter_map(|user_id| self.sessions.get(&user_id).map(|h| h.value().clone()))
            .filter(|h| Self::deliver(h, &line))
            .count()
    }

    pub fn send_to(&self, user_id: UserId, push: &Push) -> bool {
        match self.sessions.get(&user_id).map(|h| h.value().clone()) {
            Some(handle) => Self::deliver(&handle, &push.to_wire()),
            None => false,
        }
    }

    pub fn members(&self, room: RoomId) -> Vec<UserId> {
        self.rooms
            .get(&room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Identities online at call time, in no particular order.
    pub fn roster(&self, scope: RosterScope) -> Vec<Identity> {
        match scope {
            RosterScope::All => self
                .sessions
                .iter()
                .map(|h| h.identity.clone())
                .collect(),
            RosterScope::Room(room) => self
                .members(room)
                .into_iter()
                .filter_map(|user_id| self.identity_of(user_id))
                .collect(),
        }
    }

    pub fn online_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.sessions.contains_key(&user_id)
    }

    pub fn broadcast_roster(&self) {
        let roster = self.roster(RosterScope::All);
        let push = Push::new(PushTag::UserList).field(format_roster(&roster));
        self.broadcast_all(&push);
    }

    pub fn broadcast_room_roster(&self, room: RoomId) {
        let roster = self.roster(RosterScope::Room(room));
        let push = Push::new(PushTag::RoomUserList)
            .field(room)
            .field(format_roster(&roster));
        self.broadcast_room(room, &push);
    }

    pub fn notify_new_room(&self, room: RoomId, name: &str, creator: &Identity) {
        let push = Push::new(PushTag::NewRoom)
            .field(room)
            .text(name)
            .field(creator.id)
            .text(&creator.name);
        self.broadcast_all(&push);
    }

    /// Announce the deletion and forget the room's membership.
    pub fn notify_room_deleted(&self, room: RoomId) {
        self.broadcast_all(&Push::new(PushTag::RoomDeleted).field(room));
        self.rooms.remove(&room);
    }

    /// Room members get the post itself; everyone gets a hint that the room changed.
    pub fn notify_new_post(
        &self,
        room: RoomId,
        post: PostId,
        title: &str,
        author_name: &str,
        post_type: &str,
    ) {
        let push = Push::new(PushTag::NewPost)
            .field(room)
            .field(post)
            .text(title)
            .text(author_name)
            .field(post_type);
        self.broadcast_room(room, &push);
        self.broadcast_all(&Push::new(PushTag::PostUpdate).field(room));
    }

    pub fn notify_post_deleted(&self, room: RoomId, post: PostId) {
        let push = Push::new(PushTag::PostDeleted).field(room).field(post);
        self.broadcast_room(room, &push);
    }

    pub fn notify_new_comment(
        &self,
        room: RoomId,
        post: PostId,
        comment: CommentId,
        author_name: &str,
        content: &str,
    ) {
        let push = Push::new(PushTag::NewComment)
            .field(room)
            .field(post)
            .field(comment)
            .text(author_name)
            .text(content);
        self.broadcast_room(room, &push);
    }

    pub fn notify_post_read(&self, room: RoomId, post: PostId, reader: &Identity) {
        let push = Push::new(PushTag::PostRead)
            .field(room)
            .field(post)
            .field(reader.id)
            .text(&reader.name);
        self.broadcast_room(room, &push);
    }

    pub fn notify_assignment_submitted(
        &self,
        post_author: UserId,
        assignment: AssignmentId,
        submitter: &Identity,
    ) {
        let push = Push::new(PushTag::AssignmentSubmitted)
            .field(assignment)
            .field(submitter.id)
            .text(&submitter.name);
        self.send_to(post_author, &push);
    }

    pub fn notify_submission_graded(
        &self,
        submitter: UserId,
        assignment: AssignmentId,
        submission: SubmissionId,
        score: i32,
    ) {
        let push = Push::new(PushTag::SubmissionGraded)
            .field(assignment)
            .field(submission)
            .field(score);
        self.send_to(submitter, &push);
    }

    pub fn notify_chat(&self, sender: &Identity, message: &str) {
        let push = Push::new(PushTag::Chat)
            .field(sender.id)
            .text(&sender.name)
            .text(message);
        self.broadcast_all(&push);
    }

    /// Tell every live session the server is going away, close it, and
    /// forget all state.
    pub fn disconnect_all(&self) {
        tracing::info!("disconnecting {} client(s)", self.sessions.len());
        let shutdown = Push::new(PushTag::ServerShutdown).to_wire();
        let handles: Vec<SessionHandle> = self.sessions.iter().map(|h| h.value().clone()).collect();
        for handle in handles {
            handle.send(&shutdown);
            handle.close();
        }
        self.sessions.clear();
        self.rooms.clear();
    }
}
