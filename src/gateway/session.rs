use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use crate::error::AppError;
use crate::models::{RoomId, UserId};

/// Who is on the other end of a connection, as asserted by its handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: UserId,
    pub name: String,
}

/// Instruction for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Frame(String),
    /// Stop writing and shut the socket down.
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Idle,
    InRoom(RoomId),
    Closed,
}

/// The registry's reference to a live, authenticated connection.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub connection_id: u64,
    pub identity: Identity,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl SessionHandle {
    pub fn new(connection_id: u64, identity: Identity, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            connection_id,
            identity,
            tx,
        }
    }

    /// Queue one frame. Returns false if the connection's writer is gone.
    pub fn send(&self, frame: &str) -> bool {
        self.tx.send(Outbound::Frame(frame.to_string())).is_ok()
    }

    pub fn close(&self) {
        let _ = self.tx.send(Outbound::Close);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Per-connection state, owned by the connection's handler.
#[derive(Debug)]
pub struct Session {
    connection_id: u64,
    identity: Option<Identity>,
    active_room: Option<RoomId>,
    tx: mpsc::UnboundedSender<Outbound>,
    running: AtomicBool,
}

impl Session {
    pub fn new(connection_id: u64, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self {
            connection_id,
            identity: None,
            active_room: None,
            tx,
            running: AtomicBool::new(true),
        }
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// The identity, or `Unauthenticated` before the handshake.
    pub fn require_identity(&self) -> Result<&Identity, AppError> {
        self.identity.as_ref().ok_or(AppError::Unauthenticated)
    }

    /// Set the identity once; it never changes afterwards.
    pub fn authenticate(&mut self, identity: Identity) -> Result<SessionHandle, AppError> {
        if self.identity.is_some() {
            return Err(AppError::MalformedFrame("already authenticated".to_string()));
        }
        self.identity = Some(identity.clone());
        Ok(SessionHandle::new(self.connection_id, identity, self.tx.clone()))
    }

    pub fn active_room(&self) -> Option<RoomId> {
        self.active_room
    }

    pub fn set_active_room(&mut self, room: Option<RoomId>) {
        self.active_room = room;
    }

    pub fn state(&self) -> ConnectionState {
        if !self.is_running() {
            return ConnectionState::Closed;
        }
        match (&self.identity, self.active_room) {
            (None, _) => ConnectionState::Connecting,
            (Some(_), None) => ConnectionState::Idle,
            (Some(_), Some(room)) => ConnectionState::InRoom(room),
        }
    }

    /// Queue a frame for this connection's own peer.
    pub fn send(&self, frame: &str) -> bool {
        self.tx.send(Outbound::Frame(frame.to_string())).is_ok()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Flip the running flag. Only the first caller gets `true`.
    pub fn mark_closed(&self) -> bool {
        self.running.swap(false, Ordering::SeqCst)
    }
}
