use std::panic::{self, AssertUnwindSafe};

use tokio::sync::mpsc;

use super::frame::{ClientFrame, Handshake, HANDSHAKE_TAG, Push, PushTag, Request, Response};
use super::registry::Registry;
use super::session::{Identity, Outbound, Session};
use crate::error::{AppError, StoreError};
use crate::state::AppState;

/// Registry work to run once a request's response has been queued.
pub(super) type Notify = Box<dyn FnOnce(&Registry) + Send>;

/// Successful command result: response payload plus follow-up pushes.
pub(super) struct Reply {
    pub fields: Vec<String>,
    pub notify: Vec<Notify>,
}

impl Reply {
    pub fn ok() -> Self {
        Self::with(Vec::new())
    }

    pub fn with(fields: Vec<String>) -> Self {
        Self {
            fields,
            notify: Vec::new(),
        }
    }

    pub fn then(mut self, f: impl FnOnce(&Registry) + Send + 'static) -> Self {
        self.notify.push(Box::new(f));
        self
    }
}

/// Protocol state machine for one connection, independent of the socket.
///
/// Every frame destined for the peer goes through the session's outbound
/// channel, so responses and pushes keep their relative order.
pub struct ConnectionHandler {
    pub(super) state: AppState,
    pub(super) session: Session,
}

impl ConnectionHandler {
    pub fn new(state: AppState, tx: mpsc::UnboundedSender<Outbound>) -> Self {
        let connection_id = state.registry.next_connection_id();
        Self {
            state,
            session: Session::new(connection_id, tx),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Handle one inbound line. At most one response is queued per request,
    /// and it is queued before this returns.
    pub fn handle_line(&mut self, line: &str) {
        if !self.session.is_running() {
            return;
        }
        tracing::debug!(connection = self.session.connection_id(), "<- {line}");
        match ClientFrame::parse(line) {
            Ok(ClientFrame::Handshake(handshake)) => self.handshake(handshake),
            Ok(ClientFrame::Request(request)) => self.request(&request),
            Err(e) if line.starts_with(HANDSHAKE_TAG) => {
                tracing::warn!("rejected handshake {line:?}: {e}");
                self.reject_handshake(&e.message());
            }
            Err(e) => {
                tracing::warn!("ignoring malformed frame {line:?}: {e}");
            }
        }
    }

    fn reject_handshake(&self, message: &str) {
        let push = Push::new(PushTag::Connected).field("error").text(message);
        self.session.send(&push.to_wire());
    }

    fn handshake(&mut self, handshake: Handshake) {
        let identity = Identity {
            id: handshake.user_id,
            name: handshake.name,
        };
        let handle = match self.session.authenticate(identity) {
            Ok(handle) => handle,
            Err(e) => {
                self.reject_handshake(&e.message());
                return;
            }
        };

        let registry = &self.state.registry;
        let superseded = registry.register(handle);
        if let Some(previous) = &superseded {
            previous
                .handle
                .send(&Push::new(PushTag::SessionReplaced).to_wire());
            previous.handle.close();
        }
        self.session
            .send(&Push::new(PushTag::Connected).field("success").to_wire());
        if let Some(previous) = superseded {
            for room in previous.rooms {
                registry.announce_departure(room, &previous.handle.identity);
            }
        }
        registry.broadcast_roster();
    }

    fn request(&mut self, request: &Request) {
        // A collaborator that panics fails the request, not the connection.
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.dispatch(request)))
            .unwrap_or_else(|_| {
                Err(AppError::from(StoreError::Internal(format!(
                    "{} panicked",
                    request.name
                ))))
            });
        match result {
            Ok(reply) => {
                self.send_response(&Response::success(request, reply.fields));
                for notify in reply.notify {
                    notify(&self.state.registry);
                }
            }
            Err(e) => {
                tracing::debug!("{} failed: {e}", request.name);
                self.send_response(&Response::error(request, e.message()));
            }
        }
    }

    fn send_response(&self, response: &Response) {
        let line = response.to_wire();
        tracing::debug!(connection = self.session.connection_id(), "-> {line}");
        self.session.send(&line);
    }

    /// Release everything the connection holds in the registry. Runs its
    /// effects once no matter how many times it is called.
    pub fn teardown(&mut self) {
        if !self.session.mark_closed() {
            return;
        }
        let Some(identity) = self.session.identity().cloned() else {
            return;
        };
        let connection_id = self.session.connection_id();
        let registry = &self.state.registry;

        if let Some(room) = self.session.active_room() {
            self.session.set_active_room(None);
            if registry.is_current(identity.id, connection_id) && registry.leave_room(room, identity.id)
            {
                registry.broadcast_room_roster(room);
            }
        }

        if registry.unregister_connection(identity.id, connection_id).is_some() {
            registry.broadcast_roster();
        } else {
            tracing::debug!(
                "connection {connection_id} of user {} was already released",
                identity.id
            );
        }
    }
}

impl Drop for ConnectionHandler {
    fn drop(&mut self) {
        self.teardown();
    }
}
