//! Client-side request/response correlation over one connection.
//!
//! ```text
//!   call() ──lock──> write `<id>#CMD|args` ──> server
//!     │                                          │
//!     └── waits on pending[id] <── reader task <─┤ `<id>#CMD_RESPONSE|...`
//!                                  │             │
//!                 push subscribers <┘ <──────────┘ `TAG:fields`
//! ```
//!
//! Calls are serialized: at most one request is in flight at a time. A
//! response completes a waiter only when both its id and its command name
//! match; anything else is stale and dropped.

use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{broadcast, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, LinesCodec};

use crate::error::AppError;
use crate::gateway::frame::{
    Command, Handshake, Push, PushTag, Request, Response, ServerFrame, MAX_LINE_LENGTH,
};
use crate::models::post::PostType;
use crate::models::{CommentId, PostId, RoomId, UserId};

const PUSH_BUFFER: usize = 256;

struct Waiter {
    command: String,
    tx: oneshot::Sender<Response>,
}

type Pending = Arc<DashMap<u64, Waiter>>;

/// One row of a `GET_ROOMS` answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSummary {
    pub id: RoomId,
    pub name: String,
    pub creator_id: UserId,
    pub creator_name: String,
    pub online: usize,
}

pub struct Client {
    /// Held for the whole of a call, which is what serializes calls.
    writer: Mutex<OwnedWriteHalf>,
    pending: Pending,
    next_id: AtomicU64,
    pushes: broadcast::Sender<Push>,
    connected: Arc<AtomicBool>,
    call_timeout: Duration,
    reader: JoinHandle<()>,
}

fn closed() -> AppError {
    AppError::Disconnected("connection closed".to_string())
}

async fn write_line(writer: &mut OwnedWriteHalf, line: &str) -> std::io::Result<()> {
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');
    writer.write_all(&buf).await?;
    writer.flush().await
}

fn route_response(pending: &DashMap<u64, Waiter>, response: Response) {
    let Some(id) = response.id else {
        tracing::debug!("dropping uncorrelated {} response", response.command);
        return;
    };
    match pending.remove_if(&id, |_, waiter| waiter.command == response.command) {
        Some((_, waiter)) => {
            let _ = waiter.tx.send(response);
        }
        None => tracing::debug!("dropping stale response {id} for {}", response.command),
    }
}

async fn read_loop(
    read_half: OwnedReadHalf,
    pending: Pending,
    pushes: broadcast::Sender<Push>,
    connected: Arc<AtomicBool>,
) {
    let mut lines = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    loop {
        let line = match lines.next().await {
            Some(Ok(line)) => line,
            None => break,
            Some(Err(e)) => {
                tracing::warn!("dropping connection: {e}");
                break;
            }
        };
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }
        match ServerFrame::parse(line) {
            Ok(ServerFrame::Response(response)) => route_response(&pending, response),
            Ok(ServerFrame::Push(push)) => {
                // No subscribers is fine.
                let _ = pushes.send(push);
            }
            Err(e) => tracing::warn!("ignoring unparseable frame {line:?}: {e}"),
        }
    }
    connected.store(false, Ordering::SeqCst);
    // Dropping the senders wakes every waiter with a disconnect.
    pending.clear();
}

fn id_field(response: &Response, index: usize) -> Result<u64, AppError> {
    response
        .value(index)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| {
            AppError::MalformedFrame(format!("{} answer has no id", response.command))
        })
}

impl Client {
    pub async fn connect(addr: impl ToSocketAddrs, call_timeout: Duration) -> Result<Self, AppError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let (read_half, write_half) = stream.into_split();

        let pending: Pending = Arc::new(DashMap::new());
        let (pushes, _) = broadcast::channel(PUSH_BUFFER);
        let connected = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_loop(
            read_half,
            pending.clone(),
            pushes.clone(),
            connected.clone(),
        ));

        Ok(Self {
            writer: Mutex::new(write_half),
            pending,
            next_id: AtomicU64::new(0),
            pushes,
            connected,
            call_timeout,
            reader,
        })
    }

    /// Receive every push that arrives from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Push> {
        self.pushes.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Number of calls waiting for an answer. Never more than one.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Send the handshake and wait for the server's `CONNECTED` push.
    pub async fn authenticate(&self, user_id: UserId, name: &str) -> Result<(), AppError> {
        let mut writer = self.writer.lock().await;
        let mut pushes = self.pushes.subscribe();
        let handshake = Handshake {
            user_id,
            name: name.to_string(),
        };
        write_line(&mut writer, &handshake.to_wire()).await?;

        let ack = async {
            loop {
                match pushes.recv().await {
                    Ok(push) if push.tag == PushTag::Connected => return Ok(push),
                    Ok(_) => continue,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::debug!("skipped {n} push(es) while waiting for CONNECTED");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Err(closed()),
                }
            }
        };
        let push = tokio::time::timeout(self.call_timeout, ack)
            .await
            .map_err(|_| AppError::Timeout)??;

        match push.value(0).as_deref() {
            Some("success") => Ok(()),
            _ => Err(AppError::Rejected(
                push.value(1)
                    .unwrap_or_else(|| "handshake refused".to_string()),
            )),
        }
    }

    /// Send one request and wait for its answer, which may be an `ERROR`
    /// response.
    pub async fn call(&self, command: Command, args: &[&str]) -> Result<Response, AppError> {
        let mut writer = self.writer.lock().await;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let request = Request::new(
            Some(id),
            command,
            args.iter().map(|a| a.to_string()).collect(),
        );

        let (tx, rx) = oneshot::channel();
        self.pending.insert(
            id,
            Waiter {
                command: request.name.clone(),
                tx,
            },
        );
        if !self.is_connected() {
            self.pending.remove(&id);
            return Err(closed());
        }
        if let Err(e) = write_line(&mut writer, &request.to_wire()).await {
            self.pending.remove(&id);
            return Err(e.into());
        }

        let answer = tokio::time::timeout(self.call_timeout, rx).await;
        drop(writer);
        match answer {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(closed()),
            Err(_) => {
                self.pending.remove(&id);
                tracing::warn!("{command} (request {id}) timed out");
                Err(AppError::Timeout)
            }
        }
    }

    /// Like [`Client::call`], with an `ERROR` answer turned into
    /// [`AppError::Rejected`].
    pub async fn request(&self, command: Command, args: &[&str]) -> Result<Response, AppError> {
        let response = self.call(command, args).await?;
        match response.error_message() {
            Some(msg) => Err(AppError::Rejected(msg.to_string())),
            None => Ok(response),
        }
    }

    /// Returns the user id and nickname.
    pub async fn login(&self, username: &str, password: &str) -> Result<(UserId, String), AppError> {
        let response = self.request(Command::Login, &[username, password]).await?;
        Ok((id_field(&response, 0)?, response.value(1).unwrap_or_default()))
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        nickname: &str,
    ) -> Result<UserId, AppError> {
        let response = self
            .request(Command::Register, &[username, password, nickname])
            .await?;
        id_field(&response, 0)
    }

    pub async fn rooms(&self) -> Result<Vec<RoomSummary>, AppError> {
        let response = self.request(Command::GetRooms, &[]).await?;
        response
            .items()
            .into_iter()
            .map(|item| match item.as_slice() {
                [id, name, creator_id, creator_name, online] => Some(RoomSummary {
                    id: id.parse().ok()?,
                    name: name.clone(),
                    creator_id: creator_id.parse().ok()?,
                    creator_name: creator_name.clone(),
                    online: online.parse().ok()?,
                }),
                _ => None,
            })
            .map(|room| room.ok_or_else(|| AppError::MalformedFrame("bad room entry".to_string())))
            .collect()
    }

    pub async fn create_room(&self, name: &str) -> Result<RoomId, AppError> {
        let response = self.request(Command::CreateRoom, &[name]).await?;
        id_field(&response, 0)
    }

    pub async fn join_room(&self, room: RoomId) -> Result<(), AppError> {
        self.request(Command::JoinRoom, &[room.to_string().as_str()])
            .await?;
        Ok(())
    }

    pub async fn leave_room(&self, room: RoomId) -> Result<(), AppError> {
        self.request(Command::LeaveRoom, &[room.to_string().as_str()])
            .await?;
        Ok(())
    }

    pub async fn create_post(
        &self,
        room: RoomId,
        title: &str,
        content: &str,
        post_type: PostType,
    ) -> Result<PostId, AppError> {
        let response = self
            .request(
                Command::CreatePost,
                &[room.to_string().as_str(), title, content, post_type.as_str()],
            )
            .await?;
        id_field(&response, 0)
    }

    pub async fn create_comment(&self, post: PostId, content: &str) -> Result<CommentId, AppError> {
        let response = self
            .request(Command::CreateComment, &[post.to_string().as_str(), content])
            .await?;
        id_field(&response, 0)
    }

    pub async fn chat(&self, message: &str) -> Result<(), AppError> {
        self.request(Command::Chat, &[message]).await?;
        Ok(())
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
