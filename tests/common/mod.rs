#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use studyhub::models::user::CreateUser;
use studyhub::server::Server;
use studyhub::state::AppState;
use studyhub::store::memory::MemoryStore;
use studyhub::store::Stores;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

pub const WAIT: Duration = Duration::from_secs(2);

/// A server on an ephemeral port with its own in-memory store.
/// Each instance is isolated, so tests can run in parallel.
pub struct TestServer {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn spawn() -> Self {
        Self::spawn_with(|_| {}).await
    }

    /// Like [`TestServer::spawn`], with a chance to swap collaborators
    /// before the server starts.
    pub async fn spawn_with(customize: impl FnOnce(&mut Stores)) -> Self {
        let store = Arc::new(MemoryStore::new());
        let mut stores = Stores::from_memory(store.clone());
        customize(&mut stores);
        let state = AppState::new(stores);
        let server = Server::bind("127.0.0.1:0", state.clone())
            .await
            .expect("failed to bind test server");
        let addr = server.local_addr().expect("no local address");

        let (shutdown, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(server.run(async move {
            let _ = signal.await;
        }));

        Self {
            state,
            store,
            addr,
            shutdown: Some(shutdown),
            task: Some(task),
        }
    }

    /// Stop accepting and close every connection; returns once the accept
    /// loop has exited.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    /// Register a user in the store and return its id.
    pub fn create_user(&self, username: &str, nickname: &str) -> u64 {
        use studyhub::store::UserDirectory;
        self.store
            .register(CreateUser {
                username: username.to_string(),
                password: "pw".to_string(),
                nickname: nickname.to_string(),
            })
            .expect("failed to create test user")
            .id
    }

    /// Open a raw line connection.
    pub async fn connect(&self) -> RawConn {
        RawConn::connect(self.addr).await
    }

    /// Open a connection and complete the handshake, discarding the ack and
    /// the roster broadcast.
    pub async fn login(&self, user_id: u64, name: &str) -> RawConn {
        let mut conn = self.connect().await;
        conn.send(&format!("AUTH:{user_id}:{name}")).await;
        assert_eq!(conn.recv().await, "CONNECTED:success");
        conn.expect_prefix("USERLIST:").await;
        conn
    }

    /// Wait until the registry reports `count` live sessions.
    pub async fn wait_online(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + WAIT;
        while self.state.registry.online_count() != count {
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {count} online, have {}",
                self.state.registry.online_count()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

/// One client socket speaking raw protocol lines.
pub struct RawConn {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
}

impl RawConn {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("failed to connect");
        let (read_half, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .expect("failed to write");
    }

    /// Next line from the server; panics on timeout or close.
    pub async fn recv(&mut self) -> String {
        tokio::time::timeout(WAIT, self.lines.next_line())
            .await
            .expect("timed out waiting for a frame")
            .expect("read failed")
            .expect("connection closed")
    }

    /// Next line, or `None` if the server closed the connection.
    pub async fn recv_or_close(&mut self) -> Option<String> {
        tokio::time::timeout(WAIT, self.lines.next_line())
            .await
            .expect("timed out waiting for a frame")
            .ok()
            .flatten()
    }

    /// Skip frames until one starts with `prefix`.
    pub async fn expect_prefix(&mut self, prefix: &str) -> String {
        loop {
            let line = self.recv().await;
            if line.starts_with(prefix) {
                return line;
            }
        }
    }

    /// Whether a frame starting with `prefix` arrives within `within`.
    pub async fn sees_prefix(&mut self, prefix: &str, within: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + within;
        loop {
            let left = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(left, self.lines.next_line()).await {
                Ok(Ok(Some(line))) if line.starts_with(prefix) => return true,
                Ok(Ok(Some(_))) => continue,
                _ => return false,
            }
        }
    }

    /// Write raw bytes with no trailing newline.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("failed to write");
    }

    /// Send a request and return its response, skipping interleaved pushes.
    pub async fn request(&mut self, line: &str) -> String {
        self.send(line).await;
        loop {
            let frame = self.recv().await;
            if frame.contains("_RESPONSE|") {
                return frame;
            }
        }
    }
}
