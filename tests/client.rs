mod common;

use std::sync::Arc;
use std::time::Duration;

use common::TestServer;
use studyhub::client::Client;
use studyhub::error::AppError;
use studyhub::gateway::frame::{Command, PushTag, MAX_LINE_LENGTH};
use studyhub::models::post::PostType;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// A scripted peer: accepts one connection and hands the test its lines.
struct FakeServer {
    lines: tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
    writer: tokio::net::tcp::OwnedWriteHalf,
}

impl FakeServer {
    async fn start() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        (listener, addr)
    }

    async fn accept(listener: &TcpListener) -> Self {
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, writer) = stream.into_split();
        Self {
            lines: BufReader::new(read_half).lines(),
            writer,
        }
    }

    async fn next_line(&mut self, within: Duration) -> Option<String> {
        tokio::time::timeout(within, self.lines.next_line())
            .await
            .ok()
            .and_then(|line| line.ok().flatten())
    }

    async fn reply(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn test_login_authenticate_and_typed_calls() {
    let server = TestServer::spawn().await;
    let client = Client::connect(server.addr, common::WAIT).await.unwrap();

    let id = client.register("kim", "secret", "Kim").await.unwrap();
    let (logged_in, nickname) = client.login("kim", "secret").await.unwrap();
    assert_eq!((logged_in, nickname.as_str()), (id, "Kim"));
    client.authenticate(id, &nickname).await.unwrap();

    let room = client.create_room("Rust study").await.unwrap();
    client.join_room(room).await.unwrap();
    let rooms = client.rooms().await.unwrap();
    assert_eq!(rooms.len(), 1);
    assert_eq!(rooms[0].name, "Rust study");
    assert_eq!(rooms[0].creator_name, "Kim");
    assert_eq!(rooms[0].online, 1);

    let post = client
        .create_post(room, "Ownership | borrowing", "Read: ch. 4", PostType::Notice)
        .await
        .unwrap();
    client.create_comment(post, "done, thanks").await.unwrap();
    client.leave_room(room).await.unwrap();
}

#[tokio::test]
async fn test_wrong_password_is_rejected() {
    let server = TestServer::spawn().await;
    server.create_user("kim", "Kim");
    let client = Client::connect(server.addr, common::WAIT).await.unwrap();

    let err = client.login("kim", "nope").await.unwrap_err();
    assert!(matches!(err, AppError::Rejected(_)), "{err:?}");
    // The connection survives the error.
    assert!(client.login("kim", "pw").await.is_ok());
}

#[tokio::test]
async fn test_pushes_reach_subscribers() {
    let server = TestServer::spawn().await;
    let kim = Client::connect(server.addr, common::WAIT).await.unwrap();
    let lee = Client::connect(server.addr, common::WAIT).await.unwrap();
    kim.authenticate(1, "Kim").await.unwrap();
    lee.authenticate(2, "Lee").await.unwrap();

    let mut pushes = lee.subscribe();
    let room = kim.create_room("StudyGroupA").await.unwrap();

    let push = tokio::time::timeout(common::WAIT, async {
        loop {
            let push = pushes.recv().await.unwrap();
            if push.tag == PushTag::NewRoom {
                return push;
            }
        }
    })
    .await
    .unwrap();
    assert_eq!(push.value(0), Some(room.to_string()));
    assert_eq!(push.value(1).as_deref(), Some("StudyGroupA"));
    assert_eq!(push.value(3).as_deref(), Some("Kim"));
}

#[tokio::test]
async fn test_authenticate_twice_is_rejected() {
    let server = TestServer::spawn().await;
    let client = Client::connect(server.addr, common::WAIT).await.unwrap();
    client.authenticate(1, "Kim").await.unwrap();
    let err = client.authenticate(2, "Lee").await.unwrap_err();
    assert_eq!(err.message(), "already authenticated");
}

#[tokio::test]
async fn test_second_call_waits_for_first() {
    let (listener, addr) = FakeServer::start().await;
    let client = Arc::new(Client::connect(addr.as_str(), common::WAIT).await.unwrap());
    let mut peer = FakeServer::accept(&listener).await;

    let first = tokio::spawn({
        let client = client.clone();
        async move { client.call(Command::GetRooms, &[]).await }
    });
    let line = peer.next_line(common::WAIT).await.unwrap();
    assert_eq!(line, "1#GET_ROOMS");

    let second = tokio::spawn({
        let client = client.clone();
        async move { client.call(Command::Chat, &["hi"]).await }
    });
    // Nothing else goes out while the first call is open.
    assert_eq!(peer.next_line(Duration::from_millis(300)).await, None);
    assert_eq!(client.in_flight(), 1);

    peer.reply("1#GET_ROOMS_RESPONSE|SUCCESS|3:Rust:1:Kim:0").await;
    let first = first.await.unwrap().unwrap();
    assert_eq!(first.items()[0][1], "Rust");

    assert_eq!(peer.next_line(common::WAIT).await.unwrap(), "2#CHAT|hi");
    peer.reply("2#CHAT_RESPONSE|SUCCESS").await;
    assert!(second.await.unwrap().unwrap().is_success());
}

#[tokio::test]
async fn test_late_response_does_not_leak_into_next_call() {
    let (listener, addr) = FakeServer::start().await;
    let client = Client::connect(addr.as_str(), Duration::from_millis(200))
        .await
        .unwrap();
    let mut peer = FakeServer::accept(&listener).await;

    let mut pushes = client.subscribe();
    let err = client.call(Command::GetRooms, &[]).await.unwrap_err();
    assert!(matches!(err, AppError::Timeout));
    assert_eq!(err.message(), "no answer from server");
    assert_eq!(client.in_flight(), 0);
    assert_eq!(peer.next_line(common::WAIT).await.unwrap(), "1#GET_ROOMS");

    let next = tokio::spawn(async move {
        let response = client.call(Command::GetRooms, &[]).await;
        (client, response)
    });
    assert_eq!(peer.next_line(common::WAIT).await.unwrap(), "2#GET_ROOMS");
    // The answer to the abandoned call shows up first.
    peer.reply("1#GET_ROOMS_RESPONSE|SUCCESS|9:Stale:1:Kim:0").await;
    peer.reply("USERLIST:1:Kim").await;
    peer.reply("2#GET_ROOMS_RESPONSE|SUCCESS|4:Fresh:1:Kim:2").await;

    let (client, response) = next.await.unwrap();
    let response = response.unwrap();
    assert_eq!(response.id, Some(2));
    assert_eq!(response.items()[0][1], "Fresh");
    assert!(client.is_connected());

    let push = pushes.recv().await.unwrap();
    assert_eq!(push.tag, PushTag::UserList);
}

#[tokio::test]
async fn test_disconnect_fails_pending_call() {
    let (listener, addr) = FakeServer::start().await;
    let client = Client::connect(addr.as_str(), common::WAIT).await.unwrap();
    let peer = FakeServer::accept(&listener).await;

    let call = tokio::spawn(async move {
        let result = client.call(Command::GetRooms, &[]).await;
        (client, result)
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(peer);

    let (client, result) = call.await.unwrap();
    assert!(matches!(result, Err(AppError::Disconnected(_))), "{result:?}");
    assert!(!client.is_connected());
    assert!(matches!(
        client.call(Command::GetRooms, &[]).await,
        Err(AppError::Disconnected(_))
    ));
}

#[tokio::test]
async fn test_overlong_server_line_disconnects() {
    let (listener, addr) = FakeServer::start().await;
    let client = Client::connect(addr.as_str(), common::WAIT).await.unwrap();
    let mut peer = FakeServer::accept(&listener).await;

    peer.writer
        .write_all(&vec![b'x'; MAX_LINE_LENGTH + 1024])
        .await
        .unwrap();

    let deadline = tokio::time::Instant::now() + common::WAIT;
    while client.is_connected() {
        assert!(tokio::time::Instant::now() < deadline, "client kept the connection");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(matches!(
        client.call(Command::GetRooms, &[]).await,
        Err(AppError::Disconnected(_))
    ));
}
