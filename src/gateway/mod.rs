pub mod commands;
pub mod frame;
pub mod handler;
pub mod registry;
pub mod session;

use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};

use crate::state::AppState;
use frame::MAX_LINE_LENGTH;
use handler::ConnectionHandler;
use session::Outbound;

/// Drive one client connection until the peer goes away, the writer fails,
/// or the registry asks the connection to close.
pub async fn handle_connection(stream: TcpStream, state: AppState) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    let (read_half, mut write_half) = stream.into_split();

    // Channel for everything written to this client
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();
    let mut handler = ConnectionHandler::new(state, tx);
    let connection_id = handler.session().connection_id();
    tracing::info!(connection = connection_id, "client connected from {peer}");

    let mut writer_task = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            let Outbound::Frame(line) = out else {
                break;
            };
            let mut buf = line.into_bytes();
            buf.push(b'\n');
            if write_half.write_all(&buf).await.is_err() {
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    let mut lines = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));
    loop {
        tokio::select! {
            line = lines.next() => {
                match line {
                    Some(Ok(line)) => {
                        let line = line.trim_end_matches('\r');
                        if line.is_empty() {
                            continue;
                        }
                        handler.handle_line(line);
                    }
                    None => break,
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        tracing::warn!(
                            connection = connection_id,
                            "line longer than {MAX_LINE_LENGTH} bytes, dropping client"
                        );
                        break;
                    }
                    Some(Err(LinesCodecError::Io(e))) => {
                        tracing::debug!(connection = connection_id, "read error: {e}");
                        break;
                    }
                }
            }
            _ = &mut writer_task => {
                tracing::debug!(connection = connection_id, "writer finished");
                break;
            }
        }
    }

    handler.teardown();
    drop(handler);
    if !writer_task.is_finished() {
        let _ = writer_task.await;
    }
    tracing::info!(connection = connection_id, "client disconnected from {peer}");
}
