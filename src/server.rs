use std::future::Future;
use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, ToSocketAddrs};

use crate::gateway::handle_connection;
use crate::state::AppState;

/// Accepts connections and hands each one to its own task.
pub struct Server {
    listener: TcpListener,
    state: AppState,
}

impl Server {
    pub async fn bind(addr: impl ToSocketAddrs, state: AppState) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener, state })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until `shutdown` resolves, then stop accepting and close every
    /// live connection.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let Server { listener, state } = self;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, _)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::debug!("set_nodelay failed: {e}");
                            }
                            tokio::spawn(handle_connection(stream, state.clone()));
                        }
                        Err(e) => {
                            tracing::error!("accept failed: {e}");
                        }
                    }
                }
            }
        }

        drop(listener);
        tracing::info!("shutting down");
        state.registry.disconnect_all();
    }
}
