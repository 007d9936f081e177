use std::sync::Arc;

use studyhub::config::Config;
use studyhub::server::Server;
use studyhub::state::AppState;
use studyhub::store::memory::MemoryStore;
use studyhub::store::Stores;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studyhub=debug".into()),
        )
        .init();

    let config = Config::from_env();
    print_banner(&config);

    let store = Arc::new(MemoryStore::new());
    if config.seed_demo {
        match store.seed_demo() {
            Ok((user, room)) => eprintln!(
                "  \x1b[2mdemo\x1b[0m         user {} / demo, room {}",
                user.username, room.name
            ),
            Err(e) => tracing::warn!("failed to seed demo data: {e}"),
        }
    }
    let state = AppState::new(Stores::from_memory(store));

    let server = Server::bind(config.addr(), state)
        .await
        .expect("failed to bind");
    let actual_port = server
        .local_addr()
        .expect("failed to get local address")
        .port();
    eprintln!("  \x1b[32m→ listening on {}:{actual_port}\x1b[0m", config.bind);
    eprintln!();

    server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("failed to listen for ctrl-c: {e}");
                std::future::pending::<()>().await;
            }
        })
        .await;
}

fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    let sha = env!("GIT_SHA");

    eprintln!();
    eprintln!("  \x1b[1;36mstudyhub\x1b[0m \x1b[2mv{version} ({sha})\x1b[0m");
    eprintln!();
    eprintln!("  \x1b[2mbind\x1b[0m         {}", config.bind);
    eprintln!("  \x1b[2mport\x1b[0m         {}", config.port);
    eprintln!(
        "  \x1b[2mcall timeout\x1b[0m {}ms",
        config.call_timeout.as_millis()
    );
}
