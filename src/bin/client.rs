use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

use studyhub::client::Client;
use studyhub::config::Config;
use studyhub::error::AppError;
use studyhub::gateway::frame::{Command, Outcome, Push};

#[derive(Parser, Debug)]
#[command(author, version, about = "Interactive studyhub client")]
struct Cli {
    /// Address of the studyhub server.
    #[arg(long, default_value = "127.0.0.1:9090")]
    server: String,

    /// Log in with this username before reading commands.
    #[arg(long, requires = "password")]
    user: Option<String>,

    #[arg(long)]
    password: Option<String>,

    /// How long to wait for each answer. Defaults to STUDYHUB_CALL_TIMEOUT_MS.
    #[arg(long)]
    timeout_ms: Option<u64>,
}

fn print_push(push: &Push) {
    println!("<< {}", push.to_wire());
}

fn print_outcome(command: &str, outcome: &Result<Outcome, AppError>) {
    match outcome {
        Ok(Outcome::Success(fields)) if fields.is_empty() => println!("{command}: ok"),
        Ok(Outcome::Success(fields)) => {
            println!("{command}: ok");
            for field in fields {
                println!("  {field}");
            }
        }
        Ok(Outcome::Error(msg)) => println!("{command}: error: {msg}"),
        Err(e) => println!("{command}: {e}"),
    }
}

async fn watch_pushes(mut pushes: broadcast::Receiver<Push>) {
    loop {
        match pushes.recv().await {
            Ok(push) => print_push(&push),
            Err(broadcast::error::RecvError::Lagged(n)) => println!("*** missed {n} push(es)"),
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// `COMMAND|arg|...` runs a command; anything else is sent as chat.
async fn run_line(client: &Client, line: &str) {
    let mut parts = line.split('|');
    let head = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();
    match Command::parse(&head.to_ascii_uppercase()) {
        Some(command) => {
            let outcome = client.call(command, &args).await.map(|r| r.outcome);
            print_outcome(command.as_str(), &outcome);
        }
        None => {
            if let Err(e) = client.chat(line).await {
                println!("CHAT: {e}");
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "studyhub=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let timeout = cli
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| Config::from_env().call_timeout);
    let client = Client::connect(cli.server.as_str(), timeout).await?;
    eprintln!("*** connected to {}", cli.server);
    tokio::spawn(watch_pushes(client.subscribe()));

    if let (Some(user), Some(password)) = (&cli.user, &cli.password) {
        let (user_id, nickname) = client.login(user, password).await?;
        client.authenticate(user_id, &nickname).await?;
        eprintln!("*** signed in as {nickname} ({user_id})");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line.eq_ignore_ascii_case("/quit") {
                    break;
                }
                if let Some(rest) = line.strip_prefix("/auth ") {
                    let mut parts = rest.splitn(2, ' ');
                    let id = parts.next().and_then(|id| id.parse().ok());
                    let name = parts.next().unwrap_or_default();
                    match id {
                        Some(id) => match client.authenticate(id, name).await {
                            Ok(()) => eprintln!("*** authenticated as {name} ({id})"),
                            Err(e) => eprintln!("*** {e}"),
                        },
                        None => eprintln!("*** usage: /auth <id> <name>"),
                    }
                    continue;
                }
                run_line(&client, line).await;
                if !client.is_connected() {
                    eprintln!("*** server closed the connection");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    Ok(())
}
