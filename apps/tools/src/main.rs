use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{ClientEvent, PresentationClient};
use shared::domain::{PresentationId, PresentationState, Role};
use storage::Storage;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

const COMMAND_ACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/pace.db")]
    database_url: String,
    #[arg(long, default_value = "http://127.0.0.1:8787")]
    server_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the storage region recorded for a presentation.
    ShowRegion { presentation_id: String },
    /// Forget the recorded storage region so the next lookup records a new one.
    ClearRegion { presentation_id: String },
    ListRegions,
    /// Print every state change until interrupted.
    Watch {
        presentation_id: String,
        #[arg(long, value_enum, default_value_t = RoleArg::Voter)]
        role: RoleArg,
    },
    Next { presentation_id: String },
    Previous { presentation_id: String },
    Like { presentation_id: String },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoleArg {
    Presenter,
    Voter,
}

impl From<RoleArg> for Role {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Presenter => Role::Presenter,
            RoleArg::Voter => Role::Voter,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::ShowRegion { presentation_id } => {
            let storage = Storage::new(&cli.database_url).await?;
            match storage.load_region(&PresentationId(presentation_id.clone())).await? {
                Some(region) => println!(
                    "{} colo={} cached_at={}",
                    region.presentation_id, region.colo, region.cached_at
                ),
                None => println!("{presentation_id}: no region recorded"),
            }
        }
        Command::ClearRegion { presentation_id } => {
            let storage = Storage::new(&cli.database_url).await?;
            if storage.clear_region(&PresentationId(presentation_id.clone())).await? {
                println!("cleared region for {presentation_id}");
            } else {
                println!("{presentation_id}: no region recorded");
            }
        }
        Command::ListRegions => {
            let storage = Storage::new(&cli.database_url).await?;
            for region in storage.list_regions().await? {
                println!(
                    "{} colo={} cached_at={}",
                    region.presentation_id, region.colo, region.cached_at
                );
            }
        }
        Command::Watch {
            presentation_id,
            role,
        } => watch(&cli.server_url, PresentationId(presentation_id), role.into()).await?,
        Command::Next { presentation_id } => {
            send_one(&cli.server_url, presentation_id, OneShot::Next).await?
        }
        Command::Previous { presentation_id } => {
            send_one(&cli.server_url, presentation_id, OneShot::Previous).await?
        }
        Command::Like { presentation_id } => {
            send_one(&cli.server_url, presentation_id, OneShot::Like).await?
        }
    }

    Ok(())
}

async fn watch(server_url: &str, presentation_id: PresentationId, role: Role) -> Result<()> {
    let client = PresentationClient::new(server_url, presentation_id, role);
    let mut events = client.subscribe_events();
    client.connect().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(ClientEvent::StateChanged(state)) => print_state(&state),
                Ok(ClientEvent::PingPong { rtt }) => println!("rtt {} ms", rtt.as_millis()),
                Ok(ClientEvent::Error(message)) => eprintln!("error: {message}"),
                Ok(ClientEvent::Disconnected) => {
                    println!("disconnected");
                    return Ok(());
                }
                Ok(ClientEvent::Connected) => println!("connected as {}", client.role()),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    eprintln!("skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    client.close().await;
    Ok(())
}

#[derive(Clone, Copy, Debug)]
enum OneShot {
    Next,
    Previous,
    Like,
}

impl OneShot {
    fn role(self) -> Role {
        match self {
            OneShot::Next | OneShot::Previous => Role::Presenter,
            OneShot::Like => Role::Voter,
        }
    }

    async fn send(self, client: &PresentationClient) -> Result<(), client_core::ClientError> {
        match self {
            OneShot::Next => client.next_slide().await,
            OneShot::Previous => client.previous_slide().await,
            OneShot::Like => client.like().await,
        }
    }
}

/// Joins, waits for the initial snapshot, sends one command and prints the resulting state.
async fn send_one(
    server_url: &str,
    presentation_id: String,
    command: OneShot,
) -> Result<()> {
    let client =
        PresentationClient::new(server_url, PresentationId(presentation_id), command.role());
    let mut events = client.subscribe_events();
    client.connect().await?;

    if next_state(&mut events).await?.is_none() {
        bail!("no initial state received");
    }
    command.send(&client).await?;
    match next_state(&mut events).await? {
        Some(state) => print_state(&state),
        None => println!("state unchanged"),
    }

    client.close().await;
    Ok(())
}

async fn next_state(
    events: &mut broadcast::Receiver<ClientEvent>,
) -> Result<Option<PresentationState>> {
    let wait = async {
        loop {
            match events.recv().await {
                Ok(ClientEvent::StateChanged(state)) => return Ok(Some(state)),
                Ok(ClientEvent::Disconnected) | Err(broadcast::error::RecvError::Closed) => {
                    bail!("connection closed")
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
            }
        }
    };
    match tokio::time::timeout(COMMAND_ACK_TIMEOUT, wait).await {
        Ok(result) => result,
        Err(_) => Ok(None),
    }
}

fn print_state(state: &PresentationState) {
    let current = state
        .current_slide()
        .map(|slide| format!("{} \"{}\" likes={}", slide.id, slide.text, slide.like_count))
        .unwrap_or_else(|| "no slides".to_string());
    println!(
        "slide {}/{} voters={} {}",
        state.current_slide_index + 1,
        state.slides.len(),
        state.voter_count,
        current
    );
}
