//! Client side of the pace protocol: a websocket session for one presenter or
//! voter plus the plain HTTP region lookups.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use reqwest::Client;
use shared::{
    domain::{PresentationId, PresentationState, Role, Slide},
    protocol::{ClientMessage, ServerMessage, StorageRegion, UserRegion},
};
use thiserror::Error;
use tokio::{
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);
const OUTBOUND_QUEUE: usize = 32;
const EVENT_QUEUE: usize = 128;
const WRITER_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    /// Latest state pushed by the server, either the initial snapshot or a pace change.
    StateChanged(PresentationState),
    PingPong {
        rtt: Duration,
    },
    Disconnected,
    Error(String),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid server url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("server url must use http, https, ws or wss, got {0}")]
    UnsupportedScheme(String),
    #[error("failed to connect websocket {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },
    #[error("not connected")]
    NotConnected,
    #[error("connection closed")]
    Closed,
}

/// Builds an HTTP endpoint under `server_url` from raw path segments.
pub fn endpoint(server_url: &str, segments: &[&str]) -> Result<Url, ClientError> {
    let mut url = Url::parse(server_url)?;
    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| ClientError::UnsupportedScheme(server_url.to_string()))?;
        path.pop_if_empty();
        for segment in segments {
            path.push(segment);
        }
    }
    Ok(url)
}

/// Websocket url for joining `presentation_id` as `role`.
pub fn connect_url(
    server_url: &str,
    presentation_id: &PresentationId,
    role: Role,
) -> Result<Url, ClientError> {
    let mut url = endpoint(
        server_url,
        &[presentation_id.as_str(), role.as_path(), "connect"],
    )?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ClientError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::UnsupportedScheme(scheme.to_string()))?;
    Ok(url)
}

#[derive(Default)]
struct ConnectionState {
    commands: Option<mpsc::Sender<ClientMessage>>,
    latest: Option<PresentationState>,
    ping_sent_at: Option<Instant>,
    last_rtt: Option<Duration>,
}

struct ConnectionTasks {
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    heartbeat: JoinHandle<()>,
}

pub struct PresentationClient {
    http: Client,
    server_url: String,
    presentation_id: PresentationId,
    role: Role,
    heartbeat: Duration,
    inner: Arc<Mutex<ConnectionState>>,
    tasks: Mutex<Option<ConnectionTasks>>,
    events: broadcast::Sender<ClientEvent>,
}

impl PresentationClient {
    pub fn new(server_url: impl Into<String>, presentation_id: PresentationId, role: Role) -> Self {
        Self::new_with_heartbeat(server_url, presentation_id, role, HEARTBEAT_INTERVAL)
    }

    pub fn new_with_heartbeat(
        server_url: impl Into<String>,
        presentation_id: PresentationId,
        role: Role,
        heartbeat: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_QUEUE);
        Self {
            http: Client::new(),
            server_url: server_url.into(),
            presentation_id,
            role,
            heartbeat,
            inner: Arc::new(Mutex::new(ConnectionState::default())),
            tasks: Mutex::new(None),
            events,
        }
    }

    pub fn presentation_id(&self) -> &PresentationId {
        &self.presentation_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    /// Opens the websocket, announces readiness and starts the heartbeat.
    ///
    /// Calling this on a connected client does nothing.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let mut tasks = self.tasks.lock().await;
        if self.inner.lock().await.commands.is_some() {
            return Ok(());
        }

        let url = connect_url(&self.server_url, &self.presentation_id, self.role)?;
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|source| ClientError::Connect {
                url: url.to_string(),
                source: Box::new(source),
            })?;
        let (mut ws_writer, mut ws_reader) = ws_stream.split();
        let (commands, mut outbound) = mpsc::channel::<ClientMessage>(OUTBOUND_QUEUE);

        let writer = tokio::spawn(async move {
            while let Some(message) = outbound.recv().await {
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(error) => {
                        warn!(kind = message.kind(), %error, "failed to encode client message");
                        continue;
                    }
                };
                if ws_writer.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            let _ = ws_writer.close().await;
        });

        let state = Arc::clone(&self.inner);
        let events = self.events.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = ws_reader.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(message) => apply_server_message(&state, &events, message).await,
                        Err(error) => {
                            let _ = events.send(ClientEvent::Error(format!(
                                "unreadable server frame: {error}"
                            )));
                        }
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(error) => {
                        let _ = events.send(ClientEvent::Error(error.to_string()));
                        break;
                    }
                }
            }
            state.lock().await.commands = None;
            let _ = events.send(ClientEvent::Disconnected);
        });

        let heartbeat_commands = commands.clone();
        let heartbeat_state = Arc::clone(&self.inner);
        let period = self.heartbeat;
        let heartbeat = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                heartbeat_state.lock().await.ping_sent_at = Some(Instant::now());
                if heartbeat_commands.send(ClientMessage::Ping).await.is_err() {
                    break;
                }
            }
        });

        self.inner.lock().await.commands = Some(commands.clone());
        *tasks = Some(ConnectionTasks {
            reader,
            writer,
            heartbeat,
        });

        info!(presentation_id = %self.presentation_id, role = %self.role, %url, "connected");
        let _ = self.events.send(ClientEvent::Connected);
        commands
            .send(ClientMessage::ClientReady)
            .await
            .map_err(|_| ClientError::Closed)
    }

    pub async fn next_slide(&self) -> Result<(), ClientError> {
        self.send(ClientMessage::NextSlide).await
    }

    pub async fn previous_slide(&self) -> Result<(), ClientError> {
        self.send(ClientMessage::PreviousSlide).await
    }

    pub async fn like(&self) -> Result<(), ClientError> {
        self.send(ClientMessage::Like).await
    }

    pub async fn update_slides(&self, slides: Vec<Slide>) -> Result<(), ClientError> {
        self.send(ClientMessage::UpdateSlides(slides)).await
    }

    pub async fn ping(&self) -> Result<(), ClientError> {
        self.inner.lock().await.ping_sent_at = Some(Instant::now());
        self.send(ClientMessage::Ping).await
    }

    /// Most recent state received from the server.
    pub async fn state(&self) -> Option<PresentationState> {
        self.inner.lock().await.latest.clone()
    }

    pub async fn last_rtt(&self) -> Option<Duration> {
        self.inner.lock().await.last_rtt
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.lock().await.commands.is_some()
    }

    /// Stops the heartbeat and closes the websocket after queued commands are written.
    pub async fn close(&self) {
        let Some(tasks) = self.tasks.lock().await.take() else {
            return;
        };
        self.inner.lock().await.commands = None;
        tasks.heartbeat.abort();

        let mut writer = tasks.writer;
        if tokio::time::timeout(WRITER_SHUTDOWN_GRACE, &mut writer)
            .await
            .is_err()
        {
            writer.abort();
        }
        let mut reader = tasks.reader;
        if tokio::time::timeout(WRITER_SHUTDOWN_GRACE, &mut reader)
            .await
            .is_err()
        {
            reader.abort();
            let _ = self.events.send(ClientEvent::Disconnected);
        }
    }

    pub async fn fetch_user_region(&self) -> Result<UserRegion> {
        let url = endpoint(&self.server_url, &["user-region"])?;
        let region = self
            .http
            .get(url)
            .send()
            .await
            .context("user region request failed")?
            .error_for_status()?
            .json()
            .await?;
        Ok(region)
    }

    pub async fn fetch_storage_region(&self) -> Result<StorageRegion> {
        let url = endpoint(
            &self.server_url,
            &[self.presentation_id.as_str(), "storage-region"],
        )?;
        let region = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("storage region request failed for {}", self.presentation_id))?
            .error_for_status()?
            .json()
            .await?;
        Ok(region)
    }

    async fn send(&self, message: ClientMessage) -> Result<(), ClientError> {
        let commands = self
            .inner
            .lock()
            .await
            .commands
            .clone()
            .ok_or(ClientError::NotConnected)?;
        commands.send(message).await.map_err(|_| ClientError::Closed)
    }
}

impl Drop for PresentationClient {
    fn drop(&mut self) {
        if let Some(tasks) = self.tasks.get_mut().take() {
            tasks.heartbeat.abort();
            tasks.reader.abort();
            tasks.writer.abort();
        }
    }
}

async fn apply_server_message(
    state: &Mutex<ConnectionState>,
    events: &broadcast::Sender<ClientEvent>,
    message: ServerMessage,
) {
    match message {
        ServerMessage::InitialState(snapshot) | ServerMessage::PaceChange(snapshot) => {
            state.lock().await.latest = Some(snapshot.clone());
            let _ = events.send(ClientEvent::StateChanged(snapshot));
        }
        ServerMessage::Pong => {
            let rtt = {
                let mut guard = state.lock().await;
                let rtt = guard.ping_sent_at.take().map(|sent| sent.elapsed());
                if rtt.is_some() {
                    guard.last_rtt = rtt;
                }
                rtt
            };
            match rtt {
                Some(rtt) => {
                    let _ = events.send(ClientEvent::PingPong { rtt });
                }
                None => debug!("pong without outstanding ping"),
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
