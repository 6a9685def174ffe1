use super::*;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tokio::net::TcpListener;

const SHORT_LIVED: &str = "short-lived";

#[derive(Clone)]
struct ServerState {
    received: mpsc::UnboundedSender<(String, ClientMessage)>,
}

fn deck() -> PresentationState {
    PresentationState {
        current_slide_index: 0,
        voter_count: 0,
        slides: vec![Slide::new("a", "Intro"), Slide::new("b", "Outro")],
    }
}

async fn connect_handler(
    ws: WebSocketUpgrade,
    State(state): State<ServerState>,
    Path((presentation_id, role)): Path<(String, String)>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| scripted_session(socket, state, presentation_id, role))
}

async fn scripted_session(
    mut socket: WebSocket,
    state: ServerState,
    presentation_id: String,
    role: String,
) {
    let mut current = deck();
    while let Some(Ok(WsMessage::Text(text))) = socket.recv().await {
        let Ok(message) = ClientMessage::parse(&text) else {
            continue;
        };
        let _ = state.received.send((role.clone(), message.clone()));
        let reply = match message {
            ClientMessage::ClientReady => ServerMessage::InitialState(current.clone()),
            ClientMessage::Ping => ServerMessage::Pong,
            ClientMessage::NextSlide => {
                current.current_slide_index = 1;
                ServerMessage::PaceChange(current.clone())
            }
            ClientMessage::Like => {
                current.slides[current.current_slide_index].like_count += 1;
                ServerMessage::PaceChange(current.clone())
            }
            _ => continue,
        };
        let text = serde_json::to_string(&reply).expect("encode");
        if socket.send(WsMessage::Text(text)).await.is_err() {
            break;
        }
        if presentation_id == SHORT_LIVED {
            break;
        }
    }
}

async fn user_region_handler() -> Json<UserRegion> {
    Json(UserRegion {
        city: "Lisbon".to_string(),
        country: "PT".to_string(),
    })
}

async fn storage_region_handler(Path(presentation_id): Path<String>) -> Json<StorageRegion> {
    Json(StorageRegion {
        colo: format!("colo-for-{presentation_id}"),
    })
}

async fn spawn_test_server() -> Result<(String, mpsc::UnboundedReceiver<(String, ClientMessage)>)> {
    let (received, rx) = mpsc::unbounded_channel();
    let app = Router::new()
        .route("/user-region", get(user_region_handler))
        .route("/:presentation_id/storage-region", get(storage_region_handler))
        .route("/:presentation_id/:role/connect", get(connect_handler))
        .with_state(ServerState { received });

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}"), rx))
}

async fn next_event(events: &mut broadcast::Receiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timely event")
        .expect("event")
}

async fn next_state(events: &mut broadcast::Receiver<ClientEvent>) -> PresentationState {
    loop {
        if let ClientEvent::StateChanged(state) = next_event(events).await {
            return state;
        }
    }
}

#[test]
fn connect_url_switches_http_schemes_to_websocket() -> Result<()> {
    let url = connect_url("http://localhost:8787", &PresentationId::new("deck"), Role::Voter)?;
    assert_eq!(url.as_str(), "ws://localhost:8787/deck/voter/connect");

    let url = connect_url(
        "https://pace.example.org/api/",
        &PresentationId::new("deck"),
        Role::Presenter,
    )?;
    assert_eq!(url.as_str(), "wss://pace.example.org/api/deck/presenter/connect");
    Ok(())
}

#[test]
fn connect_url_escapes_presentation_ids() -> Result<()> {
    let url = connect_url("ws://localhost", &PresentationId::new("my talk/1"), Role::Voter)?;
    assert_eq!(url.as_str(), "ws://localhost/my%20talk%2F1/voter/connect");
    Ok(())
}

#[test]
fn connect_url_rejects_other_schemes() {
    let err = connect_url("ftp://localhost", &PresentationId::new("deck"), Role::Voter)
        .expect_err("ftp is not supported");
    assert!(matches!(err, ClientError::UnsupportedScheme(_)));

    let err = connect_url("not a url", &PresentationId::new("deck"), Role::Voter)
        .expect_err("unparsable");
    assert!(matches!(err, ClientError::InvalidUrl(_)));
}

#[tokio::test]
async fn commands_before_connect_are_rejected() {
    let client = PresentationClient::new("http://127.0.0.1:9", PresentationId::new("deck"), Role::Voter);
    assert!(matches!(client.like().await, Err(ClientError::NotConnected)));
    assert!(!client.is_connected().await);
}

#[tokio::test]
async fn connect_announces_readiness_and_tracks_state() -> Result<()> {
    let (server_url, mut received) = spawn_test_server().await?;
    let client = PresentationClient::new(server_url, PresentationId::new("deck"), Role::Presenter);
    let mut events = client.subscribe_events();

    client.connect().await?;
    assert_eq!(next_event(&mut events).await, ClientEvent::Connected);
    assert_eq!(next_state(&mut events).await, deck());

    let (role, first) = received.recv().await.expect("first command");
    assert_eq!(role, "presenter");
    assert_eq!(first, ClientMessage::ClientReady);

    client.next_slide().await?;
    assert_eq!(next_state(&mut events).await.current_slide_index, 1);
    client.like().await?;
    assert_eq!(next_state(&mut events).await.slides[1].like_count, 1);
    assert_eq!(client.state().await.map(|s| s.slides[1].like_count), Some(1));

    assert_eq!(received.recv().await.map(|(_, m)| m), Some(ClientMessage::NextSlide));
    assert_eq!(received.recv().await.map(|(_, m)| m), Some(ClientMessage::Like));

    client.close().await;
    assert!(!client.is_connected().await);
    Ok(())
}

#[tokio::test]
async fn heartbeat_measures_round_trip() -> Result<()> {
    let (server_url, _received) = spawn_test_server().await?;
    let client = PresentationClient::new_with_heartbeat(
        server_url,
        PresentationId::new("deck"),
        Role::Voter,
        Duration::from_millis(50),
    );
    let mut events = client.subscribe_events();
    client.connect().await?;

    let rtt = loop {
        if let ClientEvent::PingPong { rtt } = next_event(&mut events).await {
            break rtt;
        }
    };
    assert!(rtt < Duration::from_secs(5));
    assert!(client.last_rtt().await.is_some());

    client.close().await;
    Ok(())
}

#[tokio::test]
async fn server_hangup_is_reported() -> Result<()> {
    let (server_url, _received) = spawn_test_server().await?;
    let client = PresentationClient::new(server_url, PresentationId::new(SHORT_LIVED), Role::Voter);
    let mut events = client.subscribe_events();
    client.connect().await?;

    loop {
        if next_event(&mut events).await == ClientEvent::Disconnected {
            break;
        }
    }
    assert!(!client.is_connected().await);
    assert!(matches!(client.like().await, Err(ClientError::NotConnected)));
    Ok(())
}

#[tokio::test]
async fn region_lookups_use_http_routes() -> Result<()> {
    let (server_url, _received) = spawn_test_server().await?;
    let client = PresentationClient::new(server_url, PresentationId::new("deck-9"), Role::Voter);

    let user = client.fetch_user_region().await?;
    assert_eq!(user.city, "Lisbon");
    assert_eq!(user.country, "PT");

    let storage = client.fetch_storage_region().await?;
    assert_eq!(storage.colo, "colo-for-deck-9");
    Ok(())
}
