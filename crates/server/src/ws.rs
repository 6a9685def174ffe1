use std::{sync::Arc, time::Duration};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use shared::domain::{PresentationId, Role};
use tracing::{debug, info, warn};

use crate::app_state::AppState;

const WRITER_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

pub(crate) async fn presenter_connect(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(presentation_id): Path<String>,
) -> impl IntoResponse {
    upgrade(ws, state, PresentationId(presentation_id), Role::Presenter)
}

pub(crate) async fn voter_connect(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(presentation_id): Path<String>,
) -> impl IntoResponse {
    upgrade(ws, state, PresentationId(presentation_id), Role::Voter)
}

fn upgrade(
    ws: WebSocketUpgrade,
    state: Arc<AppState>,
    presentation_id: PresentationId,
    role: Role,
) -> impl IntoResponse {
    ws.max_message_size(state.max_frame_bytes)
        .on_upgrade(move |socket| ws_connection(state, socket, presentation_id, role))
}

async fn ws_connection(
    state: Arc<AppState>,
    socket: WebSocket,
    presentation_id: PresentationId,
    role: Role,
) {
    let (mut session, mut outbound) = state.directory.open_session(&presentation_id, role).await;
    let session_id = session.id();
    let detached = session.detached_signal();
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sender.send(Message::Text(frame.to_string())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });
    let mut writer_done = false;

    loop {
        tokio::select! {
            message = receiver.next() => {
                let outcome = match message {
                    Some(Ok(Message::Text(text))) => session.handle_text(&text).await,
                    Some(Ok(Message::Binary(_))) => session.handle_binary(),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => Ok(()),
                    Some(Err(error)) => {
                        debug!(%presentation_id, %session_id, %error, "websocket receive failed");
                        break;
                    }
                };
                if let Err(error) = outcome {
                    warn!(%presentation_id, %session_id, %error, "closing connection after protocol error");
                    break;
                }
            }
            _ = detached.notified() => {
                warn!(%presentation_id, %session_id, "closing connection dropped by its presentation");
                break;
            }
            _ = &mut send_task => {
                writer_done = true;
                debug!(%presentation_id, %session_id, "websocket writer finished");
                break;
            }
        }
    }

    session.close().await;
    if !writer_done
        && tokio::time::timeout(WRITER_SHUTDOWN_GRACE, &mut send_task)
            .await
            .is_err()
    {
        send_task.abort();
    }
    info!(%presentation_id, %session_id, %role, "connection closed");
}
