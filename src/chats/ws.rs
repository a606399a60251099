use axum::{
    debug_handler,
    extract::{Path, State, WebSocketUpgrade, ws::WebSocket},
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::warn;

use crate::{AppResult, ChatError, chats::{registry::ConnectionRegistry, relay, store}};

/// The inbound frame carries a client-supplied sender id; the relay still
/// rejects ids that don't resolve to a user.
#[derive(Deserialize)]
struct InboundFrame {
    content: String,
    user_id: i64,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn chat_ws(
    Path(chat_id): Path<i64>,
    State(db_pool): State<SqlitePool>,
    State(registry): State<ConnectionRegistry>,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    if store::get_chat(&db_pool, chat_id).await?.is_none() {
        return Err(ChatError::NotFound("chat"));
    }

    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, db_pool, registry, chat_id))
        .into_response())
}

async fn handle_socket(
    socket: WebSocket,
    db_pool: SqlitePool,
    registry: ConnectionRegistry,
    chat_id: i64,
) {
    let (conn_id, mut rx) = registry.register(chat_id).await;
    let (mut sender, mut receiver) = socket.split();

    let forward_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sender.send(frame.into()).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        let Ok(frame) = serde_json::from_slice::<InboundFrame>(&msg.into_data()) else {
            continue;
        };

        if let Err(err) = relay::relay(&db_pool, &registry, chat_id, frame.user_id, &frame.content).await {
            warn!(chat_id, error = %err, "dropping inbound message");
        }
    }

    // disconnect, abrupt or graceful: same teardown either way
    registry.unregister(chat_id, conn_id).await;
    forward_task.abort();
}
