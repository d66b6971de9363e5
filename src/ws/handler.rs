//! WebSocket upgrade handler

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::RoomHandle;
use crate::util::rate_limit::SessionRateLimiter;
use crate::util::time::unix_millis;
use crate::ws::protocol::{ClientMsg, ServerMsg};

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.room.clone()))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, room: RoomHandle) {
    let session_id = Uuid::new_v4();
    info!(session_id = %session_id, "New WebSocket connection");

    let (mut ws_sink, ws_stream) = socket.split();

    // Subscribe before joining so the join's own state update is delivered
    let room_rx = room.subscribe();

    let welcome = ServerMsg::Welcome {
        session_id,
        server_time: unix_millis(),
    };

    if let Err(e) = send_msg(&mut ws_sink, &welcome).await {
        error!(session_id = %session_id, error = %e, "Failed to send welcome");
        return;
    }

    match room.join(session_id).await {
        Ok(team) => {
            info!(session_id = %session_id, team = ?team, "Session joined room");
        }
        Err(e) => {
            warn!(session_id = %session_id, error = %e, "Join refused");
            let refusal = ServerMsg::Error {
                code: e.code().to_string(),
                message: e.to_string(),
            };
            let _ = send_msg(&mut ws_sink, &refusal).await;
            let _ = ws_sink.close().await;
            return;
        }
    }

    run_session(session_id, &room, ws_sink, ws_stream, room_rx).await;

    // A disconnect is the only way the room learns a player has gone
    if let Err(e) = room.leave(session_id).await {
        debug!(session_id = %session_id, error = %e, "Leave not delivered");
    }

    info!(session_id = %session_id, "WebSocket connection closed");
}

/// Run the WebSocket session with read/write split
async fn run_session(
    session_id: Uuid,
    room: &RoomHandle,
    mut ws_sink: SplitSink<WebSocket, Message>,
    mut ws_stream: SplitStream<WebSocket>,
    mut room_rx: broadcast::Receiver<ServerMsg>,
) {
    let rate_limiter = SessionRateLimiter::new();

    // Replies meant for this client only
    let (direct_tx, mut direct_rx) = mpsc::channel::<ServerMsg>(16);

    // Spawn writer task: room broadcasts and direct replies -> WebSocket
    let writer_handle = tokio::spawn(async move {
        loop {
            let msg = tokio::select! {
                received = room_rx.recv() => match received {
                    Ok(msg) => msg,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(
                            session_id = %session_id,
                            lagged_count = n,
                            "Client lagged, skipping {} messages", n
                        );
                        // Continue - don't disconnect for lag
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!(session_id = %session_id, "Room channel closed");
                        break;
                    }
                },
                direct = direct_rx.recv() => match direct {
                    Some(msg) => msg,
                    None => break,
                },
            };

            if let Err(e) = send_msg(&mut ws_sink, &msg).await {
                debug!(session_id = %session_id, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> room
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Text(text)) => {
                if !rate_limiter.check_input() {
                    warn!(session_id = %session_id, "Rate limited input message");
                    continue;
                }

                match ClientMsg::parse(&text) {
                    Ok(ClientMsg::Move { x, z }) => {
                        if room.move_to(session_id, x, z).await.is_err() {
                            debug!(session_id = %session_id, "Room input channel closed");
                            break;
                        }
                    }
                    Ok(ClientMsg::Ping { t }) => {
                        if direct_tx.send(ServerMsg::Pong { t }).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(session_id = %session_id, error = %e, "Ignoring client message");
                    }
                }
            }
            Ok(Message::Binary(_)) => {
                warn!(session_id = %session_id, "Received binary message, ignoring");
            }
            Ok(Message::Ping(_)) => {
                debug!(session_id = %session_id, "Received ping");
            }
            Ok(Message::Pong(_)) => {
                debug!(session_id = %session_id, "Received pong");
            }
            Ok(Message::Close(_)) => {
                info!(session_id = %session_id, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(session_id = %session_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Abort writer task
    writer_handle.abort();
}

/// Send a message over WebSocket
async fn send_msg(sink: &mut SplitSink<WebSocket, Message>, msg: &ServerMsg) -> Result<(), String> {
    let json = serde_json::to_string(msg).map_err(|e| e.to_string())?;
    sink.send(Message::Text(json))
        .await
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::Duration;

    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::Message as ClientFrame;
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    use crate::config::{Config, RoomConfig};
    use crate::game::{spawn_room, GameStatus};
    use crate::http::build_router;

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn start_server(room: RoomConfig) -> (SocketAddr, RoomHandle) {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "debug".to_string(),
            client_origin: "*".to_string(),
            room,
        };
        let (handle, _task) = spawn_room(config.room.clone());
        let app = build_router(AppState::new(config, handle.clone()));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr, handle)
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (client, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
        client
    }

    /// Next server message, or None once the server closes the socket
    async fn next_msg(client: &mut Client) -> Option<ServerMsg> {
        timeout(Duration::from_secs(5), async {
            while let Some(frame) = client.next().await {
                match frame {
                    Ok(ClientFrame::Text(text)) => {
                        return Some(serde_json::from_str(&text).unwrap());
                    }
                    Ok(ClientFrame::Close(_)) | Err(_) => return None,
                    Ok(_) => continue,
                }
            }
            None
        })
        .await
        .expect("timed out waiting for server message")
    }

    /// Read the welcome and wait until the session's join has been applied
    async fn join(client: &mut Client) -> Uuid {
        let Some(ServerMsg::Welcome { session_id, .. }) = next_msg(client).await else {
            panic!("expected welcome");
        };
        loop {
            match next_msg(client).await {
                Some(ServerMsg::PlayerJoined { player }) if player.session_id == session_id => {
                    return session_id
                }
                Some(_) => continue,
                None => panic!("closed before join"),
            }
        }
    }

    #[tokio::test]
    async fn test_full_room_refuses_with_error_and_closes() {
        let (addr, room) = start_server(RoomConfig {
            max_players: 1,
            seed: Some(5),
            ..RoomConfig::default()
        })
        .await;

        let mut first = connect(addr).await;
        join(&mut first).await;

        let mut second = connect(addr).await;
        assert!(matches!(next_msg(&mut second).await, Some(ServerMsg::Welcome { .. })));
        match next_msg(&mut second).await {
            Some(ServerMsg::Error { code, .. }) => assert_eq!(code, "room_full"),
            other => panic!("expected room_full error, got {:?}", other),
        }
        assert_eq!(next_msg(&mut second).await, None);
        assert_eq!(room.summary().players, 1);
    }

    #[tokio::test]
    async fn test_disconnect_leaves_room() {
        let (addr, _room) = start_server(RoomConfig {
            seed: Some(5),
            ..RoomConfig::default()
        })
        .await;

        let mut human = connect(addr).await;
        let human_id = join(&mut human).await;
        let mut zombie = connect(addr).await;
        join(&mut zombie).await;

        human.close(None).await.unwrap();

        let mut left = false;
        loop {
            match next_msg(&mut zombie).await {
                Some(ServerMsg::PlayerLeft { session_id }) => {
                    assert_eq!(session_id, human_id);
                    left = true;
                }
                Some(ServerMsg::State {
                    players,
                    game_status,
                    ..
                }) if left => {
                    assert_eq!(players.len(), 1);
                    assert_eq!(game_status, GameStatus::ZombiesWin);
                    break;
                }
                Some(_) => continue,
                None => panic!("zombie socket closed"),
            }
        }
    }
}
