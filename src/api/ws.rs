// WebSocket handler: one task per connection, forwarding broadcasts out and
// client frames in.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};

use crate::engine::player::ConnectionId;
use crate::engine::protocol::{decode_client_message, ClientMessage, ProtocolError, ServerMessage};
use crate::engine::server::GameServer;
use crate::metrics;

use super::AppState;

/// Lifecycle of one connection. `Disconnected` is terminal.
///
/// `Joined` means the player is in the world but has not been sent its
/// `joined` reply yet; the connection becomes `Active` once that reply is out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Joined,
    Active,
    Disconnected,
}

impl ConnectionState {
    /// Whether this connection has a player in the world.
    pub fn in_world(self) -> bool {
        matches!(self, ConnectionState::Joined | ConnectionState::Active)
    }
}

pub async fn ws_game(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

/// Apply one client text frame. Returns a reply meant only for this
/// connection, if any.
pub fn dispatch(
    server: &GameServer,
    conn: ConnectionId,
    state: &mut ConnectionState,
    text: &str,
) -> Result<Option<ServerMessage>, ProtocolError> {
    match decode_client_message(text)? {
        ClientMessage::Join(req) => {
            if *state != ConnectionState::Connecting {
                return Err(ProtocolError::AlreadyJoined);
            }
            let ack = server.join(conn, req)?;
            *state = ConnectionState::Joined;
            Ok(Some(ack.into_message()))
        }
        ClientMessage::Input(req) => {
            if state.in_world() {
                server.set_input(conn, req.into());
            }
            Ok(None)
        }
    }
}

/// Tear down a connection: flush its player exactly once, however many
/// times the transport reports closure.
pub fn close(server: &GameServer, conn: ConnectionId, state: &mut ConnectionState) {
    let previous = std::mem::replace(state, ConnectionState::Disconnected);
    if previous.in_world() {
        server.disconnect(conn);
    } else {
        tracing::debug!(connection_id = conn, state = ?previous, "Connection closed");
    }
}

async fn handle_ws(mut socket: WebSocket, state: AppState) {
    let server = state.game_server;
    let (conn, mut rx) = server.connect();
    let mut conn_state = ConnectionState::Connecting;
    metrics::CONNECTED_WEBSOCKETS.inc();

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if socket.send(Message::Text(msg.into())).await.is_err() {
                            break;
                        }
                        metrics::WEBSOCKET_MESSAGES_SENT_TOTAL.inc();
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        break;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(
                            connection_id = conn,
                            "WebSocket client lagged, skipped {n} messages"
                        );
                    }
                }
            }
            result = socket.recv() => {
                let reply = match result {
                    Some(Ok(Message::Text(text))) => {
                        dispatch(&server, conn, &mut conn_state, text.as_str())
                    }
                    Some(Ok(Message::Binary(_))) => Err(ProtocolError::BinaryFrame),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::info!(connection_id = conn, "WebSocket error: {e}");
                        break;
                    }
                    // Ping/pong are answered by the transport.
                    Some(Ok(_)) => Ok(None),
                };

                match reply {
                    Ok(Some(msg)) => match msg.to_json() {
                        Ok(json) => {
                            if socket.send(Message::Text(json.into())).await.is_err() {
                                break;
                            }
                            metrics::WEBSOCKET_MESSAGES_SENT_TOTAL.inc();
                            if conn_state == ConnectionState::Joined {
                                conn_state = ConnectionState::Active;
                            }
                        }
                        Err(e) => tracing::error!("Failed to encode reply: {e}"),
                    },
                    Ok(None) => {}
                    Err(e) => {
                        metrics::PROTOCOL_ERRORS_TOTAL.inc();
                        tracing::warn!(connection_id = conn, "Ignoring client frame: {e}");
                    }
                }
            }
        }
    }

    close(&server, conn, &mut conn_state);
    metrics::CONNECTED_WEBSOCKETS.dec();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::GameConfig;
    use crate::engine::game::Game;
    use crate::persistence::PersistenceHandle;

    fn test_server() -> GameServer {
        let (handle, _rx) = PersistenceHandle::channel(64);
        GameServer::with_game(Game::with_seed(GameConfig::default(), 11), handle)
    }

    #[test]
    fn test_join_then_input() {
        let server = test_server();
        let (conn, _rx) = server.connect();
        let mut state = ConnectionState::Connecting;

        let reply = dispatch(&server, conn, &mut state, r#"{"type":"join","name":"eve"}"#)
            .unwrap()
            .unwrap();
        assert!(matches!(reply, ServerMessage::Joined { .. }));
        assert_eq!(state, ConnectionState::Joined);

        // Input counts as soon as the player is in the world.
        let reply = dispatch(&server, conn, &mut state, r#"{"type":"input","left":true}"#).unwrap();
        assert!(reply.is_none());
        server.with_world(|game| assert_eq!(game.player(conn).unwrap().vx, -180.0));
    }

    #[test]
    fn test_input_before_join_is_ignored() {
        let server = test_server();
        let (conn, _rx) = server.connect();
        let mut state = ConnectionState::Connecting;
        let reply = dispatch(&server, conn, &mut state, r#"{"type":"input","up":true}"#).unwrap();
        assert!(reply.is_none());
        assert_eq!(state, ConnectionState::Connecting);
        assert_eq!(server.player_count(), 0);
    }

    #[test]
    fn test_second_join_is_rejected() {
        let server = test_server();
        let (conn, _rx) = server.connect();
        let mut state = ConnectionState::Connecting;
        dispatch(&server, conn, &mut state, r#"{"type":"join"}"#).unwrap();
        let err = dispatch(&server, conn, &mut state, r#"{"type":"join","name":"again"}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::AlreadyJoined));
        assert_eq!(server.player_count(), 1);
    }

    #[test]
    fn test_malformed_frame_leaves_state_alone() {
        let server = test_server();
        let (conn, _rx) = server.connect();
        let mut state = ConnectionState::Connecting;
        assert!(dispatch(&server, conn, &mut state, "{oops").is_err());
        assert_eq!(state, ConnectionState::Connecting);
        // The connection can still join afterwards.
        assert!(dispatch(&server, conn, &mut state, r#"{"type":"join"}"#).is_ok());
    }

    #[test]
    fn test_close_flushes_joined_player_once() {
        let (handle, mut jobs) = PersistenceHandle::channel(64);
        let server = GameServer::with_game(Game::with_seed(GameConfig::default(), 4), handle);
        let (conn, mut rx) = server.connect();
        let mut state = ConnectionState::Connecting;
        dispatch(&server, conn, &mut state, r#"{"type":"join","name":"zoe"}"#).unwrap();
        state = ConnectionState::Active;
        while jobs.try_recv().is_ok() {}
        while rx.try_recv().is_ok() {}

        close(&server, conn, &mut state);
        close(&server, conn, &mut state);

        assert_eq!(state, ConnectionState::Disconnected);
        assert_eq!(server.player_count(), 0);
        let mut flushed = 0;
        while jobs.try_recv().is_ok() {
            flushed += 1;
        }
        // One session upsert and one score entry.
        assert_eq!(flushed, 2);
        assert!(rx.try_recv().unwrap().contains("playerLeft"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_close_before_join() {
        let server = test_server();
        let (conn, _rx) = server.connect();
        let mut state = ConnectionState::Connecting;
        close(&server, conn, &mut state);
        assert_eq!(state, ConnectionState::Disconnected);
        // A closed connection cannot join.
        assert!(dispatch(&server, conn, &mut state, r#"{"type":"join"}"#).is_err());
    }
}
