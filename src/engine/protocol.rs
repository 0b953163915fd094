// Wire protocol: JSON text frames tagged by `type`, in both directions.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use super::player::{ConnectionId, InputState};
use super::world::{Coin, WorldBounds};

/// Errors caused by a single client's payloads. Never fatal to the server.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("binary frames are not supported")]
    BinaryFrame,
    #[error("connection already joined")]
    AlreadyJoined,
}

// ── Client → Server ──────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    Join(JoinRequest),
    Input(InputRequest),
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct JoinRequest {
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: Option<String>,
    #[serde(default, rename = "sessionId", deserialize_with = "lenient_string")]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct InputRequest {
    #[serde(default, deserialize_with = "truthy")]
    pub up: bool,
    #[serde(default, deserialize_with = "truthy")]
    pub down: bool,
    #[serde(default, deserialize_with = "truthy")]
    pub left: bool,
    #[serde(default, deserialize_with = "truthy")]
    pub right: bool,
}

impl From<InputRequest> for InputState {
    fn from(req: InputRequest) -> Self {
        InputState {
            up: req.up,
            down: req.down,
            left: req.left,
            right: req.right,
        }
    }
}

/// Parse one text frame from a client.
pub fn decode_client_message(text: &str) -> Result<ClientMessage, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}

/// Accept strings as-is and stringify numbers/bools; anything else counts as absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

/// Loose boolean coercion for input flags.
fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    })
}

// ── Server → Client ──────────────────────────────────────────────────

/// Messages sent from the server to WebSocket clients.
#[derive(Clone, Serialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Reply to a successful join, sent only to the joining connection.
    Joined {
        #[serde(rename = "sessionId")]
        session_id: String,
        world: WorldBounds,
        collectible: Coin,
    },
    /// Full world snapshot, every tick.
    State(StateSnapshot),
    /// A player's score changed (pickup).
    ScoreUpdate { id: ConnectionId, score: i64 },
    PlayerJoined {
        id: ConnectionId,
        name: String,
        x: f64,
        y: f64,
    },
    PlayerLeft { id: ConnectionId },
    /// Top-N score entries, highest first.
    Leaderboard { entries: Vec<LeaderboardEntry> },
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Snapshot of one player for the per-tick `state` message.
#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct PlayerState {
    pub id: ConnectionId,
    pub x: i64,
    pub y: i64,
    pub name: String,
    pub score: i64,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct StateSnapshot {
    pub players: Vec<PlayerState>,
    pub collectible: Coin,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct LeaderboardEntry {
    pub name: String,
    pub score: i64,
    pub date: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_join() {
        let msg = decode_client_message(r#"{"type":"join","name":"alice","sessionId":"abc"}"#)
            .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join(JoinRequest {
                name: Some("alice".into()),
                session_id: Some("abc".into()),
            })
        );
    }

    #[test]
    fn test_decode_join_without_fields() {
        let msg = decode_client_message(r#"{"type":"join"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Join(JoinRequest::default()));
    }

    #[test]
    fn test_decode_join_coerces_name() {
        let msg = decode_client_message(r#"{"type":"join","name":42,"sessionId":null}"#).unwrap();
        assert_eq!(
            msg,
            ClientMessage::Join(JoinRequest {
                name: Some("42".into()),
                session_id: None,
            })
        );
    }

    #[test]
    fn test_decode_input_coerces_booleans() {
        let msg = decode_client_message(
            r#"{"type":"input","up":1,"down":0,"left":"yes","right":null}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ClientMessage::Input(InputRequest {
                up: true,
                down: false,
                left: true,
                right: false,
            })
        );
    }

    #[test]
    fn test_decode_input_missing_fields_default_false() {
        let msg = decode_client_message(r#"{"type":"input","right":true}"#).unwrap();
        let ClientMessage::Input(req) = msg else {
            panic!("expected input");
        };
        let input: InputState = req.into();
        assert_eq!(
            input,
            InputState {
                right: true,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_client_message("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(decode_client_message(r#"{"type":"teleport","x":1}"#).is_err());
        assert!(decode_client_message(r#"{"name":"no type"}"#).is_err());
    }

    #[test]
    fn test_server_message_tags() {
        let coin = Coin {
            x: 1.0,
            y: 2.0,
            radius: 10.0,
        };
        let joined = ServerMessage::Joined {
            session_id: "sid".into(),
            world: WorldBounds::new(800.0, 600.0),
            collectible: coin,
        };
        let json: Value = serde_json::from_str(&joined.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "joined");
        assert_eq!(json["sessionId"], "sid");
        assert_eq!(json["world"]["w"], 800.0);
        assert_eq!(json["collectible"]["radius"], 10.0);

        let update = ServerMessage::ScoreUpdate { id: 3, score: 7 };
        let json: Value = serde_json::from_str(&update.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "scoreUpdate");
        assert_eq!(json["id"], 3);
        assert_eq!(json["score"], 7);

        let left = ServerMessage::PlayerLeft { id: 9 };
        assert!(left.to_json().unwrap().contains("\"type\":\"playerLeft\""));
    }

    #[test]
    fn test_state_message_shape() {
        let msg = ServerMessage::State(StateSnapshot {
            players: vec![PlayerState {
                id: 1,
                x: 100,
                y: 200,
                name: "bob".into(),
                score: 4,
            }],
            collectible: Coin {
                x: 5.0,
                y: 6.0,
                radius: 10.0,
            },
        });
        let json: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "state");
        assert_eq!(json["players"][0]["name"], "bob");
        assert_eq!(json["players"][0]["x"], 100);
        assert_eq!(json["collectible"]["x"], 5.0);
    }
}
