//! JSON payloads exchanged with a push transport. The core never touches a
//! connection; these types are what a transport serializes.

use serde::{Deserialize, Serialize};

use crate::matchmaking::PlayerId;
use crate::room::{MatchResult, OpponentSnapshot, RoomEvent};
use crate::session::{Action, SessionSnapshot};

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    RequestMatch { player_id: PlayerId },
    CancelMatch,
    Action { action: Action },
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    Queued,
    Cancelled,
    #[serde(rename_all = "camelCase")]
    MatchFound {
        room_id: u64,
        opponent: PlayerId,
        seed: u64,
    },
    State {
        snapshot: SessionSnapshot,
    },
    Opponent {
        snapshot: OpponentSnapshot,
    },
    GarbageReceived {
        rows: u32,
    },
    MatchEnded {
        result: MatchResult,
    },
    Error {
        message: String,
    },
}

impl ClientMessage {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

impl ServerMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Splits a room event into the messages each player should receive.
/// `GarbageQueued` is room bookkeeping; players learn about garbage through
/// their own state and `GarbageReceived`.
pub fn route(event: RoomEvent) -> Vec<(PlayerId, ServerMessage)> {
    match event {
        RoomEvent::MatchFound {
            room_id,
            player,
            opponent,
            seed,
        } => vec![(
            player,
            ServerMessage::MatchFound {
                room_id,
                opponent,
                seed,
            },
        )],
        RoomEvent::OpponentUpdate { to, snapshot } => {
            vec![(to, ServerMessage::Opponent { snapshot })]
        }
        RoomEvent::GarbageQueued { .. } => Vec::new(),
        RoomEvent::GarbageReceived { player, rows } => {
            vec![(player, ServerMessage::GarbageReceived { rows })]
        }
        RoomEvent::MatchEnded { result, .. } => result
            .stats
            .iter()
            .map(|s| {
                (
                    s.player.clone(),
                    ServerMessage::MatchEnded {
                        result: result.clone(),
                    },
                )
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::{EndReason, PlayerStats};

    #[test]
    fn parses_client_messages() {
        let request = ClientMessage::from_json(r#"{"type":"requestMatch","playerId":"p1"}"#).unwrap();
        assert_eq!(
            request,
            ClientMessage::RequestMatch {
                player_id: "p1".into()
            }
        );
        let action = ClientMessage::from_json(r#"{"type":"action","action":"hardDrop"}"#).unwrap();
        assert_eq!(
            action,
            ClientMessage::Action {
                action: Action::HardDrop
            }
        );
        assert_eq!(
            ClientMessage::from_json(r#"{"type":"cancelMatch"}"#).unwrap(),
            ClientMessage::CancelMatch
        );
        assert!(ClientMessage::from_json(r#"{"type":"action","action":"fly"}"#).is_err());
    }

    #[test]
    fn server_messages_are_tagged_camel_case() {
        let json = ServerMessage::MatchFound {
            room_id: 3,
            opponent: "p2".into(),
            seed: 11,
        }
        .to_json()
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "matchFound");
        assert_eq!(value["roomId"], 3);
        assert_eq!(value["opponent"], "p2");
    }

    #[test]
    fn match_end_goes_to_both_players() {
        let stats = |id: &str| PlayerStats {
            player: id.into(),
            score: 0,
            lines: 0,
            pieces: 0,
            lines_sent: 0,
            lines_received: 0,
        };
        let result = MatchResult {
            winner: Some("a".into()),
            reason: EndReason::Disconnect,
            stats: [stats("a"), stats("b")],
        };
        let routed = route(RoomEvent::MatchEnded { room_id: 1, result });
        let to: Vec<&str> = routed.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(to, vec!["a", "b"]);
        assert!(route(RoomEvent::GarbageQueued { to: "b".into(), rows: 2 }).is_empty());
    }
}
