use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::WIDTH;
use crate::config::GameConfig;
use crate::error::CoreError;
use crate::matchmaking::{PlayerId, RoomFormed};
use crate::sequence::SharedSequence;
use crate::session::{Action, GameSession, SessionEvent, SessionSnapshot};

/// Read-only view of one player's board, sent to the other player.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OpponentSnapshot {
    pub player: PlayerId,
    pub seq: u64,
    pub cells: Vec<u8>,
    pub garbage_rows: Vec<usize>,
    pub score: u32,
    pub lines: u32,
    pub connected: bool,
    pub game_over: bool,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EndReason {
    TopOut,
    Disconnect,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStats {
    pub player: PlayerId,
    pub score: u32,
    pub lines: u32,
    pub pieces: u32,
    pub lines_sent: u32,
    pub lines_received: u32,
}

/// `winner` is `None` for a draw.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatchResult {
    pub winner: Option<PlayerId>,
    pub reason: EndReason,
    pub stats: [PlayerStats; 2],
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RoomEvent {
    #[serde(rename_all = "camelCase")]
    MatchFound {
        room_id: u64,
        player: PlayerId,
        opponent: PlayerId,
        seed: u64,
    },
    OpponentUpdate {
        to: PlayerId,
        snapshot: OpponentSnapshot,
    },
    GarbageQueued {
        to: PlayerId,
        rows: u32,
    },
    GarbageReceived {
        player: PlayerId,
        rows: u32,
    },
    #[serde(rename_all = "camelCase")]
    MatchEnded {
        room_id: u64,
        result: MatchResult,
    },
}

/// One 1v1 match: two sessions dealing from one sequence, with line clears
/// turned into penalty rows for the other side.
///
/// Everything here runs on whichever task owns the room; sessions are
/// only touched through `apply`, `advance` and `disconnect`.
pub struct Room {
    id: u64,
    players: [PlayerId; 2],
    sequence: SharedSequence,
    sessions: [GameSession; 2],
    connected: [bool; 2],
    mirror_seq: [u64; 2],
    sent: [u32; 2],
    received: [u32; 2],
    gap_rng: StdRng,
    events: UnboundedSender<RoomEvent>,
    started: bool,
    result: Option<MatchResult>,
}

impl Room {
    pub fn new(
        formed: RoomFormed,
        config: GameConfig,
    ) -> Result<(Self, UnboundedReceiver<RoomEvent>), CoreError> {
        let RoomFormed {
            room_id,
            players,
            seed,
        } = formed;
        if players.iter().any(|p| p.as_str().is_empty()) {
            return Err(CoreError::MalformedRoom("empty player id".to_string()));
        }
        if players[0] == players[1] {
            return Err(CoreError::MalformedRoom(format!(
                "{} cannot be matched against themselves",
                players[0]
            )));
        }
        let sequence = SharedSequence::new(seed);
        let sessions = [
            GameSession::new(config.clone(), sequence.clone()),
            GameSession::new(config, sequence.clone()),
        ];
        let (tx, rx) = mpsc::unbounded();
        let room = Self {
            id: room_id,
            players,
            sequence,
            sessions,
            connected: [true, true],
            mirror_seq: [0, 0],
            sent: [0, 0],
            received: [0, 0],
            gap_rng: StdRng::seed_from_u64(!seed),
            events: tx,
            started: false,
            result: None,
        };
        Ok((room, rx))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn players(&self) -> &[PlayerId; 2] {
        &self.players
    }

    pub fn seed(&self) -> u64 {
        self.sequence.seed()
    }

    pub fn is_finished(&self) -> bool {
        self.result.is_some()
    }

    pub fn result(&self) -> Option<&MatchResult> {
        self.result.as_ref()
    }

    pub fn session(&self, player: &PlayerId) -> Option<&GameSession> {
        self.slot(player).map(|idx| &self.sessions[idx])
    }

    pub fn local_snapshot(&self, player: &PlayerId) -> Option<SessionSnapshot> {
        self.session(player).map(GameSession::snapshot)
    }

    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        tracing::info!(room = self.id, seed = self.seed(), "match starting");
        for idx in 0..2 {
            self.emit(RoomEvent::MatchFound {
                room_id: self.id,
                player: self.players[idx].clone(),
                opponent: self.players[1 - idx].clone(),
                seed: self.seed(),
            });
        }
        for session in &mut self.sessions {
            session.start();
        }
        for idx in 0..2 {
            self.mirror(idx);
        }
        self.pump();
    }

    /// Routes one input to the player's own session. Lifecycle actions
    /// belong to the room, so players cannot start, pause or restart.
    pub fn apply(&mut self, player: &PlayerId, action: Action) -> bool {
        if !self.started || self.is_finished() {
            return false;
        }
        let Some(idx) = self.slot(player) else {
            tracing::warn!(room = self.id, %player, "input from a player outside the room");
            return false;
        };
        if matches!(
            action,
            Action::Start | Action::Restart | Action::PauseToggle
        ) {
            tracing::debug!(room = self.id, %player, %action, "lifecycle action ignored in a match");
            return false;
        }
        let applied = self.sessions[idx].apply(action);
        self.pump();
        applied
    }

    /// Advances both gravity clocks. Each session falls at its own level's
    /// interval. Garbage from the first session is queued before the second
    /// one moves, so a lock later in the same step already receives it.
    /// Top-outs are judged once both have moved.
    pub fn advance(&mut self, dt_ms: f32) {
        if !self.started || self.is_finished() {
            return;
        }
        for idx in 0..2 {
            self.sessions[idx].advance(dt_ms);
            self.relay(idx);
        }
        self.check_end();
    }

    pub fn disconnect(&mut self, player: &PlayerId) {
        let Some(idx) = self.slot(player) else {
            return;
        };
        if !self.connected[idx] {
            return;
        }
        self.connected[idx] = false;
        tracing::info!(room = self.id, %player, "player disconnected");
        if self.is_finished() {
            return;
        }
        self.mirror(idx);
        let other = 1 - idx;
        let winner = self.connected[other].then_some(other);
        self.finish(winner, EndReason::Disconnect);
    }

    /// The read-only view of `player`'s board that their opponent is shown.
    pub fn mirror_of(&self, player: &PlayerId) -> Option<OpponentSnapshot> {
        self.slot(player).map(|idx| self.mirror_view(idx))
    }

    fn slot(&self, player: &PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p == player)
    }

    fn emit(&self, event: RoomEvent) {
        // Nobody listening is not an error.
        let _ = self.events.unbounded_send(event);
    }

    fn pump(&mut self) {
        for idx in 0..2 {
            self.relay(idx);
        }
        self.check_end();
    }

    /// Turns one session's pending events into garbage and mirror updates.
    fn relay(&mut self, idx: usize) {
        let events = self.sessions[idx].drain_events();
        if events.is_empty() {
            return;
        }
        for event in events {
            match event {
                SessionEvent::Locked { garbage, .. } => {
                    if garbage > 0 {
                        self.send_garbage(idx, garbage);
                    }
                }
                SessionEvent::GarbageInjected { rows } => {
                    self.received[idx] += rows;
                    self.emit(RoomEvent::GarbageReceived {
                        player: self.players[idx].clone(),
                        rows,
                    });
                }
                SessionEvent::GameOver { reason } => {
                    tracing::info!(room = self.id, player = %self.players[idx], ?reason, "player topped out");
                }
            }
        }
        self.mirror(idx);
    }

    fn send_garbage(&mut self, from: usize, rows: u32) {
        let to = 1 - from;
        if self.sessions[to].is_game_over() {
            return;
        }
        let gap = self.gap_rng.gen_range(0..WIDTH);
        self.sessions[to].queue_garbage(rows, gap);
        self.sent[from] += rows;
        tracing::debug!(room = self.id, to = %self.players[to], rows, gap, "garbage queued");
        self.emit(RoomEvent::GarbageQueued {
            to: self.players[to].clone(),
            rows,
        });
    }

    fn mirror_view(&self, idx: usize) -> OpponentSnapshot {
        let session = &self.sessions[idx];
        OpponentSnapshot {
            player: self.players[idx].clone(),
            seq: self.mirror_seq[idx],
            cells: session.board().to_ids(),
            garbage_rows: session.board().garbage_rows(),
            score: session.score(),
            lines: session.lines(),
            connected: self.connected[idx],
            game_over: session.is_game_over(),
        }
    }

    fn mirror(&mut self, idx: usize) {
        self.mirror_seq[idx] += 1;
        let snapshot = self.mirror_view(idx);
        self.emit(RoomEvent::OpponentUpdate {
            to: self.players[1 - idx].clone(),
            snapshot,
        });
    }

    fn check_end(&mut self) {
        if self.is_finished() {
            return;
        }
        match (self.sessions[0].is_game_over(), self.sessions[1].is_game_over()) {
            (true, true) => self.finish(None, EndReason::TopOut),
            (true, false) => self.finish(Some(1), EndReason::TopOut),
            (false, true) => self.finish(Some(0), EndReason::TopOut),
            (false, false) => {}
        }
    }

    fn stats(&self, idx: usize) -> PlayerStats {
        let session = &self.sessions[idx];
        PlayerStats {
            player: self.players[idx].clone(),
            score: session.score(),
            lines: session.lines(),
            pieces: session.pieces_placed(),
            lines_sent: self.sent[idx],
            lines_received: self.received[idx],
        }
    }

    fn finish(&mut self, winner: Option<usize>, reason: EndReason) {
        let result = MatchResult {
            winner: winner.map(|idx| self.players[idx].clone()),
            reason,
            stats: [self.stats(0), self.stats(1)],
        };
        tracing::info!(
            room = self.id,
            winner = ?result.winner,
            ?reason,
            "match ended"
        );
        self.result = Some(result.clone());
        self.emit(RoomEvent::MatchEnded {
            room_id: self.id,
            result,
        });
        self.events.close_channel();
    }
}

/// Receiver-side holder for the latest opponent snapshot. Snapshots can
/// arrive late or out of order; anything not newer than what is shown is
/// dropped.
#[derive(Clone, Debug, Default)]
pub struct OpponentMirror {
    latest: Option<OpponentSnapshot>,
}

impl OpponentMirror {
    pub fn new() -> Self {
        Self { latest: None }
    }

    pub fn accept(&mut self, snapshot: OpponentSnapshot) -> bool {
        let stale = match &self.latest {
            Some(current) => current.player == snapshot.player && snapshot.seq <= current.seq,
            None => false,
        };
        if stale {
            return false;
        }
        self.latest = Some(snapshot);
        true
    }

    pub fn latest(&self) -> Option<&OpponentSnapshot> {
        self.latest.as_ref()
    }

    pub fn reset(&mut self) {
        self.latest = None;
    }
}
