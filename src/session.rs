use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::board::{Board, Point};
use crate::config::GameConfig;
use crate::error::CoreError;
use crate::piece::{ActivePiece, PieceController};
use crate::scoring::resolve_lock;
use crate::sequence::SharedSequence;
use crate::tetromino::Tetromino;
use crate::{HEIGHT, WIDTH};

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    Idle,
    Running,
    Paused,
    GameOver,
}

/// Discrete player input. Each one is applied synchronously to a session.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    MoveLeft,
    MoveRight,
    Rotate,
    SoftDrop,
    HardDrop,
    PauseToggle,
    Start,
    Restart,
}

impl Action {
    pub fn name(self) -> &'static str {
        match self {
            Action::MoveLeft => "moveLeft",
            Action::MoveRight => "moveRight",
            Action::Rotate => "rotate",
            Action::SoftDrop => "softDrop",
            Action::HardDrop => "hardDrop",
            Action::PauseToggle => "pauseToggle",
            Action::Start => "start",
            Action::Restart => "restart",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Action {
    type Err = CoreError;

    /// Accepts `moveLeft`, `move-left` and `move_left` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "moveleft" | "left" => Ok(Action::MoveLeft),
            "moveright" | "right" => Ok(Action::MoveRight),
            "rotate" => Ok(Action::Rotate),
            "softdrop" => Ok(Action::SoftDrop),
            "harddrop" => Ok(Action::HardDrop),
            "pausetoggle" | "pause" => Ok(Action::PauseToggle),
            "start" => Ok(Action::Start),
            "restart" => Ok(Action::Restart),
            _ => Err(CoreError::UnknownAction(s.to_string())),
        }
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum GameOverReason {
    /// The next piece did not fit at the spawn position.
    SpawnBlocked,
    /// A piece locked with cells above the top row.
    LockOut,
    /// Penalty rows did not fit under the stack.
    GarbageOverflow,
}

/// Things a session reports to whoever drives it, in the order they happened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    /// `garbage` is what this lock sends to an opponent, after any
    /// counter-cancel against rows queued here.
    Locked {
        piece: Tetromino,
        lines: usize,
        score: u32,
        garbage: u32,
    },
    GarbageInjected {
        rows: u32,
    },
    GameOver {
        reason: GameOverReason,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct GarbageBatch {
    rows: u32,
    gap: usize,
}

/// Everything the local renderer needs for one frame.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub seq: u64,
    pub width: usize,
    pub height: usize,
    pub cells: Vec<u8>,
    pub garbage_rows: Vec<usize>,
    pub active: Vec<Point>,
    pub active_piece: Option<Tetromino>,
    pub ghost: Vec<Point>,
    pub next: Option<Tetromino>,
    pub score: u32,
    pub level: u32,
    pub lines: u32,
    pub pending_garbage: u32,
    pub state: SessionState,
    pub paused: bool,
    pub game_over: bool,
}

pub struct GameSession {
    config: GameConfig,
    sequence: SharedSequence,
    cursor: usize,
    board: Board,
    controller: PieceController,
    next: Option<Tetromino>,
    score: u32,
    level: u32,
    lines: u32,
    pieces: u32,
    state: SessionState,
    game_over: Option<GameOverReason>,
    fall_accum_ms: f32,
    pending_garbage: VecDeque<GarbageBatch>,
    // Bumped on every permanent board write; orders opponent snapshots.
    board_version: u64,
    // Bumped on every visible change, including piece movement.
    revision: u64,
    events: Vec<SessionEvent>,
}

impl GameSession {
    pub fn new(config: GameConfig, sequence: SharedSequence) -> Self {
        let level = config.start_level.max(1);
        Self {
            config,
            sequence,
            cursor: 0,
            board: Board::new(),
            controller: PieceController::new(),
            next: None,
            score: 0,
            level,
            lines: 0,
            pieces: 0,
            state: SessionState::Idle,
            game_over: None,
            fall_accum_ms: 0.0,
            pending_garbage: VecDeque::new(),
            board_version: 0,
            revision: 0,
            events: Vec::new(),
        }
    }

    /// A single-player session dealing from its own sequence.
    pub fn solo(config: GameConfig, seed: u64) -> Self {
        Self::new(config, SharedSequence::new(seed))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_game_over(&self) -> bool {
        self.state == SessionState::GameOver
    }

    pub fn game_over_reason(&self) -> Option<GameOverReason> {
        self.game_over
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn active(&self) -> Option<&ActivePiece> {
        self.controller.active()
    }

    pub fn next_piece(&self) -> Option<Tetromino> {
        self.next
    }

    pub fn score(&self) -> u32 {
        self.score
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn lines(&self) -> u32 {
        self.lines
    }

    pub fn pieces_placed(&self) -> u32 {
        self.pieces
    }

    pub fn board_version(&self) -> u64 {
        self.board_version
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn drop_interval_ms(&self) -> f32 {
        self.config.drop_interval_ms(self.level)
    }

    pub fn pending_garbage_rows(&self) -> u32 {
        self.pending_garbage.iter().map(|b| b.rows).sum()
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn start(&mut self) -> bool {
        if self.state != SessionState::Idle {
            return false;
        }
        self.state = SessionState::Running;
        let first = self.draw();
        self.next = Some(self.draw());
        tracing::debug!(first = %first, cursor = self.cursor, "session started");
        self.spawn(first);
        self.touch();
        true
    }

    pub fn toggle_pause(&mut self) -> bool {
        self.state = match self.state {
            SessionState::Running => SessionState::Paused,
            SessionState::Paused => SessionState::Running,
            _ => return false,
        };
        self.touch();
        true
    }

    /// Back to `Idle` with a fresh board and counters. A finished game stays
    /// finished. The sequence cursor keeps going, so a restarted game does
    /// not replay the pieces already dealt.
    pub fn restart(&mut self) -> bool {
        if self.state == SessionState::GameOver {
            return false;
        }
        self.board = Board::new();
        self.controller.clear();
        self.next = None;
        self.score = 0;
        self.level = self.config.start_level.max(1);
        self.lines = 0;
        self.pieces = 0;
        self.fall_accum_ms = 0.0;
        self.pending_garbage.clear();
        self.state = SessionState::Idle;
        self.board_version += 1;
        self.touch();
        true
    }

    /// Applies one input. Returns whether it changed anything; input other
    /// than the lifecycle actions is dropped unless the game is running.
    pub fn apply(&mut self, action: Action) -> bool {
        let applied = match action {
            Action::Start => self.start(),
            Action::Restart => self.restart(),
            Action::PauseToggle => self.toggle_pause(),
            _ if self.state != SessionState::Running => false,
            Action::MoveLeft => self.controller.try_move(&self.board, -1, 0),
            Action::MoveRight => self.controller.try_move(&self.board, 1, 0),
            Action::Rotate => self.controller.rotate(&self.board),
            Action::SoftDrop => {
                self.soft_drop();
                true
            }
            Action::HardDrop => {
                self.hard_drop();
                true
            }
        };
        if applied {
            self.touch();
        }
        applied
    }

    /// One gravity step. Returns false when the piece could not fall and
    /// was locked instead, or when the session is not running.
    pub fn tick(&mut self) -> bool {
        if self.state != SessionState::Running {
            return false;
        }
        if self.controller.try_move(&self.board, 0, 1) {
            self.touch();
            true
        } else {
            self.lock_active();
            false
        }
    }

    /// Runs as many gravity steps as `dt_ms` covers at the current level.
    pub fn advance(&mut self, dt_ms: f32) {
        if self.state != SessionState::Running {
            return;
        }
        self.fall_accum_ms += dt_ms;
        loop {
            let interval = self.drop_interval_ms();
            if self.fall_accum_ms < interval {
                break;
            }
            self.fall_accum_ms -= interval;
            let carry = self.fall_accum_ms;
            let fell = self.tick();
            if self.state != SessionState::Running {
                break;
            }
            if !fell {
                // A gravity lock keeps the time left over in this step.
                self.fall_accum_ms = carry;
            }
        }
    }

    /// Queues penalty rows; they land at this session's next lock.
    pub fn queue_garbage(&mut self, rows: u32, gap: usize) {
        if rows == 0 || self.is_game_over() {
            return;
        }
        self.pending_garbage.push_back(GarbageBatch { rows, gap });
        self.touch();
    }

    /// Spends `rows` of outgoing garbage on rows queued against this
    /// session and returns what is left to send.
    pub fn cancel_pending(&mut self, mut rows: u32) -> u32 {
        while rows > 0 {
            let Some(front) = self.pending_garbage.front_mut() else {
                break;
            };
            let spent = front.rows.min(rows);
            front.rows -= spent;
            rows -= spent;
            if front.rows == 0 {
                self.pending_garbage.pop_front();
            }
        }
        self.touch();
        rows
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let visible = |p: &Point| (0..HEIGHT as i32).contains(&p.y);
        let active = self.controller.active();
        let ghost = if self.state == SessionState::Running {
            self.controller.ghost(&self.board)
        } else {
            None
        };
        SessionSnapshot {
            seq: self.revision,
            width: WIDTH,
            height: HEIGHT,
            cells: self.board.to_ids(),
            garbage_rows: self.board.garbage_rows(),
            active: active
                .map(|a| a.cells().into_iter().filter(visible).collect())
                .unwrap_or_default(),
            active_piece: active.map(|a| a.piece),
            ghost: ghost
                .map(|g| g.cells().into_iter().filter(visible).collect())
                .unwrap_or_default(),
            next: self.next,
            score: self.score,
            level: self.level,
            lines: self.lines,
            pending_garbage: self.pending_garbage_rows(),
            state: self.state,
            paused: self.state == SessionState::Paused,
            game_over: self.is_game_over(),
        }
    }

    fn touch(&mut self) {
        self.revision += 1;
    }

    fn draw(&mut self) -> Tetromino {
        let piece = self.sequence.piece_at(self.cursor);
        self.cursor += 1;
        piece
    }

    fn spawn(&mut self, piece: Tetromino) {
        if !self.controller.spawn(&self.board, piece) {
            self.end(GameOverReason::SpawnBlocked);
        }
    }

    fn spawn_next(&mut self) {
        let piece = match self.next.take() {
            Some(piece) => piece,
            None => self.draw(),
        };
        self.next = Some(self.draw());
        self.spawn(piece);
    }

    fn soft_drop(&mut self) {
        if self.controller.try_move(&self.board, 0, 1) {
            self.score = self
                .score
                .saturating_add(self.config.scoring.soft_drop_per_cell);
        } else {
            self.lock_active();
        }
    }

    fn hard_drop(&mut self) {
        let dropped = self.controller.hard_drop(&self.board);
        self.score = self
            .score
            .saturating_add(dropped.saturating_mul(self.config.scoring.hard_drop_per_cell));
        self.lock_active();
    }

    fn lock_active(&mut self) {
        let Some(active) = self.controller.take() else {
            return;
        };
        let result = resolve_lock(&self.board, &active);
        self.board = result.board;
        self.pieces += 1;
        self.fall_accum_ms = 0.0;

        let cleared = result.cleared_rows.len();
        let gained = self
            .config
            .scoring
            .line_clear_score(cleared, self.level);
        self.score = self.score.saturating_add(gained);
        self.lines += cleared as u32;
        self.level = self
            .config
            .scoring
            .level_for_lines(self.config.start_level, self.lines);
        let mut garbage = self.config.garbage.rows_for(cleared);
        if self.config.garbage.counter_cancel && garbage > 0 {
            garbage = self.cancel_pending(garbage);
        }
        self.board_version += 1;
        self.events.push(SessionEvent::Locked {
            piece: active.piece,
            lines: cleared,
            score: gained,
            garbage,
        });
        tracing::debug!(piece = %active.piece, cleared, score = self.score, "piece locked");

        if result.locked_out {
            self.end(GameOverReason::LockOut);
            return;
        }
        self.inject_pending();
        if !self.is_game_over() {
            self.spawn_next();
        }
        self.touch();
    }

    fn inject_pending(&mut self) {
        while let Some(batch) = self.pending_garbage.pop_front() {
            match self.board.inject_garbage(batch.rows as usize, batch.gap) {
                Ok(board) => {
                    self.board = board;
                    self.board_version += 1;
                    self.events
                        .push(SessionEvent::GarbageInjected { rows: batch.rows });
                }
                Err(overflow) => {
                    tracing::debug!(
                        rows = overflow.rows,
                        headroom = overflow.headroom,
                        "garbage overflow"
                    );
                    self.pending_garbage.clear();
                    self.end(GameOverReason::GarbageOverflow);
                    return;
                }
            }
        }
    }

    fn end(&mut self, reason: GameOverReason) {
        self.state = SessionState::GameOver;
        self.game_over = Some(reason);
        self.board_version += 1;
        self.events.push(SessionEvent::GameOver { reason });
        self.touch();
        tracing::debug!(?reason, score = self.score, lines = self.lines, "game over");
    }

    #[cfg(test)]
    pub(crate) fn set_board(&mut self, board: Board) {
        self.board = board;
    }

    #[cfg(test)]
    pub(crate) fn set_active(&mut self, piece: Tetromino) {
        self.controller.spawn(&self.board, piece);
    }

    /// Moves the active piece onto whatever is below it without locking.
    #[cfg(test)]
    pub(crate) fn settle(&mut self) {
        self.controller.hard_drop(&self.board);
    }
}
