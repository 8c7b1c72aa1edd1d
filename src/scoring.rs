use serde::{Deserialize, Serialize};

use crate::board::Board;
use crate::error::CoreError;
use crate::piece::ActivePiece;

/// Points for clearing 0..=4 lines at once, before the level multiplier.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoringRules {
    pub line_clear: [u32; 5],
    pub soft_drop_per_cell: u32,
    pub hard_drop_per_cell: u32,
    pub lines_per_level: u32,
}

impl Default for ScoringRules {
    fn default() -> Self {
        Self {
            line_clear: [0, 40, 100, 300, 1200],
            soft_drop_per_cell: 1,
            hard_drop_per_cell: 2,
            lines_per_level: 10,
        }
    }
}

impl ScoringRules {
    pub fn line_clear_score(&self, lines: usize, level: u32) -> u32 {
        let base = self.line_clear[lines.min(4)];
        base.saturating_mul(level.max(1))
    }

    pub fn level_for_lines(&self, start_level: u32, lines: u32) -> u32 {
        start_level.max(1) + lines / self.lines_per_level.max(1)
    }
}

/// Gravity tick period as a function of level.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GravityCurve {
    pub base_interval_ms: f32,
    pub decay: f32,
    pub min_interval_ms: f32,
}

impl Default for GravityCurve {
    fn default() -> Self {
        Self {
            base_interval_ms: 1000.0,
            decay: 0.85,
            min_interval_ms: 100.0,
        }
    }
}

impl GravityCurve {
    /// The interval must shrink with every level until it hits the floor.
    pub fn validate(&self) -> Result<(), CoreError> {
        if !(self.decay > 0.0 && self.decay < 1.0) {
            return Err(CoreError::InvalidConfig(format!(
                "gravity decay {} is not between 0 and 1",
                self.decay
            )));
        }
        if !(self.min_interval_ms > 0.0 && self.min_interval_ms <= self.base_interval_ms) {
            return Err(CoreError::InvalidConfig(format!(
                "gravity floor {}ms must be positive and at most the base {}ms",
                self.min_interval_ms, self.base_interval_ms
            )));
        }
        Ok(())
    }

    pub fn interval_ms(&self, level: u32) -> f32 {
        let steps = level.max(1) - 1;
        let decayed = self.base_interval_ms * self.decay.powi(steps.min(i32::MAX as u32) as i32);
        decayed.max(self.min_interval_ms)
    }
}

/// Penalty rows sent to the opponent for clearing 0..=4 lines at once.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GarbageTable {
    pub rows: [u32; 5],
    /// Outgoing rows first cancel rows already queued against the sender.
    pub counter_cancel: bool,
}

impl Default for GarbageTable {
    fn default() -> Self {
        Self {
            rows: [0, 0, 1, 2, 4],
            counter_cancel: false,
        }
    }
}

impl GarbageTable {
    pub fn rows_for(&self, lines: usize) -> u32 {
        self.rows[lines.min(4)]
    }
}

pub struct LockResult {
    pub board: Board,
    pub cleared_rows: Vec<usize>,
    /// Some part of the piece locked above the visible top row.
    pub locked_out: bool,
}

/// Writes the piece into the board, then removes the rows it completed.
pub fn resolve_lock(board: &Board, piece: &ActivePiece) -> LockResult {
    let shape = piece.shape();
    let locked_out = shape
        .blocks()
        .any(|(_, dy)| piece.position.y + dy < 0);
    let placed = board.place(shape, piece.position, piece.piece.cell());
    let cleared_rows = placed.find_completed_lines();
    let board = if cleared_rows.is_empty() {
        placed
    } else {
        placed.clear(&cleared_rows)
    };
    LockResult {
        board,
        cleared_rows,
        locked_out,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Point, board_from_rows};
    use crate::tetromino::Tetromino;
    use crate::{HEIGHT, WIDTH};

    #[test]
    fn line_clear_score_orders_by_lines_and_level() {
        let rules = ScoringRules::default();
        for level in 1..30 {
            assert_eq!(rules.line_clear_score(0, level), 0);
            let scores: Vec<u32> = (0..=4).map(|n| rules.line_clear_score(n, level)).collect();
            assert!(scores.windows(2).all(|w| w[0] < w[1]), "level {level}: {scores:?}");
            for n in 0..=4 {
                assert!(rules.line_clear_score(n, level + 1) >= rules.line_clear_score(n, level));
            }
        }
    }

    #[test]
    fn multi_clears_beat_repeated_singles() {
        let rules = ScoringRules::default();
        for n in 2..=4 {
            assert!(rules.line_clear_score(n, 1) > n as u32 * rules.line_clear_score(1, 1));
        }
    }

    #[test]
    fn level_increments_every_ten_lines() {
        let rules = ScoringRules::default();
        assert_eq!(rules.level_for_lines(1, 0), 1);
        assert_eq!(rules.level_for_lines(1, 9), 1);
        assert_eq!(rules.level_for_lines(1, 10), 2);
        assert_eq!(rules.level_for_lines(1, 35), 4);
        assert_eq!(rules.level_for_lines(5, 10), 6);
    }

    #[test]
    fn drop_interval_decreases_to_floor() {
        let curve = GravityCurve::default();
        let mut previous = curve.interval_ms(1);
        assert_eq!(previous, 1000.0);
        let mut level = 2;
        while curve.interval_ms(level) > curve.min_interval_ms {
            let current = curve.interval_ms(level);
            assert!(current < previous);
            previous = current;
            level += 1;
        }
        assert_eq!(curve.interval_ms(level), curve.min_interval_ms);
        assert_eq!(curve.interval_ms(500), curve.min_interval_ms);
    }

    #[test]
    fn gravity_curve_rejects_non_decreasing_settings() {
        assert!(GravityCurve::default().validate().is_ok());
        let flat = GravityCurve {
            decay: 1.0,
            ..GravityCurve::default()
        };
        assert!(matches!(flat.validate(), Err(CoreError::InvalidConfig(_))));
        let inverted = GravityCurve {
            min_interval_ms: 2000.0,
            ..GravityCurve::default()
        };
        assert!(inverted.validate().is_err());
        let nan = GravityCurve {
            decay: f32::NAN,
            ..GravityCurve::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn garbage_grows_with_lines() {
        let table = GarbageTable::default();
        assert_eq!(table.rows_for(0), 0);
        assert_eq!(table.rows_for(1), 0);
        assert!(table.rows_for(2) > 0);
        assert!(table.rows_for(3) > table.rows_for(2));
        assert!(table.rows_for(4) > table.rows_for(3));
    }

    #[test]
    fn resolve_lock_clears_completed_row() {
        // Bottom row missing two cells at columns 4 and 5.
        let board = board_from_rows(&["XXXX..XXXX"]);
        let piece = ActivePiece::new(Tetromino::O, 0, Point::new(4, HEIGHT as i32 - 2));
        let result = resolve_lock(&board, &piece);
        assert_eq!(result.cleared_rows, vec![HEIGHT - 1]);
        assert!(!result.locked_out);
        assert_eq!(result.board.filled_count(), 2);
        assert_eq!(result.board.cell(4, HEIGHT - 1), Tetromino::O.cell());
        assert_eq!(result.board.rows().len(), HEIGHT);
        assert_eq!(result.board.rows()[0].len(), WIDTH);
    }

    #[test]
    fn resolve_lock_flags_cells_above_top() {
        let piece = ActivePiece::new(Tetromino::O, 0, Point::new(0, -1));
        assert!(resolve_lock(&Board::new(), &piece).locked_out);
    }
}
