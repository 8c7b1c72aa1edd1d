use serde::{Deserialize, Serialize};

use crate::WIDTH;
use crate::board::{Board, Point};
use crate::tetromino::{Shape, Tetromino};

/// Anchor offsets tried in order when a rotation does not fit in place.
const KICKS: [(i32, i32); 6] = [(0, 0), (-1, 0), (1, 0), (0, -1), (-2, 0), (2, 0)];
// The long bar needs the two-column kicks before the upward one.
const I_KICKS: [(i32, i32); 6] = [(0, 0), (-1, 0), (1, 0), (-2, 0), (2, 0), (0, -1)];
const NO_KICKS: [(i32, i32); 1] = [(0, 0)];

pub fn kick_offsets(piece: Tetromino) -> &'static [(i32, i32)] {
    match piece {
        Tetromino::I => &I_KICKS,
        Tetromino::O => &NO_KICKS,
        _ => &KICKS,
    }
}

/// Horizontally centered, with the shape's first occupied row on row 0.
pub fn spawn_position(piece: Tetromino) -> Point {
    let shape = piece.shape(0);
    Point::new(
        ((WIDTH - shape.size()) / 2) as i32,
        -(shape.top_row() as i32),
    )
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ActivePiece {
    pub piece: Tetromino,
    pub rotation: usize,
    pub position: Point,
}

impl ActivePiece {
    pub fn new(piece: Tetromino, rotation: usize, position: Point) -> Self {
        Self {
            piece,
            rotation,
            position,
        }
    }

    pub fn spawned(piece: Tetromino) -> Self {
        Self::new(piece, 0, spawn_position(piece))
    }

    pub fn shape(&self) -> &'static Shape {
        self.piece.shape(self.rotation)
    }

    /// Board coordinates of the four occupied cells.
    pub fn cells(&self) -> Vec<Point> {
        self.shape()
            .blocks()
            .map(|(dx, dy)| self.position.offset(dx, dy))
            .collect()
    }
}

/// Owns the falling piece of one session and moves it against that
/// session's board. Illegal moves leave the piece where it was.
#[derive(Clone, Debug, Default)]
pub struct PieceController {
    active: Option<ActivePiece>,
}

impl PieceController {
    pub fn new() -> Self {
        Self { active: None }
    }

    pub fn active(&self) -> Option<&ActivePiece> {
        self.active.as_ref()
    }

    pub fn take(&mut self) -> Option<ActivePiece> {
        self.active.take()
    }

    pub fn clear(&mut self) {
        self.active = None;
    }

    /// Puts `piece` at the spawn position. Returns false when the spawn cell
    /// range is already occupied; the piece is still set so it can be drawn
    /// over the stack it collided with.
    pub fn spawn(&mut self, board: &Board, piece: Tetromino) -> bool {
        let active = ActivePiece::spawned(piece);
        let blocked = board.is_spawn_blocked(active.shape(), active.position);
        self.active = Some(active);
        !blocked
    }

    pub fn try_move(&mut self, board: &Board, dx: i32, dy: i32) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        let target = active.position.offset(dx, dy);
        if !board.is_valid_move(active.shape(), target) {
            return false;
        }
        active.position = target;
        true
    }

    pub fn rotate(&mut self, board: &Board) -> bool {
        let Some(active) = self.active.as_mut() else {
            return false;
        };
        let rotation = active.piece.next_rotation(active.rotation);
        if rotation == active.rotation {
            return false;
        }
        let shape = active.piece.shape(rotation);
        for &(dx, dy) in kick_offsets(active.piece) {
            let target = active.position.offset(dx, dy);
            if board.is_valid_move(shape, target) {
                active.rotation = rotation;
                active.position = target;
                return true;
            }
        }
        false
    }

    /// Drops the piece as far as it goes and returns the rows travelled.
    pub fn hard_drop(&mut self, board: &Board) -> u32 {
        let mut dropped = 0;
        while self.try_move(board, 0, 1) {
            dropped += 1;
        }
        dropped
    }

    /// Where the piece would land if hard dropped now.
    pub fn ghost(&self, board: &Board) -> Option<ActivePiece> {
        let mut ghost = *self.active.as_ref()?;
        while board.is_valid_move(ghost.shape(), ghost.position.offset(0, 1)) {
            ghost.position.y += 1;
        }
        Some(ghost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HEIGHT;
    use crate::board::board_from_rows;

    #[test]
    fn spawn_is_centered_on_top_row() {
        for piece in Tetromino::all() {
            let active = ActivePiece::spawned(piece);
            let cells = active.cells();
            assert_eq!(cells.iter().map(|p| p.y).min(), Some(0), "{piece}");
            let min_x = cells.iter().map(|p| p.x).min().unwrap();
            let max_x = cells.iter().map(|p| p.x).max().unwrap();
            let left = min_x;
            let right = WIDTH as i32 - 1 - max_x;
            assert!((left - right).abs() <= 1, "{piece}: {left} vs {right}");
        }
    }

    #[test]
    fn moves_are_no_ops_when_blocked() {
        let board = Board::new();
        let mut controller = PieceController::new();
        assert!(controller.spawn(&board, Tetromino::O));
        let mut moves = 0;
        while controller.try_move(&board, -1, 0) {
            moves += 1;
        }
        assert_eq!(moves, 4);
        let before = *controller.active().unwrap();
        assert!(!controller.try_move(&board, -1, 0));
        assert_eq!(*controller.active().unwrap(), before);
    }

    #[test]
    fn i_piece_falls_nineteen_rows() {
        let board = Board::new();
        let mut controller = PieceController::new();
        controller.spawn(&board, Tetromino::I);
        for _ in 0..HEIGHT - 1 {
            assert!(controller.try_move(&board, 0, 1));
        }
        assert!(!controller.try_move(&board, 0, 1));
    }

    #[test]
    fn hard_drop_reports_distance_and_matches_ghost() {
        let board = board_from_rows(&["XXXXXXXXX.", "XXXXXXXXX."]);
        let mut controller = PieceController::new();
        controller.spawn(&board, Tetromino::T);
        let ghost = controller.ghost(&board).unwrap();
        let dropped = controller.hard_drop(&board);
        assert_eq!(dropped, HEIGHT as u32 - 4);
        assert_eq!(*controller.active().unwrap(), ghost);
    }

    #[test]
    fn rotation_kicks_off_the_wall() {
        let board = Board::new();
        let mut controller = PieceController::new();
        controller.spawn(&board, Tetromino::I);
        assert!(controller.rotate(&board));
        // Vertical bar pushed against the right wall.
        while controller.try_move(&board, 1, 0) {}
        let before = *controller.active().unwrap();
        assert_eq!(before.cells()[0].x, WIDTH as i32 - 1);
        assert!(controller.rotate(&board));
        let after = *controller.active().unwrap();
        assert_eq!(after.rotation, 0);
        assert!(after.cells().iter().all(|p| p.x < WIDTH as i32));
        assert_ne!(after.position, before.position);
    }

    #[test]
    fn o_piece_never_rotates() {
        let board = Board::new();
        let mut controller = PieceController::new();
        controller.spawn(&board, Tetromino::O);
        assert!(!controller.rotate(&board));
    }

    #[test]
    fn rotation_fails_when_every_kick_collides() {
        // Narrow one-column well: a vertical I fits, the horizontal one cannot.
        let rows = vec!["XXXX.XXXXX"; 8];
        let board = board_from_rows(&rows);
        let mut controller = PieceController::new();
        controller.spawn(&board, Tetromino::I);
        assert!(controller.rotate(&board));
        // Bar sits in column 5; move it into the well at column 4 and drop.
        assert!(controller.try_move(&board, -1, 0));
        controller.hard_drop(&board);
        let before = *controller.active().unwrap();
        assert!(!controller.rotate(&board));
        assert_eq!(*controller.active().unwrap(), before);
    }
}
