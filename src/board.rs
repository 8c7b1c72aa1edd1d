use serde::{Deserialize, Serialize};

use crate::tetromino::{Cell, Shape, Tetromino};
use crate::{HEIGHT, WIDTH};

/// Color written into penalty rows. Which rows are penalty rows is tracked
/// on the board, not in the cells.
pub const GARBAGE_FILL: Cell = Cell::Piece(Tetromino::I);

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Returned when penalty rows would push locked cells past the top row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GarbageOverflow {
    pub rows: usize,
    pub headroom: usize,
}

/// Playfield of `WIDTH` x `HEIGHT` cells, row 0 at the top.
///
/// Operations that change locked cells return a new board; a session swaps
/// its board wholesale, so a snapshot handed out earlier never changes.
/// `garbage[y]` marks rows that arrived as penalty rows; the flag moves with
/// its row and disappears when the row is cleared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    cells: [[Cell; WIDTH]; HEIGHT],
    garbage: [bool; HEIGHT],
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl Board {
    pub fn new() -> Self {
        Self {
            cells: [[Cell::Empty; WIDTH]; HEIGHT],
            garbage: [false; HEIGHT],
        }
    }

    pub fn cell(&self, x: usize, y: usize) -> Cell {
        self.cells[y][x]
    }

    pub fn rows(&self) -> &[[Cell; WIDTH]; HEIGHT] {
        &self.cells
    }

    pub fn is_garbage_row(&self, y: usize) -> bool {
        self.garbage[y]
    }

    /// Indices of the rows that came in as penalty rows, top to bottom.
    pub fn garbage_rows(&self) -> Vec<usize> {
        (0..HEIGHT).filter(|&y| self.garbage[y]).collect()
    }

    fn is_occupied(&self, x: i32, y: i32) -> bool {
        if x < 0 || x >= WIDTH as i32 {
            return true;
        }
        if y >= HEIGHT as i32 {
            return true;
        }
        // Rows above the top never hold locked cells.
        if y < 0 {
            return false;
        }
        !self.cells[y as usize][x as usize].is_empty()
    }

    pub fn is_valid_move(&self, shape: &Shape, pos: Point) -> bool {
        shape
            .blocks()
            .all(|(dx, dy)| !self.is_occupied(pos.x + dx, pos.y + dy))
    }

    /// Writes the shape's cells without checking validity. Cells above the
    /// top row have nowhere to go and are dropped.
    pub fn place(&self, shape: &Shape, pos: Point, cell: Cell) -> Board {
        let mut next = self.clone();
        for (dx, dy) in shape.blocks() {
            let x = pos.x + dx;
            let y = pos.y + dy;
            if (0..WIDTH as i32).contains(&x) && (0..HEIGHT as i32).contains(&y) {
                next.cells[y as usize][x as usize] = cell;
            }
        }
        next
    }

    pub fn find_completed_lines(&self) -> Vec<usize> {
        (0..HEIGHT)
            .filter(|&y| self.cells[y].iter().all(|c| !c.is_empty()))
            .collect()
    }

    pub fn clear(&self, rows: &[usize]) -> Board {
        let mut next = Board::new();
        let mut write = HEIGHT;
        for y in (0..HEIGHT).rev() {
            if rows.contains(&y) {
                continue;
            }
            write -= 1;
            next.cells[write] = self.cells[y];
            next.garbage[write] = self.garbage[y];
        }
        next
    }

    /// Pushes the stack up by `rows` and fills the bottom with penalty rows
    /// that are solid except for `gap`.
    pub fn inject_garbage(&self, rows: usize, gap: usize) -> Result<Board, GarbageOverflow> {
        let headroom = self.headroom();
        if rows > headroom {
            return Err(GarbageOverflow { rows, headroom });
        }
        let gap = gap % WIDTH;
        let mut next = Board::new();
        for y in rows..HEIGHT {
            next.cells[y - rows] = self.cells[y];
            next.garbage[y - rows] = self.garbage[y];
        }
        let mut garbage = [GARBAGE_FILL; WIDTH];
        garbage[gap] = Cell::Empty;
        for y in (HEIGHT - rows)..HEIGHT {
            next.cells[y] = garbage;
            next.garbage[y] = true;
        }
        Ok(next)
    }

    pub fn is_spawn_blocked(&self, shape: &Shape, spawn: Point) -> bool {
        !self.is_valid_move(shape, spawn)
    }

    /// Number of completely empty rows above the highest locked cell.
    pub fn headroom(&self) -> usize {
        self.cells
            .iter()
            .position(|row| row.iter().any(|c| !c.is_empty()))
            .unwrap_or(HEIGHT)
    }

    pub fn filled_count(&self) -> usize {
        self.cells
            .iter()
            .flatten()
            .filter(|c| !c.is_empty())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.headroom() == HEIGHT
    }

    /// Row-major cell ids, the compact form carried in snapshots.
    pub fn to_ids(&self) -> Vec<u8> {
        self.cells.iter().flatten().map(|c| c.id()).collect()
    }

    pub(crate) fn set(&mut self, x: usize, y: usize, cell: Cell) {
        self.cells[y][x] = cell;
    }
}

#[cfg(test)]
pub(crate) fn board_from_rows(rows: &[&str]) -> Board {
    // Rows are given bottom-aligned; '.' is empty, anything else is filled.
    let mut board = Board::new();
    let offset = HEIGHT - rows.len();
    for (i, row) in rows.iter().enumerate() {
        for (x, ch) in row.chars().enumerate() {
            if ch != '.' {
                board.set(x, offset + i, GARBAGE_FILL);
            }
        }
    }
    board
}
