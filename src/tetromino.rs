use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash)]
pub enum Tetromino {
    I,
    O,
    T,
    S,
    Z,
    J,
    L,
}

impl Tetromino {
    pub const ALL: [Tetromino; 7] = [
        Tetromino::I,
        Tetromino::O,
        Tetromino::T,
        Tetromino::S,
        Tetromino::Z,
        Tetromino::J,
        Tetromino::L,
    ];

    pub fn all() -> [Tetromino; 7] {
        Self::ALL
    }

    fn rotations(self) -> &'static [Shape] {
        match self {
            Tetromino::I => &I_STATES,
            Tetromino::O => &O_STATES,
            Tetromino::T => &T_STATES,
            Tetromino::S => &S_STATES,
            Tetromino::Z => &Z_STATES,
            Tetromino::J => &J_STATES,
            Tetromino::L => &L_STATES,
        }
    }

    pub fn rotation_count(self) -> usize {
        self.rotations().len()
    }

    /// Shape for a rotation state. Passing an index outside the piece's
    /// state table is a caller bug and panics; use [`Tetromino::try_shape`]
    /// for indices that come from untrusted input.
    pub fn shape(self, rotation: usize) -> &'static Shape {
        match self.try_shape(rotation) {
            Ok(shape) => shape,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn try_shape(self, rotation: usize) -> Result<&'static Shape, CoreError> {
        self.rotations()
            .get(rotation)
            .ok_or(CoreError::RotationOutOfRange {
                piece: self,
                rotation,
            })
    }

    pub fn next_rotation(self, rotation: usize) -> usize {
        (rotation + 1) % self.rotation_count()
    }

    pub fn cell(self) -> Cell {
        Cell::Piece(self)
    }

    pub fn color_id(self) -> u8 {
        match self {
            Tetromino::I => 1,
            Tetromino::J => 2,
            Tetromino::L => 3,
            Tetromino::O => 4,
            Tetromino::S => 5,
            Tetromino::Z => 6,
            Tetromino::T => 7,
        }
    }

    pub fn name(self) -> char {
        match self {
            Tetromino::I => 'I',
            Tetromino::O => 'O',
            Tetromino::T => 'T',
            Tetromino::S => 'S',
            Tetromino::Z => 'Z',
            Tetromino::J => 'J',
            Tetromino::L => 'L',
        }
    }
}

impl fmt::Display for Tetromino {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Tetromino {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "I" | "i" => Ok(Tetromino::I),
            "O" | "o" => Ok(Tetromino::O),
            "T" | "t" => Ok(Tetromino::T),
            "S" | "s" => Ok(Tetromino::S),
            "Z" | "z" => Ok(Tetromino::Z),
            "J" | "j" => Ok(Tetromino::J),
            "L" | "l" => Ok(Tetromino::L),
            other => Err(CoreError::UnknownTetromino(other.to_string())),
        }
    }
}

/// Board cell contents: empty or one of the seven piece colors.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash, Default)]
pub enum Cell {
    #[default]
    Empty,
    Piece(Tetromino),
}

impl Cell {
    pub fn is_empty(self) -> bool {
        self == Cell::Empty
    }

    /// Compact id used in snapshots: 0 empty, 1..=7 piece colors.
    pub fn id(self) -> u8 {
        match self {
            Cell::Empty => 0,
            Cell::Piece(t) => t.color_id(),
        }
    }
}

/// A rotation state: occupied cells inside a `size` x `size` box, row 0 on top.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shape {
    size: usize,
    cells: [[bool; 4]; 4],
}

impl Shape {
    const fn new(size: usize, rows: [[u8; 4]; 4]) -> Shape {
        let mut cells = [[false; 4]; 4];
        let mut y = 0;
        while y < 4 {
            let mut x = 0;
            while x < 4 {
                cells[y][x] = rows[y][x] != 0;
                x += 1;
            }
            y += 1;
        }
        Shape { size, cells }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_filled(&self, x: usize, y: usize) -> bool {
        x < self.size && y < self.size && self.cells[y][x]
    }

    /// Offsets `(dx, dy)` of the occupied cells, top to bottom.
    pub fn blocks(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        (0..self.size).flat_map(move |y| {
            (0..self.size)
                .filter(move |&x| self.cells[y][x])
                .map(move |x| (x as i32, y as i32))
        })
    }

    /// First row of the box that holds an occupied cell.
    pub fn top_row(&self) -> usize {
        (0..self.size)
            .find(|&y| self.cells[y].iter().any(|&c| c))
            .unwrap_or(0)
    }
}

// Classic rotation tables: I, S and Z toggle between two states and O never
// rotates, so these are listed per piece instead of derived by transposition.
const I_STATES: [Shape; 2] = [
    Shape::new(4, [[0, 0, 0, 0], [1, 1, 1, 1], [0, 0, 0, 0], [0, 0, 0, 0]]),
    Shape::new(4, [[0, 0, 1, 0], [0, 0, 1, 0], [0, 0, 1, 0], [0, 0, 1, 0]]),
];

const O_STATES: [Shape; 1] = [Shape::new(
    2,
    [[1, 1, 0, 0], [1, 1, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]],
)];

const T_STATES: [Shape; 4] = [
    Shape::new(3, [[0, 1, 0, 0], [1, 1, 1, 0], [0, 0, 0, 0], [0, 0, 0, 0]]),
    Shape::new(3, [[0, 1, 0, 0], [0, 1, 1, 0], [0, 1, 0, 0], [0, 0, 0, 0]]),
    Shape::new(3, [[0, 0, 0, 0], [1, 1, 1, 0], [0, 1, 0, 0], [0, 0, 0, 0]]),
    Shape::new(3, [[0, 1, 0, 0], [1, 1, 0, 0], [0, 1, 0, 0], [0, 0, 0, 0]]),
];

const S_STATES: [Shape; 2] = [
    Shape::new(3, [[0, 1, 1, 0], [1, 1, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]]),
    Shape::new(3, [[0, 1, 0, 0], [0, 1, 1, 0], [0, 0, 1, 0], [0, 0, 0, 0]]),
];

const Z_STATES: [Shape; 2] = [
    Shape::new(3, [[1, 1, 0, 0], [0, 1, 1, 0], [0, 0, 0, 0], [0, 0, 0, 0]]),
    Shape::new(3, [[0, 0, 1, 0], [0, 1, 1, 0], [0, 1, 0, 0], [0, 0, 0, 0]]),
];

const J_STATES: [Shape; 4] = [
    Shape::new(3, [[1, 0, 0, 0], [1, 1, 1, 0], [0, 0, 0, 0], [0, 0, 0, 0]]),
    Shape::new(3, [[0, 1, 1, 0], [0, 1, 0, 0], [0, 1, 0, 0], [0, 0, 0, 0]]),
    Shape::new(3, [[0, 0, 0, 0], [1, 1, 1, 0], [0, 0, 1, 0], [0, 0, 0, 0]]),
    Shape::new(3, [[0, 1, 0, 0], [0, 1, 0, 0], [1, 1, 0, 0], [0, 0, 0, 0]]),
];

const L_STATES: [Shape; 4] = [
    Shape::new(3, [[0, 0, 1, 0], [1, 1, 1, 0], [0, 0, 0, 0], [0, 0, 0, 0]]),
    Shape::new(3, [[0, 1, 0, 0], [0, 1, 0, 0], [0, 1, 1, 0], [0, 0, 0, 0]]),
    Shape::new(3, [[0, 0, 0, 0], [1, 1, 1, 0], [1, 0, 0, 0], [0, 0, 0, 0]]),
    Shape::new(3, [[1, 1, 0, 0], [0, 1, 0, 0], [0, 1, 0, 0], [0, 0, 0, 0]]),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_state_has_four_blocks() {
        for piece in Tetromino::all() {
            for rot in 0..piece.rotation_count() {
                assert_eq!(piece.shape(rot).blocks().count(), 4, "{piece} rotation {rot}");
            }
        }
    }

    #[test]
    fn rotation_counts_follow_classic_table() {
        assert_eq!(Tetromino::O.rotation_count(), 1);
        assert_eq!(Tetromino::I.rotation_count(), 2);
        assert_eq!(Tetromino::S.rotation_count(), 2);
        assert_eq!(Tetromino::Z.rotation_count(), 2);
        for piece in [Tetromino::T, Tetromino::J, Tetromino::L] {
            assert_eq!(piece.rotation_count(), 4);
        }
    }

    #[test]
    fn next_rotation_wraps() {
        assert_eq!(Tetromino::T.next_rotation(3), 0);
        assert_eq!(Tetromino::T.next_rotation(1), 2);
        assert_eq!(Tetromino::I.next_rotation(1), 0);
        assert_eq!(Tetromino::O.next_rotation(0), 0);
    }

    #[test]
    fn out_of_range_rotation_is_a_contract_error() {
        let err = Tetromino::S.try_shape(2).unwrap_err();
        assert!(matches!(
            err,
            CoreError::RotationOutOfRange {
                piece: Tetromino::S,
                rotation: 2
            }
        ));
    }

    #[test]
    #[should_panic]
    fn shape_panics_on_bad_rotation() {
        Tetromino::O.shape(1);
    }

    #[test]
    fn parses_names() {
        assert_eq!("L".parse::<Tetromino>().unwrap(), Tetromino::L);
        assert_eq!(" z ".parse::<Tetromino>().unwrap(), Tetromino::Z);
        assert!(matches!(
            "Q".parse::<Tetromino>(),
            Err(CoreError::UnknownTetromino(name)) if name == "Q"
        ));
    }

    #[test]
    fn i_spawn_state_is_one_row() {
        let shape = Tetromino::I.shape(0);
        assert_eq!(shape.top_row(), 1);
        let rows: Vec<i32> = shape.blocks().map(|(_, y)| y).collect();
        assert_eq!(rows, vec![1, 1, 1, 1]);
    }

    #[test]
    fn cell_ids_are_distinct() {
        let mut ids: Vec<u8> = Tetromino::all().iter().map(|t| t.cell().id()).collect();
        ids.push(Cell::Empty.id());
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids, (0..=7).collect::<Vec<u8>>());
    }
}
