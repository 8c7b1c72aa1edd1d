use crate::tetromino::Tetromino;

/// Contract violations. Normal game outcomes (blocked moves, top-outs,
/// disconnects) are state transitions and never show up here.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("unknown tetromino `{0}`")]
    UnknownTetromino(String),
    #[error("rotation {rotation} is not a state of {piece}")]
    RotationOutOfRange { piece: Tetromino, rotation: usize },
    #[error("malformed room: {0}")]
    MalformedRoom(String),
    #[error("unknown action `{0}`")]
    UnknownAction(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
