use wasm_bindgen::prelude::*;

pub mod board;
pub mod client;
pub mod config;
pub mod error;
pub mod matchmaking;
pub mod piece;
pub mod protocol;
pub mod room;
pub mod scoring;
pub mod sequence;
pub mod session;
pub mod tetromino;

pub use board::{Board, Point};
pub use client::GameClient;
pub use config::GameConfig;
pub use error::CoreError;
pub use matchmaking::{MatchQueue, PlayerId, RoomFormed};
pub use room::{MatchResult, OpponentMirror, OpponentSnapshot, Room, RoomEvent};
pub use sequence::{PieceSequence, SharedSequence};
pub use session::{Action, GameSession, SessionSnapshot, SessionState};
pub use tetromino::{Cell, Tetromino};

pub const WIDTH: usize = 10;
pub const HEIGHT: usize = 20;

#[wasm_bindgen(start)]
pub fn bootstrap() {
    console_error_panic_hook::set_once();
}

#[cfg(target_arch = "wasm32")]
pub(crate) fn log(msg: &str) {
    web_sys::console::log_1(&JsValue::from_str(msg));
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) fn log(msg: &str) {
    tracing::info!("{msg}");
}
