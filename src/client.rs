use rand::Rng;
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

use crate::config::GameConfig;
use crate::error::CoreError;
use crate::log;
use crate::protocol::ClientMessage;
use crate::room::{OpponentMirror, OpponentSnapshot};
use crate::session::{Action, GameSession, SessionEvent};

/// Browser handle for a solo game, plus the mirror of a remote opponent when
/// the page is connected to a match server.
#[wasm_bindgen]
pub struct GameClient {
    config: GameConfig,
    session: GameSession,
    mirror: OpponentMirror,
}

#[wasm_bindgen]
impl GameClient {
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue, seed: Option<u32>) -> GameClient {
        let config = from_value::<GameConfig>(config)
            .ok()
            .filter(|c| c.validate().is_ok())
            .unwrap_or_default();
        Self::with_config(config, seed.map(u64::from).unwrap_or_else(random_seed))
    }

    #[wasm_bindgen(js_name = tick)]
    pub fn tick(&mut self, dt_ms: f32) -> Result<JsValue, JsValue> {
        self.step(dt_ms);
        self.snapshot()
    }

    /// Applies a named input such as `"moveLeft"` or `"hard-drop"`.
    #[wasm_bindgen(js_name = action)]
    pub fn action(&mut self, name: &str) -> Result<bool, JsValue> {
        self.apply_named(name)
            .map_err(|e| js_sys::Error::new(&e.to_string()).into())
    }

    #[wasm_bindgen(js_name = snapshot)]
    pub fn snapshot(&self) -> Result<JsValue, JsValue> {
        to_value(&self.session.snapshot()).map_err(|e| e.into())
    }

    #[wasm_bindgen(js_name = newGame)]
    pub fn new_game(&mut self, seed: Option<u32>) {
        self.reset(seed.map(u64::from).unwrap_or_else(random_seed));
    }

    /// Returns false when the snapshot is older than the one already shown.
    #[wasm_bindgen(js_name = pushOpponent)]
    pub fn push_opponent(&mut self, snapshot: JsValue) -> Result<bool, JsValue> {
        let parsed: OpponentSnapshot = from_value(snapshot)?;
        Ok(self.mirror.accept(parsed))
    }

    #[wasm_bindgen(js_name = opponent)]
    pub fn opponent(&self) -> Result<JsValue, JsValue> {
        to_value(&self.mirror.latest()).map_err(|e| e.into())
    }

    #[wasm_bindgen(js_name = clearOpponent)]
    pub fn clear_opponent(&mut self) {
        self.mirror.reset();
    }

    /// JSON for the server's `action` message.
    #[wasm_bindgen(js_name = actionMessage)]
    pub fn action_message(name: &str) -> Result<String, JsValue> {
        encode_action(name).map_err(|e| js_sys::Error::new(&e).into())
    }
}

impl GameClient {
    pub fn with_config(config: GameConfig, seed: u64) -> Self {
        Self {
            session: GameSession::solo(config.clone(), seed),
            config,
            mirror: OpponentMirror::new(),
        }
    }

    pub fn session(&self) -> &GameSession {
        &self.session
    }

    fn step(&mut self, dt_ms: f32) {
        self.session.advance(dt_ms);
        self.report();
    }

    fn apply_named(&mut self, name: &str) -> Result<bool, CoreError> {
        let action: Action = name.parse()?;
        let applied = self.session.apply(action);
        self.report();
        Ok(applied)
    }

    fn reset(&mut self, seed: u64) {
        self.session = GameSession::solo(self.config.clone(), seed);
        self.mirror.reset();
    }

    fn report(&mut self) {
        for event in self.session.drain_events() {
            if let SessionEvent::GameOver { reason } = event {
                log(&format!(
                    "[game] over ({reason:?}) score={} lines={}",
                    self.session.score(),
                    self.session.lines()
                ));
            }
        }
    }
}

fn random_seed() -> u64 {
    rand::thread_rng().gen_range(0..=u64::MAX)
}

fn encode_action(name: &str) -> Result<String, String> {
    let action: Action = name.parse().map_err(|e: CoreError| e.to_string())?;
    serde_json::to_string(&ClientMessage::Action { action }).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;

    #[test]
    fn named_actions_drive_the_session() {
        let mut client = GameClient::with_config(GameConfig::default(), 5);
        assert_eq!(client.apply_named("start"), Ok(true));
        assert_eq!(client.session().state(), SessionState::Running);
        assert_eq!(client.apply_named("pause"), Ok(true));
        assert_eq!(client.session().state(), SessionState::Paused);
        assert_eq!(
            client.apply_named("spin"),
            Err(CoreError::UnknownAction("spin".to_string()))
        );
    }

    #[test]
    fn new_game_replaces_the_session() {
        let mut client = GameClient::with_config(GameConfig::default(), 5);
        client.apply_named("start").unwrap();
        client.apply_named("hardDrop").unwrap();
        assert_eq!(client.session().pieces_placed(), 1);
        client.reset(6);
        assert_eq!(client.session().state(), SessionState::Idle);
        assert_eq!(client.session().pieces_placed(), 0);
    }

    #[test]
    fn stepping_a_running_game_applies_gravity() {
        let mut client = GameClient::with_config(GameConfig::default(), 8);
        client.apply_named("start").unwrap();
        let before = client.session().active().unwrap().position;
        client.step(1000.0);
        let after = client.session().active().unwrap().position;
        assert_eq!(after.y, before.y + 1);
    }

    #[test]
    fn action_messages_are_server_json() {
        assert_eq!(
            encode_action("soft_drop").unwrap(),
            r#"{"type":"action","action":"softDrop"}"#
        );
        assert!(encode_action("hold").is_err());
    }
}
