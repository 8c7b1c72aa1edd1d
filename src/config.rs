use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::scoring::{GarbageTable, GravityCurve, ScoringRules};

/// Tunables shared by every session of a game or match.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GameConfig {
    pub start_level: u32,
    pub scoring: ScoringRules,
    pub gravity: GravityCurve,
    pub garbage: GarbageTable,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            start_level: 1,
            scoring: ScoringRules::default(),
            gravity: GravityCurve::default(),
            garbage: GarbageTable::default(),
        }
    }
}

impl GameConfig {
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        let config: GameConfig =
            serde_json::from_str(text).map_err(|e| CoreError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        self.gravity.validate()
    }

    pub fn drop_interval_ms(&self, level: u32) -> f32 {
        self.gravity.interval_ms(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = GameConfig::from_json(r#"{"startLevel": 3, "gravity": {"minIntervalMs": 50}}"#)
            .unwrap();
        assert_eq!(config.start_level, 3);
        assert_eq!(config.gravity.min_interval_ms, 50.0);
        assert_eq!(config.gravity.base_interval_ms, 1000.0);
        assert_eq!(config.scoring, ScoringRules::default());
    }

    #[test]
    fn empty_object_is_default() {
        assert_eq!(GameConfig::from_json("{}").unwrap(), GameConfig::default());
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(GameConfig::from_json(r#"{"startLevel": "fast"}"#).is_err());
    }

    #[test]
    fn rejects_gravity_that_never_speeds_up() {
        let err = GameConfig::from_json(r#"{"gravity": {"decay": 1.2}}"#).unwrap_err();
        assert!(matches!(err, CoreError::InvalidConfig(_)));
        assert!(GameConfig::from_json(r#"{"gravity": {"baseIntervalMs": 50}}"#).is_err());
    }
}
