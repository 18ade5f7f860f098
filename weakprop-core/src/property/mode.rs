//! Property mode flags and their serializable configuration.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Behavior switches for a [`WeakProperty`](super::WeakProperty).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PropertyMode: u8 {
        /// Suppress a set that compares equal to the current value.
        const DISTINCT_UNTIL_CHANGED = 1 << 0;
        /// Deliver the current value to every new subscriber immediately.
        const RAISE_LATEST_ON_SUBSCRIBE = 1 << 1;
    }
}

impl Default for PropertyMode {
    fn default() -> Self {
        Self::DISTINCT_UNTIL_CHANGED | Self::RAISE_LATEST_ON_SUBSCRIBE
    }
}

/// Serializable property settings, e.g. loaded from an application's
/// configuration file. Missing fields take their defaults (both `true`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyConfig {
    pub distinct_until_changed: bool,
    pub raise_latest_on_subscribe: bool,
}

impl PropertyConfig {
    pub fn mode(&self) -> PropertyMode {
        let mut mode = PropertyMode::empty();
        mode.set(PropertyMode::DISTINCT_UNTIL_CHANGED, self.distinct_until_changed);
        mode.set(
            PropertyMode::RAISE_LATEST_ON_SUBSCRIBE,
            self.raise_latest_on_subscribe,
        );
        mode
    }
}

impl Default for PropertyConfig {
    fn default() -> Self {
        PropertyMode::default().into()
    }
}

impl From<PropertyMode> for PropertyConfig {
    fn from(mode: PropertyMode) -> Self {
        Self {
            distinct_until_changed: mode.contains(PropertyMode::DISTINCT_UNTIL_CHANGED),
            raise_latest_on_subscribe: mode.contains(PropertyMode::RAISE_LATEST_ON_SUBSCRIBE),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_mode_sets_both_flags() {
        let mode = PropertyMode::default();
        assert!(mode.contains(PropertyMode::DISTINCT_UNTIL_CHANGED));
        assert!(mode.contains(PropertyMode::RAISE_LATEST_ON_SUBSCRIBE));
        assert_eq!(PropertyConfig::default().mode(), mode);
    }

    #[test]
    fn config_fills_missing_fields_with_defaults() {
        let config: PropertyConfig =
            serde_json::from_str(r#"{ "raise_latest_on_subscribe": false }"#).unwrap();
        assert_eq!(config.mode(), PropertyMode::DISTINCT_UNTIL_CHANGED);

        let config: PropertyConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, PropertyConfig::default());
    }

    #[test]
    fn config_round_trips_mode() {
        let config = PropertyConfig::from(PropertyMode::RAISE_LATEST_ON_SUBSCRIBE);
        let json = serde_json::to_string(&config).unwrap();
        let back: PropertyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.mode(), PropertyMode::RAISE_LATEST_ON_SUBSCRIBE);
    }
}
