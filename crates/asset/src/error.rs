//! Load failures surfaced to callers. Every variant names the failing key.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AssetError {
    /// Transport failure while retrieving the asset bytes.
    #[error("failed to fetch '{key}': {reason}")]
    Fetch { key: String, reason: String },

    /// Bytes arrived but did not decode into a scene graph.
    #[error("failed to decode '{key}': {reason}")]
    Decode { key: String, reason: String },

    /// The executor driving the load shut down before it settled.
    #[error("load of '{key}' was abandoned before it settled")]
    Aborted { key: String },
}

impl AssetError {
    pub fn fetch(key: &str, reason: impl ToString) -> Self {
        AssetError::Fetch {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn decode(key: &str, reason: impl ToString) -> Self {
        AssetError::Decode {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            AssetError::Fetch { key, .. }
            | AssetError::Decode { key, .. }
            | AssetError::Aborted { key } => key,
        }
    }
}

pub type AssetResult<T> = Result<T, AssetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_names_the_key() {
        let err = AssetError::fetch("models/robot.glb", "connection reset");
        assert_eq!(err.key(), "models/robot.glb");
        let msg = err.to_string();
        assert!(msg.contains("models/robot.glb"));
        assert!(msg.contains("connection reset"));
    }
}
