use serde::{Deserialize, Serialize};

/// Result of loading or verifying an entity.
///
/// `message` is only non-empty when the runtime reports a failure or a
/// warning. `entity_path` names a contained entity inside a hierarchical
/// container; an empty path means the top-level entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStatus {
    pub loaded: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub entity_path: Vec<String>,
}

impl EntityStatus {
    /// Creates a successful status for the given version.
    pub fn loaded(version: impl Into<String>) -> Self {
        Self {
            loaded: true,
            message: String::new(),
            version: version.into(),
            entity_path: Vec::new(),
        }
    }

    /// Creates a failed status carrying the runtime's message.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            loaded: false,
            message: message.into(),
            version: String::new(),
            entity_path: Vec::new(),
        }
    }

    /// Sets the contained-entity path.
    pub fn with_entity_path(mut self, entity_path: Vec<String>) -> Self {
        self.entity_path = entity_path;
        self
    }

    /// Returns true when the status refers to the top-level entity.
    pub fn is_top_level(&self) -> bool {
        self.entity_path.is_empty()
    }
}
