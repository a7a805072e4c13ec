//! Parameter records for the multi-argument entity operations.

use serde::{Deserialize, Serialize};

/// Arguments to [`Amalgam::load_entity`](crate::Amalgam::load_entity).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoadEntityParams {
    pub handle: String,
    pub path: String,
    pub file_type: String,
    pub persistent: bool,
    pub json_file_params: String,
    pub write_log: String,
    pub print_log: String,
    /// Contained entity to load into; `None` loads the top-level entity.
    pub entity_path: Option<Vec<String>>,
}

impl LoadEntityParams {
    pub fn new(handle: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn file_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = file_type.into();
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn json_file_params(mut self, json_file_params: impl Into<String>) -> Self {
        self.json_file_params = json_file_params.into();
        self
    }

    pub fn write_log(mut self, write_log: impl Into<String>) -> Self {
        self.write_log = write_log.into();
        self
    }

    pub fn print_log(mut self, print_log: impl Into<String>) -> Self {
        self.print_log = print_log.into();
        self
    }

    pub fn entity_path(mut self, entity_path: Vec<String>) -> Self {
        self.entity_path = Some(entity_path);
        self
    }
}

/// Arguments to [`Amalgam::clone_entity`](crate::Amalgam::clone_entity).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CloneEntityParams {
    pub handle: String,
    pub clone_handle: String,
    pub path: String,
    pub file_type: String,
    pub persistent: bool,
    pub json_file_params: String,
    pub write_log: String,
    pub print_log: String,
}

impl CloneEntityParams {
    pub fn new(handle: impl Into<String>, clone_handle: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            clone_handle: clone_handle.into(),
            ..Default::default()
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }
}

/// Arguments to [`Amalgam::store_entity`](crate::Amalgam::store_entity).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreEntityParams {
    pub handle: String,
    pub path: String,
    pub file_type: String,
    pub persistent: bool,
    pub json_file_params: String,
    pub entity_path: Option<Vec<String>>,
}

impl StoreEntityParams {
    pub fn new(handle: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            handle: handle.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn file_type(mut self, file_type: impl Into<String>) -> Self {
        self.file_type = file_type.into();
        self
    }

    pub fn persistent(mut self, persistent: bool) -> Self {
        self.persistent = persistent;
        self
    }

    pub fn entity_path(mut self, entity_path: Vec<String>) -> Self {
        self.entity_path = Some(entity_path);
        self
    }
}
