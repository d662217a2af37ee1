use serde::{Deserialize, Serialize};

use crate::models::{ActivityRecord, Message};

/// The unit of backup and restore.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExportBundle {
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default)]
    pub activities: Vec<ActivityRecord>,
}

impl ExportBundle {
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.activities.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}
