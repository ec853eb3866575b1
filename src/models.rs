use std::fmt;

use serde::{Deserialize, Serialize};

/// Caller-assigned identifier. `1` and `"1"` are distinct values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    Int(i64),
    Text(String),
}

impl Identifier {
    /// Rendering used inside prompts: integers bare, strings JSON-quoted,
    /// so the model can copy the value into its output verbatim.
    pub fn prompt_literal(&self) -> String {
        match self {
            Identifier::Int(value) => value.to_string(),
            Identifier::Text(value) => {
                serde_json::to_string(value).unwrap_or_else(|_| format!("\"{value}\""))
            }
        }
    }

    /// Text key used for storage lookups.
    pub fn storage_key(&self) -> String {
        match self {
            Identifier::Int(value) => value.to_string(),
            Identifier::Text(value) => value.clone(),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Int(value) => write!(f, "{value}"),
            Identifier::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for Identifier {
    fn from(value: i64) -> Self {
        Identifier::Int(value)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Identifier::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scene {
    pub image_id: Identifier,
    pub description: String,
    pub user_note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: String,
    pub age: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryFragment {
    pub image_id: Identifier,
    pub story_text: String,
}
