//! Task record model.
//!
//! A `TodoItem` is what the store persists and what the API exchanges as
//! JSON. Request bodies are decoded leniently: every field is optional,
//! `completed` accepts a bool or the strings `"true"`/`"1"`, and an unknown
//! priority falls back to `medium`.

use serde::{Deserialize, Serialize};

/// Timestamp layout used for `created_at` / `updated_at`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current UTC time in `TIMESTAMP_FORMAT`.
pub fn timestamp_now() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    /// Parse one of `low`, `medium`, `high`. Matching is exact.
    pub fn parse(s: &str) -> Option<Priority> {
        match s {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

/// A single task record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TodoItem {
    /// Store-assigned identifier; 0 until persisted.
    pub id: i64,
    pub title: String,
    pub description: String,
    pub completed: bool,
    pub priority: Priority,
    pub created_at: String,
    pub updated_at: String,
}

impl TodoItem {
    /// Create an unsaved record stamped with the current time.
    #[cfg(test)]
    pub fn new(title: impl Into<String>) -> Self {
        let now = timestamp_now();
        TodoItem {
            id: 0,
            title: title.into(),
            description: String::new(),
            completed: false,
            priority: Priority::Medium,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Decode a candidate record from a JSON request body.
    pub fn from_json(body: &[u8]) -> Result<Self, DecodeError> {
        let payload: TodoPayload = serde_json::from_slice(body).map_err(DecodeError::Json)?;
        Ok(payload.into_item())
    }

    /// A record is valid when it has a title. Priority is valid by
    /// construction.
    pub fn validate(&self) -> Result<(), DecodeError> {
        if self.title.is_empty() {
            return Err(DecodeError::EmptyTitle);
        }
        Ok(())
    }

    /// Refresh the last-modified timestamp.
    pub fn touch(&mut self) {
        self.updated_at = timestamp_now();
    }
}

/// Wire shape accepted from clients.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TodoPayload {
    id: Option<i64>,
    title: Option<String>,
    description: Option<String>,
    completed: Option<Flag>,
    priority: Option<String>,
    created_at: Option<String>,
    updated_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Number(i64),
    Text(String),
}

impl Flag {
    fn is_set(&self) -> bool {
        match self {
            Flag::Bool(b) => *b,
            Flag::Number(n) => *n == 1,
            Flag::Text(s) => s == "true" || s == "1",
        }
    }
}

impl TodoPayload {
    fn into_item(self) -> TodoItem {
        let created_at = self.created_at.unwrap_or_else(timestamp_now);
        let updated_at = self.updated_at.unwrap_or_else(|| created_at.clone());
        TodoItem {
            id: self.id.unwrap_or(0),
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            completed: self.completed.map(|f| f.is_set()).unwrap_or(false),
            priority: self
                .priority
                .as_deref()
                .and_then(Priority::parse)
                .unwrap_or_default(),
            created_at,
            updated_at,
        }
    }
}

/// Why a request body could not become a record.
#[derive(Debug)]
pub enum DecodeError {
    /// Body was not a JSON object of the expected shape.
    Json(serde_json::Error),
    EmptyTitle,
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Json(e) => write!(f, "invalid JSON body: {}", e),
            DecodeError::EmptyTitle => write!(f, "title must not be empty"),
        }
    }
}

impl std::error::Error for DecodeError {}
