use crate::domain::ids::{EntryId, LaneId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Priority of an entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
            Self::Urgent => write!(f, "URGENT"),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(format!(
                "Invalid priority '{}'. Valid priorities: low, medium, high, urgent",
                s
            )),
        }
    }
}

/// A card positioned inside a lane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,
    pub lane_id: LaneId,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<UserId>,
    pub position: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entry {
    pub fn new(lane_id: LaneId, position: u32, fields: NewEntry, default_priority: Priority) -> Self {
        let now = Utc::now();
        Self {
            id: EntryId::new(),
            lane_id,
            title: fields.title,
            description: fields.description,
            priority: fields.priority.unwrap_or(default_priority),
            due_date: fields.due_date,
            assignee: fields.assignee,
            position,
            created_at: now,
            updated_at: now,
        }
    }

    /// Places the entry at `position` in `lane_id`
    pub fn place(&mut self, lane_id: LaneId, position: u32) {
        if self.lane_id != lane_id || self.position != position {
            self.lane_id = lane_id;
            self.position = position;
            self.updated_at = Utc::now();
        }
    }

    pub fn apply(&mut self, patch: EntryPatch) {
        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(assignee) = patch.assignee {
            self.assignee = assignee;
        }
        self.updated_at = Utc::now();
    }
}

/// Fields supplied when creating an entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewEntry {
    pub title: String,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<DateTime<Utc>>,
    pub assignee: Option<UserId>,
}

impl NewEntry {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }
}

/// Field-level update for an entry. Outer `None` leaves a field untouched,
/// `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EntryPatch {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub priority: Option<Priority>,
    pub due_date: Option<Option<DateTime<Utc>>>,
    pub assignee: Option<Option<UserId>>,
}
