use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::datetime::{clock_time_serde, compact_date_serde, timestamp_serde};

pub type TaskId = Uuid;
pub type ListId = u64;
pub type TagId = u64;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[serde(alias = "todo")]
    Pending,
    #[serde(alias = "completed")]
    Done,
    Abandoned,
}

impl Status {
    /// Done and abandoned tasks share the closed bucket.
    #[must_use]
    pub fn is_closed(self) -> bool {
        matches!(self, Status::Done | Status::Abandoned)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Done => "done",
            Status::Abandoned => "abandoned",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    #[default]
    Task,
    Note,
}

/// Priority ordinal, 0 (none) through 3 (highest).
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(from = "u8", into = "u8")]
pub struct Priority(u8);

impl Priority {
    pub const NONE: Priority = Priority(0);
    pub const LOW: Priority = Priority(1);
    pub const MEDIUM: Priority = Priority(2);
    pub const HIGH: Priority = Priority(3);

    pub const ALL_DESCENDING: [Priority; 4] =
        [Priority::HIGH, Priority::MEDIUM, Priority::LOW, Priority::NONE];

    /// Out-of-range values are rejected rather than clamped.
    #[must_use]
    pub fn new(value: u8) -> Option<Self> {
        (value <= 3).then_some(Self(value))
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

impl From<u8> for Priority {
    fn from(value: u8) -> Self {
        Priority::new(value).unwrap_or_else(|| {
            tracing::warn!(value, "priority out of range; treating as none");
            Priority::NONE
        })
    }
}

impl From<Priority> for u8 {
    fn from(value: Priority) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TagRef {
    pub id: TagId,
    #[serde(default)]
    pub name: String,
}

impl TagRef {
    pub fn new(id: TagId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListRef {
    pub id: ListId,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

impl ListRef {
    pub fn new(id: ListId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            icon: None,
        }
    }

    #[must_use]
    pub fn label(&self) -> String {
        match self.icon.as_deref() {
            Some(icon) if !icon.is_empty() => format!("{icon} {}", self.name),
            _ => self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub uuid: TaskId,

    pub title: String,

    #[serde(default)]
    pub description: String,

    pub status: Status,

    #[serde(default)]
    pub kind: TaskKind,

    #[serde(default, with = "compact_date_serde::option")]
    pub due_date: Option<NaiveDate>,

    #[serde(default, with = "clock_time_serde::option")]
    pub due_time: Option<NaiveTime>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub list_id: Option<ListId>,

    #[serde(default)]
    pub tags: Vec<TagRef>,

    #[serde(default)]
    pub sort_order: i64,

    #[serde(with = "timestamp_serde")]
    pub created_at: DateTime<Utc>,

    #[serde(default, with = "timestamp_serde::option")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn new_pending(title: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            title: title.into(),
            description: String::new(),
            status: Status::Pending,
            kind: TaskKind::Task,
            due_date: None,
            due_time: None,
            priority: Priority::NONE,
            list_id: None,
            tags: vec![],
            sort_order: 0,
            created_at: now,
            completed_at: None,
        }
    }

    /// Changes status while keeping `completed_at` set exactly when the
    /// task is closed. Closing an already-closed task keeps its original
    /// completion time.
    pub fn set_status(&mut self, status: Status, now: DateTime<Utc>) {
        self.status = status;
        if status.is_closed() {
            if self.completed_at.is_none() {
                self.completed_at = Some(now);
            }
        } else {
            self.completed_at = None;
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.status.is_closed()
    }

    #[must_use]
    pub fn first_tag(&self) -> Option<&TagRef> {
        self.tags.first()
    }

    pub fn has_tag(&self, id: TagId) -> bool {
        self.tags.iter().any(|tag| tag.id == id)
    }
}
