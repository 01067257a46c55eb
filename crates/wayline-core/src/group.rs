use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::task::{ListId, ListRef, Priority, TagId, TagRef, Task};

pub const PENDING_GROUP_ID: &str = "pending";
pub const CLOSED_GROUP_ID: &str = "completed";

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    #[default]
    None,
    Time,
    List,
    Tag,
    Priority,
}

impl GroupBy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            GroupBy::None => "none",
            GroupBy::Time => "time",
            GroupBy::List => "list",
            GroupBy::Tag => "tag",
            GroupBy::Priority => "priority",
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupBy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(GroupBy::None),
            "time" | "date" => Ok(GroupBy::Time),
            "list" => Ok(GroupBy::List),
            "tag" => Ok(GroupBy::Tag),
            "priority" => Ok(GroupBy::Priority),
            other => Err(anyhow!("unknown grouping mode: {other}")),
        }
    }
}

/// A computed bucket of tasks. Never persisted.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TaskGroup {
    pub id: String,
    pub label: String,
    pub tasks: Vec<Task>,
    pub sort_order: i32,
}

impl TaskGroup {
    fn new(id: impl Into<String>, label: impl Into<String>, tasks: Vec<Task>, sort_order: i32) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            tasks,
            sort_order,
        }
    }
}

/// Everything grouping needs besides the tasks themselves.
#[derive(Debug, Clone)]
pub struct GroupContext<'a> {
    pub today: NaiveDate,
    /// Display order for list groups.
    pub lists: &'a [ListRef],
    /// Display order for tag groups.
    pub tags: &'a [TagRef],
}

impl<'a> GroupContext<'a> {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            today,
            lists: &[],
            tags: &[],
        }
    }

    pub fn with_lists(mut self, lists: &'a [ListRef]) -> Self {
        self.lists = lists;
        self
    }

    pub fn with_tags(mut self, tags: &'a [TagRef]) -> Self {
        self.tags = tags;
        self
    }
}

/// Partitions `tasks` into display groups. Every input task lands in
/// exactly one group; order inside a group is the input order.
#[tracing::instrument(skip(tasks, ctx), fields(count = tasks.len()))]
pub fn group(tasks: &[Task], mode: GroupBy, ctx: &GroupContext<'_>) -> Vec<TaskGroup> {
    let groups = match mode {
        GroupBy::None => group_by_status(tasks),
        GroupBy::Time => group_by_time(tasks, ctx.today),
        GroupBy::List => group_by_list(tasks, ctx.lists),
        GroupBy::Tag => group_by_tag(tasks, ctx.tags),
        GroupBy::Priority => group_by_priority(tasks),
    };
    debug!(groups = groups.len(), "tasks grouped");
    groups
}

fn split_closed(tasks: &[Task]) -> (Vec<&Task>, Vec<Task>) {
    let mut open = Vec::new();
    let mut closed = Vec::new();
    for task in tasks {
        if task.is_closed() {
            closed.push(task.clone());
        } else {
            open.push(task);
        }
    }
    (open, closed)
}

fn push_closed(out: &mut Vec<TaskGroup>, closed: Vec<Task>, sort_order: i32) {
    if !closed.is_empty() {
        out.push(TaskGroup::new(
            CLOSED_GROUP_ID,
            "Done & abandoned",
            closed,
            sort_order,
        ));
    }
}

fn group_by_status(tasks: &[Task]) -> Vec<TaskGroup> {
    let (open, closed) = split_closed(tasks);
    let mut out = vec![TaskGroup::new(
        PENDING_GROUP_ID,
        "Pending",
        open.into_iter().cloned().collect(),
        0,
    )];
    push_closed(&mut out, closed, 1);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimeBucket {
    Overdue,
    Today,
    Tomorrow,
    Week,
    Later,
    NoDate,
    Closed,
}

impl TimeBucket {
    const ORDER: [TimeBucket; 7] = [
        TimeBucket::Overdue,
        TimeBucket::Today,
        TimeBucket::Tomorrow,
        TimeBucket::Week,
        TimeBucket::Later,
        TimeBucket::NoDate,
        TimeBucket::Closed,
    ];

    fn id(self) -> &'static str {
        match self {
            TimeBucket::Overdue => "overdue",
            TimeBucket::Today => "today",
            TimeBucket::Tomorrow => "tomorrow",
            TimeBucket::Week => "week",
            TimeBucket::Later => "later",
            TimeBucket::NoDate => "no-date",
            TimeBucket::Closed => CLOSED_GROUP_ID,
        }
    }

    fn label(self) -> &'static str {
        match self {
            TimeBucket::Overdue => "Overdue",
            TimeBucket::Today => "Today",
            TimeBucket::Tomorrow => "Tomorrow",
            TimeBucket::Week => "Next 7 days",
            TimeBucket::Later => "Later",
            TimeBucket::NoDate => "No date",
            TimeBucket::Closed => "Done & abandoned",
        }
    }

    // Closed status wins over any due date.
    fn classify(task: &Task, today: NaiveDate) -> Self {
        if task.is_closed() {
            return TimeBucket::Closed;
        }
        let Some(due) = task.due_date else {
            return TimeBucket::NoDate;
        };

        let tomorrow = today.checked_add_days(Days::new(1));
        let week_end = today.checked_add_days(Days::new(7));
        if due < today {
            TimeBucket::Overdue
        } else if due == today {
            TimeBucket::Today
        } else if Some(due) == tomorrow {
            TimeBucket::Tomorrow
        } else if week_end.is_none_or(|end| due <= end) {
            TimeBucket::Week
        } else {
            TimeBucket::Later
        }
    }
}

fn group_by_time(tasks: &[Task], today: NaiveDate) -> Vec<TaskGroup> {
    let mut buckets: [Vec<Task>; 7] = Default::default();
    for task in tasks {
        buckets[TimeBucket::classify(task, today) as usize].push(task.clone());
    }

    TimeBucket::ORDER
        .iter()
        .zip(buckets)
        .enumerate()
        .filter(|(_, (_, tasks))| !tasks.is_empty())
        .map(|(idx, (bucket, tasks))| {
            TaskGroup::new(bucket.id(), bucket.label(), tasks, idx as i32 + 1)
        })
        .collect()
}

/// Shared shape of list and tag grouping: one group per key in catalog
/// order, then keys missing from the catalog in first-seen order, then
/// the keyless group, then closed tasks.
struct KeyedGrouping<'a> {
    id_prefix: &'static str,
    fallback_label: &'static str,
    keyless_id: &'static str,
    keyless_label: &'static str,
    catalog: Vec<(u64, String)>,
    key_of: &'a dyn Fn(&Task) -> Option<u64>,
}

impl KeyedGrouping<'_> {
    fn apply(&self, tasks: &[Task]) -> Vec<TaskGroup> {
        let (open, closed) = split_closed(tasks);

        let mut by_key: HashMap<u64, Vec<Task>> = HashMap::new();
        let mut first_seen: Vec<u64> = Vec::new();
        let mut keyless = Vec::new();
        for task in open {
            match (self.key_of)(task) {
                Some(key) => {
                    let entry = by_key.entry(key).or_default();
                    if entry.is_empty() {
                        first_seen.push(key);
                    }
                    entry.push(task.clone());
                }
                None => keyless.push(task.clone()),
            }
        }

        let mut out = Vec::new();
        let mut order = 0_i32;
        for (key, label) in &self.catalog {
            if let Some(tasks) = by_key.remove(key) {
                out.push(TaskGroup::new(
                    format!("{}-{key}", self.id_prefix),
                    label.clone(),
                    tasks,
                    order,
                ));
            }
            order += 1;
        }

        for key in first_seen {
            if let Some(tasks) = by_key.remove(&key) {
                debug!(key, prefix = self.id_prefix, "group key missing from catalog");
                out.push(TaskGroup::new(
                    format!("{}-{key}", self.id_prefix),
                    format!("{} {key}", self.fallback_label),
                    tasks,
                    order,
                ));
                order += 1;
            }
        }

        if !keyless.is_empty() {
            out.push(TaskGroup::new(
                self.keyless_id,
                self.keyless_label,
                keyless,
                order,
            ));
        }
        push_closed(&mut out, closed, order + 1);
        out
    }
}

fn group_by_list(tasks: &[Task], lists: &[ListRef]) -> Vec<TaskGroup> {
    let key_of = |task: &Task| -> Option<ListId> { task.list_id };
    KeyedGrouping {
        id_prefix: "list",
        fallback_label: "List",
        keyless_id: "no-list",
        keyless_label: "No list",
        catalog: lists.iter().map(|list| (list.id, list.label())).collect(),
        key_of: &key_of,
    }
    .apply(tasks)
}

// A task with several tags is listed under its first tag only.
// TODO: confirm with product whether multi-tag tasks should appear under
// every tag they carry.
fn group_by_tag(tasks: &[Task], tags: &[TagRef]) -> Vec<TaskGroup> {
    let key_of = |task: &Task| -> Option<TagId> { task.first_tag().map(|tag| tag.id) };
    KeyedGrouping {
        id_prefix: "tag",
        fallback_label: "Tag",
        keyless_id: "no-tag",
        keyless_label: "No tag",
        catalog: tags.iter().map(|tag| (tag.id, tag.name.clone())).collect(),
        key_of: &key_of,
    }
    .apply(tasks)
}

fn priority_label(priority: Priority) -> &'static str {
    match priority.value() {
        3 => "High priority",
        2 => "Medium priority",
        1 => "Low priority",
        _ => "No priority",
    }
}

fn group_by_priority(tasks: &[Task]) -> Vec<TaskGroup> {
    let (open, closed) = split_closed(tasks);

    let mut out = Vec::new();
    for (idx, priority) in Priority::ALL_DESCENDING.iter().enumerate() {
        let members: Vec<Task> = open
            .iter()
            .filter(|task| task.priority == *priority)
            .map(|task| (*task).clone())
            .collect();
        if !members.is_empty() {
            out.push(TaskGroup::new(
                format!("priority-{}", priority.value()),
                priority_label(*priority),
                members,
                idx as i32,
            ));
        }
    }
    push_closed(&mut out, closed, Priority::ALL_DESCENDING.len() as i32);
    out
}
