//! Collaborator interfaces the engine consumes. Implementations may be
//! remote and may fail; callers treat every error as recoverable.

use std::collections::BTreeMap;

use anyhow::{anyhow, bail};
use chrono::Utc;
use tracing::debug;

use crate::task::{Status, Task, TaskId};
use crate::view_config::{ViewConfiguration, ViewKey};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatusFilter {
    #[default]
    All,
    Pending,
    /// Done or abandoned.
    Closed,
}

impl StatusFilter {
    #[must_use]
    pub fn admits(self, status: Status) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Pending => !status.is_closed(),
            StatusFilter::Closed => status.is_closed(),
        }
    }
}

pub trait TaskStore {
    fn fetch_tasks(&self, filter: StatusFilter) -> anyhow::Result<Vec<Task>>;

    /// Persists the manual order of one bucket: `ids[i]` gets position `i`.
    fn persist_reorder(&mut self, ids: &[TaskId]) -> anyhow::Result<()>;

    fn persist_status_change(&mut self, id: TaskId, status: Status) -> anyhow::Result<()>;
}

pub trait ViewConfigStore {
    fn load_view_config(&self, key: &ViewKey) -> anyhow::Result<Option<ViewConfiguration>>;

    fn save_view_config(&mut self, key: &ViewKey, config: &ViewConfiguration)
    -> anyhow::Result<()>;
}

impl<S: ViewConfigStore + ?Sized> ViewConfigStore for &mut S {
    fn load_view_config(&self, key: &ViewKey) -> anyhow::Result<Option<ViewConfiguration>> {
        (**self).load_view_config(key)
    }

    fn save_view_config(
        &mut self,
        key: &ViewKey,
        config: &ViewConfiguration,
    ) -> anyhow::Result<()> {
        (**self).save_view_config(key, config)
    }
}

/// In-process store with switchable outages, for embedding and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    tasks: Vec<Task>,
    views: BTreeMap<ViewKey, ViewConfiguration>,
    offline: bool,
}

impl MemoryStore {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks,
            ..Self::default()
        }
    }

    /// While offline every call fails.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    fn ensure_online(&self) -> anyhow::Result<()> {
        if self.offline {
            bail!("task store unavailable");
        }
        Ok(())
    }
}

impl TaskStore for MemoryStore {
    fn fetch_tasks(&self, filter: StatusFilter) -> anyhow::Result<Vec<Task>> {
        self.ensure_online()?;
        let mut out: Vec<Task> = self
            .tasks
            .iter()
            .filter(|task| filter.admits(task.status))
            .cloned()
            .collect();
        out.sort_by_key(|task| task.sort_order);
        Ok(out)
    }

    fn persist_reorder(&mut self, ids: &[TaskId]) -> anyhow::Result<()> {
        self.ensure_online()?;
        for id in ids {
            if !self.tasks.iter().any(|task| task.uuid == *id) {
                bail!("task not found: {id}");
            }
        }
        for (position, id) in ids.iter().enumerate() {
            if let Some(task) = self.tasks.iter_mut().find(|task| task.uuid == *id) {
                task.sort_order = i64::try_from(position).unwrap_or(i64::MAX);
            }
        }
        debug!(count = ids.len(), "memory store reordered");
        Ok(())
    }

    fn persist_status_change(&mut self, id: TaskId, status: Status) -> anyhow::Result<()> {
        self.ensure_online()?;
        let task = self
            .tasks
            .iter_mut()
            .find(|task| task.uuid == id)
            .ok_or_else(|| anyhow!("task not found: {id}"))?;
        task.set_status(status, Utc::now());
        Ok(())
    }
}

impl ViewConfigStore for MemoryStore {
    fn load_view_config(&self, key: &ViewKey) -> anyhow::Result<Option<ViewConfiguration>> {
        self.ensure_online()?;
        Ok(self.views.get(key).copied())
    }

    fn save_view_config(
        &mut self,
        key: &ViewKey,
        config: &ViewConfiguration,
    ) -> anyhow::Result<()> {
        self.ensure_online()?;
        self.views.insert(*key, *config);
        Ok(())
    }
}
