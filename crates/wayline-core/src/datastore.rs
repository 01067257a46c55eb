use std::collections::BTreeMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow, bail};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::store::{StatusFilter, TaskStore, ViewConfigStore};
use crate::task::{ListRef, Status, TagRef, Task, TaskId};
use crate::view_config::{ViewConfiguration, ViewKey};

/// Display order of lists and tags, used by list and tag grouping.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Catalog {
    #[serde(default)]
    pub lists: Vec<ListRef>,
    #[serde(default)]
    pub tags: Vec<TagRef>,
}

impl Catalog {
    /// Appends tags not yet known; known ids keep their position and name.
    pub fn merge_tags(&mut self, tags: &[TagRef]) -> bool {
        let mut changed = false;
        for tag in tags {
            if !self.tags.iter().any(|known| known.id == tag.id) {
                self.tags.push(tag.clone());
                changed = true;
            }
        }
        changed
    }

    pub fn list(&self, id: u64) -> Option<&ListRef> {
        self.lists.iter().find(|list| list.id == id)
    }
}

#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub pending_path: PathBuf,
    pub completed_path: PathBuf,
    pub views_path: PathBuf,
    pub catalog_path: PathBuf,
}

impl DataStore {
    #[tracing::instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let pending_path = data_dir.join("pending.data");
        let completed_path = data_dir.join("completed.data");
        let views_path = data_dir.join("views.json");
        let catalog_path = data_dir.join("catalog.json");

        for path in [&pending_path, &completed_path] {
            if !path.exists() {
                fs::write(path, "")
                    .with_context(|| format!("failed to create {}", path.display()))?;
            }
        }

        info!(
            data_dir = %data_dir.display(),
            pending = %pending_path.display(),
            completed = %completed_path.display(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            pending_path,
            completed_path,
            views_path,
            catalog_path,
        })
    }

    /// Pending tasks in manual order.
    #[tracing::instrument(skip(self))]
    pub fn load_pending(&self) -> anyhow::Result<Vec<Task>> {
        let mut tasks = load_jsonl(&self.pending_path).context("failed to load pending.data")?;
        tasks.sort_by_key(|task| task.sort_order);
        Ok(tasks)
    }

    /// Done and abandoned tasks in manual order.
    #[tracing::instrument(skip(self))]
    pub fn load_completed(&self) -> anyhow::Result<Vec<Task>> {
        let mut tasks =
            load_jsonl(&self.completed_path).context("failed to load completed.data")?;
        tasks.sort_by_key(|task| task.sort_order);
        Ok(tasks)
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save_pending(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.pending_path, tasks).context("failed to save pending.data")
    }

    #[tracing::instrument(skip(self, tasks))]
    pub fn save_completed(&self, tasks: &[Task]) -> anyhow::Result<()> {
        save_jsonl_atomic(&self.completed_path, tasks).context("failed to save completed.data")
    }

    /// Writes the destination file first: a failure on the second write
    /// leaves the moved task in both files rather than in neither.
    fn save_moved(
        &self,
        pending: &[Task],
        completed: &[Task],
        into_completed: bool,
    ) -> anyhow::Result<()> {
        if into_completed {
            self.save_completed(completed)?;
            self.save_pending(pending)
        } else {
            self.save_pending(pending)?;
            self.save_completed(completed)
        }
    }

    /// Appends `task` to the end of its bucket and returns it as stored.
    #[tracing::instrument(skip(self, task), fields(uuid = %task.uuid))]
    pub fn add_task(&self, mut task: Task) -> anyhow::Result<Task> {
        let closed = task.is_closed();
        let mut bucket = if closed {
            self.load_completed()?
        } else {
            self.load_pending()?
        };
        if bucket.iter().any(|existing| existing.uuid == task.uuid) {
            bail!("task already exists: {}", task.uuid);
        }

        task.sort_order = next_sort_order(&bucket);
        bucket.push(task.clone());
        if closed {
            self.save_completed(&bucket)?;
        } else {
            self.save_pending(&bucket)?;
        }
        info!(sort_order = task.sort_order, "added task");
        Ok(task)
    }

    /// Missing catalog file means an empty catalog.
    #[tracing::instrument(skip(self))]
    pub fn load_catalog(&self) -> anyhow::Result<Catalog> {
        if !self.catalog_path.exists() {
            debug!("no catalog file; using empty catalog");
            return Ok(Catalog::default());
        }
        let raw = fs::read_to_string(&self.catalog_path)
            .with_context(|| format!("failed reading {}", self.catalog_path.display()))?;
        if raw.trim().is_empty() {
            return Ok(Catalog::default());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.catalog_path.display()))
    }

    #[tracing::instrument(skip(self, catalog))]
    pub fn save_catalog(&self, catalog: &Catalog) -> anyhow::Result<()> {
        save_json_atomic(&self.catalog_path, catalog).context("failed to save catalog.json")
    }

    fn load_views(&self) -> anyhow::Result<BTreeMap<String, ViewConfiguration>> {
        if !self.views_path.exists() {
            return Ok(BTreeMap::new());
        }
        let raw = fs::read_to_string(&self.views_path)
            .with_context(|| format!("failed reading {}", self.views_path.display()))?;
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing {}", self.views_path.display()))
    }
}

fn next_sort_order(tasks: &[Task]) -> i64 {
    tasks
        .iter()
        .map(|task| task.sort_order)
        .max()
        .map_or(0, |max| max + 1)
}

fn remove_task(tasks: &mut Vec<Task>, id: TaskId) -> Option<Task> {
    let index = tasks.iter().position(|task| task.uuid == id)?;
    Some(tasks.remove(index))
}

impl TaskStore for DataStore {
    #[tracing::instrument(skip(self))]
    fn fetch_tasks(&self, filter: StatusFilter) -> anyhow::Result<Vec<Task>> {
        let mut tasks = match filter {
            StatusFilter::Pending => self.load_pending()?,
            StatusFilter::Closed => self.load_completed()?,
            StatusFilter::All => {
                let mut tasks = self.load_pending()?;
                tasks.extend(self.load_completed()?);
                tasks
            }
        };
        tasks.retain(|task| filter.admits(task.status));
        debug!(count = tasks.len(), "fetched tasks");
        Ok(tasks)
    }

    /// `ids` must all live in the same file. Tasks in that file not named
    /// by `ids` keep their relative order after the named ones.
    #[tracing::instrument(skip(self, ids), fields(count = ids.len()))]
    fn persist_reorder(&mut self, ids: &[TaskId]) -> anyhow::Result<()> {
        let Some(first) = ids.first() else {
            return Ok(());
        };

        let pending = self.load_pending()?;
        let in_pending = pending.iter().any(|task| task.uuid == *first);
        let mut bucket = if in_pending {
            pending
        } else {
            self.load_completed()?
        };

        let mut ordered = Vec::with_capacity(bucket.len());
        for id in ids {
            let task = remove_task(&mut bucket, *id).ok_or_else(|| {
                anyhow!("task not found in the same bucket as {first}: {id}")
            })?;
            ordered.push(task);
        }
        ordered.append(&mut bucket);
        for (position, task) in ordered.iter_mut().enumerate() {
            task.sort_order = i64::try_from(position).unwrap_or(i64::MAX);
        }

        if in_pending {
            self.save_pending(&ordered)?;
        } else {
            self.save_completed(&ordered)?;
        }
        info!("persisted manual order");
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    fn persist_status_change(&mut self, id: TaskId, status: Status) -> anyhow::Result<()> {
        let mut pending = self.load_pending()?;
        let mut completed = self.load_completed()?;

        let mut task = remove_task(&mut pending, id)
            .or_else(|| remove_task(&mut completed, id))
            .ok_or_else(|| anyhow!("task not found: {id}"))?;
        let from = task.status;
        task.set_status(status, Utc::now());

        let target = if status.is_closed() {
            &mut completed
        } else {
            &mut pending
        };
        if from.is_closed() != status.is_closed() {
            task.sort_order = next_sort_order(target);
        }
        target.push(task);
        target.sort_by_key(|task| task.sort_order);

        self.save_moved(&pending, &completed, status.is_closed())?;
        info!(from = from.as_str(), to = status.as_str(), "persisted status change");
        Ok(())
    }
}

impl ViewConfigStore for DataStore {
    #[tracing::instrument(skip(self, key), fields(key = %key))]
    fn load_view_config(&self, key: &ViewKey) -> anyhow::Result<Option<ViewConfiguration>> {
        Ok(self.load_views()?.get(&key.to_string()).copied())
    }

    #[tracing::instrument(skip(self, key, config), fields(key = %key))]
    fn save_view_config(
        &mut self,
        key: &ViewKey,
        config: &ViewConfiguration,
    ) -> anyhow::Result<()> {
        let mut views = self.load_views().unwrap_or_else(|err| {
            warn!(error = %err, "views.json unreadable; starting a fresh one");
            BTreeMap::new()
        });
        views.insert(key.to_string(), *config);
        save_json_atomic(&self.views_path, &views).context("failed to save views.json")?;
        info!("saved view configuration");
        Ok(())
    }
}

#[tracing::instrument(skip(path))]
fn load_jsonl(path: &Path) -> anyhow::Result<Vec<Task>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let task: Task = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(task);
    }

    debug!(count = out.len(), "loaded tasks from jsonl");
    Ok(out)
}

fn persist_temp(temp: NamedTempFile, path: &Path) -> anyhow::Result<()> {
    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;
    Ok(())
}

#[tracing::instrument(skip(path, tasks))]
fn save_jsonl_atomic(path: &Path, tasks: &[Task]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = tasks.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for task in tasks {
        let serialized = serde_json::to_string(task)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;
    persist_temp(temp, path)
}

#[tracing::instrument(skip(path, value))]
fn save_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> anyhow::Result<()> {
    debug!(file = %path.display(), "saving json atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut temp, value)?;
    writeln!(temp)?;
    temp.flush()?;
    persist_temp(temp, path)
}
