//! Drag-driven optimistic mutation of the pending/done buckets.
//!
//! The reconciler applies gestures to its local copy immediately and hands
//! back a [`Commit`] describing the remote call to make. The caller reports
//! the outcome through [`Reconciler::settle`]; a failure restores both
//! buckets from the snapshot taken when the gesture started.

use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::store::TaskStore;
use crate::task::{Status, Task, TaskId};

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Pending,
    Done,
}

impl Bucket {
    /// Closed tasks (done or abandoned) live in the done bucket.
    #[must_use]
    pub fn of(status: Status) -> Self {
        if status.is_closed() {
            Bucket::Done
        } else {
            Bucket::Pending
        }
    }

    /// Status a task takes on when dropped into this bucket.
    #[must_use]
    pub fn status(self) -> Status {
        match self {
            Bucket::Pending => Status::Pending,
            Bucket::Done => Status::Done,
        }
    }

    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Bucket::Pending => Bucket::Done,
            Bucket::Done => Bucket::Pending,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Pending => "pending",
            Bucket::Done => "done",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" | "todo" => Ok(Bucket::Pending),
            "done" | "completed" => Ok(Bucket::Done),
            other => Err(anyhow!("bucket must be pending or done, got: {other}")),
        }
    }
}

/// Where a gesture was released: a bucket, and optionally the task the
/// pointer was over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DropTarget {
    pub bucket: Bucket,
    pub over: Option<TaskId>,
}

impl DropTarget {
    pub fn bucket(bucket: Bucket) -> Self {
        Self { bucket, over: None }
    }

    pub fn over(bucket: Bucket, task: TaskId) -> Self {
        Self {
            bucket,
            over: Some(task),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CommitOp {
    /// Full id sequence of `bucket` after the move.
    Reorder { bucket: Bucket, ids: Vec<TaskId> },
    StatusChange { task: TaskId, status: Status },
}

impl CommitOp {
    /// Status changes move tasks between buckets, so any per-bucket counts
    /// shown elsewhere are stale once one lands.
    #[must_use]
    pub fn invalidates_counts(&self) -> bool {
        matches!(self, CommitOp::StatusChange { .. })
    }
}

/// A remote call the caller must dispatch, then report with `settle`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Commit {
    pub ticket: u64,
    pub op: CommitOp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DragState {
    Idle,
    Dragging { task: TaskId, origin: Bucket },
    Settling { task: TaskId, ticket: u64, op: CommitOp },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Settlement {
    Confirmed { counts_invalidated: bool },
    RolledBack,
    /// The outcome belonged to a commit a refresh already discarded.
    Stale,
}

impl fmt::Display for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Settlement::Confirmed { counts_invalidated } => {
                write!(f, "confirmed (counts invalidated: {counts_invalidated})")
            }
            Settlement::RolledBack => f.write_str("rolled back"),
            Settlement::Stale => f.write_str("stale"),
        }
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    pending: Vec<Task>,
    done: Vec<Task>,
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    pending: Vec<Task>,
    done: Vec<Task>,
    state: DragState,
    snapshot: Option<Snapshot>,
    next_ticket: u64,
}

impl Reconciler {
    pub fn new(pending: Vec<Task>, done: Vec<Task>) -> Self {
        Self {
            pending,
            done,
            state: DragState::Idle,
            snapshot: None,
            next_ticket: 1,
        }
    }

    /// Splits one task list by status, keeping relative order.
    pub fn from_tasks(tasks: Vec<Task>) -> Self {
        let (done, pending) = tasks.into_iter().partition(|task| task.is_closed());
        Self::new(pending, done)
    }

    pub fn pending(&self) -> &[Task] {
        &self.pending
    }

    pub fn done(&self) -> &[Task] {
        &self.done
    }

    pub fn bucket(&self, bucket: Bucket) -> &[Task] {
        match bucket {
            Bucket::Pending => &self.pending,
            Bucket::Done => &self.done,
        }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == DragState::Idle
    }

    /// Bucket and index currently holding `id`.
    pub fn position(&self, id: TaskId) -> Option<(Bucket, usize)> {
        [Bucket::Pending, Bucket::Done]
            .into_iter()
            .find_map(|bucket| {
                self.bucket(bucket)
                    .iter()
                    .position(|task| task.uuid == id)
                    .map(|index| (bucket, index))
            })
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<Task> {
        match bucket {
            Bucket::Pending => &mut self.pending,
            Bucket::Done => &mut self.done,
        }
    }

    fn restore_snapshot(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            self.pending = snapshot.pending;
            self.done = snapshot.done;
        }
    }

    fn issue(&mut self, task: TaskId, op: CommitOp) -> Commit {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.state = DragState::Settling {
            task,
            ticket,
            op: op.clone(),
        };
        Commit { ticket, op }
    }

    /// Starts a gesture. Rejected while another gesture is dragging or
    /// settling, or when the task is in neither bucket.
    #[tracing::instrument(skip(self))]
    pub fn begin_drag(&mut self, id: TaskId) -> bool {
        if !self.is_idle() {
            debug!(state = ?self.state, "drag rejected; another gesture is active");
            return false;
        }
        let Some((origin, index)) = self.position(id) else {
            debug!("drag rejected; task not loaded");
            return false;
        };

        self.snapshot = Some(Snapshot {
            pending: self.pending.clone(),
            done: self.done.clone(),
        });
        self.state = DragState::Dragging { task: id, origin };
        debug!(%origin, index, "drag started");
        true
    }

    /// Pointer moved over `bucket`. A foreign bucket receives the task at
    /// its end with the matching status; returning to the origin puts
    /// everything back exactly as it was when the gesture began.
    pub fn drag_over(&mut self, bucket: Bucket, now: DateTime<Utc>) {
        let DragState::Dragging { task, origin } = self.state else {
            return;
        };
        let Some((current, index)) = self.position(task) else {
            return;
        };
        if current == bucket {
            return;
        }

        if bucket == origin {
            if let Some(snapshot) = &self.snapshot {
                self.pending = snapshot.pending.clone();
                self.done = snapshot.done.clone();
            }
            debug!(%bucket, "drag returned to origin");
            return;
        }

        let mut moved = self.bucket_mut(current).remove(index);
        moved.set_status(bucket.status(), now);
        self.bucket_mut(bucket).push(moved);
        debug!(from = %current, to = %bucket, "drag crossed buckets");
    }

    /// Ends the gesture. `None` means the pointer left every drop region.
    ///
    /// Returns the commit to dispatch, or `None` when nothing changed.
    #[tracing::instrument(skip(self, now))]
    pub fn release(&mut self, target: Option<DropTarget>, now: DateTime<Utc>) -> Option<Commit> {
        let DragState::Dragging { task, origin } = self.state else {
            return None;
        };
        let Some(target) = target else {
            self.cancel();
            return None;
        };

        self.drag_over(target.bucket, now);

        if target.bucket != origin {
            let commit = self.issue(
                task,
                CommitOp::StatusChange {
                    task,
                    status: target.bucket.status(),
                },
            );
            debug!(ticket = commit.ticket, "status change issued");
            return Some(commit);
        }

        let list = self.bucket(origin);
        let Some(from) = list.iter().position(|candidate| candidate.uuid == task) else {
            self.cancel();
            return None;
        };
        let to = target
            .over
            .and_then(|over| list.iter().position(|candidate| candidate.uuid == over))
            .unwrap_or(list.len().saturating_sub(1));

        if from == to {
            self.snapshot = None;
            self.state = DragState::Idle;
            debug!("released in place; nothing to commit");
            return None;
        }

        let list = self.bucket_mut(origin);
        let moved = list.remove(from);
        list.insert(to, moved);
        let ids = list.iter().map(|candidate| candidate.uuid).collect();

        let commit = self.issue(
            task,
            CommitOp::Reorder {
                bucket: origin,
                ids,
            },
        );
        debug!(ticket = commit.ticket, from, to, "reorder issued");
        Some(commit)
    }

    /// Aborts a drag in progress. Settling commits cannot be cancelled.
    pub fn cancel(&mut self) -> bool {
        if !matches!(self.state, DragState::Dragging { .. }) {
            return false;
        }
        self.restore_snapshot();
        self.state = DragState::Idle;
        debug!("drag cancelled");
        true
    }

    /// Reports the outcome of the remote call for `ticket`.
    #[tracing::instrument(skip(self, result))]
    pub fn settle(&mut self, ticket: u64, result: anyhow::Result<()>) -> Settlement {
        let DragState::Settling {
            task,
            ticket: expected,
            ref op,
        } = self.state
        else {
            debug!("no commit in flight; outcome ignored");
            return Settlement::Stale;
        };
        if expected != ticket {
            debug!(expected, "outcome for a discarded commit ignored");
            return Settlement::Stale;
        }

        let counts_invalidated = op.invalidates_counts();
        let reordered = match op {
            CommitOp::Reorder { bucket, .. } => Some(*bucket),
            CommitOp::StatusChange { .. } => None,
        };

        match result {
            Ok(()) => {
                if let Some(bucket) = reordered {
                    for (position, entry) in self.bucket_mut(bucket).iter_mut().enumerate() {
                        entry.sort_order = i64::try_from(position).unwrap_or(i64::MAX);
                    }
                }
                self.snapshot = None;
                self.state = DragState::Idle;
                debug!(%task, "commit confirmed");
                Settlement::Confirmed { counts_invalidated }
            }
            Err(err) => {
                self.restore_snapshot();
                self.state = DragState::Idle;
                warn!(%task, error = %format!("{err:#}"), "commit failed; local change rolled back");
                Settlement::RolledBack
            }
        }
    }

    /// Replaces both buckets with the store's answer. Any drag or in-flight
    /// commit is discarded; its later outcome settles as stale.
    pub fn refresh(&mut self, pending: Vec<Task>, done: Vec<Task>) {
        if !self.is_idle() {
            info!(state = ?self.state, "refresh discarded the active gesture");
        }
        self.pending = pending;
        self.done = done;
        self.snapshot = None;
        self.state = DragState::Idle;
    }

    /// Dispatches `commit` to `store` and settles with its result.
    pub fn commit_with<S>(&mut self, store: &mut S, commit: &Commit) -> Settlement
    where
        S: TaskStore + ?Sized,
    {
        let result = match &commit.op {
            CommitOp::Reorder { ids, .. } => store.persist_reorder(ids),
            CommitOp::StatusChange { task, status } => store.persist_status_change(*task, *status),
        };
        self.settle(commit.ticket, result)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::anyhow;
    use chrono::Utc;

    use super::{Bucket, CommitOp, DragState, DropTarget, Reconciler, Settlement};
    use crate::store::{MemoryStore, StatusFilter, TaskStore};
    use crate::task::{Status, Task, TaskId};

    fn pending(titles: &[&str]) -> Vec<Task> {
        titles
            .iter()
            .enumerate()
            .map(|(index, title)| {
                let mut task = Task::new_pending(*title, Utc::now());
                task.sort_order = index as i64;
                task
            })
            .collect()
    }

    fn done(titles: &[&str]) -> Vec<Task> {
        pending(titles)
            .into_iter()
            .map(|mut task| {
                task.set_status(Status::Done, Utc::now());
                task
            })
            .collect()
    }

    fn titles(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|task| task.title.as_str()).collect()
    }

    fn id_of(reconciler: &Reconciler, title: &str) -> TaskId {
        reconciler
            .pending()
            .iter()
            .chain(reconciler.done())
            .find(|task| task.title == title)
            .map(|task| task.uuid)
            .expect("task present")
    }

    #[test]
    fn failed_status_change_restores_both_buckets() {
        let mut reconciler = Reconciler::new(pending(&["A", "B", "D", "E"]), done(&["X"]));
        let before_pending = reconciler.pending().to_vec();
        let before_done = reconciler.done().to_vec();
        let d = id_of(&reconciler, "D");

        assert!(reconciler.begin_drag(d));
        reconciler.drag_over(Bucket::Done, Utc::now());
        assert_eq!(titles(reconciler.done()), vec!["X", "D"]);
        assert_eq!(reconciler.done()[1].status, Status::Done);

        let commit = reconciler
            .release(Some(DropTarget::bucket(Bucket::Done)), Utc::now())
            .expect("commit issued");
        assert_eq!(
            commit.op,
            CommitOp::StatusChange {
                task: d,
                status: Status::Done
            }
        );

        let outcome = reconciler.settle(commit.ticket, Err(anyhow!("offline")));
        assert_eq!(outcome, Settlement::RolledBack);
        assert_eq!(reconciler.pending(), before_pending.as_slice());
        assert_eq!(reconciler.done(), before_done.as_slice());
        assert_eq!(reconciler.position(d), Some((Bucket::Pending, 2)));
        assert!(reconciler.is_idle());
    }

    #[test]
    fn confirmed_status_change_invalidates_counts() {
        let mut reconciler = Reconciler::new(pending(&["A"]), done(&["X"]));
        let x = id_of(&reconciler, "X");

        assert!(reconciler.begin_drag(x));
        let commit = reconciler
            .release(Some(DropTarget::bucket(Bucket::Pending)), Utc::now())
            .expect("commit issued");
        assert_eq!(
            reconciler.settle(commit.ticket, Ok(())),
            Settlement::Confirmed {
                counts_invalidated: true
            }
        );
        assert_eq!(titles(reconciler.pending()), vec!["A", "X"]);
        assert!(reconciler.pending()[1].completed_at.is_none());
        assert!(reconciler.done().is_empty());
    }

    #[test]
    fn reorder_moves_within_one_bucket_only() {
        let mut reconciler = Reconciler::new(pending(&["A", "B", "C", "D"]), done(&["X", "Y"]));
        let before_done = reconciler.done().to_vec();
        let a = id_of(&reconciler, "A");
        let c = id_of(&reconciler, "C");

        assert!(reconciler.begin_drag(a));
        let commit = reconciler
            .release(Some(DropTarget::over(Bucket::Pending, c)), Utc::now())
            .expect("commit issued");

        assert_eq!(titles(reconciler.pending()), vec!["B", "C", "A", "D"]);
        assert_eq!(reconciler.done(), before_done.as_slice());
        match &commit.op {
            CommitOp::Reorder { bucket, ids } => {
                assert_eq!(*bucket, Bucket::Pending);
                let order: Vec<TaskId> = reconciler.pending().iter().map(|t| t.uuid).collect();
                assert_eq!(ids, &order);
            }
            other => panic!("unexpected op: {other:?}"),
        }

        assert_eq!(
            reconciler.settle(commit.ticket, Ok(())),
            Settlement::Confirmed {
                counts_invalidated: false
            }
        );
        let sort_orders: Vec<i64> = reconciler.pending().iter().map(|t| t.sort_order).collect();
        assert_eq!(sort_orders, vec![0, 1, 2, 3]);
    }

    #[test]
    fn moving_down_onto_last_and_up_onto_first() {
        let mut reconciler = Reconciler::new(pending(&["A", "B", "C"]), vec![]);
        let b = id_of(&reconciler, "B");
        let a = id_of(&reconciler, "A");

        assert!(reconciler.begin_drag(b));
        let commit = reconciler
            .release(Some(DropTarget::bucket(Bucket::Pending)), Utc::now())
            .expect("moved to end");
        reconciler.settle(commit.ticket, Ok(()));
        assert_eq!(titles(reconciler.pending()), vec!["A", "C", "B"]);

        assert!(reconciler.begin_drag(b));
        let commit = reconciler
            .release(Some(DropTarget::over(Bucket::Pending, a)), Utc::now())
            .expect("moved to front");
        reconciler.settle(commit.ticket, Ok(()));
        assert_eq!(titles(reconciler.pending()), vec!["B", "A", "C"]);
    }

    #[test]
    fn release_in_place_commits_nothing() {
        let mut reconciler = Reconciler::new(pending(&["A", "B"]), vec![]);
        let a = id_of(&reconciler, "A");

        assert!(reconciler.begin_drag(a));
        assert!(
            reconciler
                .release(Some(DropTarget::over(Bucket::Pending, a)), Utc::now())
                .is_none()
        );
        assert!(reconciler.is_idle());
        assert_eq!(titles(reconciler.pending()), vec!["A", "B"]);
    }

    #[test]
    fn hovering_back_to_origin_restores_exactly() {
        let mut reconciler = Reconciler::new(pending(&["A", "B", "C"]), done(&["X"]));
        let before_pending = reconciler.pending().to_vec();
        let before_done = reconciler.done().to_vec();
        let b = id_of(&reconciler, "B");

        assert!(reconciler.begin_drag(b));
        for _ in 0..3 {
            reconciler.drag_over(Bucket::Done, Utc::now());
            reconciler.drag_over(Bucket::Done, Utc::now());
            reconciler.drag_over(Bucket::Pending, Utc::now());
        }
        assert_eq!(reconciler.pending(), before_pending.as_slice());
        assert_eq!(reconciler.done(), before_done.as_slice());
        assert_eq!(
            reconciler.state(),
            &DragState::Dragging {
                task: b,
                origin: Bucket::Pending
            }
        );
    }

    #[test]
    fn second_gesture_is_rejected_until_settled() {
        let mut reconciler = Reconciler::new(pending(&["A", "B"]), vec![]);
        let a = id_of(&reconciler, "A");
        let b = id_of(&reconciler, "B");

        assert!(reconciler.begin_drag(a));
        assert!(!reconciler.begin_drag(b));

        let commit = reconciler
            .release(Some(DropTarget::bucket(Bucket::Pending)), Utc::now())
            .expect("commit issued");
        assert!(!reconciler.begin_drag(b));

        reconciler.settle(commit.ticket, Ok(()));
        assert!(reconciler.begin_drag(b));
    }

    #[test]
    fn unknown_task_cannot_be_dragged() {
        let mut reconciler = Reconciler::new(pending(&["A"]), vec![]);
        assert!(!reconciler.begin_drag(uuid::Uuid::new_v4()));
        assert!(reconciler.is_idle());
    }

    #[test]
    fn cancel_and_empty_release_undo_the_gesture() {
        let mut reconciler = Reconciler::new(pending(&["A", "B"]), done(&["X"]));
        let before_pending = reconciler.pending().to_vec();
        let a = id_of(&reconciler, "A");

        assert!(reconciler.begin_drag(a));
        reconciler.drag_over(Bucket::Done, Utc::now());
        assert!(reconciler.cancel());
        assert_eq!(reconciler.pending(), before_pending.as_slice());
        assert!(reconciler.is_idle());

        assert!(reconciler.begin_drag(a));
        reconciler.drag_over(Bucket::Done, Utc::now());
        assert!(reconciler.release(None, Utc::now()).is_none());
        assert_eq!(reconciler.pending(), before_pending.as_slice());
        assert!(reconciler.is_idle());
    }

    #[test]
    fn refresh_while_settling_makes_outcome_stale() {
        let mut reconciler = Reconciler::new(pending(&["A", "B"]), vec![]);
        let a = id_of(&reconciler, "A");

        assert!(reconciler.begin_drag(a));
        reconciler.drag_over(Bucket::Done, Utc::now());
        let commit = reconciler
            .release(Some(DropTarget::bucket(Bucket::Done)), Utc::now())
            .expect("commit issued");

        let server = pending(&["A", "B", "C"]);
        reconciler.refresh(server.clone(), vec![]);
        assert!(reconciler.is_idle());

        assert_eq!(
            reconciler.settle(commit.ticket, Err(anyhow!("late failure"))),
            Settlement::Stale
        );
        assert_eq!(reconciler.pending(), server.as_slice());
    }

    #[test]
    fn commit_with_store_persists_or_rolls_back() {
        let mut tasks = pending(&["A", "B", "C"]);
        tasks.extend(done(&["X"]));
        let mut store = MemoryStore::new(tasks.clone());
        let mut reconciler = Reconciler::from_tasks(tasks);
        let c = id_of(&reconciler, "C");

        assert!(reconciler.begin_drag(c));
        let commit = reconciler
            .release(Some(DropTarget::bucket(Bucket::Done)), Utc::now())
            .expect("commit issued");
        assert!(matches!(
            reconciler.commit_with(&mut store, &commit),
            Settlement::Confirmed { .. }
        ));
        let closed = store
            .fetch_tasks(StatusFilter::Closed)
            .expect("fetch closed");
        assert!(closed.iter().any(|task| task.uuid == c));

        store.set_offline(true);
        let before = reconciler.pending().to_vec();
        let a = id_of(&reconciler, "A");
        assert!(reconciler.begin_drag(a));
        let commit = reconciler
            .release(Some(DropTarget::bucket(Bucket::Pending)), Utc::now())
            .expect("commit issued");
        assert_eq!(
            reconciler.commit_with(&mut store, &commit),
            Settlement::RolledBack
        );
        assert_eq!(reconciler.pending(), before.as_slice());
    }
}
