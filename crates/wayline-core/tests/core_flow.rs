use chrono::{Days, NaiveDate, Utc};
use tempfile::tempdir;
use wayline_core::compose::ViewComposer;
use wayline_core::datastore::{Catalog, DataStore};
use wayline_core::filter::FilterConfig;
use wayline_core::group::{GroupBy, GroupContext};
use wayline_core::reconcile::{Bucket, DropTarget, Reconciler, Settlement};
use wayline_core::sort::{SortBy, SortOrder};
use wayline_core::store::{StatusFilter, TaskStore};
use wayline_core::task::{ListRef, Priority, Status, TagRef, Task};
use wayline_core::view_config::{ViewConfiguration, ViewKey};

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 7, 1).expect("valid date")
}

fn titles(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|task| task.title.as_str()).collect()
}

#[test]
fn datastore_roundtrip_and_list_view() {
    let temp = tempdir().expect("tempdir");
    let mut store = DataStore::open(temp.path()).expect("open datastore");

    store
        .save_catalog(&Catalog {
            lists: vec![ListRef::new(2, "Work"), ListRef::new(1, "Home")],
            tags: vec![TagRef::new(9, "errands")],
        })
        .expect("save catalog");

    let now = Utc::now();
    for (title, list, priority) in [("laundry", 1, 1), ("report", 2, 3), ("slides", 2, 2)] {
        let mut task = Task::new_pending(title, now);
        task.list_id = Some(list);
        task.priority = Priority::new(priority).expect("valid priority");
        task.due_date = Some(today() + Days::new(1));
        store.add_task(task).expect("add task");
    }

    let tasks = store.fetch_tasks(StatusFilter::All).expect("fetch");
    assert_eq!(titles(&tasks), vec!["laundry", "report", "slides"]);

    let key = ViewKey::filter(1);
    let saved = ViewConfiguration::new(GroupBy::List, SortBy::Title, SortOrder::Ascending);
    let mut composer = ViewComposer::new(&mut store);
    composer.save(&key, &saved).expect("save view");

    let catalog = composer.store().load_catalog().expect("catalog");
    let ctx = GroupContext::new(today())
        .with_lists(&catalog.lists)
        .with_tags(&catalog.tags);
    let view = composer.compose_view(&key, &tasks, &FilterConfig::default(), &ctx);

    assert_eq!(view.config, saved);
    let labels: Vec<&str> = view.groups.iter().map(|group| group.label.as_str()).collect();
    assert_eq!(labels, vec!["Work", "Home"]);
    assert_eq!(titles(&view.groups[0].tasks), vec!["report", "slides"]);
}

#[test]
fn reconciler_drives_the_file_store() {
    let temp = tempdir().expect("tempdir");
    let mut store = DataStore::open(temp.path()).expect("open datastore");
    let now = Utc::now();
    for title in ["A", "B", "C", "D"] {
        store
            .add_task(Task::new_pending(title, now))
            .expect("add task");
    }

    let pending = store.fetch_tasks(StatusFilter::Pending).expect("pending");
    let done = store.fetch_tasks(StatusFilter::Closed).expect("done");
    let mut reconciler = Reconciler::new(pending, done);

    let d = reconciler.pending()[3].uuid;
    let a = reconciler.pending()[0].uuid;
    assert!(reconciler.begin_drag(d));
    let commit = reconciler
        .release(Some(DropTarget::over(Bucket::Pending, a)), now)
        .expect("reorder commit");
    assert_eq!(
        reconciler.commit_with(&mut store, &commit),
        Settlement::Confirmed {
            counts_invalidated: false
        }
    );
    let reloaded = store.load_pending().expect("reload pending");
    assert_eq!(titles(&reloaded), vec!["D", "A", "B", "C"]);

    let b = reloaded[2].uuid;
    assert!(reconciler.begin_drag(b));
    reconciler.drag_over(Bucket::Done, now);
    let commit = reconciler
        .release(Some(DropTarget::bucket(Bucket::Done)), now)
        .expect("status commit");
    assert_eq!(
        reconciler.commit_with(&mut store, &commit),
        Settlement::Confirmed {
            counts_invalidated: true
        }
    );

    let completed = store.load_completed().expect("completed");
    assert_eq!(titles(&completed), vec!["B"]);
    assert_eq!(completed[0].status, Status::Done);
    assert!(completed[0].completed_at.is_some());
    assert_eq!(
        titles(&store.load_pending().expect("pending")),
        vec!["D", "A", "C"]
    );
}

#[test]
fn failed_store_call_rolls_back_local_state() {
    let temp = tempdir().expect("tempdir");
    let mut store = DataStore::open(temp.path()).expect("open datastore");
    let now = Utc::now();
    for title in ["A", "B", "C"] {
        store
            .add_task(Task::new_pending(title, now))
            .expect("add task");
    }
    let pending = store.fetch_tasks(StatusFilter::Pending).expect("pending");
    let before = pending.clone();
    let mut reconciler = Reconciler::new(pending, vec![]);

    let c = before[2].uuid;
    assert!(reconciler.begin_drag(c));
    reconciler.drag_over(Bucket::Done, now);
    let commit = reconciler
        .release(Some(DropTarget::bucket(Bucket::Done)), now)
        .expect("status commit");

    std::fs::remove_dir_all(temp.path()).expect("remove data dir");
    assert_eq!(
        reconciler.commit_with(&mut store, &commit),
        Settlement::RolledBack
    );
    assert_eq!(reconciler.pending(), before.as_slice());
    assert!(reconciler.done().is_empty());
}
