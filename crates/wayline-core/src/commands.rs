use anyhow::{Context, anyhow, bail};
use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::cli::{AddArgs, Command, ListArgs, ViewCommand};
use crate::compose::{ComposedView, ViewComposer, compose, filter_for_view};
use crate::config::Config;
use crate::datastore::DataStore;
use crate::datetime::{local_date, parse_due_date, parse_due_time};
use crate::filter::FilterConfig;
use crate::group::GroupContext;
use crate::reconcile::{Bucket, Commit, DropTarget, Reconciler, Settlement};
use crate::render::Renderer;
use crate::store::{StatusFilter, TaskStore, ViewConfigStore};
use crate::task::{Priority, Task, TaskKind};
use crate::view_config::ViewConfiguration;

#[instrument(skip(store, cfg, renderer, command))]
pub fn dispatch(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &Renderer,
    command: Command,
) -> anyhow::Result<()> {
    let now = Utc::now();
    debug!(?command, "dispatching command");

    match command {
        Command::Add(args) => cmd_add(store, args, now),
        Command::List(args) => cmd_list(store, cfg, renderer, &args, now),
        Command::View { action } => cmd_view(store, cfg, renderer, action),
        Command::Move { uuid, to } => cmd_move(store, uuid, to, now),
        Command::Reorder { uuid, onto } => cmd_reorder(store, uuid, onto, now),
    }
}

#[instrument(skip(store, args, now))]
fn cmd_add(store: &mut DataStore, args: AddArgs, now: DateTime<Utc>) -> anyhow::Result<()> {
    info!("command add");
    let today = local_date(now);

    let mut task = Task::new_pending(args.title.join(" "), now);
    task.due_date = args
        .due
        .as_deref()
        .map(|raw| parse_due_date(raw, today))
        .transpose()
        .context("invalid --due")?;
    task.due_time = args
        .time
        .as_deref()
        .map(parse_due_time)
        .transpose()
        .context("invalid --time")?;
    if task.due_time.is_some() && task.due_date.is_none() {
        bail!("--time requires --due");
    }
    task.priority = args.priority.map_or(Priority::NONE, Priority::from);
    task.list_id = args.list;
    task.description = args.description.unwrap_or_default();
    if args.note {
        task.kind = TaskKind::Note;
    }

    let mut catalog = store.load_catalog()?;
    task.tags = args
        .tags
        .into_iter()
        .map(|mut tag| {
            if tag.name.is_empty()
                && let Some(known) = catalog.tags.iter().find(|known| known.id == tag.id)
            {
                tag.name = known.name.clone();
            }
            tag
        })
        .collect();
    let named: Vec<_> = task
        .tags
        .iter()
        .filter(|tag| !tag.name.is_empty())
        .cloned()
        .collect();
    if catalog.merge_tags(&named) {
        store.save_catalog(&catalog)?;
    }
    if let Some(list_id) = task.list_id
        && catalog.list(list_id).is_none()
    {
        warn!(list_id, "list is not in the catalog; it will group after known lists");
    }

    let task = store.add_task(task)?;
    println!("Created task {}.", task.uuid);
    Ok(())
}

#[instrument(skip(store, cfg, renderer, args, now))]
fn cmd_list(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &Renderer,
    args: &ListArgs,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!(view = %args.view, "command list");
    let today = local_date(now);

    let tasks = store.fetch_tasks(StatusFilter::All)?;
    let catalog = store.load_catalog()?;
    let custom = args.filter_json.as_deref().map(FilterConfig::from_json);
    let filter = filter_for_view(&args.view, custom.as_ref());

    let composer = ViewComposer::new(&mut *store).with_fallback(cfg.default_view());
    let config = args.overrides.apply(composer.activate(&args.view));
    let ctx = GroupContext::new(today)
        .with_lists(&catalog.lists)
        .with_tags(&catalog.tags);

    let view = ComposedView {
        key: args.view,
        config,
        groups: compose(&tasks, &filter, &config, &ctx),
    };

    if args.json {
        let rendered =
            serde_json::to_string_pretty(&view).context("failed to serialize view")?;
        println!("{rendered}");
        return Ok(());
    }
    renderer.print_view(&view, &catalog.lists, today)
}

#[instrument(skip(store, cfg, renderer, action))]
fn cmd_view(
    store: &mut DataStore,
    cfg: &Config,
    renderer: &Renderer,
    action: ViewCommand,
) -> anyhow::Result<()> {
    match action {
        ViewCommand::Get { key } => {
            let (config, stored) = match store.load_view_config(&key) {
                Ok(Some(config)) => (config, true),
                Ok(None) => (cfg.default_view(), false),
                Err(err) => {
                    warn!(error = %err, "view configuration load failed; showing default");
                    (cfg.default_view(), false)
                }
            };
            renderer.print_view_config(&key, &config, stored)
        }
        ViewCommand::Set { key, overrides } => {
            let mut composer = ViewComposer::new(&mut *store).with_fallback(cfg.default_view());
            let config: ViewConfiguration = overrides.apply(composer.activate(&key));
            composer.save(&key, &config)?;
            info!(key = %key, "view configuration updated");
            renderer.print_view_config(&key, &config, true)
        }
    }
}

fn load_reconciler(store: &DataStore) -> anyhow::Result<Reconciler> {
    let pending = store.fetch_tasks(StatusFilter::Pending)?;
    let done = store.fetch_tasks(StatusFilter::Closed)?;
    Ok(Reconciler::new(pending, done))
}

fn finish(
    reconciler: &mut Reconciler,
    store: &mut DataStore,
    released: Option<Commit>,
    uuid: Uuid,
) -> anyhow::Result<()> {
    let Some(commit) = released else {
        println!("Task {uuid} is already there; nothing to do.");
        return Ok(());
    };

    match reconciler.commit_with(store, &commit) {
        Settlement::RolledBack => Err(anyhow!("change to task {uuid} was rolled back")),
        settlement => {
            println!("Task {uuid}: {settlement}.");
            Ok(())
        }
    }
}

#[instrument(skip(store, now))]
fn cmd_move(
    store: &mut DataStore,
    uuid: Uuid,
    to: Bucket,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command move");
    let mut reconciler = load_reconciler(store)?;
    match reconciler.position(uuid) {
        None => bail!("task not found: {uuid}"),
        Some((current, _)) if current == to => {
            println!("Task {uuid} is already {to}; nothing to do.");
            return Ok(());
        }
        Some(_) => {}
    }

    if !reconciler.begin_drag(uuid) {
        bail!("task not found: {uuid}");
    }
    reconciler.drag_over(to, now);
    let released = reconciler.release(Some(DropTarget::bucket(to)), now);
    finish(&mut reconciler, store, released, uuid)
}

#[instrument(skip(store, now))]
fn cmd_reorder(
    store: &mut DataStore,
    uuid: Uuid,
    onto: Uuid,
    now: DateTime<Utc>,
) -> anyhow::Result<()> {
    info!("command reorder");
    let mut reconciler = load_reconciler(store)?;
    let (origin, _) = reconciler
        .position(uuid)
        .ok_or_else(|| anyhow!("task not found: {uuid}"))?;
    let (target, _) = reconciler
        .position(onto)
        .ok_or_else(|| anyhow!("task not found: {onto}"))?;
    if origin != target {
        bail!("{uuid} is {origin} but {onto} is {target}; use `move` to change buckets");
    }

    if !reconciler.begin_drag(uuid) {
        bail!("task not found: {uuid}");
    }
    let released = reconciler.release(Some(DropTarget::over(target, onto)), now);
    finish(&mut reconciler, store, released, uuid)
}
