use serde::Serialize;
use tracing::{debug, warn};

use crate::filter::{FilterConfig, evaluate};
use crate::group::{CLOSED_GROUP_ID, GroupContext, TaskGroup, group};
use crate::sort::sort_in_place;
use crate::store::ViewConfigStore;
use crate::task::Task;
use crate::view_config::{EntityKind, Preset, ViewConfiguration, ViewKey, load_or_default};

/// Filter, group, sort. Groups come back ordered by their `sort_order`.
#[tracing::instrument(skip_all, fields(
    tasks = tasks.len(),
    group_by = %config.group_by,
    sort_by = %config.sort_by,
    sort_order = %config.sort_order
))]
pub fn compose(
    tasks: &[Task],
    filter: &FilterConfig,
    config: &ViewConfiguration,
    ctx: &GroupContext<'_>,
) -> Vec<TaskGroup> {
    let filtered = evaluate(tasks, filter, ctx.today);
    let mut groups = group(&filtered, config.group_by, ctx);

    if config.hide_completed {
        groups.retain(|group| group.id != CLOSED_GROUP_ID);
    }

    for group in &mut groups {
        sort_in_place(&mut group.tasks, config.sort_by, config.sort_order);
    }
    groups.sort_by_key(|group| group.sort_order);

    debug!(filtered = filtered.len(), groups = groups.len(), "view composed");
    groups
}

/// Filter implied by a view key. Custom filters are stored elsewhere and
/// passed in; a filter view without one shows everything.
pub fn filter_for_view(key: &ViewKey, custom: Option<&FilterConfig>) -> FilterConfig {
    match key.kind {
        EntityKind::List => FilterConfig {
            list_ids: vec![key.id],
            ..FilterConfig::default()
        },
        EntityKind::Preset => match Preset::from_id(key.id) {
            Some(preset) => preset.filter(),
            None => {
                warn!(key = %key, "unknown preset; showing all tasks");
                FilterConfig::default()
            }
        },
        EntityKind::Filter => custom.cloned().unwrap_or_else(|| {
            warn!(key = %key, "filter view without a filter config; showing all tasks");
            FilterConfig::default()
        }),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComposedView {
    pub key: ViewKey,
    pub config: ViewConfiguration,
    pub groups: Vec<TaskGroup>,
}

impl ComposedView {
    #[must_use]
    pub fn task_count(&self) -> usize {
        self.groups.iter().map(|group| group.tasks.len()).sum()
    }
}

/// Binds the pure pipeline to a view-configuration store.
#[derive(Debug)]
pub struct ViewComposer<S> {
    store: S,
    fallback: ViewConfiguration,
}

impl<S: ViewConfigStore> ViewComposer<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            fallback: ViewConfiguration::default(),
        }
    }

    /// Configuration used when a view has none stored or the store fails.
    pub fn with_fallback(mut self, fallback: ViewConfiguration) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn activate(&self, key: &ViewKey) -> ViewConfiguration {
        load_or_default(&self.store, key, self.fallback)
    }

    pub fn compose_view(
        &self,
        key: &ViewKey,
        tasks: &[Task],
        filter: &FilterConfig,
        ctx: &GroupContext<'_>,
    ) -> ComposedView {
        let config = self.activate(key);
        ComposedView {
            key: *key,
            config,
            groups: compose(tasks, filter, &config, ctx),
        }
    }

    /// Persists `config` for `key`; the first save creates the record.
    #[tracing::instrument(skip(self, key, config), fields(key = %key))]
    pub fn save(&mut self, key: &ViewKey, config: &ViewConfiguration) -> anyhow::Result<()> {
        self.store.save_view_config(key, config)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }
}
