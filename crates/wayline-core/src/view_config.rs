use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::filter::{DateBucket, FilterConfig};
use crate::group::GroupBy;
use crate::lenient;
use crate::sort::{SortBy, SortOrder};
use crate::store::ViewConfigStore;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Filter,
    List,
    Preset,
}

impl EntityKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Filter => "filter",
            EntityKind::List => "list",
            EntityKind::Preset => "preset",
        }
    }
}

impl FromStr for EntityKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "filter" => Ok(EntityKind::Filter),
            "list" => Ok(EntityKind::List),
            "preset" => Ok(EntityKind::Preset),
            other => Err(anyhow!("entity kind must be filter, list or preset, got: {other}")),
        }
    }
}

/// Identifies the view a configuration belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewKey {
    pub kind: EntityKind,
    pub id: u64,
}

impl ViewKey {
    pub fn new(kind: EntityKind, id: u64) -> Self {
        Self { kind, id }
    }

    pub fn list(id: u64) -> Self {
        Self::new(EntityKind::List, id)
    }

    pub fn filter(id: u64) -> Self {
        Self::new(EntityKind::Filter, id)
    }

    pub fn preset(preset: Preset) -> Self {
        Self::new(EntityKind::Preset, preset.id())
    }
}

impl fmt::Display for ViewKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

impl FromStr for ViewKey {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| anyhow!("expected KIND:ID, got: {s}"))?;
        let id = id
            .trim()
            .parse::<u64>()
            .map_err(|err| anyhow!("invalid view id '{id}': {err}"))?;
        Ok(Self::new(kind.parse()?, id))
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ViewType {
    #[default]
    List,
    Kanban,
    Timeline,
}

/// Grouping and sorting choice for one view. Missing or malformed fields
/// decode to their defaults.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ViewConfiguration {
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub group_by: GroupBy,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub sort_by: SortBy,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub sort_order: SortOrder,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub view_type: ViewType,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub hide_completed: bool,
    #[serde(default, deserialize_with = "lenient::or_default")]
    pub show_detail: bool,
}

impl ViewConfiguration {
    pub fn new(group_by: GroupBy, sort_by: SortBy, sort_order: SortOrder) -> Self {
        Self {
            group_by,
            sort_by,
            sort_order,
            ..Self::default()
        }
    }
}

/// Loads the stored configuration for `key`. Absence and store failures
/// both yield `fallback`; a failing store never blocks rendering.
#[tracing::instrument(skip(store, key, fallback), fields(key = %key))]
pub fn load_or_default<S>(store: &S, key: &ViewKey, fallback: ViewConfiguration) -> ViewConfiguration
where
    S: ViewConfigStore + ?Sized,
{
    match store.load_view_config(key) {
        Ok(Some(config)) => {
            debug!(?config, "loaded view configuration");
            config
        }
        Ok(None) => {
            debug!("no stored view configuration; using default");
            fallback
        }
        Err(err) => {
            warn!(error = %err, "view configuration load failed; using default");
            fallback
        }
    }
}

/// Built-in views. Their filters are fixed; only their view
/// configuration is user-editable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    All,
    Today,
    Tomorrow,
    Week,
    Overdue,
}

impl Preset {
    pub const ALL: [Preset; 5] = [
        Preset::All,
        Preset::Today,
        Preset::Tomorrow,
        Preset::Week,
        Preset::Overdue,
    ];

    #[must_use]
    pub fn id(self) -> u64 {
        match self {
            Preset::All => 0,
            Preset::Today => 1,
            Preset::Tomorrow => 2,
            Preset::Week => 3,
            Preset::Overdue => 4,
        }
    }

    pub fn from_id(id: u64) -> Option<Self> {
        Self::ALL.into_iter().find(|preset| preset.id() == id)
    }

    #[must_use]
    pub fn filter(self) -> FilterConfig {
        match self {
            Preset::All => FilterConfig::default(),
            Preset::Today => FilterConfig::date(DateBucket::Today),
            Preset::Tomorrow => FilterConfig::date(DateBucket::Tomorrow),
            Preset::Week => FilterConfig::date(DateBucket::Week),
            Preset::Overdue => FilterConfig::date(DateBucket::Overdue),
        }
    }
}
