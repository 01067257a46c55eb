use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::group::GroupBy;
use crate::reconcile::Bucket;
use crate::sort::{SortBy, SortOrder};
use crate::task::TagRef;
use crate::view_config::{Preset, ViewConfiguration, ViewKey};

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

/// `ID:NAME`, or a bare `ID` whose name comes from the catalog.
pub fn parse_tag_ref(s: &str) -> anyhow::Result<TagRef> {
    let (id, name) = s.split_once(':').unwrap_or((s, ""));
    let id = id
        .trim()
        .parse::<u64>()
        .map_err(|err| anyhow!("invalid tag id in '{s}': {err}"))?;
    Ok(TagRef::new(id, name.trim()))
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "wayline",
    version,
    about = "Wayline: grouped task views with drag-style reordering",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count, global = true)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "rc-file")]
    pub rc_file: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Add a pending task at the end of the manual order.
    Add(AddArgs),
    /// Show a view as grouped tables.
    List(ListArgs),
    /// Read or change a view's stored grouping and sorting.
    View {
        #[command(subcommand)]
        action: ViewCommand,
    },
    /// Drag a task into the pending or done bucket.
    Move {
        uuid: Uuid,
        #[arg(long = "to")]
        to: Bucket,
    },
    /// Drag a task onto another task in the same bucket.
    Reorder {
        uuid: Uuid,
        #[arg(long = "onto")]
        onto: Uuid,
    },
}

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    #[arg(required = true, num_args = 1..)]
    pub title: Vec<String>,

    #[arg(long = "due")]
    pub due: Option<String>,

    #[arg(long = "time")]
    pub time: Option<String>,

    #[arg(long = "priority", value_parser = clap::value_parser!(u8).range(0..=3))]
    pub priority: Option<u8>,

    #[arg(long = "list")]
    pub list: Option<u64>,

    #[arg(long = "tag", value_parser = parse_tag_ref, action = ArgAction::Append)]
    pub tags: Vec<TagRef>,

    #[arg(long = "description")]
    pub description: Option<String>,

    /// Store as a note rather than a task.
    #[arg(long = "note")]
    pub note: bool,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ViewOverrides {
    #[arg(long = "group-by")]
    pub group_by: Option<GroupBy>,

    #[arg(long = "sort-by")]
    pub sort_by: Option<SortBy>,

    #[arg(long = "order")]
    pub order: Option<SortOrder>,

    #[arg(long = "hide-completed")]
    pub hide_completed: Option<bool>,
}

impl ViewOverrides {
    /// Layers the flags that were given over `base`.
    #[must_use]
    pub fn apply(&self, mut base: ViewConfiguration) -> ViewConfiguration {
        if let Some(group_by) = self.group_by {
            base.group_by = group_by;
        }
        if let Some(sort_by) = self.sort_by {
            base.sort_by = sort_by;
        }
        if let Some(order) = self.order {
            base.sort_order = order;
        }
        if let Some(hide) = self.hide_completed {
            base.hide_completed = hide;
        }
        base
    }
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    #[arg(long = "view", default_value = "preset:0")]
    pub view: ViewKey,

    #[command(flatten)]
    pub overrides: ViewOverrides,

    /// Filter for `filter:` views, as the JSON filter document.
    #[arg(long = "filter-json")]
    pub filter_json: Option<String>,

    #[arg(long = "json")]
    pub json: bool,
}

impl Default for ListArgs {
    fn default() -> Self {
        Self {
            view: ViewKey::preset(Preset::All),
            overrides: ViewOverrides::default(),
            filter_json: None,
            json: false,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum ViewCommand {
    Get {
        key: ViewKey,
    },
    Set {
        key: ViewKey,
        #[command(flatten)]
        overrides: ViewOverrides,
    },
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Pulls positional `rc.KEY=VALUE` (or `rc.KEY:VALUE`) overrides out of
/// the argument list before clap sees it.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> PreprocessedArgs {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides: Vec<(String, String)> = Vec::new();

    let mut iter = raw.iter().cloned();
    if let Some(bin) = iter.next() {
        cleaned.push(bin);
    }

    for arg in iter {
        let text = arg.to_string_lossy();
        let parsed = text.strip_prefix("rc.").and_then(|rest| {
            rest.split_once('=')
                .or_else(|| rest.split_once(':'))
                .map(|(k, v)| (format!("rc.{k}"), v.to_string()))
        });

        match parsed {
            Some((k, v)) => {
                debug!(key = %k, value = %v, "captured positional rc override");
                overrides.push((k, v));
            }
            None => cleaned.push(arg),
        }
    }

    PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    }
}
