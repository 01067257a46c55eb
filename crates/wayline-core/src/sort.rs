use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::task::Task;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Time,
    Title,
    Tag,
    Priority,
}

impl SortBy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SortBy::Time => "time",
            SortBy::Title => "title",
            SortBy::Tag => "tag",
            SortBy::Priority => "priority",
        }
    }
}

impl fmt::Display for SortBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortBy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "time" | "due" => Ok(SortBy::Time),
            "title" => Ok(SortBy::Title),
            "tag" => Ok(SortBy::Tag),
            "priority" => Ok(SortBy::Priority),
            other => Err(anyhow!("unknown sort key: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SortOrder {
    #[default]
    #[serde(rename = "asc", alias = "ascending")]
    Ascending,
    #[serde(rename = "desc", alias = "descending")]
    Descending,
}

impl SortOrder {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Ascending => "asc",
            SortOrder::Descending => "desc",
        }
    }

    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Ascending),
            "desc" | "descending" => Ok(SortOrder::Descending),
            other => Err(anyhow!("unknown sort order: {other}")),
        }
    }
}

/// Orders values that may be missing. Missing values always sort last,
/// independent of `order`; only present values are direction-sensitive.
fn present_first<T>(
    left: Option<T>,
    right: Option<T>,
    order: SortOrder,
    cmp: impl FnOnce(T, T) -> Ordering,
) -> Ordering {
    match (left, right) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => order.apply(cmp(a, b)),
    }
}

/// Same-date tasks without a time-of-day count as the start of that day,
/// so `(date, time)` stays a total order.
fn compare_due(a: &Task, b: &Task, order: SortOrder) -> Ordering {
    present_first(a.due_date, b.due_date, order, |left, right| {
        left.cmp(&right).then_with(|| a.due_time.cmp(&b.due_time))
    })
}

fn first_tag_name(task: &Task) -> Option<&str> {
    task.first_tag()
        .map(|tag| tag.name.as_str())
        .filter(|name| !name.is_empty())
}

fn compare_tag(a: &Task, b: &Task, order: SortOrder) -> Ordering {
    present_first(first_tag_name(a), first_tag_name(b), order, collate)
}

/// Transliterated, case-folded comparison so that accented and non-Latin
/// titles interleave with plain ASCII ones instead of sorting after `z`.
pub fn collate(a: &str, b: &str) -> Ordering {
    let left = deunicode::deunicode(a).to_lowercase();
    let right = deunicode::deunicode(b).to_lowercase();
    left.cmp(&right).then_with(|| a.cmp(b))
}

/// Higher priority first; `Descending` flips that as a final step.
fn compare_priority(a: &Task, b: &Task, order: SortOrder) -> Ordering {
    order.apply(b.priority.cmp(&a.priority))
}

pub fn compare(a: &Task, b: &Task, by: SortBy, order: SortOrder) -> Ordering {
    match by {
        SortBy::Time => compare_due(a, b, order),
        SortBy::Title => order.apply(collate(&a.title, &b.title)),
        SortBy::Tag => compare_tag(a, b, order),
        SortBy::Priority => compare_priority(a, b, order),
    }
}

/// Stable sort: tasks that compare equal keep their relative order.
pub fn sort(tasks: &[Task], by: SortBy, order: SortOrder) -> Vec<Task> {
    let mut sorted = tasks.to_vec();
    sort_in_place(&mut sorted, by, order);
    sorted
}

pub fn sort_in_place(tasks: &mut [Task], by: SortBy, order: SortOrder) {
    tasks.sort_by(|a, b| compare(a, b, by, order));
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, NaiveTime, Utc};

    use super::{SortBy, SortOrder, sort};
    use crate::task::{Priority, TagRef, Task};

    fn task(title: &str) -> Task {
        Task::new_pending(title, Utc::now())
    }

    fn dated(title: &str, day: u32, time: Option<(u32, u32)>) -> Task {
        let mut task = task(title);
        task.due_date = NaiveDate::from_ymd_opt(2026, 6, day);
        task.due_time = time.and_then(|(h, m)| NaiveTime::from_hms_opt(h, m, 0));
        task
    }

    fn titles(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|task| task.title.as_str()).collect()
    }

    #[test]
    fn undated_last_in_both_directions() {
        let tasks = vec![
            task("undated"),
            dated("d3", 3, None),
            dated("d1-late", 1, Some((18, 0))),
            dated("d1-early", 1, Some((9, 30))),
        ];

        let asc = sort(&tasks, SortBy::Time, SortOrder::Ascending);
        assert_eq!(titles(&asc), vec!["d1-early", "d1-late", "d3", "undated"]);

        let desc = sort(&tasks, SortBy::Time, SortOrder::Descending);
        assert_eq!(titles(&desc), vec!["d3", "d1-late", "d1-early", "undated"]);
    }

    #[test]
    fn same_day_untimed_sorts_as_start_of_day() {
        let tasks = vec![
            dated("timed", 2, Some((8, 0))),
            dated("untimed", 2, None),
        ];
        let asc = sort(&tasks, SortBy::Time, SortOrder::Ascending);
        assert_eq!(titles(&asc), vec!["untimed", "timed"]);
        let desc = sort(&tasks, SortBy::Time, SortOrder::Descending);
        assert_eq!(titles(&desc), vec!["timed", "untimed"]);
    }

    #[test]
    fn many_same_day_tasks_mixing_timed_and_untimed_stay_ordered() {
        let tasks: Vec<Task> = (0..48u32)
            .map(|i| {
                let time = (i % 3 != 0).then_some((23 - i / 3 % 24, 59 - i % 60));
                dated(&format!("t{i}"), 2, time)
            })
            .collect();

        for order in [SortOrder::Ascending, SortOrder::Descending] {
            let sorted = sort(&tasks, SortBy::Time, order);
            assert_eq!(sorted.len(), tasks.len());
            for pair in sorted.windows(2) {
                let left = (pair[0].due_date, pair[0].due_time);
                let right = (pair[1].due_date, pair[1].due_time);
                match order {
                    SortOrder::Ascending => assert!(left <= right, "{left:?} > {right:?}"),
                    SortOrder::Descending => assert!(left >= right, "{left:?} < {right:?}"),
                }
            }
            assert_eq!(sort(&sorted, SortBy::Time, order), sorted);
        }
    }

    #[test]
    fn untagged_last_in_both_directions() {
        let mut alpha = task("alpha");
        alpha.tags = vec![TagRef::new(1, "Alpha")];
        let mut beta = task("beta");
        beta.tags = vec![TagRef::new(2, "beta"), TagRef::new(1, "Alpha")];
        let mut blank = task("blank");
        blank.tags = vec![TagRef::new(3, "")];
        let bare = task("bare");

        let tasks = vec![bare, beta, blank, alpha];
        let asc = sort(&tasks, SortBy::Tag, SortOrder::Ascending);
        assert_eq!(titles(&asc), vec!["alpha", "beta", "bare", "blank"]);
        let desc = sort(&tasks, SortBy::Tag, SortOrder::Descending);
        assert_eq!(titles(&desc), vec!["beta", "alpha", "bare", "blank"]);
    }

    #[test]
    fn priority_defaults_to_highest_first() {
        let mut tasks = Vec::new();
        for (title, value) in [("p1", 1), ("p3", 3), ("p0", 0), ("p2", 2)] {
            let mut task = task(title);
            task.priority = Priority::new(value).expect("valid priority");
            tasks.push(task);
        }
        let asc = sort(&tasks, SortBy::Priority, SortOrder::Ascending);
        assert_eq!(titles(&asc), vec!["p3", "p2", "p1", "p0"]);
        let desc = sort(&tasks, SortBy::Priority, SortOrder::Descending);
        assert_eq!(titles(&desc), vec!["p0", "p1", "p2", "p3"]);
    }

    #[test]
    fn title_collation_folds_case_and_accents() {
        let tasks = vec![task("banana"), task("Éclair"), task("apple"), task("Cherry")];
        let asc = sort(&tasks, SortBy::Title, SortOrder::Ascending);
        assert_eq!(titles(&asc), vec!["apple", "banana", "Cherry", "Éclair"]);
    }

    #[test]
    fn sorting_twice_is_a_no_op() {
        let tasks = vec![
            dated("b", 2, None),
            task("x"),
            dated("a", 2, None),
            dated("c", 1, None),
            task("y"),
        ];
        for order in [SortOrder::Ascending, SortOrder::Descending] {
            let once = sort(&tasks, SortBy::Time, order);
            let twice = sort(&once, SortBy::Time, order);
            assert_eq!(once, twice);
        }
    }
}
