use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::datetime::compact_date_serde;
use crate::lenient;
use crate::task::{ListId, Priority, Status, TagId, Task, TaskKind};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DateBucket {
    #[default]
    All,
    None,
    Overdue,
    Today,
    Tomorrow,
    Week,
    NoDate,
    Custom,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum KindFilter {
    #[default]
    All,
    Task,
    Note,
}

/// Inclusive calendar range used by [`DateBucket::Custom`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    #[serde(default, with = "compact_date_serde::option")]
    pub start: Option<NaiveDate>,
    #[serde(default, with = "compact_date_serde::option")]
    pub end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FilterConfig {
    #[serde(
        default,
        deserialize_with = "lenient::id_set",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub list_ids: Vec<ListId>,

    #[serde(
        default,
        deserialize_with = "lenient::id_set",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tag_ids: Vec<TagId>,

    #[serde(default, deserialize_with = "lenient::or_default")]
    pub date_type: DateBucket,

    #[serde(
        default,
        deserialize_with = "lenient::or_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_range: Option<DateRange>,

    #[serde(
        default,
        deserialize_with = "lenient::priority_set",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub priorities: Vec<Priority>,

    #[serde(
        default,
        deserialize_with = "lenient::or_default",
        skip_serializing_if = "Option::is_none"
    )]
    pub content_keyword: Option<String>,

    #[serde(default, deserialize_with = "lenient::or_default")]
    pub task_type: KindFilter,
}

impl FilterConfig {
    /// Decodes a stored filter. A document that is not even an object
    /// yields the unconstrained filter.
    pub fn from_json(raw: &str) -> Self {
        match serde_json::from_str::<FilterConfig>(raw) {
            Ok(filter) => filter,
            Err(err) => {
                warn!(error = %err, "unreadable filter config; showing all tasks");
                FilterConfig::default()
            }
        }
    }

    pub fn date(bucket: DateBucket) -> Self {
        Self {
            date_type: bucket,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_unconstrained(&self) -> bool {
        self.list_ids.is_empty()
            && self.tag_ids.is_empty()
            && matches!(self.date_type, DateBucket::All | DateBucket::None)
            && self.priorities.is_empty()
            && self.keyword().is_none()
            && self.task_type == KindFilter::All
    }

    fn keyword(&self) -> Option<String> {
        self.content_keyword
            .as_deref()
            .map(str::trim)
            .filter(|keyword| !keyword.is_empty())
            .map(str::to_lowercase)
    }

    pub fn matches(&self, task: &Task, today: NaiveDate) -> bool {
        self.matches_with_keyword(task, today, self.keyword().as_deref())
    }

    fn matches_with_keyword(&self, task: &Task, today: NaiveDate, keyword: Option<&str>) -> bool {
        if !self.list_ids.is_empty()
            && !task
                .list_id
                .is_some_and(|list| self.list_ids.contains(&list))
        {
            return false;
        }

        if !self.tag_ids.is_empty() && !self.tag_ids.iter().any(|id| task.has_tag(*id)) {
            return false;
        }

        if !self.matches_date(task, today) {
            return false;
        }

        if !self.priorities.is_empty() && !self.priorities.contains(&task.priority) {
            return false;
        }

        if let Some(keyword) = keyword {
            let in_title = task.title.to_lowercase().contains(keyword);
            let in_description = task.description.to_lowercase().contains(keyword);
            if !in_title && !in_description {
                return false;
            }
        }

        match self.task_type {
            KindFilter::All => true,
            KindFilter::Task => task.kind == TaskKind::Task,
            KindFilter::Note => task.kind == TaskKind::Note,
        }
    }

    fn matches_date(&self, task: &Task, today: NaiveDate) -> bool {
        let tomorrow = today.checked_add_days(Days::new(1));
        let week_end = today.checked_add_days(Days::new(7));

        match self.date_type {
            DateBucket::All | DateBucket::None => true,
            DateBucket::NoDate => task.due_date.is_none(),
            DateBucket::Overdue => {
                task.status == Status::Pending && task.due_date.is_some_and(|due| due < today)
            }
            DateBucket::Today => task.due_date == Some(today),
            DateBucket::Tomorrow => task.due_date.is_some() && task.due_date == tomorrow,
            DateBucket::Week => task
                .due_date
                .is_some_and(|due| due >= today && week_end.is_some_and(|end| due <= end)),
            DateBucket::Custom => match self.date_range.as_ref() {
                Some(DateRange {
                    start: Some(start),
                    end: Some(end),
                }) => task
                    .due_date
                    .is_some_and(|due| due >= *start && due <= *end),
                _ => {
                    trace!("custom date bucket without a complete range; no constraint");
                    true
                }
            },
        }
    }
}

/// Reduces `tasks` to those matching every populated field of `filter`.
/// Input order is preserved.
#[tracing::instrument(skip(tasks, filter), fields(input = tasks.len()))]
pub fn evaluate(tasks: &[Task], filter: &FilterConfig, today: NaiveDate) -> Vec<Task> {
    if filter.is_unconstrained() {
        return tasks.to_vec();
    }

    let keyword = filter.keyword();
    let out: Vec<Task> = tasks
        .iter()
        .filter(|task| filter.matches_with_keyword(task, today, keyword.as_deref()))
        .cloned()
        .collect();

    debug!(kept = out.len(), "filter evaluated");
    out
}

#[cfg(test)]
mod tests {
    use chrono::{Days, NaiveDate, TimeZone, Utc};

    use super::{DateBucket, FilterConfig, KindFilter, evaluate};
    use crate::task::{Priority, Status, TagRef, Task, TaskKind};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).expect("valid date")
    }

    fn task(title: &str, due_offset: Option<i64>) -> Task {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 10, 8, 0, 0)
            .single()
            .expect("valid now");
        let mut task = Task::new_pending(title, now);
        task.due_date = due_offset.map(|offset| {
            if offset >= 0 {
                today() + Days::new(offset.unsigned_abs())
            } else {
                today() - Days::new(offset.unsigned_abs())
            }
        });
        task
    }

    fn titles(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|task| task.title.as_str()).collect()
    }

    #[test]
    fn date_buckets_use_calendar_day() {
        let tasks = vec![
            task("yesterday", Some(-1)),
            task("today", Some(0)),
            task("tomorrow", Some(1)),
            task("next week", Some(7)),
            task("undated", None),
        ];

        let cases = [
            (DateBucket::Today, vec!["today"]),
            (DateBucket::Tomorrow, vec!["tomorrow"]),
            (DateBucket::Overdue, vec!["yesterday"]),
            (DateBucket::Week, vec!["today", "tomorrow", "next week"]),
            (DateBucket::NoDate, vec!["undated"]),
            (
                DateBucket::None,
                vec!["yesterday", "today", "tomorrow", "next week", "undated"],
            ),
        ];
        for (bucket, expected) in cases {
            let out = evaluate(&tasks, &FilterConfig::date(bucket), today());
            assert_eq!(titles(&out), expected, "bucket {bucket:?}");
        }
    }

    #[test]
    fn overdue_excludes_closed_tasks() {
        let now = Utc::now();
        let mut done = task("late but done", Some(-3));
        done.set_status(Status::Done, now);
        let pending = task("late", Some(-3));

        let out = evaluate(&[done, pending], &FilterConfig::date(DateBucket::Overdue), today());
        assert_eq!(titles(&out), vec!["late"]);
    }

    #[test]
    fn fields_are_conjunctive() {
        let mut a = task("Buy milk", Some(0));
        a.list_id = Some(1);
        a.priority = Priority::HIGH;
        let mut b = task("Buy bread", Some(0));
        b.list_id = Some(2);
        b.priority = Priority::HIGH;
        let mut c = task("Call mom", Some(0));
        c.list_id = Some(1);
        c.priority = Priority::HIGH;

        let filter = FilterConfig {
            list_ids: vec![1],
            priorities: vec![Priority::HIGH],
            content_keyword: Some("BUY".to_string()),
            ..FilterConfig::default()
        };
        let out = evaluate(&[a, b, c], &filter, today());
        assert_eq!(titles(&out), vec!["Buy milk"]);
    }

    #[test]
    fn keyword_searches_description() {
        let mut a = task("Errand", None);
        a.description = "pick up the Dry Cleaning".to_string();
        let b = task("Other", None);
        let filter = FilterConfig {
            content_keyword: Some("dry clean".to_string()),
            ..FilterConfig::default()
        };
        assert_eq!(titles(&evaluate(&[a, b], &filter, today())), vec!["Errand"]);
    }

    #[test]
    fn tag_set_matches_any_listed_tag() {
        let mut a = task("a", None);
        a.tags = vec![TagRef::new(5, "home"), TagRef::new(9, "work")];
        let mut b = task("b", None);
        b.tags = vec![TagRef::new(3, "gym")];
        let c = task("c", None);

        let filter = FilterConfig {
            tag_ids: vec![9, 4],
            ..FilterConfig::default()
        };
        assert_eq!(titles(&evaluate(&[a, b, c], &filter, today())), vec!["a"]);
    }

    #[test]
    fn task_kind_filter() {
        let a = task("a", None);
        let mut b = task("b", None);
        b.kind = TaskKind::Note;
        let filter = FilterConfig {
            task_type: KindFilter::Note,
            ..FilterConfig::default()
        };
        assert_eq!(titles(&evaluate(&[a, b], &filter, today())), vec!["b"]);
    }

    #[test]
    fn custom_range_is_inclusive() {
        let tasks = vec![
            task("before", Some(-1)),
            task("start", Some(0)),
            task("end", Some(2)),
            task("after", Some(3)),
            task("undated", None),
        ];
        let filter = FilterConfig::from_json(
            r#"{"dateType":"custom","dateRange":{"start":"20260310","end":"20260312"}}"#,
        );
        assert_eq!(titles(&evaluate(&tasks, &filter, today())), vec!["start", "end"]);
    }

    #[test]
    fn malformed_fields_fail_open() {
        let filter = FilterConfig::from_json(
            r#"{
                "listIds": "not-a-list",
                "tagIds": [1, "2", {"x": 1}],
                "dateType": "fortnight",
                "dateRange": 12,
                "priorities": [3, 7, "x"],
                "contentKeyword": 42,
                "taskType": "habit"
            }"#,
        );
        assert!(filter.list_ids.is_empty());
        assert_eq!(filter.tag_ids, vec![1, 2]);
        assert_eq!(filter.date_type, DateBucket::All);
        assert!(filter.date_range.is_none());
        assert_eq!(filter.priorities, vec![Priority::HIGH]);
        assert!(filter.content_keyword.is_none());
        assert_eq!(filter.task_type, KindFilter::All);

        assert_eq!(FilterConfig::from_json("[]"), FilterConfig::default());
    }

    #[test]
    fn custom_without_range_imposes_nothing() {
        let tasks = vec![task("a", Some(5)), task("b", None)];
        let filter = FilterConfig::date(DateBucket::Custom);
        assert_eq!(evaluate(&tasks, &filter, today()).len(), 2);
    }
}
