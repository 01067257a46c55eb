use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::compose::ComposedView;
use crate::config::Config;
use crate::datetime::CLOCK_TIME_FORMAT;
use crate::task::{ListRef, Task};
use crate::view_config::{ViewConfiguration, ViewKey};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or("on");
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, view, lists, today))]
    pub fn print_view(
        &self,
        view: &ComposedView,
        lists: &[ListRef],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        self.write_view(&mut out, view, lists, today)
    }

    pub fn write_view<W: Write>(
        &self,
        mut out: W,
        view: &ComposedView,
        lists: &[ListRef],
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        writeln!(
            out,
            "{}  group={} sort={} {}",
            self.paint(&view.key.to_string(), "1"),
            view.config.group_by,
            view.config.sort_by,
            view.config.sort_order
        )?;

        if view.groups.is_empty() {
            writeln!(out, "\nNo tasks.")?;
            return Ok(());
        }

        for group in &view.groups {
            writeln!(out)?;
            writeln!(
                out,
                "{} ({})",
                self.paint(&group.label, "36"),
                group.tasks.len()
            )?;
            if group.tasks.is_empty() {
                continue;
            }
            let rows = group
                .tasks
                .iter()
                .map(|task| self.task_row(task, lists, today))
                .collect();
            write_table(&mut out, &["ID", "Due", "Pri", "List", "Title", "Tags"], rows)?;
        }

        writeln!(out, "\n{} task(s)", view.task_count())?;
        Ok(())
    }

    fn task_row(&self, task: &Task, lists: &[ListRef], today: NaiveDate) -> Vec<String> {
        let id = task.uuid.simple().to_string();
        let short_id = self.paint(&id[..8], "33");

        let due = match (task.due_date, task.due_time) {
            (Some(date), Some(time)) => format!(
                "{} {}",
                date.format("%Y-%m-%d"),
                time.format(CLOCK_TIME_FORMAT)
            ),
            (Some(date), None) => date.format("%Y-%m-%d").to_string(),
            _ => String::new(),
        };
        let due = match task.due_date {
            Some(date) if date < today && !task.is_closed() => self.paint(&due, "31"),
            _ => due,
        };

        let priority = match task.priority.value() {
            0 => String::new(),
            value => "!".repeat(usize::from(value)),
        };

        let list = task
            .list_id
            .map(|id| {
                lists
                    .iter()
                    .find(|list| list.id == id)
                    .map_or_else(|| format!("#{id}"), ListRef::label)
            })
            .unwrap_or_default();

        let title = if task.is_closed() {
            self.paint(&task.title, "2")
        } else {
            task.title.clone()
        };

        let tags = task
            .tags
            .iter()
            .map(|tag| {
                if tag.name.is_empty() {
                    format!("+{}", tag.id)
                } else {
                    format!("+{}", tag.name)
                }
            })
            .collect::<Vec<_>>()
            .join(" ");

        vec![short_id, due, priority, list, title, tags]
    }

    pub fn print_view_config(
        &self,
        key: &ViewKey,
        config: &ViewConfiguration,
        stored: bool,
    ) -> anyhow::Result<()> {
        let mut out = io::stdout().lock();
        writeln!(out, "view           {key}")?;
        writeln!(out, "group_by       {}", config.group_by)?;
        writeln!(out, "sort_by        {}", config.sort_by)?;
        writeln!(out, "sort_order     {}", config.sort_order)?;
        writeln!(out, "hide_completed {}", config.hide_completed)?;
        writeln!(
            out,
            "source         {}",
            if stored { "stored" } else { "default" }
        )?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: &[&str],
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(*header))
        .collect();

    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, &width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ")?;
    }
    writeln!(writer)?;

    for &width in &widths {
        write!(writer, "{:-<width$} ", "")?;
    }
    writeln!(writer)?;

    for row in rows {
        for (cell, width) in row.iter().zip(&widths) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = width.saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
