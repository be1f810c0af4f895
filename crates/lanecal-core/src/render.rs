use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::calendar::{MonthRow, TaskDetails, UNKNOWN_LABEL};
use crate::config::Config;
use crate::datetime::iso_format;
use crate::layout::{GRID_COLUMNS, Placement};
use crate::store::DataAccess;
use crate::task::{Project, Task, parse_hex_color};

const LABEL_WIDTH: usize = 14;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = cfg.get_bool("color").ok_or_else(|| {
            anyhow!(
                "invalid color setting: {}",
                cfg.get("color").unwrap_or_default()
            )
        })?;

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    /// A titled block of month rows, one text line per lane.
    #[tracing::instrument(skip(self, out, rows, store))]
    pub fn write_months<W, S>(
        &self,
        out: &mut W,
        title: &str,
        rows: &[MonthRow],
        store: &S,
    ) -> anyhow::Result<()>
    where
        W: Write,
        S: DataAccess,
    {
        writeln!(out, "{}", self.paint(title, "1"))?;
        writeln!(out, "{:width$} {}", "", self.day_ruler(), width = LABEL_WIDTH)?;

        for row in rows {
            self.write_month_row(out, row, store)?;
        }
        Ok(())
    }

    /// One line naming every project next to its color swatch. Nothing is
    /// written when there are no projects.
    pub fn write_legend<W: Write>(&self, out: &mut W, projects: &[Project]) -> anyhow::Result<()> {
        if projects.is_empty() {
            return Ok(());
        }
        let items: Vec<String> = projects
            .iter()
            .map(|project| format!("{} {}", self.swatch(&project.color), project.name))
            .collect();
        writeln!(out, "{} {}", fit("Projects", LABEL_WIDTH), items.join("   "))?;
        Ok(())
    }

    fn swatch(&self, color: &str) -> String {
        match parse_hex_color(color) {
            Some((r, g, b)) => self.paint("■", &format!("38;2;{r};{g};{b}")),
            None => "■".to_string(),
        }
    }

    fn write_month_row<W: Write, S: DataAccess>(
        &self,
        out: &mut W,
        row: &MonthRow,
        store: &S,
    ) -> anyhow::Result<()> {
        let label = fit(&row.label, LABEL_WIDTH);
        if row.layout.is_empty() {
            writeln!(out, "{label} {}", self.empty_lane(row))?;
            return Ok(());
        }

        for lane in 0..row.layout.lane_count {
            let prefix = if lane == 0 { label.as_str() } else { "" };
            let mut line = String::new();
            let mut day = 1;
            for placement in row.layout.lane(lane) {
                while day < placement.start_offset_day {
                    line.push_str(&self.background_cell(row, day));
                    day += 1;
                }
                line.push_str(&self.bar(placement, store));
                day = placement.end_offset_day + 1;
            }
            while day <= GRID_COLUMNS {
                line.push_str(&self.background_cell(row, day));
                day += 1;
            }
            writeln!(out, "{prefix:width$} {line}", width = LABEL_WIDTH)?;
        }
        Ok(())
    }

    fn day_ruler(&self) -> String {
        (1..=GRID_COLUMNS)
            .map(|day| char::from_digit(day % 10, 10).unwrap_or(' '))
            .collect()
    }

    fn empty_lane(&self, row: &MonthRow) -> String {
        (1..=GRID_COLUMNS)
            .map(|day| self.background_cell(row, day))
            .collect()
    }

    fn background_cell(&self, row: &MonthRow, day: u32) -> String {
        if day > row.days {
            " ".to_string()
        } else if row.weekends.contains(&day) {
            self.paint("·", "2")
        } else {
            ".".to_string()
        }
    }

    fn bar<S: DataAccess>(&self, placement: &Placement, store: &S) -> String {
        let task = store.task(&placement.task_id);
        let title = task.map(|t| t.title.as_str()).unwrap_or("");
        let width = placement.span() as usize;
        let text = bar_text(title, width);

        let rgb = task
            .and_then(|t| t.project_id.as_deref())
            .and_then(|pid| store.project(pid))
            .and_then(|project| parse_hex_color(&project.color));
        match rgb {
            Some((r, g, b)) => self.paint(&text, &format!("30;48;2;{r};{g};{b}")),
            None => self.paint(&text, "30;47"),
        }
    }

    #[tracing::instrument(skip(self, out, tasks, store))]
    pub fn write_task_table<W, S>(
        &self,
        out: &mut W,
        tasks: &[&Task],
        store: &S,
    ) -> anyhow::Result<()>
    where
        W: Write,
        S: DataAccess,
    {
        let headers = vec![
            "ID".to_string(),
            "Start".to_string(),
            "End".to_string(),
            "Project".to_string(),
            "Person".to_string(),
            "Executor".to_string(),
            "Title".to_string(),
        ];

        let rows = tasks
            .iter()
            .map(|task| {
                let project = lookup_name(task.project_id.as_deref(), |id| {
                    store.project(id).map(|p| p.name.clone())
                });
                let person = lookup_name(task.person_id.as_deref(), |id| {
                    store.person(id).map(|p| p.name.clone())
                });
                let executor = lookup_name(task.executor_id.as_deref(), |id| {
                    store.executor(id).map(|e| e.name.clone())
                });
                vec![
                    self.paint(&task.id, "33"),
                    iso_format(task.start_date),
                    iso_format(task.end_date),
                    project,
                    person,
                    executor,
                    task.title.clone(),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    #[tracing::instrument(skip(self, out, details))]
    pub fn write_task_details<W: Write>(
        &self,
        out: &mut W,
        details: &TaskDetails,
    ) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(&details.title, "1"))?;
        writeln!(out, "id        {}", details.id)?;
        writeln!(out, "project   {} ({})", details.project, details.project_color)?;
        writeln!(out, "person    {}", details.person)?;
        if let Some(executor) = &details.executor {
            writeln!(out, "executor  {executor}")?;
        }
        writeln!(out, "start     {}", details.start)?;
        writeln!(out, "end       {}", details.end)?;
        if let Some(location) = &details.location {
            writeln!(out, "location  {location}")?;
        }
        if let Some(comments) = &details.comments {
            writeln!(out, "comments  {comments}")?;
        }
        Ok(())
    }

    pub fn write_projects<W: Write>(
        &self,
        out: &mut W,
        projects: &[Project],
    ) -> anyhow::Result<()> {
        let rows = projects
            .iter()
            .map(|project| {
                let swatch = match parse_hex_color(&project.color) {
                    Some((r, g, b)) => self.paint("  ", &format!("48;2;{r};{g};{b}")),
                    None => String::new(),
                };
                vec![
                    self.paint(&project.id, "33"),
                    project.name.clone(),
                    format!("{} {swatch}", project.color),
                ]
            })
            .collect();
        write_table(
            out,
            vec!["ID".to_string(), "Name".to_string(), "Color".to_string()],
            rows,
        )
    }

    /// People and executors share one id/name listing.
    pub fn write_names<'a, W, I>(&self, out: &mut W, entries: I) -> anyhow::Result<()>
    where
        W: Write,
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let rows = entries
            .into_iter()
            .map(|(id, name)| vec![self.paint(id, "33"), name.to_string()])
            .collect();
        write_table(out, vec!["ID".to_string(), "Name".to_string()], rows)
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn lookup_name(id: Option<&str>, resolve: impl Fn(&str) -> Option<String>) -> String {
    match id {
        Some(id) => resolve(id).unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
        None => String::new(),
    }
}

/// Pads or truncates `text` to exactly `width` terminal columns.
fn fit(text: &str, width: usize) -> String {
    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let w = UnicodeWidthChar::width(ch).unwrap_or(0);
        if used + w > width {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push_str(&" ".repeat(width - used));
    out
}

/// `[Title==]` filling `width` columns; a one-day bar is a single `#`.
fn bar_text(title: &str, width: usize) -> String {
    match width {
        0 => String::new(),
        1 => "#".to_string(),
        _ => {
            let inner = fit(title, width - 2);
            let trimmed = inner.trim_end();
            let pad = width - 2 - UnicodeWidthStr::width(trimmed);
            format!("[{trimmed}{}]", "=".repeat(pad))
        }
    }
}

fn write_table<W: Write>(
    writer: &mut W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths: Vec<usize> = headers
        .iter()
        .map(|header| UnicodeWidthStr::width(header.as_str()))
        .collect();

    for row in &rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for (header, width) in headers.iter().zip(&widths) {
        write!(writer, "{header:width$} ")?;
    }
    writeln!(writer)?;

    for width in &widths {
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
