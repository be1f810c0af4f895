use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::datetime::iso_date_serde;

pub const DEFAULT_PROJECT_COLOR: &str = "#cccccc";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: String,

    #[serde(default)]
    pub project_id: Option<String>,

    #[serde(default)]
    pub person_id: Option<String>,

    #[serde(default)]
    pub executor_id: Option<String>,

    #[serde(with = "iso_date_serde")]
    pub start_date: NaiveDate,

    #[serde(with = "iso_date_serde")]
    pub end_date: NaiveDate,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl Task {
    pub fn new(id: String, title: String, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            id,
            project_id: None,
            person_id: None,
            executor_id: None,
            start_date,
            end_date,
            title,
            comments: None,
            location: None,
        }
    }

    /// The effective end date: a task whose end precedes its start is treated
    /// as a single-day task on its start date.
    pub fn effective_end(&self) -> NaiveDate {
        self.end_date.max(self.start_date)
    }
}

/// Fields for a task that has not been assigned an id yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub project_id: Option<String>,
    pub person_id: Option<String>,
    pub executor_id: Option<String>,
    pub comments: Option<String>,
    pub location: Option<String>,
}

/// A partial update. `Some(None)` on an optional reference clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub project_id: Option<Option<String>>,
    pub person_id: Option<Option<String>>,
    pub executor_id: Option<Option<String>>,
    pub comments: Option<Option<String>>,
    pub location: Option<Option<String>>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(start) = self.start_date {
            task.start_date = start;
        }
        if let Some(end) = self.end_date {
            task.end_date = end;
        }
        if let Some(project) = &self.project_id {
            task.project_id = project.clone();
        }
        if let Some(person) = &self.person_id {
            task.person_id = person.clone();
        }
        if let Some(executor) = &self.executor_id {
            task.executor_id = executor.clone();
        }
        if let Some(comments) = &self.comments {
            task.comments = comments.clone();
        }
        if let Some(location) = &self.location {
            task.location = location.clone();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: String,
    pub name: String,
    #[serde(default = "default_project_color")]
    pub color: String,
}

/// A responsible person.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Person {
    pub id: String,
    pub name: String,
}

/// The person a task is assigned to for execution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Executor {
    pub id: String,
    pub name: String,
}

/// Every collection at once; the document written by a full backup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Backup {
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub people: Vec<Person>,
    #[serde(default)]
    pub executors: Vec<Executor>,
}

fn default_project_color() -> String {
    DEFAULT_PROJECT_COLOR.to_string()
}

/// Parses a `#rrggbb` color into its components.
pub fn parse_hex_color(raw: &str) -> Option<(u8, u8, u8)> {
    let hex = raw.trim().strip_prefix('#')?;
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some((r, g, b))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{Project, Task, TaskPatch, parse_hex_color};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn task_serializes_iso_dates() {
        let mut task = Task::new(
            "t1".to_string(),
            "Pour foundations".to_string(),
            date(2024, 2, 10),
            date(2024, 2, 20),
        );
        task.project_id = Some("p1".to_string());

        let json = serde_json::to_value(&task).expect("serialize");
        assert_eq!(json["start_date"], "2024-02-10");
        assert_eq!(json["end_date"], "2024-02-20");
        assert!(json.get("comments").is_none());

        let back: Task = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, task);
    }

    #[test]
    fn patch_clears_and_sets_fields() {
        let mut task = Task::new(
            "t1".to_string(),
            "Survey".to_string(),
            date(2024, 1, 1),
            date(2024, 1, 3),
        );
        task.executor_id = Some("e1".to_string());

        let patch = TaskPatch {
            title: Some("Site survey".to_string()),
            executor_id: Some(None),
            end_date: Some(date(2024, 1, 5)),
            ..TaskPatch::default()
        };
        patch.apply_to(&mut task);

        assert_eq!(task.title, "Site survey");
        assert_eq!(task.executor_id, None);
        assert_eq!(task.end_date, date(2024, 1, 5));
        assert!(TaskPatch::default().is_empty());
    }

    #[test]
    fn inverted_interval_collapses_to_start() {
        let task = Task::new(
            "t1".to_string(),
            "Backwards".to_string(),
            date(2024, 3, 9),
            date(2024, 3, 2),
        );
        assert_eq!(task.effective_end(), date(2024, 3, 9));
    }

    #[test]
    fn project_color_defaults_when_missing() {
        let project: Project =
            serde_json::from_str(r#"{"id":"p1","name":"Obra"}"#).expect("deserialize");
        assert_eq!(project.color, "#cccccc");
        assert_eq!(parse_hex_color("#1f2a3B"), Some((0x1f, 0x2a, 0x3b)));
        assert_eq!(parse_hex_color("red"), None);
    }
}
