use std::sync::mpsc::Receiver;

use anyhow::anyhow;
use chrono::NaiveDate;
use tracing::{debug, info, instrument};

use crate::datetime::{add_days, format_display, is_weekend};
use crate::filter::{FilterSelection, filter_tasks};
use crate::layout::{LayoutResult, layout};
use crate::store::DataAccess;
use crate::task::{DEFAULT_PROJECT_COLOR, Task, TaskPatch};
use crate::window::{Window, calendar_year, month_label, rolling};

/// Shown when a task references an id its collection no longer holds.
pub const UNKNOWN_LABEL: &str = "Desconocido";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthRow {
    pub window: Window,
    pub label: String,
    pub days: u32,
    /// Days of the month falling on Saturday or Sunday.
    pub weekends: Vec<u32>,
    pub layout: LayoutResult,
}

/// What a hover tooltip shows for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDetails {
    pub id: String,
    pub title: String,
    pub project: String,
    pub project_color: String,
    pub person: String,
    pub executor: Option<String>,
    pub start: String,
    pub end: String,
    pub comments: Option<String>,
    pub location: Option<String>,
}

/// Requests a rendering layer sends in response to user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalendarRequest {
    /// Drop the task on a new start day, keeping its length.
    MoveTask { id: String, new_start: NaiveDate },
    EditTask { id: String, patch: TaskPatch },
    DeleteTask { id: String },
    ShowDetails { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestOutcome {
    Updated(Task),
    Deleted(String),
    Details(TaskDetails),
}

/// A calendar over an injected data-access collaborator.
///
/// `selection` of `None` shows every task; `Some` applies the filter.
#[derive(Debug)]
pub struct Calendar<S: DataAccess> {
    store: S,
    selection: Option<FilterSelection>,
}

impl<S: DataAccess> Calendar<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            selection: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn selection(&self) -> Option<&FilterSelection> {
        self.selection.as_ref()
    }

    pub fn set_selection(&mut self, selection: Option<FilterSelection>) {
        debug!(filtered = selection.is_some(), "selection changed");
        self.selection = selection;
    }

    /// Selects every project, person and executor currently in the store.
    pub fn select_all(&mut self) {
        self.selection = Some(FilterSelection::all_of(
            self.store.projects(),
            self.store.people(),
            self.store.executors(),
        ));
    }

    pub fn visible_tasks(&self) -> Vec<&Task> {
        filter_tasks(self.store.tasks(), self.selection.as_ref())
    }

    #[instrument(skip(self), fields(window = %window))]
    pub fn month_row(&self, window: Window, rolling_label: bool) -> MonthRow {
        let tasks = self.visible_tasks();
        let days = window.days();
        let weekends = (1..=days)
            .filter(|day| is_weekend(window.year(), window.month_index(), *day))
            .collect();

        MonthRow {
            window,
            label: month_label(window, rolling_label),
            days,
            weekends,
            layout: layout(&tasks, window),
        }
    }

    pub fn year_rows(&self, year: i32) -> anyhow::Result<Vec<MonthRow>> {
        Ok(calendar_year(year)?
            .into_iter()
            .map(|window| self.month_row(window, false))
            .collect())
    }

    pub fn rolling_rows(&self, start: Window) -> anyhow::Result<Vec<MonthRow>> {
        Ok(rolling(start)?
            .into_iter()
            .map(|window| self.month_row(window, true))
            .collect())
    }

    #[instrument(skip(self))]
    pub fn task_details(&self, id: &str) -> anyhow::Result<TaskDetails> {
        let task = self
            .store
            .task(id)
            .ok_or_else(|| anyhow!("task not found: {id}"))?;

        let project = task.project_id.as_deref().and_then(|pid| self.store.project(pid));
        let person = task
            .person_id
            .as_deref()
            .and_then(|pid| self.store.person(pid))
            .map(|person| person.name.clone());
        let executor = task
            .executor_id
            .as_deref()
            .and_then(|eid| self.store.executor(eid))
            .map(|executor| executor.name.clone());

        Ok(TaskDetails {
            id: task.id.clone(),
            title: task.title.clone(),
            project: project
                .map(|p| p.name.clone())
                .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
            project_color: project
                .map(|p| p.color.clone())
                .unwrap_or_else(|| DEFAULT_PROJECT_COLOR.to_string()),
            person: person
                .or_else(|| task.person_id.clone())
                .unwrap_or_else(|| "?".to_string()),
            executor,
            start: format_display(task.start_date),
            end: format_display(task.end_date),
            comments: task.comments.clone(),
            location: task.location.clone(),
        })
    }

    /// Moves a task so it starts on `new_start`, preserving its length.
    #[instrument(skip(self))]
    pub fn move_task(&mut self, id: &str, new_start: NaiveDate) -> anyhow::Result<Task> {
        let task = self
            .store
            .task(id)
            .ok_or_else(|| anyhow!("task not found: {id}"))?;
        let length = (task.effective_end() - task.start_date).num_days();
        let patch = TaskPatch {
            start_date: Some(new_start),
            end_date: Some(add_days(new_start, length)),
            ..TaskPatch::default()
        };

        let moved = self.store.update_task(id, &patch)?;
        info!(
            task = %moved.id,
            start = %moved.start_date,
            end = %moved.end_date,
            "moved task"
        );
        Ok(moved)
    }

    #[instrument(skip(self, request))]
    pub fn apply(&mut self, request: CalendarRequest) -> anyhow::Result<RequestOutcome> {
        match request {
            CalendarRequest::MoveTask { id, new_start } => {
                self.move_task(&id, new_start).map(RequestOutcome::Updated)
            }
            CalendarRequest::EditTask { id, patch } => {
                if patch.is_empty() {
                    return Err(anyhow!("nothing to change for task {id}"));
                }
                self.store
                    .update_task(&id, &patch)
                    .map(RequestOutcome::Updated)
            }
            CalendarRequest::DeleteTask { id } => {
                self.store.delete_task(&id)?;
                Ok(RequestOutcome::Deleted(id))
            }
            CalendarRequest::ShowDetails { id } => {
                self.task_details(&id).map(RequestOutcome::Details)
            }
        }
    }

    /// Applies every request already queued on `requests` without blocking.
    pub fn drain_requests(
        &mut self,
        requests: &Receiver<CalendarRequest>,
    ) -> Vec<anyhow::Result<RequestOutcome>> {
        let outcomes: Vec<_> = requests
            .try_iter()
            .map(|request| self.apply(request))
            .collect();
        debug!(count = outcomes.len(), "drained calendar requests");
        outcomes
    }
}
