use std::collections::HashSet;
use std::fmt;

use anyhow::anyhow;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::task::{
    Backup, DEFAULT_PROJECT_COLOR, Executor, NewTask, Person, Project, Task, TaskPatch,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Tasks,
    Projects,
    People,
    Executors,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Collection::Tasks => "tasks",
            Collection::Projects => "projects",
            Collection::People => "people",
            Collection::Executors => "executors",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Updated,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub kind: ChangeKind,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type Listener = Box<dyn FnMut(&ChangeEvent)>;

/// Callback registry shared by the store implementations.
#[derive(Default)]
pub struct Subscribers {
    next: u64,
    listeners: Vec<(SubscriptionId, Listener)>,
}

impl fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.listeners.len())
            .finish()
    }
}

impl Subscribers {
    pub fn add(&mut self, listener: Listener) -> SubscriptionId {
        self.next += 1;
        let id = SubscriptionId(self.next);
        self.listeners.push((id, listener));
        id
    }

    pub fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        before != self.listeners.len()
    }

    pub fn notify(&mut self, event: ChangeEvent) {
        debug!(
            collection = %event.collection,
            kind = ?event.kind,
            id = %event.id,
            listeners = self.listeners.len(),
            "notifying subscribers"
        );
        for (_, listener) in &mut self.listeners {
            listener(&event);
        }
    }
}

/// Read access and CRUD over the calendar's four collections.
///
/// Every successful mutation notifies subscribers exactly once.
pub trait DataAccess {
    fn tasks(&self) -> &[Task];
    fn projects(&self) -> &[Project];
    fn people(&self) -> &[Person];
    fn executors(&self) -> &[Executor];

    fn add_task(&mut self, task: NewTask) -> anyhow::Result<Task>;
    fn update_task(&mut self, id: &str, patch: &TaskPatch) -> anyhow::Result<Task>;
    fn delete_task(&mut self, id: &str) -> anyhow::Result<()>;

    fn add_project(&mut self, name: &str, color: Option<&str>) -> anyhow::Result<Project>;
    fn update_project(
        &mut self,
        id: &str,
        name: Option<&str>,
        color: Option<&str>,
    ) -> anyhow::Result<Project>;
    fn delete_project(&mut self, id: &str) -> anyhow::Result<()>;

    fn add_person(&mut self, name: &str) -> anyhow::Result<Person>;
    fn update_person(&mut self, id: &str, name: &str) -> anyhow::Result<Person>;
    fn delete_person(&mut self, id: &str) -> anyhow::Result<()>;

    fn add_executor(&mut self, name: &str) -> anyhow::Result<Executor>;
    fn update_executor(&mut self, id: &str, name: &str) -> anyhow::Result<Executor>;
    fn delete_executor(&mut self, id: &str) -> anyhow::Result<()>;

    fn subscribe(&mut self, listener: Listener) -> SubscriptionId;
    fn unsubscribe(&mut self, id: SubscriptionId) -> bool;

    fn task(&self, id: &str) -> Option<&Task> {
        self.tasks().iter().find(|task| task.id == id)
    }

    fn project(&self, id: &str) -> Option<&Project> {
        self.projects().iter().find(|project| project.id == id)
    }

    fn person(&self, id: &str) -> Option<&Person> {
        self.people().iter().find(|person| person.id == id)
    }

    fn executor(&self, id: &str) -> Option<&Executor> {
        self.executors().iter().find(|executor| executor.id == id)
    }
}

pub fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// In-memory collections. The file-backed store wraps one of these.
#[derive(Debug, Default)]
pub struct MemoryStore {
    pub(crate) tasks: Vec<Task>,
    pub(crate) projects: Vec<Project>,
    pub(crate) people: Vec<Person>,
    pub(crate) executors: Vec<Executor>,
    subscribers: Subscribers,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(
        tasks: Vec<Task>,
        projects: Vec<Project>,
        people: Vec<Person>,
        executors: Vec<Executor>,
    ) -> Self {
        Self {
            tasks,
            projects,
            people,
            executors,
            subscribers: Subscribers::default(),
        }
    }

    /// Inserts or replaces a task by id without id generation.
    pub fn upsert_task(&mut self, task: Task) -> anyhow::Result<Task> {
        validate_task(&task)?;
        let kind = match self.tasks.iter_mut().find(|t| t.id == task.id) {
            Some(existing) => {
                *existing = task.clone();
                ChangeKind::Updated
            }
            None => {
                self.tasks.push(task.clone());
                ChangeKind::Added
            }
        };
        self.subscribers.notify(ChangeEvent {
            collection: Collection::Tasks,
            kind,
            id: task.id.clone(),
        });
        Ok(task)
    }

    pub fn upsert_project(&mut self, project: Project) -> ChangeKind {
        let id = project.id.clone();
        let kind = match self.projects.iter_mut().find(|p| p.id == id) {
            Some(existing) => {
                *existing = project;
                ChangeKind::Updated
            }
            None => {
                self.projects.push(project);
                ChangeKind::Added
            }
        };
        self.emit(Collection::Projects, kind, &id);
        kind
    }

    /// Copies every collection.
    pub fn backup(&self) -> Backup {
        Backup {
            tasks: self.tasks.clone(),
            projects: self.projects.clone(),
            people: self.people.clone(),
            executors: self.executors.clone(),
        }
    }

    /// Replaces every collection with `backup`. Nothing changes unless the
    /// whole document is valid. Ids missing from the backup are reported as
    /// deleted, the rest as added or updated.
    #[instrument(skip(self, backup))]
    pub fn restore(&mut self, backup: Backup) -> anyhow::Result<()> {
        for task in &backup.tasks {
            validate_task(task)?;
        }
        check_unique(Collection::Tasks, backup.tasks.iter().map(|t| t.id.as_str()))?;
        check_unique(Collection::Projects, backup.projects.iter().map(|p| p.id.as_str()))?;
        check_unique(Collection::People, backup.people.iter().map(|p| p.id.as_str()))?;
        check_unique(Collection::Executors, backup.executors.iter().map(|e| e.id.as_str()))?;

        let old_ids = [
            (Collection::Tasks, ids_of(self.tasks.iter().map(|t| &t.id))),
            (Collection::Projects, ids_of(self.projects.iter().map(|p| &p.id))),
            (Collection::People, ids_of(self.people.iter().map(|p| &p.id))),
            (Collection::Executors, ids_of(self.executors.iter().map(|e| &e.id))),
        ];
        let new_ids = [
            ids_of(backup.tasks.iter().map(|t| &t.id)),
            ids_of(backup.projects.iter().map(|p| &p.id)),
            ids_of(backup.people.iter().map(|p| &p.id)),
            ids_of(backup.executors.iter().map(|e| &e.id)),
        ];

        self.tasks = backup.tasks;
        self.projects = backup.projects;
        self.people = backup.people;
        self.executors = backup.executors;

        for ((collection, before), after) in old_ids.into_iter().zip(new_ids) {
            for id in before.iter().filter(|id| !after.contains(*id)) {
                self.emit(collection, ChangeKind::Deleted, id);
            }
            for id in &after {
                let kind = if before.contains(id) {
                    ChangeKind::Updated
                } else {
                    ChangeKind::Added
                };
                self.emit(collection, kind, id);
            }
        }
        Ok(())
    }

    fn emit(&mut self, collection: Collection, kind: ChangeKind, id: &str) {
        self.subscribers.notify(ChangeEvent {
            collection,
            kind,
            id: id.to_string(),
        });
    }
}

fn validate_task(task: &Task) -> anyhow::Result<()> {
    if task.title.trim().is_empty() {
        return Err(anyhow!("task title cannot be empty"));
    }
    if task.start_date > task.end_date {
        return Err(anyhow!(
            "task {} starts after it ends ({} > {})",
            task.id,
            task.start_date,
            task.end_date
        ));
    }
    Ok(())
}

/// Ids in collection order.
fn ids_of<'a>(ids: impl Iterator<Item = &'a String>) -> Vec<String> {
    ids.cloned().collect()
}

fn check_unique<'a>(
    collection: Collection,
    ids: impl Iterator<Item = &'a str>,
) -> anyhow::Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(anyhow!("duplicate id in {collection}: {id}"));
        }
    }
    Ok(())
}

fn validate_name(kind: &str, name: &str) -> anyhow::Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("{kind} name cannot be empty"));
    }
    Ok(trimmed.to_string())
}

fn not_found(collection: Collection, id: &str) -> anyhow::Error {
    anyhow!("no such entry in {collection}: {id}")
}

fn optional_text(raw: Option<String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl DataAccess for MemoryStore {
    fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    fn projects(&self) -> &[Project] {
        &self.projects
    }

    fn people(&self) -> &[Person] {
        &self.people
    }

    fn executors(&self) -> &[Executor] {
        &self.executors
    }

    #[instrument(skip(self, new), fields(title = %new.title))]
    fn add_task(&mut self, new: NewTask) -> anyhow::Result<Task> {
        let start = new
            .start_date
            .ok_or_else(|| anyhow!("task start date is required"))?;
        let end = new.end_date.unwrap_or(start);
        let task = Task {
            id: generate_id(),
            project_id: optional_text(new.project_id),
            person_id: optional_text(new.person_id),
            executor_id: optional_text(new.executor_id),
            start_date: start,
            end_date: end,
            title: new.title.trim().to_string(),
            comments: optional_text(new.comments),
            location: optional_text(new.location),
        };
        validate_task(&task)?;
        self.tasks.push(task.clone());
        self.emit(Collection::Tasks, ChangeKind::Added, &task.id);
        Ok(task)
    }

    #[instrument(skip(self, patch))]
    fn update_task(&mut self, id: &str, patch: &TaskPatch) -> anyhow::Result<Task> {
        let existing = self
            .tasks
            .iter_mut()
            .find(|task| task.id == id)
            .ok_or_else(|| not_found(Collection::Tasks, id))?;

        let mut updated = existing.clone();
        patch.apply_to(&mut updated);
        validate_task(&updated)?;
        *existing = updated.clone();

        self.emit(Collection::Tasks, ChangeKind::Updated, id);
        Ok(updated)
    }

    #[instrument(skip(self))]
    fn delete_task(&mut self, id: &str) -> anyhow::Result<()> {
        let idx = self
            .tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| not_found(Collection::Tasks, id))?;
        self.tasks.remove(idx);
        self.emit(Collection::Tasks, ChangeKind::Deleted, id);
        Ok(())
    }

    #[instrument(skip(self))]
    fn add_project(&mut self, name: &str, color: Option<&str>) -> anyhow::Result<Project> {
        let project = Project {
            id: generate_id(),
            name: validate_name("project", name)?,
            color: color
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .unwrap_or(DEFAULT_PROJECT_COLOR)
                .to_string(),
        };
        self.projects.push(project.clone());
        self.emit(Collection::Projects, ChangeKind::Added, &project.id);
        Ok(project)
    }

    #[instrument(skip(self))]
    fn update_project(
        &mut self,
        id: &str,
        name: Option<&str>,
        color: Option<&str>,
    ) -> anyhow::Result<Project> {
        let name = name.map(|n| validate_name("project", n)).transpose()?;
        let project = self
            .projects
            .iter_mut()
            .find(|project| project.id == id)
            .ok_or_else(|| not_found(Collection::Projects, id))?;
        if let Some(name) = name {
            project.name = name;
        }
        if let Some(color) = color.map(str::trim).filter(|c| !c.is_empty()) {
            project.color = color.to_string();
        }
        let updated = project.clone();
        self.emit(Collection::Projects, ChangeKind::Updated, id);
        Ok(updated)
    }

    #[instrument(skip(self))]
    fn delete_project(&mut self, id: &str) -> anyhow::Result<()> {
        let idx = self
            .projects
            .iter()
            .position(|project| project.id == id)
            .ok_or_else(|| not_found(Collection::Projects, id))?;
        self.projects.remove(idx);
        self.emit(Collection::Projects, ChangeKind::Deleted, id);
        Ok(())
    }

    #[instrument(skip(self))]
    fn add_person(&mut self, name: &str) -> anyhow::Result<Person> {
        let person = Person {
            id: generate_id(),
            name: validate_name("person", name)?,
        };
        self.people.push(person.clone());
        self.emit(Collection::People, ChangeKind::Added, &person.id);
        Ok(person)
    }

    #[instrument(skip(self))]
    fn update_person(&mut self, id: &str, name: &str) -> anyhow::Result<Person> {
        let name = validate_name("person", name)?;
        let person = self
            .people
            .iter_mut()
            .find(|person| person.id == id)
            .ok_or_else(|| not_found(Collection::People, id))?;
        person.name = name;
        let updated = person.clone();
        self.emit(Collection::People, ChangeKind::Updated, id);
        Ok(updated)
    }

    #[instrument(skip(self))]
    fn delete_person(&mut self, id: &str) -> anyhow::Result<()> {
        let idx = self
            .people
            .iter()
            .position(|person| person.id == id)
            .ok_or_else(|| not_found(Collection::People, id))?;
        self.people.remove(idx);
        self.emit(Collection::People, ChangeKind::Deleted, id);
        Ok(())
    }

    #[instrument(skip(self))]
    fn add_executor(&mut self, name: &str) -> anyhow::Result<Executor> {
        let executor = Executor {
            id: generate_id(),
            name: validate_name("executor", name)?,
        };
        self.executors.push(executor.clone());
        self.emit(Collection::Executors, ChangeKind::Added, &executor.id);
        Ok(executor)
    }

    #[instrument(skip(self))]
    fn update_executor(&mut self, id: &str, name: &str) -> anyhow::Result<Executor> {
        let name = validate_name("executor", name)?;
        let executor = self
            .executors
            .iter_mut()
            .find(|executor| executor.id == id)
            .ok_or_else(|| not_found(Collection::Executors, id))?;
        executor.name = name;
        let updated = executor.clone();
        self.emit(Collection::Executors, ChangeKind::Updated, id);
        Ok(updated)
    }

    #[instrument(skip(self))]
    fn delete_executor(&mut self, id: &str) -> anyhow::Result<()> {
        let idx = self
            .executors
            .iter()
            .position(|executor| executor.id == id)
            .ok_or_else(|| not_found(Collection::Executors, id))?;
        self.executors.remove(idx);
        self.emit(Collection::Executors, ChangeKind::Deleted, id);
        Ok(())
    }

    fn subscribe(&mut self, listener: Listener) -> SubscriptionId {
        self.subscribers.add(listener)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.remove(id)
    }
}
