use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::datetime::iso_parse;
use crate::store::{
    ChangeKind, Collection, DataAccess, Listener, MemoryStore, SubscriptionId, generate_id,
};
use crate::task::{
    Backup, DEFAULT_PROJECT_COLOR, Executor, NewTask, Person, Project, Task, TaskPatch,
};

/// JSON-lines files in a data directory, one per collection. Each mutation
/// rewrites the touched collection atomically.
#[derive(Debug)]
pub struct DataStore {
    pub data_dir: PathBuf,
    pub tasks_path: PathBuf,
    pub projects_path: PathBuf,
    pub people_path: PathBuf,
    pub executors_path: PathBuf,
    memory: MemoryStore,
}

impl DataStore {
    #[instrument(skip(data_dir))]
    pub fn open(data_dir: &Path) -> anyhow::Result<Self> {
        let data_dir = data_dir.to_path_buf();
        fs::create_dir_all(&data_dir)
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let tasks_path = data_dir.join("tasks.data");
        let projects_path = data_dir.join("projects.data");
        let people_path = data_dir.join("people.data");
        let executors_path = data_dir.join("executors.data");

        for path in [&tasks_path, &projects_path, &people_path, &executors_path] {
            if !path.exists() {
                fs::write(path, "")
                    .with_context(|| format!("failed to create {}", path.display()))?;
            }
        }

        let memory = MemoryStore::with_data(
            load_jsonl(&tasks_path).context("failed to load tasks.data")?,
            load_jsonl(&projects_path).context("failed to load projects.data")?,
            load_jsonl(&people_path).context("failed to load people.data")?,
            load_jsonl(&executors_path).context("failed to load executors.data")?,
        );

        info!(
            data_dir = %data_dir.display(),
            tasks = memory.tasks.len(),
            projects = memory.projects.len(),
            people = memory.people.len(),
            executors = memory.executors.len(),
            "opened datastore"
        );

        Ok(Self {
            data_dir,
            tasks_path,
            projects_path,
            people_path,
            executors_path,
            memory,
        })
    }

    #[instrument(skip(self))]
    fn save(&self, collection: Collection) -> anyhow::Result<()> {
        match collection {
            Collection::Tasks => save_jsonl_atomic(&self.tasks_path, &self.memory.tasks)
                .context("failed to save tasks.data"),
            Collection::Projects => save_jsonl_atomic(&self.projects_path, &self.memory.projects)
                .context("failed to save projects.data"),
            Collection::People => save_jsonl_atomic(&self.people_path, &self.memory.people)
                .context("failed to save people.data"),
            Collection::Executors => {
                save_jsonl_atomic(&self.executors_path, &self.memory.executors)
                    .context("failed to save executors.data")
            }
        }
    }

    /// Imports tasks exported from a document database, translating aliased
    /// field names. Records with an id replace the stored task of that id.
    #[instrument(skip(self, raw))]
    pub fn import_tasks(&mut self, raw: &str) -> anyhow::Result<ImportSummary> {
        let items = parse_import_items(raw)?;
        let mut summary = ImportSummary::default();

        for (idx, item) in items.into_iter().enumerate() {
            let task = match normalize_import_item(&item) {
                Ok(task) => task,
                Err(err) => {
                    warn!(index = idx, error = %err, "skipping unreadable import record");
                    summary.skipped += 1;
                    continue;
                }
            };
            let replacing = self.memory.tasks.iter().any(|t| t.id == task.id);
            self.memory.upsert_task(task)?;
            if replacing {
                summary.updated += 1;
            } else {
                summary.added += 1;
            }
        }

        self.save(Collection::Tasks)?;
        info!(
            added = summary.added,
            updated = summary.updated,
            skipped = summary.skipped,
            "imported tasks"
        );
        Ok(summary)
    }

    #[instrument(skip(self, raw))]
    pub fn import_projects(&mut self, raw: &str) -> anyhow::Result<ImportSummary> {
        let items = parse_import_items(raw)?;
        let mut summary = ImportSummary::default();

        for item in &items {
            let Some(project) = normalize_project(item) else {
                warn!("skipping project record without id or name");
                summary.skipped += 1;
                continue;
            };
            if self.memory.upsert_project(project) == ChangeKind::Updated {
                summary.updated += 1;
            } else {
                summary.added += 1;
            }
        }

        self.save(Collection::Projects)?;
        Ok(summary)
    }

    /// Every stored collection, unfiltered.
    pub fn backup(&self) -> Backup {
        self.memory.backup()
    }

    /// Replaces all four collections with a document written by `backup`
    /// and rewrites every data file.
    #[instrument(skip(self, raw))]
    pub fn restore(&mut self, raw: &str) -> anyhow::Result<Backup> {
        let backup: Backup = serde_json::from_str(raw).context("invalid backup document")?;
        self.memory.restore(backup)?;
        for collection in [
            Collection::Tasks,
            Collection::Projects,
            Collection::People,
            Collection::Executors,
        ] {
            self.save(collection)?;
        }

        let restored = self.memory.backup();
        info!(
            tasks = restored.tasks.len(),
            projects = restored.projects.len(),
            people = restored.people.len(),
            executors = restored.executors.len(),
            "restored backup"
        );
        Ok(restored)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: usize,
    pub updated: usize,
    pub skipped: usize,
}

impl DataAccess for DataStore {
    fn tasks(&self) -> &[Task] {
        self.memory.tasks()
    }

    fn projects(&self) -> &[Project] {
        self.memory.projects()
    }

    fn people(&self) -> &[Person] {
        self.memory.people()
    }

    fn executors(&self) -> &[Executor] {
        self.memory.executors()
    }

    fn add_task(&mut self, task: NewTask) -> anyhow::Result<Task> {
        let task = self.memory.add_task(task)?;
        self.save(Collection::Tasks)?;
        Ok(task)
    }

    fn update_task(&mut self, id: &str, patch: &TaskPatch) -> anyhow::Result<Task> {
        let task = self.memory.update_task(id, patch)?;
        self.save(Collection::Tasks)?;
        Ok(task)
    }

    fn delete_task(&mut self, id: &str) -> anyhow::Result<()> {
        self.memory.delete_task(id)?;
        self.save(Collection::Tasks)
    }

    fn add_project(&mut self, name: &str, color: Option<&str>) -> anyhow::Result<Project> {
        let project = self.memory.add_project(name, color)?;
        self.save(Collection::Projects)?;
        Ok(project)
    }

    fn update_project(
        &mut self,
        id: &str,
        name: Option<&str>,
        color: Option<&str>,
    ) -> anyhow::Result<Project> {
        let project = self.memory.update_project(id, name, color)?;
        self.save(Collection::Projects)?;
        Ok(project)
    }

    fn delete_project(&mut self, id: &str) -> anyhow::Result<()> {
        self.memory.delete_project(id)?;
        self.save(Collection::Projects)
    }

    fn add_person(&mut self, name: &str) -> anyhow::Result<Person> {
        let person = self.memory.add_person(name)?;
        self.save(Collection::People)?;
        Ok(person)
    }

    fn update_person(&mut self, id: &str, name: &str) -> anyhow::Result<Person> {
        let person = self.memory.update_person(id, name)?;
        self.save(Collection::People)?;
        Ok(person)
    }

    fn delete_person(&mut self, id: &str) -> anyhow::Result<()> {
        self.memory.delete_person(id)?;
        self.save(Collection::People)
    }

    fn add_executor(&mut self, name: &str) -> anyhow::Result<Executor> {
        let executor = self.memory.add_executor(name)?;
        self.save(Collection::Executors)?;
        Ok(executor)
    }

    fn update_executor(&mut self, id: &str, name: &str) -> anyhow::Result<Executor> {
        let executor = self.memory.update_executor(id, name)?;
        self.save(Collection::Executors)?;
        Ok(executor)
    }

    fn delete_executor(&mut self, id: &str) -> anyhow::Result<()> {
        self.memory.delete_executor(id)?;
        self.save(Collection::Executors)
    }

    fn subscribe(&mut self, listener: Listener) -> SubscriptionId {
        self.memory.subscribe(listener)
    }

    fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.memory.unsubscribe(id)
    }
}

#[instrument(skip(path))]
fn load_jsonl<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    debug!(file = %path.display(), "loading jsonl");
    let file = fs::File::open(path)?;
    let reader = BufReader::new(file);

    let mut out = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let item: T = serde_json::from_str(trimmed)
            .with_context(|| format!("failed parsing {} line {}", path.display(), idx + 1))?;
        out.push(item);
    }

    debug!(count = out.len(), "loaded records from jsonl");
    Ok(out)
}

#[instrument(skip(path, items))]
fn save_jsonl_atomic<T: Serialize>(path: &Path, items: &[T]) -> anyhow::Result<()> {
    debug!(file = %path.display(), count = items.len(), "saving jsonl atomically");

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir)?;
    for item in items {
        let serialized = serde_json::to_string(item)?;
        writeln!(temp, "{serialized}")?;
    }
    temp.flush()?;

    temp.persist(path)
        .map_err(|err| anyhow!("failed to persist {}: {}", path.display(), err))?;

    Ok(())
}

fn parse_import_items(raw: &str) -> anyhow::Result<Vec<Value>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    if trimmed.starts_with('[') {
        let value: Value = serde_json::from_str(trimmed).context("invalid import JSON array")?;
        return match value {
            Value::Array(items) => Ok(items),
            _ => Err(anyhow!("import payload is not an array")),
        };
    }

    trimmed
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(idx, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid import line {}", idx + 1))
        })
        .collect()
}

/// First present, non-null field among `keys`.
fn pick<'a>(item: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| item.get(*key))
        .find(|value| !value.is_null())
}

/// Reference fields may be plain ids or document references carrying an `id`.
fn reference_id(value: Option<&Value>) -> Option<String> {
    let id = match value? {
        Value::String(raw) => raw.trim().to_string(),
        Value::Object(map) => match map.get("id")? {
            Value::String(raw) => raw.trim().to_string(),
            other => other.to_string(),
        },
        Value::Number(num) => num.to_string(),
        _ => return None,
    };
    (!id.is_empty()).then_some(id)
}

fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}

fn normalize_import_item(item: &Value) -> anyhow::Result<Task> {
    if !item.is_object() {
        return Err(anyhow!("import record is not an object"));
    }

    let start_raw = text(pick(item, &["start_date", "startDate", "start"]))
        .ok_or_else(|| anyhow!("missing start date"))?;
    let start = iso_parse(&start_raw)?;
    let end = match text(pick(item, &["end_date", "endDate", "end"])) {
        Some(raw) => iso_parse(&raw)?,
        None => start,
    };

    let title = text(pick(item, &["title", "description", "name"]))
        .unwrap_or_else(|| "(sin título)".to_string());

    Ok(Task {
        id: reference_id(item.get("id")).unwrap_or_else(generate_id),
        project_id: reference_id(pick(item, &["project_id", "projectId", "project"])),
        person_id: reference_id(pick(
            item,
            &["person_id", "personId", "person", "assignee"],
        )),
        executor_id: reference_id(pick(item, &["executor_id", "executorId", "executor"])),
        start_date: start,
        end_date: end.max(start),
        title,
        comments: text(item.get("comments")),
        location: text(item.get("location")),
    })
}

/// Projects exported with `Color` instead of `color` keep their color.
fn normalize_project(item: &Value) -> Option<Project> {
    Some(Project {
        id: reference_id(item.get("id"))?,
        name: text(item.get("name"))?,
        color: text(pick(item, &["color", "Color"]))
            .unwrap_or_else(|| DEFAULT_PROJECT_COLOR.to_string()),
    })
}
