use std::collections::BTreeSet;

use anyhow::anyhow;
use tracing::trace;

use crate::task::{
  Executor,
  Person,
  Project,
  Task
};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Dimension {
  Project,
  Person,
  Executor
}

impl Dimension {
  pub fn from_key(
    key: &str
  ) -> Option<Self> {
    match key
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "project" | "proj" => {
        Some(Self::Project)
      }
      | "person" | "responsible" => {
        Some(Self::Person)
      }
      | "executor" | "exec" => {
        Some(Self::Executor)
      }
      | _ => None
    }
  }

  fn field<'a>(
    &self,
    task: &'a Task
  ) -> Option<&'a str> {
    let raw = match self {
      | Self::Project => {
        task.project_id.as_deref()
      }
      | Self::Person => {
        task.person_id.as_deref()
      }
      | Self::Executor => {
        task.executor_id.as_deref()
      }
    };
    raw.filter(|value| {
      !value.trim().is_empty()
    })
  }
}

/// Selected ids per dimension.
///
/// An empty set admits nothing: "show everything" is spelled by filling the
/// set with every known id (see [`FilterSelection::all_of`]), never by
/// leaving it empty. The executor dimension is the one exception: tasks with
/// no executor always pass it.
#[derive(
  Debug, Clone, Default, PartialEq, Eq,
)]
pub struct FilterSelection {
  pub projects:  BTreeSet<String>,
  pub people:    BTreeSet<String>,
  pub executors: BTreeSet<String>
}

impl FilterSelection {
  #[must_use]
  pub fn all_of(
    projects: &[Project],
    people: &[Person],
    executors: &[Executor]
  ) -> Self {
    Self {
      projects:  projects
        .iter()
        .map(|p| p.id.clone())
        .collect(),
      people:    people
        .iter()
        .map(|p| p.id.clone())
        .collect(),
      executors: executors
        .iter()
        .map(|e| e.id.clone())
        .collect()
    }
  }

  /// Builds a selection from `project:ID` / `person:ID` / `executor:ID`
  /// terms. Values may be comma lists; dimensions that no term mentions
  /// select every known id.
  ///
  /// That is not a wildcard: with `project:p1` alone, a task whose person
  /// is unset or no longer stored still fails the person dimension and is
  /// hidden. Only an unassigned executor passes.
  #[tracing::instrument(skip_all)]
  pub fn from_terms(
    terms: &[String],
    projects: &[Project],
    people: &[Person],
    executors: &[Executor]
  ) -> anyhow::Result<Self> {
    let mut explicit = Self::default();
    let mut seen = [false; 3];

    for term in terms {
      let (key, value) = term
        .split_once(':')
        .or_else(|| {
          term.split_once('=')
        })
        .ok_or_else(|| {
          anyhow!(
            "expected DIMENSION:ID \
             filter term, got: {term}"
          )
        })?;
      let dimension =
        Dimension::from_key(key)
          .ok_or_else(|| {
            anyhow!(
              "unknown filter \
               dimension: {key}"
            )
          })?;

      let slot = match dimension {
        | Dimension::Project => 0,
        | Dimension::Person => 1,
        | Dimension::Executor => 2
      };
      seen[slot] = true;

      for id in value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
      {
        explicit
          .set_mut(dimension)
          .insert(id.to_string());
      }
    }

    let all = Self::all_of(
      projects, people, executors
    );
    Ok(Self {
      projects:  if seen[0] {
        explicit.projects
      } else {
        all.projects
      },
      people:    if seen[1] {
        explicit.people
      } else {
        all.people
      },
      executors: if seen[2] {
        explicit.executors
      } else {
        all.executors
      }
    })
  }

  #[must_use]
  pub fn set(
    &self,
    dimension: Dimension
  ) -> &BTreeSet<String> {
    match dimension {
      | Dimension::Project => {
        &self.projects
      }
      | Dimension::Person => &self.people,
      | Dimension::Executor => {
        &self.executors
      }
    }
  }

  fn set_mut(
    &mut self,
    dimension: Dimension
  ) -> &mut BTreeSet<String> {
    match dimension {
      | Dimension::Project => {
        &mut self.projects
      }
      | Dimension::Person => {
        &mut self.people
      }
      | Dimension::Executor => {
        &mut self.executors
      }
    }
  }

  #[must_use]
  pub fn passes(
    &self,
    task: &Task,
    dimension: Dimension
  ) -> bool {
    match dimension.field(task) {
      | None
        if dimension
          == Dimension::Executor =>
      {
        true
      }
      | None => false,
      | Some(value) => {
        self
          .set(dimension)
          .contains(value)
      }
    }
  }

  #[must_use]
  pub fn matches(
    &self,
    task: &Task
  ) -> bool {
    let ok = [
      Dimension::Project,
      Dimension::Person,
      Dimension::Executor
    ]
    .iter()
    .all(|dimension| {
      self.passes(task, *dimension)
    });
    trace!(task = %task.id, matched = ok, "evaluated filter");
    ok
  }
}

/// Tasks admitted by `selection`, in input order. `None` admits all.
#[must_use]
pub fn filter_tasks<'a>(
  tasks: &'a [Task],
  selection: Option<&FilterSelection>
) -> Vec<&'a Task> {
  tasks
    .iter()
    .filter(|task| {
      selection.is_none_or(|sel| {
        sel.matches(task)
      })
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeSet;

  use chrono::NaiveDate;

  use super::{
    Dimension,
    FilterSelection,
    filter_tasks
  };
  use crate::task::{
    Executor,
    Person,
    Project,
    Task
  };

  fn task(
    id: &str,
    project: Option<&str>,
    person: Option<&str>,
    executor: Option<&str>
  ) -> Task {
    let day =
      NaiveDate::from_ymd_opt(
        2024, 2, 1
      )
      .expect("valid date");
    let mut t = Task::new(
      id.to_string(),
      id.to_string(),
      day,
      day
    );
    t.project_id =
      project.map(str::to_string);
    t.person_id =
      person.map(str::to_string);
    t.executor_id =
      executor.map(str::to_string);
    t
  }

  fn ids(
    raw: &[&str]
  ) -> BTreeSet<String> {
    raw
      .iter()
      .map(|s| s.to_string())
      .collect()
  }

  fn selection() -> FilterSelection {
    FilterSelection {
      projects:  ids(&["p1", "p2"]),
      people:    ids(&["u1"]),
      executors: ids(&["e1"])
    }
  }

  #[test]
  fn all_dimensions_must_pass() {
    let sel = selection();
    assert!(sel.matches(&task(
      "a",
      Some("p1"),
      Some("u1"),
      Some("e1")
    )));
    assert!(!sel.matches(&task(
      "b",
      Some("p3"),
      Some("u1"),
      Some("e1")
    )));
    assert!(!sel.matches(&task(
      "c",
      Some("p1"),
      Some("u2"),
      Some("e1")
    )));
    assert!(!sel.matches(&task(
      "d",
      Some("p1"),
      Some("u1"),
      Some("e2")
    )));
  }

  #[test]
  fn empty_set_admits_nothing() {
    let sel = FilterSelection {
      projects: BTreeSet::new(),
      ..selection()
    };
    assert!(!sel.matches(&task(
      "a",
      Some("p1"),
      Some("u1"),
      Some("e1")
    )));

    let none = FilterSelection::default();
    assert!(!none.passes(
      &task("b", Some("p1"), None, None),
      Dimension::Project
    ));
  }

  #[test]
  fn unassigned_executor_always_passes() {
    let sel = FilterSelection {
      executors: BTreeSet::new(),
      ..selection()
    };
    assert!(sel.matches(&task(
      "a",
      Some("p1"),
      Some("u1"),
      None
    )));
    assert!(sel.matches(&task(
      "b",
      Some("p2"),
      Some("u1"),
      Some("  ")
    )));
    assert!(!sel.matches(&task(
      "c",
      Some("p2"),
      Some("u1"),
      Some("e1")
    )));
  }

  #[test]
  fn unassigned_project_or_person_never_passes()
   {
    let sel = selection();
    assert!(!sel.matches(&task(
      "a",
      None,
      Some("u1"),
      Some("e1")
    )));
    assert!(!sel.matches(&task(
      "b",
      Some("p1"),
      Some(""),
      Some("e1")
    )));
  }

  #[test]
  fn terms_fill_unmentioned_dimensions()
  {
    let projects = vec![
      Project {
        id:    "p1".to_string(),
        name:  "Obra".to_string(),
        color: "#ff0000".to_string()
      },
      Project {
        id:    "p2".to_string(),
        name:  "Diseño".to_string(),
        color: "#00ff00".to_string()
      },
    ];
    let people = vec![Person {
      id:   "u1".to_string(),
      name: "Ana".to_string()
    }];
    let executors = vec![Executor {
      id:   "e1".to_string(),
      name: "Luis".to_string()
    }];

    let sel = FilterSelection::from_terms(
      &["project:p2".to_string()],
      &projects,
      &people,
      &executors
    )
    .expect("parse terms");
    assert_eq!(sel.projects, ids(&["p2"]));
    assert_eq!(sel.people, ids(&["u1"]));
    assert_eq!(
      sel.executors,
      ids(&["e1"])
    );

    let sel = FilterSelection::from_terms(
      &["executor:e1,e9".to_string()],
      &projects,
      &people,
      &executors
    )
    .expect("parse terms");
    assert_eq!(
      sel.executors,
      ids(&["e1", "e9"])
    );
    assert_eq!(
      sel.projects,
      ids(&["p1", "p2"])
    );

    assert!(
      FilterSelection::from_terms(
        &["colour:red".to_string()],
        &projects,
        &people,
        &executors
      )
      .is_err()
    );
  }

  #[test]
  fn filter_tasks_keeps_input_order() {
    let tasks = vec![
      task(
        "a",
        Some("p2"),
        Some("u1"),
        None
      ),
      task(
        "b",
        Some("p9"),
        Some("u1"),
        None
      ),
      task(
        "c",
        Some("p1"),
        Some("u1"),
        Some("e1")
      ),
    ];
    let sel = selection();
    let kept: Vec<&str> =
      filter_tasks(&tasks, Some(&sel))
        .into_iter()
        .map(|t| t.id.as_str())
        .collect();
    assert_eq!(kept, vec!["a", "c"]);
    assert_eq!(
      filter_tasks(&tasks, None).len(),
      3
    );
  }
}
