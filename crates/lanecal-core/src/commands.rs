use std::fs;
use std::io::{self, Read, Write};

use anyhow::{Context, anyhow};
use chrono::NaiveDate;
use tracing::{debug, info, instrument, warn};

use crate::calendar::Calendar;
use crate::cli::Invocation;
use crate::datastore::DataStore;
use crate::datetime::{parse_date_expr, today};
use crate::filter::FilterSelection;
use crate::render::Renderer;
use crate::store::DataAccess;
use crate::task::{NewTask, TaskPatch};
use crate::window::{Window, rolling_title};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "month", "year", "rolling", "list", "info", "add", "modify", "move", "delete", "project",
        "person", "executor", "export", "import", "help", "version",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[instrument(skip(calendar, renderer, inv, out))]
pub fn dispatch<W: Write>(
    calendar: &mut Calendar<DataStore>,
    renderer: &Renderer,
    inv: Invocation,
    out: &mut W,
) -> anyhow::Result<()> {
    let command = inv.command.as_str();
    let args = &inv.command_args;
    let today = today();

    debug!(
        command,
        filter = ?inv.filter_terms,
        args = ?args,
        "dispatching command"
    );

    if !inv.filter_terms.is_empty() {
        let store = calendar.store();
        let selection = FilterSelection::from_terms(
            &inv.filter_terms,
            store.projects(),
            store.people(),
            store.executors(),
        )?;
        calendar.set_selection(Some(selection));
    }

    match command {
        "month" => cmd_month(calendar, renderer, args, today, out),
        "year" => cmd_year(calendar, renderer, args, today, out),
        "rolling" => cmd_rolling(calendar, renderer, args, today, out),
        "list" => cmd_list(calendar, renderer, out),
        "info" => cmd_info(calendar, renderer, args, out),
        "add" => cmd_add(calendar, args, today, out),
        "modify" => cmd_modify(calendar, args, today, out),
        "move" => cmd_move(calendar, args, today, out),
        "delete" => cmd_delete(calendar, args, out),
        "project" => cmd_project(calendar, renderer, args, out),
        "person" | "executor" => cmd_named(calendar, renderer, command, args, out),
        "export" => cmd_export(calendar, args, out),
        "import" => cmd_import(calendar, args, out),
        "help" => cmd_help(out),
        "version" => {
            writeln!(out, "{}", env!("CARGO_PKG_VERSION"))?;
            Ok(())
        }
        other => Err(anyhow!("unknown command: {other}")),
    }
}

/// `YYYY-MM`, or any date expression naming a day inside the month.
fn parse_window_arg(args: &[String], today: NaiveDate) -> anyhow::Result<Window> {
    match args.first() {
        None => Ok(Window::containing(today)),
        Some(raw) => Window::parse(raw)
            .or_else(|_| parse_date_expr(raw, today).map(Window::containing))
            .with_context(|| format!("invalid month: {raw}")),
    }
}

#[instrument(skip(calendar, renderer, args, today, out))]
fn cmd_month<W: Write>(
    calendar: &Calendar<DataStore>,
    renderer: &Renderer,
    args: &[String],
    today: NaiveDate,
    out: &mut W,
) -> anyhow::Result<()> {
    let window = parse_window_arg(args, today)?;
    info!(window = %window, "command month");

    let row = calendar.month_row(window, false);
    let placed: Vec<_> = row
        .layout
        .placements
        .iter()
        .filter_map(|placement| calendar.store().task(&placement.task_id))
        .collect();
    let title = format!("{} {}", window.name(), window.year());

    renderer.write_months(out, &title, std::slice::from_ref(&row), calendar.store())?;
    if !placed.is_empty() {
        writeln!(out)?;
        renderer.write_task_table(out, &placed, calendar.store())?;
    }
    Ok(())
}

#[instrument(skip(calendar, renderer, args, today, out))]
fn cmd_year<W: Write>(
    calendar: &Calendar<DataStore>,
    renderer: &Renderer,
    args: &[String],
    today: NaiveDate,
    out: &mut W,
) -> anyhow::Result<()> {
    let year = match args.first() {
        Some(raw) => raw
            .trim()
            .parse::<i32>()
            .with_context(|| format!("invalid year: {raw}"))?,
        None => Window::containing(today).year(),
    };
    info!(year, "command year");

    let rows = calendar.year_rows(year)?;
    renderer.write_months(out, &year.to_string(), &rows, calendar.store())?;
    renderer.write_legend(out, calendar.store().projects())
}

#[instrument(skip(calendar, renderer, args, today, out))]
fn cmd_rolling<W: Write>(
    calendar: &Calendar<DataStore>,
    renderer: &Renderer,
    args: &[String],
    today: NaiveDate,
    out: &mut W,
) -> anyhow::Result<()> {
    let start = parse_window_arg(args, today)?;
    info!(start = %start, "command rolling");

    let rows = calendar.rolling_rows(start)?;
    renderer.write_months(out, &rolling_title(start)?, &rows, calendar.store())?;
    renderer.write_legend(out, calendar.store().projects())
}

#[instrument(skip(calendar, renderer, out))]
fn cmd_list<W: Write>(
    calendar: &Calendar<DataStore>,
    renderer: &Renderer,
    out: &mut W,
) -> anyhow::Result<()> {
    let mut tasks = calendar.visible_tasks();
    tasks.sort_by(|a, b| {
        a.start_date
            .cmp(&b.start_date)
            .then_with(|| a.title.cmp(&b.title))
    });
    info!(count = tasks.len(), "command list");

    if tasks.is_empty() {
        writeln!(out, "No matches.")?;
        return Ok(());
    }
    renderer.write_task_table(out, &tasks, calendar.store())
}

#[instrument(skip(calendar, renderer, args, out))]
fn cmd_info<W: Write>(
    calendar: &Calendar<DataStore>,
    renderer: &Renderer,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    let id = resolve_task_id(calendar.store(), first_arg(args, "info")?)?;
    let details = calendar.task_details(&id)?;
    renderer.write_task_details(out, &details)
}

#[instrument(skip(calendar, args, today, out))]
fn cmd_add<W: Write>(
    calendar: &mut Calendar<DataStore>,
    args: &[String],
    today: NaiveDate,
    out: &mut W,
) -> anyhow::Result<()> {
    info!("command add");

    let (title, mods) = parse_title_and_mods(args, today)?;
    if title.is_empty() {
        return Err(anyhow!("add: title is required"));
    }

    let mut new = NewTask {
        title,
        ..NewTask::default()
    };
    for one_mod in mods {
        let one_mod = resolve_mod_refs(calendar.store(), one_mod);
        match one_mod {
            Mod::Start(date) => new.start_date = Some(date),
            Mod::End(date) => new.end_date = Some(date),
            Mod::Project(id) => new.project_id = id,
            Mod::Person(id) => new.person_id = id,
            Mod::Executor(id) => new.executor_id = id,
            Mod::Comments(text) => new.comments = text,
            Mod::Location(text) => new.location = text,
        }
    }

    let task = calendar.store_mut().add_task(new)?;
    writeln!(out, "Created task {}.", task.id)?;
    Ok(())
}

#[instrument(skip(calendar, args, today, out))]
fn cmd_modify<W: Write>(
    calendar: &mut Calendar<DataStore>,
    args: &[String],
    today: NaiveDate,
    out: &mut W,
) -> anyhow::Result<()> {
    let id = resolve_task_id(calendar.store(), first_arg(args, "modify")?)?;
    info!(task = %id, "command modify");

    let (title, mods) = parse_title_and_mods(&args[1..], today)?;
    let mut patch = TaskPatch::default();
    if !title.is_empty() {
        patch.title = Some(title);
    }
    for one_mod in mods {
        let one_mod = resolve_mod_refs(calendar.store(), one_mod);
        match one_mod {
            Mod::Start(date) => patch.start_date = Some(date),
            Mod::End(date) => patch.end_date = Some(date),
            Mod::Project(value) => patch.project_id = Some(value),
            Mod::Person(value) => patch.person_id = Some(value),
            Mod::Executor(value) => patch.executor_id = Some(value),
            Mod::Comments(value) => patch.comments = Some(value),
            Mod::Location(value) => patch.location = Some(value),
        }
    }

    if patch.is_empty() {
        return Err(anyhow!("modify: nothing to change"));
    }

    let task = calendar.store_mut().update_task(&id, &patch)?;
    writeln!(out, "Modified task {}.", task.id)?;
    Ok(())
}

#[instrument(skip(calendar, args, today, out))]
fn cmd_move<W: Write>(
    calendar: &mut Calendar<DataStore>,
    args: &[String],
    today: NaiveDate,
    out: &mut W,
) -> anyhow::Result<()> {
    let id = resolve_task_id(calendar.store(), first_arg(args, "move")?)?;
    let raw_date = args
        .get(1)
        .ok_or_else(|| anyhow!("move: a new start date is required"))?;
    let new_start = parse_date_expr(raw_date, today)?;

    let task = calendar.move_task(&id, new_start)?;
    writeln!(
        out,
        "Moved task {} to {} - {}.",
        task.id, task.start_date, task.end_date
    )?;
    Ok(())
}

#[instrument(skip(calendar, args, out))]
fn cmd_delete<W: Write>(
    calendar: &mut Calendar<DataStore>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    let id = resolve_task_id(calendar.store(), first_arg(args, "delete")?)?;
    calendar.store_mut().delete_task(&id)?;
    writeln!(out, "Deleted task {id}.")?;
    Ok(())
}

#[instrument(skip(calendar, renderer, args, out))]
fn cmd_project<W: Write>(
    calendar: &mut Calendar<DataStore>,
    renderer: &Renderer,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    let action = args.first().map(String::as_str).unwrap_or("list");
    let rest = args.get(1..).unwrap_or_default();
    let (words, color) = split_color(rest);

    match action {
        "list" => renderer.write_projects(out, calendar.store().projects()),
        "add" => {
            let project = calendar
                .store_mut()
                .add_project(&words.join(" "), color.as_deref())?;
            writeln!(out, "Created project {}.", project.id)?;
            Ok(())
        }
        "modify" => {
            let (id, name) = words
                .split_first()
                .ok_or_else(|| anyhow!("project modify: an id is required"))?;
            let id = resolve_project_id(calendar.store(), id)?;
            let name = (!name.is_empty()).then(|| name.join(" "));
            let project = calendar
                .store_mut()
                .update_project(&id, name.as_deref(), color.as_deref())?;
            writeln!(out, "Modified project {}.", project.id)?;
            Ok(())
        }
        "delete" => {
            let raw = words
                .first()
                .ok_or_else(|| anyhow!("project delete: an id is required"))?;
            let id = resolve_project_id(calendar.store(), raw)?;
            calendar.store_mut().delete_project(&id)?;
            writeln!(out, "Deleted project {id}.")?;
            Ok(())
        }
        other => Err(anyhow!("unknown project action: {other}")),
    }
}

/// `person` and `executor` subcommands: both collections hold bare names.
#[instrument(skip(calendar, renderer, args, out))]
fn cmd_named<W: Write>(
    calendar: &mut Calendar<DataStore>,
    renderer: &Renderer,
    kind: &str,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    let action = args.first().map(String::as_str).unwrap_or("list");
    let rest = args.get(1..).unwrap_or_default();
    let is_person = kind == "person";
    let store = calendar.store_mut();

    let ids: Vec<String> = if is_person {
        store.people().iter().map(|p| p.id.clone()).collect()
    } else {
        store.executors().iter().map(|e| e.id.clone()).collect()
    };

    match action {
        "list" => {
            if is_person {
                renderer.write_names(
                    out,
                    store.people().iter().map(|p| (p.id.as_str(), p.name.as_str())),
                )
            } else {
                renderer.write_names(
                    out,
                    store.executors().iter().map(|e| (e.id.as_str(), e.name.as_str())),
                )
            }
        }
        "add" => {
            let name = rest.join(" ");
            let id = if is_person {
                store.add_person(&name)?.id
            } else {
                store.add_executor(&name)?.id
            };
            writeln!(out, "Created {kind} {id}.")?;
            Ok(())
        }
        "modify" => {
            let (raw, name) = rest
                .split_first()
                .ok_or_else(|| anyhow!("{kind} modify: an id is required"))?;
            let id = resolve_entity_id(ids.iter().map(String::as_str), raw, kind)?;
            let name = name.join(" ");
            if is_person {
                store.update_person(&id, &name)?;
            } else {
                store.update_executor(&id, &name)?;
            }
            writeln!(out, "Modified {kind} {id}.")?;
            Ok(())
        }
        "delete" => {
            let raw = rest
                .first()
                .ok_or_else(|| anyhow!("{kind} delete: an id is required"))?;
            let id = resolve_entity_id(ids.iter().map(String::as_str), raw, kind)?;
            if is_person {
                store.delete_person(&id)?;
            } else {
                store.delete_executor(&id)?;
            }
            writeln!(out, "Deleted {kind} {id}.")?;
            Ok(())
        }
        other => Err(anyhow!("unknown {kind} action: {other}")),
    }
}

/// `export` writes the matching tasks; `export backup` writes every
/// collection, ignoring the filter.
#[instrument(skip(calendar, args, out))]
fn cmd_export<W: Write>(
    calendar: &Calendar<DataStore>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    let json = match args.first().map(String::as_str) {
        None | Some("tasks") => {
            let tasks = calendar.visible_tasks();
            info!(count = tasks.len(), "command export");
            serde_json::to_string_pretty(&tasks).context("failed to serialize tasks")?
        }
        Some("backup") => {
            let backup = calendar.store().backup();
            info!(tasks = backup.tasks.len(), "command export backup");
            serde_json::to_string_pretty(&backup).context("failed to serialize backup")?
        }
        Some(other) => return Err(anyhow!("unknown export kind: {other}")),
    };
    writeln!(out, "{json}")?;
    Ok(())
}

/// `import [tasks|projects|backup] [FILE]`; reads stdin when no file is named.
#[instrument(skip(calendar, args, out))]
fn cmd_import<W: Write>(
    calendar: &mut Calendar<DataStore>,
    args: &[String],
    out: &mut W,
) -> anyhow::Result<()> {
    let (kind, rest) = match args.split_first() {
        Some((first, rest)) if ["tasks", "projects", "backup"].contains(&first.as_str()) => {
            (first.as_str(), rest)
        }
        _ => ("tasks", args),
    };

    let raw = match rest.first() {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?
        }
        None => {
            let mut input = String::new();
            io::stdin()
                .read_to_string(&mut input)
                .context("failed to read import data from stdin")?;
            input
        }
    };

    let store = calendar.store_mut();
    let summary = match kind {
        "backup" => {
            let restored = store.restore(&raw)?;
            writeln!(
                out,
                "Restored {} tasks, {} projects, {} people, {} executors.",
                restored.tasks.len(),
                restored.projects.len(),
                restored.people.len(),
                restored.executors.len()
            )?;
            return Ok(());
        }
        "projects" => store.import_projects(&raw)?,
        _ => store.import_tasks(&raw)?,
    };

    writeln!(
        out,
        "Imported {} added, {} updated, {} skipped.",
        summary.added, summary.updated, summary.skipped
    )?;
    Ok(())
}

fn cmd_help<W: Write>(out: &mut W) -> anyhow::Result<()> {
    writeln!(
        out,
        "lanecal [filter] <command> [args]\n\
         \n\
         filter:   project:ID[,ID] person:ID[,ID] executor:ID[,ID]\n\
         \n\
         month [YYYY-MM]          one month with its lanes\n\
         year [YYYY]              January to December\n\
         rolling [YYYY-MM]        twelve months from the given month\n\
         list                     matching tasks by start date\n\
         info <id>                task details\n\
         add <title> start:D [end:D project:ID person:ID executor:ID\n\
         \x20   comments:TEXT location:TEXT]\n\
         modify <id> [title] [mods]\n\
         move <id> <date>         keep the length, change the start\n\
         delete <id>\n\
         project add|modify|delete|list [name] [color:#rrggbb]\n\
         person add|modify|delete|list\n\
         executor add|modify|delete|list\n\
         export [backup]          matching tasks, or every collection, as JSON\n\
         import [projects] [FILE] JSON array or JSON lines (stdin by default)\n\
         import backup [FILE]     replace all data with an exported backup"
    )?;
    Ok(())
}

fn first_arg<'a>(args: &'a [String], command: &str) -> anyhow::Result<&'a str> {
    args.first()
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{command}: a task id is required"))
}

fn resolve_task_id<S: DataAccess>(store: &S, token: &str) -> anyhow::Result<String> {
    resolve_entity_id(store.tasks().iter().map(|t| t.id.as_str()), token, "task")
}

fn resolve_project_id<S: DataAccess>(store: &S, token: &str) -> anyhow::Result<String> {
    resolve_entity_id(store.projects().iter().map(|p| p.id.as_str()), token, "project")
}

/// Exact id, or a prefix matching exactly one id.
fn resolve_entity_id<'a>(
    ids: impl Iterator<Item = &'a str>,
    token: &str,
    kind: &str,
) -> anyhow::Result<String> {
    let mut matches = Vec::new();
    for id in ids {
        if id == token {
            return Ok(id.to_string());
        }
        if id.starts_with(token) {
            matches.push(id);
        }
    }

    match matches.as_slice() {
        [only] => Ok((*only).to_string()),
        [] => Err(anyhow!("{kind} not found: {token}")),
        _ => Err(anyhow!("ambiguous {kind} id prefix: {token}")),
    }
}

fn split_color(args: &[String]) -> (Vec<String>, Option<String>) {
    let mut words = Vec::new();
    let mut color = None;
    for arg in args {
        match arg.strip_prefix("color:") {
            Some(value) => color = Some(value.to_string()),
            None => words.push(arg.clone()),
        }
    }
    (words, color)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Mod {
    Start(NaiveDate),
    End(NaiveDate),
    Project(Option<String>),
    Person(Option<String>),
    Executor(Option<String>),
    Comments(Option<String>),
    Location(Option<String>),
}

#[instrument(skip(args, today))]
fn parse_title_and_mods(
    args: &[String],
    today: NaiveDate,
) -> anyhow::Result<(String, Vec<Mod>)> {
    let mut title_parts = Vec::new();
    let mut mods = Vec::new();

    let mut literal = false;
    for arg in args {
        if arg == "--" {
            literal = true;
            continue;
        }

        if !literal && let Some(one_mod) = parse_one_mod(arg, today)? {
            mods.push(one_mod);
            continue;
        }

        title_parts.push(arg.clone());
    }

    Ok((title_parts.join(" "), mods))
}

fn parse_one_mod(tok: &str, today: NaiveDate) -> anyhow::Result<Option<Mod>> {
    let Some((key, value)) = tok.split_once(':') else {
        return Ok(None);
    };
    let text = {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    };

    let one_mod = match key.to_ascii_lowercase().as_str() {
        "start" => Mod::Start(parse_date_expr(value, today)?),
        "end" => Mod::End(parse_date_expr(value, today)?),
        "project" | "proj" => Mod::Project(text),
        "person" | "responsible" => Mod::Person(text),
        "executor" | "exec" => Mod::Executor(text),
        "comments" | "comment" => Mod::Comments(text),
        "location" | "loc" => Mod::Location(text),
        _ => return Ok(None),
    };
    Ok(Some(one_mod))
}

/// Lets references be given by a unique id prefix. Unknown references are
/// kept as typed, since a task may point at an entity that no longer exists.
fn resolve_mod_refs<S: DataAccess>(store: &S, one_mod: Mod) -> Mod {
    fn expand<'a>(
        ids: impl Iterator<Item = &'a str>,
        value: Option<String>,
        kind: &str,
    ) -> Option<String> {
        let raw = value?;
        match resolve_entity_id(ids, &raw, kind) {
            Ok(id) => Some(id),
            Err(err) => {
                warn!(reference = %raw, error = %err, "keeping unresolved reference");
                Some(raw)
            }
        }
    }

    match one_mod {
        Mod::Project(value) => Mod::Project(expand(
            store.projects().iter().map(|p| p.id.as_str()),
            value,
            "project",
        )),
        Mod::Person(value) => Mod::Person(expand(
            store.people().iter().map(|p| p.id.as_str()),
            value,
            "person",
        )),
        Mod::Executor(value) => Mod::Executor(expand(
            store.executors().iter().map(|e| e.id.as_str()),
            value,
            "executor",
        )),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use tempfile::tempdir;

    use super::{Mod, dispatch, expand_command_abbrev, known_command_names, parse_title_and_mods};
    use crate::calendar::Calendar;
    use crate::cli::Invocation;
    use crate::datastore::DataStore;
    use crate::render::Renderer;
    use crate::store::DataAccess;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn run(
        calendar: &mut Calendar<DataStore>,
        filter: &[&str],
        command: &str,
        args: &[&str],
    ) -> String {
        let inv = Invocation {
            filter_terms: filter.iter().map(|s| s.to_string()).collect(),
            command: command.to_string(),
            command_args: args.iter().map(|s| s.to_string()).collect(),
        };
        let mut out = Vec::new();
        dispatch(calendar, &Renderer::plain(), inv, &mut out)
            .expect("dispatch");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn abbreviations_must_be_unambiguous() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("mon", &known), Some("month"));
        assert_eq!(expand_command_abbrev("ro", &known), Some("rolling"));
        assert_eq!(expand_command_abbrev("mo", &known), None);
        assert_eq!(expand_command_abbrev("e", &known), None);
        assert_eq!(expand_command_abbrev("exe", &known), Some("executor"));
    }

    #[test]
    fn title_words_and_modifiers_split() {
        let args: Vec<String> = [
            "Pour",
            "slab",
            "start:2024-02-01",
            "location:",
            "--",
            "end:soon",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let (title, mods) = parse_title_and_mods(&args, date(2024, 1, 1)).expect("parse");
        assert_eq!(title, "Pour slab end:soon");
        assert_eq!(mods, vec![Mod::Start(date(2024, 2, 1)), Mod::Location(None)]);
    }

    #[test]
    fn add_modify_move_and_delete() {
        let temp = tempdir().expect("tempdir");
        let mut calendar = Calendar::new(DataStore::open(temp.path()).expect("open"));

        let out = run(&mut calendar, &[], "project", &["add", "Obra", "Norte", "color:#336699"]);
        assert!(out.starts_with("Created project "));
        let project_id = calendar.store().projects()[0].id.clone();

        let project_ref = format!("project:{}", &project_id[..6]);
        run(
            &mut calendar,
            &[],
            "add",
            &["Cimentación", "start:2024-01-25", "end:2024-02-05", &project_ref],
        );
        let task = calendar.store().tasks()[0].clone();
        assert_eq!(task.project_id.as_deref(), Some(project_id.as_str()));
        assert_eq!(task.title, "Cimentación");

        run(&mut calendar, &[], "modify", &[&task.id, "location:Parcela 4"]);
        run(&mut calendar, &[], "move", &[&task.id[..8], "2024-02-25"]);
        let moved = calendar.store().task(&task.id).expect("task").clone();
        assert_eq!(moved.location.as_deref(), Some("Parcela 4"));
        assert_eq!(moved.start_date, date(2024, 2, 25));
        assert_eq!(moved.end_date, date(2024, 3, 7));

        let info = run(&mut calendar, &[], "info", &[&task.id]);
        assert!(info.contains("project   Obra Norte (#336699)"));
        assert!(info.contains("start     25/02/2024"));

        run(&mut calendar, &[], "delete", &[&task.id]);
        assert!(calendar.store().tasks().is_empty());
    }

    #[test]
    fn filter_terms_narrow_listing() {
        let temp = tempdir().expect("tempdir");
        let mut calendar = Calendar::new(DataStore::open(temp.path()).expect("open"));
        run(&mut calendar, &[], "project", &["add", "Obra"]);
        run(&mut calendar, &[], "person", &["add", "Ana"]);
        run(&mut calendar, &[], "person", &["add", "Luis"]);
        let project = format!("project:{}", calendar.store().projects()[0].id);
        let ana = calendar.store().people()[0].id.clone();
        let luis = calendar.store().people()[1].id.clone();
        let with_ana = format!("person:{ana}");
        let with_luis = format!("person:{luis}");
        run(&mut calendar, &[], "add", &["Muro", "start:2024-03-01", &project, &with_ana]);
        run(&mut calendar, &[], "add", &["Techo", "start:2024-03-02", &project, &with_luis]);

        let all = run(&mut calendar, &[], "list", &[]);
        assert!(all.contains("Muro") && all.contains("Techo"));

        let mut filtered = Calendar::new(calendar.into_store());
        let only_ana = run(&mut filtered, &[&with_ana], "list", &[]);
        assert!(only_ana.contains("Muro"));
        assert!(!only_ana.contains("Techo"));

        // Tasks without a project never match an explicit filter.
        run(&mut filtered, &[], "add", &["Suelto", "start:2024-03-03", &with_ana]);
        let again = run(&mut filtered, &[&with_ana], "list", &[]);
        assert!(!again.contains("Suelto"));
    }

    #[test]
    fn month_view_lists_placed_tasks() {
        let temp = tempdir().expect("tempdir");
        let mut calendar = Calendar::new(DataStore::open(temp.path()).expect("open"));
        run(&mut calendar, &[], "add", &["Muro", "start:2024-02-03", "end:2024-02-09"]);

        let out = run(&mut calendar, &[], "month", &["2024-02"]);
        assert!(out.starts_with("Febrero 2024\n"));
        assert!(out.contains("[Muro="));
        assert!(out.contains("2024-02-09"));

        let empty = run(&mut calendar, &[], "month", &["2024-05"]);
        assert_eq!(empty.lines().count(), 3);
    }

    #[test]
    fn import_reads_a_file_argument() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("export.json");
        std::fs::write(
            &path,
            r#"[{"id":"t1","description":"Zanja","startDate":"2024-04-02","endDate":"2024-04-01","projectId":{"id":"p9"}}]"#,
        )
        .expect("write export");

        let data_dir = temp.path().join("data");
        let mut calendar = Calendar::new(DataStore::open(&data_dir).expect("open"));
        let file_arg = path.to_string_lossy().to_string();
        let out = run(&mut calendar, &[], "import", &[&file_arg]);
        assert_eq!(out.trim(), "Imported 1 added, 0 updated, 0 skipped.");

        let task = calendar.store().task("t1").expect("imported");
        assert_eq!(task.project_id.as_deref(), Some("p9"));
        assert_eq!(task.end_date, date(2024, 4, 2));
    }

    #[test]
    fn unknown_ids_are_reported() {
        let temp = tempdir().expect("tempdir");
        let mut calendar = Calendar::new(DataStore::open(temp.path()).expect("open"));
        let inv = Invocation {
            filter_terms: vec![],
            command: "delete".to_string(),
            command_args: vec!["missing".to_string()],
        };
        let mut out = Vec::new();
        let err =
            dispatch(&mut calendar, &Renderer::plain(), inv, &mut out).expect_err("unknown id");
        assert!(err.to_string().contains("task not found"));
    }

    #[test]
    fn year_and_rolling_views_end_with_a_legend() {
        let temp = tempdir().expect("tempdir");
        let mut calendar = Calendar::new(DataStore::open(temp.path()).expect("open"));
        run(&mut calendar, &[], "project", &["add", "Obra", "color:#336699"]);
        run(&mut calendar, &[], "project", &["add", "Diseño"]);

        for (command, arg) in [("year", "2024"), ("rolling", "2024-03")] {
            let out = run(&mut calendar, &[], command, &[arg]);
            let last = out.lines().last().expect("legend line");
            assert!(last.starts_with("Projects"));
            assert!(last.ends_with("■ Obra   ■ Diseño"));
            assert_eq!(out.lines().count(), 15);
        }
    }

    #[test]
    fn year_beyond_the_date_range_is_an_error() {
        let temp = tempdir().expect("tempdir");
        let mut calendar = Calendar::new(DataStore::open(temp.path()).expect("open"));
        run(&mut calendar, &[], "add", &["Muro", "start:2024-02-10", "end:2024-03-05"]);
        run(&mut calendar, &[], "add", &["Techo", "start:2024-05-10", "end:2024-06-02"]);

        for (command, arg) in [("year", "300000"), ("rolling", "262143-06")] {
            let inv = Invocation {
                filter_terms: vec![],
                command: command.to_string(),
                command_args: vec![arg.to_string()],
            };
            let mut out = Vec::new();
            assert!(dispatch(&mut calendar, &Renderer::plain(), inv, &mut out).is_err());
        }
    }

    #[test]
    fn backup_carries_every_collection() {
        let temp = tempdir().expect("tempdir");
        let mut source = Calendar::new(DataStore::open(&temp.path().join("a")).expect("open"));
        run(&mut source, &[], "project", &["add", "Obra", "color:#336699"]);
        run(&mut source, &[], "person", &["add", "Ana"]);
        run(&mut source, &[], "executor", &["add", "Grúas Sur"]);
        let project = format!("project:{}", source.store().projects()[0].id);
        run(&mut source, &[], "add", &["Muro", "start:2024-03-01", &project]);

        let filtered = run(&mut source, &["person:nobody"], "export", &[]);
        assert_eq!(filtered.trim(), "[]");

        let backup = run(&mut source, &["person:nobody"], "export", &["backup"]);
        let path = temp.path().join("backup.json");
        std::fs::write(&path, &backup).expect("write backup");

        let mut target = Calendar::new(DataStore::open(&temp.path().join("b")).expect("open"));
        run(&mut target, &[], "person", &["add", "Sobra"]);
        let file_arg = path.to_string_lossy().to_string();
        let out = run(&mut target, &[], "import", &["backup", &file_arg]);
        assert_eq!(out.trim(), "Restored 1 tasks, 1 projects, 1 people, 1 executors.");
        assert_eq!(target.store().backup(), source.store().backup());

        let reopened = DataStore::open(&temp.path().join("b")).expect("reopen");
        assert_eq!(reopened.executors()[0].name, "Grúas Sur");
    }
}
