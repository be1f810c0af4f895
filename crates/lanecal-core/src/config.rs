use std::collections::BTreeMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

const RC_ENV_VAR: &str = "LANECALRC";
const RC_FILE_NAME: &str = ".lanecalrc";
const MAX_INCLUDE_DEPTH: usize = 8;

/// Built-in settings; every rc file and override layers on top.
const DEFAULTS: [(&str, &str); 3] = [
  ("data.location", "~/.lanecal"),
  ("default.command", "year"),
  ("color", "on")
];

/// One meaningful line of an rc file.
#[derive(Debug, PartialEq, Eq)]
enum RcLine<'a> {
  Include(&'a str),
  Setting(&'a str, &'a str)
}

#[derive(Debug, Clone)]
pub struct Config {
  values:           BTreeMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    Self {
      values:       DEFAULTS
        .iter()
        .map(|(k, v)| {
          (k.to_string(), v.to_string())
        })
        .collect(),
      loaded_files: Vec::new()
    }
  }
}

impl Config {
  /// Defaults, then the rc file chosen by `rc_override`, `LANECALRC`
  /// (`/dev/null` disables it) or `~/.lanecalrc`.
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Self::default();

    match locate_rc(rc_override) {
      | Some(path) => {
        info!(rc = %path.display(), "reading lanecalrc");
        cfg.read_file(&path, 0)?;
      }
      | None => {
        debug!(
          "no lanecalrc; built-in \
           defaults only"
        )
      }
    }

    Ok(cfg)
  }

  /// Later pairs win. A leading `rc.` on the key is dropped.
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (key, value) in overrides {
      let key = key
        .strip_prefix("rc.")
        .map(str::to_string)
        .unwrap_or(key);
      debug!(key = %key, value = %value, "config override");
      self.values.insert(key, value);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.values.get(key).cloned()
  }

  /// `on`/`off` style flags; `None` when unset or unrecognised.
  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    let raw = self.values.get(key)?;
    match raw
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "1" | "y" | "yes" | "on"
      | "true" => Some(true),
      | "0" | "n" | "no" | "off"
      | "false" => Some(false),
      | _ => None
    }
  }

  fn read_file(
    &mut self,
    path: &Path,
    depth: usize
  ) -> anyhow::Result<()> {
    if depth > MAX_INCLUDE_DEPTH {
      return Err(anyhow!(
        "includes nested deeper than \
         {MAX_INCLUDE_DEPTH} at {}",
        path.display()
      ));
    }

    let path = expand_home(path);
    let text = fs::read_to_string(&path)
      .with_context(|| {
        format!(
          "cannot read rc file {}",
          path.display()
        )
      })?;
    self.loaded_files.push(path.clone());

    for (idx, raw) in
      text.lines().enumerate()
    {
      let line = parse_rc_line(raw)
        .with_context(|| {
          format!(
            "{}:{}",
            path.display(),
            idx + 1
          )
        })?;

      match line {
        | None => {}
        | Some(RcLine::Setting(
          key,
          value
        )) => {
          trace!(key, value, "rc setting");
          self.values.insert(
            key.to_string(),
            value.to_string()
          );
        }
        | Some(RcLine::Include(
          target
        )) => {
          let target = include_target(
            &path, target
          );
          if self
            .loaded_files
            .contains(&target)
          {
            warn!(include = %target.display(), "rc file already read; include skipped");
          } else if target.is_file() {
            self.read_file(
              &target,
              depth + 1
            )?;
          } else {
            warn!(include = %target.display(), "missing include skipped");
          }
        }
      }
    }

    Ok(())
  }
}

/// Creates the data directory when missing. `--data` beats
/// `data.location`.
#[tracing::instrument(skip(cfg))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match override_dir {
    | Some(path) => path.to_path_buf(),
    | None => {
      let configured = cfg
        .get("data.location")
        .unwrap_or_else(|| {
          DEFAULTS[0].1.to_string()
        });
      expand_home(Path::new(
        &configured
      ))
    }
  };

  if !dir.is_dir() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "cannot create data \
           directory {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

fn parse_rc_line(
  raw: &str
) -> anyhow::Result<Option<RcLine<'_>>>
{
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();
  if line.is_empty() {
    return Ok(None);
  }

  if let Some(target) =
    line.strip_prefix("include ")
  {
    let target = target.trim();
    if target.is_empty() {
      return Err(anyhow!(
        "include needs a path"
      ));
    }
    return Ok(Some(RcLine::Include(
      target
    )));
  }

  let (key, value) = line
    .split_once('=')
    .ok_or_else(|| {
      anyhow!(
        "expected key = value, got: \
         {raw}"
      )
    })?;
  let key = key.trim();
  if key.is_empty() {
    return Err(anyhow!(
      "empty key in: {raw}"
    ));
  }
  Ok(Some(RcLine::Setting(
    key,
    value.trim()
  )))
}

fn locate_rc(
  rc_override: Option<&Path>
) -> Option<PathBuf> {
  if let Some(path) = rc_override {
    return Some(path.to_path_buf());
  }

  if let Ok(from_env) =
    std::env::var(RC_ENV_VAR)
  {
    return (from_env != "/dev/null")
      .then(|| PathBuf::from(from_env));
  }

  let home = dirs::home_dir()?;
  let candidate = home.join(RC_FILE_NAME);
  candidate
    .is_file()
    .then_some(candidate)
}

/// Relative includes resolve against the including file's directory.
fn include_target(
  including: &Path,
  target: &str
) -> PathBuf {
  let target =
    expand_home(Path::new(target));
  if target.is_absolute() {
    return target;
  }
  including
    .parent()
    .unwrap_or_else(|| Path::new("."))
    .join(target)
}

fn expand_home(
  path: &Path
) -> PathBuf {
  if let Ok(rest) =
    path.strip_prefix("~")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use std::fs;

  use tempfile::tempdir;

  use super::{
    Config,
    RcLine,
    parse_rc_line,
    resolve_data_dir
  };

  #[test]
  fn rc_lines() {
    assert_eq!(
      parse_rc_line("  # only a note")
        .expect("comment"),
      None
    );
    assert_eq!(
      parse_rc_line(
        "color = off # trailing"
      )
      .expect("setting"),
      Some(RcLine::Setting(
        "color", "off"
      ))
    );
    assert_eq!(
      parse_rc_line("include extra.rc")
        .expect("include"),
      Some(RcLine::Include("extra.rc"))
    );
    assert!(
      parse_rc_line("color on").is_err()
    );
    assert!(
      parse_rc_line(" = on").is_err()
    );
  }

  #[test]
  fn file_values_includes_and_overrides()
  {
    let dir =
      tempdir().expect("tempdir");
    fs::write(
      dir.path().join("extra.rc"),
      "color = off\ninclude main.rc\n"
    )
    .expect("write include");
    let rc = dir.path().join("main.rc");
    fs::write(
      &rc,
      "default.command = month\n\
       include extra.rc\n"
    )
    .expect("write rc");

    let mut cfg = Config::load(Some(&rc))
      .expect("load config");
    assert_eq!(
      cfg.get("default.command")
        .as_deref(),
      Some("month")
    );
    assert_eq!(
      cfg.get_bool("color"),
      Some(false)
    );
    assert_eq!(
      cfg.loaded_files.len(),
      2
    );
    assert_eq!(
      cfg.get("data.location")
        .as_deref(),
      Some("~/.lanecal")
    );

    cfg.apply_overrides(vec![
      (
        "rc.color".to_string(),
        "yes".to_string()
      ),
      (
        "default.command".to_string(),
        "rolling".to_string()
      ),
    ]);
    assert_eq!(
      cfg.get_bool("color"),
      Some(true)
    );
    assert_eq!(
      cfg.get("default.command")
        .as_deref(),
      Some("rolling")
    );
  }

  #[test]
  fn bad_line_names_file_and_line() {
    let dir =
      tempdir().expect("tempdir");
    let rc = dir.path().join("bad.rc");
    fs::write(&rc, "\ncolor on\n")
      .expect("write rc");
    let err = Config::load(Some(&rc))
      .expect_err("bad line");
    assert!(
      format!("{err:#}")
        .contains("bad.rc:2")
    );
  }

  #[test]
  fn data_dir_override_is_created() {
    let dir =
      tempdir().expect("tempdir");
    let target =
      dir.path().join("nested/data");
    let resolved = resolve_data_dir(
      &Config::default(),
      Some(&target)
    )
    .expect("resolve");
    assert_eq!(resolved, target);
    assert!(target.is_dir());
  }
}
