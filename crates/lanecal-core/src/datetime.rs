use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::sync::OnceLock;

use anyhow::{
  Context,
  anyhow
};
use chrono::{
  Datelike,
  Days,
  Local,
  NaiveDate,
  Utc,
  Weekday
};
use chrono_tz::Tz;
use regex::Regex;
use serde::Deserialize;
use tracing::{
  debug,
  info,
  warn
};

/// Looked up in the working directory unless `LANECAL_TIME_CONFIG` names
/// another file.
const TIME_FILE_NAME: &str =
  "lanecal-time.toml";
const TIME_FILE_ENV: &str =
  "LANECAL_TIME_CONFIG";
const TIMEZONE_ENV: &str =
  "LANECAL_TIMEZONE";

const ISO_FORMAT: &str = "%Y-%m-%d";

/// Accepts `timezone = ".."` at the top level or under `[time]`.
#[derive(Debug, Default, Deserialize)]
struct TimeFile {
  timezone: Option<String>,
  #[serde(default)]
  time:     TimeSection
}

#[derive(Debug, Default, Deserialize)]
struct TimeSection {
  timezone: Option<String>
}

/// Number of days in the month, `month_index` counted from 0.
///
/// Computed as the day before the first of the following month, so leap
/// years need no special casing. Out-of-range indices and years return 0.
#[must_use]
pub fn days_in_month(
  year: i32,
  month_index: u32
) -> u32 {
  match month_index {
    | 0..=10 => {
      NaiveDate::from_ymd_opt(
        year,
        month_index + 2,
        1
      )
      .and_then(|next| next.pred_opt())
      .map_or(0, |last| last.day())
    }
    | 11 => {
      first_of_month(year, 11)
        .map_or(0, |_| 31)
    }
    | _ => 0
  }
}

#[must_use]
pub fn first_of_month(
  year: i32,
  month_index: u32
) -> Option<NaiveDate> {
  NaiveDate::from_ymd_opt(
    year,
    month_index + 1,
    1
  )
}

#[must_use]
pub fn last_of_month(
  year: i32,
  month_index: u32
) -> Option<NaiveDate> {
  NaiveDate::from_ymd_opt(
    year,
    month_index + 1,
    days_in_month(year, month_index)
  )
}

#[must_use]
pub fn iso_format(
  date: NaiveDate
) -> String {
  date.format(ISO_FORMAT).to_string()
}

/// Strict `YYYY-MM-DD` parse, the inverse of [`iso_format`].
pub fn iso_parse(
  input: &str
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let shape_ok = token.len() == 10
    && token
      .char_indices()
      .all(|(idx, c)| match idx {
        | 4 | 7 => c == '-',
        | _ => c.is_ascii_digit()
      });
  if !shape_ok {
    return Err(anyhow!(
      "expected YYYY-MM-DD, got: \
       {token}"
    ));
  }

  NaiveDate::parse_from_str(
    token, ISO_FORMAT
  )
  .with_context(|| {
    format!("invalid date: {token}")
  })
}

/// `DD/MM/YYYY`, the form shown in task details.
#[must_use]
pub fn format_display(
  date: NaiveDate
) -> String {
  date.format("%d/%m/%Y").to_string()
}

#[must_use]
pub fn is_weekend(
  year: i32,
  month_index: u32,
  day: u32
) -> bool {
  NaiveDate::from_ymd_opt(
    year,
    month_index + 1,
    day
  )
  .map(|date| {
    let dow = date
      .weekday()
      .num_days_from_sunday();
    dow == 0 || dow == 6
  })
  .unwrap_or(false)
}

/// Monday=0 .. Sunday=6, for grids whose first column is Monday.
#[must_use]
pub fn weekday_index_monday_first(
  year: i32,
  month_index: u32,
  day: u32
) -> Option<u32> {
  NaiveDate::from_ymd_opt(
    year,
    month_index + 1,
    day
  )
  .map(|date| {
    date
      .weekday()
      .num_days_from_monday()
  })
}

/// Calendar-correct day shift. Saturates at the representable range.
#[must_use]
pub fn add_days(
  date: NaiveDate,
  n: i64
) -> NaiveDate {
  let magnitude = Days::new(
    n.unsigned_abs()
  );
  let shifted = if n >= 0 {
    date.checked_add_days(magnitude)
  } else {
    date.checked_sub_days(magnitude)
  };
  shifted.unwrap_or(if n >= 0 {
    NaiveDate::MAX
  } else {
    NaiveDate::MIN
  })
}

pub fn add_days_iso(
  iso: &str,
  n: i64
) -> anyhow::Result<String> {
  let date = iso_parse(iso)?;
  Ok(iso_format(add_days(date, n)))
}

/// `|end - start|` in days, both endpoints counted.
#[must_use]
pub fn diff_days_inclusive(
  start: NaiveDate,
  end: NaiveDate
) -> i64 {
  (end - start).num_days().abs() + 1
}

/// The configured project zone, resolved once per process.
pub fn project_timezone() -> Option<Tz>
{
  static ZONE: OnceLock<Option<Tz>> =
    OnceLock::new();
  *ZONE.get_or_init(detect_timezone)
}

/// Today's calendar date in the project timezone, or the machine's local
/// zone when none is configured.
#[must_use]
pub fn today() -> NaiveDate {
  match project_timezone() {
    | Some(tz) => {
      Utc::now()
        .with_timezone(&tz)
        .date_naive()
    }
    | None => Local::now().date_naive()
  }
}

fn detect_timezone() -> Option<Tz> {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV)
  {
    match parse_tz_id(&raw) {
      | Ok(tz) => {
        info!(source = TIMEZONE_ENV, timezone = %tz, "project timezone");
        return Some(tz);
      }
      | Err(err) => {
        warn!(source = TIMEZONE_ENV, error = %err, "ignoring timezone");
      }
    }
  }

  let path = time_file_path()?;
  match read_time_file(&path) {
    | Ok(Some(tz)) => {
      info!(file = %path.display(), timezone = %tz, "project timezone");
      Some(tz)
    }
    | Ok(None) => None,
    | Err(err) => {
      warn!(file = %path.display(), error = %format!("{err:#}"), "ignoring timezone file");
      None
    }
  }
}

fn time_file_path() -> Option<PathBuf>
{
  match std::env::var(TIME_FILE_ENV) {
    | Ok(raw) if !raw.trim().is_empty() => {
      Some(PathBuf::from(raw.trim()))
    }
    | _ => {
      std::env::current_dir()
        .ok()
        .map(|dir| {
          dir.join(TIME_FILE_NAME)
        })
    }
  }
}

/// `Ok(None)` when the file is absent or names no zone.
fn read_time_file(
  path: &Path
) -> anyhow::Result<Option<Tz>> {
  if !path.is_file() {
    debug!(file = %path.display(), "no timezone file");
    return Ok(None);
  }

  let raw = fs::read_to_string(path)
    .with_context(|| {
      format!(
        "cannot read {}",
        path.display()
      )
    })?;
  let file: TimeFile =
    toml::from_str(&raw)
      .with_context(|| {
        format!(
          "cannot parse {}",
          path.display()
        )
      })?;

  file
    .timezone
    .or(file.time.timezone)
    .map(|id| parse_tz_id(&id))
    .transpose()
}

fn parse_tz_id(
  raw: &str
) -> anyhow::Result<Tz> {
  let id = raw.trim();
  id.parse::<Tz>().map_err(|err| {
    anyhow!(
      "unknown timezone {id:?}: {err}"
    )
  })
}

/// Resolves a command-line date relative to `today`: `today`,
/// `tomorrow`, `yesterday`, a weekday name (its next occurrence), `+Nd`,
/// `-Nd`, `+Nw`, `-Nw`, or `YYYY-MM-DD`.
#[tracing::instrument(skip(today))]
pub fn parse_date_expr(
  input: &str,
  today: NaiveDate
) -> anyhow::Result<NaiveDate> {
  let token = input.trim();
  let lower =
    token.to_ascii_lowercase();

  let keyword = match lower.as_str() {
    | "today" => Some(0),
    | "tomorrow" => Some(1),
    | "yesterday" => Some(-1),
    | _ => relative_days(&lower)?
  };
  if let Some(days) = keyword {
    return Ok(add_days(today, days));
  }

  if let Ok(target) =
    lower.parse::<Weekday>()
  {
    return Ok(next_weekday(
      today, target
    ));
  }

  iso_parse(token).with_context(|| {
    format!(
      "unrecognised date {token:?} \
       (today, tomorrow, yesterday, \
       a weekday, +3d, -2w or \
       YYYY-MM-DD)"
    )
  })
}

/// `+Nd` / `-Nw` style offsets in days.
fn relative_days(
  token: &str
) -> anyhow::Result<Option<i64>> {
  static PATTERN: OnceLock<
    Result<Regex, regex::Error>
  > = OnceLock::new();
  let pattern = PATTERN
    .get_or_init(|| {
      Regex::new(
        r"^([+-])(\d{1,6})([dw])$"
      )
    })
    .as_ref()
    .map_err(|err| {
      anyhow!(
        "relative date pattern: {err}"
      )
    })?;

  let Some(caps) =
    pattern.captures(token)
  else {
    return Ok(None);
  };
  let (_, [sign, amount, unit]) =
    caps.extract();
  let amount: i64 = amount
    .parse()
    .context("relative amount")?;
  let days = match unit {
    | "w" => amount * 7,
    | _ => amount
  };
  Ok(Some(if sign == "-" {
    -days
  } else {
    days
  }))
}

/// The first `target` strictly after `from`.
fn next_weekday(
  from: NaiveDate,
  target: Weekday
) -> NaiveDate {
  let ahead = (target
    .num_days_from_monday()
    + 7
    - from
      .weekday()
      .num_days_from_monday())
    % 7;
  let ahead =
    if ahead == 0 { 7 } else { ahead };
  add_days(from, i64::from(ahead))
}

pub mod iso_date_serde {
  use chrono::NaiveDate;
  use serde::{
    Deserialize,
    Deserializer,
    Serializer
  };

  pub fn serialize<S>(
    date: &NaiveDate,
    serializer: S
  ) -> Result<S::Ok, S::Error>
  where
    S: Serializer
  {
    serializer.serialize_str(
      &super::iso_format(*date)
    )
  }

  pub fn deserialize<'de, D>(
    deserializer: D
  ) -> Result<NaiveDate, D::Error>
  where
    D: Deserializer<'de>
  {
    let raw = String::deserialize(
      deserializer
    )?;
    super::iso_parse(&raw)
      .map_err(serde::de::Error::custom)
  }
}
