use std::fmt;

use anyhow::anyhow;
use chrono::{
  Datelike,
  NaiveDate
};

use crate::datetime::{
  days_in_month,
  first_of_month,
  last_of_month
};

pub const MONTH_NAMES: [&str; 12] = [
  "Enero",
  "Febrero",
  "Marzo",
  "Abril",
  "Mayo",
  "Junio",
  "Julio",
  "Agosto",
  "Septiembre",
  "Octubre",
  "Noviembre",
  "Diciembre"
];

/// Months in a year or rolling view.
pub const VIEW_MONTHS: usize = 12;

/// One calendar month, `month_index` counted from 0.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash
)]
pub struct Window {
  year:        i32,
  month_index: u32
}

impl Window {
  pub fn new(
    year: i32,
    month_index: u32
  ) -> anyhow::Result<Self> {
    if month_index > 11 {
      return Err(anyhow!(
        "month index out of range \
         (0-11): {month_index}"
      ));
    }
    if first_of_month(year, month_index)
      .is_none()
    {
      return Err(anyhow!(
        "year out of range: {year}"
      ));
    }
    Ok(Self {
      year,
      month_index
    })
  }

  #[must_use]
  pub fn containing(
    date: NaiveDate
  ) -> Self {
    Self {
      year:        date.year(),
      month_index: date.month0()
    }
  }

  /// Parses `YYYY-MM` with a 1-based month.
  pub fn parse(
    raw: &str
  ) -> anyhow::Result<Self> {
    let (year, month) = raw
      .trim()
      .split_once('-')
      .ok_or_else(|| {
        anyhow!(
          "expected YYYY-MM, got: {raw}"
        )
      })?;
    let year: i32 =
      year.parse().map_err(|_| {
        anyhow!("invalid year: {year}")
      })?;
    let month: u32 =
      month.parse().map_err(|_| {
        anyhow!(
          "invalid month: {month}"
        )
      })?;
    if !(1..=12).contains(&month) {
      return Err(anyhow!(
        "month out of range (1-12): \
         {month}"
      ));
    }
    Self::new(year, month - 1)
  }

  #[must_use]
  pub fn year(&self) -> i32 {
    self.year
  }

  #[must_use]
  pub fn month_index(&self) -> u32 {
    self.month_index
  }

  #[must_use]
  pub fn days(&self) -> u32 {
    days_in_month(
      self.year,
      self.month_index
    )
  }

  #[must_use]
  pub fn start(&self) -> NaiveDate {
    first_of_month(
      self.year,
      self.month_index
    )
    .unwrap_or(NaiveDate::MIN)
  }

  #[must_use]
  pub fn end(&self) -> NaiveDate {
    last_of_month(
      self.year,
      self.month_index
    )
    .unwrap_or(NaiveDate::MAX)
  }

  #[must_use]
  pub fn name(&self) -> &'static str {
    MONTH_NAMES
      [self.month_index as usize]
  }

  /// The window `months` months away; negative values go back. Fails
  /// when the result leaves the representable date range.
  pub fn shift(
    &self,
    months: i32
  ) -> anyhow::Result<Self> {
    let total = self
      .year
      .checked_mul(12)
      .and_then(|base| {
        base.checked_add(
          self.month_index as i32
        )
      })
      .and_then(|base| {
        base.checked_add(months)
      })
      .ok_or_else(|| {
        anyhow!(
          "month shift out of range: \
           {self} {months:+}"
        )
      })?;
    Self::new(
      total.div_euclid(12),
      total.rem_euclid(12) as u32
    )
  }
}

impl fmt::Display for Window {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    write!(
      f,
      "{:04}-{:02}",
      self.year,
      self.month_index + 1
    )
  }
}

/// January to December of `year`.
pub fn calendar_year(
  year: i32
) -> anyhow::Result<Vec<Window>> {
  rolling(Window::new(year, 0)?)
}

/// Twelve consecutive windows beginning at `start`.
pub fn rolling(
  start: Window
) -> anyhow::Result<Vec<Window>> {
  (0..VIEW_MONTHS as i32)
    .map(|offset| start.shift(offset))
    .collect()
}

/// `"Marzo - Febrero 2025"` within one year, otherwise
/// `"Marzo 2024 - Febrero 2025"`.
pub fn rolling_title(
  start: Window
) -> anyhow::Result<String> {
  let last =
    start.shift(VIEW_MONTHS as i32 - 1)?;
  Ok(if start.year == last.year {
    format!(
      "{} - {} {}",
      start.name(),
      last.name(),
      start.year
    )
  } else {
    format!(
      "{} {} - {} {}",
      start.name(),
      start.year,
      last.name(),
      last.year
    )
  })
}

/// Row label; rolling views append the two-digit year.
#[must_use]
pub fn month_label(
  window: Window,
  rolling: bool
) -> String {
  if rolling {
    format!(
      "{} '{:02}",
      window.name(),
      window.year.rem_euclid(100)
    )
  } else {
    window.name().to_string()
  }
}
