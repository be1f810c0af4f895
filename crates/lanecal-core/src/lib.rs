pub mod calendar;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod filter;
pub mod layout;
pub mod render;
pub mod store;
pub mod task;
pub mod window;

use std::ffi::OsString;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

use crate::calendar::Calendar;
use crate::config::Config;
use crate::datastore::DataStore;

/// Entry point shared by the `lanecal` binary.
#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let args = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );
  cli::init_tracing(
    args.verbose,
    args.quiet
  )?;
  debug!(
    positional = pre.rc_overrides.len(),
    flagged = args.rc_overrides.len(),
    "rc overrides"
  );

  let mut cfg = Config::load(
    args.lanecalrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre
      .rc_overrides
      .into_iter()
      .chain(args.rc_overrides)
  );

  let mut calendar = open_calendar(
    &cfg,
    args.data.as_deref()
  )?;
  let renderer =
    render::Renderer::new(&cfg)?;
  let invocation =
    cli::Invocation::parse(
      &cfg, args.rest
    )?;
  info!(command = %invocation.command, "dispatching");

  let stdout = std::io::stdout();
  let mut out = stdout.lock();
  commands::dispatch(
    &mut calendar,
    &renderer,
    invocation,
    &mut out
  )?;
  out
    .flush()
    .context("flushing output")
}

fn open_calendar(
  cfg: &Config,
  data_override: Option<&Path>
) -> anyhow::Result<Calendar<DataStore>>
{
  let dir = config::resolve_data_dir(
    cfg,
    data_override
  )?;
  let store = DataStore::open(&dir)
    .with_context(|| {
      format!(
        "opening data in {}",
        dir.display()
      )
    })?;
  Ok(Calendar::new(store))
}
