use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::{expand_command_abbrev, known_command_names};
use crate::config::Config;
use crate::filter::Dimension;

/// argv with positional `rc.` overrides pulled out.
#[derive(Debug, Clone, Default)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

fn parse_key_val(raw: &str) -> anyhow::Result<(String, String)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {raw}"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("empty key in: {raw}"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "lanecal",
    version,
    about = "Project task calendar: month, year and rolling lane views",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    /// More log output (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Less log output (-q warnings, -qq errors only).
    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    /// Override one configuration key.
    #[arg(
        long = "rc",
        value_name = "KEY=VALUE",
        value_parser = parse_key_val,
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<(String, String)>,

    /// Read this rc file instead of ~/.lanecalrc.
    #[arg(long = "lanecalrc", value_name = "PATH")]
    pub lanecalrc: Option<PathBuf>,

    /// Data directory, overriding data.location.
    #[arg(long = "data", value_name = "DIR")]
    pub data: Option<PathBuf>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<OsString>,
}

/// Log level implied by the `-q`/`-v` counts when `RUST_LOG` is unset.
fn level_for(verbose: u8, quiet: u8) -> &'static str {
    const LOUDER: [&str; 4] = ["warn", "info", "debug", "trace"];
    match quiet {
        0 => LOUDER[usize::from(verbose.min(3))],
        1 => "warn",
        _ => "error",
    }
}

/// Installs the stderr subscriber. A second call leaves the first in place.
pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let level = level_for(verbose, quiet);
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|err| anyhow!("log filter {level:?}: {err}"))?;

    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
    if installed.is_err() {
        debug!("tracing subscriber already set");
    }
    Ok(())
}

/// `rc.key=value` or `rc.key:value` as a positional token.
fn positional_override(token: &str) -> Option<(String, String)> {
    let rest = token.strip_prefix("rc.")?;
    let (key, value) = rest.split_once('=').or_else(|| rest.split_once(':'))?;
    Some((key.to_string(), value.to_string()))
}

/// Pulls positional rc overrides out of argv, leaving the binary name and
/// every other token in order.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut pre = PreprocessedArgs::default();
    for (idx, arg) in raw.iter().enumerate() {
        let found = (idx > 0)
            .then(|| positional_override(&arg.to_string_lossy()))
            .flatten();
        match found {
            Some((key, value)) => {
                debug!(%key, %value, "positional rc override");
                pre.rc_overrides.push((key, value));
            }
            None => pre.cleaned_args.push(arg.clone()),
        }
    }
    Ok(pre)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub filter_terms: Vec<String>,
    pub command: String,
    pub command_args: Vec<String>,
}

impl Invocation {
    /// Splits tokens into `dimension:ids` filter terms, a command, and its
    /// arguments. Leading filter terms may precede the command.
    #[tracing::instrument(skip(cfg, rest))]
    pub fn parse(cfg: &Config, rest: Vec<OsString>) -> anyhow::Result<Self> {
        let tokens: Vec<String> = rest
            .into_iter()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect();

        let split = tokens
            .iter()
            .position(|tok| !is_filter_term(tok))
            .unwrap_or(tokens.len());
        let filter_terms = tokens[..split].to_vec();

        let Some(first) = tokens.get(split) else {
            let cmd = cfg
                .get("default.command")
                .unwrap_or_else(|| "year".to_string());
            debug!(command = %cmd, "no explicit command, using default");
            return Ok(Self {
                filter_terms,
                command: cmd,
                command_args: vec![],
            });
        };

        let known = known_command_names();
        let command = expand_command_abbrev(first, &known)
            .ok_or_else(|| anyhow!("unknown command: {first}"))?;
        debug!(token = %first, expanded = %command, split_index = split, "resolved command token");

        Ok(Self {
            filter_terms,
            command: command.to_string(),
            command_args: tokens[split + 1..].to_vec(),
        })
    }
}

fn is_filter_term(token: &str) -> bool {
    token
        .split_once(':')
        .is_some_and(|(key, _)| Dimension::from_key(key).is_some())
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;

    use super::{Invocation, level_for, preprocess_args};
    use crate::config::Config;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_removed() {
        let pre = preprocess_args(&os(&[
            "lanecal",
            "rc.color=off",
            "month",
            "rc.data.location:/tmp/x",
        ]))
        .expect("preprocess");
        assert_eq!(pre.cleaned_args, os(&["lanecal", "month"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("color".to_string(), "off".to_string()),
                ("data.location".to_string(), "/tmp/x".to_string()),
            ]
        );
    }

    #[test]
    fn quiet_beats_verbose() {
        assert_eq!(level_for(0, 0), "warn");
        assert_eq!(level_for(2, 0), "debug");
        assert_eq!(level_for(9, 0), "trace");
        assert_eq!(level_for(3, 1), "warn");
        assert_eq!(level_for(0, 2), "error");
    }

    #[test]
    fn filter_terms_precede_command() {
        let cfg = Config::default();
        let inv = Invocation::parse(&cfg, os(&["project:p1,p2", "person:a", "mon", "2024-02"]))
            .expect("parse");
        assert_eq!(inv.filter_terms, vec!["project:p1,p2", "person:a"]);
        assert_eq!(inv.command, "month");
        assert_eq!(inv.command_args, vec!["2024-02"]);
    }

    #[test]
    fn empty_invocation_uses_default_command() {
        let mut cfg = Config::default();
        let inv = Invocation::parse(&cfg, vec![]).expect("parse");
        assert_eq!(inv.command, "year");

        cfg.apply_overrides(vec![("default.command".to_string(), "rolling".to_string())]);
        let inv = Invocation::parse(&cfg, os(&["executor:e1"])).expect("parse");
        assert_eq!(inv.command, "rolling");
        assert_eq!(inv.filter_terms, vec!["executor:e1"]);
    }

    #[test]
    fn unknown_command_is_an_error() {
        assert!(Invocation::parse(&Config::default(), os(&["frobnicate"])).is_err());
    }

    #[test]
    fn modifiers_after_command_stay_arguments() {
        let inv = Invocation::parse(
            &Config::default(),
            os(&["add", "Pour", "slab", "start:2024-02-01", "project:p1"]),
        )
        .expect("parse");
        assert!(inv.filter_terms.is_empty());
        assert_eq!(inv.command, "add");
        assert_eq!(inv.command_args, vec!["Pour", "slab", "start:2024-02-01", "project:p1"]);
    }
}
