use std::ffi::OsString;
use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::{expand_command_abbrev, known_command_names};

/// Overrides the log filter, e.g. `PIKPLUS_LOG=pikplus_core::datastore=debug`.
pub const LOG_ENV: &str = "PIKPLUS_LOG";

#[derive(Debug, Clone)]
pub struct PreprocessedArgs {
    pub cleaned_args: Vec<OsString>,
    pub rc_overrides: Vec<(String, String)>,
}

/// A `--rc page.size=50` style setting.
#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, value) = s
            .split_once('=')
            .map(|(k, v)| (k.trim(), v.trim()))
            .filter(|(k, _)| !k.is_empty())
            .ok_or_else(|| anyhow!("expected config KEY=VALUE (e.g. page.size=50), got: {s}"))?;
        Ok(Self {
            key: key.to_string(),
            value: value.to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "pikplus",
    version,
    about = "PikPak Plus: local task and share bookkeeping, paging and filtering",
    after_help = "Commands: tasks, shares, pages, view, help, version.\n\
                  Config keys can also be set positionally: pikplus rc.filter.mine_only=on view page.json",
    disable_help_subcommand = true,
    arg_required_else_help = false
)]
pub struct GlobalCli {
    /// More log output on stderr (-v info, -vv debug, -vvv trace).
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// Less log output (-q warnings only, -qq errors only).
    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    /// Set a config key for this run, e.g. --rc page.max_visible=9.
    #[arg(
        long = "rc",
        value_name = "KEY=VALUE",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    /// Config file to read instead of $PIKPLUSRC or ~/.pikplusrc.
    #[arg(long = "rc-file", value_name = "FILE")]
    pub rc_file: Option<PathBuf>,

    /// Directory holding the local task and share lists.
    #[arg(long = "data", value_name = "DIR")]
    pub data: Option<PathBuf>,

    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<OsString>,
}

fn default_log_level(verbose: u8, quiet: u8) -> &'static str {
    match (quiet, verbose) {
        (q, _) if q >= 2 => "error",
        (1, _) => "warn",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    }
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let level = default_log_level(verbose, quiet);
    let env_filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| anyhow!("invalid {LOG_ENV} filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// `rc.page.size=50` or `rc.page.size:50`. The key keeps its `rc.` prefix.
fn positional_override(arg: &str) -> Option<(String, String)> {
    let rest = arg.strip_prefix("rc.")?;
    let (key, value) = rest.split_once('=').or_else(|| rest.split_once(':'))?;
    if key.is_empty() {
        return None;
    }
    Some((format!("rc.{key}"), value.to_string()))
}

/// Pulls positional config overrides out of the argument list before clap
/// sees it. The program name is always kept.
#[tracing::instrument(skip_all)]
pub fn preprocess_args(raw: &[OsString]) -> anyhow::Result<PreprocessedArgs> {
    let mut cleaned = Vec::with_capacity(raw.len());
    let mut overrides = Vec::new();

    for (idx, arg) in raw.iter().enumerate() {
        let parsed = (idx > 0)
            .then(|| positional_override(&arg.to_string_lossy()))
            .flatten();
        match parsed {
            Some((key, value)) => {
                debug!(key = %key, value = %value, "captured positional config override");
                overrides.push((key, value));
            }
            None => cleaned.push(arg.clone()),
        }
    }

    Ok(PreprocessedArgs {
        cleaned_args: cleaned,
        rc_overrides: overrides,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub command: String,
    pub command_args: Vec<String>,
}

impl Invocation {
    #[tracing::instrument(skip(rest))]
    pub fn parse(rest: Vec<OsString>) -> anyhow::Result<Self> {
        let tokens: Vec<String> = rest
            .into_iter()
            .map(|arg| arg.to_string_lossy().to_string())
            .collect();

        let Some((first, args)) = tokens.split_first() else {
            debug!("no explicit command, defaulting to tasks");
            return Ok(Self {
                command: "tasks".to_string(),
                command_args: vec![],
            });
        };

        let known = known_command_names();
        let command = expand_command_abbrev(first, &known)
            .ok_or_else(|| anyhow!("unknown or ambiguous command: {first}"))?;

        debug!(token = %first, expanded = %command, "resolved command token");
        Ok(Self {
            command: command.to_string(),
            command_args: args.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn positional_rc_overrides_are_extracted() {
        let pre = preprocess_args(&os(&["pikplus", "rc.page.size=50", "view", "rc.color:off"]))
            .unwrap();
        assert_eq!(pre.cleaned_args, os(&["pikplus", "view"]));
        assert_eq!(
            pre.rc_overrides,
            vec![
                ("rc.page.size".to_string(), "50".to_string()),
                ("rc.color".to_string(), "off".to_string()),
            ]
        );
    }

    #[test]
    fn commands_accept_unique_prefixes() {
        let inv = Invocation::parse(os(&["sh", "clear"])).unwrap();
        assert_eq!(inv.command, "shares");
        assert_eq!(inv.command_args, vec!["clear".to_string()]);

        assert_eq!(Invocation::parse(vec![]).unwrap().command, "tasks");
        assert!(Invocation::parse(os(&["bogus"])).is_err());
    }

    #[test]
    fn log_level_follows_flags() {
        assert_eq!(default_log_level(0, 0), "warn");
        assert_eq!(default_log_level(1, 0), "info");
        assert_eq!(default_log_level(2, 0), "debug");
        assert_eq!(default_log_level(5, 0), "trace");
        assert_eq!(default_log_level(3, 1), "warn");
        assert_eq!(default_log_level(0, 2), "error");
    }

    #[test]
    fn override_flags_need_a_key() {
        assert!("=on".parse::<KeyVal>().is_err());
        assert!("page.size".parse::<KeyVal>().is_err());
        let kv: KeyVal = " url.match = normalized ".parse().unwrap();
        assert_eq!((kv.key.as_str(), kv.value.as_str()), ("url.match", "normalized"));

        let pre = preprocess_args(&os(&["pikplus", "rc.=x", "rc.page.size"])).unwrap();
        assert!(pre.rc_overrides.is_empty());
        assert_eq!(pre.cleaned_args.len(), 3);
    }
}
