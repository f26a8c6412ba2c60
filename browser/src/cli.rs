use clap::{CommandFactory, Parser};
use wire::ArgumentBatch;

use std::path::{Path, PathBuf};

use crate::windows::parse_absolute_url;

/// Command-line grammar shared by startup and forwarded launches.
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
#[command(name = "otter", version, about = "Otter web browser")]
pub struct LaunchArgs {
    /// URL to open.
    #[arg(value_name = "url")]
    pub urls: Vec<String>,

    /// Restores session <session> if it exists.
    #[arg(long, value_name = "session")]
    pub session: Option<String>,

    /// Starts private session.
    #[arg(long = "privatesession")]
    pub private_session: bool,

    /// Settings file (defaults to otter.toml in the user config directory).
    #[arg(long, value_name = "path")]
    pub config: Option<PathBuf>,
}

impl LaunchArgs {
    /// Parse a batch forwarded by another launch; its first entry is the
    /// program name.
    ///
    /// A batch clap rejects (unknown option, `--help`) still opens its
    /// positional URLs and honours `--session` / `--privatesession`.
    pub fn from_batch(batch: &ArgumentBatch) -> Self {
        if batch.is_empty() {
            return Self::default();
        }
        match Self::try_parse_from(batch.iter()) {
            Ok(args) => args,
            Err(e) => {
                log::warn!(
                    "cli: forwarded arguments rejected kind={:?}, keeping positionals",
                    e.kind()
                );
                Self::scan(batch.as_slice())
            }
        }
    }

    fn scan(args: &[String]) -> Self {
        let mut out = Self::default();
        for (i, token) in tokens(args).into_iter().enumerate() {
            match token {
                Token::Positional(idx) => out.urls.push(args[idx].clone()),
                Token::Option { name, value } => match name {
                    "--privatesession" => out.private_session = true,
                    "--session" => out.session = value.map(|v| v.to_string()),
                    _ => log::debug!("cli: ignoring token #{} {:?}", i, name),
                },
            }
        }
        out
    }
}

enum Token<'a> {
    Positional(usize),
    Option {
        name: &'a str,
        value: Option<&'a str>,
    },
}

/// Long options that take a value, straight from the clap definition.
fn value_options() -> Vec<String> {
    LaunchArgs::command()
        .get_arguments()
        .filter(|a| a.get_action().takes_values())
        .filter_map(|a| a.get_long().map(|l| format!("--{l}")))
        .collect()
}

// Split argv (program name first) into options and positional indices
// without rejecting anything.
fn tokens(args: &[String]) -> Vec<Token<'_>> {
    let with_value = value_options();
    let mut out = Vec::new();
    let mut i = 1;
    while i < args.len() {
        let a = args[i].as_str();
        if a == "--" {
            out.extend((i + 1..args.len()).map(Token::Positional));
            break;
        }
        if let Some((name, value)) = a.split_once('=').filter(|_| a.starts_with("--")) {
            out.push(Token::Option {
                name,
                value: Some(value),
            });
        } else if with_value.iter().any(|o| o == a) {
            out.push(Token::Option {
                name: a,
                value: args.get(i + 1).map(|v| v.as_str()),
            });
            i += 1;
        } else if a.starts_with('-') && a.len() > 1 {
            out.push(Token::Option {
                name: a,
                value: None,
            });
        } else {
            out.push(Token::Positional(i));
        }
        i += 1;
    }
    out
}

/// Rewrite relative path arguments against `cwd` so a primary running in
/// another directory opens the same files.
///
/// Only positionals are touched: those naming an existing file under `cwd`,
/// and those that can't be a host name (they end up as file names anyway).
/// URLs and everything else pass through unchanged.
pub fn absolutize_paths(batch: ArgumentBatch, cwd: &Path) -> ArgumentBatch {
    let mut args = batch.into_inner();
    let positionals: Vec<usize> = tokens(&args)
        .into_iter()
        .filter_map(|t| match t {
            Token::Positional(idx) => Some(idx),
            Token::Option { .. } => None,
        })
        .collect();

    for idx in positionals {
        let arg = &args[idx];
        if arg.trim().is_empty() || parse_absolute_url(arg).is_some() {
            continue;
        }
        let path = Path::new(arg);
        if path.is_absolute() {
            continue;
        }
        let joined = cwd.join(path);
        if joined.exists() || arg.chars().any(char::is_whitespace) {
            log::debug!("cli: absolutized {:?} -> {}", arg, joined.display());
            args[idx] = joined.to_string_lossy().into_owned();
        }
    }
    ArgumentBatch::new(args)
}
