//! `hopps` command line entry point.
//!
//! # Responsibility
//! - Map subcommands onto the `VersionedStore` façade.
//! - Print results as JSON on stdout and errors on stderr.
//!
//! Exit codes: 0 success, 2 not found, 3 stale base on a checked save,
//! 1 any other failure.

mod args;

use args::{Cli, Command, LimitArgs};
use clap::Parser;
use hopps_core::{
    default_log_level, flush_logging, init_logging, LogOutput, LoggingError, Selector,
    StoreConfig, StoreError, VersionedStore,
};
use log::info;
use serde::Serialize;
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::process::ExitCode;

const EXIT_FAILURE: u8 = 1;
const EXIT_NOT_FOUND: u8 = 2;
const EXIT_LINEAGE: u8 = 3;

#[derive(Debug)]
enum CliError {
    Logging(LoggingError),
    Payload(serde_json::Error),
    Store(StoreError),
}

impl CliError {
    fn exit_code(&self) -> u8 {
        match self {
            Self::Store(err) if err.is_not_found() => EXIT_NOT_FOUND,
            Self::Store(StoreError::Lineage { .. }) => EXIT_LINEAGE,
            _ => EXIT_FAILURE,
        }
    }
}

impl Display for CliError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Logging(err) => write!(f, "logging: {err}"),
            Self::Payload(err) => write!(f, "payload is not valid JSON: {err}"),
            Self::Store(err) => write!(f, "{}: {err}", err.code()),
        }
    }
}

impl From<LoggingError> for CliError {
    fn from(value: LoggingError) -> Self {
        Self::Logging(value)
    }
}

impl From<StoreError> for CliError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let outcome = run(cli);
    flush_logging();

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let CliError::Store(StoreError::Lineage { delta, .. }) = &err {
                // The versions the caller missed, for rebasing.
                let _ = print_json(&serde_json::json!({ "lineage": delta }));
            }
            eprintln!("hopps: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    if let Some(log_dir) = &cli.log_dir {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(
            level,
            log_dir,
            LogOutput {
                mirror_warnings_to_stderr: true,
            },
        )?;
    }

    let config = store_config(&cli.limits);
    let store = VersionedStore::open(&cli.db, config)?;
    info!(
        "event=cli_command module=cli status=start command={}",
        command_name(&cli.command)
    );

    match cli.command {
        Command::Save {
            collection,
            key,
            payload,
            base,
            create,
        } => {
            let payload: Value = serde_json::from_str(&payload).map_err(CliError::Payload)?;
            let receipt = match (base, create) {
                (Some(base), _) => store.save_if_head(&collection, &key, payload, Some(base))?,
                (None, true) => store.save_if_head(&collection, &key, payload, None)?,
                (None, false) => store.save(&collection, &key, payload)?,
            };
            print_json(&receipt)
        }
        Command::Get {
            collection,
            key,
            version,
            as_of,
        } => {
            let selector = match (version, as_of) {
                (Some(version), _) => Selector::Version(version),
                (None, Some(timestamp)) => Selector::AsOf(timestamp),
                (None, None) => Selector::Latest,
            };
            print_json(&store.get(&collection, &key, selector)?)
        }
        Command::History {
            collection,
            key,
            limit,
            offset,
        } => print_json(&store.history(&collection, &key, limit, offset)?),
        Command::Collections => print_json(&store.collections()?),
        Command::Log { after, limit } => print_json(&store.commits(after, limit)?),
    }
}

fn store_config(limits: &LimitArgs) -> StoreConfig {
    let defaults = StoreConfig::default();
    StoreConfig {
        max_payload_bytes: limits
            .max_payload_bytes
            .unwrap_or(defaults.max_payload_bytes),
        max_append_attempts: limits.max_attempts.unwrap_or(defaults.max_append_attempts),
        ..defaults
    }
}

fn command_name(command: &Command) -> &'static str {
    match command {
        Command::Save { .. } => "save",
        Command::Get { .. } => "get",
        Command::History { .. } => "history",
        Command::Collections => "collections",
        Command::Log { .. } => "log",
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string(value).map_err(CliError::Payload)?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{store_config, CliError, EXIT_FAILURE, EXIT_LINEAGE, EXIT_NOT_FOUND};
    use crate::args::LimitArgs;
    use hopps_core::{StoreConfig, StoreError};

    #[test]
    fn not_found_maps_to_dedicated_exit_code() {
        let err = CliError::Store(StoreError::NotFound {
            collection: "foo".to_string(),
            key: "K1".to_string(),
            version: None,
        });
        assert_eq!(err.exit_code(), EXIT_NOT_FOUND);

        let err = CliError::Store(StoreError::InvalidArgument("blank".to_string()));
        assert_eq!(err.exit_code(), EXIT_FAILURE);

        let err = CliError::Store(StoreError::Lineage {
            collection: "foo".to_string(),
            key: "K1".to_string(),
            base: Some(1),
            head: 2,
            delta: Vec::new(),
        });
        assert_eq!(err.exit_code(), EXIT_LINEAGE);
    }

    #[test]
    fn limit_flags_override_defaults_only_when_set() {
        let config = store_config(&LimitArgs {
            max_payload_bytes: Some(1024),
            max_attempts: None,
        });
        let defaults = StoreConfig::default();
        assert_eq!(config.max_payload_bytes, 1024);
        assert_eq!(config.max_append_attempts, defaults.max_append_attempts);
        assert_eq!(config.pool_size, defaults.pool_size);
    }
}
