// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::error::ErrorKind;
use clap::Parser;
use libprovision::config::Config;
use libprovision::error::{Error, EXIT_OK};
use libprovision::logging::setup_layers;
use libprovision::{Provision, SystemHost};
use tracing::instrument;

const VERSION: &str =
    concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_COMMIT_HASH"), ")");

/// Create the system account of a newly registered station, set its
/// password, put it in the station group and open its home directory to that
/// group.
///
/// Exit status: 0 success, 1 usage, 2 insufficient privilege, 3 account
/// creation failed, 4 password set failed, 5 group assignment failed,
/// 6 permission adjustment failed, 7 timeout.
#[derive(Parser)]
#[command(name = "provision", version = VERSION, about, long_about = None)]
struct Cli {
    /// Login name of the station account, e.g. U123456. Only the first 8
    /// characters are used.
    identifier: String,

    /// Initial password of the account. Only the first 32 characters are
    /// used.
    #[arg(allow_hyphen_values = true)]
    password: String,

    /// Path to a configuration file or a directory containing
    /// provision.toml and provision.d/*.toml.
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Print the commands that would be executed, with the password redacted,
    /// and exit without changing the host.
    #[arg(long)]
    dry_run: bool,
}

fn exit_with(code: exitcode::ExitCode) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return match error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    exit_with(EXIT_OK)
                }
                _ => {
                    let usage = Error::Usage {
                        details: error.to_string(),
                    };
                    exit_with(usage.exit_code())
                }
            };
        }
    };

    let config = match Config::load(cli.config.clone()) {
        Ok(config) => config,
        Err(error) => {
            eprintln!("provision: {error}");
            return exit_with(error.exit_code());
        }
    };

    if let Err(error) = install_subscriber(&config) {
        eprintln!("provision: failed to set up logging: {error:?}");
    }
    config.log_policy();

    match run(cli, config).await {
        Ok(()) => exit_with(EXIT_OK),
        Err(error) => {
            tracing::error!(
                reason = error.reason(),
                supporting_data = ?error.supporting_data(),
                "Provisioning failed"
            );
            eprintln!("provision: {error}");
            exit_with(error.exit_code())
        }
    }
}

fn install_subscriber(config: &Config) -> anyhow::Result<()> {
    let subscriber = setup_layers(config)?;
    tracing::subscriber::set_global_default(subscriber)
        .context("a global subscriber is already installed")?;
    Ok(())
}

#[instrument(skip_all)]
async fn run(cli: Cli, config: Config) -> Result<(), Error> {
    let provision = Provision::from_args(&cli.identifier, &cli.password, config)?;

    if cli.dry_run {
        for invocation in provision.plan() {
            println!("{}", invocation.command_line());
        }
        return Ok(());
    }

    tracing::info!(
        target: "station_provision",
        identifier = %provision.identifier(),
        "Provisioning station account"
    );
    provision.provision(&SystemHost).await
}
