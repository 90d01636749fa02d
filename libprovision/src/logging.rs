// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fs::{OpenOptions, Permissions};
use std::os::unix::fs::PermissionsExt;
use tracing::{event, Level, Subscriber};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Layer, Registry};

use crate::config::Config;

/// Environment variable holding an `EnvFilter` directive that replaces the
/// default filters of every layer, e.g. `PROVISION_LOG=debug`.
pub const PROVISION_LOG_ENV: &str = "PROVISION_LOG";

fn env_filter_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_env(PROVISION_LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default))
}

/// Builds the `tracing` subscriber for a provisioning run.
///
/// - stderr receives `error` and above unless `PROVISION_LOG` says otherwise,
///   so an operator only sees what went wrong.
/// - When `config.log.enable` is set, `info` and above are appended to
///   `config.log.path`, which is restricted to mode `0600`. A log file that
///   cannot be opened is reported and skipped rather than failing the run.
pub fn setup_layers(
    config: &Config,
) -> Result<Box<dyn Subscriber + Send + Sync + 'static>, anyhow::Error> {
    let stderr_layer = fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(std::io::stderr)
        .with_filter(env_filter_or("error"));

    let file_layer = if !config.log.enable {
        None
    } else {
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log.path)
        {
            Ok(file) => {
                if let Err(e) =
                    file.set_permissions(Permissions::from_mode(0o600))
                {
                    event!(
                        Level::WARN,
                        "Failed to set permissions on {}: {}.",
                        config.log.path.display(),
                        e,
                    );
                }

                Some(
                    fmt::layer()
                        .with_ansi(false)
                        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
                        .with_writer(file)
                        .with_filter(env_filter_or("info")),
                )
            }
            Err(e) => {
                event!(
                    Level::ERROR,
                    "Could not open configured log file {}: {}. Continuing without file logging.",
                    config.log.path.display(),
                    e
                );

                None
            }
        }
    };

    let subscriber = Registry::default().with(stderr_layer).with(file_layer);

    Ok(Box::new(subscriber))
}
