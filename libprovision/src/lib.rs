// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

pub mod config;
pub mod error;
pub mod host;
pub mod identity;
pub mod logging;

mod provision;
pub use provision::Provision;

pub use host::{Host, Invocation, SystemHost};
pub use identity::{AccountIdentifier, PlaintextPassword};

#[cfg(test)]
mod unittest;

use std::process::ExitStatus;
use std::time::Duration;

use error::Error;

/// Run a delegated command and turn a non-zero exit status into the
/// step-specific error built by `failed`.
pub(crate) async fn run(
    host: &dyn Host,
    invocation: &Invocation,
    timeout: Duration,
    failed: fn(String, ExitStatus) -> Error,
) -> Result<(), Error> {
    let status = host.execute(invocation, timeout).await?;
    if status.success() {
        Ok(())
    } else {
        tracing::error!(
            command = invocation.program(),
            ?status,
            "Command exited unsuccessfully"
        );
        Err(failed(invocation.program().to_string(), status))
    }
}
