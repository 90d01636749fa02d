// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The boundary between provisioning logic and the operating system.
//!
//! Everything that touches the host (assuming root, probing the home
//! directory, spawning the account-management tools) goes through [`Host`],
//! so the provisioning pipeline can be exercised against a recording double.

use std::io::ErrorKind;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use nix::unistd::{geteuid, setuid, Uid};
use tokio::io::AsyncWriteExt;
use tracing::instrument;

use crate::error::Error;

/// A single delegated command.
///
/// Arguments are passed to the program directly, never through a shell. An
/// optional secret is written to the program's stdin and is never part of
/// the argument list.
#[derive(Clone, PartialEq, Eq)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    stdin: Option<String>,
}

impl Invocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![],
            stdin: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Feed `secret` to the program on stdin.
    pub fn stdin_secret(mut self, secret: impl Into<String>) -> Self {
        self.stdin = Some(secret.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn has_stdin(&self) -> bool {
        self.stdin.is_some()
    }

    pub(crate) fn stdin(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    /// A printable rendering of the invocation with the stdin secret
    /// redacted.
    pub fn command_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        if self.stdin.is_some() {
            line.push_str(" < <redacted>");
        }
        line
    }
}

impl std::fmt::Debug for Invocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // This is manually implemented to avoid printing the stdin secret
        f.debug_struct("Invocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("stdin", &self.stdin.is_some())
            .finish()
    }
}

/// Access to the host operating system.
#[async_trait]
pub trait Host: Send + Sync {
    /// Assume the root identity for the rest of the process.
    fn escalate(&self) -> Result<(), Error>;

    /// Whether `path` already exists.
    fn path_exists(&self, path: &Path) -> bool;

    /// Run `invocation` to completion, killing it after `timeout`.
    ///
    /// Returns the exit status whatever it is; interpreting a non-zero status
    /// is up to the caller.
    async fn execute(
        &self,
        invocation: &Invocation,
        timeout: Duration,
    ) -> Result<ExitStatus, Error>;
}

/// Proof that privilege escalation succeeded.
///
/// Every mutating step takes a reference to one, so none of them can run
/// before [`PrivilegeToken::acquire`] has returned `Ok`.
#[derive(Debug)]
pub struct PrivilegeToken {
    _private: (),
}

impl PrivilegeToken {
    #[instrument(skip_all)]
    pub(crate) fn acquire(host: &dyn Host) -> Result<Self, Error> {
        host.escalate().map_err(|error| {
            tracing::error!(
                target: "libprovision::privilege",
                ?error,
                "Unable to assume root privileges"
            );
            error
        })?;
        tracing::info!(target: "libprovision::privilege", "Running with root privileges");
        Ok(Self { _private: () })
    }
}

/// The real host: `setuid(2)` and child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

#[async_trait]
impl Host for SystemHost {
    fn escalate(&self) -> Result<(), Error> {
        setuid(Uid::from_raw(0)).map_err(|errno| Error::Privilege {
            details: format!("setuid(0) failed: {errno}"),
        })?;

        if !geteuid().is_root() {
            return Err(Error::Privilege {
                details: format!(
                    "effective uid is {} after setuid(0)",
                    geteuid()
                ),
            });
        }
        Ok(())
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    #[instrument(skip_all, fields(command = %invocation.program()))]
    async fn execute(
        &self,
        invocation: &Invocation,
        timeout: Duration,
    ) -> Result<ExitStatus, Error> {
        tracing::debug!(args = ?invocation.args(), "Executing");

        let mut command = tokio::process::Command::new(invocation.program());
        command
            .args(invocation.args())
            .stdin(if invocation.has_stdin() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|source| Error::Spawn {
            command: invocation.program().to_string(),
            source,
        })?;

        let exchange = async {
            if let (Some(secret), Some(mut stdin)) =
                (invocation.stdin(), child.stdin.take())
            {
                let written = match stdin.write_all(secret.as_bytes()).await {
                    Ok(()) => stdin.shutdown().await,
                    Err(error) => Err(error),
                };
                drop(stdin);
                match written {
                    Ok(()) => {}
                    // The child stopped reading; its exit status says why.
                    Err(error) if error.kind() == ErrorKind::BrokenPipe => {
                        tracing::warn!("Command closed stdin before reading it");
                    }
                    Err(error) => return Err(error),
                }
            }
            child.wait().await
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(status) => Ok(status?),
            Err(_elapsed) => {
                tracing::error!(?timeout, "Command timed out, killing it");
                if let Err(error) = child.kill().await {
                    tracing::warn!(?error, "Failed to kill timed out command");
                }
                Err(Error::Timeout {
                    command: invocation.program().to_string(),
                    after: timeout,
                })
            }
        }
    }
}
