// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::time::Duration;

/// Exit status of a successful run.
pub const EXIT_OK: exitcode::ExitCode = exitcode::OK;
/// Exit status for a wrong number of arguments.
pub const EXIT_USAGE: exitcode::ExitCode = 1;
pub const EXIT_PRIVILEGE: exitcode::ExitCode = 2;
pub const EXIT_ACCOUNT_CREATION: exitcode::ExitCode = 3;
pub const EXIT_PASSWORD_SET: exitcode::ExitCode = 4;
pub const EXIT_GROUP_ASSIGNMENT: exitcode::ExitCode = 5;
pub const EXIT_PERMISSION_ADJUSTMENT: exitcode::ExitCode = 6;
pub const EXIT_TIMEOUT: exitcode::ExitCode = 7;

/// Set of error codes that can be used by libprovision.
///
/// Every delegated step has its own variant so that a caller can tell a
/// duplicate account apart from a failed `chmod`.
///
/// # Example
///
/// ```rust
/// # use libprovision::error::Error;
/// # use std::process::Command;
///
/// fn run_ls() -> Result<(), Error> {
///     let ls_status = Command::new("ls").arg("/tmp").status()?;
///     if !ls_status.success() {
///         Err(Error::PermissionAdjustmentFailed {
///             command: "ls".to_string(),
///             status: ls_status,
///         })
///     } else {
///         Ok(())
///     }
/// }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("incorrect usage: {details}")]
    Usage { details: String },
    #[error("invalid input: {details}")]
    InvalidInput { details: String },
    #[error("insufficient privilege: {details}")]
    Privilege { details: String },
    #[error("creating the account failed; executing {command} failed: {status}")]
    AccountCreationFailed {
        command: String,
        status: std::process::ExitStatus,
    },
    #[error("setting the password failed; executing {command} failed: {status}")]
    PasswordSetFailed {
        command: String,
        status: std::process::ExitStatus,
    },
    #[error(
        "assigning the group failed; executing {command} failed: {status}"
    )]
    GroupAssignmentFailed {
        command: String,
        status: std::process::ExitStatus,
    },
    #[error(
        "adjusting home directory permissions failed; executing {command} failed: {status}"
    )]
    PermissionAdjustmentFailed {
        command: String,
        status: std::process::ExitStatus,
    },
    #[error("executing {command} did not finish within {after:?}")]
    Timeout { command: String, after: Duration },
    #[error("unable to execute {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("the home directory {path} already exists")]
    HomeDirectoryExists { path: String },
    #[error("invalid configuration: {details}")]
    Config { details: String },
    #[error("An I/O error occurred: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns a concise, fixed string describing the failure kind.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Usage { .. } => "incorrect usage",
            Self::InvalidInput { .. } => "invalid input",
            Self::Privilege { .. } => "insufficient privilege",
            Self::AccountCreationFailed { .. } => "account creation failed",
            Self::PasswordSetFailed { .. } => "password set failed",
            Self::GroupAssignmentFailed { .. } => "group assignment failed",
            Self::PermissionAdjustmentFailed { .. } => {
                "permission adjustment failed"
            }
            Self::Timeout { .. } => "operation timed out",
            Self::Spawn { .. } => "facility unavailable",
            Self::HomeDirectoryExists { .. } => "home directory exists",
            Self::Config { .. } => "configuration error",
            Self::Io(_) => "I/O error",
        }
    }

    /// Returns a map of additional supporting data for structured logging.
    ///
    /// Step failures carry the command and the facility's exit status.
    /// Everything else includes the stringified error as `"error"`.
    pub fn supporting_data(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        match self {
            Self::AccountCreationFailed { command, status }
            | Self::PasswordSetFailed { command, status }
            | Self::GroupAssignmentFailed { command, status }
            | Self::PermissionAdjustmentFailed { command, status } => {
                map.insert("command".into(), command.clone());
                map.insert("exit_status".into(), status.to_string());
            }
            Self::Timeout { command, after } => {
                map.insert("command".into(), command.clone());
                map.insert("timeout_secs".into(), after.as_secs_f64().to_string());
            }
            Self::Spawn { command, source } => {
                map.insert("command".into(), command.clone());
                map.insert("error".into(), source.to_string());
            }
            Self::HomeDirectoryExists { path } => {
                map.insert("path".into(), path.clone());
            }
            _ => {
                map.insert("error".into(), format!("{self}"));
            }
        }
        map
    }

    /// The process exit status that reports this error to a calling script.
    pub fn exit_code(&self) -> exitcode::ExitCode {
        match self {
            Self::Usage { .. } => EXIT_USAGE,
            Self::Privilege { .. } => EXIT_PRIVILEGE,
            Self::AccountCreationFailed { .. } => EXIT_ACCOUNT_CREATION,
            Self::PasswordSetFailed { .. } => EXIT_PASSWORD_SET,
            Self::GroupAssignmentFailed { .. } => EXIT_GROUP_ASSIGNMENT,
            Self::PermissionAdjustmentFailed { .. } => {
                EXIT_PERMISSION_ADJUSTMENT
            }
            Self::Timeout { .. } => EXIT_TIMEOUT,
            Self::InvalidInput { .. } => exitcode::DATAERR,
            Self::HomeDirectoryExists { .. } => exitcode::CANTCREAT,
            Self::Spawn { .. } => exitcode::OSERR,
            Self::Config { .. } => exitcode::CONFIG,
            Self::Io(_) => exitcode::IOERR,
        }
    }
}
