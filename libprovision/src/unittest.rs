// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{HashMap, HashSet};
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Error;
use crate::host::{Host, Invocation};

/// `useradd` exit status for a name that is already taken.
const USERADD_NAME_IN_USE: i32 = 9;

/// Something the pipeline asked the host to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Call {
    Escalate,
    /// The redacted command line of an executed invocation.
    Execute(String),
}

#[derive(Clone, Copy, Debug)]
enum Outcome {
    Exit(i32),
    TimedOut,
}

/// A [`Host`] that executes nothing and records every request.
///
/// Commands succeed unless scripted otherwise with [`RecordingHost::fail`] or
/// [`RecordingHost::time_out`]. Accounts created through `useradd` are
/// remembered, so a second `useradd` for the same name fails the way the
/// real tool does.
pub(crate) struct RecordingHost {
    deny_escalation: bool,
    outcomes: HashMap<String, Outcome>,
    existing_paths: HashSet<PathBuf>,
    accounts: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Call>>,
    stdin: Mutex<Vec<(String, String)>>,
}

impl RecordingHost {
    pub(crate) fn new() -> Self {
        Self {
            deny_escalation: false,
            outcomes: HashMap::new(),
            existing_paths: HashSet::new(),
            accounts: Mutex::new(HashSet::new()),
            calls: Mutex::new(vec![]),
            stdin: Mutex::new(vec![]),
        }
    }

    pub(crate) fn deny_escalation(mut self) -> Self {
        self.deny_escalation = true;
        self
    }

    /// Make every run of `program` exit with `code`.
    pub(crate) fn fail(mut self, program: &str, code: i32) -> Self {
        self.outcomes.insert(program.to_string(), Outcome::Exit(code));
        self
    }

    pub(crate) fn time_out(mut self, program: &str) -> Self {
        self.outcomes.insert(program.to_string(), Outcome::TimedOut);
        self
    }

    pub(crate) fn with_existing_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.existing_paths.insert(path.into());
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Command lines of executed invocations, in order.
    pub(crate) fn executed(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Execute(line) => Some(line),
                Call::Escalate => None,
            })
            .collect()
    }

    /// What was written to the stdin of every run of `program`.
    pub(crate) fn stdin_for(&self, program: &str) -> Vec<String> {
        self.stdin
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == program)
            .map(|(_, input)| input.clone())
            .collect()
    }

    fn useradd_status(&self, invocation: &Invocation) -> i32 {
        let Some(name) = invocation.args().last() else {
            return 2;
        };
        if self.accounts.lock().unwrap().insert(name.clone()) {
            0
        } else {
            USERADD_NAME_IN_USE
        }
    }
}

#[async_trait]
impl Host for RecordingHost {
    fn escalate(&self) -> Result<(), Error> {
        self.calls.lock().unwrap().push(Call::Escalate);
        if self.deny_escalation {
            return Err(Error::Privilege {
                details: "setuid(0) failed: EPERM: Operation not permitted"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn path_exists(&self, path: &Path) -> bool {
        self.existing_paths.contains(path)
    }

    async fn execute(
        &self,
        invocation: &Invocation,
        timeout: Duration,
    ) -> Result<ExitStatus, Error> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Execute(invocation.command_line()));
        if let Some(input) = invocation.stdin() {
            self.stdin
                .lock()
                .unwrap()
                .push((invocation.program().to_string(), input.to_string()));
        }

        let code = match self.outcomes.get(invocation.program()) {
            Some(Outcome::Exit(code)) => *code,
            Some(Outcome::TimedOut) => {
                return Err(Error::Timeout {
                    command: invocation.program().to_string(),
                    after: timeout,
                })
            }
            None if invocation.program() == env!("PATH_USERADD") => {
                self.useradd_status(invocation)
            }
            None => 0,
        };
        Ok(ExitStatus::from_raw(code << 8))
    }
}
