// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use tracing::instrument;

use crate::config::GroupStrategy;
use crate::error::Error;
use crate::host::{Host, Invocation, PrivilegeToken};

use super::Provision;

impl Provision {
    /// `useradd -m -d <home> [-g <group>] <identifier>`
    ///
    /// The station group is only passed here under the combined strategy.
    pub(crate) fn useradd_invocation(&self) -> Invocation {
        let path_useradd = env!("PATH_USERADD");

        let mut invocation = Invocation::new(path_useradd)
            .arg("-m")
            .arg("-d")
            .arg(self.home_dir().to_string_lossy());
        if self.config.group.strategy == GroupStrategy::Combined {
            invocation = invocation.arg("-g").arg(&self.config.group.name);
        }
        invocation.arg(self.identifier.as_str())
    }

    /// `usermod -g <group> <identifier>`
    pub(crate) fn usermod_invocation(&self) -> Invocation {
        let path_usermod = env!("PATH_USERMOD");

        Invocation::new(path_usermod)
            .arg("-g")
            .arg(&self.config.group.name)
            .arg(self.identifier.as_str())
    }

    /// Create the account and its home directory.
    ///
    /// An account that already exists makes `useradd` exit non-zero, which
    /// is reported as [`Error::AccountCreationFailed`].
    #[instrument(skip_all)]
    pub(crate) async fn create_account(
        &self,
        host: &dyn Host,
        _privilege: &PrivilegeToken,
    ) -> Result<(), Error> {
        tracing::info!(
            target: "libprovision::user::add",
            "Creating user with username: '{}'",
            self.identifier,
        );

        let invocation = self.useradd_invocation();
        crate::run(host, &invocation, self.step_timeout()?, |command, status| {
            Error::AccountCreationFailed { command, status }
        })
        .await
        .map_err(|error| {
            tracing::error!(
                target: "libprovision::user::add",
                username = %self.identifier,
                ?error,
                "Failed to create the account"
            );
            error
        })
    }

    /// Make the station group the account's primary group.
    #[instrument(skip_all)]
    pub(crate) async fn assign_group(
        &self,
        host: &dyn Host,
        _privilege: &PrivilegeToken,
    ) -> Result<(), Error> {
        tracing::info!(
            target: "libprovision::user::add",
            "User '{}' is being moved to group '{}'",
            self.identifier,
            self.config.group.name
        );

        let invocation = self.usermod_invocation();
        crate::run(host, &invocation, self.step_timeout()?, |command, status| {
            Error::GroupAssignmentFailed { command, status }
        })
        .await
        .map_err(|error| {
            tracing::error!(
                target: "libprovision::user::add",
                username = %self.identifier,
                ?error,
                "Failed to assign the station group"
            );
            error
        })
    }
}
