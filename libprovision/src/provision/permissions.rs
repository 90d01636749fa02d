// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use tracing::instrument;

use crate::error::Error;
use crate::host::{Host, Invocation, PrivilegeToken};

use super::Provision;

impl Provision {
    /// `chmod <mode> <home>`
    pub(crate) fn chmod_invocation(&self) -> Invocation {
        let path_chmod = env!("PATH_CHMOD");

        Invocation::new(path_chmod)
            .arg(self.config.home.mode.as_symbolic())
            .arg(self.home_dir().to_string_lossy())
    }

    /// Let members of the station group into the new home directory.
    #[instrument(skip_all)]
    pub(crate) async fn grant_home_access(
        &self,
        host: &dyn Host,
        _privilege: &PrivilegeToken,
    ) -> Result<(), Error> {
        let invocation = self.chmod_invocation();
        crate::run(host, &invocation, self.step_timeout()?, |command, status| {
            Error::PermissionAdjustmentFailed { command, status }
        })
        .await
        .map_err(|error| {
            tracing::error!(
                target: "libprovision::permissions::status",
                path = %self.home_dir().display(),
                ?error,
                "Failed to adjust home directory permissions"
            );
            error
        })?;

        tracing::info!(
            target: "libprovision::permissions::status",
            path = %self.home_dir().display(),
            mode = self.config.home.mode.as_symbolic(),
            "Home directory permissions adjusted"
        );
        Ok(())
    }
}
