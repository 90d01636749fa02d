// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.
pub mod password;
pub mod permissions;
pub mod user;

use std::path::PathBuf;
use std::time::Duration;

use crate::config::{Config, GroupStrategy};
use crate::error::Error;
use crate::host::{Host, Invocation, PrivilegeToken};
use crate::identity::{AccountIdentifier, PlaintextPassword};
use tracing::instrument;

/// The station account to provision and the policy to provision it with.
///
/// [`Provision::provision`] runs the fixed sequence: assume root, create the
/// account, set its password, move it to the station group when the group is
/// assigned separately, and open the home directory to the group. Each step
/// runs to completion before the next starts, and the first failure stops
/// the sequence. It does not attempt to undo partial provisioning: an
/// account created before a later step failed stays on the host.
#[derive(Clone, Debug)]
pub struct Provision {
    identifier: AccountIdentifier,
    password: PlaintextPassword,
    config: Config,
}

impl Provision {
    pub fn new(
        identifier: AccountIdentifier,
        password: PlaintextPassword,
        config: Config,
    ) -> Self {
        Self {
            identifier,
            password,
            config,
        }
    }

    /// Validate and bound raw command-line values, then apply the
    /// identifier format policy from `config`.
    pub fn from_args(
        identifier: &str,
        password: &str,
        config: Config,
    ) -> Result<Self, Error> {
        let identifier = AccountIdentifier::new(identifier)?;
        let password = PlaintextPassword::new(password)?;

        if !identifier.is_station_format() {
            if config.identity.require_station_format {
                return Err(Error::InvalidInput {
                    details: format!(
                        "identifier '{identifier}' is not a letter followed by six digits"
                    ),
                });
            }
            tracing::warn!(
                %identifier,
                "Identifier is not a letter followed by six digits"
            );
        }

        Ok(Self::new(identifier, password, config))
    }

    pub fn identifier(&self) -> &AccountIdentifier {
        &self.identifier
    }

    /// `<home.base>/<identifier>`
    pub fn home_dir(&self) -> PathBuf {
        self.config.home.base.join(self.identifier.as_str())
    }

    fn step_timeout(&self) -> Result<Duration, Error> {
        self.config.timeouts.step_timeout()
    }

    /// The invocations a successful run performs, in order.
    ///
    /// Only the first configured password backend is listed.
    pub fn plan(&self) -> Vec<Invocation> {
        let mut plan = vec![self.useradd_invocation()];
        if let Some(backend) = self.config.password_provisioners.backends.first()
        {
            plan.push(backend.invocation(&self.identifier, &self.password));
        }
        if self.config.group.strategy == GroupStrategy::Split {
            plan.push(self.usermod_invocation());
        }
        plan.push(self.chmod_invocation());
        plan
    }

    /// Provisions the station account on `host`.
    ///
    /// Nothing is executed unless privilege escalation succeeds.
    #[instrument(skip_all, fields(identifier = %self.identifier))]
    pub async fn provision(&self, host: &dyn Host) -> Result<(), Error> {
        self.step_timeout()?;
        self.check_home(host)?;

        let privilege = PrivilegeToken::acquire(host)?;

        self.create_account(host, &privilege).await?;

        self.set_password(host, &privilege).await?;

        if self.config.group.strategy == GroupStrategy::Split {
            self.assign_group(host, &privilege).await?;
        }

        self.grant_home_access(host, &privilege).await?;

        tracing::info!(
            target: "libprovision::provision::success",
            identifier = %self.identifier,
            group = %self.config.group.name,
            "Station account provisioned"
        );
        Ok(())
    }

    fn check_home(&self, host: &dyn Host) -> Result<(), Error> {
        if !self.config.home.refuse_existing {
            return Ok(());
        }

        let probed = std::iter::once(self.home_dir()).chain(
            self.config
                .home
                .also_probe
                .iter()
                .map(|base| base.join(self.identifier.as_str())),
        );
        for home in probed {
            if host.path_exists(&home) {
                tracing::error!(path = %home.display(), "Home directory already exists");
                return Err(Error::HomeDirectoryExists {
                    path: home.display().to_string(),
                });
            }
        }
        Ok(())
    }
}
