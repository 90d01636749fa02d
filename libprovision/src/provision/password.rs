// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.
//!
//! Password provisioning behavior for `libprovision`.
//!
//! - `chpasswd` (default): the input `"username:password\n"` is written to
//!   stdin.
//! - `passwd --stdin <username>`: the bare password is written to stdin.
//!   This is the form found on Red Hat derived hosts.
//!
//! In both cases the secret is never part of argv, never passes through a
//! shell, and is never logged. Backends are tried in the configured order
//! until one succeeds; a backend that times out stops the attempt.

use tracing::instrument;

use crate::config::PasswordProvisioner;
use crate::error::Error;
use crate::host::{Host, Invocation, PrivilegeToken};
use crate::identity::{AccountIdentifier, PlaintextPassword};

use super::Provision;

impl PasswordProvisioner {
    pub(crate) fn invocation(
        &self,
        identifier: &AccountIdentifier,
        password: &PlaintextPassword,
    ) -> Invocation {
        match self {
            Self::Chpasswd => Invocation::new(env!("PATH_CHPASSWD"))
                .stdin_secret(format!("{}:{}\n", identifier, password.expose())),
            Self::PasswdStdin => Invocation::new(env!("PATH_PASSWD"))
                .arg("--stdin")
                .arg(identifier.as_str())
                .stdin_secret(password.expose()),
        }
    }
}

impl Provision {
    #[instrument(skip_all)]
    pub(crate) async fn set_password(
        &self,
        host: &dyn Host,
        _privilege: &PrivilegeToken,
    ) -> Result<(), Error> {
        let mut last_error = None;

        for backend in &self.config.password_provisioners.backends {
            let invocation = backend.invocation(&self.identifier, &self.password);
            let result = crate::run(
                host,
                &invocation,
                self.step_timeout()?,
                |command, status| Error::PasswordSetFailed { command, status },
            )
            .await;

            match result {
                Ok(()) => {
                    tracing::info!(
                        target: "libprovision::password::status",
                        username = %self.identifier,
                        backend = ?backend,
                        "Successfully set password"
                    );
                    return Ok(());
                }
                Err(error @ Error::PasswordSetFailed { .. })
                | Err(error @ Error::Spawn { .. }) => {
                    tracing::warn!(
                        target: "libprovision::password::status",
                        username = %self.identifier,
                        backend = ?backend,
                        ?error,
                        "Password backend failed"
                    );
                    last_error = Some(error);
                }
                Err(error) => return Err(error),
            }
        }

        let error = last_error.unwrap_or_else(|| Error::Config {
            details: "no password backend is configured".to_string(),
        });
        tracing::error!(
            target: "libprovision::password::status",
            username = %self.identifier,
            ?error,
            "Failed to set password"
        );
        Err(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::unittest::RecordingHost;

    const PASSWORD: &str = "Zq3x9VbN2mK8pL4rT6wY1uI5oP7aS0dF";

    fn provision(backends: Vec<PasswordProvisioner>) -> Provision {
        let mut config = Config::default();
        config.password_provisioners.backends = backends;
        Provision::from_args("U123456", PASSWORD, config).unwrap()
    }

    #[test]
    fn test_chpasswd_reads_name_and_password_from_stdin() {
        let p = provision(vec![]);
        let invocation =
            PasswordProvisioner::Chpasswd.invocation(&p.identifier, &p.password);

        assert_eq!(invocation.program(), "chpasswd");
        assert!(invocation.args().is_empty());
        assert_eq!(invocation.stdin(), Some(format!("U123456:{PASSWORD}\n").as_str()));
    }

    #[test]
    fn test_passwd_stdin_keeps_password_off_argv() {
        let p = provision(vec![]);
        let invocation = PasswordProvisioner::PasswdStdin
            .invocation(&p.identifier, &p.password);

        assert_eq!(invocation.program(), "passwd");
        assert_eq!(invocation.args(), ["--stdin", "U123456"]);
        assert!(invocation.args().iter().all(|arg| !arg.contains(PASSWORD)));
        assert_eq!(invocation.stdin(), Some(PASSWORD));
    }

    #[tokio::test]
    async fn test_falls_back_to_next_backend() {
        let p = provision(vec![
            PasswordProvisioner::PasswdStdin,
            PasswordProvisioner::Chpasswd,
        ]);
        let host = RecordingHost::new().fail("passwd", 1);
        let privilege = PrivilegeToken::acquire(&host).unwrap();

        p.set_password(&host, &privilege).await.unwrap();
        assert_eq!(
            host.executed(),
            vec![
                "passwd --stdin U123456 < <redacted>".to_string(),
                "chpasswd < <redacted>".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_reports_last_failure_when_all_backends_fail() {
        let p = provision(vec![
            PasswordProvisioner::Chpasswd,
            PasswordProvisioner::PasswdStdin,
        ]);
        let host = RecordingHost::new().fail("chpasswd", 1).fail("passwd", 3);
        let privilege = PrivilegeToken::acquire(&host).unwrap();

        let err = p.set_password(&host, &privilege).await.unwrap_err();
        match err {
            Error::PasswordSetFailed { command, status } => {
                assert_eq!(command, "passwd");
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_does_not_fall_back() {
        let p = provision(vec![
            PasswordProvisioner::Chpasswd,
            PasswordProvisioner::PasswdStdin,
        ]);
        let host = RecordingHost::new().time_out("chpasswd");
        let privilege = PrivilegeToken::acquire(&host).unwrap();

        let err = p.set_password(&host, &privilege).await.unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(host.executed().len(), 1);
    }

    #[tokio::test]
    #[tracing_test::traced_test]
    async fn test_password_is_never_logged() {
        let p = provision(vec![PasswordProvisioner::Chpasswd]);
        let host = RecordingHost::new().fail("chpasswd", 1);
        let privilege = PrivilegeToken::acquire(&host).unwrap();

        let _ = p.set_password(&host, &privilege).await;
        assert!(logs_contain("Failed to set password"));
        assert!(!logs_contain(PASSWORD));
    }
}
