// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_STATION_GROUP: &str = "stations";
pub const DEFAULT_HOME_BASE: &str = "/home";
pub const DEFAULT_LOG_PATH: &str = "/var/log/station-provision.log";

#[derive(Default, Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Identity {
    /// Reject identifiers that do not look like `U123456` instead of only
    /// warning about them.
    pub require_station_format: bool,
}

/// How the account ends up with the station group as its primary group.
#[derive(Default, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GroupStrategy {
    /// `useradd -g <group>` assigns the group while creating the account.
    #[default]
    Combined,
    /// `useradd` first, then `usermod -g <group>` after the password is set.
    Split,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Group {
    pub name: String,
    pub strategy: GroupStrategy,
}

impl Default for Group {
    fn default() -> Self {
        Self {
            name: DEFAULT_STATION_GROUP.to_string(),
            strategy: GroupStrategy::default(),
        }
    }
}

/// Permission change applied to the new home directory.
#[derive(Default, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HomeMode {
    /// Group members may traverse the directory.
    #[serde(rename = "g+x")]
    GroupExecute,
    /// Group members and others may list and traverse the directory.
    #[serde(rename = "go+rx")]
    #[default]
    GroupOtherReadExecute,
}

impl HomeMode {
    /// The symbolic mode handed to `chmod`.
    pub fn as_symbolic(&self) -> &'static str {
        match self {
            Self::GroupExecute => "g+x",
            Self::GroupOtherReadExecute => "go+rx",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Home {
    pub base: PathBuf,
    pub mode: HomeMode,
    /// Stop before escalating when the home directory is already present.
    pub refuse_existing: bool,
    /// Further base directories checked with `refuse_existing`, e.g.
    /// `/home/stations` when stations used to live there.
    pub also_probe: Vec<PathBuf>,
}

impl Default for Home {
    fn default() -> Self {
        Self {
            base: PathBuf::from(DEFAULT_HOME_BASE),
            mode: HomeMode::default(),
            refuse_existing: false,
            also_probe: vec![],
        }
    }
}

#[derive(Default, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordProvisioner {
    /// `chpasswd`, fed `name:password` on stdin.
    #[serde(rename = "chpasswd")]
    #[default]
    Chpasswd,
    /// `passwd --stdin <name>`, fed the bare password on stdin.
    #[serde(rename = "passwd --stdin")]
    PasswdStdin,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct PasswordProvisioners {
    pub backends: Vec<PasswordProvisioner>,
}

impl Default for PasswordProvisioners {
    fn default() -> Self {
        Self {
            backends: vec![PasswordProvisioner::default()],
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Timeouts {
    pub step_timeout_secs: f64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            step_timeout_secs: 30.0,
        }
    }
}

impl Timeouts {
    /// The per-step bound, or a config error when `step_timeout_secs` is not
    /// a positive duration that fits in a [`Duration`].
    pub fn step_timeout(&self) -> Result<Duration, Error> {
        let secs = self.step_timeout_secs;
        match Duration::try_from_secs_f64(secs) {
            Ok(timeout) if !timeout.is_zero() => Ok(timeout),
            Ok(_) => Err(Error::Config {
                details: format!("step timeout must be positive, got {secs}"),
            }),
            Err(e) => Err(Error::Config {
                details: format!("step timeout {secs} is not usable: {e}"),
            }),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Log {
    pub enable: bool,
    pub path: PathBuf,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            enable: true,
            path: PathBuf::from(DEFAULT_LOG_PATH),
        }
    }
}

#[derive(Default, Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct Config {
    pub identity: Identity,
    pub group: Group,
    pub home: Home,
    pub password_provisioners: PasswordProvisioners,
    pub timeouts: Timeouts,
    pub log: Log,
}

impl Config {
    /// Load the configuration.
    ///
    /// `None` yields the defaults. A file is read as TOML. A directory is
    /// read as `provision.toml` followed by every `provision.d/*.toml` in
    /// lexical order; keys in later files override earlier ones.
    pub fn load(cli_overrides: Option<PathBuf>) -> Result<Config, Error> {
        let config = match cli_overrides {
            None => Config::default(),
            Some(path) if path.is_dir() => Self::load_from_directory(&path)?,
            Some(path) => Self::from_table(Self::read_table(&path)?)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Record the policy this run provisions with.
    ///
    /// Loading happens before the subscriber exists, so callers emit this
    /// once logging is set up.
    pub fn log_policy(&self) {
        tracing::info!(
            target: "libprovision::config::success",
            group = %self.group.name,
            strategy = ?self.group.strategy,
            mode = self.home.mode.as_symbolic(),
            timeout_secs = self.timeouts.step_timeout_secs,
            backends = ?self.password_provisioners.backends,
            "Configuration loaded"
        );
    }

    fn read_table(file_path: &Path) -> Result<toml::Table, Error> {
        let content = fs::read_to_string(file_path).map_err(|e| {
            Error::Config {
                details: format!("unable to read {}: {e}", file_path.display()),
            }
        })?;
        toml::from_str::<toml::Table>(&content).map_err(|e| {
            tracing::error!("Failed to parse configuration file: {:?}", e);
            Error::Config {
                details: format!(
                    "failed to parse TOML config file {}: {e}",
                    file_path.display()
                ),
            }
        })
    }

    fn load_from_directory(dir: &Path) -> Result<Config, Error> {
        let mut merged = toml::Table::new();

        let base_config_path = dir.join("provision.toml");
        if base_config_path.exists() {
            merge_tables(&mut merged, Self::read_table(&base_config_path)?);
        }

        let d_dir = dir.join("provision.d");
        if d_dir.is_dir() {
            let mut toml_files: Vec<_> = fs::read_dir(d_dir)?
                .filter_map(|entry| {
                    let entry = entry.ok()?;
                    let path = entry.path();
                    if path.extension()?.to_str()? == "toml" {
                        Some(path)
                    } else {
                        None
                    }
                })
                .collect();

            toml_files.sort();

            for file_path in toml_files {
                merge_tables(&mut merged, Self::read_table(&file_path)?);
            }
        }

        Self::from_table(merged)
    }

    fn from_table(table: toml::Table) -> Result<Config, Error> {
        toml::Value::Table(table)
            .try_into::<Config>()
            .map_err(|e| Error::Config {
                details: e.to_string(),
            })
    }

    fn validate(&self) -> Result<(), Error> {
        if self.group.name.is_empty() || self.group.name.starts_with('-') {
            return Err(Error::Config {
                details: format!("invalid group name '{}'", self.group.name),
            });
        }
        if !self.home.base.is_absolute() {
            return Err(Error::Config {
                details: format!(
                    "home base {} must be an absolute path",
                    self.home.base.display()
                ),
            });
        }
        if let Some(base) =
            self.home.also_probe.iter().find(|base| !base.is_absolute())
        {
            return Err(Error::Config {
                details: format!(
                    "probed home base {} must be an absolute path",
                    base.display()
                ),
            });
        }
        if self.password_provisioners.backends.is_empty() {
            return Err(Error::Config {
                details: "at least one password backend is required"
                    .to_string(),
            });
        }
        self.timeouts.step_timeout()?;
        Ok(())
    }
}

/// Recursively overlay `overlay` onto `base`; tables merge, other values
/// replace.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(overlay_table) = value {
            if let Some(toml::Value::Table(base_table)) = base.get_mut(&key) {
                merge_tables(base_table, overlay_table);
                continue;
            }
            base.insert(key, toml::Value::Table(overlay_table));
        } else {
            base.insert(key, value);
        }
    }
}
