//! Process settings for the charm executable.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::CharmResult;

/// Settings loaded from environment variables.
///
/// Environment variables are prefixed with `MURANO_CHARM_`:
/// - `MURANO_CHARM_STATE_DIR`: where the unit state file lives
/// - `MURANO_CHARM_CONF_PATH`: rendered murano.conf
/// - `MURANO_CHARM_NOVARC_PATH`: rendered credentials file
/// - `MURANO_CHARM_PACKAGE_PATH`: bundled core library package
/// - `MURANO_CHARM_COMMAND_TIMEOUT_SECS`: timeout for every external command
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_conf_path")]
    pub conf_path: PathBuf,

    #[serde(default = "default_novarc_path")]
    pub novarc_path: PathBuf,

    #[serde(default = "default_package_path")]
    pub package_path: PathBuf,

    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("/var/lib/murano-charm")
}

fn default_conf_path() -> PathBuf {
    PathBuf::from("/etc/murano/murano.conf")
}

fn default_novarc_path() -> PathBuf {
    PathBuf::from("/root/novarc")
}

fn default_package_path() -> PathBuf {
    PathBuf::from("/usr/share/murano-common/io.murano.zip")
}

fn default_command_timeout() -> u64 {
    600
}

impl Settings {
    /// Load settings from environment variables.
    pub fn from_env() -> CharmResult<Self> {
        Ok(envy::prefixed("MURANO_CHARM_").from_env::<Settings>()?)
    }

    /// Settings with every path rooted under `root`; used for tests and
    /// dry runs.
    pub fn rooted_at(root: &Path) -> Self {
        let rebase = |p: PathBuf| root.join(p.strip_prefix("/").unwrap_or(&p));
        Self {
            state_dir: rebase(default_state_dir()),
            conf_path: rebase(default_conf_path()),
            novarc_path: rebase(default_novarc_path()),
            package_path: rebase(default_package_path()),
            command_timeout_secs: default_command_timeout(),
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn state_file(&self) -> PathBuf {
        self.state_dir.join("state.json")
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            conf_path: default_conf_path(),
            novarc_path: default_novarc_path(),
            package_path: default_package_path(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}
