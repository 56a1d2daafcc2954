//! Host helpers: package sources, apt and systemd services.

use crate::command::{CommandRunner, CommandSpec};
use crate::error::ToolError;

/// Where packages come from, as given by an `openstack-origin` style option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    /// The distribution archive; nothing to configure.
    Distro,
    /// Ubuntu Cloud Archive, e.g. `cloud:xenial-newton` or
    /// `cloud:trusty-mitaka/proposed`.
    CloudArchive {
        series: String,
        release: String,
        pocket: Option<String>,
    },
    /// Any other source understood by `add-apt-repository` (`ppa:`, `deb `).
    Repository(String),
}

impl PackageSource {
    /// Parse an origin string.
    pub fn parse(origin: &str) -> Result<Self, ToolError> {
        let origin = origin.trim();
        if origin.is_empty() || origin == "distro" {
            return Ok(Self::Distro);
        }

        if let Some(rest) = origin.strip_prefix("cloud:") {
            let (pair, pocket) = match rest.split_once('/') {
                Some((pair, pocket)) => (pair, Some(pocket.to_string())),
                None => (rest, None),
            };
            let (series, release) = pair.split_once('-').ok_or_else(|| {
                ToolError::Configuration(format!("Invalid cloud archive origin: {origin}"))
            })?;
            if series.is_empty() || release.is_empty() {
                return Err(ToolError::Configuration(format!(
                    "Invalid cloud archive origin: {origin}"
                )));
            }
            return Ok(Self::CloudArchive {
                series: series.to_string(),
                release: release.to_string(),
                pocket,
            });
        }

        if origin.starts_with("ppa:") || origin.starts_with("deb ") {
            return Ok(Self::Repository(origin.to_string()));
        }

        Err(ToolError::Configuration(format!("Unknown package origin: {origin}")))
    }

    /// The OpenStack release this source pins, if it pins one.
    pub fn release(&self) -> Option<&str> {
        match self {
            Self::CloudArchive { release, .. } => Some(release),
            _ => None,
        }
    }

    /// The `add-apt-repository` argument for this source.
    fn repository_arg(&self) -> Option<String> {
        match self {
            Self::Distro => None,
            Self::CloudArchive {
                release, pocket, ..
            } => Some(match pocket.as_deref() {
                Some("proposed") => format!("cloud-archive:{release}-proposed"),
                _ => format!("cloud-archive:{release}"),
            }),
            Self::Repository(source) => Some(source.clone()),
        }
    }
}

/// Add the package source to apt. Returns `true` if a repository was added.
pub async fn configure_source(
    runner: &dyn CommandRunner,
    source: &PackageSource,
) -> Result<bool, ToolError> {
    let Some(repository) = source.repository_arg() else {
        tracing::debug!("Using distro package source");
        return Ok(false);
    };

    tracing::info!(repository = %repository, "Adding package source");
    runner
        .check(&CommandSpec::new("add-apt-repository").args(["--yes", repository.as_str()]))
        .await?;
    Ok(true)
}

/// Refresh the apt package index.
pub async fn apt_update(runner: &dyn CommandRunner) -> Result<(), ToolError> {
    runner
        .check(&apt_command().args(["--assume-yes", "update"]))
        .await?;
    Ok(())
}

/// Install packages non-interactively, keeping existing config files.
pub async fn apt_install<S: AsRef<str>>(
    runner: &dyn CommandRunner,
    packages: &[S],
) -> Result<(), ToolError> {
    if packages.is_empty() {
        return Ok(());
    }

    let names: Vec<&str> = packages.iter().map(AsRef::as_ref).collect();
    tracing::info!(packages = ?names, "Installing packages");

    runner
        .check(
            &apt_command()
                .args([
                    "--assume-yes",
                    "--option=Dpkg::Options::=--force-confold",
                    "install",
                ])
                .args(names),
        )
        .await?;
    Ok(())
}

fn apt_command() -> CommandSpec {
    CommandSpec::new("apt-get").env("DEBIAN_FRONTEND", "noninteractive")
}

/// Restart a systemd service.
pub async fn service_restart(runner: &dyn CommandRunner, service: &str) -> Result<(), ToolError> {
    tracing::info!(service, "Restarting service");
    runner
        .check(&CommandSpec::new("systemctl").args(["restart", service]))
        .await?;
    Ok(())
}

/// Whether a systemd service is active.
pub async fn service_running(runner: &dyn CommandRunner, service: &str) -> Result<bool, ToolError> {
    let output = runner
        .run(&CommandSpec::new("systemctl").args(["is-active", "--quiet", service]))
        .await?;
    Ok(output.is_success())
}
