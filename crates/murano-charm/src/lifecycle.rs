//! Lifecycle actions: install, render, database sync and package import.

use charm_tools::{host, CommandSpec, CredentialStore, WorkloadStatus};
use serde::Serialize;

use crate::charm::{ConfigFile, MuranoCharm, API_PORT, PACKAGES};
use crate::error::CharmResult;
use crate::relations::{IdentityData, RelationSnapshot};
use crate::state::{Flag, Machine};

/// Install packages from the configured source and open the API port.
pub async fn install(charm: &MuranoCharm) -> CharmResult<()> {
    charm
        .unit()
        .status_set(&WorkloadStatus::maintenance("Installing packages"))
        .await?;

    let source = charm.package_source()?;
    host::configure_source(charm.runner(), &source).await?;
    host::apt_update(charm.runner()).await?;
    host::apt_install(charm.runner(), PACKAGES).await?;
    charm.unit().open_port(API_PORT).await?;

    tracing::info!(release = %charm.release()?, "Murano installed");
    Ok(())
}

#[derive(Debug, Serialize)]
struct DatabaseContext<'a> {
    username: &'a str,
    password: &'a str,
    host: &'a str,
    name: &'a str,
}

#[derive(Debug, Serialize)]
struct IdentityContext<'a> {
    service_uri: String,
    auth_uri: String,
    tenant: &'a str,
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct AmqpContext<'a> {
    username: &'a str,
    vhost: &'a str,
    hosts: Vec<&'a str>,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct MuranoContext<'a> {
    debug: bool,
    verbose: bool,
    api_port: u16,
    region: &'a str,
    api_endpoint: String,
    database: DatabaseContext<'a>,
    identity: IdentityContext<'a>,
    amqp: AmqpContext<'a>,
}

/// Render `murano.conf` from relation data; restart services if it changed.
///
/// The credentials file is rendered alongside. Returns whether `murano.conf`
/// changed.
pub async fn render_config(charm: &MuranoCharm, snapshot: &RelationSnapshot) -> CharmResult<bool> {
    let options = charm.options();
    let identity = &snapshot.identity;

    // Every rabbitmq unit shares the same password for our user.
    let amqp_password = snapshot
        .amqp
        .first()
        .map(|a| a.password.as_str())
        .unwrap_or_default();

    let context = MuranoContext {
        debug: options.debug,
        verbose: options.verbose,
        api_port: API_PORT,
        region: &options.region,
        api_endpoint: charm.api_endpoint().await?,
        database: DatabaseContext {
            username: options.database_user()?,
            password: &snapshot.database.password,
            host: &snapshot.database.db_host,
            name: options.database_name()?,
        },
        identity: IdentityContext {
            service_uri: identity.service_uri(),
            auth_uri: identity.auth_uri(),
            tenant: &identity.service_tenant,
            username: &identity.service_username,
            password: &identity.service_password,
        },
        amqp: AmqpContext {
            username: options.rabbit_user()?,
            vhost: options.rabbit_vhost()?,
            hosts: snapshot.amqp.iter().map(|a| a.hostname.as_str()).collect(),
            password: amqp_password,
        },
    };

    let file = ConfigFile::MuranoConf;
    let changed = charm
        .templates()
        .render_to_file(
            file.template(),
            &context,
            file.path(charm.settings()),
            Some(file.mode()),
        )
        .await?;

    if changed {
        for service in charm.descriptor().restarts_for(file) {
            host::service_restart(charm.runner(), service).await?;
        }
    }

    render_novarc(charm, identity).await?;
    Ok(changed)
}

/// Credentials for the murano service user.
pub fn credentials_for(identity: &IdentityData, region: &str) -> CredentialStore {
    CredentialStore::new()
        .with("OS_USERNAME", identity.service_username.as_str())
        .with("OS_PASSWORD", identity.service_password.as_str())
        .with("OS_TENANT_NAME", identity.service_tenant.as_str())
        .with("OS_AUTH_URL", format!("{}/v2.0", identity.service_uri()))
        .with("OS_REGION_NAME", region)
}

#[derive(Debug, Serialize)]
struct NovarcContext {
    lines: Vec<String>,
}

/// Write the credentials file for operators and standalone actions.
pub async fn render_novarc(charm: &MuranoCharm, identity: &IdentityData) -> CharmResult<bool> {
    let credentials = credentials_for(identity, &charm.options().region);
    let context = NovarcContext {
        lines: credentials.export_lines(),
    };

    let file = ConfigFile::Novarc;
    let changed = charm
        .templates()
        .render_to_file(
            file.template(),
            &context,
            file.path(charm.settings()),
            Some(file.mode()),
        )
        .await?;
    Ok(changed)
}

/// Migrate the database schema. Leader only, once per deployment.
///
/// Returns `true` if the migration ran.
pub async fn db_sync(charm: &MuranoCharm, machine: &mut Machine) -> CharmResult<bool> {
    if machine.flags().contains(Flag::DbSynced) {
        tracing::debug!("Database already synced");
        return Ok(false);
    }
    if !charm.unit().is_leader().await? {
        tracing::info!("Not the leader, skipping database sync");
        return Ok(false);
    }

    let spec = charm.sync_command();
    tracing::info!(command = %spec, "Syncing database");
    charm.runner().check(&spec).await?;

    machine.mark(Flag::DbSynced);
    Ok(true)
}

/// `murano package-import --is-public --exists-action u <artifact>`
fn import_command(charm: &MuranoCharm, credentials: &CredentialStore) -> CommandSpec {
    CommandSpec::new("murano")
        .args(["package-import", "--is-public", "--exists-action", "u"])
        .arg(charm.settings().package_path.display().to_string())
        .envs(credentials.iter())
}

/// Import the core library package into the catalog.
///
/// A missing artifact is logged and skipped. Returns `true` if the import
/// command ran.
pub async fn import_package(charm: &MuranoCharm, credentials: &CredentialStore) -> CharmResult<bool> {
    let artifact = &charm.settings().package_path;
    if !tokio::fs::try_exists(artifact).await? {
        tracing::warn!(path = %artifact.display(), "Core library package not found, skipping import");
        return Ok(false);
    }

    tracing::info!(path = %artifact.display(), "Importing core library package");
    charm.runner().check(&import_command(charm, credentials)).await?;
    Ok(true)
}
