//! Workload status assessment.

use charm_tools::{host, WorkloadStatus};

use crate::charm::MuranoCharm;
use crate::error::CharmResult;
use crate::relations::{probe, Interface, Probe};
use crate::state::{Flag, FlagSet};

/// Pick the status to report. Earlier conditions win.
pub fn describe(
    probes: &[(Interface, Probe)],
    rendered: bool,
    not_running: &[&str],
) -> WorkloadStatus {
    let missing: Vec<&str> = probes
        .iter()
        .filter(|(_, p)| !p.connected)
        .map(|(i, _)| i.endpoint())
        .collect();
    if !missing.is_empty() {
        return WorkloadStatus::blocked(format!("Missing relations: {}", missing.join(", ")));
    }

    let incomplete: Vec<&str> = probes
        .iter()
        .filter(|(_, p)| !p.available)
        .map(|(i, _)| i.endpoint())
        .collect();
    if !incomplete.is_empty() {
        return WorkloadStatus::waiting(format!(
            "Incomplete relations: {}",
            incomplete.join(", ")
        ));
    }

    if !rendered {
        return WorkloadStatus::waiting("Waiting for configuration");
    }

    if !not_running.is_empty() {
        return WorkloadStatus::blocked(format!(
            "Services not running that should be: {}",
            not_running.join(", ")
        ));
    }

    WorkloadStatus::active("Unit is ready")
}

/// Inspect relations and services and report the result to Juju.
pub async fn assess_status(charm: &MuranoCharm, flags: &FlagSet) -> CharmResult<WorkloadStatus> {
    let mut probes = Vec::with_capacity(Interface::ALL.len());
    for interface in Interface::ALL {
        probes.push((interface, probe(charm.unit(), interface).await?));
    }

    let rendered = flags.contains(Flag::ConfigRendered);
    let mut not_running = Vec::new();
    if rendered {
        for service in charm.descriptor().managed_services() {
            if !host::service_running(charm.runner(), service).await? {
                not_running.push(service);
            }
        }
    }

    let status = describe(&probes, rendered, &not_running);
    tracing::debug!(state = ?status.state, message = %status.message, "Assessed status");
    charm.unit().status_set(&status).await?;
    Ok(status)
}
