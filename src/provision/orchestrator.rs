//! End-to-end guest provisioning: clone a template, wait for the clone task,
//! then reconcile the new guest's network and identity configuration.

use crate::core::domain::error::{OrchestrationError, TransportResult};
use crate::core::domain::model::{
    GuestConfigUpdate, GuestSpec, IpConfigUpdate, NetworkUpdate, PveEndpoint,
};
use crate::core::infrastructure::transport::Transport;
use crate::provision::lifecycle::GuestLifecycle;
use crate::provision::poller::{PollOutcome, PollerConfig, TaskPoller};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Sequences one provisioning run per call: clone, poll, reconcile.
///
/// Each step gates the next and the first failure aborts the run. There is
/// no rollback: a run that fails after the clone task started may leave a
/// half-cloned or misconfigured guest behind, and callers that need
/// atomicity must compensate externally. Runs for different guests are fully
/// independent; concurrent runs against the same guest id are the caller's
/// responsibility to serialize.
#[derive(Debug)]
pub struct Provisioner {
    transport: Transport,
    poller: TaskPoller,
}

impl Provisioner {
    /// Builds a provisioner with the default polling budgets (1 s interval,
    /// 300 iterations, 10 tolerated errors).
    ///
    /// # Errors
    /// Returns a transport error if the HTTP clients cannot be built.
    pub fn new() -> TransportResult<Self> {
        Ok(Self {
            transport: Transport::new()?,
            poller: TaskPoller::new(PollerConfig::default()),
        })
    }

    /// Builds a provisioner with explicit polling budgets.
    pub fn with_config(transport: Transport, poller_config: PollerConfig) -> Self {
        Self {
            transport,
            poller: TaskPoller::new(poller_config),
        }
    }

    /// Provisions a guest from a template, without external cancellation.
    pub async fn provision(
        &self,
        endpoint: &PveEndpoint,
        template_id: u32,
        spec: &GuestSpec,
    ) -> Result<(), OrchestrationError> {
        self.provision_with_cancel(endpoint, template_id, spec, &CancellationToken::new())
            .await
    }

    /// Provisions a guest from a template.
    ///
    /// The token cancels the polling phase; the clone request and the config
    /// update are single bounded calls and run to their own deadlines.
    pub async fn provision_with_cancel(
        &self,
        endpoint: &PveEndpoint,
        template_id: u32,
        spec: &GuestSpec,
        cancel: &CancellationToken,
    ) -> Result<(), OrchestrationError> {
        let lifecycle = GuestLifecycle::new(&self.transport, endpoint);

        info!(guest_id = spec.id, template_id, name = %spec.name, "provisioning guest");
        let handle = lifecycle
            .clone_template(template_id, spec)
            .await
            .map_err(|e| {
                error!(guest_id = spec.id, template_id, error = %e, "template clone failed");
                OrchestrationError::CloneFailed(e)
            })?;

        match self.poller.poll(&lifecycle, &handle, cancel).await {
            PollOutcome::Succeeded(_) => {}
            PollOutcome::Failed { exit_status } => {
                error!(
                    guest_id = spec.id,
                    upid = %handle,
                    exit_status = exit_status.as_deref(),
                    "clone task failed; guest may exist half-cloned"
                );
                return Err(OrchestrationError::PollFailed { exit_status });
            }
            PollOutcome::TimedOut { reason } => {
                error!(
                    guest_id = spec.id,
                    upid = %handle,
                    ?reason,
                    "clone task polling gave up; guest may exist half-cloned"
                );
                return Err(OrchestrationError::PollTimedOut);
            }
            PollOutcome::Cancelled => return Err(OrchestrationError::Cancelled),
        }

        // From here on the guest exists: a failure below means "guest exists
        // but misconfigured", never "guest absent".
        lifecycle
            .update_guest_config(spec.id, &config_update_from_spec(spec))
            .await
            .map_err(|e| {
                error!(guest_id = spec.id, error = %e, "config update failed on cloned guest");
                OrchestrationError::ConfigUpdateFailed(e)
            })?;

        info!(guest_id = spec.id, "guest provisioned");
        Ok(())
    }
}

/// Maps the caller's desired spec onto the partial update applied after a
/// successful clone. The clone already carried name and storage; the update
/// reconciles identity, sizing and networking.
fn config_update_from_spec(spec: &GuestSpec) -> GuestConfigUpdate {
    GuestConfigUpdate {
        name: Some(spec.name.clone()),
        cores: Some(spec.cores),
        memory_mb: Some(spec.memory_mb),
        nameservers: (!spec.nameservers.is_empty()).then(|| spec.nameservers.clone()),
        ssh_keys: (!spec.ssh_keys.is_empty()).then(|| spec.ssh_keys.clone()),
        network: Some(NetworkUpdate {
            bridge: Some(spec.bridge.clone()),
            rate_limit_mbps: spec.rate_limit_mbps,
        }),
        ip: (spec.ipv4.is_some() || spec.ipv6.is_some()).then(|| IpConfigUpdate {
            ipv4: spec.ipv4.clone(),
            ipv6: spec.ipv6.clone(),
        }),
    }
}
